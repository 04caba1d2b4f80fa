//! Outbound sink adapters.

pub mod event_broadcast;
pub mod notifier;

pub use event_broadcast::{BroadcastEventSink, SequencedEvent};
pub use notifier::{ConsoleNotifier, TracingNotifier};
