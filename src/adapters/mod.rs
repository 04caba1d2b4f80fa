//! Infrastructure adapters for external systems.

pub mod sinks;
pub mod sqlite;
pub mod workers;
