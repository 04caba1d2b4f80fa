//! Domain layer for the taskforce orchestrator
//!
//! Work-item models, their state machines, and the port traits that
//! adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
