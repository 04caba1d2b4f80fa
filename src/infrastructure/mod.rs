//! Infrastructure layer module
//!
//! Ambient concerns shared by the CLI and the services:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)

pub mod config;
pub mod logging;
