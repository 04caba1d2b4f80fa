//! Worker spawner adapters.

pub mod mock;
pub mod process;

pub use mock::MockWorkerSpawner;
pub use process::{ProcessWorkerSpawner, SignalLivenessCheck};
