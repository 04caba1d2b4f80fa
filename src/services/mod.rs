//! Service layer: delegation policy, the directory, and the orchestrator.

pub mod directive_policy;
pub mod directory;
pub mod notices;
pub mod orchestrator;
pub mod recovery_daemon;
pub mod registry;
pub mod roster;

pub use directive_policy::{classify, detect_locale};
pub use directory::{role_constraint, Directory};
pub use notices::Notice;
pub use orchestrator::{
    DelegateOptions, DirectiveOutcome, Orchestrator, OrchestratorSettings, ReconcileReport,
    StartupReport, Stores, SweepReport,
};
pub use recovery_daemon::{DaemonHandle, RecoveryDaemon, RecoveryDaemonConfig, RecoveryDaemonEvent};
pub use registry::{DelegationRegistry, StopMode};
pub use roster::{seed_roster, RosterSeed};
