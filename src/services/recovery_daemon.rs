//! Periodic recovery sweep daemon.
//!
//! Runs [`Orchestrator::sweep`] on a fixed interval until stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::domain::models::OrchestratorConfig;
use crate::services::orchestrator::{Orchestrator, SweepReport};

/// Configuration for the recovery daemon.
#[derive(Debug, Clone)]
pub struct RecoveryDaemonConfig {
    /// Interval between sweeps.
    pub sweep_interval: Duration,
    /// Whether to sweep as soon as the daemon starts.
    pub run_on_startup: bool,
    /// Consecutive failed sweeps before the daemon gives up.
    pub max_consecutive_failures: u32,
}

impl Default for RecoveryDaemonConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            run_on_startup: false,
            max_consecutive_failures: 10,
        }
    }
}

impl From<&OrchestratorConfig> for RecoveryDaemonConfig {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            sweep_interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            ..Self::default()
        }
    }
}

/// Event emitted by the recovery daemon.
#[derive(Debug, Clone)]
pub enum RecoveryDaemonEvent {
    Started,
    SweepCompleted {
        run_number: u64,
        report: SweepReport,
        duration_ms: u64,
    },
    SweepFailed {
        run_number: u64,
        error: String,
    },
    Stopped {
        reason: StopReason,
    },
}

/// Why the daemon stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    TooManyFailures,
}

/// Running totals of the daemon.
#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    pub running: bool,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub last_run: Option<Instant>,
    /// Tasks replayed or reset across all sweeps.
    pub total_recovered: u64,
}

/// Handle to control a running daemon.
#[derive(Clone)]
pub struct DaemonHandle {
    stop_flag: Arc<AtomicBool>,
    status: Arc<RwLock<DaemonStatus>>,
}

impl DaemonHandle {
    /// Request the daemon to stop. Takes effect at the next tick.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    pub async fn status(&self) -> DaemonStatus {
        self.status.read().await.clone()
    }
}

pub struct RecoveryDaemon {
    orchestrator: Orchestrator,
    config: RecoveryDaemonConfig,
    status: Arc<RwLock<DaemonStatus>>,
    stop_flag: Arc<AtomicBool>,
}

impl RecoveryDaemon {
    pub fn new(orchestrator: Orchestrator, config: RecoveryDaemonConfig) -> Self {
        Self {
            orchestrator,
            config,
            status: Arc::new(RwLock::new(DaemonStatus::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            stop_flag: self.stop_flag.clone(),
            status: self.status.clone(),
        }
    }

    /// Start the daemon, returning a channel of its events.
    pub fn run(self) -> mpsc::Receiver<RecoveryDaemonEvent> {
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(async move {
            self.run_loop(tx).await;
        });
        rx
    }

    async fn run_loop(self, tx: mpsc::Sender<RecoveryDaemonEvent>) {
        self.status.write().await.running = true;
        let _ = tx.send(RecoveryDaemonEvent::Started).await;
        tracing::info!(interval = ?self.config.sweep_interval, "recovery daemon started");

        let mut consecutive_failures = 0u32;
        let mut timer = interval(self.config.sweep_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        timer.tick().await;

        if self.config.run_on_startup {
            self.run_sweep(&tx, &mut consecutive_failures).await;
        }

        let reason = loop {
            if self.stop_flag.load(Ordering::Acquire) {
                break StopReason::Requested;
            }
            timer.tick().await;
            if self.stop_flag.load(Ordering::Acquire) {
                break StopReason::Requested;
            }

            self.run_sweep(&tx, &mut consecutive_failures).await;
            if consecutive_failures >= self.config.max_consecutive_failures {
                break StopReason::TooManyFailures;
            }
        };

        self.status.write().await.running = false;
        tracing::info!(reason = ?reason, "recovery daemon stopped");
        let _ = tx.send(RecoveryDaemonEvent::Stopped { reason }).await;
    }

    async fn run_sweep(
        &self,
        tx: &mpsc::Sender<RecoveryDaemonEvent>,
        consecutive_failures: &mut u32,
    ) {
        let run_number = {
            let mut status = self.status.write().await;
            status.total_runs += 1;
            status.total_runs
        };

        let start = Instant::now();
        let result = self.orchestrator.sweep().await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(report) => {
                *consecutive_failures = 0;
                {
                    let mut status = self.status.write().await;
                    status.successful_runs += 1;
                    status.last_run = Some(Instant::now());
                    status.total_recovered += report.acted() as u64;
                }
                let _ = tx
                    .send(RecoveryDaemonEvent::SweepCompleted {
                        run_number,
                        report,
                        duration_ms,
                    })
                    .await;
            }
            Err(e) => {
                *consecutive_failures += 1;
                self.status.write().await.failed_runs += 1;
                tracing::warn!(run_number, error = %e, "recovery sweep failed");
                let _ = tx
                    .send(RecoveryDaemonEvent::SweepFailed {
                        run_number,
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_orchestrator_config() {
        let config = RecoveryDaemonConfig::from(&OrchestratorConfig {
            sweep_interval_secs: 15,
            ..OrchestratorConfig::default()
        });
        assert_eq!(config.sweep_interval, Duration::from_secs(15));
        assert!(!config.run_on_startup);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = RecoveryDaemonConfig::from(&OrchestratorConfig {
            sweep_interval_secs: 0,
            ..OrchestratorConfig::default()
        });
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_status_default() {
        let status = DaemonStatus::default();
        assert!(!status.running);
        assert_eq!(status.total_runs, 0);
        assert!(status.last_run.is_none());
    }
}
