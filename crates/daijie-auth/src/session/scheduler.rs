//! Periodic session validation.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::SessionManager;

/// Runs [`SessionManager::validate_sessions`] on a fixed interval.
pub struct SessionValidationScheduler {
    manager: SessionManager,
    interval: Duration,
}

impl SessionValidationScheduler {
    pub fn new(manager: SessionManager) -> Self {
        let interval = manager.validation_interval();
        Self { manager, interval }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the validation task. The first sweep runs after one interval.
    pub fn enable(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let Self { manager, interval } = self;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        if let Err(e) = manager.validate_sessions().await {
                            tracing::warn!(error = %e, "Session validation failed");
                        }
                    }
                }
            }
            tracing::debug!("Session validation scheduler stopped");
        });

        tracing::info!(interval_ms = interval.as_millis() as u64, "Session validation scheduler enabled");
        SchedulerHandle {
            handle,
            shutdown: Some(shutdown_tx),
        }
    }
}

/// Handle to a running validation task.
pub struct SchedulerHandle {
    handle: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the task to stop and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::warn!(error = %e, "Session validation task ended abnormally");
        }
    }
}
