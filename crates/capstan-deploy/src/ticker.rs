//! The periodic tick driving the ready-jobs sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::warn;

use crate::trigger::DeploymentTrigger;

/// Drives [`DeploymentTrigger::trigger_ready_jobs`] on a fixed cadence.
pub struct TriggerTicker {
    trigger: Arc<DeploymentTrigger>,
    interval: Duration,
}

impl TriggerTicker {
    /// Creates a ticker sweeping at the given interval.
    #[must_use]
    pub fn new(trigger: Arc<DeploymentTrigger>, interval: Duration) -> Self {
        Self { trigger, interval }
    }

    /// Runs sweeps until the shutdown signal fires.
    ///
    /// A failing sweep is logged and the cadence continues; one bad pass
    /// must not stop the control loop.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(error) = self.trigger.trigger_ready_jobs().await {
                        warn!(%error, "ready-jobs sweep failed");
                    }
                }
                _ = &mut shutdown => break,
            }
        }
    }
}
