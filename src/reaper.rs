use crate::lifecycle::MessageLifecycle;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

/// Periodically purges expired messages that nobody reads again.
pub struct Reaper {
    lifecycle: MessageLifecycle,
    interval: Duration,
}

impl Reaper {
    pub fn new(lifecycle: MessageLifecycle, interval: Duration) -> Self {
        Self { lifecycle, interval }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut next_tick = tokio::time::Instant::now() + self.interval;

        while !*shutdown.borrow() {
            tokio::select! {
                () = tokio::time::sleep_until(next_tick) => {
                    async {
                        tracing::debug!("Running expired message sweep...");
                        match self.lifecycle.sweep_expired().await {
                            Ok(0) => {}
                            Ok(count) => tracing::info!(purged = count, "Expired message sweep completed"),
                            Err(e) => tracing::error!(error = %e, "Expired message sweep failed"),
                        }
                    }
                    .instrument(tracing::info_span!("message_reaper_iteration"))
                    .await;
                    next_tick = tokio::time::Instant::now() + self.interval;
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Message reaper shutting down...");
    }
}
