use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::services::ledger::EnrollmentService;

/// Periodic waitlist sweep.
/// Catches subscriptions made while a seat was already free, which no drop
/// or capacity change would otherwise announce.
pub struct NotificationSweeper {
    service: Arc<EnrollmentService>,
    interval: Duration,
}

impl NotificationSweeper {
    pub fn new(service: Arc<EnrollmentService>, interval_secs: u64) -> Self {
        Self {
            service,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Sweeps forever at the configured interval.
    pub async fn start(self) {
        info!("Starting notification sweeper (interval: {:?})", self.interval);

        loop {
            tokio::time::sleep(self.interval).await;

            match self.service.process_pending_notifications().await {
                Ok(0) => {}
                Ok(sent) => info!("Notification sweep delivered {} notices", sent),
                // keep sweeping; the next tick retries from scratch
                Err(e) => warn!("Notification sweep failed: {:?}", e),
            }
        }
    }
}
