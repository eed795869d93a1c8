//! Background retry sweep
//!
//! Periodically expires stale IN_FLIGHT delivery leases so a device that
//! crashed mid-download never pins an artifact forever. Failed deliveries
//! need no sweeping: they become visible to devices again on their own once
//! `next_retry_at` passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::DeliveryConfig;
use crate::delivery::DeliveryCoordinator;

/// The retry sweep background task
pub struct RetrySweepTask {
    coordinator: DeliveryCoordinator,
    config: DeliveryConfig,
    accepting_new: Arc<AtomicBool>,
}

impl RetrySweepTask {
    /// Create the task
    pub fn new(
        coordinator: DeliveryCoordinator,
        config: DeliveryConfig,
        accepting_new: Arc<AtomicBool>,
    ) -> Self {
        Self {
            coordinator,
            config,
            accepting_new,
        }
    }

    /// Run the sweep loop until shutdown
    pub async fn run(self) {
        info!("Retry sweep task started");

        loop {
            if !self.accepting_new.load(Ordering::SeqCst) {
                info!("Retry sweep task shutting down");
                break;
            }

            let now = chrono::Utc::now().timestamp();
            match self.coordinator.expire_stale_leases(now).await {
                Ok(0) => debug!("Retry sweep: no stale leases"),
                Ok(count) => info!(count, "Retry sweep expired stale leases"),
                Err(e) => error!(error = %e, "Retry sweep failed"),
            }

            sleep(self.config.sweep_interval).await;
        }

        info!("Retry sweep task stopped");
    }
}
