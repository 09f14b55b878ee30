//! Background expiry and eviction loop

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::semantic_cache_service::SemanticCacheService;

/// Counts produced by one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub expired: usize,
    pub evicted: usize,
}

/// Spawn the periodic sweep; the first pass runs one `interval` after start
pub(crate) fn spawn_maintenance(
    service: Arc<SemanticCacheService>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match service.run_maintenance_pass().await {
                        Ok(report) => debug!(
                            expired = report.expired,
                            evicted = report.evicted,
                            "Maintenance pass completed"
                        ),
                        Err(e) => warn!(error = %e, "Maintenance pass failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        debug!("Maintenance loop stopped");
    })
}
