use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use crate::registry::Registry;

/// Expiry loop - sweeps the registry every `interval` until cancelled
pub async fn run(
    registry: Arc<Registry>,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut sweep_interval = tokio::time::interval(interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!("Expiry sweeper running every {:?}", interval);

    loop {
        tokio::select! {
            _ = sweep_interval.tick() => {
                let report = registry.sweep(Utc::now());
                if report.repaired > 0 {
                    tracing::warn!("Sweep rebuilt {} product indexes", report.repaired);
                }
                if report.expired > 0 || report.pruned > 0 {
                    tracing::info!(
                        "Sweep expired {} and pruned {} servers",
                        report.expired,
                        report.pruned
                    );
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Expiry sweeper shutting down");
                break;
            }
        }
    }

    Ok(())
}
