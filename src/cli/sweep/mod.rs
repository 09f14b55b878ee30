//! Sweep command - one expiry and eviction pass, for cron-style deployments

use tracing::info;

/// Run a single maintenance pass and print the counts as JSON
pub async fn run() -> anyhow::Result<()> {
    let config = super::bootstrap()?;

    let cache = crate::create_cache_service(&config).await?;
    let report = cache.run_maintenance_pass().await?;

    info!(
        expired = report.expired,
        evicted = report.evicted,
        "Maintenance pass completed"
    );
    println!("{}", serde_json::to_string(&report)?);

    cache.shutdown().await;

    Ok(())
}
