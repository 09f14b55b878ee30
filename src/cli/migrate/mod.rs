//! Migrate command - applies or reverts the cache schema

use clap::Args;
use tracing::info;

use crate::infrastructure::storage::{
    revert_cache_migrations, run_cache_migrations, PostgresMigrator,
};

/// Arguments for the migrate command
#[derive(Args, Clone, Debug)]
pub struct MigrateArgs {
    /// Revert every applied migration instead of applying pending ones
    #[arg(long)]
    pub revert: bool,
}

/// Run migrations against the configured database
pub async fn run(args: MigrateArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let pool = crate::connect_postgres(&config).await?;
    let dimensions = config.cache.embedding_dimensions;

    if args.revert {
        let reverted = revert_cache_migrations(&pool, dimensions).await?;
        info!(reverted, "Cache migrations reverted");
    } else {
        let applied = run_cache_migrations(&pool, dimensions).await?;
        info!(applied, dimensions, "Cache migrations applied");
    }

    let version = PostgresMigrator::new(pool.clone()).current_version().await?;
    println!("schema version: {}", version.map_or_else(|| "none".to_string(), |v| v.to_string()));

    pool.close().await;

    Ok(())
}
