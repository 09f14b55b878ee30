//! Storage infrastructure - backend selection, pooling and migrations

mod factory;
pub mod migrations;
mod postgres;

pub use factory::{IndexType, StorageType};
pub use migrations::{
    cache_migrations, revert_cache_migrations, run_cache_migrations, Migration, PostgresMigrator,
};
pub use postgres::{connect_pool, PostgresConfig};
