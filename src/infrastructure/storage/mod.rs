//! Storage infrastructure - connection pooling, schema and backend selection

mod factory;
pub mod migrations;
mod postgres;

pub use factory::{Repositories, StorageConfig, StorageFactory, StorageType};
pub use migrations::{revert_migrations, run_migrations, Migration, PostgresMigrator};
pub use postgres::PostgresConfig;
