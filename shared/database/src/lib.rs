//! Persistence for the Redress workflow engine.
//!
//! Store contracts live in [`repositories`]; [`MemoryStore`] and
//! [`MongoStore`] implement every one of them.

pub mod memory;
pub mod migrations;
pub mod mongodb;
pub mod repositories;

pub use memory::MemoryStore;
pub use crate::mongodb::{create_mongo_client, health_check as mongo_health_check, MongoClient, MongoDatabase, MongoStore};
pub use repositories::*;

use anyhow::Result;
use std::time::Duration;

use redress_utils::config::DatabaseConfig;

/// Connects to MongoDB, ensures indexes and returns a ready store.
pub async fn connect_mongo(config: &DatabaseConfig) -> Result<(MongoClient, MongoStore)> {
    let client = create_mongo_client(
        &config.mongodb_url,
        Duration::from_secs(config.connection_timeout_seconds),
    )
    .await?;
    let database = client.database(&config.database_name);

    // Run migrations
    migrations::ensure_indexes(&database).await?;

    Ok((client, MongoStore::new(database)))
}
