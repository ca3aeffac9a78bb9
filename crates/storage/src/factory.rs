use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use trellis_errors::DatabaseError;

use crate::{
    Database,
    inmemory::InMemoryDatabase,
    rocksdb::{RocksDBConfig, RocksDBConnection},
};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DatabaseConfig {
    #[default]
    InMemory,
    RocksDB(RocksDBConfig),
}

pub fn create_storage(config: &DatabaseConfig) -> Result<Arc<Box<dyn Database>>, DatabaseError> {
    info!("Initializing storage layer...");
    match config {
        DatabaseConfig::InMemory => Ok(Arc::new(Box::new(InMemoryDatabase::new()))),
        DatabaseConfig::RocksDB(config) => {
            let db = RocksDBConnection::new(config)?;
            Ok(Arc::new(Box::new(db)))
        }
    }
}
