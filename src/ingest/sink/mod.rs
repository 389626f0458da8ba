// src/ingest/sink/mod.rs
//! Durable destinations for extracted activities. One sink is chosen at startup
//! from the storage mode and injected into the engine.

pub mod database;
pub mod file;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{PollConfig, StorageMode};
use crate::error::Result;
use crate::ingest::fields::RowDefaults;
use crate::ingest::types::ActivityRecord;

pub use database::{ActivityStore, DatabaseSink, MemoryStore, PostgresStore};
pub use file::FileSink;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Persist one entry. Errors are per-record and never stop the caller's loop.
    async fn write(&self, record: &ActivityRecord<'_>) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Build the sink for the configured storage mode.
pub async fn from_config(poll: &PollConfig) -> Result<Arc<dyn Sink>> {
    match &poll.storage {
        StorageMode::File { out_box } => Ok(Arc::new(FileSink::new(out_box)?)),
        StorageMode::Database(db) => {
            let store = PostgresStore::connect(db)?;
            store.check().await;
            let defaults = RowDefaults {
                publisher: db.publisher.clone(),
                job_uuid: db.job_uuid.clone(),
                rehydration: db.rehydration,
            };
            Ok(Arc::new(DatabaseSink::new(Arc::new(store), defaults)))
        }
    }
}
