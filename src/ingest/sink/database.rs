// src/ingest/sink/database.rs
//! Structured sink: one row per (native_id, publisher) in the `activities` table.

use async_trait::async_trait;
use deadpool_postgres::{Config as DeadpoolConfig, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tokio_postgres::NoTls;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{IngestError, Result};
use crate::ingest::fields::RowDefaults;
use crate::ingest::sink::Sink;
use crate::ingest::types::{ActivityRecord, StoredActivity};

/// Expected table layout. Not applied by the poller; provisioning the schema is an
/// operator task.
pub const ACTIVITIES_DDL: &str = "CREATE TABLE IF NOT EXISTS activities (
    id BIGSERIAL PRIMARY KEY,
    native_id BIGINT NOT NULL,
    content TEXT,
    body TEXT,
    rule_value VARCHAR(255),
    rule_tag VARCHAR(255),
    publisher VARCHAR(255) NOT NULL,
    job_uuid VARCHAR(255),
    latitude DOUBLE PRECISION,
    longitude DOUBLE PRECISION,
    posted_time TIMESTAMP,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    UNIQUE (native_id, publisher)
)";

const UPSERT_SQL: &str = "INSERT INTO activities \
    (native_id, posted_time, content, body, rule_value, rule_tag, publisher, job_uuid, \
     latitude, longitude, created_at, updated_at) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
    ON CONFLICT (native_id, publisher) DO UPDATE SET \
    posted_time = EXCLUDED.posted_time, content = EXCLUDED.content, body = EXCLUDED.body, \
    rule_value = EXCLUDED.rule_value, rule_tag = EXCLUDED.rule_tag, job_uuid = EXCLUDED.job_uuid, \
    latitude = EXCLUDED.latitude, longitude = EXCLUDED.longitude, updated_at = EXCLUDED.updated_at";

#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Insert, or overwrite every column except `created_at` when the
    /// (native_id, publisher) pair already exists.
    async fn upsert(&self, row: &StoredActivity) -> Result<()>;
    fn name(&self) -> &'static str;
}

pub struct DatabaseSink {
    store: Arc<dyn ActivityStore>,
    defaults: RowDefaults,
}

impl DatabaseSink {
    pub fn new(store: Arc<dyn ActivityStore>, defaults: RowDefaults) -> Self {
        Self { store, defaults }
    }
}

#[async_trait]
impl Sink for DatabaseSink {
    async fn write(&self, record: &ActivityRecord<'_>) -> Result<()> {
        let row = StoredActivity::from_record(record, &self.defaults)?;
        self.store.upsert(&row).await.map_err(|e| match e {
            IngestError::SinkWrite { reason, .. } => IngestError::sink_write(&record.entry.id, reason),
            other => other,
        })
    }

    fn name(&self) -> &'static str {
        "database"
    }
}

/// PostgreSQL store backed by a single-connection pool; a dropped connection is
/// replaced on the next checkout.
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        let mut pg = DeadpoolConfig::new();
        match &cfg.url {
            Some(url) => pg.url = Some(url.clone()),
            None => {
                pg.host = Some(cfg.host.clone());
                pg.port = Some(cfg.port);
                pg.user = cfg.user_name.clone();
                pg.password = cfg.password.clone();
                pg.dbname = cfg.schema.clone();
            }
        }
        pg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        pg.pool = Some(PoolConfig::new(1));

        let pool = pg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| IngestError::config(format!("creating database pool: {e}")))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    /// Try one checkout so a misconfigured database shows up at startup. Failure is
    /// only logged; rows are retried per entry once the database is reachable.
    pub async fn check(&self) {
        match self.pool.get().await {
            Ok(_) => info!(target: "sink", "database connection established"),
            Err(e) => warn!(target: "sink", error = %e, "database not reachable yet"),
        }
    }
}

#[async_trait]
impl ActivityStore for PostgresStore {
    async fn upsert(&self, row: &StoredActivity) -> Result<()> {
        let key = row.native_id.to_string();
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| IngestError::sink_write(&key, e))?;
        let stmt = client
            .prepare_cached(UPSERT_SQL)
            .await
            .map_err(|e| IngestError::sink_write(&key, e))?;
        client
            .execute(
                &stmt,
                &[
                    &row.native_id,
                    &row.posted_time,
                    &row.content,
                    &row.body,
                    &row.rule_value,
                    &row.rule_tag,
                    &row.publisher,
                    &row.job_uuid,
                    &row.latitude,
                    &row.longitude,
                    &row.created_at,
                    &row.updated_at,
                ],
            )
            .await
            .map_err(|e| IngestError::sink_write(&key, e))?;
        debug!(target: "sink", native_id = row.native_id, publisher = %row.publisher, "row upserted");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

// --- Test helper ---

/// In-process store with the same upsert semantics as [`PostgresStore`].
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<(i64, String), StoredActivity>>,
    rejected: Mutex<BTreeSet<i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert of `native_id` fail.
    pub fn reject(&self, native_id: i64) {
        self.rejected
            .lock()
            .expect("memory store mutex poisoned")
            .insert(native_id);
    }

    pub fn rows(&self) -> Vec<StoredActivity> {
        self.rows
            .lock()
            .expect("memory store mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, native_id: i64, publisher: &str) -> Option<StoredActivity> {
        self.rows
            .lock()
            .expect("memory store mutex poisoned")
            .get(&(native_id, publisher.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().expect("memory store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn upsert(&self, row: &StoredActivity) -> Result<()> {
        if self
            .rejected
            .lock()
            .expect("memory store mutex poisoned")
            .contains(&row.native_id)
        {
            return Err(IngestError::sink_write(&row.native_id.to_string(), "rejected by store"));
        }
        let mut rows = self.rows.lock().expect("memory store mutex poisoned");
        let key = (row.native_id, row.publisher.clone());
        let mut next = row.clone();
        if let Some(existing) = rows.get(&key) {
            next.created_at = existing.created_at;
        }
        rows.insert(key, next);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
