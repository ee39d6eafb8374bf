//! SQLite-backed [`PricingStore`].
//!
//! A single connection behind a mutex; every call runs on the blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{
    BatchMetadata, BatchStatus, BatchUpdate, CachedDailyCost, CachedHotelPricing, PricingStore,
    StoreError,
};
use crate::pricing::{Confidence, PricingSource};

const SCHEMA: &str = "\
    CREATE TABLE IF NOT EXISTS hotel_pricing_cache (\
      city_id TEXT PRIMARY KEY,\
      p25 REAL NOT NULL,\
      p50 REAL NOT NULL,\
      p75 REAL NOT NULL,\
      source TEXT NOT NULL,\
      confidence TEXT NOT NULL,\
      batch_id TEXT NOT NULL,\
      created_at TEXT NOT NULL,\
      updated_at TEXT NOT NULL\
    );\
    CREATE TABLE IF NOT EXISTS daily_cost_cache (\
      city_id TEXT PRIMARY KEY,\
      food REAL NOT NULL,\
      transport REAL NOT NULL,\
      misc REAL NOT NULL,\
      source TEXT NOT NULL,\
      confidence TEXT NOT NULL,\
      batch_id TEXT NOT NULL,\
      created_at TEXT NOT NULL,\
      updated_at TEXT NOT NULL\
    );\
    CREATE TABLE IF NOT EXISTS batch_metadata (\
      batch_id TEXT PRIMARY KEY,\
      status TEXT NOT NULL,\
      total_cities INTEGER NOT NULL,\
      processed_cities INTEGER NOT NULL,\
      successful_calls INTEGER NOT NULL,\
      failed_calls INTEGER NOT NULL,\
      total_cost REAL NOT NULL,\
      started_at TEXT NOT NULL,\
      updated_at TEXT NOT NULL,\
      completed_at TEXT,\
      error_message TEXT,\
      metadata TEXT NOT NULL\
    );\
    CREATE INDEX IF NOT EXISTS idx_hotel_batch ON hotel_pricing_cache(batch_id);\
    CREATE INDEX IF NOT EXISTS idx_daily_batch ON daily_cost_cache(batch_id);";

/// Pricing cache persisted in a SQLite file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (creating if needed) the cache at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             PRAGMA busy_timeout=5000;",
        )?;
        Self::from_connection(conn)
    }

    /// Throwaway in-memory cache.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            // A poisoned lock still guards a usable connection.
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {raw}: {e}")))
}

fn parse_source(raw: &str) -> Result<PricingSource, StoreError> {
    PricingSource::parse(raw).ok_or_else(|| StoreError::Corrupt(format!("source {raw}")))
}

fn parse_confidence(raw: &str) -> Result<Confidence, StoreError> {
    Confidence::parse(raw).ok_or_else(|| StoreError::Corrupt(format!("confidence {raw}")))
}

struct RawHotel {
    city_id: String,
    p25: f64,
    p50: f64,
    p75: f64,
    source: String,
    confidence: String,
    batch_id: String,
    created_at: String,
    updated_at: String,
}

impl RawHotel {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            city_id: row.get(0)?,
            p25: row.get(1)?,
            p50: row.get(2)?,
            p75: row.get(3)?,
            source: row.get(4)?,
            confidence: row.get(5)?,
            batch_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<CachedHotelPricing, StoreError> {
        Ok(CachedHotelPricing {
            source: parse_source(&self.source)?,
            confidence: parse_confidence(&self.confidence)?,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
            city_id: self.city_id,
            p25: self.p25,
            p50: self.p50,
            p75: self.p75,
            batch_id: self.batch_id,
        })
    }
}

struct RawDaily {
    city_id: String,
    food: f64,
    transport: f64,
    misc: f64,
    source: String,
    confidence: String,
    batch_id: String,
    created_at: String,
    updated_at: String,
}

impl RawDaily {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            city_id: row.get(0)?,
            food: row.get(1)?,
            transport: row.get(2)?,
            misc: row.get(3)?,
            source: row.get(4)?,
            confidence: row.get(5)?,
            batch_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<CachedDailyCost, StoreError> {
        Ok(CachedDailyCost {
            source: parse_source(&self.source)?,
            confidence: parse_confidence(&self.confidence)?,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
            city_id: self.city_id,
            food: self.food,
            transport: self.transport,
            misc: self.misc,
            batch_id: self.batch_id,
        })
    }
}

fn load_batch(conn: &Connection, batch_id: &str) -> Result<Option<BatchMetadata>, StoreError> {
    let raw = conn
        .query_row(
            "SELECT batch_id, status, total_cities, processed_cities, successful_calls, \
             failed_calls, total_cost, started_at, updated_at, completed_at, error_message, \
             metadata \
             FROM batch_metadata WHERE batch_id = ?1",
            params![batch_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, u32>(5)?,
                    row.get::<_, f64>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, Option<String>>(10)?,
                    row.get::<_, String>(11)?,
                ))
            },
        )
        .optional()?;

    let Some((
        batch_id,
        status,
        total_cities,
        processed_cities,
        successful_calls,
        failed_calls,
        total_cost,
        started_at,
        updated_at,
        completed_at,
        error_message,
        metadata,
    )) = raw
    else {
        return Ok(None);
    };

    Ok(Some(BatchMetadata {
        status: BatchStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("batch status {status}")))?,
        batch_id,
        total_cities,
        processed_cities,
        successful_calls,
        failed_calls,
        total_cost,
        started_at: parse_time(&started_at)?,
        updated_at: parse_time(&updated_at)?,
        completed_at: completed_at.as_deref().map(parse_time).transpose()?,
        error_message,
        metadata: serde_json::from_str(&metadata)?,
    }))
}

fn write_batch(conn: &Connection, meta: &BatchMetadata, insert: bool) -> Result<(), StoreError> {
    let metadata = serde_json::to_string(&meta.metadata)?;
    let completed_at = meta.completed_at.map(|t| t.to_rfc3339());
    if insert {
        conn.execute(
            "INSERT INTO batch_metadata (batch_id, status, total_cities, processed_cities, \
             successful_calls, failed_calls, total_cost, started_at, updated_at, completed_at, \
             error_message, metadata) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                meta.batch_id,
                meta.status.as_str(),
                meta.total_cities,
                meta.processed_cities,
                meta.successful_calls,
                meta.failed_calls,
                meta.total_cost,
                meta.started_at.to_rfc3339(),
                meta.updated_at.to_rfc3339(),
                completed_at,
                meta.error_message,
                metadata,
            ],
        )?;
    } else {
        conn.execute(
            "UPDATE batch_metadata SET status = ?1, processed_cities = ?2, successful_calls = ?3, \
             failed_calls = ?4, total_cost = ?5, updated_at = ?6, completed_at = ?7, \
             error_message = ?8, metadata = ?9 WHERE batch_id = ?10",
            params![
                meta.status.as_str(),
                meta.processed_cities,
                meta.successful_calls,
                meta.failed_calls,
                meta.total_cost,
                meta.updated_at.to_rfc3339(),
                completed_at,
                meta.error_message,
                metadata,
                meta.batch_id,
            ],
        )?;
    }
    Ok(())
}

#[async_trait]
impl PricingStore for SqliteStore {
    async fn get_hotel_pricing(
        &self,
        city_id: &str,
    ) -> Result<Option<CachedHotelPricing>, StoreError> {
        let city_id = city_id.to_string();
        self.with_conn(move |conn| {
            let raw = conn
                .query_row(
                    "SELECT city_id, p25, p50, p75, source, confidence, batch_id, created_at, \
                     updated_at \
                     FROM hotel_pricing_cache WHERE city_id = ?1",
                    params![city_id],
                    RawHotel::from_row,
                )
                .optional()?;
            raw.map(RawHotel::into_record).transpose()
        })
        .await
    }

    async fn get_daily_cost(&self, city_id: &str) -> Result<Option<CachedDailyCost>, StoreError> {
        let city_id = city_id.to_string();
        self.with_conn(move |conn| {
            let raw = conn
                .query_row(
                    "SELECT city_id, food, transport, misc, source, confidence, batch_id, \
                     created_at, updated_at \
                     FROM daily_cost_cache WHERE city_id = ?1",
                    params![city_id],
                    RawDaily::from_row,
                )
                .optional()?;
            raw.map(RawDaily::into_record).transpose()
        })
        .await
    }

    async fn upsert_hotel_pricing(&self, record: &CachedHotelPricing) -> Result<(), StoreError> {
        if !record.percentiles().is_ordered() {
            return Err(StoreError::Invariant(format!(
                "hotel pricing for {} violates p25 <= p50 <= p75 ({}, {}, {})",
                record.city_id, record.p25, record.p50, record.p75
            )));
        }
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO hotel_pricing_cache \
                 (city_id, p25, p50, p75, source, confidence, batch_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT(city_id) DO UPDATE SET \
                   p25 = excluded.p25, p50 = excluded.p50, p75 = excluded.p75, \
                   source = excluded.source, confidence = excluded.confidence, \
                   batch_id = excluded.batch_id, updated_at = excluded.updated_at",
                params![
                    record.city_id,
                    record.p25,
                    record.p50,
                    record.p75,
                    record.source.as_str(),
                    record.confidence.as_str(),
                    record.batch_id,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn upsert_daily_cost(&self, record: &CachedDailyCost) -> Result<(), StoreError> {
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO daily_cost_cache \
                 (city_id, food, transport, misc, source, confidence, batch_id, created_at, \
                 updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT(city_id) DO UPDATE SET \
                   food = excluded.food, transport = excluded.transport, misc = excluded.misc, \
                   source = excluded.source, confidence = excluded.confidence, \
                   batch_id = excluded.batch_id, updated_at = excluded.updated_at",
                params![
                    record.city_id,
                    record.food,
                    record.transport,
                    record.misc,
                    record.source.as_str(),
                    record.confidence.as_str(),
                    record.batch_id,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn create_batch(&self, meta: &BatchMetadata) -> Result<(), StoreError> {
        let meta = meta.clone();
        self.with_conn(move |conn| write_batch(conn, &meta, true)).await
    }

    async fn update_batch(&self, batch_id: &str, update: BatchUpdate) -> Result<(), StoreError> {
        let batch_id = batch_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut meta = load_batch(&tx, &batch_id)?
                .ok_or_else(|| StoreError::NotFound(format!("batch {batch_id}")))?;
            meta.apply(update)?;
            write_batch(&tx, &meta, false)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_batch(&self, batch_id: &str) -> Result<Option<BatchMetadata>, StoreError> {
        let batch_id = batch_id.to_string();
        self.with_conn(move |conn| load_batch(conn, &batch_id)).await
    }
}
