//! Pricing cache store - durable per-city pricing rows and batch bookkeeping.
//!
//! # Contract
//! - One hotel row and one daily-cost row per city; upserts replace the row
//!   (last write wins across batches, idempotent within one batch).
//! - Hotel rows always satisfy `p25 <= p50 <= p75`; violating rows are rejected.
//! - Batch metadata is terminal once its status leaves `running`.

mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pricing::{Confidence, DailyCosts, HotelPercentiles, PricingSource};

pub use sqlite::SqliteStore;

/// Errors raised by a [`PricingStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Blocking task failed: {0}")]
    Join(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Batch {0} is no longer running")]
    BatchTerminal(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Cached nightly hotel pricing for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedHotelPricing {
    pub city_id: String,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub source: PricingSource,
    pub confidence: Confidence,
    pub batch_id: String,
    /// First time this city was cached; kept across upserts.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CachedHotelPricing {
    pub fn new(
        city_id: impl Into<String>,
        prices: HotelPercentiles,
        source: PricingSource,
        confidence: Confidence,
        batch_id: impl Into<String>,
    ) -> Self {
        let prices = prices.normalized();
        let now = Utc::now();
        Self {
            city_id: city_id.into(),
            p25: prices.p25,
            p50: prices.p50,
            p75: prices.p75,
            source,
            confidence,
            batch_id: batch_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn percentiles(&self) -> HotelPercentiles {
        HotelPercentiles {
            p25: self.p25,
            p50: self.p50,
            p75: self.p75,
        }
    }
}

/// Cached daily spend estimate for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedDailyCost {
    pub city_id: String,
    pub food: f64,
    pub transport: f64,
    pub misc: f64,
    pub source: PricingSource,
    pub confidence: Confidence,
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CachedDailyCost {
    pub fn new(
        city_id: impl Into<String>,
        costs: DailyCosts,
        source: PricingSource,
        confidence: Confidence,
        batch_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            city_id: city_id.into(),
            food: costs.food,
            transport: costs.transport,
            misc: costs.misc,
            source,
            confidence,
            batch_id: batch_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn costs(&self) -> DailyCosts {
        DailyCosts {
            food: self.food,
            transport: self.transport,
            misc: self.misc,
        }
    }
}

/// Lifecycle of a cache warming batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Running,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Bookkeeping for one cache warming run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetadata {
    pub batch_id: String,
    pub status: BatchStatus,
    pub total_cities: u32,
    pub processed_cities: u32,
    pub successful_calls: u32,
    pub failed_calls: u32,
    /// USD spent on provider calls; never decreases
    pub total_cost: f64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
}

impl BatchMetadata {
    /// A fresh `running` batch.
    pub fn start(
        batch_id: impl Into<String>,
        total_cities: u32,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            batch_id: batch_id.into(),
            status: BatchStatus::Running,
            total_cities,
            processed_cities: 0,
            successful_calls: 0,
            failed_calls: 0,
            total_cost: 0.0,
            started_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
            metadata,
        }
    }

    /// Apply a partial update.
    ///
    /// Fails if the batch is already terminal or the update would move the
    /// cost backwards. Metadata objects are merged key by key.
    pub fn apply(&mut self, update: BatchUpdate) -> Result<(), StoreError> {
        if self.status != BatchStatus::Running {
            return Err(StoreError::BatchTerminal(self.batch_id.clone()));
        }
        if let Some(cost) = update.total_cost {
            if cost < self.total_cost {
                return Err(StoreError::Invariant(format!(
                    "totalCost for {} would decrease from {} to {}",
                    self.batch_id, self.total_cost, cost
                )));
            }
            self.total_cost = cost;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(n) = update.processed_cities {
            self.processed_cities = n;
        }
        if let Some(n) = update.successful_calls {
            self.successful_calls = n;
        }
        if let Some(n) = update.failed_calls {
            self.failed_calls = n;
        }
        if let Some(at) = update.completed_at {
            self.completed_at = Some(at);
        }
        if let Some(message) = update.error_message {
            self.error_message = Some(message);
        }
        if let Some(extra) = update.metadata {
            merge_json(&mut self.metadata, extra);
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn merge_json(target: &mut serde_json::Value, extra: serde_json::Value) {
    match (target, extra) {
        (serde_json::Value::Object(base), serde_json::Value::Object(more)) => {
            for (k, v) in more {
                base.insert(k, v);
            }
        }
        (target, extra) => *target = extra,
    }
}

/// Partial update for [`BatchMetadata`]; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchUpdate {
    pub status: Option<BatchStatus>,
    pub processed_cities: Option<u32>,
    pub successful_calls: Option<u32>,
    pub failed_calls: Option<u32>,
    pub total_cost: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Persistence capability the engine needs: point lookups, per-row upserts,
/// and batch bookkeeping.
#[async_trait]
pub trait PricingStore: Send + Sync {
    async fn get_hotel_pricing(
        &self,
        city_id: &str,
    ) -> Result<Option<CachedHotelPricing>, StoreError>;

    async fn get_daily_cost(&self, city_id: &str)
        -> Result<Option<CachedDailyCost>, StoreError>;

    async fn upsert_hotel_pricing(&self, record: &CachedHotelPricing) -> Result<(), StoreError>;

    async fn upsert_daily_cost(&self, record: &CachedDailyCost) -> Result<(), StoreError>;

    async fn create_batch(&self, meta: &BatchMetadata) -> Result<(), StoreError>;

    async fn update_batch(&self, batch_id: &str, update: BatchUpdate) -> Result<(), StoreError>;

    async fn get_batch(&self, batch_id: &str) -> Result<Option<BatchMetadata>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_merges_metadata_and_counters() {
        let mut meta = BatchMetadata::start("batch_1_abc", 10, json!({"groupSize": 5}));
        meta.apply(BatchUpdate {
            processed_cities: Some(5),
            successful_calls: Some(9),
            failed_calls: Some(1),
            total_cost: Some(0.25),
            metadata: Some(json!({"model": "m"})),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(meta.processed_cities, 5);
        assert_eq!(meta.metadata, json!({"groupSize": 5, "model": "m"}));
    }

    #[test]
    fn test_apply_rejects_cost_regression() {
        let mut meta = BatchMetadata::start("b", 1, json!({}));
        meta.apply(BatchUpdate {
            total_cost: Some(1.0),
            ..Default::default()
        })
        .unwrap();
        let err = meta
            .apply(BatchUpdate {
                total_cost: Some(0.5),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));
    }

    #[test]
    fn test_terminal_batch_rejects_updates() {
        let mut meta = BatchMetadata::start("b", 1, json!({}));
        meta.apply(BatchUpdate {
            status: Some(BatchStatus::Completed),
            ..Default::default()
        })
        .unwrap();
        let err = meta.apply(BatchUpdate::default()).unwrap_err();
        assert!(matches!(err, StoreError::BatchTerminal(_)));
    }

    #[test]
    fn test_hotel_row_is_normalized_on_construction() {
        let row = CachedHotelPricing::new(
            "LIS",
            HotelPercentiles {
                p25: 90.0,
                p50: 70.0,
                p75: 150.0,
            },
            PricingSource::Provider,
            Confidence::Medium,
            "batch_x",
        );
        assert!(row.percentiles().is_ordered());
        assert_eq!(row.p25, 70.0);
    }
}
