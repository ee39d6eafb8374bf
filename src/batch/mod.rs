//! Batch populator - warms the pricing cache for the whole catalog.
//!
//! Cities are processed in fixed-size groups. Inside a group every city runs
//! concurrently and a failing city never cancels its siblings; between groups
//! (and between a city's two calls) the populator sleeps to stay under the
//! provider's rate limits.
//!
//! Every city ends a successful batch with exactly one hotel row and one
//! daily-cost row: provider failures are replaced by fallback rows tagged
//! `fallback`/`low`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use rand::Rng;
use serde_json::json;
use thiserror::Error;

use crate::catalog::{Destination, DestinationCatalog};
use crate::config::BatchSettings;
use crate::pricing::{Confidence, PricingSource, FALLBACK_DAILY, FALLBACK_HOTEL};
use crate::providers::{with_timeout, CostEstimator};
use crate::store::{
    BatchMetadata, BatchStatus, BatchUpdate, CachedDailyCost, CachedHotelPricing, PricingStore,
    StoreError,
};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Errors that abort a batch run.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Destination catalog unavailable: {0}")]
    Catalog(anyhow::Error),

    #[error("Pricing store error: {0}")]
    Store(#[from] StoreError),

    #[error("City {city_id} aborted: {message}")]
    CityAborted { city_id: String, message: String },

    #[error("Batch {batch_id} failed: {message}")]
    Failed { batch_id: String, message: String },
}

/// Summary of a finished batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub batch_id: String,
    pub total_cities: u32,
    pub processed_cities: u32,
    pub successful_calls: u32,
    pub failed_calls: u32,
    pub total_cost: f64,
    pub duration: Duration,
}

/// Counters accumulated across groups.
#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    processed: u32,
    successes: u32,
    failures: u32,
    cost: f64,
}

/// Per-city outcome; provider failures are already folded into `failures`.
#[derive(Debug, Clone, Copy, Default)]
struct CityOutcome {
    successes: u32,
    failures: u32,
    cost: f64,
}

/// Generate `batch_<epochMillis>_<9 base36 chars>`.
pub fn generate_batch_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("batch_{}_{}", Utc::now().timestamp_millis(), suffix)
}

pub struct BatchPopulator {
    store: Arc<dyn PricingStore>,
    estimator: Arc<dyn CostEstimator>,
    settings: BatchSettings,
    model: String,
    call_timeout: Duration,
}

impl BatchPopulator {
    pub fn new(
        store: Arc<dyn PricingStore>,
        estimator: Arc<dyn CostEstimator>,
        settings: BatchSettings,
        model: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            estimator,
            settings,
            model: model.into(),
            call_timeout,
        }
    }

    /// Populate the cache for every destination in `catalog`.
    ///
    /// Any failure after the batch row exists marks it `failed` and stops the
    /// run; a rerun starts over under a fresh batch id.
    pub async fn run(&self, catalog: &dyn DestinationCatalog) -> Result<BatchReport, BatchError> {
        let destinations = catalog.destinations().map_err(BatchError::Catalog)?;
        let batch_id = generate_batch_id();
        let group_size = self.settings.group_size.max(1);
        let started = Instant::now();

        let meta = BatchMetadata::start(
            &batch_id,
            destinations.len() as u32,
            json!({ "groupSize": group_size, "model": self.model }),
        );
        self.store.create_batch(&meta).await?;

        tracing::info!(
            batch_id = %batch_id,
            total_cities = destinations.len(),
            group_size,
            model = %self.model,
            "Batch started"
        );

        let outcome = match self.process_groups(&batch_id, &destinations, group_size).await {
            Ok(tally) => self
                .mark_completed(&batch_id, started.elapsed())
                .await
                .map(|()| tally),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(tally) => {
                let duration = started.elapsed();
                tracing::info!(
                    batch_id = %batch_id,
                    processed = tally.processed,
                    successful_calls = tally.successes,
                    failed_calls = tally.failures,
                    total_cost = tally.cost,
                    duration_ms = duration.as_millis() as u64,
                    "Batch completed"
                );

                Ok(BatchReport {
                    batch_id,
                    total_cities: destinations.len() as u32,
                    processed_cities: tally.processed,
                    successful_calls: tally.successes,
                    failed_calls: tally.failures,
                    total_cost: tally.cost,
                    duration,
                })
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(batch_id = %batch_id, error = %message, "Batch failed");
                self.mark_failed(&batch_id, &message).await;
                Err(BatchError::Failed { batch_id, message })
            }
        }
    }

    async fn mark_completed(&self, batch_id: &str, duration: Duration) -> Result<(), BatchError> {
        self.store
            .update_batch(
                batch_id,
                BatchUpdate {
                    status: Some(BatchStatus::Completed),
                    completed_at: Some(Utc::now()),
                    metadata: Some(json!({ "durationMs": duration.as_millis() as u64 })),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, batch_id: &str, message: &str) {
        let marked = self
            .store
            .update_batch(
                batch_id,
                BatchUpdate {
                    status: Some(BatchStatus::Failed),
                    completed_at: Some(Utc::now()),
                    error_message: Some(message.to_string()),
                    ..Default::default()
                },
            )
            .await;
        if let Err(e) = marked {
            tracing::error!(
                batch_id = %batch_id,
                error = %e,
                "Could not mark batch as failed"
            );
        }
    }

    async fn process_groups(
        &self,
        batch_id: &str,
        destinations: &[Destination],
        group_size: usize,
    ) -> Result<Tally, BatchError> {
        let worker = CityWorker {
            store: Arc::clone(&self.store),
            estimator: Arc::clone(&self.estimator),
            call_delay: self.settings.call_delay,
            call_timeout: self.call_timeout,
            batch_id: Arc::from(batch_id),
        };
        let mut tally = Tally::default();
        let groups = destinations.chunks(group_size);
        let group_count = groups.len();

        for (index, group) in groups.enumerate() {
            let handles = group.iter().map(|destination| {
                let city_id = destination.id.clone();
                let task = tokio::spawn(worker.clone().process(destination.clone()));
                async move { (city_id, task.await) }
            });
            let outcomes = join_all(handles).await;

            // Let the whole group settle before surfacing its first error.
            let mut first_error = None;
            for (city_id, joined) in outcomes {
                match joined {
                    Ok(Ok(city)) => {
                        tally.processed += 1;
                        tally.successes += city.successes;
                        tally.failures += city.failures;
                        tally.cost += city.cost;
                    }
                    Ok(Err(e)) => {
                        first_error.get_or_insert(BatchError::Store(e));
                    }
                    Err(e) => {
                        tracing::error!(
                            batch_id = %batch_id,
                            city_id = %city_id,
                            error = %e,
                            "City task did not finish"
                        );
                        first_error.get_or_insert(BatchError::CityAborted {
                            city_id,
                            message: e.to_string(),
                        });
                    }
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }

            self.store
                .update_batch(
                    batch_id,
                    BatchUpdate {
                        processed_cities: Some(tally.processed),
                        successful_calls: Some(tally.successes),
                        failed_calls: Some(tally.failures),
                        total_cost: Some(tally.cost),
                        ..Default::default()
                    },
                )
                .await?;

            tracing::info!(
                batch_id = %batch_id,
                group = index + 1,
                groups = group_count,
                processed = tally.processed,
                failed_calls = tally.failures,
                "Batch group finished"
            );

            if index + 1 < group_count && !self.settings.group_delay.is_zero() {
                tokio::time::sleep(self.settings.group_delay).await;
            }
        }

        Ok(tally)
    }
}

/// Owned handles for pricing one city on its own task.
#[derive(Clone)]
struct CityWorker {
    store: Arc<dyn PricingStore>,
    estimator: Arc<dyn CostEstimator>,
    call_delay: Duration,
    call_timeout: Duration,
    batch_id: Arc<str>,
}

impl CityWorker {
    /// Fetch and store both rows for one city. Only store errors escape.
    async fn process(self, destination: Destination) -> Result<CityOutcome, StoreError> {
        let batch_id: &str = &self.batch_id;
        let mut outcome = CityOutcome::default();

        let hotel_call = self
            .estimator
            .fetch_hotel_pricing(&destination.name, &destination.country);
        let hotel_row = match with_timeout(self.call_timeout, hotel_call).await {
            Ok(priced) => {
                outcome.successes += 1;
                outcome.cost += priced.cost_usd;
                CachedHotelPricing::new(
                    &destination.id,
                    priced.value,
                    PricingSource::Provider,
                    Confidence::Medium,
                    batch_id,
                )
            }
            Err(e) => {
                outcome.failures += 1;
                tracing::warn!(
                    batch_id = %batch_id,
                    city_id = %destination.id,
                    error = %e,
                    "Hotel pricing failed; storing fallback row"
                );
                CachedHotelPricing::new(
                    &destination.id,
                    FALLBACK_HOTEL,
                    PricingSource::Fallback,
                    Confidence::Low,
                    batch_id,
                )
            }
        };
        self.store.upsert_hotel_pricing(&hotel_row).await?;

        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }

        let daily_call = self
            .estimator
            .fetch_daily_costs(&destination.name, &destination.country);
        let daily_row = match with_timeout(self.call_timeout, daily_call).await {
            Ok(priced) => {
                outcome.successes += 1;
                outcome.cost += priced.cost_usd;
                CachedDailyCost::new(
                    &destination.id,
                    priced.value,
                    PricingSource::Provider,
                    Confidence::Medium,
                    batch_id,
                )
            }
            Err(e) => {
                outcome.failures += 1;
                tracing::warn!(
                    batch_id = %batch_id,
                    city_id = %destination.id,
                    error = %e,
                    "Daily costs failed; storing fallback row"
                );
                CachedDailyCost::new(
                    &destination.id,
                    FALLBACK_DAILY,
                    PricingSource::Fallback,
                    Confidence::Low,
                    batch_id,
                )
            }
        };
        self.store.upsert_daily_cost(&daily_row).await?;

        Ok(outcome)
    }
}
