//! Aggregation pipeline - prices one destination for one trip.
//!
//! Flight, hotel and daily-cost lookups run concurrently. Every lookup has a
//! documented substitute, so [`CostPipeline::recommend`] never fails: a
//! degraded destination comes back with `confidence: low` and
//! `isEstimate: true` instead of an error.

mod recommendation;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::catalog::Destination;
use crate::pricing::{
    Confidence, DailyCosts, HotelPercentiles, PricingSource, FALLBACK_DAILY, FALLBACK_HOTEL,
};
use crate::providers::{
    synthetic_flight_estimate, with_timeout, CostEstimator, FlightFareProvider,
};
use crate::safety::SafetyScorer;
use crate::store::{CachedDailyCost, CachedHotelPricing, PricingStore};

pub use recommendation::{
    compute_totals, interpolate_p35, CityRecommendation, CostBreakdown, CostSource, CostTotals,
    DailyBreakdown, FlightBreakdown, FlightSource, HotelBreakdown, P35_WEIGHT,
};

/// Source of "now" for safety recency and timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Trip parameters that affect cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripParams {
    /// Three-letter origin airport, upper-cased
    pub origin: String,
    pub nights: u32,
    pub month: Option<u32>,
}

/// One resolved component with its provenance.
#[derive(Debug, Clone, Copy)]
struct Resolved<T, S> {
    value: T,
    source: S,
    confidence: Confidence,
    as_of: DateTime<Utc>,
    /// The lookup failed and a substitute was used.
    fell_back: bool,
}

/// Orchestrates the lookups for a destination.
pub struct CostPipeline {
    store: Arc<dyn PricingStore>,
    flights: Arc<dyn FlightFareProvider>,
    estimator: Arc<dyn CostEstimator>,
    scorer: Arc<SafetyScorer>,
    call_timeout: Duration,
    clock: Clock,
}

impl CostPipeline {
    pub fn new(
        store: Arc<dyn PricingStore>,
        flights: Arc<dyn FlightFareProvider>,
        estimator: Arc<dyn CostEstimator>,
        scorer: Arc<SafetyScorer>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            flights,
            estimator,
            scorer,
            call_timeout,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, for deterministic safety scores in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Price one destination. Live lookups are written through to the cache
    /// tagged with `correlation_id`.
    pub async fn recommend(
        &self,
        destination: &Destination,
        trip: &TripParams,
        correlation_id: &str,
    ) -> CityRecommendation {
        let (flight, hotel, daily) = tokio::join!(
            self.resolve_flight(destination, trip),
            self.resolve_hotel(destination, correlation_id),
            self.resolve_daily(destination, correlation_id),
        );

        let now = self.now();
        let safety = self
            .scorer
            .compute(&destination.name, destination.region.as_str(), now);

        let fell_back = flight.fell_back || hotel.fell_back || daily.fell_back;
        let confidence = if fell_back {
            Confidence::Low
        } else {
            flight.confidence.min(hotel.confidence).min(daily.confidence)
        };
        let is_estimate = fell_back || flight.source == FlightSource::Estimate;

        let hotel_breakdown = HotelBreakdown::new(hotel.value, hotel.source);
        let daily_breakdown = DailyBreakdown::new(daily.value, daily.source);
        let totals = compute_totals(
            flight.value,
            &hotel_breakdown,
            daily_breakdown.total,
            trip.nights,
        );

        tracing::debug!(
            city_id = %destination.id,
            correlation_id = %correlation_id,
            p50 = totals.p50,
            confidence = %confidence,
            "Priced destination"
        );

        CityRecommendation {
            city_id: destination.id.clone(),
            name: destination.name.clone(),
            country: destination.country.clone(),
            region: destination.region,
            nights: trip.nights,
            totals,
            breakdown: CostBreakdown {
                flight: FlightBreakdown {
                    price: flight.value,
                    source: flight.source,
                },
                hotel: hotel_breakdown,
                daily: daily_breakdown,
            },
            confidence,
            safety,
            is_estimate,
            last_updated_iso: hotel.as_of.min(daily.as_of),
        }
    }

    async fn resolve_flight(
        &self,
        destination: &Destination,
        trip: &TripParams,
    ) -> Resolved<f64, FlightSource> {
        let call = self
            .flights
            .fetch_flight_fare(&trip.origin, &destination.id, trip.month);
        match with_timeout(self.call_timeout, call).await {
            Ok(fare) if !fare.is_estimate => Resolved {
                value: fare.price.round(),
                source: FlightSource::Live,
                confidence: Confidence::High,
                as_of: self.now(),
                fell_back: false,
            },
            // The provider answered but flagged its own fare as estimated.
            Ok(fare) => Resolved {
                value: fare.price.round(),
                source: FlightSource::Estimate,
                confidence: Confidence::Medium,
                as_of: self.now(),
                fell_back: false,
            },
            Err(e) => {
                tracing::debug!(
                    city_id = %destination.id,
                    origin = %trip.origin,
                    error = %e,
                    "Flight fare unavailable; using distance estimate"
                );
                Resolved {
                    value: synthetic_flight_estimate(&trip.origin, destination, trip.month),
                    source: FlightSource::Estimate,
                    confidence: Confidence::Low,
                    as_of: self.now(),
                    fell_back: true,
                }
            }
        }
    }

    async fn resolve_hotel(
        &self,
        destination: &Destination,
        correlation_id: &str,
    ) -> Resolved<HotelPercentiles, CostSource> {
        // Cached fallback rows carry no real data; try the provider instead.
        match self.store.get_hotel_pricing(&destination.id).await {
            Ok(Some(row))
                if row.source == PricingSource::Provider && row.percentiles().is_valid() =>
            {
                return Resolved {
                    value: row.percentiles(),
                    source: CostSource::Cache,
                    confidence: row.confidence,
                    as_of: row.updated_at,
                    fell_back: false,
                };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(city_id = %destination.id, error = %e, "Hotel cache lookup failed");
            }
        }

        let call = self
            .estimator
            .fetch_hotel_pricing(&destination.name, &destination.country);
        match with_timeout(self.call_timeout, call).await {
            Ok(priced) => {
                let row = CachedHotelPricing::new(
                    &destination.id,
                    priced.value,
                    PricingSource::Provider,
                    Confidence::Medium,
                    correlation_id,
                );
                if let Err(e) = self.store.upsert_hotel_pricing(&row).await {
                    tracing::warn!(
                        city_id = %destination.id,
                        error = %e,
                        "Failed to cache hotel pricing"
                    );
                }
                Resolved {
                    value: row.percentiles(),
                    source: CostSource::Live,
                    confidence: Confidence::Medium,
                    as_of: row.updated_at,
                    fell_back: false,
                }
            }
            Err(e) => {
                tracing::warn!(
                    city_id = %destination.id,
                    error = %e,
                    fallback = ?FALLBACK_HOTEL,
                    "Hotel pricing unavailable; using fallback"
                );
                Resolved {
                    value: FALLBACK_HOTEL,
                    source: CostSource::Fallback,
                    confidence: Confidence::Low,
                    as_of: self.now(),
                    fell_back: true,
                }
            }
        }
    }

    async fn resolve_daily(
        &self,
        destination: &Destination,
        correlation_id: &str,
    ) -> Resolved<DailyCosts, CostSource> {
        match self.store.get_daily_cost(&destination.id).await {
            Ok(Some(row))
                if row.source == PricingSource::Provider && row.costs().is_valid() =>
            {
                return Resolved {
                    value: row.costs(),
                    source: CostSource::Cache,
                    confidence: row.confidence,
                    as_of: row.updated_at,
                    fell_back: false,
                };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    city_id = %destination.id,
                    error = %e,
                    "Daily cost cache lookup failed"
                );
            }
        }

        let call = self
            .estimator
            .fetch_daily_costs(&destination.name, &destination.country);
        match with_timeout(self.call_timeout, call).await {
            Ok(priced) => {
                let row = CachedDailyCost::new(
                    &destination.id,
                    priced.value,
                    PricingSource::Provider,
                    Confidence::Medium,
                    correlation_id,
                );
                if let Err(e) = self.store.upsert_daily_cost(&row).await {
                    tracing::warn!(
                        city_id = %destination.id,
                        error = %e,
                        "Failed to cache daily costs"
                    );
                }
                Resolved {
                    value: priced.value,
                    source: CostSource::Live,
                    confidence: Confidence::Medium,
                    as_of: row.updated_at,
                    fell_back: false,
                }
            }
            Err(e) => {
                tracing::warn!(
                    city_id = %destination.id,
                    error = %e,
                    fallback = ?FALLBACK_DAILY,
                    "Daily costs unavailable; using fallback"
                );
                Resolved {
                    value: FALLBACK_DAILY,
                    source: CostSource::Fallback,
                    confidence: Confidence::Low,
                    as_of: self.now(),
                    fell_back: true,
                }
            }
        }
    }
}
