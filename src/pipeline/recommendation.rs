//! The per-destination result produced by the aggregation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Region;
use crate::pricing::{Confidence, DailyCosts, HotelPercentiles};
use crate::safety::SafetyScore;

/// Weight of p50 in the p35 blend; 0.4 keeps p35 closer to the budget end.
pub const P35_WEIGHT: f64 = 0.4;

/// Where the flight price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightSource {
    Live,
    Estimate,
}

impl FlightSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Estimate => "estimate",
        }
    }
}

/// Where a hotel or daily-cost figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostSource {
    Cache,
    Live,
    Fallback,
}

impl CostSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Live => "live",
            Self::Fallback => "fallback",
        }
    }
}

/// Trip cost percentile bands in whole USD.
///
/// # Invariant
/// `p25 <= p35 <= p50 <= p75`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostTotals {
    pub p25: f64,
    pub p35: f64,
    pub p50: f64,
    pub p75: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightBreakdown {
    /// Round-trip fare in USD
    pub price: f64,
    pub source: FlightSource,
}

/// Nightly hotel rates, including the interpolated p35 band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelBreakdown {
    pub p25: f64,
    pub p35: f64,
    pub p50: f64,
    pub p75: f64,
    pub source: CostSource,
}

impl HotelBreakdown {
    pub fn new(prices: HotelPercentiles, source: CostSource) -> Self {
        Self {
            p25: prices.p25,
            p35: interpolate_p35(prices.p25, prices.p50),
            p50: prices.p50,
            p75: prices.p75,
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBreakdown {
    pub food: f64,
    pub transport: f64,
    pub misc: f64,
    pub total: f64,
    pub source: CostSource,
}

impl DailyBreakdown {
    pub fn new(costs: DailyCosts, source: CostSource) -> Self {
        Self {
            food: costs.food,
            transport: costs.transport,
            misc: costs.misc,
            total: costs.total(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub flight: FlightBreakdown,
    pub hotel: HotelBreakdown,
    pub daily: DailyBreakdown,
}

/// Priced destination. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityRecommendation {
    pub city_id: String,
    pub name: String,
    pub country: String,
    pub region: Region,
    pub nights: u32,
    pub totals: CostTotals,
    pub breakdown: CostBreakdown,
    pub confidence: Confidence,
    pub safety: SafetyScore,
    /// True when the flight was estimated or any component fell back
    pub is_estimate: bool,
    #[serde(rename = "lastUpdatedISO")]
    pub last_updated_iso: DateTime<Utc>,
}

impl CityRecommendation {
    /// Distinct source tags used by this recommendation, flight first.
    pub fn source_tags(&self) -> [&'static str; 3] {
        [
            self.breakdown.flight.source.as_str(),
            self.breakdown.hotel.source.as_str(),
            self.breakdown.daily.source.as_str(),
        ]
    }
}

/// Linear blend between p25 and p50.
pub fn interpolate_p35(p25: f64, p50: f64) -> f64 {
    p25 + P35_WEIGHT * (p50 - p25)
}

/// Total trip cost per band: flight plus nights of lodging and daily spend.
pub fn compute_totals(
    flight: f64,
    hotel: &HotelBreakdown,
    daily_total: f64,
    nights: u32,
) -> CostTotals {
    let nights = f64::from(nights);
    let band = |nightly: f64| (flight + nights * nightly + nights * daily_total).round();
    CostTotals {
        p25: band(hotel.p25),
        p35: band(hotel.p35),
        p50: band(hotel.p50),
        p75: band(hotel.p75),
    }
}
