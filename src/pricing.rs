//! Pricing value types shared by the providers, the cache and the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Nightly hotel price used when neither the cache nor the provider answers.
pub const FALLBACK_HOTEL: HotelPercentiles = HotelPercentiles {
    p25: 45.0,
    p50: 75.0,
    p75: 120.0,
};

/// Daily spend used when neither the cache nor the provider answers.
pub const FALLBACK_DAILY: DailyCosts = DailyCosts {
    food: 25.0,
    transport: 10.0,
    misc: 15.0,
};

/// Nightly hotel price percentiles in USD.
///
/// # Invariant
/// `p25 <= p50 <= p75` for every value that reaches the cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HotelPercentiles {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
}

impl HotelPercentiles {
    /// Sort the three values so the ordering invariant holds.
    pub fn normalized(self) -> Self {
        let mut values = [self.p25, self.p50, self.p75];
        values.sort_by(|a, b| a.total_cmp(b));
        Self {
            p25: values[0],
            p50: values[1],
            p75: values[2],
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.p25 <= self.p50 && self.p50 <= self.p75
    }

    pub fn is_valid(&self) -> bool {
        [self.p25, self.p50, self.p75]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
            && self.is_ordered()
    }
}

/// Per-day spend breakdown in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyCosts {
    pub food: f64,
    pub transport: f64,
    pub misc: f64,
}

impl DailyCosts {
    pub fn total(&self) -> f64 {
        self.food + self.transport + self.misc
    }

    pub fn is_valid(&self) -> bool {
        [self.food, self.transport, self.misc]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
            && self.total() > 0.0
    }
}

/// Where a cached row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingSource {
    Provider,
    Fallback,
}

impl PricingSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Fallback => "fallback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provider" => Some(Self::Provider),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

/// Confidence in a price. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
