//! Safety scoring - folds heterogeneous risk signals into one 0-100 score.
//!
//! # Algorithm
//! 1. Look up the city's signal record; missing signals (or a missing city)
//!    come from the regional defaults. Unknown regions use the Europe defaults.
//! 2. Normalize every signal to "higher is safer" on 0-100.
//! 3. Weighted sum: crime 40%, advisory 25%, road safety 15%, health 10%,
//!    plus a flat 10 point baseline.
//! 4. Multiply by a recency factor `clamp(1.1 - age_days/90 * 0.3, 0.8, 1.1)`.
//! 5. Round and clamp to 0..=100.
//!
//! The scorer is pure: the reference tables are injected at construction and
//! the current time is an argument.

mod data;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Region;

pub use data::builtin_safety_data;

const CRIME_WEIGHT: f64 = 0.40;
const ADVISORY_WEIGHT: f64 = 0.25;
const ROAD_WEIGHT: f64 = 0.15;
const HEALTH_WEIGHT: f64 = 0.10;
const BASELINE_POINTS: f64 = 10.0;

const SOURCE_CRIME: &str = "Numbeo Crime Index";
const SOURCE_ADVISORY: &str = "Travel Advisory";
const SOURCE_ROAD: &str = "Road Safety Index";
const SOURCE_HEALTH: &str = "Health Risk Index";
const SOURCE_REGIONAL: &str = "Regional Estimates";

/// A complete signal set (used for regional defaults).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetySignals {
    /// Numbeo-style crime index, 0-100, higher is more crime
    pub numbeo_score: f64,
    /// Government travel advisory level, 1-4
    pub advisory_level: u8,
    /// Road safety index, 0-100, higher is safer
    pub road_safety_index: f64,
    /// Health risk level, 0-100, higher is riskier
    pub health_risk_level: f64,
}

/// City-specific signals. Absent fields are filled from the regional defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitySafetyRecord {
    pub numbeo_score: Option<f64>,
    pub advisory_level: Option<u8>,
    pub road_safety_index: Option<f64>,
    pub health_risk_level: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

/// Reference tables the scorer works from.
#[derive(Debug, Clone)]
pub struct SafetyData {
    /// Keyed by lower-cased city name or city id
    pub cities: HashMap<String, CitySafetyRecord>,
    pub regions: HashMap<Region, SafetySignals>,
    /// Date the regional defaults were compiled
    pub regional_as_of: DateTime<Utc>,
}

/// Human-readable risk band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyLabel {
    #[serde(rename = "Low risk")]
    LowRisk,
    #[serde(rename = "Moderate")]
    Moderate,
    #[serde(rename = "Take care")]
    TakeCare,
}

impl SafetyLabel {
    /// Band thresholds: 80 and above is low risk, 60 and above is moderate.
    pub fn for_score(score: u8) -> Self {
        if score >= 80 {
            Self::LowRisk
        } else if score >= 60 {
            Self::Moderate
        } else {
            Self::TakeCare
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LowRisk => "Low risk",
            Self::Moderate => "Moderate",
            Self::TakeCare => "Take care",
        }
    }
}

/// Result of scoring one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyScore {
    pub score: u8,
    pub label: SafetyLabel,
    pub last_updated: DateTime<Utc>,
    pub sources: Vec<String>,
}

/// Stateless scoring engine over injected reference data.
#[derive(Debug, Clone)]
pub struct SafetyScorer {
    data: SafetyData,
}

impl SafetyScorer {
    pub fn new(data: SafetyData) -> Self {
        Self { data }
    }

    /// Scorer over the tables shipped with the service.
    pub fn builtin() -> Self {
        Self::new(builtin_safety_data())
    }

    /// Regional defaults, falling back to Europe for unknown regions.
    fn regional_defaults(&self, region: &str) -> SafetySignals {
        let region = Region::parse(region).unwrap_or(Region::Europe);
        self.data
            .regions
            .get(&region)
            .or_else(|| self.data.regions.get(&Region::Europe))
            .copied()
            .unwrap_or(FALLBACK_SIGNALS)
    }

    /// Compute the safety score for a city.
    ///
    /// Deterministic for a fixed `city_key`, `region` and `now`.
    pub fn compute(&self, city_key: &str, region: &str, now: DateTime<Utc>) -> SafetyScore {
        let defaults = self.regional_defaults(region);
        let record = self.data.cities.get(&city_key.trim().to_lowercase());

        let mut sources = Vec::new();
        let (signals, last_updated) = match record {
            Some(record) => {
                let mut pick = |value: Option<f64>, default: f64, source: &str| match value {
                    Some(v) => {
                        sources.push(source.to_string());
                        v
                    }
                    None => default,
                };
                let numbeo_score = pick(record.numbeo_score, defaults.numbeo_score, SOURCE_CRIME);
                let advisory_level = pick(
                    record.advisory_level.map(f64::from),
                    f64::from(defaults.advisory_level),
                    SOURCE_ADVISORY,
                );
                let road_safety_index = pick(
                    record.road_safety_index,
                    defaults.road_safety_index,
                    SOURCE_ROAD,
                );
                let health_risk_level = pick(
                    record.health_risk_level,
                    defaults.health_risk_level,
                    SOURCE_HEALTH,
                );
                (
                    (numbeo_score, advisory_level, road_safety_index, health_risk_level),
                    record.last_updated,
                )
            }
            None => (
                (
                    defaults.numbeo_score,
                    f64::from(defaults.advisory_level),
                    defaults.road_safety_index,
                    defaults.health_risk_level,
                ),
                self.data.regional_as_of,
            ),
        };

        if sources.is_empty() {
            sources.push(SOURCE_REGIONAL.to_string());
        }

        let (crime, advisory, road, health) = signals;
        let weighted = weighted_score(crime, advisory, road, health);
        let age_days = (now - last_updated).num_days() as f64;
        let score = (weighted * recency_multiplier(age_days)).clamp(0.0, 100.0).round() as u8;

        SafetyScore {
            score,
            label: SafetyLabel::for_score(score),
            last_updated,
            sources,
        }
    }
}

/// Used only if the injected tables lack even the Europe defaults.
const FALLBACK_SIGNALS: SafetySignals = SafetySignals {
    numbeo_score: 40.0,
    advisory_level: 1,
    road_safety_index: 70.0,
    health_risk_level: 20.0,
};

/// Weighted "higher is safer" score before the recency adjustment.
fn weighted_score(
    crime_index: f64,
    advisory_level: f64,
    road_safety: f64,
    health_risk: f64,
) -> f64 {
    let crime = (100.0 - crime_index).clamp(0.0, 100.0);
    let advisory = (100.0 - (advisory_level.clamp(1.0, 4.0) - 1.0) * 33.33).clamp(0.0, 100.0);
    let road = road_safety.clamp(0.0, 100.0);
    let health = (100.0 - health_risk).clamp(0.0, 100.0);

    crime * CRIME_WEIGHT
        + advisory * ADVISORY_WEIGHT
        + road * ROAD_WEIGHT
        + health * HEALTH_WEIGHT
        + BASELINE_POINTS
}

/// Fresh data is boosted up to 1.1x; data older than 90 days is damped to 0.8x.
fn recency_multiplier(age_days: f64) -> f64 {
    (1.1 - (age_days / 90.0) * 0.3).clamp(0.8, 1.1)
}
