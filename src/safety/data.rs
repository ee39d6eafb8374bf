//! Reference safety tables shipped with the service.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};

use super::{CitySafetyRecord, SafetyData, SafetySignals};
use crate::catalog::Region;

fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn full(
    crime: f64,
    advisory: u8,
    road: f64,
    health: f64,
    updated: DateTime<Utc>,
) -> CitySafetyRecord {
    CitySafetyRecord {
        numbeo_score: Some(crime),
        advisory_level: Some(advisory),
        road_safety_index: Some(road),
        health_risk_level: Some(health),
        last_updated: updated,
    }
}

/// Built-in city signals and regional defaults.
pub fn builtin_safety_data() -> SafetyData {
    let regions = HashMap::from([
        (Region::Europe, signals(35.0, 1, 75.0, 15.0)),
        (Region::Asia, signals(45.0, 2, 60.0, 30.0)),
        (Region::NorthAmerica, signals(45.0, 1, 70.0, 15.0)),
        (Region::LatinAmerica, signals(60.0, 2, 55.0, 35.0)),
        (Region::Africa, signals(58.0, 3, 45.0, 50.0)),
        (Region::Oceania, signals(38.0, 1, 78.0, 15.0)),
        (Region::MiddleEast, signals(40.0, 3, 62.0, 25.0)),
    ]);

    let q1 = date(2025, 3, 31);
    let q2 = date(2025, 6, 30);
    let cities = HashMap::from([
        ("lisbon".to_string(), full(29.5, 1, 72.0, 12.0, q2)),
        ("barcelona".to_string(), full(49.0, 1, 78.0, 10.0, q2)),
        ("prague".to_string(), full(26.0, 1, 76.0, 12.0, q1)),
        ("paris".to_string(), full(57.5, 2, 79.0, 10.0, q2)),
        ("tokyo".to_string(), full(22.0, 1, 88.0, 8.0, q2)),
        ("seoul".to_string(), full(25.0, 1, 80.0, 10.0, q1)),
        ("bangkok".to_string(), full(38.0, 1, 45.0, 30.0, q2)),
        ("hanoi".to_string(), full(40.0, 1, 40.0, 32.0, q1)),
        ("mexico city".to_string(), full(67.0, 2, 55.0, 28.0, q2)),
        ("new york".to_string(), full(49.5, 1, 74.0, 12.0, q2)),
        ("vancouver".to_string(), full(45.0, 1, 82.0, 8.0, q1)),
        ("bogota".to_string(), full(72.0, 3, 50.0, 35.0, q2)),
        ("cape town".to_string(), full(81.0, 2, 40.0, 40.0, q2)),
        ("marrakech".to_string(), full(52.0, 2, 45.0, 30.0, q1)),
        ("sydney".to_string(), full(33.0, 1, 85.0, 6.0, q2)),
        ("dubai".to_string(), full(16.0, 2, 76.0, 12.0, q2)),
        (
            "istanbul".to_string(),
            CitySafetyRecord {
                numbeo_score: Some(47.0),
                advisory_level: Some(2),
                road_safety_index: None,
                health_risk_level: None,
                last_updated: q1,
            },
        ),
    ]);

    SafetyData {
        cities,
        regions,
        regional_as_of: date(2025, 1, 1),
    }
}

fn signals(crime: f64, advisory: u8, road: f64, health: f64) -> SafetySignals {
    SafetySignals {
        numbeo_score: crime,
        advisory_level: advisory,
        road_safety_index: road,
        health_risk_level: health,
    }
}
