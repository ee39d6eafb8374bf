//! Per-country rollups of a result list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::Region;
use crate::pipeline::CityRecommendation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountrySummary {
    pub country: String,
    pub region: Region,
    pub city_count: usize,
    /// Cheapest p50 trip total in the country
    pub min_total: f64,
    /// Mean p50 trip total, whole dollars
    pub avg_total: f64,
    pub cities: Vec<String>,
}

/// Group results by country, cheapest country first.
pub fn summarize_countries(results: &[CityRecommendation]) -> Vec<CountrySummary> {
    let mut groups: BTreeMap<&str, Vec<&CityRecommendation>> = BTreeMap::new();
    for rec in results {
        groups.entry(rec.country.as_str()).or_default().push(rec);
    }

    let mut summaries: Vec<CountrySummary> = groups
        .into_iter()
        .map(|(country, recs)| {
            let totals: Vec<f64> = recs.iter().map(|r| r.totals.p50).collect();
            let min_total = totals.iter().copied().fold(f64::INFINITY, f64::min);
            let avg_total = (totals.iter().sum::<f64>() / totals.len() as f64).round();
            CountrySummary {
                country: country.to_string(),
                region: recs[0].region,
                city_count: recs.len(),
                min_total,
                avg_total,
                cities: recs.iter().map(|r| r.name.clone()).collect(),
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        a.min_total
            .total_cmp(&b.min_total)
            .then_with(|| a.country.cmp(&b.country))
    });
    summaries
}
