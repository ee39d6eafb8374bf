//! Synchronous (non-progressive) recommendation queries.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use uuid::Uuid;

use super::{summarize_countries, CountrySummary, SearchParams};
use crate::catalog::DestinationCatalog;
use crate::pipeline::{CityRecommendation, CostPipeline};

pub const DISCLAIMER: &str = "Prices are estimates blended from live providers, cached AI estimates \
     and static fallbacks. Check each result's source tags and confidence before booking.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecsMeta {
    pub source: Vec<String>,
    pub disclaimer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecsResponse {
    pub query: SearchParams,
    pub results: Vec<CityRecommendation>,
    pub countries: Vec<CountrySummary>,
    pub pagination: Pagination,
    pub meta: RecsMeta,
}

/// Evaluates every candidate up front, then pages through the sorted list.
pub struct RecommendationService {
    catalog: Arc<dyn DestinationCatalog>,
    pipeline: Arc<CostPipeline>,
    concurrency: usize,
}

impl RecommendationService {
    pub fn new(
        catalog: Arc<dyn DestinationCatalog>,
        pipeline: Arc<CostPipeline>,
        concurrency: usize,
    ) -> Self {
        Self {
            catalog,
            pipeline,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn recommend(
        &self,
        params: &SearchParams,
        page: usize,
        limit: usize,
    ) -> anyhow::Result<RecsResponse> {
        let candidates: Vec<_> = self
            .catalog
            .destinations()?
            .into_iter()
            .filter(|d| params.filter.matches_destination(d))
            .collect();

        let correlation_id = format!("recs_{}", Uuid::new_v4());
        let trip = params.trip();
        tracing::info!(
            correlation_id = %correlation_id,
            candidates = candidates.len(),
            origin = %trip.origin,
            "Evaluating recommendations"
        );

        let pipeline = &self.pipeline;
        let trip = &trip;
        let correlation_id = correlation_id.as_str();
        let mut results: Vec<CityRecommendation> = stream::iter(candidates)
            .map(|destination| async move {
                pipeline.recommend(&destination, trip, correlation_id).await
            })
            .buffer_unordered(self.concurrency)
            .filter(|rec| futures::future::ready(params.accepts(rec)))
            .collect()
            .await;

        results.sort_by(|a, b| {
            a.totals
                .p50
                .total_cmp(&b.totals.p50)
                .then_with(|| a.city_id.cmp(&b.city_id))
        });

        let sources: BTreeSet<&'static str> =
            results.iter().flat_map(|r| r.source_tags()).collect();
        let countries = summarize_countries(&results);
        let total = results.len();
        let page_results = results
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        Ok(RecsResponse {
            query: params.clone(),
            results: page_results,
            countries,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages: total.div_ceil(limit),
            },
            meta: RecsMeta {
                source: sources.into_iter().map(str::to_string).collect(),
                disclaimer: DISCLAIMER.to_string(),
            },
        })
    }
}
