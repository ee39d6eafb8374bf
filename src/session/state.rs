//! Progressive session state and its mutation rules.
//!
//! Results only grow and counters only increase. Once a session leaves
//! `loading`/`processing` it is frozen: every later mutation is a no-op, so
//! terminal snapshots are stable across polls.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::pipeline::CityRecommendation;
use crate::search::{summarize_countries, CountrySummary, SearchParams, ViewFilter};

/// Lifecycle of a progressive session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Loading,
    Processing,
    Completed,
    Timeout,
    Error,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Timeout | Self::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub percentage: u8,
}

impl Progress {
    pub fn new(processed: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            (processed.min(total) * 100 / total) as u8
        };
        Self {
            processed,
            total,
            percentage,
        }
    }
}

/// What a poll returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    pub results: Vec<CityRecommendation>,
    pub countries: Vec<CountrySummary>,
    pub progress: Progress,
    pub total_results: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One search in flight. Mutated only by its own background task.
#[derive(Debug)]
pub struct ProgressiveSession {
    id: String,
    params: SearchParams,
    status: SessionStatus,
    results: Vec<CityRecommendation>,
    processed: usize,
    total: usize,
    error: Option<String>,
    deadline: Instant,
    last_polled: Instant,
    finished_at: Option<Instant>,
}

impl ProgressiveSession {
    pub fn new(
        id: impl Into<String>,
        params: SearchParams,
        total: usize,
        deadline: Instant,
    ) -> Self {
        Self {
            id: id.into(),
            params,
            status: SessionStatus::Loading,
            results: Vec::new(),
            processed: 0,
            total,
            error: None,
            deadline,
            last_polled: Instant::now(),
            finished_at: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    /// `loading -> processing`.
    pub fn start_processing(&mut self) {
        if self.status == SessionStatus::Loading {
            self.status = SessionStatus::Processing;
        }
    }

    /// Count one evaluated destination and keep it if it fits the search.
    /// Returns `false` once the session is terminal.
    pub fn record(&mut self, rec: CityRecommendation) -> bool {
        if self.is_terminal() {
            return false;
        }
        if self.processed < self.total {
            self.processed += 1;
        }
        if self.params.accepts(&rec) {
            self.results.push(rec);
        }
        true
    }

    pub fn complete(&mut self) {
        self.finish(SessionStatus::Completed, None);
    }

    pub fn time_out(&mut self) {
        self.finish(SessionStatus::Timeout, None);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.finish(SessionStatus::Error, Some(message.into()));
    }

    fn finish(&mut self, status: SessionStatus, error: Option<String>) {
        if self.is_terminal() {
            return;
        }
        self.status = status;
        self.error = error;
        self.finished_at = Some(Instant::now());
    }

    pub fn touch(&mut self) {
        self.last_polled = Instant::now();
    }

    /// Terminal and past the grace window, or not polled for `idle_ttl`.
    pub fn is_expired(&self, now: Instant, terminal_grace: Duration, idle_ttl: Duration) -> bool {
        let grace_over = self
            .finished_at
            .is_some_and(|at| now.saturating_duration_since(at) >= terminal_grace);
        grace_over || now.saturating_duration_since(self.last_polled) >= idle_ttl
    }

    pub fn snapshot(&self, view: &ViewFilter) -> SessionSnapshot {
        let results: Vec<CityRecommendation> = self
            .results
            .iter()
            .filter(|r| view.accepts(r))
            .cloned()
            .collect();
        SessionSnapshot {
            session_id: self.id.clone(),
            status: self.status,
            countries: summarize_countries(&results),
            total_results: results.len(),
            results,
            progress: Progress::new(self.processed, self.total),
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{
        CostBreakdown, CostSource, CostTotals, DailyBreakdown, FlightBreakdown, FlightSource,
        HotelBreakdown,
    };
    use crate::pricing::{Confidence, FALLBACK_DAILY, FALLBACK_HOTEL};
    use crate::safety::SafetyScorer;
    use crate::search::SearchQuery;
    use crate::test_support::fixed_now;

    fn params(budget: &str) -> SearchParams {
        SearchParams::from_query(&SearchQuery {
            budget: Some(budget.to_string()),
            nights: Some("5".to_string()),
            origin: Some("JFK".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    fn rec(id: &str, p50: f64, is_estimate: bool) -> CityRecommendation {
        CityRecommendation {
            city_id: id.to_string(),
            name: id.to_string(),
            country: "Portugal".to_string(),
            region: crate::catalog::Region::Europe,
            nights: 5,
            totals: CostTotals {
                p25: p50 - 50.0,
                p35: p50 - 30.0,
                p50,
                p75: p50 + 80.0,
            },
            breakdown: CostBreakdown {
                flight: FlightBreakdown {
                    price: 400.0,
                    source: FlightSource::Live,
                },
                hotel: HotelBreakdown::new(FALLBACK_HOTEL, CostSource::Cache),
                daily: DailyBreakdown::new(FALLBACK_DAILY, CostSource::Cache),
            },
            confidence: Confidence::Medium,
            safety: SafetyScorer::builtin().compute(id, "europe", fixed_now()),
            is_estimate,
            last_updated_iso: fixed_now(),
        }
    }

    fn session(total: usize) -> ProgressiveSession {
        let deadline = Instant::now() + Duration::from_secs(60);
        ProgressiveSession::new("s-1", params("1000"), total, deadline)
    }

    #[test]
    fn test_progress_percentage() {
        assert_eq!(Progress::new(0, 0).percentage, 100);
        assert_eq!(Progress::new(1, 3).percentage, 33);
        assert_eq!(Progress::new(3, 3).percentage, 100);
    }

    #[test]
    fn test_record_counts_everything_but_keeps_only_affordable() {
        let mut s = session(3);
        s.start_processing();
        assert!(s.record(rec("LIS", 900.0, false)));
        assert!(s.record(rec("OPO", 1100.0, false)));

        let snap = s.snapshot(&ViewFilter::default());
        assert_eq!(snap.status, SessionStatus::Processing);
        assert_eq!(snap.progress.processed, 2);
        assert_eq!(snap.total_results, 1);
        assert_eq!(snap.results[0].city_id, "LIS");
    }

    #[test]
    fn test_terminal_session_is_frozen() {
        let mut s = session(2);
        s.record(rec("LIS", 900.0, false));
        s.complete();
        let first = s.snapshot(&ViewFilter::default());

        assert!(!s.record(rec("OPO", 800.0, false)));
        s.time_out();
        s.fail("late failure");
        assert_eq!(s.snapshot(&ViewFilter::default()), first);
        assert_eq!(first.status, SessionStatus::Completed);
    }

    #[test]
    fn test_view_filter_narrows_snapshot() {
        let mut s = session(2);
        s.record(rec("LIS", 900.0, false));
        s.record(rec("OPO", 950.0, true));

        let strict = ViewFilter {
            include_estimates: false,
            ..ViewFilter::default()
        };
        let snap = s.snapshot(&strict);
        assert_eq!(snap.total_results, 1);
        assert_eq!(snap.results.len(), snap.total_results);
        assert_eq!(snap.progress.processed, 2);
    }

    #[test]
    fn test_expiry_rules() {
        let mut s = session(1);
        let grace = Duration::from_secs(300);
        let idle = Duration::from_secs(600);
        let now = Instant::now();
        assert!(!s.is_expired(now, grace, idle));
        assert!(s.is_expired(now + idle, grace, idle));

        s.complete();
        assert!(!s.is_expired(Instant::now(), grace, idle));
        assert!(s.is_expired(Instant::now() + grace, grace, idle));
    }
}
