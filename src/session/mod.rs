//! Progressive search sessions.
//!
//! Creating a session prices a first page synchronously, then hands the rest
//! of the candidate set to a supervised background task. Polls only read
//! the session's current snapshot and never wait on the pipeline.
//!
//! The session table is the only state shared across sessions; each
//! session's own state is written only by its background task (and by the
//! sweeper, which can force a timeout).

mod runner;
mod state;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::{Destination, DestinationCatalog};
use crate::config::SessionSettings;
use crate::pipeline::{CostPipeline, TripParams};
use crate::search::{ParamError, SearchParams, SearchQuery, ViewFilter};

use runner::{spawn_supervised, SessionJob};

pub use state::{Progress, ProgressiveSession, SessionSnapshot, SessionStatus};

/// Errors returned to session clients.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid search parameters: {0}")]
    InvalidParams(#[from] ParamError),

    #[error("Unknown session: {0}")]
    NotFound(String),

    #[error("Destination catalog unavailable: {0}")]
    Catalog(anyhow::Error),
}

struct SessionEntry {
    state: Arc<RwLock<ProgressiveSession>>,
    cancel: CancellationToken,
}

/// Owns every live session.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    catalog: Arc<dyn DestinationCatalog>,
    pipeline: Arc<CostPipeline>,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(
        catalog: Arc<dyn DestinationCatalog>,
        pipeline: Arc<CostPipeline>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            catalog,
            pipeline,
            settings,
        }
    }

    /// Validate the query, price the first page, and start the background task.
    pub async fn create(&self, query: &SearchQuery) -> Result<SessionSnapshot, SessionError> {
        let params = SearchParams::from_query(query)?;
        let candidates: Vec<Destination> = self
            .catalog
            .destinations()
            .map_err(SessionError::Catalog)?
            .into_iter()
            .filter(|d| params.filter.matches_destination(d))
            .collect();

        let session_id = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.settings.max_duration;
        let trip = params.trip();
        let state = Arc::new(RwLock::new(ProgressiveSession::new(
            session_id.clone(),
            params,
            candidates.len(),
            deadline,
        )));
        let cancel = CancellationToken::new();

        self.sessions.write().await.insert(
            session_id.clone(),
            SessionEntry {
                state: Arc::clone(&state),
                cancel: cancel.clone(),
            },
        );

        tracing::info!(
            session_id = %session_id,
            candidates = candidates.len(),
            origin = %trip.origin,
            nights = trip.nights,
            "Progressive session created"
        );

        let remaining = self
            .first_page(&session_id, &state, candidates, &trip)
            .await;

        state.write().await.start_processing();
        spawn_supervised(SessionJob {
            session_id,
            state: Arc::clone(&state),
            remaining,
            pipeline: Arc::clone(&self.pipeline),
            trip,
            concurrency: self.settings.concurrency,
            cancel,
            deadline,
        });

        let snapshot = state.read().await.snapshot(&ViewFilter::default());
        Ok(snapshot)
    }

    /// Price up to `first_page_size` destinations within `first_page_timeout`.
    /// Returns everything still to do, unfinished first-page entries included.
    async fn first_page(
        &self,
        session_id: &str,
        state: &RwLock<ProgressiveSession>,
        mut candidates: Vec<Destination>,
        trip: &TripParams,
    ) -> Vec<Destination> {
        let split = self.settings.first_page_size.min(candidates.len());
        let tail = candidates.split_off(split);
        let head = candidates;

        let pipeline = &self.pipeline;
        let mut pending: FuturesUnordered<_> = head
            .iter()
            .map(|destination| async move {
                let rec = pipeline.recommend(destination, trip, session_id).await;
                (destination.id.clone(), rec)
            })
            .collect();

        let deadline = Instant::now() + self.settings.first_page_timeout;
        let mut done = HashSet::new();
        while let Ok(Some((city_id, rec))) =
            tokio::time::timeout_at(deadline, pending.next()).await
        {
            done.insert(city_id);
            state.write().await.record(rec);
        }
        drop(pending);

        if done.len() < head.len() {
            tracing::debug!(
                session_id = %session_id,
                finished = done.len(),
                requeued = head.len() - done.len(),
                "First page timed out; re-queueing unfinished destinations"
            );
        }

        head.into_iter()
            .filter(|d| !done.contains(&d.id))
            .chain(tail)
            .collect()
    }

    /// Current snapshot of a session, narrowed by the poll's filters.
    pub async fn poll(
        &self,
        session_id: &str,
        query: &SearchQuery,
    ) -> Result<SessionSnapshot, SessionError> {
        let view = ViewFilter::from_query(query)?;
        let state = self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| Arc::clone(&entry.state))
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let mut session = state.write().await;
        session.touch();
        Ok(session.snapshot(&view))
    }

    /// Time out sessions past their budget and evict expired ones.
    /// Returns the number of evicted sessions.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Instant::now()).await
    }

    async fn sweep_at(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();

        for (id, entry) in sessions.iter() {
            let mut session = entry.state.write().await;
            if !session.is_terminal() && now >= session.deadline() {
                session.time_out();
                entry.cancel.cancel();
                tracing::warn!(session_id = %id, "Session forced to timeout by sweeper");
            }
            if session.is_expired(now, self.settings.terminal_grace, self.settings.idle_ttl) {
                expired.push(id.clone());
            }
        }

        for id in &expired {
            if let Some(entry) = sessions.remove(id) {
                entry.cancel.cancel();
            }
        }
        if !expired.is_empty() {
            tracing::info!(evicted = expired.len(), remaining = sessions.len(), "Evicted sessions");
        }
        expired.len()
    }

    /// Run [`SessionManager::sweep`] every `sweep_interval` until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.settings.sweep_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        manager.sweep().await;
                    }
                }
            }
        })
    }

    /// Cancel every running session.
    pub async fn shutdown(&self) {
        for entry in self.sessions.read().await.values() {
            entry.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::safety::SafetyScorer;
    use crate::store::SqliteStore;
    use crate::test_support::{fixed_clock, FakeEstimator, FakeFlights};
    use std::time::Duration;

    fn settings() -> SessionSettings {
        SessionSettings {
            first_page_size: 2,
            first_page_timeout: Duration::from_secs(2),
            concurrency: 2,
            ..SessionSettings::default()
        }
    }

    fn manager_with(estimator: FakeEstimator, settings: SessionSettings) -> SessionManager {
        let pipeline = CostPipeline::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Arc::new(FakeFlights::failing()),
            Arc::new(estimator),
            Arc::new(SafetyScorer::builtin()),
            Duration::from_secs(1),
        )
        .with_clock(fixed_clock());
        SessionManager::new(
            Arc::new(StaticCatalog::builtin()),
            Arc::new(pipeline),
            settings,
        )
    }

    fn phx_query() -> SearchQuery {
        SearchQuery {
            budget: Some("2000".to_string()),
            nights: Some("10".to_string()),
            origin: Some("PHX".to_string()),
            ..Default::default()
        }
    }

    async fn wait_for_terminal(manager: &SessionManager, id: &str) -> Vec<SessionSnapshot> {
        let mut polls = Vec::new();
        for _ in 0..500 {
            let snap = manager.poll(id, &SearchQuery::default()).await.unwrap();
            let done = snap.status.is_terminal();
            polls.push(snap);
            if done {
                return polls;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_phx_session_completes_with_ordered_totals() {
        let manager = manager_with(FakeEstimator::healthy(), settings());
        let created = manager.create(&phx_query()).await.unwrap();

        assert!(!created.session_id.is_empty());
        assert!(matches!(
            created.status,
            SessionStatus::Loading | SessionStatus::Processing
        ));

        let polls = wait_for_terminal(&manager, &created.session_id).await;
        let last = polls.last().unwrap();
        assert_eq!(last.status, SessionStatus::Completed);
        assert_eq!(last.total_results, last.results.len());
        assert_eq!(last.progress.processed, last.progress.total);
        assert_eq!(last.progress.percentage, 100);
        for rec in &last.results {
            let t = rec.totals;
            assert!(t.p25 <= t.p35 && t.p35 <= t.p50 && t.p50 <= t.p75);
            assert!(t.p50 <= 2000.0);
        }

        // Progress never moves backwards.
        assert!(polls
            .windows(2)
            .all(|w| w[0].progress.processed <= w[1].progress.processed));
    }

    #[tokio::test]
    async fn test_terminal_polls_are_idempotent() {
        let manager = manager_with(FakeEstimator::healthy(), settings());
        let created = manager.create(&phx_query()).await.unwrap();
        wait_for_terminal(&manager, &created.session_id).await;

        let a = manager.poll(&created.session_id, &SearchQuery::default()).await.unwrap();
        let b = manager.poll(&created.session_id, &SearchQuery::default()).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let manager = manager_with(FakeEstimator::healthy(), settings());
        let err = manager.poll("nope", &SearchQuery::default()).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_params_create_no_session() {
        let manager = manager_with(FakeEstimator::healthy(), settings());
        let mut query = phx_query();
        query.nights = Some("0".to_string());
        let err = manager.create(&query).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidParams(_)));
        assert!(manager.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_region_filter_limits_candidates() {
        let manager = manager_with(FakeEstimator::healthy(), settings());
        let mut query = phx_query();
        query.region = Some("oceania".to_string());
        let created = manager.create(&query).await.unwrap();

        let expected = sample_region_count(crate::catalog::Region::Oceania);
        assert_eq!(created.progress.total, expected);
    }

    fn sample_region_count(region: crate::catalog::Region) -> usize {
        StaticCatalog::builtin()
            .destinations()
            .unwrap()
            .iter()
            .filter(|d| d.region == region)
            .count()
    }

    #[tokio::test]
    async fn test_slow_providers_hit_the_session_deadline() {
        let slow = FakeEstimator::healthy().with_delay(Duration::from_millis(300));
        let manager = manager_with(
            slow,
            SessionSettings {
                max_duration: Duration::from_millis(150),
                first_page_size: 0,
                concurrency: 1,
                ..SessionSettings::default()
            },
        );
        let created = manager.create(&phx_query()).await.unwrap();
        let polls = wait_for_terminal(&manager, &created.session_id).await;
        let last = polls.last().unwrap();
        assert_eq!(last.status, SessionStatus::Timeout);
        assert!(last.progress.processed < last.progress.total);
    }

    #[tokio::test]
    async fn test_first_page_timeout_requeues_destinations() {
        let slow = FakeEstimator::healthy().with_delay(Duration::from_millis(100));
        let manager = manager_with(
            slow,
            SessionSettings {
                first_page_size: 3,
                first_page_timeout: Duration::from_millis(10),
                concurrency: 8,
                ..SessionSettings::default()
            },
        );
        let created = manager.create(&phx_query()).await.unwrap();
        assert_eq!(created.progress.processed, 0);

        let polls = wait_for_terminal(&manager, &created.session_id).await;
        let last = polls.last().unwrap();
        assert_eq!(last.status, SessionStatus::Completed);
        assert_eq!(last.progress.processed, last.progress.total);
    }

    #[tokio::test]
    async fn test_panicking_aggregation_marks_session_error() {
        let manager = manager_with(
            FakeEstimator::panicking(),
            SessionSettings {
                first_page_size: 0,
                ..settings()
            },
        );
        let created = manager.create(&phx_query()).await.unwrap();

        let polls = wait_for_terminal(&manager, &created.session_id).await;
        let last = polls.last().unwrap();
        assert_eq!(last.status, SessionStatus::Error);
        assert!(last.error.as_deref().is_some_and(|e| !e.is_empty()));

        // The error state is final.
        let again = manager.poll(&created.session_id, &SearchQuery::default()).await.unwrap();
        assert_eq!(again.status, SessionStatus::Error);
        assert_eq!(again.error, last.error);
    }

    #[tokio::test]
    async fn test_sweeper_times_out_overdue_sessions() {
        let slow = FakeEstimator::healthy().with_delay(Duration::from_secs(30));
        let manager = manager_with(
            slow,
            SessionSettings {
                max_duration: Duration::from_secs(60),
                first_page_size: 0,
                concurrency: 1,
                ..SessionSettings::default()
            },
        );
        let created = manager.create(&phx_query()).await.unwrap();
        let before = manager.poll(&created.session_id, &SearchQuery::default()).await.unwrap();
        assert_eq!(before.status, SessionStatus::Processing);

        // Past the deadline but well inside the grace and idle windows.
        let overdue = Instant::now() + Duration::from_secs(61);
        assert_eq!(manager.sweep_at(overdue).await, 0);

        let after = manager.poll(&created.session_id, &SearchQuery::default()).await.unwrap();
        assert_eq!(after.status, SessionStatus::Timeout);
        assert!(after.error.is_none());
        assert!(after.progress.processed < after.progress.total);
    }

    #[tokio::test]
    async fn test_sweeper_evicts_expired_sessions() {
        let manager = manager_with(FakeEstimator::healthy(), settings());
        let created = manager.create(&phx_query()).await.unwrap();
        wait_for_terminal(&manager, &created.session_id).await;

        assert_eq!(manager.sweep().await, 0);
        let later = Instant::now() + manager.settings.terminal_grace;
        assert_eq!(manager.sweep_at(later).await, 1);

        let err = manager
            .poll(&created.session_id, &SearchQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }
}
