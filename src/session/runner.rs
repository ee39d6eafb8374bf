//! Background aggregation task for one progressive session.
//!
//! Each session owns one supervised task. The task streams the remaining
//! destinations through the pipeline with bounded concurrency and stops at
//! the first of: all destinations done, the wall-clock deadline, or its
//! cancellation token firing.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::state::ProgressiveSession;
use crate::catalog::Destination;
use crate::pipeline::{CostPipeline, TripParams};

/// Everything the background task needs; moved into the task.
pub(super) struct SessionJob {
    pub session_id: String,
    pub state: Arc<RwLock<ProgressiveSession>>,
    pub remaining: Vec<Destination>,
    pub pipeline: Arc<CostPipeline>,
    pub trip: TripParams,
    pub concurrency: usize,
    pub cancel: CancellationToken,
    pub deadline: Instant,
}

/// Spawn the job under a supervisor that turns a panic into `status: error`.
pub(super) fn spawn_supervised(job: SessionJob) -> JoinHandle<()> {
    let session_id = job.session_id.clone();
    let state = Arc::clone(&job.state);
    let worker = tokio::spawn(run(job));

    tokio::spawn(async move {
        match worker.await {
            Ok(()) => {}
            Err(e) if e.is_panic() => {
                tracing::error!(session_id = %session_id, "Session aggregation task panicked");
                state
                    .write()
                    .await
                    .fail("Background aggregation failed unexpectedly");
            }
            Err(e) => {
                tracing::debug!(
                    session_id = %session_id,
                    error = %e,
                    "Session aggregation task aborted"
                );
                state.write().await.time_out();
            }
        }
    })
}

async fn run(job: SessionJob) {
    let SessionJob {
        session_id,
        state,
        remaining,
        pipeline,
        trip,
        concurrency,
        cancel,
        deadline,
    } = job;

    tracing::info!(
        session_id = %session_id,
        remaining = remaining.len(),
        concurrency,
        "Session aggregation started"
    );

    let pipeline = &pipeline;
    let trip = &trip;
    let correlation_id = session_id.as_str();
    let mut recommendations = stream::iter(remaining)
        .map(|destination| async move {
            pipeline.recommend(&destination, trip, correlation_id).await
        })
        .buffer_unordered(concurrency.max(1));

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let mut session = state.write().await;
                session.time_out();
                tracing::info!(
                    session_id = %session_id,
                    processed = session.processed(),
                    "Session cancelled"
                );
                return;
            }
            _ = tokio::time::sleep_until(deadline) => {
                let mut session = state.write().await;
                session.time_out();
                tracing::warn!(
                    session_id = %session_id,
                    processed = session.processed(),
                    "Session exceeded its time budget"
                );
                return;
            }
            next = recommendations.next() => match next {
                Some(rec) => {
                    if !state.write().await.record(rec) {
                        return;
                    }
                }
                None => break,
            },
        }
    }

    let mut session = state.write().await;
    session.complete();
    tracing::info!(
        session_id = %session_id,
        processed = session.processed(),
        status = ?session.status(),
        "Session aggregation finished"
    );
}
