//! Recompute queue
//!
//! An unbounded in-memory FIFO drained by exactly one worker task. Requests run
//! one at a time, in submission order, each to completion (or failure, panic,
//! or deadline) before the next one is taken. That single worker is the whole
//! write-concurrency strategy for scorecard rows.
//!
//! Enqueueing never blocks and returns nothing: the only trace of a request is
//! its persisted effect, the queue counters, and the logs.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One recompute request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecomputeRequest {
    pub program_id: i64,
    pub user_id: i64,
    /// Existing scorecard to update; `None` creates a new one
    pub scorecard_id: Option<i64>,
}

impl RecomputeRequest {
    /// Build a request from the external id triple, where a scorecard id of
    /// 0 (or below) means "create a new scorecard"
    pub fn new(program_id: i64, user_id: i64, scorecard_id: i64) -> Self {
        Self {
            program_id,
            user_id,
            scorecard_id: (scorecard_id > 0).then_some(scorecard_id),
        }
    }
}

/// How a task ended, as reported by the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Skipped,
    Failed,
}

/// Work executed for each dequeued request
#[async_trait]
pub trait RecomputeHandler: Send + Sync + 'static {
    async fn handle(&self, request: RecomputeRequest) -> TaskOutcome;
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: Option<RecomputeRequest>,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Debug, Default)]
struct QueueBook {
    pending: VecDeque<RecomputeRequest>,
    running: Option<RecomputeRequest>,
    completed: u64,
    skipped: u64,
    failed: u64,
    timed_out: u64,
}

/// Ending of one task as seen by the worker
enum TaskEnd {
    Outcome(TaskOutcome),
    TimedOut,
    Panicked,
}

/// Cloneable enqueue handle
///
/// The worker exits after every handle has been dropped and the remaining
/// requests have run.
#[derive(Clone)]
pub struct RecomputeQueue {
    tx: mpsc::UnboundedSender<RecomputeRequest>,
    book: Arc<Mutex<QueueBook>>,
}

impl RecomputeQueue {
    /// Create the queue and spawn its single worker
    ///
    /// Must be called from within a tokio runtime. `task_timeout` of `None`
    /// lets a task run indefinitely.
    pub fn start<H: RecomputeHandler>(
        handler: Arc<H>,
        task_timeout: Option<Duration>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let book = Arc::new(Mutex::new(QueueBook::default()));

        let worker = tokio::spawn(run_worker(handler, rx, Arc::clone(&book), task_timeout));
        info!(
            "Recompute worker started (task timeout: {})",
            task_timeout
                .map(|d| format!("{}ms", d.as_millis()))
                .unwrap_or_else(|| "none".to_string())
        );

        (Self { tx, book }, worker)
    }

    /// Submit a request; returns immediately
    pub fn enqueue(&self, request: RecomputeRequest) {
        // Send and book under one lock so the pending list keeps channel order
        let mut book = lock(&self.book);
        if self.tx.send(request).is_err() {
            drop(book);
            error!(
                "Recompute worker is not running; dropped request for program {} user {}",
                request.program_id, request.user_id
            );
            return;
        }
        book.pending.push_back(request);
        drop(book);

        debug!(
            "Queued recompute for program {} user {} (scorecard {:?})",
            request.program_id, request.user_id, request.scorecard_id
        );
    }

    pub fn stats(&self) -> QueueStats {
        let book = lock(&self.book);
        QueueStats {
            pending: book.pending.len(),
            running: book.running,
            completed: book.completed,
            skipped: book.skipped,
            failed: book.failed,
            timed_out: book.timed_out,
        }
    }

    /// True while a request for this existing scorecard is pending or running
    pub fn is_in_queue(&self, scorecard_id: i64) -> bool {
        let book = lock(&self.book);
        book.running
            .iter()
            .chain(book.pending.iter())
            .any(|r| r.scorecard_id == Some(scorecard_id))
    }
}

/// Bookkeeping stays usable even if a holder panicked
fn lock(book: &Mutex<QueueBook>) -> MutexGuard<'_, QueueBook> {
    book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_worker<H: RecomputeHandler>(
    handler: Arc<H>,
    mut rx: mpsc::UnboundedReceiver<RecomputeRequest>,
    book: Arc<Mutex<QueueBook>>,
    task_timeout: Option<Duration>,
) {
    while let Some(request) = rx.recv().await {
        {
            let mut book = lock(&book);
            book.pending.pop_front();
            book.running = Some(request);
        }

        info!(
            "Recompute started: program {} user {} (scorecard {:?})",
            request.program_id, request.user_id, request.scorecard_id
        );

        let end = run_one(Arc::clone(&handler), request, task_timeout).await;

        record_end(&book, request, end);
    }

    info!("Recompute worker stopped: all queue handles dropped");
}

fn record_end(book: &Mutex<QueueBook>, request: RecomputeRequest, end: TaskEnd) {
    let mut book = lock(book);
    book.running = None;
    match end {
        TaskEnd::Outcome(TaskOutcome::Completed) => book.completed += 1,
        TaskEnd::Outcome(TaskOutcome::Skipped) => book.skipped += 1,
        TaskEnd::Outcome(TaskOutcome::Failed) => book.failed += 1,
        TaskEnd::TimedOut => {
            warn!(
                "Recompute for program {} user {} exceeded its deadline and was cancelled",
                request.program_id, request.user_id
            );
            book.timed_out += 1;
        }
        TaskEnd::Panicked => {
            error!(
                "Recompute for program {} user {} panicked",
                request.program_id, request.user_id
            );
            book.failed += 1;
        }
    }
}

/// Run one request in its own task so a panic or deadline cannot take the
/// worker down. The task is fully stopped before this returns.
async fn run_one<H: RecomputeHandler>(
    handler: Arc<H>,
    request: RecomputeRequest,
    task_timeout: Option<Duration>,
) -> TaskEnd {
    let mut task = tokio::spawn(async move { handler.handle(request).await });

    let joined = match task_timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                task.abort();
                // Wait for cancellation so the next task never overlaps this one
                let _ = task.await;
                return TaskEnd::TimedOut;
            }
        },
        None => task.await,
    };

    match joined {
        Ok(outcome) => TaskEnd::Outcome(outcome),
        Err(e) if e.is_panic() => TaskEnd::Panicked,
        Err(_) => TaskEnd::Outcome(TaskOutcome::Failed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Notify;

    /// Handler that waits for a signal before finishing each task
    struct GatedHandler {
        gate: Notify,
    }

    #[async_trait]
    impl RecomputeHandler for GatedHandler {
        async fn handle(&self, _request: RecomputeRequest) -> TaskOutcome {
            self.gate.notified().await;
            TaskOutcome::Completed
        }
    }

    #[test]
    fn test_zero_scorecard_id_means_new() {
        assert_eq!(RecomputeRequest::new(1, 2, 0).scorecard_id, None);
        assert_eq!(RecomputeRequest::new(1, 2, 5).scorecard_id, Some(5));
    }

    #[tokio::test]
    async fn test_is_in_queue_tracks_pending_and_running() {
        let handler = Arc::new(GatedHandler {
            gate: Notify::new(),
        });
        let (queue, worker) = RecomputeQueue::start(Arc::clone(&handler), None);

        queue.enqueue(RecomputeRequest::new(1, 10, 5));
        queue.enqueue(RecomputeRequest::new(1, 11, 6));
        queue.enqueue(RecomputeRequest::new(1, 12, 0));

        assert!(queue.is_in_queue(5));
        assert!(queue.is_in_queue(6));
        assert!(!queue.is_in_queue(7));

        // Release the tasks one at a time
        for finished in 1..=3 {
            handler.gate.notify_one();
            while queue.stats().completed < finished {
                tokio::task::yield_now().await;
            }
        }

        let stats = queue.stats();
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.pending, 0);
        assert!(!queue.is_in_queue(5));

        drop(queue);
        worker.await.unwrap();
    }
}
