//! Background snapshot persistence.
//!
//! The matching thread owns the book, so the scheduler never touches it.
//! A tokio interval raises a request flag; the matching thread polls the
//! flag at a point where no order is half processed, captures the view and
//! hands it over a channel. The write itself runs on the blocking pool.

use super::view::SnapshotView;
use super::writer::SnapWriter;
use crate::orderbook::wal::Lsn;
use crate::utils::current_time_millis;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// A view captured by the matching thread.
#[derive(Debug, Clone)]
pub struct CapturedSnapshot {
    /// The resting orders.
    pub view: SnapshotView,
    /// Last committed log position reflected in the view.
    pub last_applied: Option<Lsn>,
    /// Capture time in epoch milliseconds.
    pub captured_at_ms: i64,
}

/// Matching-thread side of the scheduler.
#[derive(Debug)]
pub struct SnapshotHandoff {
    requested: Arc<AtomicBool>,
    tx: mpsc::Sender<CapturedSnapshot>,
}

impl SnapshotHandoff {
    /// Whether a snapshot is currently wanted.
    #[inline]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Captures and hands off a view if one was requested.
    ///
    /// Call only between two orders. Returns `true` when a view was handed
    /// off. When the writer is still busy with the previous snapshot the
    /// request stays pending for the next poll.
    pub fn poll<F>(&self, capture: F) -> bool
    where
        F: FnOnce() -> (SnapshotView, Option<Lsn>),
    {
        if !self.requested.swap(false, Ordering::AcqRel) {
            return false;
        }
        let permit = match self.tx.try_reserve() {
            Ok(permit) => permit,
            Err(mpsc::error::TrySendError::Full(())) => {
                self.requested.store(true, Ordering::Release);
                return false;
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("snapshot scheduler gone, capture skipped");
                return false;
            }
        };
        let (view, last_applied) = capture();
        permit.send(CapturedSnapshot {
            view,
            last_applied,
            captured_at_ms: current_time_millis() as i64,
        });
        true
    }
}

/// Owner of the background snapshot task.
#[derive(Debug)]
pub struct SnapshotScheduler {
    requested: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SnapshotScheduler {
    /// Spawns the periodic task on the current tokio runtime.
    ///
    /// Returns the scheduler and the handoff the matching thread polls.
    pub fn spawn(writer: SnapWriter, period: Duration) -> (Self, SnapshotHandoff) {
        let requested = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel::<CapturedSnapshot>(1);
        let flag = Arc::clone(&requested);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        flag.store(true, Ordering::Release);
                    }
                    captured = rx.recv() => {
                        let Some(captured) = captured else { break };
                        persist(&writer, captured).await;
                    }
                }
            }
            info!("snapshot scheduler stopped");
        });

        let handoff = SnapshotHandoff {
            requested: Arc::clone(&requested),
            tx,
        };
        (Self { requested, task }, handoff)
    }

    /// Asks for a snapshot at the next poll without waiting for the timer.
    pub fn request_now(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Waits for the task to finish. It ends once the handoff is dropped and
    /// any pending capture is written.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = %e, "snapshot scheduler task failed");
        }
    }

    /// Stops the task without waiting for pending writes.
    pub fn abort(&self) {
        self.task.abort();
    }
}

async fn persist(writer: &SnapWriter, captured: CapturedSnapshot) {
    let writer = writer.clone();
    let result = tokio::task::spawn_blocking(move || {
        writer.write_at(
            &captured.view,
            captured.last_applied,
            captured.captured_at_ms,
        )
    })
    .await;
    match result {
        Ok(Ok(path)) => debug!(path = %path.display(), "scheduled snapshot persisted"),
        Ok(Err(e)) => error!(error = %e, "scheduled snapshot failed"),
        Err(e) => error!(error = %e, "snapshot writer task panicked"),
    }
}
