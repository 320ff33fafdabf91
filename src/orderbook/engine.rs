//! Durable matching: every request is logged before it reaches the book.
//!
//! A request runs as one WAL transaction: `BEGIN`, the intent, then the
//! book mutation, then `COMMIT` forced to disk. A request whose intent could
//! not be logged never reaches the book. A request that was logged is
//! committed whatever the book answered, so that replay reproduces the same
//! answers in the same order.
//!
//! A failure to write the log stops the engine: the book may already hold
//! the effect of a request whose `COMMIT` never reached the disk, so from
//! then on every request and every snapshot is refused with
//! [`EngineError::Halted`]. Reopening recovers the last committed state.
//!
//! Recovery loads the newest snapshot, falls back to an empty book when it
//! is missing or corrupt, then replays committed transactions whose
//! `COMMIT` lies after the snapshot's log position.

use super::book::{MatchBook, OrderBook};
use super::config::EngineConfig;
use super::error::OrderBookError;
use super::snapshot::{SnapReader, SnapWriter, SnapshotError, SnapshotHandoff, SnapshotScheduler};
use super::trade::BookEventListener;
use super::types::{OrderEventType, OrderId, OrderInfo, OrderStatus, Price, Symbol};
use super::wal::{CommittedTx, Lsn, TxContext, TxIntent, WalError, WalReader, WalWriter};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors of the durable engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The book refused the request.
    #[error(transparent)]
    Book(#[from] OrderBookError),

    /// The log could not be written or read.
    #[error(transparent)]
    Wal(#[from] WalError),

    /// A snapshot could not be written or read.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// An earlier log failure stopped the engine.
    #[error("engine halted after a WAL failure; reopen to recover")]
    Halted,

    /// The request type is decoded but not served.
    #[error("unsupported request type {0:?}")]
    Unsupported(OrderEventType),
}

/// What [`DurableEngine::open`] found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Snapshot the book was restored from.
    pub snapshot_path: Option<PathBuf>,
    /// Log position the snapshot reflects.
    pub snapshot_lsn: Option<Lsn>,
    /// Resting orders restored from the snapshot.
    pub snapshot_orders: usize,
    /// Whether the newest snapshot was rejected as unreadable.
    pub snapshot_rejected: bool,
    /// Committed transactions replayed on top of the snapshot.
    pub replayed_txs: usize,
    /// Replayed intents the book refused, exactly as it did originally.
    pub replay_errors: usize,
    /// Transactions without a `COMMIT`, ignored.
    pub skipped_uncommitted: usize,
    /// Newest durable `COMMIT` after recovery.
    pub last_commit_lsn: Option<Lsn>,
}

/// A book wrapped with its write-ahead log and snapshot store.
pub struct DurableEngine<B: MatchBook = OrderBook> {
    book: B,
    wal: WalWriter,
    snapshots: SnapWriter,
    snapshot_interval: Duration,
    handoff: Option<SnapshotHandoff>,
    report: RecoveryReport,
    halted: bool,
}

impl DurableEngine<OrderBook> {
    /// Opens the stores in `config` and recovers an [`OrderBook`].
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        let book = OrderBook::new(&config.book)?;
        Self::open_with_book(config, book)
    }

    /// Installs a listener for events produced from now on.
    ///
    /// Replay during [`DurableEngine::open`] happens before any listener can
    /// be set, so recovered history is never re-published.
    pub fn set_event_listener(&mut self, listener: BookEventListener) {
        self.book.set_event_listener(listener);
    }
}

impl<B: MatchBook> DurableEngine<B> {
    /// Recovers `book`, which must be empty, from the stores in `config`.
    pub fn open_with_book(config: EngineConfig, mut book: B) -> Result<Self, EngineError> {
        config.validate()?;
        let mut report = RecoveryReport::default();

        let reader = SnapReader::new(&config.snapshot_dir, &config.snapshot_base_name);
        match reader.read_latest() {
            Ok(loaded) => {
                book.restore(&loaded.view)?;
                report.snapshot_orders = loaded.view.bid_len() + loaded.view.ask_len();
                report.snapshot_lsn = loaded.last_applied_lsn;
                report.snapshot_path = Some(loaded.path);
            }
            Err(SnapshotError::NotFound { .. }) => {
                debug!(dir = %config.snapshot_dir.display(), "no snapshot, starting empty");
            }
            Err(SnapshotError::Io { message, path }) => {
                return Err(SnapshotError::Io { message, path }.into());
            }
            Err(e) => {
                warn!(error = %e, "newest snapshot rejected, replaying the whole log");
                report.snapshot_rejected = true;
            }
        }

        // Opening the writer first cuts any torn tail off the log.
        let wal = WalWriter::open(&config.wal_dir, config.wal_segment_bytes)?;
        let scan = WalReader::new(&config.wal_dir).scan_transactions()?;
        report.skipped_uncommitted = scan.uncommitted.len();
        for tx in scan
            .committed
            .iter()
            .filter(|tx| report.snapshot_lsn.is_none_or(|lsn| tx.commit_lsn > lsn))
        {
            report.replay_errors += replay(&mut book, tx);
            report.replayed_txs += 1;
        }
        report.last_commit_lsn = wal.last_commit_lsn();

        info!(
            symbol = book.symbol(),
            snapshot_orders = report.snapshot_orders,
            snapshot_lsn = ?report.snapshot_lsn,
            replayed = report.replayed_txs,
            uncommitted = report.skipped_uncommitted,
            "recovery complete"
        );

        Ok(Self {
            book,
            wal,
            snapshots: SnapWriter::new(&config.snapshot_dir, &config.snapshot_base_name),
            snapshot_interval: Duration::from_millis(config.snapshot_interval_ms),
            handoff: None,
            report,
            halted: false,
        })
    }

    /// Logs, matches and commits a new order.
    ///
    /// # Errors
    /// Malformed orders are refused before anything is logged. A WAL
    /// failure before the intent is durable leaves the book untouched; any
    /// WAL failure halts the engine.
    pub fn submit(&mut self, order: &OrderInfo) -> Result<OrderStatus, EngineError> {
        self.ensure_running()?;
        self.book.validate(order)?;
        let tx = self.logged(|wal| {
            let tx = wal.begin_tx()?;
            wal.log_order(&tx, order)?;
            Ok(tx)
        })?;
        let outcome = self.book.submit(order);
        self.commit(tx)?;
        Ok(outcome?)
    }

    /// Logs and applies a cancel.
    pub fn cancel(
        &mut self,
        symbol: Symbol,
        price: Price,
        order_id: OrderId,
    ) -> Result<bool, EngineError> {
        self.ensure_running()?;
        let expected = self.book.symbol();
        if symbol != expected {
            return Err(OrderBookError::UnknownSymbol {
                expected,
                actual: symbol,
            }
            .into());
        }
        let tx = self.logged(|wal| {
            let tx = wal.begin_tx()?;
            wal.log_cancel(&tx, symbol, order_id, price)?;
            Ok(tx)
        })?;
        let outcome = self.book.cancel(symbol, price, order_id);
        self.commit(tx)?;
        Ok(outcome?)
    }

    /// Routes a typed request.
    ///
    /// Cancels report [`OrderStatus::Canceled`] when an order was removed and
    /// [`OrderStatus::Rejected`] when nothing rested under that id.
    ///
    /// # Errors
    /// [`EngineError::Unsupported`] for [`OrderEventType::ModifyOrder`].
    pub fn apply(
        &mut self,
        kind: OrderEventType,
        order: &OrderInfo,
    ) -> Result<OrderStatus, EngineError> {
        self.ensure_running()?;
        match kind {
            OrderEventType::NewOrder => self.submit(order),
            OrderEventType::CancelOrder => {
                if self.cancel(order.symbol, order.price, order.order_id)? {
                    Ok(OrderStatus::Canceled)
                } else {
                    Ok(OrderStatus::Rejected)
                }
            }
            OrderEventType::ModifyOrder => Err(EngineError::Unsupported(kind)),
        }
    }

    fn commit(&mut self, tx: TxContext) -> Result<Lsn, EngineError> {
        let tx_id = tx.tx_id;
        let lsn = self.wal.commit_tx(tx).map_err(|e| {
            error!(tx_id, error = %e, "commit failed; book state is ahead of the log");
            self.halted = true;
            e
        })?;
        self.serve_snapshot();
        Ok(lsn)
    }

    /// Runs log writes that precede the book mutation, halting on failure.
    fn logged<T>(
        &mut self,
        write: impl FnOnce(&mut WalWriter) -> Result<T, WalError>,
    ) -> Result<T, EngineError> {
        write(&mut self.wal).map_err(|e| {
            // A refused oversized record leaves the log intact.
            if self.wal.is_halted() {
                error!(error = %e, "WAL write failed; engine halted");
                self.halted = true;
            }
            e.into()
        })
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.is_halted() {
            return Err(EngineError::Halted);
        }
        Ok(())
    }

    /// Whether a log failure stopped the engine.
    pub fn is_halted(&self) -> bool {
        self.halted || self.wal.is_halted()
    }

    /// Writes a snapshot of the current book synchronously.
    ///
    /// # Errors
    /// [`EngineError::Halted`] once the engine stopped, since the book may
    /// then hold uncommitted state.
    pub fn snapshot_now(&self) -> Result<PathBuf, EngineError> {
        self.ensure_running()?;
        let path = self
            .snapshots
            .write(&self.book.snapshot(), self.wal.last_commit_lsn())?;
        Ok(path)
    }

    /// Hands scheduled snapshot requests to the background writer.
    pub fn attach_scheduler(&mut self, handoff: SnapshotHandoff) {
        self.handoff = Some(handoff);
    }

    /// Spawns the periodic snapshot task on the current tokio runtime and
    /// attaches it.
    pub fn spawn_scheduler(&mut self) -> SnapshotScheduler {
        let (scheduler, handoff) =
            SnapshotScheduler::spawn(self.snapshots.clone(), self.snapshot_interval);
        self.attach_scheduler(handoff);
        scheduler
    }

    /// Serves a pending snapshot request. Called after every commit; call it
    /// from an idle loop too so snapshots are taken without traffic.
    ///
    /// Returns whether a snapshot was handed over.
    ///
    /// # Errors
    /// [`EngineError::Halted`] once the engine stopped.
    pub fn poll_snapshot(&self) -> Result<bool, EngineError> {
        self.ensure_running()?;
        Ok(self.serve_snapshot())
    }

    fn serve_snapshot(&self) -> bool {
        let Some(handoff) = &self.handoff else {
            return false;
        };
        let book = &self.book;
        let last_applied = self.wal.last_commit_lsn();
        handoff.poll(|| (book.snapshot(), last_applied))
    }

    /// What recovery did.
    pub fn report(&self) -> &RecoveryReport {
        &self.report
    }

    /// The recovered book, read-only: mutation must go through the log.
    pub fn book(&self) -> &B {
        &self.book
    }

    /// Newest durable `COMMIT`.
    pub fn last_commit_lsn(&self) -> Option<Lsn> {
        self.wal.last_commit_lsn()
    }
}

/// Applies one committed transaction and returns how many intents the book
/// refused.
fn replay<B: MatchBook>(book: &mut B, tx: &CommittedTx) -> usize {
    let mut refused = 0;
    for intent in &tx.intents {
        let result = match intent {
            TxIntent::Order(order) => book.submit(order).map(drop),
            TxIntent::Cancel(cancel) => book
                .cancel(cancel.symbol, cancel.price, cancel.order_id)
                .map(drop),
        };
        if let Err(e) = result {
            debug!(tx_id = tx.tx_id, error = %e, "replayed intent refused");
            refused += 1;
        }
    }
    refused
}

impl<B: MatchBook + std::fmt::Debug> std::fmt::Debug for DurableEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableEngine")
            .field("book", &self.book)
            .field("last_commit", &self.wal.last_commit_lsn())
            .field("scheduler", &self.handoff.is_some())
            .field("halted", &self.is_halted())
            .finish()
    }
}
