//! Transaction framing on top of the segment appender.

use super::appender::WalAppender;
use super::error::WalError;
use super::lsn::Lsn;
use super::reader::WalReader;
use super::record::{CancelRequest, RecordBody};
use crate::orderbook::types::{OrderId, OrderInfo, Price, Symbol};
use std::path::Path;
use tracing::{debug, trace};

/// An open transaction.
///
/// Not `Clone`: [`WalWriter::commit_tx`] consumes it, so a transaction can
/// be committed at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct TxContext {
    /// Transaction id.
    pub tx_id: u64,
    /// Position of the BEGIN record.
    pub begin_lsn: Lsn,
}

/// Writes BEGIN, intent and COMMIT records.
///
/// Only COMMIT forces the log to disk; a transaction is durable once
/// [`WalWriter::commit_tx`] returns.
#[derive(Debug)]
pub struct WalWriter {
    appender: WalAppender,
    next_tx_id: u64,
    last_commit: Option<Lsn>,
}

impl WalWriter {
    /// Opens the log in `dir`, cutting it at the first invalid record.
    ///
    /// Transaction ids continue after the highest id still in the log, so
    /// the records the reader sees and the ids handed out always agree.
    pub fn open(dir: impl AsRef<Path>, max_segment_bytes: u64) -> Result<Self, WalError> {
        let dir = dir.as_ref();
        let appender = WalAppender::open(dir, max_segment_bytes)?;
        let scan = WalReader::new(dir).scan_transactions()?;
        let last_commit = scan.committed.last().map(|tx| tx.commit_lsn);
        debug!(
            next_tx_id = scan.max_tx_id + 1,
            committed = scan.committed.len(),
            "WAL writer ready"
        );
        Ok(Self {
            appender,
            next_tx_id: scan.max_tx_id + 1,
            last_commit,
        })
    }

    /// Appends a BEGIN record.
    pub fn begin_tx(&mut self) -> Result<TxContext, WalError> {
        let tx_id = self.next_tx_id;
        let begin_lsn = self.appender.append(&RecordBody::Begin { tx_id })?;
        self.next_tx_id += 1;
        trace!(tx_id, lsn = %begin_lsn, "tx begin");
        Ok(TxContext { tx_id, begin_lsn })
    }

    /// Appends a new-order intent.
    pub fn log_order(&mut self, tx: &TxContext, order: &OrderInfo) -> Result<Lsn, WalError> {
        self.appender.append(&RecordBody::Order {
            tx_id: tx.tx_id,
            order: order.clone(),
        })
    }

    /// Appends a cancel intent.
    pub fn log_cancel(
        &mut self,
        tx: &TxContext,
        symbol: Symbol,
        order_id: OrderId,
        price: Price,
    ) -> Result<Lsn, WalError> {
        self.appender.append(&RecordBody::Cancel {
            tx_id: tx.tx_id,
            cancel: CancelRequest {
                symbol,
                order_id,
                price,
            },
        })
    }

    /// Appends COMMIT and forces the log to disk.
    pub fn commit_tx(&mut self, tx: TxContext) -> Result<Lsn, WalError> {
        let lsn = self.appender.append(&RecordBody::Commit { tx_id: tx.tx_id })?;
        self.appender.force()?;
        self.last_commit = Some(lsn);
        trace!(tx_id = tx.tx_id, lsn = %lsn, "tx commit");
        Ok(lsn)
    }

    /// Position of the newest durable COMMIT.
    pub fn last_commit_lsn(&self) -> Option<Lsn> {
        self.last_commit
    }

    /// Whether a failed write halted the log.
    pub fn is_halted(&self) -> bool {
        self.appender.is_halted()
    }

    /// Id the next transaction gets.
    pub fn next_tx_id(&self) -> u64 {
        self.next_tx_id
    }

    /// The underlying segment appender.
    pub fn appender(&self) -> &WalAppender {
        &self.appender
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::config::DEFAULT_WAL_SEGMENT_BYTES;
    use crate::orderbook::types::{Side, TimeInForce};
    use crate::orderbook::wal::TxIntent;
    use crate::orderbook::wal::appender::segment_path;
    use std::fs;

    #[test]
    fn test_transaction_round_trip() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let order = OrderInfo::limit(1, 2, 3, Side::Ask, TimeInForce::Ioc, 105, 10, 42);
        let commit = {
            let mut wal = WalWriter::open(dir.path(), DEFAULT_WAL_SEGMENT_BYTES)
                .unwrap_or_else(|e| panic!("{e}"));
            let tx = wal.begin_tx().unwrap_or_else(|e| panic!("{e}"));
            assert_eq!(tx.tx_id, 1);
            assert!(wal.log_order(&tx, &order).is_ok());
            assert!(wal.log_cancel(&tx, 1, 3, 105).is_ok());
            wal.commit_tx(tx).unwrap_or_else(|e| panic!("{e}"))
        };
        assert_eq!(commit, Lsn::new(0, 3));

        let committed = WalReader::new(dir.path())
            .committed_after(None)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(committed.len(), 1);
        assert_eq!(
            committed[0].intents,
            vec![
                TxIntent::Order(order),
                TxIntent::Cancel(CancelRequest {
                    symbol: 1,
                    order_id: 3,
                    price: 105
                })
            ]
        );
    }

    #[test]
    fn test_reopen_continues_ids_after_uncommitted() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        {
            let mut wal = WalWriter::open(dir.path(), DEFAULT_WAL_SEGMENT_BYTES)
                .unwrap_or_else(|e| panic!("{e}"));
            let tx = wal.begin_tx().unwrap_or_else(|e| panic!("{e}"));
            assert!(wal.commit_tx(tx).is_ok());
            // Opened but never committed.
            assert!(wal.begin_tx().is_ok());
        }
        let wal = WalWriter::open(dir.path(), DEFAULT_WAL_SEGMENT_BYTES)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(wal.next_tx_id(), 3);
        assert_eq!(wal.last_commit_lsn(), Some(Lsn::new(0, 1)));
        assert_eq!(wal.appender().next_lsn(), Lsn::new(0, 3));
    }

    #[test]
    fn test_commits_after_older_damage_stay_visible() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        {
            // One 40-byte record per segment: B1 C1 B2 C2 in segments 0..=3.
            let mut wal = WalWriter::open(dir.path(), 50).unwrap_or_else(|e| panic!("{e}"));
            for _ in 0..2 {
                let tx = wal.begin_tx().unwrap_or_else(|e| panic!("{e}"));
                assert!(wal.commit_tx(tx).is_ok());
            }
        }
        let path = segment_path(dir.path(), 1);
        let mut bytes = fs::read(&path).unwrap_or_else(|e| panic!("{e}"));
        bytes[35] ^= 0xff;
        fs::write(&path, &bytes).unwrap_or_else(|e| panic!("{e}"));

        let mut wal = WalWriter::open(dir.path(), 50).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(wal.next_tx_id(), 2);
        assert_eq!(wal.last_commit_lsn(), None);
        let tx = wal.begin_tx().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(tx.begin_lsn, Lsn::new(1, 0));
        let commit = wal.commit_tx(tx).unwrap_or_else(|e| panic!("{e}"));

        let committed = WalReader::new(dir.path())
            .committed_txs()
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].tx_id, 2);
        assert_eq!(committed[0].commit_lsn, commit);
    }
}
