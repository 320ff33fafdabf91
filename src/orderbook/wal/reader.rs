//! Sequential log reading and transaction grouping.

use super::appender::{list_segments, segment_path};
use super::error::{WalError, io_at};
use super::lsn::Lsn;
use super::record::{CancelRequest, RecordBody, WalRecord, decode_at};
use crate::orderbook::types::OrderInfo;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One intent of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxIntent {
    /// A new order.
    Order(OrderInfo),
    /// A cancel.
    Cancel(CancelRequest),
}

/// A transaction whose COMMIT record reached the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTx {
    /// Transaction id.
    pub tx_id: u64,
    /// Position of the BEGIN record.
    pub begin_lsn: Lsn,
    /// Position of the COMMIT record.
    pub commit_lsn: Lsn,
    /// Intents in log order.
    pub intents: Vec<TxIntent>,
}

/// Result of grouping the log into transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxScan {
    /// Committed transactions in commit order.
    pub committed: Vec<CommittedTx>,
    /// Ids of transactions that began but never committed.
    pub uncommitted: Vec<u64>,
    /// Highest transaction id seen in any record.
    pub max_tx_id: u64,
    /// Position of the last valid record.
    pub last_lsn: Option<Lsn>,
}

/// Reads every segment of a log directory in order.
///
/// Reading stops at the first record that fails validation, even if later
/// segments exist: nothing after a gap can be trusted to be contiguous.
#[derive(Debug, Clone)]
pub struct WalReader {
    dir: PathBuf,
}

impl WalReader {
    /// Reader over the segments in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory being read.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Decodes all valid records of the log in `dir`.
    pub fn read_dir(dir: impl Into<PathBuf>) -> Result<Vec<WalRecord>, WalError> {
        Self::new(dir).read_all()
    }

    /// Decodes all valid records.
    pub fn read_all(&self) -> Result<Vec<WalRecord>, WalError> {
        let mut records = Vec::new();
        for segment_id in list_segments(&self.dir)? {
            if !self.read_segment(segment_id, &mut records)? {
                break;
            }
        }
        debug!(dir = %self.dir.display(), records = records.len(), "WAL read");
        Ok(records)
    }

    /// Returns `false` when the segment ended on an invalid record.
    fn read_segment(
        &self,
        segment_id: u32,
        out: &mut Vec<WalRecord>,
    ) -> Result<bool, WalError> {
        let path = segment_path(&self.dir, segment_id);
        let file = File::open(&path).map_err(io_at(&path))?;
        if file.metadata().map_err(io_at(&path))?.len() == 0 {
            return Ok(true);
        }
        // SAFETY: read-only mapping; the appender only ever grows the file
        // and is not running while recovery reads it.
        let mmap = unsafe { memmap2::Mmap::map(&file).map_err(io_at(&path))? };
        let data = &mmap[..];

        let mut offset = 0usize;
        let mut index = 0u64;
        while offset < data.len() {
            match decode_at(data, segment_id, offset, index) {
                Ok((record, len)) => {
                    out.push(record);
                    offset += len;
                    index += 1;
                }
                Err(e) => {
                    warn!(error = %e, "WAL read stopped at invalid record");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Groups the valid records into transactions.
    ///
    /// Intents are only reported for transactions with a COMMIT record.
    /// Records of a transaction that was never opened are ignored.
    pub fn scan_transactions(&self) -> Result<TxScan, WalError> {
        Ok(group_transactions(self.read_all()?))
    }

    /// All committed transactions in commit order.
    pub fn committed_txs(&self) -> Result<Vec<CommittedTx>, WalError> {
        Ok(self.scan_transactions()?.committed)
    }

    /// Committed transactions whose COMMIT lies strictly after `after`.
    pub fn committed_after(&self, after: Option<Lsn>) -> Result<Vec<CommittedTx>, WalError> {
        let scan = self.scan_transactions()?;
        Ok(scan
            .committed
            .into_iter()
            .filter(|tx| after.is_none_or(|lsn| tx.commit_lsn > lsn))
            .collect())
    }
}

struct OpenTx {
    begin_lsn: Lsn,
    intents: Vec<TxIntent>,
}

pub(crate) fn group_transactions(records: Vec<WalRecord>) -> TxScan {
    let mut scan = TxScan::default();
    let mut open: FxHashMap<u64, OpenTx> = FxHashMap::default();
    let mut begin_order: Vec<u64> = Vec::new();

    for record in records {
        let tx_id = record.body.tx_id();
        scan.max_tx_id = scan.max_tx_id.max(tx_id);
        scan.last_lsn = Some(record.lsn);
        match record.body {
            RecordBody::Begin { .. } => {
                if open.contains_key(&tx_id) {
                    warn!(tx_id, lsn = %record.lsn, "duplicate BEGIN ignored");
                    continue;
                }
                open.insert(
                    tx_id,
                    OpenTx {
                        begin_lsn: record.lsn,
                        intents: Vec::new(),
                    },
                );
                begin_order.push(tx_id);
            }
            RecordBody::Order { order, .. } => match open.get_mut(&tx_id) {
                Some(tx) => tx.intents.push(TxIntent::Order(order)),
                None => warn!(tx_id, lsn = %record.lsn, "ORDER outside a transaction ignored"),
            },
            RecordBody::Cancel { cancel, .. } => match open.get_mut(&tx_id) {
                Some(tx) => tx.intents.push(TxIntent::Cancel(cancel)),
                None => warn!(tx_id, lsn = %record.lsn, "CANCEL outside a transaction ignored"),
            },
            RecordBody::Commit { .. } => match open.remove(&tx_id) {
                Some(tx) => scan.committed.push(CommittedTx {
                    tx_id,
                    begin_lsn: tx.begin_lsn,
                    commit_lsn: record.lsn,
                    intents: tx.intents,
                }),
                None => warn!(tx_id, lsn = %record.lsn, "COMMIT without BEGIN ignored"),
            },
        }
    }

    scan.uncommitted = begin_order
        .into_iter()
        .filter(|tx_id| open.contains_key(tx_id))
        .collect();
    scan
}
