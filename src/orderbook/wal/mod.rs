//! Transactional write-ahead log.
//!
//! Every mutating request is logged as a transaction before it touches the
//! book: `BEGIN`, one intent record, `COMMIT`. The commit is forced to disk.
//! Recovery replays only transactions whose `COMMIT` record survived, so a
//! crash between the intent and the commit loses the request as a whole.
//!
//! The log is a directory of segment files `wal-000000.bin`,
//! `wal-000001.bin`, ... Each record carries its own [`Lsn`] (segment id and
//! index within the segment) and a CRC32 over header and payload; see
//! [`record`] for the frame layout.

mod appender;
mod error;
mod lsn;
pub mod record;
mod reader;
mod writer;

pub use appender::WalAppender;
pub use error::WalError;
pub use lsn::Lsn;
pub use reader::{CommittedTx, TxIntent, TxScan, WalReader};
pub use record::{CancelRequest, RecordBody, RecordType, WalRecord};
pub use writer::{TxContext, WalWriter};
