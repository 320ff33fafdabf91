//! Error types for the write-ahead log.

use crate::orderbook::OrderBookError;
use std::fmt;
use std::path::PathBuf;

/// Errors that can occur while appending to or reading the log.
#[derive(Debug)]
#[non_exhaustive]
pub enum WalError {
    /// An I/O error occurred while reading or writing segment files.
    Io {
        /// The underlying I/O error message.
        message: String,
        /// The file path involved, if known.
        path: Option<PathBuf>,
    },

    /// A record failed header or CRC32 validation.
    CorruptRecord {
        /// Segment holding the record.
        segment_id: u32,
        /// Byte offset of the record inside the segment.
        offset: u64,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// The record type byte is not one of the known kinds.
    UnknownRecordType {
        /// The byte found in the header.
        code: u8,
    },

    /// A payload is shorter than its record type requires.
    PayloadTooShort {
        /// The record type code.
        record_type: u8,
        /// Bytes required.
        expected: usize,
        /// Bytes present.
        actual: usize,
    },

    /// An enum byte inside a payload could not be decoded.
    InvalidPayload(OrderBookError),

    /// An earlier write, fsync or rotation failed. The appender discarded
    /// its buffer and accepts nothing more; reopen the log to continue.
    Halted {
        /// Segment that was being written.
        path: PathBuf,
    },

    /// A single record does not fit into an empty segment.
    EntryTooLarge {
        /// Encoded record size.
        entry_bytes: u64,
        /// Segment byte budget.
        segment_size: u64,
    },
}

impl fmt::Display for WalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalError::Io { message, path } => {
                if let Some(p) = path {
                    write!(f, "WAL I/O error at {}: {message}", p.display())
                } else {
                    write!(f, "WAL I/O error: {message}")
                }
            }
            WalError::CorruptRecord {
                segment_id,
                offset,
                reason,
            } => {
                write!(
                    f,
                    "corrupt WAL record in segment {segment_id} at offset {offset}: {reason}"
                )
            }
            WalError::UnknownRecordType { code } => {
                write!(f, "unknown WAL record type {code}")
            }
            WalError::PayloadTooShort {
                record_type,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "WAL payload of type {record_type} too short: {actual} < {expected} bytes"
                )
            }
            WalError::InvalidPayload(err) => write!(f, "invalid WAL payload: {err}"),
            WalError::Halted { path } => {
                write!(f, "WAL halted after a failed write to {}", path.display())
            }
            WalError::EntryTooLarge {
                entry_bytes,
                segment_size,
            } => {
                write!(
                    f,
                    "WAL record too large: {entry_bytes} bytes exceeds segment size \
                     {segment_size} bytes"
                )
            }
        }
    }
}

impl std::error::Error for WalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WalError::InvalidPayload(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WalError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        WalError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<OrderBookError> for WalError {
    #[cold]
    fn from(err: OrderBookError) -> Self {
        WalError::InvalidPayload(err)
    }
}

/// Attaches `path` to an I/O error.
pub(crate) fn io_at(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> WalError + '_ {
    move |e| WalError::Io {
        message: e.to_string(),
        path: Some(path.to_path_buf()),
    }
}
