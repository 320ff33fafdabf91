//! Periodic binary snapshots of the resting orders.
//!
//! # On-Disk Format (little-endian)
//!
//! ```text
//! ["OBSNAP"][u32 version][i64 created_at_ms][i64 last_applied_lsn]
//! 8 x [i32 len][len x 8-byte value]
//! [u32 crc32c over everything before it]
//! ```
//!
//! The arrays are, in order: bid prices, bid user ids, bid order ids, bid
//! quantities, ask prices, ask user ids, ask order ids, ask quantities.
//! `last_applied_lsn` is the packed [`Lsn`](crate::orderbook::wal::Lsn) of
//! the last committed transaction reflected in the file, or -1.
//!
//! Files are named `<base>-<epoch_seconds>.snap`; a successful write removes
//! older files of the same base.

mod error;
mod reader;
mod scheduler;
mod view;
mod writer;

pub use error::SnapshotError;
pub use reader::{LoadedSnapshot, SnapReader};
pub use scheduler::{CapturedSnapshot, SnapshotHandoff, SnapshotScheduler};
pub use view::{SnapshotEntries, SnapshotEntry, SnapshotView};
pub use writer::SnapWriter;

use std::path::Path;

/// File magic.
pub const SNAPSHOT_MAGIC: &[u8; 6] = b"OBSNAP";

/// Current format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Number of value arrays in the body.
pub(crate) const SNAPSHOT_ARRAYS: usize = 8;

/// `magic + version + created_at + lsn`.
pub(crate) const SNAPSHOT_HEADER_SIZE: usize = 6 + 4 + 8 + 8;

/// Extension of finished snapshot files.
pub(crate) const SNAPSHOT_EXT: &str = "snap";

/// Final file name for a snapshot taken at `epoch_secs`.
pub(crate) fn snapshot_file_name(base_name: &str, epoch_secs: i64) -> String {
    format!("{base_name}-{epoch_secs}.{SNAPSHOT_EXT}")
}

/// Timestamp embedded in a snapshot file name of `base_name`, if the name
/// has the expected shape.
pub(crate) fn parse_snapshot_name(base_name: &str, path: &Path) -> Option<i64> {
    let name = path.file_name()?.to_str()?;
    let stamp = name
        .strip_prefix(base_name)?
        .strip_prefix('-')?
        .strip_suffix(SNAPSHOT_EXT)?
        .strip_suffix('.')?;
    if stamp.is_empty() || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stamp.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_snapshot_names() {
        assert_eq!(snapshot_file_name("book", 1_700_000_000), "book-1700000000.snap");
        let p = PathBuf::from("/x/book-1700000000.snap");
        assert_eq!(parse_snapshot_name("book", &p), Some(1_700_000_000));
        assert_eq!(parse_snapshot_name("other", &p), None);
        assert_eq!(parse_snapshot_name("book", Path::new("book-.snap")), None);
        assert_eq!(parse_snapshot_name("book", Path::new("book-12a.snap")), None);
        assert_eq!(parse_snapshot_name("book", Path::new("book-12.snap.tmp")), None);
        assert_eq!(parse_snapshot_name("book", Path::new("book-x-12.snap")), None);
    }
}
