//! Loading and verifying snapshot files.

use super::error::{SnapshotError, io_at};
use super::view::SnapshotView;
use super::{
    SNAPSHOT_ARRAYS, SNAPSHOT_HEADER_SIZE, SNAPSHOT_MAGIC, SNAPSHOT_VERSION, parse_snapshot_name,
};
use crate::orderbook::wal::Lsn;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A verified snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSnapshot {
    /// The resting orders.
    pub view: SnapshotView,
    /// Creation time in epoch milliseconds.
    pub created_at_ms: i64,
    /// Last committed log position reflected in the view.
    pub last_applied_lsn: Option<Lsn>,
    /// File the snapshot was read from.
    pub path: PathBuf,
}

/// Finds and decodes the newest snapshot of one base name.
#[derive(Debug, Clone)]
pub struct SnapReader {
    dir: PathBuf,
    base_name: String,
}

/// `Read` adapter that tracks the offset and a running CRC32C.
struct CrcReader<R> {
    inner: R,
    crc: u32,
    offset: usize,
}

impl<R: Read> CrcReader<R> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], SnapshotError> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => SnapshotError::Truncated {
                offset: self.offset,
            },
            _ => SnapshotError::from(e),
        })?;
        self.crc = crc32c::crc32c_append(self.crc, &buf);
        self.offset += N;
        Ok(buf)
    }

    fn u64(&mut self) -> Result<u64, SnapshotError> {
        Ok(u64::from_le_bytes(self.take::<8>()?))
    }

    fn i64(&mut self) -> Result<i64, SnapshotError> {
        Ok(i64::from_le_bytes(self.take::<8>()?))
    }
}

impl SnapReader {
    /// Creates a reader for `<dir>/<base_name>-*.snap`.
    pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_name: base_name.into(),
        }
    }

    /// Path of the newest snapshot by the timestamp in its name.
    pub fn latest_path(&self) -> Result<Option<PathBuf>, SnapshotError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_at(&self.dir)(e)),
        };
        let newest = entries
            .flatten()
            .map(|entry| entry.path())
            .filter_map(|path| parse_snapshot_name(&self.base_name, &path).map(|ts| (ts, path)))
            .max_by_key(|(ts, _)| *ts)
            .map(|(_, path)| path);
        Ok(newest)
    }

    /// Loads the newest snapshot.
    ///
    /// # Errors
    /// [`SnapshotError::NotFound`] when no file exists, otherwise any
    /// validation error of the newest file. Older files are not tried.
    pub fn read_latest(&self) -> Result<LoadedSnapshot, SnapshotError> {
        let path = self.latest_path()?.ok_or_else(|| SnapshotError::NotFound {
            dir: self.dir.clone(),
            base_name: self.base_name.clone(),
        })?;
        Self::read_file(&path)
    }

    /// Decodes and verifies one snapshot file.
    pub fn read_file(path: &Path) -> Result<LoadedSnapshot, SnapshotError> {
        let file = File::open(path).map_err(io_at(path))?;
        let file_len = file.metadata().map_err(io_at(path))?.len() as usize;
        let mut input = CrcReader {
            inner: BufReader::new(file),
            crc: 0,
            offset: 0,
        };

        if &input.take::<6>()? != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic {
                path: path.to_path_buf(),
            });
        }
        let version = u32::from_le_bytes(input.take::<4>()?);
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion { version });
        }
        let created_at_ms = input.i64()?;
        let last_applied_lsn = Lsn::unpack(input.i64()?);
        debug_assert_eq!(input.offset, SNAPSHOT_HEADER_SIZE);

        let mut view = SnapshotView::new();
        for array in 0..SNAPSHOT_ARRAYS {
            let length = i32::from_le_bytes(input.take::<4>()?);
            let remaining = file_len.saturating_sub(input.offset + 4);
            let count = usize::try_from(length)
                .ok()
                .filter(|n| n.checked_mul(8).is_some_and(|bytes| bytes <= remaining))
                .ok_or(SnapshotError::BadArrayLength {
                    array,
                    length: length as i64,
                })?;
            match array {
                0 => view.bid_prices = read_values(&mut input, count, CrcReader::i64)?,
                1 => view.bid_user_ids = read_values(&mut input, count, CrcReader::u64)?,
                2 => view.bid_order_ids = read_values(&mut input, count, CrcReader::u64)?,
                3 => view.bid_qty = read_values(&mut input, count, CrcReader::u64)?,
                4 => view.ask_prices = read_values(&mut input, count, CrcReader::i64)?,
                5 => view.ask_user_ids = read_values(&mut input, count, CrcReader::u64)?,
                6 => view.ask_order_ids = read_values(&mut input, count, CrcReader::u64)?,
                _ => view.ask_qty = read_values(&mut input, count, CrcReader::u64)?,
            }
        }

        let actual = input.crc;
        let expected = u32::from_le_bytes(input.take::<4>()?);
        if expected != actual {
            return Err(SnapshotError::CrcMismatch { expected, actual });
        }
        if !view.is_consistent() {
            return Err(SnapshotError::InconsistentView);
        }
        debug!(
            path = %path.display(),
            bids = view.bid_len(),
            asks = view.ask_len(),
            lsn = ?last_applied_lsn,
            "snapshot loaded"
        );
        Ok(LoadedSnapshot {
            view,
            created_at_ms,
            last_applied_lsn,
            path: path.to_path_buf(),
        })
    }
}

fn read_values<R: Read, T>(
    input: &mut CrcReader<R>,
    count: usize,
    read: fn(&mut CrcReader<R>) -> Result<T, SnapshotError>,
) -> Result<Vec<T>, SnapshotError> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read(input)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::snapshot::SnapWriter;

    fn sample() -> SnapshotView {
        let mut view = SnapshotView::new();
        view.push_bid(100, 1, 11, 5);
        view.push_bid(99, 2, 12, 6);
        view.push_ask(-3, 3, 13, 7);
        view
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let writer = SnapWriter::new(dir.path(), "book");
        let lsn = Lsn::new(3, 17);
        let path = writer
            .write_at(&sample(), Some(lsn), 1_700_000_000_123)
            .unwrap_or_else(|e| panic!("write: {e}"));
        assert!(path.ends_with("book-1700000000.snap"));

        let loaded = SnapReader::new(dir.path(), "book")
            .read_latest()
            .unwrap_or_else(|e| panic!("read: {e}"));
        assert_eq!(loaded.view, sample());
        assert_eq!(loaded.created_at_ms, 1_700_000_000_123);
        assert_eq!(loaded.last_applied_lsn, Some(lsn));
    }

    #[test]
    fn test_newer_write_replaces_older_file() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let writer = SnapWriter::new(dir.path(), "book");
        let other = SnapWriter::new(dir.path(), "other");
        assert!(writer.write_at(&SnapshotView::new(), None, 1_000).is_ok());
        assert!(other.write_at(&sample(), None, 1_000).is_ok());
        let newest = writer
            .write_at(&sample(), None, 5_000)
            .unwrap_or_else(|e| panic!("write: {e}"));

        let reader = SnapReader::new(dir.path(), "book");
        assert_eq!(reader.latest_path().ok().flatten(), Some(newest));
        assert!(!dir.path().join("book-1.snap").exists());
        assert!(dir.path().join("other-1.snap").exists());
        let loaded = reader.read_latest().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(loaded.last_applied_lsn, None);
    }

    #[test]
    fn test_corruption_rejects_whole_file() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = SnapWriter::new(dir.path(), "book")
            .write_at(&sample(), None, 2_000)
            .unwrap_or_else(|e| panic!("write: {e}"));
        let mut bytes = fs::read(&path).unwrap_or_else(|e| panic!("{e}"));

        let body = SNAPSHOT_HEADER_SIZE + 4;
        bytes[body] ^= 0x01;
        fs::write(&path, &bytes).unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            SnapReader::read_file(&path),
            Err(SnapshotError::CrcMismatch { .. })
        ));

        bytes[body] ^= 0x01;
        bytes[0] = b'X';
        fs::write(&path, &bytes).unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            SnapReader::read_file(&path),
            Err(SnapshotError::BadMagic { .. })
        ));

        bytes[0] = b'O';
        bytes[6] = 9;
        fs::write(&path, &bytes).unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            SnapReader::read_file(&path),
            Err(SnapshotError::UnsupportedVersion { version: 9 })
        ));

        bytes[6] = 1;
        bytes[SNAPSHOT_HEADER_SIZE..SNAPSHOT_HEADER_SIZE + 4]
            .copy_from_slice(&(-2i32).to_le_bytes());
        fs::write(&path, &bytes).unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            SnapReader::read_file(&path),
            Err(SnapshotError::BadArrayLength { array: 0, length: -2 })
        ));

        let len = bytes.len();
        fs::write(&path, &bytes[..len - 2]).unwrap_or_else(|e| panic!("{e}"));
        assert!(SnapReader::read_file(&path).is_err());
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let reader = SnapReader::new(dir.path().join("absent"), "book");
        assert!(matches!(reader.latest_path(), Ok(None)));
        assert!(matches!(
            reader.read_latest(),
            Err(SnapshotError::NotFound { .. })
        ));
    }
}
