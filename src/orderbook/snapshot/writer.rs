//! Atomic snapshot writes.

use super::error::{SnapshotError, io_at};
use super::view::SnapshotView;
use super::{
    SNAPSHOT_EXT, SNAPSHOT_MAGIC, SNAPSHOT_VERSION, parse_snapshot_name, snapshot_file_name,
};
use crate::orderbook::wal::Lsn;
use crate::utils::current_time_millis;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// `Write` adapter that folds every byte into a running CRC32C.
struct CrcWriter<W> {
    inner: W,
    crc: u32,
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.crc = crc32c::crc32c_append(self.crc, &buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Writes snapshot files for one base name into one directory.
///
/// A write goes to a temporary file first, is fsynced, renamed into place
/// and followed by a directory fsync, so readers only ever see complete
/// files. Older snapshots of the same base are deleted afterwards.
#[derive(Debug, Clone)]
pub struct SnapWriter {
    dir: PathBuf,
    base_name: String,
}

impl SnapWriter {
    /// Creates a writer. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_name: base_name.into(),
        }
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Base name of the files.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Persists `view` stamped with the current time.
    pub fn write(
        &self,
        view: &SnapshotView,
        last_applied: Option<Lsn>,
    ) -> Result<PathBuf, SnapshotError> {
        self.write_at(view, last_applied, current_time_millis() as i64)
    }

    /// Persists `view` with an explicit creation time in epoch milliseconds.
    ///
    /// Returns the path of the new snapshot.
    pub fn write_at(
        &self,
        view: &SnapshotView,
        last_applied: Option<Lsn>,
        created_at_ms: i64,
    ) -> Result<PathBuf, SnapshotError> {
        if !view.is_consistent() {
            return Err(SnapshotError::InconsistentView);
        }
        fs::create_dir_all(&self.dir).map_err(io_at(&self.dir))?;

        let epoch_secs = created_at_ms.div_euclid(1000);
        let final_path = self.dir.join(snapshot_file_name(&self.base_name, epoch_secs));
        let tmp_path = self
            .dir
            .join(format!(".{}-{epoch_secs}.{SNAPSHOT_EXT}.tmp", self.base_name));

        let result = self.write_tmp(&tmp_path, view, last_applied, created_at_ms);
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, &final_path).map_err(io_at(&final_path))?;
        let synced = File::open(&self.dir).and_then(|d| d.sync_all());
        info!(
            path = %final_path.display(),
            bids = view.bid_len(),
            asks = view.ask_len(),
            lsn = ?last_applied,
            "snapshot written"
        );
        self.retire_older(&final_path, synced);
        Ok(final_path)
    }

    fn write_tmp(
        &self,
        path: &Path,
        view: &SnapshotView,
        last_applied: Option<Lsn>,
        created_at_ms: i64,
    ) -> Result<(), SnapshotError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(io_at(path))?;
        let mut out = CrcWriter {
            inner: BufWriter::new(file),
            crc: 0,
        };

        let lsn = last_applied.map_or(-1, Lsn::pack);
        out.write_all(SNAPSHOT_MAGIC)?;
        out.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
        out.write_all(&created_at_ms.to_le_bytes())?;
        out.write_all(&lsn.to_le_bytes())?;

        write_prices(&mut out, &view.bid_prices)?;
        write_ids(&mut out, &view.bid_user_ids)?;
        write_ids(&mut out, &view.bid_order_ids)?;
        write_ids(&mut out, &view.bid_qty)?;
        write_prices(&mut out, &view.ask_prices)?;
        write_ids(&mut out, &view.ask_user_ids)?;
        write_ids(&mut out, &view.ask_order_ids)?;
        write_ids(&mut out, &view.ask_qty)?;

        let crc = out.crc;
        let mut inner = out.inner;
        inner.write_all(&crc.to_le_bytes())?;
        inner.flush().map_err(io_at(path))?;
        let file = inner
            .into_inner()
            .map_err(|e| SnapshotError::Io {
                message: e.error().to_string(),
                path: Some(path.to_path_buf()),
            })?;
        file.sync_all().map_err(io_at(path))?;
        Ok(())
    }

    /// Older snapshots are only removed once the rename of `keep` is durable.
    fn retire_older(&self, keep: &Path, dir_synced: std::io::Result<()>) {
        match dir_synced {
            Ok(()) => self.delete_older(keep),
            Err(e) => warn!(
                dir = %self.dir.display(),
                error = %e,
                "snapshot directory fsync failed, older snapshots kept"
            ),
        }
    }

    fn delete_older(&self, keep: &Path) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path == keep || parse_snapshot_name(&self.base_name, &path).is_none() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "old snapshot deleted"),
                Err(e) => warn!(path = %path.display(), error = %e, "old snapshot not deleted"),
            }
        }
    }
}

fn write_len<W: Write>(out: &mut W, len: usize) -> Result<(), SnapshotError> {
    let len = i32::try_from(len).map_err(|_| SnapshotError::BadArrayLength {
        array: 0,
        length: len as i64,
    })?;
    out.write_all(&len.to_le_bytes())?;
    Ok(())
}

fn write_prices<W: Write>(out: &mut W, values: &[i64]) -> Result<(), SnapshotError> {
    write_len(out, values.len())?;
    for v in values {
        out.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn write_ids<W: Write>(out: &mut W, values: &[u64]) -> Result<(), SnapshotError> {
    write_len(out, values.len())?;
    for v in values {
        out.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}
