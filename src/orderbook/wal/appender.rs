//! Segment files and raw record appends.
//!
//! Segments are named `wal-{segment_id:06}.bin`. Record indexes restart at 0
//! in every segment. On open the whole log is scanned in segment order: the
//! scan stops at the first record that fails validation, the segment holding
//! it is truncated there and every later segment is deleted. A torn tail left
//! by a crash mid-append is cut off this way, and so is anything written
//! behind damage in an older segment, which no reader would ever reach.
//!
//! Any failed write, flush, fsync or rotation halts the appender. The
//! buffered bytes are dropped without being flushed, since they may end in
//! half a record, and every later call returns [`WalError::Halted`].

use super::error::{WalError, io_at};
use super::lsn::Lsn;
use super::record::{RecordBody, WAL_HEADER_SIZE, decode_at, encode_record};
use crate::utils::current_time_millis;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// File name of a segment.
pub(crate) fn segment_file_name(segment_id: u32) -> String {
    format!("wal-{segment_id:06}.bin")
}

/// Path of a segment inside `dir`.
pub(crate) fn segment_path(dir: &Path, segment_id: u32) -> PathBuf {
    dir.join(segment_file_name(segment_id))
}

/// Segment id encoded in a file name, if it is a segment.
pub(crate) fn parse_segment_name(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let digits = name.strip_prefix("wal-")?.strip_suffix(".bin")?;
    if digits.len() < 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Segment ids present in `dir`, ascending. A missing directory has none.
pub(crate) fn list_segments(dir: &Path) -> Result<Vec<u32>, WalError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_at(dir)(e)),
    };
    let mut ids: Vec<u32> = entries
        .flatten()
        .filter_map(|entry| parse_segment_name(&entry.path()))
        .collect();
    ids.sort_unstable();
    Ok(ids)
}

/// Valid prefix of one segment.
#[derive(Debug)]
pub(crate) struct SegmentScan {
    /// Bytes covered by valid records.
    pub valid_len: u64,
    /// Number of valid records.
    pub records: u64,
    /// Why the walk stopped before the end of the file, if it did.
    pub stopped: Option<WalError>,
}

/// Walks the valid prefix of a segment's bytes.
pub(crate) fn scan_segment(data: &[u8], segment_id: u32) -> SegmentScan {
    let mut offset = 0usize;
    let mut records = 0u64;
    let mut stopped = None;
    while offset < data.len() {
        match decode_at(data, segment_id, offset, records) {
            Ok((_, len)) => {
                offset += len;
                records += 1;
            }
            Err(e) => {
                stopped = Some(e);
                break;
            }
        }
    }
    SegmentScan {
        valid_len: offset as u64,
        records,
        stopped,
    }
}

fn scan_segment_file(path: &Path, segment_id: u32) -> Result<(SegmentScan, u64), WalError> {
    let file = File::open(path).map_err(io_at(path))?;
    let file_len = file.metadata().map_err(io_at(path))?.len();
    if file_len == 0 {
        let empty = SegmentScan {
            valid_len: 0,
            records: 0,
            stopped: None,
        };
        return Ok((empty, 0));
    }
    // SAFETY: read-only mapping of a segment no appender is writing yet.
    let mmap = unsafe { memmap2::Mmap::map(&file).map_err(io_at(path))? };
    Ok((scan_segment(&mmap, segment_id), file_len))
}

fn sync_dir(dir: &Path) -> Result<(), WalError> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(io_at(dir))
}

/// Appends framed records to the newest segment, rotating on size.
///
/// Appends are buffered; nothing is durable until [`WalAppender::force`].
#[derive(Debug)]
pub struct WalAppender {
    /// Directory containing segment files.
    dir: PathBuf,
    /// Byte budget of a segment.
    max_segment_bytes: u64,
    /// Segment currently appended to.
    segment_id: u32,
    /// Index the next record gets.
    next_index: u64,
    /// Bytes written to the current segment, buffered ones included.
    file_size: u64,
    /// Path of the current segment.
    path: PathBuf,
    /// `None` once halted.
    out: Option<BufWriter<File>>,
}

impl WalAppender {
    /// Opens the log in `dir` and positions after its last valid record.
    ///
    /// Creates segment 0 in an empty directory. See the module docs for the
    /// repair done on a damaged log.
    ///
    /// # Errors
    /// [`WalError::Io`] if the directory or a segment cannot be read, or the
    /// damaged part cannot be cut off.
    pub fn open(dir: impl AsRef<Path>, max_segment_bytes: u64) -> Result<Self, WalError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(io_at(&dir))?;

        let segments = list_segments(&dir)?;
        let mut segment_id = 0u32;
        let mut valid_len = 0u64;
        let mut next_index = 0u64;
        let mut cut_after = None;
        for (pos, &id) in segments.iter().enumerate() {
            let path = segment_path(&dir, id);
            let (scan, file_len) = scan_segment_file(&path, id)?;
            segment_id = id;
            valid_len = scan.valid_len;
            next_index = scan.records;
            if scan.valid_len < file_len {
                let reason = scan
                    .stopped
                    .as_ref()
                    .map_or_else(|| "trailing bytes".to_string(), |e| e.to_string());
                warn!(
                    path = %path.display(),
                    valid_len = scan.valid_len,
                    file_len,
                    %reason,
                    "truncating WAL at first invalid record"
                );
                let file = OpenOptions::new()
                    .write(true)
                    .open(&path)
                    .map_err(io_at(&path))?;
                file.set_len(scan.valid_len).map_err(io_at(&path))?;
                file.sync_all().map_err(io_at(&path))?;
                cut_after = Some(pos);
                break;
            }
        }
        if let Some(pos) = cut_after {
            let orphans = &segments[pos + 1..];
            for &id in orphans {
                let path = segment_path(&dir, id);
                warn!(path = %path.display(), "deleting WAL segment behind damaged record");
                fs::remove_file(&path).map_err(io_at(&path))?;
            }
            if !orphans.is_empty() {
                sync_dir(&dir)?;
            }
        }

        let path = segment_path(&dir, segment_id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_at(&path))?;
        info!(segment_id, next_index, size = valid_len, "WAL segment opened");
        Ok(Self {
            dir,
            max_segment_bytes,
            segment_id,
            next_index,
            file_size: valid_len,
            path,
            out: Some(BufWriter::new(file)),
        })
    }

    /// Frames and appends one record, returning its position.
    ///
    /// # Errors
    /// [`WalError::EntryTooLarge`] if the record cannot fit an empty segment,
    /// which leaves the appender usable. I/O errors from writing or rotating
    /// halt it; so does calling this on a halted appender.
    pub fn append(&mut self, body: &RecordBody) -> Result<Lsn, WalError> {
        if self.out.is_none() {
            return Err(self.halted());
        }
        let payload = body.encode();
        let rec_len = (WAL_HEADER_SIZE + payload.len()) as u64;
        if rec_len > self.max_segment_bytes {
            return Err(WalError::EntryTooLarge {
                entry_bytes: rec_len,
                segment_size: self.max_segment_bytes,
            });
        }
        if self.file_size > 0 && self.file_size + rec_len > self.max_segment_bytes {
            self.rotate()?;
        }

        let lsn = Lsn::new(self.segment_id, self.next_index);
        let bytes = encode_record(body.record_type(), lsn, current_time_millis(), &payload);
        let written = self.writer()?.write_all(&bytes);
        if let Err(e) = written {
            let err = io_at(&self.path)(e);
            return Err(self.halt(err));
        }
        self.file_size += rec_len;
        self.next_index += 1;
        Ok(lsn)
    }

    /// Flushes buffered records and fsyncs the segment.
    ///
    /// # Errors
    /// Any I/O error halts the appender.
    pub fn force(&mut self) -> Result<(), WalError> {
        let out = self.writer()?;
        let synced = out.flush().and_then(|()| out.get_ref().sync_data());
        if let Err(e) = synced {
            let err = io_at(&self.path)(e);
            return Err(self.halt(err));
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), WalError> {
        // A transaction may straddle segments; its head must be durable too.
        self.force()?;
        let next = self.segment_id + 1;
        let path = segment_path(&self.dir, next);
        let opened = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path);
        let file = match opened {
            Ok(file) => file,
            Err(e) => {
                let err = io_at(&path)(e);
                return Err(self.halt(err));
            }
        };
        debug!(from = self.segment_id, to = next, size = self.file_size, "WAL segment rotated");
        self.out = Some(BufWriter::new(file));
        self.segment_id = next;
        self.next_index = 0;
        self.file_size = 0;
        self.path = path;
        Ok(())
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, WalError> {
        match self.out.as_mut() {
            Some(out) => Ok(out),
            None => Err(WalError::Halted {
                path: self.path.clone(),
            }),
        }
    }

    fn halted(&self) -> WalError {
        WalError::Halted {
            path: self.path.clone(),
        }
    }

    /// Drops the writer without flushing what it buffered.
    #[cold]
    fn halt(&mut self, err: WalError) -> WalError {
        if let Some(out) = self.out.take() {
            let (_file, buffered) = out.into_parts();
            error!(
                path = %self.path.display(),
                error = %err,
                discarded = buffered.map_or(0, |b| b.len()),
                "WAL halted"
            );
        }
        err
    }

    /// Whether a failed write halted the appender.
    pub fn is_halted(&self) -> bool {
        self.out.is_none()
    }

    /// Directory holding the segments.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Segment currently appended to.
    pub fn segment_id(&self) -> u32 {
        self.segment_id
    }

    /// Position the next record will get, unless it triggers a rotation.
    pub fn next_lsn(&self) -> Lsn {
        Lsn::new(self.segment_id, self.next_index)
    }

    /// Bytes in the current segment.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

impl Drop for WalAppender {
    fn drop(&mut self) {
        if let Some(out) = self.out.as_mut() {
            if let Err(e) = out.flush() {
                warn!(path = %self.path.display(), error = %e, "WAL flush on close failed");
            }
        }
    }
}
