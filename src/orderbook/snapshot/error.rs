//! Error types for the snapshot subsystem.
//!
//! Any [`SnapshotError`] raised while reading means the whole file is
//! unusable; callers fall back to an empty book and a full log replay.

use std::fmt;
use std::path::PathBuf;

/// Errors raised while writing or reading snapshot files.
#[derive(Debug)]
#[non_exhaustive]
pub enum SnapshotError {
    /// An I/O error occurred while reading or writing a snapshot file.
    Io {
        /// The underlying I/O error message.
        message: String,
        /// The file path involved, if known.
        path: Option<PathBuf>,
    },

    /// The file does not start with the snapshot magic.
    BadMagic {
        /// The file that was rejected.
        path: PathBuf,
    },

    /// The file was written by an unknown format version.
    UnsupportedVersion {
        /// Version found in the header.
        version: u32,
    },

    /// The CRC32C trailer does not match the contents.
    CrcMismatch {
        /// Checksum stored in the trailer.
        expected: u32,
        /// Checksum computed over the header and body.
        actual: u32,
    },

    /// The file ended in the middle of a field.
    Truncated {
        /// Byte offset where more data was expected.
        offset: usize,
    },

    /// An array length is negative or larger than the remaining file.
    BadArrayLength {
        /// Index of the array in the body, 0 to 7.
        array: usize,
        /// Length read from the file.
        length: i64,
    },

    /// The eight arrays of a side do not agree in length.
    InconsistentView,

    /// No snapshot with the requested base name exists.
    NotFound {
        /// Directory that was searched.
        dir: PathBuf,
        /// Base name that was looked for.
        base_name: String,
    },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Io { message, path } => {
                if let Some(p) = path {
                    write!(f, "snapshot I/O error at {}: {message}", p.display())
                } else {
                    write!(f, "snapshot I/O error: {message}")
                }
            }
            SnapshotError::BadMagic { path } => {
                write!(f, "not a snapshot file: {}", path.display())
            }
            SnapshotError::UnsupportedVersion { version } => {
                write!(f, "unsupported snapshot version {version}")
            }
            SnapshotError::CrcMismatch { expected, actual } => {
                write!(
                    f,
                    "snapshot checksum mismatch: expected {expected:#010x}, got {actual:#010x}"
                )
            }
            SnapshotError::Truncated { offset } => {
                write!(f, "snapshot truncated at offset {offset}")
            }
            SnapshotError::BadArrayLength { array, length } => {
                write!(f, "snapshot array {array} has invalid length {length}")
            }
            SnapshotError::InconsistentView => {
                write!(f, "snapshot arrays of one side differ in length")
            }
            SnapshotError::NotFound { dir, base_name } => {
                write!(
                    f,
                    "no snapshot named {base_name}-*.snap in {}",
                    dir.display()
                )
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<std::io::Error> for SnapshotError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        SnapshotError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

/// Attaches `path` to an I/O error.
pub(crate) fn io_at(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> SnapshotError + '_ {
    move |e| SnapshotError::Io {
        message: e.to_string(),
        path: Some(path.to_path_buf()),
    }
}
