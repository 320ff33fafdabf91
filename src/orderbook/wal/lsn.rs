//! Log sequence numbers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a record in the log: its segment and its index inside that
/// segment. Ordered by segment first, then index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lsn {
    /// Segment file the record lives in.
    pub segment_id: u32,
    /// Zero-based record index inside the segment.
    pub index: u64,
}

impl Lsn {
    /// Creates an LSN.
    pub const fn new(segment_id: u32, index: u64) -> Self {
        Self { segment_id, index }
    }

    /// Packs the LSN into one signed word: segment in the high 32 bits,
    /// the low 32 bits of the index below it.
    pub const fn pack(self) -> i64 {
        ((self.segment_id as i64) << 32) | (self.index & 0xffff_ffff) as i64
    }

    /// Reverses [`Lsn::pack`]. Negative values mean "no position".
    pub const fn unpack(packed: i64) -> Option<Self> {
        if packed < 0 {
            return None;
        }
        Some(Self {
            segment_id: (packed >> 32) as u32,
            index: (packed & 0xffff_ffff) as u64,
        })
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment_id, self.index)
    }
}
