//! Record framing and payload codecs.
//!
//! # Record Layout (little-endian)
//!
//! ```text
//! offset  size  field
//!  0      2     magic 0xBEEF
//!  2      1     version
//!  3      1     record type
//!  4      4     payload length
//!  8      4     segment id
//! 12      8     index inside the segment
//! 20      8     wall clock millis
//! 28      4     CRC32 of bytes 0..28 followed by the payload
//! 32      N     payload
//! ```

use super::error::WalError;
use super::lsn::Lsn;
use crate::orderbook::types::{
    OrderId, OrderInfo, OrderType, Price, Side, Symbol, TimeInForce,
};
use serde::{Deserialize, Serialize};

/// Record magic.
pub const WAL_MAGIC: u16 = 0xBEEF;

/// Record format version.
pub const WAL_VERSION: u8 = 1;

/// Fixed header size.
pub const WAL_HEADER_SIZE: usize = 32;

const CRC_OFFSET: usize = 28;

/// `tx_id`.
const TX_PAYLOAD_SIZE: usize = 8;

/// `tx_id, user_id, order_id, symbol, side, type, tif, price, qty, time`.
const ORDER_PAYLOAD_SIZE: usize = 8 + 8 + 8 + 4 + 1 + 1 + 1 + 8 + 8 + 8;

/// `tx_id, symbol, order_id, price`.
const CANCEL_PAYLOAD_SIZE: usize = 8 + 4 + 8 + 8;

/// Kind of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// Opens a transaction.
    Begin,
    /// A new order intent.
    Order,
    /// A cancel intent.
    Cancel,
    /// Closes a transaction; only committed intents are replayed.
    Commit,
}

impl RecordType {
    /// Header byte of this type.
    pub const fn code(self) -> u8 {
        match self {
            RecordType::Begin => 1,
            RecordType::Order => 2,
            RecordType::Cancel => 3,
            RecordType::Commit => 4,
        }
    }

    /// Decodes a header byte.
    pub fn from_code(code: u8) -> Result<Self, WalError> {
        match code {
            1 => Ok(RecordType::Begin),
            2 => Ok(RecordType::Order),
            3 => Ok(RecordType::Cancel),
            4 => Ok(RecordType::Commit),
            _ => Err(WalError::UnknownRecordType { code }),
        }
    }
}

/// A logged cancel intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    /// Book symbol.
    pub symbol: Symbol,
    /// Order to cancel.
    pub order_id: OrderId,
    /// Price the order rests at.
    pub price: Price,
}

/// Decoded payload of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordBody {
    /// Transaction start.
    Begin {
        /// Transaction id.
        tx_id: u64,
    },
    /// New order.
    Order {
        /// Transaction id.
        tx_id: u64,
        /// The order as submitted.
        order: OrderInfo,
    },
    /// Cancel.
    Cancel {
        /// Transaction id.
        tx_id: u64,
        /// The cancel intent.
        cancel: CancelRequest,
    },
    /// Transaction end.
    Commit {
        /// Transaction id.
        tx_id: u64,
    },
}

impl RecordBody {
    /// Record type of this body.
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordBody::Begin { .. } => RecordType::Begin,
            RecordBody::Order { .. } => RecordType::Order,
            RecordBody::Cancel { .. } => RecordType::Cancel,
            RecordBody::Commit { .. } => RecordType::Commit,
        }
    }

    /// Transaction the record belongs to.
    pub fn tx_id(&self) -> u64 {
        match self {
            RecordBody::Begin { tx_id }
            | RecordBody::Order { tx_id, .. }
            | RecordBody::Cancel { tx_id, .. }
            | RecordBody::Commit { tx_id } => *tx_id,
        }
    }

    /// Encodes the payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RecordBody::Begin { tx_id } | RecordBody::Commit { tx_id } => {
                tx_id.to_le_bytes().to_vec()
            }
            RecordBody::Order { tx_id, order } => {
                let mut buf = Vec::with_capacity(ORDER_PAYLOAD_SIZE);
                buf.extend_from_slice(&tx_id.to_le_bytes());
                buf.extend_from_slice(&order.user_id.to_le_bytes());
                buf.extend_from_slice(&order.order_id.to_le_bytes());
                buf.extend_from_slice(&order.symbol.to_le_bytes());
                buf.push(order.side.code());
                buf.push(order.order_type.code());
                buf.push(order.tif.code());
                buf.extend_from_slice(&order.price.to_le_bytes());
                buf.extend_from_slice(&order.qty.to_le_bytes());
                buf.extend_from_slice(&order.time.to_le_bytes());
                buf
            }
            RecordBody::Cancel { tx_id, cancel } => {
                let mut buf = Vec::with_capacity(CANCEL_PAYLOAD_SIZE);
                buf.extend_from_slice(&tx_id.to_le_bytes());
                buf.extend_from_slice(&cancel.symbol.to_le_bytes());
                buf.extend_from_slice(&cancel.order_id.to_le_bytes());
                buf.extend_from_slice(&cancel.price.to_le_bytes());
                buf
            }
        }
    }

    /// Decodes a payload of the given type.
    ///
    /// # Errors
    /// [`WalError::PayloadTooShort`] for truncated payloads and
    /// [`WalError::InvalidPayload`] for unknown enum codes.
    pub fn decode(record_type: RecordType, payload: &[u8]) -> Result<Self, WalError> {
        let need = match record_type {
            RecordType::Begin | RecordType::Commit => TX_PAYLOAD_SIZE,
            RecordType::Order => ORDER_PAYLOAD_SIZE,
            RecordType::Cancel => CANCEL_PAYLOAD_SIZE,
        };
        if payload.len() < need {
            return Err(WalError::PayloadTooShort {
                record_type: record_type.code(),
                expected: need,
                actual: payload.len(),
            });
        }
        let mut cur = Cursor { buf: payload, pos: 0 };
        let tx_id = cur.u64();
        Ok(match record_type {
            RecordType::Begin => RecordBody::Begin { tx_id },
            RecordType::Commit => RecordBody::Commit { tx_id },
            RecordType::Order => {
                let user_id = cur.u64();
                let order_id = cur.u64();
                let symbol = cur.u32();
                let side = Side::from_code(cur.u8())?;
                let order_type = OrderType::from_code(cur.u8())?;
                let tif = TimeInForce::from_code(cur.u8())?;
                let price = cur.i64();
                let qty = cur.u64();
                let time = cur.u64();
                RecordBody::Order {
                    tx_id,
                    order: OrderInfo {
                        symbol,
                        user_id,
                        order_id,
                        side,
                        order_type,
                        tif,
                        price,
                        qty,
                        time,
                    },
                }
            }
            RecordType::Cancel => {
                let symbol = cur.u32();
                let order_id = cur.u64();
                let price = cur.i64();
                RecordBody::Cancel {
                    tx_id,
                    cancel: CancelRequest {
                        symbol,
                        order_id,
                        price,
                    },
                }
            }
        })
    }
}

/// Fixed-width little-endian reads over a slice whose length was checked.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take::<4>())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take::<8>())
    }

    fn i64(&mut self) -> i64 {
        i64::from_le_bytes(self.take::<8>())
    }
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalRecord {
    /// Position of the record.
    pub lsn: Lsn,
    /// Wall clock at append time, epoch milliseconds.
    pub wall_clock_millis: u64,
    /// Decoded payload.
    pub body: RecordBody,
}

/// Frames a payload into a complete record.
pub(crate) fn encode_record(
    record_type: RecordType,
    lsn: Lsn,
    wall_clock_millis: u64,
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(WAL_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&WAL_MAGIC.to_le_bytes());
    buf.push(WAL_VERSION);
    buf.push(record_type.code());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&lsn.segment_id.to_le_bytes());
    buf.extend_from_slice(&lsn.index.to_le_bytes());
    buf.extend_from_slice(&wall_clock_millis.to_le_bytes());
    let crc = record_crc(&buf[..CRC_OFFSET], payload);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn record_crc(header: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    hasher.finalize()
}

/// A framed record that passed validation, borrowed from the segment bytes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawRecord<'a> {
    pub record_type: u8,
    pub wall_clock_millis: u64,
    pub payload: &'a [u8],
    /// Header plus payload.
    pub len: usize,
}

/// Validates the record starting at `data[0]`, which must carry
/// `segment_id` and `index`. The error names the first check that failed.
pub(crate) fn check_record(
    data: &[u8],
    segment_id: u32,
    index: u64,
) -> Result<RawRecord<'_>, &'static str> {
    if data.len() < WAL_HEADER_SIZE {
        return Err("short header");
    }
    let u32_at =
        |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
    let u64_at = |at: usize| {
        let mut b = [0u8; 8];
        b.copy_from_slice(&data[at..at + 8]);
        u64::from_le_bytes(b)
    };

    if u16::from_le_bytes([data[0], data[1]]) != WAL_MAGIC {
        return Err("bad magic");
    }
    if data[2] != WAL_VERSION {
        return Err("bad version");
    }
    let payload_len = u32_at(4) as usize;
    if u32_at(8) != segment_id {
        return Err("segment id mismatch");
    }
    if u64_at(12) != index {
        return Err("index out of sequence");
    }
    let end = WAL_HEADER_SIZE
        .checked_add(payload_len)
        .filter(|end| *end <= data.len())
        .ok_or("payload past end of file")?;
    let payload = &data[WAL_HEADER_SIZE..end];
    if u32_at(CRC_OFFSET) != record_crc(&data[..CRC_OFFSET], payload) {
        return Err("crc mismatch");
    }
    Ok(RawRecord {
        record_type: data[3],
        wall_clock_millis: u64_at(20),
        payload,
        len: end,
    })
}

/// Validates and decodes the record at `offset` of segment `segment_id`,
/// which must be the record numbered `index`.
///
/// Returns the record and its framed length. A bad frame and an
/// undecodable payload are both [`WalError::CorruptRecord`].
pub(crate) fn decode_at(
    data: &[u8],
    segment_id: u32,
    offset: usize,
    index: u64,
) -> Result<(WalRecord, usize), WalError> {
    let corrupt = |reason: &'static str| WalError::CorruptRecord {
        segment_id,
        offset: offset as u64,
        reason,
    };
    let raw = check_record(&data[offset..], segment_id, index).map_err(corrupt)?;
    let body = RecordType::from_code(raw.record_type)
        .and_then(|kind| RecordBody::decode(kind, raw.payload))
        .map_err(|_| corrupt("undecodable payload"))?;
    let record = WalRecord {
        lsn: Lsn::new(segment_id, index),
        wall_clock_millis: raw.wall_clock_millis,
        body,
    };
    Ok((record, raw.len))
}
