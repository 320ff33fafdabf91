//! Primitive identifiers and wire enums shared by the book, the WAL and the snapshot.
//!
//! Every enum that crosses a persisted format has an explicit byte code and an
//! exhaustive `from_code`/`code` pair. Decoding an unknown byte is reported as
//! [`OrderBookError::UnknownCode`], which the durability layers treat as corruption.

use crate::orderbook::OrderBookError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Price in integer ticks of the quote currency.
pub type Price = i64;

/// Order quantity in integer lots.
pub type Quantity = u64;

/// Exchange-assigned order identifier, unique per symbol.
pub type OrderId = u64;

/// Owner of an order.
pub type UserId = u64;

/// Numeric instrument identifier.
pub type Symbol = u32;

/// Book side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy side.
    Bid,
    /// Sell side.
    Ask,
}

impl Side {
    /// Wire code of this side.
    #[inline]
    pub const fn code(self) -> u8 {
        match self {
            Side::Bid => 0,
            Side::Ask => 1,
        }
    }

    /// Decodes a side from its wire code.
    pub fn from_code(code: u8) -> Result<Self, OrderBookError> {
        match code {
            0 => Ok(Side::Bid),
            1 => Ok(Side::Ask),
            _ => Err(OrderBookError::UnknownCode { kind: "side", code }),
        }
    }

    /// The side a taker of this side trades against.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "BID"),
            Side::Ask => write!(f, "ASK"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Executes at the limit price or better, may rest.
    Limit,
    /// Sweeps the opposing side, never rests.
    Market,
}

impl OrderType {
    /// Wire code of this order type.
    #[inline]
    pub const fn code(self) -> u8 {
        match self {
            OrderType::Limit => 0,
            OrderType::Market => 1,
        }
    }

    /// Decodes an order type from its wire code.
    pub fn from_code(code: u8) -> Result<Self, OrderBookError> {
        match code {
            0 => Ok(OrderType::Limit),
            1 => Ok(OrderType::Market),
            _ => Err(OrderBookError::UnknownCode {
                kind: "order type",
                code,
            }),
        }
    }
}

/// Time-in-force policy of a limit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good till cancelled: any remainder rests on the book.
    Gtc,
    /// Immediate or cancel: any remainder is cancelled.
    Ioc,
    /// Fill or kill: executes completely or not at all.
    Fok,
}

impl TimeInForce {
    /// Wire code of this policy.
    #[inline]
    pub const fn code(self) -> u8 {
        match self {
            TimeInForce::Gtc => 0,
            TimeInForce::Ioc => 1,
            TimeInForce::Fok => 2,
        }
    }

    /// Decodes a policy from its wire code.
    pub fn from_code(code: u8) -> Result<Self, OrderBookError> {
        match code {
            0 => Ok(TimeInForce::Gtc),
            1 => Ok(TimeInForce::Ioc),
            2 => Ok(TimeInForce::Fok),
            _ => Err(OrderBookError::UnknownCode {
                kind: "time in force",
                code,
            }),
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeInForce::Gtc => write!(f, "GTC"),
            TimeInForce::Ioc => write!(f, "IOC"),
            TimeInForce::Fok => write!(f, "FOK"),
        }
    }
}

/// Terminal or resting outcome of a submitted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted but not yet processed.
    New,
    /// Resting on the book with nothing traded.
    Pending,
    /// Traded in part; the remainder rests (limit) or was cancelled (market).
    PartiallyFilled,
    /// Traded in full.
    Filled,
    /// Remainder cancelled without resting.
    Canceled,
    /// Refused without any side effect.
    Rejected,
}

impl OrderStatus {
    /// Numeric code of this status.
    #[inline]
    pub const fn code(self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Pending => 10,
            OrderStatus::PartiallyFilled => 11,
            OrderStatus::Filled => 12,
            OrderStatus::Canceled => 20,
            OrderStatus::Rejected => 21,
        }
    }

    /// Decodes a status from its numeric code.
    pub fn from_code(code: u8) -> Result<Self, OrderBookError> {
        match code {
            0 => Ok(OrderStatus::New),
            10 => Ok(OrderStatus::Pending),
            11 => Ok(OrderStatus::PartiallyFilled),
            12 => Ok(OrderStatus::Filled),
            20 => Ok(OrderStatus::Canceled),
            21 => Ok(OrderStatus::Rejected),
            _ => Err(OrderBookError::UnknownCode {
                kind: "order status",
                code,
            }),
        }
    }

    /// Whether the order can no longer change.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }
}

/// Kind of intent arriving from intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderEventType {
    /// A new order.
    NewOrder,
    /// Cancellation of a resting order.
    CancelOrder,
    /// Amendment of a resting order.
    ModifyOrder,
}

impl OrderEventType {
    /// Wire code of this event type.
    #[inline]
    pub const fn code(self) -> u8 {
        match self {
            OrderEventType::NewOrder => 0,
            OrderEventType::CancelOrder => 1,
            OrderEventType::ModifyOrder => 2,
        }
    }

    /// Decodes an event type from its wire code.
    pub fn from_code(code: u8) -> Result<Self, OrderBookError> {
        match code {
            0 => Ok(OrderEventType::NewOrder),
            1 => Ok(OrderEventType::CancelOrder),
            2 => Ok(OrderEventType::ModifyOrder),
            _ => Err(OrderBookError::UnknownCode {
                kind: "order event type",
                code,
            }),
        }
    }
}

/// An order intent as handed to the matching core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInfo {
    /// Instrument the order belongs to.
    pub symbol: Symbol,
    /// Owner of the order.
    pub user_id: UserId,
    /// Identifier, unique per symbol.
    pub order_id: OrderId,
    /// Book side.
    pub side: Side,
    /// Limit or market.
    pub order_type: OrderType,
    /// Time-in-force; market orders behave as IOC regardless.
    pub tif: TimeInForce,
    /// Limit price; ignored for market orders.
    pub price: Price,
    /// Quantity to trade, must be positive.
    pub qty: Quantity,
    /// Arrival time in epoch milliseconds.
    pub time: u64,
}

impl OrderInfo {
    /// Convenience constructor for a limit order.
    #[allow(clippy::too_many_arguments)]
    pub fn limit(
        symbol: Symbol,
        user_id: UserId,
        order_id: OrderId,
        side: Side,
        tif: TimeInForce,
        price: Price,
        qty: Quantity,
        time: u64,
    ) -> Self {
        Self {
            symbol,
            user_id,
            order_id,
            side,
            order_type: OrderType::Limit,
            tif,
            price,
            qty,
            time,
        }
    }

    /// Convenience constructor for a market order.
    pub fn market(
        symbol: Symbol,
        user_id: UserId,
        order_id: OrderId,
        side: Side,
        qty: Quantity,
        time: u64,
    ) -> Self {
        Self {
            symbol,
            user_id,
            order_id,
            side,
            order_type: OrderType::Market,
            tif: TimeInForce::Ioc,
            price: 0,
            qty,
            time,
        }
    }
}
