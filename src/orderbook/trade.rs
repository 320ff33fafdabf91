/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/
use crate::orderbook::types::{OrderId, Price, Quantity, Side, Symbol, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One execution between an incoming taker and a resting maker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTrade {
    /// Per-book monotonic execution sequence, starting at 1
    pub match_seq: u64,
    /// The symbol this trade belongs to
    pub symbol: Symbol,
    /// Owner of the incoming order
    pub taker_user_id: UserId,
    /// Owner of the resting order
    pub maker_user_id: UserId,
    /// Incoming order
    pub taker_order_id: OrderId,
    /// Resting order
    pub maker_order_id: OrderId,
    /// Side of the incoming order
    pub taker_side: Side,
    /// Execution price, always the maker's price
    pub price: Price,
    /// Executed quantity
    pub qty: Quantity,
    /// Execution time in epoch milliseconds
    pub trade_time: u64,
    /// Whether the maker was fully consumed by this execution
    pub maker_filled: bool,
}

/// Result of consuming the head order of the best opposing level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepMatchResult {
    /// Whether the maker was depleted and removed from the book
    pub maker_filled: bool,
    /// Maker price the step executed at
    pub price: Price,
    /// Quantity traded in this step
    pub qty: Quantity,
    /// Resting order that was hit
    pub maker_order_id: OrderId,
    /// Owner of the resting order
    pub maker_user_id: UserId,
    /// Sequence assigned to the execution
    pub match_seq: u64,
}

/// Liquidity available to a taker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestLiqView {
    /// Best opposing price
    pub price: Price,
    /// Quantity summed over every level at or better than the limit
    pub total_qty: Quantity,
    /// Quantity of the head order at the best price
    pub head_qty: Quantity,
}

/// Notification emitted by the book while processing an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookEvent {
    /// An execution took place
    Traded(MatchTrade),
    /// An order was completely filled, maker or taker
    Filled {
        /// Book symbol
        symbol: Symbol,
        /// The filled order
        order_id: OrderId,
    },
    /// An order left the book or was refused to rest with quantity outstanding
    OrderCancelled {
        /// Book symbol
        symbol: Symbol,
        /// The cancelled order
        order_id: OrderId,
        /// Quantity that will never trade
        remaining_qty: Quantity,
    },
    /// An order was rejected without side effects
    OrderRejected {
        /// Book symbol
        symbol: Symbol,
        /// The rejected order
        order_id: OrderId,
    },
}

impl BookEvent {
    /// Order the event is about; the taker for trades.
    pub fn order_id(&self) -> OrderId {
        match self {
            BookEvent::Traded(trade) => trade.taker_order_id,
            BookEvent::Filled { order_id, .. }
            | BookEvent::OrderCancelled { order_id, .. }
            | BookEvent::OrderRejected { order_id, .. } => *order_id,
        }
    }
}

/// A thread-safe listener callback for book events.
///
/// Invoked synchronously on the matching thread; implementations should hand
/// the event off rather than block.
pub type BookEventListener = Arc<dyn Fn(&BookEvent) + Send + Sync>;
