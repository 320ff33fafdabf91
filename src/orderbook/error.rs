//! Order book error types

use crate::orderbook::types::{OrderId, Price, Quantity, Side, Symbol};
use std::fmt;

/// Errors that can occur within the OrderBook
///
/// These are precondition and contract violations. Business outcomes such as
/// a FOK that cannot fill are reported through [`crate::OrderStatus`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OrderBookError {
    /// Order quantity is zero where a positive quantity is required
    InvalidQuantity {
        /// The order carrying the quantity
        order_id: OrderId,
        /// The rejected quantity
        quantity: Quantity,
    },

    /// Order addressed to a symbol this book does not serve
    UnknownSymbol {
        /// The symbol served by this book
        expected: Symbol,
        /// The symbol carried by the request
        actual: Symbol,
    },

    /// Order price is not a multiple of the configured tick
    MisalignedPrice {
        /// The price that failed validation
        price: Price,
        /// The configured tick
        tick: Price,
    },

    /// Price lies outside the hot window of the ring buffer
    PriceOutsideWindow {
        /// The offending price
        price: Price,
        /// Lowest price of the window
        low: Price,
        /// Highest price of the window
        high: Price,
    },

    /// An order with the same id already rests in the queue
    DuplicateOrderId {
        /// The duplicated identifier
        order_id: OrderId,
    },

    /// The node is already linked into a queue
    NodeAlreadyLinked {
        /// Identifier carried by the node
        order_id: OrderId,
    },

    /// Order side does not match the side already resting at the price level
    SideMismatch {
        /// Price of the level
        price: Price,
        /// Side fixed by the level's first order
        level_side: Side,
        /// Side of the rejected order
        order_side: Side,
    },

    /// A node was released while not in use
    DoubleFree {
        /// Identifier last carried by the node
        order_id: OrderId,
    },

    /// Order not found in the book
    OrderNotFound {
        /// The identifier that was looked up
        order_id: OrderId,
    },

    /// A wire enum carried a code outside its domain
    UnknownCode {
        /// Name of the enum being decoded
        kind: &'static str,
        /// The unrecognised code
        code: u8,
    },

    /// A level supplied to a window shift does not fit the slot it would occupy
    MigrationPriceMismatch {
        /// Price the slot requires
        expected: Price,
        /// Price of the supplied level
        actual: Price,
    },

    /// Book configuration failed validation
    InvalidConfig {
        /// Description of the problem
        message: String,
    },

    /// Operation not permitted in the current state
    InvalidOperation {
        /// Description of the error
        message: String,
    },
}

impl fmt::Display for OrderBookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderBookError::InvalidQuantity { order_id, quantity } => {
                write!(f, "invalid quantity {quantity} for order {order_id}")
            }
            OrderBookError::UnknownSymbol { expected, actual } => {
                write!(f, "unknown symbol {actual}: this book serves {expected}")
            }
            OrderBookError::MisalignedPrice { price, tick } => {
                write!(f, "price {price} is not a multiple of tick {tick}")
            }
            OrderBookError::PriceOutsideWindow { price, low, high } => {
                write!(f, "price {price} outside hot window [{low}, {high}]")
            }
            OrderBookError::DuplicateOrderId { order_id } => {
                write!(f, "duplicate order id {order_id}")
            }
            OrderBookError::NodeAlreadyLinked { order_id } => {
                write!(f, "node for order {order_id} is already linked")
            }
            OrderBookError::SideMismatch {
                price,
                level_side,
                order_side,
            } => {
                write!(
                    f,
                    "side mismatch at {price}: level is {level_side}, order is {order_side}"
                )
            }
            OrderBookError::DoubleFree { order_id } => {
                write!(f, "double free of node for order {order_id}")
            }
            OrderBookError::OrderNotFound { order_id } => {
                write!(f, "order not found: {order_id}")
            }
            OrderBookError::UnknownCode { kind, code } => {
                write!(f, "unknown {kind} code {code}")
            }
            OrderBookError::MigrationPriceMismatch { expected, actual } => {
                write!(
                    f,
                    "migration price mismatch: slot expects {expected}, level has {actual}"
                )
            }
            OrderBookError::InvalidConfig { message } => {
                write!(f, "invalid book configuration: {message}")
            }
            OrderBookError::InvalidOperation { message } => {
                write!(f, "Invalid operation: {message}")
            }
        }
    }
}

impl std::error::Error for OrderBookError {}
