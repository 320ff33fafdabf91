//! Prelude module that re-exports commonly used types and traits.
//!
//! ```rust
//! use ringbook::prelude::*;
//! ```

// Core book types
pub use crate::orderbook::{MatchBook, OrderBook, OrderBookError};

// Orders and wire enums
pub use crate::orderbook::types::{
    OrderEventType, OrderId, OrderInfo, OrderStatus, OrderType, Price, Quantity, Side, Symbol,
    TimeInForce, UserId,
};

// Events
pub use crate::orderbook::trade::{BookEvent, BookEventListener, MatchTrade};

// Configuration
pub use crate::orderbook::config::{BookConfig, EngineConfig, RecenterConfig};

// Durability
pub use crate::orderbook::engine::{DurableEngine, EngineError, RecoveryReport};
pub use crate::orderbook::snapshot::{
    SnapReader, SnapWriter, SnapshotError, SnapshotScheduler, SnapshotView,
};
pub use crate::orderbook::wal::{Lsn, WalError, WalReader, WalWriter};

// Utility functions
pub use crate::utils::current_time_millis;
