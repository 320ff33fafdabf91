//! # Ring-Buffer Limit Order Book with Durable Matching
//!
//! A single-instrument limit order book and matching core. Resting liquidity
//! near the market lives in a price-indexed ring buffer (the hot zone) with
//! O(1) access per price; everything further away is parked in sorted maps
//! (the cold zone). A recentering policy slides the hot window after trading
//! so the best bid stays near its middle.
//!
//! Around the book sits a durability layer: every request is written to a
//! transactional write-ahead log before it is matched, and a background task
//! persists periodic CRC32C-checked snapshots. On restart the newest snapshot
//! is loaded and the committed tail of the log is replayed.
//!
//! ## Key Features
//!
//! - **Hot/Cold Zones**: a power-of-two ring of [`orderbook::PriceLevel`]s
//!   addressed by mask arithmetic, backed by `BTreeMap`s for out-of-window
//!   prices. Matching always considers the better of both zones.
//!
//! - **Handle-Based Order Queues**: orders are nodes in an arena
//!   ([`orderbook::OrderNodePool`]) linked into FIFO queues by handle, giving
//!   O(1) append, cancel and head removal. The pool spills into an overflow
//!   arena under bursts and reports its usage.
//!
//! - **Order Types**: MARKET, and LIMIT with GTC, IOC and FOK. FOK checks the
//!   reachable liquidity first and is rejected without side effects.
//!
//! - **Write-Ahead Log**: segment files of CRC32-framed records grouped into
//!   `BEGIN` / intent / `COMMIT` transactions. Only committed transactions
//!   are replayed; a torn tail is cut off on open.
//!
//! - **Snapshots**: a columnar binary image of every resting order with a
//!   CRC32C trailer, written atomically via rename.
//!
//! ## Threading Model
//!
//! A book is owned by one matching thread and mutated through `&mut self`.
//! The snapshot task never touches the book: it raises a flag, and the
//! matching thread captures a [`orderbook::SnapshotView`] between two orders
//! and hands it over a channel.
//!
//! ## Example
//!
//! ```rust
//! use ringbook::prelude::*;
//!
//! let config = BookConfig::new(1, 1, 100, 109);
//! let mut book = OrderBook::new(&config)?;
//!
//! let ask = OrderInfo::limit(1, 10, 1, Side::Ask, TimeInForce::Gtc, 105, 5, 0);
//! assert_eq!(book.submit(&ask)?, OrderStatus::Pending);
//!
//! let bid = OrderInfo::limit(1, 11, 2, Side::Bid, TimeInForce::Ioc, 106, 3, 1);
//! assert_eq!(book.submit(&bid)?, OrderStatus::Filled);
//! assert_eq!(book.order_qty(105, 1), Some(2));
//! # Ok::<(), OrderBookError>(())
//! ```
//!
//! ## Durable Engine
//!
//! ```rust,no_run
//! use ringbook::prelude::*;
//!
//! # fn main() -> Result<(), EngineError> {
//! let config = EngineConfig::new(BookConfig::new(1, 1, 100, 109), "/var/lib/ringbook");
//! let mut engine = DurableEngine::open(config)?;
//! println!("recovered: {:?}", engine.report());
//!
//! let order = OrderInfo::limit(1, 10, 1, Side::Bid, TimeInForce::Gtc, 104, 5, 0);
//! engine.submit(&order)?;
//! engine.snapshot_now()?;
//! # Ok(())
//! # }
//! ```

pub mod orderbook;

pub mod prelude;
mod utils;

pub use orderbook::{
    BookConfig, BookEvent, DurableEngine, EngineConfig, EngineError, MatchBook, OrderBook,
    OrderBookError, OrderInfo, OrderStatus, RecoveryReport, SnapshotView,
};
pub use utils::current_time_millis;
