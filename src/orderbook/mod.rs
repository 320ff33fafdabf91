//! Single-instrument order book with a hot ring window, a cold overflow
//! zone, and the durability layer around them.

pub mod book;
pub mod config;
pub mod engine;
pub mod error;
pub mod matching;
pub mod operations;
pub mod recenter;
pub mod snapshot;
/// Trades, match steps and book events.
pub mod trade;
pub mod types;
pub mod wal;

mod cold;
mod level;
mod pool;
mod queue;
mod ring;


pub use book::{MatchBook, OrderBook};
pub use cold::ColdOrderBuffer;
pub use config::{BookConfig, EngineConfig, RecenterConfig};
pub use engine::{DurableEngine, EngineError, RecoveryReport};
pub use error::OrderBookError;
pub use level::PriceLevel;
pub use pool::{NodeHandle, OrderNode, OrderNodePool, PoolStats};
pub use queue::{OrderQueue, QueueIter};
pub use recenter::{RecenterManager, ShiftDirection};
pub use ring::{RingOrderBuffer, SideLevels};
pub use snapshot::{SnapReader, SnapWriter, SnapshotError, SnapshotScheduler, SnapshotView};
pub use trade::{BestLiqView, BookEvent, BookEventListener, MatchTrade, StepMatchResult};
pub use types::{
    OrderEventType, OrderId, OrderInfo, OrderStatus, OrderType, Price, Quantity, Side, Symbol,
    TimeInForce, UserId,
};
pub use wal::{Lsn, WalError, WalReader, WalWriter};
