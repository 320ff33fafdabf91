//! Book and engine configuration.
//!
//! Both structures deserialize from JSON so they can live next to the other
//! service settings; every optional field has a default.

use crate::orderbook::OrderBookError;
use crate::orderbook::types::{Price, Symbol};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of preallocated order nodes.
pub const DEFAULT_POOL_CAPACITY: usize = 64 * 1024;

/// Default WAL segment budget (64 MiB).
pub const DEFAULT_WAL_SEGMENT_BYTES: u64 = 64 * 1024 * 1024;

/// Default period between snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 60_000;

fn default_pool_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}

fn default_wal_segment_bytes() -> u64 {
    DEFAULT_WAL_SEGMENT_BYTES
}

fn default_snapshot_interval_ms() -> u64 {
    DEFAULT_SNAPSHOT_INTERVAL_MS
}

fn default_snapshot_base_name() -> String {
    "orderbook".to_string()
}

/// Window recentering policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecenterConfig {
    /// Turns recentering off entirely.
    pub enabled: bool,
    /// Desired best-bid position inside the window, in percent.
    pub target_percent: u32,
    /// Deviation that buys one single-tick migration, in percent.
    pub step_percent: u32,
    /// Upper bound on migrations per check.
    pub max_steps_per_call: usize,
    /// Check after every execution instead of once per order.
    pub on_every_trade: bool,
}

impl Default for RecenterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_percent: 50,
            step_percent: 10,
            max_steps_per_call: 4,
            on_every_trade: true,
        }
    }
}

/// Geometry and sizing of one order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookConfig {
    /// Instrument served by the book.
    pub symbol: Symbol,
    /// Price increment.
    pub tick: Price,
    /// Initial lowest price of the hot window.
    pub low_price: Price,
    /// Initial highest price of the hot window.
    pub high_price: Price,
    /// Preallocated order nodes.
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
    /// Recentering policy.
    #[serde(default)]
    pub recenter: RecenterConfig,
}

impl BookConfig {
    /// Configuration with default sizing and recentering.
    pub fn new(symbol: Symbol, tick: Price, low_price: Price, high_price: Price) -> Self {
        Self {
            symbol,
            tick,
            low_price,
            high_price,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            recenter: RecenterConfig::default(),
        }
    }

    /// Same configuration with recentering switched off.
    pub fn without_recentering(mut self) -> Self {
        self.recenter.enabled = false;
        self
    }

    /// Checks the window geometry and the recentering policy.
    pub fn validate(&self) -> Result<(), OrderBookError> {
        if self.tick <= 0 {
            return Err(OrderBookError::InvalidConfig {
                message: format!("tick must be positive, got {}", self.tick),
            });
        }
        if self.high_price < self.low_price {
            return Err(OrderBookError::InvalidConfig {
                message: format!(
                    "window [{}, {}] is inverted",
                    self.low_price, self.high_price
                ),
            });
        }
        if (self.high_price - self.low_price) % self.tick != 0 {
            return Err(OrderBookError::InvalidConfig {
                message: "window bounds are not on the tick grid".to_string(),
            });
        }
        if self.recenter.target_percent > 100 {
            return Err(OrderBookError::InvalidConfig {
                message: format!(
                    "recenter target {}% is above 100%",
                    self.recenter.target_percent
                ),
            });
        }
        if self.recenter.step_percent == 0 {
            return Err(OrderBookError::InvalidConfig {
                message: "recenter step must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Book configuration plus durability settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The book.
    pub book: BookConfig,
    /// Directory of WAL segments.
    pub wal_dir: PathBuf,
    /// Byte budget of one WAL segment.
    #[serde(default = "default_wal_segment_bytes")]
    pub wal_segment_bytes: u64,
    /// Directory of snapshot files.
    pub snapshot_dir: PathBuf,
    /// Base name shared by the snapshot files of this book.
    #[serde(default = "default_snapshot_base_name")]
    pub snapshot_base_name: String,
    /// Period between snapshots.
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
}

impl EngineConfig {
    /// Configuration with both durability stores under `root`.
    pub fn new(book: BookConfig, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            book,
            wal_dir: root.join("wal"),
            wal_segment_bytes: DEFAULT_WAL_SEGMENT_BYTES,
            snapshot_dir: root.join("snapshots"),
            snapshot_base_name: default_snapshot_base_name(),
            snapshot_interval_ms: DEFAULT_SNAPSHOT_INTERVAL_MS,
        }
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, OrderBookError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| OrderBookError::InvalidConfig {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the book and the durability settings.
    pub fn validate(&self) -> Result<(), OrderBookError> {
        self.book.validate()?;
        if self.wal_segment_bytes == 0 {
            return Err(OrderBookError::InvalidConfig {
                message: "WAL segment budget must be positive".to_string(),
            });
        }
        if self.snapshot_base_name.is_empty() || self.snapshot_base_name.contains('/') {
            return Err(OrderBookError::InvalidConfig {
                message: format!("bad snapshot base name {:?}", self.snapshot_base_name),
            });
        }
        Ok(())
    }
}
