//! Keeps the hot window centred on the market.
//!
//! The manager holds no state besides its policy. After trading it measures
//! where the best bid sits inside the window and, when it drifted too far
//! from the target, pulls the nearest cold level on the lagging side into
//! the window. Every migration is fuelled by a level popped from the cold
//! zone: with nothing to pull, the window stays where it is.

use crate::orderbook::OrderBookError;
use crate::orderbook::cold::ColdOrderBuffer;
use crate::orderbook::config::RecenterConfig;
use crate::orderbook::level::PriceLevel;
use crate::orderbook::pool::OrderNodePool;
use crate::orderbook::ring::RingOrderBuffer;
use tracing::{debug, trace};

/// Direction of a window shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDirection {
    /// Toward lower prices.
    Left,
    /// Toward higher prices.
    Right,
}

/// Skew-driven recentering policy.
#[derive(Debug, Clone, Default)]
pub struct RecenterManager {
    config: RecenterConfig,
}

impl RecenterManager {
    /// Creates a manager with the given policy.
    pub fn new(config: RecenterConfig) -> Self {
        Self { config }
    }

    /// Active policy.
    pub fn config(&self) -> &RecenterConfig {
        &self.config
    }

    /// Whether the book should check after every execution.
    #[inline]
    pub fn on_every_trade(&self) -> bool {
        self.config.enabled && self.config.on_every_trade
    }

    /// Direction and number of single-tick shifts for a given skew.
    ///
    /// Returns `None` when recentering is off, no bid rests in the window, or
    /// the deviation from the target is below one step.
    pub fn plan(&self, skew: Option<u32>) -> Option<(ShiftDirection, usize)> {
        if !self.config.enabled || self.config.step_percent == 0 {
            return None;
        }
        let skew = skew?;
        let target = self.config.target_percent;
        let deviation = skew.abs_diff(target);
        let steps = ((deviation / self.config.step_percent) as usize)
            .min(self.config.max_steps_per_call);
        if steps == 0 {
            return None;
        }
        let direction = if skew < target {
            ShiftDirection::Left
        } else {
            ShiftDirection::Right
        };
        Some((direction, steps))
    }

    /// Measures the skew and performs the planned migrations.
    ///
    /// Moving left is fuelled by the best cold bid, moving right by the best
    /// cold ask. A migration is skipped, and the call ends, when the cold
    /// side is empty, when its best level lies on the wrong side of the
    /// window or when reaching it would evict the best bid still in the
    /// window.
    ///
    /// Returns the number of ticks the window moved.
    pub fn check_and_recenter(
        &self,
        ring: &mut RingOrderBuffer,
        cold: &mut ColdOrderBuffer,
        pool: &mut OrderNodePool,
    ) -> Result<usize, OrderBookError> {
        let skew = ring.skew_percent();
        let Some((direction, steps)) = self.plan(skew) else {
            return Ok(0);
        };
        let mut moved = 0;
        let mut migrations = 0;
        while migrations < steps {
            let Some(incoming) = Self::next_fuel(ring, cold, direction) else {
                break;
            };
            moved += Self::swap_in(ring, cold, pool, incoming)?;
            migrations += 1;
        }
        if migrations > 0 {
            debug!(
                ?skew,
                ?direction,
                migrations,
                moved,
                low = ring.low_price(),
                high = ring.high_price(),
                "window recentered"
            );
        }
        Ok(moved)
    }

    fn next_fuel(
        ring: &RingOrderBuffer,
        cold: &mut ColdOrderBuffer,
        direction: ShiftDirection,
    ) -> Option<PriceLevel> {
        let width = ring.high_price() - ring.low_price();
        let best_bid = ring.best_bid_price();
        match direction {
            ShiftDirection::Left => {
                let price = cold.best_bid()?.price();
                if price >= ring.low_price() || best_bid.is_some_and(|b| b > price + width) {
                    return None;
                }
                cold.pop_best_bid()
            }
            ShiftDirection::Right => {
                let price = cold.best_ask()?.price();
                if price <= ring.high_price() || best_bid.is_some_and(|b| b < price - width) {
                    return None;
                }
                cold.pop_best_ask()
            }
        }
    }

    /// Migrates the window to `incoming`, parks the evicted levels in the
    /// cold zone and pulls back any cold level that now lies in the window.
    ///
    /// Returns the number of evicted slots.
    pub fn swap_in(
        ring: &mut RingOrderBuffer,
        cold: &mut ColdOrderBuffer,
        pool: &mut OrderNodePool,
        incoming: PriceLevel,
    ) -> Result<usize, OrderBookError> {
        let evicted = ring.migrate(pool, incoming)?;
        let shifted = evicted.len();
        for level in cold.put_all(evicted) {
            Self::merge_into_cold(cold, pool, level)?;
        }
        for level in cold.drain_range(ring.low_price(), ring.high_price()) {
            trace!(price = level.price(), "cold level absorbed into window");
            ring.absorb(pool, level)?;
        }
        Ok(shifted)
    }

    /// Appends an evicted level behind the cold level already at its price.
    fn merge_into_cold(
        cold: &mut ColdOrderBuffer,
        pool: &mut OrderNodePool,
        level: PriceLevel,
    ) -> Result<(), OrderBookError> {
        let mut resting = cold
            .take_exact(level.price())
            .unwrap_or_else(|| PriceLevel::new(level.price()));
        resting.absorb(pool, level)?;
        if let Err(level) = cold.put(resting) {
            return Err(OrderBookError::InvalidOperation {
                message: format!("cold level {} could not be parked", level.price()),
            });
        }
        Ok(())
    }
}
