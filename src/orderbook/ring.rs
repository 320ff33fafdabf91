//! Hot zone: a price-indexed circular array of levels around the market.
//!
//! The window `[low_price, high_price]` is mapped onto the slots
//! `[low_idx, high_idx]` of a power-of-two array, so finding the level for a
//! price is one subtraction, one division and a mask. Sliding the window is a
//! matter of moving both indices; levels never move between slots.

use crate::orderbook::OrderBookError;
use crate::orderbook::level::PriceLevel;
use crate::orderbook::pool::{NodeHandle, OrderNodePool};
use crate::orderbook::types::{OrderId, Price, Quantity, Side};
use std::fmt::Write;
use tracing::trace;

/// Circular buffer of [`PriceLevel`]s covering a sliding price window.
#[derive(Debug)]
pub struct RingOrderBuffer {
    levels: Vec<PriceLevel>,
    mask: usize,
    /// Number of slots inside the window.
    width: usize,
    step: Price,
    low_idx: usize,
    high_idx: usize,
    low_price: Price,
    high_price: Price,
    best_bid_idx: Option<usize>,
    best_ask_idx: Option<usize>,
}

impl RingOrderBuffer {
    /// Creates a ring covering `[low_price, high_price]` with tick `step`.
    ///
    /// # Errors
    /// [`OrderBookError::InvalidConfig`] when the tick is not positive, the
    /// bounds are inverted or the range is not a whole number of ticks.
    pub fn new(
        step: Price,
        low_price: Price,
        high_price: Price,
    ) -> Result<Self, OrderBookError> {
        if step <= 0 {
            return Err(OrderBookError::InvalidConfig {
                message: format!("tick must be positive, got {step}"),
            });
        }
        if high_price < low_price {
            return Err(OrderBookError::InvalidConfig {
                message: format!("window [{low_price}, {high_price}] is inverted"),
            });
        }
        let span = high_price
            .checked_sub(low_price)
            .ok_or_else(|| OrderBookError::InvalidConfig {
                message: "window span overflows".to_string(),
            })?;
        if span % step != 0 {
            return Err(OrderBookError::InvalidConfig {
                message: format!("window span {span} is not a multiple of tick {step}"),
            });
        }
        let width = usize::try_from(span / step)
            .ok()
            .and_then(|ticks| ticks.checked_add(1))
            .ok_or_else(|| OrderBookError::InvalidConfig {
                message: "window too wide".to_string(),
            })?;
        let length = width.checked_next_power_of_two().ok_or_else(|| {
            OrderBookError::InvalidConfig {
                message: "window too wide".to_string(),
            }
        })?;

        let levels = (0..length)
            .map(|i| PriceLevel::new(low_price.saturating_add(step.saturating_mul(i as Price))))
            .collect();

        Ok(Self {
            levels,
            mask: length - 1,
            width,
            step,
            low_idx: 0,
            high_idx: width - 1,
            low_price,
            high_price,
            best_bid_idx: None,
            best_ask_idx: None,
        })
    }

    /// Lowest price in the window.
    #[inline]
    pub fn low_price(&self) -> Price {
        self.low_price
    }

    /// Highest price in the window.
    #[inline]
    pub fn high_price(&self) -> Price {
        self.high_price
    }

    /// Slot holding the lowest price.
    #[inline]
    pub fn low_idx(&self) -> usize {
        self.low_idx
    }

    /// Slot holding the highest price.
    #[inline]
    pub fn high_idx(&self) -> usize {
        self.high_idx
    }

    /// Tick size.
    #[inline]
    pub fn step(&self) -> Price {
        self.step
    }

    /// Number of prices covered by the window.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Length of the backing array, a power of two.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.levels.len()
    }

    /// Whether `price` lies inside the window bounds.
    #[inline]
    pub fn is_in_window(&self, price: Price) -> bool {
        price >= self.low_price && price <= self.high_price
    }

    #[inline]
    fn offset_of(&self, slot: usize) -> usize {
        slot.wrapping_sub(self.low_idx) & self.mask
    }

    #[inline]
    fn slot_at(&self, offset: usize) -> usize {
        self.low_idx.wrapping_add(offset) & self.mask
    }

    /// Slot for a tick-aligned price inside the window.
    pub fn slot_index(&self, price: Price) -> Option<usize> {
        if !self.is_in_window(price) {
            return None;
        }
        let delta = price - self.low_price;
        if delta % self.step != 0 {
            return None;
        }
        Some(self.slot_at((delta / self.step) as usize))
    }

    /// Price currently mapped to `slot`, `None` for slots outside the window.
    pub fn price_of(&self, slot: usize) -> Option<Price> {
        if slot > self.mask {
            return None;
        }
        let offset = self.offset_of(slot);
        if offset >= self.width {
            return None;
        }
        Some(self.low_price + (offset as Price) * self.step)
    }

    fn checked_slot(&self, price: Price) -> Result<usize, OrderBookError> {
        if !self.is_in_window(price) {
            return Err(OrderBookError::PriceOutsideWindow {
                price,
                low: self.low_price,
                high: self.high_price,
            });
        }
        self.slot_index(price)
            .ok_or(OrderBookError::MisalignedPrice {
                price,
                tick: self.step,
            })
    }

    /// Rests an order at `price`.
    ///
    /// # Errors
    /// Fails for prices outside the window or off the tick grid, and for any
    /// queue or side violation reported by the level.
    pub fn submit(
        &mut self,
        pool: &mut OrderNodePool,
        price: Price,
        handle: NodeHandle,
    ) -> Result<(), OrderBookError> {
        let slot = self.checked_slot(price)?;
        self.levels[slot].submit(pool, handle)?;
        self.promote(slot, pool[handle].side);
        Ok(())
    }

    fn promote(&mut self, slot: usize, side: Side) {
        let offset = self.offset_of(slot);
        match side {
            Side::Bid => {
                let better = self
                    .best_bid_idx
                    .is_none_or(|best| offset > self.offset_of(best));
                if better {
                    trace!(slot, price = self.levels[slot].price(), "best bid moved up");
                    self.best_bid_idx = Some(slot);
                }
            }
            Side::Ask => {
                let better = self
                    .best_ask_idx
                    .is_none_or(|best| offset < self.offset_of(best));
                if better {
                    trace!(slot, price = self.levels[slot].price(), "best ask moved down");
                    self.best_ask_idx = Some(slot);
                }
            }
        }
    }

    /// Rescans from a drained best slot toward the window edge of its side.
    fn after_drain(&mut self, slot: usize) {
        if !self.levels[slot].is_empty() {
            return;
        }
        let offset = self.offset_of(slot);
        if self.best_bid_idx == Some(slot) {
            self.best_bid_idx = self.scan_bid_down(offset);
            trace!(from = slot, to = ?self.best_bid_idx, "best bid rescanned");
        }
        if self.best_ask_idx == Some(slot) {
            self.best_ask_idx = self.scan_ask_up(offset);
            trace!(from = slot, to = ?self.best_ask_idx, "best ask rescanned");
        }
    }

    fn scan_bid_down(&self, from_offset: usize) -> Option<usize> {
        (0..=from_offset.min(self.width - 1))
            .rev()
            .map(|off| self.slot_at(off))
            .find(|&slot| self.levels[slot].has_side(Side::Bid))
    }

    fn scan_ask_up(&self, from_offset: usize) -> Option<usize> {
        (from_offset..self.width)
            .map(|off| self.slot_at(off))
            .find(|&slot| self.levels[slot].has_side(Side::Ask))
    }

    fn rescan_best(&mut self) {
        self.best_bid_idx = self.scan_bid_down(self.width - 1);
        self.best_ask_idx = self.scan_ask_up(0);
    }

    /// Unlinks an order and returns its node without freeing it.
    pub fn remove(
        &mut self,
        pool: &mut OrderNodePool,
        price: Price,
        order_id: OrderId,
    ) -> Option<NodeHandle> {
        let slot = self.slot_index(price)?;
        let handle = self.levels[slot].remove(pool, order_id)?;
        self.after_drain(slot);
        Some(handle)
    }

    /// Cancels an order, returning the quantity it still had.
    pub fn cancel(
        &mut self,
        pool: &mut OrderNodePool,
        price: Price,
        order_id: OrderId,
    ) -> Result<Option<Quantity>, OrderBookError> {
        let Some(slot) = self.slot_index(price) else {
            return Ok(None);
        };
        let remaining = self.levels[slot].cancel(pool, order_id)?;
        self.after_drain(slot);
        Ok(remaining)
    }

    /// Sets the remaining quantity of a resting order.
    pub fn patch_qty(
        &mut self,
        pool: &mut OrderNodePool,
        price: Price,
        order_id: OrderId,
        new_qty: Quantity,
    ) -> Result<(), OrderBookError> {
        let slot = self.checked_slot(price)?;
        self.levels[slot].patch_qty(pool, order_id, new_qty)
    }

    /// Level at `price`, if the price maps to a slot.
    pub fn level_at(&self, price: Price) -> Option<&PriceLevel> {
        self.slot_index(price).map(|slot| &self.levels[slot])
    }

    /// Highest resting bid level in the window.
    pub fn best_bid_level(&self) -> Option<&PriceLevel> {
        self.best_bid_idx.map(|slot| &self.levels[slot])
    }

    /// Lowest resting ask level in the window.
    pub fn best_ask_level(&self) -> Option<&PriceLevel> {
        self.best_ask_idx.map(|slot| &self.levels[slot])
    }

    /// Best level a taker on `taker_side` would trade against.
    pub fn best_level(&self, taker_side: Side) -> Option<&PriceLevel> {
        match taker_side {
            Side::Bid => self.best_ask_level(),
            Side::Ask => self.best_bid_level(),
        }
    }

    /// Price of the best bid in the window.
    pub fn best_bid_price(&self) -> Option<Price> {
        self.best_bid_level().map(PriceLevel::price)
    }

    /// Price of the best ask in the window.
    pub fn best_ask_price(&self) -> Option<Price> {
        self.best_ask_level().map(PriceLevel::price)
    }

    /// Slot of the best bid.
    #[inline]
    pub fn best_bid_idx(&self) -> Option<usize> {
        self.best_bid_idx
    }

    /// Slot of the best ask.
    #[inline]
    pub fn best_ask_idx(&self) -> Option<usize> {
        self.best_ask_idx
    }

    /// Position of the best bid inside the window, 0 at the low edge and 100
    /// at the high edge. `None` while no bid rests in the window.
    pub fn skew_percent(&self) -> Option<u32> {
        let best = self.best_bid_idx?;
        if self.width <= 1 {
            return Some(50);
        }
        let forward = self.offset_of(best);
        Some((forward * 100 / (self.width - 1)) as u32)
    }

    /// Levels of `side` from the best price outward.
    pub fn side_levels(&self, side: Side) -> SideLevels<'_> {
        let best = match side {
            Side::Bid => self.best_bid_idx,
            Side::Ask => self.best_ask_idx,
        };
        SideLevels {
            ring: self,
            side,
            cursor: best.map(|slot| self.offset_of(slot)),
        }
    }

    /// Window levels from the low edge to the high edge.
    pub fn levels(&self) -> impl Iterator<Item = &PriceLevel> + '_ {
        (0..self.width).map(move |off| &self.levels[self.slot_at(off)])
    }

    /// Places an incoming level into its slot, merging behind resting orders.
    ///
    /// Used to pull cold levels that fall inside the window after a shift.
    pub fn absorb(
        &mut self,
        pool: &mut OrderNodePool,
        level: PriceLevel,
    ) -> Result<(), OrderBookError> {
        let slot = self.checked_slot(level.price())?;
        let side = level.side();
        if self.levels[slot].is_empty() {
            self.levels[slot] = level;
        } else {
            self.levels[slot].absorb(pool, level)?;
        }
        if let Some(side) = side {
            self.promote(slot, side);
        }
        Ok(())
    }

    /// Slides the window until `incoming` fits at its edge.
    ///
    /// A price below the window shifts left by `k = (low - price) / step`
    /// ticks, a price above shifts right symmetrically. Each tick evicts the
    /// level at the trailing edge and installs an empty level at the leading
    /// edge, except for the last tick which installs `incoming`. Evicted
    /// levels are returned in eviction order. A price already inside the
    /// window shifts nothing and its orders join the resting level.
    ///
    /// # Errors
    /// [`OrderBookError::MisalignedPrice`] when `incoming` is off the tick grid.
    pub fn migrate(
        &mut self,
        pool: &mut OrderNodePool,
        incoming: PriceLevel,
    ) -> Result<Vec<PriceLevel>, OrderBookError> {
        let price = incoming.price();
        if (price - self.low_price).rem_euclid(self.step) != 0 {
            return Err(OrderBookError::MisalignedPrice {
                price,
                tick: self.step,
            });
        }

        let (ticks, left) = if price < self.low_price {
            ((self.low_price - price) / self.step, true)
        } else if price > self.high_price {
            ((price - self.high_price) / self.step, false)
        } else {
            if !incoming.is_empty() {
                self.absorb(pool, incoming)?;
            }
            return Ok(Vec::new());
        };

        let ticks = ticks as usize;
        let mut evicted = Vec::with_capacity(ticks);
        let mut incoming = Some(incoming);
        for step in 1..=ticks {
            let entering = if left {
                self.low_price - self.step
            } else {
                self.high_price + self.step
            };
            let level = match incoming.take() {
                Some(level) if step == ticks => level,
                other => {
                    incoming = other;
                    PriceLevel::new(entering)
                }
            };
            let out = if left {
                self.shift_left(level)?
            } else {
                self.shift_right(level)?
            };
            evicted.push(out);
        }
        self.rescan_best();
        trace!(
            ticks,
            left,
            low = self.low_price,
            high = self.high_price,
            "window migrated"
        );
        Ok(evicted)
    }

    fn shift_left(&mut self, level: PriceLevel) -> Result<PriceLevel, OrderBookError> {
        let expected = self.low_price - self.step;
        if level.price() != expected {
            return Err(OrderBookError::MigrationPriceMismatch {
                expected,
                actual: level.price(),
            });
        }
        let out = std::mem::replace(
            &mut self.levels[self.high_idx],
            PriceLevel::new(self.high_price),
        );
        self.high_idx = self.high_idx.wrapping_add(self.mask) & self.mask;
        self.low_idx = self.low_idx.wrapping_add(self.mask) & self.mask;
        self.high_price -= self.step;
        self.low_price = expected;
        self.levels[self.low_idx] = level;
        Ok(out)
    }

    fn shift_right(&mut self, level: PriceLevel) -> Result<PriceLevel, OrderBookError> {
        let expected = self.high_price + self.step;
        if level.price() != expected {
            return Err(OrderBookError::MigrationPriceMismatch {
                expected,
                actual: level.price(),
            });
        }
        let out = std::mem::replace(
            &mut self.levels[self.low_idx],
            PriceLevel::new(self.low_price),
        );
        self.low_idx = self.low_idx.wrapping_add(1) & self.mask;
        self.high_idx = self.high_idx.wrapping_add(1) & self.mask;
        self.low_price += self.step;
        self.high_price = expected;
        self.levels[self.high_idx] = level;
        Ok(out)
    }

    /// Non-empty levels of the window, one block per level, high to low.
    pub fn dump(&self, pool: &OrderNodePool) -> String {
        let mut out = format!(
            "ring window [{}, {}] slots [{}, {}] best_bid={:?} best_ask={:?}\n",
            self.low_price,
            self.high_price,
            self.low_idx,
            self.high_idx,
            self.best_bid_price(),
            self.best_ask_price()
        );
        for off in (0..self.width).rev() {
            let level = &self.levels[self.slot_at(off)];
            if !level.is_empty() {
                let _ = write!(out, "{}", level.dump(pool));
            }
        }
        out
    }
}

/// Levels of one side of the window, best price first.
#[derive(Debug)]
pub struct SideLevels<'a> {
    ring: &'a RingOrderBuffer,
    side: Side,
    cursor: Option<usize>,
}

impl<'a> Iterator for SideLevels<'a> {
    type Item = &'a PriceLevel;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let offset = self.cursor?;
            self.cursor = match self.side {
                Side::Bid => offset.checked_sub(1),
                Side::Ask => Some(offset + 1).filter(|next| *next < self.ring.width),
            };
            let level = &self.ring.levels[self.ring.slot_at(offset)];
            if level.has_side(self.side) {
                return Some(level);
            }
        }
    }
}
