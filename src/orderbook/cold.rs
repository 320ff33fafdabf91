//! Cold zone: sorted maps holding the levels that fall outside the hot window.

use crate::orderbook::OrderBookError;
use crate::orderbook::level::PriceLevel;
use crate::orderbook::pool::{NodeHandle, OrderNodePool};
use crate::orderbook::types::{OrderId, Price, Quantity, Side};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::trace;

/// Non-empty price levels outside the hot window, best price first per side.
#[derive(Debug, Default)]
pub struct ColdOrderBuffer {
    bids: BTreeMap<Reverse<Price>, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
}

impl ColdOrderBuffer {
    /// Creates an empty cold zone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rests an order, creating its level on demand.
    pub fn submit(
        &mut self,
        pool: &mut OrderNodePool,
        price: Price,
        handle: NodeHandle,
    ) -> Result<(), OrderBookError> {
        let level = match pool[handle].side {
            Side::Bid => self
                .bids
                .entry(Reverse(price))
                .or_insert_with(|| PriceLevel::new(price)),
            Side::Ask => self
                .asks
                .entry(price)
                .or_insert_with(|| PriceLevel::new(price)),
        };
        let result = level.submit(pool, handle);
        if level.is_empty() {
            // A rejected order must not leave an empty level behind.
            self.drop_if_empty(price);
        }
        result
    }

    fn drop_if_empty(&mut self, price: Price) {
        if self.bids.get(&Reverse(price)).is_some_and(PriceLevel::is_empty) {
            self.bids.remove(&Reverse(price));
        }
        if self.asks.get(&price).is_some_and(PriceLevel::is_empty) {
            self.asks.remove(&price);
        }
    }

    /// Level at `price` that holds `order_id`, on whichever side it rests.
    pub fn level_with(&self, price: Price, order_id: OrderId) -> Option<&PriceLevel> {
        self.bids
            .get(&Reverse(price))
            .filter(|l| l.get(order_id).is_some())
            .or_else(|| self.asks.get(&price).filter(|l| l.get(order_id).is_some()))
    }

    fn level_mut_with(
        &mut self,
        price: Price,
        order_id: OrderId,
    ) -> Option<&mut PriceLevel> {
        if self
            .bids
            .get(&Reverse(price))
            .is_some_and(|l| l.get(order_id).is_some())
        {
            return self.bids.get_mut(&Reverse(price));
        }
        self.asks
            .get_mut(&price)
            .filter(|l| l.get(order_id).is_some())
    }

    /// Unlinks an order and returns its node without freeing it.
    pub fn remove(
        &mut self,
        pool: &mut OrderNodePool,
        price: Price,
        order_id: OrderId,
    ) -> Option<NodeHandle> {
        let handle = self.level_mut_with(price, order_id)?.remove(pool, order_id);
        self.drop_if_empty(price);
        handle
    }

    /// Cancels an order, returning the quantity it still had.
    pub fn cancel(
        &mut self,
        pool: &mut OrderNodePool,
        price: Price,
        order_id: OrderId,
    ) -> Result<Option<Quantity>, OrderBookError> {
        let Some(level) = self.level_mut_with(price, order_id) else {
            return Ok(None);
        };
        let remaining = level.cancel(pool, order_id)?;
        self.drop_if_empty(price);
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
        self.level_mut_with(price, order_id)
            .ok_or(OrderBookError::OrderNotFound { order_id })?
            .patch_qty(pool, order_id, new_qty)
    }

    /// Highest bid level.
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first_key_value().map(|(_, level)| level)
    }

    /// Lowest ask level.
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first_key_value().map(|(_, level)| level)
    }

    /// Best level a taker on `taker_side` would trade against.
    pub fn best_level(&self, taker_side: Side) -> Option<&PriceLevel> {
        match taker_side {
            Side::Bid => self.best_ask(),
            Side::Ask => self.best_bid(),
        }
    }

    /// Removes and returns the highest bid level.
    pub fn pop_best_bid(&mut self) -> Option<PriceLevel> {
        self.bids.pop_first().map(|(_, level)| level)
    }

    /// Removes and returns the lowest ask level.
    pub fn pop_best_ask(&mut self) -> Option<PriceLevel> {
        self.asks.pop_first().map(|(_, level)| level)
    }

    /// Removes and returns the level at exactly `price`, whichever side it holds.
    pub fn take_exact(&mut self, price: Price) -> Option<PriceLevel> {
        self.bids
            .remove(&Reverse(price))
            .or_else(|| self.asks.remove(&price))
    }

    /// Stores a level evicted from the hot window.
    ///
    /// Empty levels are dropped. A level whose price is already occupied on
    /// its side is handed back unchanged.
    pub fn put(&mut self, level: PriceLevel) -> Result<(), PriceLevel> {
        let Some(side) = level.side().filter(|_| !level.is_empty()) else {
            return Ok(());
        };
        let price = level.price();
        match side {
            Side::Bid => {
                if self.bids.contains_key(&Reverse(price)) {
                    return Err(level);
                }
                self.bids.insert(Reverse(price), level);
            }
            Side::Ask => {
                if self.asks.contains_key(&price) {
                    return Err(level);
                }
                self.asks.insert(price, level);
            }
        }
        trace!(price, %side, "level parked in cold zone");
        Ok(())
    }

    /// Stores every level, returning the ones that collided.
    pub fn put_all(
        &mut self,
        levels: impl IntoIterator<Item = PriceLevel>,
    ) -> Vec<PriceLevel> {
        levels
            .into_iter()
            .filter_map(|level| self.put(level).err())
            .collect()
    }

    /// Removes all levels priced within `[low, high]`, bids first.
    pub fn drain_range(&mut self, low: Price, high: Price) -> Vec<PriceLevel> {
        if high < low {
            return Vec::new();
        }
        let bid_keys: Vec<_> = self
            .bids
            .range(Reverse(high)..=Reverse(low))
            .map(|(k, _)| *k)
            .collect();
        let ask_keys: Vec<_> = self.asks.range(low..=high).map(|(k, _)| *k).collect();

        let mut out = Vec::with_capacity(bid_keys.len() + ask_keys.len());
        out.extend(bid_keys.into_iter().filter_map(|k| self.bids.remove(&k)));
        out.extend(ask_keys.into_iter().filter_map(|k| self.asks.remove(&k)));
        out
    }

    /// Bid levels from the highest price down.
    pub fn bids(&self) -> impl Iterator<Item = &PriceLevel> + '_ {
        self.bids.values()
    }

    /// Ask levels from the lowest price up.
    pub fn asks(&self) -> impl Iterator<Item = &PriceLevel> + '_ {
        self.asks.values()
    }

    /// Number of bid levels.
    #[inline]
    pub fn len_bids(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask levels.
    #[inline]
    pub fn len_asks(&self) -> usize {
        self.asks.len()
    }

    /// Whether both sides are empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Summary of the best `limit` levels per side.
    pub fn dump(&self, limit: usize) -> String {
        let mut out = format!(
            "cold bids={} asks={}\n",
            self.bids.len(),
            self.asks.len()
        );
        for level in self.asks.values().take(limit).collect::<Vec<_>>().into_iter().rev() {
            let _ = writeln!(out, "  ASK {:>10} x {}", level.price(), level.total_qty());
        }
        for level in self.bids.values().take(limit) {
            let _ = writeln!(out, "  BID {:>10} x {}", level.price(), level.total_qty());
        }
        out
    }
}
