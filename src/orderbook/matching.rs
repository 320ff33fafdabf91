//! Contains the core matching logic for the order book.
//!
//! Every execution happens at the head of the best opposing level, at the
//! maker's price. The best level is looked up across both zones on each
//! step, so a window shift between steps never hides crossing liquidity.

use super::book::{OrderBook, Zone};
use super::error::OrderBookError;
use super::level::PriceLevel;
use super::trade::{BestLiqView, BookEvent, MatchTrade, StepMatchResult};
use super::types::{OrderInfo, Price, Quantity, Side};
use crate::utils::current_time_millis;
use tracing::trace;

#[inline]
fn crosses(taker_side: Side, limit: Price, maker_price: Price) -> bool {
    match taker_side {
        Side::Bid => maker_price <= limit,
        Side::Ask => maker_price >= limit,
    }
}

/// Quantity of the leading levels that cross `limit`.
fn crossing_qty<'a>(
    levels: impl Iterator<Item = &'a PriceLevel>,
    taker_side: Side,
    limit: Price,
) -> Quantity {
    levels
        .take_while(|level| crosses(taker_side, limit, level.price()))
        .map(PriceLevel::total_qty)
        .sum()
}

impl OrderBook {
    /// Best level a taker on `taker_side` would hit, with the zone holding it.
    pub(super) fn best_opposing(&self, taker_side: Side) -> Option<(Zone, Price)> {
        let hot = self.ring.best_level(taker_side).map(PriceLevel::price);
        let cold = self.cold.best_level(taker_side).map(PriceLevel::price);
        match (hot, cold) {
            (Some(h), Some(c)) => {
                let cold_better = match taker_side {
                    Side::Bid => c < h,
                    Side::Ask => c > h,
                };
                if cold_better {
                    Some((Zone::Cold, c))
                } else {
                    Some((Zone::Hot, h))
                }
            }
            (Some(h), None) => Some((Zone::Hot, h)),
            (None, Some(c)) => Some((Zone::Cold, c)),
            (None, None) => None,
        }
    }

    fn best_opposing_level(&self, taker_side: Side) -> Option<&PriceLevel> {
        match self.best_opposing(taker_side)? {
            (Zone::Hot, _) => self.ring.best_level(taker_side),
            (Zone::Cold, _) => self.cold.best_level(taker_side),
        }
    }

    /// Whether an order on `side` limited at `price` would trade right away.
    pub fn can_match_immediately(&self, side: Side, price: Price) -> bool {
        self.best_opposing(side)
            .is_some_and(|(_, best)| crosses(side, price, best))
    }

    /// Opposing liquidity a taker on `side` can reach without trading through
    /// `price`. `None` when nothing crosses.
    pub fn best_liq(&self, side: Side, price: Price) -> Option<BestLiqView> {
        let head = self.best_opposing_level(side)?;
        if !crosses(side, price, head.price()) {
            return None;
        }
        let head_qty = head
            .first()
            .map_or(0, |handle| self.pool[handle].qty);

        let resting = side.opposite();
        let hot = crossing_qty(self.ring.side_levels(resting), side, price);
        let cold = match resting {
            Side::Bid => crossing_qty(self.cold.bids(), side, price),
            Side::Ask => crossing_qty(self.cold.asks(), side, price),
        };

        Some(BestLiqView {
            price: head.price(),
            total_qty: hot + cold,
            head_qty,
        })
    }

    /// Trades `taker` against the head order of the best opposing level.
    ///
    /// The step executes `min(max_qty, maker qty)` at the maker's price. A
    /// depleted maker leaves the book and its node is freed; otherwise its
    /// remaining quantity is patched in place. The caller is responsible for
    /// checking that the best level still crosses the taker's limit.
    ///
    /// Returns `Ok(None)` when the opposing side is empty or `max_qty` is 0.
    ///
    /// # Panics
    /// When the best opposing level has no head order or the head cannot be
    /// unlinked. Both mean the book's internal links are broken.
    pub fn match_head(
        &mut self,
        taker: &OrderInfo,
        max_qty: Quantity,
    ) -> Result<Option<StepMatchResult>, OrderBookError> {
        if max_qty == 0 {
            return Ok(None);
        }
        let Some((zone, price)) = self.best_opposing(taker.side) else {
            return Ok(None);
        };
        let head = match zone {
            Zone::Hot => self.ring.best_level(taker.side),
            Zone::Cold => self.cold.best_level(taker.side),
        }
        .and_then(PriceLevel::first)
        .unwrap_or_else(|| panic!("best level at {price} has no head order"));

        let maker = &self.pool[head];
        let (maker_order_id, maker_user_id, maker_qty) = (maker.order_id, maker.user_id, maker.qty);
        let qty = max_qty.min(maker_qty);
        let maker_filled = qty == maker_qty;

        if maker_filled {
            let removed = match zone {
                Zone::Hot => self.ring.remove(&mut self.pool, price, maker_order_id),
                Zone::Cold => self.cold.remove(&mut self.pool, price, maker_order_id),
            };
            let handle = removed
                .unwrap_or_else(|| panic!("head order {maker_order_id} vanished at {price}"));
            self.pool.free(handle)?;
        } else {
            let left = maker_qty - qty;
            match zone {
                Zone::Hot => self
                    .ring
                    .patch_qty(&mut self.pool, price, maker_order_id, left)?,
                Zone::Cold => self
                    .cold
                    .patch_qty(&mut self.pool, price, maker_order_id, left)?,
            }
        }

        self.match_seq += 1;
        self.last_trade_price = Some(price);
        trace!(
            seq = self.match_seq,
            taker = taker.order_id,
            maker = maker_order_id,
            price,
            qty,
            maker_filled,
            "match step"
        );

        if self.listener.is_some() {
            self.emit(BookEvent::Traded(MatchTrade {
                match_seq: self.match_seq,
                symbol: self.symbol,
                taker_user_id: taker.user_id,
                maker_user_id,
                taker_order_id: taker.order_id,
                maker_order_id,
                taker_side: taker.side,
                price,
                qty,
                trade_time: current_time_millis(),
                maker_filled,
            }));
            if maker_filled {
                self.emit(BookEvent::Filled {
                    symbol: self.symbol,
                    order_id: maker_order_id,
                });
            }
        }

        Ok(Some(StepMatchResult {
            maker_filled,
            price,
            qty,
            maker_order_id,
            maker_user_id,
            match_seq: self.match_seq,
        }))
    }
}
