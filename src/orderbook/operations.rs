//! Order book operations: submitting, resting and cancelling orders, plus
//! the structured snapshot and its restore.

use super::book::OrderBook;
use super::error::OrderBookError;
use super::snapshot::SnapshotView;
use super::trade::BookEvent;
use super::types::{
    OrderId, OrderInfo, OrderStatus, OrderType, Price, Quantity, Side, Symbol, TimeInForce,
    UserId,
};
use std::fmt::Write;
use tracing::{debug, trace};

impl OrderBook {
    /// Submits an order and reports how it ended up.
    ///
    /// * MARKET sweeps the opposing side; whatever is left is cancelled.
    /// * LIMIT that cannot trade is rejected (FOK), cancelled (IOC) or rests
    ///   (GTC) as [`OrderStatus::Pending`].
    /// * LIMIT that can trade first checks reachable liquidity; FOK without
    ///   enough of it is rejected without touching the book. The remainder
    ///   after matching rests (GTC) or is cancelled (IOC).
    ///
    /// # Errors
    /// Malformed orders (wrong symbol, zero quantity, price off the tick grid)
    /// are refused before any mutation.
    pub fn submit(&mut self, order: &OrderInfo) -> Result<OrderStatus, OrderBookError> {
        self.validate(order)?;
        trace!(
            order_id = order.order_id,
            side = %order.side,
            price = order.price,
            qty = order.qty,
            "submit"
        );
        match order.order_type {
            OrderType::Market => self.submit_market(order),
            OrderType::Limit => self.submit_limit(order),
        }
    }

    /// Checks the preconditions [`OrderBook::submit`] enforces without
    /// touching the book.
    pub fn validate(&self, order: &OrderInfo) -> Result<(), OrderBookError> {
        if order.symbol != self.symbol {
            return Err(OrderBookError::UnknownSymbol {
                expected: self.symbol,
                actual: order.symbol,
            });
        }
        if order.qty == 0 {
            return Err(OrderBookError::InvalidQuantity {
                order_id: order.order_id,
                quantity: order.qty,
            });
        }
        if order.order_type == OrderType::Limit {
            self.check_price(order.price)?;
        }
        Ok(())
    }

    fn check_price(&self, price: Price) -> Result<(), OrderBookError> {
        let tick = self.ring.step();
        if (price - self.ring.low_price()).rem_euclid(tick) != 0 {
            return Err(OrderBookError::MisalignedPrice { price, tick });
        }
        Ok(())
    }

    fn submit_market(&mut self, order: &OrderInfo) -> Result<OrderStatus, OrderBookError> {
        let filled = self.sweep(order, order.qty)?;
        let remaining = order.qty - filled;
        if remaining == 0 {
            self.emit(BookEvent::Filled {
                symbol: self.symbol,
                order_id: order.order_id,
            });
            return Ok(OrderStatus::Filled);
        }
        self.emit(BookEvent::OrderCancelled {
            symbol: self.symbol,
            order_id: order.order_id,
            remaining_qty: remaining,
        });
        if filled > 0 {
            Ok(OrderStatus::PartiallyFilled)
        } else {
            Ok(OrderStatus::Canceled)
        }
    }

    fn submit_limit(&mut self, order: &OrderInfo) -> Result<OrderStatus, OrderBookError> {
        if !self.can_match_immediately(order.side, order.price) {
            return match order.tif {
                TimeInForce::Fok => Ok(self.reject(order)),
                TimeInForce::Ioc => {
                    self.emit(BookEvent::OrderCancelled {
                        symbol: self.symbol,
                        order_id: order.order_id,
                        remaining_qty: order.qty,
                    });
                    Ok(OrderStatus::Canceled)
                }
                TimeInForce::Gtc => {
                    self.rest(order, order.qty)?;
                    Ok(OrderStatus::Pending)
                }
            };
        }

        let liquidity = self
            .best_liq(order.side, order.price)
            .map_or(0, |view| view.total_qty);
        if order.tif == TimeInForce::Fok && liquidity < order.qty {
            return Ok(self.reject(order));
        }

        let filled = self.sweep(order, order.qty.min(liquidity))?;
        let remaining = order.qty - filled;
        if remaining == 0 {
            self.emit(BookEvent::Filled {
                symbol: self.symbol,
                order_id: order.order_id,
            });
            return Ok(OrderStatus::Filled);
        }
        match order.tif {
            TimeInForce::Gtc => {
                self.rest(order, remaining)?;
                Ok(OrderStatus::PartiallyFilled)
            }
            TimeInForce::Ioc | TimeInForce::Fok => {
                self.emit(BookEvent::OrderCancelled {
                    symbol: self.symbol,
                    order_id: order.order_id,
                    remaining_qty: remaining,
                });
                Ok(OrderStatus::Canceled)
            }
        }
    }

    /// Runs match steps until `target` is filled or the opposing side is
    /// empty. Returns the filled quantity.
    fn sweep(&mut self, order: &OrderInfo, target: Quantity) -> Result<Quantity, OrderBookError> {
        let mut filled: Quantity = 0;
        while filled < target {
            let Some(step) = self.match_head(order, target - filled)? else {
                break;
            };
            filled += step.qty;
            if self.recenter.on_every_trade() {
                self.recenter_now()?;
            }
        }
        if filled > 0 && !self.recenter.on_every_trade() {
            self.recenter_now()?;
        }
        Ok(filled)
    }

    fn reject(&self, order: &OrderInfo) -> OrderStatus {
        debug!(order_id = order.order_id, "order rejected");
        self.emit(BookEvent::OrderRejected {
            symbol: self.symbol,
            order_id: order.order_id,
        });
        OrderStatus::Rejected
    }

    fn rest(&mut self, order: &OrderInfo, qty: Quantity) -> Result<(), OrderBookError> {
        self.rest_node(
            order.side,
            order.price,
            order.user_id,
            order.order_id,
            qty,
            order.time,
        )
    }

    /// Links a fresh node at `price` in whichever zone owns that price.
    fn rest_node(
        &mut self,
        side: Side,
        price: Price,
        user_id: UserId,
        order_id: OrderId,
        qty: Quantity,
        time: u64,
    ) -> Result<(), OrderBookError> {
        let handle = self.pool.alloc(order_id, user_id, side, qty, time);
        let linked = if self.ring.is_in_window(price) {
            self.ring.submit(&mut self.pool, price, handle)
        } else {
            self.cold.submit(&mut self.pool, price, handle)
        };
        if let Err(err) = linked {
            self.pool.free(handle)?;
            return Err(err);
        }
        trace!(order_id, price, qty, hot = self.ring.is_in_window(price), "order rests");
        Ok(())
    }

    /// Cancels a resting order.
    ///
    /// The price routes the lookup: prices inside the window are searched in
    /// the hot zone, all others in the cold zone.
    ///
    /// # Errors
    /// [`OrderBookError::UnknownSymbol`] when `symbol` is not this book's.
    pub fn cancel(
        &mut self,
        symbol: Symbol,
        price: Price,
        order_id: OrderId,
    ) -> Result<bool, OrderBookError> {
        if symbol != self.symbol {
            return Err(OrderBookError::UnknownSymbol {
                expected: self.symbol,
                actual: symbol,
            });
        }
        let remaining = if self.ring.is_in_window(price) {
            self.ring.cancel(&mut self.pool, price, order_id)?
        } else {
            self.cold.cancel(&mut self.pool, price, order_id)?
        };
        let Some(remaining_qty) = remaining else {
            trace!(order_id, price, "cancel missed");
            return Ok(false);
        };
        self.emit(BookEvent::OrderCancelled {
            symbol: self.symbol,
            order_id,
            remaining_qty,
        });
        Ok(true)
    }

    /// Copies every resting order: bids by descending price, asks by
    /// ascending price, time priority within a price.
    pub fn snapshot(&self) -> SnapshotView {
        let mut view = SnapshotView::new();
        for level in self.levels_of(Side::Bid) {
            for (_, node) in level.iter(&self.pool) {
                view.push_bid(level.price(), node.user_id, node.order_id, node.qty);
            }
        }
        for level in self.levels_of(Side::Ask) {
            for (_, node) in level.iter(&self.pool) {
                view.push_ask(level.price(), node.user_id, node.order_id, node.qty);
            }
        }
        view
    }

    /// Rests every order of `view` in snapshot order, which keeps the time
    /// priority it was captured with.
    ///
    /// # Errors
    /// [`OrderBookError::InvalidOperation`] unless the book is empty and the
    /// view's arrays agree in length; price and quantity errors of single
    /// entries abort the restore.
    pub fn restore(&mut self, view: &SnapshotView) -> Result<(), OrderBookError> {
        if !self.is_empty() {
            return Err(OrderBookError::InvalidOperation {
                message: "restore needs an empty book".to_string(),
            });
        }
        if !view.is_consistent() {
            return Err(OrderBookError::InvalidOperation {
                message: "snapshot arrays differ in length".to_string(),
            });
        }
        for (side, entries) in [(Side::Bid, view.bids()), (Side::Ask, view.asks())] {
            for entry in entries {
                if entry.qty == 0 {
                    return Err(OrderBookError::InvalidQuantity {
                        order_id: entry.order_id,
                        quantity: 0,
                    });
                }
                self.check_price(entry.price)?;
                self.rest_node(side, entry.price, entry.user_id, entry.order_id, entry.qty, 0)?;
            }
        }
        debug!(
            bids = view.bid_len(),
            asks = view.ask_len(),
            "book restored from snapshot"
        );
        Ok(())
    }

    /// Human readable dump of the hot window followed by the cold zone.
    pub fn depth(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "symbol={} orders={} last_trade={:?} seq={}",
            self.symbol,
            self.order_count(),
            self.last_trade_price,
            self.match_seq
        );
        out.push_str(&self.ring.dump(&self.pool));
        out.push_str(&self.cold.dump(10));
        out
    }

    /// ASCII ladder of the best `levels` prices per side.
    pub fn view(&self, levels: usize) -> String {
        self.snapshot().render(levels, 24)
    }
}

#[cfg(test)]
mod tests {
    use crate::orderbook::config::BookConfig;
    use crate::orderbook::types::{OrderInfo, OrderStatus, OrderType, Side, TimeInForce};
    use crate::orderbook::{OrderBook, OrderBookError};

    fn book() -> OrderBook {
        let config = BookConfig::new(3, 5, 1_000, 1_100).without_recentering();
        OrderBook::new(&config).unwrap_or_else(|e| panic!("book: {e}"))
    }

    #[test]
    fn test_validation_happens_before_mutation() {
        let mut book = book();
        let wrong_symbol = OrderInfo::limit(4, 1, 1, Side::Bid, TimeInForce::Gtc, 1_000, 1, 0);
        assert!(matches!(
            book.submit(&wrong_symbol),
            Err(OrderBookError::UnknownSymbol { expected: 3, actual: 4 })
        ));
        let zero = OrderInfo::limit(3, 1, 1, Side::Bid, TimeInForce::Gtc, 1_000, 0, 0);
        assert!(matches!(
            book.submit(&zero),
            Err(OrderBookError::InvalidQuantity { .. })
        ));
        let off_grid = OrderInfo::limit(3, 1, 1, Side::Bid, TimeInForce::Gtc, 1_002, 1, 0);
        assert!(matches!(
            book.submit(&off_grid),
            Err(OrderBookError::MisalignedPrice { price: 1_002, tick: 5 })
        ));
        assert!(book.is_empty());
    }

    #[test]
    fn test_market_order_ignores_price_grid() {
        let mut book = book();
        let mut market = OrderInfo::market(3, 1, 1, Side::Bid, 4, 0);
        market.price = 7;
        assert_eq!(market.order_type, OrderType::Market);
        assert_eq!(book.submit(&market), Ok(OrderStatus::Canceled));
    }

    #[test]
    fn test_rest_outside_window_goes_cold() {
        let mut book = book();
        let far = OrderInfo::limit(3, 1, 1, Side::Bid, TimeInForce::Gtc, 500, 2, 0);
        assert_eq!(book.submit(&far), Ok(OrderStatus::Pending));
        assert_eq!(book.cold().len_bids(), 1);
        assert_eq!(book.best_bid(), Some(500));
        assert_eq!(book.cancel(3, 500, 1), Ok(true));
        assert!(book.is_empty());
    }

    #[test]
    fn test_cancel_wrong_symbol_and_miss() {
        let mut book = book();
        assert!(matches!(
            book.cancel(9, 1_000, 1),
            Err(OrderBookError::UnknownSymbol { .. })
        ));
        assert_eq!(book.cancel(3, 1_000, 1), Ok(false));
    }

    #[test]
    fn test_duplicate_order_id_at_same_price_is_refused() {
        let mut book = book();
        let order = OrderInfo::limit(3, 1, 7, Side::Ask, TimeInForce::Gtc, 1_050, 1, 0);
        assert_eq!(book.submit(&order), Ok(OrderStatus::Pending));
        assert!(matches!(
            book.submit(&order),
            Err(OrderBookError::DuplicateOrderId { order_id: 7 })
        ));
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn test_snapshot_order_and_restore() {
        let mut book = book();
        let orders = [
            (1, Side::Bid, 1_010, 1),
            (2, Side::Bid, 1_020, 2),
            (3, Side::Bid, 1_010, 3),
            (4, Side::Ask, 1_060, 4),
            (5, Side::Ask, 1_200, 5),
        ];
        for (id, side, price, qty) in orders {
            let order = OrderInfo::limit(3, 100 + id, id, side, TimeInForce::Gtc, price, qty, 0);
            assert_eq!(book.submit(&order), Ok(OrderStatus::Pending));
        }
        let view = book.snapshot();
        assert_eq!(view.bid_prices, vec![1_020, 1_010, 1_010]);
        assert_eq!(view.bid_order_ids, vec![2, 1, 3]);
        assert_eq!(view.ask_prices, vec![1_060, 1_200]);
        assert_eq!(view.ask_user_ids, vec![104, 105]);

        assert!(matches!(
            book.restore(&view),
            Err(OrderBookError::InvalidOperation { .. })
        ));

        let mut copy = self::book();
        assert!(copy.restore(&view).is_ok());
        assert_eq!(copy.snapshot(), view);
        assert_eq!(copy.best_bid(), Some(1_020));
        assert_eq!(copy.best_ask(), Some(1_060));
    }
}
