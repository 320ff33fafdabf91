//! Core OrderBook state: a hot ring window, a cold overflow zone and the
//! node arena both of them link into.

use super::cold::ColdOrderBuffer;
use super::config::BookConfig;
use super::error::OrderBookError;
use super::level::PriceLevel;
use super::pool::{OrderNodePool, PoolStats};
use super::recenter::RecenterManager;
use super::ring::RingOrderBuffer;
use super::snapshot::SnapshotView;
use super::trade::{BestLiqView, BookEvent, BookEventListener, StepMatchResult};
use super::types::{OrderId, OrderInfo, OrderStatus, Price, Quantity, Side, Symbol};
use std::fmt;
use tracing::trace;

/// Operations a durable engine drives on a single-instrument book.
///
/// All mutation goes through `&mut self`: a book is owned by exactly one
/// matching thread.
pub trait MatchBook {
    /// Instrument served by the book.
    fn symbol(&self) -> Symbol;

    /// Checks an order's preconditions without mutating anything.
    fn validate(&self, order: &OrderInfo) -> Result<(), OrderBookError>;

    /// Validates, matches and possibly rests an order.
    fn submit(&mut self, order: &OrderInfo) -> Result<OrderStatus, OrderBookError>;

    /// Cancels a resting order. `Ok(false)` when nothing rests under that id
    /// at that price.
    fn cancel(
        &mut self,
        symbol: Symbol,
        price: Price,
        order_id: OrderId,
    ) -> Result<bool, OrderBookError>;

    /// Whether an order on `side` at `price` would cross the book.
    fn can_match_immediately(&self, side: Side, price: Price) -> bool;

    /// Opposing liquidity at or better than `price` for a taker on `side`.
    fn best_liq(&self, side: Side, price: Price) -> Option<BestLiqView>;

    /// Consumes up to `max_qty` from the head of the best opposing level.
    fn match_head(
        &mut self,
        taker: &OrderInfo,
        max_qty: Quantity,
    ) -> Result<Option<StepMatchResult>, OrderBookError>;

    /// Structured copy of every resting order.
    fn snapshot(&self) -> SnapshotView;

    /// Rebuilds resting liquidity from a snapshot into an empty book.
    fn restore(&mut self, view: &SnapshotView) -> Result<(), OrderBookError>;

    /// Human readable dump of both zones.
    fn depth(&self) -> String;
}

/// Where a price level currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Zone {
    Hot,
    Cold,
}

/// The OrderBook keeps resting orders of one instrument.
///
/// Prices inside the ring window always live in the hot zone; everything
/// else is parked in the cold zone. Both zones link nodes allocated from the
/// same arena.
pub struct OrderBook {
    /// The instrument this book serves
    pub(super) symbol: Symbol,

    /// Arena every resting order node is allocated from
    pub(super) pool: OrderNodePool,

    /// Price-indexed window around the market
    pub(super) ring: RingOrderBuffer,

    /// Levels that fall outside the window
    pub(super) cold: ColdOrderBuffer,

    /// Policy that slides the window after trading
    pub(super) recenter: RecenterManager,

    /// Sequence of the last execution, 0 before the first trade
    pub(super) match_seq: u64,

    /// Price of the last execution
    pub(super) last_trade_price: Option<Price>,

    /// Receives trades, fills, cancellations and rejections
    pub(super) listener: Option<BookEventListener>,
}

impl OrderBook {
    /// Creates an empty book from a validated configuration.
    ///
    /// # Errors
    /// [`OrderBookError::InvalidConfig`] for a bad window geometry or policy.
    pub fn new(config: &BookConfig) -> Result<Self, OrderBookError> {
        config.validate()?;
        let ring = RingOrderBuffer::new(config.tick, config.low_price, config.high_price)?;
        trace!(
            symbol = config.symbol,
            low = config.low_price,
            high = config.high_price,
            tick = config.tick,
            "order book created"
        );
        Ok(Self {
            symbol: config.symbol,
            pool: OrderNodePool::new(config.pool_capacity),
            ring,
            cold: ColdOrderBuffer::new(),
            recenter: RecenterManager::new(config.recenter.clone()),
            match_seq: 0,
            last_trade_price: None,
            listener: None,
        })
    }

    /// Creates an empty book that reports to `listener`.
    pub fn with_listener(
        config: &BookConfig,
        listener: BookEventListener,
    ) -> Result<Self, OrderBookError> {
        let mut book = Self::new(config)?;
        book.listener = Some(listener);
        Ok(book)
    }

    /// Installs or replaces the event listener.
    pub fn set_event_listener(&mut self, listener: BookEventListener) {
        self.listener = Some(listener);
    }

    /// Removes the event listener.
    pub fn remove_event_listener(&mut self) {
        self.listener = None;
    }

    #[inline]
    pub(super) fn emit(&self, event: BookEvent) {
        if let Some(listener) = &self.listener {
            listener(&event);
        }
    }

    /// Instrument served by the book.
    #[inline]
    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    /// Tick size.
    #[inline]
    pub fn tick(&self) -> Price {
        self.ring.step()
    }

    /// Current hot window bounds.
    pub fn window(&self) -> (Price, Price) {
        (self.ring.low_price(), self.ring.high_price())
    }

    /// The hot zone.
    pub fn ring(&self) -> &RingOrderBuffer {
        &self.ring
    }

    /// The cold zone.
    pub fn cold(&self) -> &ColdOrderBuffer {
        &self.cold
    }

    /// Arena usage counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Number of resting orders.
    pub fn order_count(&self) -> usize {
        self.pool.in_use()
    }

    /// Whether no order rests on either side.
    pub fn is_empty(&self) -> bool {
        self.pool.in_use() == 0
    }

    /// Sequence of the last execution.
    #[inline]
    pub fn match_seq(&self) -> u64 {
        self.match_seq
    }

    /// Price of the last execution.
    #[inline]
    pub fn last_trade_price(&self) -> Option<Price> {
        self.last_trade_price
    }

    /// Highest resting bid across both zones.
    pub fn best_bid(&self) -> Option<Price> {
        self.best_opposing(Side::Ask).map(|(_, price)| price)
    }

    /// Lowest resting ask across both zones.
    pub fn best_ask(&self) -> Option<Price> {
        self.best_opposing(Side::Bid).map(|(_, price)| price)
    }

    /// Difference between best ask and best bid.
    pub fn spread(&self) -> Option<Price> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    /// Midpoint between best bid and best ask.
    pub fn mid_price(&self) -> Option<f64> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some((bid as f64 + ask as f64) / 2.0)
    }

    /// Remaining quantity of a resting order.
    pub fn order_qty(&self, price: Price, order_id: OrderId) -> Option<Quantity> {
        let level = self.level_with(price, order_id)?;
        level.get(order_id).map(|handle| self.pool[handle].qty)
    }

    fn level_with(&self, price: Price, order_id: OrderId) -> Option<&PriceLevel> {
        if self.ring.is_in_window(price) {
            return self.ring.level_at(price);
        }
        self.cold.level_with(price, order_id)
    }

    /// Resting quantity summed over one side of both zones.
    pub fn total_qty(&self, side: Side) -> Quantity {
        let hot: Quantity = self.ring.side_levels(side).map(PriceLevel::total_qty).sum();
        let cold: Quantity = match side {
            Side::Bid => self.cold.bids().map(PriceLevel::total_qty).sum(),
            Side::Ask => self.cold.asks().map(PriceLevel::total_qty).sum(),
        };
        hot + cold
    }

    /// Resting levels of one side across both zones, best price first.
    pub(super) fn levels_of(&self, side: Side) -> Vec<&PriceLevel> {
        let mut levels: Vec<&PriceLevel> = self.ring.side_levels(side).collect();
        match side {
            Side::Bid => {
                levels.extend(self.cold.bids());
                levels.sort_by_key(|level| std::cmp::Reverse(level.price()));
            }
            Side::Ask => {
                levels.extend(self.cold.asks());
                levels.sort_by_key(|level| level.price());
            }
        }
        levels
    }

    /// Slides the window after trading. Called once per execution or once
    /// per order, depending on the policy.
    pub(super) fn recenter_now(&mut self) -> Result<usize, OrderBookError> {
        self.recenter
            .check_and_recenter(&mut self.ring, &mut self.cold, &mut self.pool)
    }

    /// Moves the window so it covers `price`, pulling cold levels as needed.
    ///
    /// Returns the number of ticks the window moved.
    pub fn recenter_to(&mut self, price: Price) -> Result<usize, OrderBookError> {
        if self.ring.is_in_window(price) {
            return Ok(0);
        }
        let incoming = self
            .cold
            .take_exact(price)
            .unwrap_or_else(|| PriceLevel::new(price));
        RecenterManager::swap_in(&mut self.ring, &mut self.cold, &mut self.pool, incoming)
    }
}

impl fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBook")
            .field("symbol", &self.symbol)
            .field("window", &self.window())
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("orders", &self.order_count())
            .field("cold_bids", &self.cold.len_bids())
            .field("cold_asks", &self.cold.len_asks())
            .field("match_seq", &self.match_seq)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl MatchBook for OrderBook {
    fn symbol(&self) -> Symbol {
        self.symbol
    }

    fn validate(&self, order: &OrderInfo) -> Result<(), OrderBookError> {
        OrderBook::validate(self, order)
    }

    fn submit(&mut self, order: &OrderInfo) -> Result<OrderStatus, OrderBookError> {
        OrderBook::submit(self, order)
    }

    fn cancel(
        &mut self,
        symbol: Symbol,
        price: Price,
        order_id: OrderId,
    ) -> Result<bool, OrderBookError> {
        OrderBook::cancel(self, symbol, price, order_id)
    }

    fn can_match_immediately(&self, side: Side, price: Price) -> bool {
        OrderBook::can_match_immediately(self, side, price)
    }

    fn best_liq(&self, side: Side, price: Price) -> Option<BestLiqView> {
        OrderBook::best_liq(self, side, price)
    }

    fn match_head(
        &mut self,
        taker: &OrderInfo,
        max_qty: Quantity,
    ) -> Result<Option<StepMatchResult>, OrderBookError> {
        OrderBook::match_head(self, taker, max_qty)
    }

    fn snapshot(&self) -> SnapshotView {
        OrderBook::snapshot(self)
    }

    fn restore(&mut self, view: &SnapshotView) -> Result<(), OrderBookError> {
        OrderBook::restore(self, view)
    }

    fn depth(&self) -> String {
        OrderBook::depth(self)
    }
}
