//! Structured, column-oriented copy of the resting orders.

use crate::orderbook::types::{OrderId, Price, Quantity, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

/// One resting order as seen in a [`SnapshotView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Level price.
    pub price: Price,
    /// Owner.
    pub user_id: UserId,
    /// Order identifier.
    pub order_id: OrderId,
    /// Remaining quantity.
    pub qty: Quantity,
}

/// Parallel arrays describing every resting order of a book.
///
/// Bids are listed by descending price and asks by ascending price; orders
/// at the same price keep their time priority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotView {
    /// Bid prices, one per order.
    pub bid_prices: Vec<Price>,
    /// Bid owners.
    pub bid_user_ids: Vec<UserId>,
    /// Bid order ids.
    pub bid_order_ids: Vec<OrderId>,
    /// Bid remaining quantities.
    pub bid_qty: Vec<Quantity>,
    /// Ask prices, one per order.
    pub ask_prices: Vec<Price>,
    /// Ask owners.
    pub ask_user_ids: Vec<UserId>,
    /// Ask order ids.
    pub ask_order_ids: Vec<OrderId>,
    /// Ask remaining quantities.
    pub ask_qty: Vec<Quantity>,
}

impl SnapshotView {
    /// Empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a bid entry.
    pub fn push_bid(&mut self, price: Price, user_id: UserId, order_id: OrderId, qty: Quantity) {
        self.bid_prices.push(price);
        self.bid_user_ids.push(user_id);
        self.bid_order_ids.push(order_id);
        self.bid_qty.push(qty);
    }

    /// Appends an ask entry.
    pub fn push_ask(&mut self, price: Price, user_id: UserId, order_id: OrderId, qty: Quantity) {
        self.ask_prices.push(price);
        self.ask_user_ids.push(user_id);
        self.ask_order_ids.push(order_id);
        self.ask_qty.push(qty);
    }

    /// Number of bid entries.
    pub fn bid_len(&self) -> usize {
        self.bid_prices.len()
    }

    /// Number of ask entries.
    pub fn ask_len(&self) -> usize {
        self.ask_prices.len()
    }

    /// Whether the view holds no order.
    pub fn is_empty(&self) -> bool {
        self.bid_prices.is_empty() && self.ask_prices.is_empty()
    }

    /// Whether the four arrays of each side have the same length.
    pub fn is_consistent(&self) -> bool {
        let bids = self.bid_prices.len();
        let asks = self.ask_prices.len();
        self.bid_user_ids.len() == bids
            && self.bid_order_ids.len() == bids
            && self.bid_qty.len() == bids
            && self.ask_user_ids.len() == asks
            && self.ask_order_ids.len() == asks
            && self.ask_qty.len() == asks
    }

    /// Bid entries in stored order.
    pub fn bids(&self) -> SnapshotEntries<'_> {
        SnapshotEntries {
            prices: &self.bid_prices,
            user_ids: &self.bid_user_ids,
            order_ids: &self.bid_order_ids,
            qty: &self.bid_qty,
            pos: 0,
        }
    }

    /// Ask entries in stored order.
    pub fn asks(&self) -> SnapshotEntries<'_> {
        SnapshotEntries {
            prices: &self.ask_prices,
            user_ids: &self.ask_user_ids,
            order_ids: &self.ask_order_ids,
            qty: &self.ask_qty,
            pos: 0,
        }
    }

    /// Highest bid price.
    pub fn best_bid(&self) -> Option<Price> {
        self.bid_prices.iter().copied().max()
    }

    /// Lowest ask price.
    pub fn best_ask(&self) -> Option<Price> {
        self.ask_prices.iter().copied().min()
    }

    /// JSON rendering for diagnostics.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// ASCII depth ladder of the best `levels` prices per side, quantities
    /// aggregated per price and drawn as bars up to `bar_width` cells wide.
    pub fn render(&self, levels: usize, bar_width: usize) -> String {
        let bid_levels = aggregate(&self.bid_prices, &self.bid_qty);
        let ask_levels = aggregate(&self.ask_prices, &self.ask_qty);

        let bids: Vec<(Price, Quantity)> = bid_levels
            .iter()
            .rev()
            .take(levels)
            .map(|(p, q)| (*p, *q))
            .collect();
        let asks: Vec<(Price, Quantity)> = ask_levels
            .iter()
            .take(levels)
            .map(|(p, q)| (*p, *q))
            .collect();
        let max_qty = bids
            .iter()
            .chain(asks.iter())
            .map(|(_, q)| *q)
            .max()
            .unwrap_or(1)
            .max(1);

        let mut out = String::with_capacity(1024);
        let _ = writeln!(out, "=== OrderBook Snapshot (levels={levels}) ===");
        let _ = writeln!(
            out,
            "Bids: {} levels, Asks: {} levels",
            bid_levels.len(),
            ask_levels.len()
        );

        let best_bid = bids.first().map(|(p, _)| *p);
        let best_ask = asks.first().map(|(p, _)| *p);
        let mut summary = Vec::new();
        if let Some(bid) = best_bid {
            summary.push(format!("BestBid: {bid}"));
        }
        if let Some(ask) = best_ask {
            summary.push(format!("BestAsk: {ask}"));
        }
        if let (Some(bid), Some(ask)) = (best_bid, best_ask) {
            let mid = (bid as f64 + ask as f64) / 2.0;
            summary.push(format!("Spread: {}  Mid: {mid}", ask - bid));
        }
        let _ = writeln!(out, "{}", summary.join("  |  "));

        let w = bar_width;
        let _ = writeln!(
            out,
            "{:<12} {:<12} {:<w$} | {:<w$} {:<12} {:<12}",
            "BidQty", "BidPrice", "BID-DEPTH", "ASK-DEPTH", "AskPrice", "AskQty"
        );
        for row in 0..bids.len().max(asks.len()) {
            let bid = bids.get(row);
            let ask = asks.get(row);
            let cell = |v: Option<String>| v.unwrap_or_default();
            let _ = writeln!(
                out,
                "{:<12} {:<12} {:<w$} | {:<w$} {:<12} {:<12}",
                cell(bid.map(|(_, q)| q.to_string())),
                cell(bid.map(|(p, _)| p.to_string())),
                cell(bid.map(|(_, q)| bar(*q, max_qty, w, true))),
                cell(ask.map(|(_, q)| bar(*q, max_qty, w, false))),
                cell(ask.map(|(p, _)| p.to_string())),
                cell(ask.map(|(_, q)| q.to_string())),
            );
        }
        out
    }
}

fn aggregate(prices: &[Price], qty: &[Quantity]) -> BTreeMap<Price, Quantity> {
    let mut levels = BTreeMap::new();
    for (price, q) in prices.iter().zip(qty) {
        if *q > 0 {
            *levels.entry(*price).or_insert(0) += *q;
        }
    }
    levels
}

/// Proportional bar; bids fill from the left, asks from the right.
fn bar(qty: Quantity, max_qty: Quantity, width: usize, left_to_right: bool) -> String {
    if max_qty == 0 || width == 0 {
        return String::new();
    }
    let filled = ((qty as f64 / max_qty as f64) * width as f64).round() as usize;
    let filled = filled.clamp(1, width);
    let blocks = "█".repeat(filled);
    let spaces = " ".repeat(width - filled);
    if left_to_right {
        blocks + &spaces
    } else {
        spaces + &blocks
    }
}

/// Iterator over one side of a [`SnapshotView`].
#[derive(Debug, Clone)]
pub struct SnapshotEntries<'a> {
    prices: &'a [Price],
    user_ids: &'a [UserId],
    order_ids: &'a [OrderId],
    qty: &'a [Quantity],
    pos: usize,
}

impl Iterator for SnapshotEntries<'_> {
    type Item = SnapshotEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.pos;
        let entry = SnapshotEntry {
            price: *self.prices.get(i)?,
            user_id: *self.user_ids.get(i)?,
            order_id: *self.order_ids.get(i)?,
            qty: *self.qty.get(i)?,
        };
        self.pos += 1;
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SnapshotView {
        let mut view = SnapshotView::new();
        view.push_bid(101, 1, 10, 4);
        view.push_bid(100, 2, 11, 2);
        view.push_bid(100, 3, 12, 2);
        view.push_ask(105, 4, 13, 8);
        view
    }

    #[test]
    fn test_entries_follow_columns() {
        let view = sample();
        assert!(view.is_consistent());
        let ids: Vec<_> = view.bids().map(|e| e.order_id).collect();
        assert_eq!(ids, vec![10, 11, 12]);
        assert_eq!(view.asks().count(), 1);
        assert_eq!(view.best_bid(), Some(101));
        assert_eq!(view.best_ask(), Some(105));

        let mut broken = sample();
        broken.ask_qty.clear();
        assert!(!broken.is_consistent());
    }

    #[test]
    fn test_render_ladder() {
        let text = sample().render(10, 8);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "=== OrderBook Snapshot (levels=10) ===");
        assert_eq!(lines[1], "Bids: 2 levels, Asks: 1 levels");
        assert_eq!(lines[2], "BestBid: 101  |  BestAsk: 105  |  Spread: 4  Mid: 103");
        assert!(lines[3].starts_with("BidQty"));
        // First row: bid 101x4 against ask 105x8, widest bar is the ask.
        assert!(lines[4].starts_with("4            101          "));
        assert!(lines[4].contains("████     | ████████ 105"));
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_json_round_trip() {
        let view = sample();
        let json = view.to_json().unwrap_or_else(|e| panic!("json: {e}"));
        let back: SnapshotView = serde_json::from_str(&json).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(back, view);
    }
}
