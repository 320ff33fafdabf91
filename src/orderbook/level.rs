//! A single price point of the book.

use crate::orderbook::OrderBookError;
use crate::orderbook::pool::{NodeHandle, OrderNodePool};
use crate::orderbook::queue::{OrderQueue, QueueIter};
use crate::orderbook::types::{OrderId, Price, Quantity, Side};

/// Orders resting at one price, in time priority.
///
/// The side is fixed by the first order entering an empty level and cleared
/// again once the level drains.
#[derive(Debug)]
pub struct PriceLevel {
    price: Price,
    side: Option<Side>,
    queue: OrderQueue,
}

impl PriceLevel {
    /// Creates an empty level.
    pub fn new(price: Price) -> Self {
        Self {
            price,
            side: None,
            queue: OrderQueue::new(),
        }
    }

    /// Price of the level.
    #[inline]
    pub fn price(&self) -> Price {
        self.price
    }

    /// Side of the resting orders, `None` while empty.
    #[inline]
    pub fn side(&self) -> Option<Side> {
        self.side
    }

    /// Appends an order.
    ///
    /// # Errors
    /// [`OrderBookError::SideMismatch`] when the order's side differs from the
    /// orders already resting here, plus any [`OrderQueue::push`] error.
    pub fn submit(
        &mut self,
        pool: &mut OrderNodePool,
        handle: NodeHandle,
    ) -> Result<(), OrderBookError> {
        let order_side = pool[handle].side;
        match self.side {
            Some(level_side) if level_side != order_side && !self.queue.is_empty() => {
                return Err(OrderBookError::SideMismatch {
                    price: self.price,
                    level_side,
                    order_side,
                });
            }
            _ => {}
        }
        self.queue.push(pool, handle)?;
        self.side = Some(order_side);
        Ok(())
    }

    /// Head of the queue.
    #[inline]
    pub fn first(&self) -> Option<NodeHandle> {
        self.queue.peek()
    }

    /// Handle of a resting order.
    #[inline]
    pub fn get(&self, order_id: OrderId) -> Option<NodeHandle> {
        self.queue.get(order_id)
    }

    /// Sets the remaining quantity of a resting order.
    pub fn patch_qty(
        &mut self,
        pool: &mut OrderNodePool,
        order_id: OrderId,
        new_qty: Quantity,
    ) -> Result<(), OrderBookError> {
        self.queue.patch_qty(pool, order_id, new_qty)
    }

    /// Unlinks an order and hands its node back to the caller.
    pub fn remove(&mut self, pool: &mut OrderNodePool, order_id: OrderId) -> Option<NodeHandle> {
        let handle = self.queue.remove(pool, order_id)?;
        if self.queue.is_empty() {
            self.side = None;
        }
        Some(handle)
    }

    /// Unlinks an order, frees its node and returns the quantity it still had.
    pub fn cancel(
        &mut self,
        pool: &mut OrderNodePool,
        order_id: OrderId,
    ) -> Result<Option<Quantity>, OrderBookError> {
        let Some(handle) = self.remove(pool, order_id) else {
            return Ok(None);
        };
        let remaining = pool[handle].qty;
        pool.free(handle)?;
        Ok(Some(remaining))
    }

    /// Unlinks all orders, returning their nodes in time priority.
    pub fn drain(&mut self, pool: &mut OrderNodePool) -> Vec<NodeHandle> {
        self.side = None;
        self.queue.clear(pool)
    }

    /// Moves every order of `other` behind the orders of this level.
    pub fn absorb(
        &mut self,
        pool: &mut OrderNodePool,
        mut other: PriceLevel,
    ) -> Result<(), OrderBookError> {
        for handle in other.drain(pool) {
            self.submit(pool, handle)?;
        }
        Ok(())
    }

    /// Number of resting orders.
    #[inline]
    pub fn size(&self) -> usize {
        self.queue.size()
    }

    /// Aggregate resting quantity.
    #[inline]
    pub fn total_qty(&self) -> Quantity {
        self.queue.total_qty()
    }

    /// Whether nothing rests here.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether the level holds liquidity on `side`.
    #[inline]
    pub fn has_side(&self, side: Side) -> bool {
        !self.is_empty() && self.side == Some(side)
    }

    /// Orders in time priority.
    pub fn iter<'a>(&self, pool: &'a OrderNodePool) -> QueueIter<'a> {
        self.queue.iter(pool)
    }

    /// Human readable listing of the level.
    pub fn dump(&self, pool: &OrderNodePool) -> String {
        let side = self.side.map_or_else(|| "-".to_string(), |s| s.to_string());
        format!(
            "price={} side={} size={} total={}\n{}",
            self.price,
            side,
            self.size(),
            self.total_qty(),
            self.queue.dump(pool)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_order_fixes_side() {
        let mut pool = OrderNodePool::new(4);
        let mut level = PriceLevel::new(100);
        assert_eq!(level.side(), None);

        let bid = pool.alloc(1, 1, Side::Bid, 2, 0);
        assert!(level.submit(&mut pool, bid).is_ok());
        assert_eq!(level.side(), Some(Side::Bid));

        let ask = pool.alloc(2, 1, Side::Ask, 2, 0);
        assert_eq!(
            level.submit(&mut pool, ask),
            Err(OrderBookError::SideMismatch {
                price: 100,
                level_side: Side::Bid,
                order_side: Side::Ask,
            })
        );
        assert_eq!(level.size(), 1);
    }

    #[test]
    fn test_side_resets_once_drained() {
        let mut pool = OrderNodePool::new(4);
        let mut level = PriceLevel::new(100);
        let bid = pool.alloc(1, 1, Side::Bid, 2, 0);
        assert!(level.submit(&mut pool, bid).is_ok());
        assert_eq!(level.cancel(&mut pool, 1), Ok(Some(2)));
        assert_eq!(level.side(), None);
        assert_eq!(pool.in_use(), 0);

        let ask = pool.alloc(2, 1, Side::Ask, 3, 0);
        assert!(level.submit(&mut pool, ask).is_ok());
        assert!(level.has_side(Side::Ask));
    }

    #[test]
    fn test_cancel_unknown_order() {
        let mut pool = OrderNodePool::new(4);
        let mut level = PriceLevel::new(100);
        assert_eq!(level.cancel(&mut pool, 99), Ok(None));
    }

    #[test]
    fn test_absorb_appends_behind() {
        let mut pool = OrderNodePool::new(8);
        let mut hot = PriceLevel::new(50);
        let mut cold = PriceLevel::new(50);
        let a = pool.alloc(1, 1, Side::Ask, 1, 0);
        let b = pool.alloc(2, 1, Side::Ask, 2, 0);
        assert!(hot.submit(&mut pool, a).is_ok());
        assert!(cold.submit(&mut pool, b).is_ok());

        assert!(hot.absorb(&mut pool, cold).is_ok());
        let ids: Vec<_> = hot.iter(&pool).map(|(_, n)| n.order_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(hot.total_qty(), 3);
    }
}
