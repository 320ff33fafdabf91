//! Order node arena with a fixed primary pool and a growable overflow space.
//!
//! Nodes are addressed by [`NodeHandle`]s instead of references so that the
//! FIFO queues can keep `prev`/`next` links without aliasing. Allocation never
//! fails: once the primary pool is exhausted, nodes come from the overflow
//! arena and are counted as such.

use crate::orderbook::OrderBookError;
use crate::orderbook::types::{OrderId, Quantity, Side, UserId};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};
use tracing::trace;

/// Stable address of an [`OrderNode`] inside an [`OrderNodePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeHandle {
    /// Slot in the fixed primary pool.
    Pooled(u32),
    /// Slot in the overflow arena.
    Overflow(u32),
}

/// A resting order as stored in the arena.
#[derive(Debug, Clone)]
pub struct OrderNode {
    /// Order identifier.
    pub order_id: OrderId,
    /// Owner of the order.
    pub user_id: UserId,
    /// Book side.
    pub side: Side,
    /// Remaining quantity.
    pub qty: Quantity,
    /// Arrival time in epoch milliseconds.
    pub time: u64,
    pub(crate) prev: Option<NodeHandle>,
    pub(crate) next: Option<NodeHandle>,
    pub(crate) linked: bool,
    used: bool,
}

impl OrderNode {
    const fn vacant() -> Self {
        Self {
            order_id: 0,
            user_id: 0,
            side: Side::Bid,
            qty: 0,
            time: 0,
            prev: None,
            next: None,
            linked: false,
            used: false,
        }
    }

    /// Previous node in the owning queue.
    #[inline]
    pub fn prev(&self) -> Option<NodeHandle> {
        self.prev
    }

    /// Next node in the owning queue.
    #[inline]
    pub fn next(&self) -> Option<NodeHandle> {
        self.next
    }

    /// Whether the node currently sits in a queue.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// Whether the node is allocated.
    #[inline]
    pub fn is_used(&self) -> bool {
        self.used
    }
}

/// Usage counters of an [`OrderNodePool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Capacity of the primary pool.
    pub pool_size: usize,
    /// Primary slots currently allocated.
    pub in_use_pooled: usize,
    /// Overflow nodes currently allocated.
    pub in_use_overflow: usize,
    /// Total overflow allocations since creation.
    pub overflow_alloc: u64,
    /// Total overflow nodes released since creation.
    pub released_overflow: u64,
    /// Highest number of nodes simultaneously in use.
    pub peak_in_use: usize,
}

/// Fixed-capacity node pool that spills into an overflow arena under burst load.
#[derive(Debug)]
pub struct OrderNodePool {
    pooled: Vec<OrderNode>,
    free_pooled: Vec<u32>,
    overflow: Vec<OrderNode>,
    free_overflow: Vec<u32>,
    stats: PoolStats,
}

impl OrderNodePool {
    /// Creates a pool with `capacity` preallocated nodes.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize);
        let pooled = vec![OrderNode::vacant(); capacity];
        // Reverse so that slot 0 is handed out first.
        let free_pooled = (0..capacity as u32).rev().collect();
        Self {
            pooled,
            free_pooled,
            overflow: Vec::new(),
            free_overflow: Vec::new(),
            stats: PoolStats {
                pool_size: capacity,
                ..PoolStats::default()
            },
        }
    }

    /// Allocates an unlinked node, preferring the primary pool.
    pub fn alloc(
        &mut self,
        order_id: OrderId,
        user_id: UserId,
        side: Side,
        qty: Quantity,
        time: u64,
    ) -> NodeHandle {
        let handle = if let Some(slot) = self.free_pooled.pop() {
            self.stats.in_use_pooled = self.stats.in_use_pooled.saturating_add(1);
            NodeHandle::Pooled(slot)
        } else {
            let slot = match self.free_overflow.pop() {
                Some(slot) => slot,
                None => {
                    self.overflow.push(OrderNode::vacant());
                    (self.overflow.len() - 1) as u32
                }
            };
            self.stats.in_use_overflow = self.stats.in_use_overflow.saturating_add(1);
            self.stats.overflow_alloc = self.stats.overflow_alloc.saturating_add(1);
            trace!(order_id, slot, "pool exhausted, node taken from overflow");
            NodeHandle::Overflow(slot)
        };

        let node = &mut self[handle];
        node.order_id = order_id;
        node.user_id = user_id;
        node.side = side;
        node.qty = qty;
        node.time = time;
        node.prev = None;
        node.next = None;
        node.linked = false;
        node.used = true;

        let in_use = self.in_use();
        if in_use > self.stats.peak_in_use {
            self.stats.peak_in_use = in_use;
        }
        handle
    }

    /// Releases a node back to the pool.
    ///
    /// # Errors
    /// [`OrderBookError::DoubleFree`] if the node is not allocated and
    /// [`OrderBookError::NodeAlreadyLinked`] if it still sits in a queue.
    pub fn free(&mut self, handle: NodeHandle) -> Result<(), OrderBookError> {
        let node = self.get(handle).ok_or(OrderBookError::DoubleFree { order_id: 0 })?;
        if !node.used {
            return Err(OrderBookError::DoubleFree {
                order_id: node.order_id,
            });
        }
        if node.linked || node.prev.is_some() || node.next.is_some() {
            return Err(OrderBookError::NodeAlreadyLinked {
                order_id: node.order_id,
            });
        }

        self[handle].used = false;
        match handle {
            NodeHandle::Pooled(slot) => {
                self.free_pooled.push(slot);
                self.stats.in_use_pooled = self.stats.in_use_pooled.saturating_sub(1);
            }
            NodeHandle::Overflow(slot) => {
                self.stats.in_use_overflow = self.stats.in_use_overflow.saturating_sub(1);
                self.stats.released_overflow = self.stats.released_overflow.saturating_add(1);
                if self.stats.in_use_overflow == 0 {
                    // Burst is over, give the overflow memory back.
                    self.overflow.clear();
                    self.overflow.shrink_to_fit();
                    self.free_overflow.clear();
                } else {
                    self.free_overflow.push(slot);
                }
            }
        }
        Ok(())
    }

    /// Checked access to a node.
    pub fn get(&self, handle: NodeHandle) -> Option<&OrderNode> {
        match handle {
            NodeHandle::Pooled(slot) => self.pooled.get(slot as usize),
            NodeHandle::Overflow(slot) => self.overflow.get(slot as usize),
        }
    }

    /// Checked mutable access to a node.
    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut OrderNode> {
        match handle {
            NodeHandle::Pooled(slot) => self.pooled.get_mut(slot as usize),
            NodeHandle::Overflow(slot) => self.overflow.get_mut(slot as usize),
        }
    }

    /// Nodes currently allocated from either space.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.stats
            .in_use_pooled
            .saturating_add(self.stats.in_use_overflow)
    }

    /// Snapshot of the usage counters.
    #[inline]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

impl Default for OrderNodePool {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Index<NodeHandle> for OrderNodePool {
    type Output = OrderNode;

    /// Panics on a handle that was never issued; handles held by queues are
    /// always live.
    fn index(&self, handle: NodeHandle) -> &OrderNode {
        match handle {
            NodeHandle::Pooled(slot) => &self.pooled[slot as usize],
            NodeHandle::Overflow(slot) => &self.overflow[slot as usize],
        }
    }
}

impl IndexMut<NodeHandle> for OrderNodePool {
    fn index_mut(&mut self, handle: NodeHandle) -> &mut OrderNode {
        match handle {
            NodeHandle::Pooled(slot) => &mut self.pooled[slot as usize],
            NodeHandle::Overflow(slot) => &mut self.overflow[slot as usize],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_prefers_pool_then_overflows() {
        let mut pool = OrderNodePool::new(2);
        let a = pool.alloc(1, 10, Side::Bid, 5, 0);
        let b = pool.alloc(2, 10, Side::Bid, 5, 0);
        let c = pool.alloc(3, 10, Side::Ask, 7, 0);

        assert!(matches!(a, NodeHandle::Pooled(0)));
        assert!(matches!(b, NodeHandle::Pooled(1)));
        assert!(matches!(c, NodeHandle::Overflow(_)));

        let stats = pool.stats();
        assert_eq!(stats.in_use_pooled, 2);
        assert_eq!(stats.in_use_overflow, 1);
        assert_eq!(stats.overflow_alloc, 1);
        assert_eq!(stats.peak_in_use, 3);
        assert_eq!(pool[c].qty, 7);
        assert_eq!(pool[c].side, Side::Ask);
    }

    #[test]
    fn test_free_returns_slots_and_tracks_release() {
        let mut pool = OrderNodePool::new(1);
        let a = pool.alloc(1, 1, Side::Bid, 1, 0);
        let b = pool.alloc(2, 1, Side::Bid, 1, 0);

        assert!(pool.free(b).is_ok());
        assert!(pool.free(a).is_ok());
        let stats = pool.stats();
        assert_eq!(stats.released_overflow, 1);
        assert_eq!(stats.in_use_pooled, 0);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(stats.peak_in_use, 2);

        let again = pool.alloc(3, 1, Side::Ask, 2, 0);
        assert_eq!(again, NodeHandle::Pooled(0));
        assert_eq!(pool[again].order_id, 3);
        assert!(!pool[again].is_linked());
    }

    #[test]
    fn test_double_free_is_rejected() {
        let mut pool = OrderNodePool::new(4);
        let a = pool.alloc(42, 1, Side::Bid, 1, 0);
        assert!(pool.free(a).is_ok());
        assert_eq!(
            pool.free(a),
            Err(OrderBookError::DoubleFree { order_id: 42 })
        );
    }

    #[test]
    fn test_free_of_unknown_overflow_handle() {
        let mut pool = OrderNodePool::new(0);
        assert!(pool.free(NodeHandle::Overflow(9)).is_err());
    }
}
