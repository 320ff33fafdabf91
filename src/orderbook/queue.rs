//! FIFO queue of orders at one price, linked through the node arena.

use crate::orderbook::OrderBookError;
use crate::orderbook::pool::{NodeHandle, OrderNode, OrderNodePool};
use crate::orderbook::types::{OrderId, Quantity};
use rustc_hash::FxHashMap;
use std::fmt::Write;

/// Time-priority queue with O(1) append, head access and removal by id.
///
/// The queue does not own its nodes; every mutating call takes the
/// [`OrderNodePool`] the handles belong to. `size` and `total_qty` always
/// equal the count and quantity sum of the linked nodes.
#[derive(Debug, Default)]
pub struct OrderQueue {
    head: Option<NodeHandle>,
    tail: Option<NodeHandle>,
    index: FxHashMap<OrderId, NodeHandle>,
    total_qty: Quantity,
}

impl OrderQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node at the tail.
    ///
    /// # Errors
    /// Fails without touching the queue when the node is already linked,
    /// carries a zero quantity, or its id is already present.
    pub fn push(
        &mut self,
        pool: &mut OrderNodePool,
        handle: NodeHandle,
    ) -> Result<(), OrderBookError> {
        let node = &pool[handle];
        let order_id = node.order_id;
        if node.linked || node.prev.is_some() || node.next.is_some() {
            return Err(OrderBookError::NodeAlreadyLinked { order_id });
        }
        if node.qty == 0 {
            return Err(OrderBookError::InvalidQuantity {
                order_id,
                quantity: 0,
            });
        }
        if self.index.contains_key(&order_id) {
            return Err(OrderBookError::DuplicateOrderId { order_id });
        }
        let qty = node.qty;

        match self.tail {
            Some(tail) => {
                pool[tail].next = Some(handle);
                pool[handle].prev = Some(tail);
            }
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
        pool[handle].linked = true;

        self.index.insert(order_id, handle);
        self.total_qty = self.total_qty.saturating_add(qty);
        Ok(())
    }

    /// Oldest node, if any.
    #[inline]
    pub fn peek(&self) -> Option<NodeHandle> {
        self.head
    }

    /// Handle of the order with the given id.
    #[inline]
    pub fn get(&self, order_id: OrderId) -> Option<NodeHandle> {
        self.index.get(&order_id).copied()
    }

    /// Whether an order with this id is linked.
    #[inline]
    pub fn contains(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Unlinks the order with the given id and returns its node, still allocated.
    pub fn remove(
        &mut self,
        pool: &mut OrderNodePool,
        order_id: OrderId,
    ) -> Option<NodeHandle> {
        let handle = self.index.remove(&order_id)?;
        self.unlink(pool, handle);
        Some(handle)
    }

    fn unlink(&mut self, pool: &mut OrderNodePool, handle: NodeHandle) {
        let (prev, next, qty) = {
            let node = &pool[handle];
            (node.prev, node.next, node.qty)
        };
        match prev {
            Some(p) => pool[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => pool[n].prev = prev,
            None => self.tail = prev,
        }
        let node = &mut pool[handle];
        node.prev = None;
        node.next = None;
        node.linked = false;
        self.total_qty = self.total_qty.saturating_sub(qty);
    }

    /// Sets the remaining quantity of a linked order.
    ///
    /// # Errors
    /// [`OrderBookError::InvalidQuantity`] for zero and
    /// [`OrderBookError::OrderNotFound`] for an unknown id.
    pub fn patch_qty(
        &mut self,
        pool: &mut OrderNodePool,
        order_id: OrderId,
        new_qty: Quantity,
    ) -> Result<(), OrderBookError> {
        if new_qty == 0 {
            return Err(OrderBookError::InvalidQuantity {
                order_id,
                quantity: new_qty,
            });
        }
        let handle = self
            .get(order_id)
            .ok_or(OrderBookError::OrderNotFound { order_id })?;
        let node = &mut pool[handle];
        let old = node.qty;
        node.qty = new_qty;
        self.total_qty = self.total_qty.saturating_sub(old).saturating_add(new_qty);
        Ok(())
    }

    /// Unlinks every node and returns them in FIFO order, still allocated.
    pub fn clear(&mut self, pool: &mut OrderNodePool) -> Vec<NodeHandle> {
        let mut out = Vec::with_capacity(self.index.len());
        while let Some(head) = self.head {
            let order_id = pool[head].order_id;
            self.index.remove(&order_id);
            self.unlink(pool, head);
            out.push(head);
        }
        self.total_qty = 0;
        out
    }

    /// Number of linked orders.
    #[inline]
    pub fn size(&self) -> usize {
        self.index.len()
    }

    /// Sum of remaining quantity over linked orders.
    #[inline]
    pub fn total_qty(&self) -> Quantity {
        self.total_qty
    }

    /// Whether no order is linked.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Iterates the linked orders from oldest to newest.
    pub fn iter<'a>(&self, pool: &'a OrderNodePool) -> QueueIter<'a> {
        QueueIter {
            pool,
            cursor: self.head,
        }
    }

    /// One line per order, oldest first.
    pub fn dump(&self, pool: &OrderNodePool) -> String {
        let mut out = String::new();
        for (handle, node) in self.iter(pool) {
            let _ = writeln!(
                out,
                "  {handle:?} id={} user={} side={} qty={}",
                node.order_id, node.user_id, node.side, node.qty
            );
        }
        out
    }
}

/// Iterator over the nodes of an [`OrderQueue`] in time priority.
#[derive(Debug)]
pub struct QueueIter<'a> {
    pool: &'a OrderNodePool,
    cursor: Option<NodeHandle>,
}

impl<'a> Iterator for QueueIter<'a> {
    type Item = (NodeHandle, &'a OrderNode);

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.cursor?;
        let node = self.pool.get(handle)?;
        self.cursor = node.next;
        Some((handle, node))
    }
}
