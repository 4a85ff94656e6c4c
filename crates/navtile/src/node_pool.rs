//! Node pool and open list for graph searches
//!
//! Nodes are addressed by 1-based [`NodeIndex`] values so that 0 can mean "no
//! parent". The pool hashes nodes by `(PolyRef, state)`; the open list is a
//! binary heap of node indices ordered by the nodes' `total` cost.

use bitflags::bitflags;
use navtile_common::next_pow2;

use super::PolyRef;

bitflags! {
    /// Search state of a node
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        const OPEN = 0x01;
        const CLOSED = 0x02;
        /// Parent is not adjacent, the node was reached through a raycast
        const PARENT_DETACHED = 0x04;
    }
}

/// 1-based node index, 0 is none
pub type NodeIndex = u16;

/// The "no node" index
pub const NULL_NODE: NodeIndex = 0;

/// Number of coexisting states a polygon can have in the pool
pub const MAX_STATES_PER_NODE: usize = 4;

/// Largest supported pool capacity
pub const MAX_NODE_POOL_SIZE: usize = NodeIndex::MAX as usize;

/// Search node
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Position used for cost evaluation
    pub pos: [f32; 3],
    /// Cost from the search origin
    pub cost: f32,
    /// Cost plus heuristic
    pub total: f32,
    /// Parent node, [`NULL_NODE`] for the root
    pub pidx: NodeIndex,
    /// State tag distinguishing multiple nodes of one polygon
    pub state: u8,
    pub flags: NodeFlags,
    /// Polygon the node stands for
    pub id: PolyRef,
}

/// Hash of a 64-bit polygon reference
#[inline]
fn hash_ref(r: PolyRef) -> u64 {
    let mut a = r.id();
    a = a.wrapping_add(!(a << 31));
    a ^= a >> 20;
    a = a.wrapping_add(a << 6);
    a ^= a >> 12;
    a = a.wrapping_add(!(a << 22));
    a ^= a >> 32;
    a
}

/// Fixed-capacity pool of search nodes
#[derive(Debug, Clone)]
pub struct NodePool {
    nodes: Vec<Node>,
    /// Polygons skipped by a raycast shortcut into each node
    shortcuts: Vec<Vec<PolyRef>>,
    first: Vec<NodeIndex>,
    next: Vec<NodeIndex>,
    max_nodes: usize,
    hash_mask: usize,
}

impl NodePool {
    /// Creates a pool holding at most `max_nodes` nodes
    pub fn new(max_nodes: usize) -> Self {
        let max_nodes = max_nodes.clamp(1, MAX_NODE_POOL_SIZE);
        let hash_size = next_pow2((max_nodes / 4) as u32) as usize;
        Self {
            nodes: Vec::with_capacity(max_nodes),
            shortcuts: Vec::with_capacity(max_nodes),
            first: vec![NULL_NODE; hash_size],
            next: Vec::with_capacity(max_nodes),
            max_nodes,
            hash_mask: hash_size - 1,
        }
    }

    /// Drops every node
    pub fn clear(&mut self) {
        self.first.fill(NULL_NODE);
        self.nodes.clear();
        self.next.clear();
        self.shortcuts.iter_mut().for_each(Vec::clear);
    }

    #[inline]
    fn bucket(&self, id: PolyRef) -> usize {
        hash_ref(id) as usize & self.hash_mask
    }

    fn bucket_iter(&self, id: PolyRef) -> impl Iterator<Item = NodeIndex> + '_ {
        let head = self.first[self.bucket(id)];
        std::iter::successors((head != NULL_NODE).then_some(head), move |&i| {
            let n = self.next[i as usize - 1];
            (n != NULL_NODE).then_some(n)
        })
    }

    /// Node for `(id, state)`, allocated on first use. `None` when the pool is full.
    pub fn get_node(&mut self, id: PolyRef, state: u8) -> Option<NodeIndex> {
        if let Some(idx) = self.find_node(id, state) {
            return Some(idx);
        }
        if self.nodes.len() >= self.max_nodes {
            return None;
        }

        self.nodes.push(Node {
            id,
            state,
            ..Node::default()
        });
        let idx = self.nodes.len() as NodeIndex;
        if self.shortcuts.len() < self.nodes.len() {
            self.shortcuts.push(Vec::new());
        } else {
            self.shortcuts[idx as usize - 1].clear();
        }

        let bucket = self.bucket(id);
        self.next.push(self.first[bucket]);
        self.first[bucket] = idx;
        Some(idx)
    }

    /// Existing node for `(id, state)`
    pub fn find_node(&self, id: PolyRef, state: u8) -> Option<NodeIndex> {
        self.bucket_iter(id).find(|&i| {
            let n = &self.nodes[i as usize - 1];
            n.id == id && n.state == state
        })
    }

    /// Every node of polygon `id`, whatever its state
    pub fn find_nodes(&self, id: PolyRef) -> Vec<NodeIndex> {
        self.bucket_iter(id)
            .filter(|&i| self.nodes[i as usize - 1].id == id)
            .take(MAX_STATES_PER_NODE)
            .collect()
    }

    /// Node at `idx`; `None` for [`NULL_NODE`] or an unallocated index
    pub fn node_at_idx(&self, idx: NodeIndex) -> Option<&Node> {
        (idx as usize).checked_sub(1).and_then(|i| self.nodes.get(i))
    }

    /// Node at an index handed out by this pool
    #[inline]
    pub(crate) fn node(&self, idx: NodeIndex) -> &Node {
        &self.nodes[idx as usize - 1]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.nodes[idx as usize - 1]
    }

    /// Polygons bypassed by the raycast shortcut that reached this node
    pub fn shortcut(&self, idx: NodeIndex) -> &[PolyRef] {
        (idx as usize)
            .checked_sub(1)
            .and_then(|i| self.shortcuts.get(i))
            .map_or(&[][..], Vec::as_slice)
    }

    pub(crate) fn set_shortcut(&mut self, idx: NodeIndex, path: &[PolyRef]) {
        let slot = &mut self.shortcuts[idx as usize - 1];
        slot.clear();
        slot.extend_from_slice(path);
    }

    pub(crate) fn clear_shortcut(&mut self, idx: NodeIndex) {
        self.shortcuts[idx as usize - 1].clear();
    }

    /// Number of allocated nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    pub fn hash_size(&self) -> usize {
        self.first.len()
    }
}

/// Binary min-heap of node indices keyed by [`Node::total`]
#[derive(Debug, Clone, Default)]
pub struct NodeQueue {
    heap: Vec<NodeIndex>,
}

impl NodeQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Node with the lowest total cost
    pub fn top(&self) -> Option<NodeIndex> {
        self.heap.first().copied()
    }

    pub fn push(&mut self, pool: &NodePool, idx: NodeIndex) {
        self.heap.push(idx);
        self.bubble_up(pool, self.heap.len() - 1, idx);
    }

    pub fn pop(&mut self, pool: &NodePool) -> Option<NodeIndex> {
        let top = self.top()?;
        let last = self.heap.pop()?;
        if !self.heap.is_empty() {
            self.trickle_down(pool, 0, last);
        }
        Some(top)
    }

    /// Restores the heap order after the total of `idx` decreased
    pub fn modify(&mut self, pool: &NodePool, idx: NodeIndex) {
        if let Some(i) = self.heap.iter().position(|&n| n == idx) {
            self.bubble_up(pool, i, idx);
        }
    }

    fn bubble_up(&mut self, pool: &NodePool, mut i: usize, idx: NodeIndex) {
        let total = pool.node(idx).total;
        while i > 0 {
            let parent = (i - 1) / 2;
            if total >= pool.node(self.heap[parent]).total {
                break;
            }
            self.heap[i] = self.heap[parent];
            i = parent;
        }
        self.heap[i] = idx;
    }

    fn trickle_down(&mut self, pool: &NodePool, mut i: usize, idx: NodeIndex) {
        let size = self.heap.len();
        let mut child = i * 2 + 1;
        while child < size {
            if child + 1 < size && pool.node(self.heap[child]).total > pool.node(self.heap[child + 1]).total {
                child += 1;
            }
            self.heap[i] = self.heap[child];
            i = child;
            child = i * 2 + 1;
        }
        self.bubble_up(pool, i, idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_node_allocates_once() {
        let mut pool = NodePool::new(8);
        let a = pool.get_node(PolyRef::new(5), 0).unwrap();
        let b = pool.get_node(PolyRef::new(5), 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, 1);
        assert_eq!(pool.node_count(), 1);

        let c = pool.get_node(PolyRef::new(5), 1).unwrap();
        assert_ne!(a, c);
        assert_eq!(pool.find_nodes(PolyRef::new(5)).len(), 2);
        assert_eq!(pool.find_node(PolyRef::new(5), 2), None);
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut pool = NodePool::new(2);
        assert!(pool.get_node(PolyRef::new(1), 0).is_some());
        assert!(pool.get_node(PolyRef::new(2), 0).is_some());
        assert!(pool.get_node(PolyRef::new(3), 0).is_none());
        // Existing nodes are still found
        assert!(pool.get_node(PolyRef::new(1), 0).is_some());

        pool.clear();
        assert_eq!(pool.node_count(), 0);
        assert!(pool.find_node(PolyRef::new(1), 0).is_none());
        assert!(pool.get_node(PolyRef::new(3), 0).is_some());
    }

    #[test]
    fn test_null_index_is_none() {
        let mut pool = NodePool::new(4);
        assert!(pool.node_at_idx(NULL_NODE).is_none());
        let idx = pool.get_node(PolyRef::new(9), 0).unwrap();
        assert_eq!(pool.node_at_idx(idx).map(|n| n.id), Some(PolyRef::new(9)));
        assert!(pool.node_at_idx(idx + 1).is_none());
    }

    #[test]
    fn test_shortcut_cleared_on_reuse() {
        let mut pool = NodePool::new(4);
        let idx = pool.get_node(PolyRef::new(1), 0).unwrap();
        pool.set_shortcut(idx, &[PolyRef::new(2), PolyRef::new(3)]);
        assert_eq!(pool.shortcut(idx).len(), 2);

        pool.clear();
        let idx = pool.get_node(PolyRef::new(7), 0).unwrap();
        assert!(pool.shortcut(idx).is_empty());
    }

    #[test]
    fn test_queue_orders_by_total() {
        let mut pool = NodePool::new(16);
        let mut queue = NodeQueue::new(16);
        for (i, total) in [5.0, 1.0, 4.0, 3.0, 2.0].into_iter().enumerate() {
            let idx = pool.get_node(PolyRef::new(i as u64 + 1), 0).unwrap();
            pool.node_mut(idx).total = total;
            queue.push(&pool, idx);
        }

        // Decrease a key and re-heapify
        let idx = pool.find_node(PolyRef::new(1), 0).unwrap();
        pool.node_mut(idx).total = 0.5;
        queue.modify(&pool, idx);

        let mut order = Vec::new();
        while let Some(idx) = queue.pop(&pool) {
            order.push(pool.node(idx).total);
        }
        assert_eq!(order, vec![0.5, 1.0, 2.0, 3.0, 4.0]);
        assert!(queue.is_empty());
    }
}
