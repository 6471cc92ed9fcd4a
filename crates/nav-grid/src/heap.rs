//! Fixed-capacity binary min-heap used as the A* open set.

/// Open-set entry: a grid cell index with its A* costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapNode {
    pub index: usize,
    pub f_cost: u32,
    pub h_cost: u32,
}

impl HeapNode {
    /// Ordering key: lowest `f` first, then the node nearer the goal.
    fn key(&self) -> (u32, u32) {
        (self.f_cost, self.h_cost)
    }
}

/// Binary min-heap over a backing store that never grows.
///
/// A push on a full heap is dropped and counted in [`dropped`](Self::dropped); the search
/// degrades instead of allocating.
#[derive(Debug, Clone)]
pub struct BoundedMinHeap {
    items: Vec<HeapNode>,
    capacity: usize,
    dropped: usize,
}

impl BoundedMinHeap {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pushes dropped since the last [`clear`](Self::clear).
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.dropped = 0;
    }

    pub fn peek(&self) -> Option<&HeapNode> {
        self.items.first()
    }

    /// Returns `false` when the node was dropped because the heap is full.
    pub fn push(&mut self, node: HeapNode) -> bool {
        if self.items.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.items.push(node);
        self.sift_up(self.items.len() - 1);
        true
    }

    pub fn pop(&mut self) -> Option<HeapNode> {
        if self.items.is_empty() {
            return None;
        }
        let top = self.items.swap_remove(0);
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some(top)
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.items[index].key() >= self.items[parent].key() {
                break;
            }
            self.items.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.items.len();
        loop {
            let left = index * 2 + 1;
            let right = left + 1;
            let mut smallest = index;

            if left < len && self.items[left].key() < self.items[smallest].key() {
                smallest = left;
            }
            if right < len && self.items[right].key() < self.items[smallest].key() {
                smallest = right;
            }
            if smallest == index {
                return;
            }
            self.items.swap(index, smallest);
            index = smallest;
        }
    }
}
