//! Mergeable pairing heap over an index arena.
//!
//! All nodes live in a shared [`HeapArena`]; a heap is just a root handle, so
//! melding two heaps links their roots and never moves or invalidates nodes.
//! Every node carries a `child_offset` applied lazily to its whole subtree:
//! the externally observed value of a node is its stored value plus the
//! `child_offset` of each of its heap ancestors. Shifting all values held by
//! a heap is therefore a root-only update, and the offsets are folded away
//! during links and extractions.

const NIL: i32 = -1;

#[derive(Clone, Debug)]
struct HeapNode<P> {
    sibling: i32,
    child: i32,
    left_up: i32,
    value: f64,
    child_offset: f64,
    payload: P,
}

/// Handle to one heap inside a [`HeapArena`].
#[derive(Debug)]
pub struct PairingHeap {
    root: i32,
}

impl PairingHeap {
    pub fn new() -> Self {
        PairingHeap { root: NIL }
    }

    pub fn is_empty(&self) -> bool {
        self.root == NIL
    }
}

impl Default for PairingHeap {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the nodes of every heap created against it.
#[derive(Clone, Debug)]
pub struct HeapArena<P> {
    nodes: Vec<HeapNode<P>>,
    free: Vec<u32>,
    scratch: Vec<i32>,
}

impl<P: Copy> HeapArena<P> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        HeapArena {
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            scratch: Vec::new(),
        }
    }

    fn alloc(&mut self, value: f64, payload: P) -> i32 {
        if let Some(index) = self.free.pop() {
            let node = &mut self.nodes[index as usize];
            node.sibling = NIL;
            node.child = NIL;
            node.left_up = NIL;
            node.value = value;
            node.child_offset = 0.0;
            node.payload = payload;
            index as i32
        } else {
            self.nodes.push(HeapNode {
                sibling: NIL,
                child: NIL,
                left_up: NIL,
                value,
                child_offset: 0.0,
                payload,
            });
            (self.nodes.len() - 1) as i32
        }
    }

    // Links two tree roots whose stored values are true values; the smaller
    // becomes the parent and the other's subtree is re-based under it.
    fn link(&mut self, a: i32, b: i32) -> i32 {
        if a == NIL {
            return b;
        }
        if b == NIL {
            return a;
        }
        let (parent, child) = if self.nodes[a as usize].value <= self.nodes[b as usize].value {
            (a, b)
        } else {
            (b, a)
        };
        let parent_offset = self.nodes[parent as usize].child_offset;
        let first = self.nodes[parent as usize].child;
        {
            let c = &mut self.nodes[child as usize];
            c.value -= parent_offset;
            c.child_offset -= parent_offset;
            c.left_up = parent;
            c.sibling = first;
        }
        if first != NIL {
            self.nodes[first as usize].left_up = child;
        }
        self.nodes[parent as usize].child = child;
        parent
    }

    /// Returns a handle that stays valid until the element is extracted.
    pub fn insert(&mut self, heap: &mut PairingHeap, value: f64, payload: P) -> i32 {
        let node = self.alloc(value, payload);
        heap.root = self.link(heap.root, node);
        node
    }

    pub fn get_min(&self, heap: &PairingHeap) -> Option<(f64, P)> {
        if heap.root == NIL {
            return None;
        }
        let root = &self.nodes[heap.root as usize];
        Some((root.value, root.payload))
    }

    pub fn extract_min(&mut self, heap: &mut PairingHeap) -> Option<(f64, P)> {
        if heap.root == NIL {
            return None;
        }
        let root = heap.root;
        let (value, payload, offset) = {
            let r = &self.nodes[root as usize];
            (r.value, r.payload, r.child_offset)
        };

        // Detach the children, restoring their top-level values.
        let mut pending = std::mem::take(&mut self.scratch);
        pending.clear();
        let mut child = self.nodes[root as usize].child;
        while child != NIL {
            let next = self.nodes[child as usize].sibling;
            let node = &mut self.nodes[child as usize];
            node.value += offset;
            node.child_offset += offset;
            node.sibling = NIL;
            node.left_up = NIL;
            pending.push(child);
            child = next;
        }

        // Two-pass pairing: pair left to right, then fold right to left.
        let mut paired = 0;
        let mut i = 0;
        while i + 1 < pending.len() {
            pending[paired] = self.link(pending[i], pending[i + 1]);
            paired += 1;
            i += 2;
        }
        if i < pending.len() {
            pending[paired] = pending[i];
            paired += 1;
        }
        let mut new_root = NIL;
        for j in (0..paired).rev() {
            new_root = self.link(new_root, pending[j]);
        }

        heap.root = new_root;
        pending.clear();
        self.scratch = pending;
        self.free.push(root as u32);
        Some((value, payload))
    }

    /// Consumes both heap handles; their elements end up under one root.
    pub fn meld(&mut self, a: PairingHeap, b: PairingHeap) -> PairingHeap {
        PairingHeap {
            root: self.link(a.root, b.root),
        }
    }

    /// Shifts every value held by the heap by `delta` in O(1).
    pub fn add_to_all(&mut self, heap: &mut PairingHeap, delta: f64) {
        if heap.root == NIL {
            return;
        }
        let root = &mut self.nodes[heap.root as usize];
        root.value += delta;
        root.child_offset += delta;
    }

    /// Lowers the value behind `node` from `from_value` (its current true
    /// value, which the caller tracks) to `to_value` and restores heap order.
    /// The difference between `from_value` and the stored value is the sum of
    /// ancestor offsets; it is folded into the node before relinking so the
    /// subtree below keeps its observed values.
    pub fn decrease_key(&mut self, heap: &mut PairingHeap, node: i32, from_value: f64, to_value: f64) {
        let n = node as usize;
        let pending_offset = from_value - self.nodes[n].value;
        self.nodes[n].child_offset += pending_offset;
        self.nodes[n].value = to_value;
        if node == heap.root {
            return;
        }

        let left_up = self.nodes[n].left_up;
        let sibling = self.nodes[n].sibling;
        if self.nodes[left_up as usize].child == node {
            self.nodes[left_up as usize].child = sibling;
        } else {
            self.nodes[left_up as usize].sibling = sibling;
        }
        if sibling != NIL {
            self.nodes[sibling as usize].left_up = left_up;
        }
        self.nodes[n].left_up = NIL;
        self.nodes[n].sibling = NIL;
        heap.root = self.link(heap.root, node);
    }
}

impl<P: Copy> Default for HeapArena<P> {
    fn default() -> Self {
        Self::new()
    }
}
