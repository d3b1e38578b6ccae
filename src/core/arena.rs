use std::{
    alloc::{self, Layout},
    ptr::NonNull,
};

use super::graph_node::{GraphNode, GraphNodes, NodePtr};

/// Constructs a node in place at `at` and returns a pointer to it.
///
/// # Safety
/// `at` must point into an allocation with at least `size_of::<T>()` bytes
/// available and be aligned to `align_of::<T>()`. The caller takes over
/// responsibility for dropping the node before the memory is freed.
pub unsafe fn emplace<T: GraphNode + 'static>(at: NonNull<u8>, node: T) -> NodePtr {
    let typed = at.cast::<T>();
    unsafe {
        typed.as_ptr().write(node);
        NodePtr::new(NonNull::new_unchecked(typed.as_ptr() as *mut dyn GraphNode))
    }
}

/// Forms a node pointer to an already-constructed node at `at` without
/// writing anything.
///
/// # Safety
/// A live `T` must already exist at `at`, constructed by a previous
/// [`emplace`] call with the same type.
pub unsafe fn relink<T: GraphNode + 'static>(at: NonNull<u8>) -> NodePtr {
    let typed = at.cast::<T>();
    unsafe { NodePtr::new(NonNull::new_unchecked(typed.as_ptr() as *mut dyn GraphNode)) }
}

/// Single contiguous allocation holding every node of a graph instance.
///
/// The definition precomputes each node's byte offset; the arena only hands
/// out addresses and owns the memory. Nodes are dropped in reverse
/// construction order when the arena is dropped.
pub struct NodeArena {
    memory: Option<NonNull<u8>>,
    layout: Layout,
    nodes: Vec<NodePtr>,
}

// The arena owns its nodes exclusively, every node type is Send + Sync, and
// the raw pointers never escape except through GraphNodes borrows.
unsafe impl Send for NodeArena {}
unsafe impl Sync for NodeArena {}

impl NodeArena {
    /// Allocates a zero-initialized block of `size` bytes at `align`.
    ///
    /// A zero-sized arena performs no allocation, which covers definitions
    /// whose nodes are all zero-sized.
    pub fn allocate(size: usize, align: usize) -> Self {
        assert!(
            align.is_power_of_two(),
            "instance memory alignment {align} is not a power of two"
        );
        let layout = Layout::from_size_align(size, align)
            .unwrap_or_else(|_| panic!("invalid instance memory layout ({size} bytes, align {align})"));
        let memory = if size == 0 {
            None
        } else {
            let ptr = unsafe { alloc::alloc_zeroed(layout) };
            match NonNull::new(ptr) {
                Some(ptr) => Some(ptr),
                None => alloc::handle_alloc_error(layout),
            }
        };
        Self {
            memory,
            layout,
            nodes: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    pub fn base_address(&self) -> Option<NonNull<u8>> {
        self.memory
    }

    /// Address `offset` bytes into the arena.
    pub fn address_of(&self, offset: usize) -> NonNull<u8> {
        assert!(
            offset <= self.layout.size(),
            "node offset {offset} exceeds instance memory size {}",
            self.layout.size()
        );
        let base = self
            .memory
            .unwrap_or_else(|| panic!("address requested from an empty arena"));
        unsafe { NonNull::new_unchecked(base.as_ptr().add(offset)) }
    }

    /// Records a constructed node. The arena drops recorded nodes in reverse
    /// order on drop.
    pub fn push_node(&mut self, node: NodePtr) {
        self.nodes.push(node);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes_view(&self) -> GraphNodes<'_> {
        GraphNodes::new(&self.nodes)
    }
}

impl Drop for NodeArena {
    fn drop(&mut self) {
        for node in self.nodes.drain(..).rev() {
            unsafe { node.0.as_ptr().drop_in_place() };
        }
        if let Some(memory) = self.memory.take() {
            unsafe { alloc::dealloc(memory.as_ptr(), self.layout) };
        }
    }
}
