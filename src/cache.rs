use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::ptr::NonNull;

/// A capacity-bounded stack of raw memory blocks sharing one layout.
///
/// Blocks handed out by this cache are uninitialized. Whoever holds a block
/// owns it and must either give it back or deallocate it with the cache's
/// layout.
#[derive(Debug)]
pub(crate) struct BlockCache {
    /// Layout shared by every block.
    layout: Layout,
    /// Maximum number of cached blocks.
    capacity: usize,
    /// Idle blocks ready for reuse.
    blocks: Vec<NonNull<u8>>,
}

// The cache exclusively owns its blocks, none of which hold initialized data.
unsafe impl Send for BlockCache {}

impl BlockCache {
    /// Create an empty cache for blocks of `layout`.
    ///
    /// # Panics
    ///
    /// Panics if `layout` is zero-sized.
    pub(crate) fn new(layout: Layout, capacity: usize) -> Self {
        assert!(layout.size() > 0, "cached blocks must not be zero-sized");
        Self {
            layout,
            capacity,
            blocks: Vec::new(),
        }
    }

    /// Number of cached blocks.
    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Take a cached block if one is available.
    pub(crate) fn take(&mut self) -> Option<NonNull<u8>> {
        self.blocks.pop()
    }

    /// Request a fresh block from the global allocator.
    pub(crate) fn allocate(layout: Layout) -> NonNull<u8> {
        debug_assert!(layout.size() > 0);
        // SAFETY: the layout has non-zero size.
        let ptr = unsafe { alloc(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        }
    }

    /// Return a block to the global allocator.
    ///
    /// # Safety
    ///
    /// `block` must come from [`allocate`](Self::allocate) with the same
    /// `layout`, must hold no live value, and must not be used afterwards.
    pub(crate) unsafe fn deallocate(block: NonNull<u8>, layout: Layout) {
        unsafe { dealloc(block.as_ptr(), layout) }
    }

    /// Keep `block` for reuse, or deallocate it if the cache is full.
    ///
    /// Returns `true` if the block was cached.
    ///
    /// # Safety
    ///
    /// `block` must come from [`allocate`](Self::allocate) with this cache's
    /// layout and must hold no live value. The caller gives up ownership.
    pub(crate) unsafe fn give_back(&mut self, block: NonNull<u8>) -> bool {
        if self.blocks.len() < self.capacity {
            self.blocks.push(block);
            true
        } else {
            unsafe { Self::deallocate(block, self.layout) };
            false
        }
    }

    /// Deallocate every cached block.
    pub(crate) fn clear(&mut self) {
        for block in self.blocks.drain(..) {
            // SAFETY: cached blocks were allocated with `self.layout` and are
            // owned by the cache alone.
            unsafe { Self::deallocate(block, self.layout) };
        }
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        self.clear();
    }
}
