//! Backing storage block and the per-thread freelist.

use std::cell::RefCell;
use std::sync::Arc;

use skein_core::RefCount;

/// Maximum number of buffers parked on a thread's freelist.
const FREELIST_CAP: usize = 64;

/// Minimum capacity of a freshly allocated buffer.
const MIN_CAPACITY: usize = 64;

thread_local! {
    /// Recycled byte buffers, one list per thread. Per-thread storage
    /// keeps recycling off the cross-thread path entirely: a block freed
    /// on a worker is reused by that worker.
    static FREELIST: RefCell<Vec<Vec<u8>>> = const { RefCell::new(Vec::new()) };
}

/// Shared backing block of a [`TagList`](crate::TagList).
///
/// `dirty` is the number of bytes written so far; a list may append in
/// place only while it is the unique owner and its own view covers all
/// dirty bytes.
pub(crate) struct TagBlock {
    /// Logical share count across packet clones.
    pub(crate) count: RefCount,
    /// Bytes written. Only mutated through `Arc::get_mut`, i.e. by a
    /// unique owner.
    pub(crate) dirty: u32,
    /// Tag record storage; `bytes.capacity()` is the block capacity.
    pub(crate) bytes: Vec<u8>,
}

impl TagBlock {
    /// Allocate a block with room for at least `capacity` bytes, reusing
    /// a thread-local recycled buffer when one is large enough.
    pub(crate) fn allocate(capacity: usize) -> Arc<TagBlock> {
        let bytes = FREELIST.with(|fl| {
            let mut fl = fl.borrow_mut();
            match fl.iter().position(|b| b.capacity() >= capacity) {
                Some(i) => fl.swap_remove(i),
                None => Vec::with_capacity(capacity.max(MIN_CAPACITY)),
            }
        });
        Arc::new(TagBlock {
            count: RefCount::new(1),
            dirty: 0,
            bytes,
        })
    }

    /// Return a block's buffer to the current thread's freelist.
    ///
    /// Called by the dropper that observed the share count reach zero,
    /// after the acquire fence. Takes the block out of its `Arc`; if
    /// another `Arc` handle is still alive (a list mid-clone), the buffer
    /// is simply not recycled.
    pub(crate) fn recycle(block: Arc<TagBlock>) {
        if let Some(block) = Arc::into_inner(block) {
            let mut bytes = block.bytes;
            bytes.clear();
            FREELIST.with(|fl| {
                let mut fl = fl.borrow_mut();
                if fl.len() < FREELIST_CAP {
                    fl.push(bytes);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_reuses_recycled_buffer() {
        let block = TagBlock::allocate(128);
        assert!(block.bytes.capacity() >= 128);
        assert_eq!(block.count.get(), 1);

        assert_eq!(block.count.dec(), 1);
        RefCount::fence_before_reclaim();
        TagBlock::recycle(block);

        let again = TagBlock::allocate(100);
        assert!(again.bytes.capacity() >= 128, "freelist buffer reused");
    }

    #[test]
    fn recycle_skips_blocks_still_shared() {
        let block = TagBlock::allocate(16);
        let extra = block.clone();
        TagBlock::recycle(block);
        // The second handle keeps the allocation alive.
        assert_eq!(extra.dirty, 0);
    }
}
