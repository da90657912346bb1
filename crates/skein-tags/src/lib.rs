//! Refcounted copy-on-write tag blobs for data crossing logical-process
//! boundaries.
//!
//! Packets travelling between logical processes carry a [`TagList`]: a
//! byte blob of variable-length tag records shared by every clone of the
//! packet. Clones on any worker thread bump an atomic count; the last
//! drop recycles the backing block through a thread-local freelist.
//!
//! # Counting protocol
//!
//! Increments are relaxed (a new reference is created by a thread that
//! already holds one), decrements are release, and the thread observing
//! the count reach zero issues an acquire fence before the block is
//! reclaimed. The count drives *recycling only*: the block is also owned
//! by an `Arc`, so a counting bug can at worst miss a freelist reuse,
//! never free live data.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod block;
mod list;

pub use list::{Tag, TagIter, TagList};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_until_write() {
        let mut a = TagList::new();
        a.add(1, 0, 100, &[0xAA; 4]);
        let b = a.clone();
        assert_eq!(a.iter().count(), 1);
        assert_eq!(b.iter().count(), 1);

        // Writing through `a` must not be visible through `b`.
        a.add(2, 0, 100, &[0xBB; 4]);
        assert_eq!(a.iter().count(), 2);
        assert_eq!(b.iter().count(), 1);
    }

    #[test]
    fn tags_survive_cross_thread_handoff() {
        let mut list = TagList::new();
        list.add(7, 10, 20, &[1, 2, 3]);
        let clone = list.clone();
        let handle = std::thread::spawn(move || {
            let tags: Vec<Tag> = clone.iter().collect();
            assert_eq!(tags.len(), 1);
            assert_eq!(tags[0].tid, 7);
            assert_eq!(tags[0].payload, &[1, 2, 3]);
        });
        handle.join().unwrap();
        drop(list);
    }
}
