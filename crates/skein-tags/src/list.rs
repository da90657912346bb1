//! The copy-on-write tag list.

use std::fmt;
use std::sync::Arc;

use skein_core::RefCount;

use crate::block::TagBlock;

/// Bytes of fixed header per tag record: tid, payload size, start, end.
const RECORD_HEADER: usize = 16;

/// One tag record, yielded by [`TagIter`].
///
/// `start` and `end` are byte offsets into the packet the tag covers,
/// with the list's accumulated offset adjustment already applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag<'a> {
    /// Tag type id, assigned by the application.
    pub tid: u32,
    /// First covered byte offset.
    pub start: i32,
    /// One past the last covered byte offset.
    pub end: i32,
    /// Opaque tag payload.
    pub payload: &'a [u8],
}

/// A shared, copy-on-write list of byte tags attached to a packet.
///
/// Cloning shares the backing block across logical processes; the first
/// write through a shared handle reallocates. The share count follows
/// the relaxed/release/acquire-fence protocol of
/// [`RefCount`], and blocks whose count reaches zero are recycled
/// through a thread-local freelist.
pub struct TagList {
    data: Option<Arc<TagBlock>>,
    /// Bytes of the block this list views. May be less than the block's
    /// `dirty` when another clone appended after we were cloned.
    used: u32,
    /// Offset delta applied to `start`/`end` on iteration.
    adjustment: i32,
}

// Compile-time assertion: tag lists ride packets across worker threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<TagList>();
};

impl TagList {
    /// Create an empty list.
    pub fn new() -> TagList {
        TagList {
            data: None,
            used: 0,
            adjustment: 0,
        }
    }

    /// Whether the list holds no tags.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Append a tag covering packet bytes `[start, end)`.
    ///
    /// Appends in place when this list is the unique owner of its block
    /// and its view covers every dirty byte; otherwise the block is
    /// copied first (copy-on-write).
    pub fn add(&mut self, tid: u32, start: i32, end: i32, payload: &[u8]) {
        // Record offsets relative to the current adjustment so iteration
        // can apply one delta uniformly.
        let start = start - self.adjustment;
        let end = end - self.adjustment;

        let in_place = match self.data.as_mut() {
            Some(arc) => match Arc::get_mut(arc) {
                Some(block) => {
                    debug_assert_eq!(block.count.get(), 1);
                    block.dirty == self.used
                }
                None => false,
            },
            None => false,
        };

        if in_place {
            let block = Arc::get_mut(self.data.as_mut().expect("checked above"))
                .expect("unique owner checked above");
            write_record(&mut block.bytes, tid, start, end, payload);
            block.dirty = block.bytes.len() as u32;
            self.used = block.dirty;
            return;
        }

        // Copy-on-write: allocate, copy our view, append.
        let needed = self.used as usize + RECORD_HEADER + payload.len();
        let mut fresh = TagBlock::allocate(needed);
        {
            let block = Arc::get_mut(&mut fresh).expect("freshly allocated block is unique");
            if let Some(old) = &self.data {
                block.bytes.extend_from_slice(&old.bytes[..self.used as usize]);
            }
            write_record(&mut block.bytes, tid, start, end, payload);
            block.dirty = block.bytes.len() as u32;
            self.used = block.dirty;
        }
        self.release();
        self.data = Some(fresh);
    }

    /// Drop every tag. The backing block is released (and recycled if
    /// this was the last share).
    pub fn remove_all(&mut self) {
        self.release();
        self.used = 0;
        self.adjustment = 0;
    }

    /// Shift every tag's covered byte range by `delta`.
    pub fn adjust(&mut self, delta: i32) {
        self.adjustment += delta;
    }

    /// Iterate over the tags in insertion order.
    pub fn iter(&self) -> TagIter<'_> {
        TagIter {
            bytes: self
                .data
                .as_ref()
                .map(|b| &b.bytes[..self.used as usize])
                .unwrap_or(&[]),
            pos: 0,
            adjustment: self.adjustment,
        }
    }

    /// Encode the list for cross-host transfer.
    ///
    /// Layout: `used: u32 | adjustment: i32 | bytes[used]`, little-endian.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.used as usize);
        out.extend_from_slice(&self.used.to_le_bytes());
        out.extend_from_slice(&self.adjustment.to_le_bytes());
        if let Some(block) = &self.data {
            out.extend_from_slice(&block.bytes[..self.used as usize]);
        }
        out
    }

    /// Decode a list produced by [`serialize`](TagList::serialize).
    ///
    /// Returns `None` if the buffer is truncated.
    pub fn deserialize(buf: &[u8]) -> Option<TagList> {
        if buf.len() < 8 {
            return None;
        }
        let used = u32::from_le_bytes(buf[0..4].try_into().ok()?);
        let adjustment = i32::from_le_bytes(buf[4..8].try_into().ok()?);
        let body = &buf[8..];
        if body.len() != used as usize {
            return None;
        }
        if used == 0 {
            let mut list = TagList::new();
            list.adjustment = adjustment;
            return Some(list);
        }
        let mut block = TagBlock::allocate(used as usize);
        {
            let b = Arc::get_mut(&mut block).expect("freshly allocated block is unique");
            b.bytes.extend_from_slice(body);
            b.dirty = used;
        }
        Some(TagList {
            data: Some(block),
            used,
            adjustment,
        })
    }

    /// Release this list's share of its block.
    fn release(&mut self) {
        if let Some(block) = self.data.take() {
            if block.count.dec() == 1 {
                RefCount::fence_before_reclaim();
                TagBlock::recycle(block);
            }
        }
    }
}

impl Default for TagList {
    fn default() -> Self {
        TagList::new()
    }
}

impl Clone for TagList {
    fn clone(&self) -> TagList {
        if let Some(block) = &self.data {
            block.count.inc();
        }
        TagList {
            data: self.data.clone(),
            used: self.used,
            adjustment: self.adjustment,
        }
    }
}

impl Drop for TagList {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for TagList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagList")
            .field("tags", &self.iter().count())
            .field("used", &self.used)
            .field("adjustment", &self.adjustment)
            .finish()
    }
}

fn write_record(buf: &mut Vec<u8>, tid: u32, start: i32, end: i32, payload: &[u8]) {
    buf.extend_from_slice(&tid.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&start.to_le_bytes());
    buf.extend_from_slice(&end.to_le_bytes());
    buf.extend_from_slice(payload);
}

/// Iterator over the tag records of a [`TagList`].
pub struct TagIter<'a> {
    bytes: &'a [u8],
    pos: usize,
    adjustment: i32,
}

impl<'a> Iterator for TagIter<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        if self.pos + RECORD_HEADER > self.bytes.len() {
            return None;
        }
        let at = |o: usize| -> [u8; 4] {
            self.bytes[self.pos + o..self.pos + o + 4]
                .try_into()
                .expect("record header slice is 4 bytes")
        };
        let tid = u32::from_le_bytes(at(0));
        let size = u32::from_le_bytes(at(4)) as usize;
        let start = i32::from_le_bytes(at(8));
        let end = i32::from_le_bytes(at(12));
        let body = self.pos + RECORD_HEADER;
        if body + size > self.bytes.len() {
            return None;
        }
        let payload = &self.bytes[body..body + size];
        self.pos = body + size;
        Some(Tag {
            tid,
            start: start + self.adjustment,
            end: end + self.adjustment,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_in_insertion_order() {
        let mut list = TagList::new();
        list.add(1, 0, 4, b"a");
        list.add(2, 4, 8, b"bc");
        list.add(3, 8, 12, b"");
        let tids: Vec<u32> = list.iter().map(|t| t.tid).collect();
        assert_eq!(tids, vec![1, 2, 3]);
    }

    #[test]
    fn adjust_shifts_offsets_on_iteration() {
        let mut list = TagList::new();
        list.add(1, 10, 20, b"x");
        list.adjust(5);
        let tag = list.iter().next().unwrap();
        assert_eq!((tag.start, tag.end), (15, 25));

        // A tag added after the adjustment reads back unshifted relative
        // to the caller's coordinates.
        list.add(2, 100, 110, b"y");
        let tag = list.iter().nth(1).unwrap();
        assert_eq!((tag.start, tag.end), (100, 110));
    }

    #[test]
    fn serialize_round_trip() {
        let mut list = TagList::new();
        list.add(9, -4, 4, &[1, 2, 3, 4]);
        list.adjust(2);
        let bytes = list.serialize();
        let back = TagList::deserialize(&bytes).unwrap();
        let orig: Vec<Tag> = list.iter().collect();
        let got: Vec<Tag> = back.iter().collect();
        assert_eq!(orig, got);
    }

    #[test]
    fn deserialize_rejects_truncated_input() {
        let mut list = TagList::new();
        list.add(1, 0, 1, b"abc");
        let bytes = list.serialize();
        assert!(TagList::deserialize(&bytes[..bytes.len() - 1]).is_none());
        assert!(TagList::deserialize(&[0]).is_none());
    }

    #[test]
    fn cow_write_after_clone_leaves_peer_intact() {
        let mut a = TagList::new();
        a.add(1, 0, 1, b"one");
        let b = a.clone();

        a.add(2, 1, 2, b"two");
        a.remove_all();
        assert_eq!(a.iter().count(), 0);

        let tags: Vec<Tag> = b.iter().collect();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].payload, b"one");
    }

    #[test]
    fn unique_owner_appends_in_place() {
        let mut list = TagList::new();
        list.add(1, 0, 1, b"a");
        let before = list.serialize();
        list.add(2, 1, 2, b"b");
        let after = list.serialize();
        // The first record is a byte-for-byte prefix: no copy happened.
        assert_eq!(&after[8..8 + before.len() - 8], &before[8..]);
    }

    #[test]
    fn share_count_balances_over_clone_storm() {
        let mut list = TagList::new();
        list.add(1, 0, 1, &[0; 16]);
        let clones: Vec<TagList> = (0..100).map(|_| list.clone()).collect();
        drop(clones);
        // Still readable: the count never hit zero while shares existed.
        assert_eq!(list.iter().count(), 1);
        list.remove_all();
        assert!(list.is_empty());
    }
}
