//! Block - a contiguous off-heap region owned by the pool.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use opal_common::constants::{BLOCK_ALIGNMENT, SLICE_ALIGNMENT};
use opal_common::types::BlockId;

/// Rounds `len` up to the slice alignment boundary.
#[inline]
pub(crate) const fn align_up(len: usize) -> usize {
    (len + SLICE_ALIGNMENT - 1) & !(SLICE_ALIGNMENT - 1)
}

/// A contiguous byte region reserved from the host.
///
/// Blocks are allocated zeroed and cache-line aligned, never moved or
/// resized, and returned to the host only when the owning pool drops.
/// Allocation within a block is a CAS bump on the cursor; the bytes
/// themselves are gated by the per-slice header protocol, not by the
/// block.
pub struct Block {
    /// Identifier assigned by the pool.
    id: BlockId,
    /// Base address of the region.
    data: NonNull<u8>,
    /// Total size of the region.
    capacity: usize,
    /// Layout used for allocation.
    layout: Layout,
    /// Bump cursor: offset of the first unreserved byte.
    cursor: AtomicUsize,
}

// SAFETY: the block's bytes are shared across threads by design; all
// mutation goes through atomic cursors and the slice header protocol.
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    /// Reserves a new zeroed block of `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if the host refuses the reservation. Callers bound the
    /// request through `StoreConfig::validate`.
    pub(crate) fn new(id: BlockId, capacity: usize) -> Self {
        debug_assert!(id.is_valid());
        debug_assert!(capacity % SLICE_ALIGNMENT == 0);

        let layout =
            Layout::from_size_align(capacity, BLOCK_ALIGNMENT).expect("invalid block layout");

        // SAFETY: layout is valid and non-zero sized.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let data = NonNull::new(ptr).expect("block reservation failed");

        Self {
            id,
            data,
            capacity,
            layout,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Returns the block's identifier.
    #[inline]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the block's capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of bytes reserved so far.
    #[inline]
    pub fn reserved(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Returns the number of bytes still available for bumping.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.reserved()
    }

    /// Reserves `len` bytes, returning the offset of the reservation.
    ///
    /// `len` must already be rounded to the slice alignment. Returns
    /// `None` when the block cannot hold `len` more bytes; the caller
    /// moves on to a fresh block.
    pub(crate) fn try_bump(&self, len: usize) -> Option<u32> {
        debug_assert_eq!(len, align_up(len));

        let mut cur = self.cursor.load(Ordering::Acquire);
        loop {
            let end = cur.checked_add(len)?;
            if end > self.capacity {
                return None;
            }
            match self
                .cursor
                .compare_exchange_weak(cur, end, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(cur as u32),
                Err(observed) => cur = observed,
            }
        }
    }

    /// Resolves a range inside this block to its base pointer.
    ///
    /// Returns `None` when the range falls outside the block; the pool
    /// turns that into a descriptor-corruption error.
    pub(crate) fn range_ptr(&self, offset: u32, length: u32) -> Option<NonNull<u8>> {
        let end = (offset as usize).checked_add(length as usize)?;
        if end > self.capacity {
            return None;
        }
        // SAFETY: the range was just checked against the capacity.
        Some(unsafe { NonNull::new_unchecked(self.data.as_ptr().add(offset as usize)) })
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: data was allocated with this layout in `new`.
        unsafe {
            alloc::dealloc(self.data.as_ptr(), self.layout);
        }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("reserved", &self.reserved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), 8);
        assert_eq!(align_up(8), 8);
        assert_eq!(align_up(12), 16);
        assert_eq!(align_up(20), 24);
    }

    #[test]
    fn test_block_creation() {
        let block = Block::new(BlockId::new(1), 128);
        assert_eq!(block.id(), BlockId::new(1));
        assert_eq!(block.capacity(), 128);
        assert_eq!(block.reserved(), 0);
        assert_eq!(block.remaining(), 128);
    }

    #[test]
    fn test_bump_advances() {
        let block = Block::new(BlockId::new(1), 128);
        assert_eq!(block.try_bump(16), Some(0));
        assert_eq!(block.try_bump(24), Some(16));
        assert_eq!(block.reserved(), 40);
    }

    #[test]
    fn test_bump_exhaustion() {
        let block = Block::new(BlockId::new(1), 128);
        assert_eq!(block.try_bump(120), Some(0));
        assert_eq!(block.try_bump(16), None);
        assert_eq!(block.try_bump(8), Some(120));
        assert_eq!(block.try_bump(8), None);
    }

    #[test]
    fn test_range_ptr_bounds() {
        let block = Block::new(BlockId::new(1), 128);
        assert!(block.range_ptr(0, 128).is_some());
        assert!(block.range_ptr(120, 8).is_some());
        assert!(block.range_ptr(120, 16).is_none());
        assert!(block.range_ptr(u32::MAX, 8).is_none());
    }

    #[test]
    fn test_block_is_zeroed() {
        let block = Block::new(BlockId::new(1), 128);
        let ptr = block.range_ptr(0, 128).unwrap();
        // SAFETY: freshly reserved block, no concurrent access.
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 128) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_concurrent_bump_no_overlap() {
        let block = Arc::new(Block::new(BlockId::new(1), 8192));
        let mut handles = vec![];

        for _ in 0..4 {
            let block = Arc::clone(&block);
            handles.push(thread::spawn(move || {
                let mut offsets = vec![];
                while let Some(offset) = block.try_bump(16) {
                    offsets.push(offset);
                }
                offsets
            }));
        }

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();

        // Every 16-byte reservation is distinct and non-overlapping.
        assert_eq!(all.len(), 8192 / 16);
        for (i, offset) in all.iter().enumerate() {
            assert_eq!(*offset as usize, i * 16);
        }
    }
}
