//! Slice allocators: append-only and recycling flavors.
//!
//! Both flavors bump-allocate out of pool-owned blocks. The recycling
//! flavor additionally keeps size-classed free lists and stamps a
//! fresh generation on every reuse, which is what lets holders of
//! stale descriptors detect recycled slots instead of reading foreign
//! bytes.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use opal_common::constants::{SIZE_CLASS_GRANULARITY, VALUE_HEADER_SIZE};
use opal_common::error::{StoreError, StoreResult};
use opal_common::types::{BlockId, Generation};

use super::block::{align_up, Block};
use super::pool::BlockPool;
use super::slice::Slice;

/// Interface the index layer allocates through.
///
/// `allocate` populates the caller's reusable descriptor; `user_len`
/// is the payload length and the allocator adds the header for
/// headered (value) slices. `free` hands a slice back for
/// reclamation; only the recycling flavor does anything with it.
pub trait BlockAllocator: Send + Sync {
    /// Allocates a slice of `user_len` payload bytes into `slice`.
    fn allocate(&self, slice: &mut Slice, user_len: usize, headered: bool) -> StoreResult<()>;

    /// Returns a slice to the allocator's reclamation path.
    fn free(&self, slice: &Slice);

    /// Returns the cumulative bytes handed out.
    fn allocated(&self) -> usize;

    /// Returns the pool this allocator draws blocks from.
    fn pool(&self) -> &Arc<BlockPool>;
}

/// Bump state shared by both allocator flavors: the pool and the
/// block currently being carved up.
struct BumpState {
    pool: Arc<BlockPool>,
    current: RwLock<Option<Arc<Block>>>,
}

impl BumpState {
    fn new(pool: Arc<BlockPool>) -> Self {
        Self {
            pool,
            current: RwLock::new(None),
        }
    }

    /// Reserves `aligned_len` bytes, growing the pool when the current
    /// block is exhausted. The previous block's tail is abandoned;
    /// slices never straddle blocks.
    fn bump(&self, aligned_len: usize) -> StoreResult<(Arc<Block>, u32)> {
        if aligned_len > self.pool.config().block_capacity {
            return Err(StoreError::AllocationTooLarge {
                requested: aligned_len,
                capacity: self.pool.config().block_capacity,
            });
        }

        // Fast path: CAS into the current block.
        {
            let current = self.current.read();
            if let Some(block) = current.as_ref() {
                if let Some(offset) = block.try_bump(aligned_len) {
                    return Ok((Arc::clone(block), offset));
                }
            }
        }

        // Slow path: another thread may have swapped the block in the
        // meantime, so re-check under the write lock before growing.
        let mut current = self.current.write();
        if let Some(block) = current.as_ref() {
            if let Some(offset) = block.try_bump(aligned_len) {
                return Ok((Arc::clone(block), offset));
            }
        }
        let block = self.pool.grow()?;
        let offset = block
            .try_bump(aligned_len)
            .expect("fresh block rejected a block-sized reservation");
        *current = Some(Arc::clone(&block));
        Ok((block, offset))
    }
}

/// Append-only allocator for immutable data (keys).
///
/// Pure bump allocation: no free list, `free` is a no-op, and slices
/// are never recycled, so descriptors carry no generation and skip
/// ABA validation.
pub struct SeqExpandAllocator {
    bump: BumpState,
    allocated: AtomicUsize,
}

impl SeqExpandAllocator {
    /// Creates an allocator over `pool`. No block is reserved until
    /// the first allocation.
    #[must_use]
    pub fn new(pool: Arc<BlockPool>) -> Self {
        Self {
            bump: BumpState::new(pool),
            allocated: AtomicUsize::new(0),
        }
    }
}

impl BlockAllocator for SeqExpandAllocator {
    fn allocate(&self, slice: &mut Slice, user_len: usize, headered: bool) -> StoreResult<()> {
        let header_len = if headered { VALUE_HEADER_SIZE } else { 0 };
        let total = user_len + header_len;
        let (block, offset) = self.bump.bump(align_up(total))?;

        if headered {
            let ptr = block
                .range_ptr(offset, total as u32)
                .expect("bumped range within block");
            // SAFETY: the range was just reserved and is 8-aligned.
            unsafe { super::header::HeaderView::from_ptr(ptr.as_ptr()) }.init(Generation::NONE);
        }

        slice.assign(block.id(), offset, total as u32, Generation::NONE, headered);
        self.allocated.fetch_add(total, Ordering::Relaxed);
        Ok(())
    }

    fn free(&self, _slice: &Slice) {
        // Append-only: reclamation happens when the pool drops.
    }

    fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    fn pool(&self) -> &Arc<BlockPool> {
        &self.bump.pool
    }
}

/// A reclaimed slot waiting for reuse. The size class it sits in
/// fixes its physical length.
#[derive(Debug, Clone, Copy)]
struct FreeSlot {
    block: BlockId,
    offset: u32,
}

/// Recycling allocator for mutable values.
///
/// Allocation pops the matching size class first and falls back to
/// bump allocation. A popped slot keeps its (block, offset) identity
/// but is re-initialized under the next generation before the
/// descriptor is returned, so holders of descriptors from the prior
/// incarnation fail the attach comparison with `Retry`.
///
/// Reclamation is serialized as WRITE -> DELETED -> free-list push; a
/// slot is never enqueued while its header is not observably DELETED.
pub struct SyncRecycleAllocator {
    bump: BumpState,
    /// Free lists keyed by rounded size class; index is
    /// `rounded_len / SIZE_CLASS_GRANULARITY`.
    classes: Box<[Mutex<Vec<FreeSlot>>]>,
    max_recycle_size: usize,
    allocated: AtomicUsize,
    recycle_hits: AtomicU64,
    recycle_misses: AtomicU64,
    frees: AtomicU64,
    recycle_drops: AtomicU64,
}

impl SyncRecycleAllocator {
    /// Creates an allocator over `pool`, with the class table bounded
    /// by the pool's configured recycle ceiling.
    #[must_use]
    pub fn new(pool: Arc<BlockPool>) -> Self {
        let max_recycle_size = pool.config().max_recycle_size;
        let class_count = max_recycle_size / SIZE_CLASS_GRANULARITY + 1;
        let classes = (0..class_count)
            .map(|_| Mutex::new(Vec::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            bump: BumpState::new(pool),
            classes,
            max_recycle_size,
            allocated: AtomicUsize::new(0),
            recycle_hits: AtomicU64::new(0),
            recycle_misses: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            recycle_drops: AtomicU64::new(0),
        }
    }

    #[inline]
    fn class_index(&self, aligned_len: usize) -> usize {
        aligned_len / SIZE_CLASS_GRANULARITY
    }

    /// Returns the number of slots currently waiting for reuse.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.classes.iter().map(|class| class.lock().len()).sum()
    }

    /// Returns a snapshot of the allocator's counters.
    #[must_use]
    pub fn stats(&self) -> SlabStats {
        SlabStats {
            allocated_bytes: self.allocated.load(Ordering::Relaxed),
            recycle_hits: self.recycle_hits.load(Ordering::Relaxed),
            recycle_misses: self.recycle_misses.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            recycle_drops: self.recycle_drops.load(Ordering::Relaxed),
        }
    }

    /// Pops a reusable slot of exactly `aligned_len` physical bytes
    /// and re-initializes it under the next generation.
    fn pop_recycled(
        &self,
        aligned_len: usize,
        headered: bool,
    ) -> StoreResult<Option<(Arc<Block>, u32, Generation)>> {
        let slot = {
            let mut class = self.classes[self.class_index(aligned_len)].lock();
            class.pop()
        };
        let Some(slot) = slot else {
            return Ok(None);
        };

        let block = self.bump.pool.block(slot.block)?;
        let ptr = block
            .range_ptr(slot.offset, aligned_len as u32)
            .ok_or(StoreError::SliceOutOfRange {
                block: slot.block,
                offset: slot.offset,
                length: aligned_len as u32,
                capacity: block.capacity(),
            })?;

        let generation = if headered {
            // SAFETY: slot ranges on the free list were 8-aligned when
            // first carved out of their block.
            let header = unsafe { super::header::HeaderView::from_ptr(ptr.as_ptr()) };
            debug_assert!(header.is_deleted(), "recycled a slot that was not deleted");
            let previous = header.generation();
            let next = if previous.is_valid() {
                previous.next()
            } else {
                Generation::FIRST
            };
            header.init(next);
            next
        } else {
            Generation::NONE
        };

        Ok(Some((block, slot.offset, generation)))
    }
}

impl BlockAllocator for SyncRecycleAllocator {
    fn allocate(&self, slice: &mut Slice, user_len: usize, headered: bool) -> StoreResult<()> {
        let header_len = if headered { VALUE_HEADER_SIZE } else { 0 };
        let total = user_len + header_len;
        let aligned = align_up(total);

        if aligned <= self.max_recycle_size {
            if let Some((block, offset, generation)) = self.pop_recycled(aligned, headered)? {
                slice.assign(block.id(), offset, total as u32, generation, headered);
                self.allocated.fetch_add(total, Ordering::Relaxed);
                self.recycle_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            self.recycle_misses.fetch_add(1, Ordering::Relaxed);
        }

        let (block, offset) = self.bump.bump(aligned)?;
        let generation = if headered {
            let ptr = block
                .range_ptr(offset, total as u32)
                .expect("bumped range within block");
            // SAFETY: the range was just reserved and is 8-aligned.
            let header = unsafe { super::header::HeaderView::from_ptr(ptr.as_ptr()) };
            header.init(Generation::FIRST);
            Generation::FIRST
        } else {
            Generation::NONE
        };

        slice.assign(block.id(), offset, total as u32, generation, headered);
        self.allocated.fetch_add(total, Ordering::Relaxed);
        Ok(())
    }

    /// Returns a slice to its size class.
    ///
    /// The slice's header must already be DELETED; reuse before that
    /// point would hand live bytes to a new allocation. Slices above
    /// the recycle ceiling are dropped from recycling so the class
    /// table stays bounded.
    fn free(&self, slice: &Slice) {
        self.frees.fetch_add(1, Ordering::Relaxed);

        let aligned = align_up(slice.allocated_length());
        if !slice.is_headered() || aligned > self.max_recycle_size {
            self.recycle_drops.fetch_add(1, Ordering::Relaxed);
            debug!(
                block = %slice.block(),
                length = slice.allocated_length(),
                "slice dropped from recycling"
            );
            return;
        }

        #[cfg(debug_assertions)]
        if let Ok(region) = self.bump.pool.attach(slice) {
            debug_assert!(
                region.header().is_deleted(),
                "freed a slice whose header is not DELETED"
            );
        }

        let slot = FreeSlot {
            block: slice.block(),
            offset: slice.offset(),
        };
        self.classes[self.class_index(aligned)].lock().push(slot);
    }

    fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    fn pool(&self) -> &Arc<BlockPool> {
        &self.bump.pool
    }
}

/// Snapshot of the recycling allocator's counters.
#[derive(Debug, Clone, Default)]
pub struct SlabStats {
    /// Cumulative bytes handed out.
    pub allocated_bytes: usize,
    /// Allocations served from a free list.
    pub recycle_hits: u64,
    /// Allocations that fell through to bump allocation.
    pub recycle_misses: u64,
    /// Slices returned through `free`.
    pub frees: u64,
    /// Freed slices dropped from recycling (headerless or above the
    /// recycle ceiling).
    pub recycle_drops: u64,
}

impl SlabStats {
    /// Fraction of allocations served from a free list.
    #[must_use]
    pub fn recycle_ratio(&self) -> f64 {
        let attempts = self.recycle_hits + self.recycle_misses;
        if attempts == 0 {
            0.0
        } else {
            self.recycle_hits as f64 / attempts as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_common::config::StoreConfig;

    fn small_pool() -> Arc<BlockPool> {
        Arc::new(BlockPool::new(StoreConfig::new(128).with_max_blocks(2)).unwrap())
    }

    #[test]
    fn test_seq_expand_accounting() {
        let alloc = SeqExpandAllocator::new(small_pool());
        let mut slice = Slice::invalid();

        alloc.allocate(&mut slice, 4, false).unwrap();
        assert_eq!(slice.allocated_length(), 4);
        assert_eq!(alloc.allocated(), 4);

        alloc.allocate(&mut slice, 4, false).unwrap();
        assert_eq!(slice.allocated_length(), 4);
        assert_eq!(alloc.allocated(), 8);
    }

    #[test]
    fn test_seq_expand_free_is_noop() {
        let alloc = SeqExpandAllocator::new(small_pool());
        let mut slice = Slice::invalid();
        alloc.allocate(&mut slice, 16, false).unwrap();

        alloc.free(&slice);
        assert_eq!(alloc.allocated(), 16);
        assert_eq!(alloc.pool().block_count(), 1);
    }

    #[test]
    fn test_seq_expand_slices_do_not_overlap() {
        let alloc = SeqExpandAllocator::new(small_pool());
        let mut a = Slice::invalid();
        let mut b = Slice::invalid();
        alloc.allocate(&mut a, 12, false).unwrap();
        alloc.allocate(&mut b, 12, false).unwrap();

        assert_eq!(a.block(), b.block());
        assert!(b.offset() as usize >= a.offset() as usize + align_up(12));
    }

    #[test]
    fn test_grows_into_new_block() {
        let alloc = SeqExpandAllocator::new(small_pool());
        let mut slice = Slice::invalid();

        alloc.allocate(&mut slice, 120, false).unwrap();
        assert_eq!(slice.block(), BlockId::new(1));

        alloc.allocate(&mut slice, 64, false).unwrap();
        assert_eq!(slice.block(), BlockId::new(2));
        assert_eq!(alloc.pool().block_count(), 2);
    }

    #[test]
    fn test_out_of_memory_when_pool_exhausted() {
        let alloc = SeqExpandAllocator::new(small_pool());
        let mut slice = Slice::invalid();
        for _ in 0..2 {
            alloc.allocate(&mut slice, 120, false).unwrap();
        }
        let err = alloc.allocate(&mut slice, 120, false).unwrap_err();
        assert!(matches!(err, StoreError::OutOfMemory { .. }));
    }

    #[test]
    fn test_allocation_too_large() {
        let alloc = SeqExpandAllocator::new(small_pool());
        let mut slice = Slice::invalid();
        let err = alloc.allocate(&mut slice, 256, false).unwrap_err();
        assert!(matches!(err, StoreError::AllocationTooLarge { .. }));
    }

    #[test]
    fn test_recycle_allocate_stamps_generation() {
        let alloc = SyncRecycleAllocator::new(small_pool());
        let mut slice = Slice::invalid();

        alloc.allocate(&mut slice, 12, true).unwrap();
        assert!(slice.is_headered());
        assert_eq!(slice.generation(), Generation::FIRST);
        assert_eq!(slice.allocated_length(), 12 + VALUE_HEADER_SIZE);
        assert_eq!(slice.payload_length(), 12);
    }

    #[test]
    fn test_recycle_reuses_slot_with_next_generation() {
        let pool = small_pool();
        let alloc = SyncRecycleAllocator::new(Arc::clone(&pool));
        let mut slice = Slice::invalid();

        alloc.allocate(&mut slice, 12, true).unwrap();
        let first = slice.duplicate();

        // WRITE -> DELETED -> free-list push.
        assert!(first.lock_write(&pool).unwrap().is_done());
        first.unlock_write(&pool).unwrap();
        let _ = first.logical_delete(&pool).unwrap();
        alloc.free(&first);
        assert_eq!(alloc.free_slots(), 1);

        let mut reused = Slice::invalid();
        alloc.allocate(&mut reused, 12, true).unwrap();
        assert_eq!(reused.block(), first.block());
        assert_eq!(reused.offset(), first.offset());
        assert_eq!(reused.generation(), first.generation().next());
        assert_eq!(alloc.free_slots(), 0);
        assert_eq!(alloc.stats().recycle_hits, 1);
    }

    #[test]
    fn test_recycle_size_class_mismatch_misses() {
        let pool = small_pool();
        let alloc = SyncRecycleAllocator::new(Arc::clone(&pool));
        let mut slice = Slice::invalid();

        alloc.allocate(&mut slice, 12, true).unwrap();
        let _ = slice.logical_delete(&pool).unwrap();
        alloc.free(&slice);

        // A different size class bump-allocates instead of reusing.
        let mut other = Slice::invalid();
        alloc.allocate(&mut other, 40, true).unwrap();
        assert_ne!(other.offset(), slice.offset());
        assert_eq!(alloc.free_slots(), 1);
    }

    #[test]
    fn test_free_above_ceiling_is_dropped() {
        let pool = Arc::new(
            BlockPool::new(
                StoreConfig::new(256)
                    .with_max_blocks(2)
                    .with_max_recycle_size(32),
            )
            .unwrap(),
        );
        let alloc = SyncRecycleAllocator::new(Arc::clone(&pool));
        let mut slice = Slice::invalid();

        alloc.allocate(&mut slice, 64, true).unwrap();
        let _ = slice.logical_delete(&pool).unwrap();
        alloc.free(&slice);

        assert_eq!(alloc.free_slots(), 0);
        assert_eq!(alloc.stats().recycle_drops, 1);
        assert_eq!(alloc.stats().frees, 1);
    }

    #[test]
    fn test_stats_ratio() {
        let alloc = SyncRecycleAllocator::new(small_pool());
        assert_eq!(alloc.stats().recycle_ratio(), 0.0);

        let mut slice = Slice::invalid();
        alloc.allocate(&mut slice, 12, true).unwrap();
        let _ = slice.logical_delete(alloc.pool()).unwrap();
        alloc.free(&slice);
        let mut reused = Slice::invalid();
        alloc.allocate(&mut reused, 12, true).unwrap();

        let stats = alloc.stats();
        assert_eq!(stats.recycle_hits, 1);
        assert_eq!(stats.recycle_misses, 1);
        assert!((stats.recycle_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_allocate_free_round_trips() {
        use std::thread;

        let pool = Arc::new(
            BlockPool::new(StoreConfig::new(8192).with_max_blocks(4)).unwrap(),
        );
        let alloc = Arc::new(SyncRecycleAllocator::new(Arc::clone(&pool)));

        let mut handles = vec![];
        for _ in 0..4 {
            let alloc = Arc::clone(&alloc);
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                let mut slice = Slice::invalid();
                for _ in 0..200 {
                    alloc.allocate(&mut slice, 24, true).unwrap();
                    let _ = slice.logical_delete(&pool).unwrap();
                    alloc.free(&slice);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Every free pushed one slot and every recycle hit popped one;
        // nothing leaked past the configured pool bound.
        let stats = alloc.stats();
        assert_eq!(stats.recycle_drops, 0);
        assert_eq!(
            alloc.free_slots() as u64,
            stats.frees - stats.recycle_hits
        );
        assert!(pool.block_count() <= 4);
    }
}
