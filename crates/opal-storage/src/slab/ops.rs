//! Value operations - the verb layer over slices.
//!
//! Every verb runs the attach protocol before touching payload bytes:
//! resolve the descriptor to a range-checked region, compare the
//! descriptor's generation against the header, then take the lock in
//! the verb's mode. User closures run against bounds-checked views and
//! may panic; RAII guards release the lock on every exit path,
//! including unwinds out of a closure.

use std::sync::Arc;

use opal_common::error::StoreResult;

use super::alloc::{BlockAllocator, SyncRecycleAllocator};
use super::header::{HeaderView, LockOutcome};
use super::pool::RawRegion;
use super::result::{PutStatus, TransformResult, ValueStatus};
use super::serialize::ValueSerializer;
use super::slice::Slice;
use super::view::{ReadView, WriteView};

/// Releases a read acquisition when dropped.
struct ReadGuard<'a> {
    header: HeaderView<'a>,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.header.unlock_read();
    }
}

/// Releases a write acquisition when dropped, unless the verb ended
/// the generation by consuming the guard into DELETED or MOVED.
struct WriteGuard<'a> {
    header: HeaderView<'a>,
    armed: bool,
}

impl<'a> WriteGuard<'a> {
    fn new(header: HeaderView<'a>) -> Self {
        Self {
            header,
            armed: true,
        }
    }

    /// WRITE -> DELETED; the word never returns to FREE under this
    /// generation.
    fn into_deleted(mut self) {
        self.header.delete_locked();
        self.armed = false;
    }

    /// WRITE -> MOVED; the word never returns to FREE under this
    /// generation.
    fn into_moved(mut self) {
        self.header.move_locked();
        self.armed = false;
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.header.unlock_write();
        }
    }
}

/// Outcome of the attach-and-validate step.
enum Attach {
    Ready(RawRegion),
    Stale,
}

/// The verb layer: read, transform, put, compute, and delete over
/// value slices.
///
/// Holds the recycling allocator so `delete` can hand reclaimed
/// slices back; attaches descriptors through the allocator's pool.
pub struct ValueOps {
    alloc: Arc<SyncRecycleAllocator>,
}

impl ValueOps {
    /// Creates the verb layer over the value allocator.
    #[must_use]
    pub fn new(alloc: Arc<SyncRecycleAllocator>) -> Self {
        Self { alloc }
    }

    /// Returns the allocator backing deleted-slice reclamation.
    #[must_use]
    pub fn allocator(&self) -> &Arc<SyncRecycleAllocator> {
        &self.alloc
    }

    /// Resolves the descriptor and validates its generation against
    /// the header. A mismatch means the slot was recycled under the
    /// caller's feet; the caller must re-read the index.
    fn attach(&self, slice: &Slice) -> StoreResult<Attach> {
        let region = self.alloc.pool().attach(slice)?;
        if slice.generation().is_valid() && region.header().generation() != slice.generation() {
            return Ok(Attach::Stale);
        }
        Ok(Attach::Ready(region))
    }

    /// Reads the value through `reader` under a read acquisition.
    ///
    /// # Panics
    ///
    /// Propagates panics out of `reader` (including view bounds
    /// violations) with the lock released.
    pub fn read<T, F>(&self, slice: &Slice, reader: F) -> StoreResult<TransformResult<T>>
    where
        F: FnOnce(&ReadView<'_>) -> T,
    {
        let mut result = TransformResult::new();
        self.transform(&mut result, slice, reader)?;
        Ok(result)
    }

    /// Like [`read`](Self::read), but fills a caller-owned result
    /// record so hot paths reuse one record per thread.
    pub fn transform<T, F>(
        &self,
        result: &mut TransformResult<T>,
        slice: &Slice,
        reader: F,
    ) -> StoreResult<()>
    where
        F: FnOnce(&ReadView<'_>) -> T,
    {
        result.reset();
        let region = match self.attach(slice)? {
            Attach::Ready(region) => region,
            Attach::Stale => {
                result.fail(ValueStatus::Retry);
                return Ok(());
            }
        };

        let header = region.header();
        match header.lock_read() {
            LockOutcome::Acquired => {}
            LockOutcome::Deleted => {
                result.fail(ValueStatus::Deleted);
                return Ok(());
            }
            LockOutcome::Moved => {
                result.fail(ValueStatus::Retry);
                return Ok(());
            }
        }
        let _guard = ReadGuard { header };

        let value = reader(&region.read_view());
        result.complete(value);
        Ok(())
    }

    /// Serializes `value` into the slice in place.
    ///
    /// When the serialized size exceeds the slice's payload capacity,
    /// the header is marked MOVED and the caller receives
    /// [`PutStatus::NeedsRelocation`]; this verb never allocates the
    /// replacement slot itself.
    ///
    /// # Panics
    ///
    /// Panics if `slice` is read-only. Propagates panics out of the
    /// serializer with the lock released.
    pub fn put<T, S>(&self, slice: &Slice, value: &T, serializer: &S) -> StoreResult<PutStatus>
    where
        S: ValueSerializer<T>,
    {
        assert!(!slice.is_read_only(), "put through a read-only slice");

        let region = match self.attach(slice)? {
            Attach::Ready(region) => region,
            Attach::Stale => return Ok(PutStatus::Retry),
        };

        let header = region.header();
        match header.lock_write() {
            LockOutcome::Acquired => {}
            LockOutcome::Deleted => return Ok(PutStatus::Deleted),
            LockOutcome::Moved => return Ok(PutStatus::Retry),
        }
        let guard = WriteGuard::new(header);

        let required = serializer.serialized_size(value);
        if required > region.payload_len() {
            guard.into_moved();
            return Ok(PutStatus::NeedsRelocation { required });
        }

        serializer.serialize(value, &mut region.write_view());
        drop(guard);
        Ok(PutStatus::Done)
    }

    /// Runs an in-place read-modify-write under a write acquisition.
    ///
    /// # Panics
    ///
    /// Panics if `slice` is read-only. Propagates panics out of
    /// `mutator` with the lock released.
    pub fn compute<F>(&self, slice: &Slice, mutator: F) -> StoreResult<ValueStatus>
    where
        F: FnOnce(&mut WriteView<'_>),
    {
        assert!(!slice.is_read_only(), "compute through a read-only slice");

        let region = match self.attach(slice)? {
            Attach::Ready(region) => region,
            Attach::Stale => return Ok(ValueStatus::Retry),
        };

        let header = region.header();
        match header.lock_write() {
            LockOutcome::Acquired => {}
            LockOutcome::Deleted => return Ok(ValueStatus::Deleted),
            LockOutcome::Moved => return Ok(ValueStatus::Retry),
        }
        let guard = WriteGuard::new(header);

        mutator(&mut region.write_view());
        drop(guard);
        Ok(ValueStatus::Done)
    }

    /// Deletes the value and releases its bytes for recycling.
    ///
    /// The transition is serialized WRITE -> DELETED -> free-list
    /// push, so no reader can be mid-verb on this generation when the
    /// slot reaches a free list. A second delete of the same
    /// generation reports `Deleted`.
    ///
    /// # Panics
    ///
    /// Panics if `slice` is read-only.
    pub fn delete(&self, slice: &Slice) -> StoreResult<ValueStatus> {
        assert!(!slice.is_read_only(), "delete through a read-only slice");

        let region = match self.attach(slice)? {
            Attach::Ready(region) => region,
            Attach::Stale => return Ok(ValueStatus::Retry),
        };

        let header = region.header();
        match header.lock_write() {
            LockOutcome::Acquired => {}
            LockOutcome::Deleted => return Ok(ValueStatus::Deleted),
            LockOutcome::Moved => return Ok(ValueStatus::Retry),
        }
        WriteGuard::new(header).into_deleted();

        self.alloc.free(slice);
        Ok(ValueStatus::Done)
    }
}

impl std::fmt::Debug for ValueOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueOps").finish_non_exhaustive()
    }
}
