//! Slice - a value-type descriptor of bytes inside a block.

use opal_common::constants::VALUE_HEADER_SIZE;
use opal_common::error::StoreResult;
use opal_common::types::{BlockId, Generation};

use super::header::LockOutcome;
use super::pool::BlockPool;
use super::result::ValueStatus;

/// A descriptor referencing a subrange of a block.
///
/// A slice carries everything needed to re-derive its byte view
/// without consulting any external map: block id, offset, length, and
/// - for recyclable value slices - the generation it was stamped with.
/// Descriptors are plain values: copying one never transfers ownership
/// of the underlying bytes, and the authority to mutate the payload is
/// the header's WRITE state, not possession of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    block: BlockId,
    offset: u32,
    /// Total length, header included for headered slices.
    length: u32,
    generation: Generation,
    headered: bool,
    read_only: bool,
}

impl Slice {
    /// Creates a descriptor that references nothing.
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            block: BlockId::INVALID,
            offset: 0,
            length: 0,
            generation: Generation::NONE,
            headered: false,
            read_only: false,
        }
    }

    /// Returns true if the descriptor references an allocation.
    #[inline]
    #[must_use]
    pub fn is_associated(&self) -> bool {
        self.block.is_valid()
    }

    /// Points the descriptor at an allocation. Used by the allocators;
    /// the index layer only copies descriptors it was handed.
    pub(crate) fn assign(
        &mut self,
        block: BlockId,
        offset: u32,
        length: u32,
        generation: Generation,
        headered: bool,
    ) {
        debug_assert!(block.is_valid());
        debug_assert!(!headered || length as usize >= VALUE_HEADER_SIZE);
        self.block = block;
        self.offset = offset;
        self.length = length;
        self.generation = generation;
        self.headered = headered;
        self.read_only = false;
    }

    /// Clears the descriptor back to the unassociated state.
    pub fn reset(&mut self) {
        *self = Self::invalid();
    }

    /// Returns an identical descriptor.
    ///
    /// Descriptors are freely copyable; this exists so call sites that
    /// hand a descriptor across a publication boundary read explicitly.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Returns a read-only descriptor for the same bytes.
    ///
    /// Write-requiring verbs reject read-only descriptors.
    #[must_use]
    pub fn read_only(&self) -> Self {
        let mut copy = self.clone();
        copy.read_only = true;
        copy
    }

    /// Returns true if this descriptor is read-only.
    #[inline]
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns the block this slice lives in.
    #[inline]
    #[must_use]
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Returns the offset from the block base.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Returns the total allocated length, header included.
    #[inline]
    #[must_use]
    pub fn allocated_length(&self) -> usize {
        self.length as usize
    }

    /// Returns the user-visible payload length.
    #[inline]
    #[must_use]
    pub fn payload_length(&self) -> usize {
        if self.headered {
            self.length as usize - VALUE_HEADER_SIZE
        } else {
            self.length as usize
        }
    }

    /// Returns true if the slice starts with a value header.
    #[inline]
    #[must_use]
    pub fn is_headered(&self) -> bool {
        self.headered
    }

    /// Returns the generation this descriptor was stamped with.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Re-stamps the descriptor's generation before publication.
    ///
    /// The index layer uses this to bind a descriptor to the
    /// allocation instance it is about to publish; a descriptor whose
    /// generation disagrees with the header fails every verb with
    /// `Retry`.
    pub fn associate_allocation(&mut self, generation: Generation) {
        self.generation = generation;
    }

    // -------------------------------------------------------------------------
    // Header protocol delegates
    //
    // Raw transitions on this slice's header, bypassing generation
    // validation. The verb layer runs the full attach protocol; these
    // exist for collaborators that already validated the descriptor
    // and for lock-order tests.
    // -------------------------------------------------------------------------

    /// Acquires the header in read mode.
    pub fn lock_read(&self, pool: &BlockPool) -> StoreResult<ValueStatus> {
        debug_assert!(self.headered, "lock on a headerless slice");
        let region = pool.attach(self)?;
        Ok(outcome_status(region.header().lock_read()))
    }

    /// Releases one read acquisition.
    pub fn unlock_read(&self, pool: &BlockPool) -> StoreResult<()> {
        debug_assert!(self.headered, "unlock on a headerless slice");
        let region = pool.attach(self)?;
        region.header().unlock_read();
        Ok(())
    }

    /// Acquires the header in write mode.
    pub fn lock_write(&self, pool: &BlockPool) -> StoreResult<ValueStatus> {
        debug_assert!(self.headered, "lock on a headerless slice");
        let region = pool.attach(self)?;
        Ok(outcome_status(region.header().lock_write()))
    }

    /// Releases the write acquisition.
    pub fn unlock_write(&self, pool: &BlockPool) -> StoreResult<()> {
        debug_assert!(self.headered, "unlock on a headerless slice");
        let region = pool.attach(self)?;
        region.header().unlock_write();
        Ok(())
    }

    /// Marks the header deleted, draining in-flight lock holders
    /// first. Idempotent within a generation.
    pub fn logical_delete(&self, pool: &BlockPool) -> StoreResult<ValueStatus> {
        debug_assert!(self.headered, "logical_delete on a headerless slice");
        let region = pool.attach(self)?;
        Ok(outcome_status(region.header().logical_delete()))
    }
}

impl Default for Slice {
    fn default() -> Self {
        Self::invalid()
    }
}

fn outcome_status(outcome: LockOutcome) -> ValueStatus {
    match outcome {
        LockOutcome::Acquired => ValueStatus::Done,
        LockOutcome::Deleted => ValueStatus::Deleted,
        LockOutcome::Moved => ValueStatus::Retry,
    }
}
