//! Block pool - owns every block and resolves descriptors to bytes.

use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use opal_common::config::StoreConfig;
use opal_common::constants::VALUE_HEADER_SIZE;
use opal_common::error::{StoreError, StoreResult};
use opal_common::types::BlockId;

use super::block::Block;
use super::header::HeaderView;
use super::slice::Slice;
use super::view::{ReadView, WriteView};

/// Owns the blocks backing the store and hands out raw regions for
/// validated slice descriptors.
///
/// The pool grows by whole blocks up to the configured limit and never
/// shrinks; reclaimed slices circulate through the allocators' free
/// lists instead. Growth is serialized behind the block-table write
/// lock, so `grow` calls are linearizable with respect to each other.
pub struct BlockPool {
    config: StoreConfig,
    /// Block table, indexed by `BlockId::index()`.
    blocks: RwLock<Vec<Arc<Block>>>,
}

impl BlockPool {
    /// Creates an empty pool over a validated configuration.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            blocks: RwLock::new(Vec::new()),
        })
    }

    /// Returns the pool's configuration.
    #[inline]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the number of blocks currently reserved.
    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    /// Returns the total bytes reserved from the host.
    pub fn reserved_bytes(&self) -> usize {
        self.blocks.read().len() * self.config.block_capacity
    }

    /// Resolves a block id.
    pub fn block(&self, id: BlockId) -> StoreResult<Arc<Block>> {
        if !id.is_valid() {
            return Err(StoreError::UnknownBlock { block: id });
        }
        self.blocks
            .read()
            .get(id.index())
            .cloned()
            .ok_or(StoreError::UnknownBlock { block: id })
    }

    /// Reserves one more block, or fails when the limit is reached.
    pub(crate) fn grow(&self) -> StoreResult<Arc<Block>> {
        let mut blocks = self.blocks.write();
        if blocks.len() >= self.config.max_blocks {
            return Err(StoreError::OutOfMemory {
                requested: self.config.block_capacity,
            });
        }
        let id = BlockId::new(blocks.len() as u32 + 1);
        let block = Arc::new(Block::new(id, self.config.block_capacity));
        blocks.push(Arc::clone(&block));
        debug!(
            block = %id,
            capacity = self.config.block_capacity,
            total = blocks.len(),
            "reserved block"
        );
        Ok(block)
    }

    /// Resolves a descriptor to its raw byte region.
    ///
    /// This is the first half of the attach protocol: the range is
    /// validated against the block, nothing is locked yet. Generation
    /// and state checks happen on the returned region's header.
    pub(crate) fn attach(&self, slice: &Slice) -> StoreResult<RawRegion> {
        let block = self.block(slice.block())?;
        let ptr = block
            .range_ptr(slice.offset(), slice.allocated_length() as u32)
            .ok_or(StoreError::SliceOutOfRange {
                block: slice.block(),
                offset: slice.offset(),
                length: slice.allocated_length() as u32,
                capacity: block.capacity(),
            })?;
        Ok(RawRegion {
            _block: block,
            ptr,
            len: slice.allocated_length(),
            headered: slice.is_headered(),
        })
    }
}

impl std::fmt::Debug for BlockPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockPool")
            .field("block_capacity", &self.config.block_capacity)
            .field("max_blocks", &self.config.max_blocks)
            .field("blocks", &self.block_count())
            .finish()
    }
}

/// A descriptor resolved to live bytes: the raw counterpart of a slice.
///
/// Holds its block alive and knows whether the slice carries a value
/// header. Views handed to user closures cover the payload only.
pub struct RawRegion {
    _block: Arc<Block>,
    ptr: NonNull<u8>,
    len: usize,
    headered: bool,
}

impl RawRegion {
    /// Returns the payload length (header excluded).
    #[inline]
    pub(crate) fn payload_len(&self) -> usize {
        if self.headered {
            self.len - VALUE_HEADER_SIZE
        } else {
            self.len
        }
    }

    #[inline]
    fn payload_ptr(&self) -> *mut u8 {
        let skip = if self.headered { VALUE_HEADER_SIZE } else { 0 };
        // SAFETY: `skip` is within the validated region length.
        unsafe { self.ptr.as_ptr().add(skip) }
    }

    /// Returns the header at the region start.
    ///
    /// Must only be called for headered slices.
    #[inline]
    pub(crate) fn header(&self) -> HeaderView<'_> {
        debug_assert!(self.headered, "header access on a headerless slice");
        // SAFETY: the region starts with a properly aligned header; the
        // allocators round every slice start to the slice alignment.
        unsafe { HeaderView::from_ptr(self.ptr.as_ptr()) }
    }

    /// Returns a read-only bounds-checked view over the payload.
    #[inline]
    pub(crate) fn read_view(&self) -> ReadView<'_> {
        // SAFETY: payload range was validated at attach.
        unsafe { ReadView::new(self.payload_ptr(), self.payload_len()) }
    }

    /// Returns a writable bounds-checked view over the payload.
    ///
    /// Callers must hold the WRITE tag; the protocol makes the region
    /// exclusive for the duration.
    #[inline]
    pub(crate) fn write_view(&self) -> WriteView<'_> {
        // SAFETY: payload range was validated at attach; exclusivity is
        // guaranteed by the caller holding the write lock.
        unsafe { WriteView::new(self.payload_ptr(), self.payload_len()) }
    }
}
