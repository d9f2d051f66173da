//! # opal-storage
//!
//! Concurrent off-heap value store for OpalDB.
//!
//! This crate implements the slab subsystem that backs OpalDB values:
//! - Block-based off-heap allocation with bump cursors
//! - A recycling allocator with size-classed free lists and
//!   generation-tagged ABA protection
//! - A per-value lock/version header protocol for concurrent readers
//!   and writers over shared memory
//! - In-place value operations that never copy payloads into managed
//!   memory

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Off-heap slab: blocks, slices, and the value protocol
pub mod slab;

pub use slab::{
    BlockAllocator, BlockPool, PutStatus, ReadView, SeqExpandAllocator, Slice,
    SyncRecycleAllocator, ThreadContext, TransformResult, ValueOps, ValueSerializer, ValueStatus,
    WriteView,
};
