//! System-wide constants for OpalDB.
//!
//! This module defines constants used across the store. The defaults
//! are sized for MiB-scale blocks in production; tests shrink them
//! through `StoreConfig`.

// =============================================================================
// Block Constants
// =============================================================================

/// Default block capacity in bytes (8 MiB).
///
/// Blocks are the unit of reservation from the host. A block is never
/// moved or resized once handed out, so the capacity bounds the largest
/// single value the store can hold.
pub const DEFAULT_BLOCK_CAPACITY: usize = 8 * 1024 * 1024;

/// Minimum block capacity in bytes.
///
/// Small enough that unit tests can exercise block exhaustion with a
/// handful of allocations.
pub const MIN_BLOCK_CAPACITY: usize = 128;

/// Default cap on the number of blocks the pool will reserve.
pub const DEFAULT_MAX_BLOCKS: usize = 1024;

/// Alignment of block base addresses (one cache line).
pub const BLOCK_ALIGNMENT: usize = 64;

// =============================================================================
// Slice and Header Constants
// =============================================================================

/// Size of the value header in bytes.
///
/// The header is two 32-bit words: the lock-state word and the
/// generation tag. Key slices carry no header.
pub const VALUE_HEADER_SIZE: usize = 8;

/// Every slice start is rounded up to this boundary so the header's
/// atomic words are naturally aligned.
pub const SLICE_ALIGNMENT: usize = 8;

// =============================================================================
// Recycling Constants
// =============================================================================

/// Largest slice length the recycling allocator keeps on a free list
/// (4 KiB). Larger reclaimed slices are dropped from recycling; the
/// class table stays bounded.
pub const DEFAULT_MAX_RECYCLE_SIZE: usize = 4 * 1024;

/// Free-list size classes are multiples of this granularity.
pub const SIZE_CLASS_GRANULARITY: usize = SLICE_ALIGNMENT;

// =============================================================================
// Lock Protocol Constants
// =============================================================================

/// Iterations of `spin_loop` before a contended lock acquisition
/// falls back to yielding the OS thread.
pub const LOCK_SPIN_LIMIT: u32 = 128;
