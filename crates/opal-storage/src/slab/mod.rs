//! Off-heap slab subsystem for OpalDB values.
//!
//! Values live in large pool-owned blocks outside the managed heap and
//! are addressed through slice descriptors. Operations work on the
//! bytes in place; nothing is copied into intermediate buffers on the
//! hot path.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          ValueOps                            │
//! │        read / transform / put / compute / delete             │
//! │   attach: range check → generation check → lock acquisition  │
//! └──────────────────────────┬───────────────────────────────────┘
//!                            │
//!          ┌─────────────────┴───────────────┐
//!          ▼                                 ▼
//! ┌───────────────────┐          ┌─────────────────────────┐
//! │ SeqExpandAllocator│          │  SyncRecycleAllocator   │
//! │  bump only (keys) │          │ bump + size-classed     │
//! │                   │          │ free lists (values)     │
//! └─────────┬─────────┘          └───────────┬─────────────┘
//!           │                                │
//!           └──────────────┬─────────────────┘
//!                          ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        BlockPool                             │
//! │  ┌─────────┐ ┌─────────┐     ┌─────────┐                     │
//! │  │ Block 1 │ │ Block 2 │ ... │ Block N │   off-heap regions  │
//! │  └─────────┘ └─────────┘     └─────────┘                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each value slice starts with an 8-byte header: a lock/state word
//! gating readers and writers, and a generation tag that detects
//! recycled slots (the ABA guard). Synchronization is per slice; the
//! store provides no ordering across slices.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use opal_common::StoreConfig;
//! use opal_storage::slab::{
//!     BlockAllocator, BlockPool, SyncRecycleAllocator, ThreadContext, ValueOps,
//! };
//!
//! # fn main() -> opal_common::error::StoreResult<()> {
//! let pool = Arc::new(BlockPool::new(StoreConfig::new(128))?);
//! let values = Arc::new(SyncRecycleAllocator::new(Arc::clone(&pool)));
//! let ops = ValueOps::new(Arc::clone(&values));
//!
//! let mut ctx = ThreadContext::new();
//! values.allocate(&mut ctx.value, 12, true)?;
//!
//! let status = ops.compute(&ctx.value, |view| view.put_u32(0, 7))?;
//! assert!(status.is_done());
//! # Ok(())
//! # }
//! ```

mod alloc;
mod block;
mod context;
mod header;
mod ops;
mod pool;
mod result;
mod serialize;
mod slice;
mod view;

pub use alloc::{BlockAllocator, SeqExpandAllocator, SlabStats, SyncRecycleAllocator};
pub use block::Block;
pub use context::ThreadContext;
pub use ops::ValueOps;
pub use pool::BlockPool;
pub use result::{PutStatus, TransformResult, ValueStatus};
pub use serialize::{KeyHasher, ValueSerializer};
pub use slice::Slice;
pub use view::{ReadView, WriteView};
