//! Core identifier types for OpalDB.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Block identifier - uniquely identifies a block owned by the pool.
///
/// Blocks are the unit of memory reservation in OpalDB. Ids are assigned
/// monotonically starting at 1; 0 is the invalid sentinel, so a
/// zero-initialized slice descriptor never aliases a real block.
///
/// # Example
///
/// ```rust
/// use opal_common::types::BlockId;
///
/// let block = BlockId::new(1);
/// assert_eq!(block.as_u32(), 1);
/// assert!(block.is_valid());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Invalid block ID constant, used as a sentinel value.
    pub const INVALID: Self = Self(0);

    /// First block ID handed out by the pool.
    pub const FIRST: Self = Self(1);

    /// Creates a new `BlockId` from a raw u32 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw u32 value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the next block ID.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Checks if this is a valid block ID.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// Returns the position of this block in the pool's block table.
    ///
    /// Must not be called on the invalid sentinel.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        (self.0 as usize) - 1
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "BlockId(INVALID)")
        } else {
            write!(f, "BlockId({})", self.0)
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BlockId {
    #[inline]
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

impl From<BlockId> for u32 {
    #[inline]
    fn from(id: BlockId) -> Self {
        id.0
    }
}

/// Generation tag - stamped per allocation instance of a slice slot.
///
/// When the recycling allocator reuses a (block, offset) pair, the
/// generation is incremented, so holders of descriptors from the
/// previous incarnation fail validation instead of reading recycled
/// bytes. This is the store's ABA guard.
///
/// Slices that are never recycled carry [`Generation::NONE`] and skip
/// the comparison.
///
/// # Example
///
/// ```rust
/// use opal_common::types::Generation;
///
/// let tag = Generation::FIRST;
/// assert!(tag.is_valid());
/// assert_eq!(tag.next().as_u32(), 2);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Generation(u32);

impl Generation {
    /// Not-associated sentinel: the slice does not participate in
    /// generation validation.
    pub const NONE: Self = Self(0);

    /// First generation stamped on a freshly allocated slot.
    pub const FIRST: Self = Self(1);

    /// Creates a new `Generation` from a raw u32 value.
    #[inline]
    #[must_use]
    pub const fn new(gen: u32) -> Self {
        Self(gen)
    }

    /// Returns the raw u32 value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the generation stamped on the next reuse of the slot.
    ///
    /// Wraps at 32 bits, skipping the `NONE` sentinel.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        let next = self.0.wrapping_add(1);
        if next == Self::NONE.0 {
            Self(Self::FIRST.0)
        } else {
            Self(next)
        }
    }

    /// Checks if this generation participates in validation.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::NONE.0
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::NONE {
            write!(f, "Generation(NONE)")
        } else {
            write!(f, "Generation({})", self.0)
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Generation {
    #[inline]
    fn from(gen: u32) -> Self {
        Self::new(gen)
    }
}

impl From<Generation> for u32 {
    #[inline]
    fn from(gen: Generation) -> Self {
        gen.0
    }
}
