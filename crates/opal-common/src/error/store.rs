//! Store error types.
//!
//! Provides the unified error type for the off-heap value store.
//! Logical outcomes of value operations (deleted target, stale
//! descriptor) are not errors; they travel through the tri-state
//! result codes in `opal-storage`. Errors here are the conditions a
//! caller cannot resolve by re-reading the index: exhausted memory,
//! corrupt descriptors, bad configuration.

use std::fmt;
use thiserror::Error;

use crate::types::BlockId;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Unknown or unspecified error.
    Unknown = 0x0000,
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid argument provided.
    InvalidArgument = 0x0002,

    // Memory errors (0x0100 - 0x01FF)
    /// The pool cannot reserve another block.
    OutOfMemory = 0x0100,
    /// Requested allocation exceeds the block capacity.
    AllocationTooLarge = 0x0101,

    // Slice errors (0x0200 - 0x02FF)
    /// Descriptor names a block the pool does not own.
    UnknownBlock = 0x0200,
    /// Descriptor range falls outside its block.
    SliceOutOfRange = 0x0201,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Memory",
            0x02 => "Slice",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for the OpalDB store.
///
/// # Example
///
/// ```rust
/// use opal_common::error::{StoreError, StoreResult};
///
/// fn reserve(bytes: usize) -> StoreResult<()> {
///     Err(StoreError::OutOfMemory { requested: bytes })
/// }
/// ```
#[derive(Debug, Error)]
pub enum StoreError {
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    /// The pool reached its block limit and cannot satisfy the request.
    #[error("out of memory: cannot reserve {requested} more bytes")]
    OutOfMemory {
        /// Bytes the failed request asked for.
        requested: usize,
    },

    /// A single allocation larger than a whole block was requested.
    #[error("allocation of {requested} bytes exceeds block capacity {capacity}")]
    AllocationTooLarge {
        /// Bytes the failed request asked for.
        requested: usize,
        /// Configured block capacity.
        capacity: usize,
    },

    /// A descriptor named a block the pool does not own.
    #[error("block {block} not found in pool")]
    UnknownBlock {
        /// The missing block.
        block: BlockId,
    },

    /// A descriptor's (offset, length) range falls outside its block.
    #[error("slice [{offset}, {offset}+{length}) out of range for block {block} of capacity {capacity}")]
    SliceOutOfRange {
        /// The block the descriptor names.
        block: BlockId,
        /// Descriptor offset.
        offset: u32,
        /// Descriptor length.
        length: u32,
        /// Capacity of the named block.
        capacity: usize,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },
}

impl StoreError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::InvalidArgument { .. } | Self::InvalidConfig { .. } => {
                ErrorCode::InvalidArgument
            }
            Self::OutOfMemory { .. } => ErrorCode::OutOfMemory,
            Self::AllocationTooLarge { .. } => ErrorCode::AllocationTooLarge,
            Self::UnknownBlock { .. } => ErrorCode::UnknownBlock,
            Self::SliceOutOfRange { .. } => ErrorCode::SliceOutOfRange,
        }
    }

    /// Returns true if this error is transient and the operation can
    /// be retried after the caller sheds load.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }

    /// Returns true if this error indicates a corrupted descriptor or
    /// pool state.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownBlock { .. } | Self::SliceOutOfRange { .. } | Self::Internal { .. }
        )
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
