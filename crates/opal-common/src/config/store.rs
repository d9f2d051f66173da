//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BLOCK_CAPACITY, DEFAULT_MAX_BLOCKS, DEFAULT_MAX_RECYCLE_SIZE, MIN_BLOCK_CAPACITY,
    SIZE_CLASS_GRANULARITY, SLICE_ALIGNMENT, VALUE_HEADER_SIZE,
};
use crate::error::{StoreError, StoreResult};

/// Configuration for the off-heap value store.
///
/// # Example
///
/// ```rust
/// use opal_common::StoreConfig;
///
/// let config = StoreConfig::new(128).with_max_blocks(2);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.memory_limit(), 256);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Capacity of each block in bytes.
    pub block_capacity: usize,
    /// Maximum number of blocks the pool may reserve.
    pub max_blocks: usize,
    /// Largest slice length kept on a recycling free list.
    pub max_recycle_size: usize,
}

impl StoreConfig {
    /// Creates a new configuration with the specified block capacity.
    #[must_use]
    pub fn new(block_capacity: usize) -> Self {
        Self {
            block_capacity,
            max_blocks: DEFAULT_MAX_BLOCKS,
            max_recycle_size: DEFAULT_MAX_RECYCLE_SIZE.min(block_capacity),
        }
    }

    /// Creates a configuration from a total memory budget in bytes.
    #[must_use]
    pub fn from_memory_limit(memory_bytes: usize) -> Self {
        let memory_bytes = memory_bytes.max(DEFAULT_BLOCK_CAPACITY);
        Self::new(DEFAULT_BLOCK_CAPACITY).with_max_blocks(memory_bytes / DEFAULT_BLOCK_CAPACITY)
    }

    /// Sets the maximum number of blocks.
    #[must_use]
    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    /// Sets the recycling ceiling.
    #[must_use]
    pub fn with_max_recycle_size(mut self, max_recycle_size: usize) -> Self {
        self.max_recycle_size = max_recycle_size;
        self
    }

    /// Returns the total memory the pool may reserve.
    #[must_use]
    pub fn memory_limit(&self) -> usize {
        self.block_capacity * self.max_blocks
    }

    /// Returns the largest payload a single value slice can hold.
    #[must_use]
    pub fn max_value_size(&self) -> usize {
        self.block_capacity - VALUE_HEADER_SIZE
    }

    /// Validates the configuration.
    pub fn validate(&self) -> StoreResult<()> {
        if self.block_capacity < MIN_BLOCK_CAPACITY {
            return Err(StoreError::invalid_config(format!(
                "block_capacity must be >= {MIN_BLOCK_CAPACITY}"
            )));
        }
        if self.block_capacity % SLICE_ALIGNMENT != 0 {
            return Err(StoreError::invalid_config(format!(
                "block_capacity must be a multiple of {SLICE_ALIGNMENT}"
            )));
        }
        if self.max_blocks == 0 {
            return Err(StoreError::invalid_config("max_blocks must be > 0"));
        }
        if self.max_recycle_size > self.block_capacity {
            return Err(StoreError::invalid_config(
                "max_recycle_size must not exceed block_capacity",
            ));
        }
        if self.max_recycle_size % SIZE_CLASS_GRANULARITY != 0 {
            return Err(StoreError::invalid_config(format!(
                "max_recycle_size must be a multiple of {SIZE_CLASS_GRANULARITY}"
            )));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_CAPACITY)
    }
}
