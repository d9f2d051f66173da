//! # opal-common
//!
//! Common types, errors, and configuration for OpalDB.
//!
//! This crate provides the foundational types shared by the OpalDB
//! storage core and its collaborators. It includes:
//!
//! - **Types**: Core identifiers (`BlockId`, `Generation`)
//! - **Errors**: Unified error handling with `StoreError`
//! - **Config**: Store configuration structures
//! - **Constants**: System-wide constants and limits
//!
//! ## Example
//!
//! ```rust
//! use opal_common::types::{BlockId, Generation};
//! use opal_common::error::StoreResult;
//!
//! fn example() -> StoreResult<()> {
//!     let block = BlockId::new(1);
//!     let tag = Generation::new(1);
//!     assert!(block.is_valid() && tag.is_valid());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::StoreConfig;
pub use constants::*;
pub use error::{StoreError, StoreResult};
pub use types::{BlockId, Generation};
