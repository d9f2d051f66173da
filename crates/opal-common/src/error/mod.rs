//! Error types for OpalDB.

mod store;

pub use store::{ErrorCode, StoreError, StoreResult};
