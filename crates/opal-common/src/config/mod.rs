//! Configuration structures for OpalDB.

mod store;

pub use store::StoreConfig;
