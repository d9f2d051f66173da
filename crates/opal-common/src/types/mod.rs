//! Core type definitions for OpalDB.

mod ids;

pub use ids::{BlockId, Generation};
