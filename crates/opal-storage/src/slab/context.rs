//! Per-thread scratch state for the hot path.

use super::slice::Slice;

/// Reusable per-thread descriptors.
///
/// Hot paths repopulate these descriptors through `allocate` and the
/// index lookup instead of constructing fresh ones per call. The
/// context is passed explicitly; nothing here is thread-local storage,
/// and a context must not be shared between threads mid-operation.
#[derive(Debug, Default)]
pub struct ThreadContext {
    /// Descriptor for the value slice the current operation targets.
    pub value: Slice,
    /// Descriptor for the key slice the current operation targets.
    pub key: Slice,
}

impl ThreadContext {
    /// Creates a context with unassociated descriptors.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: Slice::invalid(),
            key: Slice::invalid(),
        }
    }

    /// Clears both descriptors between operations.
    pub fn reset(&mut self) {
        self.value.reset();
        self.key.reset();
    }
}
