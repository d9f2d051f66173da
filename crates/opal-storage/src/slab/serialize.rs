//! Interfaces consumed from the map layer.
//!
//! The store moves bytes; how a value maps to bytes is the caller's
//! business. These traits are implemented next to the public map API
//! and passed down into the verbs.

use super::view::{ReadView, WriteView};

/// Maps values of type `T` to and from payload bytes.
///
/// `serialize` writes through a bounds-checked view; a serializer that
/// addresses past `serialized_size` panics the same way a user closure
/// does, with the slice lock released on unwind.
pub trait ValueSerializer<T> {
    /// Returns the payload bytes `value` serializes to.
    fn serialized_size(&self, value: &T) -> usize;

    /// Writes `value` into `target`, starting at offset 0.
    fn serialize(&self, value: &T, target: &mut WriteView<'_>);

    /// Reads a value back out of `source`.
    fn deserialize(&self, source: &ReadView<'_>) -> T;
}

/// Hashes keys for the map layer's index.
///
/// Not used inside the store; carried here because thread contexts
/// plumb it alongside the serializers.
pub trait KeyHasher<K> {
    /// Returns the hash of `key`.
    fn hash(&self, key: &K) -> u64;
}
