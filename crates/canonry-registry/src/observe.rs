//! Diagnostic observer hook.

use canonry_types::{CanonicalKey, ObjectHandle};

/// Pure observer of object lifecycle events.
///
/// An observer can be attached at registry construction for leak tracking
/// in debug builds. It is called after the fact, outside any shard guard,
/// and must not call back into the registry. All methods default to no-ops.
pub trait RegistryObserver: Send + Sync {
    /// A candidate object was registered as canonical.
    fn registered(&self, handle: ObjectHandle, key: &CanonicalKey) {
        let _ = (handle, key);
    }

    /// An object was physically erased by the deletion engine.
    fn erased(&self, handle: ObjectHandle, key: &CanonicalKey) {
        let _ = (handle, key);
    }
}
