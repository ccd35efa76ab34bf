//! Error types for registry operations.

use canonry_store::StoreError;
use canonry_types::{CanonicalKey, ObjectHandle, WorkerId};

/// Errors that can occur during registry operations.
///
/// Apart from [`Store`](RegistryError::Store) pass-throughs, every variant
/// is a programming-invariant violation: a caller linked against an object
/// that was never registered, tried to force a permanent object out, or
/// asked for an impossible edge. Lookups that merely miss return `None`;
/// transient multi-worker races during teardown are logged, not raised.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// An invariant violation inside a single shard.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A worker index outside the registry's fixed worker set.
    #[error("unknown worker {worker}: registry has {count} workers")]
    UnknownWorker { worker: WorkerId, count: usize },

    /// A dependency operation named an object no shard has a record of:
    /// it was never registered, or was already deleted.
    #[error("dependency endpoint {0} is not stored in any shard")]
    MissingEndpoint(ObjectHandle),

    /// A deletion request named an object that is not stored, and the
    /// caller did not ask for that to be ignored.
    #[error("object {0} is not stored")]
    NotStored(ObjectHandle),

    /// A cascade reached an object whose permanence forbids deletion. A
    /// permanent object can never be left holding a dangling dependency.
    #[error("cannot delete permanent object {handle} ({key})")]
    PermanentDeletion {
        handle: ObjectHandle,
        key: CanonicalKey,
    },

    /// The requested edge would close a dependency cycle.
    #[error("dependency {from} -> {to} would close a cycle")]
    CycleWouldForm {
        from: ObjectHandle,
        to: ObjectHandle,
    },
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
