//! Sharded canonicalizing object registry with dependency-driven cascading
//! deletion.
//!
//! Many independent modules of a numerical library construct expensive,
//! immutable descriptor objects on demand: geometric transformations, mesh
//! topology descriptors, polynomial tables, assembly-term descriptors. The
//! registry guarantees that two requests for a semantically identical
//! descriptor return the exact same instance, and that descriptors are
//! destroyed automatically and safely once nothing still depends on them.
//!
//! # Structure
//!
//! - [`Registry`]: explicitly constructed context owning one shard per
//!   worker, with [`get_or_create`](Registry::get_or_create) interning,
//!   cross-shard fallback lookup, and dependency-edge maintenance
//! - the deletion engine ([`delete_object`](Registry::delete_object),
//!   [`delete_objects`](Registry::delete_objects),
//!   [`delete_all_at_or_below`](Registry::delete_all_at_or_below)):
//!   mark-invalid traversal followed by physical erasure
//! - [`RegistryObserver`]: optional pure observer of object lifecycle
//!   events, for leak tracking in debug builds

pub mod delete;
pub mod error;
pub mod observe;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use observe::RegistryObserver;
pub use registry::{Registry, SearchScope};

// Re-export what the public surface speaks in, so consumers need only this
// crate for ordinary use.
pub use canonry_store::RecordSnapshot;
pub use canonry_types::{
    shared, CanonicalKey, KeyKind, ObjectHandle, Permanence, SharedObject, StoredObject, WorkerId,
};
