//! Foundation types for the canonry object registry.
//!
//! This crate provides the value types shared by every other canonry crate:
//! the canonical key that identifies what a stored descriptor *represents*,
//! the arena handle that identifies where it lives, and the permanence level
//! that controls whether the deletion engine may ever evict it.
//!
//! # Key Types
//!
//! - [`CanonicalKey`]: totally ordered descriptor identity used for
//!   value-based interning (two construction requests with equal keys
//!   canonicalize to the same stored object)
//! - [`ObjectHandle`]: stable opaque address of a stored object, naming
//!   its shard, arena slot, and slot generation
//! - [`WorkerId`]: identity of a worker thread and of its shard
//! - [`Permanence`]: eviction-policy tag, from `AutoDelete` to `Permanent`
//! - [`SharedObject`]: type-erased, shared, immutable payload

pub mod error;
pub mod handle;
pub mod key;
pub mod object;
pub mod permanence;

pub use error::TypeError;
pub use handle::{ObjectHandle, WorkerId};
pub use key::{CanonicalKey, KeyKind};
pub use object::{shared, SharedObject, StoredObject};
pub use permanence::Permanence;
