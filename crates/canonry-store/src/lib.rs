//! Per-shard canonical object store.
//!
//! One [`ShardStore`] exists per worker thread. Each shard owns a disjoint
//! set of registration records (key, opaque payload, permanence, validity
//! flag, and the two halves of the dependency bookkeeping) plus the reverse
//! key index that makes interning lookups O(log n).
//!
//! # Design Rules
//!
//! 1. An object lives in exactly one shard: the shard active when it was
//!    registered. Its handle encodes that shard forever.
//! 2. Every operation acquires the shard guard for its own duration and
//!    never touches another shard while holding it.
//! 3. The reverse key index and the record arena always have the same
//!    cardinality; a divergence is a fatal invariant violation, never
//!    silently repaired.
//! 4. Erasure is physical and unconditional; deciding whether an erase is
//!    *safe* is the deletion engine's job, one layer up.
//! 5. Slot generations make stale handles harmless: a handle that outlives
//!    its object resolves to not-found, never to a recycled slot.

pub mod error;
pub mod record;
pub mod shard;

pub use error::{StoreError, StoreResult};
pub use record::RecordSnapshot;
pub use shard::ShardStore;
