use canonry_types::{CanonicalKey, ObjectHandle, WorkerId};

/// Errors from shard store operations.
///
/// Every variant here is a programming-invariant violation: it signals a
/// caller bug (or store corruption), not a recoverable runtime condition.
/// Plain not-found outcomes are `Option::None`, never errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An object with an equal key is already registered in this shard.
    #[error("duplicate key in shard {shard}: {key} is already registered as {existing}")]
    DuplicateKey {
        shard: WorkerId,
        key: CanonicalKey,
        existing: ObjectHandle,
    },

    /// The reverse key index and the record arena disagree on cardinality.
    #[error("index mismatch in shard {shard}: {keys} keys for {records} records")]
    IndexMismatch {
        shard: WorkerId,
        keys: usize,
        records: usize,
    },

    /// A key in the reverse index points at a slot holding no live record.
    #[error("key {key} resolves to a missing record {handle}")]
    DanglingIndexEntry {
        key: CanonicalKey,
        handle: ObjectHandle,
    },

    /// A live record's key is absent from the reverse index, or indexed
    /// under a different handle.
    #[error("record {handle} is not indexed under its key {key}")]
    UnindexedRecord {
        handle: ObjectHandle,
        key: CanonicalKey,
    },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
