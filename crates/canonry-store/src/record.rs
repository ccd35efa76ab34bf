//! Registration records and their introspection snapshots.

use std::collections::BTreeSet;

use canonry_types::{CanonicalKey, ObjectHandle, Permanence, SharedObject};

/// Per-object bookkeeping held inside the owning shard.
///
/// Created at registration, mutated by dependency-edge updates and by the
/// deletion engine (which flips `valid` the instant an object is scheduled
/// for removal, before any physical erasure), destroyed when the object is
/// erased.
pub(crate) struct Registration {
    pub(crate) key: CanonicalKey,
    pub(crate) object: SharedObject,
    pub(crate) permanence: Permanence,
    /// Flipped to `false` when the deletion engine schedules this object,
    /// so a concurrent cascade cannot enqueue it twice.
    pub(crate) valid: bool,
    /// Objects this one depends on (it cannot outlive them).
    pub(crate) dependencies: BTreeSet<ObjectHandle>,
    /// Objects depending on this one (they cannot outlive it).
    pub(crate) dependents: BTreeSet<ObjectHandle>,
}

impl Registration {
    pub(crate) fn new(key: CanonicalKey, object: SharedObject, permanence: Permanence) -> Self {
        Self {
            key,
            object,
            permanence,
            valid: true,
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
        }
    }

    pub(crate) fn snapshot(&self, handle: ObjectHandle) -> RecordSnapshot {
        RecordSnapshot {
            handle,
            key: self.key.clone(),
            permanence: self.permanence,
            valid: self.valid,
            dependencies: self.dependencies.iter().copied().collect(),
            dependents: self.dependents.iter().copied().collect(),
        }
    }
}

/// Point-in-time copy of a registration record's bookkeeping.
///
/// Used by the deletion engine to walk the graph without holding the shard
/// guard, and by diagnostic enumeration. The payload itself is not included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordSnapshot {
    /// Handle of the recorded object.
    pub handle: ObjectHandle,
    /// The canonical key the object is registered under.
    pub key: CanonicalKey,
    /// Eviction policy assigned at registration.
    pub permanence: Permanence,
    /// `false` once the deletion engine has scheduled this object.
    pub valid: bool,
    /// Handles this object depends on, in handle order.
    pub dependencies: Vec<ObjectHandle>,
    /// Handles depending on this object, in handle order.
    pub dependents: Vec<ObjectHandle>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use canonry_types::{shared, KeyKind};

    fn make_record() -> Registration {
        Registration::new(
            CanonicalKey::new(KeyKind::Transform, "affine"),
            shared(7u32),
            Permanence::Standard,
        )
    }

    #[test]
    fn new_record_is_valid_and_unlinked() {
        let rec = make_record();
        assert!(rec.valid);
        assert!(rec.dependencies.is_empty());
        assert!(rec.dependents.is_empty());
    }

    #[test]
    fn snapshot_copies_bookkeeping() {
        let mut rec = make_record();
        let dep = ObjectHandle::new(0, 9, 1);
        rec.dependencies.insert(dep);

        let handle = ObjectHandle::new(0, 1, 1);
        let snap = rec.snapshot(handle);
        assert_eq!(snap.handle, handle);
        assert_eq!(snap.permanence, Permanence::Standard);
        assert!(snap.valid);
        assert_eq!(snap.dependencies, vec![dep]);
        assert!(snap.dependents.is_empty());
    }

    #[test]
    fn snapshot_orders_edges_by_handle() {
        let mut rec = make_record();
        let hi = ObjectHandle::new(0, 8, 1);
        let lo = ObjectHandle::new(0, 2, 1);
        rec.dependents.insert(hi);
        rec.dependents.insert(lo);

        let snap = rec.snapshot(ObjectHandle::new(0, 1, 1));
        assert_eq!(snap.dependents, vec![lo, hi]);
    }
}
