//! The per-worker shard: a record arena plus a reverse key index, behind a
//! single coarse guard.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use tracing::debug;

use canonry_types::{CanonicalKey, ObjectHandle, Permanence, SharedObject, WorkerId};

use crate::error::{StoreError, StoreResult};
use crate::record::{RecordSnapshot, Registration};

/// One arena slot. The generation survives vacancy so that a handle kept
/// across an erase can never resolve to the slot's next occupant.
struct SlotEntry {
    generation: u32,
    record: Option<Registration>,
}

struct ShardInner {
    slots: Vec<SlotEntry>,
    free: Vec<u32>,
    index: BTreeMap<CanonicalKey, ObjectHandle>,
}

impl ShardInner {
    fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn record(&self, worker: WorkerId, handle: ObjectHandle) -> Option<&Registration> {
        if handle.shard() != worker {
            return None;
        }
        let entry = self.slots.get(handle.slot() as usize)?;
        if entry.generation != handle.generation() {
            return None;
        }
        entry.record.as_ref()
    }

    fn record_mut(&mut self, worker: WorkerId, handle: ObjectHandle) -> Option<&mut Registration> {
        if handle.shard() != worker {
            return None;
        }
        let entry = self.slots.get_mut(handle.slot() as usize)?;
        if entry.generation != handle.generation() {
            return None;
        }
        entry.record.as_mut()
    }
}

/// The store owned by one worker.
///
/// Holds the bidirectional key↔object mapping for every object registered
/// while this worker was active, plus the per-object bookkeeping the
/// deletion engine walks. All operations lock the shard for their own
/// duration only; nothing here ever takes another shard's guard.
pub struct ShardStore {
    worker: WorkerId,
    inner: Mutex<ShardInner>,
}

impl ShardStore {
    /// Create the empty store for worker slot `worker`.
    pub fn new(worker: WorkerId) -> Self {
        Self {
            worker,
            inner: Mutex::new(ShardInner {
                slots: Vec::new(),
                free: Vec::new(),
                index: BTreeMap::new(),
            }),
        }
    }

    /// The worker this shard belongs to.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Number of live objects in this shard.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").live()
    }

    /// Returns `true` if this shard holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up the canonical object for `key`, shard-locally.
    pub fn search(&self, key: &CanonicalKey) -> Option<ObjectHandle> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.index.get(key).copied()
    }

    /// Register `object` under `key` with the given permanence.
    ///
    /// Fails with [`StoreError::DuplicateKey`] if an object with an equal
    /// key already lives in this shard. Duplicating a canonical object is
    /// a caller bug, not a recoverable condition.
    pub fn insert(
        &self,
        key: CanonicalKey,
        object: SharedObject,
        permanence: Permanence,
    ) -> StoreResult<ObjectHandle> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if let Some(&existing) = inner.index.get(&key) {
            return Err(StoreError::DuplicateKey {
                shard: self.worker,
                key,
                existing,
            });
        }

        let slot = match inner.free.pop() {
            Some(slot) => slot,
            None => {
                inner.slots.push(SlotEntry {
                    generation: 1,
                    record: None,
                });
                (inner.slots.len() - 1) as u32
            }
        };
        let generation = inner.slots[slot as usize].generation;
        let handle = ObjectHandle::new(self.worker.index() as u16, slot, generation);

        inner.slots[slot as usize].record =
            Some(Registration::new(key.clone(), object, permanence));
        inner.index.insert(key.clone(), handle);

        if inner.index.len() != inner.live() {
            return Err(StoreError::IndexMismatch {
                shard: self.worker,
                keys: inner.index.len(),
                records: inner.live(),
            });
        }

        debug!(%handle, %key, %permanence, "registered object");
        Ok(handle)
    }

    /// Physically remove the record and its reverse-index entry.
    ///
    /// Returns the key the object was registered under, or `None` if the
    /// handle does not name a live object here. Callers must already have
    /// verified removal is safe; that is the deletion engine's contract.
    pub fn erase(&self, handle: ObjectHandle) -> Option<CanonicalKey> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        let key = inner.record(self.worker, handle)?.key.clone();
        inner.index.remove(&key);
        let entry = &mut inner.slots[handle.slot() as usize];
        entry.record = None;
        entry.generation = entry.generation.wrapping_add(1);
        inner.free.push(handle.slot());
        debug!(%handle, %key, "erased object");
        Some(key)
    }

    /// The canonical key for a live object, or `None`.
    pub fn key_of(&self, handle: ObjectHandle) -> Option<CanonicalKey> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.record(self.worker, handle).map(|rec| rec.key.clone())
    }

    /// The shared payload of a live object, or `None`.
    pub fn resolve(&self, handle: ObjectHandle) -> Option<SharedObject> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner
            .record(self.worker, handle)
            .map(|rec| SharedObject::clone(&rec.object))
    }

    /// Whether `handle` names a live object in this shard.
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.record(self.worker, handle).is_some()
    }

    /// Flip the validity flag of a live object to `false`.
    ///
    /// Returns whether the object was still valid, or `None` if it is not
    /// stored here. The deletion engine only enqueues an object when this
    /// returns `Some(true)`, which is what makes cascades idempotent.
    pub fn invalidate(&self, handle: ObjectHandle) -> Option<bool> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        let rec = inner.record_mut(self.worker, handle)?;
        let was_valid = rec.valid;
        rec.valid = false;
        Some(was_valid)
    }

    /// Flip the validity flag of a live object back to `true`.
    ///
    /// Returns the prior validity, or `None` if the object is not stored
    /// here. Used when a cascade is unwound after a mid-flight error.
    pub fn revalidate(&self, handle: ObjectHandle) -> Option<bool> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        let rec = inner.record_mut(self.worker, handle)?;
        let was_valid = rec.valid;
        rec.valid = true;
        Some(was_valid)
    }

    /// Record the forward half of an edge: `owner` depends on `target`.
    /// Returns `false` when `owner` is not stored here.
    pub fn link_dependency(&self, owner: ObjectHandle, target: ObjectHandle) -> bool {
        let mut inner = self.inner.lock().expect("lock poisoned");
        match inner.record_mut(self.worker, owner) {
            Some(rec) => {
                rec.dependencies.insert(target);
                true
            }
            None => false,
        }
    }

    /// Record the reverse half of an edge: `dependent` depends on `owner`.
    /// Returns `false` when `owner` is not stored here.
    pub fn link_dependent(&self, owner: ObjectHandle, dependent: ObjectHandle) -> bool {
        let mut inner = self.inner.lock().expect("lock poisoned");
        match inner.record_mut(self.worker, owner) {
            Some(rec) => {
                rec.dependents.insert(dependent);
                true
            }
            None => false,
        }
    }

    /// Remove the forward half of an edge. Returns `false` when `owner` is
    /// not stored here; removing an edge that was never recorded is a no-op.
    pub fn unlink_dependency(&self, owner: ObjectHandle, target: ObjectHandle) -> bool {
        let mut inner = self.inner.lock().expect("lock poisoned");
        match inner.record_mut(self.worker, owner) {
            Some(rec) => {
                rec.dependencies.remove(&target);
                true
            }
            None => false,
        }
    }

    /// Remove the reverse half of an edge. Returns `false` when `owner` is
    /// not stored here.
    pub fn unlink_dependent(&self, owner: ObjectHandle, dependent: ObjectHandle) -> bool {
        let mut inner = self.inner.lock().expect("lock poisoned");
        match inner.record_mut(self.worker, owner) {
            Some(rec) => {
                rec.dependents.remove(&dependent);
                true
            }
            None => false,
        }
    }

    /// Whether any live object still depends on `handle`.
    pub fn has_dependents(&self, handle: ObjectHandle) -> Option<bool> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner
            .record(self.worker, handle)
            .map(|rec| !rec.dependents.is_empty())
    }

    /// Point-in-time copy of a record's bookkeeping.
    pub fn snapshot(&self, handle: ObjectHandle) -> Option<RecordSnapshot> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner
            .record(self.worker, handle)
            .map(|rec| rec.snapshot(handle))
    }

    /// Snapshots of every live record, in slot order.
    pub fn snapshots(&self) -> Vec<RecordSnapshot> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| {
                let rec = entry.record.as_ref()?;
                let handle = ObjectHandle::new(
                    self.worker.index() as u16,
                    slot as u32,
                    entry.generation,
                );
                Some(rec.snapshot(handle))
            })
            .collect()
    }

    /// Handles of every live object, in slot order.
    pub fn live_handles(&self) -> Vec<ObjectHandle> {
        self.snapshots().into_iter().map(|snap| snap.handle).collect()
    }

    /// Handles of every live object whose permanence is at or below
    /// `threshold`. Used by bulk teardown.
    pub fn handles_at_or_below(&self, threshold: Permanence) -> Vec<ObjectHandle> {
        self.snapshots()
            .into_iter()
            .filter(|snap| snap.permanence <= threshold)
            .map(|snap| snap.handle)
            .collect()
    }

    /// Check the shard's structural invariants.
    ///
    /// The reverse index and the record arena must have identical
    /// cardinality, every indexed key must resolve to a live record bearing
    /// that key, and every live record must be indexed under its own key.
    pub fn verify_consistency(&self) -> StoreResult<()> {
        let inner = self.inner.lock().expect("lock poisoned");
        if inner.index.len() != inner.live() {
            return Err(StoreError::IndexMismatch {
                shard: self.worker,
                keys: inner.index.len(),
                records: inner.live(),
            });
        }
        for (key, &handle) in &inner.index {
            match inner.record(self.worker, handle) {
                Some(rec) if rec.key == *key => {}
                _ => {
                    return Err(StoreError::DanglingIndexEntry {
                        key: key.clone(),
                        handle,
                    })
                }
            }
        }
        for (slot, entry) in inner.slots.iter().enumerate() {
            if let Some(rec) = &entry.record {
                let handle = ObjectHandle::new(
                    self.worker.index() as u16,
                    slot as u32,
                    entry.generation,
                );
                if inner.index.get(&rec.key) != Some(&handle) {
                    return Err(StoreError::UnindexedRecord {
                        handle,
                        key: rec.key.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ShardStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardStore")
            .field("worker", &self.worker)
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canonry_types::{shared, KeyKind};

    fn key(tag: &str) -> CanonicalKey {
        CanonicalKey::new(KeyKind::Transform, tag)
    }

    fn store() -> ShardStore {
        ShardStore::new(WorkerId(0))
    }

    // -----------------------------------------------------------------------
    // Insert / search / lookup
    // -----------------------------------------------------------------------

    #[test]
    fn new_shard_is_empty() {
        let s = store();
        assert!(s.is_empty());
        assert_eq!(s.len(), 0);
        s.verify_consistency().unwrap();
    }

    #[test]
    fn insert_then_search_finds_the_object() {
        let s = store();
        let h = s.insert(key("affine"), shared(1u32), Permanence::Standard).unwrap();
        assert_eq!(s.search(&key("affine")), Some(h));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn search_unknown_key_is_not_found() {
        let s = store();
        assert_eq!(s.search(&key("nope")), None);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let s = store();
        let h = s.insert(key("k"), shared(1u32), Permanence::Standard).unwrap();
        let err = s
            .insert(key("k"), shared(2u32), Permanence::Standard)
            .unwrap_err();
        match err {
            StoreError::DuplicateKey { existing, .. } => assert_eq!(existing, h),
            other => panic!("unexpected error: {other}"),
        }
        // The first registration is untouched.
        assert_eq!(s.len(), 1);
        s.verify_consistency().unwrap();
    }

    #[test]
    fn key_of_returns_registration_key() {
        let s = store();
        let h = s.insert(key("k"), shared(1u32), Permanence::Standard).unwrap();
        assert_eq!(s.key_of(h), Some(key("k")));
    }

    #[test]
    fn resolve_returns_the_payload() {
        let s = store();
        let h = s
            .insert(key("k"), shared(vec![1.0f64, 2.0]), Permanence::Standard)
            .unwrap();
        let obj = s.resolve(h).unwrap();
        let table = obj.as_any().downcast_ref::<Vec<f64>>().unwrap();
        assert_eq!(table, &[1.0, 2.0]);
    }

    #[test]
    fn foreign_shard_handle_is_not_found() {
        let s = store();
        s.insert(key("k"), shared(1u32), Permanence::Standard).unwrap();
        let foreign = ObjectHandle::new(1, 0, 1);
        assert!(!s.contains(foreign));
        assert_eq!(s.key_of(foreign), None);
    }

    // -----------------------------------------------------------------------
    // Erase and handle staleness
    // -----------------------------------------------------------------------

    #[test]
    fn erase_removes_record_and_index_entry() {
        let s = store();
        let h = s.insert(key("k"), shared(1u32), Permanence::Standard).unwrap();
        assert_eq!(s.erase(h), Some(key("k")));
        assert!(!s.contains(h));
        assert_eq!(s.search(&key("k")), None);
        assert!(s.is_empty());
        s.verify_consistency().unwrap();
    }

    #[test]
    fn erase_twice_is_not_found() {
        let s = store();
        let h = s.insert(key("k"), shared(1u32), Permanence::Standard).unwrap();
        assert!(s.erase(h).is_some());
        assert_eq!(s.erase(h), None);
    }

    #[test]
    fn stale_handle_does_not_see_slot_reuse() {
        let s = store();
        let old = s.insert(key("a"), shared(1u32), Permanence::Standard).unwrap();
        s.erase(old);
        let new = s.insert(key("b"), shared(2u32), Permanence::Standard).unwrap();
        // Same slot, bumped generation.
        assert_eq!(new.slot(), old.slot());
        assert_ne!(new.generation(), old.generation());
        assert!(!s.contains(old));
        assert!(s.resolve(old).is_none());
        assert!(s.contains(new));
    }

    // -----------------------------------------------------------------------
    // Validity flag
    // -----------------------------------------------------------------------

    #[test]
    fn invalidate_reports_prior_validity_once() {
        let s = store();
        let h = s.insert(key("k"), shared(1u32), Permanence::Standard).unwrap();
        assert_eq!(s.invalidate(h), Some(true));
        assert_eq!(s.invalidate(h), Some(false));
        assert_eq!(s.invalidate(ObjectHandle::new(0, 99, 1)), None);
    }

    #[test]
    fn revalidate_restores_validity() {
        let s = store();
        let h = s.insert(key("k"), shared(1u32), Permanence::Standard).unwrap();
        s.invalidate(h);
        assert_eq!(s.revalidate(h), Some(false));
        assert!(s.snapshot(h).unwrap().valid);
        assert_eq!(s.invalidate(h), Some(true));
    }

    #[test]
    fn invalidated_object_is_still_stored_until_erased() {
        let s = store();
        let h = s.insert(key("k"), shared(1u32), Permanence::Standard).unwrap();
        s.invalidate(h);
        assert!(s.contains(h));
        assert!(!s.snapshot(h).unwrap().valid);
    }

    // -----------------------------------------------------------------------
    // Edge halves
    // -----------------------------------------------------------------------

    #[test]
    fn edge_halves_update_both_sets() {
        let s = store();
        let a = s.insert(key("a"), shared(1u32), Permanence::Standard).unwrap();
        let b = s.insert(key("b"), shared(2u32), Permanence::Standard).unwrap();

        assert!(s.link_dependency(a, b));
        assert!(s.link_dependent(b, a));

        assert_eq!(s.snapshot(a).unwrap().dependencies, vec![b]);
        assert_eq!(s.snapshot(b).unwrap().dependents, vec![a]);
        assert_eq!(s.has_dependents(b), Some(true));

        assert!(s.unlink_dependency(a, b));
        assert!(s.unlink_dependent(b, a));
        assert!(s.snapshot(a).unwrap().dependencies.is_empty());
        assert_eq!(s.has_dependents(b), Some(false));
    }

    #[test]
    fn edge_half_on_missing_owner_is_ignored() {
        let s = store();
        let ghost = ObjectHandle::new(0, 5, 1);
        let b = s.insert(key("b"), shared(2u32), Permanence::Standard).unwrap();
        assert!(!s.link_dependency(ghost, b));
        assert!(!s.unlink_dependent(ghost, b));
    }

    // -----------------------------------------------------------------------
    // Enumeration and teardown selection
    // -----------------------------------------------------------------------

    #[test]
    fn handles_at_or_below_filters_by_permanence() {
        let s = store();
        let auto = s.insert(key("auto"), shared(0u8), Permanence::AutoDelete).unwrap();
        let std_ = s.insert(key("std"), shared(0u8), Permanence::Standard).unwrap();
        let strong = s.insert(key("strong"), shared(0u8), Permanence::Strong).unwrap();
        let perm = s.insert(key("perm"), shared(0u8), Permanence::Permanent).unwrap();

        let below_std = s.handles_at_or_below(Permanence::Standard);
        assert!(below_std.contains(&auto));
        assert!(below_std.contains(&std_));
        assert!(!below_std.contains(&strong));
        assert!(!below_std.contains(&perm));

        let below_strong = s.handles_at_or_below(Permanence::Strong);
        assert_eq!(below_strong.len(), 3);
        assert!(!below_strong.contains(&perm));
    }

    #[test]
    fn snapshots_cover_every_live_object() {
        let s = store();
        let a = s.insert(key("a"), shared(1u32), Permanence::Standard).unwrap();
        let b = s.insert(key("b"), shared(2u32), Permanence::Strong).unwrap();
        s.erase(a);

        let snaps = s.snapshots();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].handle, b);
        assert_eq!(s.live_handles(), vec![b]);
    }

    // -----------------------------------------------------------------------
    // Consistency checking
    // -----------------------------------------------------------------------

    #[test]
    fn consistency_holds_across_insert_erase_sequences() {
        let s = store();
        let mut handles = Vec::new();
        for i in 0..16 {
            handles.push(
                s.insert(key(&format!("k{i}")), shared(i), Permanence::Standard)
                    .unwrap(),
            );
        }
        for h in handles.iter().step_by(2) {
            s.erase(*h);
        }
        for i in 16..24 {
            s.insert(key(&format!("k{i}")), shared(i), Permanence::Standard)
                .unwrap();
        }
        s.verify_consistency().unwrap();
        assert_eq!(s.len(), 16);
    }

    #[test]
    fn debug_format() {
        let s = store();
        s.insert(key("x"), shared(0u8), Permanence::Standard).unwrap();
        let debug = format!("{s:?}");
        assert!(debug.contains("ShardStore"));
        assert!(debug.contains("object_count"));
    }
}
