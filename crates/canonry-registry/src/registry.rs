//! The shard registry and the consumer-facing lookup surface.
//!
//! A [`Registry`] is an explicitly constructed context, one per process or
//! one per test, owning one [`ShardStore`] per worker slot. There is no
//! global singleton and no reliance on static initialization order: the
//! registry lives exactly as long as the value does.
//!
//! The common case is shard-local: a worker registers and looks up
//! descriptors in its own shard without touching anyone else's guard.
//! Lookups that must see objects registered by any worker (objects created
//! inside a parallel region and consulted from outside it) fall back to a
//! linear scan over the other shards, bounded by the fixed worker count.

use std::any::Any;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::debug;

use canonry_store::{RecordSnapshot, ShardStore};
use canonry_types::{CanonicalKey, ObjectHandle, Permanence, SharedObject, WorkerId};

use crate::error::{RegistryError, RegistryResult};
use crate::observe::RegistryObserver;

/// How far a canonicalizing lookup may reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchScope {
    /// Only the caller's own shard. The cheap, common case.
    Local,
    /// The caller's shard first, then every other shard in index order.
    Global,
}

/// The sharded canonicalizing object registry.
///
/// Guarantees that two requests for a semantically identical descriptor
/// return the same stored object, and that objects are torn down safely by
/// the cascading [deletion engine](crate::Registry::delete_objects) once
/// nothing depends on them.
pub struct Registry {
    shards: Vec<ShardStore>,
    observer: Option<Arc<dyn RegistryObserver>>,
}

impl Registry {
    /// Upper bound on the worker count. Handles encode their shard in 16
    /// bits, so indices beyond this bound would alias.
    pub const MAX_WORKERS: usize = u16::MAX as usize + 1;

    /// Create a registry with one shard per worker. A worker count of zero
    /// is treated as one (there is always at least the calling thread), and
    /// counts beyond [`MAX_WORKERS`](Self::MAX_WORKERS) are clamped to it.
    pub fn new(workers: usize) -> Self {
        Self::build(workers, None)
    }

    /// Create a registry with an attached lifecycle observer.
    pub fn with_observer(workers: usize, observer: Arc<dyn RegistryObserver>) -> Self {
        Self::build(workers, Some(observer))
    }

    fn build(workers: usize, observer: Option<Arc<dyn RegistryObserver>>) -> Self {
        let count = workers.clamp(1, Self::MAX_WORKERS);
        let shards = (0..count).map(|i| ShardStore::new(WorkerId(i))).collect();
        Self { shards, observer }
    }

    /// The fixed number of workers (and shards).
    pub fn worker_count(&self) -> usize {
        self.shards.len()
    }

    /// The store for worker `worker`, or `None` if the index is outside
    /// the registry's worker set.
    pub fn store_for(&self, worker: WorkerId) -> Option<&ShardStore> {
        self.shards.get(worker.index())
    }

    fn local(&self, worker: WorkerId) -> RegistryResult<&ShardStore> {
        self.shards
            .get(worker.index())
            .ok_or(RegistryError::UnknownWorker {
                worker,
                count: self.shards.len(),
            })
    }

    fn owning_shard(&self, handle: ObjectHandle) -> Option<&ShardStore> {
        self.shards.get(handle.shard().index())
    }

    // ---------------------------------------------------------------
    // Canonicalization
    // ---------------------------------------------------------------

    /// Return the canonical object for `key`, registering `candidate` if no
    /// object with an equal key exists yet.
    ///
    /// The caller's own shard is searched first; other shards are consulted
    /// only when `scope` is [`SearchScope::Global`]. On a hit the candidate
    /// is discarded and the pre-existing object's handle is returned; on a
    /// miss the candidate becomes canonical in the caller's shard with the
    /// given permanence.
    pub fn get_or_create(
        &self,
        worker: WorkerId,
        key: CanonicalKey,
        candidate: SharedObject,
        permanence: Permanence,
        scope: SearchScope,
    ) -> RegistryResult<ObjectHandle> {
        let local = self.local(worker)?;
        if let Some(existing) = local.search(&key) {
            debug!(%existing, %key, "canonical hit, discarding candidate");
            return Ok(existing);
        }
        if scope == SearchScope::Global {
            if let Some(existing) = self.search_other_shards(worker, &key) {
                debug!(%existing, %key, "canonical hit on another shard, discarding candidate");
                return Ok(existing);
            }
        }
        let handle = local.insert(key.clone(), candidate, permanence)?;
        if let Some(observer) = &self.observer {
            observer.registered(handle, &key);
        }
        Ok(handle)
    }

    /// Look up `key` in the caller's own shard only.
    pub fn search(&self, worker: WorkerId, key: &CanonicalKey) -> Option<ObjectHandle> {
        self.shards.get(worker.index())?.search(key)
    }

    /// Look up `key` in the caller's shard first, then in every other
    /// shard in index order, stopping at the first hit.
    pub fn search_all(&self, worker: WorkerId, key: &CanonicalKey) -> Option<ObjectHandle> {
        self.search(worker, key)
            .or_else(|| self.search_other_shards(worker, key))
    }

    fn search_other_shards(&self, worker: WorkerId, key: &CanonicalKey) -> Option<ObjectHandle> {
        self.shards
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != worker.index())
            .find_map(|(_, shard)| shard.search(key))
    }

    // ---------------------------------------------------------------
    // Object lookups
    // ---------------------------------------------------------------

    /// Whether `handle` names a live stored object.
    pub fn exists(&self, handle: ObjectHandle) -> bool {
        self.owning_shard(handle)
            .is_some_and(|shard| shard.contains(handle))
    }

    /// The canonical key of a live object, looked up in its owning shard.
    pub fn key_of(&self, handle: ObjectHandle) -> Option<CanonicalKey> {
        self.owning_shard(handle)?.key_of(handle)
    }

    /// The canonical key of a live object, consulting only the caller's
    /// own shard. Misses when the object lives elsewhere.
    pub fn key_of_local(&self, worker: WorkerId, handle: ObjectHandle) -> Option<CanonicalKey> {
        self.shards.get(worker.index())?.key_of(handle)
    }

    /// The shared payload of a live object.
    pub fn resolve(&self, handle: ObjectHandle) -> Option<SharedObject> {
        self.owning_shard(handle)?.resolve(handle)
    }

    /// The shared payload of a live object, downcast to its concrete type.
    ///
    /// Returns `None` both when the object is not stored and when it is
    /// stored but is not a `T`.
    pub fn resolve_as<T: Any + Send + Sync>(&self, handle: ObjectHandle) -> Option<Arc<T>> {
        self.resolve(handle)?.as_any_arc().downcast::<T>().ok()
    }

    /// Point-in-time copy of an object's registration bookkeeping.
    pub fn snapshot(&self, handle: ObjectHandle) -> Option<RecordSnapshot> {
        self.owning_shard(handle)?.snapshot(handle)
    }

    // ---------------------------------------------------------------
    // Dependency graph maintenance
    // ---------------------------------------------------------------

    /// Record that `a` depends on `b`: `a` cannot remain valid once `b` is
    /// gone.
    ///
    /// Both endpoints must be registered, in possibly different shards; the
    /// edge's two halves are written into whichever shard owns each
    /// endpoint. The edge is rejected when it would close a cycle, so the
    /// graph stays a DAG by construction.
    pub fn add_dependency(&self, a: ObjectHandle, b: ObjectHandle) -> RegistryResult<()> {
        let shard_a = self
            .owning_shard(a)
            .filter(|shard| shard.contains(a))
            .ok_or(RegistryError::MissingEndpoint(a))?;
        let shard_b = self
            .owning_shard(b)
            .filter(|shard| shard.contains(b))
            .ok_or(RegistryError::MissingEndpoint(b))?;

        if a == b || self.depends_transitively(b, a) {
            return Err(RegistryError::CycleWouldForm { from: a, to: b });
        }

        if !shard_a.link_dependency(a, b) {
            return Err(RegistryError::MissingEndpoint(a));
        }
        if !shard_b.link_dependent(b, a) {
            // Roll the forward half back so the bookkeeping stays symmetric.
            shard_a.unlink_dependency(a, b);
            return Err(RegistryError::MissingEndpoint(b));
        }
        debug!(from = %a, to = %b, "added dependency edge");
        Ok(())
    }

    /// Remove the edge `a` depends on `b`.
    ///
    /// Returns whether `b` now has zero dependents; the deletion engine
    /// uses this to decide whether `b` became eligible for automatic
    /// removal. Removing an edge that was never recorded is a no-op as long
    /// as both endpoints are stored. Both endpoints are checked before
    /// either half is touched, so a failed call leaves the bookkeeping
    /// symmetric.
    pub fn del_dependency(&self, a: ObjectHandle, b: ObjectHandle) -> RegistryResult<bool> {
        let shard_a = self
            .owning_shard(a)
            .filter(|shard| shard.contains(a))
            .ok_or(RegistryError::MissingEndpoint(a))?;
        let shard_b = self
            .owning_shard(b)
            .filter(|shard| shard.contains(b))
            .ok_or(RegistryError::MissingEndpoint(b))?;
        shard_a.unlink_dependency(a, b);
        shard_b.unlink_dependent(b, a);
        let now_unreferenced = matches!(shard_b.has_dependents(b), Some(false));
        debug!(from = %a, to = %b, now_unreferenced, "removed dependency edge");
        Ok(now_unreferenced)
    }

    /// Handles the given object depends on.
    pub fn dependencies_of(&self, handle: ObjectHandle) -> Option<Vec<ObjectHandle>> {
        self.snapshot(handle).map(|snap| snap.dependencies)
    }

    /// Handles depending on the given object.
    pub fn dependents_of(&self, handle: ObjectHandle) -> Option<Vec<ObjectHandle>> {
        self.snapshot(handle).map(|snap| snap.dependents)
    }

    /// Whether `needle` is reachable from `start` along dependency edges.
    fn depends_transitively(&self, start: ObjectHandle, needle: ObjectHandle) -> bool {
        let mut stack = vec![start];
        let mut visited = std::collections::BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == needle {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(deps) = self.dependencies_of(current) {
                stack.extend(deps);
            }
        }
        false
    }

    // ---------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------

    /// Total number of live objects across all shards.
    pub fn count(&self) -> usize {
        self.shards.iter().map(ShardStore::len).sum()
    }

    /// Visit the bookkeeping of every live object, shard by shard in
    /// index order. Diagnostic enumeration, e.g. for leak reporting.
    pub fn for_each(&self, mut visitor: impl FnMut(&RecordSnapshot)) {
        for shard in &self.shards {
            for snap in shard.snapshots() {
                visitor(&snap);
            }
        }
    }

    /// Human-readable listing of everything still stored.
    pub fn leak_report(&self) -> String {
        if self.count() == 0 {
            return "no stored objects\n".to_string();
        }
        let mut report = String::new();
        for shard in &self.shards {
            let snaps = shard.snapshots();
            if snaps.is_empty() {
                continue;
            }
            let _ = writeln!(report, "shard {}: {} objects", shard.worker(), snaps.len());
            for snap in snaps {
                let _ = writeln!(
                    report,
                    "  {} {} ({}, {} dependents)",
                    snap.handle,
                    snap.key,
                    snap.permanence,
                    snap.dependents.len()
                );
            }
        }
        report
    }

    /// Check every shard's structural invariants, plus the cross-shard
    /// symmetry of the dependency bookkeeping.
    pub fn verify_consistency(&self) -> RegistryResult<()> {
        for shard in &self.shards {
            shard.verify_consistency()?;
        }
        let mut result = Ok(());
        self.for_each(|snap| {
            if result.is_err() {
                return;
            }
            for &dep in &snap.dependencies {
                let symmetric = self
                    .dependents_of(dep)
                    .is_some_and(|back| back.contains(&snap.handle));
                if !symmetric {
                    result = Err(RegistryError::MissingEndpoint(dep));
                }
            }
        });
        result
    }

    pub(crate) fn observer(&self) -> Option<&Arc<dyn RegistryObserver>> {
        self.observer.as_ref()
    }

    pub(crate) fn shards(&self) -> &[ShardStore] {
        &self.shards
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("worker_count", &self.worker_count())
            .field("object_count", &self.count())
            .finish()
    }
}
