//! The cascading deletion engine.
//!
//! Deletion is transitive in both directions. Removing an object forces the
//! removal of everything that depended on it (a dependent can never be
//! left referencing a removed object) and opportunistically removes
//! now-orphaned `AutoDelete` dependencies as cache cleanup. Stronger
//! permanence levels are exempt from the opportunistic sweep, and a
//! `Permanent` object may never be deleted at all.
//!
//! The algorithm runs in two clearly separated passes:
//!
//! 1. **Mark**: walk a growing worklist, flipping every reachable object's
//!    validity flag the moment it is scheduled. Because an object is only
//!    enqueued when it was still valid, each object is processed at most
//!    once and a concurrent cascade cannot double-schedule it.
//! 2. **Erase**: physically remove every marked object from its owning
//!    shard's tables.
//!
//! A cascade that would reach a `Permanent` object is rejected before the
//! mark pass runs, so a failed deletion request leaves no half-deleted
//! bookkeeping behind.
//!
//! In single-threaded use a missing object is a fatal invariant violation.
//! When multiple workers exist, "not found right now" during teardown is a
//! legitimate transient outcome: another worker may have erased the object
//! already. It is logged and tolerated instead.

use std::collections::{BTreeSet, VecDeque};

use tracing::warn;

use canonry_types::{ObjectHandle, Permanence};

use crate::error::{RegistryError, RegistryResult};
use crate::registry::Registry;

impl Registry {
    /// Delete one object and everything its removal invalidates.
    ///
    /// With `ignore_unstored`, a request naming an object that is not
    /// stored is a silent no-op; otherwise it is fatal (single-threaded)
    /// or logged (multi-worker teardown).
    pub fn delete_object(
        &self,
        handle: ObjectHandle,
        ignore_unstored: bool,
    ) -> RegistryResult<()> {
        self.delete_objects(vec![handle], ignore_unstored)
    }

    /// Delete a worklist of objects and the full transitive closure of
    /// objects their removal invalidates.
    ///
    /// A cascade that would reach a `Permanent` object is rejected before
    /// any validity flag or edge is touched, so a failed request leaves
    /// the registry as it was and the survivors stay deletable.
    pub fn delete_objects(
        &self,
        worklist: Vec<ObjectHandle>,
        ignore_unstored: bool,
    ) -> RegistryResult<()> {
        let tolerate_races = self.worker_count() > 1;

        // Resolve the explicit requests without mutating anything yet.
        let mut roots: Vec<ObjectHandle> = Vec::new();
        for handle in worklist {
            let Some(snap) = self.snapshot(handle) else {
                if ignore_unstored {
                    continue;
                }
                if tolerate_races {
                    warn!(%handle, "deletion requested for an object that is already not stored");
                    continue;
                }
                return Err(RegistryError::NotStored(handle));
            };
            if snap.permanence == Permanence::Permanent {
                return Err(RegistryError::PermanentDeletion {
                    handle,
                    key: snap.key,
                });
            }
            roots.push(handle);
        }
        self.check_no_permanent_dependents(&roots)?;

        // Schedule the requests. Invalidation happens before any traversal
        // so a concurrent cascade cannot schedule an object twice.
        let mut queue: VecDeque<ObjectHandle> = VecDeque::new();
        let mut marked: Vec<ObjectHandle> = Vec::new();
        for handle in roots {
            if self.invalidate(handle) == Some(true) {
                queue.push_back(handle);
                marked.push(handle);
            }
        }

        if let Err(err) = self.mark_cascade(&mut queue, &mut marked, tolerate_races) {
            // Flip the flags back so nothing is stranded half-deleted.
            for handle in &marked {
                self.revalidate(*handle);
            }
            return Err(err);
        }
        self.erase_marked(marked, tolerate_races)
    }

    /// Reject a worklist whose forward closure over dependents contains a
    /// `Permanent` object. Runs before the mark pass mutates anything.
    fn check_no_permanent_dependents(&self, roots: &[ObjectHandle]) -> RegistryResult<()> {
        let mut stack: Vec<ObjectHandle> = roots.to_vec();
        let mut visited = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for dependent in self.dependents_of(current).unwrap_or_default() {
                let Some(snap) = self.snapshot(dependent) else {
                    continue;
                };
                if snap.permanence == Permanence::Permanent {
                    return Err(RegistryError::PermanentDeletion {
                        handle: dependent,
                        key: snap.key,
                    });
                }
                stack.push(dependent);
            }
        }
        Ok(())
    }

    /// Mark pass: process the worklist until it is empty.
    fn mark_cascade(
        &self,
        queue: &mut VecDeque<ObjectHandle>,
        marked: &mut Vec<ObjectHandle>,
        tolerate_races: bool,
    ) -> RegistryResult<()> {
        while let Some(current) = queue.pop_front() {
            let Some(snap) = self.snapshot(current) else {
                if tolerate_races {
                    warn!(handle = %current, "scheduled object vanished mid-cascade");
                    continue;
                }
                return Err(RegistryError::NotStored(current));
            };

            // Unlink our dependencies; evict any that become unreferenced
            // and are AutoDelete.
            for dep in snap.dependencies {
                let now_unreferenced = match self.del_dependency(current, dep) {
                    Ok(flag) => flag,
                    Err(err) if tolerate_races => {
                        warn!(%err, "dependency edge vanished mid-cascade");
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                if !now_unreferenced {
                    continue;
                }
                let Some(dep_snap) = self.snapshot(dep) else {
                    continue;
                };
                if dep_snap.permanence.auto_evictable()
                    && dep_snap.valid
                    && self.invalidate(dep) == Some(true)
                {
                    queue.push_back(dep);
                    marked.push(dep);
                }
            }

            // Forward closure: everything that depended on `current` has
            // lost its footing and must go too.
            for dependent in snap.dependents {
                let Some(dep_snap) = self.snapshot(dependent) else {
                    continue;
                };
                if dep_snap.permanence == Permanence::Permanent {
                    return Err(RegistryError::PermanentDeletion {
                        handle: dependent,
                        key: dep_snap.key,
                    });
                }
                if dep_snap.valid && self.invalidate(dependent) == Some(true) {
                    queue.push_back(dependent);
                    marked.push(dependent);
                }
            }
        }
        Ok(())
    }

    /// Delete every live object whose permanence is at or below the given
    /// threshold, across all shards. Used for full-registry teardown.
    ///
    /// A `Permanent` threshold is clamped down to `Strong`, so a teardown
    /// can never target truly permanent objects by accident.
    pub fn delete_all_at_or_below(&self, permanence: Permanence) -> RegistryResult<()> {
        let threshold = permanence.bulk_threshold();
        let mut worklist = Vec::new();
        for shard in self.shards() {
            worklist.extend(shard.handles_at_or_below(threshold));
        }
        self.delete_objects(worklist, false)
    }

    /// Erase pass: physically remove every marked object from its owning
    /// shard's tables.
    fn erase_marked(
        &self,
        marked: Vec<ObjectHandle>,
        tolerate_races: bool,
    ) -> RegistryResult<()> {
        for handle in marked {
            let erased = self
                .store_for(handle.shard())
                .and_then(|shard| shard.erase(handle));
            match erased {
                Some(key) => {
                    if let Some(observer) = self.observer() {
                        observer.erased(handle, &key);
                    }
                }
                None if tolerate_races => {
                    warn!(%handle, "marked object was already erased by another worker");
                }
                None => return Err(RegistryError::NotStored(handle)),
            }
        }
        Ok(())
    }

    fn invalidate(&self, handle: ObjectHandle) -> Option<bool> {
        self.store_for(handle.shard())?.invalidate(handle)
    }

    fn revalidate(&self, handle: ObjectHandle) {
        if let Some(shard) = self.store_for(handle.shard()) {
            shard.revalidate(handle);
        }
    }
}
