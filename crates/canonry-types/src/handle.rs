use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identity of a worker thread, and equally of the shard it owns.
///
/// The registry is partitioned into one shard per worker; a `WorkerId` is an
/// index into that fixed, bounded partition.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct WorkerId(pub usize);

impl WorkerId {
    /// The shard index this worker owns.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Stable opaque address of a stored object.
///
/// A handle names the shard an object was registered in, the arena slot it
/// occupies there, and the generation of that slot. Generations make stale
/// handles harmless: once an object is erased its slot generation is bumped,
/// so a handle kept across a deletion resolves to "not found" instead of to
/// whatever object reuses the slot.
///
/// Handles replace pointer identity in the dependency sets, in the reverse
/// key index, and inside [`CanonicalKey`] sub-key references.
///
/// [`CanonicalKey`]: crate::key::CanonicalKey
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHandle {
    shard: u16,
    slot: u32,
    generation: u32,
}

impl ObjectHandle {
    /// Assemble a handle from its parts. Normally only the shard store
    /// creates handles; consumers treat them as opaque.
    pub fn new(shard: u16, slot: u32, generation: u32) -> Self {
        Self {
            shard,
            slot,
            generation,
        }
    }

    /// The shard (worker) this object was registered in.
    pub fn shard(self) -> WorkerId {
        WorkerId(self.shard as usize)
    }

    /// The arena slot within the owning shard.
    pub fn slot(self) -> u32 {
        self.slot
    }

    /// The generation of the arena slot at registration time.
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Compact `shard.slot.generation` form used in diagnostics.
    pub fn encode(self) -> String {
        format!("{}.{}.{}", self.shard, self.slot, self.generation)
    }

    /// Parse the compact form produced by [`encode`](Self::encode).
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(TypeError::InvalidFieldCount {
                expected: 3,
                actual: parts.len(),
            });
        }
        let field = |p: &str| -> Result<u64, TypeError> {
            p.parse::<u64>()
                .map_err(|_| TypeError::InvalidHandle(s.to_string()))
        };
        let shard = field(parts[0])?;
        let slot = field(parts[1])?;
        let generation = field(parts[2])?;
        if shard > u16::MAX as u64 || slot > u32::MAX as u64 || generation > u32::MAX as u64 {
            return Err(TypeError::InvalidHandle(s.to_string()));
        }
        Ok(Self::new(shard as u16, slot as u32, generation as u32))
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({})", self.encode())
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj:{}", self.encode())
    }
}
