use std::fmt;

use serde::{Deserialize, Serialize};

/// Eviction policy attached to every stored object at registration time.
///
/// Levels are totally ordered from least to most protected. The deletion
/// engine may only sweep *unreferenced* objects automatically when they are
/// [`AutoDelete`]; everything stronger survives until explicitly deleted,
/// and [`Permanent`] objects may never be deleted at all; forcing their
/// removal is a programming-invariant violation.
///
/// [`AutoDelete`]: Permanence::AutoDelete
/// [`Permanent`]: Permanence::Permanent
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permanence {
    /// Eligible for automatic removal once nothing depends on it.
    AutoDelete,
    /// Default level: kept until explicitly deleted.
    Standard,
    /// Like `Standard`, but survives bulk teardowns with a `Standard`
    /// threshold.
    Strong,
    /// May never be removed by the deletion engine.
    Permanent,
}

impl Permanence {
    /// Returns `true` if the opportunistic sweep may evict an unreferenced
    /// object at this level.
    pub fn auto_evictable(self) -> bool {
        matches!(self, Permanence::AutoDelete)
    }

    /// Clamp this level for use as a bulk-teardown threshold.
    ///
    /// `Permanent` is treated as a stronger synonym of `Strong`, so a
    /// teardown can never target truly permanent objects by accident.
    pub fn bulk_threshold(self) -> Self {
        match self {
            Permanence::Permanent => Permanence::Strong,
            other => other,
        }
    }
}

impl fmt::Display for Permanence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permanence::AutoDelete => write!(f, "AutoDelete"),
            Permanence::Standard => write!(f, "Standard"),
            Permanence::Strong => write!(f, "Strong"),
            Permanence::Permanent => write!(f, "Permanent"),
        }
    }
}
