//! Canonical descriptor keys.
//!
//! A [`CanonicalKey`] is the value-comparable answer to "what does this
//! stored object represent". Two independently constructed keys that compare
//! equal canonicalize to the same stored object, which is the whole point of
//! the registry: descriptors are deduplicated by meaning, not by address.
//!
//! Equality is deliberately *weaker* than identity. A key may reference
//! already-canonical sub-objects through their handles; since those handles
//! are themselves canonical, two distinct key instances built by two distinct
//! callers compare equal whenever they describe the same thing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::handle::ObjectHandle;

/// The closed set of descriptor categories the registry interns.
///
/// Keys of different kinds never compare equal, so each category is its own
/// namespace. `Opaque` is the escape hatch for consumers whose descriptors
/// fit none of the named categories.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum KeyKind {
    /// Geometric transformation descriptors.
    Transform,
    /// Mesh topology descriptors (reference elements, face structures).
    MeshTopology,
    /// Precomputed polynomial tables.
    PolynomialTable,
    /// Assembly-term descriptors for elementary computations.
    AssemblyTerm,
    /// Anything else a consumer wants interned.
    Opaque,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Transform => write!(f, "Transform"),
            KeyKind::MeshTopology => write!(f, "MeshTopology"),
            KeyKind::PolynomialTable => write!(f, "PolynomialTable"),
            KeyKind::AssemblyTerm => write!(f, "AssemblyTerm"),
            KeyKind::Opaque => write!(f, "Opaque"),
        }
    }
}

/// Immutable, totally ordered descriptor identity.
///
/// The derived `Ord` (kind, then tag, then params, then subkeys) is the
/// strict ordering the per-shard reverse index relies on for O(log n)
/// search; the derived `Eq` is the canonical-equality contract. Keys are
/// never mutated after registration.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CanonicalKey {
    kind: KeyKind,
    tag: String,
    params: Vec<i64>,
    subkeys: Vec<ObjectHandle>,
}

impl CanonicalKey {
    /// A key with no parameters and no sub-key references.
    pub fn new(kind: KeyKind, tag: impl Into<String>) -> Self {
        Self {
            kind,
            tag: tag.into(),
            params: Vec::new(),
            subkeys: Vec::new(),
        }
    }

    /// Attach integer parameters (degree, dimension, quadrature order, ...).
    pub fn with_params(mut self, params: impl Into<Vec<i64>>) -> Self {
        self.params = params.into();
        self
    }

    /// Attach references to canonical sub-objects this descriptor is
    /// composed from.
    pub fn with_subkeys(mut self, subkeys: impl Into<Vec<ObjectHandle>>) -> Self {
        self.subkeys = subkeys.into();
        self
    }

    /// The descriptor category.
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// The name of the descriptor within its category.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Integer parameters, in the order the consumer supplied them.
    pub fn params(&self) -> &[i64] {
        &self.params
    }

    /// Handles of the canonical sub-objects referenced by this key.
    pub fn subkeys(&self) -> &[ObjectHandle] {
        &self.subkeys
    }
}

impl fmt::Debug for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalKey({self})")
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.tag)?;
        if !self.params.is_empty() {
            write!(f, "{:?}", self.params)?;
        }
        for sub in &self.subkeys {
            write!(f, "+{}", sub.encode())?;
        }
        Ok(())
    }
}
