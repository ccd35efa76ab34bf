//! Type-erased stored payloads.
//!
//! The registry never interprets what it stores. A payload is anything
//! `'static + Send + Sync`; consumers get it back as a [`SharedObject`] and
//! downcast through [`StoredObject::as_any`] when they need the concrete
//! type. Payloads are immutable by convention: the registry hands out
//! shared references only, and a canonical object may be visible to many
//! consumers at once.

use std::any::Any;
use std::sync::Arc;

/// Marker trait for registry payloads, with an explicit downcast seam.
///
/// Blanket-implemented for every `'static + Send + Sync` type, so consumers
/// never implement it by hand.
pub trait StoredObject: Any + Send + Sync {
    /// The payload as `Any`, for downcasting to the concrete descriptor
    /// type.
    fn as_any(&self) -> &(dyn Any + Send + Sync);

    /// The payload as a shared `Any`, for downcasting without giving up
    /// shared ownership.
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> StoredObject for T {
    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A shared, immutable, type-erased stored payload.
pub type SharedObject = Arc<dyn StoredObject>;

/// Wrap a concrete payload for registration.
pub fn shared<T: Any + Send + Sync>(value: T) -> SharedObject {
    Arc::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct PolyTable {
        degree: u32,
        coeffs: Vec<f64>,
    }

    #[test]
    fn downcast_recovers_concrete_type() {
        let obj = shared(PolyTable {
            degree: 3,
            coeffs: vec![1.0, 0.0, -0.5],
        });
        let table = obj
            .as_any()
            .downcast_ref::<PolyTable>()
            .expect("should downcast");
        assert_eq!(table.degree, 3);
        assert_eq!(table.coeffs.len(), 3);
    }

    #[test]
    fn downcast_to_wrong_type_is_none() {
        let obj = shared(PolyTable {
            degree: 1,
            coeffs: vec![],
        });
        assert!(obj.as_any().downcast_ref::<String>().is_none());
    }

    #[test]
    fn clones_share_the_same_payload() {
        let obj = shared(42u64);
        let other = Arc::clone(&obj);
        assert!(Arc::ptr_eq(&obj, &other));
    }

    #[test]
    fn arc_downcast_preserves_sharing() {
        let obj = shared(PolyTable {
            degree: 2,
            coeffs: vec![1.0],
        });
        let typed = Arc::clone(&obj)
            .as_any_arc()
            .downcast::<PolyTable>()
            .expect("should downcast");
        assert_eq!(typed.degree, 2);
    }
}
