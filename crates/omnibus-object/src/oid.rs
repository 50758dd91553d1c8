//! Identity types for distributed objects and their listeners.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counter for listener ids. Listener identity only has to be unique within
/// the process, so one shared counter covers every object.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique identifier for a distributed object.
///
/// Oids are assigned by the object manager at registration, strictly
/// increasing and never reissued — not even after the object is destroyed.
/// Zero and negative values mean "not yet assigned".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Oid(pub i32);

impl Oid {
    /// The sentinel carried by objects that have not been registered yet.
    pub const UNSET: Oid = Oid(0);

    /// Whether this oid has been assigned by an object manager.
    pub fn is_assigned(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O-{}", self.0)
    }
}

/// Identifies one registered listener so it can be removed later.
///
/// Allocated up front by [`ListenerId::next`], which lets a subscribe
/// request hand the id back to the caller before the object manager has
/// processed the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(pub u64);

impl ListenerId {
    /// Allocates a fresh listener id.
    pub fn next() -> Self {
        ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_oid_is_not_assigned() {
        assert!(!Oid::UNSET.is_assigned());
        assert!(!Oid(-3).is_assigned());
        assert!(Oid(1).is_assigned());
    }

    #[test]
    fn test_listener_ids_are_unique() {
        let a = ListenerId::next();
        let b = ListenerId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_oid_serializes_transparently() {
        let json = serde_json::to_string(&Oid(42)).unwrap();
        assert_eq!(json, "42");
    }
}
