//! Error types for the runtime layer.

use omnibus_object::Oid;

/// Why a subscribe request was refused.
///
/// Delivered to the subscribe callback on the manager thread — subscribe
/// failures never surface synchronously to the requesting thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    /// No object with this oid is registered. Also the answer for
    /// re-subscription after destroy: destroyed objects leave the
    /// registry and their oids are never reissued.
    #[error("no object with oid {0}")]
    NoSuchObject(Oid),

    /// The object exists but its destroyed flag is set.
    #[error("object {0} is destroyed")]
    ObjectDestroyed(Oid),

    /// The embedding system's access policy refused the subscriber.
    #[error("access denied to object {0}")]
    AccessDenied(Oid),
}
