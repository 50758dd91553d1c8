//! Error types for the object model.

use crate::{DKey, Oid};

/// Why an event could not be applied to its target object.
///
/// These are structural rejections: the event named a field the object
/// never declared, addressed the wrong field kind, or violated a
/// container's key rules. The object manager logs the error and drops the
/// event; nothing is dispatched to listeners.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApplyError {
    /// The object has no field with this name.
    #[error("no field named {0:?}")]
    UnknownField(String),

    /// The field exists but holds a different kind of container.
    #[error("field {name:?} is a {actual}, expected a {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// An array write landed outside the array.
    #[error("index {index} out of bounds for array field {name:?} of length {len}")]
    IndexOutOfBounds {
        name: String,
        index: usize,
        len: usize,
    },

    /// A set add reused a key that is already present.
    #[error("set field {name:?} already contains key {key:?}")]
    DuplicateKey { name: String, key: DKey },

    /// A set update or removal named a key that is not present.
    #[error("set field {name:?} has no entry with key {key:?}")]
    MissingKey { name: String, key: DKey },

    /// The target object has been destroyed; destruction is final.
    #[error("object {0} is destroyed")]
    Destroyed(Oid),
}
