//! Events: immutable descriptions of every distributed-object mutation.
//!
//! An event carries its target oid, a kind, and the kind-specific payload.
//! Events are values — they hold no listener state — and are totally
//! ordered by the moment they enter the object manager's queue.

use serde::{Deserialize, Serialize};

use crate::{ApplyError, DEntry, DKey, DObject, DValue, Oid};

/// One mutation of a distributed object.
///
/// `Message` events are transient: they are dispatched to listeners but
/// never modify the object. `ObjectCreated` and `ObjectDestroyed` bracket
/// the object's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DEvent {
    /// A scalar field took a new value.
    AttributeChanged {
        target: Oid,
        name: String,
        value: DValue,
    },

    /// One slot of an array field was overwritten.
    ElementUpdated {
        target: Oid,
        name: String,
        index: usize,
        value: DValue,
    },

    /// A keyed entry joined a set field.
    EntryAdded {
        target: Oid,
        name: String,
        entry: DEntry,
    },

    /// The entry with this key was replaced.
    EntryUpdated {
        target: Oid,
        name: String,
        entry: DEntry,
    },

    /// The entry with this key left the set field.
    EntryRemoved {
        target: Oid,
        name: String,
        key: DKey,
    },

    /// An oid joined an oid-list field.
    ObjectAdded {
        target: Oid,
        name: String,
        oid: Oid,
    },

    /// An oid left an oid-list field.
    ObjectRemoved {
        target: Oid,
        name: String,
        oid: Oid,
    },

    /// A transient broadcast; carries arguments but changes nothing.
    Message {
        target: Oid,
        name: String,
        args: Vec<DValue>,
    },

    /// The object was registered and assigned its oid.
    ObjectCreated { target: Oid },

    /// The object was destroyed. No later event for this oid takes effect.
    ObjectDestroyed { target: Oid },
}

impl DEvent {
    /// The oid of the object this event mutates.
    pub fn target(&self) -> Oid {
        match self {
            DEvent::AttributeChanged { target, .. }
            | DEvent::ElementUpdated { target, .. }
            | DEvent::EntryAdded { target, .. }
            | DEvent::EntryUpdated { target, .. }
            | DEvent::EntryRemoved { target, .. }
            | DEvent::ObjectAdded { target, .. }
            | DEvent::ObjectRemoved { target, .. }
            | DEvent::Message { target, .. }
            | DEvent::ObjectCreated { target }
            | DEvent::ObjectDestroyed { target } => *target,
        }
    }

    /// A short label for logs, reports, and profiling keys.
    pub fn kind(&self) -> &'static str {
        match self {
            DEvent::AttributeChanged { .. } => "attribute-changed",
            DEvent::ElementUpdated { .. } => "element-updated",
            DEvent::EntryAdded { .. } => "entry-added",
            DEvent::EntryUpdated { .. } => "entry-updated",
            DEvent::EntryRemoved { .. } => "entry-removed",
            DEvent::ObjectAdded { .. } => "object-added",
            DEvent::ObjectRemoved { .. } => "object-removed",
            DEvent::Message { .. } => "message",
            DEvent::ObjectCreated { .. } => "object-created",
            DEvent::ObjectDestroyed { .. } => "object-destroyed",
        }
    }

    /// Applies this event to its target object.
    ///
    /// Mutates exactly one field in a well-defined way. Returns `Ok(true)`
    /// when the event should be dispatched to listeners, `Ok(false)` when
    /// it was accepted but changed nothing (a duplicate oid-list add, a
    /// removal of an absent oid) and dispatch should be suppressed.
    ///
    /// The caller is responsible for the checks that need registry state:
    /// the destroyed-target rule and the dangling-reference rule for
    /// `ObjectAdded` live in the object manager, not here.
    pub fn apply(&self, object: &mut DObject) -> Result<bool, ApplyError> {
        match self {
            DEvent::AttributeChanged { name, value, .. } => {
                object.apply_set_scalar(name, value.clone())
            }
            DEvent::ElementUpdated {
                name, index, value, ..
            } => object.apply_set_element(name, *index, value.clone()),
            DEvent::EntryAdded { name, entry, .. } => {
                object.apply_add_entry(name, entry.clone())
            }
            DEvent::EntryUpdated { name, entry, .. } => {
                object.apply_update_entry(name, entry.clone())
            }
            DEvent::EntryRemoved { name, key, .. } => {
                object.apply_remove_entry(name, key)
            }
            DEvent::ObjectAdded { name, oid, .. } => object.apply_add_oid(name, *oid),
            DEvent::ObjectRemoved { name, oid, .. } => {
                object.apply_remove_oid(name, *oid)
            }
            // Transient: dispatched, never applied.
            DEvent::Message { .. } => Ok(true),
            DEvent::ObjectCreated { .. } => Ok(true),
            DEvent::ObjectDestroyed { .. } => {
                object.mark_destroyed();
                Ok(true)
            }
        }
    }
}
