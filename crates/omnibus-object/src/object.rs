//! The distributed object itself.
//!
//! A `DObject` owns its fields and its listener list. Once registered it is
//! owned by exactly one object manager, and the manager's thread is the
//! only place a `&mut DObject` exists — the single-writer rule is enforced
//! by ownership, not by convention. External threads mutate through the
//! runtime's object handle, which posts events and never touches fields.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{ApplyError, DEntry, DEvent, DKey, DValue, ListenerId, Oid};

/// One declared field of a distributed object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DField {
    /// A single value.
    Scalar(DValue),
    /// A fixed-length sequence addressed by index.
    Array(Vec<DValue>),
    /// Keyed entries addressed by [`DKey`]; insertion ordered.
    Set(Vec<DEntry>),
    /// An ordered weak-reference list of oids. Never holds duplicates and
    /// never acquires a reference to a destroyed object.
    OidList(Vec<Oid>),
}

impl DField {
    /// A short label for kind-mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            DField::Scalar(_) => "scalar",
            DField::Array(_) => "array",
            DField::Set(_) => "set",
            DField::OidList(_) => "oid list",
        }
    }
}

/// Receives every accepted event for an object, in dispatch order.
///
/// Callbacks always run on the object-manager thread, one at a time, with
/// mutable access to the object — mutations made here are the optimistic
/// local-apply path.
pub trait EventListener: Send {
    fn event_received(&mut self, object: &mut DObject, event: &DEvent);
}

/// Where an object's mutation events go: the owning object manager.
///
/// `pre_applied` marks events whose effect was already applied locally on
/// the manager thread; the manager dispatches those without re-applying.
pub trait EventSink: Send + Sync {
    fn post(&self, event: DEvent, pre_applied: bool);
}

enum PendingOp {
    Add(ListenerId, Box<dyn EventListener>),
    Remove(ListenerId),
}

/// Listener bookkeeping with deferred mutation during dispatch.
///
/// A listener added while its object is dispatching joins the list after
/// the current event finishes and never sees the event in flight; a
/// removal likewise takes effect once the current event is fully
/// dispatched.
#[derive(Default)]
struct ListenerList {
    entries: Vec<(ListenerId, Box<dyn EventListener>)>,
    pending: Vec<PendingOp>,
    dispatching: bool,
}

impl ListenerList {
    fn add(&mut self, id: ListenerId, listener: Box<dyn EventListener>) {
        if self.dispatching {
            self.pending.push(PendingOp::Add(id, listener));
        } else {
            self.entries.push((id, listener));
        }
    }

    fn remove(&mut self, id: ListenerId) {
        if self.dispatching {
            self.pending.push(PendingOp::Remove(id));
        } else {
            self.entries.retain(|(lid, _)| *lid != id);
        }
    }

    fn start_dispatch(&mut self) -> Vec<(ListenerId, Box<dyn EventListener>)> {
        self.dispatching = true;
        std::mem::take(&mut self.entries)
    }

    fn finish_dispatch(&mut self, entries: Vec<(ListenerId, Box<dyn EventListener>)>) {
        self.entries = entries;
        self.dispatching = false;
        for op in self.pending.drain(..) {
            match op {
                PendingOp::Add(id, listener) => self.entries.push((id, listener)),
                PendingOp::Remove(id) => self.entries.retain(|(lid, _)| *lid != id),
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.pending.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A distributed object: a named bundle of declared fields.
///
/// Lifecycle: constructed, registered (oid assigned, `ObjectCreated`
/// dispatched), mutated through events, destroyed (`ObjectDestroyed`
/// dispatched, listeners dropped). Before registration there is no event
/// sink, so mutations apply directly and nothing is dispatched.
pub struct DObject {
    oid: Oid,
    name: String,
    fields: HashMap<String, DField>,
    destroyed: bool,
    listeners: ListenerList,
    sink: Option<Arc<dyn EventSink>>,
}

impl fmt::Debug for DObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DObject")
            .field("oid", &self.oid)
            .field("name", &self.name)
            .field("destroyed", &self.destroyed)
            .field("fields", &self.fields.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl DObject {
    pub fn new(name: impl Into<String>) -> Self {
        DObject {
            oid: Oid::UNSET,
            name: name.into(),
            fields: HashMap::new(),
            destroyed: false,
            listeners: ListenerList::default(),
            sink: None,
        }
    }

    /// Declares a scalar field with an initial value.
    pub fn with_scalar(mut self, name: impl Into<String>, initial: impl Into<DValue>) -> Self {
        self.fields
            .insert(name.into(), DField::Scalar(initial.into()));
        self
    }

    /// Declares an array field with its initial contents (the length is
    /// fixed thereafter).
    pub fn with_array(mut self, name: impl Into<String>, initial: Vec<DValue>) -> Self {
        self.fields.insert(name.into(), DField::Array(initial));
        self
    }

    /// Declares an empty set field.
    pub fn with_set(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), DField::Set(Vec::new()));
        self
    }

    /// Declares an empty oid-list field.
    pub fn with_oid_list(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), DField::OidList(Vec::new()));
        self
    }

    // -- accessors ----------------------------------------------------------

    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Destruction is final: once set, this never clears.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Whether the object has been registered with a manager.
    pub fn is_live(&self) -> bool {
        self.sink.is_some()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn scalar(&self, name: &str) -> Option<&DValue> {
        match self.fields.get(name) {
            Some(DField::Scalar(v)) => Some(v),
            _ => None,
        }
    }

    pub fn array(&self, name: &str) -> Option<&[DValue]> {
        match self.fields.get(name) {
            Some(DField::Array(v)) => Some(v),
            _ => None,
        }
    }

    pub fn entries(&self, name: &str) -> Option<&[DEntry]> {
        match self.fields.get(name) {
            Some(DField::Set(v)) => Some(v),
            _ => None,
        }
    }

    pub fn entry(&self, name: &str, key: &DKey) -> Option<&DEntry> {
        self.entries(name)?.iter().find(|e| e.key == *key)
    }

    pub fn oid_list(&self, name: &str) -> Option<&[Oid]> {
        match self.fields.get(name) {
            Some(DField::OidList(v)) => Some(v),
            _ => None,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // -- mutation API -------------------------------------------------------
    //
    // Each method builds the matching event. Scalar, array, and set
    // mutations apply locally before posting, so the caller observes the
    // post-state immediately. Oid-list mutations and destruction are only
    // posted: their acceptance depends on registry state that only the
    // manager loop may consult.

    pub fn set_field(
        &mut self,
        name: &str,
        value: impl Into<DValue>,
    ) -> Result<(), ApplyError> {
        self.apply_and_post(DEvent::AttributeChanged {
            target: self.oid,
            name: name.to_owned(),
            value: value.into(),
        })
    }

    pub fn update_element(
        &mut self,
        name: &str,
        index: usize,
        value: impl Into<DValue>,
    ) -> Result<(), ApplyError> {
        self.apply_and_post(DEvent::ElementUpdated {
            target: self.oid,
            name: name.to_owned(),
            index,
            value: value.into(),
        })
    }

    pub fn add_to_set(&mut self, name: &str, entry: DEntry) -> Result<(), ApplyError> {
        self.apply_and_post(DEvent::EntryAdded {
            target: self.oid,
            name: name.to_owned(),
            entry,
        })
    }

    pub fn update_set(&mut self, name: &str, entry: DEntry) -> Result<(), ApplyError> {
        self.apply_and_post(DEvent::EntryUpdated {
            target: self.oid,
            name: name.to_owned(),
            entry,
        })
    }

    pub fn remove_from_set(&mut self, name: &str, key: DKey) -> Result<(), ApplyError> {
        self.apply_and_post(DEvent::EntryRemoved {
            target: self.oid,
            name: name.to_owned(),
            key,
        })
    }

    pub fn add_to_list(&mut self, name: &str, oid: Oid) -> Result<(), ApplyError> {
        self.post_deferred(DEvent::ObjectAdded {
            target: self.oid,
            name: name.to_owned(),
            oid,
        })
    }

    pub fn remove_from_list(&mut self, name: &str, oid: Oid) -> Result<(), ApplyError> {
        self.post_deferred(DEvent::ObjectRemoved {
            target: self.oid,
            name: name.to_owned(),
            oid,
        })
    }

    /// Posts a transient message event; nothing is applied.
    pub fn post_message(&self, name: &str, args: Vec<DValue>) {
        if self.destroyed {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.post(
                DEvent::Message {
                    target: self.oid,
                    name: name.to_owned(),
                    args,
                },
                false,
            );
        }
    }

    /// Requests destruction. Idempotent; the manager dispatches
    /// `ObjectDestroyed` and unmaps the object.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        match &self.sink {
            Some(sink) => sink.post(DEvent::ObjectDestroyed { target: self.oid }, false),
            None => self.destroyed = true,
        }
    }

    /// Applies locally, then posts the event flagged as pre-applied.
    fn apply_and_post(&mut self, event: DEvent) -> Result<(), ApplyError> {
        if self.destroyed {
            return Err(ApplyError::Destroyed(self.oid));
        }
        event.apply(self)?;
        if let Some(sink) = &self.sink {
            sink.post(event, true);
        }
        Ok(())
    }

    /// Posts without applying; the manager loop validates and applies.
    /// Unregistered objects have no manager yet, so the event applies
    /// directly (duplicate adds are still no-ops).
    fn post_deferred(&mut self, event: DEvent) -> Result<(), ApplyError> {
        if self.destroyed {
            return Err(ApplyError::Destroyed(self.oid));
        }
        match &self.sink {
            Some(sink) => {
                sink.post(event, false);
                Ok(())
            }
            None => event.apply(self).map(|_| ()),
        }
    }

    // -- listeners ----------------------------------------------------------

    /// Registers a listener and returns the id that removes it.
    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) -> ListenerId {
        let id = ListenerId::next();
        self.add_listener_with_id(id, listener);
        id
    }

    /// Registers a listener under a pre-allocated id (used by subscribe
    /// requests, which hand the id to the caller up front).
    pub fn add_listener_with_id(&mut self, id: ListenerId, listener: Box<dyn EventListener>) {
        self.listeners.add(id, listener);
    }

    pub fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.remove(id);
    }

    // -- runtime integration ------------------------------------------------

    /// Stamps the oid assigned at registration. Runtime use only.
    pub fn assign_oid(&mut self, oid: Oid) {
        self.oid = oid;
    }

    /// Connects the object to its owning manager. Runtime use only.
    pub fn attach_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = Some(sink);
    }

    /// Drops every listener; called after `ObjectDestroyed` dispatch.
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Dispatches an accepted event to every listener in registration
    /// order. A panicking listener is logged and does not abort dispatch
    /// of the remaining listeners. Runtime use only.
    pub fn dispatch(&mut self, event: &DEvent) {
        let mut entries = self.listeners.start_dispatch();
        for (id, listener) in entries.iter_mut() {
            let outcome =
                catch_unwind(AssertUnwindSafe(|| listener.event_received(self, event)));
            if let Err(panic) = outcome {
                error!(
                    target_oid = %self.oid,
                    listener = %id,
                    kind = event.kind(),
                    panic = panic_label(panic.as_ref()),
                    "listener panicked; continuing dispatch"
                );
            }
        }
        self.listeners.finish_dispatch(entries);
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }

    // -- apply helpers (called from DEvent::apply) --------------------------

    fn field_mut(
        &mut self,
        name: &str,
        expected: &'static str,
    ) -> Result<&mut DField, ApplyError> {
        // Two-phase lookup keeps the borrow checker happy while still
        // reporting the actual kind on a mismatch.
        let actual = match self.fields.get(name) {
            Some(field) => field.kind(),
            None => return Err(ApplyError::UnknownField(name.to_owned())),
        };
        if actual != expected {
            return Err(ApplyError::WrongKind {
                name: name.to_owned(),
                expected,
                actual,
            });
        }
        Ok(self
            .fields
            .get_mut(name)
            .unwrap_or_else(|| unreachable!("field {name:?} vanished")))
    }

    pub(crate) fn apply_set_scalar(
        &mut self,
        name: &str,
        value: DValue,
    ) -> Result<bool, ApplyError> {
        match self.field_mut(name, "scalar")? {
            DField::Scalar(slot) => {
                *slot = value;
                Ok(true)
            }
            _ => unreachable!(),
        }
    }

    pub(crate) fn apply_set_element(
        &mut self,
        name: &str,
        index: usize,
        value: DValue,
    ) -> Result<bool, ApplyError> {
        match self.field_mut(name, "array")? {
            DField::Array(slots) => {
                let len = slots.len();
                match slots.get_mut(index) {
                    Some(slot) => {
                        *slot = value;
                        Ok(true)
                    }
                    None => Err(ApplyError::IndexOutOfBounds {
                        name: name.to_owned(),
                        index,
                        len,
                    }),
                }
            }
            _ => unreachable!(),
        }
    }

    pub(crate) fn apply_add_entry(
        &mut self,
        name: &str,
        entry: DEntry,
    ) -> Result<bool, ApplyError> {
        match self.field_mut(name, "set")? {
            DField::Set(entries) => {
                if entries.iter().any(|e| e.key == entry.key) {
                    return Err(ApplyError::DuplicateKey {
                        name: name.to_owned(),
                        key: entry.key,
                    });
                }
                entries.push(entry);
                Ok(true)
            }
            _ => unreachable!(),
        }
    }

    pub(crate) fn apply_update_entry(
        &mut self,
        name: &str,
        entry: DEntry,
    ) -> Result<bool, ApplyError> {
        match self.field_mut(name, "set")? {
            DField::Set(entries) => {
                match entries.iter_mut().find(|e| e.key == entry.key) {
                    Some(slot) => {
                        *slot = entry;
                        Ok(true)
                    }
                    None => Err(ApplyError::MissingKey {
                        name: name.to_owned(),
                        key: entry.key,
                    }),
                }
            }
            _ => unreachable!(),
        }
    }

    pub(crate) fn apply_remove_entry(
        &mut self,
        name: &str,
        key: &DKey,
    ) -> Result<bool, ApplyError> {
        match self.field_mut(name, "set")? {
            DField::Set(entries) => {
                match entries.iter().position(|e| e.key == *key) {
                    Some(at) => {
                        entries.remove(at);
                        Ok(true)
                    }
                    None => Err(ApplyError::MissingKey {
                        name: name.to_owned(),
                        key: key.clone(),
                    }),
                }
            }
            _ => unreachable!(),
        }
    }

    pub(crate) fn apply_add_oid(&mut self, name: &str, oid: Oid) -> Result<bool, ApplyError> {
        match self.field_mut(name, "oid list")? {
            DField::OidList(oids) => {
                if oids.contains(&oid) {
                    Ok(false)
                } else {
                    oids.push(oid);
                    Ok(true)
                }
            }
            _ => unreachable!(),
        }
    }

    pub(crate) fn apply_remove_oid(
        &mut self,
        name: &str,
        oid: Oid,
    ) -> Result<bool, ApplyError> {
        match self.field_mut(name, "oid list")? {
            DField::OidList(oids) => match oids.iter().position(|o| *o == oid) {
                Some(at) => {
                    oids.remove(at);
                    Ok(true)
                }
                None => Ok(false),
            },
            _ => unreachable!(),
        }
    }
}

fn panic_label(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
