//! Distributed object model for Omnibus.
//!
//! A distributed object (DO) is a named bundle of typed fields whose every
//! observable mutation is expressed as a [`DEvent`] and serialised through a
//! single object-manager thread. This crate defines the value model, the
//! events, the listener contract, and [`DObject`] itself; the thread that
//! owns the objects lives in `omnibus-runtime`.
//!
//! # Key types
//!
//! - [`Oid`] — process-unique identifier for a distributed object
//! - [`DValue`] / [`DKey`] / [`DEntry`] — the attribute value model
//! - [`DEvent`] — one variant per mutation kind, with apply-to-object
//!   semantics
//! - [`DObject`] — the mutable entity; mutations post events through an
//!   [`EventSink`]
//! - [`EventListener`] — receives every accepted event for a subscribed
//!   object

mod error;
mod event;
mod object;
mod oid;
mod value;

pub use error::ApplyError;
pub use event::DEvent;
pub use object::{DField, DObject, EventListener, EventSink};
pub use oid::{ListenerId, Oid};
pub use value::{DEntry, DKey, DValue};
