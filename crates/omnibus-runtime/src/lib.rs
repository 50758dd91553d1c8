//! The Omnibus runtime: two long-lived threads and the machinery between
//! them.
//!
//! The [`ObjectManager`] thread owns every registered [`DObject`] and
//! serialises all mutations through one MPSC queue; the [`Invoker`] thread
//! runs blocking [`Unit`]s and posts their continuations back to the
//! manager. Shutdown is a ping-pong sentinel that drains both queues
//! before either thread exits.
//!
//! # Key types
//!
//! - [`ObjectManager`] — cheap-clone handle to the manager thread
//! - [`ObjectHandle`] — per-object handle for external mutation requests
//! - [`Invoker`] / [`Unit`] — background execution of blocking work
//! - [`ShutdownManager`] — registered shutdowners plus the quiescence
//!   protocol
//! - [`ReportManager`] / [`Reporter`] — periodic runtime snapshots
//! - [`RuntimeConfig`] — the recognised options, exhaustively
//!
//! [`DObject`]: omnibus_object::DObject

mod config;
mod error;
mod invoker;
mod manager;
mod report;
mod shutdown;

pub use config::{AccessPolicy, AllowAll, RuntimeConfig};
pub use error::SubscribeError;
pub use invoker::{Invoker, Unit};
pub use manager::{ManagerContext, ObjectHandle, ObjectManager, Runnable};
pub use report::{ReportManager, Reporter, UnitProfile};
pub use shutdown::ShutdownManager;

use std::any::Any;

/// Best-effort extraction of a panic payload for log messages.
pub(crate) fn panic_label(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
