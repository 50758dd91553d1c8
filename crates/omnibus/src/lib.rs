//! # Omnibus
//!
//! A distributed object runtime for networked game services.
//!
//! Omnibus keeps shared game state in [`DObject`]s owned by a single
//! manager thread. Every mutation flows through that thread as an event,
//! is validated against the current state, and is then dispatched to the
//! object's listeners in a deterministic order. Blocking work (database
//! calls, file I/O) runs on a separate invoker thread as [`Unit`]s whose
//! results are handed back to the manager thread.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use omnibus::prelude::*;
//!
//! # fn main() -> Result<(), OmnibusError> {
//! let runtime = Runtime::launch(RuntimeConfig::default())?;
//! let oid = runtime
//!     .manager()
//!     .register(DObject::new("room").with_scalar("topic", "lobby"));
//! runtime.manager().handle(oid).set_field("topic", "strategy");
//! runtime.shutdown();
//! runtime.join().expect("runtime threads panicked");
//! # Ok(())
//! # }
//! ```
//!
//! [`DObject`]: omnibus_object::DObject
//! [`Unit`]: omnibus_runtime::Unit

mod error;
mod runtime;

pub use error::OmnibusError;
pub use runtime::Runtime;

pub use omnibus_object::{
    ApplyError, DEntry, DEvent, DKey, DObject, DValue, EventListener, ListenerId, Oid,
};
pub use omnibus_runtime::{
    AccessPolicy, AllowAll, Invoker, ManagerContext, ObjectHandle, ObjectManager, ReportManager,
    Reporter, Runnable, RuntimeConfig, ShutdownManager, SubscribeError, Unit,
};

/// Everything most embedders need, in one import.
pub mod prelude {
    pub use crate::{
        AccessPolicy, DEntry, DEvent, DKey, DObject, DValue, EventListener, ManagerContext,
        ObjectHandle, ObjectManager, Oid, OmnibusError, Runnable, Runtime, RuntimeConfig,
        SubscribeError, Unit,
    };
}
