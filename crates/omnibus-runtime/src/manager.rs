//! The object manager thread: the single writer for every registered
//! object.
//!
//! All mutation flows through one MPSC queue into the manager loop, which
//! validates each event against the current registry state, applies it,
//! and dispatches it to listeners. External threads hold [`ObjectManager`]
//! or [`ObjectHandle`] clones and only ever post.

use std::collections::HashMap;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use omnibus_object::{
    DEntry, DEvent, DKey, DObject, DValue, EventListener, EventSink, ListenerId, Oid,
};

use crate::config::{AccessPolicy, AllowAll, RuntimeConfig};
use crate::error::SubscribeError;
use crate::invoker::Unit;
use crate::panic_label;
use crate::report::{LoopReporter, LoopStats, Reporter};
use crate::shutdown::{SentinelStep, ShutdownSentinel};

/// A closure-shaped task that runs on the manager thread with direct
/// registry access.
pub trait Runnable: Send {
    fn run(self: Box<Self>, ctx: &mut ManagerContext<'_>);
}

impl<F> Runnable for F
where
    F: for<'a> FnOnce(&mut ManagerContext<'a>) + Send,
{
    fn run(self: Box<Self>, ctx: &mut ManagerContext<'_>) {
        (*self)(ctx)
    }
}

type SubscribeCallback = Box<dyn FnOnce(Result<ObjectHandle, SubscribeError>) + Send>;

pub(crate) enum ManagerItem {
    Event {
        event: DEvent,
        pre_applied: bool,
    },
    Runnable(Box<dyn Runnable>),
    Register {
        object: DObject,
    },
    Subscribe {
        oid: Oid,
        id: ListenerId,
        listener: Box<dyn EventListener>,
        on_result: SubscribeCallback,
    },
    Unsubscribe {
        oid: Oid,
        id: ListenerId,
    },
    UnitResult(Box<dyn Unit>),
    Shutdown(ShutdownSentinel),
}

fn item_label(item: &ManagerItem) -> String {
    match item {
        ManagerItem::Event { event, .. } => event.kind().to_owned(),
        ManagerItem::Runnable(_) => "runnable".to_owned(),
        ManagerItem::Register { .. } => "register".to_owned(),
        ManagerItem::Subscribe { .. } => "subscribe".to_owned(),
        ManagerItem::Unsubscribe { .. } => "unsubscribe".to_owned(),
        ManagerItem::UnitResult(unit) => unit.name().to_owned(),
        ManagerItem::Shutdown(_) => "shutdown".to_owned(),
    }
}

/// Cheap-clone handle to the manager thread.
#[derive(Clone)]
pub struct ObjectManager {
    tx: Sender<ManagerItem>,
    next_oid: Arc<AtomicI32>,
    harsh: Arc<AtomicBool>,
    stats: Arc<Mutex<LoopStats>>,
    config: Arc<RuntimeConfig>,
}

impl ObjectManager {
    /// Spawns the manager thread with the default allow-all policy.
    pub fn spawn(config: RuntimeConfig) -> io::Result<(Self, JoinHandle<()>)> {
        Self::spawn_with_policy(config, Box::new(AllowAll))
    }

    /// Spawns the manager thread with a custom subscribe policy.
    pub fn spawn_with_policy(
        config: RuntimeConfig,
        policy: Box<dyn AccessPolicy>,
    ) -> io::Result<(Self, JoinHandle<()>)> {
        let config = Arc::new(config.validated());
        let (tx, rx) = crossbeam_channel::unbounded();
        let stats = Arc::new(Mutex::new(LoopStats::default()));
        let manager = Self {
            tx,
            next_oid: Arc::new(AtomicI32::new(0)),
            harsh: Arc::new(AtomicBool::new(false)),
            stats: stats.clone(),
            config: config.clone(),
        };
        let handle = manager.clone();
        let join = thread::Builder::new()
            .name("omnibus.manager".into())
            .spawn(move || {
                let sink: Arc<dyn EventSink> = Arc::new(handle.clone());
                ManagerCore {
                    rx,
                    handle,
                    sink,
                    registry: HashMap::new(),
                    policy,
                    config,
                    stats,
                }
                .run();
            })?;
        Ok((manager, join))
    }

    /// Assigns the next oid and queues the object for registration. The
    /// oid is live immediately: events posted against it before the
    /// registration item is processed are ordered behind it.
    pub fn register(&self, mut object: DObject) -> Oid {
        if object.oid().is_assigned() {
            warn!(oid = %object.oid(), name = object.name(), "object already registered; ignoring");
            return object.oid();
        }
        let oid = Oid(self.next_oid.fetch_add(1, Ordering::SeqCst) + 1);
        object.assign_oid(oid);
        self.send(ManagerItem::Register { object });
        oid
    }

    /// Queues destruction. The object leaves the registry after the
    /// `ObjectDestroyed` event dispatches; its oid is never reissued.
    pub fn destroy(&self, oid: Oid) {
        self.post_event(DEvent::ObjectDestroyed { target: oid });
    }

    pub fn post_event(&self, event: DEvent) {
        self.send(ManagerItem::Event {
            event,
            pre_applied: false,
        });
    }

    pub fn post_runnable(&self, runnable: impl Runnable + 'static) {
        self.send(ManagerItem::Runnable(Box::new(runnable)));
    }

    /// Queues a subscribe request. The listener id is allocated up front
    /// so the caller can unsubscribe later; the outcome is delivered to
    /// `on_result` on the manager thread.
    pub fn subscribe(
        &self,
        oid: Oid,
        listener: Box<dyn EventListener>,
        on_result: impl FnOnce(Result<ObjectHandle, SubscribeError>) + Send + 'static,
    ) -> ListenerId {
        let id = ListenerId::next();
        self.send(ManagerItem::Subscribe {
            oid,
            id,
            listener,
            on_result: Box::new(on_result),
        });
        id
    }

    pub fn unsubscribe(&self, oid: Oid, id: ListenerId) {
        self.send(ManagerItem::Unsubscribe { oid, id });
    }

    /// Returns a mutation handle for `oid`. Handles are not validated;
    /// events posted against a dead oid are dropped with a warning.
    pub fn handle(&self, oid: Oid) -> ObjectHandle {
        ObjectHandle {
            oid,
            manager: self.clone(),
        }
    }

    pub fn queue_is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn queue_len(&self) -> usize {
        self.tx.len()
    }

    /// Flags the loop to exit after the item it is on and posts a wake-up
    /// in case the queue is empty.
    pub fn harsh_shutdown(&self) {
        self.harsh.store(true, Ordering::SeqCst);
        self.post_runnable(|_: &mut ManagerContext<'_>| {});
    }

    pub fn reporter(&self) -> Box<dyn Reporter> {
        let tx = self.tx.clone();
        Box::new(LoopReporter {
            label: "omnibus.manager",
            queue_len: Box::new(move || tx.len()),
            stats: self.stats.clone(),
            unit_prof_enabled: self.config.unit_prof_enabled,
        })
    }

    pub(crate) fn config(&self) -> Arc<RuntimeConfig> {
        self.config.clone()
    }

    pub(crate) fn post_item(&self, item: ManagerItem) {
        self.send(item);
    }

    fn send(&self, item: ManagerItem) {
        if self.tx.send(item).is_err() {
            debug!("manager thread is gone; dropping item");
        }
    }
}

impl EventSink for ObjectManager {
    fn post(&self, event: DEvent, pre_applied: bool) {
        self.send(ManagerItem::Event { event, pre_applied });
    }
}

/// Mutation requests against one object from outside the manager thread.
///
/// Every method posts an event and returns immediately; validation
/// happens on the manager thread, where a rejected event is logged and
/// dropped.
#[derive(Clone)]
pub struct ObjectHandle {
    oid: Oid,
    manager: ObjectManager,
}

impl ObjectHandle {
    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn set_field(&self, name: &str, value: impl Into<DValue>) {
        self.manager.post_event(DEvent::AttributeChanged {
            target: self.oid,
            name: name.to_owned(),
            value: value.into(),
        });
    }

    pub fn update_element(&self, name: &str, index: usize, value: impl Into<DValue>) {
        self.manager.post_event(DEvent::ElementUpdated {
            target: self.oid,
            name: name.to_owned(),
            index,
            value: value.into(),
        });
    }

    pub fn add_to_set(&self, name: &str, entry: DEntry) {
        self.manager.post_event(DEvent::EntryAdded {
            target: self.oid,
            name: name.to_owned(),
            entry,
        });
    }

    pub fn update_set(&self, name: &str, entry: DEntry) {
        self.manager.post_event(DEvent::EntryUpdated {
            target: self.oid,
            name: name.to_owned(),
            entry,
        });
    }

    pub fn remove_from_set(&self, name: &str, key: impl Into<DKey>) {
        self.manager.post_event(DEvent::EntryRemoved {
            target: self.oid,
            name: name.to_owned(),
            key: key.into(),
        });
    }

    pub fn add_to_list(&self, name: &str, oid: Oid) {
        self.manager.post_event(DEvent::ObjectAdded {
            target: self.oid,
            name: name.to_owned(),
            oid,
        });
    }

    pub fn remove_from_list(&self, name: &str, oid: Oid) {
        self.manager.post_event(DEvent::ObjectRemoved {
            target: self.oid,
            name: name.to_owned(),
            oid,
        });
    }

    pub fn post_message(&self, name: &str, args: Vec<DValue>) {
        self.manager.post_event(DEvent::Message {
            target: self.oid,
            name: name.to_owned(),
            args,
        });
    }

    pub fn destroy(&self) {
        self.manager.destroy(self.oid);
    }

    pub fn subscribe(
        &self,
        listener: Box<dyn EventListener>,
        on_result: impl FnOnce(Result<ObjectHandle, SubscribeError>) + Send + 'static,
    ) -> ListenerId {
        self.manager.subscribe(self.oid, listener, on_result)
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.manager.unsubscribe(self.oid, id);
    }
}

/// Direct registry access, handed to [`Runnable`]s and unit result
/// handlers on the manager thread.
pub struct ManagerContext<'a> {
    registry: &'a mut HashMap<Oid, DObject>,
    manager: &'a ObjectManager,
}

impl ManagerContext<'_> {
    pub fn object(&self, oid: Oid) -> Option<&DObject> {
        self.registry.get(&oid)
    }

    /// Mutable access to a registered object. Mutations made here apply
    /// immediately and post pre-applied events for listener dispatch.
    pub fn object_mut(&mut self, oid: Oid) -> Option<&mut DObject> {
        self.registry.get_mut(&oid)
    }

    pub fn manager(&self) -> &ObjectManager {
        self.manager
    }

    /// Queues a registration; the object is mapped after the current item
    /// finishes.
    pub fn register(&self, object: DObject) -> Oid {
        self.manager.register(object)
    }

    pub fn destroy(&self, oid: Oid) {
        self.manager.destroy(oid);
    }

    pub fn post_event(&self, event: DEvent) {
        self.manager.post_event(event);
    }

    pub fn post_runnable(&self, runnable: impl Runnable + 'static) {
        self.manager.post_runnable(runnable);
    }
}

struct ManagerCore {
    rx: Receiver<ManagerItem>,
    handle: ObjectManager,
    sink: Arc<dyn EventSink>,
    registry: HashMap<Oid, DObject>,
    policy: Box<dyn AccessPolicy>,
    config: Arc<RuntimeConfig>,
    stats: Arc<Mutex<LoopStats>>,
}

impl ManagerCore {
    fn run(mut self) {
        info!("object manager running");
        while let Ok(item) = self.rx.recv() {
            let label = item_label(&item);
            let start = Instant::now();
            self.stats
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .will_run(&label, self.rx.len(), start);

            self.process(item);

            self.stats
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .did_run(&label, start.elapsed(), self.config.perf_track);

            if self.handle.harsh.load(Ordering::SeqCst) {
                break;
            }
        }
        info!(objects = self.registry.len(), "object manager stopped");
    }

    fn process(&mut self, item: ManagerItem) {
        match item {
            ManagerItem::Event { event, pre_applied } => self.dispatch_event(event, pre_applied),
            ManagerItem::Runnable(runnable) => {
                let mut ctx = ManagerContext {
                    registry: &mut self.registry,
                    manager: &self.handle,
                };
                let outcome = catch_unwind(AssertUnwindSafe(|| runnable.run(&mut ctx)));
                if let Err(panic) = outcome {
                    error!(
                        panic = panic_label(panic.as_ref()),
                        "runnable panicked on the manager; continuing"
                    );
                }
            }
            ManagerItem::UnitResult(mut unit) => {
                let mut ctx = ManagerContext {
                    registry: &mut self.registry,
                    manager: &self.handle,
                };
                let outcome = catch_unwind(AssertUnwindSafe(|| unit.handle_result(&mut ctx)));
                if let Err(panic) = outcome {
                    error!(
                        unit = unit.name(),
                        panic = panic_label(panic.as_ref()),
                        "unit result handler panicked; continuing"
                    );
                }
            }
            ManagerItem::Register { object } => self.do_register(object),
            ManagerItem::Subscribe {
                oid,
                id,
                listener,
                on_result,
            } => self.do_subscribe(oid, id, listener, on_result),
            ManagerItem::Unsubscribe { oid, id } => {
                if let Some(object) = self.registry.get_mut(&oid) {
                    object.remove_listener(id);
                }
            }
            ManagerItem::Shutdown(mut sentinel) => {
                match sentinel.manager_step(self.rx.is_empty()) {
                    SentinelStep::Stay => {
                        self.handle.post_item(ManagerItem::Shutdown(sentinel));
                    }
                    SentinelStep::Pass => sentinel.send_to_invoker(),
                    SentinelStep::Force => {
                        sentinel.halt_invoker();
                        self.handle.harsh_shutdown();
                    }
                }
            }
        }
    }

    fn do_register(&mut self, mut object: DObject) {
        let oid = object.oid();
        // An object destroyed before registration would sit in the
        // registry forever: no ObjectDestroyed ever dispatches for it.
        if object.is_destroyed() {
            warn!(%oid, name = object.name(), "refusing to register a destroyed object");
            return;
        }
        if self.registry.contains_key(&oid) {
            error!(%oid, "oid already mapped; dropping registration");
            return;
        }
        object.attach_sink(self.sink.clone());
        debug!(%oid, name = object.name(), "object registered");
        self.registry.insert(oid, object);
        self.dispatch_event(DEvent::ObjectCreated { target: oid }, true);
    }

    fn do_subscribe(
        &mut self,
        oid: Oid,
        id: ListenerId,
        listener: Box<dyn EventListener>,
        on_result: SubscribeCallback,
    ) {
        let result = match self.registry.get_mut(&oid) {
            None => Err(SubscribeError::NoSuchObject(oid)),
            Some(object) if object.is_destroyed() => Err(SubscribeError::ObjectDestroyed(oid)),
            Some(object) => {
                if self.policy.allow_subscribe(object) {
                    object.add_listener_with_id(id, listener);
                    Ok(self.handle.handle(oid))
                } else {
                    Err(SubscribeError::AccessDenied(oid))
                }
            }
        };
        if let Err(err) = &result {
            warn!(%oid, %err, "subscribe refused");
        }
        on_result(result);
    }

    /// Validates, applies, and dispatches one event.
    ///
    /// The target is checked out of the registry for the duration so that
    /// listeners can hold `&mut DObject` while runnables queued by them
    /// still see a consistent registry.
    fn dispatch_event(&mut self, event: DEvent, pre_applied: bool) {
        let target = event.target();
        let Some(mut object) = self.registry.remove(&target) else {
            warn!(%target, kind = event.kind(), "event for unmapped object; dropping");
            return;
        };

        if object.is_destroyed() && !matches!(event, DEvent::ObjectDestroyed { .. }) {
            warn!(%target, kind = event.kind(), "event for destroyed object; dropping");
            self.registry.insert(target, object);
            return;
        }

        // Oid-list integrity needs registry state, so it lives here rather
        // than in the apply. The target itself counts as live while it is
        // checked out.
        if let DEvent::ObjectAdded { name, oid, .. } = &event {
            let live =
                *oid == target || self.registry.get(oid).is_some_and(|o| !o.is_destroyed());
            if !live {
                warn!(
                    %target,
                    field = %name,
                    referenced = %oid,
                    "refusing dangling oid-list reference"
                );
                self.registry.insert(target, object);
                return;
            }
            if object.oid_list(name).is_some_and(|list| list.contains(oid)) {
                info!(%target, field = %name, referenced = %oid, "oid already in list; ignoring");
                self.registry.insert(target, object);
                return;
            }
        }

        if !pre_applied {
            match event.apply(&mut object) {
                Ok(true) => {}
                Ok(false) => {
                    self.registry.insert(target, object);
                    return;
                }
                Err(err) => {
                    warn!(%target, kind = event.kind(), %err, "event failed to apply; dropping");
                    self.registry.insert(target, object);
                    return;
                }
            }
        }

        object.dispatch(&event);

        if matches!(event, DEvent::ObjectDestroyed { .. }) {
            object.clear_listeners();
            debug!(%target, "object destroyed and unmapped");
        } else {
            self.registry.insert(target, object);
        }
    }
}
