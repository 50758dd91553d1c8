//! The invoker thread: blocking units and their result hand-off.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info};

use crate::config::RuntimeConfig;
use crate::manager::{ManagerContext, ManagerItem, ObjectManager};
use crate::panic_label;
use crate::report::{LoopReporter, LoopStats, Reporter};
use crate::shutdown::{SentinelStep, ShutdownSentinel};

/// A piece of blocking work.
///
/// `invoke` runs on the invoker thread and may block as long as it likes.
/// Returning true schedules `handle_result` on the manager thread, where
/// the unit can read and mutate objects directly.
pub trait Unit: Send {
    fn invoke(&mut self) -> bool;

    fn handle_result(&mut self, _ctx: &mut ManagerContext<'_>) {}

    /// Label used in logs and unit profiles.
    fn name(&self) -> &str {
        "unit"
    }
}

pub(crate) enum InvokerItem {
    Unit(Box<dyn Unit>),
    Shutdown(ShutdownSentinel),
    Halt,
}

/// Cheap-clone handle to the invoker thread.
#[derive(Clone)]
pub struct Invoker {
    tx: Sender<InvokerItem>,
    stats: Arc<Mutex<LoopStats>>,
    config: Arc<RuntimeConfig>,
}

impl Invoker {
    /// Spawns the invoker thread, wired to post unit results to `omgr`.
    pub fn spawn(omgr: ObjectManager) -> io::Result<(Self, JoinHandle<()>)> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let stats = Arc::new(Mutex::new(LoopStats::default()));
        let config = omgr.config();
        let core = InvokerCore {
            rx,
            tx: tx.clone(),
            omgr,
            stats: stats.clone(),
            config: config.clone(),
        };
        let join = thread::Builder::new()
            .name("omnibus.invoker".into())
            .spawn(move || core.run())?;
        Ok((Self { tx, stats, config }, join))
    }

    /// Queues a unit. Fire and forget; units posted after the thread has
    /// exited are dropped.
    pub fn post(&self, unit: impl Unit + 'static) {
        if self.tx.send(InvokerItem::Unit(Box::new(unit))).is_err() {
            debug!("invoker thread is gone; dropping unit");
        }
    }

    pub fn queue_is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn queue_len(&self) -> usize {
        self.tx.len()
    }

    /// Starts the quiescence protocol by queueing the shutdown sentinel
    /// behind everything already posted.
    pub fn shutdown(&self) {
        let sentinel = ShutdownSentinel::new(&self.config, self.tx.clone());
        if self.tx.send(InvokerItem::Shutdown(sentinel)).is_err() {
            debug!("invoker thread is gone; shutdown sentinel dropped");
        }
    }

    pub fn reporter(&self) -> Box<dyn Reporter> {
        let tx = self.tx.clone();
        Box::new(LoopReporter {
            label: "omnibus.invoker",
            queue_len: Box::new(move || tx.len()),
            stats: self.stats.clone(),
            unit_prof_enabled: self.config.unit_prof_enabled,
        })
    }
}

struct InvokerCore {
    rx: Receiver<InvokerItem>,
    tx: Sender<InvokerItem>,
    omgr: ObjectManager,
    stats: Arc<Mutex<LoopStats>>,
    config: Arc<RuntimeConfig>,
}

impl InvokerCore {
    fn run(mut self) {
        info!("invoker running");
        while let Ok(item) = self.rx.recv() {
            match item {
                InvokerItem::Halt => break,
                InvokerItem::Shutdown(mut sentinel) => {
                    match sentinel.invoker_step(self.rx.is_empty()) {
                        SentinelStep::Stay => {
                            let _ = self.tx.send(InvokerItem::Shutdown(sentinel));
                        }
                        SentinelStep::Pass => {
                            self.omgr.post_item(ManagerItem::Shutdown(sentinel));
                        }
                        SentinelStep::Force => {
                            self.omgr.harsh_shutdown();
                            break;
                        }
                    }
                }
                InvokerItem::Unit(unit) => self.run_unit(unit),
            }
        }
        info!("invoker stopped");
    }

    fn run_unit(&mut self, mut unit: Box<dyn Unit>) {
        let label = unit.name().to_owned();
        let start = Instant::now();
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .will_run(&label, self.rx.len(), start);

        let outcome = catch_unwind(AssertUnwindSafe(|| unit.invoke()));
        let elapsed = start.elapsed();

        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .did_run(&label, elapsed, self.config.perf_track);

        match outcome {
            Ok(true) => self.omgr.post_item(ManagerItem::UnitResult(unit)),
            Ok(false) => {}
            Err(panic) => {
                error!(
                    unit = %label,
                    panic = panic_label(panic.as_ref()),
                    "unit panicked on the invoker; continuing"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Unit for Noop {
        fn invoke(&mut self) -> bool {
            false
        }
    }

    #[test]
    fn test_unit_defaults() {
        let mut unit = Noop;
        assert!(!unit.invoke());
        assert_eq!(unit.name(), "unit");
    }
}
