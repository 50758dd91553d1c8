//! Shutdown coordination.
//!
//! Both the manager queue and the invoker queue must drain before either
//! thread exits, but work on one can produce work for the other, so the
//! sentinel ping-pongs between the threads until it finds both queues
//! empty — or gives up after bounded retries and forces the exit.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::invoker::InvokerItem;

/// Runs registered shutdowners exactly once, in registration order.
///
/// The runtime registers a shutdowner that posts the quiescence sentinel;
/// embedding systems may register their own cleanup alongside it.
pub struct ShutdownManager {
    shutdowners: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    begun: AtomicBool,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            shutdowners: Mutex::new(Vec::new()),
            begun: AtomicBool::new(false),
        }
    }

    pub fn register_shutdowner(&self, shutdowner: impl FnOnce() + Send + 'static) {
        self.shutdowners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Box::new(shutdowner));
    }

    /// Begins shutdown. Later calls are ignored.
    pub fn begin(&self) {
        if self.begun.swap(true, Ordering::SeqCst) {
            debug!("shutdown already begun; ignoring");
            return;
        }
        info!("shutdown requested");
        let shutdowners: Vec<_> = self
            .shutdowners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain(..)
            .collect();
        for shutdowner in shutdowners {
            shutdowner();
        }
    }

    /// Whether `begin` has been called.
    pub fn has_begun(&self) -> bool {
        self.begun.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// What a sentinel step decided.
pub(crate) enum SentinelStep {
    /// Re-queue on the current thread; its queue still has work.
    Stay,
    /// Hand the sentinel to the other thread.
    Pass,
    /// Give up and force both threads down.
    Force,
}

/// The ping-pong sentinel that drains both queues.
///
/// `loop_count` counts consecutive re-queues on the same thread;
/// `pass_count` counts crossings from the invoker to the manager. Only the
/// invoker-side hop increments the pass count.
pub(crate) struct ShutdownSentinel {
    loop_count: u32,
    pass_count: u32,
    max_loops: u32,
    max_passes: u32,
    invoker_tx: Sender<InvokerItem>,
}

impl ShutdownSentinel {
    pub(crate) fn new(config: &RuntimeConfig, invoker_tx: Sender<InvokerItem>) -> Self {
        Self {
            loop_count: 0,
            pass_count: 0,
            max_loops: config.shutdown_max_loops,
            max_passes: config.shutdown_max_passes,
            invoker_tx,
        }
    }

    /// One step on the invoker thread.
    pub(crate) fn invoker_step(&mut self, queue_empty: bool) -> SentinelStep {
        if self.loop_count > self.max_loops {
            warn!(
                loops = self.max_loops,
                "shutdown sentinel looped past its bound on the invoker; forcing shutdown"
            );
            return SentinelStep::Force;
        }
        if !queue_empty {
            self.loop_count += 1;
            SentinelStep::Stay
        } else {
            // The invoker has drained; go see about the manager.
            self.loop_count = 0;
            self.pass_count += 1;
            SentinelStep::Pass
        }
    }

    /// One step on the manager thread.
    pub(crate) fn manager_step(&mut self, queue_empty: bool) -> SentinelStep {
        if self.loop_count > self.max_loops {
            warn!(
                loops = self.max_loops,
                "shutdown sentinel looped past its bound on the manager; forcing shutdown"
            );
            return SentinelStep::Force;
        }
        if !queue_empty {
            self.loop_count += 1;
            SentinelStep::Stay
        } else if !self.invoker_tx.is_empty() && self.pass_count < self.max_passes {
            // The invoker picked up new work; pass the buck back.
            self.loop_count = 0;
            SentinelStep::Pass
        } else {
            if self.pass_count >= self.max_passes {
                warn!(
                    passes = self.max_passes,
                    "shutdown did not quiesce within the pass bound; shutting down harshly"
                );
            }
            SentinelStep::Force
        }
    }

    /// Sends the sentinel (back) to the invoker queue.
    pub(crate) fn send_to_invoker(self) {
        let tx = self.invoker_tx.clone();
        let _ = tx.send(InvokerItem::Shutdown(self));
    }

    /// Tells the invoker thread to exit once it reaches the halt marker.
    pub(crate) fn halt_invoker(&self) {
        let _ = self.invoker_tx.send(InvokerItem::Halt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_begin_runs_shutdowners_in_order_once() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let manager = ShutdownManager::new();
        for tag in ["first", "second"] {
            let order = order.clone();
            manager.register_shutdowner(move || order.lock().unwrap().push(tag));
        }
        manager.begin();
        manager.begin();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert!(manager.has_begun());
    }

    #[test]
    fn test_shutdowner_registered_after_begin_never_runs() {
        let count = Arc::new(AtomicUsize::new(0));
        let manager = ShutdownManager::new();
        manager.begin();
        let count2 = count.clone();
        manager.register_shutdowner(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        manager.begin();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    fn sentinel(max_loops: u32, max_passes: u32) -> ShutdownSentinel {
        let (tx, rx) = crossbeam_channel::unbounded();
        // Leak the receiver so the channel stays connected and queue
        // checks see it as empty.
        std::mem::forget(rx);
        ShutdownSentinel {
            loop_count: 0,
            pass_count: 0,
            max_loops,
            max_passes,
            invoker_tx: tx,
        }
    }

    #[test]
    fn test_sentinel_passes_when_invoker_queue_empty() {
        let mut s = sentinel(10, 5);
        assert!(matches!(s.invoker_step(true), SentinelStep::Pass));
        assert_eq!(s.pass_count, 1);
    }

    #[test]
    fn test_sentinel_stays_while_queue_has_work() {
        let mut s = sentinel(10, 5);
        assert!(matches!(s.invoker_step(false), SentinelStep::Stay));
        assert!(matches!(s.manager_step(false), SentinelStep::Stay));
        assert_eq!(s.loop_count, 2);
    }

    #[test]
    fn test_sentinel_forces_past_loop_bound() {
        let mut s = sentinel(2, 5);
        s.loop_count = 3;
        assert!(matches!(s.invoker_step(false), SentinelStep::Force));
    }

    #[test]
    fn test_sentinel_forces_past_pass_bound() {
        let mut s = sentinel(10, 2);
        s.pass_count = 2;
        assert!(matches!(s.manager_step(true), SentinelStep::Force));
    }

    #[test]
    fn test_sentinel_finishes_when_both_queues_empty() {
        // Both queues empty and under the pass bound: Force without the
        // pass-bound warning is the clean exit path.
        let mut s = sentinel(10, 5);
        s.pass_count = 1;
        assert!(matches!(s.manager_step(true), SentinelStep::Force));
    }
}
