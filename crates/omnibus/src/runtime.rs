//! The assembled runtime: both threads, shutdown wiring, and reporting.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};
use tracing::info;

use omnibus_runtime::{
    AccessPolicy, AllowAll, Invoker, ObjectManager, ReportManager, RuntimeConfig, ShutdownManager,
};

/// A running Omnibus runtime.
///
/// Owns the manager and invoker threads plus the optional reporting
/// thread. Dropping the runtime without calling [`Runtime::join`] leaves
/// the threads running.
pub struct Runtime {
    omgr: ObjectManager,
    invoker: Invoker,
    shutdown: Arc<ShutdownManager>,
    reports: Arc<ReportManager>,
    threads: Vec<JoinHandle<()>>,
    report_stop: Option<Sender<()>>,
}

impl Runtime {
    /// Launches the runtime with the default allow-all subscribe policy.
    pub fn launch(config: RuntimeConfig) -> io::Result<Self> {
        Self::launch_with_policy(config, Box::new(AllowAll))
    }

    /// Launches the runtime: spawns the manager and invoker threads,
    /// wires the shutdown protocol, registers both thread reporters, and
    /// starts the periodic report thread when the config asks for one.
    pub fn launch_with_policy(
        config: RuntimeConfig,
        policy: Box<dyn AccessPolicy>,
    ) -> io::Result<Self> {
        let report_interval = config.report_interval;
        let (omgr, manager_join) = ObjectManager::spawn_with_policy(config, policy)?;
        let (invoker, invoker_join) = Invoker::spawn(omgr.clone())?;
        let mut threads = vec![manager_join, invoker_join];

        // The invoker seeds the shutdown sentinel; it drains both queues
        // and halts both threads.
        let shutdown = Arc::new(ShutdownManager::new());
        {
            let invoker = invoker.clone();
            shutdown.register_shutdowner(move || invoker.shutdown());
        }

        let reports = Arc::new(ReportManager::new());
        reports.register_reporter(omgr.reporter());
        reports.register_reporter(invoker.reporter());

        let mut report_stop = None;
        if report_interval > Duration::ZERO {
            let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
            let reports = reports.clone();
            let join = thread::Builder::new()
                .name("omnibus.report".into())
                .spawn(move || {
                    while let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(report_interval)
                    {
                        info!("runtime report:\n{}", reports.generate());
                    }
                })?;
            threads.push(join);
            report_stop = Some(stop_tx);
        }

        info!("runtime launched");
        Ok(Self {
            omgr,
            invoker,
            shutdown,
            reports,
            threads,
            report_stop,
        })
    }

    pub fn manager(&self) -> &ObjectManager {
        &self.omgr
    }

    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    /// The shutdown manager; embedders register their own cleanup here.
    pub fn shutdown_manager(&self) -> &ShutdownManager {
        &self.shutdown
    }

    pub fn reports(&self) -> &ReportManager {
        &self.reports
    }

    /// Begins an orderly shutdown. Returns immediately; call
    /// [`Runtime::join`] to wait for the threads to drain and exit.
    pub fn shutdown(&self) {
        self.shutdown.begin();
    }

    /// Waits for every runtime thread to exit.
    pub fn join(mut self) -> thread::Result<()> {
        // Dropping the stop sender ends the report thread's wait.
        drop(self.report_stop.take());
        for join in self.threads.drain(..) {
            join.join()?;
        }
        Ok(())
    }
}
