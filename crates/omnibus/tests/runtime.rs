//! End-to-end tests of the assembled runtime.

use std::time::Duration;

use omnibus::prelude::*;

#[test]
fn test_launch_mutate_shutdown() {
    let runtime = Runtime::launch(RuntimeConfig::default()).expect("launch");
    let omgr = runtime.manager();

    let room = omgr.register(DObject::new("room").with_scalar("topic", "lobby"));
    let (tx, rx) = crossbeam_channel::bounded(1);

    struct Recorder(crossbeam_channel::Sender<DEvent>);
    impl EventListener for Recorder {
        fn event_received(&mut self, _object: &mut DObject, event: &DEvent) {
            let _ = self.0.send(event.clone());
        }
    }
    omgr.subscribe(room, Box::new(Recorder(tx)), |result| {
        result.expect("subscribe refused");
    });

    omgr.handle(room).set_field("topic", "strategy");
    let event = rx.recv_timeout(Duration::from_secs(5)).expect("no event");
    assert!(matches!(event, DEvent::AttributeChanged { ref name, .. } if name == "topic"));

    runtime.shutdown();
    runtime.join().expect("runtime threads panicked");
}

#[test]
fn test_unit_round_trip_through_runtime() {
    struct LoadTopic {
        room: Oid,
        loaded: Option<String>,
    }

    impl Unit for LoadTopic {
        fn invoke(&mut self) -> bool {
            // Stand-in for a blocking database read.
            self.loaded = Some("from-storage".to_owned());
            true
        }

        fn handle_result(&mut self, ctx: &mut ManagerContext<'_>) {
            if let (Some(topic), Some(object)) = (self.loaded.take(), ctx.object_mut(self.room)) {
                let _ = object.set_field("topic", topic.as_str());
            }
        }

        fn name(&self) -> &str {
            "load-topic"
        }
    }

    let runtime = Runtime::launch(RuntimeConfig::default()).expect("launch");
    let room = runtime
        .manager()
        .register(DObject::new("room").with_scalar("topic", "lobby"));

    runtime.invoker().post(LoadTopic { room, loaded: None });

    runtime.shutdown();
    runtime.join().expect("runtime threads panicked");
}

#[test]
fn test_reports_are_available_on_demand() {
    let runtime = Runtime::launch(RuntimeConfig::default()).expect("launch");
    let report = runtime.reports().snapshot();
    assert!(report.contains("* omnibus.manager:"));
    assert!(report.contains("* omnibus.invoker:"));
    runtime.shutdown();
    runtime.join().expect("runtime threads panicked");
}

#[test]
fn test_registered_shutdowner_runs_on_shutdown() {
    let runtime = Runtime::launch(RuntimeConfig::default()).expect("launch");
    let (tx, rx) = crossbeam_channel::bounded(1);
    runtime.shutdown_manager().register_shutdowner(move || {
        let _ = tx.send(());
    });

    runtime.shutdown();
    runtime.join().expect("runtime threads panicked");
    rx.try_recv().expect("shutdowner never ran");
}
