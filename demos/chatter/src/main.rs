//! A tiny chat room driven entirely by the object runtime.
//!
//! The room is one `DObject`: a scalar topic, a set of member scores, and
//! an oid list of occupants. A console listener prints every event, and a
//! blocking unit stands in for the database fetch a real server would do.

use std::time::Duration;

use omnibus::prelude::*;
use tracing::info;

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Prints every event dispatched on the room.
struct Console;

impl EventListener for Console {
    fn event_received(&mut self, object: &mut DObject, event: &DEvent) {
        match event {
            DEvent::AttributeChanged { name, value, .. } => {
                println!("[{}] {} is now {:?}", object.name(), name, value);
            }
            DEvent::Message { name, args, .. } => {
                println!("[{}] {}: {:?}", object.name(), name, args);
            }
            DEvent::ObjectAdded { oid, .. } => {
                println!("[{}] {} entered", object.name(), oid);
            }
            DEvent::ObjectRemoved { oid, .. } => {
                println!("[{}] {} left", object.name(), oid);
            }
            other => {
                println!("[{}] {}", object.name(), other.kind());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Blocking work
// ---------------------------------------------------------------------------

/// Pretends to load the topic of the day from storage, then applies it on
/// the manager thread.
struct FetchTopic {
    room: Oid,
    topic: Option<String>,
}

impl Unit for FetchTopic {
    fn invoke(&mut self) -> bool {
        std::thread::sleep(Duration::from_millis(50));
        self.topic = Some("rust runtimes".to_owned());
        true
    }

    fn handle_result(&mut self, ctx: &mut ManagerContext<'_>) {
        if let (Some(topic), Some(room)) = (self.topic.take(), ctx.object_mut(self.room)) {
            let _ = room.set_field("topic", topic.as_str());
        }
    }

    fn name(&self) -> &str {
        "fetch-topic"
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<(), OmnibusError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = Runtime::launch(RuntimeConfig {
        perf_track: true,
        unit_prof_enabled: true,
        ..RuntimeConfig::default()
    })?;
    let omgr = runtime.manager();

    let room = omgr.register(
        DObject::new("lobby")
            .with_scalar("topic", "welcome")
            .with_set("scores")
            .with_oid_list("occupants"),
    );
    omgr.subscribe(room, Box::new(Console), |result| {
        result.expect("subscribe to the lobby");
    });

    // Two chatters enter the room.
    let kiri = omgr.register(DObject::new("kiri"));
    let miko = omgr.register(DObject::new("miko"));
    let lobby = omgr.handle(room);
    lobby.add_to_list("occupants", kiri);
    lobby.add_to_list("occupants", miko);
    lobby.add_to_set("scores", DEntry::new(DKey::from(kiri), 0));
    lobby.add_to_set("scores", DEntry::new(DKey::from(miko), 0));

    lobby.post_message("chat", vec![DValue::from("hello from kiri")]);
    runtime.invoker().post(FetchTopic { room, topic: None });
    lobby.update_set("scores", DEntry::new(DKey::from(kiri), 7));

    // One chatter leaves again.
    lobby.remove_from_list("occupants", miko);
    omgr.destroy(miko);

    // Let the unit resolve before reporting.
    std::thread::sleep(Duration::from_millis(200));
    info!("runtime report:\n{}", runtime.reports().snapshot());

    runtime.shutdown();
    runtime
        .join()
        .map_err(|_| std::io::Error::other("runtime thread panicked"))?;
    Ok(())
}
