#![forbid(unsafe_code)]

//! Structured log events emitted while binding, reading and invalidating.

use std::sync::{Arc, Mutex};

use propwatch_core::{Instance, TypeBuilder};
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

#[derive(Default)]
struct Captured {
    messages: Vec<String>,
}

struct Capture {
    state: Arc<Mutex<Captured>>,
}

impl<S> Layer<S> for Capture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Msg {
            message: Option<String>,
        }
        impl tracing::field::Visit for Msg {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = Some(value.to_string());
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = Some(format!("{value:?}").trim_matches('"').to_string());
                }
            }
        }
        let mut msg = Msg { message: None };
        event.record(&mut msg);
        if let Some(message) = msg.message {
            self.state.lock().expect("capture lock").messages.push(message);
        }
    }
}

fn count(messages: &[String], needle: &str) -> usize {
    messages.iter().filter(|m| m.as_str() == needle).count()
}

#[test]
fn read_write_cycle_emits_cache_events() {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        state: Arc::clone(&state),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    let ty = TypeBuilder::<i64>::new("Counter")
        .class_attr("step", 1)
        .watch("next", ["step", "base"], |c| Ok(c.get("step")? + c.get("base")?))
        .build()
        .expect("Counter binds");
    let c = Instance::new(&ty);
    c.set("base", 10).unwrap();
    assert_eq!(c.get("next").unwrap(), 11);
    assert_eq!(c.get("next").unwrap(), 11);
    c.set("step", 2).unwrap();
    assert_eq!(c.get("next").unwrap(), 12);

    let snapshot = state.lock().expect("capture lock");
    let messages = &snapshot.messages;
    assert_eq!(count(messages, "implicit slot created"), 2);
    assert_eq!(count(messages, "watcher bound"), 1);
    assert_eq!(count(messages, "type built"), 1);
    assert_eq!(count(messages, "cache miss"), 2);
    assert_eq!(count(messages, "cache hit"), 1);
    // The first write to `base` finds nothing cached.
    assert_eq!(count(messages, "cache invalidated"), 1);
}

#[test]
fn redeclaration_warns() {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        state: Arc::clone(&state),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    let ty = TypeBuilder::<i64>::new("Twice")
        .class_attr("x", 1)
        .class_attr("x", 2)
        .build()
        .expect("Twice binds");
    assert_eq!(Instance::new(&ty).get("x").unwrap(), 2);

    let snapshot = state.lock().expect("capture lock");
    assert_eq!(count(&snapshot.messages, "declaration replaced"), 1);
}

#[test]
fn write_during_compute_is_reported() {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        state: Arc::clone(&state),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    let ty = TypeBuilder::<i64>::new("Drift")
        .slot_with_default("a", 1)
        .watch("seen", ["a"], |d| {
            let a = d.get("a")?;
            d.set("a", a + 1)?;
            Ok(a)
        })
        .build()
        .expect("Drift binds");
    let d = Instance::new(&ty);
    assert_eq!(d.get("seen").unwrap(), 1);
    assert!(!d.is_cached("seen"));

    let snapshot = state.lock().expect("capture lock");
    assert_eq!(
        count(
            &snapshot.messages,
            "dependency written during compute; result not cached"
        ),
        1
    );
}
