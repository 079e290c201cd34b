//! One-shot lifecycle events on values returned by host methods
//! (`"end"` on a response, `"end"` on an outgoing request).

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::context::bind_current;

type Listener = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct EmitterState {
    pending: HashMap<String, Vec<Listener>>,
    fired: HashSet<String>,
}

/// Named one-shot events.
///
/// Listeners run inside the execution context that registered them.
/// Events are sticky: a listener registered after its event was emitted
/// runs immediately.
#[derive(Clone, Default)]
pub struct Emitter {
    state: Arc<Mutex<EmitterState>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `listener` once, when `event` is emitted.
    pub fn once<F>(&self, event: &str, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let listener = bind_current(listener);
        {
            let mut state = self.state.lock().expect("emitter mutex poisoned");
            if !state.fired.contains(event) {
                state.pending.entry(event.to_string()).or_default().push(listener);
                return;
            }
        }
        run(event, listener);
    }

    /// Fire `event`. Returns how many listeners ran.
    pub fn emit(&self, event: &str) -> usize {
        let listeners = {
            let mut state = self.state.lock().expect("emitter mutex poisoned");
            state.fired.insert(event.to_string());
            state.pending.remove(event).unwrap_or_default()
        };
        let count = listeners.len();
        for listener in listeners {
            run(event, listener);
        }
        count
    }

    pub fn has_fired(&self, event: &str) -> bool {
        let state = self.state.lock().expect("emitter mutex poisoned");
        state.fired.contains(event)
    }

    pub fn listener_count(&self, event: &str) -> usize {
        let state = self.state.lock().expect("emitter mutex poisoned");
        state.pending.get(event).map(Vec::len).unwrap_or(0)
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("emitter mutex poisoned");
        f.debug_struct("Emitter")
            .field("pending", &state.pending.keys().collect::<Vec<_>>())
            .field("fired", &state.fired)
            .finish()
    }
}

fn run(event: &str, listener: Listener) {
    if catch_unwind(AssertUnwindSafe(listener)).is_err() {
        tracing::warn!(event, "Event listener panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{current, ContextStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn listeners_run_once_per_emit() {
        let emitter = Emitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        emitter.once("end", move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(emitter.listener_count("end"), 1);
        assert_eq!(emitter.emit("other"), 0);
        assert_eq!(emitter.emit("end"), 1);
        assert_eq!(emitter.emit("end"), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_listener_runs_immediately() {
        let emitter = Emitter::new();
        emitter.emit("end");
        assert!(emitter.has_fired("end"));

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        emitter.once("end", move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_keeps_registering_context() {
        let store = ContextStore::new();
        let ctx = store.enter();
        ctx.set("span", 9u8);
        let emitter = Emitter::new();
        let seen = Arc::new(Mutex::new(None));

        let s = seen.clone();
        ctx.sync_scope(|| {
            emitter.once("end", move || {
                *s.lock().unwrap() = current().and_then(|c| c.get::<u8>("span"));
            });
        });

        emitter.emit("end");
        assert_eq!(*seen.lock().unwrap(), Some(9));
    }

    #[test]
    fn panicking_listener_is_contained() {
        let emitter = Emitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        emitter.once("end", || panic!("listener bug"));
        let h = hits.clone();
        emitter.once("end", move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(emitter.emit("end"), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
