//! Event listener lists for simulated objects.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use concord_core::{Event, NativeListener};
use parking_lot::Mutex;

fn same_listener(a: &NativeListener, b: &NativeListener) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// `add_event_listener` lists plus `on*` handler slots.
#[derive(Default)]
pub(crate) struct Listeners {
    listeners: Mutex<Vec<(String, NativeListener)>>,
    handlers: Mutex<HashMap<String, NativeListener>>,
}

impl Listeners {
    pub(crate) fn add(&self, event_type: &str, listener: NativeListener) {
        let mut listeners = self.listeners.lock();
        let present = listeners
            .iter()
            .any(|(ty, l)| ty == event_type && same_listener(l, &listener));
        if !present {
            listeners.push((event_type.to_string(), listener));
        }
    }

    pub(crate) fn remove(&self, event_type: &str, listener: &NativeListener) {
        self.listeners
            .lock()
            .retain(|(ty, l)| !(ty == event_type && same_listener(l, listener)));
    }

    pub(crate) fn set_handler(&self, event_type: &str, handler: Option<NativeListener>) {
        let mut handlers = self.handlers.lock();
        match handler {
            Some(handler) => {
                handlers.insert(event_type.to_string(), handler);
            }
            None => {
                handlers.remove(event_type);
            }
        }
    }

    /// Number of listeners registered for `event_type`, handler slot included.
    pub(crate) fn count(&self, event_type: &str) -> usize {
        let listeners = self
            .listeners
            .lock()
            .iter()
            .filter(|(ty, _)| ty == event_type)
            .count();
        listeners + usize::from(self.handlers.lock().contains_key(event_type))
    }

    /// Delivers an event to every listener, then the handler slot.
    ///
    /// Listeners run with no lock held, so they may call back into the
    /// engine.
    pub(crate) fn dispatch(
        &self,
        event_type: &str,
        time_stamp: f64,
        target: Arc<dyn Any + Send + Sync>,
    ) -> usize {
        let mut recipients: Vec<NativeListener> = self
            .listeners
            .lock()
            .iter()
            .filter(|(ty, _)| ty == event_type)
            .map(|(_, l)| Arc::clone(l))
            .collect();
        if let Some(handler) = self.handlers.lock().get(event_type) {
            recipients.push(Arc::clone(handler));
        }

        for listener in &recipients {
            let mut event = Event::new(event_type, time_stamp).with_target(Arc::clone(&target));
            listener(&mut event);
        }
        recipients.len()
    }
}
