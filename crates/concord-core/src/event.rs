//! Events and the listener bridge.
//!
//! Native engines dispatch events with themselves as the target. Callers
//! registered their listeners on wrappers, so every listener handed to a
//! native object is first wrapped by an [`EventBridge`]: the wrapped form
//! rewrites the event's target to the wrapper and calls the raw listener with
//! the wrapper as its receiver.
//!
//! The bridge memoizes the wrapped form per raw listener. Adding the same
//! listener twice hands the native side the same handle twice, and removing
//! the raw listener finds the exact handle that was added.
//!
//! The memo holds wrapped forms weakly. Only the native side keeps a wrapped
//! listener (and through it the raw one) alive, so an entry dies once the
//! native side lets go of it: after removal, or when a handler slot is
//! cleared or replaced.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::native::NativeListener;

/// A dispatched event.
#[derive(Clone)]
pub struct Event {
    event_type: String,
    time_stamp: f64,
    target: Option<Arc<dyn Any + Send + Sync>>,
    current_target: Option<Arc<dyn Any + Send + Sync>>,
}

impl Event {
    /// Creates an event with no target.
    pub fn new(event_type: impl Into<String>, time_stamp: f64) -> Self {
        Self {
            event_type: event_type.into(),
            time_stamp,
            target: None,
            current_target: None,
        }
    }

    /// Sets both target and current target.
    pub fn with_target(mut self, target: Arc<dyn Any + Send + Sync>) -> Self {
        self.current_target = Some(Arc::clone(&target));
        self.target = Some(target);
        self
    }

    /// Event type, e.g. `"ended"`.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Context time at dispatch.
    pub fn time_stamp(&self) -> f64 {
        self.time_stamp
    }

    /// The target, if it is a `T`.
    pub fn target<T: Clone + 'static>(&self) -> Option<T> {
        self.target.as_ref()?.downcast_ref::<T>().cloned()
    }

    /// The current target, if it is a `T`.
    pub fn current_target<T: Clone + 'static>(&self) -> Option<T> {
        self.current_target.as_ref()?.downcast_ref::<T>().cloned()
    }

    /// Replaces the target.
    pub fn set_target(&mut self, target: Arc<dyn Any + Send + Sync>) {
        self.target = Some(target);
    }

    /// Replaces the current target.
    pub fn set_current_target(&mut self, target: Arc<dyn Any + Send + Sync>) {
        self.current_target = Some(target);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("event_type", &self.event_type)
            .field("time_stamp", &self.time_stamp)
            .field("has_target", &self.target.is_some())
            .finish()
    }
}

/// Listener registered on a wrapper. Receives the wrapper as its receiver.
pub type EventListener<T> = Arc<dyn Fn(&T, &Event) + Send + Sync>;

/// A wrapper that events can be retargeted to.
pub trait EventTarget: Clone + Send + Sync + 'static {
    /// Non-owning handle kept by wrapped listeners.
    type Handle: Send + Sync + 'static;

    /// Returns a handle that does not keep the wrapper alive.
    fn downgrade(&self) -> Self::Handle;

    /// Recovers the wrapper if it is still alive.
    fn upgrade(handle: &Self::Handle) -> Option<Self>;
}

fn listener_key<T>(listener: &EventListener<T>) -> usize {
    Arc::as_ptr(listener).cast::<()>().addr()
}

// A live wrapped form keeps its raw listener, and so the key address, alive.
type WeakNativeListener = Weak<dyn Fn(&mut Event) + Send + Sync>;

/// Per-target memo of wrapped listeners.
pub struct EventBridge<T: EventTarget> {
    wrapped: Mutex<HashMap<usize, WeakNativeListener>>,
    _target: PhantomData<fn(&T)>,
}

impl<T: EventTarget> EventBridge<T> {
    /// Creates an empty bridge.
    pub fn new() -> Self {
        Self {
            wrapped: Mutex::new(HashMap::new()),
            _target: PhantomData,
        }
    }

    /// Returns the native form of `listener`, creating it on first use.
    ///
    /// `None` passes through, so clearing a handler slot stays a clear.
    pub fn wrap(&self, target: &T, listener: Option<EventListener<T>>) -> Option<NativeListener> {
        let listener = listener?;
        let key = listener_key(&listener);

        let mut wrapped = self.wrapped.lock();
        if let Some(existing) = wrapped.get(&key).and_then(Weak::upgrade) {
            return Some(existing);
        }
        wrapped.retain(|_, native| native.strong_count() > 0);

        let handle = target.downgrade();
        let raw = listener;
        let native: NativeListener = Arc::new(move |event: &mut Event| {
            let Some(target) = T::upgrade(&handle) else {
                return;
            };
            let shared: Arc<dyn Any + Send + Sync> = Arc::new(target.clone());
            event.set_target(Arc::clone(&shared));
            event.set_current_target(shared);
            raw(&target, event);
        });

        wrapped.insert(key, Arc::downgrade(&native));
        Some(native)
    }

    /// The native form previously created for `listener`, if the native
    /// side still holds it.
    pub fn lookup(&self, listener: &EventListener<T>) -> Option<NativeListener> {
        self.wrapped
            .lock()
            .get(&listener_key(listener))
            .and_then(Weak::upgrade)
    }

    /// Number of wrapped listeners the native side still holds.
    pub fn len(&self) -> usize {
        self.wrapped
            .lock()
            .values()
            .filter(|native| native.strong_count() > 0)
            .count()
    }

    /// True when no wrapped listener is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: EventTarget> Default for EventBridge<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct Probe(Arc<&'static str>);

    impl EventTarget for Probe {
        type Handle = Weak<&'static str>;

        fn downgrade(&self) -> Self::Handle {
            Arc::downgrade(&self.0)
        }

        fn upgrade(handle: &Self::Handle) -> Option<Self> {
            handle.upgrade().map(Probe)
        }
    }

    #[test]
    fn wrap_is_memoized() {
        let bridge = EventBridge::new();
        let target = Probe(Arc::new("osc"));
        let listener: EventListener<Probe> = Arc::new(|_, _| {});

        let a = bridge.wrap(&target, Some(Arc::clone(&listener))).unwrap();
        let b = bridge.wrap(&target, Some(Arc::clone(&listener))).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(bridge.len(), 1);
        assert!(Arc::ptr_eq(&bridge.lookup(&listener).unwrap(), &a));
    }

    #[test]
    fn none_passes_through() {
        let bridge = EventBridge::new();
        assert!(bridge.wrap(&Probe(Arc::new("x")), None).is_none());
        assert!(bridge.is_empty());
    }

    #[test]
    fn wrapped_listener_retargets() {
        let bridge = EventBridge::new();
        let target = Probe(Arc::new("wrapper"));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let listener: EventListener<Probe> = Arc::new(move |this, event| {
            assert_eq!(*this.0, "wrapper");
            assert_eq!(*event.target::<Probe>().unwrap().0, "wrapper");
            assert_eq!(*event.current_target::<Probe>().unwrap().0, "wrapper");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let native = bridge.wrap(&target, Some(listener)).unwrap();
        let mut event = Event::new("ended", 0.0).with_target(Arc::new(42_u32));
        assert_eq!(event.target::<u32>(), Some(42));
        native(&mut event);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(event.target::<u32>().is_none());
    }

    #[test]
    fn entry_dies_with_its_native_form() {
        let bridge = EventBridge::new();
        let target = Probe(Arc::new("node"));
        let alive = Arc::downgrade(&target.0);

        // The listener owns its target, as a closure over its own node would.
        let captured = target.clone();
        let listener: EventListener<Probe> = Arc::new(move |_, _| {
            let _ = &captured;
        });
        let native = bridge.wrap(&target, Some(Arc::clone(&listener))).unwrap();
        assert_eq!(bridge.len(), 1);

        drop(native);
        assert!(bridge.is_empty());
        assert!(bridge.lookup(&listener).is_none());

        drop(listener);
        drop(target);
        assert!(alive.upgrade().is_none());
    }

    #[test]
    fn dropped_target_silences_listener() {
        let bridge = EventBridge::new();
        let target = Probe(Arc::new("gone"));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let listener: EventListener<Probe> = Arc::new(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let native = bridge.wrap(&target, Some(listener)).unwrap();
        drop(target);

        native(&mut Event::new("ended", 0.0));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
