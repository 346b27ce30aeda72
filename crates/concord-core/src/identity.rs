//! Weak-keyed identity stores.
//!
//! Wrappers and native objects are distinct values. The shim links them
//! through process-wide associative stores keyed by the *identity* of a
//! wrapper (the address of its shared allocation). A key is held weakly: an
//! entry does not keep its wrapper alive, and once the wrapper is dropped
//! the entry stops answering lookups and is eventually pruned. Values are
//! held strongly for as long as the key lives.
//!
//! Lookups come in two flavours. [`IdentityStore::get`] returns `Option` for
//! lookups whose miss is an expected condition (a foreign destination, for
//! example). [`IdentityStore::require`] is for lookups that a prior step has
//! guaranteed; a miss there means the shim lost track of its own state and
//! it panics with the store's name.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::Mutex;

use crate::context::{Context, ContextInner};
use crate::native::{NativeBackendRef, NativeContextRef, NativeNodeRef, NativeParamRef};
use crate::node::AudioNode;
use crate::param::AudioParam;
use crate::probe::ProbeCache;
use crate::renderer::Renderer;

/// Inserts between automatic prune passes.
const PRUNE_INTERVAL: usize = 64;

/// A value whose identity is the address of a shared allocation.
pub trait WeakKey {
    /// Type of the shared allocation.
    type Target: ?Sized;

    /// The allocation that carries this value's identity.
    fn key_arc(&self) -> &Arc<Self::Target>;
}

impl<T: ?Sized> WeakKey for Arc<T> {
    type Target = T;

    fn key_arc(&self) -> &Arc<T> {
        self
    }
}

fn addr_of<T: ?Sized>(arc: &Arc<T>) -> usize {
    Arc::as_ptr(arc).cast::<()>().addr()
}

struct Entry<T: ?Sized, V> {
    key: Weak<T>,
    value: V,
}

impl<T: ?Sized, V> Entry<T, V> {
    fn is_live(&self) -> bool {
        self.key.strong_count() > 0
    }
}

struct Slots<T: ?Sized, V> {
    entries: HashMap<usize, Entry<T, V>>,
    inserts_since_prune: usize,
}

/// Weak-keyed map from wrapper identity to `V`.
pub struct IdentityStore<K: WeakKey, V> {
    name: &'static str,
    slots: Mutex<Slots<K::Target, V>>,
    _key: PhantomData<fn(&K)>,
}

impl<K: WeakKey, V> IdentityStore<K, V> {
    /// Creates an empty store. `name` appears in fatal lookup panics.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Mutex::new(Slots {
                entries: HashMap::new(),
                inserts_since_prune: 0,
            }),
            _key: PhantomData,
        }
    }

    /// Store name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Associates `value` with `key`, replacing any previous value.
    pub fn set(&self, key: &K, value: V) {
        let arc = key.key_arc();
        let mut slots = self.slots.lock();
        slots.entries.insert(
            addr_of(arc),
            Entry {
                key: Arc::downgrade(arc),
                value,
            },
        );
        slots.inserts_since_prune += 1;
        if slots.inserts_since_prune >= PRUNE_INTERVAL {
            prune_slots(self.name, &mut slots);
        }
    }

    /// The value associated with `key`, if any.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let slots = self.slots.lock();
        slots
            .entries
            .get(&addr_of(key.key_arc()))
            .filter(|entry| entry.is_live())
            .map(|entry| entry.value.clone())
    }

    /// The value associated with `key`. Panics when there is none.
    #[track_caller]
    pub fn require(&self, key: &K) -> V
    where
        V: Clone,
    {
        match self.get(key) {
            Some(value) => value,
            None => lost_association(self.name),
        }
    }

    /// The value associated with `key`, inserting `init()` first if absent.
    pub fn get_or_insert_with(&self, key: &K, init: impl FnOnce() -> V) -> V
    where
        V: Clone,
    {
        let arc = key.key_arc();
        let addr = addr_of(arc);
        let mut slots = self.slots.lock();
        if let Some(entry) = slots.entries.get(&addr).filter(|entry| entry.is_live()) {
            return entry.value.clone();
        }
        let value = init();
        slots.entries.insert(
            addr,
            Entry {
                key: Arc::downgrade(arc),
                value: value.clone(),
            },
        );
        value
    }

    /// Applies `update` to the value for `key`, starting from `V::default()`.
    pub fn update<R>(&self, key: &K, update: impl FnOnce(&mut V) -> R) -> R
    where
        V: Default,
    {
        let arc = key.key_arc();
        let mut slots = self.slots.lock();
        let entry = slots.entries.entry(addr_of(arc)).or_insert_with(|| Entry {
            key: Arc::downgrade(arc),
            value: V::default(),
        });
        if !entry.is_live() {
            *entry = Entry {
                key: Arc::downgrade(arc),
                value: V::default(),
            };
        }
        update(&mut entry.value)
    }

    /// Removes and returns the value for `key`.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut slots = self.slots.lock();
        slots
            .entries
            .remove(&addr_of(key.key_arc()))
            .filter(Entry::is_live)
            .map(|entry| entry.value)
    }

    /// True when `key` has a value.
    pub fn contains(&self, key: &K) -> bool {
        self.slots
            .lock()
            .entries
            .get(&addr_of(key.key_arc()))
            .is_some_and(Entry::is_live)
    }

    /// Number of entries whose key is still alive.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .entries
            .values()
            .filter(|entry| entry.is_live())
            .count()
    }

    /// True when no live entry exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops entries whose key is gone. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        prune_slots(self.name, &mut self.slots.lock())
    }
}

fn prune_slots<T: ?Sized, V>(name: &'static str, slots: &mut Slots<T, V>) -> usize {
    let before = slots.entries.len();
    slots.entries.retain(|_, entry| entry.is_live());
    slots.inserts_since_prune = 0;
    let evicted = before - slots.entries.len();
    #[cfg(feature = "tracing")]
    {
        if evicted > 0 {
            tracing::trace!(store = name, evicted, "identity_prune");
        }
    }
    #[cfg(not(feature = "tracing"))]
    let _ = name;
    evicted
}

/// Panics for a lookup that a prior step guaranteed would succeed.
#[cold]
#[track_caller]
pub(crate) fn lost_association(store: &'static str) -> ! {
    panic!("identity store `{store}` has no entry for a live wrapper; the shim lost track of its native side")
}

/// Every store the shim keeps.
pub struct Stores {
    /// Wrapper node to (possibly adapted) native node.
    pub node_natives: IdentityStore<AudioNode, NativeNodeRef>,
    /// Wrapper param to (possibly adapted) native param.
    pub param_natives: IdentityStore<AudioParam, NativeParamRef>,
    /// Wrapper context to native context.
    pub context_natives: IdentityStore<Context, NativeContextRef>,
    /// Native context back to its wrapper.
    pub native_contexts: IdentityStore<NativeContextRef, Weak<ContextInner>>,
    /// Offline wrapper node to its renderer.
    pub node_renderers: IdentityStore<AudioNode, Renderer>,
    /// Offline wrapper param to its renderer.
    pub param_renderers: IdentityStore<AudioParam, Renderer>,
    /// Offline source node to the renderers it currently feeds.
    pub connected_renderers: IdentityStore<AudioNode, Vec<Renderer>>,
    /// Probe memo per native backend.
    pub backend_probes: IdentityStore<NativeBackendRef, Arc<ProbeCache>>,
}

static STORES: LazyLock<Stores> = LazyLock::new(|| Stores {
    node_natives: IdentityStore::new("node natives"),
    param_natives: IdentityStore::new("param natives"),
    context_natives: IdentityStore::new("context natives"),
    native_contexts: IdentityStore::new("native contexts"),
    node_renderers: IdentityStore::new("node renderers"),
    param_renderers: IdentityStore::new("param renderers"),
    connected_renderers: IdentityStore::new("connected renderers"),
    backend_probes: IdentityStore::new("backend probes"),
});

/// The process-wide stores.
pub fn stores() -> &'static Stores {
    &STORES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_require() {
        let store: IdentityStore<Arc<String>, u32> = IdentityStore::new("test");
        let key = Arc::new("node".to_string());
        assert!(store.get(&key).is_none());

        store.set(&key, 7);
        assert_eq!(store.get(&key), Some(7));
        assert_eq!(store.require(&key), 7);
        assert!(store.contains(&key));
    }

    #[test]
    fn identity_not_equality() {
        let store: IdentityStore<Arc<String>, u32> = IdentityStore::new("test");
        let a = Arc::new("same".to_string());
        let b = Arc::new("same".to_string());
        store.set(&a, 1);
        assert!(store.get(&b).is_none());
        assert_eq!(store.get(&Arc::clone(&a)), Some(1));
    }

    #[test]
    fn key_is_weak_value_is_strong() {
        let store: IdentityStore<Arc<u8>, Arc<String>> = IdentityStore::new("test");
        let key = Arc::new(0_u8);
        let value = Arc::new("native".to_string());
        store.set(&key, Arc::clone(&value));

        assert_eq!(Arc::strong_count(&key), 1);
        assert_eq!(Arc::strong_count(&value), 2);

        drop(key);
        assert_eq!(store.len(), 0);
        assert_eq!(store.prune(), 1);
        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn update_starts_from_default() {
        let store: IdentityStore<Arc<u8>, Vec<u32>> = IdentityStore::new("test");
        let key = Arc::new(1_u8);
        store.update(&key, |v| v.push(1));
        store.update(&key, |v| v.push(2));
        assert_eq!(store.get(&key), Some(vec![1, 2]));
        assert_eq!(store.remove(&key), Some(vec![1, 2]));
        assert!(!store.contains(&key));
    }

    #[test]
    fn get_or_insert_runs_init_once() {
        let store: IdentityStore<Arc<u8>, u32> = IdentityStore::new("test");
        let key = Arc::new(1_u8);
        assert_eq!(store.get_or_insert_with(&key, || 5), 5);
        assert_eq!(store.get_or_insert_with(&key, || 9), 5);
    }

    #[test]
    fn inserts_trigger_pruning() {
        let store: IdentityStore<Arc<usize>, usize> = IdentityStore::new("test");
        for i in 0..PRUNE_INTERVAL * 2 {
            let key = Arc::new(i);
            store.set(&key, i);
        }
        assert!(store.slots.lock().entries.len() < PRUNE_INTERVAL);
    }

    #[test]
    #[should_panic(expected = "identity store `lost` has no entry")]
    fn require_miss_is_fatal() {
        let store: IdentityStore<Arc<u8>, u32> = IdentityStore::new("lost");
        store.require(&Arc::new(0));
    }
}
