//! Memoized capability probes.
//!
//! A probe answers one yes/no question about the native engine ("does
//! selective disconnect work?"). Probes can be expensive (one of them renders
//! audio), so each runs at most once per [`ProbeCache`] and every later
//! caller gets the memoized verdict.
//!
//! Synchronous probes settle immediately. Asynchronous probes are
//! single-flight: callers arriving while the first evaluation is still
//! pending await that same evaluation instead of starting another. The
//! evaluation lives in the cache, not in the caller that started it, so a
//! caller dropped mid-probe leaves it to be driven by the next one.
//!
//! A probe id is either synchronous or asynchronous for the lifetime of a
//! cache. Using one id both ways is a programming error and panics.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::identity::stores;
use crate::native::NativeBackendRef;

/// Names one capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeId(&'static str);

impl ProbeId {
    /// Creates a probe id.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The probe's name.
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Observable state of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    /// Never evaluated.
    NotStarted,
    /// An asynchronous evaluation is in flight.
    Pending,
    /// Evaluated, with the memoized verdict.
    Settled(bool),
}

type Evaluation = Pin<Box<dyn Future<Output = bool> + Send>>;

#[derive(Default)]
struct AsyncSlot {
    started: AtomicBool,
    verdict: OnceLock<bool>,
    /// The one evaluation, polled by whichever caller holds the lock.
    evaluation: AsyncMutex<Option<Evaluation>>,
}

enum Slot {
    Seeded(bool),
    Sync(Arc<OnceLock<bool>>),
    Async(Arc<AsyncSlot>),
}

/// Memo of probe verdicts.
#[derive(Default)]
pub struct ProbeCache {
    slots: Mutex<HashMap<ProbeId, Slot>>,
}

impl ProbeCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every context of `backend`.
    pub fn for_backend(backend: &NativeBackendRef) -> Arc<ProbeCache> {
        stores()
            .backend_probes
            .get_or_insert_with(backend, || Arc::new(ProbeCache::new()))
    }

    /// Runs a synchronous probe once and returns its memoized verdict.
    pub fn test(&self, id: ProbeId, factory: impl FnOnce() -> bool) -> bool {
        let cell = {
            let mut slots = self.slots.lock();
            match slots
                .entry(id)
                .or_insert_with(|| Slot::Sync(Arc::default()))
            {
                Slot::Seeded(verdict) => return *verdict,
                Slot::Sync(cell) => Arc::clone(cell),
                Slot::Async(slot) => match slot.verdict.get() {
                    Some(verdict) => return *verdict,
                    None => panic!("probe `{id}` is asynchronous and has not settled"),
                },
            }
        };

        *cell.get_or_init(|| {
            let verdict = factory();
            #[cfg(feature = "tracing")]
            tracing::debug!(probe = id.name(), verdict, "probe_settled");
            verdict
        })
    }

    /// Runs an asynchronous probe once and returns its memoized verdict.
    ///
    /// Callers that arrive while the evaluation is pending wait for it; their
    /// own factories are dropped without being called. Dropping a waiting
    /// caller never cancels the evaluation.
    pub async fn test_async<F, Fut>(&self, id: ProbeId, factory: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let slot = {
            let mut slots = self.slots.lock();
            match slots
                .entry(id)
                .or_insert_with(|| Slot::Async(Arc::default()))
            {
                Slot::Seeded(verdict) => return *verdict,
                Slot::Async(slot) => Arc::clone(slot),
                Slot::Sync(cell) => match cell.get() {
                    Some(verdict) => return *verdict,
                    None => panic!("probe `{id}` is synchronous"),
                },
            }
        };
        if let Some(verdict) = slot.verdict.get() {
            return *verdict;
        }

        let mut evaluation = slot.evaluation.lock().await;
        if let Some(verdict) = slot.verdict.get() {
            return *verdict;
        }
        let running = evaluation.get_or_insert_with(|| {
            slot.started.store(true, Ordering::Release);
            #[cfg(feature = "tracing")]
            tracing::debug!(probe = id.name(), "probe_started");
            let boxed: Evaluation = Box::pin(factory());
            boxed
        });
        let verdict = running.as_mut().await;

        let verdict = *slot.verdict.get_or_init(|| verdict);
        *evaluation = None;
        #[cfg(feature = "tracing")]
        tracing::debug!(probe = id.name(), verdict, "probe_settled");
        verdict
    }

    /// Forces a verdict without running the probe.
    ///
    /// Has no effect once the probe has started, so a verdict that callers
    /// may already have observed never changes.
    pub fn seed(&self, id: ProbeId, verdict: bool) -> bool {
        let mut slots = self.slots.lock();
        let untouched = match slots.get(&id) {
            None => true,
            Some(Slot::Sync(cell)) => cell.get().is_none(),
            Some(Slot::Async(slot)) => !slot.started.load(Ordering::Acquire),
            Some(Slot::Seeded(_)) => false,
        };
        if untouched {
            slots.insert(id, Slot::Seeded(verdict));
        }
        untouched
    }

    /// Current state of a probe.
    pub fn state(&self, id: ProbeId) -> ProbeState {
        match self.slots.lock().get(&id) {
            None => ProbeState::NotStarted,
            Some(Slot::Seeded(verdict)) => ProbeState::Settled(*verdict),
            Some(Slot::Sync(cell)) => cell
                .get()
                .map_or(ProbeState::NotStarted, |v| ProbeState::Settled(*v)),
            Some(Slot::Async(slot)) => match slot.verdict.get() {
                Some(verdict) => ProbeState::Settled(*verdict),
                None if slot.started.load(Ordering::Acquire) => ProbeState::Pending,
                None => ProbeState::NotStarted,
            },
        }
    }
}
