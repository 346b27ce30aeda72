//! Shared helpers for the shim-on-simulator integration tests.
#![allow(dead_code)]

use concord_config::ShimConfig;
use concord_core::{AudioNode, Context, NativeBackendRef, OfflineOptions};
use concord_sim::{SimBackend, SimContext};
use tracing_subscriber::EnvFilter;

pub const SAMPLE_RATE: f32 = 44_100.0;

/// Every built-in engine profile.
pub const PROFILES: [&str; 3] = ["conformant", "legacy-webkit", "legacy-gecko"];

/// Routes shim logs to the test output. Set `RUST_LOG=concord_core=debug`
/// to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn backend(profile: &str) -> NativeBackendRef {
    SimBackend::builtin(profile)
        .unwrap_or_else(|err| panic!("{err}"))
        .into_ref()
}

pub async fn live_on(backend: &NativeBackendRef) -> Context {
    init_tracing();
    Context::new_live(backend, &ShimConfig::default())
        .await
        .expect("live context")
}

pub async fn live(profile: &str) -> Context {
    live_on(&backend(profile)).await
}

pub async fn offline(profile: &str, length: usize) -> Context {
    init_tracing();
    Context::new_offline(
        &backend(profile),
        OfflineOptions::new(1, length, SAMPLE_RATE),
        &ShimConfig::default(),
    )
    .await
    .expect("offline context")
}

/// Runs `f` against the simulated context behind `context`.
pub fn with_sim<R>(context: &Context, f: impl FnOnce(&SimContext) -> R) -> R {
    let native = context.native();
    let sim = SimContext::downcast(native.as_ref()).expect("context runs on the simulator");
    f(sim)
}

/// Pulls `frames` frames from a live context.
pub fn pull(context: &Context, frames: usize) -> Vec<f32> {
    with_sim(context, |sim| sim.pull(frames))
}

/// True when the native graph has an edge from `source` into `destination`.
pub fn natively_connected(source: &AudioNode, destination: &AudioNode) -> bool {
    with_sim(&source.context(), |sim| {
        sim.is_connected(source.native().as_ref(), destination.native().as_ref())
    })
}

/// Started constant source emitting `offset`.
pub fn source(context: &Context, offset: f32) -> AudioNode {
    let source = context.create_constant_source().unwrap();
    source.param("offset").unwrap().set_value(offset).unwrap();
    source.start(0.0).unwrap();
    source
}

pub fn assert_all(samples: &[f32], expected: f32) {
    assert!(!samples.is_empty());
    for (i, &sample) in samples.iter().enumerate() {
        assert!(
            (sample - expected).abs() < 1e-6,
            "sample {i} is {sample}, expected {expected}"
        );
    }
}
