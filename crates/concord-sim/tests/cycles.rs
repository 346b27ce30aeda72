//! Cycles without delay are legal to build and render as silence.

mod common;

use common::{PROFILES, assert_all, live, offline, pull, source};
use concord_config::ShimConfig;
use concord_core::{AudioNode, Context, DisconnectTarget, OfflineOptions};

/// `src → a → b → a` with `b → destination`, plus a clean `src → c →
/// destination` path. Returns the nodes on the cycle.
fn build(context: &Context, offset: f32) -> (AudioNode, AudioNode) {
    let destination = context.destination();
    let src = source(context, offset);
    let a = context.create_gain().unwrap();
    let b = context.create_gain().unwrap();
    let c = context.create_gain().unwrap();

    src.connect(&a, 0, 0).unwrap();
    a.connect(&b, 0, 0).unwrap();
    b.connect(&a, 0, 0).unwrap();
    b.connect(&destination, 0, 0).unwrap();
    src.connect(&c, 0, 0).unwrap();
    c.connect(&destination, 0, 0).unwrap();
    (a, b)
}

#[tokio::test]
async fn live_cycle_is_silent() {
    for profile in PROFILES {
        let context = live(profile).await;
        let _cycle = build(&context, 0.5);
        // Only the clean path is audible.
        assert_all(&pull(&context, 8), 0.5);
    }
}

#[tokio::test]
async fn breaking_a_live_cycle_restores_signal() {
    let context = live("legacy-webkit").await;
    let (a, b) = build(&context, 0.5);
    b.disconnect(DisconnectTarget::node(&a)).unwrap();
    assert_all(&pull(&context, 4), 1.0);
}

#[tokio::test]
async fn offline_cycle_renders_silence() {
    for profile in PROFILES {
        let context = offline(profile, 32).await;
        let _cycle = build(&context, 0.25);
        let buffer = context.start_rendering().await.unwrap();
        assert_all(buffer.channel(0).unwrap(), 0.25);
    }
}

#[tokio::test]
async fn unmuted_cycles_are_left_to_the_engine() {
    let mut config = ShimConfig::default();
    config.render.mute_cycles = false;
    let context = Context::new_offline(
        &common::backend("conformant"),
        OfflineOptions::new(1, 8, common::SAMPLE_RATE),
        &config,
    )
    .await
    .unwrap();
    let _cycle = build(&context, 0.25);

    let buffer = context.start_rendering().await.unwrap();
    assert_all(buffer.channel(0).unwrap(), 0.25);
}

#[tokio::test]
async fn self_loop() {
    let context = offline("conformant", 8).await;
    let src = source(&context, 1.0);
    let gain = context.create_gain().unwrap();
    src.connect(&gain, 0, 0).unwrap();
    gain.connect(&gain, 0, 0).unwrap();
    gain.connect(&context.destination(), 0, 0).unwrap();

    let buffer = context.start_rendering().await.unwrap();
    assert_all(buffer.channel(0).unwrap(), 0.0);
}
