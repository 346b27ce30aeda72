//! Capability probing and the adapters installed for missing capabilities.

mod common;

use common::{backend, live, live_on, offline};
use concord_config::ShimConfig;
use concord_core::capability::probes;
use concord_core::capability::{
    ALL_PROBES, CANCEL_AND_HOLD, MULTI_INPUT_PROCESSOR, SELECTIVE_DISCONNECT,
};
use concord_core::{
    AutomationEvent, Capabilities, Context, ErrorKind, NativeBackend, NativeContextOptions,
    ProbeCache, ProbeState,
};
use concord_sim::{SimBackend, SimParam};

#[tokio::test]
async fn verdicts_follow_the_engine() {
    let conformant = live("conformant").await;
    assert_eq!(conformant.capabilities(), Capabilities::CONFORMANT);

    let webkit = live("legacy-webkit").await;
    assert_eq!(
        webkit.capabilities(),
        Capabilities {
            selective_disconnect: false,
            cancel_and_hold: false,
            exponential_ramp_validation: false,
            frequency_response_validation: false,
            multi_input_processor: false,
        }
    );

    let gecko = offline("legacy-gecko", 8).await;
    assert_eq!(
        gecko.capabilities(),
        Capabilities {
            cancel_and_hold: false,
            frequency_response_validation: false,
            ..Capabilities::CONFORMANT
        }
    );
}

#[tokio::test]
async fn probes_run_once_per_backend() {
    let shared = backend("legacy-webkit");
    let cache = ProbeCache::for_backend(&shared);
    for id in ALL_PROBES {
        assert_eq!(cache.state(id), ProbeState::NotStarted);
    }

    let first = live_on(&shared).await;
    for id in ALL_PROBES {
        assert_eq!(cache.state(id), ProbeState::Settled(false), "{id}");
    }

    // A later context reuses the verdicts without probing its own engine.
    let second = live_on(&shared).await;
    assert_eq!(first.capabilities(), second.capabilities());
    assert!(std::sync::Arc::ptr_eq(
        &cache,
        &ProbeCache::for_backend(&shared)
    ));

    // A different backend probes afresh.
    let other = backend("conformant");
    assert_eq!(
        ProbeCache::for_backend(&other).state(SELECTIVE_DISCONNECT),
        ProbeState::NotStarted
    );
}

#[tokio::test]
async fn concurrent_contexts_share_one_probe() {
    let shared = backend("conformant");
    let (a, b) = tokio::join!(live_on(&shared), live_on(&shared));
    assert_eq!(a.capabilities(), Capabilities::CONFORMANT);
    assert_eq!(b.capabilities(), Capabilities::CONFORMANT);
    assert_eq!(
        ProbeCache::for_backend(&shared).state(SELECTIVE_DISCONNECT),
        ProbeState::Settled(true)
    );
}

#[tokio::test]
async fn configured_overrides_win() {
    common::init_tracing();
    let config = ShimConfig::default()
        .with_probe("cancel-and-hold", false)
        .with_probe("multi-input-processor", false);
    let context = Context::new_live(&backend("conformant"), &config)
        .await
        .unwrap();

    let capabilities = context.capabilities();
    assert!(!capabilities.cancel_and_hold);
    assert!(!capabilities.multi_input_processor);
    assert!(capabilities.selective_disconnect);

    let cache = ProbeCache::for_backend(context.backend());
    assert_eq!(cache.state(CANCEL_AND_HOLD), ProbeState::Settled(false));
    assert_eq!(cache.state(MULTI_INPUT_PROCESSOR), ProbeState::Settled(false));

    // The emulated path works on a conformant engine too.
    let gain = context.create_gain().unwrap();
    let level = gain.param("gain").unwrap();
    level.linear_ramp_to_value_at_time(0.0, 1.0).unwrap();
    level.cancel_and_hold_at_time(0.5).unwrap();
}

#[test]
fn sync_probes_against_engines() {
    let options = NativeContextOptions::default();
    let conformant = SimBackend::conformant().create_context(&options).unwrap();
    assert!(probes::cancel_and_hold(conformant.as_ref()));
    assert!(probes::exponential_ramp_validation(conformant.as_ref()));
    assert!(probes::frequency_response_validation(conformant.as_ref()));
    assert!(probes::multi_input_processor(conformant.as_ref()));

    let gecko = SimBackend::builtin("legacy-gecko")
        .unwrap()
        .create_context(&options)
        .unwrap();
    assert!(!probes::cancel_and_hold(gecko.as_ref()));
    assert!(probes::exponential_ramp_validation(gecko.as_ref()));
    assert!(!probes::frequency_response_validation(gecko.as_ref()));
}

#[tokio::test]
async fn selective_disconnect_probe_renders() {
    assert!(probes::selective_disconnect(backend("conformant")).await);
    assert!(!probes::selective_disconnect(backend("legacy-webkit")).await);
}

#[tokio::test]
async fn cancel_and_hold_is_emulated() {
    let context = live("legacy-gecko").await;
    let gain = context.create_gain().unwrap();
    let level = gain.param("gain").unwrap();

    level
        .set_value_at_time(0.0, 0.0)
        .unwrap()
        .linear_ramp_to_value_at_time(1.0, 1.0)
        .unwrap()
        .cancel_and_hold_at_time(0.5)
        .unwrap();

    let native = level.native();
    let sim = SimParam::downcast(native.as_ref()).unwrap();
    assert_eq!(
        sim.scheduled(),
        vec![
            AutomationEvent::SetValue {
                value: 0.0,
                time: 0.0
            },
            AutomationEvent::LinearRamp {
                value: 0.5,
                end_time: 0.5
            },
        ]
    );
    assert!((sim.value_at(0.25) - 0.25).abs() < 1e-6);
    assert!((sim.value_at(3.0) - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn native_cancel_and_hold_is_used_when_present() {
    let context = live("conformant").await;
    let gain = context.create_gain().unwrap();
    let level = gain.param("gain").unwrap();
    level
        .set_value_at_time(0.0, 0.0)
        .unwrap()
        .linear_ramp_to_value_at_time(1.0, 1.0)
        .unwrap()
        .cancel_and_hold_at_time(0.5)
        .unwrap();

    let native = level.native();
    let sim = SimParam::downcast(native.as_ref()).unwrap();
    assert!((sim.value_at(3.0) - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn exponential_ramp_to_zero_is_a_range_error() {
    for profile in common::PROFILES {
        let context = live(profile).await;
        let gain = context.create_gain().unwrap();
        let level = gain.param("gain").unwrap();

        let err = level
            .exponential_ramp_to_value_at_time(0.0, 1.0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range, "{profile}");
        level.exponential_ramp_to_value_at_time(0.5, 1.0).unwrap();

        let native = level.native();
        let sim = SimParam::downcast(native.as_ref()).unwrap();
        assert_eq!(sim.scheduled().len(), 1, "{profile}: rejected ramp reached the engine");
    }
}

#[tokio::test]
async fn frequency_response_lengths_are_checked() {
    for profile in common::PROFILES {
        let context = live(profile).await;
        let filter = context.create_biquad_filter().unwrap();
        let frequencies = [0.0, 350.0, 20_000.0, 30_000.0];

        let mut magnitude = [0.0; 3];
        let mut phase = [0.0; 4];
        let err = filter
            .get_frequency_response(&frequencies, &mut magnitude, &mut phase)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAccess, "{profile}");

        let mut magnitude = [0.0; 4];
        filter
            .get_frequency_response(&frequencies, &mut magnitude, &mut phase)
            .unwrap();
        assert!((magnitude[0] - 1.0).abs() < 1e-3, "{profile}: DC gain {}", magnitude[0]);
        assert!(magnitude[2] < magnitude[1], "{profile}");
        assert!(magnitude[3].is_nan() && phase[3].is_nan(), "{profile}");
    }
}

#[tokio::test]
async fn frequency_response_needs_a_filter() {
    let context = live("conformant").await;
    let gain = context.create_gain().unwrap();
    let err = gain
        .get_frequency_response(&[440.0], &mut [0.0], &mut [0.0])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotSupported);
}

#[tokio::test]
async fn processor_limits() {
    let webkit = live("legacy-webkit").await;
    assert!(webkit.capabilities().needs_composite(2));
    let processor = webkit.create_processor(4, 2).unwrap();
    assert_eq!(processor.number_of_inputs(), 4);
    assert_eq!(processor.number_of_outputs(), 2);

    let conformant = live("conformant").await;
    assert_eq!(
        conformant.create_processor(0, 0).unwrap_err().kind(),
        ErrorKind::NotSupported
    );
    assert_eq!(
        conformant.create_channel_merger(33).unwrap_err().kind(),
        ErrorKind::IndexSize
    );
}
