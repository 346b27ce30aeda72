//! Connection routing on live contexts, against every simulated engine.

mod common;

use common::{PROFILES, assert_all, live, natively_connected, pull, source};
use concord_core::{ConnectionTarget, DisconnectTarget, ErrorKind};

#[tokio::test]
async fn source_reaches_destination() {
    for profile in PROFILES {
        let context = live(profile).await;
        let src = source(&context, 0.5);
        let gain = context.create_gain().unwrap();

        src.connect(&gain, 0, 0)
            .unwrap()
            .connect(&context.destination(), 0, 0)
            .unwrap();

        assert!(natively_connected(&src, &gain), "{profile}");
        assert_all(&pull(&context, 4), 0.5);
        assert_eq!(context.connections().len(), 2, "{profile}");
    }
}

#[tokio::test]
async fn selective_disconnect_keeps_other_paths() {
    for profile in PROFILES {
        let context = live(profile).await;
        let destination = context.destination();
        let src = source(&context, 0.25);
        let kept = context.create_gain().unwrap();
        let dropped = context.create_gain().unwrap();

        src.connect(&kept, 0, 0).unwrap();
        src.connect(&dropped, 0, 0).unwrap();
        kept.connect(&destination, 0, 0).unwrap();
        dropped.connect(&destination, 0, 0).unwrap();
        assert_all(&pull(&context, 2), 0.5);

        src.disconnect(DisconnectTarget::node(&dropped)).unwrap();

        assert_all(&pull(&context, 2), 0.25);
        assert!(natively_connected(&src, &kept), "{profile}: kept edge lost");
        assert!(!natively_connected(&src, &dropped), "{profile}");
    }
}

#[tokio::test]
async fn disconnect_narrowed_by_input() {
    for profile in PROFILES {
        let context = live(profile).await;
        let src = source(&context, 1.0);
        let merger = context.create_channel_merger(2).unwrap();
        merger.connect(&context.destination(), 0, 0).unwrap();

        src.connect(&merger, 0, 0).unwrap();
        src.connect(&merger, 0, 1).unwrap();
        assert_all(&pull(&context, 1), 2.0);

        src.disconnect(DisconnectTarget::node_input(&merger, 0, 1))
            .unwrap();
        assert_all(&pull(&context, 1), 1.0);

        let remaining = context.connections();
        assert!(remaining.iter().any(|c| c.target
            == ConnectionTarget::Node {
                id: merger.id(),
                input: 0
            }));
        assert!(!remaining.iter().any(|c| c.target
            == ConnectionTarget::Node {
                id: merger.id(),
                input: 1
            }));
    }
}

#[tokio::test]
async fn disconnect_unconnected_destination_is_invalid_access() {
    let context = live("legacy-webkit").await;
    let src = source(&context, 1.0);
    let gain = context.create_gain().unwrap();
    let other = context.create_gain().unwrap();
    src.connect(&gain, 0, 0).unwrap();

    let err = src.disconnect(DisconnectTarget::node(&other)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAccess);
    // Nothing was torn down.
    assert!(natively_connected(&src, &gain));
}

#[tokio::test]
async fn disconnect_output_and_all() {
    for profile in PROFILES {
        let context = live(profile).await;
        let src = source(&context, 1.0);
        let a = context.create_gain().unwrap();
        let b = context.create_gain().unwrap();
        src.connect(&a, 0, 0).unwrap();
        src.connect(&b, 0, 0).unwrap();

        src.disconnect(DisconnectTarget::Output(0)).unwrap();
        assert!(!natively_connected(&src, &a));
        assert!(!natively_connected(&src, &b));
        assert!(context.connections().is_empty());

        // Disconnecting nothing is fine.
        src.disconnect_all().unwrap();

        let err = src.disconnect(DisconnectTarget::Output(3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexSize, "{profile}");
    }
}

#[tokio::test]
async fn index_errors_win_over_access_errors() {
    let context = live("conformant").await;
    let foreign = live("conformant").await;
    let src = source(&context, 1.0);
    let stranger = foreign.create_gain().unwrap();

    let err = src
        .disconnect(DisconnectTarget::node_output(&stranger, 7))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexSize);

    let err = src.disconnect(DisconnectTarget::node(&stranger)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAccess);
}

#[tokio::test]
async fn connect_index_errors() {
    for profile in PROFILES {
        let context = live(profile).await;
        let src = source(&context, 1.0);
        let gain = context.create_gain().unwrap();

        let err = src.connect(&gain, 1, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexSize, "{profile}");
        let err = src.connect(&gain, 0, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexSize, "{profile}");
        assert!(context.connections().is_empty());
    }
}

#[tokio::test]
async fn cross_context_connections_are_invalid_access() {
    for profile in PROFILES {
        let context = live(profile).await;
        let other = live(profile).await;
        let src = source(&context, 1.0);
        let foreign_gain = other.create_gain().unwrap();

        let err = src.connect(&foreign_gain, 0, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAccess, "{profile}");

        // legacy-webkit raises InvalidStateError natively here.
        let foreign_param = foreign_gain.param("gain").unwrap();
        let err = src.connect_param(&foreign_param, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAccess, "{profile}");

        assert!(context.connections().is_empty());
        assert!(other.connections().is_empty());
    }
}

#[tokio::test]
async fn param_modulation_adds_to_scheduled_value() {
    for profile in PROFILES {
        let context = live(profile).await;
        let carrier = source(&context, 1.0);
        let modulator = source(&context, 0.5);
        let gain = context.create_gain().unwrap();
        let level = gain.param("gain").unwrap();

        carrier.connect(&gain, 0, 0).unwrap();
        gain.connect(&context.destination(), 0, 0).unwrap();
        modulator.connect_param(&level, 0).unwrap();
        assert_all(&pull(&context, 2), 1.5);

        modulator
            .disconnect(DisconnectTarget::param(&level))
            .unwrap();
        assert_all(&pull(&context, 2), 1.0);

        let err = modulator
            .disconnect(DisconnectTarget::param(&level))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAccess, "{profile}");
    }
}

#[tokio::test]
async fn multi_input_processor() {
    for profile in PROFILES {
        let context = live(profile).await;
        let processor = context.create_processor(3, 1).unwrap();
        assert_eq!(processor.number_of_inputs(), 3);
        processor.connect(&context.destination(), 0, 0).unwrap();

        let sources: Vec<_> = [0.25, 0.5, 1.0]
            .into_iter()
            .map(|offset| source(&context, offset))
            .collect();
        for (input, src) in sources.iter().enumerate() {
            src.connect(&processor, 0, input as u32).unwrap();
        }
        assert_all(&pull(&context, 2), 1.75);

        sources[1]
            .disconnect(DisconnectTarget::node(&processor))
            .unwrap();
        assert_all(&pull(&context, 2), 1.25);

        let err = sources[0].connect(&processor, 0, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexSize, "{profile}");
    }
}

#[tokio::test]
async fn closed_context_rejects_new_nodes() {
    let context = live("conformant").await;
    context.close().unwrap();
    assert_eq!(
        context.create_gain().unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(context.close().unwrap_err().kind(), ErrorKind::InvalidState);
}
