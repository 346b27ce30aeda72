//! Events raised by native objects reach listeners with the wrapper as
//! their target.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{SAMPLE_RATE, live, offline, pull, source};
use concord_core::{AudioNode, Context, Event, EventListener};
use parking_lot::Mutex;

fn counting_node_listener(
    expected: &AudioNode,
    count: &Arc<AtomicUsize>,
) -> EventListener<AudioNode> {
    let expected = expected.clone();
    let count = Arc::clone(count);
    Arc::new(move |node: &AudioNode, event: &Event| {
        assert_eq!(event.event_type(), "ended");
        assert_eq!(node, &expected);
        assert_eq!(event.target::<AudioNode>().as_ref(), Some(&expected));
        assert_eq!(event.current_target::<AudioNode>().as_ref(), Some(&expected));
        count.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test]
async fn ended_targets_the_wrapper() {
    for profile in common::PROFILES {
        let context = offline(profile, 16).await;
        let src = source(&context, 1.0);
        src.connect(&context.destination(), 0, 0).unwrap();
        src.stop(4.0 / f64::from(SAMPLE_RATE)).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        src.add_event_listener("ended", counting_node_listener(&src, &count));

        let buffer = context.start_rendering().await.unwrap();
        let samples = buffer.channel(0).unwrap();
        assert_eq!(&samples[..4], &[1.0; 4]);
        assert_eq!(&samples[4..], &[0.0; 12]);
        assert_eq!(count.load(Ordering::SeqCst), 1, "{profile}");
    }
}

#[tokio::test]
async fn same_listener_registers_once() {
    let context = live("conformant").await;
    let src = source(&context, 1.0);
    src.stop(1.0 / f64::from(SAMPLE_RATE)).unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    let listener = counting_node_listener(&src, &count);
    src.add_event_listener("ended", Arc::clone(&listener));
    src.add_event_listener("ended", listener);

    pull(&context, 4);
    pull(&context, 4);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn removed_listener_is_not_called() {
    let context = live("legacy-webkit").await;
    let src = source(&context, 1.0);
    src.stop(1.0 / f64::from(SAMPLE_RATE)).unwrap();

    let removed = Arc::new(AtomicUsize::new(0));
    let kept = Arc::new(AtomicUsize::new(0));
    let removed_listener = counting_node_listener(&src, &removed);
    src.add_event_listener("ended", Arc::clone(&removed_listener));
    src.add_event_listener("ended", counting_node_listener(&src, &kept));
    src.remove_event_listener("ended", &removed_listener);

    pull(&context, 4);
    assert_eq!(removed.load(Ordering::SeqCst), 0);
    assert_eq!(kept.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn onended_handler_slot() {
    let context = live("legacy-gecko").await;
    let first = source(&context, 1.0);
    let second = source(&context, 1.0);
    first.stop(1.0 / f64::from(SAMPLE_RATE)).unwrap();
    second.stop(1.0 / f64::from(SAMPLE_RATE)).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    first.set_onended(Some(counting_node_listener(&first, &fired)));
    second.set_onended(Some(counting_node_listener(&second, &fired)));
    second.set_onended(None);

    pull(&context, 4);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn statechange_targets_the_context() {
    let context = live("conformant").await;
    let seen: Arc<Mutex<Vec<bool>>> = Arc::default();

    let log = Arc::clone(&seen);
    let expected = context.clone();
    let listener: EventListener<Context> = Arc::new(move |target: &Context, event: &Event| {
        assert_eq!(event.event_type(), "statechange");
        log.lock()
            .push(target == &expected && event.target::<Context>().as_ref() == Some(&expected));
    });
    context.set_onstatechange(Some(listener));

    context.suspend().unwrap();
    context.resume().unwrap();
    // Already running: no transition, no event.
    context.resume().unwrap();

    assert_eq!(*seen.lock(), vec![true, true]);
}

#[tokio::test]
async fn listeners_do_not_keep_wrappers_alive() {
    let context = live("conformant").await;
    let src = source(&context, 1.0);
    let weak = src.downgrade();

    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    src.add_event_listener(
        "ended",
        Arc::new(move |_: &AudioNode, _: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    drop(src);

    assert!(weak.upgrade().is_none());
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn removed_self_capturing_listener_frees_the_node() {
    let context = live("conformant").await;
    let src = source(&context, 1.0);
    let weak = src.downgrade();

    let captured = src.clone();
    let listener: EventListener<AudioNode> = Arc::new(move |_: &AudioNode, _: &Event| {
        let _ = captured.kind();
    });
    src.add_event_listener("ended", Arc::clone(&listener));
    src.remove_event_listener("ended", &listener);
    drop(listener);
    drop(src);

    assert!(weak.upgrade().is_none());
}

#[tokio::test]
async fn cleared_handler_slot_frees_the_node() {
    let context = live("legacy-webkit").await;
    let src = source(&context, 1.0);
    let weak = src.downgrade();

    let captured = src.clone();
    src.set_onended(Some(Arc::new(move |_: &AudioNode, _: &Event| {
        let _ = captured.kind();
    })));
    src.set_onended(None);
    drop(src);

    assert!(weak.upgrade().is_none());
}
