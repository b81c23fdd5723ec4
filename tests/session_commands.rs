mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use common::{drain_applied, harness};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use wallpaper_rotator::config::{OrderMode, PlaybackConfig};
use wallpaper_rotator::events::{ApplyOrigin, StepDirection, StopReason};
use wallpaper_rotator::tasks::session;

fn per_second() -> PlaybackConfig {
    PlaybackConfig {
        per_item: Duration::from_secs(1),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn start_twice_runs_a_single_loop() {
    let h = harness(&["A", "B", "C"], per_second());
    let (commands, session) = session::channel(h.ctx.clone());
    let status = session.status();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cancel.clone()));

    commands.start().await.unwrap();
    commands.start().await.unwrap();
    sleep(Duration::from_millis(3500)).await;

    assert_eq!(h.sink.ids(), ["A", "B", "C", "A"]);
    assert!(status.borrow().running);
    assert_eq!(status.borrow().runs_started, 1);

    commands.stop().await.unwrap();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.sink.ids().len(), 4);
    assert!(!status.borrow().running);
    assert_eq!(status.borrow().last_stop, Some(StopReason::Stopped));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn manual_next_does_not_disturb_the_loop() {
    let h = harness(&["A", "B", "C"], per_second());
    let mut events = h.ctx.subscribe_events();
    let (commands, session) = session::channel(h.ctx.clone());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cancel.clone()));

    commands.start().await.unwrap();
    sleep(Duration::from_millis(500)).await;
    commands.next().await.unwrap();
    sleep(Duration::from_millis(3000)).await;

    // the manual write lands between ticks; the loop's own cursor is untouched
    assert_eq!(h.sink.ids(), ["A", "B", "B", "C", "A"]);

    let applied = drain_applied(&mut events);
    let scheduled: Vec<_> = applied
        .iter()
        .filter(|(_, origin)| matches!(origin, ApplyOrigin::Scheduled { .. }))
        .map(|(id, _)| id.as_str())
        .collect();
    assert_eq!(scheduled, ["A", "B", "C", "A"]);
    let manual: Vec<_> = applied
        .iter()
        .filter(|(_, origin)| *origin == ApplyOrigin::Manual(StepDirection::Next))
        .map(|(id, _)| id.as_str())
        .collect();
    assert_eq!(manual, ["B"]);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn prev_steps_backwards_from_the_first_element() {
    let h = harness(&["A", "B", "C"], per_second());
    let (commands, session) = session::channel(h.ctx.clone());
    let status = session.status();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cancel.clone()));

    commands.prev().await.unwrap();
    sleep(Duration::from_millis(100)).await;
    commands.next().await.unwrap();
    sleep(Duration::from_millis(100)).await;

    // manual steps work without an active loop
    assert_eq!(h.sink.ids(), ["C", "B"]);
    assert!(!status.borrow().running);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn toggle_alternates_between_running_and_stopped() {
    let h = harness(&["A", "B"], per_second());
    let (commands, session) = session::channel(h.ctx.clone());
    let status = session.status();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cancel.clone()));

    commands.toggle().await.unwrap();
    sleep(Duration::from_millis(1500)).await;
    assert!(status.borrow().running);
    assert_eq!(h.sink.ids(), ["A", "B"]);

    commands.toggle().await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert!(!status.borrow().running);

    // a fresh loop starts over from the first image
    commands.toggle().await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert!(status.borrow().running);
    assert_eq!(status.borrow().runs_started, 2);
    assert_eq!(h.sink.ids(), ["A", "B", "A"]);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn max_duration_is_reported_as_a_normal_stop() {
    let h = harness(
        &["A", "B", "C"],
        PlaybackConfig {
            max_duration: Some(Duration::from_secs(2)),
            ..per_second()
        },
    );
    let (commands, session) = session::channel(h.ctx.clone());
    let status = session.status();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cancel.clone()));

    commands.start().await.unwrap();
    sleep(Duration::from_secs(5)).await;

    assert_eq!(h.sink.ids(), ["A", "B", "C"]);
    assert!(!status.borrow().running);
    assert_eq!(status.borrow().last_stop, Some(StopReason::MaxDuration));

    // start after the cutoff creates a new loop
    commands.start().await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert!(status.borrow().running);
    assert_eq!(status.borrow().runs_started, 2);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn dropping_every_channel_closes_the_session() {
    let h = harness(&["A"], per_second());
    let (commands, session) = session::channel(h.ctx.clone());
    let handle = tokio::spawn(session.run(CancellationToken::new()));

    commands.start().await.unwrap();
    sleep(Duration::from_millis(10)).await;
    drop(commands);

    handle.await.unwrap().unwrap();
    assert_eq!(h.sink.ids(), ["A"]);
}

#[tokio::test(start_paused = true)]
async fn random_steps_reshuffle_every_time() {
    let selection = ["A", "B", "C", "D", "E"];
    let h = harness(
        &selection,
        PlaybackConfig {
            order: OrderMode::Random,
            ..per_second()
        },
    );
    let mut events = h.ctx.subscribe_events();
    let (commands, session) = session::channel(h.ctx.clone());
    let status = session.status();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cancel.clone()));

    for i in 0..24 {
        if i % 2 == 0 {
            commands.next().await.unwrap();
        } else {
            commands.prev().await.unwrap();
        }
        sleep(Duration::from_millis(50)).await;
    }

    let shown = h.sink.ids();
    assert_eq!(shown.len(), 24);
    assert!(shown.iter().all(|id| selection.contains(&id.as_str())));
    // a reused order would land on the same image for every Next
    let distinct: BTreeSet<_> = shown.iter().step_by(2).collect();
    assert!(distinct.len() > 1, "every next showed {distinct:?}");

    let applied = drain_applied(&mut events);
    assert_eq!(applied.len(), 24);
    assert!(applied
        .iter()
        .all(|(_, origin)| matches!(origin, ApplyOrigin::Manual(_))));
    assert!(!status.borrow().running);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}
