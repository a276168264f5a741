use super::*;
use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
};
use tokio::sync::Notify;

struct ScriptedImageSource {
    responses: Mutex<VecDeque<FetchResult<ImageRef>>>,
    calls: AtomicUsize,
}

impl ScriptedImageSource {
    fn new(responses: Vec<FetchResult<ImageRef>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for ScriptedImageSource {
    async fn fetch_one(&self) -> FetchResult<ImageRef> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(network_error("script exhausted")))
    }
}

/// Serves scripted responses, but call number `gated_call` (zero-based) waits
/// for `release` before taking its response.
struct GatedImageSource {
    responses: Mutex<VecDeque<FetchResult<ImageRef>>>,
    calls: AtomicUsize,
    gated_call: usize,
    entered: Notify,
    release: Notify,
}

impl GatedImageSource {
    fn new(gated_call: usize, responses: Vec<FetchResult<ImageRef>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            gated_call,
            entered: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl ImageSource for GatedImageSource {
    async fn fetch_one(&self) -> FetchResult<ImageRef> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.gated_call {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(network_error("script exhausted")))
    }
}

fn network_error(message: &str) -> FetchError {
    FetchError::Network {
        endpoint: "http://images.test/random.json".into(),
        message: message.into(),
    }
}

fn image(name: &str) -> ImageRef {
    ImageRef::new(format!("https://images.test/{name}.jpg"))
}

fn images(names: &[&str]) -> Vec<ImageRef> {
    names.iter().map(|name| image(name)).collect()
}

fn successes(names: &[&str]) -> Vec<FetchResult<ImageRef>> {
    names.iter().map(|name| Ok(image(name))).collect()
}

fn ready_state(names: &[&str]) -> RotationState {
    let mut state = RotationState::default();
    state
        .apply_batch(names.len(), successes(names))
        .expect("batch");
    state
}

async fn wait_for_status(
    events: &mut broadcast::Receiver<RotationEvent>,
    wanted: fn(&RotationStatus) -> bool,
) {
    loop {
        match events.recv().await.expect("event stream") {
            RotationEvent::StatusChanged(status) if wanted(&status) => return,
            _ => {}
        }
    }
}

#[test]
fn batch_with_all_successes_fills_window() {
    for n in 1..=8 {
        let names: Vec<String> = (0..n).map(|i| format!("img{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let state = ready_state(&refs);

        assert_eq!(state.window().len(), n);
        assert_eq!(state.status(), &RotationStatus::Ready);
        assert_eq!(state.pointer(), Some(0));
    }
}

#[test]
fn batch_with_all_failures_is_failed_and_empty() {
    let mut state = RotationState::default();
    let results = (0..5).map(|_| Err(network_error("down"))).collect();

    let err = state.apply_batch(5, results).expect_err("must fail");

    assert_eq!(err, RotationError::NoImages { requested: 5 });
    assert!(state.window().is_empty());
    assert_eq!(state.pointer(), None);
    assert_eq!(
        state.status(),
        &RotationStatus::Failed {
            reason: "no images could be retrieved".into()
        }
    );
}

#[test]
fn partial_batch_keeps_successes_in_slot_order() {
    let mut state = RotationState::default();
    let results = vec![
        Ok(image("a")),
        Err(network_error("slot 1")),
        Ok(image("c")),
        Err(network_error("slot 3")),
        Ok(image("e")),
    ];

    let loaded = state.apply_batch(5, results).expect("partial batch");

    assert_eq!(loaded, 3);
    assert_eq!(state.status(), &RotationStatus::Ready);
    let window: Vec<_> = state.window().iter().cloned().collect();
    assert_eq!(window, images(&["a", "c", "e"]));
}

#[test]
fn refresh_evicts_oldest_and_appends_newest() {
    let mut state = ready_state(&["a", "b", "c", "d", "e"]);

    let outcome = state.apply_refresh(state.generation(), Ok(image("f")));

    assert_eq!(
        outcome,
        RefreshOutcome::Replaced {
            evicted: image("a"),
            added: image("f"),
        }
    );
    assert_eq!(
        state.snapshot().images,
        images(&["b", "c", "d", "e", "f"])
    );
}

#[test]
fn refresh_keeps_length_on_success_and_failure() {
    let mut state = ready_state(&["a", "b", "c"]);

    state.apply_refresh(state.generation(), Ok(image("d")));
    assert_eq!(state.window().len(), 3);

    let outcome = state.apply_refresh(state.generation(), Err(network_error("flaky")));
    assert!(matches!(outcome, RefreshOutcome::Kept { .. }));
    assert_eq!(state.window().len(), 3);
    assert_eq!(state.snapshot().images, images(&["b", "c", "d"]));
}

#[test]
fn refresh_failure_is_counted_but_stays_ready() {
    let mut state = ready_state(&["a", "b"]);

    state.apply_refresh(state.generation(), Err(network_error("one")));
    state.apply_refresh(state.generation(), Err(network_error("two")));

    let snapshot = state.snapshot();
    assert_eq!(snapshot.status, RotationStatus::Ready);
    assert_eq!(snapshot.refresh_failures, 2);
    assert_eq!(snapshot.refreshes_applied, 0);
    assert!(snapshot.last_refreshed_at.is_none());
}

#[test]
fn refresh_outside_ready_is_skipped() {
    let mut state = RotationState::default();
    assert_eq!(
        state.apply_refresh(state.generation(), Ok(image("a"))),
        RefreshOutcome::Skipped
    );
    assert!(state.window().is_empty());
    assert_eq!(state.refresh_failures(), 0);
}

#[test]
fn refresh_from_previous_generation_is_dropped() {
    let mut state = ready_state(&["a", "b"]);
    let before = state.generation();

    state.begin_loading();
    state.apply_batch(2, successes(&["x", "y"])).expect("batch");

    assert_eq!(
        state.apply_refresh(before, Ok(image("stale"))),
        RefreshOutcome::Skipped
    );
    assert_eq!(
        state.apply_refresh(before, Err(network_error("late"))),
        RefreshOutcome::Skipped
    );
    let snapshot = state.snapshot();
    assert_eq!(snapshot.images, images(&["x", "y"]));
    assert_eq!(snapshot.refreshes_applied, 0);
    assert_eq!(snapshot.refresh_failures, 0);
}

#[test]
fn advance_cycles_back_to_start_after_len_steps() {
    let mut state = ready_state(&["a", "b", "c", "d"]);
    state.advance();
    let start = state.pointer();

    for _ in 0..4 {
        state.advance();
    }

    assert_eq!(state.pointer(), start);
}

#[test]
fn advance_on_empty_window_is_noop() {
    let mut state = RotationState::default();
    assert_eq!(state.advance(), None);
    assert_eq!(state.pointer(), None);

    let mut failed = RotationState::default();
    let _ = failed.apply_batch(1, vec![Err(network_error("down"))]);
    assert_eq!(failed.advance(), None);
}

#[test]
fn reinitialize_resets_pointer() {
    let mut state = ready_state(&["a", "b", "c"]);
    state.advance();
    state.advance();
    assert_eq!(state.pointer(), Some(2));

    state.begin_loading();
    assert_eq!(state.status(), &RotationStatus::Loading);
    assert_eq!(state.pointer(), None);

    state.apply_batch(2, successes(&["x", "y"])).expect("batch");
    assert_eq!(state.pointer(), Some(0));
    assert_eq!(state.window().len(), 2);
}

#[test]
fn schedule_rejects_advance_not_faster_than_refresh() {
    let err = RotationSchedule::new(5, Duration::from_secs(3), Duration::from_secs(3))
        .expect_err("equal periods");
    assert!(matches!(err, RotationError::InvalidSchedule(_)));

    assert!(RotationSchedule::new(0, DEFAULT_REFRESH_PERIOD, DEFAULT_ADVANCE_PERIOD).is_err());
    assert!(RotationSchedule::new(5, DEFAULT_REFRESH_PERIOD, Duration::ZERO).is_err());
    assert_eq!(
        RotationSchedule::new(5, DEFAULT_REFRESH_PERIOD, DEFAULT_ADVANCE_PERIOD).expect("valid"),
        RotationSchedule::default()
    );
}

#[test]
fn schedule_rejects_refresh_period_beyond_one_day() {
    let err = RotationSchedule::new(2, Duration::MAX, Duration::from_secs(3))
        .expect_err("unbounded refresh");
    assert!(matches!(err, RotationError::InvalidSchedule(_)));
    assert!(RotationSchedule::new(
        2,
        MAX_REFRESH_PERIOD + Duration::from_secs(1),
        Duration::from_secs(3)
    )
    .is_err());

    let longest = RotationSchedule::new(2, MAX_REFRESH_PERIOD, Duration::from_secs(3))
        .expect("one day is accepted");
    assert_eq!(longest.refresh_period(), MAX_REFRESH_PERIOD);
}

#[tokio::test]
async fn initialize_with_two_failures_yields_three_images() {
    let source = ScriptedImageSource::new(vec![
        Ok(image("a")),
        Err(network_error("slot 1")),
        Ok(image("c")),
        Err(network_error("slot 3")),
        Ok(image("e")),
    ]);
    let engine = RotationEngine::new(source.clone());

    let loaded = engine.initialize(5).await.expect("initialize");

    assert_eq!(loaded, 3);
    assert_eq!(source.calls(), 5);
    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.status, RotationStatus::Ready);
    assert_eq!(snapshot.images.len(), 3);
    assert_eq!(snapshot.current(), Some(&image("a")));
}

#[tokio::test]
async fn initialize_with_no_successes_fails_and_refresh_is_skipped() {
    let source = ScriptedImageSource::new(vec![]);
    let engine = RotationEngine::new(source.clone());

    let err = engine.initialize(3).await.expect_err("must fail");
    assert_eq!(err, RotationError::NoImages { requested: 3 });

    assert_eq!(engine.refresh_one().await, RefreshOutcome::Skipped);
    assert_eq!(engine.advance().await, None);
    assert_eq!(source.calls(), 3);

    let snapshot = engine.snapshot().await;
    assert!(matches!(snapshot.status, RotationStatus::Failed { .. }));
    assert!(snapshot.images.is_empty());
    assert_eq!(snapshot.current(), None);
}

#[tokio::test]
async fn failed_engine_can_be_reinitialized_manually() {
    let mut responses: Vec<FetchResult<ImageRef>> =
        (0..2).map(|_| Err(network_error("down"))).collect();
    responses.extend(successes(&["a", "b"]));
    let engine = RotationEngine::new(ScriptedImageSource::new(responses));

    assert!(engine.initialize(2).await.is_err());
    assert_eq!(engine.initialize(2).await.expect("retry"), 2);
    assert_eq!(engine.snapshot().await.status, RotationStatus::Ready);
}

#[tokio::test]
async fn refresh_in_flight_during_reinitialize_is_dropped() {
    let source = GatedImageSource::new(
        2,
        successes(&["i1", "i2", "i3", "i4", "stale"]),
    );
    let engine = RotationEngine::new(source.clone());
    engine.initialize(2).await.expect("first initialize");

    let pending = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.refresh_one().await }
    });
    source.entered.notified().await;

    engine.initialize(2).await.expect("second initialize");
    source.release.notify_one();
    let outcome = pending.await.expect("refresh task");

    assert_eq!(outcome, RefreshOutcome::Skipped);
    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.images, images(&["i3", "i4"]));
    assert_eq!(snapshot.refreshes_applied, 0);
    assert_eq!(snapshot.status, RotationStatus::Ready);
}

#[tokio::test]
async fn refresh_failure_emits_event_and_keeps_window() {
    let mut responses = successes(&["a", "b", "c"]);
    responses.push(Err(network_error("flaky")));
    let engine = RotationEngine::new(ScriptedImageSource::new(responses));
    engine.initialize(3).await.expect("initialize");
    let mut events = engine.subscribe();

    let outcome = engine.refresh_one().await;

    assert!(matches!(outcome, RefreshOutcome::Kept { .. }));
    match events.recv().await.expect("event") {
        RotationEvent::RefreshFailed { failures, .. } => assert_eq!(failures, 1),
        other => panic!("unexpected event: {other:?}"),
    }
    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.images, images(&["a", "b", "c"]));
    assert_eq!(snapshot.status, RotationStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn timers_advance_pointer_and_refresh_window() {
    let mut responses = successes(&["a", "b", "c", "d", "e"]);
    responses.push(Ok(image("f")));
    let source = ScriptedImageSource::new(responses);
    let engine = RotationEngine::new(source.clone());
    let mut events = engine.subscribe();

    let handle = engine.start(RotationSchedule::default());
    wait_for_status(&mut events, |status| *status == RotationStatus::Ready).await;
    assert_eq!(engine.snapshot().await.pointer, Some(0));

    tokio::time::sleep(Duration::from_millis(3_100)).await;
    assert_eq!(engine.snapshot().await.pointer, Some(1));

    tokio::time::sleep(Duration::from_secs(27)).await;
    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.images, images(&["b", "c", "d", "e", "f"]));
    assert_eq!(snapshot.refreshes_applied, 1);
    // ten advance ticks by t=30s on a window of five
    assert_eq!(snapshot.pointer, Some(0));

    handle.shutdown();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(engine.snapshot().await, snapshot);
    assert_eq!(source.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_stops_both_tasks() {
    let engine = RotationEngine::new(ScriptedImageSource::new(successes(&["a", "b"])));
    let mut events = engine.subscribe();

    let handle = engine.start(RotationSchedule::default());
    wait_for_status(&mut events, |status| *status == RotationStatus::Ready).await;
    drop(handle);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.snapshot().await.pointer, Some(0));
}

#[tokio::test(start_paused = true)]
async fn failed_start_never_advances() {
    let source = ScriptedImageSource::new(vec![]);
    let engine = RotationEngine::new(source.clone());
    let mut events = engine.subscribe();

    let handle = engine.start(RotationSchedule::default());
    wait_for_status(&mut events, |status| {
        matches!(status, RotationStatus::Failed { .. })
    })
    .await;

    tokio::time::sleep(Duration::from_secs(65)).await;
    assert!(handle.is_finished());
    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.pointer, None);
    assert_eq!(snapshot.refresh_failures, 0);
    assert_eq!(source.calls(), DEFAULT_WINDOW_SIZE);
}
