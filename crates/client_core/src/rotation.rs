//! Rotating image window: a fixed-size FIFO of image URLs refreshed on one
//! timer and cycled through by a display pointer on another.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use shared::{
    domain::ImageRef,
    error::{FetchError, FetchResult},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{fetch_batch, ImageSource};

pub const DEFAULT_WINDOW_SIZE: usize = 5;
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(30);
pub const DEFAULT_ADVANCE_PERIOD: Duration = Duration::from_secs(3);
pub const MAX_REFRESH_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RotationError {
    #[error("no images could be retrieved")]
    NoImages { requested: usize },
    #[error("invalid rotation schedule: {0}")]
    InvalidSchedule(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSchedule {
    window_size: usize,
    refresh_period: Duration,
    advance_period: Duration,
}

impl RotationSchedule {
    pub fn new(
        window_size: usize,
        refresh_period: Duration,
        advance_period: Duration,
    ) -> Result<Self, RotationError> {
        if window_size == 0 {
            return Err(RotationError::InvalidSchedule(
                "window size must be at least 1".into(),
            ));
        }
        if advance_period.is_zero() {
            return Err(RotationError::InvalidSchedule(
                "advance period must be non-zero".into(),
            ));
        }
        if refresh_period > MAX_REFRESH_PERIOD {
            return Err(RotationError::InvalidSchedule(format!(
                "refresh period {refresh_period:?} exceeds the maximum of {MAX_REFRESH_PERIOD:?}"
            )));
        }
        if advance_period >= refresh_period {
            return Err(RotationError::InvalidSchedule(format!(
                "advance period {advance_period:?} must be shorter than refresh period {refresh_period:?}"
            )));
        }

        Ok(Self {
            window_size,
            refresh_period,
            advance_period,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn refresh_period(&self) -> Duration {
        self.refresh_period
    }

    pub fn advance_period(&self) -> Duration {
        self.advance_period
    }
}

impl Default for RotationSchedule {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            refresh_period: DEFAULT_REFRESH_PERIOD,
            advance_period: DEFAULT_ADVANCE_PERIOD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationStatus {
    Loading,
    Ready,
    Failed { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageWindow {
    images: VecDeque<ImageRef>,
}

impl ImageWindow {
    fn from_images(images: Vec<ImageRef>) -> Self {
        Self {
            images: images.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ImageRef> {
        self.images.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRef> {
        self.images.iter()
    }

    /// Evicts the oldest image and appends `image`. Length is unchanged; an
    /// empty window stays empty.
    fn replace_oldest(&mut self, image: ImageRef) -> Option<ImageRef> {
        let evicted = self.images.pop_front()?;
        self.images.push_back(image);
        Some(evicted)
    }

    fn clear(&mut self) {
        self.images.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Replaced { evicted: ImageRef, added: ImageRef },
    Kept { error: FetchError },
    /// Not in `Ready`; nothing was fetched.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarouselSnapshot {
    pub status: RotationStatus,
    pub images: Vec<ImageRef>,
    pub pointer: Option<usize>,
    pub refresh_failures: u64,
    pub refreshes_applied: u64,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl CarouselSnapshot {
    pub fn current(&self) -> Option<&ImageRef> {
        self.pointer.and_then(|pointer| self.images.get(pointer))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationEvent {
    StatusChanged(RotationStatus),
    Refreshed { added: ImageRef },
    RefreshFailed { error: FetchError, failures: u64 },
    Advanced { pointer: usize },
}

/// Window, pointer and status of one carousel. Only changes through
/// [`begin_loading`](Self::begin_loading), [`apply_batch`](Self::apply_batch),
/// [`apply_refresh`](Self::apply_refresh) and [`advance`](Self::advance).
///
/// `generation` counts initializations; a refresh fetched under an older
/// generation is dropped.
#[derive(Debug, Clone)]
pub struct RotationState {
    generation: u64,
    window: ImageWindow,
    pointer: Option<usize>,
    status: RotationStatus,
    refresh_failures: u64,
    refreshes_applied: u64,
    last_refreshed_at: Option<DateTime<Utc>>,
}

impl Default for RotationState {
    fn default() -> Self {
        Self {
            generation: 0,
            window: ImageWindow::default(),
            pointer: None,
            status: RotationStatus::Loading,
            refresh_failures: 0,
            refreshes_applied: 0,
            last_refreshed_at: None,
        }
    }
}

impl RotationState {
    pub fn status(&self) -> &RotationStatus {
        &self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == RotationStatus::Ready
    }

    pub fn window(&self) -> &ImageWindow {
        &self.window
    }

    pub fn pointer(&self) -> Option<usize> {
        self.pointer
    }

    pub fn refresh_failures(&self) -> u64 {
        self.refresh_failures
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn begin_loading(&mut self) {
        self.generation += 1;
        self.status = RotationStatus::Loading;
        self.window.clear();
        self.pointer = None;
    }

    /// Installs the successful slots of an initial batch, in slot order.
    pub fn apply_batch(
        &mut self,
        requested: usize,
        results: Vec<FetchResult<ImageRef>>,
    ) -> Result<usize, RotationError> {
        let mut images = Vec::with_capacity(results.len());
        for (slot, result) in results.into_iter().enumerate() {
            match result {
                Ok(image) => images.push(image),
                Err(err) => warn!(
                    slot,
                    endpoint = err.endpoint(),
                    "rotation: initial fetch failed: {err}"
                ),
            }
        }

        if images.is_empty() {
            let err = RotationError::NoImages { requested };
            self.window.clear();
            self.pointer = None;
            self.status = RotationStatus::Failed {
                reason: err.to_string(),
            };
            return Err(err);
        }

        let count = images.len();
        self.window = ImageWindow::from_images(images);
        self.pointer = Some(0);
        self.status = RotationStatus::Ready;
        Ok(count)
    }

    pub fn apply_refresh(
        &mut self,
        generation: u64,
        result: FetchResult<ImageRef>,
    ) -> RefreshOutcome {
        if !self.is_ready() || generation != self.generation {
            return RefreshOutcome::Skipped;
        }

        match result {
            Ok(image) => match self.window.replace_oldest(image.clone()) {
                Some(evicted) => {
                    self.refreshes_applied += 1;
                    self.last_refreshed_at = Some(Utc::now());
                    RefreshOutcome::Replaced {
                        evicted,
                        added: image,
                    }
                }
                None => RefreshOutcome::Skipped,
            },
            Err(error) => {
                self.refresh_failures += 1;
                RefreshOutcome::Kept { error }
            }
        }
    }

    pub fn advance(&mut self) -> Option<usize> {
        if !self.is_ready() || self.window.is_empty() {
            return None;
        }

        let len = self.window.len();
        let next = self.pointer.map_or(0, |pointer| (pointer + 1) % len);
        self.pointer = Some(next);
        Some(next)
    }

    pub fn snapshot(&self) -> CarouselSnapshot {
        CarouselSnapshot {
            status: self.status.clone(),
            images: self.window.iter().cloned().collect(),
            pointer: self.pointer,
            refresh_failures: self.refresh_failures,
            refreshes_applied: self.refreshes_applied,
            last_refreshed_at: self.last_refreshed_at,
        }
    }
}

pub struct RotationEngine {
    source: Arc<dyn ImageSource>,
    state: Mutex<RotationState>,
    events: broadcast::Sender<RotationEvent>,
}

impl RotationEngine {
    pub fn new(source: Arc<dyn ImageSource>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            source,
            state: Mutex::new(RotationState::default()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RotationEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> CarouselSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Fetches `count` images concurrently and installs whatever succeeded.
    /// Callable again from any state to start over.
    pub async fn initialize(&self, count: usize) -> Result<usize, RotationError> {
        self.state.lock().await.begin_loading();
        let _ = self
            .events
            .send(RotationEvent::StatusChanged(RotationStatus::Loading));
        info!(count, "rotation: fetching initial image batch");

        let results = fetch_batch(self.source.as_ref(), count).await;

        let (outcome, status) = {
            let mut state = self.state.lock().await;
            let outcome = state.apply_batch(count, results);
            (outcome, state.status().clone())
        };
        match &outcome {
            Ok(loaded) => info!(requested = count, loaded, "rotation: window ready"),
            Err(err) => warn!(requested = count, "rotation: initialization failed: {err}"),
        }
        let _ = self.events.send(RotationEvent::StatusChanged(status));

        outcome
    }

    pub async fn refresh_one(&self) -> RefreshOutcome {
        let generation = {
            let state = self.state.lock().await;
            if !state.is_ready() {
                debug!("rotation: refresh skipped, window not ready");
                return RefreshOutcome::Skipped;
            }
            state.generation()
        };

        // Fetched without the lock held so advance ticks keep running.
        let result = self.source.fetch_one().await;

        let (outcome, failures) = {
            let mut state = self.state.lock().await;
            let outcome = state.apply_refresh(generation, result);
            if outcome == RefreshOutcome::Skipped {
                debug!(
                    generation,
                    current = state.generation(),
                    "rotation: refresh dropped, window was reinitialized"
                );
            }
            (outcome, state.refresh_failures())
        };
        match &outcome {
            RefreshOutcome::Replaced { evicted, added } => {
                debug!(evicted = %evicted, added = %added, "rotation: replaced oldest image");
                let _ = self.events.send(RotationEvent::Refreshed {
                    added: added.clone(),
                });
            }
            RefreshOutcome::Kept { error } => {
                warn!(
                    failures,
                    endpoint = error.endpoint(),
                    "rotation: refresh failed, keeping current window: {error}"
                );
                let _ = self.events.send(RotationEvent::RefreshFailed {
                    error: error.clone(),
                    failures,
                });
            }
            RefreshOutcome::Skipped => {}
        }

        outcome
    }

    pub async fn advance(&self) -> Option<usize> {
        let pointer = self.state.lock().await.advance();
        if let Some(pointer) = pointer {
            let _ = self.events.send(RotationEvent::Advanced { pointer });
        }
        pointer
    }

    /// Spawns the refresh task (initialization, then one refresh per refresh
    /// period) and the advance task. Both stop when the handle is shut down
    /// or dropped, and both end if initialization fails.
    pub fn start(self: &Arc<Self>, schedule: RotationSchedule) -> RotationHandle {
        let advance_engine = Arc::clone(self);
        let advance_task = tokio::spawn(async move {
            let period = schedule.advance_period();
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                advance_engine.advance().await;
            }
        });

        let advance_abort = advance_task.abort_handle();
        let refresh_engine = Arc::clone(self);
        let refresh_task = tokio::spawn(async move {
            if let Err(err) = refresh_engine.initialize(schedule.window_size()).await {
                info!("rotation: stopping timers: {err}");
                advance_abort.abort();
                return;
            }

            let period = schedule.refresh_period();
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                refresh_engine.refresh_one().await;
            }
        });

        info!(
            window_size = schedule.window_size(),
            refresh_secs = schedule.refresh_period().as_secs_f64(),
            advance_secs = schedule.advance_period().as_secs_f64(),
            "rotation: started"
        );

        RotationHandle {
            refresh_task,
            advance_task,
        }
    }
}

pub struct RotationHandle {
    refresh_task: JoinHandle<()>,
    advance_task: JoinHandle<()>,
}

impl RotationHandle {
    pub fn shutdown(&self) {
        self.refresh_task.abort();
        self.advance_task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.refresh_task.is_finished() && self.advance_task.is_finished()
    }
}

impl Drop for RotationHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/rotation_tests.rs"]
mod tests;
