//! Tokio event loop around a [`CloverEngine`].
//!
//! Four tasks share the engine behind one async mutex:
//! - location: drains the fix channel in order, restarting the spawn ticker on movement
//! - spawn ticker: presents its [`TickToken`] every `spawn_tick_interval_ms`
//! - midnight: polls the wall clock every `midnight_check_interval_ms`
//! - elapsed: advances the stopwatch every `elapsed_tick_interval_ms`
//!
//! The location task owns the spawn ticker. On a movement it aborts the old task before
//! spawning the new one, and the engine rejects the old token in any case, so a tick that was
//! already waiting on the lock cannot spawn into the new stay.
//!
//! Dropping the [`DriverHandle`] aborts every task, so none outlives the handle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local};
use log::{debug, info};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::engine::{CloverEngine, EngineSnapshot};
use crate::geocode::{lookup_address, Geocoder, DEFAULT_GEOCODE_TIMEOUT};
use crate::stay::StayEvent;
use crate::ticker::TickToken;
use crate::{CloverCounts, Coordinate, LocationFix};

const FIX_CHANNEL_CAPACITY: usize = 64;

/// Source of local wall-clock time for the daily reset.
pub type WallClock = Arc<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>;

fn local_clock() -> WallClock {
    Arc::new(|| Local::now().fixed_offset())
}

fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Ticks every `period`, first tick one period from now. Late ticks are not bunched up.
fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

pub struct EngineDriver;

impl EngineDriver {
    /// Start the event loop on the current tokio runtime, using the device's local clock.
    pub fn spawn(engine: CloverEngine) -> DriverHandle {
        Self::spawn_with_clock(engine, local_clock())
    }

    /// Start the event loop with a custom wall clock.
    pub fn spawn_with_clock(engine: CloverEngine, clock: WallClock) -> DriverHandle {
        let config = engine.config().clone();
        let engine = Arc::new(Mutex::new(engine));
        let (fix_tx, fix_rx) = mpsc::channel(FIX_CHANNEL_CAPACITY);

        let spawn_period = Duration::from_millis(config.spawn_tick_interval_ms);
        let location = tokio::spawn(run_location_loop(engine.clone(), fix_rx, spawn_period));
        let midnight = tokio::spawn(run_midnight_loop(
            engine.clone(),
            clock,
            Duration::from_millis(config.midnight_check_interval_ms),
        ));
        let elapsed = tokio::spawn(run_elapsed_loop(
            engine.clone(),
            Duration::from_millis(config.elapsed_tick_interval_ms),
        ));

        info!(
            "[EngineDriver] Started (spawn every {:?}, midnight poll every {}ms)",
            spawn_period, config.midnight_check_interval_ms
        );
        DriverHandle {
            engine,
            fixes: Some(fix_tx),
            location: Some(location),
            clock_tasks: vec![midnight, elapsed],
        }
    }
}

/// Spawn ticker task, aborted when dropped (including when the location task is aborted).
struct SpawnTickerTask(JoinHandle<()>);

impl Drop for SpawnTickerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn start_spawn_ticker(
    engine: Arc<Mutex<CloverEngine>>,
    token: TickToken,
    period: Duration,
) -> SpawnTickerTask {
    SpawnTickerTask(tokio::spawn(async move {
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            let spawned = engine.lock().await.handle_spawn_tick(token, unix_millis());
            if let Some(marker) = spawned {
                debug!(
                    "[EngineDriver] Tick {} spawned {} (special={})",
                    token.generation, marker.id, marker.is_special
                );
            }
        }
    }))
}

async fn run_location_loop(
    engine: Arc<Mutex<CloverEngine>>,
    mut fixes: mpsc::Receiver<LocationFix>,
    spawn_period: Duration,
) {
    let initial = engine.lock().await.spawn_token();
    let mut spawn_task = start_spawn_ticker(engine.clone(), initial, spawn_period);

    while let Some(fix) = fixes.recv().await {
        let (event, token) = {
            let mut engine = engine.lock().await;
            let event = engine.handle_location(fix);
            (event, engine.spawn_token())
        };
        if let StayEvent::Moved { .. } = event {
            drop(spawn_task);
            spawn_task = start_spawn_ticker(engine.clone(), token, spawn_period);
            debug!("[EngineDriver] Spawn ticker restarted at generation {}", token.generation);
        }
    }

    spawn_task.0.abort();
    let _ = (&mut spawn_task.0).await;
    debug!("[EngineDriver] Fix channel closed");
}

async fn run_midnight_loop(engine: Arc<Mutex<CloverEngine>>, clock: WallClock, period: Duration) {
    let mut interval = ticker(period);
    loop {
        interval.tick().await;
        let now = clock();
        engine.lock().await.handle_midnight_check(&now);
    }
}

async fn run_elapsed_loop(engine: Arc<Mutex<CloverEngine>>, period: Duration) {
    let mut interval = ticker(period);
    loop {
        interval.tick().await;
        engine.lock().await.handle_elapsed_tick();
    }
}

/// Handle to a running driver. Dropping it aborts all tasks without draining queued fixes;
/// use [`shutdown`](Self::shutdown) to apply them first.
pub struct DriverHandle {
    engine: Arc<Mutex<CloverEngine>>,
    fixes: Option<mpsc::Sender<LocationFix>>,
    location: Option<JoinHandle<()>>,
    clock_tasks: Vec<JoinHandle<()>>,
}

impl DriverHandle {
    /// Queue a fix. Returns `false` if the driver has stopped.
    pub async fn send_fix(&self, fix: LocationFix) -> bool {
        match &self.fixes {
            Some(fixes) => fixes.send(fix).await.is_ok(),
            None => false,
        }
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        self.engine.lock().await.snapshot()
    }

    /// Fresh counts around `probe`, stored in the neighborhood cache.
    pub async fn counts_at(&self, probe: Coordinate) -> CloverCounts {
        self.engine.lock().await.counts_at(&probe)
    }

    /// Run `f` with exclusive access to the engine.
    pub async fn with_engine<R>(&self, f: impl FnOnce(&mut CloverEngine) -> R) -> R {
        let mut engine = self.engine.lock().await;
        f(&mut engine)
    }

    /// Start an address lookup; the engine does not wait for it.
    pub fn lookup_address(
        &self,
        geocoder: Arc<dyn Geocoder>,
        coordinate: Coordinate,
    ) -> oneshot::Receiver<Option<String>> {
        lookup_address(geocoder, coordinate, DEFAULT_GEOCODE_TIMEOUT)
    }

    /// Stop every task. Fixes already queued are applied first.
    pub async fn shutdown(mut self) {
        let clock_tasks = std::mem::take(&mut self.clock_tasks);
        for task in &clock_tasks {
            task.abort();
        }
        self.fixes.take();
        if let Some(location) = self.location.take() {
            let _ = location.await;
        }
        futures::future::join_all(clock_tasks).await;
        info!("[EngineDriver] Stopped");
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        if let Some(location) = self.location.take() {
            location.abort();
        }
        for task in self.clock_tasks.drain(..) {
            task.abort();
        }
    }
}
