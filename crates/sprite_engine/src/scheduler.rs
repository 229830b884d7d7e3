//! # Frame Scheduler
//!
//! Decides what each engine tick does. The state is recomputed every tick:
//!
//! - `Paused` when playback is off
//! - `WaitingOnAssets` when `pause_on_queue` is set and images are still in
//!   flight
//! - `Running` otherwise
//!
//! Queued sprite updates are applied in every state; the full per-layer
//! recompute pass only runs while `Running`. Draws are throttled to the fps cap
//! and image processing to the asset interval, independently of how often the
//! host calls `tick`.

use std::time::{Duration, Instant};

use crate::core::EngineConfig;
use crate::foundation::time::{period_from_hz, FpsCounter, Throttle};
use crate::render::DrawReport;

/// What the scheduler is doing this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// Playback is off
    Paused,
    /// Images still loading and the engine is told to wait for them
    WaitingOnAssets,
    /// Normal operation
    Running,
}

/// Host-adjustable playback settings
///
/// Read at the start of every tick, so changes apply on the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackControls {
    /// Whether the scene is playing
    pub playing: bool,
    /// Maximum presented frames per second
    pub fps_cap: f32,
    /// How often the host should tick while running
    pub target_refresh_hz: f32,
    /// Hold the recompute pass while images are pending
    pub pause_on_queue: bool,
    /// Rebuild the compositing program on the next tick
    pub recompile_requested: bool,
    /// Presentation width in pixels
    pub width: u32,
    /// Presentation height in pixels
    pub height: u32,
}

impl PlaybackControls {
    /// Controls initialised from configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            playing: config.playing,
            fps_cap: config.fps_cap,
            target_refresh_hz: config.target_refresh_hz,
            pause_on_queue: config.pause_on_queue,
            recompile_requested: false,
            width: config.width,
            height: config.height,
        }
    }
}

/// Summary of one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// State the tick ran in
    pub state: SchedulerState,
    /// Suggested delay before the next tick
    pub next_tick: Duration,
    /// Sprites synchronized
    pub synchronized: usize,
    /// Attribute blocks written
    pub vertex_writes: u64,
    /// Images packed into the atlas
    pub images_placed: usize,
    /// Images still pending after the tick
    pub pending_images: usize,
    /// Draw results, if the draw throttle fired and there was a scene
    pub draw: Option<DrawReport>,
}

impl TickReport {
    /// Whether a frame was presented
    pub const fn presented(&self) -> bool {
        self.draw.is_some()
    }
}

/// Tick pacing and state
#[derive(Debug)]
pub struct Scheduler {
    state: SchedulerState,
    draw_throttle: Throttle,
    asset_throttle: Throttle,
    fps: FpsCounter,
    started: Instant,
    last_tick: Option<Instant>,
    ticks: u64,
}

impl Scheduler {
    /// Scheduler for `config`, starting its clocks at `now`
    pub fn new(config: &EngineConfig, now: Instant) -> Self {
        Self {
            state: if config.playing {
                SchedulerState::Running
            } else {
                SchedulerState::Paused
            },
            draw_throttle: Throttle::new(period_from_hz(config.fps_cap)),
            asset_throttle: Throttle::new(config.assets.process_interval()),
            fps: FpsCounter::new(now),
            started: now,
            last_tick: None,
            ticks: 0,
        }
    }

    /// State for the given controls and image queue
    pub const fn decide(controls: &PlaybackControls, pending_images: usize) -> SchedulerState {
        if !controls.playing {
            SchedulerState::Paused
        } else if controls.pause_on_queue && pending_images > 0 {
            SchedulerState::WaitingOnAssets
        } else {
            SchedulerState::Running
        }
    }

    /// Start a tick; returns milliseconds since start and since the previous tick
    pub fn begin_tick(&mut self, now: Instant, controls: &PlaybackControls) -> [f32; 2] {
        self.ticks += 1;
        self.draw_throttle.set_interval(period_from_hz(controls.fps_cap));
        let delta = self
            .last_tick
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last_tick = Some(now);
        let elapsed = now.saturating_duration_since(self.started);
        [elapsed.as_secs_f32() * 1000.0, delta.as_secs_f32() * 1000.0]
    }

    /// Record the state for this tick, logging transitions
    pub fn enter(&mut self, state: SchedulerState) {
        if state != self.state {
            log::info!("Scheduler: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Current state
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Whether image processing may run at `now`
    pub fn assets_due(&mut self, now: Instant) -> bool {
        self.asset_throttle.try_fire(now)
    }

    /// Whether a frame may be drawn at `now`
    pub fn draw_due(&mut self, now: Instant) -> bool {
        self.draw_throttle.try_fire(now)
    }

    /// Count a presented frame
    pub fn record_frame(&mut self, now: Instant) {
        self.fps.record_frame(now);
    }

    /// Frames presented during the last complete second
    pub const fn fps(&self) -> u32 {
        self.fps.fps()
    }

    /// Ticks started so far
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Suggested delay before the next tick
    pub fn next_delay(state: SchedulerState, controls: &PlaybackControls) -> Duration {
        match state {
            SchedulerState::Running => period_from_hz(controls.target_refresh_hz),
            SchedulerState::Paused | SchedulerState::WaitingOnAssets => period_from_hz(controls.fps_cap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide_states() {
        let mut controls = PlaybackControls::from_config(&EngineConfig::default());
        assert_eq!(Scheduler::decide(&controls, 0), SchedulerState::Running);
        assert_eq!(Scheduler::decide(&controls, 2), SchedulerState::WaitingOnAssets);

        controls.pause_on_queue = false;
        assert_eq!(Scheduler::decide(&controls, 2), SchedulerState::Running);

        controls.playing = false;
        assert_eq!(Scheduler::decide(&controls, 0), SchedulerState::Paused);
    }

    #[test]
    fn test_next_delay_follows_state() {
        let mut controls = PlaybackControls::from_config(&EngineConfig::default());
        controls.target_refresh_hz = 120.0;
        controls.fps_cap = 30.0;
        assert_eq!(
            Scheduler::next_delay(SchedulerState::Running, &controls),
            period_from_hz(120.0)
        );
        assert_eq!(Scheduler::next_delay(SchedulerState::Paused, &controls), period_from_hz(30.0));
    }

    #[test]
    fn test_draw_throttle_uses_fps_cap() {
        let start = Instant::now();
        let config = EngineConfig::default();
        let mut controls = PlaybackControls::from_config(&config);
        controls.fps_cap = 10.0;
        let mut scheduler = Scheduler::new(&config, start);

        scheduler.begin_tick(start, &controls);
        assert!(scheduler.draw_due(start));
        let later = start + Duration::from_millis(50);
        let [since_start, since_last] = scheduler.begin_tick(later, &controls);
        assert!((since_last - 50.0).abs() < 1e-2);
        assert!(since_start >= since_last);
        assert!(!scheduler.draw_due(later));
        assert!(scheduler.draw_due(start + Duration::from_millis(101)));
        assert_eq!(scheduler.ticks(), 2);
    }
}
