//! Application trait and the tick loop
//!
//! Hosts that do not drive [`SpriteEngine::tick`] themselves implement
//! [`Application`] and hand it to a [`Runner`].

use std::ops::ControlFlow;
use std::thread;

use thiserror::Error;

use crate::engine::{EngineError, SpriteEngine};
use crate::render::device::GraphicsDevice;
use crate::scheduler::TickReport;

/// Application lifecycle
pub trait Application<D: GraphicsDevice> {
    /// Called once before the first tick; set up layers, passes and sprites here
    fn initialize(&mut self, engine: &mut SpriteEngine<D>) -> Result<(), AppError>;

    /// Called after every tick; break to stop the loop
    fn update(&mut self, engine: &mut SpriteEngine<D>, report: &TickReport) -> Result<ControlFlow<()>, AppError>;

    /// Called for host events
    fn handle_event(&mut self, engine: &mut SpriteEngine<D>, event: AppEvent) -> Result<(), AppError> {
        match event {
            AppEvent::Resized { width, height } => engine.resize(Some(width), Some(height))?,
            AppEvent::PointerMoved { x, y } => engine.set_pointer(x, y),
        }
        Ok(())
    }

    /// Called once after the loop ends
    fn cleanup(&mut self, _engine: &mut SpriteEngine<D>) {}
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Engine error propagated to application level
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Custom application error
    #[error("Application error: {0}")]
    Custom(String),
}

/// Host events
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppEvent {
    /// Presentation surface resized
    Resized {
        /// New width
        width: u32,
        /// New height
        height: u32,
    },

    /// Pointer moved, in presentation pixels
    PointerMoved {
        /// X coordinate
        x: f32,
        /// Y coordinate
        y: f32,
    },
}

/// Drives an [`Application`] by ticking the engine until it asks to stop
#[derive(Debug, Clone, Copy)]
pub struct Runner {
    max_ticks: Option<u64>,
    sleep: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Runner that sleeps between ticks and never stops on its own
    pub const fn new() -> Self {
        Self {
            max_ticks: None,
            sleep: true,
        }
    }

    /// Stop after `ticks` ticks
    #[must_use]
    pub const fn with_max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    /// Tick back to back instead of sleeping for the suggested delay
    #[must_use]
    pub const fn without_sleep(mut self) -> Self {
        self.sleep = false;
        self
    }

    /// Run the loop; returns the number of ticks executed
    pub fn run<D, A>(&self, engine: &mut SpriteEngine<D>, app: &mut A) -> Result<u64, AppError>
    where
        D: GraphicsDevice,
        A: Application<D>,
    {
        app.initialize(engine)?;
        log::info!("Starting tick loop...");

        let mut ticks = 0;
        let result = loop {
            if self.max_ticks.is_some_and(|max| ticks >= max) {
                break Ok(ticks);
            }
            let report = match engine.tick() {
                Ok(report) => report,
                Err(e) => break Err(AppError::from(e)),
            };
            ticks += 1;

            match app.update(engine, &report) {
                Ok(ControlFlow::Break(())) => break Ok(ticks),
                Ok(ControlFlow::Continue(())) => {}
                Err(e) => break Err(e),
            }
            if self.sleep {
                thread::sleep(report.next_tick);
            }
        };

        app.cleanup(engine);
        log::info!("Tick loop finished after {} tick(s)", ticks);
        result
    }
}
