//! Orbit demo application
//!
//! Drives the sprite engine headless: a static star field, a ring of orbiting
//! ships textured from a generated image, and a pulsing tint pass on the ship
//! layer. Pass a `.toml` or `.ron` settings file as the first argument to
//! override the engine configuration.

use std::ops::ControlFlow;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sprite_engine::prelude::*;
use sprite_engine::render::DrawReport;

const BACKGROUND: f32 = 0.0;
const SHIPS: f32 = 1.0;
const SHIP_COUNT: usize = 24;
const RUN_TICKS: u64 = 240;

const TINT_PASS: &str = r"
void main() {
    pixel.rgb *= mix(vec3(1.0), tint.rgb, tint.a);
}
";

struct OrbitDemo {
    ships: Vec<ObjectId>,
    frames: u64,
    last_draw: Option<DrawReport>,
}

impl OrbitDemo {
    fn new() -> Self {
        Self {
            ships: Vec::with_capacity(SHIP_COUNT),
            frames: 0,
            last_draw: None,
        }
    }

    fn ship_image() -> ImageData {
        let size = 16;
        let mut pixels = Vec::with_capacity(size * size * 4);
        for y in 0..size {
            for x in 0..size {
                let inside = x.abs_diff(size / 2) + y.abs_diff(size / 2) < size / 2;
                let alpha = if inside { 255 } else { 0 };
                pixels.extend_from_slice(&[220, 230, 255, alpha]);
            }
        }
        match ImageData::from_rgba(size as u32, size as u32, pixels) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Falling back to a flat ship image: {}", e);
                ImageData::solid_color(size as u32, size as u32, [220, 230, 255, 255])
            }
        }
    }

    fn orbit(index: usize, frame: u64, (width, height): (u32, u32)) -> (f32, f32, f32) {
        let phase = index as f32 / SHIP_COUNT as f32 * std::f32::consts::TAU;
        let angle = phase + frame as f32 * 0.02;
        let radius = width.min(height) as f32 * 0.35;
        let x = width as f32 / 2.0 + radius * angle.cos() - 8.0;
        let y = height as f32 / 2.0 + radius * angle.sin() - 8.0;
        (x, y, angle.to_degrees() + 90.0)
    }
}

impl Application<RecordingDevice> for OrbitDemo {
    fn initialize(&mut self, engine: &mut SpriteEngine<RecordingDevice>) -> Result<(), AppError> {
        log::info!("Setting up orbit demo...");
        let (width, height) = engine.resolution();

        engine.add_layer(BACKGROUND, LayerOptions::static_layer());
        engine.add_layer(SHIPS, LayerOptions::dynamic_layer());
        engine.add_render_pass(
            SHIPS,
            RenderPassOptions::new(PassTarget::Layer, TINT_PASS).with_uniform("tint", [1.0, 0.6, 0.3, 0.0]),
        )?;

        // Fixed seed so every run lays out the same sky
        let mut rng = StdRng::seed_from_u64(0x5EED);
        for _ in 0..200 {
            let x = rng.gen_range(0.0..width as f32);
            let y = rng.gen_range(0.0..height as f32);
            let shade: u32 = rng.gen_range(100..=255);
            engine.add_object(
                Sprite::new()
                    .on_layer(BACKGROUND)
                    .at(x, y)
                    .with_size(2.0, 2.0)
                    .with_color((shade << 16) | (shade << 8) | shade),
            );
        }

        engine.request_image("ship.png", "");
        engine.provide_image("ship.png", Self::ship_image())?;

        for index in 0..SHIP_COUNT {
            let (x, y, rotation) = Self::orbit(index, 0, (width, height));
            let ship = engine.add_object(
                Sprite::new()
                    .on_layer(SHIPS)
                    .at(x, y)
                    .with_size(16.0, 16.0)
                    .with_rotation(rotation)
                    .with_image("ship.png"),
            );
            self.ships.push(ship);
        }

        log::info!(
            "Scene ready: {} sprites on {} layers",
            engine.object_count(),
            engine.layers().len()
        );
        Ok(())
    }

    fn update(&mut self, engine: &mut SpriteEngine<RecordingDevice>, report: &TickReport) -> Result<ControlFlow<()>, AppError> {
        if report.state != SchedulerState::Running {
            log::debug!("Tick in {:?}; {} image(s) pending", report.state, report.pending_images);
            return Ok(ControlFlow::Continue(()));
        }

        self.frames += 1;
        let resolution = engine.resolution();
        for (index, &ship) in self.ships.iter().enumerate() {
            let (x, y, rotation) = Self::orbit(index, self.frames, resolution);
            let sprite = engine.object_mut(ship)?;
            sprite.x = x;
            sprite.y = y;
            sprite.rotation = rotation;
        }

        let pulse = (self.frames as f32 * 0.05).sin().mul_add(0.5, 0.5);
        engine.set_render_pass_uniform(SHIPS, "tint", [1.0, 0.6, 0.3, pulse])?;

        if self.frames == RUN_TICKS / 2 {
            self.handle_event(engine, AppEvent::Resized { width: 1024, height: 768 })?;
            self.handle_event(engine, AppEvent::PointerMoved { x: 512.0, y: 384.0 })?;
        }

        if let Some(draw) = report.draw {
            self.last_draw = Some(draw);
        }
        Ok(ControlFlow::Continue(()))
    }

    fn cleanup(&mut self, engine: &mut SpriteEngine<RecordingDevice>) {
        if let Some(draw) = self.last_draw {
            log::info!(
                "Last frame: {} layer(s) redrawn, {} composited, {} draw call(s), {} byte(s) uploaded",
                draw.layers_redrawn,
                draw.layers_composited,
                draw.draw_calls,
                draw.bytes_uploaded
            );
        }
        log::info!(
            "Atlas pages: {}, device draws recorded: {}, fps: {}",
            engine.atlas().page_count(),
            engine.device().draws().len(),
            engine.fps()
        );
    }
}

fn load_config() -> Result<EngineConfig, AppError> {
    match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading settings from {}", path);
            EngineConfig::load_from_file(&path).map_err(|e| AppError::Custom(e.to_string()))
        }
        None => Ok(EngineConfig::default()),
    }
}

fn main() -> Result<(), AppError> {
    let config = load_config()?;
    sprite_engine::foundation::logging::init_with_level(&config.log_level);
    log::info!("Starting orbit demo");

    let mut engine = SpriteEngine::new(config, RecordingDevice::default())?.with_deferred_images();
    let mut app = OrbitDemo::new();

    let ticks = Runner::new().with_max_ticks(RUN_TICKS).run(&mut engine, &mut app)?;
    log::info!("Orbit demo finished after {} tick(s)", ticks);
    Ok(())
}
