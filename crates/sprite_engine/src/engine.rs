//! # Sprite Engine
//!
//! [`SpriteEngine`] is the public face of the renderer. It owns the scene, the
//! layers, the image cache and atlas, the render passes and the compositor, and
//! drives them from [`SpriteEngine::tick`].
//!
//! ## Tick
//!
//! 1. Apply playback controls (resize, forced recompile)
//! 2. Dispatch new image requests, collect finished loads and, when due, pack
//!    a limited number of loaded images into the atlas
//! 3. Decide the scheduler state from the controls and the image queue
//! 4. Synchronize queued sprites
//! 5. While running, re-synchronize every sprite on every non-static layer
//! 6. When the draw throttle fires and the scene is not empty, upload changed
//!    atlas pages and run the compositor
//!
//! ## Example
//!
//! ```rust
//! use sprite_engine::prelude::*;
//!
//! let mut engine = SpriteEngine::new(EngineConfig::default(), RecordingDevice::default())?;
//! let id = engine.add_object(Sprite::new().with_color(0xFF0000));
//! engine.tick()?;
//! engine.object_mut(id)?.x += 10.0;
//! engine.update_object(id)?;
//! # Ok::<(), EngineError>(())
//! ```

use std::mem;
use std::time::Instant;

use slotmap::SlotMap;
use thiserror::Error;

use crate::assets::{AssetError, DeferredImageLoader, ImageAsset, ImageCache, ImageData, ImageId, ImageLoader, ThreadedImageLoader};
use crate::core::{ConfigError, EngineConfig};
use crate::foundation::math::{Rect, Vec2};
use crate::render::atlas::{AtlasError, AtlasPacker};
use crate::render::compositor::{Compositor, FrameUniforms};
use crate::render::device::{DeviceError, GraphicsDevice};
use crate::render::layer::{LayerFlags, LayerId, LayerOptions, LayerSpec, LayerStack};
use crate::render::render_pass::{RenderPass, RenderPassOptions, RenderPassRegistry, ShaderError};
use crate::render::shaders::RESERVED_TEXTURE_UNITS;
use crate::render::sync::Synchronizer;
use crate::render::vertex_store::{VertexError, VertexStore};
use crate::scene::{Camera, ObjectId, SceneEntry, ShadowRecord, Sprite};
use crate::scheduler::{PlaybackControls, Scheduler, SchedulerState, TickReport};

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// No sprite with this id
    #[error("Object not found: {0:?}")]
    ObjectNotFound(ObjectId),

    /// No layer with this id
    #[error("Layer not found: {0}")]
    LayerNotFound(LayerId),

    /// No render pass on this layer
    #[error("No render pass on layer {0}")]
    RenderPassNotFound(LayerId),

    /// Render pass failed validation
    #[error("Invalid render pass: {0}")]
    InvalidRenderPass(#[from] ShaderError),

    /// Compositing program could not be rebuilt
    #[error("Pipeline recompile failed: {0}")]
    RecompileFailure(DeviceError),

    /// Atlas packing failed
    #[error("Atlas error: {0}")]
    Atlas(#[from] AtlasError),

    /// Vertex store misuse
    #[error("Vertex store error: {0}")]
    Vertex(#[from] VertexError),

    /// Graphics device failure
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Image loading failure
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Layered 2D sprite renderer over a [`GraphicsDevice`]
pub struct SpriteEngine<D: GraphicsDevice> {
    device: D,
    config: EngineConfig,
    controls: PlaybackControls,
    scheduler: Scheduler,
    objects: SlotMap<ObjectId, SceneEntry>,
    layers: LayerStack,
    images: ImageCache,
    loader: Box<dyn ImageLoader>,
    atlas: AtlasPacker,
    passes: RenderPassRegistry,
    compositor: Compositor,
    synchronizer: Synchronizer,
    camera: Camera,
    pointer: Vec2,
    update_queue: Vec<ObjectId>,
    resolution: (u32, u32),
}

impl<D: GraphicsDevice> SpriteEngine<D> {
    /// Create an engine and build its compositing program
    ///
    /// Images are loaded from disk on worker threads; use
    /// [`Self::with_loader`] to change that.
    pub fn new(config: EngineConfig, mut device: D) -> EngineResult<Self> {
        config.validate()?;
        log::info!("Initializing sprite engine at {}x{}", config.width, config.height);

        let unit_pages = device.max_texture_units().saturating_sub(RESERVED_TEXTURE_UNITS).max(1);
        let max_pages = config.atlas.max_pages.map_or(unit_pages, |pages| pages.min(unit_pages));
        let atlas = AtlasPacker::new(&config.atlas, max_pages);

        let passes = RenderPassRegistry::new();
        let mut compositor = Compositor::new(config.width, config.height);
        compositor
            .recompile(&mut device, &passes, atlas.page_count())
            .map_err(EngineError::RecompileFailure)?;

        let now = Instant::now();
        Ok(Self {
            controls: PlaybackControls::from_config(&config),
            scheduler: Scheduler::new(&config, now),
            objects: SlotMap::with_key(),
            layers: LayerStack::new(config.vertex.chunk_slots),
            images: ImageCache::new(),
            loader: Box::new(ThreadedImageLoader::with_workers(config.assets.loader_threads)),
            atlas,
            passes,
            compositor,
            synchronizer: Synchronizer::new().with_base_path(config.assets.base_path.clone()),
            camera: Camera::new(),
            pointer: Vec2::zeros(),
            update_queue: Vec::new(),
            resolution: (config.width, config.height),
            device,
            config,
        })
    }

    /// Replace the image loader
    #[must_use]
    pub fn with_loader(mut self, loader: impl ImageLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Only accept images through [`Self::provide_image`]
    #[must_use]
    pub fn with_deferred_images(self) -> Self {
        self.with_loader(DeferredImageLoader::new())
    }

    // Objects

    /// Add a sprite; it is synchronized on the next tick
    pub fn add_object(&mut self, sprite: Sprite) -> ObjectId {
        let layer_id = LayerId::new(sprite.layer);
        let layers = &mut self.layers;
        let id = self.objects.insert_with_key(|id| {
            let slot = layers.get_or_create(layer_id).attach(id);
            SceneEntry {
                sprite,
                shadow: ShadowRecord::new(layer_id, slot),
            }
        });
        self.enqueue(id);
        log::debug!("Added sprite {:?} on layer {}", id, layer_id);
        id
    }

    /// Remove a sprite, releasing its slot
    pub fn remove_object(&mut self, id: ObjectId) -> EngineResult<Sprite> {
        let entry = self.objects.remove(id).ok_or(EngineError::ObjectNotFound(id))?;
        if let Some(layer) = self.layers.get_mut(entry.shadow.layer) {
            layer.detach(id, entry.shadow.slot)?;
        }
        self.images.forget_dependent(id);
        log::debug!("Removed sprite {:?}", id);
        Ok(entry.sprite)
    }

    /// Borrow a sprite
    pub fn find_object(&self, id: ObjectId) -> EngineResult<&Sprite> {
        self.objects
            .get(id)
            .map(|entry| &entry.sprite)
            .ok_or(EngineError::ObjectNotFound(id))
    }

    /// Mutably borrow a sprite
    ///
    /// Changes are picked up by the next recompute pass, or immediately on the
    /// next tick after [`Self::update_object`].
    pub fn object_mut(&mut self, id: ObjectId) -> EngineResult<&mut Sprite> {
        self.objects
            .get_mut(id)
            .map(|entry| &mut entry.sprite)
            .ok_or(EngineError::ObjectNotFound(id))
    }

    /// Queue a sprite for synchronization on the next tick, whatever the state
    pub fn update_object(&mut self, id: ObjectId) -> EngineResult<()> {
        if !self.objects.contains_key(id) {
            return Err(EngineError::ObjectNotFound(id));
        }
        self.enqueue(id);
        Ok(())
    }

    /// All sprites
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &Sprite)> {
        self.objects.iter().map(|(id, entry)| (id, &entry.sprite))
    }

    /// Number of sprites
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Layer and slot a sprite currently occupies
    pub fn object_slot(&self, id: ObjectId) -> EngineResult<(LayerId, usize)> {
        self.objects
            .get(id)
            .map(|entry| (entry.shadow.layer, entry.shadow.slot))
            .ok_or(EngineError::ObjectNotFound(id))
    }

    fn enqueue(&mut self, id: ObjectId) {
        if let Some(entry) = self.objects.get_mut(id) {
            if !entry.shadow.queued {
                entry.shadow.queued = true;
                self.update_queue.push(id);
            }
        }
    }

    // Layers

    /// Create a layer or update an existing one; always forces a redraw
    pub fn add_layer(&mut self, id: impl Into<LayerId>, options: LayerOptions) -> LayerSpec {
        let id = id.into();
        let layer = self.layers.get_or_create(id);
        if let Some(is_static) = options.is_static {
            layer.set_static(is_static);
        }
        layer.mark(LayerFlags::NEEDS_RECOMPUTE | LayerFlags::NEEDS_REDRAW);
        layer.spec()
    }

    /// Summary of a layer
    pub fn layer(&self, id: impl Into<LayerId>) -> EngineResult<LayerSpec> {
        let id = id.into();
        self.layers.get(id).map(|layer| layer.spec()).ok_or(EngineError::LayerNotFound(id))
    }

    /// Attribute arrays of a layer
    pub fn vertex_store(&self, id: impl Into<LayerId>) -> EngineResult<&VertexStore> {
        let id = id.into();
        self.layers.get(id).map(|layer| layer.store()).ok_or(EngineError::LayerNotFound(id))
    }

    /// Summaries of every layer in compositing order
    pub fn layers(&self) -> Vec<LayerSpec> {
        self.layers.iter().map(|layer| layer.spec()).collect()
    }

    // Render passes

    /// Attach a render pass to a layer, creating the layer if needed
    ///
    /// The program is rebuilt on the next tick.
    pub fn add_render_pass(&mut self, id: impl Into<LayerId>, options: RenderPassOptions) -> EngineResult<RenderPass> {
        let id = id.into();
        let pass = self.passes.register(id, options)?.clone();
        self.layers.get_or_create(id).mark(LayerFlags::NEEDS_REDRAW);
        self.compositor.request_recompile();
        Ok(pass)
    }

    /// Detach a layer's render pass
    pub fn remove_render_pass(&mut self, id: impl Into<LayerId>) -> EngineResult<RenderPass> {
        let id = id.into();
        let pass = self.passes.remove(id).ok_or(EngineError::RenderPassNotFound(id))?;
        if let Some(layer) = self.layers.get_mut(id) {
            layer.mark(LayerFlags::NEEDS_REDRAW);
        }
        self.compositor.request_recompile();
        Ok(pass)
    }

    /// Set a render pass uniform; declaring a new one schedules a rebuild
    pub fn set_render_pass_uniform(&mut self, id: impl Into<LayerId>, name: &str, value: [f32; 4]) -> EngineResult<()> {
        let id = id.into();
        let pass = self.passes.get_mut(id).ok_or(EngineError::RenderPassNotFound(id))?;
        if pass.set_uniform(name, value)? {
            self.compositor.request_recompile();
        }
        if let Some(layer) = self.layers.get_mut(id) {
            layer.mark(LayerFlags::NEEDS_REDRAW);
        }
        Ok(())
    }

    /// Borrow a layer's render pass
    pub fn render_pass(&self, id: impl Into<LayerId>) -> Option<&RenderPass> {
        self.passes.get(id.into())
    }

    // Images

    /// Register an image by source key, resolved against `base`
    ///
    /// Requesting the same source again returns the same image.
    pub fn request_image(&mut self, source: &str, base: &str) -> ImageId {
        self.images.request(source, base)
    }

    /// Deliver decoded pixels for an image directly
    ///
    /// Unknown keys are registered against the configured asset base path.
    pub fn provide_image(&mut self, key: &str, data: ImageData) -> EngineResult<ImageId> {
        let id = match self.images.lookup(key) {
            Some(id) => id,
            None => self.images.request(key, &self.config.assets.base_path),
        };
        self.images
            .complete_id(id, Ok(data))
            .ok_or_else(|| EngineError::Asset(AssetError::NotFound(key.to_owned())))?;
        Ok(id)
    }

    /// Borrow a cached image
    pub fn image(&self, id: ImageId) -> Option<&ImageAsset> {
        self.images.get(id)
    }

    /// Find a cached image by source key
    pub fn find_image(&self, key: &str) -> Option<ImageId> {
        self.images.lookup(key)
    }

    /// Images not yet placed or rejected
    pub fn pending_images(&self) -> usize {
        self.images.pending_count()
    }

    /// Texture atlas
    pub const fn atlas(&self) -> &AtlasPacker {
        &self.atlas
    }

    // Presentation

    /// Change the presentation size; `None` keeps a dimension
    pub fn resize(&mut self, width: Option<u32>, height: Option<u32>) -> EngineResult<()> {
        let width = width.unwrap_or(self.controls.width);
        let height = height.unwrap_or(self.controls.height);
        if width == 0 || height == 0 {
            return Err(ConfigError::Invalid(format!("cannot resize to {width}x{height}")).into());
        }
        self.controls.width = width;
        self.controls.height = height;
        self.apply_resize();
        Ok(())
    }

    /// Rebuild the compositing program now
    ///
    /// On failure the previous program keeps drawing.
    pub fn recompile(&mut self) -> EngineResult<()> {
        self.compositor
            .recompile(&mut self.device, &self.passes, self.atlas.page_count())
            .map_err(EngineError::RecompileFailure)?;
        self.layers.mark_all(LayerFlags::NEEDS_REDRAW);
        Ok(())
    }

    /// Force every layer and sprite to be rewritten and redrawn
    pub fn render_all(&mut self) {
        self.layers.mark_all(LayerFlags::NEEDS_RECOMPUTE | LayerFlags::NEEDS_REDRAW);
        for entry in self.objects.values_mut() {
            entry.shadow.force = true;
        }
    }

    /// Camera
    pub const fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable camera; moving it takes effect on the next recompute pass
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Record the pointer position in presentation pixels
    pub fn set_pointer(&mut self, x: f32, y: f32) {
        self.pointer = Vec2::new(x, y);
    }

    /// Playback controls
    pub const fn controls(&self) -> &PlaybackControls {
        &self.controls
    }

    /// Mutable playback controls, read at the start of every tick
    pub fn controls_mut(&mut self) -> &mut PlaybackControls {
        &mut self.controls
    }

    /// Frames presented during the last complete second; zero while paused
    pub fn fps(&self) -> u32 {
        if self.scheduler.state() == SchedulerState::Paused {
            0
        } else {
            self.scheduler.fps()
        }
    }

    /// State of the most recent tick
    pub const fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Presentation size
    pub const fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    /// Configuration the engine was created with
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Graphics device
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Mutable graphics device
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    // Tick

    /// Run one tick at the current time
    pub fn tick(&mut self) -> EngineResult<TickReport> {
        self.tick_at(Instant::now())
    }

    /// Run one tick as if the clock read `now`
    pub fn tick_at(&mut self, now: Instant) -> EngineResult<TickReport> {
        let delta = self.scheduler.begin_tick(now, &self.controls);

        if (self.controls.width, self.controls.height) != self.resolution {
            if self.controls.width == 0 || self.controls.height == 0 {
                log::warn!("Ignoring zero presentation size");
                (self.controls.width, self.controls.height) = self.resolution;
            } else {
                self.apply_resize();
            }
        }

        if mem::take(&mut self.controls.recompile_requested) || self.compositor.recompile_pending() {
            if let Err(e) = self.recompile() {
                log::error!("{}", e);
            }
        }

        let images_placed = self.process_images(now);
        let pending_images = self.images.pending_count();
        let state = Scheduler::decide(&self.controls, pending_images);
        self.scheduler.enter(state);

        let viewport = self.camera.viewport(self.resolution.0, self.resolution.1);
        let writes_before = self.synchronizer.writes();
        let mut synchronized = 0;

        for id in mem::take(&mut self.update_queue) {
            let Some(entry) = self.objects.get_mut(id) else {
                continue;
            };
            entry.shadow.queued = false;
            match self
                .synchronizer
                .synchronize(id, entry, &mut self.layers, &mut self.images, viewport)
            {
                Ok(_) => synchronized += 1,
                Err(e) => log::error!("Failed to synchronize object {:?}: {}", id, e),
            }
        }

        if state == SchedulerState::Running {
            synchronized += self.recompute(viewport);
        }

        let draw = if self.scheduler.draw_due(now) && !self.objects.is_empty() {
            self.atlas.upload(&mut self.device)?;
            let uniforms = FrameUniforms {
                camera: self.camera.uniform(),
                mouse: [self.pointer.x, self.resolution.1 as f32 - self.pointer.y],
                delta,
            };
            let report = self.compositor.draw(
                &mut self.device,
                &mut self.layers,
                &self.atlas,
                &self.passes,
                &uniforms,
            )?;
            self.scheduler.record_frame(now);
            Some(report)
        } else {
            None
        };

        Ok(TickReport {
            state,
            next_tick: Scheduler::next_delay(state, &self.controls),
            synchronized,
            vertex_writes: self.synchronizer.writes() - writes_before,
            images_placed,
            pending_images: self.images.pending_count(),
            draw,
        })
    }

    /// Re-synchronize every sprite on layers that want it
    fn recompute(&mut self, viewport: Rect) -> usize {
        let mut synchronized = 0;
        for layer_id in self.layers.ids() {
            let Some(layer) = self.layers.get_mut(layer_id) else {
                continue;
            };
            if !layer.wants_recompute() {
                continue;
            }
            layer.unmark(LayerFlags::NEEDS_RECOMPUTE);
            layer.reset_bounds();
            let members: Vec<ObjectId> = layer.objects().collect();

            for id in members {
                let Some(entry) = self.objects.get_mut(id) else {
                    continue;
                };
                match self
                    .synchronizer
                    .synchronize(id, entry, &mut self.layers, &mut self.images, viewport)
                {
                    Ok(_) => synchronized += 1,
                    Err(e) => log::error!("Failed to synchronize object {:?}: {}", id, e),
                }
            }
        }
        synchronized
    }

    /// Start new loads, collect finished ones and pack a limited batch
    ///
    /// An image larger than a page is stalled and keeps its sprites waiting.
    /// When every allowed page is full the image stays loaded and the pass
    /// stops; it is retried on the next pass.
    fn process_images(&mut self, now: Instant) -> usize {
        for (key, path) in self.images.start_unrequested() {
            log::debug!("Requesting image '{}'", key);
            self.loader.begin(&key, &path);
        }
        for loaded in self.loader.poll() {
            self.images.complete(&loaded.key, loaded.result);
        }

        if self.images.pending_count() == 0 || !self.scheduler.assets_due(now) {
            return 0;
        }

        let mut placed = 0;
        for id in self.images.loaded().into_iter().take(self.config.assets.process_limit.max(1)) {
            let Some(pixels) = self.images.pixels(id) else {
                continue;
            };
            let key = self.images.get(id).map(|a| a.key().to_owned()).unwrap_or_default();
            let dependents = match self.atlas.insert(pixels) {
                Ok(placement) => {
                    if placement.new_page {
                        self.compositor.request_recompile();
                    }
                    placed += 1;
                    self.images.place(id, placement.region)
                }
                Err(e @ AtlasError::TextureUnitLimitReached { .. }) => {
                    log::debug!("Image '{}' waits for atlas space: {}", key, e);
                    break;
                }
                Err(e @ AtlasError::AtlasExhausted { .. }) => {
                    log::error!("Image '{}' can never be placed: {}", key, e);
                    self.images.stall(id, e.to_string());
                    continue;
                }
                Err(e) => {
                    log::error!("Image '{}' rejected: {}", key, e);
                    self.images.reject(id, e.to_string())
                }
            };
            for object in dependents {
                if let Some(entry) = self.objects.get_mut(object) {
                    entry.shadow.force = true;
                }
                self.enqueue(object);
            }
        }
        if placed > 0 {
            log::debug!("Placed {} image(s); {} pending", placed, self.images.pending_count());
        }
        placed
    }

    fn apply_resize(&mut self) {
        let size = (self.controls.width, self.controls.height);
        if size == self.resolution {
            return;
        }
        self.compositor.resize(&mut self.device, size.0, size.1);
        self.resolution = size;
        self.layers.mark_all(LayerFlags::NEEDS_RECOMPUTE | LayerFlags::NEEDS_REDRAW);
    }
}

impl<D: GraphicsDevice> Drop for SpriteEngine<D> {
    fn drop(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.release_device_resources(&mut self.device);
        }
        self.compositor.release(&mut self.device);
        log::debug!("Sprite engine shut down");
    }
}
