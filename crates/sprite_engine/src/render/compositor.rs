//! # Compositing Pipeline
//!
//! Turns layer vertex data into a presented frame with three kernels that run
//! once per draw tick:
//!
//! 1. **Layers** (`u_kernels = 0`): each drawable layer whose cache is stale is
//!    re-rendered into its surface; every drawable layer also adds its sprites
//!    to the color mask (`u_kernels = 0.5`).
//! 2. **Composite** (`u_kernels = 1`): layer surfaces are blended onto the frame
//!    in ascending layer order, snapshotting the frame after each one.
//! 3. **Present** (`u_kernels = 2`): the frame is drawn to the presentation
//!    surface.
//!
//! The program is rebuilt whenever atlas pages or render passes change. A build
//! that fails leaves the previous program in place.

use crate::render::atlas::AtlasPacker;
use crate::render::device::{
    BufferHandle, DeviceResult, FramebufferHandle, GraphicsDevice, ProgramHandle, RenderTarget,
    TextureHandle, UniformValue,
};
use crate::render::layer::{LayerFlags, LayerStack};
use crate::render::render_pass::{PassTarget, RenderPass, RenderPassRegistry};
use crate::render::shaders;
use crate::render::vertex_store::{quad_positions, uniform_block, Attribute, COMPONENTS, VERTICES_PER_QUAD};

/// Kernel selector values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    /// Sprites into layer surfaces
    Layer,
    /// Sprites into the color mask
    Mask,
    /// Layer surfaces onto the frame
    Composite,
    /// Frame onto the presentation surface
    Present,
}

impl Kernel {
    /// Value of the kernel uniform
    pub const fn value(self) -> f32 {
        match self {
            Self::Layer => 0.0,
            Self::Mask => 0.5,
            Self::Composite => 1.0,
            Self::Present => 2.0,
        }
    }
}

/// Per-frame values shared by every kernel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    /// Camera x, y, zoom, rotation
    pub camera: [f32; 4],
    /// Pointer position with y flipped
    pub mouse: [f32; 2],
    /// Milliseconds since the engine started and since the previous tick
    pub delta: [f32; 2],
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            camera: [0.0, 0.0, 1.0, 0.0],
            mouse: [0.0; 2],
            delta: [0.0; 2],
        }
    }
}

/// What one draw did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawReport {
    /// Layer surfaces re-rendered
    pub layers_redrawn: usize,
    /// Layer surfaces composited onto the frame
    pub layers_composited: usize,
    /// Draw calls issued
    pub draw_calls: usize,
    /// Vertex bytes uploaded
    pub bytes_uploaded: usize,
}

#[derive(Debug, Clone, Copy)]
struct FrameTargets {
    frame: FramebufferHandle,
    frame_texture: TextureHandle,
    frame_snapshot: TextureHandle,
    mask: FramebufferHandle,
    mask_snapshot: TextureHandle,
    quad: [BufferHandle; 5],
    width: u32,
    height: u32,
}

/// Three-kernel compositor
#[derive(Debug)]
pub struct Compositor {
    program: Option<ProgramHandle>,
    compiled_pages: usize,
    recompile_pending: bool,
    targets: Option<FrameTargets>,
    width: u32,
    height: u32,
}

impl Compositor {
    /// Compositor for a `width` x `height` presentation surface
    ///
    /// No program exists until the first [`Self::recompile`].
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            program: None,
            compiled_pages: 0,
            recompile_pending: true,
            targets: None,
            width,
            height,
        }
    }

    /// Ask for a rebuild on the next tick
    pub fn request_recompile(&mut self) {
        self.recompile_pending = true;
    }

    /// Whether a rebuild was requested
    pub const fn recompile_pending(&self) -> bool {
        self.recompile_pending
    }

    /// Current program
    pub const fn program(&self) -> Option<ProgramHandle> {
        self.program
    }

    /// Atlas pages the current program samples
    pub const fn compiled_pages(&self) -> usize {
        self.compiled_pages
    }

    /// Presentation size
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Rebuild the program for the current pages and passes
    ///
    /// On failure the previous program stays active and the error is returned.
    pub fn recompile<D: GraphicsDevice>(
        &mut self,
        device: &mut D,
        passes: &RenderPassRegistry,
        atlas_pages: usize,
    ) -> DeviceResult<ProgramHandle> {
        self.recompile_pending = false;
        let source = shaders::build_program(passes, atlas_pages);

        match device.compile_program(&source) {
            Ok(program) => {
                if let Some(previous) = self.program.replace(program) {
                    device.delete_program(previous);
                }
                self.compiled_pages = atlas_pages.max(1);
                log::info!(
                    "Compositing program built: {} atlas page(s), {} render pass(es)",
                    self.compiled_pages,
                    passes.len()
                );
                Ok(program)
            }
            Err(e) => {
                if self.program.is_some() {
                    log::error!("Program rebuild failed, keeping previous program: {}", e);
                } else {
                    log::error!("Program build failed: {}", e);
                }
                Err(e)
            }
        }
    }

    /// Change the presentation size; frame targets are rebuilt on the next draw
    pub fn resize<D: GraphicsDevice>(&mut self, device: &mut D, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.release_targets(device);
        log::info!("Compositor resized to {}x{}", width, height);
    }

    /// Run all three kernels
    pub fn draw<D: GraphicsDevice>(
        &mut self,
        device: &mut D,
        layers: &mut LayerStack,
        atlas: &AtlasPacker,
        passes: &RenderPassRegistry,
        uniforms: &FrameUniforms,
    ) -> DeviceResult<DrawReport> {
        let mut report = DrawReport::default();
        let Some(program) = self.program else {
            log::warn!("No compositing program; skipping draw");
            return Ok(report);
        };
        let targets = self.ensure_targets(device)?;
        let (width, height) = (self.width, self.height);

        device.use_program(program)?;
        device.set_viewport(width, height);
        self.set_frame_uniforms(device, atlas, uniforms)?;
        device.bind_texture(shaders::FRAME_SNAPSHOT_UNIT, targets.frame_snapshot)?;
        device.bind_texture(shaders::MASK_SNAPSHOT_UNIT, targets.mask_snapshot)?;

        // Kernel 0: layer surfaces and the color mask
        device.bind_render_target(RenderTarget::Framebuffer(targets.mask))?;
        device.clear()?;
        for layer in layers.iter_mut() {
            let surface = layer.ensure_surface(device, width, height)?;
            if !layer.is_drawable() {
                if layer.needs_redraw() {
                    device.bind_render_target(RenderTarget::Framebuffer(surface.framebuffer))?;
                    device.clear()?;
                    layer.unmark(LayerFlags::NEEDS_REDRAW);
                }
                continue;
            }

            report.bytes_uploaded += layer.upload_vertices(device)?;
            let vertex_count = layer.bind_vertices(device)?;
            if vertex_count == 0 {
                continue;
            }

            if layer.needs_redraw() {
                device.bind_render_target(RenderTarget::Framebuffer(surface.framebuffer))?;
                device.clear()?;
                set_kernel(device, Kernel::Layer)?;
                select_pass(device, passes.pass_for(layer.id(), PassTarget::Layer))?;
                device.draw_triangles(vertex_count)?;
                layer.unmark(LayerFlags::NEEDS_REDRAW);
                report.layers_redrawn += 1;
                report.draw_calls += 1;
            }

            device.bind_render_target(RenderTarget::Framebuffer(targets.mask))?;
            set_kernel(device, Kernel::Mask)?;
            select_pass(device, None)?;
            device.draw_triangles(vertex_count)?;
            device.copy_target_to_texture(targets.mask_snapshot, width, height)?;
            report.draw_calls += 1;
        }

        // Kernel 1: composite surfaces onto the frame
        device.bind_render_target(RenderTarget::Framebuffer(targets.frame))?;
        device.clear()?;
        device.copy_target_to_texture(targets.frame_snapshot, width, height)?;
        bind_quad(device, &targets.quad)?;
        set_kernel(device, Kernel::Composite)?;
        for layer in layers.iter() {
            let Some(surface) = layer.surface() else {
                continue;
            };
            if layer.is_empty() {
                continue;
            }
            device.bind_texture(shaders::SURFACE_UNIT, surface.texture)?;
            select_pass(device, passes.pass_for(layer.id(), PassTarget::Composite))?;
            device.draw_triangles(VERTICES_PER_QUAD as u32)?;
            device.copy_target_to_texture(targets.frame_snapshot, width, height)?;
            report.layers_composited += 1;
            report.draw_calls += 1;
        }

        // Kernel 2: present
        device.bind_render_target(RenderTarget::Presentation)?;
        device.clear()?;
        device.bind_texture(shaders::SURFACE_UNIT, targets.frame_texture)?;
        set_kernel(device, Kernel::Present)?;
        select_pass(device, None)?;
        device.draw_triangles(VERTICES_PER_QUAD as u32)?;
        report.draw_calls += 1;

        log::trace!("Frame drawn: {:?}", report);
        Ok(report)
    }

    /// Free the frame targets and the program
    pub fn release<D: GraphicsDevice>(&mut self, device: &mut D) {
        self.release_targets(device);
        if let Some(program) = self.program.take() {
            device.delete_program(program);
        }
    }

    fn set_frame_uniforms<D: GraphicsDevice>(
        &self,
        device: &mut D,
        atlas: &AtlasPacker,
        uniforms: &FrameUniforms,
    ) -> DeviceResult<()> {
        let size = [self.width as f32, self.height as f32];
        let page = atlas.page_size() as f32;
        device.set_uniform(shaders::U_RESOLUTION, UniformValue::Vec2(size))?;
        device.set_uniform(shaders::U_FBO_RESOLUTION, UniformValue::Vec2(size))?;
        device.set_uniform(shaders::U_TEX_RESOLUTION, UniformValue::Vec2([page, page]))?;
        device.set_uniform(shaders::U_CAMERA, UniformValue::Vec4(uniforms.camera))?;
        device.set_uniform(shaders::U_MOUSE, UniformValue::Vec2(uniforms.mouse))?;
        device.set_uniform(shaders::U_DELTA, UniformValue::Vec2(uniforms.delta))?;
        device.set_uniform(shaders::U_ATLAS_PAGE_COUNT, UniformValue::Float(atlas.page_count() as f32))?;
        device.set_uniform(shaders::U_SURFACE, UniformValue::Sampler(shaders::SURFACE_UNIT))?;
        device.set_uniform(shaders::U_FRAME_SNAPSHOT, UniformValue::Sampler(shaders::FRAME_SNAPSHOT_UNIT))?;
        device.set_uniform(shaders::U_MASK_SNAPSHOT, UniformValue::Sampler(shaders::MASK_SNAPSHOT_UNIT))?;

        for index in 0..self.compiled_pages.min(atlas.page_count()) {
            let unit = shaders::atlas_unit(index);
            device.set_uniform(&shaders::atlas_sampler(index), UniformValue::Sampler(unit))?;
            if let Some(texture) = atlas.page(index).and_then(|page| page.texture()) {
                device.bind_texture(unit, texture)?;
            }
        }
        Ok(())
    }

    fn ensure_targets<D: GraphicsDevice>(&mut self, device: &mut D) -> DeviceResult<FrameTargets> {
        if let Some(targets) = self.targets {
            if (targets.width, targets.height) == (self.width, self.height) {
                return Ok(targets);
            }
            self.release_targets(device);
        }

        let (width, height) = (self.width, self.height);
        let frame = device.create_framebuffer(width, height)?;
        let frame_texture = device.framebuffer_texture(frame)?;
        let frame_snapshot = device.create_texture(width, height)?;
        let mask = device.create_framebuffer(width, height)?;
        let mask_snapshot = device.create_texture(width, height)?;
        let quad = create_quad(device, width as f32, height as f32)?;

        let targets = FrameTargets {
            frame,
            frame_texture,
            frame_snapshot,
            mask,
            mask_snapshot,
            quad,
            width,
            height,
        };
        self.targets = Some(targets);
        log::debug!("Frame targets created at {}x{}", width, height);
        Ok(targets)
    }

    fn release_targets<D: GraphicsDevice>(&mut self, device: &mut D) {
        if let Some(targets) = self.targets.take() {
            device.delete_framebuffer(targets.frame);
            device.delete_framebuffer(targets.mask);
            device.delete_texture(targets.frame_snapshot);
            device.delete_texture(targets.mask_snapshot);
            for buffer in targets.quad {
                device.delete_vertex_buffer(buffer);
            }
        }
    }
}

fn set_kernel<D: GraphicsDevice>(device: &mut D, kernel: Kernel) -> DeviceResult<()> {
    device.set_uniform(shaders::U_KERNELS, UniformValue::Float(kernel.value()))
}

fn select_pass<D: GraphicsDevice>(device: &mut D, pass: Option<&RenderPass>) -> DeviceResult<()> {
    let Some(pass) = pass else {
        return device.set_uniform(shaders::U_RENDER_PASS, UniformValue::Float(shaders::NO_PASS));
    };
    device.set_uniform(shaders::U_RENDER_PASS, UniformValue::Float(pass.selection_value()))?;
    for (name, value) in pass.uniforms() {
        device.set_uniform(name, UniformValue::Vec4(*value))?;
    }
    Ok(())
}

/// Full-surface quad used by the composite and present kernels
fn create_quad<D: GraphicsDevice>(device: &mut D, width: f32, height: f32) -> DeviceResult<[BufferHandle; 5]> {
    let mut blocks = [[0.0; 24]; 5];
    blocks[Attribute::Position.index()] = quad_positions(0.0, 0.0, width, height);
    blocks[Attribute::Property.index()] = uniform_block([0.0, 0.0, width, height]);
    blocks[Attribute::Property2.index()] = uniform_block([0.0, 1.0, 0.0, 0.0]);
    blocks[Attribute::TexCoord.index()] = uniform_block([0.0, 0.0, width, height]);

    let mut handles = [BufferHandle(0); 5];
    for attribute in Attribute::ALL {
        let bytes: &[u8] = bytemuck::cast_slice(&blocks[attribute.index()]);
        let handle = device.create_vertex_buffer(bytes.len())?;
        device.write_vertex_buffer(handle, 0, bytes)?;
        handles[attribute.index()] = handle;
    }
    Ok(handles)
}

fn bind_quad<D: GraphicsDevice>(device: &mut D, quad: &[BufferHandle; 5]) -> DeviceResult<()> {
    for attribute in Attribute::ALL {
        device.bind_attribute(attribute.name(), quad[attribute.index()], COMPONENTS as u32)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AtlasConfig;
    use crate::render::headless::RecordingDevice;
    use crate::render::layer::LayerId;
    use crate::render::render_pass::RenderPassOptions;

    fn atlas() -> AtlasPacker {
        AtlasPacker::new(&AtlasConfig { page_size: 64, step: 16, max_pages: None }, 4)
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_program() {
        let mut device = RecordingDevice::default();
        let mut compositor = Compositor::new(64, 64);
        let passes = RenderPassRegistry::new();
        let first = compositor.recompile(&mut device, &passes, 1).unwrap();

        device.set_reject_programs(true);
        assert!(compositor.recompile(&mut device, &passes, 2).is_err());
        assert_eq!(compositor.program(), Some(first));
        assert_eq!(compositor.compiled_pages(), 1);
        assert!(!compositor.recompile_pending());
    }

    #[test]
    fn test_rebuild_replaces_program() {
        let mut device = RecordingDevice::default();
        let mut compositor = Compositor::new(64, 64);
        let mut passes = RenderPassRegistry::new();
        let first = compositor.recompile(&mut device, &passes, 1).unwrap();
        passes
            .register(LayerId::new(1.0), RenderPassOptions::new(PassTarget::Layer, "void main() {}"))
            .unwrap();
        let second = compositor.recompile(&mut device, &passes, 1).unwrap();
        assert_ne!(first, second);
        assert_eq!(device.program_count(), 1);
        assert!(device.program_source(second).unwrap().fragment.contains("fn_1()"));
    }

    #[test]
    fn test_draw_without_program_is_skipped() {
        let mut device = RecordingDevice::default();
        let mut compositor = Compositor::new(64, 64);
        let mut layers = LayerStack::new(4);
        let report = compositor
            .draw(&mut device, &mut layers, &atlas(), &RenderPassRegistry::new(), &FrameUniforms::default())
            .unwrap();
        assert_eq!(report, DrawReport::default());
        assert!(device.draws().is_empty());
    }

    #[test]
    fn test_empty_stack_still_presents() {
        let mut device = RecordingDevice::default();
        let mut compositor = Compositor::new(64, 32);
        let passes = RenderPassRegistry::new();
        compositor.recompile(&mut device, &passes, 1).unwrap();
        let mut layers = LayerStack::new(4);
        let report = compositor
            .draw(&mut device, &mut layers, &atlas(), &passes, &FrameUniforms::default())
            .unwrap();
        assert_eq!(report.draw_calls, 1);
        let present = device.draws().last().unwrap();
        assert_eq!(present.target, RenderTarget::Presentation);
        assert_eq!(present.uniform_f32(shaders::U_KERNELS), Some(2.0));
        assert_eq!(present.attribute("a_position")[20..24], [64.0, 32.0, 1.0, 1.0]);
    }

    #[test]
    fn test_resize_rebuilds_targets() {
        let mut device = RecordingDevice::default();
        let mut compositor = Compositor::new(64, 64);
        let passes = RenderPassRegistry::new();
        compositor.recompile(&mut device, &passes, 1).unwrap();
        let mut layers = LayerStack::new(4);
        compositor.draw(&mut device, &mut layers, &atlas(), &passes, &FrameUniforms::default()).unwrap();

        compositor.resize(&mut device, 128, 32);
        compositor.draw(&mut device, &mut layers, &atlas(), &passes, &FrameUniforms::default()).unwrap();
        assert_eq!(compositor.size(), (128, 32));
        assert_eq!(device.viewport(), (128, 32));
    }
}
