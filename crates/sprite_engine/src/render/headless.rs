//! Headless graphics device
//!
//! [`RecordingDevice`] keeps every resource in plain memory and logs each call.
//! It lets the engine run without a GPU (tests, tooling, the demo binary) while
//! still exercising the full device contract, including program validation.

use std::collections::HashMap;

use crate::render::device::{
    BufferHandle, DeviceError, DeviceResult, FramebufferHandle, GraphicsDevice, ProgramHandle,
    RenderTarget, ShaderSource, TextureHandle, UniformValue,
};

/// One call made against the device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// Texture created
    CreateTexture(TextureHandle),
    /// Texture contents replaced
    UpdateTexture(TextureHandle),
    /// Texture deleted
    DeleteTexture(TextureHandle),
    /// Framebuffer created
    CreateFramebuffer(FramebufferHandle),
    /// Framebuffer deleted
    DeleteFramebuffer(FramebufferHandle),
    /// Render target bound
    BindTarget(RenderTarget),
    /// Bound target cleared
    Clear(RenderTarget),
    /// Bound target copied into a texture
    CopyToTexture(TextureHandle),
    /// Vertex buffer created with the given byte size
    CreateBuffer(BufferHandle, usize),
    /// Vertex buffer written at an offset with a byte count
    WriteBuffer(BufferHandle, usize, usize),
    /// Vertex buffer deleted
    DeleteBuffer(BufferHandle),
    /// Program compiled
    CompileProgram(ProgramHandle),
    /// Program made current
    UseProgram(ProgramHandle),
    /// Program deleted
    DeleteProgram(ProgramHandle),
    /// Draw call issued
    Draw(RenderTarget, u32),
}

/// Snapshot of the device state at a draw call
#[derive(Debug, Clone)]
pub struct DrawRecord {
    /// Target the draw landed on
    pub target: RenderTarget,
    /// Number of vertices submitted
    pub vertex_count: u32,
    /// Uniform values at draw time
    pub uniforms: HashMap<String, UniformValue>,
    /// Attribute data at draw time, decoded to floats
    pub attributes: HashMap<String, Vec<f32>>,
    /// Texture bound to each unit at draw time
    pub textures: HashMap<u32, TextureHandle>,
}

impl DrawRecord {
    /// Float value of a scalar uniform, if set
    pub fn uniform_f32(&self, name: &str) -> Option<f32> {
        match self.uniforms.get(name) {
            Some(UniformValue::Float(value)) => Some(*value),
            _ => None,
        }
    }

    /// Attribute floats, empty if the attribute was not bound
    pub fn attribute(&self, name: &str) -> &[f32] {
        self.attributes.get(name).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone)]
struct TextureRecord {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct FramebufferRecord {
    width: u32,
    height: u32,
    texture: TextureHandle,
}

/// In-memory [`GraphicsDevice`] that records every call
#[derive(Debug)]
pub struct RecordingDevice {
    next_id: u64,
    max_texture_units: u32,
    reject_programs: bool,
    textures: HashMap<u64, TextureRecord>,
    framebuffers: HashMap<u64, FramebufferRecord>,
    buffers: HashMap<u64, Vec<u8>>,
    programs: HashMap<u64, ShaderSource>,
    attributes: HashMap<String, BufferHandle>,
    uniforms: HashMap<String, UniformValue>,
    bound_textures: HashMap<u32, TextureHandle>,
    target: RenderTarget,
    current_program: Option<ProgramHandle>,
    viewport: (u32, u32),
    commands: Vec<DeviceCommand>,
    draws: Vec<DrawRecord>,
    bytes_written: usize,
}

impl RecordingDevice {
    /// Create a device exposing `max_texture_units` sampler units
    pub fn new(max_texture_units: u32) -> Self {
        Self {
            next_id: 1,
            max_texture_units,
            reject_programs: false,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            buffers: HashMap::new(),
            programs: HashMap::new(),
            attributes: HashMap::new(),
            uniforms: HashMap::new(),
            bound_textures: HashMap::new(),
            target: RenderTarget::Presentation,
            current_program: None,
            viewport: (0, 0),
            commands: Vec::new(),
            draws: Vec::new(),
            bytes_written: 0,
        }
    }

    /// Make every following compilation fail, as a broken driver would
    pub fn set_reject_programs(&mut self, reject: bool) {
        self.reject_programs = reject;
    }

    /// All recorded calls
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// All recorded draw calls
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Forget recorded calls and draws, keeping resources
    pub fn clear_log(&mut self) {
        self.commands.clear();
        self.draws.clear();
        self.bytes_written = 0;
    }

    /// Total vertex-buffer bytes written since the last [`Self::clear_log`]
    pub const fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Number of live programs
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Source of a live program
    pub fn program_source(&self, program: ProgramHandle) -> Option<&ShaderSource> {
        self.programs.get(&program.0)
    }

    /// Currently active program
    pub const fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    /// Size and pixels of a texture
    pub fn texture_pixels(&self, texture: TextureHandle) -> Option<(u32, u32, &[u8])> {
        self.textures
            .get(&texture.0)
            .map(|record| (record.width, record.height, record.pixels.as_slice()))
    }

    /// Size of a framebuffer
    pub fn framebuffer_size(&self, framebuffer: FramebufferHandle) -> Option<(u32, u32)> {
        self.framebuffers
            .get(&framebuffer.0)
            .map(|record| (record.width, record.height))
    }

    /// Last viewport set
    pub const fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn decode_floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn validate(source: &ShaderSource) -> DeviceResult<()> {
        for (stage, text) in [("vertex", &source.vertex), ("fragment", &source.fragment)] {
            if !text.contains("void main()") {
                return Err(DeviceError::CompilationFailed(format!("{stage} stage has no main()")));
            }
            let mut depth: i64 = 0;
            for ch in text.chars() {
                match ch {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
                if depth < 0 {
                    return Err(DeviceError::CompilationFailed(format!("{stage} stage has an unmatched '}}'")));
                }
            }
            if depth != 0 {
                return Err(DeviceError::CompilationFailed(format!("{stage} stage has unbalanced braces")));
            }
        }
        Ok(())
    }
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new(16)
    }
}

impl GraphicsDevice for RecordingDevice {
    fn max_texture_units(&self) -> u32 {
        self.max_texture_units
    }

    fn create_texture(&mut self, width: u32, height: u32) -> DeviceResult<TextureHandle> {
        let handle = TextureHandle(self.allocate_id());
        self.textures.insert(handle.0, TextureRecord { width, height, pixels: Vec::new() });
        self.commands.push(DeviceCommand::CreateTexture(handle));
        Ok(handle)
    }

    fn update_texture(&mut self, texture: TextureHandle, width: u32, height: u32, rgba: &[u8]) -> DeviceResult<()> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(DeviceError::OutOfRange(format!(
                "texture upload of {} bytes for {width}x{height}",
                rgba.len()
            )));
        }
        let record = self
            .textures
            .get_mut(&texture.0)
            .ok_or(DeviceError::InvalidHandle { kind: "texture", id: texture.0 })?;
        record.width = width;
        record.height = height;
        record.pixels = rgba.to_vec();
        self.commands.push(DeviceCommand::UpdateTexture(texture));
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture.0).is_some() {
            self.bound_textures.retain(|_, bound| *bound != texture);
            self.commands.push(DeviceCommand::DeleteTexture(texture));
        }
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> DeviceResult<FramebufferHandle> {
        let texture = self.create_texture(width, height)?;
        let handle = FramebufferHandle(self.allocate_id());
        self.framebuffers.insert(handle.0, FramebufferRecord { width, height, texture });
        self.commands.push(DeviceCommand::CreateFramebuffer(handle));
        Ok(handle)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if let Some(record) = self.framebuffers.remove(&framebuffer.0) {
            self.textures.remove(&record.texture.0);
            self.commands.push(DeviceCommand::DeleteFramebuffer(framebuffer));
        }
    }

    fn framebuffer_texture(&self, framebuffer: FramebufferHandle) -> DeviceResult<TextureHandle> {
        self.framebuffers
            .get(&framebuffer.0)
            .map(|record| record.texture)
            .ok_or(DeviceError::InvalidHandle { kind: "framebuffer", id: framebuffer.0 })
    }

    fn bind_render_target(&mut self, target: RenderTarget) -> DeviceResult<()> {
        if let RenderTarget::Framebuffer(framebuffer) = target {
            if !self.framebuffers.contains_key(&framebuffer.0) {
                return Err(DeviceError::InvalidHandle { kind: "framebuffer", id: framebuffer.0 });
            }
        }
        self.target = target;
        self.commands.push(DeviceCommand::BindTarget(target));
        Ok(())
    }

    fn clear(&mut self) -> DeviceResult<()> {
        self.commands.push(DeviceCommand::Clear(self.target));
        Ok(())
    }

    fn copy_target_to_texture(&mut self, texture: TextureHandle, width: u32, height: u32) -> DeviceResult<()> {
        let record = self
            .textures
            .get_mut(&texture.0)
            .ok_or(DeviceError::InvalidHandle { kind: "texture", id: texture.0 })?;
        record.width = width;
        record.height = height;
        self.commands.push(DeviceCommand::CopyToTexture(texture));
        Ok(())
    }

    fn create_vertex_buffer(&mut self, size: usize) -> DeviceResult<BufferHandle> {
        let handle = BufferHandle(self.allocate_id());
        self.buffers.insert(handle.0, vec![0; size]);
        self.commands.push(DeviceCommand::CreateBuffer(handle, size));
        Ok(handle)
    }

    fn write_vertex_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> DeviceResult<()> {
        let storage = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(DeviceError::InvalidHandle { kind: "buffer", id: buffer.0 })?;
        let end = offset + data.len();
        if end > storage.len() {
            return Err(DeviceError::OutOfRange(format!(
                "buffer write {offset}..{end} past size {}",
                storage.len()
            )));
        }
        storage[offset..end].copy_from_slice(data);
        self.bytes_written += data.len();
        self.commands.push(DeviceCommand::WriteBuffer(buffer, offset, data.len()));
        Ok(())
    }

    fn delete_vertex_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_some() {
            self.attributes.retain(|_, bound| *bound != buffer);
            self.commands.push(DeviceCommand::DeleteBuffer(buffer));
        }
    }

    fn bind_attribute(&mut self, name: &str, buffer: BufferHandle, _components: u32) -> DeviceResult<()> {
        if !self.buffers.contains_key(&buffer.0) {
            return Err(DeviceError::InvalidHandle { kind: "buffer", id: buffer.0 });
        }
        self.attributes.insert(name.to_string(), buffer);
        Ok(())
    }

    fn compile_program(&mut self, source: &ShaderSource) -> DeviceResult<ProgramHandle> {
        if self.reject_programs {
            return Err(DeviceError::CompilationFailed("device rejected program".to_string()));
        }
        Self::validate(source)?;
        let handle = ProgramHandle(self.allocate_id());
        self.programs.insert(handle.0, source.clone());
        self.commands.push(DeviceCommand::CompileProgram(handle));
        Ok(handle)
    }

    fn use_program(&mut self, program: ProgramHandle) -> DeviceResult<()> {
        if !self.programs.contains_key(&program.0) {
            return Err(DeviceError::InvalidHandle { kind: "program", id: program.0 });
        }
        self.current_program = Some(program);
        self.commands.push(DeviceCommand::UseProgram(program));
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program.0).is_some() {
            if self.current_program == Some(program) {
                self.current_program = None;
            }
            self.commands.push(DeviceCommand::DeleteProgram(program));
        }
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> DeviceResult<()> {
        self.uniforms.insert(name.to_string(), value);
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> DeviceResult<()> {
        if !self.textures.contains_key(&texture.0) {
            return Err(DeviceError::InvalidHandle { kind: "texture", id: texture.0 });
        }
        self.bound_textures.insert(unit, texture);
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn draw_triangles(&mut self, vertex_count: u32) -> DeviceResult<()> {
        if self.current_program.is_none() {
            return Err(DeviceError::ResourceCreationFailed("draw without a program".to_string()));
        }
        let attributes = self
            .attributes
            .iter()
            .filter_map(|(name, buffer)| {
                self.buffers
                    .get(&buffer.0)
                    .map(|bytes| (name.clone(), Self::decode_floats(bytes)))
            })
            .collect();
        self.draws.push(DrawRecord {
            target: self.target,
            vertex_count,
            uniforms: self.uniforms.clone(),
            attributes,
            textures: self.bound_textures.clone(),
        });
        self.commands.push(DeviceCommand::Draw(self.target, vertex_count));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_source() -> ShaderSource {
        ShaderSource {
            vertex: "void main() { gl_Position = vec4(0.0); }".to_string(),
            fragment: "void main() { if (true) { } }".to_string(),
        }
    }

    #[test]
    fn test_program_validation() {
        let mut device = RecordingDevice::default();
        assert!(device.compile_program(&valid_source()).is_ok());

        let mut broken = valid_source();
        broken.fragment.push('{');
        assert!(matches!(device.compile_program(&broken), Err(DeviceError::CompilationFailed(_))));

        device.set_reject_programs(true);
        assert!(device.compile_program(&valid_source()).is_err());
        assert_eq!(device.program_count(), 1);
    }

    #[test]
    fn test_buffer_write_bounds() {
        let mut device = RecordingDevice::default();
        let buffer = device.create_vertex_buffer(16).unwrap();
        assert!(device.write_vertex_buffer(buffer, 8, &[1; 8]).is_ok());
        assert!(device.write_vertex_buffer(buffer, 12, &[1; 8]).is_err());
        assert_eq!(device.bytes_written(), 8);
    }

    #[test]
    fn test_draw_snapshots_attributes() {
        let mut device = RecordingDevice::default();
        let program = device.compile_program(&valid_source()).unwrap();
        device.use_program(program).unwrap();
        let buffer = device.create_vertex_buffer(8).unwrap();
        device
            .write_vertex_buffer(buffer, 0, bytemuck::cast_slice(&[1.5f32, -2.0]))
            .unwrap();
        device.bind_attribute("a_position", buffer, 2).unwrap();
        device.set_uniform("u_kernels", UniformValue::Float(1.0)).unwrap();
        device.draw_triangles(6).unwrap();

        let draw = &device.draws()[0];
        assert_eq!(draw.attribute("a_position"), &[1.5, -2.0]);
        assert_eq!(draw.uniform_f32("u_kernels"), Some(1.0));
        assert_eq!(draw.target, RenderTarget::Presentation);
    }

    #[test]
    fn test_framebuffer_owns_texture() {
        let mut device = RecordingDevice::default();
        let framebuffer = device.create_framebuffer(64, 32).unwrap();
        let texture = device.framebuffer_texture(framebuffer).unwrap();
        assert_eq!(device.framebuffer_size(framebuffer), Some((64, 32)));
        device.delete_framebuffer(framebuffer);
        assert!(device.texture_pixels(texture).is_none());
        assert!(device.bind_render_target(RenderTarget::Framebuffer(framebuffer)).is_err());
    }
}
