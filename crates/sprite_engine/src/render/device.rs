//! Graphics device abstraction
//!
//! The sprite engine never talks to a graphics API directly. Everything it needs
//! from the GPU (textures, offscreen framebuffers, vertex buffers, program
//! compilation, uniforms and draw calls) goes through [`GraphicsDevice`], so the
//! same core can sit on top of WebGL-style, Vulkan or purely headless backends.

use thiserror::Error;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors reported by a graphics device
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// A handle did not refer to a live resource
    #[error("Invalid {kind} handle: {id}")]
    InvalidHandle {
        /// Resource kind ("texture", "framebuffer", ...)
        kind: &'static str,
        /// Raw handle value
        id: u64,
    },

    /// Shader program compilation or linking failed
    #[error("Program compilation failed: {0}")]
    CompilationFailed(String),

    /// A write or copy went past the end of a resource
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Resource creation failed
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),
}

/// Handle to a device texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Handle to an offscreen framebuffer with a color texture attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub u64);

/// Handle to a vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Handle to a compiled shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// Where draw calls land
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// The presentation surface (the canvas or swapchain image)
    Presentation,
    /// An offscreen framebuffer
    Framebuffer(FramebufferHandle),
}

/// Value of a named uniform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// Single float
    Float(f32),
    /// Two-component vector
    Vec2([f32; 2]),
    /// Four-component vector
    Vec4([f32; 4]),
    /// Sampler bound to a texture unit
    Sampler(u32),
}

/// Assembled vertex and fragment program source
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderSource {
    /// Vertex stage source
    pub vertex: String,
    /// Fragment stage source
    pub fragment: String,
}

/// Graphics device capability consumed by the sprite engine
///
/// Implementations keep their own notion of the currently bound program,
/// render target, attributes and texture units; the engine sets all of them
/// explicitly before every draw.
pub trait GraphicsDevice {
    /// Number of texture units a fragment program may sample from
    fn max_texture_units(&self) -> u32;

    /// Create an RGBA8 texture
    fn create_texture(&mut self, width: u32, height: u32) -> DeviceResult<TextureHandle>;

    /// Replace the full contents of an RGBA8 texture
    fn update_texture(&mut self, texture: TextureHandle, width: u32, height: u32, rgba: &[u8]) -> DeviceResult<()>;

    /// Destroy a standalone texture
    fn delete_texture(&mut self, texture: TextureHandle);

    /// Create an offscreen framebuffer with its own color texture
    fn create_framebuffer(&mut self, width: u32, height: u32) -> DeviceResult<FramebufferHandle>;

    /// Destroy a framebuffer and its color texture
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Color texture attached to a framebuffer
    fn framebuffer_texture(&self, framebuffer: FramebufferHandle) -> DeviceResult<TextureHandle>;

    /// Direct subsequent clears and draws at `target`
    fn bind_render_target(&mut self, target: RenderTarget) -> DeviceResult<()>;

    /// Clear the bound render target to transparent black
    fn clear(&mut self) -> DeviceResult<()>;

    /// Copy the bound render target's pixels into `texture`
    fn copy_target_to_texture(&mut self, texture: TextureHandle, width: u32, height: u32) -> DeviceResult<()>;

    /// Allocate a vertex buffer of `size` bytes
    fn create_vertex_buffer(&mut self, size: usize) -> DeviceResult<BufferHandle>;

    /// Overwrite part of a vertex buffer starting at `offset` bytes
    fn write_vertex_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> DeviceResult<()>;

    /// Release a vertex buffer
    fn delete_vertex_buffer(&mut self, buffer: BufferHandle);

    /// Feed a named vertex attribute from `buffer` (`components` floats per vertex)
    fn bind_attribute(&mut self, name: &str, buffer: BufferHandle, components: u32) -> DeviceResult<()>;

    /// Compile and link a program
    fn compile_program(&mut self, source: &ShaderSource) -> DeviceResult<ProgramHandle>;

    /// Make a program current
    fn use_program(&mut self, program: ProgramHandle) -> DeviceResult<()>;

    /// Destroy a program
    fn delete_program(&mut self, program: ProgramHandle);

    /// Set a named uniform on the current program
    fn set_uniform(&mut self, name: &str, value: UniformValue) -> DeviceResult<()>;

    /// Bind a texture to a texture unit
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> DeviceResult<()>;

    /// Set the viewport size of the bound target
    fn set_viewport(&mut self, width: u32, height: u32);

    /// Draw `vertex_count` vertices as a triangle list
    fn draw_triangles(&mut self, vertex_count: u32) -> DeviceResult<()>;
}
