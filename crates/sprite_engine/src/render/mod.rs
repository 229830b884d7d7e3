//! # Rendering System
//!
//! Everything between a sprite description and a presented frame.
//!
//! ## Architecture
//!
//! - **Device**: [`GraphicsDevice`] abstracts the GPU; [`RecordingDevice`] is the
//!   in-memory implementation
//! - **Vertex Store**: per-layer attribute arrays with stable slots
//! - **Layers**: ordered drawing planes, each with a cached surface
//! - **Atlas**: multi-page packer the images are drawn from
//! - **Synchronizer**: diffs sprites into their slots
//! - **Render Passes & Shaders**: per-layer fragment snippets spliced into one
//!   generated program
//! - **Compositor**: the three kernels run every draw tick

pub mod atlas;
pub mod compositor;
pub mod device;
pub mod headless;
pub mod layer;
pub mod render_pass;
pub mod shaders;
pub mod sync;
pub mod vertex_store;

pub use atlas::{AtlasError, AtlasPacker, AtlasRegion, Placement};
pub use compositor::{Compositor, DrawReport, FrameUniforms, Kernel};
pub use device::{
    BufferHandle, DeviceError, DeviceResult, FramebufferHandle, GraphicsDevice, ProgramHandle,
    RenderTarget, ShaderSource, TextureHandle, UniformValue,
};
pub use headless::{DeviceCommand, DrawRecord, RecordingDevice};
pub use layer::{Layer, LayerFlags, LayerId, LayerOptions, LayerSpec, LayerStack};
pub use render_pass::{PassTarget, RenderPass, RenderPassOptions, RenderPassRegistry, ShaderError};
pub use sync::{SyncOutcome, Synchronizer};
pub use vertex_store::{Attribute, VertexError, VertexStore};
