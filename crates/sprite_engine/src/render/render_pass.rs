//! Custom render passes
//!
//! A render pass attaches a fragment snippet to one layer. Its `void main()` is
//! renamed to a per-layer function and spliced into the compositing shader,
//! where it runs only while the pass-selection uniform names that layer. The
//! snippet may read and rewrite the global `pixel` color before it is written
//! out.
//!
//! Passes either run while the layer's own sprites are drawn into its surface
//! ([`PassTarget::Layer`]) or while that surface is composited onto the frame
//! ([`PassTarget::Composite`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::render::layer::LayerId;
use crate::render::shaders;

/// Render pass validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShaderError {
    /// Snippet has no `void main()` entry point
    #[error("Render pass for layer {0} has no `void main()` entry point")]
    MissingEntryPoint(String),

    /// Curly braces do not pair up
    #[error("Render pass for layer {0} has unbalanced braces")]
    UnbalancedBraces(String),

    /// Uniform name is not a GLSL identifier
    #[error("Invalid uniform name '{0}'")]
    InvalidUniformName(String),

    /// Uniform name collides with a built-in uniform
    #[error("Uniform name '{0}' is reserved")]
    ReservedUniformName(String),

    /// Layer id cannot be written into shader source
    #[error("Layer id {0} cannot host a render pass")]
    InvalidLayerId(String),
}

/// Kernel a pass runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PassTarget {
    /// While sprites are drawn into the layer surface
    #[default]
    Layer,
    /// While the layer surface is composited onto the frame
    Composite,
}

/// Options for `SpriteEngine::add_render_pass`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderPassOptions {
    /// Kernel the pass runs in
    pub target: PassTarget,
    /// Fragment snippet with a `void main()` entry point
    pub code: String,
    /// Extra `vec4` uniforms declared for the snippet
    pub uniforms: BTreeMap<String, [f32; 4]>,
}

impl RenderPassOptions {
    /// Options for `code` running in `target`
    pub fn new(target: PassTarget, code: impl Into<String>) -> Self {
        Self {
            target,
            code: code.into(),
            uniforms: BTreeMap::new(),
        }
    }

    /// Declare a uniform with an initial value
    pub fn with_uniform(mut self, name: impl Into<String>, value: [f32; 4]) -> Self {
        self.uniforms.insert(name.into(), value);
        self
    }
}

/// A validated render pass bound to a layer
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    layer: LayerId,
    target: PassTarget,
    code: String,
    uniforms: BTreeMap<String, [f32; 4]>,
}

impl RenderPass {
    /// Layer the pass belongs to
    pub const fn layer(&self) -> LayerId {
        self.layer
    }

    /// Kernel the pass runs in
    pub const fn target(&self) -> PassTarget {
        self.target
    }

    /// Original snippet
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Declared uniforms and their current values
    pub const fn uniforms(&self) -> &BTreeMap<String, [f32; 4]> {
        &self.uniforms
    }

    /// Set a uniform value; returns `true` when the name was not declared before
    pub fn set_uniform(&mut self, name: &str, value: [f32; 4]) -> Result<bool, ShaderError> {
        if let Some(slot) = self.uniforms.get_mut(name) {
            *slot = value;
            return Ok(false);
        }
        validate_uniform_name(name)?;
        self.uniforms.insert(name.to_owned(), value);
        Ok(true)
    }

    /// Name the snippet's entry point is renamed to
    pub fn function_name(&self) -> String {
        function_name(self.layer)
    }

    /// Value of the pass-selection uniform that activates this pass
    pub fn selection_value(&self) -> f32 {
        shaders::PASS_SELECTOR_OFFSET + self.layer.value()
    }

    /// Snippet with its entry point renamed
    pub fn renamed_code(&self) -> String {
        self.code
            .replacen("void main(", &format!("void {}(", self.function_name()), 1)
    }
}

/// Shader function name for a layer's pass
pub fn function_name(layer: LayerId) -> String {
    let sanitized: String = format!("{layer}")
        .chars()
        .map(|c| match c {
            '.' => '_',
            '-' => 'n',
            other => other,
        })
        .collect();
    format!("fn_{sanitized}")
}

fn validate_uniform_name(name: &str) -> Result<(), ShaderError> {
    let mut chars = name.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ShaderError::InvalidUniformName(name.to_owned()));
    }
    if shaders::is_reserved_name(name) {
        return Err(ShaderError::ReservedUniformName(name.to_owned()));
    }
    Ok(())
}

fn validate_code(layer: LayerId, code: &str) -> Result<(), ShaderError> {
    if !code.contains("void main(") {
        return Err(ShaderError::MissingEntryPoint(layer.to_string()));
    }
    let mut depth: i64 = 0;
    for c in code.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(ShaderError::UnbalancedBraces(layer.to_string()));
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ShaderError::UnbalancedBraces(layer.to_string()));
    }
    Ok(())
}

/// Render passes by layer, in ascending layer order
#[derive(Debug, Clone, Default)]
pub struct RenderPassRegistry {
    passes: BTreeMap<LayerId, RenderPass>,
}

impl RenderPassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a pass, replacing any previous pass on the layer
    ///
    /// Uniforms not named in `options` carry over from the replaced pass.
    pub fn register(&mut self, layer: LayerId, options: RenderPassOptions) -> Result<&RenderPass, ShaderError> {
        if !layer.value().is_finite() {
            return Err(ShaderError::InvalidLayerId(layer.to_string()));
        }
        validate_code(layer, &options.code)?;
        for name in options.uniforms.keys() {
            validate_uniform_name(name)?;
        }

        let mut uniforms = self
            .passes
            .remove(&layer)
            .map(|previous| previous.uniforms)
            .unwrap_or_default();
        uniforms.extend(options.uniforms);

        log::info!("Render pass registered on layer {} ({:?})", layer, options.target);
        let pass = self.passes.entry(layer).or_insert(RenderPass {
            layer,
            target: options.target,
            code: options.code,
            uniforms,
        });
        Ok(pass)
    }

    /// Remove a layer's pass
    pub fn remove(&mut self, layer: LayerId) -> Option<RenderPass> {
        self.passes.remove(&layer)
    }

    /// Borrow a layer's pass
    pub fn get(&self, layer: LayerId) -> Option<&RenderPass> {
        self.passes.get(&layer)
    }

    /// Mutably borrow a layer's pass
    pub fn get_mut(&mut self, layer: LayerId) -> Option<&mut RenderPass> {
        self.passes.get_mut(&layer)
    }

    /// The layer's pass, if it runs in `target`
    pub fn pass_for(&self, layer: LayerId, target: PassTarget) -> Option<&RenderPass> {
        self.passes.get(&layer).filter(|pass| pass.target == target)
    }

    /// Passes in ascending layer order
    pub fn iter(&self) -> impl Iterator<Item = &RenderPass> {
        self.passes.values()
    }

    /// Number of passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Whether no pass is registered
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}
