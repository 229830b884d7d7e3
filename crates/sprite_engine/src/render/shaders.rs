//! Compositing shader assembly
//!
//! One program serves every kernel. The fragment stage is generated from the
//! number of atlas pages (one sampler each, picked by a page swapper) and the
//! registered render passes (renamed functions plus a dispatch on the
//! pass-selection uniform), so any change to either requires a recompile.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::render::device::ShaderSource;
use crate::render::render_pass::RenderPassRegistry;

/// Presentation size in pixels
pub const U_RESOLUTION: &str = "u_resolution";
/// Atlas page size in pixels
pub const U_TEX_RESOLUTION: &str = "u_texResolution";
/// Offscreen surface size in pixels
pub const U_FBO_RESOLUTION: &str = "u_fboResolution";
/// Camera x, y, zoom, rotation
pub const U_CAMERA: &str = "u_camera";
/// Pointer position, y flipped
pub const U_MOUSE: &str = "u_mouse";
/// Active kernel
pub const U_KERNELS: &str = "u_kernels";
/// Seconds since the previous tick
pub const U_DELTA: &str = "u_delta";
/// Pass selection: offset plus layer id, or [`NO_PASS`]
pub const U_RENDER_PASS: &str = "u_renderPass";
/// Number of atlas pages
pub const U_ATLAS_PAGE_COUNT: &str = "u_atlasPagecount";
/// Surface sampled while compositing and presenting
pub const U_SURFACE: &str = "u_surface";
/// Snapshot of the frame composited so far
pub const U_FRAME_SNAPSHOT: &str = "u_frameSnapshot";
/// Snapshot of the color mask
pub const U_MASK_SNAPSHOT: &str = "u_maskSnapshot";

/// Texture unit of [`U_SURFACE`]
pub const SURFACE_UNIT: u32 = 0;
/// Texture unit of [`U_FRAME_SNAPSHOT`]
pub const FRAME_SNAPSHOT_UNIT: u32 = 1;
/// Texture unit of [`U_MASK_SNAPSHOT`]
pub const MASK_SNAPSHOT_UNIT: u32 = 2;
/// Units taken before the first atlas page
pub const RESERVED_TEXTURE_UNITS: u32 = 3;

/// Added to a layer id to form its pass-selection value
pub const PASS_SELECTOR_OFFSET: f32 = 100.0;
/// Pass-selection value when no pass is active
pub const NO_PASS: f32 = -1.0;

const BUILTIN_UNIFORMS: [&str; 12] = [
    U_RESOLUTION,
    U_TEX_RESOLUTION,
    U_FBO_RESOLUTION,
    U_CAMERA,
    U_MOUSE,
    U_KERNELS,
    U_DELTA,
    U_RENDER_PASS,
    U_ATLAS_PAGE_COUNT,
    U_SURFACE,
    U_FRAME_SNAPSHOT,
    U_MASK_SNAPSHOT,
];

/// Sampler uniform of an atlas page
pub fn atlas_sampler(page: usize) -> String {
    format!("u_atlas{page}")
}

/// Texture unit of an atlas page
pub fn atlas_unit(page: usize) -> u32 {
    RESERVED_TEXTURE_UNITS + u32::try_from(page).unwrap_or(u32::MAX - RESERVED_TEXTURE_UNITS)
}

/// Whether a name is taken by the built-in uniforms
pub fn is_reserved_name(name: &str) -> bool {
    BUILTIN_UNIFORMS.contains(&name)
        || name
            .strip_prefix("u_atlas")
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

const VERTEX_SHADER: &str = r"#version 300 es
precision highp float;

in vec4 a_position;
in vec4 a_property;
in vec4 a_property2;
in vec4 a_texCoord;
in vec4 a_color;

uniform vec2 u_resolution;
uniform vec4 u_camera;
uniform float u_kernels;

out float v_opacity;
out vec4 v_texCoord;
out vec2 v_texSpace;
out vec4 v_color;
out float v_atlasPage;

void main()
{
    vec2 position = a_position.xy;
    bool sprites = u_kernels < 1.0;

    if (sprites && a_property2.x != 0.0)
    {
        vec2 center = a_property.xy + a_property.zw * 0.5;
        float angle = radians(a_property2.x);
        vec2 offset = position - center;
        position = center + vec2(offset.x * cos(angle) - offset.y * sin(angle),
                                 offset.x * sin(angle) + offset.y * cos(angle));
    }

    if (sprites) position -= u_camera.xy;

    vec2 clip = position / (u_resolution / u_camera.z) * 2.0 - 1.0;
    gl_Position = vec4(clip.x, sprites ? -clip.y : clip.y, 0.0, 1.0);

    v_opacity = a_property2.y;
    v_texCoord = a_texCoord;
    v_texSpace = a_position.zw;
    v_color = a_color;
    v_atlasPage = a_property2.z;
}
";

const FRAGMENT_HEAD: &str = r"#version 300 es
precision highp float;

in float v_opacity;
in vec4 v_texCoord;
in vec2 v_texSpace;
in vec4 v_color;
in float v_atlasPage;

uniform vec2 u_resolution;
uniform vec2 u_texResolution;
uniform vec2 u_fboResolution;
uniform vec4 u_camera;
uniform vec2 u_mouse;
uniform float u_kernels;
uniform vec2 u_delta;
uniform float u_renderPass;
uniform float u_atlasPagecount;
uniform sampler2D u_surface;
uniform sampler2D u_frameSnapshot;
uniform sampler2D u_maskSnapshot;
";

const FRAGMENT_GLOBALS: &str = r"
out vec4 outColor;

vec4 pixel;
vec4 pixelMask;
vec2 mouse;
";

const FRAGMENT_MAIN: &str = r"
void main()
{
    mouse = u_mouse / (u_fboResolution / u_resolution);

    if (u_kernels < 1.0)
    {
        pixel = v_texCoord.x < 0.0 ? v_color : queryAtlas(v_texCoord);
    }
    else
    {
        pixel = texture(u_surface, v_texSpace);
        pixelMask = texture(u_maskSnapshot, v_texSpace);
    }
";

const FRAGMENT_TAIL: &str = r"
    if (u_kernels == 0.0 && pixel.w > 0.0)
        pixel.w = min(v_opacity, pixel.w);

    if (u_kernels == 0.5)
    {
        if (v_color.w > 0.0 && pixel.w > 0.0 && v_opacity > 0.0)
            pixel = vec4(v_color.xyz, 1.0);
        else
            discard;
    }

    if (u_kernels == 1.0 && pixel.w == 0.0) discard;
    else if (u_kernels == 2.0 && pixel.w == 0.0) pixel = vec4(0.0, 0.0, 0.0, 1.0);

    outColor = pixel;
}
";

/// Generate the compositing program for `atlas_pages` pages and the registered passes
pub fn build_program(passes: &RenderPassRegistry, atlas_pages: usize) -> ShaderSource {
    let pages = atlas_pages.max(1);
    let mut fragment = String::from(FRAGMENT_HEAD);

    for page in 0..pages {
        let _ = writeln!(fragment, "uniform sampler2D {};", atlas_sampler(page));
    }
    let declared: BTreeSet<&str> = passes
        .iter()
        .flat_map(|pass| pass.uniforms().keys().map(String::as_str))
        .collect();
    for name in declared {
        let _ = writeln!(fragment, "uniform vec4 {name};");
    }
    fragment.push_str(FRAGMENT_GLOBALS);

    fragment.push_str("\nvec4 queryAtlas(vec4 region)\n{\n");
    fragment.push_str("    vec2 uv = (region.xy + v_texSpace * region.zw) / u_texResolution;\n");
    fragment.push_str("    int page = int(v_atlasPage + 0.5);\n");
    for page in 0..pages {
        let keyword = if page == 0 { "if" } else { "else if" };
        let _ = writeln!(
            fragment,
            "    {keyword} (page == {page}) return texture({}, uv);",
            atlas_sampler(page)
        );
    }
    fragment.push_str("    return vec4(0.0);\n}\n");

    for pass in passes.iter() {
        fragment.push('\n');
        fragment.push_str(&pass.renamed_code());
        fragment.push('\n');
    }

    fragment.push_str(FRAGMENT_MAIN);
    for pass in passes.iter() {
        let _ = writeln!(
            fragment,
            "    if (abs(u_renderPass - {PASS_SELECTOR_OFFSET:?} - {:?}) < 0.0001) {}();",
            pass.layer().value(),
            pass.function_name()
        );
    }
    fragment.push_str(FRAGMENT_TAIL);

    ShaderSource {
        vertex: VERTEX_SHADER.to_owned(),
        fragment,
    }
}
