use wgpu::naga::front::glsl;
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};
use wgpu::naga::Module;

use crate::types::{StageKind, RESOLUTION_UNIFORM, TIME_UNIFORM};

/// Bundled raymarched torus scene, written as a ShaderToy-style `mainImage`.
pub const TORUS_FRAGMENT_PAYLOAD: &str = include_str!("../shaders/torus.glsl");

/// Pass-through vertex stage feeding the quad positions straight to clip space.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 a_position;

void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// A stage that survived naga's GLSL front end and validator.
#[derive(Debug, Clone)]
pub(crate) struct TranslatedStage {
    pub module: Module,
}

/// Parses and validates one GLSL stage.
///
/// On failure the returned string is the rendered diagnostic, with source
/// excerpts, and plays the role of the driver's info log.
pub(crate) fn translate_glsl(kind: StageKind, source: &str) -> Result<TranslatedStage, String> {
    let mut frontend = glsl::Frontend::default();
    let options = glsl::Options::from(kind.naga_stage());
    let module = frontend
        .parse(&options, source)
        .map_err(|errors| errors.emit_to_string(source))?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(&module)
        .map_err(|error| error.emit_to_string(source))?;

    Ok(TranslatedStage { module })
}

/// Produces a self-contained GLSL fragment shader from a `mainImage` payload.
///
/// Steps performed:
///
/// 1. Strip `#version` and `precision` directives plus any declaration of the
///    harness uniforms, so WebGL-flavoured payloads compile unchanged.
/// 2. Prepend [`HEADER`] which declares the output and the uniform block.
/// 3. Append [`FOOTER`] which flips `gl_FragCoord` to a bottom-left origin,
///    calls `mainImage`, and writes the colour.
pub fn wrap_fragment(payload: &str) -> String {
    let mut sanitized = String::with_capacity(payload.len());
    for line in payload.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#version") || trimmed.starts_with("precision ") {
            continue;
        }
        if matches!(declared_uniform(trimmed), Some(RESOLUTION_UNIFORM | TIME_UNIFORM)) {
            continue;
        }
        sanitized.push_str(line);
        sanitized.push('\n');
    }

    format!("{HEADER}\n{sanitized}\n{FOOTER}")
}

/// Name declared by a `uniform` line, e.g. `u_time` in `uniform highp float u_time;`.
fn declared_uniform(line: &str) -> Option<&str> {
    let declaration = line.strip_prefix("uniform ")?;
    let end = declaration.find([';', '=']).unwrap_or(declaration.len());
    let declaration = &declaration[..end];
    let declaration = declaration.split('[').next().unwrap_or(declaration);
    declaration.split_whitespace().last()
}

/// GLSL prologue injected ahead of every payload.
///
/// The block layout is std140: `u_resolution` at offset 0, `u_time` at 8.
const HEADER: &str = r"#version 450
layout(location = 0) out vec4 ringmarch_color;

layout(std140, set = 0, binding = 0) uniform FrameUniforms {
    vec2 u_resolution;
    float u_time;
};
";

/// GLSL epilogue that remaps coordinates and delegates to `mainImage`.
const FOOTER: &str = r"void main() {
    vec2 fragCoord = vec2(gl_FragCoord.x, u_resolution.y - gl_FragCoord.y);
    vec4 color = vec4(0.0, 0.0, 0.0, 1.0);
    mainImage(color, fragCoord);
    ringmarch_color = color;
}
";
