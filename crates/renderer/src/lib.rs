//! Renderer crate for ringmarch.
//!
//! The crate compiles a vertex stage and a ShaderToy-style fragment payload
//! into a GPU program, then drives a continuous animation that feeds it the
//! surface resolution and elapsed time. The overall flow is:
//!
//! ```text
//!   CLI / ringmarch
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ WgpuHost ──▶ RenderLoop::start ──▶ build_program()
//!                                        │
//!   RedrawRequested ──▶ tick() ──▶ sync surface ──▶ bind uniforms
//!          ▲               │                              │
//!          └─ request_redraw ◀──── present ◀── draw strip ◀┘
//! ```
//!
//! All harness logic is written against [`GraphicsHost`], a GL-shaped seam.
//! [`gpu::WgpuHost`] implements it with wgpu and a winit window;
//! [`headless::HeadlessHost`] implements it with the same naga front end but
//! records surface work instead of doing it, which is what the tests and
//! [`check_program`] use.

pub mod clock;
pub mod compile;
pub mod gpu;
pub mod headless;
pub mod host;
pub mod program;
mod reflect;
pub mod render_loop;
pub mod surface;
mod types;
pub mod uniforms;
mod window;

use anyhow::Result;
use tracing::info;

pub use host::{FrameScheduler, GraphicsHost, PresentError};
pub use program::ProgramError;
pub use reflect::UniformLocation;
pub use render_loop::{CancelToken, LoopStatus, RenderLoop, TickOutcome};
pub use types::{
    FrameParameters, GpuPowerPreference, RendererConfig, ShaderSource, StageKind,
    SurfaceDimensions, VertexGeometry, CLEAR_COLOR, POSITION_ATTRIBUTE, RESOLUTION_UNIFORM,
    TIME_UNIFORM,
};

use compile::{wrap_fragment, VERTEX_SHADER_GLSL};
use headless::HeadlessHost;

/// High-level entry point that owns the chosen configuration.
pub struct Renderer {
    config: RendererConfig,
    cancel: CancelToken,
}

impl Renderer {
    /// Builds a renderer for the supplied configuration.
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Token that stops the animation from outside the event loop.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Opens the window and animates until it is closed or cancelled.
    ///
    /// Returns an error if the window or GPU cannot be set up. A shader that
    /// fails to build is not an error here: it is logged and the window stays
    /// blank.
    pub fn run(&mut self) -> Result<()> {
        info!(
            size = ?self.config.surface_size,
            gpu_power = ?self.config.gpu_power,
            "starting renderer"
        );
        window::run(&self.config, self.cancel.clone())
    }
}

/// Compiles and links a fragment payload without opening a window.
///
/// The payload is wrapped exactly as [`Renderer::run`] would wrap it, so a
/// payload that passes here builds on the GPU as well.
pub fn check_program(fragment_payload: &str) -> Result<(), ProgramError> {
    let mut host = HeadlessHost::new();
    let program = program::build_program(
        &mut host,
        &ShaderSource::vertex(VERTEX_SHADER_GLSL),
        &ShaderSource::fragment(wrap_fragment(fragment_payload)),
    )?;
    host.delete_program(program);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_payload_passes_check() {
        check_program(compile::TORUS_FRAGMENT_PAYLOAD).expect("torus payload builds");
    }

    #[test]
    fn check_reports_compile_failures() {
        let err = check_program("void mainImage(out vec4 c, in vec2 p) { c = vec4(p, 0.0) }")
            .unwrap_err();
        assert_eq!(err.stage(), Some(StageKind::Fragment));
    }

    #[test]
    fn renderer_hands_out_shared_cancel_token() {
        let renderer = Renderer::new(RendererConfig::default());
        let token = renderer.cancel_token();
        token.cancel();
        assert!(renderer.cancel_token().is_cancelled());
    }
}
