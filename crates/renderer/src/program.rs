use tracing::{debug, error};

use crate::host::GraphicsHost;
use crate::types::{ShaderSource, StageKind};

/// Substituted when the host fails a stage or program without saying why.
const EMPTY_LOG: &str = "no diagnostic output was reported";

/// Why a program could not be built. Both variants carry the diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgramError {
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: StageKind, log: String },
    #[error("shader program failed to link:\n{log}")]
    Link { log: String },
}

impl ProgramError {
    pub fn log(&self) -> &str {
        match self {
            ProgramError::Compile { log, .. } | ProgramError::Link { log } => log,
        }
    }

    /// Stage that failed to compile; `None` for link failures.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            ProgramError::Compile { stage, .. } => Some(*stage),
            ProgramError::Link { .. } => None,
        }
    }
}

fn non_empty(log: String) -> String {
    if log.trim().is_empty() {
        EMPTY_LOG.to_string()
    } else {
        log
    }
}

/// Compiles one stage. A rejected stage is deleted before the error is returned.
pub fn compile_stage<H: GraphicsHost>(
    host: &mut H,
    source: &ShaderSource,
) -> Result<H::Stage, ProgramError> {
    let stage = host.create_stage(source.kind());
    host.stage_source(&stage, source.text());
    host.compile_stage(&stage);

    if host.stage_compiled(&stage) {
        debug!(stage = %source.kind(), "compiled shader stage");
        return Ok(stage);
    }

    let log = non_empty(host.stage_log(&stage));
    host.delete_stage(stage);
    Err(ProgramError::Compile {
        stage: source.kind(),
        log,
    })
}

/// Links two compiled stages. A program that fails to link is deleted.
pub fn link<H: GraphicsHost>(
    host: &mut H,
    vertex: &H::Stage,
    fragment: &H::Stage,
) -> Result<H::Program, ProgramError> {
    let program = host.create_program();
    host.attach_stage(&program, vertex);
    host.attach_stage(&program, fragment);
    host.link_program(&program);

    if host.program_linked(&program) {
        debug!("linked shader program");
        return Ok(program);
    }

    let log = non_empty(host.program_log(&program));
    host.delete_program(program);
    Err(ProgramError::Link { log })
}

/// Runs the full start-up sequence: compile both stages, then link.
///
/// Stage objects never outlive this call. They are deleted on every failure
/// path and after a successful link, since the program keeps what it needs.
/// Failures are logged with their diagnostic text before being returned.
pub fn build_program<H: GraphicsHost>(
    host: &mut H,
    vertex: &ShaderSource,
    fragment: &ShaderSource,
) -> Result<H::Program, ProgramError> {
    debug_assert_eq!(vertex.kind(), StageKind::Vertex);
    debug_assert_eq!(fragment.kind(), StageKind::Fragment);

    let result = compile_and_link(host, vertex, fragment);
    if let Err(err) = &result {
        error!(stage = ?err.stage(), diagnostics = %err.log(), "failed to build shader program");
    }
    result
}

fn compile_and_link<H: GraphicsHost>(
    host: &mut H,
    vertex: &ShaderSource,
    fragment: &ShaderSource,
) -> Result<H::Program, ProgramError> {
    let vertex_stage = compile_stage(host, vertex)?;
    let fragment_stage = match compile_stage(host, fragment) {
        Ok(stage) => stage,
        Err(err) => {
            host.delete_stage(vertex_stage);
            return Err(err);
        }
    };

    let linked = link(host, &vertex_stage, &fragment_stage);
    host.delete_stage(vertex_stage);
    host.delete_stage(fragment_stage);
    linked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{wrap_fragment, TORUS_FRAGMENT_PAYLOAD, VERTEX_SHADER_GLSL};
    use crate::headless::{HeadlessHost, HostCall};

    fn vertex() -> ShaderSource {
        ShaderSource::vertex(VERTEX_SHADER_GLSL)
    }

    #[test]
    fn valid_pair_links() {
        let mut host = HeadlessHost::new();
        let fragment = ShaderSource::fragment(wrap_fragment(TORUS_FRAGMENT_PAYLOAD));

        let program = build_program(&mut host, &vertex(), &fragment).expect("torus program");
        assert!(host.program_linked(&program));
        assert_eq!(host.live_stages(), 0);
        assert_eq!(host.live_programs(), 1);
    }

    #[test]
    fn syntax_error_is_reported_against_fragment_stage() {
        let mut host = HeadlessHost::new();
        let fragment = ShaderSource::fragment(wrap_fragment(
            "void mainImage(out vec4 fragColor, in vec2 fragCoord) {\n    fragColor = vec4(1.0)\n}\n",
        ));

        let err = compile_stage(&mut host, &fragment).unwrap_err();
        assert_eq!(err.stage(), Some(StageKind::Fragment));
        assert!(!err.log().trim().is_empty());
        assert_eq!(host.live_stages(), 0);
        assert!(host
            .calls()
            .iter()
            .any(|call| matches!(call, HostCall::DeleteStage(_))));
    }

    #[test]
    fn failed_fragment_releases_vertex_stage() {
        let mut host = HeadlessHost::new();
        let fragment = ShaderSource::fragment(wrap_fragment(
            "void mainImage(out vec4 c, in vec2 p) {\n    c = missing;\n}\n",
        ));

        let err = build_program(&mut host, &vertex(), &fragment).unwrap_err();
        assert!(matches!(err, ProgramError::Compile { stage: StageKind::Fragment, .. }));
        assert_eq!(host.live_stages(), 0);
        assert_eq!(host.live_programs(), 0);
    }

    #[test]
    fn link_failure_releases_program() {
        let mut host = HeadlessHost::new();
        let first = compile_stage(&mut host, &vertex()).expect("vertex");
        let second = compile_stage(&mut host, &vertex()).expect("vertex");

        let err = link(&mut host, &first, &second).unwrap_err();
        assert!(matches!(err, ProgramError::Link { .. }));
        assert!(!err.log().is_empty());
        assert_eq!(host.live_programs(), 0);
    }

    #[test]
    fn empty_logs_are_replaced() {
        assert_eq!(non_empty("  \n".to_string()), EMPTY_LOG);
        assert_eq!(non_empty("0:1: error".to_string()), "0:1: error");
    }
}
