use crate::types::{StageKind, SurfaceDimensions};

/// Handle to a shader stage object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(pub(crate) u32);

/// Handle to a program object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) u32);

/// Handle to a vertex buffer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub(crate) u32);

/// Hands out handles from one counter so no two objects ever share a name.
#[derive(Debug)]
pub(crate) struct HandleAllocator {
    next: u32,
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl HandleAllocator {
    fn next(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn stage(&mut self) -> StageId {
        StageId(self.next())
    }

    pub fn program(&mut self) -> ProgramId {
        ProgramId(self.next())
    }

    pub fn buffer(&mut self) -> BufferId {
        BufferId(self.next())
    }
}

/// Failure to hand a finished frame to the display.
#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    #[error("GPU ran out of memory while acquiring the next frame")]
    OutOfMemory,
    #[error("failed to present frame: {0}")]
    Surface(String),
}

/// The GPU context and display surface the harness renders into.
///
/// Shaped like a GL context: stage and program objects are created, fed,
/// compiled, queried and deleted one call at a time. Lookups return `Option`,
/// with `None` meaning "no such input" rather than an error.
pub trait GraphicsHost {
    type Stage;
    type Program;
    type Buffer;
    type UniformLocation;

    fn create_stage(&mut self, kind: StageKind) -> Self::Stage;
    fn stage_source(&mut self, stage: &Self::Stage, source: &str);
    fn compile_stage(&mut self, stage: &Self::Stage);
    fn stage_compiled(&self, stage: &Self::Stage) -> bool;
    fn stage_log(&self, stage: &Self::Stage) -> String;
    fn delete_stage(&mut self, stage: Self::Stage);

    fn create_program(&mut self) -> Self::Program;
    fn attach_stage(&mut self, program: &Self::Program, stage: &Self::Stage);
    fn link_program(&mut self, program: &Self::Program);
    fn program_linked(&self, program: &Self::Program) -> bool;
    fn program_log(&self, program: &Self::Program) -> String;
    fn delete_program(&mut self, program: Self::Program);
    fn use_program(&mut self, program: &Self::Program);

    fn attribute_location(&self, program: &Self::Program, name: &str) -> Option<u32>;
    fn uniform_location(
        &self,
        program: &Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;

    fn create_buffer(&mut self) -> Self::Buffer;
    /// Makes `buffer` the target of uploads and attribute pointers.
    fn bind_vertex_buffer(&mut self, buffer: &Self::Buffer);
    /// Replaces the contents of the bound vertex buffer.
    fn upload_vertex_data(&mut self, data: &[u8]);
    fn enable_vertex_attribute(&mut self, location: u32);
    /// Sources `location` from the bound buffer as tightly packed `f32`s.
    fn vertex_attribute_f32(&mut self, location: u32, components: u32);

    /// Writes a `vec2` uniform on the program in use; `None` is a no-op.
    fn uniform_2f(&mut self, location: Option<&Self::UniformLocation>, x: f32, y: f32);
    /// Writes a `float` uniform on the program in use; `None` is a no-op.
    fn uniform_1f(&mut self, location: Option<&Self::UniformLocation>, value: f32);

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32);
    fn clear_color(&mut self, color: [f32; 4]);
    fn clear(&mut self);
    fn draw_triangle_strip(&mut self, first: u32, count: u32);
    /// Hands the finished frame to the display.
    fn present(&mut self) -> Result<(), PresentError>;

    /// Layout size of the display element, which may be zero while hidden.
    fn display_size(&self) -> (u32, u32);
    fn backing_size(&self) -> SurfaceDimensions;
    fn set_backing_size(&mut self, size: SurfaceDimensions);
}

/// "Run the next tick before the next display refresh."
pub trait FrameScheduler {
    fn request_frame(&mut self);
}
