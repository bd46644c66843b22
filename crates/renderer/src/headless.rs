use std::collections::HashMap;

use tracing::{trace, warn};

use crate::compile::{translate_glsl, TranslatedStage};
use crate::host::{
    BufferId, GraphicsHost, HandleAllocator, PresentError, ProgramId, StageId,
};
use crate::reflect::{pair_stages, ProgramLayout, UniformLocation};
use crate::types::{StageKind, SurfaceDimensions};

/// Default backing store size of an unsized canvas.
const DEFAULT_SIZE: (u32, u32) = (300, 150);

/// One recorded side effect.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    CreateStage(StageId, StageKind),
    CompileStage(StageId),
    DeleteStage(StageId),
    CreateProgram(ProgramId),
    LinkProgram(ProgramId),
    DeleteProgram(ProgramId),
    UseProgram(ProgramId),
    CreateBuffer(BufferId),
    BindVertexBuffer(BufferId),
    UploadVertexData { buffer: BufferId, bytes: usize },
    EnableVertexAttribute(u32),
    VertexAttribute { location: u32, components: u32 },
    Uniform { offset: u32, values: Vec<f32> },
    Viewport { x: i32, y: i32, width: u32, height: u32 },
    ClearColor([f32; 4]),
    Clear,
    DrawTriangleStrip { first: u32, count: u32 },
    Present,
    ResizeBacking(SurfaceDimensions),
}

#[derive(Debug)]
struct StageRecord {
    kind: StageKind,
    source: String,
    translated: Option<TranslatedStage>,
    log: String,
}

#[derive(Debug, Default)]
struct ProgramRecord {
    attached: Vec<StageId>,
    layout: Option<ProgramLayout>,
    log: String,
    uniforms: Vec<f32>,
}

/// Recording host used by tests and by the offline shader check.
///
/// Stages go through the same naga front end as the wgpu host, so compile and
/// link diagnostics are real. Surface work is appended to a call log, and
/// uniform writes land in a per-program shadow.
#[derive(Debug)]
pub struct HeadlessHost {
    handles: HandleAllocator,
    stages: HashMap<StageId, StageRecord>,
    programs: HashMap<ProgramId, ProgramRecord>,
    buffers: HashMap<BufferId, Vec<u8>>,
    bound_buffer: Option<BufferId>,
    current_program: Option<ProgramId>,
    display: (u32, u32),
    backing: SurfaceDimensions,
    calls: Vec<HostCall>,
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self {
            handles: HandleAllocator::default(),
            stages: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            bound_buffer: None,
            current_program: None,
            display: DEFAULT_SIZE,
            backing: SurfaceDimensions::clamped(DEFAULT_SIZE.0, DEFAULT_SIZE.1),
            calls: Vec::new(),
        }
    }
}

impl HeadlessHost {
    /// A 300x150 display with a matching backing store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the host window changing its layout size.
    pub fn set_display_size(&mut self, width: u32, height: u32) {
        self.display = (width, height);
    }

    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    /// Drains the call log.
    pub fn take_calls(&mut self) -> Vec<HostCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn draw_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, HostCall::DrawTriangleStrip { .. }))
            .count()
    }

    /// Stage objects that have been created and not deleted.
    pub fn live_stages(&self) -> usize {
        self.stages.len()
    }

    /// Program objects that have been created and not deleted.
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Current value of a named uniform, `None` when the program lacks it.
    pub fn uniform_value(&self, program: &ProgramId, name: &str) -> Option<Vec<f32>> {
        let record = self.programs.get(program)?;
        let location = record.layout.as_ref()?.uniform(name)?;
        let start = (location.offset() / 4) as usize;
        let end = start + location.components() as usize;
        record.uniforms.get(start..end).map(<[f32]>::to_vec)
    }

    /// Every uniform lane of the program, in block order.
    pub fn uniform_snapshot(&self, program: &ProgramId) -> Vec<f32> {
        self.programs
            .get(program)
            .map(|record| record.uniforms.clone())
            .unwrap_or_default()
    }

    fn link_attached(&self, attached: &[StageId]) -> Result<ProgramLayout, String> {
        let (vertex, fragment) = pair_stages(attached.iter().map(|id| {
            let record = self
                .stages
                .get(id)
                .ok_or_else(|| format!("attached stage {} no longer exists", id.0))?;
            let translated = record
                .translated
                .as_ref()
                .ok_or_else(|| format!("attached {} stage did not compile", record.kind))?;
            Ok((record.kind, translated))
        }))?;
        ProgramLayout::link(vertex, fragment)
    }

    fn write_uniform(&mut self, location: Option<&UniformLocation>, values: &[f32]) {
        let Some(location) = location else {
            return;
        };
        if location.components() as usize != values.len() {
            warn!(
                offset = location.offset(),
                expected = location.components(),
                got = values.len(),
                "uniform write does not match the declared type; ignored"
            );
            return;
        }
        let Some(record) = self
            .current_program
            .and_then(|program| self.programs.get_mut(&program))
        else {
            warn!("uniform written without a program in use; ignored");
            return;
        };
        let start = (location.offset() / 4) as usize;
        if let Some(lanes) = record.uniforms.get_mut(start..start + values.len()) {
            lanes.copy_from_slice(values);
        }
        self.calls.push(HostCall::Uniform {
            offset: location.offset(),
            values: values.to_vec(),
        });
    }
}

impl GraphicsHost for HeadlessHost {
    type Stage = StageId;
    type Program = ProgramId;
    type Buffer = BufferId;
    type UniformLocation = UniformLocation;

    fn create_stage(&mut self, kind: StageKind) -> StageId {
        let id = self.handles.stage();
        self.stages.insert(
            id,
            StageRecord {
                kind,
                source: String::new(),
                translated: None,
                log: String::new(),
            },
        );
        self.calls.push(HostCall::CreateStage(id, kind));
        id
    }

    fn stage_source(&mut self, stage: &StageId, source: &str) {
        if let Some(record) = self.stages.get_mut(stage) {
            record.source = source.to_string();
        }
    }

    fn compile_stage(&mut self, stage: &StageId) {
        self.calls.push(HostCall::CompileStage(*stage));
        let Some(record) = self.stages.get_mut(stage) else {
            return;
        };
        match translate_glsl(record.kind, &record.source) {
            Ok(translated) => {
                record.translated = Some(translated);
                record.log.clear();
            }
            Err(log) => {
                trace!(stage = %record.kind, "stage rejected by the GLSL front end");
                record.translated = None;
                record.log = log;
            }
        }
    }

    fn stage_compiled(&self, stage: &StageId) -> bool {
        self.stages
            .get(stage)
            .is_some_and(|record| record.translated.is_some())
    }

    fn stage_log(&self, stage: &StageId) -> String {
        self.stages
            .get(stage)
            .map(|record| record.log.clone())
            .unwrap_or_default()
    }

    fn delete_stage(&mut self, stage: StageId) {
        self.stages.remove(&stage);
        self.calls.push(HostCall::DeleteStage(stage));
    }

    fn create_program(&mut self) -> ProgramId {
        let id = self.handles.program();
        self.programs.insert(id, ProgramRecord::default());
        self.calls.push(HostCall::CreateProgram(id));
        id
    }

    fn attach_stage(&mut self, program: &ProgramId, stage: &StageId) {
        if let Some(record) = self.programs.get_mut(program) {
            record.attached.push(*stage);
        }
    }

    fn link_program(&mut self, program: &ProgramId) {
        self.calls.push(HostCall::LinkProgram(*program));
        let Some(attached) = self
            .programs
            .get(program)
            .map(|record| record.attached.clone())
        else {
            return;
        };
        let linked = self.link_attached(&attached);
        if let Some(record) = self.programs.get_mut(program) {
            match linked {
                Ok(layout) => {
                    record.uniforms = vec![0.0; (layout.uniform_size() / 4) as usize];
                    record.layout = Some(layout);
                    record.log.clear();
                }
                Err(log) => {
                    record.layout = None;
                    record.uniforms.clear();
                    record.log = log;
                }
            }
        }
    }

    fn program_linked(&self, program: &ProgramId) -> bool {
        self.programs
            .get(program)
            .is_some_and(|record| record.layout.is_some())
    }

    fn program_log(&self, program: &ProgramId) -> String {
        self.programs
            .get(program)
            .map(|record| record.log.clone())
            .unwrap_or_default()
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.calls.push(HostCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: &ProgramId) {
        if !self.program_linked(program) {
            warn!(program = program.0, "use of a program that is not linked; ignored");
            return;
        }
        self.current_program = Some(*program);
        self.calls.push(HostCall::UseProgram(*program));
    }

    fn attribute_location(&self, program: &ProgramId, name: &str) -> Option<u32> {
        self.programs.get(program)?.layout.as_ref()?.attribute(name)
    }

    fn uniform_location(&self, program: &ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs.get(program)?.layout.as_ref()?.uniform(name)
    }

    fn create_buffer(&mut self) -> BufferId {
        let id = self.handles.buffer();
        self.buffers.insert(id, Vec::new());
        self.calls.push(HostCall::CreateBuffer(id));
        id
    }

    fn bind_vertex_buffer(&mut self, buffer: &BufferId) {
        self.bound_buffer = Some(*buffer);
        self.calls.push(HostCall::BindVertexBuffer(*buffer));
    }

    fn upload_vertex_data(&mut self, data: &[u8]) {
        let Some(buffer) = self.bound_buffer else {
            warn!("vertex upload without a bound buffer; ignored");
            return;
        };
        if let Some(contents) = self.buffers.get_mut(&buffer) {
            *contents = data.to_vec();
        }
        self.calls.push(HostCall::UploadVertexData {
            buffer,
            bytes: data.len(),
        });
    }

    fn enable_vertex_attribute(&mut self, location: u32) {
        self.calls.push(HostCall::EnableVertexAttribute(location));
    }

    fn vertex_attribute_f32(&mut self, location: u32, components: u32) {
        self.calls.push(HostCall::VertexAttribute {
            location,
            components,
        });
    }

    fn uniform_2f(&mut self, location: Option<&UniformLocation>, x: f32, y: f32) {
        self.write_uniform(location, &[x, y]);
    }

    fn uniform_1f(&mut self, location: Option<&UniformLocation>, value: f32) {
        self.write_uniform(location, &[value]);
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.calls.push(HostCall::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        self.calls.push(HostCall::ClearColor(color));
    }

    fn clear(&mut self) {
        self.calls.push(HostCall::Clear);
    }

    fn draw_triangle_strip(&mut self, first: u32, count: u32) {
        if self.current_program.is_none() {
            warn!("draw issued without a program in use");
        }
        self.calls.push(HostCall::DrawTriangleStrip { first, count });
    }

    fn present(&mut self) -> Result<(), PresentError> {
        self.calls.push(HostCall::Present);
        Ok(())
    }

    fn display_size(&self) -> (u32, u32) {
        self.display
    }

    fn backing_size(&self) -> SurfaceDimensions {
        self.backing
    }

    fn set_backing_size(&mut self, size: SurfaceDimensions) {
        self.backing = size;
        self.calls.push(HostCall::ResizeBacking(size));
    }
}
