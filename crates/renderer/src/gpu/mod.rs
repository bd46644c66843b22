//! [`GraphicsHost`] backed by wgpu and a winit window.
//!
//! wgpu has no stage or program objects, so this host keeps them itself:
//! - `compile_stage` runs naga's GLSL front end for the diagnostic log and,
//!   on success, creates the `wgpu::ShaderModule`.
//! - `link_program` reflects both stages, then builds a triangle-strip
//!   pipeline and the uniform buffer inside a validation error scope, so
//!   pipeline errors become the program's link log instead of a panic.
//! - uniform writes land in a CPU shadow of the block and are flushed with
//!   `queue.write_buffer` right before each draw.
//! - the swapchain texture is acquired lazily by the first `clear` or draw of
//!   a frame and handed back in `present`.
//!
//! `context` owns instance, device and surface wiring; `pipeline` turns a
//! program layout into a render pipeline.

mod context;
mod pipeline;

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::compile::{translate_glsl, TranslatedStage};
use crate::host::{BufferId, GraphicsHost, HandleAllocator, PresentError, ProgramId, StageId};
use crate::reflect::{pair_stages, ProgramLayout, UniformLocation};
use crate::types::{GpuPowerPreference, StageKind, SurfaceDimensions};

use context::GpuContext;
use pipeline::{create_render_pipeline, uniform_layout, PipelineStages};

struct CompiledStage {
    translated: TranslatedStage,
    module: wgpu::ShaderModule,
}

struct StageRecord {
    kind: StageKind,
    source: String,
    compiled: Option<CompiledStage>,
    log: String,
}

struct UniformBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    shadow: Vec<f32>,
}

struct LinkedProgram {
    layout: ProgramLayout,
    pipeline: wgpu::RenderPipeline,
    uniforms: Option<UniformBinding>,
}

#[derive(Default)]
struct ProgramRecord {
    attached: Vec<StageId>,
    linked: Option<LinkedProgram>,
    log: String,
}

#[derive(Debug, Clone, Copy)]
struct AttributeBinding {
    buffer: BufferId,
    components: u32,
    enabled: bool,
}

#[derive(Debug, Clone, Copy)]
struct Viewport {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

struct FrameTarget {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

/// Renders into a window surface through wgpu.
pub struct WgpuHost {
    window: Arc<Window>,
    context: GpuContext,
    uniform_layout: wgpu::BindGroupLayout,
    handles: HandleAllocator,
    stages: HashMap<StageId, StageRecord>,
    programs: HashMap<ProgramId, ProgramRecord>,
    buffers: HashMap<BufferId, Option<wgpu::Buffer>>,
    bound_buffer: Option<BufferId>,
    attributes: HashMap<u32, AttributeBinding>,
    current_program: Option<ProgramId>,
    viewport: Option<Viewport>,
    clear_color: wgpu::Color,
    pending_clear: Option<wgpu::Color>,
    frame: Option<FrameTarget>,
    acquire_error: Option<wgpu::SurfaceError>,
}

impl WgpuHost {
    pub fn new(window: Arc<Window>, gpu_power: GpuPowerPreference) -> Result<Self> {
        let context = GpuContext::new(window.clone(), gpu_power)?;
        let uniform_layout = uniform_layout(&context.device);
        Ok(Self {
            window,
            context,
            uniform_layout,
            handles: HandleAllocator::default(),
            stages: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            bound_buffer: None,
            attributes: HashMap::new(),
            current_program: None,
            viewport: None,
            clear_color: wgpu::Color::BLACK,
            pending_clear: None,
            frame: None,
            acquire_error: None,
        })
    }

    /// Runs `create` inside a validation scope and returns what it caught.
    fn scoped<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(device);
        let error = pollster::block_on(device.pop_error_scope());
        (value, error)
    }

    fn link_attached(&self, attached: &[StageId]) -> Result<LinkedProgram, String> {
        let (vertex, fragment) = pair_stages(attached.iter().map(|id| {
            let record = self
                .stages
                .get(id)
                .ok_or_else(|| format!("attached stage {} no longer exists", id.0))?;
            let compiled = record
                .compiled
                .as_ref()
                .ok_or_else(|| format!("attached {} stage did not compile", record.kind))?;
            Ok((record.kind, compiled))
        }))?;
        let layout = ProgramLayout::link(&vertex.translated, &fragment.translated)?;

        let uniform_layout = layout.uniforms.is_some().then_some(&self.uniform_layout);
        let (pipeline, error) = self.scoped(|device| {
            create_render_pipeline(
                device,
                self.context.config.format,
                PipelineStages {
                    vertex: &vertex.module,
                    fragment: &fragment.module,
                },
                &layout,
                uniform_layout,
            )
        });
        if let Some(error) = error {
            return Err(error.to_string());
        }
        let pipeline = pipeline?;

        let uniforms = layout.uniforms.as_ref().map(|block| {
            let size = block.size.max(16).next_multiple_of(16);
            let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("program uniforms"),
                size: u64::from(size),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = self
                .context
                .device
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("program uniform bind group"),
                    layout: &self.uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                });
            UniformBinding {
                buffer,
                bind_group,
                shadow: vec![0.0; (size / 4) as usize],
            }
        });

        Ok(LinkedProgram {
            layout,
            pipeline,
            uniforms,
        })
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
        let Some(uniforms) = self
            .current_program
            .and_then(|program| self.programs.get_mut(&program))
            .and_then(|record| record.linked.as_mut())
            .and_then(|linked| linked.uniforms.as_mut())
        else {
            warn!("uniform written without a program in use; ignored");
            return;
        };
        let start = (location.offset() / 4) as usize;
        if let Some(lanes) = uniforms.shadow.get_mut(start..start + values.len()) {
            lanes.copy_from_slice(values);
        }
    }

    /// Acquires the swapchain texture for this frame if nothing has yet.
    fn acquire_frame(&mut self) -> bool {
        if self.frame.is_some() {
            return true;
        }
        if self.acquire_error.is_some() {
            return false;
        }
        match self.context.surface.get_current_texture() {
            Ok(texture) => {
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                self.frame = Some(FrameTarget { texture, view });
                true
            }
            Err(error) => {
                self.acquire_error = Some(error);
                false
            }
        }
    }

    /// Viewport in wgpu's top-left convention, clipped to the target.
    fn viewport_rect(&self, target: SurfaceDimensions) -> Option<[f32; 4]> {
        let viewport = self.viewport.unwrap_or(Viewport {
            x: 0,
            y: 0,
            width: target.width(),
            height: target.height(),
        });
        let target_width = i64::from(target.width());
        let target_height = i64::from(target.height());
        let left = i64::from(viewport.x).clamp(0, target_width);
        let right = (i64::from(viewport.x) + i64::from(viewport.width)).clamp(0, target_width);
        let bottom = i64::from(viewport.y).clamp(0, target_height);
        let top = (i64::from(viewport.y) + i64::from(viewport.height)).clamp(0, target_height);
        if right <= left || top <= bottom {
            return None;
        }
        Some([
            left as f32,
            (target_height - top) as f32,
            (right - left) as f32,
            (top - bottom) as f32,
        ])
    }

    /// Executes a clear that no draw has consumed yet.
    fn flush_clear(&mut self) {
        let Some(color) = self.pending_clear.take() else {
            return;
        };
        let Some(frame) = self.frame.as_ref() else {
            return;
        };
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("clear encoder"),
                });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
        }
        self.context.queue.submit(Some(encoder.finish()));
    }

    fn recover(&mut self, error: wgpu::SurfaceError) -> Result<(), PresentError> {
        match error {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                debug!(?error, "surface needs reconfiguring; frame skipped");
                self.context.reconfigure();
                Ok(())
            }
            wgpu::SurfaceError::Timeout => {
                warn!("surface timeout; retrying next frame");
                Ok(())
            }
            wgpu::SurfaceError::OutOfMemory => Err(PresentError::OutOfMemory),
            other => Err(PresentError::Surface(other.to_string())),
        }
    }
}

impl GraphicsHost for WgpuHost {
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
                compiled: None,
                log: String::new(),
            },
        );
        id
    }

    fn stage_source(&mut self, stage: &StageId, source: &str) {
        if let Some(record) = self.stages.get_mut(stage) {
            record.source = source.to_string();
        }
    }

    fn compile_stage(&mut self, stage: &StageId) {
        let Some((kind, source)) = self
            .stages
            .get(stage)
            .map(|record| (record.kind, record.source.clone()))
        else {
            return;
        };

        let compiled = translate_glsl(kind, &source).and_then(|translated| {
            let (module, error) = self.scoped(|device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(match kind {
                        StageKind::Vertex => "vertex stage",
                        StageKind::Fragment => "fragment stage",
                    }),
                    source: wgpu::ShaderSource::Glsl {
                        shader: Cow::Owned(source.clone()),
                        stage: kind.naga_stage(),
                        defines: &[],
                    },
                })
            });
            match error {
                Some(error) => Err(error.to_string()),
                None => Ok(CompiledStage { translated, module }),
            }
        });

        if let Some(record) = self.stages.get_mut(stage) {
            match compiled {
                Ok(compiled) => {
                    record.compiled = Some(compiled);
                    record.log.clear();
                }
                Err(log) => {
                    record.compiled = None;
                    record.log = log;
                }
            }
        }
    }

    fn stage_compiled(&self, stage: &StageId) -> bool {
        self.stages
            .get(stage)
            .is_some_and(|record| record.compiled.is_some())
    }

    fn stage_log(&self, stage: &StageId) -> String {
        self.stages
            .get(stage)
            .map(|record| record.log.clone())
            .unwrap_or_default()
    }

    fn delete_stage(&mut self, stage: StageId) {
        self.stages.remove(&stage);
    }

    fn create_program(&mut self) -> ProgramId {
        let id = self.handles.program();
        self.programs.insert(id, ProgramRecord::default());
        id
    }

    fn attach_stage(&mut self, program: &ProgramId, stage: &StageId) {
        if let Some(record) = self.programs.get_mut(program) {
            record.attached.push(*stage);
        }
    }

    fn link_program(&mut self, program: &ProgramId) {
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
                Ok(linked) => {
                    record.linked = Some(linked);
                    record.log.clear();
                }
                Err(log) => {
                    record.linked = None;
                    record.log = log;
                }
            }
        }
    }

    fn program_linked(&self, program: &ProgramId) -> bool {
        self.programs
            .get(program)
            .is_some_and(|record| record.linked.is_some())
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
    }

    fn use_program(&mut self, program: &ProgramId) {
        if !self.program_linked(program) {
            warn!(program = program.0, "use of a program that is not linked; ignored");
            return;
        }
        self.current_program = Some(*program);
    }

    fn attribute_location(&self, program: &ProgramId, name: &str) -> Option<u32> {
        self.programs
            .get(program)?
            .linked
            .as_ref()?
            .layout
            .attribute(name)
    }

    fn uniform_location(&self, program: &ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(program)?
            .linked
            .as_ref()?
            .layout
            .uniform(name)
    }

    fn create_buffer(&mut self) -> BufferId {
        let id = self.handles.buffer();
        self.buffers.insert(id, None);
        id
    }

    fn bind_vertex_buffer(&mut self, buffer: &BufferId) {
        self.bound_buffer = Some(*buffer);
    }

    fn upload_vertex_data(&mut self, data: &[u8]) {
        let Some(id) = self.bound_buffer else {
            warn!("vertex upload without a bound buffer; ignored");
            return;
        };
        let buffer = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("vertex buffer"),
                contents: data,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
        self.buffers.insert(id, Some(buffer));
    }

    fn enable_vertex_attribute(&mut self, location: u32) {
        if let Some(binding) = self.attributes.get_mut(&location) {
            binding.enabled = true;
        } else if let Some(buffer) = self.bound_buffer {
            self.attributes.insert(
                location,
                AttributeBinding {
                    buffer,
                    components: 0,
                    enabled: true,
                },
            );
        }
    }

    fn vertex_attribute_f32(&mut self, location: u32, components: u32) {
        let Some(buffer) = self.bound_buffer else {
            warn!(location, "attribute pointer without a bound buffer; ignored");
            return;
        };
        let enabled = self
            .attributes
            .get(&location)
            .is_some_and(|binding| binding.enabled);
        self.attributes.insert(
            location,
            AttributeBinding {
                buffer,
                components,
                enabled,
            },
        );
    }

    fn uniform_2f(&mut self, location: Option<&UniformLocation>, x: f32, y: f32) {
        self.write_uniform(location, &[x, y]);
    }

    fn uniform_1f(&mut self, location: Option<&UniformLocation>, value: f32) {
        self.write_uniform(location, &[value]);
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = Some(Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        let [r, g, b, a] = color.map(f64::from);
        self.clear_color = wgpu::Color { r, g, b, a };
    }

    fn clear(&mut self) {
        if self.acquire_frame() {
            self.pending_clear = Some(self.clear_color);
        }
    }

    fn draw_triangle_strip(&mut self, first: u32, count: u32) {
        if !self.acquire_frame() {
            return;
        }
        let Some(linked) = self
            .current_program
            .and_then(|program| self.programs.get(&program))
            .and_then(|record| record.linked.as_ref())
        else {
            warn!("draw issued without a program in use; skipped");
            return;
        };

        let mut vertex_buffers = Vec::with_capacity(linked.layout.inputs.len());
        for input in &linked.layout.inputs {
            let buffer = self
                .attributes
                .get(&input.location)
                .filter(|binding| binding.enabled && binding.components == input.components)
                .and_then(|binding| self.buffers.get(&binding.buffer))
                .and_then(Option::as_ref);
            let Some(buffer) = buffer else {
                warn!(
                    location = input.location,
                    "vertex input has no matching enabled buffer; draw skipped"
                );
                return;
            };
            vertex_buffers.push(buffer);
        }

        let Some(frame) = self.frame.as_ref() else {
            return;
        };
        let target = SurfaceDimensions::clamped(
            frame.texture.texture.width(),
            frame.texture.texture.height(),
        );
        let Some([x, y, width, height]) = self.viewport_rect(target) else {
            return;
        };

        if let Some(uniforms) = &linked.uniforms {
            self.context
                .queue
                .write_buffer(&uniforms.buffer, 0, bytemuck::cast_slice(&uniforms.shadow));
        }

        let load = match self.pending_clear.take() {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("draw encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("draw pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&linked.pipeline);
            if let Some(uniforms) = &linked.uniforms {
                render_pass.set_bind_group(0, &uniforms.bind_group, &[]);
            }
            for (slot, buffer) in vertex_buffers.iter().enumerate() {
                render_pass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }
            render_pass.set_viewport(x, y, width, height, 0.0, 1.0);
            render_pass.draw(first..first + count, 0..1);
        }
        self.context.queue.submit(Some(encoder.finish()));
    }

    fn present(&mut self) -> Result<(), PresentError> {
        if let Some(error) = self.acquire_error.take() {
            self.pending_clear = None;
            return self.recover(error);
        }
        self.flush_clear();
        if let Some(frame) = self.frame.take() {
            self.window.pre_present_notify();
            frame.texture.present();
        }
        Ok(())
    }

    fn display_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn backing_size(&self) -> SurfaceDimensions {
        self.context.size()
    }

    fn set_backing_size(&mut self, size: SurfaceDimensions) {
        // A frame acquired at the old size cannot be presented after reconfiguring.
        self.frame = None;
        self.pending_clear = None;
        self.context.resize(size);
    }
}
