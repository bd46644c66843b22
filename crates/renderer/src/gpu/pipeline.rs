use crate::reflect::ProgramLayout;

/// Bind group layout for the single uniform block at group 0, binding 0.
pub(crate) fn uniform_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("uniform layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

fn float_format(components: u32) -> Option<wgpu::VertexFormat> {
    match components {
        1 => Some(wgpu::VertexFormat::Float32),
        2 => Some(wgpu::VertexFormat::Float32x2),
        3 => Some(wgpu::VertexFormat::Float32x3),
        4 => Some(wgpu::VertexFormat::Float32x4),
        _ => None,
    }
}

pub(crate) struct PipelineStages<'a> {
    pub vertex: &'a wgpu::ShaderModule,
    pub fragment: &'a wgpu::ShaderModule,
}

/// Builds a triangle-strip pipeline for a linked program.
///
/// Every vertex input gets its own tightly packed buffer slot, in the order
/// of `layout.inputs`; the draw call binds buffers in that same order.
pub(crate) fn create_render_pipeline(
    device: &wgpu::Device,
    surface_format: wgpu::TextureFormat,
    stages: PipelineStages<'_>,
    layout: &ProgramLayout,
    uniform_layout: Option<&wgpu::BindGroupLayout>,
) -> Result<wgpu::RenderPipeline, String> {
    let attributes = layout
        .inputs
        .iter()
        .map(|input| {
            let format = float_format(input.components).ok_or_else(|| {
                format!(
                    "vertex input at location {} has {} components",
                    input.location, input.components
                )
            })?;
            Ok([wgpu::VertexAttribute {
                format,
                offset: 0,
                shader_location: input.location,
            }])
        })
        .collect::<Result<Vec<_>, String>>()?;
    let buffers: Vec<wgpu::VertexBufferLayout<'_>> = attributes
        .iter()
        .map(|attribute| wgpu::VertexBufferLayout {
            array_stride: attribute[0].format.size(),
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: attribute,
        })
        .collect();

    let bind_group_layouts: Vec<&wgpu::BindGroupLayout> = uniform_layout.into_iter().collect();
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("program pipeline layout"),
        bind_group_layouts: &bind_group_layouts,
        push_constant_ranges: &[],
    });

    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("program pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: stages.vertex,
            entry_point: Some("main"),
            buffers: &buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: stages.fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_formats_cover_scalars_and_vectors() {
        assert_eq!(float_format(1), Some(wgpu::VertexFormat::Float32));
        assert_eq!(float_format(2), Some(wgpu::VertexFormat::Float32x2));
        assert_eq!(float_format(4).map(|format| format.size()), Some(16));
        assert_eq!(float_format(5), None);
    }
}
