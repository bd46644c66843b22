use tracing::trace;

use crate::host::GraphicsHost;
use crate::types::{
    FrameParameters, VertexGeometry, POSITION_ATTRIBUTE, RESOLUTION_UNIFORM, TIME_UNIFORM,
};

/// Vertex geometry that already lives in a host buffer.
///
/// The data is uploaded once; every frame only re-binds the buffer.
#[derive(Debug)]
pub struct GeometryBuffer<B> {
    buffer: B,
    geometry: VertexGeometry,
}

impl<B> GeometryBuffer<B> {
    pub fn upload<H>(host: &mut H, geometry: VertexGeometry) -> Self
    where
        H: GraphicsHost<Buffer = B>,
    {
        let buffer = host.create_buffer();
        host.bind_vertex_buffer(&buffer);
        host.upload_vertex_data(geometry.as_bytes());
        Self { buffer, geometry }
    }

    pub fn vertex_count(&self) -> u32 {
        self.geometry.vertex_count()
    }
}

/// Binds the geometry and writes the per-frame uniforms on the program in use.
///
/// Inputs the program does not expose are skipped without complaint.
pub fn bind<H: GraphicsHost>(
    host: &mut H,
    program: &H::Program,
    geometry: &GeometryBuffer<H::Buffer>,
    frame: &FrameParameters,
) {
    match host.attribute_location(program, POSITION_ATTRIBUTE) {
        Some(location) => {
            host.bind_vertex_buffer(&geometry.buffer);
            host.enable_vertex_attribute(location);
            host.vertex_attribute_f32(location, VertexGeometry::COMPONENTS);
        }
        None => trace!(name = POSITION_ATTRIBUTE, "program has no such attribute"),
    }

    let resolution = host.uniform_location(program, RESOLUTION_UNIFORM);
    if resolution.is_none() {
        trace!(name = RESOLUTION_UNIFORM, "program has no such uniform");
    }
    host.uniform_2f(
        resolution.as_ref(),
        frame.resolution_width,
        frame.resolution_height,
    );

    let time = host.uniform_location(program, TIME_UNIFORM);
    if time.is_none() {
        trace!(name = TIME_UNIFORM, "program has no such uniform");
    }
    host.uniform_1f(time.as_ref(), frame.elapsed_seconds);
}
