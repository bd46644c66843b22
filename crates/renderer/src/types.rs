use std::borrow::Cow;
use std::fmt;

/// Vertex attribute fed with the full-screen quad.
pub const POSITION_ATTRIBUTE: &str = "a_position";
/// `vec2` uniform carrying the backing-store size in pixels.
pub const RESOLUTION_UNIFORM: &str = "u_resolution";
/// `float` uniform carrying elapsed seconds since the loop started.
pub const TIME_UNIFORM: &str = "u_time";
/// Opaque black, written before every draw.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Pipeline phase a shader stage runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl StageKind {
    pub(crate) fn naga_stage(self) -> wgpu::naga::ShaderStage {
        match self {
            StageKind::Vertex => wgpu::naga::ShaderStage::Vertex,
            StageKind::Fragment => wgpu::naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Vertex => f.write_str("vertex"),
            StageKind::Fragment => f.write_str("fragment"),
        }
    }
}

/// Immutable GLSL text for one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    kind: StageKind,
    text: Cow<'static, str>,
}

impl ShaderSource {
    pub fn vertex(text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: StageKind::Vertex,
            text: text.into(),
        }
    }

    pub fn fragment(text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: StageKind::Fragment,
            text: text.into(),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Size of a backing store in physical pixels. Both sides are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDimensions {
    width: u32,
    height: u32,
}

impl SurfaceDimensions {
    /// Returns `None` when either side is zero (a minimised window, for example).
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    /// Builds dimensions from a possibly empty size by rounding zero sides up to one.
    pub fn clamped(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl fmt::Display for SurfaceDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Values uploaded to the program once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameParameters {
    pub resolution_width: f32,
    pub resolution_height: f32,
    pub elapsed_seconds: f32,
}

impl FrameParameters {
    pub fn new(surface: SurfaceDimensions, elapsed_seconds: f32) -> Self {
        Self {
            resolution_width: surface.width() as f32,
            resolution_height: surface.height() as f32,
            elapsed_seconds,
        }
    }
}

/// Static vertex positions drawn as a triangle strip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexGeometry {
    points: [[f32; 2]; 4],
}

impl VertexGeometry {
    /// Components per vertex in the position stream.
    pub const COMPONENTS: u32 = 2;

    /// Two triangles covering clip space from (-1, -1) to (1, 1).
    pub const FULLSCREEN_QUAD: VertexGeometry = VertexGeometry {
        points: [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]],
    };

    pub fn vertex_count(&self) -> u32 {
        self.points.len() as u32
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.points)
    }
}

/// Adapter power preference forwarded to wgpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

/// Immutable configuration passed to the renderer at start-up.
///
/// `RendererConfig` mirrors CLI flags: which fragment payload to compile, how
/// large the window should open, and which adapter class to prefer.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Raw `mainImage` payload; wrapped before compilation.
    pub fragment_payload: Cow<'static, str>,
    /// Adapter power preference.
    pub gpu_power: GpuPowerPreference,
    /// Window title.
    pub title: String,
}

impl Default for RendererConfig {
    /// Provides a 720p window rendering the bundled torus scene.
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            fragment_payload: Cow::Borrowed(crate::compile::TORUS_FRAGMENT_PAYLOAD),
            gpu_power: GpuPowerPreference::default(),
            title: "ringmarch".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_dimensions_reject_empty_sides() {
        assert!(SurfaceDimensions::new(0, 150).is_none());
        assert!(SurfaceDimensions::new(300, 0).is_none());
        let dims = SurfaceDimensions::new(300, 150).expect("positive size");
        assert_eq!((dims.width(), dims.height()), (300, 150));
        assert_eq!(SurfaceDimensions::clamped(0, 0), SurfaceDimensions::clamped(1, 1));
    }

    #[test]
    fn quad_is_four_packed_vec2s() {
        let quad = VertexGeometry::FULLSCREEN_QUAD;
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.as_bytes().len(), 4 * 2 * std::mem::size_of::<f32>());
        let floats: &[f32] = bytemuck::cast_slice(quad.as_bytes());
        assert_eq!(&floats[6..], &[1.0, 1.0]);
    }

    #[test]
    fn frame_parameters_follow_surface() {
        let dims = SurfaceDimensions::new(640, 480).unwrap();
        let frame = FrameParameters::new(dims, 2.5);
        assert_eq!(frame.resolution_width, 640.0);
        assert_eq!(frame.resolution_height, 480.0);
        assert_eq!(frame.elapsed_seconds, 2.5);
    }
}
