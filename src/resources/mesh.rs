//! Immediate-mode vertex lists

use glam::{Vec2, Vec3, Vec4};

use crate::backend::{BackendResult, PrimitiveTopology};
use crate::context::RenderContext;

/// Vertices drawn together with one topology
#[derive(Debug, Clone)]
pub struct VertexList {
    pub topology: PrimitiveTopology,
    pub positions: Vec<Vec3>,
    /// Per-vertex colors; the context color is used when absent
    pub colors: Option<Vec<Vec4>>,
    pub uvs: Option<Vec<Vec2>>,
}

impl VertexList {
    pub fn new(topology: PrimitiveTopology, positions: Vec<Vec3>) -> Self {
        Self {
            topology,
            positions,
            colors: None,
            uvs: None,
        }
    }

    pub fn with_colors(mut self, colors: Vec<Vec4>) -> Self {
        self.colors = Some(colors);
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn draw(&self, ctx: &mut RenderContext) -> BackendResult<()> {
        ctx.draw_vertices(
            self.topology,
            &self.positions,
            self.colors.as_deref(),
            self.uvs.as_deref(),
        )
    }

    /// Square of edge `size` in the XZ plane at height `y`, centred at the origin
    pub fn ground_quad(size: f32, y: f32) -> Self {
        let h = size / 2.0;
        Self::new(
            PrimitiveTopology::QuadList,
            vec![
                Vec3::new(-h, y, -h),
                Vec3::new(-h, y, h),
                Vec3::new(h, y, h),
                Vec3::new(h, y, -h),
            ],
        )
        .with_uvs(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
        ])
    }

    /// Axis aligned box resting on y = 0, one color per face
    pub fn cuboid(size: Vec3, face_colors: [Vec4; 6]) -> Self {
        let h = Vec3::new(size.x / 2.0, size.y, size.z / 2.0);
        let corners = |x: f32, y: f32, z: f32| Vec3::new(x * h.x, y * h.y, z * h.z);
        let faces = [
            // +x
            [corners(1.0, 0.0, -1.0), corners(1.0, 1.0, -1.0), corners(1.0, 1.0, 1.0), corners(1.0, 0.0, 1.0)],
            // -x
            [corners(-1.0, 0.0, 1.0), corners(-1.0, 1.0, 1.0), corners(-1.0, 1.0, -1.0), corners(-1.0, 0.0, -1.0)],
            // +y
            [corners(-1.0, 1.0, -1.0), corners(-1.0, 1.0, 1.0), corners(1.0, 1.0, 1.0), corners(1.0, 1.0, -1.0)],
            // -y
            [corners(-1.0, 0.0, 1.0), corners(-1.0, 0.0, -1.0), corners(1.0, 0.0, -1.0), corners(1.0, 0.0, 1.0)],
            // +z
            [corners(-1.0, 0.0, 1.0), corners(1.0, 0.0, 1.0), corners(1.0, 1.0, 1.0), corners(-1.0, 1.0, 1.0)],
            // -z
            [corners(1.0, 0.0, -1.0), corners(-1.0, 0.0, -1.0), corners(-1.0, 1.0, -1.0), corners(1.0, 1.0, -1.0)],
        ];

        let mut positions = Vec::with_capacity(24);
        let mut colors = Vec::with_capacity(24);
        for (face, color) in faces.iter().zip(face_colors) {
            positions.extend_from_slice(face);
            colors.extend([color; 4]);
        }
        Self::new(PrimitiveTopology::QuadList, positions).with_colors(colors)
    }
}
