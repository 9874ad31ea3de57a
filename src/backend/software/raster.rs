//! Scan conversion for the software backend.
//!
//! Primitives arrive in clip space. Triangles and lines are clipped against
//! the near plane (`z >= -w`); everything else is handled per fragment by the
//! pixel bounds (target ∩ viewport ∩ scissor) and the `[0, 1]` depth range.

use glam::{Vec2, Vec3, Vec4};

use crate::backend::types::{ClipVertex, PrimitiveTopology, Rect};

const W_EPSILON: f32 = 1e-6;

/// Color and depth storage a primitive is rasterized into.
pub(super) struct RasterTarget<'a> {
    pub width: u32,
    pub height: u32,
    pub color: Option<&'a mut [Vec4]>,
    pub depth: Option<&'a mut [f32]>,
}

/// Bound texture, sampled nearest with repeat wrapping.
pub(super) struct Sampler<'a> {
    width: u32,
    height: u32,
    texels: &'a [Vec4],
}

impl<'a> Sampler<'a> {
    pub fn new(width: u32, height: u32, texels: &'a [Vec4]) -> Self {
        Self {
            width,
            height,
            texels,
        }
    }

    pub fn sample(&self, uv: Vec2) -> Vec4 {
        if self.width == 0 || self.height == 0 || self.texels.is_empty() {
            return Vec4::ONE;
        }
        let u = uv.x - uv.x.floor();
        let v = uv.y - uv.y.floor();
        let x = ((u * self.width as f32) as u32).min(self.width - 1);
        let y = ((v * self.height as f32) as u32).min(self.height - 1);
        self.texels
            .get((y * self.width + x) as usize)
            .copied()
            .unwrap_or(Vec4::ONE)
    }
}

/// Fixed-function state that affects fragment generation.
pub(super) struct RasterState<'a> {
    pub viewport: Rect,
    pub scissor: Option<Rect>,
    pub depth_test: bool,
    pub sampler: Option<&'a Sampler<'a>>,
}

/// Half-open pixel bounds a fragment must fall into.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
}

impl Bounds {
    fn new(width: u32, height: u32, state: &RasterState) -> Self {
        let mut bounds = Self {
            x0: 0,
            y0: 0,
            x1: width as i64,
            y1: height as i64,
        };
        bounds.intersect(&state.viewport);
        if let Some(scissor) = &state.scissor {
            bounds.intersect(scissor);
        }
        bounds
    }

    fn intersect(&mut self, rect: &Rect) {
        self.x0 = self.x0.max(rect.x as i64);
        self.y0 = self.y0.max(rect.y as i64);
        self.x1 = self.x1.min(rect.right());
        self.y1 = self.y1.min(rect.top());
    }

    fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// Vertex in window space with attributes pre-divided by `w`.
#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    position: Vec3,
    inv_w: f32,
    color: Vec4,
    uv: Vec2,
}

impl ScreenVertex {
    fn from_clip(vertex: &ClipVertex, viewport: &Rect) -> Self {
        let inv_w = 1.0 / vertex.position.w;
        let ndc = vertex.position.truncate() * inv_w;
        Self {
            position: Vec3::new(
                viewport.x as f32 + (ndc.x + 1.0) * 0.5 * viewport.width as f32,
                viewport.y as f32 + (ndc.y + 1.0) * 0.5 * viewport.height as f32,
                (ndc.z + 1.0) * 0.5,
            ),
            inv_w,
            color: vertex.color * inv_w,
            uv: vertex.uv * inv_w,
        }
    }

    fn xy(&self) -> Vec2 {
        self.position.truncate()
    }
}

fn near_distance(vertex: &ClipVertex) -> f32 {
    vertex.position.z + vertex.position.w
}

fn clip_polygon(polygon: &[ClipVertex]) -> Vec<ClipVertex> {
    let mut out = Vec::with_capacity(polygon.len() + 2);
    for (i, current) in polygon.iter().enumerate() {
        let next = &polygon[(i + 1) % polygon.len()];
        let d_current = near_distance(current);
        let d_next = near_distance(next);
        if d_current >= 0.0 {
            out.push(*current);
        }
        if (d_current >= 0.0) != (d_next >= 0.0) {
            let t = d_current / (d_current - d_next);
            out.push(current.lerp(next, t));
        }
    }
    out
}

fn clip_line(a: &ClipVertex, b: &ClipVertex) -> Option<(ClipVertex, ClipVertex)> {
    let da = near_distance(a);
    let db = near_distance(b);
    match (da >= 0.0, db >= 0.0) {
        (true, true) => Some((*a, *b)),
        (false, false) => None,
        (true, false) => Some((*a, a.lerp(b, da / (da - db)))),
        (false, true) => Some((a.lerp(b, da / (da - db)), *b)),
    }
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Rasterize a batch of primitives into `target`.
pub(super) fn rasterize(
    target: &mut RasterTarget,
    state: &RasterState,
    topology: PrimitiveTopology,
    vertices: &[ClipVertex],
) {
    let bounds = Bounds::new(target.width, target.height, state);
    if bounds.is_empty() {
        return;
    }

    match topology {
        PrimitiveTopology::PointList => {
            for vertex in vertices {
                draw_point(target, state, &bounds, vertex);
            }
        }
        PrimitiveTopology::LineList => {
            for pair in vertices.chunks_exact(2) {
                draw_line(target, state, &bounds, &pair[0], &pair[1]);
            }
        }
        PrimitiveTopology::LineStrip => {
            for pair in vertices.windows(2) {
                draw_line(target, state, &bounds, &pair[0], &pair[1]);
            }
        }
        PrimitiveTopology::LineLoop => {
            for pair in vertices.windows(2) {
                draw_line(target, state, &bounds, &pair[0], &pair[1]);
            }
            if let (Some(first), Some(last)) = (vertices.first(), vertices.last()) {
                if vertices.len() > 2 {
                    draw_line(target, state, &bounds, last, first);
                }
            }
        }
        PrimitiveTopology::TriangleList => {
            for tri in vertices.chunks_exact(3) {
                draw_triangle(target, state, &bounds, &[tri[0], tri[1], tri[2]]);
            }
        }
        PrimitiveTopology::QuadList => {
            for quad in vertices.chunks_exact(4) {
                draw_triangle(target, state, &bounds, &[quad[0], quad[1], quad[2]]);
                draw_triangle(target, state, &bounds, &[quad[0], quad[2], quad[3]]);
            }
        }
    }
}

fn draw_point(target: &mut RasterTarget, state: &RasterState, bounds: &Bounds, vertex: &ClipVertex) {
    if near_distance(vertex) < 0.0 || vertex.position.w <= W_EPSILON {
        return;
    }
    let screen = ScreenVertex::from_clip(vertex, &state.viewport);
    let px = screen.position.x.floor() as i64;
    let py = screen.position.y.floor() as i64;
    if bounds.contains(px, py) {
        write_fragment(target, state, px, py, screen.position.z, vertex.color, vertex.uv);
    }
}

fn draw_line(
    target: &mut RasterTarget,
    state: &RasterState,
    bounds: &Bounds,
    a: &ClipVertex,
    b: &ClipVertex,
) {
    let Some((a, b)) = clip_line(a, b) else {
        return;
    };
    if a.position.w <= W_EPSILON || b.position.w <= W_EPSILON {
        return;
    }
    let sa = ScreenVertex::from_clip(&a, &state.viewport);
    let sb = ScreenVertex::from_clip(&b, &state.viewport);
    let delta = sb.xy() - sa.xy();
    let steps = delta.x.abs().max(delta.y.abs()).ceil().max(1.0) as i64;

    let mut last = None;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let position = sa.position.lerp(sb.position, t);
        let px = position.x.floor() as i64;
        let py = position.y.floor() as i64;
        if last == Some((px, py)) || !bounds.contains(px, py) {
            continue;
        }
        last = Some((px, py));
        let inv_w = sa.inv_w + (sb.inv_w - sa.inv_w) * t;
        let color = sa.color.lerp(sb.color, t) / inv_w;
        let uv = sa.uv.lerp(sb.uv, t) / inv_w;
        write_fragment(target, state, px, py, position.z, color, uv);
    }
}

fn draw_triangle(
    target: &mut RasterTarget,
    state: &RasterState,
    bounds: &Bounds,
    triangle: &[ClipVertex; 3],
) {
    let polygon = clip_polygon(triangle);
    if polygon.len() < 3 || polygon.iter().any(|v| v.position.w <= W_EPSILON) {
        return;
    }
    let screen: Vec<ScreenVertex> = polygon
        .iter()
        .map(|v| ScreenVertex::from_clip(v, &state.viewport))
        .collect();
    for i in 1..screen.len() - 1 {
        fill_triangle(target, state, bounds, &screen[0], &screen[i], &screen[i + 1]);
    }
}

fn fill_triangle(
    target: &mut RasterTarget,
    state: &RasterState,
    bounds: &Bounds,
    a: &ScreenVertex,
    b: &ScreenVertex,
    c: &ScreenVertex,
) {
    let (pa, pb, pc) = (a.xy(), b.xy(), c.xy());
    let area = edge(pa, pb, pc);
    if area.abs() < 1e-8 {
        return;
    }

    let min = pa.min(pb).min(pc);
    let max = pa.max(pb).max(pc);
    let x0 = (min.x.floor() as i64).max(bounds.x0);
    let y0 = (min.y.floor() as i64).max(bounds.y0);
    let x1 = (max.x.ceil() as i64).min(bounds.x1);
    let y1 = (max.y.ceil() as i64).min(bounds.y1);

    for py in y0..y1 {
        for px in x0..x1 {
            let p = Vec2::new(px as f32 + 0.5, py as f32 + 0.5);
            let w0 = edge(pb, pc, p) / area;
            let w1 = edge(pc, pa, p) / area;
            let w2 = edge(pa, pb, p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let depth = w0 * a.position.z + w1 * b.position.z + w2 * c.position.z;
            let inv_w = w0 * a.inv_w + w1 * b.inv_w + w2 * c.inv_w;
            let color = (a.color * w0 + b.color * w1 + c.color * w2) / inv_w;
            let uv = (a.uv * w0 + b.uv * w1 + c.uv * w2) / inv_w;
            write_fragment(target, state, px, py, depth, color, uv);
        }
    }
}

fn write_fragment(
    target: &mut RasterTarget,
    state: &RasterState,
    px: i64,
    py: i64,
    depth: f32,
    color: Vec4,
    uv: Vec2,
) {
    if !(0.0..=1.0).contains(&depth) {
        return;
    }
    let index = (py as usize) * target.width as usize + px as usize;

    if state.depth_test {
        if let Some(buffer) = target.depth.as_deref_mut() {
            match buffer.get_mut(index) {
                Some(stored) if depth < *stored => *stored = depth,
                _ => return,
            }
        }
    }

    let shaded = match state.sampler {
        Some(sampler) => color * sampler.sample(uv),
        None => color,
    };
    if let Some(slot) = target.color.as_deref_mut().and_then(|b| b.get_mut(index)) {
        *slot = shaded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32, z: f32, color: Vec4) -> ClipVertex {
        ClipVertex::new(Vec4::new(x, y, z, 1.0), color, Vec2::ZERO)
    }

    fn state(width: u32, height: u32) -> RasterState<'static> {
        RasterState {
            viewport: Rect::new(0, 0, width, height),
            scissor: None,
            depth_test: false,
            sampler: None,
        }
    }

    #[test]
    fn test_fullscreen_quad_covers_every_pixel() {
        let mut color = vec![Vec4::ZERO; 16];
        let mut target = RasterTarget {
            width: 4,
            height: 4,
            color: Some(color.as_mut_slice()),
            depth: None,
        };
        let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
        let quad = [
            vertex(-1.0, -1.0, 0.0, red),
            vertex(1.0, -1.0, 0.0, red),
            vertex(1.0, 1.0, 0.0, red),
            vertex(-1.0, 1.0, 0.0, red),
        ];
        rasterize(&mut target, &state(4, 4), PrimitiveTopology::QuadList, &quad);
        assert!(color.iter().all(|c| *c == red));
    }

    #[test]
    fn test_depth_test_keeps_nearest_fragment() {
        let mut color = vec![Vec4::ZERO; 4];
        let mut depth = vec![1.0; 4];
        let mut target = RasterTarget {
            width: 2,
            height: 2,
            color: Some(color.as_mut_slice()),
            depth: Some(depth.as_mut_slice()),
        };
        let mut raster_state = state(2, 2);
        raster_state.depth_test = true;

        let near = Vec4::new(0.0, 1.0, 0.0, 1.0);
        let far = Vec4::new(0.0, 0.0, 1.0, 1.0);
        let quad = |z: f32, c: Vec4| {
            [
                vertex(-1.0, -1.0, z, c),
                vertex(1.0, -1.0, z, c),
                vertex(1.0, 1.0, z, c),
                vertex(-1.0, 1.0, z, c),
            ]
        };
        rasterize(&mut target, &raster_state, PrimitiveTopology::QuadList, &quad(-0.5, near));
        rasterize(&mut target, &raster_state, PrimitiveTopology::QuadList, &quad(0.5, far));
        assert!(color.iter().all(|c| *c == near));
    }

    #[test]
    fn test_scissor_limits_fragments() {
        let mut color = vec![Vec4::ZERO; 16];
        let mut target = RasterTarget {
            width: 4,
            height: 4,
            color: Some(color.as_mut_slice()),
            depth: None,
        };
        let mut raster_state = state(4, 4);
        raster_state.scissor = Some(Rect::new(0, 0, 2, 4));
        let white = Vec4::ONE;
        let quad = [
            vertex(-1.0, -1.0, 0.0, white),
            vertex(1.0, -1.0, 0.0, white),
            vertex(1.0, 1.0, 0.0, white),
            vertex(-1.0, 1.0, 0.0, white),
        ];
        rasterize(&mut target, &raster_state, PrimitiveTopology::QuadList, &quad);
        for y in 0..4 {
            for x in 0..4 {
                let expected = if x < 2 { white } else { Vec4::ZERO };
                assert_eq!(color[y * 4 + x], expected, "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_triangle_behind_near_plane_is_discarded() {
        let mut color = vec![Vec4::ZERO; 4];
        let mut target = RasterTarget {
            width: 2,
            height: 2,
            color: Some(color.as_mut_slice()),
            depth: None,
        };
        let white = Vec4::ONE;
        let tri = [
            vertex(-1.0, -1.0, -2.0, white),
            vertex(1.0, -1.0, -2.0, white),
            vertex(0.0, 1.0, -2.0, white),
        ];
        rasterize(&mut target, &state(2, 2), PrimitiveTopology::TriangleList, &tri);
        assert!(color.iter().all(|c| *c == Vec4::ZERO));
    }

    #[test]
    fn test_line_loop_closes_outline() {
        let mut color = vec![Vec4::ZERO; 100];
        let mut target = RasterTarget {
            width: 10,
            height: 10,
            color: Some(color.as_mut_slice()),
            depth: None,
        };
        let white = Vec4::ONE;
        let outline = [
            vertex(-0.9, -0.9, 0.0, white),
            vertex(0.9, -0.9, 0.0, white),
            vertex(0.9, 0.9, 0.0, white),
            vertex(-0.9, 0.9, 0.0, white),
        ];
        rasterize(&mut target, &state(10, 10), PrimitiveTopology::LineLoop, &outline);
        // Closing segment runs along x = 0.5 in window space
        assert_eq!(color[5 * 10], white);
        // Interior untouched
        assert_eq!(color[5 * 10 + 5], Vec4::ZERO);
    }

    #[test]
    fn test_sampler_wraps_coordinates() {
        let texels = vec![
            Vec4::new(1.0, 0.0, 0.0, 1.0),
            Vec4::new(0.0, 1.0, 0.0, 1.0),
        ];
        let sampler = Sampler::new(2, 1, &texels);
        assert_eq!(sampler.sample(Vec2::new(0.25, 0.0)).x, 1.0);
        assert_eq!(sampler.sample(Vec2::new(1.75, 0.0)).y, 1.0);
    }
}
