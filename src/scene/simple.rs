//! Self-contained scene: a ring road around a grass field, one box-shaped
//! actor driving around the ring and a few static box obstacles.

use std::f32::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{Vec2, Vec3, Vec4};

use super::*;
use crate::backend::{BackendResult, PrimitiveTopology};
use crate::context::{MatrixMode, RenderContext};
use crate::resources::{GpuTexture, TextureData, VertexList};

/// Edge length of one road tile in world units
pub const ROAD_TILE_SIZE: f32 = 0.585;

const ROAD_COLOR: [f32; 3] = [0.75, 0.75, 0.75];
const GRASS_COLOR: [f32; 3] = [0.3, 0.6, 0.25];
const ACTOR_SIZE: Vec3 = Vec3::new(0.18, 0.1, 0.12);
const CURVE_SAMPLES: usize = 20;

/// Static axis aligned box
#[derive(Debug, Clone)]
pub struct BoxObject {
    pub position: Vec3,
    pub size: Vec3,
    mesh: VertexList,
}

impl BoxObject {
    pub fn new(position: Vec3, size: Vec3, color: Vec4) -> Self {
        let shade = |f: f32| (color.truncate() * f).extend(color.w);
        let mesh = VertexList::cuboid(
            size,
            [shade(0.8), shade(0.8), shade(1.0), shade(0.5), shade(0.9), shade(0.9)],
        );
        Self {
            position,
            size,
            mesh,
        }
    }
}

impl SceneObject for BoxObject {
    fn render(&self, ctx: &mut RenderContext, draw_bbox: bool) -> BackendResult<()> {
        ctx.matrix_mode(MatrixMode::ModelView);
        ctx.with_pushed_matrix(|ctx| {
            ctx.translate(self.position);
            self.mesh.draw(ctx)?;
            if draw_bbox {
                let (hx, hz) = (self.size.x / 2.0, self.size.z / 2.0);
                ctx.color3(1.0, 0.0, 0.0);
                ctx.draw(
                    PrimitiveTopology::LineLoop,
                    &[
                        Vec3::new(-hx, 0.01, -hz),
                        Vec3::new(hx, 0.01, -hz),
                        Vec3::new(hx, 0.01, hz),
                        Vec3::new(-hx, 0.01, hz),
                    ],
                )?;
            }
            Ok(())
        })
    }
}

/// Label drawn as one solid block per visible character
#[derive(Debug, Clone)]
pub struct BlockLabel {
    text: String,
    x: f32,
    y: f32,
    style: LabelStyle,
}

impl BlockLabel {
    pub fn new(text: &str, x: f32, y: f32, style: LabelStyle) -> Self {
        Self {
            text: text.to_string(),
            x,
            y,
            style,
        }
    }
}

impl Label for BlockLabel {
    fn set_text(&mut self, text: &str) {
        if self.text != text {
            self.text.clear();
            self.text.push_str(text);
        }
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn draw(&mut self, ctx: &mut RenderContext) -> BackendResult<()> {
        let glyph_w = self.style.font_size * 0.6;
        let glyph_h = self.style.font_size;
        let advance = glyph_w + self.style.font_size * 0.15;

        let mut quads = Vec::new();
        for (k, ch) in self.text.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let x0 = self.x + k as f32 * advance;
            quads.extend_from_slice(&[
                Vec3::new(x0, self.y, 0.0),
                Vec3::new(x0 + glyph_w, self.y, 0.0),
                Vec3::new(x0 + glyph_w, self.y + glyph_h, 0.0),
                Vec3::new(x0, self.y + glyph_h, 0.0),
            ]);
        }
        ctx.set_color(Vec4::from_array(self.style.color));
        ctx.draw(PrimitiveTopology::QuadList, &quads)
    }
}

#[derive(Debug, Clone, Copy)]
struct Actor {
    orbit_angle: f32,
    orbit_radius: f32,
    center: Vec3,
    speed: f32,
    steps: u64,
    pose: Option<(Vec3, f32)>,
}

impl Actor {
    fn position(&self) -> Vec3 {
        match self.pose {
            Some((position, _)) => position,
            None => self.center + direction_vector(self.orbit_angle) * self.orbit_radius,
        }
    }

    fn angle(&self) -> f32 {
        match self.pose {
            Some((_, angle)) => angle,
            None => self.orbit_angle + FRAC_PI_2,
        }
    }
}

/// Built-in [`Scene`] implementation
pub struct SimpleScene {
    width: usize,
    height: usize,
    tiles: Vec<Option<Tile>>,
    draw_curves: bool,
    road_texture: Option<TextureData>,
    objects: Vec<BoxObject>,
    actor: Actor,
    camera: FirstPersonCamera,
    road_tile: VertexList,
    ground: VertexList,
    ground_triangles: VertexList,
    actor_mesh: VertexList,
    labels_created: AtomicUsize,
}

impl Default for SimpleScene {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl SimpleScene {
    /// Ring road on the border of a `width`×`height` tile grid
    pub fn new(width: usize, height: usize) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let mut tiles = Vec::with_capacity(width * height);
        for j in 0..height {
            for i in 0..width {
                let border = i == 0 || j == 0 || i == width - 1 || j == height - 1;
                tiles.push(Some(if border {
                    let angle = if j == 0 || j == height - 1 { 0 } else { 1 };
                    road_tile(i, j, angle)
                } else {
                    Tile {
                        angle: 0,
                        color: GRASS_COLOR,
                        texture: None,
                        drivable: false,
                        curves: Vec::new(),
                    }
                }));
            }
        }

        let extent = Vec3::new(width as f32, 0.0, height as f32) * ROAD_TILE_SIZE;
        let center = extent / 2.0;
        let orbit_radius = (width.min(height) as f32 - 1.0) * ROAD_TILE_SIZE / 2.0;

        let objects = vec![
            BoxObject::new(
                center + Vec3::new(0.2, 0.0, 0.1),
                Vec3::new(0.08, 0.08, 0.08),
                Vec4::new(1.0, 0.85, 0.0, 1.0),
            ),
            BoxObject::new(
                center - Vec3::new(0.25, 0.0, 0.2),
                Vec3::new(0.06, 0.12, 0.06),
                Vec4::new(1.0, 0.45, 0.0, 1.0),
            ),
        ];

        let body = Vec4::new(0.1, 0.3, 0.9, 1.0);
        let actor_mesh = VertexList::cuboid(
            ACTOR_SIZE,
            [
                Vec4::new(0.9, 0.9, 0.2, 1.0),
                body,
                body * 1.1,
                body * 0.5,
                body * 0.8,
                body * 0.8,
            ],
        );

        Self {
            width,
            height,
            tiles,
            draw_curves: false,
            road_texture: None,
            objects,
            actor: Actor {
                orbit_angle: 0.0,
                orbit_radius,
                center,
                speed: 0.4,
                steps: 0,
                pose: None,
            },
            camera: FirstPersonCamera::default(),
            road_tile: VertexList::ground_quad(ROAD_TILE_SIZE, 0.0),
            ground: VertexList::ground_quad(2.0, -0.03),
            ground_triangles: ground_triangles(extent),
            actor_mesh,
            labels_created: AtomicUsize::new(0),
        }
    }

    pub fn with_curves(mut self, enabled: bool) -> Self {
        self.draw_curves = enabled;
        self
    }

    /// Use `data` instead of the built-in checkerboard on road tiles
    pub fn with_road_texture(mut self, data: TextureData) -> Self {
        self.road_texture = Some(data);
        self
    }

    pub fn set_tile(&mut self, i: usize, j: usize, tile: Option<Tile>) {
        if i < self.width && j < self.height {
            self.tiles[j * self.width + i] = tile;
        }
    }

    pub fn add_object(&mut self, object: BoxObject) {
        self.objects.push(object);
    }

    pub fn set_first_person_camera(&mut self, camera: FirstPersonCamera) {
        self.camera = camera;
    }

    /// Pin the actor to a pose instead of the orbit
    pub fn set_actor_pose(&mut self, position: Vec3, angle: f32) {
        self.actor.pose = Some((position, angle));
    }

    pub fn set_actor_speed(&mut self, speed: f32) {
        self.actor.speed = speed;
    }

    /// Advance the actor along the ring by `dt` seconds
    pub fn step(&mut self, dt: f32) {
        if self.actor.orbit_radius > 0.0 && self.actor.pose.is_none() {
            self.actor.orbit_angle += self.actor.speed * dt / self.actor.orbit_radius;
        }
        self.actor.steps += 1;
    }

    /// Upload a road texture and assign it to every drivable tile
    pub fn load_textures(&mut self, ctx: &mut RenderContext) -> BackendResult<()> {
        let road = match &self.road_texture {
            Some(data) => GpuTexture::create(ctx, data)?,
            None => GpuTexture::create(
                ctx,
                &TextureData::checkerboard(16, 4, [90, 90, 90, 255], [140, 140, 140, 255]),
            )?,
        };
        log::debug!("SimpleScene: road texture {:?}", road.name);
        for tile in self.tiles.iter_mut().flatten() {
            if tile.drivable {
                tile.texture = Some(road.handle);
            }
        }
        Ok(())
    }

    /// How many labels [`Scene::create_label`] has produced
    pub fn labels_created(&self) -> usize {
        self.labels_created.load(Ordering::Relaxed)
    }
}

fn road_tile(i: usize, j: usize, angle: i32) -> Tile {
    let center = Vec3::new(i as f32 + 0.5, 0.0, j as f32 + 0.5) * ROAD_TILE_SIZE;
    let along = direction_vector(angle as f32 * FRAC_PI_2);
    let lateral = along.cross(Vec3::Y) * (ROAD_TILE_SIZE / 4.0);
    let half = along * (ROAD_TILE_SIZE / 2.0);

    let lane = |start: Vec3, end: Vec3| {
        [start, start.lerp(end, 1.0 / 3.0), start.lerp(end, 2.0 / 3.0), end]
    };
    let forward = lane(center - half + lateral, center + half + lateral);
    let backward = lane(center + half - lateral, center - half - lateral);

    Tile {
        angle,
        color: ROAD_COLOR,
        texture: None,
        drivable: true,
        curves: vec![forward, backward],
    }
}

fn ground_triangles(extent: Vec3) -> VertexList {
    let mut positions = Vec::new();
    let mut colors = Vec::new();
    let mut seed: u32 = 0x9e37_79b9;
    let mut next = || {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        (seed % 1000) as f32 / 1000.0
    };

    for _ in 0..24 {
        let c = Vec3::new(next() * extent.x, -0.02, next() * extent.z);
        let r = 0.05 + next() * 0.1;
        let shade = 0.2 + next() * 0.2;
        positions.extend_from_slice(&[
            c + Vec3::new(-r, 0.0, r),
            c + Vec3::new(r, 0.0, r),
            c + Vec3::new(0.0, 0.0, -r),
        ]);
        colors.extend([Vec4::new(shade, shade * 1.2, shade, 1.0); 3]);
    }
    VertexList::new(PrimitiveTopology::TriangleList, positions).with_colors(colors)
}

impl Scene for SimpleScene {
    fn grid_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn tile(&self, i: usize, j: usize) -> Option<&Tile> {
        if i >= self.width || j >= self.height {
            return None;
        }
        self.tiles[j * self.width + i].as_ref()
    }

    fn road_tile_size(&self) -> f32 {
        ROAD_TILE_SIZE
    }

    fn draw_curves(&self) -> bool {
        self.draw_curves
    }

    fn draw_road_tile(&self, ctx: &mut RenderContext) -> BackendResult<()> {
        self.road_tile.draw(ctx)
    }

    fn objects(&self) -> Box<dyn Iterator<Item = &dyn SceneObject> + '_> {
        Box::new(self.objects.iter().map(|o| o as &dyn SceneObject))
    }

    fn actor_position(&self) -> Vec3 {
        self.actor.position()
    }

    fn actor_angle(&self) -> f32 {
        self.actor.angle()
    }

    fn actor_speed(&self) -> f32 {
        self.actor.speed
    }

    fn step_count(&self) -> u64 {
        self.actor.steps
    }

    fn actor_corners(&self) -> [Vec2; 4] {
        let p = self.actor.position();
        let a = self.actor.angle();
        let center = Vec2::new(p.x, p.z);
        let forward = Vec2::new(a.cos(), -a.sin()) * (ACTOR_SIZE.x / 2.0);
        let side = Vec2::new(a.sin(), a.cos()) * (ACTOR_SIZE.z / 2.0);
        [
            center + forward - side,
            center + forward + side,
            center - forward + side,
            center - forward - side,
        ]
    }

    fn render_actor_mesh(&self, ctx: &mut RenderContext) -> BackendResult<()> {
        self.actor_mesh.draw(ctx)
    }

    fn lane_position(&self, position: Vec3, angle: f32) -> Result<LanePosition, NotInLane> {
        let not_in_lane = NotInLane { position };
        let i = (position.x / ROAD_TILE_SIZE).floor();
        let j = (position.z / ROAD_TILE_SIZE).floor();
        if i < 0.0 || j < 0.0 {
            return Err(not_in_lane);
        }
        let tile = self
            .tile(i as usize, j as usize)
            .filter(|t| t.drivable)
            .ok_or_else(|| not_in_lane.clone())?;

        let heading = direction_vector(angle);
        let curve = tile
            .curves
            .iter()
            .max_by(|a, b| {
                let da = (a[3] - a[0]).normalize_or_zero().dot(heading);
                let db = (b[3] - b[0]).normalize_or_zero().dot(heading);
                da.total_cmp(&db)
            })
            .ok_or(not_in_lane)?;

        let closest = (0..=CURVE_SAMPLES)
            .map(|k| bezier_point(curve, k as f32 / CURVE_SAMPLES as f32))
            .min_by(|a, b| a.distance(position).total_cmp(&b.distance(position)))
            .unwrap_or(curve[0]);
        let tangent = (curve[3] - curve[0]).normalize_or_zero();
        let right = tangent.cross(Vec3::Y);
        let dot_dir = heading.dot(tangent);

        Ok(LanePosition {
            dist: (position - closest).dot(right),
            dot_dir,
            angle_deg: dot_dir.clamp(-1.0, 1.0).acos().to_degrees(),
        })
    }

    fn first_person_camera(&self) -> FirstPersonCamera {
        self.camera.clone()
    }

    fn horizon_color(&self) -> [f32; 3] {
        [0.64, 0.71, 0.28]
    }

    fn ground_color(&self) -> [f32; 3] {
        [0.15, 0.15, 0.15]
    }

    fn draw_ground_quad(&self, ctx: &mut RenderContext) -> BackendResult<()> {
        self.ground.draw(ctx)
    }

    fn draw_ground_triangles(&self, ctx: &mut RenderContext) -> BackendResult<()> {
        self.ground_triangles.draw(ctx)
    }

    fn create_label(&self, text: &str, x: f32, y: f32, style: &LabelStyle) -> Box<dyn Label> {
        self.labels_created.fetch_add(1, Ordering::Relaxed);
        Box::new(BlockLabel::new(text, x, y, style.clone()))
    }
}
