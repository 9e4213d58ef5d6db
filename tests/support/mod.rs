//! Shared mock backend and providers for the surface integration tests.
//!
//! The mock providers answer every request immediately through the
//! completion inboxes, so each pipeline stage still takes one frame to be
//! observed, exercising the real cross-frame state machinery.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use globe3d::{
    BoundingSphere, Cartographic, Context, DrawCommand, Ellipsoid, FrameState, ImageryEvent,
    ImageryKey, ImageryLayer, ImageryLayerCollection, ImageryPixels, ImageryProvider,
    ImageryQueue, ImageryState, LayerKey, Rectangle, ShaderSet, Surface, SurfaceOptions,
    TerrainError, TerrainEvent, TerrainProvider, TerrainQueue, TerrainState, TileGeometry, TileId,
    TileKey, TileMesh, TilingScheme,
};

pub const VIEWPORT_WIDTH: u32 = 1024;
pub const VIEWPORT_HEIGHT: u32 = 768;
pub const FOV_Y: f64 = std::f64::consts::FRAC_PI_3;

#[derive(Clone, Debug, PartialEq)]
pub struct MockTexture {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug)]
pub struct MockVertexArray {
    pub vertex_count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MockShader {
    pub num_day_textures: usize,
}

#[derive(Clone, Debug, Default)]
pub struct MockRenderState;

#[derive(Clone, Debug, Default)]
pub struct MockGlobeUniforms;

/// Counts resource creation so tests can observe backend traffic.
pub struct MockContext {
    pub max_texture_units: usize,
    pub textures_created: usize,
    pub vertex_arrays_created: usize,
}

impl MockContext {
    pub fn new() -> Self {
        Self {
            max_texture_units: 8,
            textures_created: 0,
            vertex_arrays_created: 0,
        }
    }

    pub fn with_max_texture_units(mut self, units: usize) -> Self {
        self.max_texture_units = units;
        self
    }
}

impl Context for MockContext {
    type Texture = MockTexture;
    type VertexArray = MockVertexArray;
    type ShaderProgram = MockShader;
    type RenderState = MockRenderState;
    type GlobeUniforms = MockGlobeUniforms;

    fn maximum_texture_image_units(&self) -> usize {
        self.max_texture_units
    }

    fn create_texture_2d(&mut self, pixels: &ImageryPixels) -> MockTexture {
        self.textures_created += 1;
        MockTexture {
            width: pixels.width,
            height: pixels.height,
        }
    }

    fn create_vertex_array_from_mesh(&mut self, mesh: &TileMesh) -> MockVertexArray {
        self.vertex_arrays_created += 1;
        MockVertexArray {
            vertex_count: mesh.vertices.len() / 3,
        }
    }

    fn reproject_texture(&mut self, texture: &MockTexture, _extent: &Rectangle) -> MockTexture {
        texture.clone()
    }
}

pub struct MockShaderSet;

impl ShaderSet<MockContext> for MockShaderSet {
    fn shader_program(&mut self, _context: &mut MockContext, num_day_textures: usize) -> MockShader {
        MockShader { num_day_textures }
    }
}

/// Terrain provider over a flat synthetic surface. Every stage completes
/// through the inbox on the frame it is requested.
pub struct MockTerrainProvider {
    scheme: TilingScheme,
    max_level: u32,
    level_zero_error: f64,
    pub fail: HashSet<TileId>,
}

impl MockTerrainProvider {
    pub fn new(scheme: TilingScheme) -> Self {
        Self {
            scheme,
            max_level: 10,
            level_zero_error: 40000.0,
            fail: HashSet::new(),
        }
    }

    pub fn with_max_level(mut self, max_level: u32) -> Self {
        self.max_level = max_level;
        self
    }

    pub fn with_level_zero_error(mut self, error: f64) -> Self {
        self.level_zero_error = error;
        self
    }

    pub fn with_failing_tile(mut self, id: TileId) -> Self {
        self.fail.insert(id);
        self
    }
}

impl TerrainProvider<MockContext> for MockTerrainProvider {
    fn tiling_scheme(&self) -> &TilingScheme {
        &self.scheme
    }

    fn level_maximum_geometric_error(&self, level: u32) -> f64 {
        self.level_zero_error / (1u64 << level) as f64
    }

    fn maximum_level(&self) -> u32 {
        self.max_level
    }

    fn request_tile_geometry(
        &mut self,
        tile: TileKey,
        id: TileId,
        inbox: &TerrainQueue<MockContext>,
    ) -> TerrainState {
        if self.fail.contains(&id) {
            inbox.send(
                tile,
                TerrainEvent::Failed(TerrainError::Request("synthetic failure".into())),
            );
        } else {
            inbox.send(
                tile,
                TerrainEvent::GeometryReceived(TileGeometry {
                    width: 2,
                    height: 2,
                    heights: vec![0.0; 4],
                }),
            );
        }
        TerrainState::Transitioning
    }

    fn transform_geometry(
        &mut self,
        _context: &mut MockContext,
        tile: TileKey,
        id: TileId,
        _geometry: TileGeometry,
        inbox: &TerrainQueue<MockContext>,
    ) -> TerrainState {
        let extent = self.scheme.tile_extent(id);
        let ellipsoid = self.scheme.ellipsoid();
        let center = ellipsoid.cartographic_to_cartesian(&extent.center());
        let corners = [
            extent.southwest(),
            extent.southeast(),
            extent.northwest(),
            extent.northeast(),
        ];
        let mut vertices = Vec::with_capacity(12);
        for corner in &corners {
            let p = ellipsoid.cartographic_to_cartesian(corner) - center;
            vertices.extend_from_slice(&[p.x as f32, p.y as f32, p.z as f32]);
        }
        inbox.send(
            tile,
            TerrainEvent::GeometryTransformed(TileMesh {
                center,
                vertices,
                indices: vec![0, 1, 2, 1, 3, 2],
                minimum_height: 0.0,
                maximum_height: 0.0,
                bounding_sphere: BoundingSphere::from_rectangle_3d(&extent, ellipsoid, 0.0, 0.0),
                occludee_point_in_scaled_space: None,
            }),
        );
        TerrainState::Transitioning
    }
}

/// Imagery provider producing solid-color tiles. Requests for the failing
/// level report failure so fallback paths can be exercised.
pub struct MockImageryProvider {
    scheme: TilingScheme,
    max_level: u32,
    tile_size: u32,
    ready_flag: Option<Arc<AtomicBool>>,
    pub fail_level: Option<u32>,
    pub invalid_level: Option<u32>,
}

impl MockImageryProvider {
    pub fn new(scheme: TilingScheme) -> Self {
        Self {
            scheme,
            max_level: 18,
            tile_size: 256,
            ready_flag: None,
            fail_level: None,
            invalid_level: None,
        }
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_fail_level(mut self, level: u32) -> Self {
        self.fail_level = Some(level);
        self
    }

    /// Share a readiness switch so tests can flip the provider ready after
    /// the surface started updating.
    pub fn with_ready_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.ready_flag = Some(flag);
        self
    }
}

impl ImageryProvider for MockImageryProvider {
    fn ready(&self) -> bool {
        self.ready_flag
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(true)
    }

    fn tiling_scheme(&self) -> &TilingScheme {
        &self.scheme
    }

    fn maximum_level(&self) -> u32 {
        self.max_level
    }

    fn tile_width(&self) -> u32 {
        self.tile_size
    }

    fn tile_height(&self) -> u32 {
        self.tile_size
    }

    fn request_imagery(
        &mut self,
        layer: LayerKey,
        imagery: ImageryKey,
        id: TileId,
        inbox: &ImageryQueue,
    ) -> ImageryState {
        if Some(id.level) == self.fail_level {
            inbox.send(layer, imagery, ImageryEvent::Failed("synthetic failure".into()));
        } else if Some(id.level) == self.invalid_level {
            inbox.send(layer, imagery, ImageryEvent::Invalid);
        } else {
            inbox.send(
                layer,
                imagery,
                ImageryEvent::Received(ImageryPixels {
                    width: 4,
                    height: 4,
                    rgba: vec![255; 64],
                }),
            );
        }
        ImageryState::Transitioning
    }
}

/// Web Mercator scheme with two level-zero tiles side by side, the layout
/// the end-to-end scenarios use.
pub fn two_tile_mercator_scheme() -> TilingScheme {
    TilingScheme::web_mercator(Ellipsoid::WGS84).with_level_zero_tiles(2, 1)
}

pub fn camera_above_origin(height: f64) -> Cartographic {
    Cartographic::from_degrees(0.0, 0.0, height)
}

pub fn frame_at(camera: Cartographic, frame_number: u64) -> FrameState {
    FrameState::looking_down_3d(camera, Ellipsoid::WGS84, FOV_Y, VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
        .with_frame_number(frame_number)
}

/// Run updates for `frames`, returning the commands of the last frame.
pub fn run_frames(
    surface: &mut Surface<MockContext>,
    context: &mut MockContext,
    camera: Cartographic,
    frames: std::ops::Range<u64>,
) -> Vec<DrawCommand<MockContext>> {
    let mut shader_set = MockShaderSet;
    let mut commands = Vec::new();
    for frame_number in frames {
        commands.clear();
        let frame = frame_at(camera, frame_number);
        surface.update(
            context,
            &frame,
            &mut commands,
            &mut shader_set,
            &MockRenderState,
            &MockGlobeUniforms,
        );
    }
    commands
}

/// A surface over the two-tile Mercator scheme with `layer_count` imagery
/// layers whose texel spacing matches the terrain error at level zero.
pub fn surface_with_layers(layer_count: usize) -> (Surface<MockContext>, Vec<LayerKey>) {
    let terrain = MockTerrainProvider::new(two_tile_mercator_scheme());
    let mut layers = ImageryLayerCollection::new();
    let mut keys = Vec::new();
    for _ in 0..layer_count {
        let provider = MockImageryProvider::new(two_tile_mercator_scheme()).with_tile_size(512);
        keys.push(layers.add(ImageryLayer::new(Box::new(provider))));
    }
    let surface = Surface::new(
        SurfaceOptions::new()
            .terrain_provider(Box::new(terrain))
            .imagery_layers(layers),
    )
    .expect("surface construction");
    (surface, keys)
}

/// Distinct layers of a tile's imagery stack in order of appearance; equal
/// to the collection order when every block is contiguous.
pub fn stack_layer_sequence(surface: &Surface<MockContext>, key: TileKey) -> Vec<LayerKey> {
    let tile = surface.tile(key).expect("tile");
    let mut sequence = Vec::new();
    for entry in &tile.imagery {
        if sequence.last() != Some(&entry.layer) {
            sequence.push(entry.layer);
        }
    }
    sequence
}

/// Ready-texture count of a tile, recomputed from its stack.
pub fn ready_texture_count(surface: &Surface<MockContext>, key: TileKey) -> usize {
    let tile = surface.tile(key).expect("tile");
    tile.imagery
        .iter()
        .filter(|entry| {
            surface
                .imagery_layers()
                .get(entry.layer)
                .map(|layer| layer.imagery_state(entry.imagery) == ImageryState::Ready)
                .unwrap_or(false)
        })
        .count()
}
