//! Quadtree terrain tiles

use glam::DVec3;
use slotmap::{new_key_type, SlotMap};

use super::tile_imagery::TileImagery;
use crate::geo::{BoundingSphere, Cartographic, Rectangle, TileId, TilingScheme};
use crate::provider::{TileGeometry, TileMesh};
use crate::render::Context;

new_key_type! {
    /// Stable handle of a tile in the surface's arena.
    pub struct TileKey;
}

/// Terrain loading state of a tile. `Transitioning` covers every
/// in-flight provider request; the arriving payload determines the next
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerrainState {
    Unloaded,
    Transitioning,
    Received,
    Transformed,
    Ready,
    Failed,
}

/// A node of the terrain quadtree. Owned by the surface's tile arena;
/// `parent` is a non-owning back reference, children are owned and either
/// all four present or absent.
pub struct Tile<C: Context> {
    pub id: TileId,
    pub extent: Rectangle,
    pub(crate) parent: Option<TileKey>,
    pub(crate) children: Option<[TileKey; 4]>,

    pub state: TerrainState,
    pub(crate) geometry: Option<TileGeometry>,
    pub(crate) mesh: Option<TileMesh>,
    pub vertex_array: Option<C::VertexArray>,

    pub center: DVec3,
    pub minimum_height: f64,
    pub maximum_height: f64,
    pub bounding_sphere_3d: BoundingSphere,
    pub occludee_point_in_scaled_space: Option<DVec3>,

    // Corner positions and outward edge-plane normals for the
    // distance-to-tile computation.
    pub(crate) southwest_corner: DVec3,
    pub(crate) northeast_corner: DVec3,
    pub(crate) west_normal: DVec3,
    pub(crate) east_normal: DVec3,
    pub(crate) south_normal: DVec3,
    pub(crate) north_normal: DVec3,

    /// Imagery stack, grouped contiguously per layer in collection order.
    pub imagery: Vec<TileImagery>,

    pub renderable: bool,
    pub done_loading: bool,
    /// Distance from the camera, refreshed by selection; drives the
    /// front-to-back command sort.
    pub distance: f64,
    pub(crate) last_selection_frame: u64,
    pub(crate) failure_reported: bool,

    pub(crate) load_previous: Option<TileKey>,
    pub(crate) load_next: Option<TileKey>,
    pub(crate) in_load_queue: bool,
    pub(crate) replacement_previous: Option<TileKey>,
    pub(crate) replacement_next: Option<TileKey>,
    pub(crate) in_replacement_queue: bool,
}

impl<C: Context> Tile<C> {
    pub(crate) fn new(id: TileId, scheme: &TilingScheme, parent: Option<TileKey>) -> Self {
        let extent = scheme.tile_extent(id);
        let ellipsoid = scheme.ellipsoid();

        let southwest_corner = ellipsoid.cartographic_to_cartesian(&extent.southwest());
        let southeast_corner = ellipsoid.cartographic_to_cartesian(&extent.southeast());
        let northwest_corner = ellipsoid.cartographic_to_cartesian(&extent.northwest());
        let northeast_corner = ellipsoid.cartographic_to_cartesian(&extent.northeast());

        let mid_latitude = (extent.south + extent.north) * 0.5;
        let mid_longitude = (extent.west + extent.east) * 0.5;
        let western_midpoint = ellipsoid
            .cartographic_to_cartesian(&Cartographic::new(extent.west, mid_latitude, 0.0));
        let eastern_midpoint = ellipsoid
            .cartographic_to_cartesian(&Cartographic::new(extent.east, mid_latitude, 0.0));
        let west_normal = western_midpoint.cross(DVec3::Z).normalize();
        let east_normal = DVec3::Z.cross(eastern_midpoint).normalize();

        // Edges collapse to a point where the extent touches a pole; fall
        // back to the axis there.
        let south_up = ellipsoid.geodetic_surface_normal_cartographic(&Cartographic::new(
            mid_longitude,
            extent.south,
            0.0,
        ));
        let south_edge = southeast_corner - southwest_corner;
        let south_normal = if south_edge.length_squared() < 1.0 {
            -DVec3::Z
        } else {
            south_edge.cross(south_up).normalize()
        };
        let north_up = ellipsoid.geodetic_surface_normal_cartographic(&Cartographic::new(
            mid_longitude,
            extent.north,
            0.0,
        ));
        let north_edge = northeast_corner - northwest_corner;
        let north_normal = if north_edge.length_squared() < 1.0 {
            DVec3::Z
        } else {
            north_up.cross(north_edge).normalize()
        };

        let center = ellipsoid.cartographic_to_cartesian(&extent.center());
        let bounding_sphere_3d = BoundingSphere::from_rectangle_3d(&extent, ellipsoid, 0.0, 0.0);

        Self {
            id,
            extent,
            parent,
            children: None,
            state: TerrainState::Unloaded,
            geometry: None,
            mesh: None,
            vertex_array: None,
            center,
            minimum_height: 0.0,
            maximum_height: 0.0,
            bounding_sphere_3d,
            occludee_point_in_scaled_space: None,
            southwest_corner,
            northeast_corner,
            west_normal,
            east_normal,
            south_normal,
            north_normal,
            imagery: Vec::new(),
            renderable: false,
            done_loading: false,
            distance: 0.0,
            last_selection_frame: 0,
            failure_reported: false,
            load_previous: None,
            load_next: None,
            in_load_queue: false,
            replacement_previous: None,
            replacement_next: None,
            in_replacement_queue: false,
        }
    }

    pub fn parent(&self) -> Option<TileKey> {
        self.parent
    }

    pub fn children(&self) -> Option<[TileKey; 4]> {
        self.children
    }

    /// Children of `key`, created on first call, all four at once.
    pub(crate) fn ensure_children(
        tiles: &mut SlotMap<TileKey, Tile<C>>,
        key: TileKey,
        scheme: &TilingScheme,
    ) -> [TileKey; 4] {
        if let Some(children) = tiles[key].children {
            return children;
        }
        let child_ids = tiles[key].id.children();
        let children = child_ids.map(|id| tiles.insert(Tile::new(id, scheme, Some(key))));
        tiles[key].children = Some(children);
        children
    }

    /// Copy bounds and culling data off a transformed mesh.
    pub(crate) fn apply_mesh(&mut self, mesh: &TileMesh) {
        self.center = mesh.center;
        self.minimum_height = mesh.minimum_height;
        self.maximum_height = mesh.maximum_height;
        self.bounding_sphere_3d = mesh.bounding_sphere;
        self.occludee_point_in_scaled_space = mesh.occludee_point_in_scaled_space;
    }

    /// Drop loading payloads and GPU resources and reset the state machine.
    /// Imagery references must already have been released by the caller.
    pub(crate) fn reset_to_unloaded(&mut self) {
        self.state = TerrainState::Unloaded;
        self.geometry = None;
        self.mesh = None;
        self.vertex_array = None;
        self.renderable = false;
        self.done_loading = false;
        self.failure_reported = false;
    }
}
