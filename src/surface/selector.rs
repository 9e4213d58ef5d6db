//! Per-frame LOD tile selection
//!
//! Breadth-first traversal from the level-zero roots: coarse tiles load and
//! render first, detail fills in outward, and refinement never proceeds
//! until all four children can be rendered, so no seams are exposed.

use super::imagery::ImageryState;
use super::tile::{Tile, TileKey};
use super::Surface;
use crate::geo::{BoundingSphere, Intersect};
use crate::render::{Context, FrameState, SceneMode};

pub(crate) fn select_tiles_for_rendering<C: Context>(
    surface: &mut Surface<C>,
    frame: &FrameState,
) {
    if surface.debug.suspend_lod_update {
        return;
    }
    for bucket in &mut surface.tiles_to_render_by_texture_count {
        bucket.clear();
    }
    surface.debug.reset_frame_counters();

    if surface.roots.is_empty() {
        if !surface.terrain_provider.ready() {
            return;
        }
        // The provider may have finished initializing since construction;
        // take its scheme as of now.
        surface.tiling_scheme = surface.terrain_provider.tiling_scheme().clone();
        for id in surface.tiling_scheme.level_zero_tiles() {
            let key = surface
                .tiles
                .insert(Tile::new(id, &surface.tiling_scheme, None));
            surface.roots.push(key);
        }
    }

    surface.load_queue.mark_insertion_point();
    surface
        .replacement_queue
        .mark_start_of_render_frame(frame.frame_number);
    surface.occluder.set_camera_position(frame.camera_position);

    surface.traversal_queue.clear();
    for i in 0..surface.roots.len() {
        let root = surface.roots[i];
        if !surface.tiles[root].done_loading {
            surface
                .load_queue
                .insert_before_insertion_point(&mut surface.tiles, root);
        }
        if surface.tiles[root].renderable && tile_visible(surface, frame, root) {
            surface.traversal_queue.push_back(root);
        } else {
            surface.debug.tiles_culled += 1;
        }
    }

    while let Some(key) = surface.traversal_queue.pop_front() {
        surface.debug.tiles_visited += 1;
        surface
            .replacement_queue
            .mark_tile_rendered(&mut surface.tiles, key);

        let level = surface.tiles[key].id.level;
        if level > surface.debug.max_depth_visited {
            surface.debug.max_depth_visited = level;
        }

        if screen_space_error(surface, frame, key) < surface.max_screen_space_error {
            // Good enough at this detail.
            add_to_render_list(surface, key);
        } else if queue_children_and_check_renderable(surface, key) {
            // Refine: all four children can take over.
            if let Some(children) = surface.tiles[key].children() {
                for child in children {
                    if tile_visible(surface, frame, child) {
                        surface.traversal_queue.push_back(child);
                    } else {
                        surface.debug.tiles_culled += 1;
                    }
                }
            }
        } else {
            // Render coarse rather than refine partially.
            add_to_render_list(surface, key);
            surface.debug.tiles_waiting_for_children += 1;
        }
    }
}

/// Ensure the children exist, queue any still loading, and report whether
/// all four are renderable. Never refines past the provider's deepest level.
fn queue_children_and_check_renderable<C: Context>(
    surface: &mut Surface<C>,
    key: TileKey,
) -> bool {
    if surface.tiles[key].id.level >= surface.terrain_provider.maximum_level() {
        return false;
    }
    let children = Tile::ensure_children(&mut surface.tiles, key, &surface.tiling_scheme);
    let mut all_renderable = true;
    for child in children {
        if !surface.tiles[child].done_loading {
            surface
                .load_queue
                .insert_before_insertion_point(&mut surface.tiles, child);
        }
        if !surface.tiles[child].renderable {
            all_renderable = false;
        }
    }
    all_renderable
}

fn tile_visible<C: Context>(surface: &Surface<C>, frame: &FrameState, key: TileKey) -> bool {
    let tile = &surface.tiles[key];
    match frame.mode {
        SceneMode::Scene3D => {
            if frame.culling_volume.visibility(&tile.bounding_sphere_3d) == Intersect::Outside {
                return false;
            }
            match tile.occludee_point_in_scaled_space {
                Some(occludee) => surface.occluder.is_scaled_space_point_visible(occludee),
                None => true,
            }
        }
        SceneMode::Scene2D | SceneMode::ColumbusView => {
            let sphere = BoundingSphere::from_rectangle_2d(&tile.extent, &frame.projection);
            frame.culling_volume.visibility(&sphere) != Intersect::Outside
        }
        SceneMode::Morphing => {
            let sphere = BoundingSphere::from_rectangle_2d(&tile.extent, &frame.projection)
                .union(&tile.bounding_sphere_3d);
            frame.culling_volume.visibility(&sphere) != Intersect::Outside
        }
    }
}

/// Screen-space error of a tile in pixels. Also refreshes `tile.distance`
/// for the front-to-back command sort.
fn screen_space_error<C: Context>(
    surface: &mut Surface<C>,
    frame: &FrameState,
    key: TileKey,
) -> f64 {
    let max_geometric_error = {
        let tile = &surface.tiles[key];
        tile.extent.latitude_closest_to_equator().cos()
            * surface
                .terrain_provider
                .level_maximum_geometric_error(tile.id.level)
    };

    if frame.mode == SceneMode::Scene2D {
        let sphere = BoundingSphere::from_rectangle_2d(&surface.tiles[key].extent, &frame.projection);
        surface.tiles[key].distance = frame.camera_position.distance(sphere.center);
        let pixel_size = frame.frustum_height.max(frame.frustum_width)
            / frame.viewport_width.max(frame.viewport_height).max(1) as f64;
        if pixel_size <= 0.0 {
            return f64::MAX;
        }
        return max_geometric_error / pixel_size;
    }

    let distance_squared = match frame.mode {
        SceneMode::ColumbusView => {
            distance_squared_to_projected_tile(frame, &surface.tiles[key])
        }
        _ => distance_squared_to_tile(frame, &surface.tiles[key]),
    };
    let distance = distance_squared.sqrt();
    surface.tiles[key].distance = distance;
    if distance < 1e-3 {
        return f64::MAX;
    }
    (max_geometric_error * frame.viewport_height as f64)
        / (2.0 * distance * (frame.fov_y * 0.5).tan())
}

/// Squared distance from the camera to the slab bounding the tile: dot the
/// camera against the outward edge-plane normals at the southwest and
/// northeast corners, plus the height above the tile's ceiling.
fn distance_squared_to_tile<C: Context>(frame: &FrameState, tile: &Tile<C>) -> f64 {
    let from_southwest = frame.camera_position - tile.southwest_corner;
    let from_northeast = frame.camera_position - tile.northeast_corner;

    let distance_to_west = from_southwest.dot(tile.west_normal);
    let distance_to_south = from_southwest.dot(tile.south_normal);
    let distance_to_east = from_northeast.dot(tile.east_normal);
    let distance_to_north = from_northeast.dot(tile.north_normal);
    let distance_from_top = frame.camera_position_cartographic.height - tile.maximum_height;

    let mut result = 0.0;
    if distance_to_west > 0.0 {
        result += distance_to_west * distance_to_west;
    } else if distance_to_east > 0.0 {
        result += distance_to_east * distance_to_east;
    }
    if distance_to_south > 0.0 {
        result += distance_to_south * distance_to_south;
    } else if distance_to_north > 0.0 {
        result += distance_to_north * distance_to_north;
    }
    if distance_from_top > 0.0 {
        result += distance_from_top * distance_from_top;
    }
    result
}

/// Columbus-view analogue working on the projected extent.
fn distance_squared_to_projected_tile<C: Context>(frame: &FrameState, tile: &Tile<C>) -> f64 {
    let southwest = frame.projection.project(&tile.extent.southwest());
    let northeast = frame.projection.project(&tile.extent.northeast());
    let camera = frame.camera_position;
    let dx = (southwest.x - camera.x).max(camera.x - northeast.x).max(0.0);
    let dy = (southwest.y - camera.y).max(camera.y - northeast.y).max(0.0);
    let dz = (camera.z - tile.maximum_height).max(0.0);
    dx * dx + dy * dy + dz * dz
}

/// Bucket a selected tile by how many of its imagery textures are ready.
fn add_to_render_list<C: Context>(surface: &mut Surface<C>, key: TileKey) {
    let mut ready_count = 0usize;
    for entry in &surface.tiles[key].imagery {
        if let Some(layer) = surface.imagery_layers.get(entry.layer) {
            if layer.imagery_state(entry.imagery) == ImageryState::Ready {
                ready_count += 1;
            }
        }
    }
    while surface.tiles_to_render_by_texture_count.len() <= ready_count {
        surface.tiles_to_render_by_texture_count.push(Vec::new());
    }
    surface.tiles_to_render_by_texture_count[ready_count].push(key);
    surface.debug.tiles_rendered += 1;
}
