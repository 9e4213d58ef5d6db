//! Draw-command assembly for selected tiles

use glam::{DVec2, DVec3, DVec4};

use super::imagery::ImageryState;
use super::tile::TileKey;
use super::Surface;
use crate::geo::{geodetic_latitude_to_mercator_angle, BoundingSphere};
use crate::render::{
    Context, DrawCommand, FrameState, PrimitiveType, ShaderSet, TextureSlot, TileUniforms,
    SceneMode,
};

/// Emit draw commands for every selected tile, front to back within each
/// texture-count bucket. A tile produces one command per batch of up to
/// `maximum_texture_image_units` ready textures, and always at least one
/// (terrain renders untextured until imagery arrives).
#[allow(clippy::too_many_arguments)]
pub(crate) fn create_render_commands<C: Context>(
    surface: &mut Surface<C>,
    context: &mut C,
    frame: &FrameState,
    shader_set: &mut dyn ShaderSet<C>,
    render_state: &C::RenderState,
    globe_uniforms: &C::GlobeUniforms,
    commands: &mut Vec<DrawCommand<C>>,
) {
    let max_texture_units = context.maximum_texture_image_units().max(1);
    let mut used = 0usize;

    for bucket_index in 0..surface.tiles_to_render_by_texture_count.len() {
        let mut bucket = std::mem::take(&mut surface.tiles_to_render_by_texture_count[bucket_index]);
        if !bucket.is_empty() {
            let tiles = &surface.tiles;
            bucket.sort_by(|a, b| {
                tiles[*a]
                    .distance
                    .partial_cmp(&tiles[*b].distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for &key in &bucket {
                emit_tile_commands(
                    surface,
                    context,
                    frame,
                    shader_set,
                    render_state,
                    globe_uniforms,
                    commands,
                    key,
                    max_texture_units,
                    &mut used,
                );
            }
        }
        surface.tiles_to_render_by_texture_count[bucket_index] = bucket;
    }

    // Shrink the pool to what was written this frame so stale commands do
    // not keep textures alive.
    surface.tile_commands.truncate(used);
}

#[allow(clippy::too_many_arguments)]
fn emit_tile_commands<C: Context>(
    surface: &mut Surface<C>,
    context: &mut C,
    frame: &FrameState,
    shader_set: &mut dyn ShaderSet<C>,
    render_state: &C::RenderState,
    globe_uniforms: &C::GlobeUniforms,
    commands: &mut Vec<DrawCommand<C>>,
    key: TileKey,
    max_texture_units: usize,
    used: &mut usize,
) {
    let Some(vertex_array) = surface.tiles[key].vertex_array.clone() else {
        return;
    };

    // Ready textures in stack order, i.e. bottom layer first.
    let mut slots: Vec<TextureSlot<C>> = Vec::new();
    for entry in &surface.tiles[key].imagery {
        let Some(layer) = surface.imagery_layers.get(entry.layer) else {
            continue;
        };
        if layer.imagery_state(entry.imagery) != ImageryState::Ready {
            continue;
        }
        let Some(translation_and_scale) = entry.texture_translation_and_scale else {
            continue;
        };
        let Some(texture) = layer
            .cache
            .get(entry.imagery)
            .and_then(|imagery| imagery.texture.clone())
        else {
            continue;
        };
        slots.push(TextureSlot {
            texture,
            translation_and_scale,
            tex_coords_extent: entry.texture_coordinate_extent,
            alpha: layer.alpha,
        });
    }

    let tile = &surface.tiles[key];
    let extent = tile.extent;

    // Relative-to-center transform; in the flat modes the center and extent
    // move into projected space, with the Mercator precision quad alongside.
    let (center, tile_extent, south_mercator_y_high, south_mercator_y_low, one_over_mercator_height) =
        match frame.mode {
            SceneMode::Scene3D | SceneMode::Morphing => (
                tile.center,
                DVec4::new(extent.west, extent.south, extent.east, extent.north),
                0.0f32,
                0.0f32,
                0.0f32,
            ),
            SceneMode::Scene2D | SceneMode::ColumbusView => {
                let southwest = frame.projection.project(&extent.southwest());
                let northeast = frame.projection.project(&extent.northeast());
                let center = DVec3::new(
                    (southwest.x + northeast.x) * 0.5,
                    (southwest.y + northeast.y) * 0.5,
                    0.0,
                );
                let projected_extent = DVec4::new(
                    southwest.x - center.x,
                    southwest.y - center.y,
                    northeast.x - center.x,
                    northeast.y - center.y,
                );
                let (high, low, one_over) = if frame.projection.is_mercator() {
                    let south_y = geodetic_latitude_to_mercator_angle(extent.south);
                    let north_y = geodetic_latitude_to_mercator_angle(extent.north);
                    let (high, low) = split_double(south_y);
                    (high, low, (1.0 / (north_y - south_y)) as f32)
                } else {
                    (0.0, 0.0, 0.0)
                };
                (center, projected_extent, high, low, one_over)
            }
        };

    let center_eye = frame.view_matrix * center.extend(1.0);
    let mut modified_model_view = frame.view_matrix;
    modified_model_view.w_axis = center_eye;
    let modified_model_view_projection = frame.projection_matrix * modified_model_view;

    let bounding_volume = match frame.mode {
        SceneMode::Scene3D => tile.bounding_sphere_3d,
        SceneMode::Scene2D | SceneMode::ColumbusView => {
            BoundingSphere::from_rectangle_2d(&extent, &frame.projection)
        }
        SceneMode::Morphing => BoundingSphere::from_rectangle_2d(&extent, &frame.projection)
            .union(&tile.bounding_sphere_3d),
    };
    let primitive_type = if surface.debug.wireframe {
        PrimitiveType::Lines
    } else {
        PrimitiveType::Triangles
    };
    let south_and_north_latitude = DVec2::new(extent.south, extent.north);

    let batch_count = if slots.is_empty() {
        1
    } else {
        (slots.len() + max_texture_units - 1) / max_texture_units
    };
    for batch in 0..batch_count {
        let start = batch * max_texture_units;
        let end = (start + max_texture_units).min(slots.len());
        let day_textures = slots[start..end].to_vec();
        let shader_program = shader_set.shader_program(context, day_textures.len());
        let command = DrawCommand {
            shader_program,
            render_state: render_state.clone(),
            primitive_type,
            vertex_array: vertex_array.clone(),
            uniforms: TileUniforms {
                center_3d: center,
                modified_model_view,
                modified_model_view_projection,
                tile_extent,
                south_and_north_latitude,
                south_mercator_y_high,
                south_mercator_y_low,
                one_over_mercator_height,
                day_textures,
            },
            globe_uniforms: globe_uniforms.clone(),
            bounding_volume,
        };
        if *used < surface.tile_commands.len() {
            surface.tile_commands[*used] = command.clone();
        } else {
            surface.tile_commands.push(command.clone());
        }
        commands.push(command);
        *used += 1;
    }
}

/// Split a double into high and low floats whose sum recovers it, the GPU
/// precision trick for Mercator Y.
fn split_double(value: f64) -> (f32, f32) {
    let high = value as f32;
    let low = (value - high as f64) as f32;
    (high, low)
}
