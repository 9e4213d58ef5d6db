//! Budgeted tile load pump
//!
//! Drains the provider inboxes, then walks the load queue advancing each
//! tile's terrain and imagery state machines, at most one transition per
//! state per frame, until the wall-clock slice is spent. The pump never
//! blocks; in-flight work is observed again next frame.

use std::time::{Duration, Instant};

use super::imagery::ImageryState;
use super::tile::{TerrainState, TileKey};
use super::Surface;
use crate::provider::{ImageryEvent, TerrainEvent};
use crate::render::Context;

/// Wall-clock budget per frame. Soft: the pump stops at the next check
/// after the deadline passes.
const LOAD_QUEUE_TIME_SLICE: Duration = Duration::from_millis(10);

pub(crate) fn process_tile_load_queue<C: Context>(surface: &mut Surface<C>, context: &mut C) {
    drain_terrain_inbox(surface);
    drain_imagery_inbox(surface);

    let deadline = Instant::now() + LOAD_QUEUE_TIME_SLICE;
    let mut cursor = surface.load_queue.head();
    while let Some(key) = cursor {
        if Instant::now() >= deadline {
            break;
        }
        let planned_next = surface.tiles[key].load_next;
        process_tile(surface, context, key, deadline);
        cursor = match planned_next {
            // The neighbor can be gone if trimming evicted it while this
            // tile was processed.
            Some(next)
                if surface.tiles.contains_key(next) && surface.tiles[next].in_load_queue =>
            {
                Some(next)
            }
            _ => surface.tiles.get(key).and_then(|tile| tile.load_next),
        };
    }
}

fn drain_terrain_inbox<C: Context>(surface: &mut Surface<C>) {
    while let Ok(message) = surface.terrain_inbox.try_recv() {
        let Some(tile) = surface.tiles.get_mut(message.tile) else {
            continue;
        };
        // Completions are only valid against an in-flight request; anything
        // else is stale (the tile was evicted and reset meanwhile).
        if tile.state != TerrainState::Transitioning {
            continue;
        }
        match message.event {
            TerrainEvent::GeometryReceived(geometry) => {
                tile.geometry = Some(geometry);
                tile.state = TerrainState::Received;
            }
            TerrainEvent::GeometryTransformed(mesh) => {
                tile.apply_mesh(&mesh);
                tile.mesh = Some(mesh);
                tile.state = TerrainState::Transformed;
            }
            TerrainEvent::ResourcesCreated(vertex_array) => {
                tile.vertex_array = Some(vertex_array);
                tile.mesh = None;
                tile.state = TerrainState::Ready;
            }
            TerrainEvent::Failed(error) => {
                tile.state = TerrainState::Failed;
                if !tile.failure_reported {
                    log::warn!("terrain load failed for tile {:?}: {error}", tile.id);
                    tile.failure_reported = true;
                }
            }
        }
    }
}

fn drain_imagery_inbox<C: Context>(surface: &mut Surface<C>) {
    while let Ok(message) = surface.imagery_inbox.try_recv() {
        let Some(layer) = surface.imagery_layers.get_mut(message.layer) else {
            continue;
        };
        let Some(imagery) = layer.cache.get_mut(message.imagery) else {
            continue;
        };
        if imagery.state != ImageryState::Transitioning {
            continue;
        }
        match message.event {
            ImageryEvent::Received(pixels) => {
                imagery.pixels = Some(pixels);
                imagery.state = ImageryState::Received;
            }
            ImageryEvent::Failed(reason) => {
                log::debug!("imagery load failed for {:?}: {reason}", imagery.id);
                imagery.state = ImageryState::Failed;
            }
            ImageryEvent::Invalid => imagery.state = ImageryState::Invalid,
        }
    }
}

fn process_tile<C: Context>(
    surface: &mut Surface<C>,
    context: &mut C,
    key: TileKey,
    deadline: Instant,
) {
    process_terrain_state_machine(surface, context, key);
    if !surface.tiles.contains_key(key) {
        // Trimming during the terrain step evicted an ancestor and this
        // tile with it.
        return;
    }

    let mut is_done_loading = surface.tiles[key].state == TerrainState::Ready;
    let mut completed_imagery_loop = true;

    let mut i = 0;
    while i < surface.tiles[key].imagery.len() {
        if Instant::now() >= deadline {
            completed_imagery_loop = false;
            break;
        }
        let layer_key = surface.tiles[key].imagery[i].layer;
        let imagery_key = surface.tiles[key].imagery[i].imagery;
        let state = surface
            .imagery_layers
            .get(layer_key)
            .map(|layer| layer.imagery_state(imagery_key))
            .unwrap_or(ImageryState::Invalid);

        match state {
            ImageryState::Placeholder => {
                let provider_ready = surface
                    .imagery_layers
                    .get(layer_key)
                    .map(|layer| layer.ready())
                    .unwrap_or(false);
                if provider_ready {
                    // Swap the placeholder for real skeletons at this index
                    // and retry it.
                    let entry = surface.tiles[key].imagery.remove(i);
                    let terrain_error = surface
                        .terrain_provider
                        .level_maximum_geometric_error(surface.tiles[key].id.level);
                    let tile_extent = surface.tiles[key].extent;
                    let layers = &mut surface.imagery_layers;
                    let tiles = &mut surface.tiles;
                    if let Some(layer) = layers.get_mut(layer_key) {
                        layer.release_tile_imagery(&entry);
                        layer.create_tile_imagery_skeletons(
                            layer_key,
                            &tile_extent,
                            terrain_error,
                            &mut tiles[key].imagery,
                            Some(i),
                        );
                    }
                    continue;
                }
                is_done_loading = false;
                i += 1;
                continue;
            }
            ImageryState::Unloaded => {
                let imagery_queue = surface.imagery_queue.clone();
                if let Some(layer) = surface.imagery_layers.get_mut(layer_key) {
                    layer.request_imagery(layer_key, imagery_key, &imagery_queue);
                }
            }
            ImageryState::Received => {
                if let Some(layer) = surface.imagery_layers.get_mut(layer_key) {
                    layer.create_texture(context, imagery_key);
                }
            }
            ImageryState::TextureLoaded => {
                let terrain_projection = surface.tiling_scheme.projection();
                if let Some(layer) = surface.imagery_layers.get_mut(layer_key) {
                    layer.reproject_texture(context, imagery_key, terrain_projection);
                }
            }
            ImageryState::Failed | ImageryState::Invalid => {
                apply_parent_fallback(surface, key, i);
            }
            ImageryState::Transitioning | ImageryState::Ready => {}
        }

        // The bound imagery may have changed (fallback) or become ready.
        let effective_imagery = surface.tiles[key].imagery[i].imagery;
        let effective_state = surface
            .imagery_layers
            .get(layer_key)
            .map(|layer| layer.imagery_state(effective_imagery))
            .unwrap_or(ImageryState::Invalid);

        if effective_state == ImageryState::Ready
            && surface.tiles[key].imagery[i]
                .texture_translation_and_scale
                .is_none()
        {
            let tile_extent = surface.tiles[key].extent;
            let translation_and_scale = surface.imagery_layers.get(layer_key).map(|layer| {
                layer.calculate_texture_translation_and_scale(
                    &tile_extent,
                    &surface.tiles[key].imagery[i],
                )
            });
            if let Some(translation_and_scale) = translation_and_scale {
                surface.tiles[key].imagery[i].texture_translation_and_scale =
                    Some(translation_and_scale);
            }
        }

        let entry_done = match effective_state {
            ImageryState::Ready => true,
            // Still failed after the fallback attempt: no usable ancestor
            // exists, the entry will never contribute a texture.
            ImageryState::Failed | ImageryState::Invalid => true,
            _ => false,
        };
        is_done_loading = is_done_loading && entry_done;
        i += 1;
    }

    if completed_imagery_loop && is_done_loading {
        let tile = &mut surface.tiles[key];
        tile.renderable = true;
        tile.done_loading = true;
        surface.load_queue.remove(&mut surface.tiles, key);
    }
}

fn process_terrain_state_machine<C: Context>(
    surface: &mut Surface<C>,
    context: &mut C,
    key: TileKey,
) {
    match surface.tiles[key].state {
        TerrainState::Unloaded => {
            let id = surface.tiles[key].id;
            surface.tiles[key].state = TerrainState::Transitioning;
            let new_state =
                surface
                    .terrain_provider
                    .request_tile_geometry(key, id, &surface.terrain_queue);
            surface.tiles[key].state = new_state;

            // The request started: the tile now consumes resources, so it
            // enters the replacement queue, residency is re-bounded, and
            // every layer drapes its imagery onto it.
            if new_state != TerrainState::Unloaded {
                surface
                    .replacement_queue
                    .mark_tile_rendered(&mut surface.tiles, key);
                let keep_count = surface.tile_cache_size;
                surface.replacement_queue.trim_tiles(
                    &mut surface.tiles,
                    &mut surface.imagery_layers,
                    &mut surface.load_queue,
                    keep_count,
                );
                if !surface.tiles.contains_key(key) {
                    return;
                }
                let terrain_error = surface
                    .terrain_provider
                    .level_maximum_geometric_error(id.level);
                let tile_extent = surface.tiles[key].extent;
                let order: Vec<_> = surface.imagery_layers.order().to_vec();
                for layer_key in order {
                    let layers = &mut surface.imagery_layers;
                    let tiles = &mut surface.tiles;
                    if let Some(layer) = layers.get_mut(layer_key) {
                        layer.create_tile_imagery_skeletons(
                            layer_key,
                            &tile_extent,
                            terrain_error,
                            &mut tiles[key].imagery,
                            None,
                        );
                    }
                }
            }
        }
        TerrainState::Received => {
            let id = surface.tiles[key].id;
            let Some(geometry) = surface.tiles[key].geometry.take() else {
                surface.tiles[key].state = TerrainState::Failed;
                return;
            };
            surface.tiles[key].state = TerrainState::Transitioning;
            let new_state = surface.terrain_provider.transform_geometry(
                context,
                key,
                id,
                geometry,
                &surface.terrain_queue,
            );
            surface.tiles[key].state = new_state;
        }
        TerrainState::Transformed => {
            let id = surface.tiles[key].id;
            let Some(mesh) = surface.tiles[key].mesh.take() else {
                surface.tiles[key].state = TerrainState::Failed;
                return;
            };
            surface.tiles[key].state = TerrainState::Transitioning;
            let new_state = surface.terrain_provider.create_resources(
                context,
                key,
                id,
                &mesh,
                &surface.terrain_queue,
            );
            surface.tiles[key].state = new_state;
            // Keep the mesh until the resources message clears it.
            surface.tiles[key].mesh = Some(mesh);
        }
        TerrainState::Transitioning | TerrainState::Ready | TerrainState::Failed => {}
    }
}

/// Substitute the nearest non-failed ancestor for failed imagery. The
/// failed imagery stays alive through `original_imagery`; siblings end up
/// sharing the ancestor's texture at reduced texel density.
fn apply_parent_fallback<C: Context>(surface: &mut Surface<C>, key: TileKey, index: usize) {
    let layer_key = surface.tiles[key].imagery[index].layer;
    let current = surface.tiles[key].imagery[index].imagery;
    let Some(layer) = surface.imagery_layers.get_mut(layer_key) else {
        return;
    };

    let mut ancestor = layer.cache.parent_of(current);
    while let Some(candidate) = ancestor {
        if !matches!(
            layer.cache.state(candidate),
            ImageryState::Failed | ImageryState::Invalid
        ) {
            break;
        }
        ancestor = layer.cache.parent_of(candidate);
    }
    let Some(ancestor) = ancestor else {
        return;
    };

    layer.cache.add_reference(ancestor);
    let entry = &mut surface.tiles[key].imagery[index];
    if entry.original_imagery.is_none() {
        // Transfer the entry's reference on the failed imagery.
        entry.original_imagery = Some(entry.imagery);
    } else {
        // An earlier substitute failed in turn; drop it.
        layer.cache.release(entry.imagery);
    }
    entry.imagery = ancestor;
    entry.texture_translation_and_scale = None;
}
