//! The central-body surface engine
//!
//! [`Surface`] streams a quadtree of terrain tiles draped with an ordered
//! stack of imagery layers. Each frame it selects tiles by screen-space
//! error, advances asynchronous loading under a wall-clock budget, bounds
//! residency with an LRU, and emits batched draw commands for the backend.

mod commands;
mod imagery;
mod layer;
mod load_queue;
mod pump;
mod replacement_queue;
mod selector;
mod tile;
mod tile_imagery;

pub use imagery::{Imagery, ImageryKey, ImageryState};
pub use layer::{ImageryLayer, ImageryLayerCollection, LayerKey};
pub use tile::{TerrainState, Tile, TileKey};
pub use tile_imagery::TileImagery;

use std::collections::VecDeque;
use std::sync::mpsc::Receiver;

use slotmap::SlotMap;

use crate::error::SurfaceError;
use crate::geo::{BoundingSphere, Cartographic, EllipsoidalOccluder, TilingScheme};
use crate::provider::{
    imagery_channel, terrain_channel, ImageryMessage, ImageryQueue, TerrainMessage, TerrainProvider,
    TerrainQueue,
};
use crate::render::{Context, DrawCommand, FrameState, ShaderSet};
use layer::LayerChange;
use load_queue::TileLoadQueue;
use replacement_queue::TileReplacementQueue;

/// Default lower bound on resident tiles kept by the replacement queue.
const DEFAULT_TILE_CACHE_SIZE: usize = 100;

/// Per-frame selection statistics and debug switches.
#[derive(Debug, Default)]
pub struct SurfaceDebug {
    /// Freeze selection: render lists from the last unfrozen frame keep
    /// being drawn while the camera moves.
    pub suspend_lod_update: bool,
    /// Emit line-primitive commands instead of triangles.
    pub wireframe: bool,
    pub tiles_visited: usize,
    pub tiles_culled: usize,
    pub tiles_rendered: usize,
    pub tiles_waiting_for_children: usize,
    pub max_depth_visited: u32,
    pub(crate) bounding_sphere_tile: Option<TileKey>,
}

impl SurfaceDebug {
    pub(crate) fn reset_frame_counters(&mut self) {
        self.tiles_visited = 0;
        self.tiles_culled = 0;
        self.tiles_rendered = 0;
        self.tiles_waiting_for_children = 0;
        self.max_depth_visited = 0;
    }
}

/// Construction options for [`Surface`].
pub struct SurfaceOptions<C: Context> {
    pub terrain_provider: Option<Box<dyn TerrainProvider<C>>>,
    pub imagery_layers: Option<ImageryLayerCollection<C>>,
    pub max_screen_space_error: f64,
}

impl<C: Context> Default for SurfaceOptions<C> {
    fn default() -> Self {
        Self {
            terrain_provider: None,
            imagery_layers: None,
            max_screen_space_error: 2.0,
        }
    }
}

impl<C: Context> SurfaceOptions<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terrain_provider(mut self, provider: Box<dyn TerrainProvider<C>>) -> Self {
        self.terrain_provider = Some(provider);
        self
    }

    pub fn imagery_layers(mut self, layers: ImageryLayerCollection<C>) -> Self {
        self.imagery_layers = Some(layers);
        self
    }

    pub fn max_screen_space_error(mut self, error: f64) -> Self {
        self.max_screen_space_error = error;
        self
    }
}

/// The surface engine. Owns the terrain provider and the imagery layer
/// collection it was constructed with; [`Surface::into_providers`] hands
/// them back.
impl<C: Context> std::fmt::Debug for Surface<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface").finish_non_exhaustive()
    }
}

pub struct Surface<C: Context> {
    pub(crate) terrain_provider: Box<dyn TerrainProvider<C>>,
    pub(crate) imagery_layers: ImageryLayerCollection<C>,
    pub(crate) tiling_scheme: TilingScheme,

    pub(crate) tiles: SlotMap<TileKey, Tile<C>>,
    pub(crate) roots: Vec<TileKey>,
    pub(crate) load_queue: TileLoadQueue,
    pub(crate) replacement_queue: TileReplacementQueue,
    pub(crate) traversal_queue: VecDeque<TileKey>,
    pub(crate) tiles_to_render_by_texture_count: Vec<Vec<TileKey>>,
    pub(crate) tile_commands: Vec<DrawCommand<C>>,
    pub(crate) occluder: EllipsoidalOccluder,

    pub(crate) terrain_queue: TerrainQueue<C>,
    pub(crate) terrain_inbox: Receiver<TerrainMessage<C>>,
    pub(crate) imagery_queue: ImageryQueue,
    pub(crate) imagery_inbox: Receiver<ImageryMessage>,

    pub(crate) max_screen_space_error: f64,
    pub(crate) tile_cache_size: usize,
    pub(crate) debug: SurfaceDebug,
}

impl<C: Context> Surface<C> {
    pub fn new(options: SurfaceOptions<C>) -> Result<Self, SurfaceError> {
        let terrain_provider = options
            .terrain_provider
            .ok_or(SurfaceError::MissingCollaborator("terrain_provider"))?;
        let imagery_layers = options
            .imagery_layers
            .ok_or(SurfaceError::MissingCollaborator("imagery_layer_collection"))?;
        if !(options.max_screen_space_error > 0.0) {
            return Err(SurfaceError::InvalidParameter(
                "max_screen_space_error must be positive",
            ));
        }
        let tiling_scheme = terrain_provider.tiling_scheme().clone();
        let occluder = EllipsoidalOccluder::new(*tiling_scheme.ellipsoid());
        let (terrain_queue, terrain_inbox) = terrain_channel();
        let (imagery_queue, imagery_inbox) = imagery_channel();
        Ok(Self {
            terrain_provider,
            imagery_layers,
            tiling_scheme,
            tiles: SlotMap::with_key(),
            roots: Vec::new(),
            load_queue: TileLoadQueue::new(),
            replacement_queue: TileReplacementQueue::new(),
            traversal_queue: VecDeque::new(),
            tiles_to_render_by_texture_count: Vec::new(),
            tile_commands: Vec::new(),
            occluder,
            terrain_queue,
            terrain_inbox,
            imagery_queue,
            imagery_inbox,
            max_screen_space_error: options.max_screen_space_error,
            tile_cache_size: DEFAULT_TILE_CACHE_SIZE,
            debug: SurfaceDebug::default(),
        })
    }

    /// Run one frame: apply pending layer changes, select tiles, pump loads
    /// within the frame budget, and append draw commands to `commands`.
    /// Tiles that became renderable this frame are drawn starting with the
    /// next frame's selection.
    pub fn update(
        &mut self,
        context: &mut C,
        frame: &FrameState,
        commands: &mut Vec<DrawCommand<C>>,
        shader_set: &mut dyn ShaderSet<C>,
        render_state: &C::RenderState,
        globe_uniforms: &C::GlobeUniforms,
    ) {
        self.process_layer_events();
        selector::select_tiles_for_rendering(self, frame);
        pump::process_tile_load_queue(self, context);
        commands::create_render_commands(
            self,
            context,
            frame,
            shader_set,
            render_state,
            globe_uniforms,
            commands,
        );
    }

    pub fn imagery_layers(&self) -> &ImageryLayerCollection<C> {
        &self.imagery_layers
    }

    /// Mutable access for adding, removing and reordering layers. Changes
    /// are applied to resident tiles at the start of the next update.
    pub fn imagery_layers_mut(&mut self) -> &mut ImageryLayerCollection<C> {
        &mut self.imagery_layers
    }

    pub fn terrain_provider(&self) -> &dyn TerrainProvider<C> {
        self.terrain_provider.as_ref()
    }

    pub fn max_screen_space_error(&self) -> f64 {
        self.max_screen_space_error
    }

    pub fn set_max_screen_space_error(&mut self, error: f64) {
        if error > 0.0 {
            self.max_screen_space_error = error;
        }
    }

    /// Lower bound on resident tiles kept across frames.
    pub fn tile_cache_size(&self) -> usize {
        self.tile_cache_size
    }

    pub fn set_tile_cache_size(&mut self, size: usize) {
        self.tile_cache_size = size;
    }

    /// Debug: freeze or resume LOD selection.
    pub fn toggle_lod_update(&mut self) {
        self.debug.suspend_lod_update = !self.debug.suspend_lod_update;
    }

    pub fn set_wireframe(&mut self, wireframe: bool) {
        self.debug.wireframe = wireframe;
    }

    pub fn debug(&self) -> &SurfaceDebug {
        &self.debug
    }

    pub fn tile(&self, key: TileKey) -> Option<&Tile<C>> {
        self.tiles.get(key)
    }

    pub fn roots(&self) -> &[TileKey] {
        &self.roots
    }

    /// Selected tiles of the last frame, bucketed by ready-texture count.
    pub fn render_lists(&self) -> &[Vec<TileKey>] {
        &self.tiles_to_render_by_texture_count
    }

    pub fn load_queue_length(&self) -> usize {
        self.load_queue.len()
    }

    pub fn resident_tile_count(&self) -> usize {
        self.replacement_queue.len()
    }

    /// Commands retained in the reuse pool after the last frame.
    pub fn command_pool_len(&self) -> usize {
        self.tile_commands.len()
    }

    /// The tile picked by the last bounding-sphere debug query.
    pub fn debug_picked_tile(&self) -> Option<TileKey> {
        self.debug.bounding_sphere_tile
    }

    /// Completion sender handed to asynchronous terrain providers.
    pub fn terrain_queue(&self) -> TerrainQueue<C> {
        self.terrain_queue.clone()
    }

    /// Completion sender handed to asynchronous imagery providers.
    pub fn imagery_queue(&self) -> ImageryQueue {
        self.imagery_queue.clone()
    }

    /// Debug: the bounding sphere of the most detailed tile rendered last
    /// frame that contains the given position.
    pub fn debug_bounding_sphere_of_tile_at(
        &mut self,
        position: &Cartographic,
    ) -> Option<BoundingSphere> {
        let mut best: Option<TileKey> = None;
        for bucket in &self.tiles_to_render_by_texture_count {
            for &key in bucket {
                let tile = &self.tiles[key];
                if !tile.extent.contains(position) {
                    continue;
                }
                if best.map_or(true, |b| tile.id.level > self.tiles[b].id.level) {
                    best = Some(key);
                }
            }
        }
        self.debug.bounding_sphere_tile = best;
        best.map(|key| self.tiles[key].bounding_sphere_3d)
    }

    /// Hand ownership of the collaborators back to the caller. GPU handles
    /// held by tiles and imagery are dropped.
    pub fn into_providers(self) -> (Box<dyn TerrainProvider<C>>, ImageryLayerCollection<C>) {
        (self.terrain_provider, self.imagery_layers)
    }

    fn process_layer_events(&mut self) {
        for event in self.imagery_layers.drain_events() {
            match event {
                LayerChange::Added { layer, index } => self.on_layer_added(layer, index),
                LayerChange::Removed { layer } => {
                    self.on_layer_removed(layer);
                    self.imagery_layers.finish_remove(layer);
                }
                LayerChange::Moved { layer, new_index } => self.on_layer_moved(layer, new_index),
            }
        }
    }

    /// A layer was inserted at `index`: drape it over every resident tile,
    /// then place its block so stack order matches collection order.
    fn on_layer_added(&mut self, layer_key: LayerKey, index: usize) {
        let next_layer = self.imagery_layers.order().get(index + 1).copied();
        let mut cursor = self.replacement_queue.head();
        while let Some(key) = cursor {
            let next = self.tiles[key].replacement_next;
            let terrain_error = self
                .terrain_provider
                .level_maximum_geometric_error(self.tiles[key].id.level);
            let tile_extent = self.tiles[key].extent;
            let created = {
                let layers = &mut self.imagery_layers;
                let tiles = &mut self.tiles;
                match layers.get_mut(layer_key) {
                    Some(layer) => layer.create_tile_imagery_skeletons(
                        layer_key,
                        &tile_extent,
                        terrain_error,
                        &mut tiles[key].imagery,
                        None,
                    ),
                    None => false,
                }
            };
            if created {
                self.tiles[key].done_loading = false;
                move_imagery_block(&mut self.tiles[key].imagery, layer_key, next_layer);
            }
            cursor = next;
        }
    }

    /// A layer was detached: splice its block out of every resident tile
    /// and release the imagery references it held.
    fn on_layer_removed(&mut self, layer_key: LayerKey) {
        let mut cursor = self.replacement_queue.head();
        while let Some(key) = cursor {
            let next = self.tiles[key].replacement_next;
            let became_empty = {
                let layers = &mut self.imagery_layers;
                let tiles = &mut self.tiles;
                let stack = &mut tiles[key].imagery;
                match stack.iter().position(|entry| entry.layer == layer_key) {
                    Some(start) => {
                        let len = stack[start..]
                            .iter()
                            .take_while(|entry| entry.layer == layer_key)
                            .count();
                        let removed: Vec<TileImagery> =
                            stack.drain(start..start + len).collect();
                        if let Some(layer) = layers.get_mut(layer_key) {
                            for entry in &removed {
                                layer.release_tile_imagery(entry);
                            }
                        }
                        stack.is_empty()
                    }
                    None => false,
                }
            };
            if became_empty {
                self.tiles[key].renderable = false;
            }
            cursor = next;
        }
    }

    /// A layer moved within the ordering: splice its block in front of the
    /// block of the layer that now follows it. One pass per tile.
    fn on_layer_moved(&mut self, layer_key: LayerKey, new_index: usize) {
        let next_layer = self.imagery_layers.order().get(new_index + 1).copied();
        let mut cursor = self.replacement_queue.head();
        while let Some(key) = cursor {
            let next = self.tiles[key].replacement_next;
            move_imagery_block(&mut self.tiles[key].imagery, layer_key, next_layer);
            cursor = next;
        }
    }
}

/// Splice the contiguous block belonging to `layer` to just before the
/// block belonging to `before_layer`, or to the end.
fn move_imagery_block(
    stack: &mut Vec<TileImagery>,
    layer: LayerKey,
    before_layer: Option<LayerKey>,
) {
    let Some(start) = stack.iter().position(|entry| entry.layer == layer) else {
        return;
    };
    let len = stack[start..]
        .iter()
        .take_while(|entry| entry.layer == layer)
        .count();
    let block: Vec<TileImagery> = stack.drain(start..start + len).collect();
    let insert_at = match before_layer {
        Some(before) => stack
            .iter()
            .position(|entry| entry.layer == before)
            .unwrap_or(stack.len()),
        None => stack.len(),
    };
    stack.splice(insert_at..insert_at, block);
}
