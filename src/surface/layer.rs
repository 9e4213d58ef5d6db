//! Imagery layers and the ordered layer collection

use std::collections::VecDeque;

use glam::DVec4;
use slotmap::{new_key_type, SlotMap};

use super::imagery::{ImageryCache, ImageryKey, ImageryState};
use super::tile_imagery::TileImagery;
use crate::geo::{Rectangle, SchemeProjection, TileId};
use crate::provider::{ImageryProvider, ImageryQueue};
use crate::render::Context;

new_key_type! {
    /// Stable handle of a layer in the collection.
    pub struct LayerKey;
}

/// One imagery layer: a provider plus the reference-counted pyramid of
/// imagery tiles it has produced so far.
pub struct ImageryLayer<C: Context> {
    provider: Box<dyn ImageryProvider>,
    /// Opacity applied to every texture of this layer.
    pub alpha: f64,
    pub(crate) cache: ImageryCache<C>,
}

impl<C: Context> ImageryLayer<C> {
    pub fn new(provider: Box<dyn ImageryProvider>) -> Self {
        Self {
            provider,
            alpha: 1.0,
            cache: ImageryCache::new(),
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn ready(&self) -> bool {
        self.provider.ready()
    }

    pub fn imagery_state(&self, key: ImageryKey) -> ImageryState {
        self.cache.state(key)
    }

    pub fn imagery_count(&self) -> usize {
        self.cache.len()
    }

    pub fn imagery_reference_count(&self, key: ImageryKey) -> u32 {
        self.cache.reference_count(key)
    }

    /// The pyramid id of an imagery tile, when it is still alive.
    pub fn imagery_id(&self, key: ImageryKey) -> Option<TileId> {
        self.cache.get(key).map(|imagery| imagery.id)
    }

    /// Materialize this layer's coverage of a terrain tile as skeleton
    /// entries in the tile's imagery stack, inserted at `insertion_point`
    /// (default: appended). Returns whether anything was created.
    ///
    /// While the provider is not ready a single placeholder entry stands in;
    /// the load pump swaps it for real skeletons later.
    pub(crate) fn create_tile_imagery_skeletons(
        &mut self,
        layer_key: LayerKey,
        tile_extent: &Rectangle,
        terrain_geometric_error: f64,
        stack: &mut Vec<TileImagery>,
        insertion_point: Option<usize>,
    ) -> bool {
        let insertion_point = insertion_point.unwrap_or(stack.len());
        if !self.provider.ready() {
            let placeholder = self.cache.acquire_placeholder();
            stack.insert(
                insertion_point,
                TileImagery::new(layer_key, placeholder, DVec4::new(0.0, 0.0, 1.0, 1.0)),
            );
            return true;
        }

        let scheme = self.provider.tiling_scheme().clone();
        let coverage = match self.provider.extent().intersection(&scheme.rectangle()) {
            Some(c) => c,
            None => return false,
        };
        let extent = match tile_extent.intersection(&coverage) {
            Some(e) => e,
            None => return false,
        };

        let latitude = tile_extent.latitude_closest_to_equator();
        let imagery_level = self
            .level_with_maximum_texel_spacing(terrain_geometric_error, latitude)
            .clamp(self.provider.minimum_level(), self.provider.maximum_level());

        let Some((mut north_west_x, mut north_west_y)) =
            scheme.position_to_tile_xy(&extent.northwest(), imagery_level)
        else {
            return false;
        };
        let Some((mut south_east_x, mut south_east_y)) =
            scheme.position_to_tile_xy(&extent.southeast(), imagery_level)
        else {
            return false;
        };

        // Drop slivers thinner than roughly a pixel at the tile's edges.
        let very_close_latitude = tile_extent.height() / 512.0;
        let very_close_longitude = tile_extent.width() / 512.0;
        let north_west_extent = scheme.tile_extent(TileId::new(imagery_level, north_west_x, north_west_y));
        if (north_west_extent.south - extent.north).abs() < very_close_latitude
            && north_west_y < south_east_y
        {
            north_west_y += 1;
        }
        if (north_west_extent.east - extent.west).abs() < very_close_longitude
            && north_west_x < south_east_x
        {
            north_west_x += 1;
        }
        let south_east_extent = scheme.tile_extent(TileId::new(imagery_level, south_east_x, south_east_y));
        if (south_east_extent.north - extent.south).abs() < very_close_latitude
            && south_east_y > north_west_y
        {
            south_east_y -= 1;
        }
        if (south_east_extent.west - extent.east).abs() < very_close_longitude
            && south_east_x > north_west_x
        {
            south_east_x -= 1;
        }

        let terrain_width = tile_extent.width();
        let terrain_height = tile_extent.height();
        let minimum_level = self.provider.minimum_level();
        let mut created = 0usize;
        for y in north_west_y..=south_east_y {
            for x in north_west_x..=south_east_x {
                let id = TileId::new(imagery_level, x, y);
                let clipped = match scheme.tile_extent(id).intersection(&extent) {
                    Some(c) => c,
                    None => continue,
                };
                let tex_coords = DVec4::new(
                    ((clipped.west - tile_extent.west) / terrain_width).clamp(0.0, 1.0),
                    ((clipped.south - tile_extent.south) / terrain_height).clamp(0.0, 1.0),
                    ((clipped.east - tile_extent.west) / terrain_width).clamp(0.0, 1.0),
                    ((clipped.north - tile_extent.south) / terrain_height).clamp(0.0, 1.0),
                );
                let imagery = self.cache.acquire(id, &scheme, minimum_level);
                stack.insert(
                    insertion_point + created,
                    TileImagery::new(layer_key, imagery, tex_coords),
                );
                created += 1;
            }
        }
        created > 0
    }

    /// The imagery level whose texel spacing best matches a geometric
    /// error, corrected for latitude under Mercator schemes.
    fn level_with_maximum_texel_spacing(
        &self,
        texel_spacing: f64,
        latitude_closest_to_equator: f64,
    ) -> u32 {
        let scheme = self.provider.tiling_scheme();
        let latitude_factor = match scheme.projection() {
            SchemeProjection::WebMercator => latitude_closest_to_equator.cos(),
            SchemeProjection::Geographic => 1.0,
        };
        let level_zero_spacing = scheme.ellipsoid().maximum_radius()
            * std::f64::consts::TAU
            * latitude_factor
            / (self.provider.tile_width() as f64 * scheme.number_of_level_zero_tiles_x() as f64);
        if texel_spacing <= 0.0 {
            return self.provider.maximum_level();
        }
        let two_to_the_level = level_zero_spacing / texel_spacing;
        let level = two_to_the_level.log2().round();
        if level < 0.0 {
            0
        } else {
            level as u32
        }
    }

    /// Start fetching one imagery tile through the provider.
    pub(crate) fn request_imagery(
        &mut self,
        layer_key: LayerKey,
        imagery_key: ImageryKey,
        inbox: &ImageryQueue,
    ) {
        let Some(id) = self.cache.get(imagery_key).map(|imagery| imagery.id) else {
            return;
        };
        let state = self
            .provider
            .request_imagery(layer_key, imagery_key, id, inbox);
        if let Some(imagery) = self.cache.get_mut(imagery_key) {
            imagery.state = state;
        }
    }

    /// Upload received pixels into a texture.
    pub(crate) fn create_texture(&mut self, context: &mut C, imagery_key: ImageryKey) {
        let Some(imagery) = self.cache.get_mut(imagery_key) else {
            return;
        };
        match imagery.pixels.take() {
            Some(pixels) => {
                let texture = context.create_texture_2d(&pixels);
                imagery.texture = Some(texture);
                imagery.state = ImageryState::TextureLoaded;
            }
            None => imagery.state = ImageryState::Failed,
        }
    }

    /// Align the texture to the terrain's tiling projection, then mark it
    /// ready. A no-op unless the schemes disagree.
    pub(crate) fn reproject_texture(
        &mut self,
        context: &mut C,
        imagery_key: ImageryKey,
        terrain_projection: SchemeProjection,
    ) {
        let needs_reprojection = self.provider.tiling_scheme().projection()
            == SchemeProjection::WebMercator
            && terrain_projection == SchemeProjection::Geographic;
        let Some(imagery) = self.cache.get_mut(imagery_key) else {
            return;
        };
        if needs_reprojection {
            if let Some(texture) = imagery.texture.take() {
                let extent = imagery.extent;
                imagery.texture = Some(context.reproject_texture(&texture, &extent));
            }
        }
        imagery.state = ImageryState::Ready;
    }

    /// Mapping of tile texture coordinates into the bound imagery texture:
    /// (translation x, translation y, scale x, scale y).
    pub(crate) fn calculate_texture_translation_and_scale(
        &self,
        tile_extent: &Rectangle,
        tile_imagery: &TileImagery,
    ) -> DVec4 {
        let imagery_extent = self
            .cache
            .get(tile_imagery.imagery)
            .map(|imagery| imagery.extent)
            .unwrap_or(Rectangle::MAX_VALUE);
        let terrain_width = tile_extent.width();
        let terrain_height = tile_extent.height();
        let scale_x = terrain_width / imagery_extent.width();
        let scale_y = terrain_height / imagery_extent.height();
        DVec4::new(
            scale_x * (tile_extent.west - imagery_extent.west) / terrain_width,
            scale_y * (tile_extent.south - imagery_extent.south) / terrain_height,
            scale_x,
            scale_y,
        )
    }

    /// Release the references a stack entry holds.
    pub(crate) fn release_tile_imagery(&mut self, entry: &TileImagery) {
        self.cache.release(entry.imagery);
        if let Some(original) = entry.original_imagery {
            self.cache.release(original);
        }
    }
}

/// A change to the layer collection, applied to resident tiles at the start
/// of the next frame.
pub(crate) enum LayerChange {
    Added { layer: LayerKey, index: usize },
    Removed { layer: LayerKey },
    Moved { layer: LayerKey, new_index: usize },
}

/// Ordered collection of imagery layers. Mutations are recorded and the
/// engine rewrites resident tiles' imagery stacks when it next updates, so
/// layers can be added, removed and reordered without reloading geometry.
pub struct ImageryLayerCollection<C: Context> {
    layers: SlotMap<LayerKey, ImageryLayer<C>>,
    order: Vec<LayerKey>,
    events: VecDeque<LayerChange>,
}

impl<C: Context> Default for ImageryLayerCollection<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Context> ImageryLayerCollection<C> {
    pub fn new() -> Self {
        Self {
            layers: SlotMap::with_key(),
            order: Vec::new(),
            events: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Append a layer on top of the stack.
    pub fn add(&mut self, layer: ImageryLayer<C>) -> LayerKey {
        self.add_at(self.order.len(), layer)
    }

    /// Insert a layer at `index` (clamped).
    pub fn add_at(&mut self, index: usize, layer: ImageryLayer<C>) -> LayerKey {
        let index = index.min(self.order.len());
        let key = self.layers.insert(layer);
        self.order.insert(index, key);
        self.events.push_back(LayerChange::Added { layer: key, index });
        log::debug!("imagery layer added at index {index}");
        key
    }

    /// Detach a layer. Its imagery stays alive until the engine has walked
    /// resident tiles and released every reference.
    pub fn remove(&mut self, key: LayerKey) -> bool {
        let Some(position) = self.order.iter().position(|&k| k == key) else {
            return false;
        };
        self.order.remove(position);
        self.events.push_back(LayerChange::Removed { layer: key });
        log::debug!("imagery layer removed from index {position}");
        true
    }

    /// Move a layer to a new index in the ordering.
    pub fn move_layer(&mut self, key: LayerKey, new_index: usize) -> bool {
        let Some(old_index) = self.order.iter().position(|&k| k == key) else {
            return false;
        };
        let new_index = new_index.min(self.order.len() - 1);
        if old_index == new_index {
            return true;
        }
        self.order.remove(old_index);
        self.order.insert(new_index, key);
        self.events.push_back(LayerChange::Moved {
            layer: key,
            new_index,
        });
        true
    }

    pub fn get(&self, key: LayerKey) -> Option<&ImageryLayer<C>> {
        self.layers.get(key)
    }

    pub fn get_mut(&mut self, key: LayerKey) -> Option<&mut ImageryLayer<C>> {
        self.layers.get_mut(key)
    }

    pub fn index_of(&self, key: LayerKey) -> Option<usize> {
        self.order.iter().position(|&k| k == key)
    }

    pub fn order(&self) -> &[LayerKey] {
        &self.order
    }

    pub(crate) fn drain_events(&mut self) -> Vec<LayerChange> {
        self.events.drain(..).collect()
    }

    /// Finish a removal after the engine released all tile references.
    pub(crate) fn finish_remove(&mut self, key: LayerKey) {
        self.layers.remove(key);
    }
}
