//! Binding between a terrain tile and one imagery texture region

use glam::DVec4;

use super::imagery::ImageryKey;
use super::layer::LayerKey;

/// One entry of a tile's imagery stack: a reference into a layer's imagery
/// pyramid plus the mapping onto this tile. While falling back to an
/// ancestor texture, `original_imagery` keeps the failed imagery alive (and
/// reference-counted) so the provider outcome stays observable.
pub struct TileImagery {
    pub layer: LayerKey,
    pub imagery: ImageryKey,
    pub original_imagery: Option<ImageryKey>,
    /// Sub-rectangle of the tile this imagery covers, in [0,1]² tile
    /// texture coordinates (min x, min y, max x, max y).
    pub texture_coordinate_extent: DVec4,
    /// Computed once the imagery is ready, against the extent of whichever
    /// imagery (original or ancestor) ends up bound.
    pub texture_translation_and_scale: Option<DVec4>,
}

impl TileImagery {
    pub(crate) fn new(layer: LayerKey, imagery: ImageryKey, texture_coordinate_extent: DVec4) -> Self {
        Self {
            layer,
            imagery,
            original_imagery: None,
            texture_coordinate_extent,
            texture_translation_and_scale: None,
        }
    }
}
