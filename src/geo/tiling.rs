//! Quadtree tiling schemes over the ellipsoid

use super::projection::{
    geodetic_latitude_to_mercator_angle, mercator_angle_to_geodetic_latitude,
};
use super::{Cartographic, Ellipsoid, Rectangle, WEB_MERCATOR_MAX_LATITUDE};

/// Unique identifier of a tile in a quadtree tiling scheme. Row 0 is the
/// northernmost row at every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId {
    pub level: u32,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    pub fn new(level: u32, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }

    /// The tile one level coarser that contains this one.
    pub fn parent(self) -> Option<TileId> {
        if self.level == 0 {
            None
        } else {
            Some(TileId::new(self.level - 1, self.x / 2, self.y / 2))
        }
    }

    /// The four tiles one level finer, northwest first, row-major.
    pub fn children(self) -> [TileId; 4] {
        let level = self.level + 1;
        let x = self.x * 2;
        let y = self.y * 2;
        [
            TileId::new(level, x, y),
            TileId::new(level, x + 1, y),
            TileId::new(level, x, y + 1),
            TileId::new(level, x + 1, y + 1),
        ]
    }
}

/// How a tiling scheme divides latitude: linearly (geographic) or in
/// Mercator angle (web mercator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeProjection {
    Geographic,
    WebMercator,
}

/// A quadtree subdivision of (part of) the ellipsoid surface.
#[derive(Debug, Clone, PartialEq)]
pub struct TilingScheme {
    ellipsoid: Ellipsoid,
    projection: SchemeProjection,
    number_of_level_zero_tiles_x: u32,
    number_of_level_zero_tiles_y: u32,
}

impl TilingScheme {
    /// Geographic (equirectangular) scheme, two level-zero tiles side by
    /// side covering the full ellipsoid.
    pub fn geographic(ellipsoid: Ellipsoid) -> Self {
        Self {
            ellipsoid,
            projection: SchemeProjection::Geographic,
            number_of_level_zero_tiles_x: 2,
            number_of_level_zero_tiles_y: 1,
        }
    }

    /// Web Mercator scheme, a single square level-zero tile.
    pub fn web_mercator(ellipsoid: Ellipsoid) -> Self {
        Self {
            ellipsoid,
            projection: SchemeProjection::WebMercator,
            number_of_level_zero_tiles_x: 1,
            number_of_level_zero_tiles_y: 1,
        }
    }

    pub fn with_level_zero_tiles(mut self, x: u32, y: u32) -> Self {
        self.number_of_level_zero_tiles_x = x.max(1);
        self.number_of_level_zero_tiles_y = y.max(1);
        self
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    pub fn projection(&self) -> SchemeProjection {
        self.projection
    }

    pub fn number_of_level_zero_tiles_x(&self) -> u32 {
        self.number_of_level_zero_tiles_x
    }

    pub fn number_of_level_zero_tiles_y(&self) -> u32 {
        self.number_of_level_zero_tiles_y
    }

    pub fn number_of_tiles_x_at_level(&self, level: u32) -> u32 {
        self.number_of_level_zero_tiles_x << level
    }

    pub fn number_of_tiles_y_at_level(&self, level: u32) -> u32 {
        self.number_of_level_zero_tiles_y << level
    }

    /// The geographic rectangle the whole scheme covers.
    pub fn rectangle(&self) -> Rectangle {
        match self.projection {
            SchemeProjection::Geographic => Rectangle::MAX_VALUE,
            SchemeProjection::WebMercator => Rectangle::new(
                -std::f64::consts::PI,
                -WEB_MERCATOR_MAX_LATITUDE,
                std::f64::consts::PI,
                WEB_MERCATOR_MAX_LATITUDE,
            ),
        }
    }

    pub fn level_zero_tiles(&self) -> Vec<TileId> {
        let mut tiles =
            Vec::with_capacity((self.number_of_level_zero_tiles_x * self.number_of_level_zero_tiles_y) as usize);
        for y in 0..self.number_of_level_zero_tiles_y {
            for x in 0..self.number_of_level_zero_tiles_x {
                tiles.push(TileId::new(0, x, y));
            }
        }
        tiles
    }

    /// Geographic extent of a tile.
    pub fn tile_extent(&self, id: TileId) -> Rectangle {
        let nx = self.number_of_tiles_x_at_level(id.level) as f64;
        let ny = self.number_of_tiles_y_at_level(id.level) as f64;
        let full = self.rectangle();

        let west = full.west + full.width() * id.x as f64 / nx;
        let east = full.west + full.width() * (id.x + 1) as f64 / nx;

        let (native_north, native_south) = match self.projection {
            SchemeProjection::Geographic => (full.north, full.south),
            SchemeProjection::WebMercator => (
                geodetic_latitude_to_mercator_angle(full.north),
                geodetic_latitude_to_mercator_angle(full.south),
            ),
        };
        let native_height = native_north - native_south;
        let tile_north_native = native_north - native_height * id.y as f64 / ny;
        let tile_south_native = native_north - native_height * (id.y + 1) as f64 / ny;
        let (south, north) = match self.projection {
            SchemeProjection::Geographic => (tile_south_native, tile_north_native),
            SchemeProjection::WebMercator => (
                mercator_angle_to_geodetic_latitude(tile_south_native),
                mercator_angle_to_geodetic_latitude(tile_north_native),
            ),
        };
        Rectangle::new(west, south, east, north)
    }

    /// The `(x, y)` coordinates of the tile containing a geodetic position
    /// at the given level, or `None` when it lies outside the scheme.
    pub fn position_to_tile_xy(&self, position: &Cartographic, level: u32) -> Option<(u32, u32)> {
        let full = self.rectangle();
        if !full.contains(position) {
            return None;
        }
        let nx = self.number_of_tiles_x_at_level(level);
        let ny = self.number_of_tiles_y_at_level(level);

        let x_fraction = (position.longitude - full.west) / full.width();
        let x = ((x_fraction * nx as f64) as u32).min(nx - 1);

        let (native_north, native_south, native_y) = match self.projection {
            SchemeProjection::Geographic => (full.north, full.south, position.latitude),
            SchemeProjection::WebMercator => (
                geodetic_latitude_to_mercator_angle(full.north),
                geodetic_latitude_to_mercator_angle(full.south),
                geodetic_latitude_to_mercator_angle(position.latitude),
            ),
        };
        let y_fraction = (native_north - native_y) / (native_north - native_south);
        let y = ((y_fraction * ny as f64) as u32).min(ny - 1);
        Some((x, y))
    }
}
