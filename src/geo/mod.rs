//! Geometry support consumed by the surface engine: ellipsoid math,
//! geographic rectangles, bounding volumes, horizon occlusion, map
//! projections and the quadtree tiling scheme.

mod bounding;
mod ellipsoid;
mod occluder;
mod projection;
mod rectangle;
mod tiling;

pub use bounding::{BoundingSphere, CullingVolume, Intersect};
pub use ellipsoid::{Cartographic, Ellipsoid};
pub use occluder::EllipsoidalOccluder;
pub use projection::{
    geodetic_latitude_to_mercator_angle, mercator_angle_to_geodetic_latitude, Projection,
    WEB_MERCATOR_MAX_LATITUDE,
};
pub use rectangle::Rectangle;
pub use tiling::{SchemeProjection, TileId, TilingScheme};
