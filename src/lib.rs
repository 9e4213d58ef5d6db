//! globe3d: quadtree LOD surface engine for an ellipsoidal planet.
//!
//! Streams terrain tiles draped with ordered imagery layers. Each frame the
//! engine selects which tiles to draw by screen-space error, advances
//! asynchronous tile loading within a bounded time budget, evicts
//! least-recently-used tiles, and emits draw commands for an abstract
//! rendering backend.
//!
//! The GPU, terrain sources and imagery sources are all collaborators
//! behind traits: [`render::Context`], [`provider::TerrainProvider`] and
//! [`provider::ImageryProvider`]. The engine itself is single-threaded and
//! pure in-memory; provider I/O completes through message inboxes polled
//! once per frame.

pub mod error;
pub mod geo;
pub mod provider;
pub mod render;
pub mod surface;

pub use error::{SurfaceError, SurfaceResult};
pub use geo::{
    BoundingSphere, Cartographic, CullingVolume, Ellipsoid, EllipsoidalOccluder, Intersect,
    Projection, Rectangle, SchemeProjection, TileId, TilingScheme,
};
pub use provider::{
    ImageryEvent, ImageryPixels, ImageryProvider, ImageryQueue, TerrainError, TerrainEvent,
    TerrainProvider, TerrainQueue, TileGeometry, TileMesh,
};
pub use render::{
    Context, DrawCommand, FrameState, PrimitiveType, SceneMode, ShaderSet, TextureSlot,
    TileUniforms, UniformId, UniformValue,
};
pub use surface::{
    ImageryKey, ImageryLayer, ImageryLayerCollection, ImageryState, LayerKey, Surface,
    SurfaceDebug, SurfaceOptions, TerrainState, Tile, TileImagery, TileKey,
};
