//! Terrain and imagery providers
//!
//! Providers feed the engine asynchronously. An entry point returns the new
//! state of the request (`Transitioning` once accepted, the prior state when
//! throttled); completion arrives later as a message on the matching inbox,
//! which the load pump drains at the start of each frame. Entry points must
//! never block.

use std::sync::mpsc::{channel, Receiver, Sender};

use glam::DVec3;
use thiserror::Error;

use crate::geo::{BoundingSphere, Rectangle, TileId, TilingScheme};
use crate::render::Context;
use crate::surface::{ImageryKey, ImageryState, LayerKey, TerrainState, TileKey};

/// Raw terrain geometry as delivered by a provider, before transformation.
/// A regular height grid; the engine treats the payload as opaque.
#[derive(Debug, Clone)]
pub struct TileGeometry {
    pub width: u32,
    pub height: u32,
    pub heights: Vec<f32>,
}

/// A transformed terrain mesh ready for resource creation. Vertex positions
/// are relative to `center` to preserve precision.
#[derive(Debug, Clone)]
pub struct TileMesh {
    pub center: DVec3,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub minimum_height: f64,
    pub maximum_height: f64,
    pub bounding_sphere: BoundingSphere,
    /// Horizon-culling point in ellipsoid-scaled space, when one exists.
    pub occludee_point_in_scaled_space: Option<DVec3>,
}

/// Decoded imagery ready for texture upload, tightly packed RGBA8.
#[derive(Debug, Clone)]
pub struct ImageryPixels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum TerrainError {
    #[error("geometry request failed: {0}")]
    Request(String),
    #[error("geometry transform failed: {0}")]
    Transform(String),
    #[error("resource creation failed: {0}")]
    Resources(String),
}

/// Completion payloads for the terrain pipeline stages.
pub enum TerrainEvent<C: Context> {
    GeometryReceived(TileGeometry),
    GeometryTransformed(TileMesh),
    ResourcesCreated(C::VertexArray),
    Failed(TerrainError),
}

pub struct TerrainMessage<C: Context> {
    pub tile: TileKey,
    pub event: TerrainEvent<C>,
}

/// Cloneable sender half of the terrain completion inbox. Providers hold a
/// clone and post completions from wherever their I/O finishes.
pub struct TerrainQueue<C: Context> {
    sender: Sender<TerrainMessage<C>>,
}

impl<C: Context> Clone for TerrainQueue<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<C: Context> TerrainQueue<C> {
    pub fn send(&self, tile: TileKey, event: TerrainEvent<C>) {
        // The receiver only disappears when the surface is dropped; late
        // completions are then irrelevant.
        let _ = self.sender.send(TerrainMessage { tile, event });
    }
}

pub(crate) fn terrain_channel<C: Context>() -> (TerrainQueue<C>, Receiver<TerrainMessage<C>>) {
    let (sender, receiver) = channel();
    (TerrainQueue { sender }, receiver)
}

/// Completion payloads for an imagery fetch.
pub enum ImageryEvent {
    Received(ImageryPixels),
    Failed(String),
    /// The provider determined the tile does not exist (outside coverage,
    /// beyond available levels). Unlike `Failed` this is authoritative.
    Invalid,
}

pub struct ImageryMessage {
    pub layer: LayerKey,
    pub imagery: ImageryKey,
    pub event: ImageryEvent,
}

#[derive(Clone)]
pub struct ImageryQueue {
    sender: Sender<ImageryMessage>,
}

impl ImageryQueue {
    pub fn send(&self, layer: LayerKey, imagery: ImageryKey, event: ImageryEvent) {
        let _ = self.sender.send(ImageryMessage {
            layer,
            imagery,
            event,
        });
    }
}

pub(crate) fn imagery_channel() -> (ImageryQueue, Receiver<ImageryMessage>) {
    let (sender, receiver) = channel();
    (ImageryQueue { sender }, receiver)
}

/// Source of terrain geometry for one tiling scheme.
pub trait TerrainProvider<C: Context> {
    /// Whether the provider can answer tiling-scheme queries and accept
    /// requests. Level-zero tiles are not created until this returns true.
    fn ready(&self) -> bool {
        true
    }

    fn tiling_scheme(&self) -> &TilingScheme;

    /// Maximum geometric error in meters of tiles at `level`.
    fn level_maximum_geometric_error(&self, level: u32) -> f64;

    fn maximum_level(&self) -> u32;

    /// Begin fetching raw geometry for a tile. Return `Transitioning` when
    /// the request was accepted (completion via the inbox) or `Unloaded` to
    /// throttle; the tile is retried next frame.
    fn request_tile_geometry(
        &mut self,
        tile: TileKey,
        id: TileId,
        inbox: &TerrainQueue<C>,
    ) -> TerrainState;

    /// Transform received geometry into a mesh (completion via the inbox).
    fn transform_geometry(
        &mut self,
        context: &mut C,
        tile: TileKey,
        id: TileId,
        geometry: TileGeometry,
        inbox: &TerrainQueue<C>,
    ) -> TerrainState;

    /// Create GPU resources for a transformed mesh. The default builds the
    /// vertex array through the context and completes immediately.
    fn create_resources(
        &mut self,
        context: &mut C,
        tile: TileKey,
        _id: TileId,
        mesh: &TileMesh,
        inbox: &TerrainQueue<C>,
    ) -> TerrainState {
        let vertex_array = context.create_vertex_array_from_mesh(mesh);
        inbox.send(tile, TerrainEvent::ResourcesCreated(vertex_array));
        TerrainState::Transitioning
    }
}

/// Source of imagery pixels for one tiling scheme.
pub trait ImageryProvider {
    fn ready(&self) -> bool;

    fn tiling_scheme(&self) -> &TilingScheme;

    /// Geographic coverage; defaults to the whole scheme.
    fn extent(&self) -> Rectangle {
        self.tiling_scheme().rectangle()
    }

    fn minimum_level(&self) -> u32 {
        0
    }

    fn maximum_level(&self) -> u32;

    /// Pixel dimensions of one imagery tile, used to match imagery texel
    /// spacing to terrain detail.
    fn tile_width(&self) -> u32;
    fn tile_height(&self) -> u32;

    /// Begin fetching one imagery tile. Return `Transitioning` when accepted
    /// (completion via the inbox) or `Unloaded` to throttle.
    fn request_imagery(
        &mut self,
        layer: LayerKey,
        imagery: ImageryKey,
        id: TileId,
        inbox: &ImageryQueue,
    ) -> ImageryState;
}
