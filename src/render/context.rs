//! Backend context and shader-set traits

use crate::geo::Rectangle;
use crate::provider::{ImageryPixels, TileMesh};

/// The rendering backend seen by the engine. Resource handles are
/// associated types and must be cheap to clone (reference-counted GPU
/// handles); the engine clones them into draw commands and drops them to
/// release the underlying resources.
pub trait Context {
    type Texture: Clone;
    type VertexArray: Clone;
    type ShaderProgram: Clone;
    type RenderState: Clone;
    /// Globe-level uniforms supplied by the caller and attached verbatim to
    /// every emitted command.
    type GlobeUniforms: Clone;

    /// Number of texture units a single draw command may sample. Determines
    /// how many imagery layers fit in one batch.
    fn maximum_texture_image_units(&self) -> usize;

    /// Upload decoded imagery into a GPU texture.
    fn create_texture_2d(&mut self, pixels: &ImageryPixels) -> Self::Texture;

    /// Build the vertex array for a transformed terrain mesh.
    fn create_vertex_array_from_mesh(&mut self, mesh: &TileMesh) -> Self::VertexArray;

    /// Re-align a Web Mercator texture to the geographic tiling of the
    /// terrain it drapes. Only called when the imagery and terrain schemes
    /// disagree.
    fn reproject_texture(&mut self, texture: &Self::Texture, extent: &Rectangle) -> Self::Texture;
}

/// Provides shader programs specialized to the number of day textures a
/// command samples.
pub trait ShaderSet<C: Context> {
    fn shader_program(&mut self, context: &mut C, num_day_textures: usize) -> C::ShaderProgram;
}
