//! Draw commands and the per-tile uniform record

use glam::{DMat4, DVec2, DVec3, DVec4};

use super::Context;
use crate::geo::BoundingSphere;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Triangles,
    /// Wireframe debug rendering.
    Lines,
}

/// One imagery texture bound into a command, with its placement on the tile.
pub struct TextureSlot<C: Context> {
    pub texture: C::Texture,
    /// (translation x, translation y, scale x, scale y) mapping tile texture
    /// coordinates into the imagery texture.
    pub translation_and_scale: DVec4,
    /// Sub-rectangle of the tile this imagery covers, in [0,1]² tile
    /// texture coordinates (min x, min y, max x, max y).
    pub tex_coords_extent: DVec4,
    pub alpha: f64,
}

impl<C: Context> Clone for TextureSlot<C> {
    fn clone(&self) -> Self {
        Self {
            texture: self.texture.clone(),
            translation_and_scale: self.translation_and_scale,
            tex_coords_extent: self.tex_coords_extent,
            alpha: self.alpha,
        }
    }
}

/// Statically typed per-tile uniform record. The relative-to-center
/// transform keeps vertex positions small: vertices are stored relative to
/// `center_3d` and the modified model-view puts the center back.
pub struct TileUniforms<C: Context> {
    pub center_3d: DVec3,
    pub modified_model_view: DMat4,
    pub modified_model_view_projection: DMat4,
    /// Tile extent; in 2D/Columbus view the projected extent relative to the
    /// center, otherwise the geographic extent (west, south, east, north).
    pub tile_extent: DVec4,
    pub south_and_north_latitude: DVec2,
    /// Southern Mercator Y split into two floats to recover double precision
    /// on the GPU.
    pub south_mercator_y_high: f32,
    pub south_mercator_y_low: f32,
    pub one_over_mercator_height: f32,
    pub day_textures: Vec<TextureSlot<C>>,
}

impl<C: Context> Clone for TileUniforms<C> {
    fn clone(&self) -> Self {
        Self {
            center_3d: self.center_3d,
            modified_model_view: self.modified_model_view,
            modified_model_view_projection: self.modified_model_view_projection,
            tile_extent: self.tile_extent,
            south_and_north_latitude: self.south_and_north_latitude,
            south_mercator_y_high: self.south_mercator_y_high,
            south_mercator_y_low: self.south_mercator_y_low,
            one_over_mercator_height: self.one_over_mercator_height,
            day_textures: self.day_textures.clone(),
        }
    }
}

/// Keys into the uniform record, for backends that bind uniforms by name
/// lookup rather than by struct layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformId {
    Center3d,
    ModifiedModelView,
    ModifiedModelViewProjection,
    TileExtent,
    SouthAndNorthLatitude,
    SouthMercatorYHigh,
    SouthMercatorYLow,
    OneOverMercatorHeight,
    DayTextures,
}

/// A value pulled out of the uniform record by [`UniformId`].
pub enum UniformValue<'a, C: Context> {
    Vector3(DVec3),
    Vector4(DVec4),
    Matrix4(DMat4),
    Vector2(DVec2),
    Scalar(f32),
    Textures(&'a [TextureSlot<C>]),
}

impl<C: Context> TileUniforms<C> {
    pub fn value(&self, id: UniformId) -> UniformValue<'_, C> {
        match id {
            UniformId::Center3d => UniformValue::Vector3(self.center_3d),
            UniformId::ModifiedModelView => UniformValue::Matrix4(self.modified_model_view),
            UniformId::ModifiedModelViewProjection => {
                UniformValue::Matrix4(self.modified_model_view_projection)
            }
            UniformId::TileExtent => UniformValue::Vector4(self.tile_extent),
            UniformId::SouthAndNorthLatitude => {
                UniformValue::Vector2(self.south_and_north_latitude)
            }
            UniformId::SouthMercatorYHigh => UniformValue::Scalar(self.south_mercator_y_high),
            UniformId::SouthMercatorYLow => UniformValue::Scalar(self.south_mercator_y_low),
            UniformId::OneOverMercatorHeight => UniformValue::Scalar(self.one_over_mercator_height),
            UniformId::DayTextures => UniformValue::Textures(&self.day_textures),
        }
    }
}

/// A single draw emitted by the command assembler. `bounding_volume` lets
/// the backend sort or cull without touching engine state.
pub struct DrawCommand<C: Context> {
    pub shader_program: C::ShaderProgram,
    pub render_state: C::RenderState,
    pub primitive_type: PrimitiveType,
    pub vertex_array: C::VertexArray,
    pub uniforms: TileUniforms<C>,
    pub globe_uniforms: C::GlobeUniforms,
    pub bounding_volume: BoundingSphere,
}

impl<C: Context> Clone for DrawCommand<C> {
    fn clone(&self) -> Self {
        Self {
            shader_program: self.shader_program.clone(),
            render_state: self.render_state.clone(),
            primitive_type: self.primitive_type,
            vertex_array: self.vertex_array.clone(),
            uniforms: self.uniforms.clone(),
            globe_uniforms: self.globe_uniforms.clone(),
            bounding_volume: self.bounding_volume,
        }
    }
}
