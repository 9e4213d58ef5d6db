//! Rendering backend abstraction consumed by the surface engine
//!
//! The engine never talks to a GPU API directly. A backend implements
//! [`Context`] (resource creation, texture-unit limits) and [`ShaderSet`]
//! (programs specialized by day-texture count); the engine emits
//! [`DrawCommand`]s the backend submits however it likes.

mod command;
mod context;
mod frame;

pub use command::{DrawCommand, PrimitiveType, TextureSlot, TileUniforms, UniformId, UniformValue};
pub use context::{Context, ShaderSet};
pub use frame::{FrameState, SceneMode};
