//! Per-frame camera and viewport state consumed by the engine

use glam::{DMat4, DVec3};

use crate::geo::{Cartographic, CullingVolume, Ellipsoid, Projection};

/// Scene mode the surface is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneMode {
    Scene3D,
    ColumbusView,
    Scene2D,
    /// Transitioning between 2D/Columbus and 3D; culling uses the union of
    /// both bounding volumes.
    Morphing,
}

/// Camera, viewport and projection state for one frame. Camera and frustum
/// computation are the caller's job; the engine only consumes the result.
///
/// In `Scene3D` (and while morphing) `camera_position` is a world cartesian;
/// in `Scene2D`/`ColumbusView` it is in projected map coordinates, matching
/// the space the culling volume is expressed in.
#[derive(Debug, Clone)]
pub struct FrameState {
    pub mode: SceneMode,
    pub frame_number: u64,
    pub camera_position: DVec3,
    pub camera_position_cartographic: Cartographic,
    pub view_matrix: DMat4,
    pub projection_matrix: DMat4,
    pub culling_volume: CullingVolume,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Vertical field of view in radians (perspective modes).
    pub fov_y: f64,
    /// Orthographic frustum dimensions, used by the 2D error metric.
    pub frustum_width: f64,
    pub frustum_height: f64,
    /// Morph interpolation parameter in [0, 1].
    pub morph_time: f64,
    pub projection: Projection,
}

impl FrameState {
    /// A 3D perspective frame looking straight down at the ellipsoid from a
    /// geodetic camera position.
    pub fn looking_down_3d(
        position: Cartographic,
        ellipsoid: Ellipsoid,
        fov_y: f64,
        viewport_width: u32,
        viewport_height: u32,
    ) -> Self {
        let eye = ellipsoid.cartographic_to_cartesian(&position);
        let mut up = DVec3::Z;
        if eye.cross(up).length_squared() < 1.0 {
            up = DVec3::Y;
        }
        let view_matrix = DMat4::look_at_rh(eye, DVec3::ZERO, up);
        let aspect = viewport_width as f64 / viewport_height as f64;
        let near = (position.height * 1e-3).max(1.0);
        let far = position.height + 2.0 * ellipsoid.maximum_radius();
        let projection_matrix = DMat4::perspective_rh(fov_y, aspect, near, far);
        let culling_volume = CullingVolume::from_view_projection(&(projection_matrix * view_matrix));
        Self {
            mode: SceneMode::Scene3D,
            frame_number: 0,
            camera_position: eye,
            camera_position_cartographic: position,
            view_matrix,
            projection_matrix,
            culling_volume,
            viewport_width,
            viewport_height,
            fov_y,
            frustum_width: 0.0,
            frustum_height: 0.0,
            morph_time: 1.0,
            projection: Projection::Geographic(ellipsoid),
        }
    }

    pub fn with_frame_number(mut self, frame_number: u64) -> Self {
        self.frame_number = frame_number;
        self
    }
}
