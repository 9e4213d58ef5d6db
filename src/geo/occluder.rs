//! Ellipsoidal horizon occlusion

use glam::DVec3;

use super::Ellipsoid;

/// Culls points hidden behind the horizon of an ellipsoid, working in the
/// scaled space where the ellipsoid is the unit sphere.
#[derive(Debug, Clone)]
pub struct EllipsoidalOccluder {
    ellipsoid: Ellipsoid,
    camera_position_in_scaled_space: DVec3,
    distance_to_limb_in_scaled_space_squared: f64,
}

impl EllipsoidalOccluder {
    pub fn new(ellipsoid: Ellipsoid) -> Self {
        Self {
            ellipsoid,
            camera_position_in_scaled_space: DVec3::ZERO,
            distance_to_limb_in_scaled_space_squared: -1.0,
        }
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    pub fn set_camera_position(&mut self, camera_position: DVec3) {
        let scaled = self
            .ellipsoid
            .transform_position_to_scaled_space(camera_position);
        self.camera_position_in_scaled_space = scaled;
        self.distance_to_limb_in_scaled_space_squared = scaled.length_squared() - 1.0;
    }

    /// Whether a point given in scaled space is on the near side of the
    /// horizon. A camera inside the ellipsoid sees everything.
    pub fn is_scaled_space_point_visible(&self, occludee: DVec3) -> bool {
        let cv = self.camera_position_in_scaled_space;
        let vh_magnitude_squared = self.distance_to_limb_in_scaled_space_squared;
        if vh_magnitude_squared < 0.0 {
            return true;
        }
        let vt = occludee - cv;
        let vt_dot_vc = -vt.dot(cv);
        let occluded = vt_dot_vc > vh_magnitude_squared
            && vt_dot_vc * vt_dot_vc / vt.length_squared() > vh_magnitude_squared;
        !occluded
    }

    /// A single point that is occluded exactly when every one of `positions`
    /// is occluded, on the ray from the ellipsoid center through
    /// `direction_to_point`. Returns `None` when no such point exists, e.g.
    /// for geometry spanning more than a hemisphere.
    pub fn compute_horizon_culling_point(
        &self,
        direction_to_point: DVec3,
        positions: &[DVec3],
    ) -> Option<DVec3> {
        let scaled = self
            .ellipsoid
            .transform_position_to_scaled_space(direction_to_point);
        if scaled.length_squared() == 0.0 {
            return None;
        }
        let scaled_space_direction = scaled.normalize();

        let mut result_magnitude = 0.0f64;
        for position in positions {
            let scaled_position = self
                .ellipsoid
                .transform_position_to_scaled_space(*position);
            let magnitude_squared = scaled_position.length_squared();
            if magnitude_squared < 1.0 {
                return None;
            }
            let magnitude = magnitude_squared.sqrt();
            let direction = scaled_position / magnitude;

            let cos_alpha = direction.dot(scaled_space_direction);
            let sin_alpha = direction.cross(scaled_space_direction).length();
            let cos_beta = 1.0 / magnitude;
            let sin_beta = (magnitude_squared - 1.0).sqrt() * cos_beta;

            let denominator = cos_alpha * cos_beta - sin_alpha * sin_beta;
            if denominator <= 0.0 {
                return None;
            }
            result_magnitude = result_magnitude.max(1.0 / denominator);
        }

        if result_magnitude <= 0.0 {
            return None;
        }
        Some(scaled_space_direction * result_magnitude)
    }
}
