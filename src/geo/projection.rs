//! Map projections for the 2D and Columbus-view scene modes

use glam::DVec3;

use super::{Cartographic, Ellipsoid};

/// Northern limit of the Web Mercator projection, ~85.05113 degrees.
pub const WEB_MERCATOR_MAX_LATITUDE: f64 = 1.4844222297453324;

/// Projection from geodetic coordinates onto a plane. Projected coordinates
/// are meters: x east, y north, z height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Geographic(Ellipsoid),
    WebMercator(Ellipsoid),
}

impl Projection {
    pub fn ellipsoid(&self) -> &Ellipsoid {
        match self {
            Projection::Geographic(e) | Projection::WebMercator(e) => e,
        }
    }

    pub fn project(&self, position: &Cartographic) -> DVec3 {
        match self {
            Projection::Geographic(e) => {
                let r = e.maximum_radius();
                DVec3::new(position.longitude * r, position.latitude * r, position.height)
            }
            Projection::WebMercator(e) => {
                let r = e.maximum_radius();
                DVec3::new(
                    position.longitude * r,
                    geodetic_latitude_to_mercator_angle(position.latitude) * r,
                    position.height,
                )
            }
        }
    }

    pub fn unproject(&self, position: DVec3) -> Cartographic {
        match self {
            Projection::Geographic(e) => {
                let r = e.maximum_radius();
                Cartographic::new(position.x / r, position.y / r, position.z)
            }
            Projection::WebMercator(e) => {
                let r = e.maximum_radius();
                Cartographic::new(
                    position.x / r,
                    mercator_angle_to_geodetic_latitude(position.y / r),
                    position.z,
                )
            }
        }
    }

    pub fn is_mercator(&self) -> bool {
        matches!(self, Projection::WebMercator(_))
    }
}

/// Mercator angle of a geodetic latitude, clamped to the projection's
/// latitude limit.
pub fn geodetic_latitude_to_mercator_angle(latitude: f64) -> f64 {
    let latitude = latitude.clamp(-WEB_MERCATOR_MAX_LATITUDE, WEB_MERCATOR_MAX_LATITUDE);
    let sin_latitude = latitude.sin();
    0.5 * ((1.0 + sin_latitude) / (1.0 - sin_latitude)).ln()
}

pub fn mercator_angle_to_geodetic_latitude(mercator_angle: f64) -> f64 {
    std::f64::consts::FRAC_PI_2 - 2.0 * (-mercator_angle).exp().atan()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mercator_angle_round_trip() {
        for &lat in &[-1.2, -0.5, 0.0, 0.7, 1.3] {
            let angle = geodetic_latitude_to_mercator_angle(lat);
            assert!((mercator_angle_to_geodetic_latitude(angle) - lat).abs() < 1e-12);
        }
    }

    #[test]
    fn test_mercator_angle_clamps_at_limit() {
        let at_limit = geodetic_latitude_to_mercator_angle(WEB_MERCATOR_MAX_LATITUDE);
        let beyond = geodetic_latitude_to_mercator_angle(1.5);
        assert_eq!(at_limit, beyond);
    }

    #[test]
    fn test_geographic_project_round_trip() {
        let projection = Projection::Geographic(Ellipsoid::WGS84);
        let c = Cartographic::from_degrees(45.0, -30.0, 250.0);
        let p = projection.project(&c);
        let back = projection.unproject(p);
        assert!((back.longitude - c.longitude).abs() < 1e-12);
        assert!((back.latitude - c.latitude).abs() < 1e-12);
        assert!((back.height - c.height).abs() < 1e-9);
    }
}
