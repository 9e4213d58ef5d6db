//! Reference ellipsoid math

use glam::DVec3;

/// Geodetic position in radians and meters above the ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cartographic {
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
}

impl Cartographic {
    pub fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            height,
        }
    }

    pub fn from_degrees(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude: longitude.to_radians(),
            latitude: latitude.to_radians(),
            height,
        }
    }
}

/// An ellipsoid of revolution centered at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    radii: DVec3,
    radii_squared: DVec3,
    one_over_radii: DVec3,
}

impl Ellipsoid {
    /// WGS84 reference ellipsoid.
    pub const WGS84: Ellipsoid = Ellipsoid::new(6378137.0, 6378137.0, 6356752.3142451793);

    /// Unit sphere, convenient for tests.
    pub const UNIT_SPHERE: Ellipsoid = Ellipsoid::new(1.0, 1.0, 1.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            radii: DVec3::new(x, y, z),
            radii_squared: DVec3::new(x * x, y * y, z * z),
            one_over_radii: DVec3::new(1.0 / x, 1.0 / y, 1.0 / z),
        }
    }

    pub fn radii(&self) -> DVec3 {
        self.radii
    }

    pub fn maximum_radius(&self) -> f64 {
        self.radii.x.max(self.radii.y).max(self.radii.z)
    }

    pub fn minimum_radius(&self) -> f64 {
        self.radii.x.min(self.radii.y).min(self.radii.z)
    }

    /// Unit normal of the ellipsoid surface at a geodetic position.
    pub fn geodetic_surface_normal_cartographic(&self, position: &Cartographic) -> DVec3 {
        let cos_latitude = position.latitude.cos();
        DVec3::new(
            cos_latitude * position.longitude.cos(),
            cos_latitude * position.longitude.sin(),
            position.latitude.sin(),
        )
    }

    /// Unit normal of the ellipsoid surface at a cartesian position.
    pub fn geodetic_surface_normal(&self, position: DVec3) -> DVec3 {
        (position * self.one_over_radii * self.one_over_radii).normalize()
    }

    /// Convert a geodetic position to a cartesian one.
    pub fn cartographic_to_cartesian(&self, position: &Cartographic) -> DVec3 {
        let n = self.geodetic_surface_normal_cartographic(position);
        let mut k = self.radii_squared * n;
        let gamma = n.dot(k).sqrt();
        k /= gamma;
        k + n * position.height
    }

    /// Scale a world position into the unit-sphere space used by the
    /// ellipsoidal occluder.
    pub fn transform_position_to_scaled_space(&self, position: DVec3) -> DVec3 {
        position * self.one_over_radii
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cartographic_to_cartesian_on_equator() {
        let p = Ellipsoid::WGS84
            .cartographic_to_cartesian(&Cartographic::from_degrees(0.0, 0.0, 0.0));
        assert!((p.x - 6378137.0).abs() < 1e-6);
        assert!(p.y.abs() < 1e-6);
        assert!(p.z.abs() < 1e-6);
    }

    #[test]
    fn test_cartographic_to_cartesian_at_pole() {
        let p = Ellipsoid::WGS84
            .cartographic_to_cartesian(&Cartographic::from_degrees(0.0, 90.0, 0.0));
        assert!(p.x.abs() < 1e-6);
        assert!((p.z - 6356752.3142451793).abs() < 1e-6);
    }

    #[test]
    fn test_height_extends_along_normal() {
        let surface = Ellipsoid::WGS84
            .cartographic_to_cartesian(&Cartographic::from_degrees(0.0, 0.0, 0.0));
        let raised = Ellipsoid::WGS84
            .cartographic_to_cartesian(&Cartographic::from_degrees(0.0, 0.0, 1000.0));
        assert!((raised.length() - surface.length() - 1000.0).abs() < 1e-6);
    }
}
