//! Bounding spheres and frustum culling volumes

use glam::{DMat4, DVec3, DVec4};

use super::{Ellipsoid, Projection, Rectangle};

/// Result of a bounding-volume/frustum test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intersect {
    Outside,
    Intersecting,
    Inside,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Tight-enough sphere around a point set: centroid center, maximum
    /// distance radius. Returns a degenerate sphere for an empty set.
    pub fn from_points(points: &[DVec3]) -> Self {
        if points.is_empty() {
            return Self::new(DVec3::ZERO, 0.0);
        }
        let mut center = DVec3::ZERO;
        for p in points {
            center += *p;
        }
        center /= points.len() as f64;
        let mut radius_squared = 0.0f64;
        for p in points {
            radius_squared = radius_squared.max(center.distance_squared(*p));
        }
        Self::new(center, radius_squared.sqrt())
    }

    /// Sphere around a geographic rectangle draped on the ellipsoid, sampled
    /// at the corners, edge midpoints and center at both height extremes.
    pub fn from_rectangle_3d(
        rectangle: &Rectangle,
        ellipsoid: &Ellipsoid,
        minimum_height: f64,
        maximum_height: f64,
    ) -> Self {
        let lons = [
            rectangle.west,
            (rectangle.west + rectangle.east) * 0.5,
            rectangle.east,
        ];
        let lats = [
            rectangle.south,
            (rectangle.south + rectangle.north) * 0.5,
            rectangle.north,
        ];
        let mut points = Vec::with_capacity(18);
        for &height in &[minimum_height, maximum_height] {
            for &lon in &lons {
                for &lat in &lats {
                    points.push(ellipsoid.cartographic_to_cartesian(
                        &super::Cartographic::new(lon, lat, height),
                    ));
                }
            }
        }
        Self::from_points(&points)
    }

    /// Sphere around the projected rectangle, for the 2D and Columbus-view
    /// scene modes. Lies in the z = 0 plane.
    pub fn from_rectangle_2d(rectangle: &Rectangle, projection: &Projection) -> Self {
        let sw = projection.project(&rectangle.southwest());
        let ne = projection.project(&rectangle.northeast());
        let center = (sw + ne) * 0.5;
        Self::new(center, center.distance(ne))
    }

    /// Smallest sphere containing both `self` and `other`.
    pub fn union(&self, other: &BoundingSphere) -> BoundingSphere {
        let to_other = other.center - self.center;
        let distance = to_other.length();
        if distance + other.radius <= self.radius {
            return *self;
        }
        if distance + self.radius <= other.radius {
            return *other;
        }
        let radius = (self.radius + distance + other.radius) * 0.5;
        let center = if distance > 0.0 {
            self.center + to_other * ((radius - self.radius) / distance)
        } else {
            self.center
        };
        BoundingSphere::new(center, radius)
    }
}

/// A convex volume bounded by planes with inward-facing normals, stored as
/// `(nx, ny, nz, d)` with `n . p + d >= 0` inside.
#[derive(Debug, Clone, PartialEq)]
pub struct CullingVolume {
    planes: Vec<DVec4>,
}

impl CullingVolume {
    pub fn new(planes: Vec<DVec4>) -> Self {
        Self { planes }
    }

    /// A volume that considers everything visible.
    pub fn everything() -> Self {
        Self { planes: Vec::new() }
    }

    /// Extract the six frustum planes from a view-projection matrix with
    /// depth in [0, 1].
    pub fn from_view_projection(view_projection: &DMat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);
        let planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r2,      // near
            r3 - r2, // far
        ];
        Self {
            planes: planes
                .iter()
                .map(|p| {
                    let inv_len = 1.0 / DVec3::new(p.x, p.y, p.z).length();
                    *p * inv_len
                })
                .collect(),
        }
    }

    pub fn visibility(&self, sphere: &BoundingSphere) -> Intersect {
        let mut intersecting = false;
        for plane in &self.planes {
            let distance = DVec3::new(plane.x, plane.y, plane.z).dot(sphere.center) + plane.w;
            if distance < -sphere.radius {
                return Intersect::Outside;
            }
            if distance < sphere.radius {
                intersecting = true;
            }
        }
        if intersecting {
            Intersect::Intersecting
        } else {
            Intersect::Inside
        }
    }
}
