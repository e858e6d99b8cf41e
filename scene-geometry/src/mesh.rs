//! Volumetric region intersection (spec §4.3.6: "whose 3D mesh intersects the
//! region mesh when `region.compute_intersection` is true"). Tracked objects
//! here carry only a point location (the teacher's full 3D object mesh belongs
//! to the filtering math out of scope per `scene-tracking`'s module docs), so
//! this approximates both sides as axis-aligned boxes via `parry3d-f64` rather
//! than true triangle meshes.

use nalgebra::Point3;
use parry3d_f64::bounding_volume::Aabb;
use parry3d_f64::math::Point as PPoint;

use crate::polygon::Polygon;

/// An extruded-polygon bounding volume for one region (spec §3 `height`).
pub struct RegionMesh {
    aabb: Aabb,
}

impl RegionMesh {
    pub fn from_polygon(polygon: &Polygon, height: f64) -> Option<Self> {
        if polygon.vertices.is_empty() {
            return None;
        }
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for v in &polygon.vertices {
            min_x = min_x.min(v.x);
            max_x = max_x.max(v.x);
            min_y = min_y.min(v.y);
            max_y = max_y.max(v.y);
        }
        let aabb = Aabb::new(PPoint::new(min_x, min_y, 0.0), PPoint::new(max_x, max_y, height.max(0.0)));
        Some(Self { aabb })
    }

    /// A small cube centered on `loc`, standing in for the object's own mesh.
    pub fn object_aabb(loc: Point3<f64>, half_extent: f64) -> Aabb {
        Aabb::new(
            PPoint::new(loc.x - half_extent, loc.y - half_extent, loc.z - half_extent),
            PPoint::new(loc.x + half_extent, loc.y + half_extent, loc.z + half_extent),
        )
    }

    pub fn intersects(&self, object_aabb: &Aabb) -> bool {
        self.aabb.intersects(object_aabb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    #[test]
    fn object_inside_footprint_intersects() {
        let square = Polygon::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ]);
        let region = RegionMesh::from_polygon(&square, 2.0).unwrap();
        let inside = RegionMesh::object_aabb(Point3::new(5.0, 5.0, 1.0), 0.1);
        let outside = RegionMesh::object_aabb(Point3::new(50.0, 50.0, 1.0), 0.1);
        assert!(region.intersects(&inside));
        assert!(!region.intersects(&outside));
    }
}
