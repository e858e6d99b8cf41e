//! 2D region/tripwire geometry: point-in-polygon occupancy tests and tripwire
//! crossing-direction tests, ported from `scene.py`'s region/tripwire helpers.
//! `mvg`/`flydra-mvg` have no polygon code of their own (they are about camera
//! calibration, not scene analytics), so this module is grounded directly on the
//! original Python source rather than on a teacher file.

use nalgebra::Point2;

/// A closed 2D polygon, vertices in order (winding direction is not assumed).
#[derive(Debug, Clone)]
pub struct Polygon {
    pub vertices: Vec<Point2<f64>>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point2<f64>>) -> Self {
        Self { vertices }
    }

    /// Standard ray-casting point-in-polygon test.
    pub fn contains(&self, pt: Point2<f64>) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let vi = self.vertices[i];
            let vj = self.vertices[j];
            let intersects = (vi.y > pt.y) != (vj.y > pt.y)
                && pt.x < (vj.x - vi.x) * (pt.y - vi.y) / (vj.y - vi.y) + vi.x;
            if intersects {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// A directed line segment, `start -> end`.
#[derive(Debug, Clone, Copy)]
pub struct Tripwire {
    pub start: Point2<f64>,
    pub end: Point2<f64>,
}

/// Signed area (2x) of the triangle `(a, b, c)`; used both as the segment-crossing
/// test and as the `d` term referenced by spec §8 scenario 3.
fn signed_cross(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn segments_intersect(p1: Point2<f64>, p2: Point2<f64>, p3: Point2<f64>, p4: Point2<f64>) -> bool {
    let d1 = signed_cross(p3, p4, p1);
    let d2 = signed_cross(p3, p4, p2);
    let d3 = signed_cross(p1, p2, p3);
    let d4 = signed_cross(p1, p2, p4);
    ((d1 > 0.0) != (d2 > 0.0)) && ((d3 > 0.0) != (d4 > 0.0))
}

impl Tripwire {
    pub fn new(start: Point2<f64>, end: Point2<f64>) -> Self {
        Self { start, end }
    }

    /// Tests the most recent object displacement (`from -> to`) against this
    /// tripwire. Returns `None` if the segments do not cross; otherwise the
    /// crossing direction, sign-inverted per spec §4.3.6 ("reported with sign
    /// inverted"): `+1`, `-1` depending on which side of the tripwire the object
    /// approached from.
    pub fn crossing_direction(&self, from: Point2<f64>, to: Point2<f64>) -> Option<i8> {
        if !segments_intersect(self.start, self.end, from, to) {
            return None;
        }
        let d = signed_cross(self.start, self.end, to);
        Some(if d > 0.0 { -1 } else { 1 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_contains_center_not_corner_exterior() {
        let square = Polygon::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ]);
        assert!(square.contains(Point2::new(5.0, 5.0)));
        assert!(!square.contains(Point2::new(15.0, 5.0)));
    }

    #[test]
    fn tripwire_crossing_direction_is_sign_inverted() {
        let wire = Tripwire::new(Point2::new(5.0, 0.0), Point2::new(5.0, 10.0));
        // object moves left-to-right through x=5
        let d = wire.crossing_direction(Point2::new(3.0, 5.0), Point2::new(7.0, 5.0));
        assert!(d.is_some());
        // moving the other direction flips the sign
        let d2 = wire.crossing_direction(Point2::new(7.0, 5.0), Point2::new(3.0, 5.0));
        assert_eq!(d.map(|x| -x), d2);
    }

    #[test]
    fn no_crossing_when_segment_does_not_reach_wire() {
        let wire = Tripwire::new(Point2::new(5.0, 0.0), Point2::new(5.0, 10.0));
        let d = wire.crossing_direction(Point2::new(1.0, 5.0), Point2::new(2.0, 5.0));
        assert!(d.is_none());
    }
}
