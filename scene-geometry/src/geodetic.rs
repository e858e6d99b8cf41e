//! Geodetic conversion: WGS84 LLA <-> ECEF, and the lazily-derived
//! local-Cartesian-to-geodetic transform `trs_xyz_to_lla` (spec §4.7).
//!
//! Neither `mvg` nor `flydra-mvg` has a geodetic module (the teacher's cameras
//! live in an arbitrary local Cartesian frame, never geo-referenced), so this is
//! grounded on `examples/original_source/controller/src/controller/scene.py`'s
//! `_convertTRS`/LLA handling rather than on a teacher file.

use nalgebra::{Matrix4, Point3, Vector3};

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;

fn wgs84_e2() -> f64 {
    WGS84_F * (2.0 - WGS84_F)
}

/// Latitude/longitude/altitude in degrees/degrees/meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lla {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

/// Converts a geodetic coordinate to Earth-Centered-Earth-Fixed Cartesian meters.
pub fn lla_to_ecef(lla: Lla) -> Point3<f64> {
    let lat = lla.lat.to_radians();
    let lon = lla.lon.to_radians();
    let e2 = wgs84_e2();
    let n = WGS84_A / (1.0 - e2 * lat.sin().powi(2)).sqrt();
    let x = (n + lla.alt) * lat.cos() * lon.cos();
    let y = (n + lla.alt) * lat.cos() * lon.sin();
    let z = (n * (1.0 - e2) + lla.alt) * lat.sin();
    Point3::new(x, y, z)
}

/// Inverse of [`lla_to_ecef`] via Bowring's closed-form approximation, iterated
/// to convergence; sufficient precision for scene-scale (meter-level) data.
pub fn ecef_to_lla(ecef: Point3<f64>) -> Lla {
    let e2 = wgs84_e2();
    let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
    let lon = ecef.y.atan2(ecef.x);
    let mut lat = (ecef.z / (p * (1.0 - e2))).atan();
    for _ in 0..5 {
        let n = WGS84_A / (1.0 - e2 * lat.sin().powi(2)).sqrt();
        let alt = p / lat.cos() - n;
        lat = (ecef.z / (p * (1.0 - e2 * n / (n + alt)))).atan();
    }
    let n = WGS84_A / (1.0 - e2 * lat.sin().powi(2)).sqrt();
    let alt = p / lat.cos() - n;
    Lla { lat: lat.to_degrees(), lon: lon.to_degrees(), alt }
}

/// Four corners of the map mesh in local XY, ordered bottom-left,
/// counterclockwise, matching their `map_corners_lla` counterparts.
pub type MapCorners = [Point3<f64>; 4];
pub type MapCornersLla = [Lla; 4];

/// Derives the 4x4 affine transform from local scene-Cartesian coordinates to
/// ECEF meters by least-squares fitting the four known correspondences, so that
/// `trs_xyz_to_lla * local_point` lands on (approximately) the matching LLA
/// corner once converted back with [`ecef_to_lla`]. Both prerequisites
/// (`output_lla` and all four `map_corners_lla`) must be present; callers hold
/// that invariant (spec §3, §4.7, §8 invariant 5), this function just does the
/// arithmetic once they are.
pub fn trs_xyz_to_lla(local_corners: MapCorners, lla_corners: MapCornersLla) -> Matrix4<f64> {
    let ecef_corners: Vec<Point3<f64>> = lla_corners.iter().map(|&l| lla_to_ecef(l)).collect();

    // Build the centroid-relative least-squares rigid+scale fit (Umeyama-style,
    // without reflection handling since scene meshes are never mirrored).
    let local_centroid = centroid(&local_corners);
    let ecef_centroid = centroid(&ecef_corners);

    let mut cov = nalgebra::Matrix3::zeros();
    let mut local_var = 0.0;
    for i in 0..4 {
        let lp = local_corners[i] - local_centroid;
        let ep = ecef_corners[i] - ecef_centroid;
        cov += ep * lp.transpose();
        local_var += lp.norm_squared();
    }
    cov /= 4.0;
    local_var /= 4.0;

    let svd = cov.svd(true, true);
    let u = svd.u.unwrap();
    let v_t = svd.v_t.unwrap();
    let mut d = nalgebra::Matrix3::identity();
    if (u * v_t).determinant() < 0.0 {
        d[(2, 2)] = -1.0;
    }
    let r = u * d * v_t;
    let scale = svd.singular_values.iter().zip(d.diagonal().iter()).map(|(s, di)| s * di).sum::<f64>()
        / local_var.max(f64::EPSILON);
    let t = ecef_centroid.coords - scale * (r * local_centroid.coords);

    let mut m = Matrix4::identity();
    let rs = r * scale;
    for row in 0..3 {
        for col in 0..3 {
            m[(row, col)] = rs[(row, col)];
        }
        m[(row, 3)] = t[row];
    }
    m
}

fn centroid(pts: &[Point3<f64>; 4]) -> Point3<f64> {
    let sum: Vector3<f64> = pts.iter().map(|p| p.coords).sum();
    Point3::from(sum / 4.0)
}

/// Applies a 4x4 affine transform to a local point and converts the result to LLA.
pub fn apply_trs_xyz_to_lla(m: &Matrix4<f64>, local_pt: Point3<f64>) -> Lla {
    let h = m * local_pt.to_homogeneous();
    ecef_to_lla(Point3::new(h.x, h.y, h.z))
}
