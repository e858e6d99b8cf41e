//! Camera pose: intrinsics, 5-coefficient distortion, and a rigid extrinsic pose.
//!
//! Mirrors the `mvg::Camera` wrapper around `cam_geom::Camera<R, RosOpenCvIntrinsics<R>>`,
//! pared down to what scene ingest needs: undistorting detector bounding boxes and
//! testing scene locations against a camera's region-of-view.

use cam_geom::{ExtrinsicParameters, Pixels};
use nalgebra::{Point2, Point3, RealField, Vector5};
use opencv_ros_camera::{Distortion, RosOpenCvIntrinsics, UndistortedPixels};
use serde::{Deserialize, Serialize};

/// The five OpenCV radial/tangential distortion coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistortionCoeffs {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl DistortionCoeffs {
    pub fn zero() -> Self {
        Self { k1: 0.0, k2: 0.0, p1: 0.0, p2: 0.0, k3: 0.0 }
    }

    pub fn to_opencv(&self) -> Distortion<f64> {
        Distortion::from_opencv_vec(Vector5::new(self.k1, self.k2, self.p1, self.p2, self.k3))
    }

    /// Difference against another set, used by the cache manager's reconciliation
    /// of incoming `intrinsics`/`distortion` overrides (spec §4.2).
    pub fn differs_from(&self, other: &DistortionCoeffs) -> bool {
        self != other
    }
}

/// A rectangular pixel-space bounding box, `(x, y, width, height)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// A normalized-image-plane bounding box produced by undistortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Intrinsics + extrinsics + image size for one calibrated camera.
pub struct CameraPose<R: RealField + Copy = f64> {
    intrinsics: RosOpenCvIntrinsics<R>,
    extrinsics: ExtrinsicParameters<R>,
    width: usize,
    height: usize,
}

impl<R: RealField + Copy> CameraPose<R> {
    pub fn new(
        intrinsics: RosOpenCvIntrinsics<R>,
        extrinsics: ExtrinsicParameters<R>,
        width: usize,
        height: usize,
    ) -> Self {
        Self { intrinsics, extrinsics, width, height }
    }

    pub fn intrinsics(&self) -> &RosOpenCvIntrinsics<R> {
        &self.intrinsics
    }

    pub fn extrinsics(&self) -> &ExtrinsicParameters<R> {
        &self.extrinsics
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// `[2*cx, 2*cy]`, the resolution implied by the principal point, used by the
    /// cache manager when reconciling an intrinsics override (spec §4.2).
    pub fn implied_resolution(&self) -> [R; 2] {
        let p = &self.intrinsics.p;
        [p[(0, 2)] + p[(0, 2)], p[(1, 2)] + p[(1, 2)]]
    }
}

impl CameraPose<f64> {
    /// Pixel-to-meter-plane undistortion, the OpenCV `undistortPoints` contract
    /// from spec §4.6: undistort `(x,y)`, undistort `(x+w,y+h)`, and return the box
    /// spanned by the two undistorted corners.
    pub fn undistort_box(&self, px: PixelBox) -> PlaneBox {
        // Two-point batch: top-left and bottom-right corners of the box.
        use nalgebra::{OMatrix, U2};
        let data = OMatrix::<f64, U2, U2>::new(px.x, px.y, px.x + px.w, px.y + px.h);
        let pixels = Pixels::new(data);
        let undistorted: UndistortedPixels<f64, U2, _> = self.intrinsics.undistort(&pixels);
        let x1 = undistorted.data[(0, 0)];
        let y1 = undistorted.data[(0, 1)];
        let x2 = undistorted.data[(1, 0)];
        let y2 = undistorted.data[(1, 1)];
        PlaneBox { x: x1, y: y1, w: x2 - x1, h: y2 - y1 }
    }

    /// The inverse of [`undistort_box`], used only by the round-trip test in
    /// spec §8: redistort the two corners and recover the original pixel box.
    pub fn distort_box(&self, plane: PlaneBox) -> PixelBox {
        use nalgebra::{OMatrix, U2};
        let data = OMatrix::<f64, U2, U2>::new(plane.x, plane.y, plane.x + plane.w, plane.y + plane.h);
        let undistorted = UndistortedPixels { data };
        let distorted = self.intrinsics.distort(&undistorted);
        let x1 = distorted.data[(0, 0)];
        let y1 = distorted.data[(0, 1)];
        let x2 = distorted.data[(1, 0)];
        let y2 = distorted.data[(1, 1)];
        PixelBox { x: x1, y: y1, w: x2 - x1, h: y2 - y1 }
    }

    /// Project a 3D scene-frame point into this camera's distorted pixel space,
    /// used by `computeCameraBounds` (spec §4.6).
    pub fn project_3d_to_pixel(&self, pt: Point3<f64>) -> Point2<f64> {
        use cam_geom::Points;
        use nalgebra::{OMatrix, U1, U3};
        let world = Points::new(OMatrix::<f64, U1, U3>::new(pt.x, pt.y, pt.z));
        let cam_frame = self.extrinsics.world_to_camera(&world);
        let pixels = self.intrinsics.camera_to_pixel(&cam_frame);
        Point2::new(pixels.data[(0, 0)], pixels.data[(0, 1)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_geom::ExtrinsicParameters;
    use nalgebra::{Point3, UnitQuaternion};

    fn test_camera() -> CameraPose<f64> {
        let intrinsics = RosOpenCvIntrinsics::from_params(1000.0, 0.0, 1000.0, 320.0, 240.0);
        let extrinsics = ExtrinsicParameters::from_rotation_and_camcenter(
            UnitQuaternion::identity(),
            Point3::new(0.0, 0.0, 5.0),
        );
        CameraPose::new(intrinsics, extrinsics, 640, 480)
    }

    #[test]
    fn undistort_distort_round_trip() {
        let cam = test_camera();
        let px = PixelBox { x: 100.0, y: 120.0, w: 30.0, h: 40.0 };
        let plane = cam.undistort_box(px);
        let back = cam.distort_box(plane);
        approx::assert_relative_eq!(back.x, px.x, epsilon = 1e-6);
        approx::assert_relative_eq!(back.y, px.y, epsilon = 1e-6);
        approx::assert_relative_eq!(back.w, px.w, epsilon = 1e-6);
        approx::assert_relative_eq!(back.h, px.h, epsilon = 1e-6);
    }

    #[test]
    fn implied_resolution_matches_principal_point() {
        let cam = test_camera();
        let [w, h] = cam.implied_resolution();
        approx::assert_relative_eq!(w, 640.0);
        approx::assert_relative_eq!(h, 480.0);
    }

    #[test]
    fn distortion_equality() {
        let a = DistortionCoeffs::zero();
        let mut b = DistortionCoeffs::zero();
        assert!(!a.differs_from(&b));
        b.k1 = 0.01;
        assert!(a.differs_from(&b));
    }
}
