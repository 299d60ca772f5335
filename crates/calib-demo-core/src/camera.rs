//! Pinhole camera with Brown–Conrady (radial k1, k2, k3 + tangential p1, p2) distortion.

use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Focal lengths and principal point, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    /// `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    #[inline]
    pub fn normalize(&self, px: Point2<f64>) -> Vector2<f64> {
        Vector2::new((px.x - self.cx) / self.fx, (px.y - self.cy) / self.fy)
    }

    #[inline]
    pub fn denormalize(&self, n: Vector2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl BrownConrady5 {
    /// Coefficients in the conventional `(k1, k2, p1, p2, k3)` order.
    pub fn coefficients(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn from_coefficients(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    pub fn is_zero(&self) -> bool {
        self.coefficients().iter().all(|c| *c == 0.0)
    }

    /// Map an ideal normalized point to its distorted normalized position.
    #[inline]
    pub fn distort(&self, n: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Fixed-point inverse of [`Self::distort`].
    pub fn undistort(&self, n_dist: Vector2<f64>, iters: u32) -> Vector2<f64> {
        let mut n = n_dist;
        for _ in 0..iters.max(1) {
            let err = self.distort(n) - n_dist;
            n -= err;
        }
        n
    }
}

/// Rigid transform from board (object) coordinates into the camera frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn from_axis_angle(rvec: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation: Rotation3::from_scaled_axis(rvec),
            translation,
        }
    }

    pub fn axis_angle(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    #[inline]
    pub fn transform(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * p.coords + self.translation)
    }
}

/// Intrinsics plus lens distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    pub distortion: BrownConrady5,
}

impl CameraModel {
    pub fn new(intrinsics: Intrinsics, distortion: BrownConrady5) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project a camera-frame point; `None` when it is not in front of the camera.
    pub fn project(&self, p_cam: &Point3<f64>) -> Option<Point2<f64>> {
        if p_cam.z <= f64::EPSILON {
            return None;
        }
        let n = Vector2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        Some(self.intrinsics.denormalize(self.distortion.distort(n)))
    }

    /// Project a board point observed under `pose`.
    pub fn project_object(&self, pose: &Pose, p_obj: &Point3<f64>) -> Option<Point2<f64>> {
        self.project(&pose.transform(p_obj))
    }

    /// Source pixel that an ideal (undistorted) pixel samples from.
    #[inline]
    pub fn distort_pixel(&self, ideal: Point2<f64>) -> Point2<f64> {
        let n = self.intrinsics.normalize(ideal);
        self.intrinsics.denormalize(self.distortion.distort(n))
    }

    /// Ideal pixel of an observed (distorted) pixel.
    pub fn undistort_pixel(&self, observed: Point2<f64>) -> Point2<f64> {
        let n = self.intrinsics.normalize(observed);
        self.intrinsics.denormalize(self.distortion.undistort(n, 8))
    }
}

impl fmt::Display for CameraModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let k = self.intrinsics.matrix();
        writeln!(f, "camera matrix:")?;
        for r in 0..3 {
            writeln!(
                f,
                "  [{:>12.4} {:>12.4} {:>12.4}]",
                k[(r, 0)],
                k[(r, 1)],
                k[(r, 2)]
            )?;
        }
        writeln!(f, "distortion coefficients (k1, k2, p1, p2, k3):")?;
        let c = self.distortion.coefficients();
        write!(
            f,
            "  [{:.6} {:.6} {:.6} {:.6} {:.6}]",
            c[0], c[1], c[2], c[3], c[4]
        )
    }
}
