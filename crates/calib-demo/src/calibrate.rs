//! Single-view intrinsic calibration: homography initialisation followed by
//! Levenberg–Marquardt refinement of intrinsics, distortion and pose.

use crate::core::{
    estimate_homography, BrownConrady5, CameraModel, CornerSet, Homography, Intrinsics,
    ObjectPointSet, Pose,
};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::{debug, info, warn};
use nalgebra::{
    storage::Owned, DMatrix, DVector, Dyn, Matrix2, Matrix3, Point2, Rotation3, Vector2, Vector3,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Which parts of the camera model are held fixed during refinement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    /// Keep `(cx, cy)` at the image centre.
    pub fix_principal_point: bool,
    /// Keep `fx == fy`.
    pub fix_aspect_ratio: bool,
    /// Force `p1 = p2 = 0`.
    pub zero_tangent_dist: bool,
    /// Force `k3 = 0`.
    pub fix_k3: bool,
    /// Optimizer patience; residual evaluations are capped at
    /// `max_iters * (free parameters + 1)`.
    pub max_iters: usize,
    /// Fits with a larger RMS reprojection error are reported as failures.
    pub max_rms_px: f64,
    /// Relative cost decrease below which the refinement stops.
    pub ftol: f64,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            fix_principal_point: false,
            fix_aspect_ratio: false,
            zero_tangent_dist: false,
            fix_k3: false,
            max_iters: 100,
            max_rms_px: 5.0,
            ftol: 1e-12,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("too few points ({found}, need at least {required})")]
    TooFewPoints { found: usize, required: usize },
    #[error("object/image point count mismatch ({object} vs {image})")]
    MismatchedLengths { object: usize, image: usize },
    #[error("exactly one view is supported (got {0})")]
    UnsupportedViewCount(usize),
    #[error("board-to-image homography estimation failed")]
    Homography,
    #[error("calibration produced non-finite parameters")]
    NonFinite,
    #[error("calibration produced a non-positive focal length")]
    DegenerateFocal,
    #[error("reprojection RMS {rms_px:.3} px exceeds {max_rms_px:.3} px")]
    NotConverged { rms_px: f64, max_rms_px: f64 },
}

/// Result of a successful fit.
#[derive(Clone, Debug)]
pub struct Calibration {
    pub model: CameraModel,
    /// Board pose in the camera frame.
    pub pose: Pose,
    /// RMS reprojection error over all corners, in pixels.
    pub rms_px: f64,
    /// Residual evaluations spent by the optimizer.
    pub iterations: usize,
    /// Whether the optimizer stopped on a tolerance rather than giving up.
    pub converged: bool,
}

// Parameter vector layout.
const FX: usize = 0;
const FY: usize = 1;
const CX: usize = 2;
const CY: usize = 3;
const K1: usize = 4;
const K2: usize = 5;
const P1: usize = 6;
const P2: usize = 7;
const K3: usize = 8;
const RVEC: usize = 9;
const TVEC: usize = 12;
const NUM_PARAMS: usize = 15;

/// Calibrate a camera from a single view of a planar board.
///
/// `objects` and `images` are per-view point sets; only one view is
/// supported. `image_size` is `(width, height)` in pixels.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(objects, images, opts),
        fields(width = image_size.0, height = image_size.1)
    )
)]
pub fn calibrate(
    objects: &[ObjectPointSet],
    images: &[CornerSet],
    image_size: (u32, u32),
    opts: &CalibrationOptions,
) -> Result<Calibration, CalibrationError> {
    if objects.len() != 1 || images.len() != 1 {
        return Err(CalibrationError::UnsupportedViewCount(
            objects.len().max(images.len()),
        ));
    }
    let (obj, img) = (&objects[0], &images[0]);
    if obj.len() != img.len() {
        return Err(CalibrationError::MismatchedLengths {
            object: obj.len(),
            image: img.len(),
        });
    }

    let free = free_mask(opts);
    let num_free = free.iter().filter(|f| **f).count();
    let required = 4usize.max(num_free.div_ceil(2));
    if obj.len() < required {
        return Err(CalibrationError::TooFewPoints {
            found: obj.len(),
            required,
        });
    }

    warn!(
        "single planar view: the {}-parameter model is under-determined, treat the fit as approximate",
        num_free
    );

    let plane: Vec<Point2<f64>> = obj.points().iter().map(|p| Point2::new(p.x, p.y)).collect();
    let h = estimate_homography(&plane, img.points()).ok_or(CalibrationError::Homography)?;

    let (w, hgt) = (image_size.0 as f64, image_size.1 as f64);
    let (cx, cy) = ((w - 1.0).max(0.0) * 0.5, (hgt - 1.0).max(0.0) * 0.5);
    let (mut fx, mut fy) = init_focal(&h, cx, cy, w, hgt);
    if opts.fix_aspect_ratio {
        let f = (fx * fy).sqrt();
        fx = f;
        fy = f;
    }
    let intrinsics = Intrinsics { fx, fy, cx, cy };
    let pose = pose_from_homography(&h, &intrinsics).ok_or(CalibrationError::Homography)?;
    debug!("initial intrinsics {intrinsics:?}, t = {:?}", pose.translation);

    let mut x0 = DVector::zeros(NUM_PARAMS);
    x0[FX] = fx;
    x0[FY] = fy;
    x0[CX] = cx;
    x0[CY] = cy;
    x0.fixed_rows_mut::<3>(RVEC).copy_from(&pose.axis_angle());
    x0.fixed_rows_mut::<3>(TVEC).copy_from(&pose.translation);

    let problem = SingleViewProblem {
        objects: obj,
        images: img,
        full: x0,
        free: free
            .iter()
            .enumerate()
            .filter_map(|(i, &f)| f.then_some(i))
            .collect(),
        fix_aspect: opts.fix_aspect_ratio,
    };
    let initial = problem.residuals().ok_or(CalibrationError::NonFinite)?;
    debug!(
        "initial rms {:.4} px",
        (initial.norm_squared() / obj.len() as f64).sqrt()
    );

    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.ftol)
        .with_patience(opts.max_iters.max(1));
    let (problem, report) = lm.minimize(problem);
    debug!("levenberg-marquardt stopped: {:?}", report.termination);

    let params = problem.full;
    if params.iter().any(|v| !v.is_finite()) {
        return Err(CalibrationError::NonFinite);
    }
    let (model, pose) = unpack(&params, opts.fix_aspect_ratio);
    if model.intrinsics.fx <= 0.0 || model.intrinsics.fy <= 0.0 {
        return Err(CalibrationError::DegenerateFocal);
    }

    let rms_px = reprojection_rms(&model, &pose, obj, img).ok_or(CalibrationError::NonFinite)?;
    let converged = report.termination.was_successful();
    info!(
        "calibration: rms {:.4} px after {} evaluations (converged: {converged})",
        rms_px, report.number_of_evaluations
    );
    if rms_px > opts.max_rms_px {
        return Err(CalibrationError::NotConverged {
            rms_px,
            max_rms_px: opts.max_rms_px,
        });
    }

    Ok(Calibration {
        model,
        pose,
        rms_px,
        iterations: report.number_of_evaluations,
        converged,
    })
}

/// RMS distance between observed corners and the projection of the board.
pub fn reprojection_rms(
    model: &CameraModel,
    pose: &Pose,
    objects: &ObjectPointSet,
    images: &CornerSet,
) -> Option<f64> {
    if objects.is_empty() || objects.len() != images.len() {
        return None;
    }
    let mut sum = 0.0;
    for (p, q) in objects.points().iter().zip(images.points()) {
        sum += (model.project_object(pose, p)? - *q).norm_squared();
    }
    Some((sum / objects.len() as f64).sqrt())
}

/// Residual offset for a corner that projects behind the camera. Trial steps
/// that produce one are rejected by the optimizer.
const BEHIND_CAMERA_RESIDUAL: f64 = 1e6;

/// Reprojection residuals of one view over the free entries of the
/// parameter vector; fixed entries stay at their values in `full`.
struct SingleViewProblem<'a> {
    objects: &'a ObjectPointSet,
    images: &'a CornerSet,
    full: DVector<f64>,
    free: Vec<usize>,
    fix_aspect: bool,
}

impl SingleViewProblem<'_> {
    fn residuals_at(&self, full: &DVector<f64>) -> DVector<f64> {
        let (model, pose) = unpack(full, self.fix_aspect);
        let mut r = DVector::zeros(2 * self.objects.len());
        for (k, (p, q)) in self
            .objects
            .points()
            .iter()
            .zip(self.images.points())
            .enumerate()
        {
            let (dx, dy) = match model.project_object(&pose, p) {
                Some(proj) => (proj.x - q.x, proj.y - q.y),
                None => (BEHIND_CAMERA_RESIDUAL, BEHIND_CAMERA_RESIDUAL),
            };
            r[2 * k] = dx;
            r[2 * k + 1] = dy;
        }
        r
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for SingleViewProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        for (k, &i) in self.free.iter().enumerate() {
            self.full[i] = x[k];
        }
    }

    fn params(&self) -> DVector<f64> {
        DVector::from_iterator(self.free.len(), self.free.iter().map(|&i| self.full[i]))
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let r = self.residuals_at(&self.full);
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    /// Central differences, one column per free parameter.
    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let mut jac = DMatrix::zeros(2 * self.objects.len(), self.free.len());
        let mut x = self.full.clone();
        for (col, &i) in self.free.iter().enumerate() {
            let x0 = self.full[i];
            let h = 1e-6 * x0.abs().max(1.0);
            x[i] = x0 + h;
            let plus = self.residuals_at(&x);
            x[i] = x0 - h;
            let minus = self.residuals_at(&x);
            x[i] = x0;
            jac.set_column(col, &((plus - minus) / (2.0 * h)));
        }
        jac.iter().all(|v| v.is_finite()).then_some(jac)
    }
}

fn free_mask(opts: &CalibrationOptions) -> [bool; NUM_PARAMS] {
    let mut free = [true; NUM_PARAMS];
    if opts.fix_aspect_ratio {
        free[FY] = false;
    }
    if opts.fix_principal_point {
        free[CX] = false;
        free[CY] = false;
    }
    if opts.zero_tangent_dist {
        free[P1] = false;
        free[P2] = false;
    }
    if opts.fix_k3 {
        free[K3] = false;
    }
    free
}

fn unpack(x: &DVector<f64>, fix_aspect: bool) -> (CameraModel, Pose) {
    let fx = x[FX];
    let fy = if fix_aspect { fx } else { x[FY] };
    let intrinsics = Intrinsics {
        fx,
        fy,
        cx: x[CX],
        cy: x[CY],
    };
    let distortion = BrownConrady5::from_coefficients([
        x[K1],
        x[K2],
        x[P1],
        x[P2],
        x[K3],
    ]);
    let pose = Pose::from_axis_angle(
        x.fixed_rows::<3>(RVEC).into_owned(),
        x.fixed_rows::<3>(TVEC).into_owned(),
    );
    (CameraModel::new(intrinsics, distortion), pose)
}

/// Focal lengths from the two orthogonality constraints of `H`, with the
/// principal point fixed at `(cx, cy)`.
fn init_focal(h: &Homography, cx: f64, cy: f64, w: f64, hgt: f64) -> (f64, f64) {
    let fallback = w.max(hgt).max(1.0);
    let plausible = |f: f64| f.is_finite() && f > 0.0 && f < 100.0 * fallback;

    let shift = Matrix3::new(
        1.0, 0.0, -cx, //
        0.0, 1.0, -cy, //
        0.0, 0.0, 1.0,
    );
    let hc = shift * h.h;
    let (a0, a1, a2) = (hc[(0, 0)], hc[(1, 0)], hc[(2, 0)]);
    let (b0, b1, b2) = (hc[(0, 1)], hc[(1, 1)], hc[(2, 1)]);

    // h1' W h2 = 0 and h1' W h1 = h2' W h2 with W = diag(1/fx^2, 1/fy^2, 1).
    let m = Matrix2::new(
        a0 * b0,
        a1 * b1, //
        a0 * a0 - b0 * b0,
        a1 * a1 - b1 * b1,
    );
    let rhs = Vector2::new(-a2 * b2, -(a2 * a2 - b2 * b2));

    if let Some(sol) = m.lu().solve(&rhs) {
        let (fx, fy) = (1.0 / sol.x.sqrt(), 1.0 / sol.y.sqrt());
        if sol.x > 0.0 && sol.y > 0.0 && plausible(fx) && plausible(fy) {
            debug!("focal init from homography: fx={fx:.2} fy={fy:.2}");
            return (fx, fy);
        }
    }

    // Square pixels: least squares for the single unknown 1/f^2.
    let c = Vector2::new(a0 * b0 + a1 * b1, a0 * a0 - b0 * b0 + a1 * a1 - b1 * b1);
    let denom = c.norm_squared();
    if denom > 0.0 {
        let inv_f2 = c.dot(&rhs) / denom;
        let f = 1.0 / inv_f2.sqrt();
        if inv_f2 > 0.0 && plausible(f) {
            debug!("focal init with square pixels: f={f:.2}");
            return (f, f);
        }
    }

    warn!("focal length not observable from this view, starting from f = {fallback}");
    (fallback, fallback)
}

/// Board pose from `K^-1 H = s [r1 r2 t]`, with the board in front of the camera.
fn pose_from_homography(h: &Homography, k: &Intrinsics) -> Option<Pose> {
    let k_inv = k.matrix().try_inverse()?;
    let m = k_inv * h.h;
    let c0: Vector3<f64> = m.column(0).into_owned();
    let c1: Vector3<f64> = m.column(1).into_owned();
    let c2: Vector3<f64> = m.column(2).into_owned();

    let norm = 0.5 * (c0.norm() + c1.norm());
    if norm.is_nan() || norm <= f64::EPSILON {
        return None;
    }
    let mut scale = 1.0 / norm;
    if c2.z * scale < 0.0 {
        scale = -scale;
    }

    let r1 = c0 * scale;
    let r2 = c1 * scale;
    let r3 = r1.cross(&r2);
    let t = c2 * scale;

    let approx = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = approx.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed.column_mut(2).neg_mut();
        r = u_fixed * v_t;
    }

    Some(Pose {
        rotation: Rotation3::from_matrix_unchecked(r),
        translation: t,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PatternSize;
    use crate::object_points::object_points;
    use approx::assert_abs_diff_eq;
    use nalgebra::Point3;

    fn truth() -> CameraModel {
        CameraModel::new(
            Intrinsics {
                fx: 820.0,
                fy: 810.0,
                cx: 319.5,
                cy: 239.5,
            },
            BrownConrady5::default(),
        )
    }

    fn tilted_pose() -> Pose {
        Pose::from_axis_angle(Vector3::new(0.35, -0.3, 0.1), Vector3::new(-4.0, -2.5, 16.0))
    }

    fn observe(model: &CameraModel, pose: &Pose, obj: &ObjectPointSet) -> CornerSet {
        let pts = obj
            .points()
            .iter()
            .map(|p| model.project_object(pose, p).expect("in front"))
            .collect();
        CornerSet::new(obj.pattern(), pts).expect("corner count")
    }

    /// Checkerboard-patterned offsets of `amp` px, which no smooth lens
    /// model absorbs.
    fn jitter(img: &CornerSet, amp: f64) -> CornerSet {
        let cols = img.pattern().cols() as usize;
        let pts = img
            .points()
            .iter()
            .enumerate()
            .map(|(k, p)| {
                let s = if (k + k / cols) % 2 == 0 { amp } else { -amp };
                Point2::new(p.x + s, p.y - s)
            })
            .collect();
        CornerSet::new(img.pattern(), pts).expect("corner count")
    }

    #[test]
    fn recovers_intrinsics_with_fixed_principal_point() {
        let pattern = PatternSize::new(9, 6).expect("pattern");
        let obj = object_points(pattern);
        let img = observe(&truth(), &tilted_pose(), &obj);

        let opts = CalibrationOptions {
            fix_principal_point: true,
            zero_tangent_dist: true,
            fix_k3: true,
            ..CalibrationOptions::default()
        };
        let calib = calibrate(&[obj.clone()], &[img.clone()], (640, 480), &opts).expect("calibrated");

        assert!(calib.rms_px < 1e-3, "rms {}", calib.rms_px);
        assert_abs_diff_eq!(calib.model.intrinsics.cx, 319.5, epsilon = 1e-9);
        assert_abs_diff_eq!(calib.model.intrinsics.fx, 820.0, epsilon = 1.0);
        assert_abs_diff_eq!(calib.model.intrinsics.fy, 810.0, epsilon = 1.0);
        assert!(calib.pose.translation.z > 0.0);
    }

    #[test]
    fn full_model_reproduces_corners() {
        let pattern = PatternSize::new(9, 6).expect("pattern");
        let obj = object_points(pattern);
        let img = observe(&truth(), &tilted_pose(), &obj);

        let calib = calibrate(
            &[obj.clone()],
            &[img.clone()],
            (640, 480),
            &CalibrationOptions::default(),
        )
        .expect("calibrated");

        assert!(calib.rms_px < 0.05, "rms {}", calib.rms_px);
        let rms = reprojection_rms(&calib.model, &calib.pose, &obj, &img).expect("rms");
        assert_abs_diff_eq!(rms, calib.rms_px, epsilon = 1e-9);
        // Principal point stays near the centre it started from.
        assert!((calib.model.intrinsics.cx - 319.5).abs() < 80.0);
        assert!((calib.model.intrinsics.cy - 239.5).abs() < 80.0);
    }

    #[test]
    fn initial_pose_places_board_in_front() {
        let model = truth();
        let pose = tilted_pose();
        let pattern = PatternSize::new(5, 4).expect("pattern");
        let obj = object_points(pattern);
        let img = observe(&model, &pose, &obj);
        let plane: Vec<_> = obj.points().iter().map(|p| Point2::new(p.x, p.y)).collect();
        let h = estimate_homography(&plane, img.points()).expect("homography");

        let est = pose_from_homography(&h, &model.intrinsics).expect("pose");
        assert!((est.translation - pose.translation).norm() < 1e-6);
        assert!(est.rotation.angle_to(&pose.rotation) < 1e-6);
        let p = est.transform(&Point3::new(2.0, 1.0, 0.0));
        assert!(p.z > 0.0);
    }

    #[test]
    fn fronto_parallel_view_uses_fallback_focal() {
        let pose = Pose::from_axis_angle(Vector3::zeros(), Vector3::new(-4.0, -2.5, 12.0));
        let pattern = PatternSize::new(9, 6).expect("pattern");
        let obj = object_points(pattern);
        let img = observe(&truth(), &pose, &obj);
        let plane: Vec<_> = obj.points().iter().map(|p| Point2::new(p.x, p.y)).collect();
        let h = estimate_homography(&plane, img.points()).expect("homography");

        let (fx, fy) = init_focal(&h, 319.5, 239.5, 640.0, 480.0);
        assert_eq!((fx, fy), (640.0, 640.0));
    }

    #[test]
    fn rejects_invalid_inputs() {
        let pattern = PatternSize::new(9, 6).expect("pattern");
        let obj = object_points(pattern);
        let img = observe(&truth(), &tilted_pose(), &obj);
        let opts = CalibrationOptions::default();

        assert_eq!(
            calibrate(&[], &[], (640, 480), &opts).unwrap_err(),
            CalibrationError::UnsupportedViewCount(0)
        );
        assert_eq!(
            calibrate(&[obj.clone(), obj.clone()], &[img.clone(), img.clone()], (640, 480), &opts)
                .unwrap_err(),
            CalibrationError::UnsupportedViewCount(2)
        );

        let small = PatternSize::new(3, 2).expect("pattern");
        let small_obj = object_points(small);
        assert_eq!(
            calibrate(&[small_obj], &[img.clone()], (640, 480), &opts).unwrap_err(),
            CalibrationError::MismatchedLengths {
                object: 6,
                image: 54
            }
        );

        let tiny_img = observe(&truth(), &tilted_pose(), &object_points(small));
        assert_eq!(
            calibrate(&[object_points(small)], &[tiny_img], (640, 480), &opts).unwrap_err(),
            CalibrationError::TooFewPoints {
                found: 6,
                required: 8
            }
        );
    }

    #[test]
    fn residual_above_threshold_is_not_converged() {
        let pattern = PatternSize::new(9, 6).expect("pattern");
        let obj = object_points(pattern);
        let noisy = jitter(&observe(&truth(), &tilted_pose(), &obj), 0.5);

        let opts = CalibrationOptions {
            max_rms_px: 0.05,
            ..CalibrationOptions::default()
        };
        let err = calibrate(&[obj], &[noisy], (640, 480), &opts).unwrap_err();
        let CalibrationError::NotConverged { rms_px, max_rms_px } = err else {
            panic!("expected NotConverged, got {err:?}");
        };
        assert!(rms_px > max_rms_px);
        assert_eq!(max_rms_px, 0.05);
    }

    #[test]
    fn slightly_noisy_view_converges() {
        let pattern = PatternSize::new(9, 6).expect("pattern");
        let obj = object_points(pattern);
        let img = jitter(&observe(&truth(), &tilted_pose(), &obj), 0.1);

        let calib =
            calibrate(&[obj], &[img], (640, 480), &CalibrationOptions::default()).expect("calib");
        assert!(calib.converged);
        assert!(calib.iterations > 0);
        assert!(calib.rms_px > 0.01 && calib.rms_px < 0.2, "rms {}", calib.rms_px);
    }

    #[test]
    fn problem_only_exposes_free_parameters() {
        let pattern = PatternSize::new(4, 3).expect("pattern");
        let obj = object_points(pattern);
        let img = observe(&truth(), &tilted_pose(), &obj);
        let opts = CalibrationOptions {
            fix_principal_point: true,
            fix_aspect_ratio: true,
            ..CalibrationOptions::default()
        };
        let free: Vec<usize> = free_mask(&opts)
            .iter()
            .enumerate()
            .filter_map(|(i, &f)| f.then_some(i))
            .collect();
        let mut full = DVector::zeros(NUM_PARAMS);
        full[FX] = 800.0;
        full[FY] = 1.0;
        full[CX] = 319.5;
        full[CY] = 239.5;
        full[TVEC + 2] = 10.0;
        let mut problem = SingleViewProblem {
            objects: &obj,
            images: &img,
            full,
            free,
            fix_aspect: true,
        };

        let x = problem.params();
        assert_eq!(x.len(), NUM_PARAMS - 3);
        assert_eq!(x[0], 800.0);

        problem.set_params(&x.map(|v| v + 1.0));
        assert_eq!(problem.full[FX], 801.0);
        assert_eq!(problem.full[FY], 1.0);
        assert_eq!(problem.full[CX], 319.5);
        assert_eq!(problem.full[CY], 239.5);

        let jac = problem.jacobian().expect("jacobian");
        assert_eq!(jac.shape(), (2 * obj.len(), NUM_PARAMS - 3));
    }
}
