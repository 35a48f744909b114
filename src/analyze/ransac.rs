//! Robust motion fitting over point correspondences.

use std::cmp::Ordering;

use arrayvec::ArrayVec;
use log::trace;
use nalgebra::{DMatrix, SVD};
use v_frame::pixel::Pixel;

use super::{
    corner::{Corner, MAX_CORNERS, detect_corners},
    correspondence::{Correspondence, determine_correspondence},
};
use crate::{
    data::{
        surface::PixelSurface,
        warp::{TransformationType, WarpedMotionModel},
    },
    error::GlobalMotionError,
};

/// Number of motions kept by one robust fit
pub const RANSAC_NUM_MOTIONS: usize = 1;

/// Fewer correspondences than `minpts * MINPTS_MULTIPLIER` are not fitted
const MINPTS_MULTIPLIER: usize = 5;
/// Distance in pixels under which a projected point is an inlier
const INLIER_THRESHOLD: f64 = 1.25;
/// Number of random trials per fit
const MIN_TRIALS: usize = 20;
/// Redraws allowed when a sample is degenerate
const MAX_DEGENERATE_ITER: usize = 10;
/// Motions supported by less than this share of correspondences are dropped
const MIN_INLIER_PROB: f64 = 0.1;

/// One motion hypothesis produced by the robust fitter.
#[derive(Debug, Clone)]
pub struct CandidateModel {
    /// Raw parameters in warped model layout
    pub params: [f64; 8],
    /// Indices of the correspondences supporting the motion
    pub inliers: Vec<usize>,
    /// Number of supporting correspondences, 0 when the fit failed
    pub num_inliers: usize,
}

/// Fixed set of candidates reused for every transform class of one estimate.
///
/// The inlier buffers are reserved up front so fitting never allocates, and
/// are released when the pool is dropped.
#[derive(Debug)]
pub struct CandidatePool {
    candidates: ArrayVec<CandidateModel, RANSAC_NUM_MOTIONS>,
}

impl CandidatePool {
    /// Reserves [`RANSAC_NUM_MOTIONS`] candidates able to hold `max_points` inliers.
    ///
    /// # Errors
    ///
    /// - If an inlier buffer cannot be allocated
    #[inline]
    pub fn new(max_points: usize) -> Result<Self, GlobalMotionError> {
        let mut candidates = ArrayVec::new();
        for _ in 0..RANSAC_NUM_MOTIONS {
            let mut inliers = Vec::new();
            inliers.try_reserve_exact(max_points)?;
            candidates.push(CandidateModel {
                params: WarpedMotionModel::identity_params(),
                inliers,
                num_inliers: 0,
            });
        }
        Ok(Self { candidates })
    }

    /// Sets every candidate back to the identity with no inliers.
    #[inline]
    pub fn reset(&mut self) {
        for candidate in &mut self.candidates {
            candidate.params = WarpedMotionModel::identity_params();
            candidate.inliers.clear();
            candidate.num_inliers = 0;
        }
    }

    /// Number of candidates.
    pub(crate) fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Candidates, best first after a fit.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &CandidateModel> {
        self.candidates.iter()
    }
}

/// Fits `wmtype` motions from the current picture to the reference.
///
/// Reference corners are detected, matched against `frame_corners`, and the
/// matches are fed to RANSAC. Results land in `pool`; candidates that could
/// not be fitted keep zero inliers.
#[inline]
pub fn fit_global_motion<T: Pixel>(
    wmtype: TransformationType,
    frame: &PixelSurface<'_, T>,
    frame_corners: &[Corner],
    reference: &PixelSurface<'_, T>,
    pool: &mut CandidatePool,
) {
    let ref_corners = detect_corners(reference, MAX_CORNERS);
    let correspondences = determine_correspondence(frame, frame_corners, reference, &ref_corners);
    ransac(wmtype, &correspondences, pool);

    let num_correspondences = correspondences.len();
    for candidate in &mut pool.candidates {
        if (candidate.num_inliers as f64) < MIN_INLIER_PROB * num_correspondences as f64
            || num_correspondences == 0
        {
            candidate.num_inliers = 0;
        }
    }
}

/// Linear congruential generator giving a reproducible sampling order.
struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12345);
        self.0 / 65536 % 32768
    }

    /// Draws `count` distinct indices below `n`.
    fn sample(&mut self, n: usize, count: usize, out: &mut ArrayVec<usize, 3>) {
        out.clear();
        while out.len() < count {
            let mut idx = self.next() as usize % n;
            while out.contains(&idx) {
                idx = (idx + 1) % n;
            }
            out.push(idx);
        }
    }
}

#[derive(Clone, Default)]
struct Motion {
    inliers: Vec<usize>,
    variance: f64,
}

impl Motion {
    fn is_better_than(&self, other: &Motion) -> bool {
        self.inliers.len() > other.inliers.len()
            || (self.inliers.len() == other.inliers.len() && self.variance < other.variance)
    }
}

const fn min_points(wmtype: TransformationType) -> usize {
    match wmtype {
        TransformationType::AFFINE => 3,
        _ => 2,
    }
}

fn is_degenerate(wmtype: TransformationType, points: &[Correspondence]) -> bool {
    match wmtype {
        TransformationType::AFFINE => {
            let (a, b, c) = (points[0], points[1], points[2]);
            let cross = i64::from(b.x - a.x) * i64::from(c.y - a.y)
                - i64::from(c.x - a.x) * i64::from(b.y - a.y);
            cross == 0
        }
        _ => points[0].x == points[1].x && points[0].y == points[1].y,
    }
}

fn find_transformation(wmtype: TransformationType, points: &[Correspondence]) -> Option<[f64; 8]> {
    match wmtype {
        TransformationType::AFFINE => find_affine(points),
        _ => find_rotzoom(points),
    }
}

/// Centroids of the source and destination points.
fn centroids(points: &[Correspondence]) -> (f64, f64, f64, f64) {
    let n = points.len() as f64;
    let (mut mx, mut my, mut mrx, mut mry) = (0.0, 0.0, 0.0, 0.0);
    for p in points {
        mx += f64::from(p.x);
        my += f64::from(p.y);
        mrx += f64::from(p.rx);
        mry += f64::from(p.ry);
    }
    (mx / n, my / n, mrx / n, mry / n)
}

/// Singular values below this share of the largest are treated as zero
const SINGULAR_TOLERANCE: f64 = 1e-9;

/// Least squares solution of `a * x = b`, `None` when `a` is rank deficient.
fn solve_least_squares(a: DMatrix<f64>, b: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let unknowns = a.ncols();
    let svd = SVD::new(a, true, true);
    let eps = svd.singular_values.max() * SINGULAR_TOLERANCE;
    if eps <= 0.0 || svd.rank(eps) < unknowns {
        return None;
    }
    svd.solve(b, eps).ok()
}

/// Least squares `x' = a x + b y + c`, `y' = -b x + a y + f`.
fn find_rotzoom(points: &[Correspondence]) -> Option<[f64; 8]> {
    let (mx, my, mrx, mry) = centroids(points);
    let n = points.len();
    // centred rows: rx = a x + b y, ry = a y - b x
    let mut a = DMatrix::zeros(2 * n, 2);
    let mut b = DMatrix::zeros(2 * n, 1);
    for (i, p) in points.iter().enumerate() {
        let x = f64::from(p.x) - mx;
        let y = f64::from(p.y) - my;
        a[(2 * i, 0)] = x;
        a[(2 * i, 1)] = y;
        b[(2 * i, 0)] = f64::from(p.rx) - mrx;
        a[(2 * i + 1, 0)] = y;
        a[(2 * i + 1, 1)] = -x;
        b[(2 * i + 1, 0)] = f64::from(p.ry) - mry;
    }

    let solution = solve_least_squares(a, &b)?;
    let (a, b) = (solution[(0, 0)], solution[(1, 0)]);
    Some([
        mrx - (a * mx + b * my),
        mry - (-b * mx + a * my),
        a,
        b,
        -b,
        a,
        0.0,
        0.0,
    ])
}

/// Least squares `x' = a x + b y + c`, `y' = d x + e y + f`.
fn find_affine(points: &[Correspondence]) -> Option<[f64; 8]> {
    let (mx, my, mrx, mry) = centroids(points);
    let n = points.len();
    let a = DMatrix::from_fn(n, 2, |i, j| {
        let p = points[i];
        if j == 0 {
            f64::from(p.x) - mx
        } else {
            f64::from(p.y) - my
        }
    });
    let b = DMatrix::from_fn(n, 2, |i, j| {
        let p = points[i];
        if j == 0 {
            f64::from(p.rx) - mrx
        } else {
            f64::from(p.ry) - mry
        }
    });

    // columns of the solution hold (a, b) and (d, e)
    let solution = solve_least_squares(a, &b)?;
    let (a, b) = (solution[(0, 0)], solution[(1, 0)]);
    let (d, e) = (solution[(0, 1)], solution[(1, 1)]);
    Some([mrx - (a * mx + b * my), mry - (d * mx + e * my), a, b, d, e, 0.0, 0.0])
}

fn project(params: &[f64; 8], x: i32, y: i32) -> (f64, f64) {
    let (x, y) = (f64::from(x), f64::from(y));
    (
        params[2] * x + params[3] * y + params[0],
        params[4] * x + params[5] * y + params[1],
    )
}

/// Runs RANSAC and stores the best motions, refitted on their inliers, in `pool`.
fn ransac(wmtype: TransformationType, points: &[Correspondence], pool: &mut CandidatePool) {
    let minpts = min_points(wmtype);
    let npoints = points.len();
    let num_motions = pool.len();
    if npoints < minpts * MINPTS_MULTIPLIER || num_motions == 0 {
        trace!("[GM] {:?}: {} correspondences, not fitting", wmtype, npoints);
        return;
    }

    let mut motions = vec![Motion::default(); num_motions];
    let mut worst = 0;
    let mut rng = Lcg(npoints as u32);
    let mut indices = ArrayVec::<usize, 3>::new();
    let mut sample = ArrayVec::<Correspondence, 3>::new();

    for _ in 0..MIN_TRIALS {
        let mut degenerate_iter = 0;
        loop {
            degenerate_iter += 1;
            if degenerate_iter > MAX_DEGENERATE_ITER {
                trace!("[GM] {:?}: only degenerate samples, giving up", wmtype);
                pool.reset();
                return;
            }
            rng.sample(npoints, minpts, &mut indices);
            sample.clear();
            sample.extend(indices.iter().map(|&i| points[i]));
            if !is_degenerate(wmtype, &sample) {
                break;
            }
        }

        let Some(params) = find_transformation(wmtype, &sample) else {
            continue;
        };

        let mut current = Motion::default();
        let (mut sum, mut sum_sq) = (0.0, 0.0);
        for (i, p) in points.iter().enumerate() {
            let (px, py) = project(&params, p.x, p.y);
            let dx = px - f64::from(p.rx);
            let dy = py - f64::from(p.ry);
            let distance = (dx * dx + dy * dy).sqrt();
            if distance < INLIER_THRESHOLD {
                current.inliers.push(i);
                sum += distance;
                sum_sq += distance * distance;
            }
        }

        let n = current.inliers.len();
        if n > 1 && n >= motions[worst].inliers.len() {
            let n = n as f64;
            let mean = sum / n;
            current.variance = sum_sq / (n - 1.0) - mean * mean * n / (n - 1.0);
            if current.is_better_than(&motions[worst]) {
                motions[worst] = current;
                worst = (0..num_motions)
                    .reduce(|w, i| if motions[w].is_better_than(&motions[i]) { i } else { w })
                    .unwrap_or(0);
            }
        }
    }

    motions.sort_by(|a, b| {
        if a.is_better_than(b) {
            Ordering::Less
        } else if b.is_better_than(a) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    });

    for (candidate, motion) in pool.candidates.iter_mut().zip(&motions) {
        if motion.inliers.len() < minpts {
            continue;
        }
        let inlier_points: Vec<Correspondence> =
            motion.inliers.iter().map(|&i| points[i]).collect();
        if let Some(params) = find_transformation(wmtype, &inlier_points) {
            candidate.params = params;
            candidate.inliers.clear();
            candidate.inliers.extend_from_slice(&motion.inliers);
            candidate.num_inliers = motion.inliers.len();
        }
    }
    trace!(
        "[GM] {:?}: best motion has {} inliers of {}",
        wmtype,
        pool.candidates.first().map_or(0, |c| c.num_inliers),
        npoints
    );
}
