//! Global motion model estimation for one (current, reference) pair.

use log::{debug, trace};
use v_frame::pixel::Pixel;

use super::{
    corner::{MAX_CORNERS, detect_corners},
    cost::{ErrorAdvantageType, is_enough_error_advantage, params_cost},
    ransac::{CandidatePool, fit_global_motion},
    refine::{REFINE_ITERATIONS, frame_error, refine_integerized_param},
    shear::is_shear_valid,
};
use crate::{
    data::{
        surface::PixelSurface,
        warp::{TransformationType, WarpedMotionModel},
    },
    error::GlobalMotionError,
};

/// Transform classes searched, cheapest first
const SEARCHED_CLASSES: [TransformationType; 2] =
    [TransformationType::ROTZOOM, TransformationType::AFFINE];

/// Produces one warped motion model for a pair of same-sized surfaces.
///
/// The frame driver only depends on this trait, so any estimator can be
/// plugged in.
pub trait PairEstimator<T: Pixel> {
    /// Estimates the model mapping `current` onto `reference`.
    ///
    /// # Errors
    ///
    /// - If the surfaces differ in size
    /// - If working memory cannot be allocated
    fn estimate(
        &mut self,
        current: &PixelSurface<'_, T>,
        reference: &PixelSurface<'_, T>,
        allow_high_precision_mv: bool,
    ) -> Result<WarpedMotionModel, GlobalMotionError>;
}

/// Corner based estimator: FAST corners, correlation matching, RANSAC,
/// integer refinement and an error-advantage gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeatureBasedEstimator {
    /// How strictly a model must beat the unwarped reference
    pub error_advantage: ErrorAdvantageType,
}

impl FeatureBasedEstimator {
    /// Creates an estimator with the given acceptance strictness.
    #[inline]
    pub const fn new(error_advantage: ErrorAdvantageType) -> Self {
        Self { error_advantage }
    }
}

impl<T: Pixel> PairEstimator<T> for FeatureBasedEstimator {
    #[inline]
    fn estimate(
        &mut self,
        current: &PixelSurface<'_, T>,
        reference: &PixelSurface<'_, T>,
        allow_high_precision_mv: bool,
    ) -> Result<WarpedMotionModel, GlobalMotionError> {
        compute_global_motion(current, reference, allow_high_precision_mv, self.error_advantage)
    }
}

/// Estimates the global motion of `current` relative to `reference` with the
/// default [`FeatureBasedEstimator`].
///
/// # Errors
///
/// - If the surfaces differ in size
/// - If the candidate pool cannot be allocated
#[inline]
pub fn estimate_pair_global_motion<T: Pixel>(
    current: &PixelSurface<'_, T>,
    reference: &PixelSurface<'_, T>,
    allow_high_precision_mv: bool,
) -> Result<WarpedMotionModel, GlobalMotionError> {
    FeatureBasedEstimator::default().estimate(current, reference, allow_high_precision_mv)
}

#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
fn compute_global_motion<T: Pixel>(
    current: &PixelSurface<'_, T>,
    reference: &PixelSurface<'_, T>,
    allow_high_precision_mv: bool,
    error_advantage: ErrorAdvantageType,
) -> Result<WarpedMotionModel, GlobalMotionError> {
    if !current.same_size(reference) {
        return Err(GlobalMotionError::DimensionMismatch {
            width: current.width(),
            height: current.height(),
            ref_width: reference.width(),
            ref_height: reference.height(),
        });
    }

    let corners = detect_corners(current, MAX_CORNERS);
    let mut pool = CandidatePool::new(MAX_CORNERS)?;
    let reference_params = WarpedMotionModel::IDENTITY;
    let mut global_motion = WarpedMotionModel::IDENTITY;

    for wmtype in SEARCHED_CLASSES {
        let mut best_warp_error = u64::MAX;
        pool.reset();
        fit_global_motion(wmtype, current, &corners, reference, &mut pool);

        for candidate in pool.iter().filter(|c| c.num_inliers > 0) {
            let mut model = WarpedMotionModel::from_params(&candidate.params);
            if model.wmtype == TransformationType::IDENTITY {
                continue;
            }
            let warp_error = refine_integerized_param(
                &mut model,
                current,
                reference,
                REFINE_ITERATIONS,
                best_warp_error,
            );
            trace!(
                "[GM] {:?}: candidate with {} inliers refined to {:?}, error {}",
                wmtype,
                candidate.num_inliers,
                model.wmtype,
                warp_error
            );
            if warp_error < best_warp_error {
                best_warp_error = warp_error;
                global_motion = model;
            }
        }

        if global_motion.wmtype <= TransformationType::AFFINE && !is_shear_valid(&global_motion) {
            trace!("[GM] {:?}: invalid shear, reverting to identity", wmtype);
            global_motion = WarpedMotionModel::IDENTITY;
        }
        if global_motion.wmtype == TransformationType::TRANSLATION {
            global_motion.quantize_translation(allow_high_precision_mv);
        }
        if global_motion.wmtype == TransformationType::IDENTITY {
            continue;
        }

        let ref_frame_error = frame_error(current, reference);
        if ref_frame_error == 0 {
            continue;
        }

        let ratio = best_warp_error as f64 / ref_frame_error as f64;
        let cost = params_cost(&global_motion, &reference_params, allow_high_precision_mv);
        if !is_enough_error_advantage(ratio, cost, error_advantage) {
            debug!(
                "[GM] {:?}: rejected {:?}, error ratio {:.3}, cost {}",
                wmtype, global_motion.wmtype, ratio, cost
            );
            global_motion = WarpedMotionModel::IDENTITY;
        }

        if global_motion.wmtype != TransformationType::IDENTITY {
            debug!(
                "[GM] {:?}: accepted {:?} {:?}, error ratio {:.3}",
                wmtype, global_motion.wmtype, global_motion.wmmat, ratio
            );
            break;
        }
    }

    Ok(global_motion)
}
