use std::sync::Arc;

use log::{debug, trace};
use v_frame::pixel::Pixel;

pub use self::{
    corner::{Corner, MAX_CORNERS, detect_corners},
    correspondence::{Correspondence, determine_correspondence},
    cost::{ErrorAdvantageType, is_enough_error_advantage, params_cost},
    estimator::{FeatureBasedEstimator, PairEstimator, estimate_pair_global_motion},
    ransac::{CandidateModel, CandidatePool, RANSAC_NUM_MOTIONS, fit_global_motion},
    refine::{REFINE_ITERATIONS, frame_error, refine_integerized_param, warp_error},
    search::{SearchLevel, average_distortion},
    shear::{ShearParams, is_shear_valid},
};
use crate::{
    data::{
        pyramid::{DownsamplingMethod, PyramidPicture, ResolutionTier},
        surface::PixelSurface,
        warp::{TransformationType, WarpedMotionModel},
    },
    error::GlobalMotionError,
};

mod corner;
mod correspondence;
mod cost;
mod estimator;
mod ransac;
mod refine;
mod search;
mod shear;

#[cfg(test)]
mod tests;

/// Number of reference picture lists
pub const MAX_NUM_OF_REF_PIC_LIST: usize = 2;
/// Depth of each reference picture list
pub const REF_LIST_MAX_DEPTH: usize = 4;

/// Prediction structure of the current picture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "binary", derive(clap::ValueEnum))]
pub enum SliceType {
    /// Predicted from list 0 only
    P,
    /// Predicted from lists 0 and 1
    #[default]
    B,
}

impl SliceType {
    /// Number of reference lists searched for this slice type.
    #[inline]
    pub const fn list_count(self) -> usize {
        match self {
            SliceType::P => 1,
            SliceType::B => MAX_NUM_OF_REF_PIC_LIST,
        }
    }
}

/// How the reference loop bounds its work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "binary", derive(clap::ValueEnum))]
pub enum SearchPolicy {
    /// One reference per list whatever the content
    Baseline,
    /// References per list follow the distortion-driven [`SearchLevel`]
    ImprovedSearchDepth,
    /// Distortion-driven level; an identity or translation result stops the
    /// list it was found in and every list after it
    #[default]
    FastEarlyExit,
}

/// Frame level configuration of the global motion search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct SearchConfig {
    /// Which reference lists are searched
    pub slice_type: SliceType,
    /// References configured per list; these are classified after the search
    pub ref_list_count: [usize; MAX_NUM_OF_REF_PIC_LIST],
    /// References per list the search may try
    pub ref_list_count_try: [usize; MAX_NUM_OF_REF_PIC_LIST],
    /// Pyramid tier the estimator runs at
    pub resolution: ResolutionTier,
    /// Flavour of the lower pyramid tiers
    pub downsampling: DownsamplingMethod,
    /// Whether translations are kept at 1/8 pel instead of 1/4 pel
    pub allow_high_precision_mv: bool,
    /// Reference loop strategy
    pub policy: SearchPolicy,
    /// Acceptance strictness of the estimator
    pub error_advantage: ErrorAdvantageType,
    /// With [`SearchPolicy::Baseline`] and [`SearchPolicy::ImprovedSearchDepth`],
    /// skip list 1 when list 0 reference 0 has no motion
    pub identity_exit: bool,
}

impl Default for SearchConfig {
    #[inline]
    fn default() -> Self {
        SearchConfig {
            slice_type: SliceType::B,
            ref_list_count: [1, 1],
            ref_list_count_try: [1, 1],
            resolution: ResolutionTier::Full,
            downsampling: DownsamplingMethod::Filtered,
            allow_high_precision_mv: true,
            policy: SearchPolicy::FastEarlyExit,
            error_advantage: ErrorAdvantageType::Strict,
            identity_exit: false,
        }
    }
}

impl SearchConfig {
    /// The view of `picture` the estimator runs on.
    ///
    /// The same tier and flavour are used for the current picture and every
    /// reference.
    ///
    /// # Errors
    ///
    /// - If the selected tier has an empty visible area
    #[inline]
    pub fn select_surface<'p, T: Pixel>(
        &self,
        picture: &'p PyramidPicture<T>,
    ) -> Result<PixelSurface<'p, T>, GlobalMotionError> {
        picture.surface(self.resolution, self.downsampling)
    }

    /// References of `list` to try at `level`; `None` means no level applies.
    #[inline]
    pub fn references_to_try(&self, list: usize, level: Option<SearchLevel>) -> usize {
        let configured = self.ref_list_count_try[list];
        match (self.policy, level) {
            (SearchPolicy::Baseline, _) | (_, None) => configured.min(1),
            (_, Some(level)) => level.references_to_try(configured),
        }
    }
}

/// The picture being coded, with everything the search reads from it.
#[derive(Debug, Clone, Copy)]
pub struct CurrentPicture<'a, T: Pixel> {
    /// Luma pyramid of the current picture
    pub pyramid: &'a PyramidPicture<T>,
    /// Reference pictures per list, index 0 first
    pub references: [&'a [Arc<PyramidPicture<T>>]; MAX_NUM_OF_REF_PIC_LIST],
    /// Motion estimation distortion of every block of the picture
    pub block_distortion: &'a [u32],
}

/// Global motion results of one frame, indexed by `[list][reference]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct FrameMotionState {
    /// Estimated model per reference
    pub models: [[WarpedMotionModel; REF_LIST_MAX_DEPTH]; MAX_NUM_OF_REF_PIC_LIST],
    /// Whether the reference moves by more than a translation
    pub is_global_motion: [[bool; REF_LIST_MAX_DEPTH]; MAX_NUM_OF_REF_PIC_LIST],
}

impl FrameMotionState {
    /// Sets every slot back to identity and not moving.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Model stored for a reference.
    #[inline]
    pub const fn model(&self, list: usize, reference: usize) -> &WarpedMotionModel {
        &self.models[list][reference]
    }
}

/// Result of searching one reference list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ListOutcome {
    /// No further list may be searched this frame
    stopped: bool,
}

/// Estimates the global motion of every reference of a frame with the
/// [`FeatureBasedEstimator`].
///
/// # Errors
///
/// - If the configuration names more references than are supplied or supported
/// - If a reference does not have the size of the current picture
/// - If the estimator cannot allocate its working memory
#[inline]
pub fn estimate_frame_global_motion<T: Pixel>(
    state: &mut FrameMotionState,
    config: &SearchConfig,
    picture: &CurrentPicture<'_, T>,
) -> Result<(), GlobalMotionError> {
    let mut estimator = FeatureBasedEstimator::new(config.error_advantage);
    estimate_frame_global_motion_with(&mut estimator, state, config, picture)
}

/// Estimates the global motion of every reference of a frame with `estimator`.
///
/// `state` is reset first. References are searched list by list within the
/// limits of the search policy, then every configured reference is
/// classified.
///
/// # Errors
///
/// - If the configuration names more references than are supplied or supported
/// - If the estimator fails
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
#[inline]
pub fn estimate_frame_global_motion_with<T: Pixel, E: PairEstimator<T> + ?Sized>(
    estimator: &mut E,
    state: &mut FrameMotionState,
    config: &SearchConfig,
    picture: &CurrentPicture<'_, T>,
) -> Result<(), GlobalMotionError> {
    state.reset();
    let list_count = config.slice_type.list_count();
    validate(config, picture, list_count)?;

    let level = match config.policy {
        SearchPolicy::Baseline => None,
        SearchPolicy::ImprovedSearchDepth | SearchPolicy::FastEarlyExit => {
            let luma = picture.pyramid.luma();
            Some(SearchLevel::from_block_distortion(
                picture.block_distortion,
                luma.cfg.width,
                luma.cfg.height,
            ))
        }
    };

    if level != Some(SearchLevel::Skip) {
        let current = config.select_surface(picture.pyramid)?;
        for list in 0..list_count {
            let attempts = config.references_to_try(list, level);
            let outcome = search_list(estimator, state, config, &current, picture, list, attempts)?;
            if outcome.stopped {
                debug!("[GM] search stopped after list {}", list);
                break;
            }
        }
    }

    classify(state, config, list_count);
    Ok(())
}

fn validate<T: Pixel>(
    config: &SearchConfig,
    picture: &CurrentPicture<'_, T>,
    list_count: usize,
) -> Result<(), GlobalMotionError> {
    for list in 0..list_count {
        let requested = config.ref_list_count_try[list].max(config.ref_list_count[list]);
        if requested > REF_LIST_MAX_DEPTH {
            return Err(GlobalMotionError::TooManyReferences {
                list,
                requested,
                max: REF_LIST_MAX_DEPTH,
            });
        }
        let available = picture.references[list].len();
        let requested = config.ref_list_count_try[list];
        if requested > available {
            return Err(GlobalMotionError::MissingReference {
                list,
                available,
                requested,
            });
        }
    }
    Ok(())
}

fn search_list<T: Pixel, E: PairEstimator<T> + ?Sized>(
    estimator: &mut E,
    state: &mut FrameMotionState,
    config: &SearchConfig,
    current: &PixelSurface<'_, T>,
    picture: &CurrentPicture<'_, T>,
    list: usize,
    attempts: usize,
) -> Result<ListOutcome, GlobalMotionError> {
    for (index, reference) in picture.references[list].iter().take(attempts).enumerate() {
        let reference = config.select_surface(&**reference)?;
        let model = estimator.estimate(current, &reference, config.allow_high_precision_mv)?;
        trace!("[GM] list {} ref {}: {:?}", list, index, model.wmtype);
        state.models[list][index] = model;

        if config.policy == SearchPolicy::FastEarlyExit
            && model.wmtype <= TransformationType::TRANSLATION
        {
            return Ok(ListOutcome { stopped: true });
        }
    }

    let stopped = config.policy != SearchPolicy::FastEarlyExit
        && config.identity_exit
        && list == 0
        && state.models[0][0].wmtype == TransformationType::IDENTITY;
    Ok(ListOutcome { stopped })
}

/// Flags every configured reference whose model is more than a translation.
fn classify(state: &mut FrameMotionState, config: &SearchConfig, list_count: usize) {
    for list in 0..list_count {
        for index in 0..config.ref_list_count[list] {
            state.is_global_motion[list][index] =
                state.models[list][index].wmtype > TransformationType::TRANSLATION;
        }
    }
}
