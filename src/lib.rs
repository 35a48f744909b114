//! Global motion estimation for AV1 encoding.
//!
//! For every reference of a frame, a single frame-wide warped motion model
//! (identity, translation, rotation with zoom, or affine) is fitted to the
//! motion between the two pictures. Models are fitted from matched FAST
//! corners with RANSAC, refined on integer parameters, and only kept when
//! they beat the unwarped reference by enough to pay for their signalling
//! cost. How many references are searched adapts to the motion estimation
//! distortion of the frame.
//!
//! The frame level entry point is [`estimate_frame_global_motion`]. A whole
//! y4m clip can be analyzed with [`analyze_global_motion`].

mod analyze;
mod data;
mod decoder;
mod error;
#[cfg(test)]
mod test_utils;

use std::{
    collections::VecDeque,
    io::Read,
    sync::{
        Arc,
        mpsc::{channel, sync_channel},
    },
    thread,
    time::Instant,
};

pub use num_rational::Rational32;
use v_frame::pixel::Pixel;

pub use crate::{
    analyze::{
        CandidateModel,
        CandidatePool,
        Corner,
        Correspondence,
        CurrentPicture,
        ErrorAdvantageType,
        FeatureBasedEstimator,
        FrameMotionState,
        MAX_CORNERS,
        MAX_NUM_OF_REF_PIC_LIST,
        PairEstimator,
        RANSAC_NUM_MOTIONS,
        REF_LIST_MAX_DEPTH,
        REFINE_ITERATIONS,
        SearchConfig,
        SearchLevel,
        SearchPolicy,
        ShearParams,
        SliceType,
        average_distortion,
        detect_corners,
        determine_correspondence,
        estimate_frame_global_motion,
        estimate_frame_global_motion_with,
        estimate_pair_global_motion,
        fit_global_motion,
        frame_error,
        is_enough_error_advantage,
        is_shear_valid,
        params_cost,
        refine_integerized_param,
        warp_error,
    },
    data::{
        pyramid::{DownsamplingMethod, PyramidPicture, ResolutionTier},
        sad::{DISTORTION_BLOCK_SIZE, block_distortion},
        surface::PixelSurface,
        warp::{
            GM_TRANS_ONLY_DECODE_FACTOR,
            TransformationType,
            WARPEDMODEL_PREC_BITS,
            WarpedMotionModel,
        },
    },
    decoder::{Decoder, VideoDetails},
    error::GlobalMotionError,
};

const FRAME_PREFETCH_DEPTH: usize = 8;

/// Options determining how a clip is analyzed.
///
/// Every frame is treated as a P frame whose list 0 holds the frames right
/// before it, nearest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct AnalysisOptions {
    /// Previous frames used as references, at most [`REF_LIST_MAX_DEPTH`]
    pub reference_count: usize,
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
    /// Stop after the first reference when it has no motion, for the
    /// policies without early exit
    pub identity_exit: bool,
}

impl Default for AnalysisOptions {
    #[inline]
    fn default() -> Self {
        let search = SearchConfig::default();
        AnalysisOptions {
            reference_count: 1,
            resolution: search.resolution,
            downsampling: search.downsampling,
            allow_high_precision_mv: search.allow_high_precision_mv,
            policy: search.policy,
            error_advantage: search.error_advantage,
            identity_exit: search.identity_exit,
        }
    }
}

impl AnalysisOptions {
    /// Search configuration of a frame with `available` previous frames.
    #[inline]
    pub fn search_config(&self, available: usize) -> SearchConfig {
        let count = available.min(self.reference_count);
        SearchConfig {
            slice_type: SliceType::P,
            ref_list_count: [count, 0],
            ref_list_count_try: [count, 0],
            resolution: self.resolution,
            downsampling: self.downsampling,
            allow_high_precision_mv: self.allow_high_precision_mv,
            policy: self.policy,
            error_advantage: self.error_advantage,
            identity_exit: self.identity_exit,
        }
    }
}

/// Global motion of one frame against its list 0 references.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct FrameGlobalMotion {
    /// 0-indexed frame number
    pub frame: usize,
    /// Average per-pixel zero-motion distortion against the nearest reference
    pub average_distortion: u64,
    /// Model per reference, nearest first
    pub models: Vec<WarpedMotionModel>,
    /// Whether each reference moves by more than a translation
    pub is_global_motion: Vec<bool>,
}

/// Results from a global motion analysis pass.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct GlobalMotionResults {
    /// Options the clip was analyzed with
    pub options: AnalysisOptions,
    /// Per-frame results in display order
    pub frames: Vec<FrameGlobalMotion>,
    /// The total number of frames read.
    pub frame_count: usize,
    /// Average speed (FPS)
    pub speed: f64,
}

/// Estimates the global motion of one frame against `references`, nearest
/// first.
///
/// The zero-motion SAD against the nearest reference stands in for motion
/// estimation distortion when choosing the search depth.
///
/// # Errors
///
/// - If a reference does not have the size of `current`
/// - If the estimator cannot allocate its working memory
#[inline]
pub fn analyze_frame<T: Pixel>(
    frame: usize,
    current: &PyramidPicture<T>,
    references: &[Arc<PyramidPicture<T>>],
    opts: &AnalysisOptions,
) -> Result<FrameGlobalMotion, GlobalMotionError> {
    let config = opts.search_config(references.len());
    let count = config.ref_list_count[0];
    let references = &references[..count];

    let current_full = current.surface(ResolutionTier::Full, DownsamplingMethod::Filtered)?;
    let distortion = match references.first() {
        Some(nearest) => {
            let nearest = nearest.surface(ResolutionTier::Full, DownsamplingMethod::Filtered)?;
            if !current_full.same_size(&nearest) {
                return Err(GlobalMotionError::DimensionMismatch {
                    width: current_full.width(),
                    height: current_full.height(),
                    ref_width: nearest.width(),
                    ref_height: nearest.height(),
                });
            }
            block_distortion(&current_full, &nearest)
        }
        None => Vec::new(),
    };

    let picture = CurrentPicture {
        pyramid: current,
        references: [references, &[]],
        block_distortion: &distortion,
    };
    let mut state = FrameMotionState::default();
    estimate_frame_global_motion(&mut state, &config, &picture)?;

    Ok(FrameGlobalMotion {
        frame,
        average_distortion: average_distortion(
            &distortion,
            current_full.width(),
            current_full.height(),
        ),
        models: state.models[0][..count].to_vec(),
        is_global_motion: state.is_global_motion[0][..count].to_vec(),
    })
}

/// Runs through a y4m video clip, estimating the global motion of every frame
/// against the frames before it.
///
/// # Arguments
///
/// - `progress_callback`: An optional callback that will fire after each frame
///   is analyzed, with the number of frames analyzed so far.
///
/// # Errors
///
/// - If `opts.reference_count` exceeds [`REF_LIST_MAX_DEPTH`]
/// - If a frame is too small to build its pyramid
/// - If estimation fails on a frame
#[inline]
pub fn analyze_global_motion<R: Read, T: Pixel>(
    dec: &mut Decoder<R>,
    opts: AnalysisOptions,
    frame_limit: Option<usize>,
    progress_callback: Option<&dyn Fn(usize)>,
) -> anyhow::Result<GlobalMotionResults> {
    if opts.reference_count > REF_LIST_MAX_DEPTH {
        return Err(GlobalMotionError::TooManyReferences {
            list: 0,
            requested: opts.reference_count,
            max: REF_LIST_MAX_DEPTH,
        }
        .into());
    }

    let bit_depth = dec.get_video_details().bit_depth;
    let (frame_tx, frame_rx) = sync_channel::<Arc<PyramidPicture<T>>>(FRAME_PREFETCH_DEPTH);
    let (progress_tx, progress_rx) = if progress_callback.is_some() {
        let (tx, rx) = channel();
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let analysis_handle = thread::spawn(move || -> anyhow::Result<GlobalMotionResults> {
        let mut references: VecDeque<Arc<PyramidPicture<T>>> =
            VecDeque::with_capacity(opts.reference_count + 1);
        let mut frames = Vec::new();

        let start_time = Instant::now();
        let mut frameno = 0usize;
        while let Ok(current) = frame_rx.recv() {
            let result = analyze_frame(frameno, &current, references.make_contiguous(), &opts)?;
            frames.push(result);

            references.push_front(current);
            references.truncate(opts.reference_count);

            frameno += 1;
            if let Some(ref progress_tx) = progress_tx {
                let _ = progress_tx.send(frameno);
            }
        }

        Ok(GlobalMotionResults {
            options: opts,
            frames,
            frame_count: frameno,
            speed: frameno as f64 / start_time.elapsed().as_secs_f64(),
        })
    });

    let mut produced = 0usize;
    while frame_limit.map_or_else(|| true, |limit| produced < limit) {
        let Ok(luma) = dec.read_luma_plane::<T>() else {
            break;
        };
        produced += 1;
        let picture = PyramidPicture::new(luma, bit_depth)?;
        if frame_tx.send(Arc::new(picture)).is_err() {
            break;
        }

        if let (Some(progress_rx), Some(progress_fn)) = (&progress_rx, progress_callback) {
            while let Ok(frames) = progress_rx.try_recv() {
                progress_fn(frames);
            }
        }
    }

    drop(frame_tx);

    let results = analysis_handle
        .join()
        .map_err(|_| anyhow::anyhow!("global motion analysis thread panicked"))??;

    if let (Some(progress_rx), Some(progress_fn)) = (&progress_rx, progress_callback) {
        while let Ok(frames) = progress_rx.try_recv() {
            progress_fn(frames);
        }
    }

    Ok(results)
}
