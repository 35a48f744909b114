#![allow(clippy::unwrap_used, reason = "allow in test files")]

use std::collections::VecDeque;

use super::*;
use crate::{
    data::pyramid::plane_from_samples,
    test_utils::{add_noise, texture, zoomed_texture},
};

fn pyramid(data: &[u8], width: usize) -> Arc<PyramidPicture<u8>> {
    Arc::new(PyramidPicture::new(plane_from_samples(data, width, data.len() / width), 8).unwrap())
}

fn flat_pyramid(width: usize, height: usize) -> Arc<PyramidPicture<u8>> {
    pyramid(&vec![128u8; width * height], width)
}

/// Distortion statistics giving `average` per pixel over a `width`x`height` frame.
fn distortion(average: u32, width: usize, height: usize) -> Vec<u32> {
    vec![average * (width * height) as u32]
}

fn model_of(wmtype: TransformationType) -> WarpedMotionModel {
    let mut model = WarpedMotionModel::IDENTITY;
    match wmtype {
        TransformationType::IDENTITY => {}
        TransformationType::TRANSLATION => model.wmmat[0] = 1 << 16,
        TransformationType::ROTZOOM => {
            model.wmmat[2] = 66000;
            model.wmmat[5] = 66000;
        }
        TransformationType::AFFINE => {
            model.wmmat[2] = 66000;
            model.wmmat[5] = 65000;
        }
    }
    model.wmtype = model.derive_type();
    assert_eq!(model.wmtype, wmtype);
    model
}

/// Returns scripted results in call order, then `fallback`.
struct ScriptedEstimator {
    script: VecDeque<TransformationType>,
    fallback: TransformationType,
    calls: usize,
    sizes: Vec<(usize, usize, usize, usize)>,
}

impl ScriptedEstimator {
    fn new(script: &[TransformationType], fallback: TransformationType) -> Self {
        Self {
            script: script.iter().copied().collect(),
            fallback,
            calls: 0,
            sizes: Vec::new(),
        }
    }

    fn always(wmtype: TransformationType) -> Self {
        Self::new(&[], wmtype)
    }
}

impl PairEstimator<u8> for ScriptedEstimator {
    fn estimate(
        &mut self,
        current: &PixelSurface<'_, u8>,
        reference: &PixelSurface<'_, u8>,
        _allow_high_precision_mv: bool,
    ) -> Result<WarpedMotionModel, GlobalMotionError> {
        self.calls += 1;
        self.sizes.push((
            current.width(),
            current.height(),
            reference.width(),
            reference.height(),
        ));
        let wmtype = self.script.pop_front().unwrap_or(self.fallback);
        Ok(model_of(wmtype))
    }
}

struct Fixture {
    current: Arc<PyramidPicture<u8>>,
    lists: [Vec<Arc<PyramidPicture<u8>>>; 2],
    distortion: Vec<u32>,
}

impl Fixture {
    const SIZE: usize = 32;

    fn new(average_distortion: u32) -> Self {
        let refs = || {
            (0..REF_LIST_MAX_DEPTH)
                .map(|_| flat_pyramid(Self::SIZE, Self::SIZE))
                .collect::<Vec<_>>()
        };
        Self {
            current: flat_pyramid(Self::SIZE, Self::SIZE),
            lists: [refs(), refs()],
            distortion: distortion(average_distortion, Self::SIZE, Self::SIZE),
        }
    }

    fn picture(&self) -> CurrentPicture<'_, u8> {
        CurrentPicture {
            pyramid: &self.current,
            references: [self.lists[0].as_slice(), self.lists[1].as_slice()],
            block_distortion: &self.distortion,
        }
    }
}

fn config(policy: SearchPolicy, counts: [usize; 2]) -> SearchConfig {
    SearchConfig {
        ref_list_count: counts,
        ref_list_count_try: counts,
        policy,
        ..SearchConfig::default()
    }
}

fn run(
    estimator: &mut ScriptedEstimator,
    config: &SearchConfig,
    fixture: &Fixture,
) -> FrameMotionState {
    let mut state = FrameMotionState::default();
    estimate_frame_global_motion_with(estimator, &mut state, config, &fixture.picture()).unwrap();
    state
}

#[test]
fn zero_distortion_skips_the_search() {
    let fixture = Fixture::new(0);
    let mut estimator = ScriptedEstimator::always(TransformationType::AFFINE);
    let mut state = FrameMotionState::default();
    state.models[0][0] = model_of(TransformationType::AFFINE);
    state.is_global_motion[1][3] = true;

    estimate_frame_global_motion_with(
        &mut estimator,
        &mut state,
        &config(SearchPolicy::FastEarlyExit, [4, 4]),
        &fixture.picture(),
    )
    .unwrap();

    assert_eq!(estimator.calls, 0);
    assert_eq!(state, FrameMotionState::default());
}

#[test]
fn distortion_level_caps_references_per_list() {
    for (average, expected_calls) in [(3, 2), (7, 4), (20, 8)] {
        let fixture = Fixture::new(average);
        let mut estimator = ScriptedEstimator::always(TransformationType::AFFINE);
        let state = run(
            &mut estimator,
            &config(SearchPolicy::FastEarlyExit, [4, 4]),
            &fixture,
        );
        assert_eq!(estimator.calls, expected_calls, "average {average}");

        let per_list = expected_calls / 2;
        for list in 0..2 {
            for index in 0..REF_LIST_MAX_DEPTH {
                let searched = index < per_list;
                assert_eq!(state.is_global_motion[list][index], searched);
                let expected = if searched {
                    TransformationType::AFFINE
                } else {
                    TransformationType::IDENTITY
                };
                assert_eq!(state.model(list, index).wmtype, expected);
            }
        }
    }
}

#[test]
fn attempts_never_exceed_the_configured_count() {
    let fixture = Fixture::new(20);
    let mut estimator = ScriptedEstimator::always(TransformationType::ROTZOOM);
    let cfg = SearchConfig {
        ref_list_count: [4, 4],
        ref_list_count_try: [3, 1],
        ..SearchConfig::default()
    };
    let state = run(&mut estimator, &cfg, &fixture);
    assert_eq!(estimator.calls, 4);
    assert_eq!(
        state.is_global_motion,
        [[true, true, true, false], [true, false, false, false]]
    );
}

#[test]
fn translation_stops_the_list_and_every_later_list() {
    let fixture = Fixture::new(20);
    let mut estimator = ScriptedEstimator::new(
        &[TransformationType::AFFINE, TransformationType::TRANSLATION],
        TransformationType::AFFINE,
    );
    let state = run(
        &mut estimator,
        &config(SearchPolicy::FastEarlyExit, [4, 4]),
        &fixture,
    );

    assert_eq!(estimator.calls, 2);
    assert_eq!(state.model(0, 1).wmtype, TransformationType::TRANSLATION);
    for index in 2..REF_LIST_MAX_DEPTH {
        assert_eq!(*state.model(0, index), WarpedMotionModel::IDENTITY);
    }
    assert!(state.models[1].iter().all(|m| *m == WarpedMotionModel::IDENTITY));
    assert_eq!(
        state.is_global_motion,
        [[true, false, false, false], [false; 4]]
    );
}

#[test]
fn identity_on_the_first_reference_skips_list_one() {
    let fixture = Fixture::new(20);
    let mut estimator =
        ScriptedEstimator::new(&[TransformationType::IDENTITY], TransformationType::ROTZOOM);
    let state = run(
        &mut estimator,
        &config(SearchPolicy::FastEarlyExit, [2, 2]),
        &fixture,
    );
    assert_eq!(estimator.calls, 1);
    assert!(state.is_global_motion.iter().flatten().all(|&flag| !flag));
}

#[test]
fn motion_in_list_zero_lets_list_one_run() {
    let fixture = Fixture::new(20);
    let mut estimator = ScriptedEstimator::new(
        &[
            TransformationType::ROTZOOM,
            TransformationType::AFFINE,
            TransformationType::TRANSLATION,
        ],
        TransformationType::AFFINE,
    );
    let state = run(
        &mut estimator,
        &config(SearchPolicy::FastEarlyExit, [2, 2]),
        &fixture,
    );
    assert_eq!(estimator.calls, 3);
    assert_eq!(
        state.is_global_motion,
        [[true, true, false, false], [false; 4]]
    );
    assert_eq!(state.model(1, 0).wmtype, TransformationType::TRANSLATION);
}

#[test]
fn improved_search_depth_has_no_early_exit() {
    let fixture = Fixture::new(20);
    let mut estimator = ScriptedEstimator::new(
        &[TransformationType::AFFINE, TransformationType::TRANSLATION],
        TransformationType::IDENTITY,
    );
    let state = run(
        &mut estimator,
        &config(SearchPolicy::ImprovedSearchDepth, [4, 4]),
        &fixture,
    );
    assert_eq!(estimator.calls, 8);
    assert_eq!(state.model(0, 1).wmtype, TransformationType::TRANSLATION);
    assert_eq!(
        state.is_global_motion,
        [[true, false, false, false], [false; 4]]
    );
}

#[test]
fn improved_search_depth_still_follows_the_level() {
    let fixture = Fixture::new(0);
    let mut estimator = ScriptedEstimator::always(TransformationType::AFFINE);
    run(
        &mut estimator,
        &config(SearchPolicy::ImprovedSearchDepth, [4, 4]),
        &fixture,
    );
    assert_eq!(estimator.calls, 0);
}

#[test]
fn baseline_searches_one_reference_per_list_regardless_of_distortion() {
    for average in [0, 20] {
        let fixture = Fixture::new(average);
        let mut estimator = ScriptedEstimator::always(TransformationType::AFFINE);
        let state = run(
            &mut estimator,
            &config(SearchPolicy::Baseline, [4, 4]),
            &fixture,
        );
        assert_eq!(estimator.calls, 2);
        assert_eq!(
            state.is_global_motion,
            [[true, false, false, false], [true, false, false, false]]
        );
    }
}

#[test]
fn identity_exit_applies_to_the_legacy_policies() {
    for policy in [SearchPolicy::Baseline, SearchPolicy::ImprovedSearchDepth] {
        let fixture = Fixture::new(20);
        let cfg = SearchConfig {
            identity_exit: true,
            ..config(policy, [1, 1])
        };

        let mut estimator =
            ScriptedEstimator::new(&[TransformationType::IDENTITY], TransformationType::AFFINE);
        run(&mut estimator, &cfg, &fixture);
        assert_eq!(estimator.calls, 1, "{policy:?}");

        // a translation is not an identity
        let mut estimator = ScriptedEstimator::new(
            &[TransformationType::TRANSLATION],
            TransformationType::AFFINE,
        );
        let state = run(&mut estimator, &cfg, &fixture);
        assert_eq!(estimator.calls, 2, "{policy:?}");
        assert!(state.is_global_motion[1][0]);
    }
}

#[test]
fn p_slices_only_search_list_zero() {
    let fixture = Fixture::new(20);
    let mut estimator = ScriptedEstimator::always(TransformationType::AFFINE);
    let cfg = SearchConfig {
        slice_type: SliceType::P,
        ..config(SearchPolicy::FastEarlyExit, [2, 2])
    };
    let state = run(&mut estimator, &cfg, &fixture);
    assert_eq!(estimator.calls, 2);
    assert_eq!(
        state.is_global_motion,
        [[true, true, false, false], [false; 4]]
    );
}

#[test]
fn classification_covers_configured_references_only() {
    let fixture = Fixture::new(20);
    let mut estimator = ScriptedEstimator::always(TransformationType::AFFINE);
    let cfg = SearchConfig {
        ref_list_count: [1, 0],
        ref_list_count_try: [3, 2],
        ..SearchConfig::default()
    };
    let state = run(&mut estimator, &cfg, &fixture);
    assert_eq!(estimator.calls, 5);
    // searched but not configured: the model is kept, the flag is not set
    assert_eq!(state.model(0, 2).wmtype, TransformationType::AFFINE);
    assert_eq!(
        state.is_global_motion,
        [[true, false, false, false], [false; 4]]
    );
}

#[test]
fn resolution_tier_applies_to_current_and_reference() {
    for (tier, side) in [
        (ResolutionTier::Full, 32),
        (ResolutionTier::Quarter, 16),
        (ResolutionTier::Sixteenth, 8),
    ] {
        for downsampling in [DownsamplingMethod::Filtered, DownsamplingMethod::Decimated] {
            let fixture = Fixture::new(20);
            let mut estimator = ScriptedEstimator::always(TransformationType::AFFINE);
            let cfg = SearchConfig {
                resolution: tier,
                downsampling,
                ..SearchConfig::default()
            };
            run(&mut estimator, &cfg, &fixture);
            assert_eq!(estimator.sizes, vec![(side, side, side, side); 2]);
        }
    }
}

#[test]
fn missing_references_are_an_error() {
    let mut fixture = Fixture::new(20);
    fixture.lists[1].truncate(1);
    let mut estimator = ScriptedEstimator::always(TransformationType::AFFINE);
    let mut state = FrameMotionState::default();
    let err = estimate_frame_global_motion_with(
        &mut estimator,
        &mut state,
        &config(SearchPolicy::FastEarlyExit, [2, 2]),
        &fixture.picture(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        GlobalMotionError::MissingReference {
            list: 1,
            available: 1,
            requested: 2
        }
    ));
    assert_eq!(estimator.calls, 0);

    // list 1 is not used by P slices
    let cfg = SearchConfig {
        slice_type: SliceType::P,
        ..config(SearchPolicy::FastEarlyExit, [2, 2])
    };
    estimate_frame_global_motion_with(&mut estimator, &mut state, &cfg, &fixture.picture())
        .unwrap();
}

#[test]
fn list_depth_is_bounded() {
    let fixture = Fixture::new(20);
    let mut estimator = ScriptedEstimator::always(TransformationType::AFFINE);
    let mut state = FrameMotionState::default();
    let cfg = SearchConfig {
        ref_list_count: [5, 1],
        ref_list_count_try: [1, 1],
        ..SearchConfig::default()
    };
    let err =
        estimate_frame_global_motion_with(&mut estimator, &mut state, &cfg, &fixture.picture())
            .unwrap_err();
    assert!(matches!(
        err,
        GlobalMotionError::TooManyReferences {
            list: 0,
            requested: 5,
            max: REF_LIST_MAX_DEPTH
        }
    ));
}

fn surface(data: &[u8], width: usize, height: usize) -> PixelSurface<'_, u8> {
    PixelSurface::new(data, width, width, height, 8).unwrap()
}

#[test]
fn identical_pictures_have_no_motion() {
    let data = texture(96, 96, 0, 0);
    let s = surface(&data, 96, 96);
    assert_eq!(
        estimate_pair_global_motion(&s, &s, true).unwrap(),
        WarpedMotionModel::IDENTITY
    );
}

#[test]
fn flat_pictures_have_no_motion() {
    let cur = vec![90u8; 64 * 64];
    let refd = vec![100u8; 64 * 64];
    let model =
        estimate_pair_global_motion(&surface(&cur, 64, 64), &surface(&refd, 64, 64), true)
            .unwrap();
    assert_eq!(model, WarpedMotionModel::IDENTITY);
}

#[test]
fn integer_shift_is_a_translation() {
    let cur = texture(128, 128, 0, 0);
    let refd = texture(128, 128, 3, 2);
    let (cur_s, ref_s) = (surface(&cur, 128, 128), surface(&refd, 128, 128));

    for (allow_hp, step) in [(true, 1 << 13), (false, 1 << 14)] {
        let model = estimate_pair_global_motion(&cur_s, &ref_s, allow_hp).unwrap();
        assert_eq!(model.wmtype, TransformationType::TRANSLATION, "hp {allow_hp}");
        assert!((model.wmmat[0] - (3 << 16)).abs() <= step, "{:?}", model.wmmat);
        assert!((model.wmmat[1] - (2 << 16)).abs() <= step, "{:?}", model.wmmat);
        assert_eq!(model.wmmat[0] % step, 0);
        assert_eq!(model.wmmat[1] % step, 0);
    }
}

#[test]
fn pair_estimation_is_deterministic() {
    let cur = texture(96, 80, 0, 0);
    let refd = texture(96, 80, -2, 1);
    let (cur_s, ref_s) = (surface(&cur, 96, 80), surface(&refd, 96, 80));
    let first = estimate_pair_global_motion(&cur_s, &ref_s, true).unwrap();
    for _ in 0..3 {
        assert_eq!(estimate_pair_global_motion(&cur_s, &ref_s, true).unwrap(), first);
    }
}

#[test]
fn mismatched_sizes_are_an_error() {
    let cur = texture(64, 64, 0, 0);
    let refd = texture(64, 32, 0, 0);
    let err = estimate_pair_global_motion(&surface(&cur, 64, 64), &surface(&refd, 64, 32), true)
        .unwrap_err();
    assert!(matches!(
        err,
        GlobalMotionError::DimensionMismatch {
            width: 64,
            height: 64,
            ref_width: 64,
            ref_height: 32
        }
    ));
}

#[test]
fn frame_search_classifies_a_translated_reference() {
    let current = pyramid(&texture(128, 128, 0, 0), 128);
    let shifted = pyramid(&texture(128, 128, 3, 2), 128);
    let same = pyramid(&texture(128, 128, 0, 0), 128);
    let list0 = vec![shifted, same];
    let distortion = distortion(20, 128, 128);
    let picture = CurrentPicture {
        pyramid: &current,
        references: [list0.as_slice(), &[]],
        block_distortion: &distortion,
    };
    let cfg = SearchConfig {
        slice_type: SliceType::P,
        ref_list_count: [2, 0],
        ref_list_count_try: [2, 0],
        ..SearchConfig::default()
    };

    let mut state = FrameMotionState::default();
    estimate_frame_global_motion(&mut state, &cfg, &picture).unwrap();
    assert_eq!(state.model(0, 0).wmtype, TransformationType::TRANSLATION);
    // the translation ended the search before the second reference
    assert_eq!(*state.model(0, 1), WarpedMotionModel::IDENTITY);
    assert_eq!(state.is_global_motion, [[false; 4]; 2]);
}

const ZOOM_SIZE: usize = 192;

#[test]
fn zoom_is_found_as_rotzoom() {
    let cur = texture(ZOOM_SIZE, ZOOM_SIZE, 0, 0);
    let refd = zoomed_texture(ZOOM_SIZE, ZOOM_SIZE, 1.03, 0.0);
    let (cur_s, ref_s) = (
        surface(&cur, ZOOM_SIZE, ZOOM_SIZE),
        surface(&refd, ZOOM_SIZE, ZOOM_SIZE),
    );

    let model = estimate_pair_global_motion(&cur_s, &ref_s, true).unwrap();
    // accepted at the cheaper class, so the affine pass never ran
    assert_eq!(model.wmtype, TransformationType::ROTZOOM, "{:?}", model.wmmat);
    assert_eq!(model.wmmat[4], -model.wmmat[3]);
    assert_eq!(model.wmmat[5], model.wmmat[2]);
    assert!((model.wmmat[2] - 67502).abs() < 400, "{:?}", model.wmmat);
    assert!(model.wmmat[3].abs() < 200, "{:?}", model.wmmat);
    // the centre stays in place: c = (1 - zoom) * 96 pixels
    let expected_offset = (-0.03 * 96.0 * 65536.0) as i32;
    assert!((model.wmmat[0] - expected_offset).abs() < 1 << 16, "{:?}", model.wmmat);
    assert!((model.wmmat[1] - expected_offset).abs() < 1 << 16, "{:?}", model.wmmat);
}

#[test]
fn rotation_is_found_as_rotzoom() {
    let cur = texture(ZOOM_SIZE, ZOOM_SIZE, 0, 0);
    let refd = zoomed_texture(ZOOM_SIZE, ZOOM_SIZE, 1.0, 0.02);
    let model = estimate_pair_global_motion(
        &surface(&cur, ZOOM_SIZE, ZOOM_SIZE),
        &surface(&refd, ZOOM_SIZE, ZOOM_SIZE),
        true,
    )
    .unwrap();

    assert_eq!(model.wmtype, TransformationType::ROTZOOM, "{:?}", model.wmmat);
    // cos(0.02) and -sin(0.02) in model precision
    assert!((model.wmmat[2] - 65523).abs() < 200, "{:?}", model.wmmat);
    assert!((model.wmmat[3] + 1311).abs() < 200, "{:?}", model.wmmat);
    assert_eq!(model.wmmat[4], -model.wmmat[3]);
}

#[test]
fn noisy_zoom_fails_the_error_advantage_gate() {
    let cur = texture(ZOOM_SIZE, ZOOM_SIZE, 0, 0);
    let mut refd = zoomed_texture(ZOOM_SIZE, ZOOM_SIZE, 1.03, 0.0);
    add_noise(&mut refd, 120);
    let (cur_s, ref_s) = (
        surface(&cur, ZOOM_SIZE, ZOOM_SIZE),
        surface(&refd, ZOOM_SIZE, ZOOM_SIZE),
    );

    let mut strict = FeatureBasedEstimator::new(ErrorAdvantageType::Strict);
    let model = strict.estimate(&cur_s, &ref_s, true).unwrap();
    assert_eq!(model, WarpedMotionModel::IDENTITY);
}

#[test]
fn frame_search_flags_a_zoomed_reference() {
    let cur = texture(ZOOM_SIZE, ZOOM_SIZE, 0, 0);
    let current = pyramid(&cur, ZOOM_SIZE);
    let list0 = vec![pyramid(&zoomed_texture(ZOOM_SIZE, ZOOM_SIZE, 1.03, 0.0), ZOOM_SIZE)];
    let distortion = distortion(20, ZOOM_SIZE, ZOOM_SIZE);
    let picture = CurrentPicture {
        pyramid: &current,
        references: [list0.as_slice(), &[]],
        block_distortion: &distortion,
    };
    let cfg = SearchConfig {
        slice_type: SliceType::P,
        ref_list_count: [1, 0],
        ref_list_count_try: [1, 0],
        ..SearchConfig::default()
    };

    let mut state = FrameMotionState::default();
    estimate_frame_global_motion(&mut state, &cfg, &picture).unwrap();
    assert_eq!(state.model(0, 0).wmtype, TransformationType::ROTZOOM);
    assert!(state.is_global_motion[0][0]);
    assert_eq!(state.is_global_motion[0][1..], [false; 3]);
}
