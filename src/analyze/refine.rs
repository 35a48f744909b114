//! Warp error measurement and integer parameter refinement.

use v_frame::pixel::{CastFromPrimitive, Pixel};

use crate::data::{
    sad::sad_surface,
    surface::PixelSurface,
    warp::{
        GM_ALPHA_MAX,
        GM_ALPHA_PREC_DIFF,
        GM_ROW3HOMO_MAX,
        GM_ROW3HOMO_PREC_DIFF,
        GM_TRANS_MAX,
        GM_TRANS_PREC_DIFF,
        TransformationType,
        WARPEDMODEL_PREC_BITS,
        WarpedMotionModel,
    },
};

/// Number of refinement passes, each halving the step
pub const REFINE_ITERATIONS: u32 = 5;

/// Block over which the warp error is accumulated before checking for early exit
const WARP_ERROR_BLOCK: usize = 8;

/// Bits of sub-pixel precision used when sampling the reference
const WARP_SUBPEL_BITS: u32 = 6;
const WARP_SUBPEL_ONE: i64 = 1 << WARP_SUBPEL_BITS;

/// Sum of absolute differences between the two pictures, without any warp.
#[inline]
pub fn frame_error<T: Pixel>(
    current: &PixelSurface<'_, T>,
    reference: &PixelSurface<'_, T>,
) -> u64 {
    sad_surface(current, reference)
}

/// Sum of absolute differences between the current picture and the reference
/// warped by `model`.
///
/// Accumulation stops as soon as a block pushes the total past `best_error`,
/// in which case the partial total is returned.
#[inline]
pub fn warp_error<T: Pixel>(
    model: &WarpedMotionModel,
    current: &PixelSurface<'_, T>,
    reference: &PixelSurface<'_, T>,
    best_error: u64,
) -> u64 {
    let mut error = 0u64;
    for by in (0..current.height()).step_by(WARP_ERROR_BLOCK) {
        for bx in (0..current.width()).step_by(WARP_ERROR_BLOCK) {
            let y_end = (by + WARP_ERROR_BLOCK).min(current.height());
            let x_end = (bx + WARP_ERROR_BLOCK).min(current.width());
            for y in by..y_end {
                let row = current.row(y);
                for x in bx..x_end {
                    let predicted = warped_sample(model, reference, x, y);
                    let actual = i32::cast_from(row[x]);
                    error += u64::from((actual - predicted).unsigned_abs());
                }
            }
            if error > best_error {
                return error;
            }
        }
    }
    error
}

/// Bilinearly interpolates the reference at the projection of `(x, y)`.
fn warped_sample<T: Pixel>(
    model: &WarpedMotionModel,
    reference: &PixelSurface<'_, T>,
    x: usize,
    y: usize,
) -> i32 {
    let (px, py) = model.project(x as i64, y as i64);
    let shift = WARPEDMODEL_PREC_BITS - WARP_SUBPEL_BITS;
    let px = round_shift(px, shift);
    let py = round_shift(py, shift);

    let ix = px >> WARP_SUBPEL_BITS;
    let iy = py >> WARP_SUBPEL_BITS;
    let fx = px & (WARP_SUBPEL_ONE - 1);
    let fy = py & (WARP_SUBPEL_ONE - 1);

    let a = i64::from(reference.px_clamped(ix, iy));
    let b = i64::from(reference.px_clamped(ix + 1, iy));
    let c = i64::from(reference.px_clamped(ix, iy + 1));
    let d = i64::from(reference.px_clamped(ix + 1, iy + 1));

    let top = a * (WARP_SUBPEL_ONE - fx) + b * fx;
    let bottom = c * (WARP_SUBPEL_ONE - fx) + d * fx;
    let value = top * (WARP_SUBPEL_ONE - fy) + bottom * fy;
    ((value + (1 << (2 * WARP_SUBPEL_BITS - 1))) >> (2 * WARP_SUBPEL_BITS)) as i32
}

/// Rounds to nearest, halves toward positive infinity.
const fn round_shift(value: i64, shift: u32) -> i64 {
    (value + (1 << (shift - 1))) >> shift
}

/// Moves parameter `index` by `offset` steps of its signalled precision,
/// keeping it inside its signalling range.
fn add_param_offset(index: usize, value: i32, offset: i32) -> i32 {
    let (scale, clamp) = match index {
        0 | 1 => (GM_TRANS_PREC_DIFF, GM_TRANS_MAX),
        2..=5 => (GM_ALPHA_PREC_DIFF, GM_ALPHA_MAX),
        _ => (GM_ROW3HOMO_PREC_DIFF, GM_ROW3HOMO_MAX),
    };
    let centre = if index == 2 || index == 5 {
        1 << WARPEDMODEL_PREC_BITS
    } else {
        0
    };
    let v = ((value - centre) >> scale) + offset;
    (v.clamp(-clamp, clamp) << scale) + centre
}

/// Sets one coefficient, keeping the coefficients derived from it in line
/// with the class.
fn set_param(model: &mut WarpedMotionModel, wmtype: TransformationType, index: usize, value: i32) {
    model.wmmat[index] = value;
    model.force_type(wmtype);
}

/// Coordinate descent over the integer parameters of `model`.
///
/// Each parameter the model class uses is probed on both sides with a step
/// that halves every pass; an improving direction is followed until the
/// error stops decreasing. The model is forced back to its class and
/// retagged afterwards. Returns the best warp error found, which never
/// exceeds `best_frame_error`.
#[inline]
pub fn refine_integerized_param<T: Pixel>(
    model: &mut WarpedMotionModel,
    current: &PixelSurface<'_, T>,
    reference: &PixelSurface<'_, T>,
    iterations: u32,
    best_frame_error: u64,
) -> u64 {
    let wmtype = model.wmtype;
    let n_params = wmtype.param_count();

    model.force_type(wmtype);
    let mut best_error =
        warp_error(model, current, reference, best_frame_error).min(best_frame_error);

    let mut step = if iterations == 0 { 0 } else { 1 << (iterations - 1) };
    for _ in 0..iterations {
        for p in 0..n_params {
            let initial = model.wmmat[p];
            let mut best_param = initial;
            let mut direction = 0;

            for dir in [-1, 1] {
                set_param(model, wmtype, p, add_param_offset(p, initial, dir * step));
                let err = warp_error(model, current, reference, best_error);
                if err < best_error {
                    best_error = err;
                    best_param = model.wmmat[p];
                    direction = dir;
                }
            }
            set_param(model, wmtype, p, best_param);

            while direction != 0 {
                set_param(model, wmtype, p, add_param_offset(p, best_param, direction * step));
                let err = warp_error(model, current, reference, best_error);
                if err < best_error {
                    best_error = err;
                    best_param = model.wmmat[p];
                } else {
                    set_param(model, wmtype, p, best_param);
                    direction = 0;
                }
            }
        }
        step >>= 1;
    }

    model.force_type(wmtype);
    model.wmtype = model.derive_type();
    best_error
}
