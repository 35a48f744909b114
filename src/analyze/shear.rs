//! Shear decomposition of warped models.

use crate::data::warp::{WARPEDMODEL_PREC_BITS, WarpedMotionModel, round_power_of_two_signed};

/// Bits dropped from each shear parameter before the validity test
const WARP_PARAM_REDUCE_BITS: u32 = 6;

/// The four shear parameters a warp filter is driven by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShearParams {
    /// Horizontal scale minus one
    pub alpha: i16,
    /// Horizontal shear
    pub beta: i16,
    /// Vertical shear
    pub gamma: i16,
    /// Vertical scale minus one, after removing the horizontal shear
    pub delta: i16,
}

impl ShearParams {
    /// Decomposes the matrix part of `model`.
    ///
    /// Returns `None` when the horizontal scale is not positive.
    #[inline]
    pub fn from_model(model: &WarpedMotionModel) -> Option<Self> {
        let m = &model.wmmat;
        if m[2] <= 0 {
            return None;
        }
        let one = 1i64 << WARPEDMODEL_PREC_BITS;
        let m2 = i64::from(m[2]);

        let alpha = i64::from(m[2]) - one;
        let beta = i64::from(m[3]);
        let gamma = div_round(i64::from(m[4]) * one, m2);
        let delta = i64::from(m[5]) - div_round(i64::from(m[3]) * i64::from(m[4]), m2) - one;

        Some(Self {
            alpha: reduce(alpha),
            beta: reduce(beta),
            gamma: reduce(gamma),
            delta: reduce(delta),
        })
    }

    /// Whether a warp filter can apply these parameters without exceeding
    /// its support.
    #[inline]
    pub const fn is_allowed(&self) -> bool {
        let (alpha, beta) = (self.alpha.unsigned_abs() as i32, self.beta.unsigned_abs() as i32);
        let (gamma, delta) = (self.gamma.unsigned_abs() as i32, self.delta.unsigned_abs() as i32);
        4 * alpha + 7 * beta < (1 << WARPEDMODEL_PREC_BITS)
            && 4 * gamma + 4 * delta < (1 << WARPEDMODEL_PREC_BITS)
    }
}

/// Whether `model` decomposes into valid shear parameters.
#[inline]
pub fn is_shear_valid(model: &WarpedMotionModel) -> bool {
    ShearParams::from_model(model).is_some_and(|shear| shear.is_allowed())
}

/// Divides rounding half away from zero; `den` must be positive.
const fn div_round(num: i64, den: i64) -> i64 {
    if num < 0 {
        -((-num + den / 2) / den)
    } else {
        (num + den / 2) / den
    }
}

/// Clamps to 16 bits, then drops the low precision bits.
fn reduce(value: i64) -> i16 {
    let clamped = value.clamp(i64::from(i16::MIN), i64::from(i16::MAX));
    let reduced =
        round_power_of_two_signed(clamped, WARP_PARAM_REDUCE_BITS) << WARP_PARAM_REDUCE_BITS;
    reduced.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
}
