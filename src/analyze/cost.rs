//! Signalling cost of a model and the error-advantage gate.

use crate::data::warp::{
    GM_ABS_TRANS_BITS,
    GM_ABS_TRANS_ONLY_BITS,
    GM_ALPHA_MAX,
    GM_ALPHA_PREC_BITS,
    GM_ALPHA_PREC_DIFF,
    GM_TRANS_ONLY_PREC_DIFF,
    GM_TRANS_PREC_DIFF,
    TransformationType,
    WarpedMotionModel,
};

/// Parameter of the sub-exponential code used for model coefficients
const SUBEXPFIN_K: u32 = 3;

/// Scale of bit costs, in units of 1/512 bit
const PROB_COST_SHIFT: u32 = 9;

/// Largest warp/frame error ratio accepted, per strictness
const ERRORADV_TR: [f64; 3] = [0.65, 0.60, 0.55];

/// Largest product of error ratio and parameter cost accepted, per strictness
const ERRORADV_PROD_TR: [f64; 3] = [20000.0, 18000.0, 16000.0];

/// How strictly a model has to beat the unwarped reference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "binary", derive(clap::ValueEnum))]
pub enum ErrorAdvantageType {
    /// Accepts models with modest gains
    Relaxed,
    /// In-between thresholds
    Moderate,
    /// Demands the largest gain
    #[default]
    Strict,
}

impl ErrorAdvantageType {
    const fn index(self) -> usize {
        match self {
            ErrorAdvantageType::Relaxed => 0,
            ErrorAdvantageType::Moderate => 1,
            ErrorAdvantageType::Strict => 2,
        }
    }
}

/// Whether a model is worth signalling.
///
/// `error_ratio` is the warp error divided by the unwarped frame error and
/// `params_cost` the output of [`params_cost`].
#[inline]
pub fn is_enough_error_advantage(
    error_ratio: f64,
    params_cost: u32,
    error_advantage: ErrorAdvantageType,
) -> bool {
    let t = error_advantage.index();
    error_ratio < ERRORADV_TR[t] && error_ratio * f64::from(params_cost) < ERRORADV_PROD_TR[t]
}

/// Cost of signalling `model` relative to `reference`, in 1/512 bits.
#[inline]
pub fn params_cost(
    model: &WarpedMotionModel,
    reference: &WarpedMotionModel,
    allow_high_precision_mv: bool,
) -> u32 {
    let m = &model.wmmat;
    let r = &reference.wmmat;
    let alpha_n = (GM_ALPHA_MAX + 1) as u32;
    let alpha_one = 1 << GM_ALPHA_PREC_BITS;
    let mut cost = 0;

    if model.wmtype >= TransformationType::ROTZOOM {
        cost += count_signed_refsubexpfin(
            alpha_n,
            (r[2] >> GM_ALPHA_PREC_DIFF) - alpha_one,
            (m[2] >> GM_ALPHA_PREC_DIFF) - alpha_one,
        );
        cost += count_signed_refsubexpfin(
            alpha_n,
            r[3] >> GM_ALPHA_PREC_DIFF,
            m[3] >> GM_ALPHA_PREC_DIFF,
        );
        if model.wmtype >= TransformationType::AFFINE {
            cost += count_signed_refsubexpfin(
                alpha_n,
                r[4] >> GM_ALPHA_PREC_DIFF,
                m[4] >> GM_ALPHA_PREC_DIFF,
            );
            cost += count_signed_refsubexpfin(
                alpha_n,
                (r[5] >> GM_ALPHA_PREC_DIFF) - alpha_one,
                (m[5] >> GM_ALPHA_PREC_DIFF) - alpha_one,
            );
        }
    }

    if model.wmtype >= TransformationType::TRANSLATION {
        let lowp = u32::from(!allow_high_precision_mv);
        let (trans_bits, prec_diff) = if model.wmtype == TransformationType::TRANSLATION {
            (GM_ABS_TRANS_ONLY_BITS - lowp, GM_TRANS_ONLY_PREC_DIFF + lowp)
        } else {
            (GM_ABS_TRANS_BITS, GM_TRANS_PREC_DIFF)
        };
        let n = (1 << trans_bits) + 1;
        cost += count_signed_refsubexpfin(n, r[0] >> prec_diff, m[0] >> prec_diff);
        cost += count_signed_refsubexpfin(n, r[1] >> prec_diff, m[1] >> prec_diff);
    }

    cost << PROB_COST_SHIFT
}

/// Bits of a quasi-uniform code for `v` in `[0, n)`.
const fn count_quniform(n: u32, v: u32) -> u32 {
    if n <= 1 {
        return 0;
    }
    let l = 32 - n.leading_zeros();
    let m = (1 << l) - n;
    if v < m { l - 1 } else { l }
}

/// Bits of a finite sub-exponential code for `v` in `[0, n)`.
const fn count_subexpfin(n: u32, k: u32, v: u32) -> u32 {
    let mut count = 0;
    let mut i = 0;
    let mut mk = 0;
    loop {
        let b = if i > 0 { k + i - 1 } else { k };
        let a = 1 << b;
        if n <= mk + 3 * a {
            return count + count_quniform(n - mk, v - mk);
        }
        count += 1;
        if v >= mk + a {
            i += 1;
            mk += a;
        } else {
            return count + b;
        }
    }
}

const fn recenter_nonneg(r: u32, v: u32) -> u32 {
    if v > (r << 1) {
        v
    } else if v >= r {
        (v - r) << 1
    } else {
        ((r - v) << 1) - 1
    }
}

/// Maps `v` to a value that is small when it is close to `r`.
const fn recenter_finite_nonneg(n: u32, r: u32, v: u32) -> u32 {
    if (r << 1) <= n {
        recenter_nonneg(r, v)
    } else {
        recenter_nonneg(n - 1 - r, n - 1 - v)
    }
}

/// Bits of a signed value in `(-n, n)` coded relative to `reference`.
fn count_signed_refsubexpfin(n: u32, reference: i32, v: i32) -> u32 {
    let offset = n as i32 - 1;
    let scaled_n = (n << 1) - 1;
    let r = (reference + offset).clamp(0, scaled_n as i32 - 1) as u32;
    let v = (v + offset).clamp(0, scaled_n as i32 - 1) as u32;
    count_subexpfin(scaled_n, SUBEXPFIN_K, recenter_finite_nonneg(scaled_n, r, v))
}
