//! Fixed-point warped motion models.

/// Internal precision of warped motion models
pub const WARPEDMODEL_PREC_BITS: u32 = 16;

const GM_TRANS_PREC_BITS: u32 = 6;
pub(crate) const GM_ABS_TRANS_BITS: u32 = 12;
pub(crate) const GM_ABS_TRANS_ONLY_BITS: u32 = 9;
const GM_TRANS_ONLY_PREC_BITS: u32 = 3;
pub(crate) const GM_ALPHA_PREC_BITS: u32 = 15;
const GM_ABS_ALPHA_BITS: u32 = 12;
const GM_ROW3HOMO_PREC_BITS: u32 = 16;
const GM_ABS_ROW3HOMO_BITS: u32 = 11;

pub(crate) const GM_TRANS_PREC_DIFF: u32 = WARPEDMODEL_PREC_BITS - GM_TRANS_PREC_BITS;
pub(crate) const GM_TRANS_ONLY_PREC_DIFF: u32 = WARPEDMODEL_PREC_BITS - GM_TRANS_ONLY_PREC_BITS;
pub(crate) const GM_ALPHA_PREC_DIFF: u32 = WARPEDMODEL_PREC_BITS - GM_ALPHA_PREC_BITS;
pub(crate) const GM_ROW3HOMO_PREC_DIFF: u32 = WARPEDMODEL_PREC_BITS - GM_ROW3HOMO_PREC_BITS;

const GM_TRANS_DECODE_FACTOR: i32 = 1 << GM_TRANS_PREC_DIFF;
/// Scale applied to quantized pure-translation coefficients
pub const GM_TRANS_ONLY_DECODE_FACTOR: i32 = 1 << GM_TRANS_ONLY_PREC_DIFF;
const GM_ALPHA_DECODE_FACTOR: i32 = 1 << GM_ALPHA_PREC_DIFF;
const GM_ROW3HOMO_DECODE_FACTOR: i32 = 1 << GM_ROW3HOMO_PREC_DIFF;

pub(crate) const GM_TRANS_MAX: i32 = 1 << GM_ABS_TRANS_BITS;
pub(crate) const GM_ALPHA_MAX: i32 = 1 << GM_ABS_ALPHA_BITS;
pub(crate) const GM_ROW3HOMO_MAX: i32 = 1 << GM_ABS_ROW3HOMO_BITS;

/// Translations below one `1/64` pel step are dropped for pure translations
const MIN_TRANS_THRESH: i32 = GM_TRANS_DECODE_FACTOR;

const IDENTITY_PARAMS: [f64; 8] = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Class of a warped motion model, ordered by complexity.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum TransformationType {
    /// No motion
    #[default]
    IDENTITY = 0,
    /// Pure translation
    TRANSLATION = 1,
    /// Rotation, uniform zoom and translation
    ROTZOOM = 2,
    /// General six-parameter affine transform
    AFFINE = 3,
}

impl TransformationType {
    /// Number of parameters the class may change.
    #[inline]
    pub const fn param_count(self) -> usize {
        match self {
            TransformationType::IDENTITY => 0,
            TransformationType::TRANSLATION => 2,
            TransformationType::ROTZOOM => 4,
            TransformationType::AFFINE => 6,
        }
    }
}

/// A frame-wide warped motion model in `WARPEDMODEL_PREC_BITS` fixed point.
///
/// A current-picture position `(x, y)` maps to the reference position
/// `(wmmat[2] * x + wmmat[3] * y + wmmat[0], wmmat[4] * x + wmmat[5] * y + wmmat[1])`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct WarpedMotionModel {
    /// Class of the model
    pub wmtype: TransformationType,
    /// Fixed-point coefficients
    pub wmmat: [i32; 8],
}

impl Default for WarpedMotionModel {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl WarpedMotionModel {
    /// The identity model.
    pub const IDENTITY: Self = Self {
        wmtype: TransformationType::IDENTITY,
        wmmat: [
            0,
            0,
            1 << WARPEDMODEL_PREC_BITS,
            0,
            0,
            1 << WARPEDMODEL_PREC_BITS,
            0,
            0,
        ],
    };

    /// Raw floating point parameters of the identity transform.
    #[inline]
    pub const fn identity_params() -> [f64; 8] {
        IDENTITY_PARAMS
    }

    /// Quantizes raw floating point parameters into a model.
    ///
    /// Each coefficient is rounded to the precision it is signalled with and
    /// clamped to its signalling range. The class is derived from the result.
    #[inline]
    pub fn from_params(params: &[f64; 8]) -> Self {
        let mut wmmat = [0i32; 8];
        let mut alpha_present = false;

        for i in 0..2 {
            let v = quantize(params[i], GM_TRANS_PREC_BITS);
            wmmat[i] = v.clamp(-GM_TRANS_MAX, GM_TRANS_MAX) * GM_TRANS_DECODE_FACTOR;
        }
        for i in 2..6 {
            let diag = if i == 2 || i == 5 {
                1 << GM_ALPHA_PREC_BITS
            } else {
                0
            };
            let v = (quantize(params[i], GM_ALPHA_PREC_BITS) - diag)
                .clamp(-GM_ALPHA_MAX, GM_ALPHA_MAX);
            alpha_present |= v != 0;
            wmmat[i] = (v + diag) * GM_ALPHA_DECODE_FACTOR;
        }
        for i in 6..8 {
            let v = quantize(params[i], GM_ROW3HOMO_PREC_BITS)
                .clamp(-GM_ROW3HOMO_MAX, GM_ROW3HOMO_MAX);
            alpha_present |= v != 0;
            wmmat[i] = v * GM_ROW3HOMO_DECODE_FACTOR;
        }

        if !alpha_present
            && wmmat[0].abs() < MIN_TRANS_THRESH
            && wmmat[1].abs() < MIN_TRANS_THRESH
        {
            wmmat[0] = 0;
            wmmat[1] = 0;
        }

        let mut model = Self {
            wmtype: TransformationType::IDENTITY,
            wmmat,
        };
        model.wmtype = model.derive_type();
        model
    }

    /// Classifies the coefficients.
    #[inline]
    pub const fn derive_type(&self) -> TransformationType {
        let m = &self.wmmat;
        let one = 1 << WARPEDMODEL_PREC_BITS;
        if m[2] == one && m[3] == 0 && m[4] == 0 && m[5] == one {
            if m[0] == 0 && m[1] == 0 {
                TransformationType::IDENTITY
            } else {
                TransformationType::TRANSLATION
            }
        } else if m[2] == m[5] && m[3] == -m[4] {
            TransformationType::ROTZOOM
        } else {
            TransformationType::AFFINE
        }
    }

    /// Resets the coefficients a class may not use and tags the model with it.
    pub(crate) const fn force_type(&mut self, wmtype: TransformationType) {
        let m = &mut self.wmmat;
        if matches!(wmtype, TransformationType::IDENTITY) {
            m[0] = 0;
            m[1] = 0;
        }
        if matches!(
            wmtype,
            TransformationType::IDENTITY | TransformationType::TRANSLATION
        ) {
            m[2] = 1 << WARPEDMODEL_PREC_BITS;
            m[3] = 0;
        }
        if !matches!(wmtype, TransformationType::AFFINE) {
            m[4] = -m[3];
            m[5] = m[2];
        }
        m[6] = 0;
        m[7] = 0;
        self.wmtype = wmtype;
    }

    /// Rounds pure-translation coefficients to motion vector precision.
    ///
    /// Translations are kept at `1/8` pel with high precision motion vectors
    /// and at `1/4` pel otherwise, then scaled back to model precision.
    #[inline]
    pub const fn quantize_translation(&mut self, allow_high_precision_mv: bool) {
        let hp = allow_high_precision_mv;
        self.wmmat[0] = convert_to_trans_prec(hp, self.wmmat[0]) * GM_TRANS_ONLY_DECODE_FACTOR;
        self.wmmat[1] = convert_to_trans_prec(hp, self.wmmat[1]) * GM_TRANS_ONLY_DECODE_FACTOR;
    }

    /// Maps a current-picture position to the reference, in model precision.
    #[inline]
    pub const fn project(&self, x: i64, y: i64) -> (i64, i64) {
        let m = &self.wmmat;
        (
            m[2] as i64 * x + m[3] as i64 * y + m[0] as i64,
            m[4] as i64 * x + m[5] as i64 * y + m[1] as i64,
        )
    }
}

fn quantize(value: f64, bits: u32) -> i32 {
    (value * f64::from(1u32 << bits) + 0.5).floor() as i32
}

/// Rounds `value / 2^n` half away from zero.
#[inline]
pub(crate) const fn round_power_of_two_signed(value: i64, n: u32) -> i64 {
    if n == 0 {
        return value;
    }
    if value < 0 {
        -((-value + (1 << (n - 1))) >> n)
    } else {
        (value + (1 << (n - 1))) >> n
    }
}

const fn convert_to_trans_prec(allow_high_precision_mv: bool, coor: i32) -> i32 {
    if allow_high_precision_mv {
        round_power_of_two_signed(coor as i64, WARPEDMODEL_PREC_BITS - 3) as i32
    } else {
        round_power_of_two_signed(coor as i64, WARPEDMODEL_PREC_BITS - 2) as i32 * 2
    }
}
