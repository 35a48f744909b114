use v_frame::{pixel::Pixel, plane::Plane};

use super::surface::{PixelSurface, SUPPORTED_BIT_DEPTHS};
use crate::error::GlobalMotionError;

/// Resolution tier the global motion search runs at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "binary", derive(clap::ValueEnum))]
pub enum ResolutionTier {
    /// Full resolution
    #[default]
    Full,
    /// Half width and half height
    Quarter,
    /// Quarter width and quarter height
    Sixteenth,
}

/// How the lower pyramid tiers were produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "binary", derive(clap::ValueEnum))]
pub enum DownsamplingMethod {
    /// Box-filtered average of each source block
    #[default]
    Filtered,
    /// Top-left sample of each source block
    Decimated,
}

/// Luma plane of a picture together with its downscaled tiers.
///
/// Both the current picture and each reference carry one, so the search can
/// swap every buffer for the same tier.
#[derive(Debug, Clone)]
pub struct PyramidPicture<T: Pixel> {
    bit_depth: usize,
    full: Plane<T>,
    quarter_filtered: Plane<T>,
    quarter_decimated: Plane<T>,
    sixteenth_filtered: Plane<T>,
    sixteenth_decimated: Plane<T>,
}

impl<T: Pixel> PyramidPicture<T> {
    /// Smallest picture dimension that still yields a non-empty sixteenth tier
    pub const MIN_DIMENSION: usize = 4;

    /// Builds every tier from a full resolution luma plane.
    ///
    /// # Errors
    ///
    /// - If the picture is narrower or shorter than [`Self::MIN_DIMENSION`]
    /// - If `bit_depth` is outside 8 to 16
    #[inline]
    pub fn new(luma: Plane<T>, bit_depth: usize) -> Result<Self, GlobalMotionError> {
        let (width, height) = (luma.cfg.width, luma.cfg.height);
        if width < Self::MIN_DIMENSION || height < Self::MIN_DIMENSION {
            return Err(GlobalMotionError::EmptySurface { width, height });
        }
        if !SUPPORTED_BIT_DEPTHS.contains(&bit_depth) {
            return Err(GlobalMotionError::UnsupportedBitDepth { bit_depth });
        }

        let quarter_filtered = luma.downscale::<2>();
        let quarter_decimated = decimate::<T, 2>(&luma);
        let sixteenth_filtered = luma.downscale::<4>();
        let sixteenth_decimated = decimate::<T, 4>(&luma);

        Ok(Self {
            bit_depth,
            full: luma,
            quarter_filtered,
            quarter_decimated,
            sixteenth_filtered,
            sixteenth_decimated,
        })
    }

    /// Full resolution luma plane.
    #[inline]
    pub const fn luma(&self) -> &Plane<T> {
        &self.full
    }

    /// The plane for a given tier and downsampling method.
    #[inline]
    pub const fn plane(&self, tier: ResolutionTier, method: DownsamplingMethod) -> &Plane<T> {
        match (tier, method) {
            (ResolutionTier::Full, _) => &self.full,
            (ResolutionTier::Quarter, DownsamplingMethod::Filtered) => &self.quarter_filtered,
            (ResolutionTier::Quarter, DownsamplingMethod::Decimated) => &self.quarter_decimated,
            (ResolutionTier::Sixteenth, DownsamplingMethod::Filtered) => &self.sixteenth_filtered,
            (ResolutionTier::Sixteenth, DownsamplingMethod::Decimated) => {
                &self.sixteenth_decimated
            }
        }
    }

    /// A read-only view of the plane for a given tier and downsampling method.
    ///
    /// # Errors
    ///
    /// - If the plane has an empty visible area
    #[inline]
    pub fn surface(
        &self,
        tier: ResolutionTier,
        method: DownsamplingMethod,
    ) -> Result<PixelSurface<'_, T>, GlobalMotionError> {
        PixelSurface::from_plane(self.plane(tier, method), self.bit_depth)
    }
}

/// Keeps the top-left sample of every `SCALE`x`SCALE` block.
fn decimate<T: Pixel, const SCALE: usize>(src: &Plane<T>) -> Plane<T> {
    let width = src.cfg.width / SCALE;
    let height = src.cfg.height / SCALE;
    let stride = src.cfg.stride;
    let origin = src.data_origin();

    let mut samples = Vec::with_capacity(width * height);
    for y in 0..height {
        let row = &origin[y * SCALE * stride..];
        samples.extend(row.iter().step_by(SCALE).take(width).copied());
    }
    plane_from_samples(&samples, width, height)
}

/// Copies tightly packed samples into a new unpadded plane.
pub(crate) fn plane_from_samples<T: Pixel>(samples: &[T], width: usize, height: usize) -> Plane<T> {
    let mut plane = Plane::new(width, height, 0, 0, 0, 0);
    let stride = plane.cfg.stride;
    for (dst, src) in plane
        .data_origin_mut()
        .chunks_mut(stride)
        .zip(samples.chunks_exact(width))
    {
        dst[..width].copy_from_slice(src);
    }
    plane
}
