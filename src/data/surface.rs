use v_frame::{
    pixel::{CastFromPrimitive, Pixel},
    plane::Plane,
};

use crate::error::GlobalMotionError;

/// Bit depths a surface may carry
pub(crate) const SUPPORTED_BIT_DEPTHS: std::ops::RangeInclusive<usize> = 8..=16;

/// Read-only view over the luma samples of a picture.
///
/// `data` starts at the visible origin of the picture, so `(0, 0)` is the
/// top-left visible pixel. Rows are `stride` samples apart.
#[derive(Debug, Clone, Copy)]
pub struct PixelSurface<'a, T: Pixel> {
    data: &'a [T],
    stride: usize,
    width: usize,
    height: usize,
    bit_depth: usize,
}

impl<'a, T: Pixel> PixelSurface<'a, T> {
    /// Wraps raw samples.
    ///
    /// # Errors
    ///
    /// - If `width` or `height` is zero
    /// - If `bit_depth` is outside 8 to 16
    /// - If the geometry does not fit into `data`
    #[inline]
    pub fn new(
        data: &'a [T],
        stride: usize,
        width: usize,
        height: usize,
        bit_depth: usize,
    ) -> Result<Self, GlobalMotionError> {
        if width == 0 || height == 0 {
            return Err(GlobalMotionError::EmptySurface { width, height });
        }
        if !SUPPORTED_BIT_DEPTHS.contains(&bit_depth) {
            return Err(GlobalMotionError::UnsupportedBitDepth { bit_depth });
        }
        let needed = stride
            .checked_mul(height - 1)
            .and_then(|rows| rows.checked_add(width))
            .unwrap_or(usize::MAX);
        if stride < width || needed > data.len() {
            return Err(GlobalMotionError::SurfaceOutOfBounds {
                width,
                height,
                stride,
                needed,
                len: data.len(),
            });
        }

        Ok(Self {
            data,
            stride,
            width,
            height,
            bit_depth,
        })
    }

    /// Views the visible area of a `v_frame` plane.
    ///
    /// # Errors
    ///
    /// - If the plane has an empty visible area
    #[inline]
    pub fn from_plane(plane: &'a Plane<T>, bit_depth: usize) -> Result<Self, GlobalMotionError> {
        Self::new(
            plane.data_origin(),
            plane.cfg.stride,
            plane.cfg.width,
            plane.cfg.height,
            bit_depth,
        )
    }

    /// Width of the visible area in pixels.
    #[inline]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height of the visible area in pixels.
    #[inline]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Bit depth of the samples.
    #[inline]
    pub const fn bit_depth(&self) -> usize {
        self.bit_depth
    }

    /// Visible samples of row `y`.
    #[inline]
    pub fn row(&self, y: usize) -> &'a [T] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Iterates over the visible rows from top to bottom.
    #[inline]
    pub fn rows_iter(&self) -> impl Iterator<Item = &'a [T]> + '_ {
        (0..self.height).map(move |y| self.row(y))
    }

    /// Sample at `(x, y)` widened to `i32`.
    #[inline]
    pub fn px(&self, x: usize, y: usize) -> i32 {
        i32::cast_from(self.data[y * self.stride + x])
    }

    /// Sample at `(x, y)` with coordinates clamped to the visible area.
    ///
    /// Equivalent to reading from a picture padded by edge replication.
    #[inline]
    pub fn px_clamped(&self, x: i64, y: i64) -> i32 {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.px(x, y)
    }

    /// Whether both surfaces cover the same area.
    #[inline]
    pub const fn same_size(&self, other: &PixelSurface<'_, T>) -> bool {
        self.width == other.width && self.height == other.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_surface() {
        let data = [0u8; 16];
        assert!(matches!(
            PixelSurface::new(&data, 4, 0, 4, 8),
            Err(GlobalMotionError::EmptySurface { .. })
        ));
    }

    #[test]
    fn rejects_short_buffer() {
        let data = [0u8; 15];
        assert!(matches!(
            PixelSurface::new(&data, 4, 4, 4, 8),
            Err(GlobalMotionError::SurfaceOutOfBounds { needed: 16, .. })
        ));
    }

    #[test]
    fn rejects_geometry_that_overflows() {
        let data = [7u8; 4];
        assert!(matches!(
            PixelSurface::new(&data, usize::MAX / 2 + 1, 1, 3, 8),
            Err(GlobalMotionError::SurfaceOutOfBounds {
                needed: usize::MAX,
                len: 4,
                ..
            })
        ));
        assert!(matches!(
            PixelSurface::new(&data, usize::MAX, usize::MAX, 2, 8),
            Err(GlobalMotionError::SurfaceOutOfBounds { .. })
        ));
    }

    #[test]
    fn rejects_unsupported_bit_depths() {
        let data = [0u16; 16];
        for bit_depth in [0, 7, 17, 40] {
            assert!(matches!(
                PixelSurface::new(&data, 4, 4, 4, bit_depth),
                Err(GlobalMotionError::UnsupportedBitDepth { bit_depth: b }) if b == bit_depth
            ));
        }
        for bit_depth in [8, 10, 12, 16] {
            let surface = PixelSurface::new(&data, 4, 4, 4, bit_depth).unwrap();
            assert_eq!(surface.bit_depth(), bit_depth);
        }
    }

    #[test]
    fn last_row_may_be_short_of_stride() {
        let data = [0u8; 14];
        let surface = PixelSurface::new(&data, 5, 4, 3, 8).unwrap();
        assert_eq!(surface.row(2).len(), 4);
    }

    #[test]
    fn clamped_reads_replicate_edges() {
        let data: Vec<u8> = (0..16).collect();
        let surface = PixelSurface::new(&data, 4, 4, 4, 8).unwrap();
        assert_eq!(surface.px_clamped(-3, -1), 0);
        assert_eq!(surface.px_clamped(7, 0), 3);
        assert_eq!(surface.px_clamped(2, 9), 14);
        assert_eq!(surface.px(1, 2), 9);
    }
}
