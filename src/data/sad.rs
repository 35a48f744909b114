use v_frame::pixel::{CastFromPrimitive, Pixel};

use super::surface::PixelSurface;

/// Side of the blocks distortion statistics are gathered on
pub const DISTORTION_BLOCK_SIZE: usize = 64;

/// Sum of absolute differences over the area shared by two surfaces.
pub(crate) fn sad_surface<T: Pixel>(src: &PixelSurface<'_, T>, dst: &PixelSurface<'_, T>) -> u64 {
    let width = src.width().min(dst.width());

    src.rows_iter()
        .zip(dst.rows_iter())
        .map(|(src, dst)| {
            src[..width]
                .iter()
                .zip(&dst[..width])
                .map(|(&p1, &p2)| i32::cast_from(p1).abs_diff(i32::cast_from(p2)) as u64)
                .sum::<u64>()
        })
        .sum()
}

fn sad_block<T: Pixel>(
    src: &PixelSurface<'_, T>,
    dst: &PixelSurface<'_, T>,
    x: usize,
    y: usize,
    w: usize,
    h: usize,
) -> u32 {
    (y..y + h)
        .map(|row| {
            src.row(row)[x..x + w]
                .iter()
                .zip(&dst.row(row)[x..x + w])
                .map(|(&p1, &p2)| i32::cast_from(p1).abs_diff(i32::cast_from(p2)))
                .sum::<u32>()
        })
        .sum()
}

/// Zero-motion SAD of every [`DISTORTION_BLOCK_SIZE`] block, in raster order.
///
/// Blocks on the right and bottom edges are clipped to the picture. This is
/// the distortion input of the search-depth controller when no motion
/// estimation statistics are available.
#[inline]
pub fn block_distortion<T: Pixel>(
    current: &PixelSurface<'_, T>,
    reference: &PixelSurface<'_, T>,
) -> Vec<u32> {
    let width = current.width().min(reference.width());
    let height = current.height().min(reference.height());

    let mut stats = Vec::with_capacity(
        width.div_ceil(DISTORTION_BLOCK_SIZE) * height.div_ceil(DISTORTION_BLOCK_SIZE),
    );
    for y in (0..height).step_by(DISTORTION_BLOCK_SIZE) {
        let h = DISTORTION_BLOCK_SIZE.min(height - y);
        for x in (0..width).step_by(DISTORTION_BLOCK_SIZE) {
            let w = DISTORTION_BLOCK_SIZE.min(width - x);
            stats.push(sad_block(current, reference, x, y, w, h));
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sad_of_identical_surfaces_is_zero() {
        let data: Vec<u16> = (0..64).map(|v| v * 13).collect();
        let surface = PixelSurface::new(&data, 8, 8, 8, 10).unwrap();
        assert_eq!(sad_surface(&surface, &surface), 0);
    }

    #[test]
    fn sad_counts_every_difference() {
        let a = vec![10u8; 16];
        let b = vec![7u8; 16];
        let sa = PixelSurface::new(&a, 4, 4, 4, 8).unwrap();
        let sb = PixelSurface::new(&b, 4, 4, 4, 8).unwrap();
        assert_eq!(sad_surface(&sa, &sb), 48);
        assert_eq!(sad_surface(&sb, &sa), 48);
    }

    #[test]
    fn block_distortion_clips_edge_blocks() {
        let a = vec![5u8; 100 * 70];
        let b = vec![3u8; 100 * 70];
        let sa = PixelSurface::new(&a, 100, 100, 70, 8).unwrap();
        let sb = PixelSurface::new(&b, 100, 100, 70, 8).unwrap();
        let stats = block_distortion(&sa, &sb);
        assert_eq!(stats, vec![64 * 64 * 2, 36 * 64 * 2, 64 * 6 * 2, 36 * 6 * 2]);
    }
}
