//! FAST-9 interest point detection.

use log::trace;
use v_frame::pixel::Pixel;

use crate::data::surface::PixelSurface;

/// Upper bound on the corners kept per picture
pub const MAX_CORNERS: usize = 4096;

/// Contrast an arc pixel needs over the centre at 8-bit depth
const FAST_BARRIER: i32 = 18;

/// Contiguous arc length for a corner
const FAST_ARC: usize = 9;

/// Radius of the Bresenham circle
const FAST_RADIUS: usize = 3;

/// Bresenham circle of radius 3, clockwise from the top.
const CIRCLE: [(isize, isize); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Integer pixel position of a detected corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Corner {
    /// Column
    pub x: i32,
    /// Row
    pub y: i32,
}

/// Detects up to `max_count` FAST-9 corners in raster order.
///
/// A pixel is a corner if 9 contiguous pixels of the surrounding circle are
/// all brighter, or all darker, than it by more than the barrier. Corners
/// that are not the strongest of their 3x3 neighbourhood are suppressed.
#[inline]
pub fn detect_corners<T: Pixel>(surface: &PixelSurface<'_, T>, max_count: usize) -> Vec<Corner> {
    let width = surface.width();
    let height = surface.height();
    if width <= 2 * FAST_RADIUS || height <= 2 * FAST_RADIUS || max_count == 0 {
        return Vec::new();
    }

    let barrier = FAST_BARRIER << surface.bit_depth().saturating_sub(8);
    let mut scores = vec![0i32; width * height];
    let mut candidates = Vec::new();

    for y in FAST_RADIUS..height - FAST_RADIUS {
        for x in FAST_RADIUS..width - FAST_RADIUS {
            if let Some(score) = corner_score(surface, x, y, barrier) {
                scores[y * width + x] = score;
                candidates.push((x, y));
            }
        }
    }

    let corners: Vec<Corner> = candidates
        .into_iter()
        .filter(|&(x, y)| is_local_maximum(&scores, width, x, y))
        .take(max_count)
        .map(|(x, y)| Corner {
            x: x as i32,
            y: y as i32,
        })
        .collect();

    trace!("[GM] {} corners in {}x{} picture", corners.len(), width, height);
    corners
}

/// Segment test; returns the corner strength when it passes.
fn corner_score<T: Pixel>(
    surface: &PixelSurface<'_, T>,
    x: usize,
    y: usize,
    barrier: i32,
) -> Option<i32> {
    let centre = surface.px(x, y);
    let mut diffs = [0i32; 16];
    for (d, &(dx, dy)) in diffs.iter_mut().zip(CIRCLE.iter()) {
        *d = surface.px(x.wrapping_add_signed(dx), y.wrapping_add_signed(dy)) - centre;
    }

    let brighter = has_arc(&diffs, |d| d > barrier);
    let darker = has_arc(&diffs, |d| d < -barrier);
    if !brighter && !darker {
        return None;
    }

    let bright_score: i32 = diffs.iter().filter(|&&d| d > barrier).map(|&d| d - barrier).sum();
    let dark_score: i32 = diffs.iter().filter(|&&d| d < -barrier).map(|&d| -d - barrier).sum();
    Some(match (brighter, darker) {
        (true, false) => bright_score,
        (false, true) => dark_score,
        _ => bright_score.max(dark_score),
    })
}

fn has_arc(diffs: &[i32; 16], pass: impl Fn(i32) -> bool) -> bool {
    let mut run = 0;
    // walk the circle twice so runs may wrap around
    for i in 0..diffs.len() + FAST_ARC - 1 {
        if pass(diffs[i % diffs.len()]) {
            run += 1;
            if run >= FAST_ARC {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Non-maximum suppression; ties go to the first pixel in raster order.
fn is_local_maximum(scores: &[i32], width: usize, x: usize, y: usize) -> bool {
    let idx = y * width + x;
    let score = scores[idx];
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            let n_idx = ny * width + nx;
            if n_idx == idx {
                continue;
            }
            let other = scores[n_idx];
            if other > score || (other == score && n_idx < idx) {
                return false;
            }
        }
    }
    true
}
