//! Corner matching between the current and the reference picture.

use log::trace;
use rayon::prelude::*;
use v_frame::pixel::Pixel;

use super::corner::Corner;
use crate::data::surface::PixelSurface;

/// Side of the square patch compared around each corner
const MATCH_SZ: i32 = 13;
const MATCH_SZ_BY2: i32 = (MATCH_SZ - 1) / 2;
const MATCH_SZ_SQ: i64 = (MATCH_SZ * MATCH_SZ) as i64;
/// Side of the window searched when refining a match
const SEARCH_SZ: i32 = 9;
const SEARCH_SZ_BY2: i32 = (SEARCH_SZ - 1) / 2;
/// Minimum correlation, relative to the template's own deviation
const THRESHOLD_NCC: f64 = 0.75;

/// A current-picture point and where it was found in the reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Correspondence {
    /// Column in the current picture
    pub x: i32,
    /// Row in the current picture
    pub y: i32,
    /// Column in the reference picture
    pub rx: i32,
    /// Row in the reference picture
    pub ry: i32,
}

const fn is_eligible_point(x: i32, y: i32, width: i32, height: i32) -> bool {
    x >= MATCH_SZ_BY2 && y >= MATCH_SZ_BY2 && x + MATCH_SZ_BY2 < width && y + MATCH_SZ_BY2 < height
}

const fn is_eligible_distance(a: Corner, b: Corner, width: i32, height: i32) -> bool {
    let thresh = (if width < height { height } else { width }) >> 4;
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy <= thresh * thresh
}

/// Sum and sum of squares of the patch centred on `(x, y)`.
fn patch_moments<T: Pixel>(im: &PixelSurface<'_, T>, x: i32, y: i32) -> (i64, i64) {
    let mut sum = 0i64;
    let mut sumsq = 0i64;
    for j in -MATCH_SZ_BY2..=MATCH_SZ_BY2 {
        for i in -MATCH_SZ_BY2..=MATCH_SZ_BY2 {
            let v = i64::from(im.px((x + i) as usize, (y + j) as usize));
            sum += v;
            sumsq += v * v;
        }
    }
    (sum, sumsq)
}

/// Patch variance scaled by the patch area.
fn template_norm<T: Pixel>(im: &PixelSurface<'_, T>, x: i32, y: i32) -> f64 {
    let (sum, sumsq) = patch_moments(im, x, y);
    (sumsq * MATCH_SZ_SQ - sum * sum) as f64
}

/// Covariance of the two patches divided by the deviation of the second.
///
/// The first patch's deviation is constant while matching one template, so
/// it is left out.
fn cross_correlation<T: Pixel>(
    im1: &PixelSurface<'_, T>,
    x1: i32,
    y1: i32,
    im2: &PixelSurface<'_, T>,
    x2: i32,
    y2: i32,
) -> f64 {
    let mut sum1 = 0i64;
    let mut sum2 = 0i64;
    let mut sumsq2 = 0i64;
    let mut cross = 0i64;
    for j in -MATCH_SZ_BY2..=MATCH_SZ_BY2 {
        for i in -MATCH_SZ_BY2..=MATCH_SZ_BY2 {
            let a = i64::from(im1.px((x1 + i) as usize, (y1 + j) as usize));
            let b = i64::from(im2.px((x2 + i) as usize, (y2 + j) as usize));
            sum1 += a;
            sum2 += b;
            sumsq2 += b * b;
            cross += a * b;
        }
    }
    let var2 = sumsq2 * MATCH_SZ_SQ - sum2 * sum2;
    if var2 <= 0 {
        return 0.0;
    }
    let cov = cross * MATCH_SZ_SQ - sum1 * sum2;
    cov as f64 / (var2 as f64).sqrt()
}

/// Matches current-picture corners against reference corners.
///
/// Every eligible current corner is paired with the eligible reference
/// corner within `max(width, height) / 16` pixels that correlates best, if
/// that correlation is strong enough. Matches are then refined locally.
#[inline]
pub fn determine_correspondence<T: Pixel>(
    frame: &PixelSurface<'_, T>,
    frame_corners: &[Corner],
    reference: &PixelSurface<'_, T>,
    ref_corners: &[Corner],
) -> Vec<Correspondence> {
    let width = frame.width() as i32;
    let height = frame.height() as i32;

    let eligible_refs: Vec<Corner> = ref_corners
        .iter()
        .copied()
        .filter(|c| is_eligible_point(c.x, c.y, width, height))
        .collect();

    let mut correspondences: Vec<Correspondence> = frame_corners
        .par_iter()
        .filter(|c| is_eligible_point(c.x, c.y, width, height))
        .filter_map(|&fc| {
            let mut best_ncc = 0.0;
            let mut best = None;
            for &rc in eligible_refs
                .iter()
                .filter(|&&rc| is_eligible_distance(fc, rc, width, height))
            {
                let ncc = cross_correlation(frame, fc.x, fc.y, reference, rc.x, rc.y);
                if ncc > best_ncc {
                    best_ncc = ncc;
                    best = Some(rc);
                }
            }
            let rc = best?;
            (best_ncc > THRESHOLD_NCC * template_norm(frame, fc.x, fc.y).sqrt()).then_some(
                Correspondence {
                    x: fc.x,
                    y: fc.y,
                    rx: rc.x,
                    ry: rc.y,
                },
            )
        })
        .collect();

    improve_correspondence(frame, reference, &mut correspondences);
    trace!(
        "[GM] {} correspondences from {} corners",
        correspondences.len(),
        frame_corners.len()
    );
    correspondences
}

/// Moves each match to the best correlating position within the search window,
/// first in the reference picture, then in the current picture.
fn improve_correspondence<T: Pixel>(
    frame: &PixelSurface<'_, T>,
    reference: &PixelSurface<'_, T>,
    correspondences: &mut [Correspondence],
) {
    let width = frame.width() as i32;
    let height = frame.height() as i32;

    correspondences.par_iter_mut().for_each(|c| {
        let mut best_ncc = 0.0;
        let mut best = (0, 0);
        for dy in -SEARCH_SZ_BY2..=SEARCH_SZ_BY2 {
            for dx in -SEARCH_SZ_BY2..=SEARCH_SZ_BY2 {
                if !is_eligible_point(c.rx + dx, c.ry + dy, width, height) {
                    continue;
                }
                let ncc = cross_correlation(frame, c.x, c.y, reference, c.rx + dx, c.ry + dy);
                if ncc > best_ncc {
                    best_ncc = ncc;
                    best = (dx, dy);
                }
            }
        }
        c.rx += best.0;
        c.ry += best.1;

        let mut best_ncc = 0.0;
        let mut best = (0, 0);
        for dy in -SEARCH_SZ_BY2..=SEARCH_SZ_BY2 {
            for dx in -SEARCH_SZ_BY2..=SEARCH_SZ_BY2 {
                if !is_eligible_point(c.x + dx, c.y + dy, width, height) {
                    continue;
                }
                let ncc = cross_correlation(reference, c.rx, c.ry, frame, c.x + dx, c.y + dy);
                if ncc > best_ncc {
                    best_ncc = ncc;
                    best = (dx, dy);
                }
            }
        }
        c.x += best.0;
        c.y += best.1;
    });
}
