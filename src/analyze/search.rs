use log::debug;

/// Average distortion at or below which the search is skipped
const GMV_ME_SAD_TH_0: u64 = 0;
/// Average distortion below which one reference per list is searched
const GMV_ME_SAD_TH_1: u64 = 5;
/// Average distortion below which two references per list are searched
const GMV_ME_SAD_TH_2: u64 = 10;

/// How many references per list the global motion search may try.
///
/// Derived from the average per-pixel motion estimation distortion of the
/// frame: static content gets a cheap search, strong motion the full one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum SearchLevel {
    /// Do not estimate; every model stays identity
    Skip,
    /// At most one reference per list
    UpToOne,
    /// At most two references per list
    UpToTwo,
    /// Every configured reference
    All,
}

impl SearchLevel {
    /// Maps an average per-pixel distortion to a level.
    #[inline]
    pub const fn from_average_distortion(average: u64) -> Self {
        if average <= GMV_ME_SAD_TH_0 {
            SearchLevel::Skip
        } else if average < GMV_ME_SAD_TH_1 {
            SearchLevel::UpToOne
        } else if average < GMV_ME_SAD_TH_2 {
            SearchLevel::UpToTwo
        } else {
            SearchLevel::All
        }
    }

    /// Derives the level from per-block distortion of a `width`x`height` frame.
    #[inline]
    pub fn from_block_distortion(block_distortion: &[u32], width: usize, height: usize) -> Self {
        let average = average_distortion(block_distortion, width, height);
        let level = Self::from_average_distortion(average);
        debug!("[GM] average distortion {} -> search level {:?}", average, level);
        level
    }

    /// Limit on references per list, `None` when unlimited.
    #[inline]
    pub const fn reference_cap(self) -> Option<usize> {
        match self {
            SearchLevel::Skip => Some(0),
            SearchLevel::UpToOne => Some(1),
            SearchLevel::UpToTwo => Some(2),
            SearchLevel::All => None,
        }
    }

    /// Number of references to try out of `available`.
    #[inline]
    pub fn references_to_try(self, available: usize) -> usize {
        self.reference_cap()
            .map_or(available, |cap| available.min(cap))
    }
}

/// Total block distortion divided by the frame area, rounded down.
///
/// An empty frame has zero average distortion.
#[inline]
pub fn average_distortion(block_distortion: &[u32], width: usize, height: usize) -> u64 {
    let pixels = (width * height) as u64;
    if pixels == 0 {
        return 0;
    }
    let total: u64 = block_distortion.iter().map(|&d| u64::from(d)).sum();
    total / pixels
}
