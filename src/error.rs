use std::collections::TryReserveError;

use thiserror::Error;

/// Failures that abort a global motion estimation call.
///
/// Degenerate inputs (no corners, no inliers, a rejected model) are not
/// errors; they produce an identity model instead.
#[derive(Debug, Error)]
pub enum GlobalMotionError {
    /// The RANSAC candidate pool could not be allocated.
    #[error("failed to allocate the candidate pool: {0}")]
    CandidatePoolAllocation(#[from] TryReserveError),

    /// A pixel surface with zero width or height was supplied.
    #[error("pixel surface has an empty dimension ({width}x{height})")]
    EmptySurface {
        /// Surface width in pixels
        width: usize,
        /// Surface height in pixels
        height: usize,
    },

    /// Samples are wider than 16 bits or narrower than 8 bits.
    #[error("unsupported bit depth {bit_depth}, expected 8 to 16")]
    UnsupportedBitDepth {
        /// Requested bits per sample
        bit_depth: usize,
    },

    /// The requested surface geometry does not fit the backing samples.
    #[error("{width}x{height} surface with stride {stride} needs {needed} samples, only {len} available")]
    SurfaceOutOfBounds {
        /// Surface width in pixels
        width: usize,
        /// Surface height in pixels
        height: usize,
        /// Distance between rows in samples
        stride: usize,
        /// Samples required by the geometry, saturated on overflow
        needed: usize,
        /// Samples available
        len: usize,
    },

    /// The reference surface does not have the current surface's size.
    #[error("reference surface is {ref_width}x{ref_height}, current surface is {width}x{height}")]
    DimensionMismatch {
        /// Current surface width
        width: usize,
        /// Current surface height
        height: usize,
        /// Reference surface width
        ref_width: usize,
        /// Reference surface height
        ref_height: usize,
    },

    /// The configuration asks for more references than the list holds.
    #[error("reference list {list} holds {available} pictures but {requested} were requested")]
    MissingReference {
        /// Reference list index
        list: usize,
        /// Pictures supplied for this list
        available: usize,
        /// Pictures requested by the configuration
        requested: usize,
    },

    /// The configuration exceeds the per-list reference depth.
    #[error("reference list {list} requests {requested} pictures, at most {max} are supported")]
    TooManyReferences {
        /// Reference list index
        list: usize,
        /// Pictures requested by the configuration
        requested: usize,
        /// Supported list depth
        max: usize,
    },
}
