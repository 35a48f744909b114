use std::io::Read;

use num_rational::Rational32;
use v_frame::{pixel::Pixel, plane::Plane};

/// Properties of the input clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDetails {
    /// Luma width in pixels
    pub width: usize,
    /// Luma height in pixels
    pub height: usize,
    /// Bits per sample
    pub bit_depth: usize,
    /// Frames per second
    pub frame_rate: Rational32,
}

/// Reads the luma planes of a y4m clip.
pub struct Decoder<R: Read> {
    inner: y4m::Decoder<R>,
    details: VideoDetails,
}

impl<R: Read> Decoder<R> {
    /// Parses the stream header.
    ///
    /// # Errors
    ///
    /// - If the input is not a y4m stream
    #[inline]
    pub fn new(reader: R) -> anyhow::Result<Self> {
        let inner = y4m::Decoder::new(reader)?;
        let framerate = inner.get_framerate();
        let details = VideoDetails {
            width: inner.get_width(),
            height: inner.get_height(),
            bit_depth: inner.get_colorspace().get_bit_depth(),
            frame_rate: Rational32::new(framerate.num as i32, framerate.den as i32),
        };
        Ok(Self { inner, details })
    }

    /// Properties read from the stream header.
    #[inline]
    pub const fn get_video_details(&self) -> VideoDetails {
        self.details
    }

    /// Reads the luma plane of the next frame.
    ///
    /// # Errors
    ///
    /// - If a frame cannot be read, including at the end of the stream
    #[inline]
    pub fn read_luma_plane<T: Pixel>(&mut self) -> anyhow::Result<Plane<T>> {
        let bytes = self.inner.get_bytes_per_sample();
        let VideoDetails { width, height, .. } = self.details;
        let frame = self.inner.read_frame()?;

        let mut plane = Plane::new(width, height, 0, 0, 0, 0);
        plane.copy_from_raw_u8(frame.get_y_plane(), width * bytes, bytes);
        Ok(plane)
    }
}
