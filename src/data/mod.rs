pub(crate) mod pyramid;
pub(crate) mod sad;
pub(crate) mod surface;
pub(crate) mod warp;
