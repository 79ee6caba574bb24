pub(crate) mod graph;
pub(crate) mod palette;
pub(crate) mod pixel_format;
