pub(crate) mod blend;
pub(crate) mod convert;
pub(crate) mod convert_wide;
pub(crate) mod kernel;
pub(crate) mod pipeline;
