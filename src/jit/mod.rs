pub(crate) mod codegen;
pub(crate) mod dump;
pub(crate) mod kernels;
pub(crate) mod liveness;
pub(crate) mod locator;
pub(crate) mod machine;
pub(crate) mod program;
pub(crate) mod vector;
