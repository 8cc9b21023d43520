//! GPU kernels and data layout constants.

pub(crate) mod constants;
mod kernels;

pub(crate) use kernels::*;
