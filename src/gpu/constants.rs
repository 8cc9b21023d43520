//! GPU data layout and kernel constants.
//!
//! Record strides are in f32 lanes and match the 64/16/32-byte packed
//! layouts; integer fields travel as exact small integers in f32.

pub(crate) const SHAPE_STRIDE: u32 = 16;
pub(crate) const CLIP_STRIDE: u32 = 4;
pub(crate) const MASK_STRIDE: u32 = 8;

/// Shapes whose opacity * mask factor falls below this are skipped.
pub(crate) const OPACITY_CUTOFF: f32 = 1.0e-5;
/// Alpha at or below this collapses to transparent when unpremultiplying.
pub(crate) const ALPHA_FLOOR: f32 = 1.0e-5;
/// Guards the even-odd intersection against horizontal edges.
pub(crate) const EVEN_ODD_EPSILON: f32 = 1.0e-6;
