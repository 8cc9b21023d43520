//! Renderer-side limits shared by upload and binning.

/// Largest integer exactly representable in an f32 lane.
pub(crate) const MAX_F32_INT: usize = 16_777_216;

/// Readback rows are padded to this many bytes (copy-to-buffer pitch).
pub(crate) const READBACK_ROW_ALIGN: usize = 256;
