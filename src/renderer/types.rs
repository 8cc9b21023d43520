//! Backend capability trait, render options, frames, and error types.

use std::time::Duration;

use cubecl::prelude::LaunchError;
use thiserror::Error;

use crate::scene::PackedScene;

/// Rendering configuration shared by every backend.
#[derive(Debug, Copy, Clone)]
pub struct RenderOptions {
    /// Try the GPU backend before falling back to the CPU.
    pub use_gpu: bool,
    /// Upper bound on waiting for GPU completion and readback mapping.
    pub readback_timeout: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            use_gpu: true,
            readback_timeout: Duration::from_secs(2),
        }
    }
}

/// Render-time error conditions.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Scene parameters are inconsistent or overflow the renderer limits.
    #[error("invalid scene: {0}")]
    InvalidScene(&'static str),
    /// GPU kernel launch failed.
    #[error("gpu kernel launch failed: {0:?}")]
    Launch(LaunchError),
    /// No usable GPU device or queue; callers should fall back to the CPU.
    #[error("gpu backend unavailable")]
    BackendUnavailable,
    /// Waiting for completion or mapping the readback failed; the frame is
    /// dropped and previously published state is untouched.
    #[error("frame readback failed: {0}")]
    ReadbackFailed(&'static str),
    /// A frame was already in flight; the second attempt is dropped.
    #[error("a frame is already in flight")]
    FrameDropped,
}

/// Which backend produced a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Gpu,
    Cpu,
}

impl BackendKind {
    /// Short human-readable backend name.
    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Gpu => "gpu",
            BackendKind::Cpu => "cpu",
        }
    }
}

/// Straight-alpha RGBA8 output image, top-left origin, row-major, with an
/// explicit row pitch (GPU readbacks pad rows to the copy alignment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row including padding; at least `width * 4`.
    pub row_pitch: usize,
    pub bytes: Vec<u8>,
}

impl Frame {
    /// RGBA bytes of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let base = y as usize * self.row_pitch + x as usize * 4;
        [
            self.bytes[base],
            self.bytes[base + 1],
            self.bytes[base + 2],
            self.bytes[base + 3],
        ]
    }

    /// Tightly packed RGBA bytes with row padding stripped.
    pub fn to_rgba(&self) -> Vec<u8> {
        let row = self.width as usize * 4;
        let mut out = Vec::with_capacity(row * self.height as usize);
        for y in 0..self.height as usize {
            let base = y * self.row_pitch;
            out.extend_from_slice(&self.bytes[base..base + row]);
        }
        out
    }
}

/// Rasterizer capability: turn a packed scene into an RGBA frame.
///
/// Implementations must agree byte-for-byte on identical scenes.
pub trait Backend {
    /// Which backend this is, for stats and logging.
    fn kind(&self) -> BackendKind;

    /// Rasterize one frame.
    fn render(&self, scene: &PackedScene, options: &RenderOptions) -> Result<Frame, RenderError>;
}

/// Per-driver frame accounting.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames successfully rendered.
    pub frames: u64,
    /// Frames served by the GPU backend.
    pub gpu_frames: u64,
    /// Frames served by the CPU backend.
    pub cpu_frames: u64,
    /// Frames dropped by the re-entrancy gate.
    pub dropped_frames: u64,
    /// Readback failures observed on the GPU path.
    pub readback_failures: u64,
    /// Backend that served the most recent frame.
    pub last_backend: Option<BackendKind>,
}
