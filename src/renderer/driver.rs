//! Frame driver: backend fallback, re-entrancy gate, and stats.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::scene::PackedScene;

use super::cpu::CpuRenderer;
use super::renderer::GpuRenderer;
use super::types::{Backend, BackendKind, Frame, RenderError, RenderOptions, RenderStats};

/// Drives one frame at a time through the backend chain (GPU, then CPU).
///
/// Backend failures that only concern the GPU path (missing adapter, launch
/// failure, readback timeout) route the frame to the CPU renderer; scene
/// errors abort the frame. An overlapping render attempt is dropped, not
/// queued.
pub struct FrameDriver {
    gpu: Option<GpuRenderer>,
    cpu: CpuRenderer,
    in_flight: AtomicBool,
    stats: Mutex<RenderStats>,
}

impl Default for FrameDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDriver {
    /// Driver with the default GPU device and CPU fallback.
    pub fn new() -> Self {
        Self::with_gpu(Some(GpuRenderer::new()))
    }

    /// Driver that only ever uses the portable CPU backend.
    pub fn cpu_only() -> Self {
        Self::with_gpu(None)
    }

    fn with_gpu(gpu: Option<GpuRenderer>) -> Self {
        Self {
            gpu,
            cpu: CpuRenderer::new(),
            in_flight: AtomicBool::new(false),
            stats: Mutex::new(RenderStats::default()),
        }
    }

    /// Render one frame, trying backends in priority order.
    pub fn render(&self, scene: &PackedScene, options: &RenderOptions) -> Result<Frame, RenderError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("frame dropped: another frame is in flight");
            self.with_stats(|stats| stats.dropped_frames += 1);
            return Err(RenderError::FrameDropped);
        }
        let _gate = FlightGuard(&self.in_flight);

        if options.use_gpu {
            if let Some(gpu) = &self.gpu {
                match gpu.render(scene, options) {
                    Ok(frame) => {
                        self.record_success(BackendKind::Gpu);
                        return Ok(frame);
                    }
                    Err(err @ RenderError::InvalidScene(_)) => return Err(err),
                    Err(err) => {
                        if matches!(err, RenderError::ReadbackFailed(_)) {
                            self.with_stats(|stats| stats.readback_failures += 1);
                        }
                        warn!(error = %err, "gpu backend failed, falling back to cpu");
                    }
                }
            }
        }

        let frame = self.cpu.render(scene, options)?;
        self.record_success(BackendKind::Cpu);
        Ok(frame)
    }

    /// Snapshot of the accounting counters.
    pub fn stats(&self) -> RenderStats {
        self.stats.lock().map(|stats| *stats).unwrap_or_default()
    }

    fn record_success(&self, backend: BackendKind) {
        debug!(backend = backend.label(), "frame rendered");
        self.with_stats(|stats| {
            stats.frames += 1;
            match backend {
                BackendKind::Gpu => stats.gpu_frames += 1,
                BackendKind::Cpu => stats.cpu_frames += 1,
            }
            stats.last_backend = Some(backend);
        });
    }

    fn with_stats(&self, update: impl FnOnce(&mut RenderStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }
}

/// Releases the re-entrancy gate when the frame attempt ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::geometry::PathBuilder;
    use crate::scene::{Canvas, FillRule};

    fn small_scene() -> PackedScene {
        let mut canvas = Canvas::new(32, 32);
        let mut path = PathBuilder::new();
        path.rect(4.0, 4.0, 16.0, 16.0);
        canvas.fill_path(&path, Color::rgb8(0, 255, 0), FillRule::EvenOdd);
        canvas.build().unwrap()
    }

    #[test]
    fn cpu_only_driver_serves_frames_and_counts_them() {
        let driver = FrameDriver::cpu_only();
        let scene = small_scene();
        let options = RenderOptions::default();
        driver.render(&scene, &options).unwrap();
        driver.render(&scene, &options).unwrap();
        let stats = driver.stats();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.cpu_frames, 2);
        assert_eq!(stats.gpu_frames, 0);
        assert_eq!(stats.last_backend, Some(BackendKind::Cpu));
    }

    #[test]
    fn gate_drops_an_overlapping_frame() {
        let driver = FrameDriver::cpu_only();
        driver.in_flight.store(true, Ordering::Release);
        let err = driver
            .render(&small_scene(), &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::FrameDropped));
        assert_eq!(driver.stats().dropped_frames, 1);

        // Releasing the gate lets the next frame through.
        driver.in_flight.store(false, Ordering::Release);
        driver
            .render(&small_scene(), &RenderOptions::default())
            .unwrap();
    }

    #[test]
    fn gate_is_released_after_a_frame() {
        let driver = FrameDriver::cpu_only();
        driver
            .render(&small_scene(), &RenderOptions::default())
            .unwrap();
        assert!(!driver.in_flight.load(Ordering::Acquire));
    }
}
