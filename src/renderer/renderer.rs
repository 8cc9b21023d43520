//! GPU rasterizer backend targeting WGPU via CubeCL.
//!
//! Uploads the packed scene as storage arrays, dispatches the per-pixel
//! kernel in 8x8 workgroups, and reads the RGBA8 texels back. The wait for
//! queue completion and readback mapping runs on a worker thread bounded by
//! `RenderOptions::readback_timeout`; a timed-out frame is dropped without
//! touching previously published state.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;

use cubecl::prelude::*;
use cubecl::wgpu::{WgpuDevice, WgpuRuntime};

use crate::gpu;
use crate::scene::PackedScene;

use super::constants::{MAX_F32_INT, READBACK_ROW_ALIGN};
use super::types::{Backend, BackendKind, Frame, RenderError, RenderOptions};

/// GPU rasterizer bound to one WGPU device.
pub struct GpuRenderer {
    device: WgpuDevice,
}

impl Default for GpuRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuRenderer {
    /// Construct a renderer using the default WGPU device.
    pub fn new() -> Self {
        Self {
            device: WgpuDevice::default(),
        }
    }

    /// Construct a renderer with a caller-provided device.
    pub fn with_device(device: WgpuDevice) -> Self {
        Self { device }
    }
}

impl Backend for GpuRenderer {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn render(&self, scene: &PackedScene, options: &RenderOptions) -> Result<Frame, RenderError> {
        let width = scene.uniforms.canvas_w;
        let height = scene.uniforms.canvas_h;
        let row_pitch = (width as usize * 4).next_multiple_of(READBACK_ROW_ALIGN);
        if width == 0 || height == 0 {
            return Ok(Frame {
                width,
                height,
                row_pitch,
                bytes: Vec::new(),
            });
        }

        if scene.vertices.len() / 2 > MAX_F32_INT {
            return Err(RenderError::InvalidScene("too many vertices for f32 indexing"));
        }
        if scene.refs.len() > MAX_F32_INT || scene.shapes.len() > MAX_F32_INT {
            return Err(RenderError::InvalidScene("too many records for f32 indexing"));
        }

        let job = GpuJob {
            width,
            height,
            tile_size: scene.uniforms.tile_size,
            tiles_x: Ord::max(scene.uniforms.tiles_x, 1),
            tiles_y: Ord::max(scene.uniforms.tiles_y(), 1),
            supersample: Ord::max(scene.uniforms.supersample, 1),
            shape_lanes: ensure_nonempty(scene.shape_lanes(), 0.0),
            clip_lanes: ensure_nonempty(scene.clip_lanes(), 0.0),
            mask_lanes: ensure_nonempty(scene.mask_lanes(), 0.0),
            vertices: ensure_nonempty(scene.vertices.clone(), 0.0),
            refs: ensure_nonempty_u32(scene.refs.clone(), 0),
            tile_offset_counts: ensure_nonempty_u32(scene.tile_offset_counts.clone(), 0),
            tile_shape_indices: ensure_nonempty_u32(scene.tile_shape_indices.clone(), 0),
        };

        // Device probing, submit, and readback all happen on the worker so
        // the caller can bound the wait; a dead worker means no adapter.
        let device = self.device.clone();
        let (sender, receiver) = mpsc::channel();
        let _worker = thread::Builder::new()
            .name("tilevg-gpu".into())
            .spawn(move || {
                let _ = sender.send(run_kernel(device, job));
            })
            .map_err(|_| RenderError::BackendUnavailable)?;

        let texels = match receiver.recv_timeout(options.readback_timeout) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                return Err(RenderError::ReadbackFailed("timed out waiting for readback"));
            }
            Err(RecvTimeoutError::Disconnected) => return Err(RenderError::BackendUnavailable),
        };

        // Expand tight texels into 256-byte-aligned rows.
        let mut bytes = vec![0u8; row_pitch * height as usize];
        for y in 0..height as usize {
            let row = &texels[y * width as usize..(y + 1) * width as usize];
            let base = y * row_pitch;
            for (x, texel) in row.iter().enumerate() {
                bytes[base + x * 4..base + x * 4 + 4].copy_from_slice(&texel.to_le_bytes());
            }
        }
        Ok(Frame {
            width,
            height,
            row_pitch,
            bytes,
        })
    }
}

struct GpuJob {
    width: u32,
    height: u32,
    tile_size: u32,
    tiles_x: u32,
    tiles_y: u32,
    supersample: u32,
    shape_lanes: Vec<f32>,
    clip_lanes: Vec<f32>,
    mask_lanes: Vec<f32>,
    vertices: Vec<f32>,
    refs: Vec<u32>,
    tile_offset_counts: Vec<u32>,
    tile_shape_indices: Vec<u32>,
}

fn run_kernel(device: WgpuDevice, job: GpuJob) -> Result<Vec<u32>, RenderError> {
    let client = WgpuRuntime::client(&device);

    let shape_handle = client.create(f32::as_bytes(&job.shape_lanes));
    let vertex_handle = client.create(f32::as_bytes(&job.vertices));
    let tile_oc_handle = client.create(u32::as_bytes(&job.tile_offset_counts));
    let tile_idx_handle = client.create(u32::as_bytes(&job.tile_shape_indices));
    let clip_handle = client.create(f32::as_bytes(&job.clip_lanes));
    let mask_handle = client.create(f32::as_bytes(&job.mask_lanes));
    let ref_handle = client.create(u32::as_bytes(&job.refs));

    let output_len = job.width as usize * job.height as usize;
    let output_handle = client.empty(output_len * core::mem::size_of::<u32>());

    unsafe {
        let cube_dim = CubeDim::new_2d(8, 8);
        let cube_count = CubeCount::new_2d(
            job.width.div_ceil(cube_dim.x),
            job.height.div_ceil(cube_dim.y),
        );
        gpu::raster_pixels::launch_unchecked::<WgpuRuntime>(
            &client,
            cube_count,
            cube_dim,
            ArrayArg::from_raw_parts::<f32>(&shape_handle, job.shape_lanes.len(), 1),
            ArrayArg::from_raw_parts::<f32>(&vertex_handle, job.vertices.len(), 1),
            ArrayArg::from_raw_parts::<u32>(&tile_oc_handle, job.tile_offset_counts.len(), 1),
            ArrayArg::from_raw_parts::<u32>(&tile_idx_handle, job.tile_shape_indices.len(), 1),
            ArrayArg::from_raw_parts::<f32>(&clip_handle, job.clip_lanes.len(), 1),
            ArrayArg::from_raw_parts::<f32>(&mask_handle, job.mask_lanes.len(), 1),
            ArrayArg::from_raw_parts::<u32>(&ref_handle, job.refs.len(), 1),
            ScalarArg::new(job.width),
            ScalarArg::new(job.height),
            ScalarArg::new(job.tile_size),
            ScalarArg::new(job.tiles_x),
            ScalarArg::new(job.tiles_y),
            ScalarArg::new(job.supersample),
            ArrayArg::from_raw_parts::<u32>(&output_handle, output_len, 1),
        )
        .map_err(RenderError::Launch)?;
    }

    let bytes = client.read_one(output_handle);
    Ok(u32::from_bytes(&bytes).to_vec())
}

fn ensure_nonempty(mut data: Vec<f32>, filler: f32) -> Vec<f32> {
    if data.is_empty() {
        data.push(filler);
    }
    data
}

fn ensure_nonempty_u32(mut data: Vec<u32>, filler: u32) -> Vec<u32> {
    if data.is_empty() {
        data.push(filler);
    }
    data
}
