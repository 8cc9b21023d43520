//! Deterministic content digests for scenes and frames.
//!
//! FNV-1a over the packed buffers, used by parity tests to compare CPU and
//! GPU output and to pin scene packing across refactors. Floats hash by
//! bit pattern, so equal digests mean bit-identical content.

use crate::renderer::Frame;
use crate::scene::PackedScene;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

struct Fnv1a(u64);

impl Fnv1a {
    fn new() -> Self {
        Self(FNV_OFFSET)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    fn write_u32(&mut self, value: u32) {
        self.write(&value.to_le_bytes());
    }

    fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }
}

/// Digest of every buffer in a packed scene.
pub fn scene_digest(scene: &PackedScene) -> u64 {
    let mut hasher = Fnv1a::new();
    let u = &scene.uniforms;
    for value in [u.canvas_w, u.canvas_h, u.tile_size, u.tiles_x, u.supersample] {
        hasher.write_u32(value);
    }
    for shape in &scene.shapes {
        for value in [
            shape.v_start,
            shape.v_count,
            shape.rule,
            shape.clip_start,
            shape.clip_count,
            shape.mask_start,
            shape.mask_count,
        ] {
            hasher.write_u32(value);
        }
        for channel in shape.color {
            hasher.write_f32(channel);
        }
        hasher.write_f32(shape.opacity);
    }
    for clip in &scene.clips {
        for value in [clip.v_start, clip.v_count, clip.rule] {
            hasher.write_u32(value);
        }
    }
    for mask in &scene.masks {
        for value in [mask.v_start, mask.v_count, mask.rule] {
            hasher.write_u32(value);
        }
        hasher.write_f32(mask.alpha);
    }
    for &v in &scene.vertices {
        hasher.write_f32(v);
    }
    for &r in &scene.refs {
        hasher.write_u32(r);
    }
    for &v in &scene.tile_offset_counts {
        hasher.write_u32(v);
    }
    for &v in &scene.tile_shape_indices {
        hasher.write_u32(v);
    }
    hasher.0
}

/// Digest of a frame's pixels. Row padding is excluded so frames with
/// different pitches but identical pixels hash alike.
pub fn frame_digest(frame: &Frame) -> u64 {
    let mut hasher = Fnv1a::new();
    hasher.write_u32(frame.width);
    hasher.write_u32(frame.height);
    let row = frame.width as usize * 4;
    for y in 0..frame.height as usize {
        let base = y * frame.row_pitch;
        hasher.write(&frame.bytes[base..base + row]);
    }
    hasher.0
}
