//! Per-pixel rasterization kernel.
//!
//! One invocation per pixel in 8x8 workgroups. The sample loop, clip
//! AND-test, additive mask mix, and premultiplied `over` mirror the CPU
//! backend operation for operation so frames match byte for byte.

use cubecl::prelude::*;

use crate::gpu::constants::*;

use super::math::*;

#[cube(launch_unchecked)]
pub(crate) fn raster_pixels(
    shape_data: &Array<f32>,
    vertex_data: &Array<f32>,
    tile_offset_counts: &Array<u32>,
    tile_shape_indices: &Array<u32>,
    clip_data: &Array<f32>,
    mask_data: &Array<f32>,
    ref_data: &Array<u32>,
    width: u32,
    height: u32,
    tile_size: u32,
    tiles_x: u32,
    tiles_y: u32,
    supersample: u32,
    output: &mut Array<u32>,
) {
    let x = ABSOLUTE_POS_X;
    let y = ABSOLUTE_POS_Y;
    if x >= width || y >= height {
        terminate!();
    }

    let mut tx = x / tile_size;
    if tx > tiles_x - 1 {
        tx = tiles_x - 1;
    }
    let mut ty = y / tile_size;
    if ty > tiles_y - 1 {
        ty = tiles_y - 1;
    }
    let tile = ty * tiles_x + tx;
    let start = tile_offset_counts[tile * 2];
    let count = tile_offset_counts[tile * 2 + 1];

    let mut ss = supersample;
    if ss == u32::new(0) {
        ss = u32::new(1);
    }
    let inv_ss = f32::new(1.0) / f32::cast_from(ss);

    let mut accum_r = f32::new(0.0);
    let mut accum_g = f32::new(0.0);
    let mut accum_b = f32::new(0.0);
    let mut accum_a = f32::new(0.0);

    for sy in 0..ss {
        for sx in 0..ss {
            let px = f32::cast_from(x) + (f32::cast_from(sx) + f32::new(0.5)) * inv_ss;
            let py = f32::cast_from(y) + (f32::cast_from(sy) + f32::new(0.5)) * inv_ss;

            let mut color_r = f32::new(0.0);
            let mut color_g = f32::new(0.0);
            let mut color_b = f32::new(0.0);
            let mut color_a = f32::new(0.0);

            for k in 0..count {
                let shape_id = tile_shape_indices[start + k];
                let base = shape_id * SHAPE_STRIDE;
                let v_start = shape_data[base] as u32;
                let v_count = shape_data[base + 1] as u32;
                let rule = shape_data[base + 2] as u32;

                if point_in_polygon(vertex_data, v_start, v_count, rule, px, py) {
                    let clip_start = shape_data[base + 8] as u32;
                    let clip_count = shape_data[base + 9] as u32;
                    let mut clipped = false;
                    for c in 0..clip_count {
                        let clip_id = ref_data[clip_start + c];
                        let clip_base = clip_id * CLIP_STRIDE;
                        let clip_v_start = clip_data[clip_base] as u32;
                        let clip_v_count = clip_data[clip_base + 1] as u32;
                        let clip_rule = clip_data[clip_base + 2] as u32;
                        if !point_in_polygon(vertex_data, clip_v_start, clip_v_count, clip_rule, px, py)
                        {
                            clipped = true;
                        }
                    }

                    if !clipped {
                        let mask_start = shape_data[base + 10] as u32;
                        let mask_count = shape_data[base + 11] as u32;
                        let mut mask_value = f32::new(1.0);
                        if mask_count > u32::new(0) {
                            mask_value = f32::new(0.0);
                            for m in 0..mask_count {
                                let mask_id = ref_data[mask_start + m];
                                let mask_base = mask_id * MASK_STRIDE;
                                let mask_v_start = mask_data[mask_base] as u32;
                                let mask_v_count = mask_data[mask_base + 1] as u32;
                                let mask_rule = mask_data[mask_base + 2] as u32;
                                if point_in_polygon(
                                    vertex_data,
                                    mask_v_start,
                                    mask_v_count,
                                    mask_rule,
                                    px,
                                    py,
                                ) {
                                    mask_value +=
                                        (f32::new(1.0) - mask_value) * clamp01(mask_data[mask_base + 4]);
                                }
                            }
                        }

                        let factor = shape_data[base + 12] * mask_value;
                        if factor > f32::new(OPACITY_CUTOFF) {
                            let src_r = shape_data[base + 4] * factor;
                            let src_g = shape_data[base + 5] * factor;
                            let src_b = shape_data[base + 6] * factor;
                            let src_a = shape_data[base + 7] * factor;
                            let inv_a = f32::new(1.0) - src_a;
                            color_r = src_r + inv_a * color_r;
                            color_g = src_g + inv_a * color_g;
                            color_b = src_b + inv_a * color_b;
                            color_a = src_a + inv_a * color_a;
                        }
                    }
                }
            }

            accum_r += color_r;
            accum_g += color_g;
            accum_b += color_b;
            accum_a += color_a;
        }
    }

    let samples = f32::cast_from(ss * ss);
    let avg_r = accum_r / samples;
    let avg_g = accum_g / samples;
    let avg_b = accum_b / samples;
    let avg_a = accum_a / samples;

    // Unpremultiply for straight-alpha storage.
    let a = clamp01(avg_a);
    let mut out_r = f32::new(0.0);
    let mut out_g = f32::new(0.0);
    let mut out_b = f32::new(0.0);
    if a > f32::new(ALPHA_FLOOR) {
        out_r = clamp01(avg_r / a);
        out_g = clamp01(avg_g / a);
        out_b = clamp01(avg_b / a);
    }

    let half = f32::new(0.5);
    let scale = f32::new(255.0);
    let r8 = (out_r * scale + half) as u32;
    let g8 = (out_g * scale + half) as u32;
    let b8 = (out_b * scale + half) as u32;
    let a8 = (a * scale + half) as u32;
    output[y * width + x] = r8 | (g8 << 8) | (b8 << 16) | (a8 << 24);
}
