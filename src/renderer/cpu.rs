//! Portable CPU rasterizer backend.
//!
//! Runs the same per-pixel kernel as the GPU backend over a rayon
//! work-stealing pool, one task per tile row of pixels. The arithmetic here
//! is the reference: the CubeCL kernel mirrors it operation for operation
//! so both backends produce identical bytes.

use rayon::prelude::*;

use crate::color::{over, pack_rgba8, rgba8_bytes, unpremultiply};
#[cfg(test)]
use crate::math::Vec2;
use crate::math::Vec4;
use crate::scene::PackedScene;

use super::types::{Backend, BackendKind, Frame, RenderError, RenderOptions};

// Shapes whose opacity * mask factor falls below this are skipped.
const OPACITY_CUTOFF: f32 = 1.0e-5;
// Guards the even-odd intersection against horizontal edges.
const EVEN_ODD_EPSILON: f32 = 1.0e-6;

/// CPU rasterizer; stateless and always available.
#[derive(Debug, Default, Copy, Clone)]
pub struct CpuRenderer;

impl CpuRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for CpuRenderer {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn render(&self, scene: &PackedScene, _options: &RenderOptions) -> Result<Frame, RenderError> {
        let width = scene.uniforms.canvas_w;
        let height = scene.uniforms.canvas_h;
        let row_pitch = width as usize * 4;
        let mut bytes = vec![0u8; row_pitch * height as usize];
        if width == 0 || height == 0 {
            return Ok(Frame {
                width,
                height,
                row_pitch,
                bytes,
            });
        }

        let band_rows = scene.uniforms.tile_size as usize;
        bytes
            .par_chunks_mut(row_pitch * band_rows)
            .enumerate()
            .for_each(|(band, rows)| {
                let y0 = (band * band_rows) as u32;
                for (row_idx, row) in rows.chunks_exact_mut(row_pitch).enumerate() {
                    let y = y0 + row_idx as u32;
                    for x in 0..width {
                        let texel = render_pixel(scene, x, y);
                        let base = x as usize * 4;
                        row[base..base + 4].copy_from_slice(&rgba8_bytes(texel));
                    }
                }
            });

        Ok(Frame {
            width,
            height,
            row_pitch,
            bytes,
        })
    }
}

/// Rasterize one pixel: SSAA loop, clip AND-test, additive mask mix,
/// premultiplied `over`, then unpremultiplied RGBA8 packing.
pub(crate) fn render_pixel(scene: &PackedScene, x: u32, y: u32) -> u32 {
    let u = &scene.uniforms;
    let tiles_x = u.tiles_x.max(1);
    let tiles_y = u.tiles_y().max(1);
    let tx = (x / u.tile_size).min(tiles_x - 1);
    let ty = (y / u.tile_size).min(tiles_y - 1);
    let tile = (ty * tiles_x + tx) as usize;
    let start = scene.tile_offset_counts[tile * 2];
    let count = scene.tile_offset_counts[tile * 2 + 1];

    let ss = u.supersample.max(1);
    let inv_ss = 1.0 / ss as f32;
    let mut accum = Vec4::ZERO;

    for sy in 0..ss {
        for sx in 0..ss {
            let px = x as f32 + (sx as f32 + 0.5) * inv_ss;
            let py = y as f32 + (sy as f32 + 0.5) * inv_ss;
            let mut color = Vec4::ZERO;

            for k in 0..count {
                let shape_id = scene.tile_shape_indices[(start + k) as usize] as usize;
                debug_assert!(shape_id < scene.shapes.len());
                let shape = &scene.shapes[shape_id];
                if !point_in_polygon(
                    &scene.vertices,
                    shape.v_start,
                    shape.v_count,
                    shape.rule,
                    px,
                    py,
                ) {
                    continue;
                }

                // Every active clip must contain the sample.
                let mut clipped = false;
                for c in 0..shape.clip_count {
                    let clip_id = scene.refs[(shape.clip_start + c) as usize] as usize;
                    let clip = &scene.clips[clip_id];
                    if !point_in_polygon(
                        &scene.vertices,
                        clip.v_start,
                        clip.v_count,
                        clip.rule,
                        px,
                        py,
                    ) {
                        clipped = true;
                        break;
                    }
                }
                if clipped {
                    continue;
                }

                // Masks mix additively in list order.
                let mut mask_value = 1.0f32;
                if shape.mask_count > 0 {
                    mask_value = 0.0;
                    for m in 0..shape.mask_count {
                        let mask_id = scene.refs[(shape.mask_start + m) as usize] as usize;
                        let mask = &scene.masks[mask_id];
                        if point_in_polygon(
                            &scene.vertices,
                            mask.v_start,
                            mask.v_count,
                            mask.rule,
                            px,
                            py,
                        ) {
                            mask_value += (1.0 - mask_value) * mask.alpha.clamp(0.0, 1.0);
                        }
                    }
                }

                let factor = shape.opacity * mask_value;
                if factor <= OPACITY_CUTOFF {
                    continue;
                }
                let src = Vec4::new(
                    shape.color[0] * factor,
                    shape.color[1] * factor,
                    shape.color[2] * factor,
                    shape.color[3] * factor,
                );
                color = over(src, color);
            }
            accum += color;
        }
    }

    let avg = accum / (ss * ss) as f32;
    pack_rgba8(unpremultiply(avg))
}

/// Dispatch on the fill rule (0 = even-odd, 1 = non-zero).
pub(crate) fn point_in_polygon(
    vertices: &[f32],
    v_start: u32,
    v_count: u32,
    rule: u32,
    px: f32,
    py: f32,
) -> bool {
    if rule == 1 {
        inside_non_zero_span(vertices, v_start, v_count, px, py)
    } else {
        inside_even_odd_span(vertices, v_start, v_count, px, py)
    }
}

/// Half-open even-odd parity test over edges `(v_i, v_{i-1})` with wrap.
fn inside_even_odd_span(vertices: &[f32], v_start: u32, v_count: u32, px: f32, py: f32) -> bool {
    let base = v_start as usize * 2;
    let n = v_count as usize;
    debug_assert!(base + n * 2 <= vertices.len());
    let mut inside = false;
    for i in 0..n {
        let j = if i == 0 { n - 1 } else { i - 1 };
        let ax = vertices[base + i * 2];
        let ay = vertices[base + i * 2 + 1];
        let bx = vertices[base + j * 2];
        let by = vertices[base + j * 2 + 1];
        if (ay > py) != (by > py) {
            let x_intersect = (bx - ax) * (py - ay) / (by - ay + EVEN_ODD_EPSILON) + ax;
            if px < x_intersect {
                inside = !inside;
            }
        }
    }
    inside
}

/// Non-zero winding test over edges `(v_i, v_{i-1})` with wrap.
fn inside_non_zero_span(vertices: &[f32], v_start: u32, v_count: u32, px: f32, py: f32) -> bool {
    let base = v_start as usize * 2;
    let n = v_count as usize;
    debug_assert!(base + n * 2 <= vertices.len());
    let mut winding = 0i32;
    for i in 0..n {
        let j = if i == 0 { n - 1 } else { i - 1 };
        let ax = vertices[base + i * 2];
        let ay = vertices[base + i * 2 + 1];
        let bx = vertices[base + j * 2];
        let by = vertices[base + j * 2 + 1];
        let is_left = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
        if ay <= py && by > py && is_left > 0.0 {
            winding += 1;
        } else if ay > py && by <= py && is_left < 0.0 {
            winding -= 1;
        }
    }
    winding != 0
}

/// Even-odd test over an explicit point list (shared with geometry tests).
#[cfg(test)]
pub(crate) fn inside_even_odd(polygon: &[Vec2], p: Vec2) -> bool {
    let mut flat = Vec::with_capacity(polygon.len() * 2);
    for v in polygon {
        flat.push(v.x);
        flat.push(v.y);
    }
    inside_even_odd_span(&flat, 0, polygon.len() as u32, p.x, p.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(points: &[(f32, f32)]) -> Vec<f32> {
        points.iter().flat_map(|&(x, y)| [x, y]).collect()
    }

    #[test]
    fn even_odd_square() {
        let verts = flat(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]);
        assert!(inside_even_odd_span(&verts, 0, 5, 5.0, 5.0));
        assert!(!inside_even_odd_span(&verts, 0, 5, 15.0, 5.0));
        assert!(!inside_even_odd_span(&verts, 0, 5, 5.0, -1.0));
    }

    #[test]
    fn non_zero_square_either_winding() {
        let cw = flat(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]);
        let ccw = flat(&[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0), (0.0, 0.0)]);
        assert!(inside_non_zero_span(&cw, 0, 5, 5.0, 5.0));
        assert!(inside_non_zero_span(&ccw, 0, 5, 5.0, 5.0));
        assert!(!inside_non_zero_span(&cw, 0, 5, -5.0, 5.0));
    }

    #[test]
    fn keyhole_ring_is_hollow_under_even_odd() {
        // Outer 0..100 ring plus reversed inner 25..75 ring, each closed.
        let verts = flat(&[
            (0.0, 0.0),
            (100.0, 0.0),
            (100.0, 100.0),
            (0.0, 100.0),
            (0.0, 0.0),
            (25.0, 25.0),
            (25.0, 75.0),
            (75.0, 75.0),
            (75.0, 25.0),
            (25.0, 25.0),
        ]);
        assert!(!inside_even_odd_span(&verts, 0, 10, 50.0, 50.0));
        assert!(inside_even_odd_span(&verts, 0, 10, 10.0, 50.0));
        // The reversed inner ring also cancels under non-zero winding.
        assert!(!inside_non_zero_span(&verts, 0, 10, 50.0, 50.0));
        assert!(inside_non_zero_span(&verts, 0, 10, 10.0, 50.0));
    }

    #[test]
    fn rules_agree_on_simple_convex_polygons() {
        use crate::rng::TestRng;
        let mut rng = TestRng::new(5, 11);
        let verts = flat(&[(10.0, 10.0), (90.0, 20.0), (80.0, 90.0), (15.0, 70.0), (10.0, 10.0)]);
        for _ in 0..200 {
            let px = rng.next_range(0.0, 100.0);
            let py = rng.next_range(0.0, 100.0);
            assert_eq!(
                inside_even_odd_span(&verts, 0, 5, px, py),
                inside_non_zero_span(&verts, 0, 5, px, py),
            );
        }
    }
}
