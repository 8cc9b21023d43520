use cubecl::prelude::*;

use crate::gpu::constants::EVEN_ODD_EPSILON;

#[cube]
pub(super) fn clamp01(v: f32) -> f32 {
    let zero = f32::new(0.0);
    let one = f32::new(1.0);
    if v < zero {
        zero
    } else if v > one {
        one
    } else {
        v
    }
}

/// Inside test dispatching on the fill rule (0 = even-odd, 1 = non-zero).
/// Must stay arithmetically identical to the CPU implementation.
#[cube]
pub(super) fn point_in_polygon(
    vertex_data: &Array<f32>,
    v_start: u32,
    v_count: u32,
    rule: u32,
    px: f32,
    py: f32,
) -> bool {
    let mut inside = false;
    if rule == u32::new(1) {
        inside = inside_non_zero(vertex_data, v_start, v_count, px, py);
    } else {
        inside = inside_even_odd(vertex_data, v_start, v_count, px, py);
    }
    inside
}

/// Half-open even-odd parity over edges `(v_i, v_{i-1})` with wrap.
#[cube]
pub(super) fn inside_even_odd(
    vertex_data: &Array<f32>,
    v_start: u32,
    v_count: u32,
    px: f32,
    py: f32,
) -> bool {
    let base = v_start * 2;
    let mut inside = false;
    for i in 0..v_count {
        let mut j = v_count - 1;
        if i > u32::new(0) {
            j = i - 1;
        }
        let ax = vertex_data[base + i * 2];
        let ay = vertex_data[base + i * 2 + 1];
        let bx = vertex_data[base + j * 2];
        let by = vertex_data[base + j * 2 + 1];
        let a_over = ay > py;
        let b_over = by > py;
        if (a_over && !b_over) || (!a_over && b_over) {
            let x_intersect = (bx - ax) * (py - ay) / (by - ay + f32::new(EVEN_ODD_EPSILON)) + ax;
            if px < x_intersect {
                inside = !inside;
            }
        }
    }
    inside
}

/// Non-zero winding over edges `(v_i, v_{i-1})` with wrap.
#[cube]
pub(super) fn inside_non_zero(
    vertex_data: &Array<f32>,
    v_start: u32,
    v_count: u32,
    px: f32,
    py: f32,
) -> bool {
    let base = v_start * 2;
    let mut winding = i32::new(0);
    for i in 0..v_count {
        let mut j = v_count - 1;
        if i > u32::new(0) {
            j = i - 1;
        }
        let ax = vertex_data[base + i * 2];
        let ay = vertex_data[base + i * 2 + 1];
        let bx = vertex_data[base + j * 2];
        let by = vertex_data[base + j * 2 + 1];
        let is_left = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
        if ay <= py && by > py && is_left > f32::new(0.0) {
            winding += i32::new(1);
        } else if ay > py && by <= py && is_left < f32::new(0.0) {
            winding -= i32::new(1);
        }
    }
    winding != i32::new(0)
}
