//! Stroke expansion: polyline + width + style into filled polygons.
//!
//! Every emitted polygon is closed and consumed downstream as an even-odd
//! fill; overlap between segment quads, joins, and caps is harmless under
//! the union interpretation because each polygon composites once.

use core::f32::consts::PI;

use crate::math::Vec2;

/// Default stroke width in device pixels.
pub const DEFAULT_STROKE_WIDTH: f32 = 10.0;

// Consecutive points closer than this collapse into one.
const DUPLICATE_EPSILON: f32 = 1.0e-5;
// Turns with |cross| below this skip the join entirely.
const COLLINEAR_EPSILON: f32 = 1.0e-6;
// Maximum angular step for round joins and caps.
const ROUND_STEP: f32 = PI / 12.0;

/// Join style between adjacent stroke segments.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LineJoin {
    Round,
    Bevel,
    Miter,
}

/// Cap style at the ends of an open stroke.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LineCap {
    Round,
    Butt,
    Square,
}

/// Stroke configuration: joins, caps, and the miter limit ratio.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StrokeStyle {
    pub join: LineJoin,
    pub cap: LineCap,
    pub miter_limit: f32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            join: LineJoin::Round,
            cap: LineCap::Round,
            miter_limit: 4.0,
        }
    }
}

#[derive(Debug, Copy, Clone)]
struct Segment {
    p0: Vec2,
    p1: Vec2,
    dir: Vec2,
    left: Vec2,
}

/// Expand a polyline into zero or more closed polygons covering the stroked
/// region. Closure is detected by first == last; closed inputs receive a
/// wrap-around join instead of caps.
pub fn expand_stroke(points: &[Vec2], width: f32, style: &StrokeStyle) -> Vec<Vec<Vec2>> {
    let mut out = Vec::new();
    if width <= 0.0 {
        return out;
    }
    let h = width * 0.5;

    let mut pts: Vec<Vec2> = Vec::with_capacity(points.len());
    for &p in points {
        if pts
            .last()
            .map(|last| last.distance(p) > DUPLICATE_EPSILON)
            .unwrap_or(true)
        {
            pts.push(p);
        }
    }
    let closed = pts.len() > 2
        && pts
            .first()
            .zip(pts.last())
            .map(|(a, b)| a.distance(*b) <= DUPLICATE_EPSILON)
            .unwrap_or(false);
    if closed {
        pts.pop();
    }
    if pts.len() < 2 {
        return out;
    }

    let mut segments = Vec::with_capacity(pts.len());
    let last_pair = if closed { pts.len() } else { pts.len() - 1 };
    for i in 0..last_pair {
        let p0 = pts[i];
        let p1 = pts[(i + 1) % pts.len()];
        let v = p1 - p0;
        if v.length() <= DUPLICATE_EPSILON {
            continue;
        }
        let dir = v.normalize();
        segments.push(Segment {
            p0,
            p1,
            dir,
            left: dir.left_normal(),
        });
    }
    if segments.is_empty() {
        return out;
    }

    for seg in &segments {
        let n = seg.left * h;
        push_polygon(
            &mut out,
            vec![seg.p0 + n, seg.p1 + n, seg.p1 - n, seg.p0 - n],
        );
    }

    let join_count = if closed {
        segments.len()
    } else {
        segments.len() - 1
    };
    for i in 0..join_count {
        let prev = &segments[i];
        let next = &segments[(i + 1) % segments.len()];
        emit_join(&mut out, prev, next, h, style);
    }

    if !closed {
        let first = &segments[0];
        let last = &segments[segments.len() - 1];
        emit_cap(&mut out, first.p0, -first.dir, first.left, h, style.cap);
        emit_cap(&mut out, last.p1, last.dir, last.left, h, style.cap);
    }

    out
}

fn emit_join(out: &mut Vec<Vec<Vec2>>, prev: &Segment, next: &Segment, h: f32, style: &StrokeStyle) {
    let center = next.p0;
    let c = prev.dir.cross(next.dir);
    if c.abs() < COLLINEAR_EPSILON {
        return;
    }
    let sign = c.signum();
    let n_prev = prev.left * sign;
    let n_next = next.left * sign;

    match style.join {
        LineJoin::Bevel => {
            push_polygon(
                out,
                vec![center, center + n_prev * h, center + n_next * h],
            );
        }
        LineJoin::Round => {
            emit_round_fan(out, center, n_prev, n_next, h, sign);
        }
        LineJoin::Miter => {
            // Offset edges meet at the miter tip unless the limit trims it.
            let a0 = center + n_prev * h;
            let b0 = center + n_next * h;
            let t = (b0 - a0).cross(next.dir) / c;
            let tip = a0 + prev.dir * t;
            if tip.distance(center) <= h * style.miter_limit.max(1.0) {
                push_polygon(out, vec![center, a0, tip, b0]);
            } else {
                push_polygon(out, vec![center, a0, b0]);
            }
        }
    }
}

/// Fan along the shorter arc between two outer normals, sweeping in the
/// turn direction with steps no wider than `ROUND_STEP`.
fn emit_round_fan(out: &mut Vec<Vec<Vec2>>, center: Vec2, n_from: Vec2, n_to: Vec2, h: f32, sign: f32) {
    let a0 = n_from.y.atan2(n_from.x);
    let a1 = n_to.y.atan2(n_to.x);
    let mut sweep = a1 - a0;
    while sweep > PI {
        sweep -= 2.0 * PI;
    }
    while sweep < -PI {
        sweep += 2.0 * PI;
    }
    if sweep == 0.0 {
        return;
    }
    if sweep.signum() != sign {
        sweep = sign * (2.0 * PI - sweep.abs());
    }
    let steps = ((sweep.abs() / ROUND_STEP).ceil() as usize).max(2);
    let mut polygon = Vec::with_capacity(steps + 2);
    polygon.push(center);
    for i in 0..=steps {
        let angle = a0 + sweep * i as f32 / steps as f32;
        polygon.push(center + Vec2::from_angle(angle) * h);
    }
    push_polygon(out, polygon);
}

fn emit_cap(out: &mut Vec<Vec<Vec2>>, tip: Vec2, outward: Vec2, left: Vec2, h: f32, cap: LineCap) {
    match cap {
        LineCap::Butt => {}
        LineCap::Square => {
            let n = left * h;
            let d = outward * h;
            push_polygon(out, vec![tip + n, tip + n + d, tip - n + d, tip - n]);
        }
        LineCap::Round => {
            let base = outward.y.atan2(outward.x);
            let steps = ((PI / ROUND_STEP).ceil() as usize).max(2);
            let mut polygon = Vec::with_capacity(steps + 2);
            polygon.push(tip);
            for i in 0..=steps {
                let angle = base - PI / 2.0 + PI * i as f32 / steps as f32;
                polygon.push(tip + Vec2::from_angle(angle) * h);
            }
            push_polygon(out, polygon);
        }
    }
}

/// Close and emit a polygon, dropping anything with fewer than 3 distinct
/// vertices.
fn push_polygon(out: &mut Vec<Vec<Vec2>>, mut polygon: Vec<Vec2>) {
    if polygon.len() < 3 {
        return;
    }
    let mut distinct = 0;
    for (i, p) in polygon.iter().enumerate() {
        if polygon[..i]
            .iter()
            .all(|q| q.distance(*p) > DUPLICATE_EPSILON)
        {
            distinct += 1;
        }
    }
    if distinct < 3 {
        return;
    }
    let first = polygon[0];
    if polygon
        .last()
        .map(|last| last.distance(first) > DUPLICATE_EPSILON)
        .unwrap_or(false)
    {
        polygon.push(first);
    }
    out.push(polygon);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_in_any(polygons: &[Vec<Vec2>], p: Vec2) -> bool {
        polygons
            .iter()
            .any(|polygon| crate::renderer::cpu::inside_even_odd(polygon, p))
    }

    #[test]
    fn single_segment_with_butt_caps_is_one_quad() {
        let style = StrokeStyle {
            cap: LineCap::Butt,
            ..StrokeStyle::default()
        };
        let polygons = expand_stroke(
            &[Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)],
            4.0,
            &style,
        );
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].len(), 5);
    }

    #[test]
    fn square_caps_extend_past_the_endpoints() {
        let style = StrokeStyle {
            cap: LineCap::Square,
            ..StrokeStyle::default()
        };
        let polygons = expand_stroke(
            &[Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)],
            4.0,
            &style,
        );
        assert_eq!(polygons.len(), 3);
        assert!(point_in_any(&polygons, Vec2::new(-1.5, 0.0)));
        assert!(point_in_any(&polygons, Vec2::new(11.5, 0.0)));
    }

    #[test]
    fn sharp_turn_emits_segments_join_and_caps() {
        let style = StrokeStyle {
            join: LineJoin::Miter,
            cap: LineCap::Round,
            miter_limit: 2.0,
        };
        let polygons = expand_stroke(
            &[
                Vec2::new(0.0, 0.0),
                Vec2::new(100.0, 0.0),
                Vec2::new(100.0, 1.0),
            ],
            20.0,
            &style,
        );
        // 2 segment quads + 1 join + 2 round caps.
        assert_eq!(polygons.len(), 5);
    }

    #[test]
    fn reversal_exceeds_miter_limit_and_falls_back_to_bevel() {
        let style = StrokeStyle {
            join: LineJoin::Miter,
            cap: LineCap::Butt,
            miter_limit: 2.0,
        };
        let polygons = expand_stroke(
            &[
                Vec2::new(0.0, 0.0),
                Vec2::new(100.0, 0.0),
                Vec2::new(0.0, 10.0),
            ],
            10.0,
            &style,
        );
        // Near-reversal: the join polygon is the 3-vertex bevel triangle.
        assert_eq!(polygons.len(), 3);
        let join = &polygons[2];
        assert_eq!(join.len(), 4);
    }

    #[test]
    fn collinear_points_skip_the_join() {
        let style = StrokeStyle {
            cap: LineCap::Butt,
            ..StrokeStyle::default()
        };
        let polygons = expand_stroke(
            &[
                Vec2::new(0.0, 0.0),
                Vec2::new(5.0, 0.0),
                Vec2::new(10.0, 0.0),
            ],
            2.0,
            &style,
        );
        assert_eq!(polygons.len(), 2);
    }

    #[test]
    fn closed_polyline_gets_a_seam_join_and_no_caps() {
        let style = StrokeStyle {
            join: LineJoin::Bevel,
            cap: LineCap::Round,
            miter_limit: 4.0,
        };
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 10.0),
            Vec2::new(0.0, 10.0),
            Vec2::new(0.0, 0.0),
        ];
        let polygons = expand_stroke(&square, 2.0, &style);
        // 4 segment quads + 4 bevel joins.
        assert_eq!(polygons.len(), 8);
    }

    #[test]
    fn duplicate_points_collapse() {
        let style = StrokeStyle {
            cap: LineCap::Butt,
            ..StrokeStyle::default()
        };
        let polygons = expand_stroke(
            &[
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(10.0, 0.0),
            ],
            2.0,
            &style,
        );
        assert_eq!(polygons.len(), 1);
    }

    #[test]
    fn zero_width_or_degenerate_input_produces_nothing() {
        assert!(expand_stroke(&[Vec2::ZERO, Vec2::new(1.0, 0.0)], 0.0, &StrokeStyle::default()).is_empty());
        assert!(expand_stroke(&[Vec2::ZERO], 3.0, &StrokeStyle::default()).is_empty());
    }

    #[test]
    fn stroke_covers_the_polyline_neighborhood() {
        use crate::rng::TestRng;
        let mut rng = TestRng::new(3, 7);
        let width = 6.0;
        for _ in 0..8 {
            let mut pts = Vec::new();
            let mut cursor = Vec2::new(rng.next_range(20.0, 40.0), rng.next_range(20.0, 40.0));
            pts.push(cursor);
            for _ in 0..4 {
                cursor += Vec2::new(rng.next_range(-15.0, 15.0), rng.next_range(-15.0, 15.0));
                pts.push(cursor);
            }
            let polygons = expand_stroke(&pts, width, &StrokeStyle::default());
            for pair in pts.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                if a.distance(b) < 1.0e-3 {
                    continue;
                }
                let dir = (b - a).normalize();
                let normal = dir.left_normal();
                for i in 1..8 {
                    let t = i as f32 / 8.0;
                    let on_line = a + (b - a) * t;
                    for offset in [-0.45, 0.0, 0.45] {
                        let probe = on_line + normal * (offset * width);
                        assert!(point_in_any(&polygons, probe));
                    }
                }
            }
        }
    }
}
