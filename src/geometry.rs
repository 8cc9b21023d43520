//! Path recording and flattening.
//!
//! A [`PathBuilder`] records drawing commands together with an accumulated
//! affine transform. Nothing is evaluated until [`PathBuilder::flatten`],
//! which is a pure function of `(commands, transform, tolerance)` and
//! produces one polyline per subpath in canvas space.

use core::f32::consts::PI;

use crate::math::{Mat3, Vec2};

/// Default curve flattening tolerance in device pixels.
pub const DEFAULT_TOLERANCE: f32 = 0.35;

// Maximum recursion depth for adaptive curve subdivision.
const MAX_FLATTEN_DEPTH: u32 = 10;
// Two points closer than this are considered coincident when closing.
const CLOSE_EPSILON: f32 = 1.0e-4;

/// A recorded path command. Curve control points are in path space; the
/// builder transform applies at flatten time only.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PathCmd {
    MoveTo(Vec2),
    LineTo(Vec2),
    QuadTo(Vec2, Vec2),
    CubicTo(Vec2, Vec2, Vec2),
    Arc {
        center: Vec2,
        radius: f32,
        start_angle: f32,
        end_angle: f32,
        ccw: bool,
        segments: Option<u32>,
    },
    Ellipse {
        center: Vec2,
        rx: f32,
        ry: f32,
        rotation: f32,
        segments: u32,
    },
    Close,
}

/// Frame-scoped builder recording a command list and an affine transform.
#[derive(Debug, Clone, Default)]
pub struct PathBuilder {
    commands: Vec<PathCmd>,
    transform: Mat3,
}

impl PathBuilder {
    /// Create an empty builder with the identity transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded commands in emission order.
    pub fn commands(&self) -> &[PathCmd] {
        &self.commands
    }

    /// Begin a new subpath at `(x, y)`.
    pub fn move_to(&mut self, x: f32, y: f32) -> &mut Self {
        self.commands.push(PathCmd::MoveTo(Vec2::new(x, y)));
        self
    }

    /// Line from the pen to `(x, y)`.
    pub fn line_to(&mut self, x: f32, y: f32) -> &mut Self {
        self.commands.push(PathCmd::LineTo(Vec2::new(x, y)));
        self
    }

    /// Quadratic curve through control `(cx, cy)` to `(x, y)`.
    pub fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) -> &mut Self {
        self.commands
            .push(PathCmd::QuadTo(Vec2::new(cx, cy), Vec2::new(x, y)));
        self
    }

    /// Cubic curve with controls `(c1x, c1y)`, `(c2x, c2y)` to `(x, y)`.
    pub fn cubic_to(&mut self, c1x: f32, c1y: f32, c2x: f32, c2y: f32, x: f32, y: f32) -> &mut Self {
        self.commands.push(PathCmd::CubicTo(
            Vec2::new(c1x, c1y),
            Vec2::new(c2x, c2y),
            Vec2::new(x, y),
        ));
        self
    }

    /// Circular arc around `(cx, cy)`. The sweep direction follows `ccw`;
    /// `segments` overrides the automatic tessellation density.
    pub fn arc(
        &mut self,
        cx: f32,
        cy: f32,
        radius: f32,
        start_angle: f32,
        end_angle: f32,
        ccw: bool,
        segments: Option<u32>,
    ) -> &mut Self {
        self.commands.push(PathCmd::Arc {
            center: Vec2::new(cx, cy),
            radius,
            start_angle,
            end_angle,
            ccw,
            segments,
        });
        self
    }

    /// Full ellipse as its own closed subpath.
    pub fn ellipse(
        &mut self,
        cx: f32,
        cy: f32,
        rx: f32,
        ry: f32,
        rotation: f32,
        segments: u32,
    ) -> &mut Self {
        self.commands.push(PathCmd::Ellipse {
            center: Vec2::new(cx, cy),
            rx,
            ry,
            rotation,
            segments,
        });
        self
    }

    /// Full circle as its own closed subpath.
    pub fn circle(&mut self, cx: f32, cy: f32, radius: f32, segments: u32) -> &mut Self {
        self.ellipse(cx, cy, radius, radius, 0.0, segments)
    }

    /// Polygon from an explicit point list; `close` appends a closing edge.
    pub fn poly(&mut self, points: &[Vec2], close: bool) -> &mut Self {
        let mut iter = points.iter();
        if let Some(first) = iter.next() {
            self.move_to(first.x, first.y);
            for p in iter {
                self.line_to(p.x, p.y);
            }
            if close {
                self.close();
            }
        }
        self
    }

    /// Axis-aligned rectangle as a closed subpath.
    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32) -> &mut Self {
        self.move_to(x, y)
            .line_to(x + w, y)
            .line_to(x + w, y + h)
            .line_to(x, y + h)
            .close()
    }

    /// Close the current subpath back to its first point.
    pub fn close(&mut self) -> &mut Self {
        self.commands.push(PathCmd::Close);
        self
    }

    /// Right-multiply `scale(sx, sy) * rotate(rot) * translate(tx, ty)` into
    /// the accumulated transform.
    pub fn transform(&mut self, tx: f32, ty: f32, sx: f32, sy: f32, rot: f32) -> &mut Self {
        let step = Mat3::scale(sx, sy)
            .mul(Mat3::rotate(rot))
            .mul(Mat3::translate(tx, ty));
        self.transform = self.transform.mul(step);
        self
    }

    /// Flatten with the default tolerance.
    pub fn flatten_default(&self) -> Vec<Vec<Vec2>> {
        self.flatten(DEFAULT_TOLERANCE)
    }

    /// Flatten the recorded commands into one polyline per subpath.
    ///
    /// Subpaths explicitly closed with [`PathBuilder::close`] end on a copy
    /// of their first point; other subpaths are left open. Single-point
    /// subpaths are dropped.
    pub fn flatten(&self, tolerance: f32) -> Vec<Vec<Vec2>> {
        let tolerance = tolerance.max(1.0e-3);
        let mut out: Vec<Vec<Vec2>> = Vec::new();
        let mut current: Vec<Vec2> = Vec::new();
        let mut pen = Vec2::ZERO;

        for cmd in &self.commands {
            match *cmd {
                PathCmd::MoveTo(p) => {
                    flush_subpath(&mut out, &mut current);
                    pen = p;
                    current.push(p);
                }
                PathCmd::LineTo(p) => {
                    ensure_started(&mut current, pen);
                    current.push(p);
                    pen = p;
                }
                PathCmd::QuadTo(cp, p) => {
                    ensure_started(&mut current, pen);
                    flatten_quad(pen, cp, p, tolerance, 0, &mut current);
                    pen = p;
                }
                PathCmd::CubicTo(c1, c2, p) => {
                    ensure_started(&mut current, pen);
                    flatten_cubic(pen, c1, c2, p, tolerance, 0, &mut current);
                    pen = p;
                }
                PathCmd::Arc {
                    center,
                    radius,
                    start_angle,
                    end_angle,
                    ccw,
                    segments,
                } => {
                    pen = emit_arc(
                        &mut current,
                        center,
                        radius,
                        start_angle,
                        end_angle,
                        ccw,
                        segments,
                    )
                    .unwrap_or(pen);
                }
                PathCmd::Ellipse {
                    center,
                    rx,
                    ry,
                    rotation,
                    segments,
                } => {
                    flush_subpath(&mut out, &mut current);
                    emit_ellipse(&mut current, center, rx, ry, rotation, segments);
                    flush_subpath(&mut out, &mut current);
                }
                PathCmd::Close => {
                    if let Some(&first) = current.first() {
                        if current
                            .last()
                            .map(|last| last.distance(first) > CLOSE_EPSILON)
                            .unwrap_or(false)
                        {
                            current.push(first);
                        }
                        flush_subpath(&mut out, &mut current);
                        // Drawing after a close continues from the seam.
                        pen = first;
                    }
                }
            }
        }
        flush_subpath(&mut out, &mut current);

        if !self.transform.is_identity() {
            for subpath in &mut out {
                for p in subpath.iter_mut() {
                    *p = self.transform.transform_point(*p);
                }
            }
        }
        out
    }
}

/// Vertices of a 2n-point star polygon alternating between `r_out` and
/// `r_in`, starting on the outer radius at -PI/2.
pub fn star_points(cx: f32, cy: f32, r_out: f32, r_in: f32, n: u32) -> Vec<Vec2> {
    let n = n.max(2);
    let mut points = Vec::with_capacity(2 * n as usize);
    for i in 0..2 * n {
        let radius = if i % 2 == 0 { r_out } else { r_in };
        let angle = -PI / 2.0 + i as f32 * PI / n as f32;
        points.push(Vec2::new(cx, cy) + Vec2::from_angle(angle) * radius);
    }
    points
}

fn ensure_started(current: &mut Vec<Vec2>, pen: Vec2) {
    if current.is_empty() {
        current.push(pen);
    }
}

fn flush_subpath(out: &mut Vec<Vec<Vec2>>, current: &mut Vec<Vec2>) {
    if current.len() >= 2 {
        out.push(core::mem::take(current));
    } else {
        current.clear();
    }
}

/// Adaptive quadratic flattening. The error metric is the distance from the
/// curve midpoint `(p0 + 2*cp + p1) / 4` to the chord midpoint.
fn flatten_quad(p0: Vec2, cp: Vec2, p1: Vec2, tolerance: f32, depth: u32, out: &mut Vec<Vec2>) {
    let mid = (p0 + cp * 2.0 + p1) / 4.0;
    let err = mid.distance(p0.midpoint(p1));
    if err <= tolerance || depth >= MAX_FLATTEN_DEPTH {
        out.push(p1);
        return;
    }
    let p01 = p0.midpoint(cp);
    let p12 = cp.midpoint(p1);
    let p012 = p01.midpoint(p12);
    flatten_quad(p0, p01, p012, tolerance, depth + 1, out);
    flatten_quad(p012, p12, p1, tolerance, depth + 1, out);
}

/// Adaptive cubic flattening. The 8-way control-net midpoint is compared
/// against the chord midpoint with acceptance at twice the tolerance.
fn flatten_cubic(
    p0: Vec2,
    c1: Vec2,
    c2: Vec2,
    p1: Vec2,
    tolerance: f32,
    depth: u32,
    out: &mut Vec<Vec2>,
) {
    let p01 = p0.midpoint(c1);
    let p12 = c1.midpoint(c2);
    let p23 = c2.midpoint(p1);
    let p012 = p01.midpoint(p12);
    let p123 = p12.midpoint(p23);
    let mid = p012.midpoint(p123);
    let chord_mid = p0.midpoint(p1);
    let d = mid - chord_mid;
    if d.dot(d) <= tolerance * tolerance * 4.0 || depth >= MAX_FLATTEN_DEPTH {
        out.push(p1);
        return;
    }
    flatten_cubic(p0, p01, p012, mid, tolerance, depth + 1, out);
    flatten_cubic(mid, p123, p23, p1, tolerance, depth + 1, out);
}

/// Append a circular arc, connecting to an active subpath or starting a new
/// one. Returns the new pen position.
fn emit_arc(
    current: &mut Vec<Vec2>,
    center: Vec2,
    radius: f32,
    start_angle: f32,
    end_angle: f32,
    ccw: bool,
    segments: Option<u32>,
) -> Option<Vec2> {
    let mut sweep = end_angle - start_angle;
    if ccw {
        if sweep > 0.0 {
            sweep -= 2.0 * PI;
        }
    } else if sweep < 0.0 {
        sweep += 2.0 * PI;
    }
    if sweep == 0.0 || radius <= 0.0 {
        return None;
    }

    let steps = segments
        .unwrap_or_else(|| ((sweep.abs() / (PI / 10.0)).ceil() as u32).clamp(8, 128))
        .max(1);
    let step = sweep / steps as f32;

    let start = center + Vec2::from_angle(start_angle) * radius;
    match current.last() {
        Some(last) if last.distance(start) <= CLOSE_EPSILON => {}
        Some(_) => current.push(start),
        None => current.push(start),
    }
    for i in 1..=steps {
        let angle = start_angle + step * i as f32;
        current.push(center + Vec2::from_angle(angle) * radius);
    }
    current.last().copied()
}

/// Append a full ellipse as a closed loop into `current`.
fn emit_ellipse(current: &mut Vec<Vec2>, center: Vec2, rx: f32, ry: f32, rotation: f32, segments: u32) {
    let rx = rx.abs();
    let ry = ry.abs();
    if rx == 0.0 || ry == 0.0 {
        return;
    }
    let steps = segments.clamp(8, 256);
    let rot = Mat3::rotate(rotation);
    for i in 0..steps {
        let angle = i as f32 * 2.0 * PI / steps as f32;
        let (sin, cos) = angle.sin_cos();
        let local = rot.transform_point(Vec2::new(cos * rx, sin * ry));
        current.push(center + local);
    }
    if let Some(&first) = current.first() {
        current.push(first);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::TestRng;

    fn dist_to_polyline(p: Vec2, polyline: &[Vec2]) -> f32 {
        let mut best = f32::INFINITY;
        for pair in polyline.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let ab = b - a;
            let len_sq = ab.dot(ab);
            let t = if len_sq > 0.0 {
                ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            best = best.min(p.distance(a + ab * t));
        }
        best
    }

    fn eval_quad(p0: Vec2, cp: Vec2, p1: Vec2, t: f32) -> Vec2 {
        let u = 1.0 - t;
        p0 * (u * u) + cp * (2.0 * u * t) + p1 * (t * t)
    }

    fn eval_cubic(p0: Vec2, c1: Vec2, c2: Vec2, p1: Vec2, t: f32) -> Vec2 {
        let u = 1.0 - t;
        p0 * (u * u * u) + c1 * (3.0 * u * u * t) + c2 * (3.0 * u * t * t) + p1 * (t * t * t)
    }

    #[test]
    fn flat_path_round_trips_vertices() {
        let mut path = PathBuilder::new();
        path.move_to(1.0, 2.0).line_to(5.0, 2.0).line_to(5.0, 8.0).close();
        let subpaths = path.flatten(0.35);
        assert_eq!(subpaths.len(), 1);
        assert_eq!(
            subpaths[0],
            vec![
                Vec2::new(1.0, 2.0),
                Vec2::new(5.0, 2.0),
                Vec2::new(5.0, 8.0),
                Vec2::new(1.0, 2.0),
            ]
        );
    }

    #[test]
    fn close_skips_coincident_endpoint() {
        let mut path = PathBuilder::new();
        path.move_to(0.0, 0.0)
            .line_to(4.0, 0.0)
            .line_to(0.0, 0.0)
            .close();
        let subpaths = path.flatten(0.35);
        assert_eq!(subpaths[0].len(), 3);
    }

    #[test]
    fn move_to_starts_a_new_subpath() {
        let mut path = PathBuilder::new();
        path.move_to(0.0, 0.0).line_to(1.0, 0.0);
        path.move_to(10.0, 0.0).line_to(11.0, 0.0);
        assert_eq!(path.flatten(0.35).len(), 2);
    }

    #[test]
    fn transform_applies_at_flatten_time() {
        let mut path = PathBuilder::new();
        path.transform(3.0, 4.0, 2.0, 2.0, 0.0);
        path.move_to(1.0, 0.0).line_to(2.0, 0.0);
        let subpaths = path.flatten(0.35);
        // translate then scale: (1 + 3) * 2 = 8
        assert_eq!(subpaths[0][0], Vec2::new(8.0, 8.0));
        assert_eq!(subpaths[0][1], Vec2::new(10.0, 8.0));
    }

    #[test]
    fn random_quads_stay_within_tolerance() {
        let tolerance = 0.35;
        let mut rng = TestRng::new(1, 1234);
        for _ in 0..32 {
            let p0 = Vec2::new(rng.next_range(0.0, 100.0), rng.next_range(0.0, 100.0));
            let cp = Vec2::new(rng.next_range(0.0, 100.0), rng.next_range(0.0, 100.0));
            let p1 = Vec2::new(rng.next_range(0.0, 100.0), rng.next_range(0.0, 100.0));
            let mut path = PathBuilder::new();
            path.move_to(p0.x, p0.y).quad_to(cp.x, cp.y, p1.x, p1.y);
            let subpaths = path.flatten(tolerance);
            let polyline = &subpaths[0];
            for i in 0..=64 {
                let t = i as f32 / 64.0;
                let on_curve = eval_quad(p0, cp, p1, t);
                assert!(dist_to_polyline(on_curve, polyline) <= tolerance + 1.0e-2);
            }
        }
    }

    #[test]
    fn random_cubics_stay_within_tolerance() {
        let tolerance = 0.35;
        let mut rng = TestRng::new(2, 99);
        for _ in 0..32 {
            let p0 = Vec2::new(rng.next_range(0.0, 100.0), rng.next_range(0.0, 100.0));
            let c1 = Vec2::new(rng.next_range(0.0, 100.0), rng.next_range(0.0, 100.0));
            let c2 = Vec2::new(rng.next_range(0.0, 100.0), rng.next_range(0.0, 100.0));
            let p1 = Vec2::new(rng.next_range(0.0, 100.0), rng.next_range(0.0, 100.0));
            let mut path = PathBuilder::new();
            path.move_to(p0.x, p0.y)
                .cubic_to(c1.x, c1.y, c2.x, c2.y, p1.x, p1.y);
            let subpaths = path.flatten(tolerance);
            let polyline = &subpaths[0];
            for i in 0..=64 {
                let t = i as f32 / 64.0;
                let on_curve = eval_cubic(p0, c1, c2, p1, t);
                // Cubic acceptance is 2x tolerance by construction.
                assert!(dist_to_polyline(on_curve, polyline) <= 2.0 * tolerance + 1.0e-2);
            }
        }
    }

    #[test]
    fn arc_connects_to_active_subpath() {
        let mut path = PathBuilder::new();
        path.move_to(0.0, 0.0)
            .arc(0.0, 0.0, 10.0, 0.0, PI / 2.0, false, Some(4));
        let subpaths = path.flatten(0.35);
        let polyline = &subpaths[0];
        // pen, arc start, then 4 samples
        assert_eq!(polyline.len(), 6);
        assert_eq!(polyline[1], Vec2::new(10.0, 0.0));
        let last = polyline[5];
        assert!(last.distance(Vec2::new(0.0, 10.0)) < 1.0e-3);
    }

    #[test]
    fn arc_segment_count_scales_with_sweep() {
        let mut path = PathBuilder::new();
        path.arc(50.0, 50.0, 20.0, 0.0, 2.0 * PI - 1.0e-3, false, None);
        let subpaths = path.flatten(0.35);
        let polyline = &subpaths[0];
        // Automatic density: ceil(sweep / (PI/10)) clamped to [8, 128].
        assert_eq!(polyline.len(), 21);
    }

    #[test]
    fn ellipse_is_closed() {
        let mut path = PathBuilder::new();
        path.ellipse(10.0, 10.0, 5.0, 3.0, 0.0, 16);
        let subpaths = path.flatten(0.35);
        assert_eq!(subpaths.len(), 1);
        let polyline = &subpaths[0];
        assert_eq!(polyline.len(), 17);
        assert_eq!(polyline.first(), polyline.last());
    }

    #[test]
    fn star_alternates_radii_from_top() {
        let points = star_points(0.0, 0.0, 10.0, 4.0, 5);
        assert_eq!(points.len(), 10);
        assert!(points[0].distance(Vec2::new(0.0, -10.0)) < 1.0e-4);
        assert!((points[1].length() - 4.0).abs() < 1.0e-4);
        assert!((points[2].length() - 10.0).abs() < 1.0e-4);
    }
}
