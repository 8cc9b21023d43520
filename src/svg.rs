//! SVG path-data (`d` attribute) frontend.
//!
//! Parses the `MmLlHhVvCcSsQqTtAaZz` mini-language into [`PathBuilder`]
//! commands. Elliptical arcs are converted to cubic Béziers with the
//! SVG 1.1 endpoint-to-center mapping before recording.

use core::f32::consts::PI;

use thiserror::Error;

use crate::geometry::PathBuilder;
use crate::math::{Mat3, Vec2};

/// SVG path parsing failure. Fatal to the current parse; the caller may
/// recover and reuse the builder-producing call with corrected input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SvgError {
    /// A command operand was missing or not a number.
    #[error("invalid path data at byte {index}: {reason}")]
    Parse {
        /// Byte offset of the offending token.
        index: usize,
        /// Human-readable description of what was expected.
        reason: &'static str,
    },
}

/// Parse an SVG `d` string into a fresh [`PathBuilder`].
pub fn parse_svg_path(d: &str) -> Result<PathBuilder, SvgError> {
    let mut path = PathBuilder::new();
    let mut parser = Parser {
        bytes: d.as_bytes(),
        pos: 0,
    };

    let mut pen = Vec2::ZERO;
    let mut subpath_start = Vec2::ZERO;
    // Previous command byte and its last control point, for S/T reflection.
    let mut prev_cmd = 0u8;
    let mut prev_ctrl = Vec2::ZERO;
    let mut cmd = 0u8;

    loop {
        parser.skip_separators();
        let Some(next) = parser.peek() else { break };
        if next.is_ascii_alphabetic() {
            if is_command(next) {
                cmd = next;
                parser.pos += 1;
            } else {
                // Unknown letter: skip ahead to the next known command.
                parser.pos += 1;
                while let Some(b) = parser.peek() {
                    if is_command(b) {
                        break;
                    }
                    parser.pos += 1;
                }
                continue;
            }
        } else if cmd == 0 {
            return Err(parser.error("expected a command letter"));
        } else {
            // Coordinates without a letter repeat the previous command;
            // a moveto repeats as the matching lineto.
            cmd = match cmd {
                b'M' => b'L',
                b'm' => b'l',
                b'Z' | b'z' => return Err(parser.error("unexpected operand after close")),
                other => other,
            };
        }

        let relative = cmd.is_ascii_lowercase();
        let base = if relative { pen } else { Vec2::ZERO };
        match cmd.to_ascii_uppercase() {
            b'M' => {
                let p = base + parser.point()?;
                path.move_to(p.x, p.y);
                pen = p;
                subpath_start = p;
            }
            b'L' => {
                let p = base + parser.point()?;
                path.line_to(p.x, p.y);
                pen = p;
            }
            b'H' => {
                let x = parser.number("expected x coordinate")? + base.x;
                path.line_to(x, pen.y);
                pen.x = x;
            }
            b'V' => {
                let y = parser.number("expected y coordinate")? + base.y;
                path.line_to(pen.x, y);
                pen.y = y;
            }
            b'C' => {
                let c1 = base + parser.point()?;
                let c2 = base + parser.point()?;
                let p = base + parser.point()?;
                path.cubic_to(c1.x, c1.y, c2.x, c2.y, p.x, p.y);
                prev_ctrl = c2;
                pen = p;
            }
            b'S' => {
                let c1 = reflect_control(pen, prev_cmd, b"CcSs", prev_ctrl);
                let c2 = base + parser.point()?;
                let p = base + parser.point()?;
                path.cubic_to(c1.x, c1.y, c2.x, c2.y, p.x, p.y);
                prev_ctrl = c2;
                pen = p;
            }
            b'Q' => {
                let c = base + parser.point()?;
                let p = base + parser.point()?;
                path.quad_to(c.x, c.y, p.x, p.y);
                prev_ctrl = c;
                pen = p;
            }
            b'T' => {
                let c = reflect_control(pen, prev_cmd, b"QqTt", prev_ctrl);
                let p = base + parser.point()?;
                path.quad_to(c.x, c.y, p.x, p.y);
                prev_ctrl = c;
                pen = p;
            }
            b'A' => {
                let rx = parser.number("expected arc rx")?;
                let ry = parser.number("expected arc ry")?;
                let rot_deg = parser.number("expected arc rotation")?;
                let large_arc = parser.number("expected large-arc flag")? != 0.0;
                let sweep = parser.number("expected sweep flag")? != 0.0;
                let p = base + parser.point()?;
                arc_to_cubics(&mut path, pen, p, rx, ry, rot_deg * PI / 180.0, large_arc, sweep);
                pen = p;
            }
            b'Z' => {
                path.close();
                pen = subpath_start;
            }
            _ => unreachable!(),
        }
        prev_cmd = cmd;
    }

    Ok(path)
}

fn is_command(b: u8) -> bool {
    matches!(
        b.to_ascii_uppercase(),
        b'M' | b'L' | b'H' | b'V' | b'C' | b'S' | b'Q' | b'T' | b'A' | b'Z'
    )
}

/// Reflect the previous control point through the pen when the previous
/// command belongs to `family`; otherwise the reflection is the pen itself.
fn reflect_control(pen: Vec2, prev_cmd: u8, family: &[u8], prev_ctrl: Vec2) -> Vec2 {
    if family.contains(&prev_cmd) {
        pen * 2.0 - prev_ctrl
    } else {
        pen
    }
}

/// Convert an endpoint-parameterized elliptical arc into cubic segments.
///
/// Implements the SVG 1.1 F.6 endpoint-to-center mapping: out-of-range
/// radii are scaled up, the center is recovered with the signed square
/// root, and the sweep is split into quarter-turn subarcs, each emitted as
/// one cubic using the `k = (4/3) tan(d/4)` tangent length.
#[allow(clippy::too_many_arguments)]
fn arc_to_cubics(
    path: &mut PathBuilder,
    from: Vec2,
    to: Vec2,
    rx: f32,
    ry: f32,
    x_rot: f32,
    large_arc: bool,
    sweep: bool,
) {
    if from.distance(to) < 1.0e-6 {
        return;
    }
    let mut rx = rx.abs();
    let mut ry = ry.abs();
    if rx < 1.0e-6 || ry < 1.0e-6 {
        path.line_to(to.x, to.y);
        return;
    }

    let (sin_rot, cos_rot) = x_rot.sin_cos();
    let half = (from - to) * 0.5;
    // Endpoints rotated into the ellipse frame.
    let p1 = Vec2::new(
        cos_rot * half.x + sin_rot * half.y,
        -sin_rot * half.x + cos_rot * half.y,
    );

    // Scale radii up when the endpoints cannot lie on the ellipse.
    let lambda = (p1.x * p1.x) / (rx * rx) + (p1.y * p1.y) / (ry * ry);
    if lambda > 1.0 {
        let s = lambda.sqrt();
        rx *= s;
        ry *= s;
    }

    let rx_sq = rx * rx;
    let ry_sq = ry * ry;
    let num = rx_sq * ry_sq - rx_sq * p1.y * p1.y - ry_sq * p1.x * p1.x;
    let den = rx_sq * p1.y * p1.y + ry_sq * p1.x * p1.x;
    let radicand = (num / den).max(0.0);
    let sign = if large_arc == sweep { -1.0 } else { 1.0 };
    let coef = sign * radicand.sqrt();
    let center_p = Vec2::new(coef * rx * p1.y / ry, -coef * ry * p1.x / rx);

    let mid = from.midpoint(to);
    let center = Vec2::new(
        cos_rot * center_p.x - sin_rot * center_p.y + mid.x,
        sin_rot * center_p.x + cos_rot * center_p.y + mid.y,
    );

    let start_v = Vec2::new((p1.x - center_p.x) / rx, (p1.y - center_p.y) / ry);
    let end_v = Vec2::new((-p1.x - center_p.x) / rx, (-p1.y - center_p.y) / ry);
    let theta1 = start_v.y.atan2(start_v.x);
    let mut dtheta = end_v.y.atan2(end_v.x) - theta1;
    if !sweep && dtheta > 0.0 {
        dtheta -= 2.0 * PI;
    } else if sweep && dtheta < 0.0 {
        dtheta += 2.0 * PI;
    }

    let segments = ((dtheta.abs() / (PI / 2.0)).ceil() as u32).max(1);
    let delta = dtheta / segments as f32;
    let k = 4.0 / 3.0 * (delta / 4.0).tan();
    let ellipse = Mat3::rotate(x_rot).mul(Mat3::scale(rx, ry));

    let mut angle = theta1;
    for _ in 0..segments {
        let next = angle + delta;
        let e0 = center + ellipse.transform_point(Vec2::from_angle(angle));
        let e1 = center + ellipse.transform_point(Vec2::from_angle(next));
        // Tangents on the unit circle mapped through the ellipse transform.
        let t0 = ellipse.transform_point(Vec2::new(-angle.sin(), angle.cos()));
        let t1 = ellipse.transform_point(Vec2::new(-next.sin(), next.cos()));
        let c1 = e0 + t0 * k;
        let c2 = e1 - t1 * k;
        path.cubic_to(c1.x, c1.y, c2.x, c2.y, e1.x, e1.y);
        angle = next;
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_separators(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || b == b',' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn error(&self, reason: &'static str) -> SvgError {
        SvgError::Parse {
            index: self.pos,
            reason,
        }
    }

    /// Parse one number token (sign, decimals, optional exponent).
    fn number(&mut self, reason: &'static str) -> Result<f32, SvgError> {
        self.skip_separators();
        let start = self.pos;
        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.pos += 1;
        }
        let mut saw_digit = false;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
            saw_digit = true;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
                saw_digit = true;
            }
        }
        if saw_digit && matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            let mut exp_digit = false;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
                exp_digit = true;
            }
            if !exp_digit {
                self.pos = mark;
            }
        }
        if !saw_digit {
            self.pos = start;
            return Err(self.error(reason));
        }
        let text = core::str::from_utf8(&self.bytes[start..self.pos]).map_err(|_| SvgError::Parse {
            index: start,
            reason,
        })?;
        text.parse::<f32>().map_err(|_| SvgError::Parse {
            index: start,
            reason,
        })
    }

    fn point(&mut self) -> Result<Vec2, SvgError> {
        let x = self.number("expected x coordinate")?;
        let y = self.number("expected y coordinate")?;
        Ok(Vec2::new(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PathCmd;

    fn endpoints(path: &PathBuilder) -> Vec<Vec2> {
        path.commands()
            .iter()
            .filter_map(|cmd| match *cmd {
                PathCmd::MoveTo(p) | PathCmd::LineTo(p) => Some(p),
                PathCmd::QuadTo(_, p) => Some(p),
                PathCmd::CubicTo(_, _, p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn absolute_and_relative_moves() {
        let path = parse_svg_path("M 10 20 l 5 5 L 0 0").unwrap();
        assert_eq!(
            endpoints(&path),
            vec![
                Vec2::new(10.0, 20.0),
                Vec2::new(15.0, 25.0),
                Vec2::new(0.0, 0.0),
            ]
        );
    }

    #[test]
    fn implicit_lineto_after_moveto() {
        let path = parse_svg_path("M0 0 10 0 10 10z").unwrap();
        assert_eq!(path.commands().len(), 4);
        assert!(matches!(path.commands()[1], PathCmd::LineTo(_)));
        assert!(matches!(path.commands()[3], PathCmd::Close));
    }

    #[test]
    fn horizontal_and_vertical_track_the_pen() {
        let path = parse_svg_path("M1 2 H 10 v 3 h -4").unwrap();
        assert_eq!(
            endpoints(&path),
            vec![
                Vec2::new(1.0, 2.0),
                Vec2::new(10.0, 2.0),
                Vec2::new(10.0, 5.0),
                Vec2::new(6.0, 5.0),
            ]
        );
    }

    #[test]
    fn smooth_cubic_reflects_previous_control() {
        let path = parse_svg_path("M0 0 C 0 10 10 10 10 0 S 20 -10 20 0").unwrap();
        let PathCmd::CubicTo(c1, _, _) = path.commands()[2] else {
            panic!("expected cubic");
        };
        // Reflection of (10, 10) through the pen (10, 0).
        assert_eq!(c1, Vec2::new(10.0, -10.0));
    }

    #[test]
    fn smooth_quad_without_predecessor_uses_pen() {
        let path = parse_svg_path("M5 5 T 10 5").unwrap();
        let PathCmd::QuadTo(c, p) = path.commands()[1] else {
            panic!("expected quad");
        };
        assert_eq!(c, Vec2::new(5.0, 5.0));
        assert_eq!(p, Vec2::new(10.0, 5.0));
    }

    #[test]
    fn unknown_letters_are_skipped() {
        let path = parse_svg_path("M0 0 X 9 9 L 10 0").unwrap();
        assert_eq!(
            endpoints(&path),
            vec![Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)]
        );
    }

    #[test]
    fn missing_operand_reports_position() {
        let err = parse_svg_path("M 10").unwrap_err();
        assert_eq!(
            err,
            SvgError::Parse {
                index: 4,
                reason: "expected y coordinate"
            }
        );
    }

    #[test]
    fn arc_endpoints_land_on_target() {
        let path = parse_svg_path("M 0 0 A 50 50 0 0 1 50 50").unwrap();
        let last = endpoints(&path).pop().unwrap();
        assert!(last.distance(Vec2::new(50.0, 50.0)) < 1.0e-3);
        // A quarter-ish sweep still splits into at most two cubics.
        let cubics = path
            .commands()
            .iter()
            .filter(|cmd| matches!(cmd, PathCmd::CubicTo(..)))
            .count();
        assert!((1..=2).contains(&cubics));
    }

    #[test]
    fn arc_stays_near_the_circle() {
        // Half circle of radius 50 centered near (25, 0).
        let path = parse_svg_path("M 0 0 A 25 25 0 0 1 50 0").unwrap();
        let center = Vec2::new(25.0, 0.0);
        for subpath in path.flatten(0.05) {
            for p in subpath {
                assert!((p.distance(center) - 25.0).abs() < 0.1);
            }
        }
    }

    #[test]
    fn zero_radius_arc_degrades_to_line() {
        let path = parse_svg_path("M0 0 A 0 0 0 0 1 10 10").unwrap();
        assert!(matches!(path.commands()[1], PathCmd::LineTo(p) if p == Vec2::new(10.0, 10.0)));
    }

    #[test]
    fn number_grammar_accepts_exponents_and_signs() {
        let path = parse_svg_path("M 1e1 -2.5e-1 L .5 -.5").unwrap();
        let pts = endpoints(&path);
        assert!((pts[0].x - 10.0).abs() < 1.0e-6);
        assert!((pts[0].y + 0.25).abs() < 1.0e-6);
        assert_eq!(pts[1], Vec2::new(0.5, -0.5));
    }
}
