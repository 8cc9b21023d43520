//! Scene authoring and packing.
//!
//! A [`Canvas`] records fills, strokes, clips, opacity groups, and opacity
//! masks for one frame, then [`Canvas::build`] compiles everything into an
//! immutable [`PackedScene`]: fixed-stride shape/clip/mask records, one
//! combined vertex buffer, one combined reference buffer, uniforms, and the
//! tile tables. Emission order is z-order.

use thiserror::Error;

use crate::color::Color;
use crate::geometry::{PathBuilder, DEFAULT_TOLERANCE};
use crate::math::{Vec2, Vec4};
use crate::renderer::tiles::{bin_shapes, BinScratch};
use crate::stroke::{expand_stroke, StrokeStyle};
use crate::svg::{parse_svg_path, SvgError};
use crate::text::{layout_text, GlyphProvider, TextOptions};

// Closure tolerance for fillable polylines.
const CLOSE_EPSILON: f32 = 1.0e-4;

/// Scene construction and validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    /// Pop from an empty clip/opacity/mask stack. Fatal to the frame build.
    #[error("pop from empty {stack} stack")]
    StackUnderflow {
        /// Which stack underflowed.
        stack: &'static str,
    },
    /// A packed-scene invariant does not hold.
    #[error("packed scene invariant violated: {0}")]
    InvariantViolation(&'static str),
}

/// Winding rule for fills, clips, and masks.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum FillRule {
    /// Even-odd edge parity.
    #[default]
    EvenOdd,
    /// Non-zero signed crossings.
    NonZero,
}

impl FillRule {
    pub(crate) fn as_u32(self) -> u32 {
        match self {
            FillRule::EvenOdd => 0,
            FillRule::NonZero => 1,
        }
    }
}

/// Packed per-shape record, 64 bytes, 4-byte aligned.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ShapeRecord {
    /// First vertex index (vertex units, stride 2 floats).
    pub v_start: u32,
    /// Vertex count of the closed polygon.
    pub v_count: u32,
    /// Fill rule (0 = even-odd, 1 = non-zero).
    pub rule: u32,
    pub _pad0: u32,
    /// Premultiplied RGBA.
    pub color: [f32; 4],
    /// First clip reference in the combined ref buffer.
    pub clip_start: u32,
    pub clip_count: u32,
    /// First mask reference in the combined ref buffer.
    pub mask_start: u32,
    pub mask_count: u32,
    /// Accumulated opacity in [0, 1].
    pub opacity: f32,
    pub _pad1: [f32; 3],
}

/// Packed clip record, 16 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ClipRecord {
    pub v_start: u32,
    pub v_count: u32,
    pub rule: u32,
    pub _pad: u32,
}

/// Packed opacity-mask record, 32 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct MaskRecord {
    pub v_start: u32,
    pub v_count: u32,
    pub rule: u32,
    pub _pad: u32,
    /// Mask alpha in [0, 1].
    pub alpha: f32,
    pub _pad1: [f32; 3],
}

/// Kernel uniforms, 32 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Uniforms {
    pub canvas_w: u32,
    pub canvas_h: u32,
    pub tile_size: u32,
    pub tiles_x: u32,
    pub supersample: u32,
    pub _pad: [u32; 3],
}

impl Uniforms {
    /// Tile rows implied by the canvas height.
    pub fn tiles_y(&self) -> u32 {
        self.canvas_h.div_ceil(self.tile_size)
    }

    /// Total tile count.
    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y() as usize
    }
}

/// Canvas configuration. Out-of-range values are snapped into the
/// supported ranges at construction.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CanvasOptions {
    /// Curve flattening tolerance in pixels.
    pub tolerance: f32,
    /// Tile edge length in pixels (16..=128).
    pub tile_size: u32,
    /// Supersampling factor per axis (1, 2, or 4).
    pub supersample: u32,
}

impl Default for CanvasOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            tile_size: 64,
            supersample: 2,
        }
    }
}

#[derive(Debug, Clone)]
struct ShapeInstance {
    points: Vec<Vec2>,
    rule: FillRule,
    color: Vec4,
    clip_refs: Vec<u32>,
    mask_refs: Vec<u32>,
    opacity: f32,
}

#[derive(Debug, Clone)]
struct ClipInstance {
    points: Vec<Vec2>,
    rule: FillRule,
}

#[derive(Debug, Clone)]
struct MaskInstance {
    points: Vec<Vec2>,
    rule: FillRule,
    alpha: f32,
}

/// Frame-scoped scene recorder; consumed by [`Canvas::build`].
#[derive(Debug)]
pub struct Canvas {
    width: u32,
    height: u32,
    options: CanvasOptions,
    shapes: Vec<ShapeInstance>,
    clips: Vec<ClipInstance>,
    masks: Vec<MaskInstance>,
    clip_stack: Vec<Vec<u32>>,
    mask_stack: Vec<Vec<u32>>,
    opacity_stack: Vec<f32>,
}

impl Canvas {
    /// Create a canvas with default options.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_options(width, height, CanvasOptions::default())
    }

    /// Create a canvas with explicit options (snapped into range).
    pub fn with_options(width: u32, height: u32, options: CanvasOptions) -> Self {
        let options = CanvasOptions {
            tolerance: options.tolerance.max(1.0e-3),
            tile_size: options.tile_size.clamp(16, 128),
            supersample: match options.supersample {
                0 | 1 => 1,
                2 | 3 => 2,
                _ => 4,
            },
        };
        Self {
            width,
            height,
            options,
            shapes: Vec::new(),
            clips: Vec::new(),
            masks: Vec::new(),
            clip_stack: Vec::new(),
            mask_stack: Vec::new(),
            opacity_stack: vec![1.0],
        }
    }

    /// New empty path builder.
    pub fn path() -> PathBuilder {
        PathBuilder::new()
    }

    /// Fill `path` with `color` under `rule`.
    ///
    /// All closed subpaths of one fill pack into a single shape record:
    /// because every subpath ends on a copy of its first point, the edges
    /// bridging consecutive subpaths coincide in opposite directions and
    /// cancel under both fill rules, so holes work the keyhole way.
    pub fn fill_path(&mut self, path: &PathBuilder, color: Color, rule: FillRule) {
        let mut points: Vec<Vec2> = Vec::new();
        for subpath in path.flatten(self.options.tolerance) {
            if let Some(polygon) = closed_polygon(subpath) {
                points.extend(polygon);
            }
        }
        if !points.is_empty() {
            self.emit_shape(points, rule, color.premultiply());
        }
    }

    /// Stroke `path` with the given width and style; the expansion output
    /// composites as even-odd fills, one record per polygon.
    pub fn stroke_path(&mut self, path: &PathBuilder, width: f32, color: Color, style: &StrokeStyle) {
        let premultiplied = color.premultiply();
        for subpath in path.flatten(self.options.tolerance) {
            for polygon in expand_stroke(&subpath, width, style) {
                self.emit_shape(polygon, FillRule::EvenOdd, premultiplied);
            }
        }
    }

    /// Push one clip frame; subsequent shapes render only where every
    /// active clip contains the sample.
    pub fn push_clip(&mut self, path: &PathBuilder, rule: FillRule) {
        let mut frame = Vec::new();
        for subpath in path.flatten(self.options.tolerance) {
            if let Some(points) = closed_polygon(subpath) {
                frame.push(self.clips.len() as u32);
                self.clips.push(ClipInstance { points, rule });
            }
        }
        self.clip_stack.push(frame);
    }

    /// Pop the innermost clip frame.
    pub fn pop_clip(&mut self) -> Result<(), SceneError> {
        self.clip_stack
            .pop()
            .map(|_| ())
            .ok_or(SceneError::StackUnderflow { stack: "clip" })
    }

    /// Push a multiplicative opacity, clamped into [0, 1].
    pub fn push_opacity(&mut self, alpha: f32) {
        self.opacity_stack.push(alpha.clamp(0.0, 1.0));
    }

    /// Pop one opacity; the initial element never pops.
    pub fn pop_opacity(&mut self) -> Result<(), SceneError> {
        if self.opacity_stack.len() <= 1 {
            return Err(SceneError::StackUnderflow { stack: "opacity" });
        }
        self.opacity_stack.pop();
        Ok(())
    }

    /// Push one opacity-mask frame carrying `alpha` per subpath.
    pub fn push_opacity_mask(&mut self, path: &PathBuilder, alpha: f32, rule: FillRule) {
        let alpha = alpha.clamp(0.0, 1.0);
        let mut frame = Vec::new();
        for subpath in path.flatten(self.options.tolerance) {
            if let Some(points) = closed_polygon(subpath) {
                frame.push(self.masks.len() as u32);
                self.masks.push(MaskInstance { points, rule, alpha });
            }
        }
        self.mask_stack.push(frame);
    }

    /// Pop the innermost mask frame.
    pub fn pop_opacity_mask(&mut self) -> Result<(), SceneError> {
        self.mask_stack
            .pop()
            .map(|_| ())
            .ok_or(SceneError::StackUnderflow { stack: "mask" })
    }

    /// Fill laid-out text using a glyph provider.
    #[allow(clippy::too_many_arguments)]
    pub fn fill_text(
        &mut self,
        provider: &dyn GlyphProvider,
        text: &str,
        x: f32,
        y: f32,
        size: f32,
        color: Color,
        options: &TextOptions,
    ) {
        let path = layout_text(provider, text, x, y, size, options);
        self.fill_path(&path, color, FillRule::EvenOdd);
    }

    /// Stroke laid-out text using a glyph provider.
    #[allow(clippy::too_many_arguments)]
    pub fn stroke_text(
        &mut self,
        provider: &dyn GlyphProvider,
        text: &str,
        x: f32,
        y: f32,
        size: f32,
        width: f32,
        color: Color,
        style: &StrokeStyle,
        options: &TextOptions,
    ) {
        let path = layout_text(provider, text, x, y, size, options);
        self.stroke_path(&path, width, color, style);
    }

    /// Parse and fill an SVG `d` string.
    pub fn fill_svg(&mut self, d: &str, color: Color, rule: FillRule) -> Result<(), SvgError> {
        let path = parse_svg_path(d)?;
        self.fill_path(&path, color, rule);
        Ok(())
    }

    /// Parse and stroke an SVG `d` string.
    pub fn stroke_svg(
        &mut self,
        d: &str,
        width: f32,
        color: Color,
        style: &StrokeStyle,
    ) -> Result<(), SvgError> {
        let path = parse_svg_path(d)?;
        self.stroke_path(&path, width, color, style);
        Ok(())
    }

    /// Compile the recorded scene, reusing pooled binner scratch.
    pub fn build_with(self, scratch: &mut BinScratch) -> Result<PackedScene, SceneError> {
        let uniforms = Uniforms {
            canvas_w: self.width,
            canvas_h: self.height,
            tile_size: self.options.tile_size,
            tiles_x: self.width.div_ceil(self.options.tile_size),
            supersample: self.options.supersample,
            _pad: [0; 3],
        };

        let mut vertices = Vec::new();
        let mut refs = Vec::new();
        let mut shapes = Vec::with_capacity(self.shapes.len());
        let mut clips = Vec::with_capacity(self.clips.len());
        let mut masks = Vec::with_capacity(self.masks.len());

        // Shape vertices first; clip and mask vertices follow and their
        // records are rebased onto the combined buffer.
        let mut clip_ref_cursor = 0u32;
        let mut mask_ref_cursor = 0u32;
        for shape in &self.shapes {
            let v_start = (vertices.len() / 2) as u32;
            push_points(&mut vertices, &shape.points);
            let record = ShapeRecord {
                v_start,
                v_count: shape.points.len() as u32,
                rule: shape.rule.as_u32(),
                color: [shape.color.x, shape.color.y, shape.color.z, shape.color.w],
                clip_start: clip_ref_cursor,
                clip_count: shape.clip_refs.len() as u32,
                mask_start: mask_ref_cursor,
                mask_count: shape.mask_refs.len() as u32,
                opacity: shape.opacity,
                ..ShapeRecord::default()
            };
            clip_ref_cursor += record.clip_count;
            mask_ref_cursor += record.mask_count;
            shapes.push(record);
        }

        let clip_vertex_base = (vertices.len() / 2) as u32;
        for clip in &self.clips {
            let v_start = (vertices.len() / 2) as u32;
            push_points(&mut vertices, &clip.points);
            clips.push(ClipRecord {
                v_start,
                v_count: clip.points.len() as u32,
                rule: clip.rule.as_u32(),
                _pad: 0,
            });
        }
        debug_assert!(clips.iter().all(|c| c.v_start >= clip_vertex_base));

        for mask in &self.masks {
            let v_start = (vertices.len() / 2) as u32;
            push_points(&mut vertices, &mask.points);
            masks.push(MaskRecord {
                v_start,
                v_count: mask.points.len() as u32,
                rule: mask.rule.as_u32(),
                alpha: mask.alpha,
                ..MaskRecord::default()
            });
        }

        // Combined reference buffer: all clip refs, then all mask refs.
        for shape in &self.shapes {
            refs.extend_from_slice(&shape.clip_refs);
        }
        let clip_ref_total = refs.len() as u32;
        for shape in &self.shapes {
            refs.extend_from_slice(&shape.mask_refs);
        }
        for record in &mut shapes {
            record.mask_start += clip_ref_total;
        }

        let (tile_offset_counts, tile_shape_indices) =
            bin_shapes(&shapes, &vertices, &uniforms, scratch);

        let scene = PackedScene {
            uniforms,
            shapes,
            clips,
            masks,
            vertices,
            refs,
            tile_offset_counts,
            tile_shape_indices,
        };
        if cfg!(debug_assertions) {
            scene.validate()?;
        }
        Ok(scene)
    }

    /// Compile the recorded scene with fresh binner scratch.
    pub fn build(self) -> Result<PackedScene, SceneError> {
        let mut scratch = BinScratch::default();
        self.build_with(&mut scratch)
    }

    fn emit_shape(&mut self, points: Vec<Vec2>, rule: FillRule, color: Vec4) {
        // Snapshot of the authoring stacks at emission time.
        let clip_refs = self.clip_stack.iter().flatten().copied().collect();
        let mask_refs = self.mask_stack.iter().flatten().copied().collect();
        let opacity = self
            .opacity_stack
            .iter()
            .product::<f32>()
            .clamp(0.0, 1.0);
        self.shapes.push(ShapeInstance {
            points,
            rule,
            color,
            clip_refs,
            mask_refs,
            opacity,
        });
    }
}

/// Close a subpath and require at least 3 distinct vertices.
fn closed_polygon(mut points: Vec<Vec2>) -> Option<Vec<Vec2>> {
    let first = *points.first()?;
    if points
        .last()
        .map(|last| last.distance(first) > CLOSE_EPSILON)
        .unwrap_or(true)
    {
        points.push(first);
    }
    let mut distinct = 0;
    for (i, p) in points.iter().enumerate() {
        if points[..i].iter().all(|q| q.distance(*p) > CLOSE_EPSILON) {
            distinct += 1;
        }
    }
    (distinct >= 3).then_some(points)
}

/// Check that a vertex span is a concatenation of closed loops, each with
/// at least 3 edges (fills may pack several keyhole subpaths in one span).
fn polygon_is_closed(vertices: &[f32], v_start: u32, v_count: u32) -> Result<(), SceneError> {
    let base = v_start as usize * 2;
    let n = v_count as usize;
    if n < 4 {
        return Err(SceneError::InvariantViolation("shape polygon has too few vertices"));
    }
    let point = |i: usize| Vec2::new(vertices[base + i * 2], vertices[base + i * 2 + 1]);
    let mut loop_start = 0usize;
    let mut i = 1usize;
    while i < n {
        if i - loop_start >= 3 && point(i).distance(point(loop_start)) <= CLOSE_EPSILON {
            loop_start = i + 1;
            i = loop_start + 1;
        } else {
            i += 1;
        }
    }
    if loop_start == n {
        Ok(())
    } else {
        Err(SceneError::InvariantViolation("shape polygon is not closed"))
    }
}

fn push_points(vertices: &mut Vec<f32>, points: &[Vec2]) {
    vertices.reserve(points.len() * 2);
    for p in points {
        vertices.push(p.x);
        vertices.push(p.y);
    }
}

/// Immutable compiled scene consumed by the rasterizer backends.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedScene {
    pub uniforms: Uniforms,
    pub shapes: Vec<ShapeRecord>,
    pub clips: Vec<ClipRecord>,
    pub masks: Vec<MaskRecord>,
    /// Interleaved x,y pairs: shape verts, then clip verts, then mask verts.
    pub vertices: Vec<f32>,
    /// Combined reference buffer: clip ids, then mask ids, in shape order.
    pub refs: Vec<u32>,
    /// Interleaved `[offset, count]` per tile.
    pub tile_offset_counts: Vec<u32>,
    /// Shape ids per tile in global submission order.
    pub tile_shape_indices: Vec<u32>,
}

impl PackedScene {
    /// Check every packed-scene invariant.
    pub fn validate(&self) -> Result<(), SceneError> {
        let u = &self.uniforms;
        if u.tile_size == 0 || u.tiles_x != u.canvas_w.div_ceil(u.tile_size) {
            return Err(SceneError::InvariantViolation("tile grid mismatch"));
        }
        let tile_count = u.tile_count();
        if self.tile_offset_counts.len() != tile_count * 2 {
            return Err(SceneError::InvariantViolation("tile table size mismatch"));
        }

        let vertex_count = (self.vertices.len() / 2) as u32;
        let clip_ref_total: u32 = self.shapes.iter().map(|s| s.clip_count).sum();
        let ref_total = self.refs.len() as u32;
        if clip_ref_total > ref_total {
            return Err(SceneError::InvariantViolation("clip references exceed the ref buffer"));
        }
        for shape in &self.shapes {
            if shape.v_start + shape.v_count > vertex_count {
                return Err(SceneError::InvariantViolation("shape vertex span out of range"));
            }
            if shape.clip_start + shape.clip_count > clip_ref_total {
                return Err(SceneError::InvariantViolation("clip reference span out of range"));
            }
            if shape.mask_start + shape.mask_count > ref_total {
                return Err(SceneError::InvariantViolation("mask reference span out of range"));
            }
            if !(0.0..=1.0).contains(&shape.opacity) {
                return Err(SceneError::InvariantViolation("shape opacity out of range"));
            }
            polygon_is_closed(&self.vertices, shape.v_start, shape.v_count)?;
        }
        for clip in &self.clips {
            if clip.v_start + clip.v_count > vertex_count {
                return Err(SceneError::InvariantViolation("clip vertex span out of range"));
            }
        }
        for mask in &self.masks {
            if mask.v_start + mask.v_count > vertex_count {
                return Err(SceneError::InvariantViolation("mask vertex span out of range"));
            }
        }
        for &id in &self.refs[..clip_ref_total as usize] {
            if id as usize >= self.clips.len() {
                return Err(SceneError::InvariantViolation("clip reference out of range"));
            }
        }
        for &id in &self.refs[clip_ref_total as usize..] {
            if id as usize >= self.masks.len() {
                return Err(SceneError::InvariantViolation("mask reference out of range"));
            }
        }

        let mut expected_offset = 0u32;
        let mut total = 0u64;
        for tile in 0..tile_count {
            let offset = self.tile_offset_counts[tile * 2];
            let count = self.tile_offset_counts[tile * 2 + 1];
            if offset != expected_offset {
                return Err(SceneError::InvariantViolation("tile offsets are not an exclusive scan"));
            }
            expected_offset += count;
            total += count as u64;
            if (offset + count) as usize > self.tile_shape_indices.len() {
                return Err(SceneError::InvariantViolation("tile span exceeds the index list"));
            }
            let span = &self.tile_shape_indices[offset as usize..(offset + count) as usize];
            if !span.windows(2).all(|w| w[0] < w[1]) {
                return Err(SceneError::InvariantViolation("tile shape ids are not increasing"));
            }
            if span.iter().any(|&id| id as usize >= self.shapes.len()) {
                return Err(SceneError::InvariantViolation("tile shape id out of range"));
            }
        }
        if total != self.tile_shape_indices.len() as u64 {
            return Err(SceneError::InvariantViolation("tile counts do not cover the index list"));
        }
        Ok(())
    }

    /// Total clip references (the shift applied to every `mask_start`).
    pub fn clip_ref_total(&self) -> u32 {
        self.shapes.iter().map(|s| s.clip_count).sum()
    }

    /// Shape records flattened into 16 f32 lanes each for GPU upload.
    /// Integer fields travel as exact small integers in f32.
    pub(crate) fn shape_lanes(&self) -> Vec<f32> {
        let mut lanes = Vec::with_capacity(self.shapes.len() * 16);
        for s in &self.shapes {
            lanes.extend_from_slice(&[
                s.v_start as f32,
                s.v_count as f32,
                s.rule as f32,
                0.0,
                s.color[0],
                s.color[1],
                s.color[2],
                s.color[3],
                s.clip_start as f32,
                s.clip_count as f32,
                s.mask_start as f32,
                s.mask_count as f32,
                s.opacity,
                0.0,
                0.0,
                0.0,
            ]);
        }
        lanes
    }

    /// Clip records flattened into 4 f32 lanes each.
    pub(crate) fn clip_lanes(&self) -> Vec<f32> {
        let mut lanes = Vec::with_capacity(self.clips.len() * 4);
        for c in &self.clips {
            lanes.extend_from_slice(&[c.v_start as f32, c.v_count as f32, c.rule as f32, 0.0]);
        }
        lanes
    }

    /// Mask records flattened into 8 f32 lanes each.
    pub(crate) fn mask_lanes(&self) -> Vec<f32> {
        let mut lanes = Vec::with_capacity(self.masks.len() * 8);
        for m in &self.masks {
            lanes.extend_from_slice(&[
                m.v_start as f32,
                m.v_count as f32,
                m.rule as f32,
                0.0,
                m.alpha,
                0.0,
                0.0,
                0.0,
            ]);
        }
        lanes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red() -> Color {
        Color::rgba8(255, 0, 0, 255)
    }

    fn rect_path(x: f32, y: f32, w: f32, h: f32) -> PathBuilder {
        let mut path = PathBuilder::new();
        path.rect(x, y, w, h);
        path
    }

    #[test]
    fn fill_emits_closed_polygons_only() {
        let mut canvas = Canvas::new(64, 64);
        let mut degenerate = PathBuilder::new();
        degenerate.move_to(0.0, 0.0).line_to(10.0, 0.0);
        canvas.fill_path(&degenerate, red(), FillRule::EvenOdd);
        canvas.fill_path(&rect_path(0.0, 0.0, 10.0, 10.0), red(), FillRule::EvenOdd);
        let scene = canvas.build().unwrap();
        assert_eq!(scene.shapes.len(), 1);
        assert_eq!(scene.shapes[0].v_count, 5);
    }

    #[test]
    fn pop_on_empty_stacks_underflows() {
        let mut canvas = Canvas::new(32, 32);
        assert_eq!(
            canvas.pop_clip(),
            Err(SceneError::StackUnderflow { stack: "clip" })
        );
        assert_eq!(
            canvas.pop_opacity(),
            Err(SceneError::StackUnderflow { stack: "opacity" })
        );
        assert_eq!(
            canvas.pop_opacity_mask(),
            Err(SceneError::StackUnderflow { stack: "mask" })
        );
    }

    #[test]
    fn balanced_pushes_leave_no_references() {
        let mut canvas = Canvas::new(64, 64);
        canvas.push_clip(&rect_path(0.0, 0.0, 32.0, 32.0), FillRule::EvenOdd);
        canvas.push_opacity(0.5);
        canvas.pop_opacity().unwrap();
        canvas.pop_clip().unwrap();
        canvas.fill_path(&rect_path(0.0, 0.0, 16.0, 16.0), red(), FillRule::EvenOdd);
        let scene = canvas.build().unwrap();
        let shape = scene.shapes[0];
        assert_eq!(shape.clip_count, 0);
        assert_eq!(shape.mask_count, 0);
        assert_eq!(shape.opacity, 1.0);
    }

    #[test]
    fn shapes_snapshot_the_active_stacks() {
        let mut canvas = Canvas::new(64, 64);
        canvas.push_clip(&rect_path(0.0, 0.0, 32.0, 32.0), FillRule::EvenOdd);
        canvas.push_clip(&rect_path(8.0, 8.0, 32.0, 32.0), FillRule::NonZero);
        canvas.push_opacity(0.5);
        canvas.push_opacity(0.5);
        canvas.fill_path(&rect_path(0.0, 0.0, 16.0, 16.0), red(), FillRule::EvenOdd);
        canvas.pop_opacity().unwrap();
        canvas.pop_clip().unwrap();
        canvas.fill_path(&rect_path(0.0, 0.0, 16.0, 16.0), red(), FillRule::EvenOdd);
        let scene = canvas.build().unwrap();

        let inner = scene.shapes[0];
        assert_eq!(inner.clip_count, 2);
        assert!((inner.opacity - 0.25).abs() < 1.0e-6);
        let outer = scene.shapes[1];
        assert_eq!(outer.clip_count, 1);
        assert!((outer.opacity - 0.5).abs() < 1.0e-6);
        // Bottom-up snapshot order.
        assert_eq!(scene.refs[inner.clip_start as usize], 0);
        assert_eq!(scene.refs[inner.clip_start as usize + 1], 1);
    }

    #[test]
    fn vertex_buffer_orders_shapes_clips_masks() {
        let mut canvas = Canvas::new(64, 64);
        canvas.push_clip(&rect_path(0.0, 0.0, 32.0, 32.0), FillRule::EvenOdd);
        canvas.push_opacity_mask(&rect_path(4.0, 4.0, 8.0, 8.0), 0.5, FillRule::EvenOdd);
        canvas.fill_path(&rect_path(0.0, 0.0, 16.0, 16.0), red(), FillRule::EvenOdd);
        let scene = canvas.build().unwrap();

        let shape = scene.shapes[0];
        assert_eq!(shape.v_start, 0);
        // Clip vertices start after the 5 shape vertices.
        assert_eq!(scene.clips[0].v_start, 5);
        assert_eq!(scene.masks[0].v_start, 10);
        // Mask refs are shifted past the clip refs in the combined buffer.
        assert_eq!(shape.clip_start, 0);
        assert_eq!(shape.mask_start, 1);
        assert_eq!(scene.refs, vec![0, 0]);
    }

    #[test]
    fn mask_alpha_is_clamped() {
        let mut canvas = Canvas::new(64, 64);
        canvas.push_opacity_mask(&rect_path(0.0, 0.0, 8.0, 8.0), 3.0, FillRule::EvenOdd);
        canvas.fill_path(&rect_path(0.0, 0.0, 16.0, 16.0), red(), FillRule::EvenOdd);
        let scene = canvas.build().unwrap();
        assert_eq!(scene.masks[0].alpha, 1.0);
    }

    #[test]
    fn stroke_emits_even_odd_shapes() {
        let mut canvas = Canvas::new(64, 64);
        let mut path = PathBuilder::new();
        path.move_to(8.0, 8.0).line_to(40.0, 8.0);
        canvas.stroke_path(&path, 4.0, red(), &StrokeStyle::default());
        let scene = canvas.build().unwrap();
        assert!(!scene.shapes.is_empty());
        assert!(scene.shapes.iter().all(|s| s.rule == 0));
    }

    #[test]
    fn empty_canvas_builds_an_empty_scene() {
        let scene = Canvas::new(128, 96).build().unwrap();
        assert!(scene.shapes.is_empty());
        assert_eq!(scene.uniforms.tiles_x, 2);
        assert_eq!(scene.uniforms.tiles_y(), 2);
        assert_eq!(scene.tile_offset_counts, vec![0; 8]);
        assert!(scene.tile_shape_indices.is_empty());
    }

    #[test]
    fn build_validates_in_debug() {
        let mut canvas = Canvas::new(64, 64);
        canvas.fill_path(&rect_path(0.0, 0.0, 32.0, 32.0), red(), FillRule::NonZero);
        let scene = canvas.build().unwrap();
        assert_eq!(scene.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_tampered_tables() {
        let mut canvas = Canvas::new(64, 64);
        canvas.fill_path(&rect_path(0.0, 0.0, 32.0, 32.0), red(), FillRule::EvenOdd);
        let mut scene = canvas.build().unwrap();
        scene.tile_offset_counts[1] += 1;
        assert!(scene.validate().is_err());
    }

    #[test]
    fn records_rebuild_from_lanes() {
        let mut canvas = Canvas::new(64, 64);
        canvas.push_clip(&rect_path(0.0, 0.0, 48.0, 48.0), FillRule::NonZero);
        canvas.push_opacity(0.75);
        canvas.fill_path(&rect_path(4.0, 4.0, 20.0, 20.0), Color::rgba8(0, 128, 255, 200), FillRule::EvenOdd);
        let scene = canvas.build().unwrap();

        let lanes = scene.shape_lanes();
        assert_eq!(lanes.len(), 16);
        let rebuilt = ShapeRecord {
            v_start: lanes[0] as u32,
            v_count: lanes[1] as u32,
            rule: lanes[2] as u32,
            color: [lanes[4], lanes[5], lanes[6], lanes[7]],
            clip_start: lanes[8] as u32,
            clip_count: lanes[9] as u32,
            mask_start: lanes[10] as u32,
            mask_count: lanes[11] as u32,
            opacity: lanes[12],
            ..ShapeRecord::default()
        };
        assert_eq!(rebuilt, scene.shapes[0]);

        let clip_lanes = scene.clip_lanes();
        let rebuilt_clip = ClipRecord {
            v_start: clip_lanes[0] as u32,
            v_count: clip_lanes[1] as u32,
            rule: clip_lanes[2] as u32,
            _pad: 0,
        };
        assert_eq!(rebuilt_clip, scene.clips[0]);
    }

    #[test]
    fn opacity_defaults_apply_without_pushes() {
        let mut canvas = Canvas::new(64, 64);
        canvas.push_opacity(2.0);
        canvas.fill_path(&rect_path(0.0, 0.0, 16.0, 16.0), red(), FillRule::EvenOdd);
        let scene = canvas.build().unwrap();
        // Pushed values clamp at push time.
        assert_eq!(scene.shapes[0].opacity, 1.0);
    }
}
