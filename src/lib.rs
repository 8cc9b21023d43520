//! tilevg: a tile-binned 2D vector rasterizer.
//!
//! Scenes are authored through a frame-scoped [`Canvas`] (paths, strokes,
//! clips, opacity masks, text), compiled into a compact [`PackedScene`]
//! (fixed-stride records, combined vertex/reference buffers, per-tile shape
//! lists), and rasterized per pixel with supersampled antialiasing and
//! premultiplied `over` compositing — either on the GPU through
//! CubeCL/WGPU or on a portable rayon-based CPU backend that produces
//! byte-identical frames.

mod color;
mod geometry;
mod gpu;
mod hash;
mod math;
mod renderer;
#[cfg(test)]
mod rng;
mod scene;
mod stroke;
mod svg;
mod text;

pub use color::Color;
pub use geometry::{star_points, PathBuilder, PathCmd, DEFAULT_TOLERANCE};
pub use hash::{frame_digest, scene_digest};
pub use math::{Mat3, Vec2, Vec4};
pub use renderer::{
    Backend, BackendKind, BinScratch, CpuRenderer, Frame, FrameDriver, GpuRenderer, RenderError,
    RenderOptions, RenderStats,
};
pub use scene::{
    Canvas, CanvasOptions, ClipRecord, FillRule, MaskRecord, PackedScene, SceneError, ShapeRecord,
    Uniforms,
};
pub use stroke::{expand_stroke, LineCap, LineJoin, StrokeStyle, DEFAULT_STROKE_WIDTH};
pub use svg::{parse_svg_path, SvgError};
pub use text::{layout_text, BlockGlyphs, Glyph, GlyphProvider, TextOptions};
