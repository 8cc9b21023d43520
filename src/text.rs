//! Text outlining through a pluggable glyph provider.
//!
//! Providers hand back per-character contours in unit-em space (y-down,
//! 0..1) plus an advance; layout scales them to pixels and appends them as
//! closed subpaths. Typeface parsing lives outside the crate — the bundled
//! [`BlockGlyphs`] provider renders deterministic rectangular glyphs so
//! tests never touch platform fonts.

use crate::geometry::PathBuilder;
use crate::math::Vec2;

/// Outline of a single character in unit-em space.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    /// Closed contours, y-down, coordinates in 0..1.
    pub contours: Vec<Vec<Vec2>>,
    /// Horizontal advance in em units.
    pub advance: f32,
}

/// Capability interface for typeface implementations.
///
/// Implementations may cache typeface data internally; the rest of the
/// crate holds no state across frames.
pub trait GlyphProvider {
    /// Outline for `ch`, or `None` when the glyph is missing.
    fn glyph(&self, ch: char) -> Option<Glyph>;
}

/// Layout options for [`layout_text`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TextOptions {
    /// Extra pixels between glyphs.
    pub letter_spacing: f32,
    /// Line height as a multiple of the font size.
    pub line_spacing: f32,
    /// Vertical pen offset in pixels applied once at the origin.
    pub baseline_offset: f32,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            letter_spacing: 0.0,
            line_spacing: 1.2,
            baseline_offset: 0.0,
        }
    }
}

/// Lay out `text` as closed subpaths in a fresh builder.
///
/// The pen starts at `(origin_x, origin_y + baseline_offset)`; newlines
/// reset the pen x and advance a line. Missing glyphs substitute `'?'`.
pub fn layout_text(
    provider: &dyn GlyphProvider,
    text: &str,
    origin_x: f32,
    origin_y: f32,
    size: f32,
    options: &TextOptions,
) -> PathBuilder {
    let mut path = PathBuilder::new();
    let mut pen = Vec2::new(origin_x, origin_y + options.baseline_offset);

    for ch in text.chars() {
        if ch == '\n' {
            pen.x = origin_x;
            pen.y += size * options.line_spacing;
            continue;
        }
        let Some(glyph) = provider.glyph(ch).or_else(|| provider.glyph('?')) else {
            continue;
        };
        for contour in &glyph.contours {
            let scaled: Vec<Vec2> = contour.iter().map(|p| pen + *p * size).collect();
            path.poly(&scaled, true);
        }
        pen.x += glyph.advance * size + options.letter_spacing;
    }
    path
}

/// Deterministic rectangular-glyph substitute.
///
/// Every printable character renders as the same box outline; whitespace
/// only advances. Good enough to exercise layout and rasterization without
/// a font file.
#[derive(Debug, Default, Copy, Clone)]
pub struct BlockGlyphs;

impl BlockGlyphs {
    const ADVANCE: f32 = 0.6;
    const SPACE_ADVANCE: f32 = 0.4;

    fn box_contour() -> Vec<Vec2> {
        vec![
            Vec2::new(0.1, 0.1),
            Vec2::new(0.5, 0.1),
            Vec2::new(0.5, 0.9),
            Vec2::new(0.1, 0.9),
        ]
    }
}

impl GlyphProvider for BlockGlyphs {
    fn glyph(&self, ch: char) -> Option<Glyph> {
        if ch == ' ' || ch == '\t' {
            return Some(Glyph {
                contours: Vec::new(),
                advance: Self::SPACE_ADVANCE,
            });
        }
        if ch.is_control() {
            return None;
        }
        Some(Glyph {
            contours: vec![Self::box_contour()],
            advance: Self::ADVANCE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::bounds_from_points;

    struct OnlyQuestionMark;

    impl GlyphProvider for OnlyQuestionMark {
        fn glyph(&self, ch: char) -> Option<Glyph> {
            (ch == '?').then(|| Glyph {
                contours: vec![vec![
                    Vec2::new(0.0, 0.0),
                    Vec2::new(1.0, 0.0),
                    Vec2::new(1.0, 1.0),
                ]],
                advance: 1.0,
            })
        }
    }

    #[test]
    fn glyphs_scale_and_advance() {
        let path = layout_text(&BlockGlyphs, "ab", 10.0, 20.0, 10.0, &TextOptions::default());
        let subpaths = path.flatten(0.35);
        assert_eq!(subpaths.len(), 2);
        let (min_a, _) = bounds_from_points(&subpaths[0]).unwrap();
        let (min_b, _) = bounds_from_points(&subpaths[1]).unwrap();
        assert_eq!(min_a, Vec2::new(11.0, 21.0));
        // Second glyph begins one advance (0.6 em) later.
        assert_eq!(min_b, Vec2::new(17.0, 21.0));
    }

    #[test]
    fn newline_resets_x_and_advances_a_line() {
        let path = layout_text(&BlockGlyphs, "a\nb", 5.0, 0.0, 10.0, &TextOptions::default());
        let subpaths = path.flatten(0.35);
        let (min_b, _) = bounds_from_points(&subpaths[1]).unwrap();
        assert_eq!(min_b, Vec2::new(6.0, 13.0));
    }

    #[test]
    fn letter_spacing_adds_between_glyphs() {
        let options = TextOptions {
            letter_spacing: 3.0,
            ..TextOptions::default()
        };
        let path = layout_text(&BlockGlyphs, "aa", 0.0, 0.0, 10.0, &options);
        let subpaths = path.flatten(0.35);
        let (min_b, _) = bounds_from_points(&subpaths[1]).unwrap();
        assert_eq!(min_b.x, 10.0);
    }

    #[test]
    fn missing_glyph_substitutes_question_mark() {
        let provider = OnlyQuestionMark;
        let direct = layout_text(&provider, "?", 0.0, 0.0, 8.0, &TextOptions::default());
        let substituted = layout_text(&provider, "x", 0.0, 0.0, 8.0, &TextOptions::default());
        assert_eq!(direct.flatten(0.35), substituted.flatten(0.35));
    }

    #[test]
    fn whitespace_advances_without_contours() {
        let path = layout_text(&BlockGlyphs, "a a", 0.0, 0.0, 10.0, &TextOptions::default());
        let subpaths = path.flatten(0.35);
        assert_eq!(subpaths.len(), 2);
        let (min_b, _) = bounds_from_points(&subpaths[1]).unwrap();
        // advance(a) + advance(space) = 0.6 em + 0.4 em.
        assert_eq!(min_b.x, 11.0);
    }
}
