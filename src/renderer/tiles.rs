//! CPU tile binner: shape bounds to per-tile shape lists.
//!
//! Three passes over the shape records: count shapes per covered tile, turn
//! the counts into an exclusive scan, then scatter shape ids through
//! per-tile cursors so every tile segment keeps global submission order.

use crate::scene::{ShapeRecord, Uniforms};

#[derive(Debug, Copy, Clone)]
struct TileRange {
    min_tx: u32,
    max_tx: u32,
    min_ty: u32,
    max_ty: u32,
}

/// Pooled binner scratch, reusable across frames. The packed tile tables
/// themselves are fresh allocations per build.
#[derive(Debug, Default)]
pub struct BinScratch {
    counts: Vec<u32>,
    offsets: Vec<u32>,
    cursors: Vec<u32>,
    ranges: Vec<Option<TileRange>>,
}

impl BinScratch {
    fn reset(&mut self, tile_count: usize, shape_count: usize) {
        self.counts.clear();
        self.counts.resize(tile_count, 0);
        self.offsets.clear();
        self.offsets.resize(tile_count, 0);
        self.cursors.clear();
        self.cursors.resize(tile_count, 0);
        self.ranges.clear();
        self.ranges.resize(shape_count, None);
    }
}

/// Bin shapes into tiles; returns `(tile_offset_counts, tile_shape_indices)`.
pub(crate) fn bin_shapes(
    shapes: &[ShapeRecord],
    vertices: &[f32],
    uniforms: &Uniforms,
    scratch: &mut BinScratch,
) -> (Vec<u32>, Vec<u32>) {
    let tiles_x = uniforms.tiles_x;
    let tiles_y = uniforms.tiles_y();
    let tile_count = tiles_x as usize * tiles_y as usize;
    if tile_count == 0 {
        return (Vec::new(), Vec::new());
    }
    scratch.reset(tile_count, shapes.len());

    let tile_size = uniforms.tile_size as f32;
    for (i, shape) in shapes.iter().enumerate() {
        scratch.ranges[i] = shape_tile_range(shape, vertices, tile_size, tiles_x, tiles_y);
        if let Some(range) = scratch.ranges[i] {
            for ty in range.min_ty..=range.max_ty {
                let row = ty * tiles_x;
                for tx in range.min_tx..=range.max_tx {
                    scratch.counts[(row + tx) as usize] += 1;
                }
            }
        }
    }

    let mut total = 0u32;
    for tile in 0..tile_count {
        scratch.offsets[tile] = total;
        scratch.cursors[tile] = total;
        total += scratch.counts[tile];
    }

    let mut tile_shape_indices = vec![0u32; total as usize];
    for (i, range) in scratch.ranges.iter().enumerate() {
        let Some(range) = range else { continue };
        for ty in range.min_ty..=range.max_ty {
            let row = ty * tiles_x;
            for tx in range.min_tx..=range.max_tx {
                let tile = (row + tx) as usize;
                tile_shape_indices[scratch.cursors[tile] as usize] = i as u32;
                scratch.cursors[tile] += 1;
            }
        }
    }

    let mut tile_offset_counts = Vec::with_capacity(tile_count * 2);
    for tile in 0..tile_count {
        tile_offset_counts.push(scratch.offsets[tile]);
        tile_offset_counts.push(scratch.counts[tile]);
    }
    (tile_offset_counts, tile_shape_indices)
}

/// Clamped tile range covered by a shape's AABB, or `None` for degenerate
/// shapes (no vertices, empty bounds, non-finite coordinates).
fn shape_tile_range(
    shape: &ShapeRecord,
    vertices: &[f32],
    tile_size: f32,
    tiles_x: u32,
    tiles_y: u32,
) -> Option<TileRange> {
    if shape.v_count == 0 {
        return None;
    }
    let start = shape.v_start as usize * 2;
    let end = start + shape.v_count as usize * 2;
    debug_assert!(end <= vertices.len());

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for pair in vertices[start..end].chunks_exact(2) {
        min_x = min_x.min(pair[0]);
        max_x = max_x.max(pair[0]);
        min_y = min_y.min(pair[1]);
        max_y = max_y.max(pair[1]);
    }
    if !(min_x <= max_x && min_y <= max_y) {
        return None;
    }

    let clamp_tile = |coord: f32, limit: u32| -> u32 {
        let tile = (coord / tile_size).floor();
        if tile <= 0.0 {
            0
        } else if tile >= (limit - 1) as f32 {
            limit - 1
        } else {
            tile as u32
        }
    };
    let range = TileRange {
        min_tx: clamp_tile(min_x, tiles_x),
        max_tx: clamp_tile(max_x, tiles_x),
        min_ty: clamp_tile(min_y, tiles_y),
        max_ty: clamp_tile(max_y, tiles_y),
    };
    (range.min_tx <= range.max_tx && range.min_ty <= range.max_ty).then_some(range)
}
