use rayon::prelude::*;

use crate::grid::Grid;

// Sequential "Blues" palette (ColorBrewer), light to dark.
const BLUES: [[u8; 4]; 9] = [
    [247, 251, 255, 255],
    [222, 235, 247, 255],
    [198, 219, 239, 255],
    [158, 202, 225, 255],
    [107, 174, 214, 255],
    [66, 146, 198, 255],
    [33, 113, 181, 255],
    [8, 81, 156, 255],
    [8, 48, 107, 255],
];

// Transparent cells where the score is not a number.
const NODATA: [u8; 4] = [0, 0, 0, 0];

#[inline]
fn lerp_color(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0);
    [
        (a[0] as f32 + (b[0] as f32 - a[0] as f32) * t).round() as u8,
        (a[1] as f32 + (b[1] as f32 - a[1] as f32) * t).round() as u8,
        (a[2] as f32 + (b[2] as f32 - a[2] as f32) * t).round() as u8,
        255,
    ]
}

/// Blues colormap at `t` in [0, 1].
pub fn blues(t: f32) -> [u8; 4] {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let segments = (BLUES.len() - 1) as f32;
    let pos = t * segments;
    let i = (pos.floor() as usize).min(BLUES.len() - 2);
    lerp_color(BLUES[i], BLUES[i + 1], pos - i as f32)
}

/// Winter colormap at `t` in [0, 1]: blue to green.
/// Green rises and blue falls strictly with `t`.
pub fn winter(t: f32) -> [u8; 4] {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    lerp_color([0, 0, 255, 255], [0, 255, 128, 255], t)
}

/// Inverse of [`winter`] up to 8-bit quantization, read from the green channel.
pub fn winter_value(rgba: [u8; 4]) -> f32 {
    rgba[1] as f32 / 255.0
}

/// Interactive heatmap of a score grid, colored on the grid's own range.
/// Origin is the lower left: grid row 0 is drawn at the bottom.
pub fn render_heatmap(score: &Grid<f32>) -> Vec<u8> {
    let w = score.w;
    let h = score.h;
    let mut rgba = vec![0u8; w * h * 4];
    if rgba.is_empty() {
        return rgba;
    }

    let (lo, hi) = score.finite_range().unwrap_or((0.0, 1.0));
    let inv_range = if hi > lo { 1.0 / (hi - lo) } else { 0.0 };

    rgba.par_chunks_mut(w * 4)
        .enumerate()
        .for_each(|(y, row)| {
            let src_y = h - 1 - y;
            for x in 0..w {
                let v = score.get(x, src_y);
                let color = if v.is_finite() {
                    blues((v - lo) * inv_range)
                } else {
                    NODATA
                };
                row[x * 4..x * 4 + 4].copy_from_slice(&color);
            }
        });

    rgba
}

/// Export raster of a score grid: winter colormap on a fixed [0, 1] scale,
/// one pixel per cell, grid row 0 at the top.
pub fn render_export(score: &Grid<f32>) -> Vec<u8> {
    let w = score.w;
    let mut rgba = vec![0u8; w * score.h * 4];
    if rgba.is_empty() {
        return rgba;
    }

    rgba.par_chunks_mut(w * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..w {
                row[x * 4..x * 4 + 4].copy_from_slice(&winter(score.get(x, y)));
            }
        });

    rgba
}

/// Diagnostic: grayscale of any scalar field (elevation, slope). NaN is transparent.
pub fn render_grayscale(field: &Grid<f32>) -> Vec<u8> {
    let (min_v, max_v) = field.finite_range().unwrap_or((0.0, 1.0));
    let range = (max_v - min_v).max(f32::EPSILON);
    let mut rgba = vec![0u8; field.len() * 4];
    for (i, &v) in field.data.iter().enumerate() {
        let color = if v.is_finite() {
            let g = (((v - min_v) / range) * 255.0).clamp(0.0, 255.0) as u8;
            [g, g, g, 255]
        } else {
            NODATA
        };
        rgba[i * 4..i * 4 + 4].copy_from_slice(&color);
    }
    rgba
}
