use rayon::prelude::*;

use crate::config::SyntheticParams;
use crate::grid::Grid;

/// Evenly spaced samples over [lo, hi], endpoints included.
fn linspace(lo: f32, hi: f32, n: usize) -> impl Iterator<Item = f32> {
    let step = if n > 1 { (hi - lo) / (n - 1) as f32 } else { 0.0 };
    (0..n).map(move |i| lo + step * i as f32)
}

/// Build the synthetic DEM: four equal Gaussian bumps at (±offset, ±offset)
/// on a [-extent, extent] square, scaled by `amplitude`.
/// Columns follow x, rows follow y. Fully deterministic.
pub fn synthetic_dem(params: &SyntheticParams) -> Grid<f32> {
    let w = params.width;
    let h = params.height;
    let xs: Vec<f32> = linspace(-params.extent, params.extent, w).collect();
    let ys: Vec<f32> = linspace(-params.extent, params.extent, h).collect();
    let o = params.peak_offset;
    let peaks = [(o, o), (-o, o), (o, -o), (-o, -o)];

    let mut height = Grid::<f32>::new(w, h);
    height
        .data
        .par_chunks_mut(w.max(1))
        .zip(ys.par_iter())
        .for_each(|(row, &y)| {
            for (cell, &x) in row.iter_mut().zip(&xs) {
                let bumps: f32 = peaks
                    .iter()
                    .map(|&(cx, cy)| (-((x - cx).powi(2) + (y - cy).powi(2))).exp())
                    .sum();
                *cell = bumps * params.amplitude;
            }
        });

    height
}
