use rayon::prelude::*;

use crate::grid::Grid;

/// Derivative at index `i` of a sequence of length `n` with unit spacing:
/// central difference inside, one-sided difference at the two ends.
/// A length-1 axis has no slope along it.
#[inline]
fn derivative(n: usize, i: usize, at: impl Fn(usize) -> f32) -> f32 {
    if n < 2 {
        0.0
    } else if i == 0 {
        at(1) - at(0)
    } else if i == n - 1 {
        at(n - 1) - at(n - 2)
    } else {
        (at(i + 1) - at(i - 1)) * 0.5
    }
}

/// Partial derivatives along rows (dy) and columns (dx).
pub fn gradient(height: &Grid<f32>) -> (Grid<f32>, Grid<f32>) {
    let w = height.w;
    let h = height.h;
    let mut dx = Grid::<f32>::new(w, h);
    let mut dy = Grid::<f32>::new(w, h);
    if height.is_empty() {
        return (dy, dx);
    }

    dx.data
        .par_chunks_mut(w)
        .zip(dy.data.par_chunks_mut(w))
        .enumerate()
        .for_each(|(y, (dx_row, dy_row))| {
            for x in 0..w {
                dx_row[x] = derivative(w, x, |i| height.get(i, y));
                dy_row[x] = derivative(h, y, |j| height.get(x, j));
            }
        });

    (dy, dx)
}

/// Slope magnitude `sqrt(dx² + dy²)` per cell. Always >= 0 for finite input.
///
/// A cell is NaN when its own elevation is NaN or any neighbour used by
/// its difference stencil is NaN.
pub fn slope_magnitude(height: &Grid<f32>) -> Grid<f32> {
    let (dy, dx) = gradient(height);
    let mut slope = Grid::<f32>::new(height.w, height.h);
    slope
        .data
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, s)| {
            *s = if height.data[i].is_nan() {
                f32::NAN
            } else {
                dx.data[i].hypot(dy.data[i])
            };
        });
    slope
}
