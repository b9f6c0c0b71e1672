//! Flatness scoring, range masks and the per-cell suitability score.
//!
//! The final score is
//! `flatness * weight * elevation_mask * slope_mask * threshold_mask`,
//! where the threshold mask is evaluated on the already range-masked score.
//! Every mask is 0/1, so each step can only lower a cell's score.

use std::fmt;

use rayon::prelude::*;
use serde::Serialize;

use crate::config::FilterParams;
use crate::grid::Grid;
use crate::Terrain;

pub const NO_AREAS_MESSAGE: &str = "No areas meet criteria.";

/// Flatness = 1 - normalized slope, in [0, 1].
///
/// Perfectly flat terrain (zero slope variance) scores 1.0 everywhere.
/// Cells with NaN slope (nodata) score 0.0.
pub fn flatness_score(slope: &Grid<f32>) -> Grid<f32> {
    let range = slope.finite_range().and_then(|(lo, hi)| {
        let span = hi - lo;
        (span > 0.0).then_some((lo, span))
    });

    slope.map(|s| {
        if !s.is_finite() {
            return 0.0;
        }
        match range {
            Some((lo, span)) => (1.0 - (s - lo) / span).clamp(0.0, 1.0),
            None => 1.0,
        }
    })
}

/// 1.0 where `lo <= v <= hi`, else 0.0. NaN cells never pass.
pub fn range_mask(values: &Grid<f32>, lo: f32, hi: f32) -> Grid<f32> {
    let mut mask = Grid::<f32>::new(values.w, values.h);
    mask.data
        .par_iter_mut()
        .zip(values.data.par_iter())
        .for_each(|(m, &v)| *m = if v >= lo && v <= hi { 1.0 } else { 0.0 });
    mask
}

/// 1.0 where `score >= threshold`, else 0.0.
pub fn threshold_mask(score: &Grid<f32>, threshold: f32) -> Grid<f32> {
    let mut mask = Grid::<f32>::new(score.w, score.h);
    mask.data
        .par_iter_mut()
        .zip(score.data.par_iter())
        .for_each(|(m, &s)| *m = if s >= threshold { 1.0 } else { 0.0 });
    mask
}

fn multiply(a: &Grid<f32>, b: &Grid<f32>) -> Grid<f32> {
    debug_assert!(a.same_shape(b));
    let mut out = Grid::<f32>::new(a.w, a.h);
    out.data
        .par_iter_mut()
        .zip(a.data.par_iter().zip(b.data.par_iter()))
        .for_each(|(o, (&x, &y))| *o = x * y);
    out
}

/// Intermediate and final score grids for one set of filters.
#[derive(Clone, Debug)]
pub struct ScoreLayers {
    /// Weighted flatness after the elevation and slope masks.
    pub weighted: Grid<f32>,
    /// Weighted score after the threshold mask.
    pub final_score: Grid<f32>,
}

/// Apply the mask chain in order: elevation, slope, then threshold.
pub fn score_layers(
    elevation: &Grid<f32>,
    slope: &Grid<f32>,
    flatness: &Grid<f32>,
    params: &FilterParams,
) -> ScoreLayers {
    debug_assert!(elevation.same_shape(slope) && elevation.same_shape(flatness));

    let weight = if params.flatness_weight.is_finite() {
        params.flatness_weight.clamp(0.0, 1.0)
    } else {
        1.0
    };
    let base = flatness.map(|f| f * weight);

    let elevation_mask = range_mask(elevation, params.elevation_min, params.elevation_max);
    let weighted = multiply(&base, &elevation_mask);

    let slope_mask = range_mask(slope, params.slope_min, params.slope_max);
    let weighted = multiply(&weighted, &slope_mask);

    let threshold_mask = threshold_mask(&weighted, params.threshold);
    let final_score = multiply(&weighted, &threshold_mask);

    ScoreLayers {
        weighted,
        final_score,
    }
}

/// Means over the qualifying cells.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SelectionMeans {
    pub mean_elevation: f64,
    pub mean_slope: f64,
}

/// Summary of a final score grid.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SuitabilityStats {
    pub total_cells: usize,
    pub suitable_cells: usize,
    /// Share of all cells with a score above zero, in percent.
    pub percent_suitable: f64,
    /// None when no cell qualifies.
    pub means: Option<SelectionMeans>,
}

impl SuitabilityStats {
    pub fn has_suitable_area(&self) -> bool {
        self.means.is_some()
    }

    /// Statistics panel, one entry per line.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("Percent Suitable: {:.2}%", self.percent_suitable)];
        match &self.means {
            Some(m) => {
                lines.push(format!("Mean Elevation: {:.2} m", m.mean_elevation));
                lines.push(format!("Mean Slope: {:.2}", m.mean_slope));
            }
            None => lines.push(NO_AREAS_MESSAGE.to_string()),
        }
        lines
    }
}

impl fmt::Display for SuitabilityStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary_lines().join("\n"))
    }
}

/// Percent of cells with score > 0, and mean elevation/slope over them.
pub fn summarize(
    elevation: &Grid<f32>,
    slope: &Grid<f32>,
    final_score: &Grid<f32>,
) -> SuitabilityStats {
    let total_cells = final_score.len();
    let (count, elev_sum, slope_sum) = final_score
        .data
        .par_iter()
        .enumerate()
        .filter(|&(_, &s)| s > 0.0)
        .map(|(i, _)| (1usize, elevation.data[i] as f64, slope.data[i] as f64))
        .reduce(|| (0, 0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2));

    let percent_suitable = if total_cells > 0 {
        100.0 * count as f64 / total_cells as f64
    } else {
        0.0
    };
    let means = (count > 0).then(|| SelectionMeans {
        mean_elevation: elev_sum / count as f64,
        mean_slope: slope_sum / count as f64,
    });

    SuitabilityStats {
        total_cells,
        suitable_cells: count,
        percent_suitable,
        means,
    }
}

/// Run the full pipeline for one set of filters. Pure: the terrain is not
/// modified and no display state is touched.
pub fn compute_suitability(
    terrain: &Terrain,
    params: &FilterParams,
) -> (Grid<f32>, SuitabilityStats) {
    let layers = score_layers(&terrain.elevation, &terrain.slope, &terrain.flatness, params);
    let stats = summarize(&terrain.elevation, &terrain.slope, &layers.final_score);
    (layers.final_score, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(elev: (f32, f32), slope: (f32, f32), threshold: f32) -> FilterParams {
        FilterParams {
            elevation_min: elev.0,
            elevation_max: elev.1,
            slope_min: slope.0,
            slope_max: slope.1,
            threshold,
            flatness_weight: 1.0,
        }
    }

    #[test]
    fn flatness_inverts_normalized_slope() {
        let slope = Grid::from_vec(4, 1, vec![0.0, 1.0, 2.0, 4.0]).unwrap();
        let f = flatness_score(&slope);
        assert_eq!(f.data, vec![1.0, 0.75, 0.5, 0.0]);
    }

    #[test]
    fn flat_slope_scores_one() {
        let slope = Grid::filled(3, 3, 0.0f32);
        let f = flatness_score(&slope);
        assert!(f.data.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn nan_slope_scores_zero() {
        let slope = Grid::from_vec(3, 1, vec![0.0, f32::NAN, 2.0]).unwrap();
        let f = flatness_score(&slope);
        assert_eq!(f.data, vec![1.0, 0.0, 0.0]);

        let all_nan = Grid::filled(2, 1, f32::NAN);
        assert_eq!(flatness_score(&all_nan).data, vec![0.0, 0.0]);
    }

    #[test]
    fn range_mask_is_inclusive() {
        let v = Grid::from_vec(5, 1, vec![1.0, 2.0, 3.0, 4.0, f32::NAN]).unwrap();
        let m = range_mask(&v, 2.0, 4.0);
        assert_eq!(m.data, vec![0.0, 1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn threshold_applies_to_masked_score() {
        // Cell 0 is flat but fails the elevation range, so it must be
        // excluded even though its raw flatness clears the threshold.
        let elevation = Grid::from_vec(3, 1, vec![500.0, 10.0, 10.0]).unwrap();
        let slope = Grid::from_vec(3, 1, vec![0.0, 0.5, 1.0]).unwrap();
        let flatness = flatness_score(&slope);
        let layers = score_layers(
            &elevation,
            &slope,
            &flatness,
            &params((0.0, 100.0), (0.0, 1.0), 0.4),
        );
        assert_eq!(layers.weighted.data, vec![0.0, 0.5, 0.0]);
        assert_eq!(layers.final_score.data, vec![0.0, 0.5, 0.0]);
    }

    #[test]
    fn flatness_weight_scales_scores() {
        let elevation = Grid::filled(2, 1, 1.0f32);
        let slope = Grid::from_vec(2, 1, vec![0.0, 1.0]).unwrap();
        let flatness = flatness_score(&slope);
        let mut p = params((0.0, 2.0), (0.0, 1.0), 0.0);
        p.flatness_weight = 0.5;
        let layers = score_layers(&elevation, &slope, &flatness, &p);
        assert_eq!(layers.final_score.data, vec![0.5, 0.0]);

        p.flatness_weight = 3.0;
        let layers = score_layers(&elevation, &slope, &flatness, &p);
        assert_eq!(layers.final_score.data, vec![1.0, 0.0]);
    }

    #[test]
    fn summarize_means_over_qualifying_cells() {
        let elevation = Grid::from_vec(4, 1, vec![10.0, 20.0, 30.0, 40.0]).unwrap();
        let slope = Grid::from_vec(4, 1, vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let score = Grid::from_vec(4, 1, vec![0.0, 0.9, 0.0, 0.6]).unwrap();
        let stats = summarize(&elevation, &slope, &score);
        assert_eq!(stats.suitable_cells, 2);
        assert_relative_eq!(stats.percent_suitable, 50.0);
        let means = stats.means.clone().unwrap();
        assert_relative_eq!(means.mean_elevation, 30.0);
        assert_relative_eq!(means.mean_slope, 0.3, epsilon = 1e-6);
        assert_eq!(
            stats.summary_lines(),
            vec![
                "Percent Suitable: 50.00%".to_string(),
                "Mean Elevation: 30.00 m".to_string(),
                "Mean Slope: 0.30".to_string(),
            ]
        );
    }

    #[test]
    fn empty_selection_reports_message() {
        let elevation = Grid::filled(2, 2, 1.0f32);
        let slope = Grid::filled(2, 2, 0.0f32);
        let score = Grid::filled(2, 2, 0.0f32);
        let stats = summarize(&elevation, &slope, &score);
        assert_eq!(stats.suitable_cells, 0);
        assert_eq!(stats.percent_suitable, 0.0);
        assert!(!stats.has_suitable_area());
        assert!(stats.to_string().ends_with(NO_AREAS_MESSAGE));
    }

    #[test]
    fn empty_grid_has_no_nan() {
        let g = Grid::<f32>::new(0, 0);
        let stats = summarize(&g, &g, &g);
        assert_eq!(stats.percent_suitable, 0.0);
        assert!(stats.means.is_none());
    }
}
