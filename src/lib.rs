pub mod config;
pub mod dem;
pub mod elevation;
pub mod error;
pub mod export;
pub mod grid;
pub mod render;
pub mod slope;
pub mod suitability;

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Instant;

use config::{FilterParams, Sliders, SyntheticParams};
use grid::Grid;
use suitability::SuitabilityStats;

pub use error::{Error, Result};

/// Where a terrain's elevation grid came from.
#[derive(Clone, Debug, PartialEq)]
pub enum TerrainSource {
    Synthetic,
    File(PathBuf),
    Upload,
}

impl fmt::Display for TerrainSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerrainSource::Synthetic => write!(f, "synthetic"),
            TerrainSource::File(p) => write!(f, "{}", p.display()),
            TerrainSource::Upload => write!(f, "upload"),
        }
    }
}

/// A loaded elevation grid plus the fields derived from it once per session.
/// Nothing here changes when the filters change.
#[derive(Clone, Debug)]
pub struct Terrain {
    pub source: TerrainSource,
    pub elevation: Grid<f32>,
    pub slope: Grid<f32>,
    pub flatness: Grid<f32>,
    /// Finite min/max of elevation; (0, 0) if the grid has no finite cell.
    pub elevation_range: (f32, f32),
    /// Finite min/max of slope; (0, 0) if the grid has no finite cell.
    pub slope_range: (f32, f32),
}

impl Terrain {
    pub fn from_elevation(elevation: Grid<f32>, source: TerrainSource) -> Self {
        let t = Instant::now();
        let slope = slope::slope_magnitude(&elevation);
        let flatness = suitability::flatness_score(&slope);
        let elevation_range = elevation.finite_range().unwrap_or((0.0, 0.0));
        let slope_range = slope.finite_range().unwrap_or((0.0, 0.0));
        tracing::info!(
            "Terrain ready: {}x{} from {}, elevation {:.2}..{:.2}, slope {:.3}..{:.3} ({:.1} ms)",
            elevation.w,
            elevation.h,
            source,
            elevation_range.0,
            elevation_range.1,
            slope_range.0,
            slope_range.1,
            t.elapsed().as_secs_f64() * 1000.0
        );
        Self {
            source,
            elevation,
            slope,
            flatness,
            elevation_range,
            slope_range,
        }
    }

    /// The built-in four-peak terrain.
    pub fn synthetic(params: &SyntheticParams) -> Self {
        Self::from_elevation(elevation::synthetic_dem(params), TerrainSource::Synthetic)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dem = dem::load_dem(path)?;
        Ok(Self::from_elevation(dem, TerrainSource::File(path.to_path_buf())))
    }

    /// Decode an uploaded GeoTIFF held in memory.
    pub fn from_tiff_bytes(bytes: &[u8]) -> Result<Self> {
        let dem = dem::load_dem_from_reader(Cursor::new(bytes))?;
        Ok(Self::from_elevation(dem, TerrainSource::Upload))
    }

    pub fn width(&self) -> usize {
        self.elevation.w
    }

    pub fn height(&self) -> usize {
        self.elevation.h
    }

    pub fn sliders(&self) -> Sliders {
        Sliders::for_ranges(self.elevation_range, self.slope_range)
    }

    /// Filters matching the slider defaults.
    pub fn default_params(&self) -> FilterParams {
        self.sliders().defaults()
    }
}

pub struct Timing {
    pub name: &'static str,
    pub ms: f64,
}

/// Result of one pass of the pipeline plus its display raster.
pub struct Evaluation {
    pub final_score: Grid<f32>,
    pub stats: SuitabilityStats,
    pub heatmap_rgba: Vec<u8>,
}

/// Score, summarize and render for one set of filters.
pub fn evaluate(terrain: &Terrain, params: &FilterParams) -> (Evaluation, Vec<Timing>) {
    let mut timings = Vec::new();
    let total_start = Instant::now();

    // 1. Mask chain
    let t = Instant::now();
    let layers = suitability::score_layers(
        &terrain.elevation,
        &terrain.slope,
        &terrain.flatness,
        params,
    );
    timings.push(Timing {
        name: "score",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    // 2. Statistics
    let t = Instant::now();
    let stats = suitability::summarize(&terrain.elevation, &terrain.slope, &layers.final_score);
    timings.push(Timing {
        name: "stats",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    // 3. Render
    let t = Instant::now();
    let heatmap_rgba = render::render_heatmap(&layers.final_score);
    timings.push(Timing {
        name: "render",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    let total_ms = total_start.elapsed().as_secs_f64() * 1000.0;
    timings.push(Timing {
        name: "TOTAL",
        ms: total_ms,
    });

    tracing::debug!(
        "Evaluated {:?}: {} of {} cells suitable in {:.1} ms",
        params,
        stats.suitable_cells,
        stats.total_cells,
        total_ms
    );

    if !stats.has_suitable_area() {
        tracing::info!("No cells meet the filters {:?}", params);
    }

    let evaluation = Evaluation {
        final_score: layers.final_score,
        stats,
        heatmap_rgba,
    };

    (evaluation, timings)
}
