use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const ELEVATION_STEP: f32 = 5.0;
pub const SLOPE_STEP: f32 = 0.05;
pub const THRESHOLD_STEP: f32 = 0.05;
pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_FLATNESS_WEIGHT: f32 = 1.0;

/// All user-adjustable filters, exposed as UI sliders in the frontend.
/// Each range is inclusive on both ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub elevation_min: f32,
    pub elevation_max: f32,
    pub slope_min: f32,
    pub slope_max: f32,
    pub threshold: f32,
    /// Multiplier on the flatness score, clamped to [0, 1] when applied.
    pub flatness_weight: f32,
}

impl FilterParams {
    /// Filters that let every finite cell through the two range masks.
    pub fn full_range(elevation: (f32, f32), slope: (f32, f32)) -> Self {
        Self {
            elevation_min: elevation.0,
            elevation_max: elevation.1,
            slope_min: slope.0,
            slope_max: slope.1,
            threshold: DEFAULT_THRESHOLD,
            flatness_weight: DEFAULT_FLATNESS_WEIGHT,
        }
    }
}

/// Partial filter update. Unset fields fall back to the base parameters.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FilterOverrides {
    pub elevation_min: Option<f32>,
    pub elevation_max: Option<f32>,
    pub slope_min: Option<f32>,
    pub slope_max: Option<f32>,
    pub threshold: Option<f32>,
    pub flatness_weight: Option<f32>,
}

impl FilterOverrides {
    pub fn apply(&self, base: FilterParams) -> FilterParams {
        FilterParams {
            elevation_min: self.elevation_min.unwrap_or(base.elevation_min),
            elevation_max: self.elevation_max.unwrap_or(base.elevation_max),
            slope_min: self.slope_min.unwrap_or(base.slope_min),
            slope_max: self.slope_max.unwrap_or(base.slope_max),
            threshold: self.threshold.unwrap_or(base.threshold),
            flatness_weight: self.flatness_weight.unwrap_or(base.flatness_weight),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RangeSlider {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub value: [f32; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValueSlider {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub value: f32,
}

/// Slider layout for a loaded terrain.
///
/// Bounds are widened outward so the default range never cuts off the
/// extreme cells: the minimum rounds down (whole meters for elevation,
/// hundredths for slope) and the maximum lands on the minimum's step grid,
/// since a range input snaps its value to `min + k * step`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sliders {
    pub elevation: RangeSlider,
    pub slope: RangeSlider,
    pub threshold: ValueSlider,
}

/// Round down to a multiple of `1 / scale`, never landing above `v`.
fn floor_to(v: f32, scale: f32) -> f32 {
    let r = (v * scale).floor() / scale;
    if r > v { r - 1.0 / scale } else { r }
}

/// Smallest `lo + k * step` that is not below `hi`.
fn step_aligned_max(lo: f32, hi: f32, step: f32) -> f32 {
    let steps = ((hi - lo) / step).ceil().max(0.0);
    let max = lo + steps * step;
    if max < hi { lo + (steps + 1.0) * step } else { max }
}

impl Sliders {
    pub fn for_ranges(elevation: (f32, f32), slope: (f32, f32)) -> Self {
        let elev_lo = elevation.0.floor();
        let elev_hi = step_aligned_max(elev_lo, elevation.1, ELEVATION_STEP);
        let slope_lo = floor_to(slope.0, 100.0);
        let slope_hi = step_aligned_max(slope_lo, slope.1, SLOPE_STEP);
        Self {
            elevation: RangeSlider {
                min: elev_lo,
                max: elev_hi,
                step: ELEVATION_STEP,
                value: [elev_lo, elev_hi],
            },
            slope: RangeSlider {
                min: slope_lo,
                max: slope_hi,
                step: SLOPE_STEP,
                value: [slope_lo, slope_hi],
            },
            threshold: ValueSlider {
                min: 0.0,
                max: 1.0,
                step: THRESHOLD_STEP,
                value: DEFAULT_THRESHOLD,
            },
        }
    }

    /// Filter parameters matching the slider defaults.
    pub fn defaults(&self) -> FilterParams {
        FilterParams {
            elevation_min: self.elevation.value[0],
            elevation_max: self.elevation.value[1],
            slope_min: self.slope.value[0],
            slope_max: self.slope.value[1],
            threshold: self.threshold.value,
            flatness_weight: DEFAULT_FLATNESS_WEIGHT,
        }
    }
}

/// Synthetic four-peak DEM used when no file is supplied.
#[derive(Clone, Debug)]
pub struct SyntheticParams {
    pub width: usize,
    pub height: usize,
    /// Coordinates run over [-extent, extent] on both axes.
    pub extent: f32,
    /// Peaks sit at (±offset, ±offset).
    pub peak_offset: f32,
    pub amplitude: f32,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            width: 200,
            height: 200,
            extent: 3.0,
            peak_offset: 1.5,
            amplitude: 100.0,
        }
    }
}

/// HTTP server settings, read from `DEPLOYZONE_*` environment variables.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub frontend_dir: PathBuf,
    pub dem_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            frontend_dir: PathBuf::from("frontend"),
            dem_path: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let addr = match lookup("DEPLOYZONE_ADDR") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("Ignoring invalid DEPLOYZONE_ADDR {:?}", raw);
                defaults.addr
            }),
            None => defaults.addr,
        };
        Self {
            addr,
            frontend_dir: lookup("DEPLOYZONE_FRONTEND")
                .map(PathBuf::from)
                .unwrap_or(defaults.frontend_dir),
            dem_path: lookup("DEPLOYZONE_DEM")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliders_widen_to_cover_data() {
        let s = Sliders::for_ranges((0.37, 99.6), (0.0012, 5.678));
        assert_eq!(s.elevation.min, 0.0);
        assert_eq!(s.elevation.max, 100.0);
        assert!(s.slope.min <= 0.0012);
        assert!(s.slope.max >= 5.678);
        assert_eq!(s.elevation.step, 5.0);
        assert_eq!(s.threshold.value, 0.5);
    }

    fn on_step_grid(slider: &RangeSlider) -> bool {
        let k = (slider.max - slider.min) / slider.step;
        (k - k.round()).abs() < 1e-3
    }

    #[test]
    fn slider_max_is_reachable_by_stepping() {
        // Synthetic-grid extremes: 2.5848 sits between 2.57 and 2.62 on the
        // 0.05 grid starting at 0.02.
        let s = Sliders::for_ranges((0.37, 99.6), (0.0200, 2.5848));
        assert!(on_step_grid(&s.slope));
        assert!(s.slope.max >= 2.5848);
        assert!(s.slope.max < 2.5848 + SLOPE_STEP);
        assert!((s.slope.max - 2.62).abs() < 1e-4);
        assert_eq!(s.slope.value[1], s.slope.max);

        let s = Sliders::for_ranges((3.2, 97.1), (0.013, 0.9));
        assert_eq!(s.elevation.min, 3.0);
        assert_eq!(s.elevation.max, 98.0);
        assert!(on_step_grid(&s.elevation));
        assert!(on_step_grid(&s.slope));
        assert!(s.slope.max >= 0.9);
    }

    #[test]
    fn flat_range_gets_a_usable_slider() {
        let s = Sliders::for_ranges((5.0, 5.0), (0.0, 0.0));
        assert_eq!(s.elevation.min, 5.0);
        assert_eq!(s.elevation.max, 5.0);
        assert_eq!(s.slope.max, 0.0);
    }

    #[test]
    fn overrides_only_touch_set_fields() {
        let base = FilterParams::full_range((0.0, 100.0), (0.0, 2.0));
        let o = FilterOverrides {
            threshold: Some(0.8),
            slope_max: Some(1.0),
            ..Default::default()
        };
        let p = o.apply(base.clone());
        assert_eq!(p.threshold, 0.8);
        assert_eq!(p.slope_max, 1.0);
        assert_eq!(p.elevation_min, base.elevation_min);
        assert_eq!(p.flatness_weight, 1.0);
    }

    #[test]
    fn server_config_from_lookup() {
        let cfg = ServerConfig::from_lookup(|k| match k {
            "DEPLOYZONE_ADDR" => Some("0.0.0.0:8080".into()),
            "DEPLOYZONE_DEM" => Some("dem.tif".into()),
            _ => None,
        });
        assert_eq!(cfg.addr.port(), 8080);
        assert_eq!(cfg.dem_path, Some(PathBuf::from("dem.tif")));
        assert_eq!(cfg.frontend_dir, PathBuf::from("frontend"));

        let bad = ServerConfig::from_lookup(|k| (k == "DEPLOYZONE_ADDR").then(|| "nope".into()));
        assert_eq!(bad.addr, ServerConfig::default().addr);
    }
}
