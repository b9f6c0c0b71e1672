use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deployzone::config::{FilterOverrides, SyntheticParams};
use deployzone::{Terrain, export, render};

/// Score terrain flatness and report which cells suit a field deployment.
#[derive(Parser, Debug)]
#[command(name = "deployzone", version)]
struct Cli {
    /// Single-band GeoTIFF DEM. Without it a synthetic four-peak grid is used.
    #[arg(long)]
    dem: Option<PathBuf>,

    #[arg(long)]
    elevation_min: Option<f32>,
    #[arg(long)]
    elevation_max: Option<f32>,
    #[arg(long)]
    slope_min: Option<f32>,
    #[arg(long)]
    slope_max: Option<f32>,

    /// Minimum suitability score, 0 shows all, 1 only perfectly flat cells.
    #[arg(long)]
    threshold: Option<f32>,

    #[arg(long)]
    flatness_weight: Option<f32>,

    /// Directory for diagnostic PNGs (heatmap, elevation, slope).
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Write the suitability map PNG here.
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deployzone=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let terrain = match &cli.dem {
        Some(path) => Terrain::load(path)
            .with_context(|| format!("failed to load DEM {}", path.display()))?,
        None => Terrain::synthetic(&SyntheticParams::default()),
    };

    let overrides = FilterOverrides {
        elevation_min: cli.elevation_min,
        elevation_max: cli.elevation_max,
        slope_min: cli.slope_min,
        slope_max: cli.slope_max,
        threshold: cli.threshold,
        flatness_weight: cli.flatness_weight,
    };
    let params = overrides.apply(terrain.default_params());

    let (evaluation, timings) = deployzone::evaluate(&terrain, &params);

    eprintln!("\nTimings:");
    for t in &timings {
        eprintln!("  {:20} {:8.1} ms", t.name, t.ms);
    }

    println!("{}", evaluation.stats);
    if !evaluation.stats.has_suitable_area() {
        tracing::warn!("Nothing qualifies; widen the ranges or lower the threshold");
    }

    let (w, h) = (terrain.width(), terrain.height());

    if let Some(out_dir) = &cli.out_dir {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;

        let save = |name: &str, rgba: &[u8]| -> anyhow::Result<()> {
            let path = out_dir.join(name);
            export::write_png(&path, rgba, w, h)
                .with_context(|| format!("failed to save {}", path.display()))?;
            eprintln!("Saved {}", path.display());
            Ok(())
        };

        save("heatmap.png", &evaluation.heatmap_rgba)?;
        save("elevation.png", &render::render_grayscale(&terrain.elevation))?;
        save("slope.png", &render::render_grayscale(&terrain.slope))?;
    }

    if let Some(path) = &cli.export {
        let png = export::export_png(&evaluation.final_score)?;
        std::fs::write(path, png).with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("Saved {}", path.display());
    }

    Ok(())
}
