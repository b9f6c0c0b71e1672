use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use base64::Engine;
use image::ImageEncoder;
use image::codecs::png::PngEncoder;

use crate::error::Result;
use crate::grid::Grid;
use crate::render;

pub const EXPORT_FILE_NAME: &str = "suitability_map.png";

/// Encode an RGBA buffer as PNG bytes.
pub fn encode_png(rgba: &[u8], w: usize, h: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(rgba, w as u32, h as u32, image::ExtendedColorType::Rgba8)?;
    Ok(buf)
}

/// Encode an RGBA buffer as a `data:image/png;base64,...` URL.
pub fn png_data_url(rgba: &[u8], w: usize, h: usize) -> Result<String> {
    let png = encode_png(rgba, w, h)?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(&png);
    Ok(format!("data:image/png;base64,{}", b64))
}

/// Save an RGBA buffer as a PNG file.
pub fn write_png<P: AsRef<Path>>(path: P, rgba: &[u8], w: usize, h: usize) -> Result<()> {
    image::save_buffer(path.as_ref(), rgba, w as u32, h as u32, image::ColorType::Rgba8)?;
    Ok(())
}

/// Render a final score grid for download and return the PNG bytes.
///
/// The image goes through a named temp file which is removed when this
/// returns, whether or not encoding succeeded.
pub fn export_png(score: &Grid<f32>) -> Result<Vec<u8>> {
    export_png_in(score, &std::env::temp_dir())
}

fn export_png_in(score: &Grid<f32>, dir: &Path) -> Result<Vec<u8>> {
    let rgba = render::render_export(score);

    let mut tmp = tempfile::Builder::new()
        .prefix("suitability_")
        .suffix(".png")
        .tempfile_in(dir)?;
    tracing::debug!("Exporting {}x{} heatmap via {}", score.w, score.h, tmp.path().display());

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        PngEncoder::new(&mut writer).write_image(
            &rgba,
            score.w as u32,
            score.h as u32,
            image::ExtendedColorType::Rgba8,
        )?;
        writer.flush()?;
    }

    let file = tmp.as_file_mut();
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_prefix() {
        let url = png_data_url(&[0, 0, 0, 255], 1, 1).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn export_preserves_ordering() {
        let values = vec![0.0, 0.1, 0.35, 0.5, 0.72, 0.9, 1.0, 0.2];
        let score = Grid::from_vec(4, 2, values.clone()).unwrap();
        let png = export_png(&score).unwrap();

        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (4, 2));

        let decoded: Vec<f32> = (0..2)
            .flat_map(|y| (0..4).map(move |x| (x, y)))
            .map(|(x, y)| render::winter_value(img.get_pixel(x, y).0))
            .collect();
        for i in 0..values.len() {
            for j in 0..values.len() {
                if values[i] < values[j] {
                    assert!(decoded[i] < decoded[j], "{} vs {}", values[i], values[j]);
                }
            }
        }
    }

    #[test]
    fn export_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let score = Grid::filled(3, 3, 0.5f32);
        let png = export_png_in(&score, dir.path()).unwrap();
        assert!(!png.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn export_failure_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        // Zero-sized images are rejected by the PNG encoder.
        let score = Grid::<f32>::new(0, 0);
        assert!(export_png_in(&score, dir.path()).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
