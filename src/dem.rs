//! GeoTIFF DEM decoding.
//!
//! Only the first image of the file is read, and it must be a single band.
//! Geographic metadata is ignored: the pipeline works in pixel space.

use std::io::{Read, Seek};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;

use crate::error::{Error, Result};
use crate::grid::Grid;

/// GDAL_NODATA, stored as an ASCII string.
const TAG_GDAL_NODATA: u16 = 42113;

/// Load a single-band DEM from a GeoTIFF file.
pub fn load_dem<P: AsRef<Path>>(path: P) -> Result<Grid<f32>> {
    let path = path.as_ref();
    let file = std::io::BufReader::new(std::fs::File::open(path)?);
    let dem = load_dem_from_reader(file)?;
    tracing::info!("Loaded DEM {} ({}x{})", path.display(), dem.w, dem.h);
    Ok(dem)
}

/// Load a single-band DEM from any seekable reader (e.g. an uploaded buffer).
///
/// Cells equal to the GDAL nodata value, and non-finite cells, become NaN.
pub fn load_dem_from_reader<R: Read + Seek>(reader: R) -> Result<Grid<f32>> {
    let mut decoder = Decoder::new(reader)?;

    // Allow large DEMs; the defaults cap decoding buffers well below a
    // typical 10k x 10k float tile.
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;
    decoder = decoder.with_limits(limits);

    let (width, height) = decoder.dimensions()?;
    if width == 0 || height == 0 {
        return Err(Error::EmptyRaster { width, height });
    }

    match decoder.colortype()? {
        ColorType::Gray(_) => {}
        other => {
            return Err(Error::UnsupportedDataType(format!(
                "expected a single band, found {:?}",
                other
            )));
        }
    }

    let nodata = read_nodata_value(&mut decoder);
    let data = decode_samples(decoder.read_image()?);

    let expected = width as usize * height as usize;
    if data.len() != expected {
        return Err(Error::UnsupportedDataType(format!(
            "decoded {} samples for a {}x{} raster",
            data.len(),
            width,
            height
        )));
    }

    let data = mask_nodata(data, nodata);
    Grid::from_vec(width as usize, height as usize, data).ok_or(Error::EmptyRaster { width, height })
}

fn decode_samples(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    }
}

fn read_nodata_value<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f32> {
    decoder
        .get_tag_ascii_string(Tag::Unknown(TAG_GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse().ok())
}

/// Replace nodata and non-finite samples with NaN.
fn mask_nodata(mut data: Vec<f32>, nodata: Option<f32>) -> Vec<f32> {
    for v in data.iter_mut() {
        let is_nodata = match nodata {
            Some(nd) if nd.is_finite() => (*v - nd).abs() < 0.001,
            Some(nd) if nd.is_nan() => v.is_nan(),
            Some(nd) => *v == nd,
            None => false,
        };
        if is_nodata || !v.is_finite() {
            *v = f32::NAN;
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tiff::encoder::{colortype, TiffEncoder};

    fn encode_gray_f32(w: u32, h: u32, data: &[f32]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        TiffEncoder::new(&mut buf)
            .unwrap()
            .write_image::<colortype::Gray32Float>(w, h, data)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn float_tiff_round_trip() {
        let data: Vec<f32> = (0..12).map(|i| i as f32 * 1.5).collect();
        let bytes = encode_gray_f32(4, 3, &data);
        let dem = load_dem_from_reader(Cursor::new(bytes)).unwrap();
        assert_eq!((dem.w, dem.h), (4, 3));
        assert_eq!(dem.data, data);
    }

    #[test]
    fn integer_tiff_is_converted() {
        let data: Vec<u16> = vec![10, 20, 30, 40];
        let mut buf = Cursor::new(Vec::new());
        TiffEncoder::new(&mut buf)
            .unwrap()
            .write_image::<colortype::Gray16>(2, 2, &data)
            .unwrap();
        let dem = load_dem_from_reader(Cursor::new(buf.into_inner())).unwrap();
        assert_eq!(dem.data, vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn rgb_tiff_is_rejected() {
        let data = vec![0u8; 2 * 2 * 3];
        let mut buf = Cursor::new(Vec::new());
        TiffEncoder::new(&mut buf)
            .unwrap()
            .write_image::<colortype::RGB8>(2, 2, &data)
            .unwrap();
        let err = load_dem_from_reader(Cursor::new(buf.into_inner())).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDataType(_)));
    }

    #[test]
    fn garbage_is_a_tiff_error() {
        let err = load_dem_from_reader(Cursor::new(b"not a tiff".to_vec())).unwrap_err();
        assert!(matches!(err, Error::Tiff(_) | Error::Io(_)));
    }

    #[test]
    fn nodata_becomes_nan() {
        let out = mask_nodata(vec![1.0, -9999.0, f32::INFINITY, 4.0], Some(-9999.0));
        assert_eq!(out[0], 1.0);
        assert!(out[1].is_nan());
        assert!(out[2].is_nan());
        assert_eq!(out[3], 4.0);

        let untouched = mask_nodata(vec![-9999.0], None);
        assert_eq!(untouched, vec![-9999.0]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_dem("/definitely/not/here.tif").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
