//! Image ingestion: standard raster uploads and DICOM containers.
//!
//! Every upload lands as a [`MedicalImage`], an immutable 8-bit pixel grid.
//! DICOM pixel data is linearly rescaled so the output spans the full 0-255
//! range; raster files keep their source dimensions exactly, with EXIF
//! orientation applied before anything else sees them.

use std::io::Cursor;
use std::path::Path;

use dicom_object::from_reader;
use dicom_pixeldata::PixelDecoder;
use image::{DynamicImage, GrayImage, RgbImage};

use super::ImagingError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum upload size (in bytes) before rejecting.
/// Prevents OOM on corrupt/adversarial files.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Minimum valid upload size in bytes (smallest valid PNG is ~67 bytes).
const MIN_UPLOAD_BYTES: usize = 67;

/// Length of the preamble preceding the "DICM" magic in a DICOM file.
const DICOM_PREAMBLE_LEN: usize = 128;

// ═══════════════════════════════════════════════════════════
// MedicalImage
// ═══════════════════════════════════════════════════════════

/// An in-memory pixel grid with an 8-bit-per-channel guarantee.
///
/// Always stored as single-channel (`Luma8`) or RGB (`Rgb8`); any deeper or
/// alpha-carrying source is reduced on construction. Instances are immutable;
/// preprocessing produces new copies instead of mutating.
#[derive(Debug, Clone)]
pub struct MedicalImage {
    image: DynamicImage,
}

impl MedicalImage {
    /// Wrap a decoded image, normalizing it to 8 bits per channel.
    pub fn new(image: DynamicImage) -> Self {
        let image = match image {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image,
            DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        };
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Number of channels: 1 for grayscale, 3 for RGB.
    pub fn channels(&self) -> u8 {
        match self.image {
            DynamicImage::ImageLuma8(_) => 1,
            _ => 3,
        }
    }

    /// Borrow the underlying pixel data.
    pub fn as_image(&self) -> &DynamicImage {
        &self.image
    }
}

// ═══════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════

/// Decode an uploaded file into a [`MedicalImage`].
///
/// Files named `*.dcm` go through the DICOM pixel-data path with intensity
/// rescaling; everything else is decoded as a standard raster image.
///
/// # Errors
///
/// Returns [`ImagingError::Decode`] when the bytes are malformed, the format
/// is unsupported, or a DICOM file carries no usable pixel data.
pub fn load_medical_image(file_name: &str, bytes: &[u8]) -> Result<MedicalImage, ImagingError> {
    validate_upload_bytes(bytes)?;
    if has_dicom_extension(file_name) {
        decode_dicom(bytes)
    } else {
        decode_raster(bytes)
    }
}

/// Does the file name carry a DICOM container extension?
pub fn has_dicom_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
}

/// Validate upload bytes before decoding.
/// Returns early for clearly invalid input, saving decode time.
fn validate_upload_bytes(bytes: &[u8]) -> Result<(), ImagingError> {
    if bytes.len() < MIN_UPLOAD_BYTES {
        return Err(ImagingError::Decode(
            "upload too small to be a valid image".into(),
        ));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ImagingError::Decode(format!(
            "upload exceeds the {}MB limit",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

// ── Raster path ───────────────────────────────────────────

fn decode_raster(bytes: &[u8]) -> Result<MedicalImage, ImagingError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| ImagingError::Decode(format!("unsupported or corrupt image data: {e}")))?;
    let oriented = apply_orientation(decoded, read_exif_orientation(bytes));
    Ok(MedicalImage::new(oriented))
}

/// Read the EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) when there is no EXIF data or no orientation tag.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply an EXIF orientation transform.
///
/// EXIF orientation values:
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

// ── DICOM path ────────────────────────────────────────────

/// DICOM files open with a 128-byte preamble before the "DICM" magic;
/// the object reader expects the stream to start at the magic itself.
fn strip_preamble(bytes: &[u8]) -> &[u8] {
    if bytes.len() > DICOM_PREAMBLE_LEN + 4
        && &bytes[DICOM_PREAMBLE_LEN..DICOM_PREAMBLE_LEN + 4] == b"DICM"
    {
        &bytes[DICOM_PREAMBLE_LEN..]
    } else {
        bytes
    }
}

fn decode_dicom(bytes: &[u8]) -> Result<MedicalImage, ImagingError> {
    let object = from_reader(Cursor::new(strip_preamble(bytes)))
        .map_err(|e| ImagingError::Decode(format!("not a readable DICOM file: {e}")))?;

    let decoded = object
        .decode_pixel_data()
        .map_err(|e| ImagingError::Decode(format!("DICOM file has no usable pixel data: {e}")))?;

    let rows = decoded.rows() as u32;
    let columns = decoded.columns() as u32;
    let samples = decoded.samples_per_pixel() as u32;
    if rows == 0 || columns == 0 {
        return Err(ImagingError::Decode("DICOM pixel data is empty".into()));
    }

    let values: Vec<f64> = decoded
        .to_vec()
        .map_err(|e| ImagingError::Decode(format!("could not read DICOM pixel values: {e}")))?;

    // Multi-frame objects keep only the first frame.
    let frame_len = (rows * columns * samples) as usize;
    if values.len() < frame_len {
        return Err(ImagingError::Decode("DICOM pixel data is truncated".into()));
    }
    let rescaled = rescale_to_full_range(&values[..frame_len]);

    let image = match samples {
        1 => GrayImage::from_raw(columns, rows, rescaled)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| ImagingError::Decode("DICOM pixel buffer size mismatch".into()))?,
        3 => RgbImage::from_raw(columns, rows, rescaled)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| ImagingError::Decode("DICOM pixel buffer size mismatch".into()))?,
        other => {
            return Err(ImagingError::Decode(format!(
                "unsupported DICOM sample layout ({other} samples per pixel)"
            )))
        }
    };

    tracing::debug!(
        rows,
        columns,
        samples,
        "DICOM pixel data decoded and rescaled"
    );

    Ok(MedicalImage::new(image))
}

/// Linearly rescale samples so the output spans exactly [0, 255].
///
/// A constant-valued input (min == max) maps to uniform 0 rather than
/// dividing by zero.
pub fn rescale_to_full_range(samples: &[f64]) -> Vec<u8> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in samples {
        min = min.min(v);
        max = max.max(v);
    }

    if !min.is_finite() || !max.is_finite() || max <= min {
        return vec![0; samples.len()];
    }

    let span = max - min;
    samples
        .iter()
        .map(|&v| (((v - min) / span) * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma, Rgb};

    fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        image.write_to(&mut cursor, format).unwrap();
        cursor.into_inner()
    }

    // ── Extension routing ──

    #[test]
    fn dicom_extension_detected_case_insensitively() {
        assert!(has_dicom_extension("scan.dcm"));
        assert!(has_dicom_extension("SCAN.DCM"));
        assert!(has_dicom_extension("a.b.dcm"));
        assert!(!has_dicom_extension("scan.jpg"));
        assert!(!has_dicom_extension("scan.dcm.png"));
        assert!(!has_dicom_extension("dcm"));
    }

    // ── Byte validation ──

    #[test]
    fn tiny_upload_rejected() {
        let result = load_medical_image("scan.png", &[0x89, 0x50]);
        assert!(matches!(result, Err(ImagingError::Decode(_))));
    }

    #[test]
    fn garbage_bytes_rejected() {
        let garbage = [0xDE, 0xAD, 0xBE, 0xEF].repeat(64);
        let result = load_medical_image("scan.png", &garbage);
        assert!(matches!(result, Err(ImagingError::Decode(_))));
    }

    #[test]
    fn garbage_dicom_rejected() {
        let garbage = [0x00, 0x01, 0x02, 0x03].repeat(64);
        let result = load_medical_image("scan.dcm", &garbage);
        assert!(matches!(result, Err(ImagingError::Decode(_))));
    }

    // ── Raster decoding ──

    #[test]
    fn png_dimensions_preserved_exactly() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(321, 123, Rgb([10, 20, 30])));
        let bytes = encode(&img, ImageFormat::Png);

        let loaded = load_medical_image("upload.png", &bytes).unwrap();
        assert_eq!(loaded.width(), 321);
        assert_eq!(loaded.height(), 123);
        assert_eq!(loaded.channels(), 3);
    }

    #[test]
    fn jpeg_dimensions_preserved_exactly() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([128, 128, 128])));
        let bytes = encode(&img, ImageFormat::Jpeg);

        let loaded = load_medical_image("upload.jpg", &bytes).unwrap();
        assert_eq!(loaded.width(), 100);
        assert_eq!(loaded.height(), 100);
    }

    #[test]
    fn grayscale_png_stays_single_channel() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([200])));
        let bytes = encode(&img, ImageFormat::Png);

        let loaded = load_medical_image("upload.png", &bytes).unwrap();
        assert_eq!(loaded.channels(), 1);
    }

    #[test]
    fn sixteen_bit_png_normalized_to_eight_bits() {
        let img = DynamicImage::ImageLuma16(image::ImageBuffer::from_pixel(
            32,
            32,
            Luma([40_000u16]),
        ));
        let bytes = encode(&img, ImageFormat::Png);

        let loaded = load_medical_image("upload.png", &bytes).unwrap();
        assert_eq!(loaded.channels(), 1);
        assert!(matches!(loaded.as_image(), DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn alpha_channel_dropped() {
        let img = DynamicImage::ImageRgba8(image::ImageBuffer::from_pixel(
            16,
            16,
            image::Rgba([1, 2, 3, 200]),
        ));
        let wrapped = MedicalImage::new(img);
        assert_eq!(wrapped.channels(), 3);
    }

    // ── EXIF orientation ──

    #[test]
    fn no_exif_data_means_identity_orientation() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([0, 0, 0])));
        let bytes = encode(&img, ImageFormat::Png);
        assert_eq!(read_exif_orientation(&bytes), 1);
    }

    #[test]
    fn orientation_rotations_swap_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 20, Rgb([0, 0, 0])));
        let rotated = apply_orientation(img, 6);
        assert_eq!(rotated.width(), 20);
        assert_eq!(rotated.height(), 10);
    }

    #[test]
    fn unknown_orientation_is_identity() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 20, Rgb([0, 0, 0])));
        let result = apply_orientation(img, 42);
        assert_eq!(result.width(), 10);
        assert_eq!(result.height(), 20);
    }

    // ── DICOM preamble ──

    #[test]
    fn preamble_stripped_when_magic_present() {
        let mut bytes = vec![0u8; DICOM_PREAMBLE_LEN];
        bytes.extend_from_slice(b"DICM");
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let stripped = strip_preamble(&bytes);
        assert_eq!(&stripped[..4], b"DICM");
    }

    #[test]
    fn stream_without_preamble_left_untouched() {
        let bytes = b"DICM some meta".to_vec();
        assert_eq!(strip_preamble(&bytes), bytes.as_slice());
    }

    // ── Intensity rescaling ──

    #[test]
    fn rescale_spans_full_range() {
        let rescaled = rescale_to_full_range(&[10.0, 20.0, 30.0]);
        assert_eq!(rescaled, vec![0, 128, 255]);
    }

    #[test]
    fn rescale_sixteen_bit_values_span_full_range() {
        let rescaled = rescale_to_full_range(&[500.0, 1000.0, 4095.0]);
        assert_eq!(*rescaled.first().unwrap(), 0);
        assert_eq!(*rescaled.last().unwrap(), 255);
    }

    #[test]
    fn constant_input_maps_to_uniform_zero() {
        let rescaled = rescale_to_full_range(&[1234.0; 16]);
        assert!(rescaled.iter().all(|&v| v == 0));
        assert_eq!(rescaled.len(), 16);
    }

    #[test]
    fn empty_input_rescales_to_empty() {
        assert!(rescale_to_full_range(&[]).is_empty());
    }

    #[test]
    fn rescale_is_monotone() {
        let rescaled = rescale_to_full_range(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        for pair in rescaled.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }
}
