//! Display preprocessing: aspect-preserving resize and sharpness scoring.
//!
//! Both operations are pure functions of pixel data. The sharpness check is
//! advisory only and never blocks the pipeline.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{GrayImage, ImageFormat};

use super::loader::MedicalImage;
use super::ImagingError;

// ═══════════════════════════════════════════════════════════
// Quality assessment
// ═══════════════════════════════════════════════════════════

/// Outcome of the advisory sharpness check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityAssessment {
    /// Laplacian variance of the grayscale image. Higher is sharper.
    pub sharpness: f64,
    /// True when sharpness fell below the configured threshold.
    pub blurry: bool,
}

/// Score image sharpness and flag it blurry below `threshold`.
///
/// Deterministic and side-effect free: the same pixels always produce the
/// same verdict.
pub fn assess_blur(image: &MedicalImage, threshold: f64) -> QualityAssessment {
    let gray = image.as_image().to_luma8();
    let sharpness = laplacian_variance(&gray);
    QualityAssessment {
        sharpness,
        blurry: sharpness < threshold,
    }
}

/// Compute Laplacian variance, the standard blur metric.
///
/// Uses a 3x3 Laplacian kernel (`[0,1,0; 1,-4,1; 0,1,0]`) over interior
/// pixels of the grayscale image. Images smaller than 3x3 score 0.0.
pub fn laplacian_variance(img: &GrayImage) -> f64 {
    let (w, h) = (img.width() as i64, img.height() as i64);
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = f64::from(img.get_pixel(x as u32, y as u32).0[0]);
            let top = f64::from(img.get_pixel(x as u32, (y - 1) as u32).0[0]);
            let bottom = f64::from(img.get_pixel(x as u32, (y + 1) as u32).0[0]);
            let left = f64::from(img.get_pixel((x - 1) as u32, y as u32).0[0]);
            let right = f64::from(img.get_pixel((x + 1) as u32, y as u32).0[0]);

            let laplacian = top + bottom + left + right - 4.0 * center;
            sum += laplacian;
            sum_sq += laplacian * laplacian;
            count += 1;
        }
    }

    if count == 0 {
        return 0.0;
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    variance.max(0.0)
}

// ═══════════════════════════════════════════════════════════
// Resizing
// ═══════════════════════════════════════════════════════════

/// Produce a display-sized copy at exactly `target_width`, preserving the
/// aspect ratio: `new_height = round(target_width * height / width)`.
///
/// # Errors
///
/// Returns [`ImagingError::InvalidDimensions`] when the source has a zero
/// dimension or `target_width` is 0.
pub fn resize_for_display(
    image: &MedicalImage,
    target_width: u32,
) -> Result<MedicalImage, ImagingError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 || target_width == 0 {
        return Err(ImagingError::InvalidDimensions {
            width,
            height,
            target_width,
        });
    }

    let new_height = (f64::from(target_width) * f64::from(height) / f64::from(width))
        .round()
        .max(1.0) as u32;

    let resized = image
        .as_image()
        .resize_exact(target_width, new_height, FilterType::CatmullRom);
    Ok(MedicalImage::new(resized))
}

// ═══════════════════════════════════════════════════════════
// Encoding
// ═══════════════════════════════════════════════════════════

/// Encode the image as PNG bytes, the form sent to the remote agent and
/// shown as the preview. Default compression; images are transient.
pub fn encode_png(image: &MedicalImage) -> Result<Vec<u8>, ImagingError> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .as_image()
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| ImagingError::Encode(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
