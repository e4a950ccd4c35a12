//! Raster loading and bounded OKLab sampling for palette extraction.

use crate::error::{ChartError, Result};
use crate::oklab::{rgb8_to_oklab, Lab};
use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Decode any format the `image` crate understands into RGBA8.
pub fn load_raster(bytes: &[u8]) -> Result<RgbaImage> {
    let decoded = image::load_from_memory(bytes)?;
    Ok(decoded.to_rgba8())
}

/// Wrap a raw RGBA8 buffer (4 bytes per pixel, row-major).
pub fn raster_from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<RgbaImage> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(ChartError::RasterSizeMismatch {
            expected,
            actual: rgba.len(),
        });
    }
    RgbaImage::from_raw(width, height, rgba).ok_or(ChartError::RasterSizeMismatch {
        expected,
        actual: 0,
    })
}

/// One opaque pixel, in OKLab and in its source sRGB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub lab: Lab,
    pub rgb: [u8; 3],
}

/// Collect OKLab samples from `image`, nearest-neighbour downscaling first when the
/// pixel count exceeds `max_samples`. Pixels with alpha below `alpha_cutoff` carry
/// no color and are skipped.
pub fn sample_image(image: &RgbaImage, max_samples: usize, alpha_cutoff: u8) -> Vec<Sample> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let total = width as usize * height as usize;
    let resized;
    let source = if total > max_samples {
        let scale = (max_samples as f64 / total as f64).sqrt();
        let budget = max_samples.max(1);
        let sample_w = ((width as f64 * scale).round() as usize).clamp(1, budget);
        let sample_h = ((height as f64 * scale).round() as usize).clamp(1, budget / sample_w);
        let (sample_w, sample_h) = (sample_w as u32, sample_h as u32);
        log::debug!(
            "Subsampling {}x{} raster to {}x{} for palette extraction",
            width,
            height,
            sample_w,
            sample_h
        );
        resized = imageops::resize(image, sample_w, sample_h, FilterType::Nearest);
        &resized
    } else {
        image
    };

    source
        .pixels()
        .filter(|p| p[3] >= alpha_cutoff)
        .map(|p| {
            let rgb = [p[0], p[1], p[2]];
            Sample {
                lab: rgb8_to_oklab(rgb),
                rgb,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn skips_transparent_pixels() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([0, 255, 0, 0]));
        img.put_pixel(1, 0, Rgba([0, 255, 0, 15]));
        img.put_pixel(2, 0, Rgba([0, 0, 255, 16]));
        let samples = sample_image(&img, 40_000, 16);
        assert_eq!(samples.len(), 14);
        assert!(samples.iter().any(|s| s.rgb == [0, 0, 255]));
        assert!(!samples.iter().any(|s| s.rgb == [0, 255, 0]));
    }

    #[test]
    fn large_images_are_bounded_by_budget() {
        let img = RgbaImage::from_pixel(400, 300, Rgba([10, 20, 30, 255]));
        let samples = sample_image(&img, 1_200, 16);
        // 400x300 scaled by sqrt(1200 / 120000) = 0.1 -> 40x30
        assert_eq!(samples.len(), 1_200);
        assert!(samples.iter().all(|s| s.rgb == [10, 20, 30]));
    }

    #[test]
    fn rounding_never_exceeds_budget() {
        let img = RgbaImage::from_pixel(300, 134, Rgba([10, 20, 30, 255]));
        let samples = sample_image(&img, 40_000, 16);
        assert!(samples.len() <= 40_000);
        assert!(samples.len() > 39_000);

        let strip = RgbaImage::from_pixel(10_000, 1, Rgba([10, 20, 30, 255]));
        assert_eq!(sample_image(&strip, 100, 16).len(), 100);
    }

    #[test]
    fn empty_image_yields_no_samples() {
        let img = RgbaImage::new(0, 0);
        assert!(sample_image(&img, 40_000, 16).is_empty());
    }

    #[test]
    fn raw_buffer_size_is_checked() {
        assert!(raster_from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            raster_from_rgba(2, 2, vec![0; 15]),
            Err(ChartError::RasterSizeMismatch { expected: 16, .. })
        ));
    }
}
