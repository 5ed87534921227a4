use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::filter::gaussian_blur_f32;

use crate::config::ImageConfig;

/// RGB image at the fixed square detection resolution
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pixels: RgbImage,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgb8(self.pixels.clone())
    }
}

/// Converts any accepted photo into a `NormalizedImage`.
///
/// Aspect ratio is not preserved: every input is stretched to `target_size` square.
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    pub target_size: u32,
}

impl ImagePreprocessor {
    pub fn new(target_size: u32) -> Self {
        Self { target_size }
    }

    pub fn from_config(config: &ImageConfig) -> Self {
        Self::new(config.target_size)
    }

    pub fn preprocess(&self, image: &DynamicImage) -> NormalizedImage {
        let rgb = image.to_rgb8();
        let pixels = if rgb.dimensions() == (self.target_size, self.target_size) {
            rgb
        } else {
            imageops::resize(&rgb, self.target_size, self.target_size, FilterType::Triangle)
        };
        NormalizedImage { pixels }
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(640)
    }
}

/// Convert image to grayscale
pub fn to_grayscale(img: &RgbImage) -> GrayImage {
    imageops::grayscale(img)
}

/// Apply Gaussian blur to reduce noise; non-positive sigma leaves the image untouched
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    if sigma > 0.0 {
        gaussian_blur_f32(img, sigma)
    } else {
        img.clone()
    }
}

/// Binarize with Otsu's level, marking the minority side as foreground (255).
///
/// Pills may be darker or lighter than the bottle cap or tray they lie on, so polarity is
/// decided by which side of the threshold covers less of the frame.
pub fn foreground_mask(img: &GrayImage) -> GrayImage {
    let level = otsu_level(img);
    let total = img.width() as u64 * img.height() as u64;
    let dark = img.pixels().filter(|p| p[0] <= level).count() as u64;
    let dark_is_foreground = dark * 2 <= total;

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let is_dark = img.get_pixel(x, y)[0] <= level;
        if is_dark == dark_is_foreground {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}
