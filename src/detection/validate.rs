use std::io::Cursor;

use image::{ColorType, DynamicImage, ExtendedColorType, ImageDecoder, ImageFormat, ImageReader};

use crate::config::ImageConfig;
use crate::error::PipelineError;

/// Gatekeeper for uploaded photos: decodable, RGB-normalizable, sensibly sized
#[derive(Debug, Clone, Copy)]
pub struct ImageValidator {
    pub min_dimension: u32,
    pub max_dimension: u32,
}

impl ImageValidator {
    pub fn new() -> Self {
        Self {
            min_dimension: 100,
            max_dimension: 4000,
        }
    }

    pub fn from_config(config: &ImageConfig) -> Self {
        Self {
            min_dimension: config.min_dimension,
            max_dimension: config.max_dimension,
        }
    }

    /// Pure predicate over raw bytes; `None` models a missing upload
    pub fn validate(&self, image: Option<&[u8]>) -> bool {
        match image {
            Some(bytes) => self.accept(bytes).is_ok(),
            None => false,
        }
    }

    /// Validate and decode in one pass, returning the reason on rejection
    pub fn accept(&self, bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::InvalidImage("empty input".to_string()));
        }

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PipelineError::InvalidImage(format!("unreadable input: {}", e)))?;
        let format = reader
            .format()
            .ok_or_else(|| PipelineError::InvalidImage("unrecognized image format".to_string()))?;

        // The JPEG decoder converts CMYK/YCCK to RGB and reports only the converted type
        if format == ImageFormat::Jpeg {
            if let Some(components) = jpeg_component_count(bytes) {
                if components != 1 && components != 3 {
                    return Err(PipelineError::InvalidImage(format!(
                        "{}-component JPEG cannot be normalized to RGB",
                        components
                    )));
                }
            }
        }

        let decoder = reader
            .into_decoder()
            .map_err(|e| PipelineError::InvalidImage(format!("unreadable header: {}", e)))?;
        check_original_color_type(decoder.original_color_type())?;
        let (width, height) = decoder.dimensions();
        self.check_dimensions(width, height)?;

        let image = DynamicImage::from_decoder(decoder)
            .map_err(|e| PipelineError::InvalidImage(format!("failed to decode image: {}", e)))?;
        check_color_type(image.color())?;

        Ok(image)
    }

    /// Both bounds are inclusive
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), PipelineError> {
        let in_range = |v: u32| v >= self.min_dimension && v <= self.max_dimension;
        if in_range(width) && in_range(height) {
            Ok(())
        } else {
            Err(PipelineError::InvalidImage(format!(
                "dimensions {}x{} outside [{}, {}]",
                width, height, self.min_dimension, self.max_dimension
            )))
        }
    }
}

impl Default for ImageValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Colour model stored in the file, before the decoder converts it
fn check_original_color_type(color: ExtendedColorType) -> Result<(), PipelineError> {
    match color {
        ExtendedColorType::Cmyk8 | ExtendedColorType::Cmyk16 | ExtendedColorType::Unknown(_) => {
            Err(PipelineError::InvalidImage(format!(
                "{:?} image cannot be normalized to RGB",
                color
            )))
        }
        _ => Ok(()),
    }
}

fn check_color_type(color: ColorType) -> Result<(), PipelineError> {
    match color {
        ColorType::L8
        | ColorType::La8
        | ColorType::Rgb8
        | ColorType::Rgba8
        | ColorType::L16
        | ColorType::La16
        | ColorType::Rgb16
        | ColorType::Rgba16
        | ColorType::Rgb32F
        | ColorType::Rgba32F => Ok(()),
        other => Err(PipelineError::InvalidImage(format!(
            "unsupported color model {:?}",
            other
        ))),
    }
}

/// Number of color components declared by the first JPEG frame header, if any
fn jpeg_component_count(bytes: &[u8]) -> Option<u8> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    while pos + 3 < bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];

        // Fill bytes and parameterless markers
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        // End of image or start of scan before any frame header
        if marker == 0xD9 || marker == 0xDA {
            return None;
        }

        let is_frame_header =
            (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame_header {
            // length(2) precision(1) height(2) width(2) components(1)
            return bytes.get(pos + 9).copied();
        }

        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        pos += 2 + length;
    }

    None
}
