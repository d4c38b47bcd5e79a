//! Image and mask handling for inpainting requests.
//!
//! Clients send images as data URLs (`data:image/png;base64,...`) or bare
//! base64. Before a mask goes to the inpainting model it is grown by one
//! pixel in every direction so brush strokes fully cover object edges.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, GrayImage, ImageFormat, ImageReader, Luma};
use thiserror::Error;

pub const MAX_IMAGE_SIZE_MB: usize = 10;
pub const MAX_IMAGE_BYTES: usize = MAX_IMAGE_SIZE_MB * 1024 * 1024;
pub const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

#[derive(Debug, Error)]
pub enum MaskError {
    #[error("Unsupported file type {0}. Please use: jpeg, png, webp")]
    UnsupportedType(String),

    #[error("File too large. Maximum size is 10MB")]
    TooLarge,

    #[error("Invalid base64 image data: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Could not read image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Could not read image: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw bytes of an uploaded image.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    /// MIME type from the data URL, if one was given
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    /// Decode a data URL or bare base64 string.
    pub fn from_data_url(data: &str) -> Result<Self, MaskError> {
        let (mime, encoded) = match data.strip_prefix("data:") {
            Some(rest) => {
                let (header, body) = rest.split_once(',').unwrap_or((rest, ""));
                let mime = header.trim_end_matches(";base64").to_ascii_lowercase();
                if !SUPPORTED_IMAGE_TYPES.contains(&mime.as_str()) {
                    return Err(MaskError::UnsupportedType(mime));
                }
                (Some(mime), body)
            }
            None => (None, data),
        };

        // base64 inflates by 4/3; reject before decoding anything huge.
        if encoded.len() / 4 * 3 > MAX_IMAGE_BYTES + 3 {
            return Err(MaskError::TooLarge);
        }

        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = general_purpose::STANDARD.decode(compact)?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(MaskError::TooLarge);
        }
        Ok(Self { mime, bytes })
    }

    /// Width and height, read from the image header only.
    pub fn dimensions(&self) -> Result<(u32, u32), MaskError> {
        let reader = ImageReader::new(Cursor::new(&self.bytes)).with_guessed_format()?;
        Ok(reader.into_dimensions()?)
    }
}

/// Grow the white (masked) area of `mask` with a 3x3 max filter and return
/// it as a grayscale PNG.
pub fn dilate_mask(mask: &ImagePayload) -> Result<Vec<u8>, MaskError> {
    let gray = image::load_from_memory(&mask.bytes)?.to_luma8();
    let dilated = dilate(&gray);

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(dilated).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

fn dilate(src: &GrayImage) -> GrayImage {
    let (width, height) = src.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let mut max = 0u8;
        for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                max = max.max(src.get_pixel(nx, ny)[0]);
            }
        }
        Luma([max])
    })
}

pub fn png_data_url(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(png)
    )
}
