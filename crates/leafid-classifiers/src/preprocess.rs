//! Image decoding and normalization
//!
//! Turns raw upload bytes into the `[1, 3, H, W]` float tensor the network
//! expects. Every failure on this path is an [`Error::InvalidImage`], which the
//! server reports back to the user instead of crashing.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use candle_core::{Device, Tensor};
use image::{imageops::FilterType, DynamicImage, ImageReader, Limits};
use leafid_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// ImageNet normalization mean values (RGB)
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Pixel scaling applied after resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// `x / 255`, range `[0, 1]`
    #[default]
    Unit,
    /// `x / 127.5 - 1`, range `[-1, 1]` (Keras MobileNetV2 preprocessing)
    Symmetric,
    /// Per-channel ImageNet mean/std after `x / 255`
    Imagenet,
}

impl Normalization {
    #[inline]
    fn apply(&self, value: u8, channel: usize) -> f32 {
        let v = value as f32;
        match self {
            Self::Unit => v / 255.0,
            Self::Symmetric => v / 127.5 - 1.0,
            Self::Imagenet => (v / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel],
        }
    }
}

/// Fixed network input dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(default = "default_input_size")]
    pub width: u32,

    #[serde(default = "default_input_size")]
    pub height: u32,

    #[serde(default)]
    pub normalization: Normalization,
}

fn default_input_size() -> u32 {
    224
}

impl Default for InputSpec {
    fn default() -> Self {
        Self {
            width: default_input_size(),
            height: default_input_size(),
            normalization: Normalization::default(),
        }
    }
}

impl InputSpec {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            ..Default::default()
        }
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Reject sizes no network can be fed
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::config(format!(
                "input size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Upper bounds on accepted uploads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeLimits {
    /// Maximum encoded payload size in bytes
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Maximum decoded width or height in pixels
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_dimension() -> u32 {
    8192
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            max_dimension: default_max_dimension(),
        }
    }
}

/// Decode an encoded image (PNG, JPEG, BMP, WebP, ...) from memory
pub fn decode_image(bytes: &[u8], limits: &DecodeLimits) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(Error::invalid_image("empty payload"));
    }
    if bytes.len() > limits.max_bytes {
        return Err(Error::invalid_image(format!(
            "payload of {} bytes exceeds the {} byte limit",
            bytes.len(),
            limits.max_bytes
        )));
    }

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| Error::invalid_image(format!("unreadable payload: {}", e)))?;
    if reader.format().is_none() {
        return Err(Error::invalid_image("unrecognized image format"));
    }

    let mut decode_limits = Limits::default();
    decode_limits.max_image_width = Some(limits.max_dimension);
    decode_limits.max_image_height = Some(limits.max_dimension);
    reader.limits(decode_limits);

    let image = reader
        .decode()
        .map_err(|e| Error::invalid_image(format!("failed to decode image: {}", e)))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(Error::invalid_image("image has no pixels"));
    }

    Ok(image)
}

/// Decode a webcam frame sent as a data URL (`data:image/jpeg;base64,...`)
/// or as bare base64
pub fn decode_data_url(payload: &str) -> Result<Vec<u8>> {
    let encoded = match payload.split_once(',') {
        Some((header, body)) if header.starts_with("data:") => body,
        Some(_) => return Err(Error::invalid_image("malformed data URL")),
        None => payload,
    };

    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(Error::invalid_image("empty image data"));
    }

    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Error::invalid_image(format!("invalid base64 image data: {}", e)))
}

/// Resize to the input spec and flatten to normalized CHW floats
pub fn normalize(image: &DynamicImage, spec: &InputSpec) -> Vec<f32> {
    let rgb = image
        .resize_exact(spec.width, spec.height, FilterType::Triangle)
        .to_rgb8();
    let num_pixels = spec.width as usize * spec.height as usize;

    let mut data = vec![0.0f32; 3 * num_pixels];
    for (i, pixel) in rgb.pixels().enumerate() {
        for channel in 0..3 {
            data[channel * num_pixels + i] = spec.normalization.apply(pixel[channel], channel);
        }
    }
    data
}

/// Build the `[1, 3, H, W]` input tensor for one image
pub fn to_tensor(image: &DynamicImage, spec: &InputSpec, device: &Device) -> Result<Tensor> {
    let data = normalize(image, spec);
    Tensor::from_vec(
        data,
        (1, 3, spec.height as usize, spec.width as usize),
        device,
    )
    .map_err(|e| Error::internal(format!("failed to build input tensor: {}", e)))
}
