//! Encoder capability validation
//!
//! Pure checks run before any native resource is created for a send track.

use crate::graphics::PixelFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest edge accepted when texture size limiting is on
pub const MAX_LONG_EDGE: u32 = 3840;
/// Shortest edge accepted when texture size limiting is on
pub const MAX_SHORT_EDGE: u32 = 2160;
/// Smallest frame hardware H.264 encoders accept
pub const HW_H264_MIN_WIDTH: u32 = 145;
/// Smallest frame hardware H.264 encoders accept
pub const HW_H264_MIN_HEIGHT: u32 = 49;
/// Alignment Android hardware encoders require on both edges
pub const ANDROID_HW_ALIGNMENT: u32 = 16;

/// Target platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Windows desktop
    Windows,
    /// Linux desktop
    #[default]
    Linux,
    /// macOS desktop
    MacOs,
    /// iOS
    Ios,
    /// Android
    Android,
}

impl Platform {
    /// Platform of the running process
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => Platform::Windows,
            "macos" => Platform::MacOs,
            "ios" => Platform::Ios,
            "android" => Platform::Android,
            _ => Platform::Linux,
        }
    }
}

/// Encoder implementation in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderType {
    /// Software encoder
    #[default]
    Software,
    /// Hardware encoder
    Hardware,
}

/// Video codec negotiated for the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    /// VP8
    #[default]
    Vp8,
    /// VP9
    Vp9,
    /// H.264
    H264,
    /// AV1
    Av1,
}

/// Validation settings carried for the lifetime of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Target platform
    pub platform: Platform,
    /// Encoder implementation
    pub encoder: EncoderType,
    /// Codec
    pub codec: VideoCodec,
    /// Reject frames above [`MAX_LONG_EDGE`] x [`MAX_SHORT_EDGE`]
    pub limit_texture_size: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            encoder: EncoderType::default(),
            codec: VideoCodec::default(),
            limit_texture_size: true,
        }
    }
}

impl ValidationPolicy {
    /// Build the request for a frame of the given shape under this policy
    pub fn request(&self, width: u32, height: u32, format: PixelFormat) -> CapabilityRequest {
        CapabilityRequest {
            width,
            height,
            format,
            platform: self.platform,
            encoder: self.encoder,
            codec: self.codec,
            limit_texture_size: self.limit_texture_size,
        }
    }
}

/// One encoder capability question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRequest {
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Pixel format of the source buffer
    pub format: PixelFormat,
    /// Target platform
    pub platform: Platform,
    /// Encoder implementation
    pub encoder: EncoderType,
    /// Codec
    pub codec: VideoCodec,
    /// Apply the maximum frame size
    pub limit_texture_size: bool,
}

/// Why a request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationErrorKind {
    /// Zero width or height
    EmptyFrame,
    /// Format the encoder cannot read
    UnsupportedFormat,
    /// Frame larger than the size limit
    TooLarge,
    /// Frame smaller than the encoder minimum
    TooSmall,
    /// Dimensions not aligned as the encoder requires
    Misaligned,
}

/// Rejected capability request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    /// Rejection kind
    pub kind: ValidationErrorKind,
    /// Human-readable reason
    pub message: String,
}

impl ValidationError {
    /// Create a validation error
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Check whether the encoder can accept frames described by `request`
///
/// Rules are checked in a fixed order and the first failure is returned.
pub fn validate(request: &CapabilityRequest) -> Result<(), ValidationError> {
    let CapabilityRequest {
        width,
        height,
        format,
        platform,
        encoder,
        codec,
        limit_texture_size,
    } = *request;

    if width == 0 || height == 0 {
        return Err(ValidationError::new(
            ValidationErrorKind::EmptyFrame,
            format!("Texture size {}x{} is invalid: width and height must be greater than zero", width, height),
        ));
    }

    if !format.is_rgba8_family() {
        return Err(ValidationError::new(
            ValidationErrorKind::UnsupportedFormat,
            format!(
                "Pixel format {:?} is not supported by the encoder, use an 8-bit RGBA or BGRA format",
                format
            ),
        ));
    }

    if limit_texture_size {
        let long_edge = width.max(height);
        let short_edge = width.min(height);
        if long_edge > MAX_LONG_EDGE || short_edge > MAX_SHORT_EDGE {
            return Err(ValidationError::new(
                ValidationErrorKind::TooLarge,
                format!(
                    "Texture size {}x{} is invalid: maximum is {}x{}",
                    width, height, MAX_LONG_EDGE, MAX_SHORT_EDGE
                ),
            ));
        }
    }

    if codec == VideoCodec::H264 {
        if width % 2 != 0 || height % 2 != 0 {
            return Err(ValidationError::new(
                ValidationErrorKind::Misaligned,
                format!("Texture size {}x{} is invalid: H.264 requires even dimensions", width, height),
            ));
        }
        if encoder == EncoderType::Hardware
            && (width < HW_H264_MIN_WIDTH || height < HW_H264_MIN_HEIGHT)
        {
            return Err(ValidationError::new(
                ValidationErrorKind::TooSmall,
                format!(
                    "Texture size {}x{} is invalid: hardware H.264 minimum is {}x{}",
                    width, height, HW_H264_MIN_WIDTH, HW_H264_MIN_HEIGHT
                ),
            ));
        }
    }

    if platform == Platform::Android
        && encoder == EncoderType::Hardware
        && (width % ANDROID_HW_ALIGNMENT != 0 || height % ANDROID_HW_ALIGNMENT != 0)
    {
        return Err(ValidationError::new(
            ValidationErrorKind::Misaligned,
            format!(
                "Texture size {}x{} is invalid: Android hardware encoding requires multiples of {}",
                width, height, ANDROID_HW_ALIGNMENT
            ),
        ));
    }

    Ok(())
}
