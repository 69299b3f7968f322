//! Configuration types and defaults

use serde::{Deserialize, Serialize};
use trackbridge_media::{
    BackendKind, EncoderType, MediaError, MediaResult, Platform, ValidationPolicy, VideoCodec,
    DEFAULT_EVENT_CAPACITY,
};

/// Global bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Graphics backend variant
    pub backend: BackendKind,
    /// Target platform used for encoder validation
    pub platform: Platform,
    /// Encoder implementation
    pub encoder: EncoderType,
    /// Negotiated video codec
    pub codec: VideoCodec,
    /// Reject frames larger than the encoder maximum
    pub limit_texture_size: bool,
    /// Enable debug logging
    pub debug_logging: bool,
    /// Capacity of each track's frame event channel
    pub event_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Software,
            platform: Platform::current(),
            encoder: EncoderType::Software,
            codec: VideoCodec::Vp8,
            limit_texture_size: true,
            debug_logging: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> MediaResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| MediaError::Initialization {
            reason: format!("Invalid bridge configuration: {}", e),
        })?;
        if config.event_capacity == 0 {
            return Err(MediaError::Initialization {
                reason: "event_capacity must be at least 1".to_string(),
            });
        }
        Ok(config)
    }

    /// Encoder validation policy derived from this configuration
    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            platform: self.platform,
            encoder: self.encoder,
            codec: self.codec,
            limit_texture_size: self.limit_texture_size,
        }
    }
}
