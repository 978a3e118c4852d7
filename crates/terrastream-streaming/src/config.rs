//! Streaming configuration.

use serde::{Deserialize, Serialize};

/// Configuration for texture streaming behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Maximum names handed to the worker in one batch.
    pub max_requests_per_batch: usize,
    /// Maximum names being decoded or uploaded at once.
    pub max_in_flight: usize,
    /// Resident textures kept before least recently queried ones are evicted.
    pub max_resident: usize,
    /// Failed loads retried before a name stays unavailable.
    pub max_retries: u32,
    /// Frames an evicted texture is kept alive for in-flight command lists.
    pub frames_in_flight: usize,
    /// Decode color data as sRGB.
    pub srgb: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_requests_per_batch: 8,
            max_in_flight: 32,
            max_resident: 256,
            max_retries: 2,
            frames_in_flight: 2,
            srgb: true,
        }
    }
}

impl StreamingConfig {
    pub fn with_max_requests_per_batch(mut self, max: usize) -> Self {
        self.max_requests_per_batch = max.max(1);
        self
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    pub fn with_max_resident(mut self, max: usize) -> Self {
        self.max_resident = max;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    pub fn with_srgb(mut self, srgb: bool) -> Self {
        self.srgb = srgb;
        self
    }
}
