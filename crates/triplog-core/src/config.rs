use crate::classifier::DRIVING_MIN_SPEED;
use crate::error::ConfigError;
use crate::ring_buffer::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Session settings. Read at session start; may be replaced while running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Speed (m/s) at or above which a trip is active.
    pub tracking_speed_threshold: f64,
    /// Commit every Nth active sample.
    pub sample_rate: u32,
    pub ring_buffer_capacity: usize,
    /// Depth of each session's inbound queue.
    pub queue_capacity: usize,
    /// Consecutive write failures before a session reports itself degraded.
    pub degraded_after_failures: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_speed_threshold: DRIVING_MIN_SPEED,
            sample_rate: 10,
            ring_buffer_capacity: DEFAULT_CAPACITY,
            queue_capacity: 256,
            degraded_after_failures: 5,
        }
    }
}

impl TrackingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.tracking_speed_threshold;
        if !t.is_finite() || t <= 0.0 {
            return Err(ConfigError::InvalidThreshold(t));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.ring_buffer_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("ring_buffer_capacity"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("queue_capacity"));
        }
        Ok(())
    }

    /// Load from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }
}
