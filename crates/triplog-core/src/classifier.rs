//! Speed-derived kinematic state.

use crate::sample::PositionSample;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Thresholds (m/s)
// ---------------------------------------------------------------------------
pub const WALKING_MIN_SPEED: f64 = 0.9;
pub const WALKING_MAX_SPEED: f64 = 1.8;
pub const DRIVING_MIN_SPEED: f64 = 2.2352; // 5 mph

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum KinematicTag {
    Unknown = 0,
    Stationary = 1,
    Walking = 2,
    Driving = 3,
}

impl KinematicTag {
    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Stationary => "stationary",
            Self::Walking => "walking",
            Self::Driving => "driving",
        }
    }
}

impl std::fmt::Display for KinematicTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Flags computed for every accepted position sample. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassifiedState {
    pub is_stationary: bool,
    pub is_moving: bool,
    pub is_walking: bool,
    pub is_driving: bool,
    pub tag: KinematicTag,
}

/// Classify a sample whose speed has already been validated.
pub fn classify(sample: &PositionSample) -> ClassifiedState {
    classify_speed(sample.speed)
}

pub fn classify_speed(speed: f64) -> ClassifiedState {
    let is_stationary = speed <= 0.0;
    let is_moving = speed > 0.0;
    let is_walking = speed > WALKING_MIN_SPEED && speed < WALKING_MAX_SPEED;
    let is_driving = speed > DRIVING_MIN_SPEED;

    // Priority: driving > walking > stationary > unknown
    let tag = if is_driving {
        KinematicTag::Driving
    } else if is_walking {
        KinematicTag::Walking
    } else if is_stationary {
        KinematicTag::Stationary
    } else {
        KinematicTag::Unknown
    };

    ClassifiedState {
        is_stationary,
        is_moving,
        is_walking,
        is_driving,
        tag,
    }
}
