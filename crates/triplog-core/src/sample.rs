use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Positioning
// ---------------------------------------------------------------------------

/// One fix from a positioning adapter.
///
/// `speed` is in m/s. Adapters that cannot report a speed use a negative
/// value (conventionally `-1.0`); such samples are rejected before they reach
/// the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub timestamp: f64, // seconds
    pub latitude: f64,  // degrees
    pub longitude: f64, // degrees
    pub speed: f64,     // m/s, negative = invalid
}

/// Sentinel used by adapters for "speed not available".
pub const INVALID_SPEED: f64 = -1.0;

impl PositionSample {
    pub fn new(timestamp: f64, latitude: f64, longitude: f64, speed: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            speed,
        }
    }

    /// A sample is usable only when its speed is a non-negative number.
    #[inline]
    pub fn has_valid_speed(&self) -> bool {
        !self.speed.is_nan() && self.speed >= 0.0
    }
}

// ---------------------------------------------------------------------------
// Inertial
// ---------------------------------------------------------------------------

/// Attitude in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// One reading from the inertial adapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InertialSample {
    pub timestamp: f64,
    pub accel: Vector3<f64>, // m/s^2, gravity included
    pub gyro: Vector3<f64>,  // rad/s
    pub attitude: Attitude,
}

impl InertialSample {
    pub fn new(
        timestamp: f64,
        accel: Vector3<f64>,
        gyro: Vector3<f64>,
        attitude: Attitude,
    ) -> Self {
        Self {
            timestamp,
            accel,
            gyro,
            attitude,
        }
    }
}
