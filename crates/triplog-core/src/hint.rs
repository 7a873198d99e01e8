//! Advisory activity hints.
//!
//! A hint either comes from the platform's activity recogniser (attached to a
//! position sample) or is estimated from the inertial stream. Hints only
//! annotate record notes; trip decisions use the speed-derived tag alone.

use crate::classifier::KinematicTag;
use crate::sample::InertialSample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const GRAVITY: f64 = 9.80665;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityHint {
    Stationary,
    Walking,
    Running,
    Cycling,
    Automotive,
    Unknown,
}

impl ActivityHint {
    pub fn label(self) -> &'static str {
        match self {
            Self::Stationary => "stationary",
            Self::Walking => "walking",
            Self::Running => "running",
            Self::Cycling => "cycling",
            Self::Automotive => "automotive",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ActivityHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Build the note stored with a record: the kinematic tag, plus the hint when
/// one is known.
pub fn record_note(tag: KinematicTag, hint: Option<ActivityHint>) -> String {
    match hint {
        Some(h) if h != ActivityHint::Unknown => format!("{};hint={}", tag.label(), h.label()),
        _ => tag.label().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Inertial estimator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct HintEstimatorConfig {
    /// Samples per window.
    pub window_size: usize,
    /// Below this acceleration variance (m/s^2)^2 the device is at rest.
    pub rest_variance: f64,
    /// Smooth ride: low variance with low rotation.
    pub vehicle_max_variance: f64,
    pub vehicle_max_gyro: f64,
    /// Gait band.
    pub walking_max_variance: f64,
    pub running_min_variance: f64,
    /// Rotation band for cycling (rad/s).
    pub cycling_gyro_range: (f64, f64),
}

impl Default for HintEstimatorConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            rest_variance: 0.02,
            vehicle_max_variance: 0.3,
            vehicle_max_gyro: 0.15,
            walking_max_variance: 5.0,
            running_min_variance: 12.0,
            cycling_gyro_range: (0.15, 0.6),
        }
    }
}

/// Sliding-window estimator over inertial samples.
#[derive(Debug, Clone)]
pub struct MotionHintEstimator {
    config: HintEstimatorConfig,
    accel_dev: VecDeque<f64>, // |a| - g
    gyro_mag: VecDeque<f64>,
}

impl Default for MotionHintEstimator {
    fn default() -> Self {
        Self::new(HintEstimatorConfig::default())
    }
}

impl MotionHintEstimator {
    pub fn new(config: HintEstimatorConfig) -> Self {
        let n = config.window_size.max(2);
        Self {
            config: HintEstimatorConfig {
                window_size: n,
                ..config
            },
            accel_dev: VecDeque::with_capacity(n),
            gyro_mag: VecDeque::with_capacity(n),
        }
    }

    pub fn push(&mut self, sample: &InertialSample) {
        if self.accel_dev.len() == self.config.window_size {
            self.accel_dev.pop_front();
            self.gyro_mag.pop_front();
        }
        self.accel_dev.push_back(sample.accel.norm() - GRAVITY);
        self.gyro_mag.push_back(sample.gyro.norm());
    }

    /// `None` until the window has filled once.
    pub fn hint(&self) -> Option<ActivityHint> {
        if self.accel_dev.len() < self.config.window_size {
            return None;
        }
        let c = &self.config;
        let var = variance(&self.accel_dev);
        let gyro = mean(&self.gyro_mag);

        let hint = if var < c.rest_variance && gyro < c.vehicle_max_gyro {
            ActivityHint::Stationary
        } else if var < c.vehicle_max_variance && gyro < c.vehicle_max_gyro {
            ActivityHint::Automotive
        } else if var < c.vehicle_max_variance
            && gyro >= c.cycling_gyro_range.0
            && gyro <= c.cycling_gyro_range.1
        {
            ActivityHint::Cycling
        } else if var >= c.running_min_variance {
            ActivityHint::Running
        } else if var <= c.walking_max_variance {
            ActivityHint::Walking
        } else {
            ActivityHint::Unknown
        };
        Some(hint)
    }

    pub fn reset(&mut self) {
        self.accel_dev.clear();
        self.gyro_mag.clear();
    }
}

fn mean(v: &VecDeque<f64>) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().sum::<f64>() / v.len() as f64
}

fn variance(v: &VecDeque<f64>) -> f64 {
    if v.len() < 2 {
        return 0.0;
    }
    let m = mean(v);
    v.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / v.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Attitude;
    use nalgebra::Vector3;

    fn sample(t: f64, az: f64, gyro: f64) -> InertialSample {
        InertialSample::new(
            t,
            Vector3::new(0.0, 0.0, az),
            Vector3::new(0.0, 0.0, gyro),
            Attitude::default(),
        )
    }

    #[test]
    fn test_no_hint_before_window_fills() {
        let mut est = MotionHintEstimator::default();
        for i in 0..49 {
            est.push(&sample(i as f64, GRAVITY, 0.0));
        }
        assert_eq!(est.hint(), None);
        est.push(&sample(49.0, GRAVITY, 0.0));
        assert_eq!(est.hint(), Some(ActivityHint::Stationary));
    }

    #[test]
    fn test_gait_reads_as_walking() {
        let mut est = MotionHintEstimator::default();
        for i in 0..50 {
            // +-2 m/s^2 bounce at step cadence
            let bounce = if i % 2 == 0 { 2.0 } else { -2.0 };
            est.push(&sample(i as f64 * 0.02, GRAVITY + bounce, 0.8));
        }
        assert_eq!(est.hint(), Some(ActivityHint::Walking));
    }

    #[test]
    fn test_smooth_ride_reads_as_automotive() {
        let mut est = MotionHintEstimator::default();
        for i in 0..50 {
            let hum = if i % 2 == 0 { 0.3 } else { -0.3 };
            est.push(&sample(i as f64 * 0.02, GRAVITY + hum, 0.05));
        }
        assert_eq!(est.hint(), Some(ActivityHint::Automotive));
    }

    #[test]
    fn test_note_format() {
        assert_eq!(record_note(KinematicTag::Driving, None), "driving");
        assert_eq!(
            record_note(KinematicTag::Walking, Some(ActivityHint::Automotive)),
            "walking;hint=automotive"
        );
        assert_eq!(
            record_note(KinematicTag::Stationary, Some(ActivityHint::Unknown)),
            "stationary"
        );
    }
}
