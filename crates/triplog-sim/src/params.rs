//! Parameter bounds for tracking, trip profile and sensor knobs.

/// Parameter specification with bounds and step size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    /// Name used on the command line.
    pub name: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParamSpec {
    pub const fn new(name: &'static str, label: &'static str, min: f64, max: f64, step: f64) -> Self {
        Self {
            name,
            label,
            min,
            max,
            step,
        }
    }

    pub fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.min, self.max)
    }

    /// `n` evenly spaced values from `min` to `max` inclusive.
    pub fn sweep(&self, n: usize) -> Vec<f64> {
        match n {
            0 => vec![],
            1 => vec![self.min],
            _ => (0..n)
                .map(|i| self.min + (self.max - self.min) * (i as f64 / (n - 1) as f64))
                .collect(),
        }
    }
}

/// Trip detector settings.
pub mod tracking {
    use super::ParamSpec;

    pub const SPEED_THRESHOLD: ParamSpec =
        ParamSpec::new("speed_threshold", "Trip Speed (m/s)", 0.5, 10.0, 0.1);
    pub const SAMPLE_RATE: ParamSpec = ParamSpec::new("sample_rate", "Sample Rate (N)", 1.0, 60.0, 1.0);
    pub const BUFFER_CAPACITY: ParamSpec =
        ParamSpec::new("buffer_capacity", "Buffer Capacity", 1.0, 200.0, 1.0);
}

/// Synthetic trip profile.
pub mod profile {
    use super::ParamSpec;

    pub const DWELL_TIME: ParamSpec = ParamSpec::new("dwell_time", "Dwell (s)", 0.0, 600.0, 5.0);
    pub const WALK_TIME: ParamSpec = ParamSpec::new("walk_time", "Walk (s)", 0.0, 1800.0, 10.0);
    pub const WALK_SPEED: ParamSpec = ParamSpec::new("walk_speed", "Walk Speed (m/s)", 0.5, 2.5, 0.1);
    pub const DRIVE_TIME: ParamSpec = ParamSpec::new("drive_time", "Drive (s)", 0.0, 7200.0, 30.0);
    pub const DRIVE_SPEED: ParamSpec =
        ParamSpec::new("drive_speed", "Drive Speed (m/s)", 2.0, 40.0, 0.5);
}

/// Sensor model.
pub mod sensor {
    use super::ParamSpec;

    pub const NOISE_SCALE: ParamSpec = ParamSpec::new("noise_scale", "Noise Scale", 0.0, 10.0, 0.1);
    pub const GPS_HZ: ParamSpec = ParamSpec::new("gps_hz", "GPS Hz", 0.1, 10.0, 0.1);
    pub const IMU_HZ: ParamSpec = ParamSpec::new("imu_hz", "IMU Hz", 1.0, 50.0, 1.0);
    pub const GPS_DROPOUT: ParamSpec = ParamSpec::new("gps_dropout", "GPS Dropout", 0.0, 1.0, 0.01);
}

pub const ALL: [ParamSpec; 12] = [
    tracking::SPEED_THRESHOLD,
    tracking::SAMPLE_RATE,
    tracking::BUFFER_CAPACITY,
    profile::DWELL_TIME,
    profile::WALK_TIME,
    profile::WALK_SPEED,
    profile::DRIVE_TIME,
    profile::DRIVE_SPEED,
    sensor::NOISE_SCALE,
    sensor::GPS_HZ,
    sensor::IMU_HZ,
    sensor::GPS_DROPOUT,
];

/// Look a parameter up by its command-line name.
pub fn lookup(name: &str) -> Option<ParamSpec> {
    ALL.iter().find(|p| p.name == name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("sample_rate"), Some(tracking::SAMPLE_RATE));
        assert!(lookup("thrust").is_none());
    }

    #[test]
    fn test_sweep_endpoints() {
        let v = tracking::SPEED_THRESHOLD.sweep(5);
        assert_eq!(v.len(), 5);
        assert_eq!(v[0], 0.5);
        assert!((v[4] - 10.0).abs() < 1e-12);
        assert_eq!(tracking::SPEED_THRESHOLD.sweep(1), vec![0.5]);
        assert!(tracking::SPEED_THRESHOLD.sweep(0).is_empty());
    }

    #[test]
    fn test_param_spec() {
        let spec = ParamSpec::new("x", "Test", 0.0, 100.0, 1.0);
        assert_eq!(spec.label, "Test");
        assert_eq!(spec.clamp(150.0), 100.0);
        assert_eq!(spec.clamp(-1.0), 0.0);
    }
}
