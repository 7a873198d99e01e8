use crate::sim::{SegmentMode, SimResult, DT};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use triplog_core::sample::INVALID_SPEED;
use triplog_core::{Attitude, InertialSample, PositionSample};

const GRAVITY: f64 = 9.80665;
const METERS_PER_DEG_LAT: f64 = 111_111.0;

#[derive(Debug, Clone)]
pub struct SensorConfig {
    pub noise_scale: f64,
    pub speed_noise_std: f64, // m/s
    pub pos_noise_std: f64,   // meters
    pub accel_noise_std: f64, // m/s^2
    pub gyro_noise_std: f64,  // rad/s

    pub gps_rate_hz: f64,
    pub imu_rate_hz: f64,
    /// Probability that a GPS fix comes without a speed.
    pub gps_dropout: f64,

    // Body motion signatures
    pub gait_amplitude: f64, // m/s^2 vertical bounce while walking
    pub gait_freq_hz: f64,
    pub road_vibration_std: f64, // m/s^2 while driving

    pub seed: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            noise_scale: 1.0,
            speed_noise_std: 0.15,
            pos_noise_std: 3.0,
            accel_noise_std: 0.02,
            gyro_noise_std: 0.002,
            gps_rate_hz: 1.0,
            imu_rate_hz: 50.0,
            gps_dropout: 0.0,
            gait_amplitude: 2.0,
            gait_freq_hz: 1.8,
            road_vibration_std: 0.25,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SensorData {
    pub positions: Vec<PositionSample>,
    pub inertial: Vec<InertialSample>,
}

fn normal(std: f64) -> Normal<f64> {
    let std = if std.is_finite() { std.abs() } else { 0.0 };
    Normal::new(0.0, std).expect("finite non-negative std dev")
}

/// Decimation stride for a sensor running at `hz` on the truth grid.
fn stride(hz: f64) -> usize {
    if hz <= 0.0 || !hz.is_finite() {
        return usize::MAX;
    }
    ((1.0 / (hz * DT)).round() as usize).max(1)
}

/// Sample the truth trajectory with noisy GPS and IMU models.
/// Output is deterministic for a given seed.
pub fn generate_sensor_data(sim: &SimResult, cfg: &SensorConfig) -> SensorData {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let s = cfg.noise_scale;

    let d_speed = normal(s * cfg.speed_noise_std);
    let d_pos = normal(s * cfg.pos_noise_std);
    let d_accel = normal(s * cfg.accel_noise_std);
    let d_gyro = normal(s * cfg.gyro_noise_std);
    let d_road = normal(cfg.road_vibration_std);
    // NaN survives clamp and would panic in gen_bool.
    let dropout = if cfg.gps_dropout.is_nan() { 0.0 } else { cfg.gps_dropout.clamp(0.0, 1.0) };

    let gps_stride = stride(cfg.gps_rate_hz);
    let imu_stride = stride(cfg.imu_rate_hz);

    let mut data = SensorData::default();

    for i in 0..sim.len() {
        let t = sim.time[i];

        // 1. GPS
        if i % gps_stride == 0 {
            let true_v = sim.speed[i];
            // Receivers clamp to zero when parked rather than reporting jitter.
            let speed = if rng.gen_bool(dropout) {
                INVALID_SPEED
            } else if true_v == 0.0 {
                0.0
            } else {
                (true_v + d_speed.sample(&mut rng)).max(0.0)
            };
            let north = d_pos.sample(&mut rng);
            let east = d_pos.sample(&mut rng);
            let lat = sim.lat[i] + north / METERS_PER_DEG_LAT;
            let lon =
                sim.lon[i] + east / (METERS_PER_DEG_LAT * sim.lat[i].to_radians().cos());
            data.positions.push(PositionSample::new(t, lat, lon, speed));
        }

        // 2. IMU (body frame: x forward, z up, gravity included)
        if i % imu_stride == 0 {
            let elapsed = i as f64 * DT;
            let (bounce, sway, hum) = match sim.mode[i] {
                SegmentMode::Walk if sim.speed[i] > 0.0 => {
                    let phase = 2.0 * std::f64::consts::PI * cfg.gait_freq_hz * elapsed;
                    (cfg.gait_amplitude * phase.sin(), 0.6 * phase.cos(), 0.0)
                }
                SegmentMode::Drive if sim.speed[i] > 0.0 => (0.0, 0.0, d_road.sample(&mut rng)),
                _ => (0.0, 0.0, 0.0),
            };

            let accel = Vector3::new(
                sim.accel_long[i] + d_accel.sample(&mut rng),
                d_accel.sample(&mut rng),
                GRAVITY + bounce + hum + d_accel.sample(&mut rng),
            );
            let gyro = Vector3::new(
                sway + d_gyro.sample(&mut rng),
                d_gyro.sample(&mut rng),
                sim.yaw_rate[i] + d_gyro.sample(&mut rng),
            );
            let attitude = Attitude {
                pitch: 0.0,
                yaw: sim.heading[i],
                roll: 0.0,
            };
            data.inertial
                .push(InertialSample::new(t, accel, gyro, attitude));
        }
    }

    data
}
