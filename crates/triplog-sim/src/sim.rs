use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------
pub const DT: f64 = 0.02; // 50 Hz truth
const METERS_PER_DEG_LAT: f64 = 111_111.0;
const WALK_ACCEL: f64 = 0.8; // m/s^2
const DRIVE_ACCEL: f64 = 2.5; // m/s^2

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentMode {
    Dwell,
    Walk,
    Drive,
}

impl SegmentMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Dwell => "dwell",
            Self::Walk => "walk",
            Self::Drive => "drive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub mode: SegmentMode,
    pub duration: f64, // s
    pub speed: f64,    // target m/s (ignored for Dwell)
}

impl Segment {
    pub fn dwell(duration: f64) -> Self {
        Self {
            mode: SegmentMode::Dwell,
            duration,
            speed: 0.0,
        }
    }

    pub fn walk(duration: f64, speed: f64) -> Self {
        Self {
            mode: SegmentMode::Walk,
            duration,
            speed,
        }
    }

    pub fn drive(duration: f64, speed: f64) -> Self {
        Self {
            mode: SegmentMode::Drive,
            duration,
            speed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripParams {
    pub segments: Vec<Segment>,
    pub start_time: f64, // unix seconds
    pub start_lat: f64,
    pub start_lon: f64,
    pub heading_deg: f64,
    /// Peak yaw rate while driving (deg/s); the road weaves sinusoidally.
    pub turn_rate: f64,
}

impl Default for TripParams {
    fn default() -> Self {
        Self {
            // Leave the house, walk to the car, drive, park, walk in.
            segments: vec![
                Segment::dwell(60.0),
                Segment::walk(90.0, 1.4),
                Segment::dwell(20.0),
                Segment::drive(300.0, 13.9),
                Segment::dwell(30.0),
                Segment::walk(60.0, 1.3),
                Segment::dwell(30.0),
            ],
            start_time: 1_700_000_000.0,
            start_lat: 37.7749,
            start_lon: -122.4194,
            heading_deg: 45.0,
            turn_rate: 3.0,
        }
    }
}

impl TripParams {
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

// ---------------------------------------------------------------------------
// Simulation Result
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct SimResult {
    pub time: Vec<f64>,
    pub speed: Vec<f64>, // m/s
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub heading: Vec<f64>,     // rad
    pub accel_long: Vec<f64>,  // m/s^2 along track
    pub yaw_rate: Vec<f64>,    // rad/s
    pub mode: Vec<SegmentMode>,
}

impl SimResult {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn distance_m(&self) -> f64 {
        self.speed.iter().map(|v| v * DT).sum()
    }

    pub fn max_speed(&self) -> f64 {
        self.speed.iter().cloned().fold(0.0, f64::max)
    }
}

// ---------------------------------------------------------------------------
// Kinematics
// ---------------------------------------------------------------------------

/// Step through the segment profile, ramping speed toward each target with a
/// mode-specific acceleration limit.
pub fn simulate_trip(p: &TripParams) -> SimResult {
    let n = (p.total_duration() / DT).round() as usize;
    let mut out = SimResult {
        time: Vec::with_capacity(n),
        speed: Vec::with_capacity(n),
        lat: Vec::with_capacity(n),
        lon: Vec::with_capacity(n),
        heading: Vec::with_capacity(n),
        accel_long: Vec::with_capacity(n),
        yaw_rate: Vec::with_capacity(n),
        mode: Vec::with_capacity(n),
    };

    let mut t: f64 = 0.0;
    let mut v = 0.0_f64;
    let mut lat = p.start_lat;
    let mut lon = p.start_lon;
    let mut heading = p.heading_deg.to_radians();

    for seg in &p.segments {
        let steps = (seg.duration / DT).round() as usize;
        debug!(mode = seg.mode.label(), duration = seg.duration, speed = seg.speed, "segment");
        let (target, limit) = match seg.mode {
            SegmentMode::Dwell => (0.0, DRIVE_ACCEL),
            SegmentMode::Walk => (seg.speed.max(0.0), WALK_ACCEL),
            SegmentMode::Drive => (seg.speed.max(0.0), DRIVE_ACCEL),
        };

        for _ in 0..steps {
            let dv = (target - v).clamp(-limit * DT, limit * DT);
            let accel = dv / DT;
            v = (v + dv).max(0.0);

            let yaw_rate = if seg.mode == SegmentMode::Drive && v > 0.0 {
                p.turn_rate.to_radians() * (t * 0.05).sin()
            } else {
                0.0
            };
            heading += yaw_rate * DT;

            let d = v * DT;
            lat += d * heading.cos() / METERS_PER_DEG_LAT;
            lon += d * heading.sin() / (METERS_PER_DEG_LAT * lat.to_radians().cos());

            out.time.push(p.start_time + t);
            out.speed.push(v);
            out.lat.push(lat);
            out.lon.push(lon);
            out.heading.push(heading);
            out.accel_long.push(accel);
            out.yaw_rate.push(yaw_rate);
            out.mode.push(seg.mode);

            t += DT;
        }
    }

    out
}
