//! Triplog Simulation Library
//!
//! Synthetic trips, a noisy sensor model and an offline detector replay.

pub mod params;
pub mod replay;
pub mod sensor;
pub mod sim;

// Re-export main types
pub use params::ParamSpec;
pub use replay::{replay, ReplayResult, TripSpan};
pub use sensor::{generate_sensor_data, SensorConfig, SensorData};
pub use sim::{simulate_trip, Segment, SegmentMode, SimResult, TripParams};
