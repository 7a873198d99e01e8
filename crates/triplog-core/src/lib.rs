//! # Triplog Core
//!
//! Trip detection for a single tracked device:
//! - Position/inertial sample types
//! - Speed-based kinematic classifier
//! - Fixed-capacity pre-trip ring buffer
//! - Trip detector state machine with one-shot flush and down-sampled commits
//! - Persistence gateway trait
//!
//! Everything here is synchronous and owns no threads. Serialising access
//! per session is the caller's job (see `triplog-session`).

pub mod classifier;
pub mod config;
pub mod error;
pub mod gateway;
pub mod hint;
pub mod record;
pub mod ring_buffer;
pub mod sample;
pub mod state_machine;

// Re-export core types
pub use classifier::{classify, ClassifiedState, KinematicTag};
pub use config::TrackingConfig;
pub use error::{ConfigError, GatewayError, SampleError, TrackingError};
pub use gateway::PersistenceGateway;
pub use hint::{ActivityHint, MotionHintEstimator};
pub use record::{BufferedRecord, Commit, CommitKind, CommittedRecord};
pub use ring_buffer::RingBuffer;
pub use sample::{Attitude, InertialSample, PositionSample};
pub use state_machine::{Phase, Step, TripDetector};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
