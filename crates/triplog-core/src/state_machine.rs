// ---------------------------------------------------------------------------
// Enums & Outputs
// ---------------------------------------------------------------------------

use crate::classifier::{classify, ClassifiedState};
use crate::config::TrackingConfig;
use crate::error::{SampleError, TrackingError};
use crate::gateway::PersistenceGateway;
use crate::hint::{record_note, ActivityHint};
use crate::record::{BufferedRecord, Commit, CommitKind, CommittedRecord, DownSampler};
use crate::ring_buffer::RingBuffer;
use crate::sample::PositionSample;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,           // Nothing processed since start/reset
    BelowThreshold = 1, // Buffering
    TripInitiated = 2,  // Rising edge on this sample, buffer flushed
    TripActive = 3,     // Down-sampled commits
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::BelowThreshold => "BelowThreshold",
            Self::TripInitiated => "TripInitiated",
            Self::TripActive => "TripActive",
        }
    }
}

/// Result of feeding one accepted position sample to the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: ClassifiedState,
    pub phase: Phase,
    /// Oldest buffered record dropped to make room, if any.
    pub evicted: Option<BufferedRecord>,
    /// Records to append, in write order.
    pub commits: Vec<Commit>,
}

// ---------------------------------------------------------------------------
// Trip Detector
// ---------------------------------------------------------------------------

pub struct TripDetector {
    threshold: f64,
    sample_rate: u32,
    buffer: RingBuffer,
    sampler: DownSampler,

    is_trip_initiated: bool,
    is_trip_active: bool,
    phase: Phase,

    /// Rising edges seen since construction or the last reset.
    trips: u64,
}

impl Default for TripDetector {
    fn default() -> Self {
        Self::new(&TrackingConfig::default())
    }
}

impl TripDetector {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            threshold: config.tracking_speed_threshold,
            sample_rate: config.sample_rate,
            buffer: RingBuffer::new(config.ring_buffer_capacity),
            sampler: DownSampler::new(),
            is_trip_initiated: false,
            is_trip_active: false,
            phase: Phase::Idle,
            trips: 0,
        }
    }

    /// Run one position sample through the state machine.
    ///
    /// An invalid sample is rejected without touching any state.
    pub fn process_position(
        &mut self,
        sample: &PositionSample,
        hint: Option<ActivityHint>,
    ) -> Result<Step, SampleError> {
        // 1. Reject
        if !sample.has_valid_speed() {
            warn!(
                timestamp = sample.timestamp,
                speed = sample.speed,
                "rejecting position sample with invalid speed"
            );
            return Err(SampleError::InvalidSample {
                timestamp: sample.timestamp,
                speed: sample.speed,
            });
        }

        let state = classify(sample);
        let note = record_note(state.tag, hint);
        let mut evicted = None;
        let mut commits = Vec::new();

        // 2. Hysteresis input
        let active_now = sample.speed >= self.threshold;

        // 3. Below threshold: buffer
        if !active_now {
            if self.is_trip_active {
                info!(timestamp = sample.timestamp, "trip ended");
            }
            evicted = self
                .buffer
                .push(BufferedRecord::from_sample(sample, note.clone()));
            if let Some(old) = &evicted {
                debug!(
                    evicted_timestamp = old.timestamp,
                    capacity = self.buffer.capacity(),
                    "buffer full, evicted oldest record"
                );
            }
            self.is_trip_initiated = false;
            self.is_trip_active = false;
        }

        // 4. Rising edge
        if active_now && !self.is_trip_active {
            self.is_trip_initiated = true;
            self.trips += 1;
        }

        // 5. Always recomputed
        self.is_trip_active = active_now;

        // 6. One-shot flush
        let mut flushed = false;
        if self.is_trip_initiated && self.is_trip_active {
            let pending = self.buffer.flush();
            info!(
                timestamp = sample.timestamp,
                flushed = pending.len(),
                "trip started"
            );
            commits.extend(pending.into_iter().map(|r| Commit {
                kind: CommitKind::Flush,
                record: r.into(),
            }));
            self.is_trip_initiated = false;
            flushed = true;
        }

        // 7. Down-sampled commits
        if self.is_trip_active && self.sampler.tick(self.sample_rate) {
            commits.push(Commit {
                kind: CommitKind::Sampled,
                record: CommittedRecord::from_sample(sample, note),
            });
        }

        self.phase = match (self.is_trip_active, flushed) {
            (true, true) => Phase::TripInitiated,
            (true, false) => Phase::TripActive,
            (false, _) => Phase::BelowThreshold,
        };

        debug!(
            timestamp = sample.timestamp,
            speed = sample.speed,
            tag = state.tag.label(),
            phase = self.phase.label(),
            commits = commits.len(),
            "processed position sample"
        );

        Ok(Step {
            state,
            phase: self.phase,
            evicted,
            commits,
        })
    }

    /// Process a sample and write its commits through `gateway`, in order.
    ///
    /// Every commit is attempted even after a failure; the first failure is
    /// returned. The state machine has advanced either way.
    pub fn process<G: PersistenceGateway + ?Sized>(
        &mut self,
        sample: &PositionSample,
        hint: Option<ActivityHint>,
        gateway: &G,
    ) -> Result<Step, TrackingError> {
        let step = self.process_position(sample, hint)?;
        let mut first_err = None;
        for commit in &step.commits {
            if let Err(e) = gateway.append(&commit.record) {
                warn!(timestamp = commit.record.timestamp, error = %e, "persistence write failed");
                if first_err.is_none() {
                    first_err = Some(TrackingError::PersistenceWriteFailed {
                        timestamp: commit.record.timestamp,
                        source: e,
                    });
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(step),
        }
    }

    /// Discard buffered records and return to `Idle`. Returns how many
    /// buffered records were dropped.
    pub fn reset(&mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.clear();
        self.sampler.reset();
        self.is_trip_initiated = false;
        self.is_trip_active = false;
        self.phase = Phase::Idle;
        self.trips = 0;
        discarded
    }

    /// Apply new settings between samples. A smaller buffer capacity evicts
    /// the oldest records, which are returned.
    pub fn set_config(&mut self, config: &TrackingConfig) -> Vec<BufferedRecord> {
        self.threshold = config.tracking_speed_threshold;
        self.sample_rate = config.sample_rate;
        let evicted = self.buffer.resize(config.ring_buffer_capacity);
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "buffer shrunk by config reload");
        }
        evicted
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_trip_active(&self) -> bool {
        self.is_trip_active
    }

    pub fn is_trip_initiated(&self) -> bool {
        self.is_trip_initiated
    }

    pub fn sample_counter(&self) -> u32 {
        self.sampler.count()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn trips(&self) -> u64 {
        self.trips
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}
