use crate::sample::PositionSample;
use serde::{Deserialize, Serialize};

/// A sample held in the pre-trip buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedRecord {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub processed: bool,
    pub code: String,
    pub note: String,
}

impl BufferedRecord {
    pub fn from_sample(sample: &PositionSample, note: String) -> Self {
        Self {
            timestamp: sample.timestamp,
            latitude: sample.latitude,
            longitude: sample.longitude,
            speed: sample.speed,
            processed: false,
            code: String::new(),
            note,
        }
    }
}

/// A record handed to the persistence gateway. Same shape as
/// [`BufferedRecord`]; once appended it belongs to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedRecord {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub processed: bool,
    pub code: String,
    pub note: String,
}

impl CommittedRecord {
    pub fn from_sample(sample: &PositionSample, note: String) -> Self {
        BufferedRecord::from_sample(sample, note).into()
    }
}

impl From<BufferedRecord> for CommittedRecord {
    fn from(r: BufferedRecord) -> Self {
        Self {
            timestamp: r.timestamp,
            latitude: r.latitude,
            longitude: r.longitude,
            speed: r.speed,
            processed: r.processed,
            code: r.code,
            note: r.note,
        }
    }
}

/// Why a record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitKind {
    /// Drained from the pre-trip buffer on a rising edge.
    Flush,
    /// Every Nth sample while a trip is active.
    Sampled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub kind: CommitKind,
    pub record: CommittedRecord,
}

// ---------------------------------------------------------------------------
// Down-sampling counter
// ---------------------------------------------------------------------------

/// Counts active samples and signals every `rate`-th one.
///
/// The comparison is `>=` so a rate lowered mid-trip fires on the next tick
/// instead of waiting for a wrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownSampler {
    count: u32,
}

impl DownSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one active sample. Returns true when it should be committed,
    /// in which case the counter is back at zero.
    pub fn tick(&mut self, rate: u32) -> bool {
        self.count = self.count.saturating_add(1);
        if self.count >= rate {
            self.count = 0;
            true
        } else {
            false
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}
