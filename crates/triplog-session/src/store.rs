//! Persistence gateway implementations.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use triplog_core::{CommittedRecord, GatewayError, PersistenceGateway};

fn poisoned() -> GatewayError {
    GatewayError::WriteFailed("store lock poisoned".into())
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory store. Can be told to fail the next N appends. With a limit it
/// keeps only the newest records.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<VecDeque<CommittedRecord>>,
    limit: Option<usize>,
    fail_next: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit.max(1)),
            ..Self::default()
        }
    }

    /// Reject the next `n` appends with `WriteFailed`.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<CommittedRecord> {
        self.records
            .lock()
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Up to `limit` records newer than `since`, in commit order. Only the
    /// returned records are cloned.
    pub fn records_since(&self, since: Option<f64>, limit: usize) -> Vec<CommittedRecord> {
        let Ok(records) = self.records.lock() else {
            return Vec::new();
        };
        records
            .iter()
            .filter(|r| since.map_or(true, |t| r.timestamp > t))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// What the downstream processor does once it has consumed a record.
    /// Returns the number of records marked.
    pub fn mark_processed(&self, timestamp: f64) -> usize {
        let Ok(mut records) = self.records.lock() else {
            return 0;
        };
        let mut marked = 0;
        for r in records.iter_mut().filter(|r| r.timestamp == timestamp) {
            r.processed = true;
            marked += 1;
        }
        marked
    }
}

impl PersistenceGateway for MemoryStore {
    fn append(&self, record: &CommittedRecord) -> Result<(), GatewayError> {
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(GatewayError::WriteFailed("injected failure".into()));
        }
        let mut records = self.records.lock().map_err(|_| poisoned())?;
        if self.limit.is_some_and(|limit| records.len() >= limit) {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CSV file store
// ---------------------------------------------------------------------------

/// Append-only CSV file, one row per record, flushed after every append.
pub struct CsvStore {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvStore {
    /// Open `path` for appending. A header row is written only when the file
    /// is new or empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let fresh = file.metadata()?.len() == 0;
        let writer = csv::WriterBuilder::new()
            .has_headers(fresh)
            .from_writer(file);
        Ok(Self {
            path,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back from a CSV produced by this store.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<CommittedRecord>, GatewayError> {
        let mut rdr = csv::Reader::from_path(path).map_err(csv_err)?;
        rdr.deserialize()
            .map(|row| row.map_err(csv_err))
            .collect()
    }
}

fn csv_err(e: csv::Error) -> GatewayError {
    GatewayError::WriteFailed(format!("csv: {e}"))
}

impl PersistenceGateway for CsvStore {
    fn append(&self, record: &CommittedRecord) -> Result<(), GatewayError> {
        let mut w = self.writer.lock().map_err(|_| poisoned())?;
        w.serialize(record).map_err(csv_err)?;
        w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triplog_core::PositionSample;

    fn record(ts: f64) -> CommittedRecord {
        CommittedRecord::from_sample(&PositionSample::new(ts, 48.85, 2.35, 3.0), "driving".into())
    }

    #[test]
    fn test_memory_store_injected_failures() {
        let store = MemoryStore::new();
        store.fail_next(2);
        assert!(store.append(&record(1.0)).is_err());
        assert!(store.append(&record(2.0)).is_err());
        assert!(store.append(&record(3.0)).is_ok());
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].timestamp, 3.0);
    }

    #[test]
    fn test_memory_store_limit_keeps_newest() {
        let store = MemoryStore::with_limit(2);
        for t in [1.0, 2.0, 3.0] {
            store.append(&record(t)).unwrap();
        }
        let ts: Vec<f64> = store.records().iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![2.0, 3.0]);
    }

    #[test]
    fn test_records_since() {
        let store = MemoryStore::new();
        for t in [1.0, 2.0, 3.0, 4.0] {
            store.append(&record(t)).unwrap();
        }
        let ts = |v: Vec<CommittedRecord>| v.iter().map(|r| r.timestamp).collect::<Vec<_>>();
        assert_eq!(ts(store.records_since(Some(2.0), 10)), vec![3.0, 4.0]);
        assert_eq!(ts(store.records_since(None, 2)), vec![1.0, 2.0]);
        assert!(store.records_since(Some(9.0), 10).is_empty());
    }

    #[test]
    fn test_mark_processed() {
        let store = MemoryStore::new();
        store.append(&record(1.0)).unwrap();
        store.append(&record(2.0)).unwrap();
        assert_eq!(store.mark_processed(2.0), 1);
        let recs = store.records();
        assert!(!recs[0].processed);
        assert!(recs[1].processed);
    }

    #[test]
    fn test_csv_store_roundtrip_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.csv");
        {
            let store = CsvStore::open(&path).unwrap();
            store.append(&record(1.0)).unwrap();
            store.append(&record(2.0)).unwrap();
        }
        {
            // Reopening must not write a second header.
            let store = CsvStore::open(&path).unwrap();
            store.append(&record(3.0)).unwrap();
        }
        let back = CsvStore::read_all(&path).unwrap();
        let ts: Vec<f64> = back.iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![1.0, 2.0, 3.0]);
        assert_eq!(back[0].note, "driving");
    }
}
