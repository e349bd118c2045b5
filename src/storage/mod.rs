//! Control Log Storage
//!
//! Persists one record per processed sample to sled for historical queries
//! and CSV export. Keys are monotonic ids as u64 big-endian bytes, so
//! iteration order equals append order.
//!
//! Persistence is best-effort by design: append errors are logged and
//! swallowed by the callers — a storage hiccup must never abort an
//! already-computed control decision.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::defaults::EXPORT_ROW_LIMIT;
use crate::types::{ControlResult, CycleTimeSample};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One persisted control decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlLogRecord {
    pub id: u64,
    pub line_id: String,
    pub ct_seconds: f64,
    pub filtered_ct_seconds: f64,
    pub voltage: f64,
    pub speed: f64,
    pub timestamp: DateTime<Utc>,
}

/// Append-only store of control decisions.
///
/// Clone is cheap (shared `Arc<sled::Db>`); sled handles concurrent appends,
/// so the store lives outside all pipeline locks.
#[derive(Clone)]
pub struct ControlLogStore {
    db: Arc<sled::Db>,
}

impl ControlLogStore {
    /// Open or create the control log at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Append one record, assigning it a monotonic id.
    ///
    /// Key: id as u64 big-endian bytes (sorts in append order).
    /// Value: JSON-serialized record.
    ///
    /// Note: no flush() per write — sled's background flushing is durable
    /// enough for a telemetry log where the last few writes are expendable.
    pub fn append(&self, sample: &CycleTimeSample, result: &ControlResult) -> Result<u64, StorageError> {
        let id = self.db.generate_id()?;
        let record = ControlLogRecord {
            id,
            line_id: result.line_id.clone(),
            ct_seconds: sample.cycle_time_minutes * crate::config::defaults::SECONDS_PER_MINUTE,
            filtered_ct_seconds: result.filtered_ct_seconds,
            voltage: result.voltage,
            speed: result.speed_used,
            timestamp: result.applied_at,
        };
        let value = serde_json::to_vec(&record)?;
        self.db.insert(id.to_be_bytes(), value)?;
        Ok(id)
    }

    /// Most recent records (newest first), optionally filtered by line.
    pub fn recent(&self, limit: usize, line_id: Option<&str>) -> Vec<ControlLogRecord> {
        let mut records = Vec::with_capacity(limit.min(64));

        for item in self.db.iter().rev() {
            if records.len() >= limit {
                break;
            }
            if let Ok((_key, value)) = item {
                if let Ok(record) = serde_json::from_slice::<ControlLogRecord>(&value) {
                    if line_id.is_none_or(|id| record.line_id == id) {
                        records.push(record);
                    }
                }
            }
        }

        records
    }

    /// Total number of stored records.
    pub fn count(&self) -> usize {
        self.db.len()
    }

    /// Export recent records as CSV (newest first, capped at
    /// [`EXPORT_ROW_LIMIT`] rows). Numeric fields use 2 decimal places.
    pub fn export_csv(&self, line_id: Option<&str>) -> String {
        let mut out = String::from("id,line_id,ct_seconds,filtered_ct_seconds,voltage,speed,timestamp\n");
        for record in self.recent(EXPORT_ROW_LIMIT, line_id) {
            out.push_str(&format!(
                "{},{},{:.2},{:.2},{:.2},{:.2},{}\n",
                record.id,
                record.line_id,
                record.ct_seconds,
                record.filtered_ct_seconds,
                record.voltage,
                record.speed,
                record.timestamp.to_rfc3339(),
            ));
        }
        out
    }

    /// Flush pending writes to disk. Used on shutdown.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
