//! Resume state persisted across process runs
//!
//! The progress file is a small JSON document:
//!
//! ```json
//! {
//!   "start_from": 3000000,
//!   "offsets": [3000000],
//!   "identity": { "prefixes": ["1:212"], "outputs": ["lists/US_Custom_2024-05-01.txt"], "format": "plain" },
//!   "saved_at": "2024-05-01T12:00:00+00:00"
//! }
//! ```
//!
//! It is written by the run controller only, replaced atomically
//! (temp file + rename), and ignored unless its identity matches the
//! current run exactly.

use crate::error::CheckpointError;
use crate::types::{NumberFormat, Prefix};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default progress file, relative to the working directory
pub const DEFAULT_PROGRESS_FILE: &str = "progress.json";

/// What a progress record must match to be honored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Prefixes in run order, as `COUNTRY:AREA`
    pub prefixes: Vec<String>,

    /// Output files, in target order
    pub outputs: Vec<String>,

    /// Line format
    pub format: NumberFormat,
}

impl RunIdentity {
    /// Build the identity of a run
    pub fn new(prefixes: &[Prefix], outputs: &[PathBuf], format: NumberFormat) -> Self {
        Self {
            prefixes: prefixes
                .iter()
                .map(|p| format!("{}:{}", p.country_code, p.area_code))
                .collect(),
            outputs: outputs.iter().map(|p| p.display().to_string()).collect(),
            format,
        }
    }
}

/// Saved resume position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Lowest resume offset across all prefixes
    pub start_from: u64,

    /// The run this record belongs to
    pub identity: RunIdentity,

    /// Resume offset per prefix; absent in records that only carry `start_from`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offsets: Option<Vec<u64>>,

    /// When the record was written (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
}

impl ProgressRecord {
    /// Create a record from per-prefix offsets
    pub fn new(identity: RunIdentity, offsets: Vec<u64>) -> Self {
        Self {
            start_from: offsets.iter().copied().min().unwrap_or(0),
            identity,
            offsets: Some(offsets),
            saved_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// Resume offset for each of `count` prefixes
    ///
    /// Falls back to `start_from` for every prefix when per-prefix offsets
    /// are missing or do not line up.
    pub fn offsets_for(&self, count: usize) -> Vec<u64> {
        match &self.offsets {
            Some(offsets) if offsets.len() == count => offsets.clone(),
            _ => vec![self.start_from; count],
        }
    }
}

/// Reads and writes the progress file
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    /// Create a store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Progress file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Replace the progress file with `record`
    pub fn save(&self, record: &ProgressRecord) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(record)?;
        let tmp = self.temp_path();

        fs::write(&tmp, &json).map_err(|source| CheckpointError::SaveFailed {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| CheckpointError::SaveFailed {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            path = %self.path.display(),
            start_from = record.start_from,
            "Progress saved"
        );
        Ok(())
    }

    /// Load the saved record if it belongs to the run described by `expected`
    ///
    /// Missing, unreadable, malformed, or mismatched files all yield `None`.
    pub fn load(&self, expected: &RunIdentity) -> Option<ProgressRecord> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Progress file unreadable, ignoring");
                return None;
            }
        };

        let record: ProgressRecord = match serde_json::from_slice(&data) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Progress file malformed, ignoring");
                return None;
            }
        };

        if &record.identity != expected {
            info!(
                path = %self.path.display(),
                "Saved progress belongs to a different run, ignoring"
            );
            return None;
        }

        Some(record)
    }

    /// Remove the progress file; a missing file is not an error
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Progress cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::ClearFailed {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn identity(area: &str) -> RunIdentity {
        RunIdentity::new(
            &[Prefix::new("1", area).unwrap()],
            &[PathBuf::from("out.txt")],
            NumberFormat::Plain,
        )
    }

    #[test]
    fn test_save_load_clear() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));

        assert_eq!(store.load(&identity("212")), None);

        let record = ProgressRecord::new(identity("212"), vec![3_000_000]);
        store.save(&record).unwrap();
        assert!(!store.temp_path().exists());

        let loaded = store.load(&identity("212")).unwrap();
        assert_eq!(loaded.start_from, 3_000_000);
        assert_eq!(loaded.offsets_for(1), vec![3_000_000]);

        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));

        store.save(&ProgressRecord::new(identity("212"), vec![1_000_000])).unwrap();
        store.save(&ProgressRecord::new(identity("212"), vec![2_000_000])).unwrap();
        assert_eq!(store.load(&identity("212")).unwrap().start_from, 2_000_000);
    }

    #[test]
    fn test_mismatched_identity_is_ignored() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));
        store.save(&ProgressRecord::new(identity("212"), vec![5])).unwrap();

        assert_eq!(store.load(&identity("646")), None);

        let mut other_format = identity("212");
        other_format.format = NumberFormat::Plus;
        assert_eq!(store.load(&other_format), None);
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let store = ProgressStore::new(&path);

        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(store.load(&identity("212")), None);

        fs::write(&path, br#"{"start": 100}"#).unwrap();
        assert_eq!(store.load(&identity("212")), None);
    }

    #[test]
    fn test_record_without_offsets_applies_start_from() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let store = ProgressStore::new(&path);

        let expected = RunIdentity::new(
            &[Prefix::new("1", "212").unwrap(), Prefix::new("1", "646").unwrap()],
            &[PathBuf::from("out.txt")],
            NumberFormat::Plain,
        );
        let json = serde_json::json!({
            "start_from": 4_000_000u64,
            "identity": expected.clone(),
        });
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let record = store.load(&expected).unwrap();
        assert_eq!(record.offsets, None);
        assert_eq!(record.offsets_for(2), vec![4_000_000, 4_000_000]);
    }

    #[test]
    fn test_start_from_is_minimum_offset() {
        let record = ProgressRecord::new(identity("212"), vec![10_000_000, 2_500_000, 0]);
        assert_eq!(record.start_from, 0);
        assert_eq!(record.offsets_for(2), vec![0, 0]);
    }
}
