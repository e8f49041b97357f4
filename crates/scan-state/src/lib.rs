#![allow(dead_code)]

//! Atomic, versioned checkpoints of scan progress. Every write goes
//! temp-file-then-rename on the same filesystem so a reader never observes
//! a partially written checkpoint; reads tolerate "file absent" cleanly.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs;
use tokio::sync::watch;
use tracing::warn;

use types::{PersistentCheckpoint, ScanConfig, ScanOptions, ScanState, CHECKPOINT_SCHEMA_VERSION};

const STATE_DIR: &str = "scan-state";
const STATE_FILE: &str = "scan-state.json";
const MIN_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse checkpoint: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingField(String),
    WrongType(String),
    SchemaVersionMismatch { expected: String, found: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    Stale { hours_old: i64 },
    DiscoveredCountMismatch { state_accessible: u64, records_accessible: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    pub saved_at: DateTime<Utc>,
    pub schema_version: String,
    pub record_count: usize,
    pub discovered_count: u64,
    pub progress_percent: f64,
}

/// Owns the checkpoint file under a working directory, at the well-known
/// path `<root>/scan-state/scan-state.json`.
#[derive(Clone)]
pub struct ScanStateManager {
    root_dir: PathBuf,
}

impl ScanStateManager {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn state_dir(&self) -> PathBuf {
        self.root_dir.join(STATE_DIR)
    }

    fn tmp_path(&self) -> PathBuf {
        self.state_dir().join(format!("{STATE_FILE}.tmp"))
    }

    pub async fn save(
        &self,
        config: &ScanConfig,
        options: &ScanOptions,
        state: &ScanState,
        records: &[types::DiscoveryRecord],
    ) -> Result<(), StateError> {
        let checkpoint = PersistentCheckpoint::new(
            config.clone(),
            options.clone(),
            state.clone(),
            records.to_vec(),
        );
        self.write_checkpoint(&checkpoint).await
    }

    async fn write_checkpoint(&self, checkpoint: &PersistentCheckpoint) -> Result<(), StateError> {
        fs::create_dir_all(self.state_dir()).await?;
        let json = serde_json::to_vec_pretty(checkpoint)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, self.path()).await?;
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<PersistentCheckpoint>, StateError> {
        let bytes = match fs::read(self.path()).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StateError::Io(err)),
        };
        let checkpoint = serde_json::from_slice(&bytes)?;
        Ok(Some(checkpoint))
    }

    pub async fn has_saved(&self) -> bool {
        fs::metadata(self.path()).await.is_ok()
    }

    pub async fn clear(&self) -> Result<(), StateError> {
        match fs::remove_file(self.path()).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StateError::Io(err)),
        }
    }

    pub async fn info(&self) -> Result<Option<CheckpointInfo>, StateError> {
        let checkpoint = match self.load().await? {
            Some(checkpoint) => checkpoint,
            None => return Ok(None),
        };
        Ok(Some(CheckpointInfo {
            saved_at: checkpoint.saved_at,
            schema_version: checkpoint.schema_version.clone(),
            record_count: checkpoint.records.len(),
            discovered_count: checkpoint.state.accessible,
            progress_percent: checkpoint.state.progress_percent(),
        }))
    }

    /// Validates the on-disk checkpoint without requiring the caller to
    /// have parsed it first. Structural problems (missing fields, wrong
    /// types, an incompatible schema version) are reported as errors;
    /// staleness and discovered-count disagreement are warnings.
    pub async fn validate(&self) -> Result<ValidationReport, StateError> {
        let bytes = match fs::read(self.path()).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ValidationReport::default())
            }
            Err(err) => return Err(StateError::Io(err)),
        };

        let value: serde_json::Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => {
                return Ok(ValidationReport {
                    errors: vec![ValidationError::WrongType(err.to_string())],
                    warnings: Vec::new(),
                })
            }
        };

        let required = ["schema_version", "config", "options", "state", "records", "saved_at"];
        let missing: Vec<ValidationError> = required
            .iter()
            .filter(|field| value.get(*field).is_none())
            .map(|field| ValidationError::MissingField(field.to_string()))
            .collect();
        if !missing.is_empty() {
            return Ok(ValidationReport {
                errors: missing,
                warnings: Vec::new(),
            });
        }

        let checkpoint: PersistentCheckpoint = match serde_json::from_value(value) {
            Ok(checkpoint) => checkpoint,
            Err(err) => {
                return Ok(ValidationReport {
                    errors: vec![ValidationError::WrongType(err.to_string())],
                    warnings: Vec::new(),
                })
            }
        };

        let mut errors = Vec::new();
        if checkpoint.schema_version != CHECKPOINT_SCHEMA_VERSION {
            errors.push(ValidationError::SchemaVersionMismatch {
                expected: CHECKPOINT_SCHEMA_VERSION.to_string(),
                found: checkpoint.schema_version.clone(),
            });
        }

        let mut warnings = Vec::new();
        let age = Utc::now() - checkpoint.saved_at;
        if age > chrono::Duration::hours(24) {
            warnings.push(ValidationWarning::Stale {
                hours_old: age.num_hours(),
            });
        }
        let records_accessible = checkpoint.records.iter().filter(|r| r.accessible).count() as u64;
        if records_accessible != checkpoint.state.accessible {
            warnings.push(ValidationWarning::DiscoveredCountMismatch {
                state_accessible: checkpoint.state.accessible,
                records_accessible,
            });
        }

        Ok(ValidationReport { errors, warnings })
    }

    pub async fn backup(&self) -> Result<PathBuf, StateError> {
        let bytes = fs::read(self.path()).await?;
        let suffix = Utc::now().to_rfc3339().replace(':', "-");
        let backup_path = self.state_dir().join(format!("{STATE_FILE}.backup.{suffix}"));
        fs::write(&backup_path, &bytes).await?;
        Ok(backup_path)
    }

    /// Newest-first, relying on the RFC3339 timestamp suffix sorting
    /// lexicographically the same as chronologically.
    pub async fn list_backups(&self) -> Result<Vec<PathBuf>, StateError> {
        let mut entries = match fs::read_dir(self.state_dir()).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StateError::Io(err)),
        };

        let prefix = format!("{STATE_FILE}.backup.");
        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                backups.push(entry.path());
            }
        }
        backups.sort_by(|a, b| b.cmp(a));
        Ok(backups)
    }

    pub async fn cleanup_backups(&self, keep: usize) -> Result<usize, StateError> {
        let backups = self.list_backups().await?;
        let mut removed = 0;
        for path in backups.into_iter().skip(keep) {
            fs::remove_file(&path).await?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Invokes `save_fn` every `interval` (floored at 5s) until `shutdown`
    /// is set to `true`. Save failures are logged, never propagated — the
    /// engine keeps scanning even when auto-save fails.
    pub async fn run_autosave_loop<F, Fut>(
        &self,
        interval: Duration,
        mut save_fn: F,
        mut shutdown: watch::Receiver<bool>,
    ) where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<(), StateError>>,
    {
        let interval = interval.max(MIN_AUTOSAVE_INTERVAL);
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = save_fn().await {
                        warn!(error = %err, "auto-save failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{AddressRange, FunctionCode};

    fn sample_checkpoint_inputs() -> (ScanConfig, ScanOptions, ScanState) {
        let config = ScanConfig::default();
        let mut options = ScanOptions::default();
        options.address_range = AddressRange::new(0, 9).unwrap();
        options.function_codes = vec![FunctionCode::HoldingRegisters];
        let state = ScanState::new(options.total_units());
        (config, options, state)
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ScanStateManager::new(dir.path());
        let (config, options, state) = sample_checkpoint_inputs();

        manager.save(&config, &options, &state, &[]).await.expect("save");
        assert!(manager.has_saved().await);

        let loaded = manager.load().await.expect("load").expect("present");
        assert_eq!(loaded.config, config);
        assert_eq!(loaded.options, options);
        assert_eq!(loaded.schema_version, CHECKPOINT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn load_returns_none_when_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ScanStateManager::new(dir.path());
        assert!(manager.load().await.expect("load").is_none());
        assert!(!manager.has_saved().await);
    }

    #[tokio::test]
    async fn clear_removes_the_checkpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ScanStateManager::new(dir.path());
        let (config, options, state) = sample_checkpoint_inputs();
        manager.save(&config, &options, &state, &[]).await.expect("save");

        manager.clear().await.expect("clear");
        assert!(!manager.has_saved().await);
    }

    #[tokio::test]
    async fn validate_rejects_corrupted_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ScanStateManager::new(dir.path());
        fs::create_dir_all(manager.state_dir()).await.unwrap();
        fs::write(manager.path(), b"{ not json").await.unwrap();

        let report = manager.validate().await.expect("validate");
        assert!(!report.is_valid());
        assert!(manager.load().await.is_err());
    }

    #[tokio::test]
    async fn validate_flags_schema_version_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ScanStateManager::new(dir.path());
        let (config, options, state) = sample_checkpoint_inputs();
        let mut checkpoint = PersistentCheckpoint::new(config, options, state, vec![]);
        checkpoint.schema_version = "0.1".to_string();
        manager.write_checkpoint(&checkpoint).await.expect("write");

        let report = manager.validate().await.expect("validate");
        assert!(!report.is_valid());
        assert!(matches!(
            report.errors[0],
            ValidationError::SchemaVersionMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn backup_and_cleanup_retain_newest_n() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = ScanStateManager::new(dir.path());
        let (config, options, state) = sample_checkpoint_inputs();
        manager.save(&config, &options, &state, &[]).await.expect("save");

        for _ in 0..3 {
            manager.backup().await.expect("backup");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let backups = manager.list_backups().await.expect("list");
        assert_eq!(backups.len(), 3);

        let removed = manager.cleanup_backups(1).await.expect("cleanup");
        assert_eq!(removed, 2);
        assert_eq!(manager.list_backups().await.expect("list").len(), 1);
    }
}
