//! # Version Ledger
//!
//! Keeps a JSON ledger of exported model versions, newest first, together
//! with an archived copy of each artifact.
//!
//! - Versions are UTC timestamps (`YYYYMMDDhhmmss`), suffixed `-N` when two
//!   exports land in the same second
//! - Only the newest `retention` entries are kept; archives of dropped
//!   entries are deleted once the new ledger is on disk
//! - A missing ledger reads as empty; an unreadable one is logged and read as
//!   empty, so a damaged ledger never blocks an export

use crate::formats::write_atomic;
use crate::pipeline::ExportReport;
use crate::primitives::{DEFAULT_ARCHIVE_DIR, DEFAULT_LEDGER_PATH, DEFAULT_RETENTION};
use crate::PickestError;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::{debug, info, warn};

const VERSION_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");

// =============================================================================
// ENTRY
// =============================================================================

/// One exported model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Version identifier.
    pub version: String,
    /// Export time, RFC 3339.
    pub timestamp: String,
    /// Learner description.
    pub trainer: String,
    /// Held-out R², if rows were held out.
    pub r_squared: Option<f64>,
    /// Held-out mean absolute error.
    pub mae: Option<f64>,
    /// Held-out root mean squared error.
    pub rmse: Option<f64>,
    /// Rows used for fitting.
    pub train_rows: usize,
    /// Rows held out.
    pub test_rows: usize,
    /// FNV-1a checksum of the artifact, hex.
    pub checksum: String,
    /// Archived artifact file name.
    pub archive: String,
}

// =============================================================================
// LEDGER
// =============================================================================

/// Ledger file plus archive directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionLedger {
    ledger_path: PathBuf,
    archive_dir: PathBuf,
    retention: usize,
}

impl Default for VersionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_PATH, DEFAULT_ARCHIVE_DIR)
    }
}

impl VersionLedger {
    /// Ledger at `ledger_path`, archives under `archive_dir`.
    #[must_use]
    pub fn new(ledger_path: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            ledger_path: ledger_path.into(),
            archive_dir: archive_dir.into(),
            retention: DEFAULT_RETENTION,
        }
    }

    /// Number of entries to keep. Zero falls back to the default.
    #[must_use]
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = if retention == 0 {
            DEFAULT_RETENTION
        } else {
            retention
        };
        self
    }

    #[must_use]
    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    #[must_use]
    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Path of the archived artifact for `version`.
    #[must_use]
    pub fn archive_path(&self, version: &str) -> PathBuf {
        self.archive_dir.join(archive_name(version))
    }

    /// Read the ledger, newest first.
    #[must_use]
    pub fn load(&self) -> Vec<ModelVersion> {
        let bytes = match std::fs::read(&self.ledger_path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(
                    path = %self.ledger_path.display(),
                    error = %e,
                    "Cannot read version ledger, treating as empty"
                );
                return Vec::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    path = %self.ledger_path.display(),
                    error = %e,
                    "Corrupt version ledger, treating as empty"
                );
                Vec::new()
            }
        }
    }

    /// Record an export made now.
    pub fn record(&self, report: &ExportReport) -> Result<ModelVersion, PickestError> {
        self.record_at(report, OffsetDateTime::now_utc())
    }

    /// Record an export made at `at`.
    pub fn record_at(
        &self,
        report: &ExportReport,
        at: OffsetDateTime,
    ) -> Result<ModelVersion, PickestError> {
        let mut entries = self.load();

        let base = at
            .format(VERSION_FORMAT)
            .map_err(|e| PickestError::SerializationError(e.to_string()))?;
        let version = unique_version(&base, &entries);
        let timestamp = at
            .format(&Rfc3339)
            .map_err(|e| PickestError::SerializationError(e.to_string()))?;

        std::fs::create_dir_all(&self.archive_dir).map_err(|e| {
            PickestError::IoError(format!(
                "Cannot create '{}': {}",
                self.archive_dir.display(),
                e
            ))
        })?;
        let archive = self.archive_path(&version);
        std::fs::copy(&report.model_path, &archive).map_err(|e| {
            PickestError::IoError(format!(
                "Cannot archive '{}' to '{}': {}",
                report.model_path.display(),
                archive.display(),
                e
            ))
        })?;

        let entry = ModelVersion {
            version: version.clone(),
            timestamp,
            trainer: format!("RandomForest(n_estimators={})", report.n_estimators),
            r_squared: report.metrics.map(|m| m.r_squared),
            mae: report.metrics.map(|m| m.mean_absolute_error),
            rmse: report.metrics.map(|m| m.root_mean_squared_error),
            train_rows: report.train_rows,
            test_rows: report.test_rows,
            checksum: format!("{:016x}", report.checksum),
            archive: archive_name(&version),
        };

        entries.insert(0, entry.clone());
        let dropped = if entries.len() > self.retention {
            entries.split_off(self.retention)
        } else {
            Vec::new()
        };

        if let Err(e) = self.persist(&entries) {
            if let Err(cleanup) = std::fs::remove_file(&archive) {
                warn!(path = %archive.display(), error = %cleanup, "Cannot remove new archive");
            }
            return Err(e);
        }

        for stale in &dropped {
            self.remove_archive(stale);
        }

        info!(version = %entry.version, kept = entries.len(), "Model version recorded");
        Ok(entry)
    }

    fn persist(&self, entries: &[ModelVersion]) -> Result<(), PickestError> {
        if let Some(parent) = self
            .ledger_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| PickestError::SerializationError(e.to_string()))?;
        write_atomic(&self.ledger_path, &json)
    }

    /// Delete the archive of a pruned entry. The file name is rebuilt from
    /// the version, which must be a single plain path component.
    fn remove_archive(&self, entry: &ModelVersion) {
        if !is_plain_file_name(&entry.version) {
            warn!(version = %entry.version, "Refusing to prune archive of malformed version");
            return;
        }
        let path = self.archive_path(&entry.version);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(version = %entry.version, "Archive pruned"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Cannot prune archive"),
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    )
}

fn archive_name(version: &str) -> String {
    format!("model_{}.onnx", version)
}

/// `base`, or `base-N` with the smallest free `N`.
fn unique_version(base: &str, entries: &[ModelVersion]) -> String {
    let taken = |v: &str| entries.iter().any(|e| e.version == v);
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}-{}", base, n))
        .find(|v| !taken(v))
        .unwrap_or_else(|| base.to_string())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RegressionMetrics;
    use time::macros::datetime;

    fn report(dir: &Path) -> ExportReport {
        let model_path = dir.join("model.onnx");
        std::fs::write(&model_path, b"onnx bytes").expect("write model");
        ExportReport {
            data_path: dir.join("picking_data.csv"),
            model_path,
            checkpoint_path: None,
            rows: 100,
            train_rows: 80,
            test_rows: 20,
            n_estimators: 100,
            node_count: 1000,
            metrics: Some(RegressionMetrics {
                r_squared: 0.9,
                mean_absolute_error: 0.5,
                root_mean_squared_error: 0.7,
                loss: 0.49,
                rows: 20,
            }),
            training_means: None,
            artifact_bytes: 10,
            checksum: 0xabc,
            digest: None,
            elapsed_ms: 1,
        }
    }

    fn ledger(dir: &Path) -> VersionLedger {
        VersionLedger::new(dir.join("models/versions.json"), dir.join("models/archive"))
    }

    #[test]
    fn missing_ledger_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(ledger(dir.path()).load().is_empty());
    }

    #[test]
    fn corrupt_ledger_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("versions.json");
        std::fs::write(&path, b"{ not json").expect("write");
        assert!(VersionLedger::new(&path, dir.path()).load().is_empty());
    }

    #[test]
    fn record_writes_entry_and_archive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(dir.path());

        let entry = ledger
            .record_at(&report(dir.path()), datetime!(2026-03-14 09:26:53 UTC))
            .expect("record");

        assert_eq!(entry.version, "20260314092653");
        assert_eq!(entry.timestamp, "2026-03-14T09:26:53Z");
        assert_eq!(entry.checksum, "0000000000000abc");
        assert_eq!(entry.r_squared, Some(0.9));
        assert_eq!(ledger.load(), vec![entry.clone()]);
        assert_eq!(
            std::fs::read(ledger.archive_path(&entry.version)).expect("archive"),
            b"onnx bytes"
        );
    }

    #[test]
    fn same_second_gets_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(dir.path());
        let at = datetime!(2026-03-14 09:26:53 UTC);
        let r = report(dir.path());

        let first = ledger.record_at(&r, at).expect("first");
        let second = ledger.record_at(&r, at).expect("second");
        let third = ledger.record_at(&r, at).expect("third");

        assert_eq!(first.version, "20260314092653");
        assert_eq!(second.version, "20260314092653-1");
        assert_eq!(third.version, "20260314092653-2");
        assert_eq!(ledger.load()[0].version, third.version);
    }

    #[test]
    fn retention_prunes_entries_and_archives() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(dir.path()).with_retention(2);
        let r = report(dir.path());

        let versions: Vec<String> = (0..4)
            .map(|s| {
                let at = datetime!(2026-03-14 09:26:00 UTC) + time::Duration::seconds(s);
                ledger.record_at(&r, at).expect("record").version
            })
            .collect();

        let kept: Vec<String> = ledger.load().into_iter().map(|e| e.version).collect();
        assert_eq!(kept, vec![versions[3].clone(), versions[2].clone()]);
        assert!(!ledger.archive_path(&versions[0]).exists());
        assert!(!ledger.archive_path(&versions[1]).exists());
        assert!(ledger.archive_path(&versions[3]).exists());
    }

    #[test]
    fn pruning_stays_inside_archive_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(dir.path()).with_retention(1);
        let outside = dir.path().join("keep.txt");
        std::fs::write(&outside, b"keep").expect("write");

        let forged = |version: &str| ModelVersion {
            version: version.to_string(),
            timestamp: "2026-03-14T09:00:00Z".to_string(),
            trainer: "RandomForest(n_estimators=1)".to_string(),
            r_squared: None,
            mae: None,
            rmse: None,
            train_rows: 1,
            test_rows: 0,
            checksum: "0".to_string(),
            archive: "../../keep.txt".to_string(),
        };
        for version in ["20260314090000", "../../keep"] {
            std::fs::create_dir_all(dir.path().join("models")).expect("mkdir");
            let json = serde_json::to_vec(&vec![forged(version)]).expect("json");
            std::fs::write(ledger.ledger_path(), json).expect("seed ledger");

            ledger
                .record_at(&report(dir.path()), datetime!(2026-03-14 09:26:53 UTC))
                .expect("record");

            assert!(outside.exists(), "{version}");
            assert_eq!(ledger.load().len(), 1);
        }
    }

    #[test]
    fn plain_file_names_only() {
        assert!(is_plain_file_name("20260314092653-1"));
        assert!(!is_plain_file_name("../x"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("a/b"));
        assert!(!is_plain_file_name("/abs"));
        assert!(!is_plain_file_name(""));
    }

    #[test]
    fn failed_ledger_write_removes_new_archive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = ledger(dir.path());
        // A directory where the ledger file should be makes the rename fail.
        std::fs::create_dir_all(ledger.ledger_path()).expect("mkdir");

        let result = ledger.record_at(&report(dir.path()), datetime!(2026-03-14 09:26:53 UTC));

        assert!(result.is_err());
        assert!(!ledger.archive_path("20260314092653").exists());
    }

    #[test]
    fn zero_retention_uses_default() {
        assert_eq!(VersionLedger::default().with_retention(0).retention(), 5);
    }
}
