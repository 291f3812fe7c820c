//! # Dataset Module
//!
//! Loading of picking-job tables from CSV.
//!
//! - Columns are located by header name, so column order in the file and
//!   extra columns do not matter
//! - Every required column must be present
//! - Every field of a required column must parse as a finite number
//! - The loaded table is immutable

use crate::primitives::{FEATURE_COLUMNS, FEATURE_COUNT, MAX_DATASET_FILE_SIZE, TARGET_COLUMN};
use crate::{FeatureVector, PickestError, PickingRecord};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// In-memory picking dataset: features and targets, row-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    features: Vec<FeatureVector>,
    targets: Vec<f32>,
}

impl Dataset {
    /// Build a dataset from already-parsed records.
    #[must_use]
    pub fn from_records(records: &[PickingRecord]) -> Self {
        Self {
            features: records.iter().map(|r| r.features).collect(),
            targets: records.iter().map(|r| r.picking_time).collect(),
        }
    }

    /// Load a dataset from a CSV file.
    pub fn from_path(path: &Path) -> Result<Self, PickestError> {
        let dataset = Self::from_reader(open_checked(path)?)?;

        tracing::debug!(
            path = %path.display(),
            rows = dataset.len(),
            "dataset loaded"
        );
        Ok(dataset)
    }

    /// Load a dataset from any CSV source with a header row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PickestError> {
        let (features, targets) = read_table(reader, true)?;
        Ok(Self { features, targets })
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// True when the dataset holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Feature rows in `FEATURE_COLUMNS` order.
    #[must_use]
    pub fn features(&self) -> &[FeatureVector] {
        &self.features
    }

    /// Target values, aligned with `features()`.
    #[must_use]
    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    /// Row `index` as a record.
    #[must_use]
    pub fn record(&self, index: usize) -> Option<PickingRecord> {
        Some(PickingRecord::new(
            *self.features.get(index)?,
            *self.targets.get(index)?,
        ))
    }

    /// Copy the given rows (in the given order) into a new dataset.
    ///
    /// Indices out of range are skipped.
    #[must_use]
    pub fn subset(&self, indices: &[usize]) -> Self {
        let mut features = Vec::with_capacity(indices.len());
        let mut targets = Vec::with_capacity(indices.len());
        for &i in indices {
            if let (Some(f), Some(t)) = (self.features.get(i), self.targets.get(i)) {
                features.push(*f);
                targets.push(*t);
            }
        }
        Self { features, targets }
    }

    /// Per-feature mean over all rows, or `None` for an empty dataset.
    #[must_use]
    pub fn column_means(&self) -> Option<[f64; FEATURE_COUNT]> {
        feature_means(&self.features)
    }
}

// =============================================================================
// FEATURE-ONLY TABLES
// =============================================================================

/// Load the feature columns of a CSV file. The target column may be absent.
pub fn read_features(path: &Path) -> Result<Vec<FeatureVector>, PickestError> {
    let rows = read_features_from(open_checked(path)?)?;
    tracing::debug!(path = %path.display(), rows = rows.len(), "feature rows loaded");
    Ok(rows)
}

/// Load the feature columns of any CSV source with a header row.
pub fn read_features_from<R: Read>(reader: R) -> Result<Vec<FeatureVector>, PickestError> {
    read_table(reader, false).map(|(features, _)| features)
}

/// Per-feature mean of `rows`, or `None` when there are none.
#[must_use]
pub fn feature_means(rows: &[FeatureVector]) -> Option<[f64; FEATURE_COUNT]> {
    if rows.is_empty() {
        return None;
    }
    let mut sums = [0.0f64; FEATURE_COUNT];
    for row in rows {
        for (sum, &v) in sums.iter_mut().zip(row.iter()) {
            *sum += f64::from(v);
        }
    }
    let n = rows.len() as f64;
    Some(sums.map(|s| s / n))
}

// =============================================================================
// HELPERS
// =============================================================================

/// Open `path` after checking its size.
fn open_checked(path: &Path) -> Result<BufReader<File>, PickestError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        PickestError::IoError(format!("Cannot read '{}': {}", path.display(), e))
    })?;
    if metadata.len() > MAX_DATASET_FILE_SIZE {
        return Err(PickestError::InvalidConfig(format!(
            "Dataset size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_DATASET_FILE_SIZE
        )));
    }

    let file = File::open(path).map_err(|e| {
        PickestError::IoError(format!("Cannot open '{}': {}", path.display(), e))
    })?;
    Ok(BufReader::new(file))
}

/// Parse every row. Targets are read only when `with_target` is set and are
/// empty otherwise.
fn read_table<R: Read>(
    reader: R,
    with_target: bool,
) -> Result<(Vec<FeatureVector>, Vec<f32>), PickestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers().map_err(csv_error)?.clone();
    let mut feature_idx = [0usize; FEATURE_COUNT];
    for (slot, name) in feature_idx.iter_mut().zip(FEATURE_COLUMNS.iter()) {
        *slot = find_column(&headers, name)?;
    }
    let target_idx = if with_target {
        Some(find_column(&headers, TARGET_COLUMN)?)
    } else {
        None
    };

    let mut features = Vec::new();
    let mut targets = Vec::new();

    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        let line = record.position().map_or(0, |p| p.line());

        let mut row = [0.0f32; FEATURE_COUNT];
        for (slot, (&idx, name)) in row
            .iter_mut()
            .zip(feature_idx.iter().zip(FEATURE_COLUMNS.iter()))
        {
            *slot = parse_field(&record, idx, name, line)?;
        }

        if let Some(idx) = target_idx {
            targets.push(parse_field(&record, idx, TARGET_COLUMN, line)?);
        }
        features.push(row);
    }

    if features.is_empty() {
        return Err(PickestError::EmptyDataset);
    }

    Ok((features, targets))
}

fn find_column(headers: &csv::StringRecord, name: &str) -> Result<usize, PickestError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| PickestError::MissingColumn(name.to_string()))
}

fn parse_field(
    record: &csv::StringRecord,
    idx: usize,
    column: &str,
    line: u64,
) -> Result<f32, PickestError> {
    let raw = record.get(idx).ok_or_else(|| PickestError::MalformedRow {
        line,
        reason: format!("{}: missing field", column),
    })?;

    let value: f32 = raw.parse().map_err(|_| PickestError::MalformedRow {
        line,
        reason: format!("{}: invalid number '{}'", column, raw),
    })?;

    if !value.is_finite() {
        return Err(PickestError::MalformedRow {
            line,
            reason: format!("{}: non-finite value '{}'", column, raw),
        });
    }

    Ok(value)
}

fn csv_error(e: csv::Error) -> PickestError {
    if e.is_io_error() {
        return PickestError::IoError(e.to_string());
    }
    PickestError::MalformedRow {
        line: e.position().map_or(0, |p| p.line()),
        reason: e.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "ItemCount,Weight,Volume,Distance,PickerExperience,StockDensity,PickingTime";

    #[test]
    fn loads_rows_in_feature_order() {
        let csv = format!("{HEADER}\n10,5.0,2.0,3.5,1,0.8,12.5\n3,1.5,0.4,20,7,0.2,6.0\n");
        let ds = Dataset::from_reader(csv.as_bytes()).expect("load");

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.features()[0], [10.0, 5.0, 2.0, 3.5, 1.0, 0.8]);
        assert_eq!(ds.targets(), &[12.5, 6.0]);
    }

    #[test]
    fn columns_resolved_by_name() {
        let csv = "PickingTime,StockDensity,Note,PickerExperience,Distance,Volume,Weight,ItemCount\n\
                   9.0,0.5,x,4,12,1.5,2.5,8\n";
        let ds = Dataset::from_reader(csv.as_bytes()).expect("load");

        assert_eq!(ds.features()[0], [8.0, 2.5, 1.5, 12.0, 4.0, 0.5]);
        assert_eq!(ds.targets()[0], 9.0);
    }

    #[test]
    fn header_whitespace_is_trimmed() {
        let csv = "ItemCount, Weight, Volume, Distance, PickerExperience, StockDensity, PickingTime\n\
                   1, 2, 3, 4, 5, 0.5, 6\n";
        let ds = Dataset::from_reader(csv.as_bytes()).expect("load");
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn missing_column_rejected() {
        let csv = "ItemCount,Weight,Volume,Distance,PickerExperience,PickingTime\n1,2,3,4,5,6\n";
        let err = Dataset::from_reader(csv.as_bytes()).expect_err("missing column");
        assert_eq!(err, PickestError::MissingColumn("StockDensity".to_string()));
    }

    #[test]
    fn bad_number_reports_line() {
        let csv = format!("{HEADER}\n1,2,3,4,5,0.5,6\n1,heavy,3,4,5,0.5,6\n");
        let err = Dataset::from_reader(csv.as_bytes()).expect_err("bad number");
        match err {
            PickestError::MalformedRow { line, reason } => {
                assert_eq!(line, 3);
                assert!(reason.contains("Weight"));
            }
            other => unreachable!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn short_row_rejected() {
        let csv = format!("{HEADER}\n1,2,3\n");
        let err = Dataset::from_reader(csv.as_bytes()).expect_err("short row");
        assert!(matches!(err, PickestError::MalformedRow { .. }));
    }

    #[test]
    fn non_finite_rejected() {
        let csv = format!("{HEADER}\n1,2,3,4,5,NaN,6\n");
        let err = Dataset::from_reader(csv.as_bytes()).expect_err("nan");
        assert!(matches!(err, PickestError::MalformedRow { .. }));
    }

    #[test]
    fn header_only_is_empty() {
        let err = Dataset::from_reader(format!("{HEADER}\n").as_bytes()).expect_err("empty");
        assert_eq!(err, PickestError::EmptyDataset);
    }

    #[test]
    fn subset_and_means() {
        let records: Vec<PickingRecord> = (0..4)
            .map(|i| PickingRecord::new([i as f32; FEATURE_COUNT], i as f32 * 2.0))
            .collect();
        let ds = Dataset::from_records(&records);

        let sub = ds.subset(&[3, 1, 99]);
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.targets(), &[6.0, 2.0]);

        let means = ds.column_means().expect("non-empty");
        assert!((means[0] - 1.5).abs() < 1e-12);
        assert!(Dataset::default().column_means().is_none());
    }

    #[test]
    fn feature_rows_without_target() {
        let csv = "ItemCount,Weight,Volume,Distance,PickerExperience,StockDensity\n\
                   4,1,2,3,5,0.5\n\
                   6,1,2,5,5,0.5\n";
        let rows = read_features_from(csv.as_bytes()).expect("load");

        assert_eq!(rows.len(), 2);
        let means = feature_means(&rows).expect("non-empty");
        assert!((means[0] - 5.0).abs() < 1e-12);
        assert!((means[3] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn feature_rows_still_need_every_feature() {
        let csv = "ItemCount,Weight,Volume,Distance,PickerExperience\n1,2,3,4,5\n";
        let err = read_features_from(csv.as_bytes()).expect_err("missing column");
        assert_eq!(err, PickestError::MissingColumn("StockDensity".to_string()));
    }
}
