//! CSV metadata table loader.
//!
//! Turns a headed CSV of per-video metadata into a [`FeatureMatrix`]:
//! - the target column holds raw view counts and is stored as `ln(1 + views)`;
//! - every other column whose non-empty cells all parse as finite numbers becomes a feature;
//! - identifier and text columns, and any listed in `exclude`, are skipped;
//! - rows with a missing or unparseable value in a kept column are dropped.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, warn};

use crate::data::log1p_views;
use crate::{Error, FeatureMatrix, Result};

#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub matrix: FeatureMatrix,
    /// Header names of the feature columns, in matrix column order.
    pub feature_names: Vec<String>,
    /// Rows skipped for missing or unparseable values.
    pub dropped_rows: usize,
}

pub fn load_csv<P: AsRef<Path>>(path: P, target_column: &str, exclude: &[String]) -> Result<LoadedTable> {
    let file = File::open(path)?;
    load_csv_reader(BufReader::new(file), target_column, exclude)
}

pub fn load_csv_reader<R: Read>(reader: R, target_column: &str, exclude: &[String]) -> Result<LoadedTable> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let records = rdr.records().collect::<std::result::Result<Vec<StringRecord>, _>>()?;

    let target_idx = headers
        .iter()
        .position(|h| h == target_column)
        .ok_or_else(|| Error::InvalidData(format!("target column {target_column:?} not found")))?;

    let feature_cols: Vec<usize> = (0..headers.len())
        .filter(|&c| c != target_idx)
        .filter(|&c| !exclude.iter().any(|e| e == &headers[c]))
        .filter(|&c| is_numeric_column(&records, c))
        .collect();
    if feature_cols.is_empty() {
        return Err(Error::InvalidData(
            "table has no numeric feature columns".to_owned(),
        ));
    }
    let feature_names: Vec<String> = feature_cols.iter().map(|&c| headers[c].to_owned()).collect();
    debug!(
        "keeping {} of {} columns as features: {feature_names:?}",
        feature_cols.len(),
        headers.len()
    );

    let mut features = Vec::with_capacity(records.len() * feature_cols.len());
    let mut targets = Vec::with_capacity(records.len());
    let mut dropped_rows = 0;
    for (line, record) in records.iter().enumerate() {
        let Some(views) = parse_cell(record.get(target_idx)) else {
            dropped_rows += 1;
            continue;
        };
        let row: Option<Vec<f32>> = feature_cols
            .iter()
            .map(|&c| parse_cell(record.get(c)))
            .collect();
        let Some(row) = row else {
            dropped_rows += 1;
            continue;
        };
        if views < 0.0 {
            return Err(Error::InvalidData(format!(
                "record {} has negative {target_column} {views}",
                line + 1
            )));
        }

        features.extend(row);
        targets.push(log1p_views(f64::from(views)) as f32);
    }

    if dropped_rows > 0 {
        warn!("dropped {dropped_rows} rows with missing or unparseable values");
    }
    if targets.is_empty() {
        return Err(Error::InvalidData("table has no usable rows".to_owned()));
    }

    let matrix = FeatureMatrix::from_flat(features, targets, feature_cols.len())?;
    Ok(LoadedTable {
        matrix,
        feature_names,
        dropped_rows,
    })
}

/// A column is numeric when it has at least one value and every non-empty cell parses.
fn is_numeric_column(records: &[StringRecord], col: usize) -> bool {
    let mut seen = false;
    for record in records {
        match record.get(col) {
            Some("") | None => {}
            Some(cell) => {
                if !cell.parse::<f32>().is_ok_and(f32::is_finite) {
                    return false;
                }
                seen = true;
            }
        }
    }
    seen
}

fn parse_cell(cell: Option<&str>) -> Option<f32> {
    cell.and_then(|c| c.parse::<f32>().ok()).filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
video_id,title,duration,likes,views,comments
a1,First,120,10,99,3
b2,Second,300,,0,1
c3,Third,45,7,9,0
";

    #[test]
    fn filters_columns_and_transforms_target() {
        let table = load_csv_reader(CSV.as_bytes(), "views", &[]).unwrap();
        assert_eq!(table.feature_names, vec!["duration", "likes", "comments"]);
        assert_eq!(table.dropped_rows, 1);
        assert_eq!(table.matrix.len(), 2);
        assert_eq!(table.matrix.row(0), &[120.0, 10.0, 3.0]);
        assert!((table.matrix.target(0) - 100.0_f32.ln()).abs() < 1e-5);
        assert!((table.matrix.target(1) - 10.0_f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn exclude_list_removes_numeric_columns() {
        let table = load_csv_reader(CSV.as_bytes(), "views", &["likes".to_owned()]).unwrap();
        assert_eq!(table.feature_names, vec!["duration", "comments"]);
        assert_eq!(table.dropped_rows, 0);
        assert_eq!(table.matrix.len(), 3);
        assert_eq!(table.matrix.target(1), 0.0);
    }

    #[test]
    fn rejects_missing_target_and_negative_views() {
        assert!(matches!(
            load_csv_reader(CSV.as_bytes(), "plays", &[]),
            Err(Error::InvalidData(_))
        ));
        let negative = "x,views\n1,5\n2,-3\n";
        assert!(matches!(
            load_csv_reader(negative.as_bytes(), "views", &[]),
            Err(Error::InvalidData(_))
        ));
        let text_only = "name,views\nfoo,5\n";
        assert!(matches!(
            load_csv_reader(text_only.as_bytes(), "views", &[]),
            Err(Error::InvalidData(_))
        ));
    }
}
