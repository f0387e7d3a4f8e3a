//! CSV datasets.
//!
//! The reader keeps only the requested columns (plus an optional weight
//! column). Rows that fail to parse are skipped and counted; a missing column
//! or an empty result is an error.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use tracing::warn;

use crate::data::Dataset;
use crate::error::AppError;

/// Read `columns` (and `weight`, if given) from a headed CSV file.
pub fn read_csv_dataset(path: &Path, columns: &[String], weight: Option<&str>) -> Result<Dataset, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::Io(format!("Failed to open dataset '{}': {e}", path.display())))?;
    read_csv(file, columns, weight)
}

pub fn read_csv<R: std::io::Read>(reader: R, columns: &[String], weight: Option<&str>) -> Result<Dataset, AppError> {
    if columns.is_empty() {
        return Err(AppError::Dataset("no columns requested".to_string()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| AppError::Dataset(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let index = |name: &str| {
        header_map
            .get(name)
            .copied()
            .ok_or_else(|| AppError::Dataset(format!("missing column '{name}'")))
    };
    let col_idx = columns.iter().map(|c| index(c)).collect::<Result<Vec<_>, _>>()?;
    let weight_idx = weight.map(index).transpose()?;

    let mut values: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
    let mut weights = weight_idx.map(|_| Vec::new());
    let mut skipped = 0usize;

    for result in reader.records() {
        let Ok(record) = result else {
            skipped += 1;
            continue;
        };
        let Some(row) = parse_row(&record, &col_idx) else {
            skipped += 1;
            continue;
        };
        let w = match weight_idx {
            Some(i) => match parse_field(&record, i) {
                Some(w) if w >= 0.0 => Some(w),
                _ => {
                    skipped += 1;
                    continue;
                }
            },
            None => None,
        };
        for (col, v) in values.iter_mut().zip(row) {
            col.push(v);
        }
        if let (Some(ws), Some(w)) = (weights.as_mut(), w) {
            ws.push(w);
        }
    }

    if skipped > 0 {
        warn!(skipped, "skipped unparsable dataset rows");
    }
    if values[0].is_empty() {
        return Err(AppError::Dataset("no valid rows in dataset".to_string()));
    }
    Dataset::new(columns.iter().cloned().zip(values).collect(), weights)
}

/// Write a dataset (columns, then `weight` if present) as CSV.
pub fn write_csv_dataset(path: &Path, dataset: &Dataset) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::Io(format!("Failed to create dataset '{}': {e}", path.display())))?;
    let names: Vec<&str> = dataset.names().collect();
    let columns = names
        .iter()
        .map(|n| dataset.column(n))
        .collect::<Result<Vec<_>, _>>()?;

    let mut header: Vec<&str> = names.clone();
    if dataset.weights().is_some() {
        header.push("weight");
    }
    writer
        .write_record(&header)
        .map_err(|e| AppError::Io(format!("Failed to write dataset header: {e}")))?;

    for i in 0..dataset.len() {
        let mut row: Vec<String> = columns.iter().map(|c| c[i].to_string()).collect();
        if dataset.weights().is_some() {
            row.push(dataset.weight(i).to_string());
        }
        writer
            .write_record(&row)
            .map_err(|e| AppError::Io(format!("Failed to write dataset row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::Io(format!("Failed to flush dataset '{}': {e}", path.display())))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().trim_start_matches('\u{feff}').to_string(), idx))
        .collect()
}

fn parse_field(record: &StringRecord, idx: usize) -> Option<f64> {
    record
        .get(idx)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn parse_row(record: &StringRecord, idx: &[usize]) -> Option<Vec<f64>> {
    idx.iter().map(|i| parse_field(record, *i)).collect()
}
