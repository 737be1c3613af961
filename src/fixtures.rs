//! Shared test data: a small cleaned dataset with known medians.

use std::path::Path;

use polars::prelude::*;

use crate::records::{FEATURES, LABEL_COLUMN, REGION_COLUMN};

pub const SAMPLE_REGIONS: [&str; 8] = [
    "Kendari", "Baubau", "Konawe", "Muna", "Buton", "Kolaka", "Bombana", "Wakatobi",
];

/// Poverty percentages; the median of these is 12.34.
pub const SAMPLE_POVERTY: [f64; 8] = [15.0, 10.0, 12.30, 14.0, 12.38, 11.0, 13.0, 10.5];

pub const SAMPLE_STUNTING: [f64; 8] = [10.0, 80.0, 20.0, 70.0, 30.0, 60.0, 40.0, 50.0];

/// Feature values of row `row`, column `col`. `wasting` has one missing cell.
pub fn sample_value(row: usize, col: usize) -> Option<f64> {
    match FEATURES[col] {
        "Persentase Penduduk Miskin" => Some(SAMPLE_POVERTY[row]),
        "wasting" if row == 1 => None,
        "wasting" => Some(row as f64 * 0.5),
        _ => Some(((col + 1) * 100 + row * 10) as f64),
    }
}

pub fn sample_frame() -> DataFrame {
    let mut columns = vec![Series::new(REGION_COLUMN, SAMPLE_REGIONS.to_vec())];
    for (col, name) in FEATURES.iter().enumerate() {
        let values: Vec<Option<f64>> = (0..SAMPLE_REGIONS.len())
            .map(|row| sample_value(row, col))
            .collect();
        columns.push(Series::new(name, values));
    }
    columns.push(Series::new(LABEL_COLUMN, SAMPLE_STUNTING.to_vec()));
    DataFrame::new(columns).unwrap()
}

/// Writes the sample as CSV with padded header names, as exported by a spreadsheet.
pub fn write_sample_csv(path: &Path) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    let mut header = vec![REGION_COLUMN.to_string()];
    header.extend(FEATURES.iter().map(|f| format!(" {} ", f)));
    header.push(format!("{} ", LABEL_COLUMN));
    writer.write_record(&header).unwrap();
    for (row, region) in SAMPLE_REGIONS.iter().enumerate() {
        let mut record = vec![region.to_string()];
        record.extend((0..FEATURES.len()).map(|col| {
            sample_value(row, col)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }));
        record.push(SAMPLE_STUNTING[row].to_string());
        writer.write_record(&record).unwrap();
    }
    writer.flush().unwrap();
}
