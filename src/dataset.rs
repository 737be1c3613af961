use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use log::{debug, info};
use polars::prelude::*;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{DashboardError, Result};
use crate::records::{RiskLabel, StuntingRecord, FEATURES, LABEL_COLUMN};

lazy_static! {
    // Loaded tables stay valid for the whole process; the files are static.
    static ref DATASET_CACHE: Mutex<HashMap<PathBuf, Arc<DataFrame>>> = Mutex::new(HashMap::new());
}

pub async fn read_csv<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let path = path.as_ref();
    let dataset_error = |reason: String| DashboardError::Dataset {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path).map_err(|e| dataset_error(e.to_string()))?;

    // dtypes come from the whole file; a late decimal must not break an integer guess
    let mut df = CsvReader::new(file)
        .has_header(true)
        .infer_schema(None)
        .finish()
        .map_err(|e| dataset_error(e.to_string()))?;

    trim_column_names(&mut df)?;
    cast_to_schema(&mut df)?;
    Ok(df)
}

/// Returns the dataset at `path`, reading it on first use only.
pub async fn load_dataset<P: AsRef<Path>>(path: P) -> Result<Arc<DataFrame>> {
    let path = path.as_ref().to_path_buf();
    if let Some(df) = lock_cache().get(&path) {
        debug!("dataset {:?} served from cache", path);
        return Ok(Arc::clone(df));
    }

    let df = Arc::new(read_csv(&path).await?);
    info!("loaded dataset {:?}: {} rows, {} columns", path, df.height(), df.width());
    Ok(Arc::clone(lock_cache().entry(path).or_insert(df)))
}

fn lock_cache() -> std::sync::MutexGuard<'static, HashMap<PathBuf, Arc<DataFrame>>> {
    DATASET_CACHE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn trim_column_names(df: &mut DataFrame) -> PolarsResult<()> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    df.set_column_names(&names)
}

/// Casts the known columns to their schema dtype; other columns are kept as read.
fn cast_to_schema(df: &mut DataFrame) -> PolarsResult<()> {
    let schema = StuntingRecord::raw_schema();
    for (name, dtype) in schema.iter() {
        let Ok(column) = df.column(name.as_str()) else {
            continue;
        };
        if column.dtype() != dtype {
            let cast = column.cast(dtype)?;
            df.with_column(cast)?;
        }
    }
    Ok(())
}

/// Column values as floats; nulls and unparsable cells become `None`.
pub fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}

/// Median of the present values, `None` when nothing is left after dropping missing ones.
pub fn median<I: IntoIterator<Item = Option<f64>>>(values: I) -> Option<f64> {
    let mut present: Vec<f64> = values
        .into_iter()
        .flatten()
        .filter(|v| !v.is_nan())
        .collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(|a, b| a.total_cmp(b));
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        Some((present[mid - 1] + present[mid]) / 2.0)
    } else {
        Some(present[mid])
    }
}

pub fn column_median(df: &DataFrame, name: &str) -> Result<f64> {
    median(numeric_values(df, name)?).ok_or_else(|| DashboardError::EmptyColumn {
        column: name.to_string(),
    })
}

/// Median of every feature, in canonical feature order.
pub fn feature_medians(df: &DataFrame) -> Result<Vec<f64>> {
    FEATURES
        .iter()
        .map(|feature| column_median(df, feature))
        .collect()
}

/// High when the label is strictly above the dataset median, Low otherwise.
pub fn binary_labels(df: &DataFrame) -> Result<Vec<RiskLabel>> {
    let values = numeric_values(df, LABEL_COLUMN)?;
    let threshold = median(values.iter().copied()).ok_or_else(|| DashboardError::EmptyColumn {
        column: LABEL_COLUMN.to_string(),
    })?;
    Ok(values
        .into_iter()
        .map(|v| match v {
            Some(v) if v > threshold => RiskLabel::High,
            _ => RiskLabel::Low,
        })
        .collect())
}

/// Builds the feature matrix read by the scaler, columns in canonical order.
pub fn convert_features_to_matrix(df: &DataFrame) -> Result<DenseMatrix<f64>> {
    let nrows = df.height();
    let ncols = FEATURES.len();
    let mut xs: Vec<f64> = Vec::with_capacity(nrows * ncols);

    // column-major: one feature after another
    for feature in FEATURES {
        for value in numeric_values(df, feature)? {
            match value {
                Some(v) if !v.is_nan() => xs.push(v),
                _ => {
                    return Err(DashboardError::inference(format!(
                        "feature {:?} has missing values",
                        feature
                    )))
                }
            }
        }
    }

    Ok(DenseMatrix::new(nrows, ncols, xs, true))
}
