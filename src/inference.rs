use log::{debug, info};
use polars::prelude::DataFrame;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::metrics::accuracy;

use crate::artifacts::{matrix_from_rows, FeatureScaler, RiskClassifier};
use crate::dataset::{binary_labels, convert_features_to_matrix};
use crate::error::{DashboardError, Result};
use crate::form::InputRow;
use crate::records::{RiskLabel, FEATURES};

/// An input row with the classifier's verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRow {
    pub input: InputRow,
    pub label: RiskLabel,
    /// `None` when the classifier has no probability output.
    pub probability_high: Option<f64>,
    pub probability_low: Option<f64>,
}

impl PredictionRow {
    pub fn region(&self) -> &str {
        &self.input.region
    }
}

pub fn input_matrix(rows: &[InputRow]) -> DenseMatrix<f64> {
    let rows: Vec<Vec<f64>> = rows.iter().map(|r| r.values.to_vec()).collect();
    matrix_from_rows(&rows, FEATURES.len())
}

/// Scales the rows, predicts a label per row and attaches class probabilities
/// when the classifier provides them. Row order is preserved.
pub fn predict_rows<S, C>(scaler: &S, classifier: &C, rows: &[InputRow]) -> Result<Vec<PredictionRow>>
where
    S: FeatureScaler + ?Sized,
    C: RiskClassifier + ?Sized,
{
    let scaled = scaler.transform(&input_matrix(rows))?;
    let labels = classifier.predict(&scaled)?;
    if labels.len() != rows.len() {
        return Err(DashboardError::inference(format!(
            "classifier returned {} labels for {} rows",
            labels.len(),
            rows.len()
        )));
    }

    let probabilities = classifier.predict_proba(&scaled)?;
    if let Some(probs) = &probabilities {
        if probs.len() != rows.len() {
            return Err(DashboardError::inference(format!(
                "classifier returned {} probability rows for {} rows",
                probs.len(),
                rows.len()
            )));
        }
    }

    let predictions = rows
        .iter()
        .zip(labels)
        .enumerate()
        .map(|(i, (input, label))| {
            let probs = probabilities.as_ref().map(|p| p[i]);
            PredictionRow {
                input: input.clone(),
                label,
                probability_high: probs.map(|p| p.high),
                probability_low: probs.map(|p| p.low),
            }
        })
        .collect();
    Ok(predictions)
}

fn dataset_accuracy<S, C>(scaler: &S, classifier: &C, df: &DataFrame) -> Result<f64>
where
    S: FeatureScaler + ?Sized,
    C: RiskClassifier + ?Sized,
{
    let x = convert_features_to_matrix(df)?;
    let y_true: Vec<i32> = binary_labels(df)?.into_iter().map(RiskLabel::code).collect();
    if y_true.is_empty() {
        return Err(DashboardError::inference("dataset has no rows"));
    }

    let y_pred: Vec<i32> = classifier
        .predict(&scaler.transform(&x)?)?
        .into_iter()
        .map(RiskLabel::code)
        .collect();
    if y_pred.len() != y_true.len() {
        return Err(DashboardError::inference("prediction count differs from dataset rows"));
    }
    Ok(accuracy(&y_true, &y_pred))
}

/// Accuracy of the classifier against the median-split labels of the
/// historical dataset. Informational only: any failure yields `None`.
pub fn self_check_accuracy<S, C>(scaler: &S, classifier: &C, df: &DataFrame) -> Option<f64>
where
    S: FeatureScaler + ?Sized,
    C: RiskClassifier + ?Sized,
{
    match dataset_accuracy(scaler, classifier, df) {
        Ok(acc) => {
            info!("self-check accuracy on {} rows: {:.3}", df.height(), acc);
            Some(acc)
        }
        Err(e) => {
            debug!("self-check accuracy not available: {}", e);
            None
        }
    }
}
