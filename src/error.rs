use std::path::PathBuf;

use polars::prelude::PolarsError;
use smartcore::error::Failed;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("cannot read dataset {path:?}: {reason}")]
    Dataset { path: PathBuf, reason: String },
    #[error("column {column:?} has no numeric values")]
    EmptyColumn { column: String },
    #[error("failed to load model or scaler from {path:?}: {reason}")]
    ArtifactLoad { path: PathBuf, reason: String },
    #[error("failed to run prediction: {error_message}")]
    Inference { error_message: String },
    #[error("invalid form input: {error_message}")]
    Input { error_message: String },
    #[error("failed to render {path:?}: {reason}")]
    Render { path: PathBuf, reason: String },
    #[error("failed to draw the {chart}: {reason}")]
    Chart { chart: &'static str, reason: String },
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DashboardError {
    pub fn inference(error_message: impl Into<String>) -> Self {
        DashboardError::Inference { error_message: error_message.into() }
    }

    pub fn input(error_message: impl Into<String>) -> Self {
        DashboardError::Input { error_message: error_message.into() }
    }

    pub fn chart(chart: &'static str, reason: impl std::fmt::Display) -> Self {
        DashboardError::Chart { chart, reason: reason.to_string() }
    }
}

impl From<Failed> for DashboardError {
    fn from(e: Failed) -> Self {
        DashboardError::Inference { error_message: e.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
