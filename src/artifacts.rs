//! Externally fitted scaler and classifier, read from JSON artifacts.
//!
//! Both are opaque to the dashboard: it only relies on the `transform`,
//! `predict` and optional `predict_proba` capabilities below.

use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::metrics::distance::euclidian::Euclidian;
use smartcore::neighbors::knn_classifier::KNNClassifier;

use crate::error::{DashboardError, Result};
use crate::records::{RiskLabel, FEATURES};

/// Probability of each class for one row, in `[Low, High]` column order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbabilities {
    pub low: f64,
    pub high: f64,
}

pub trait FeatureScaler {
    fn n_features(&self) -> usize;

    fn transform(&self, x: &DenseMatrix<f64>) -> Result<DenseMatrix<f64>>;
}

pub trait RiskClassifier {
    fn predict(&self, x: &DenseMatrix<f64>) -> Result<Vec<RiskLabel>>;

    /// `Ok(None)` when the model has no probability output.
    fn predict_proba(&self, x: &DenseMatrix<f64>) -> Result<Option<Vec<ClassProbabilities>>>;
}

pub fn matrix_rows(x: &DenseMatrix<f64>) -> Vec<Vec<f64>> {
    let (nrows, ncols) = x.shape();
    (0..nrows)
        .map(|r| (0..ncols).map(|c| *x.get((r, c))).collect())
        .collect()
}

pub fn matrix_from_rows(rows: &[Vec<f64>], ncols: usize) -> DenseMatrix<f64> {
    let values: Vec<f64> = rows.iter().flatten().copied().collect();
    DenseMatrix::new(rows.len(), ncols, values, false)
}

fn check_width(x: &DenseMatrix<f64>, expected: usize) -> Result<()> {
    let (_, ncols) = x.shape();
    if ncols != expected {
        return Err(DashboardError::inference(format!(
            "expected {} features, got {}",
            expected, ncols
        )));
    }
    Ok(())
}

// ---- scalers ----

/// Standardization with fitted `mean` and `scale` per feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
}

/// Rescaling of each feature from its fitted range to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub data_min: Vec<f64>,
    pub data_max: Vec<f64>,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
}

/// A zero spread leaves the centred value unscaled.
fn safe_divisor(spread: f64) -> f64 {
    if spread == 0.0 || !spread.is_finite() {
        1.0
    } else {
        spread
    }
}

impl FeatureScaler for StandardScaler {
    fn n_features(&self) -> usize {
        self.mean.len()
    }

    fn transform(&self, x: &DenseMatrix<f64>) -> Result<DenseMatrix<f64>> {
        check_width(x, self.n_features())?;
        let rows: Vec<Vec<f64>> = matrix_rows(x)
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(self.mean.iter().zip(&self.scale))
                    .map(|(v, (mean, scale))| (v - mean) / safe_divisor(*scale))
                    .collect()
            })
            .collect();
        Ok(matrix_from_rows(&rows, self.n_features()))
    }
}

impl FeatureScaler for MinMaxScaler {
    fn n_features(&self) -> usize {
        self.data_min.len()
    }

    fn transform(&self, x: &DenseMatrix<f64>) -> Result<DenseMatrix<f64>> {
        check_width(x, self.n_features())?;
        let rows: Vec<Vec<f64>> = matrix_rows(x)
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(self.data_min.iter().zip(&self.data_max))
                    .map(|(v, (min, max))| (v - min) / safe_divisor(max - min))
                    .collect()
            })
            .collect();
        Ok(matrix_from_rows(&rows, self.n_features()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerArtifact {
    Standard(StandardScaler),
    MinMax(MinMaxScaler),
}

impl ScalerArtifact {
    fn feature_names(&self) -> Option<&[String]> {
        match self {
            ScalerArtifact::Standard(s) => s.feature_names.as_deref(),
            ScalerArtifact::MinMax(s) => s.feature_names.as_deref(),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let consistent = match self {
            ScalerArtifact::Standard(s) => s.mean.len() == s.scale.len(),
            ScalerArtifact::MinMax(s) => s.data_min.len() == s.data_max.len(),
        };
        if !consistent {
            return Err("scaler parameter vectors differ in length".to_string());
        }
        if self.n_features() != FEATURES.len() {
            return Err(format!(
                "scaler was fitted on {} features, expected {}",
                self.n_features(),
                FEATURES.len()
            ));
        }
        if let Some(names) = self.feature_names() {
            if names.iter().map(String::as_str).ne(FEATURES.iter().copied()) {
                return Err("scaler feature names do not match the canonical order".to_string());
            }
        }
        Ok(())
    }
}

impl FeatureScaler for ScalerArtifact {
    fn n_features(&self) -> usize {
        match self {
            ScalerArtifact::Standard(s) => s.n_features(),
            ScalerArtifact::MinMax(s) => s.n_features(),
        }
    }

    fn transform(&self, x: &DenseMatrix<f64>) -> Result<DenseMatrix<f64>> {
        match self {
            ScalerArtifact::Standard(s) => s.transform(x),
            ScalerArtifact::MinMax(s) => s.transform(x),
        }
    }
}

// ---- classifiers ----

/// smartcore KNN over label codes (`0` Low, `1` High).
pub type SmartKnn = KNNClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>, Euclidian<f64>>;

/// k-nearest-neighbour vote over scaled training points, uniform weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighbourVote {
    pub k: usize,
    pub points: Vec<Vec<f64>>,
    pub labels: Vec<RiskLabel>,
}

impl NeighbourVote {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.k == 0 {
            return Err("k must be at least 1".to_string());
        }
        if self.points.is_empty() || self.points.len() != self.labels.len() {
            return Err(format!(
                "{} training points for {} labels",
                self.points.len(),
                self.labels.len()
            ));
        }
        if self.points.iter().any(|p| p.len() != FEATURES.len()) {
            return Err(format!("training points must have {} features", FEATURES.len()));
        }
        Ok(())
    }

    fn vote(&self, row: &[f64]) -> ClassProbabilities {
        let mut neighbours: Vec<(f64, RiskLabel)> = self
            .points
            .iter()
            .zip(&self.labels)
            .map(|(point, label)| {
                let d2: f64 = point.iter().zip(row).map(|(a, b)| (a - b) * (a - b)).sum();
                (d2, *label)
            })
            .collect();
        // stable: equal distances keep training order
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0));

        let k = self.k.min(neighbours.len());
        let high = neighbours[..k]
            .iter()
            .filter(|(_, label)| *label == RiskLabel::High)
            .count();
        let high = high as f64 / k as f64;
        ClassProbabilities {
            low: 1.0 - high,
            high,
        }
    }

    fn votes(&self, x: &DenseMatrix<f64>) -> Result<Vec<ClassProbabilities>> {
        check_width(x, FEATURES.len())?;
        Ok(matrix_rows(x).iter().map(|row| self.vote(row)).collect())
    }
}

impl RiskClassifier for NeighbourVote {
    fn predict(&self, x: &DenseMatrix<f64>) -> Result<Vec<RiskLabel>> {
        Ok(self
            .votes(x)?
            .into_iter()
            // argmax, first class on a tie
            .map(|p| if p.high > p.low { RiskLabel::High } else { RiskLabel::Low })
            .collect())
    }

    fn predict_proba(&self, x: &DenseMatrix<f64>) -> Result<Option<Vec<ClassProbabilities>>> {
        self.votes(x).map(Some)
    }
}

impl RiskClassifier for SmartKnn {
    fn predict(&self, x: &DenseMatrix<f64>) -> Result<Vec<RiskLabel>> {
        let codes = KNNClassifier::predict(self, x)?;
        codes
            .into_iter()
            .map(|code| {
                RiskLabel::from_code(code)
                    .ok_or_else(|| DashboardError::inference(format!("unknown class code {}", code)))
            })
            .collect()
    }

    fn predict_proba(&self, _x: &DenseMatrix<f64>) -> Result<Option<Vec<ClassProbabilities>>> {
        Ok(None)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierArtifact {
    Knn { model: SmartKnn },
    NeighbourVote(NeighbourVote),
}

impl ClassifierArtifact {
    pub fn supports_proba(&self) -> bool {
        matches!(self, ClassifierArtifact::NeighbourVote(_))
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            ClassifierArtifact::Knn { .. } => Ok(()),
            ClassifierArtifact::NeighbourVote(vote) => vote.validate(),
        }
    }
}

impl RiskClassifier for ClassifierArtifact {
    fn predict(&self, x: &DenseMatrix<f64>) -> Result<Vec<RiskLabel>> {
        match self {
            ClassifierArtifact::Knn { model } => RiskClassifier::predict(model, x),
            ClassifierArtifact::NeighbourVote(vote) => vote.predict(x),
        }
    }

    fn predict_proba(&self, x: &DenseMatrix<f64>) -> Result<Option<Vec<ClassProbabilities>>> {
        match self {
            ClassifierArtifact::Knn { model } => RiskClassifier::predict_proba(model, x),
            ClassifierArtifact::NeighbourVote(vote) => vote.predict_proba(x),
        }
    }
}

pub struct ModelArtifacts {
    pub scaler: ScalerArtifact,
    pub classifier: ClassifierArtifact,
}

async fn read_artifact<T, F>(path: &Path, validate: F) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    F: Fn(&T) -> std::result::Result<(), String>,
{
    let load_error = |reason: String| DashboardError::ArtifactLoad {
        path: path.to_path_buf(),
        reason,
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| load_error(e.to_string()))?;
    let artifact: T = serde_json::from_str(&text).map_err(|e| load_error(e.to_string()))?;
    validate(&artifact).map_err(load_error)?;
    debug!("read artifact {:?} ({} bytes)", path, text.len());
    Ok(artifact)
}

pub async fn load_artifacts<P: AsRef<Path>, Q: AsRef<Path>>(
    scaler_path: P,
    model_path: Q,
) -> Result<ModelArtifacts> {
    let scaler: ScalerArtifact = read_artifact(scaler_path.as_ref(), ScalerArtifact::validate).await?;
    let classifier: ClassifierArtifact =
        read_artifact(model_path.as_ref(), ClassifierArtifact::validate).await?;
    info!(
        "loaded scaler ({} features) and classifier (probabilities: {})",
        scaler.n_features(),
        classifier.supports_proba()
    );
    Ok(ModelArtifacts { scaler, classifier })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use smartcore::neighbors::knn_classifier::KNNClassifierParameters;
    use tempfile::TempDir;

    pub fn identity_scaler() -> ScalerArtifact {
        ScalerArtifact::Standard(StandardScaler {
            mean: vec![0.0; FEATURES.len()],
            scale: vec![1.0; FEATURES.len()],
            feature_names: None,
        })
    }

    fn point(v: f64) -> Vec<f64> {
        vec![v; FEATURES.len()]
    }

    /// Points at 0 and 1 are Low, points at 10 and 11 are High.
    pub fn vote_classifier(k: usize) -> NeighbourVote {
        NeighbourVote {
            k,
            points: vec![point(0.0), point(1.0), point(10.0), point(11.0)],
            labels: vec![RiskLabel::Low, RiskLabel::Low, RiskLabel::High, RiskLabel::High],
        }
    }

    pub fn smart_knn() -> SmartKnn {
        let rows = vec![point(0.0), point(1.0), point(10.0), point(11.0)];
        let x = matrix_from_rows(&rows, FEATURES.len());
        let y: Vec<i32> = vec![0, 0, 1, 1];
        KNNClassifier::fit(&x, &y, KNNClassifierParameters::default().with_k(1)).unwrap()
    }

    #[test]
    fn standard_scaler_centres_and_scales() {
        let mut mean = vec![0.0; FEATURES.len()];
        let mut scale = vec![1.0; FEATURES.len()];
        mean[0] = 10.0;
        scale[0] = 2.0;
        scale[1] = 0.0;
        let scaler = StandardScaler { mean, scale, feature_names: None };

        let x = matrix_from_rows(&[point(14.0)], FEATURES.len());
        let out = matrix_rows(&scaler.transform(&x).unwrap());
        assert_eq!(out[0][0], 2.0);
        assert_eq!(out[0][1], 14.0);
    }

    #[test]
    fn scaler_rejects_wrong_width() {
        let x = matrix_from_rows(&[vec![1.0; 11]], 11);
        let err = identity_scaler().transform(&x).unwrap_err();
        assert!(matches!(err, DashboardError::Inference { .. }));
    }

    #[test]
    fn min_max_maps_fitted_range_to_unit_interval() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0], vec![2.0, 5.0]];
        let scaler = MinMaxScaler {
            data_min: vec![1.0, 5.0],
            data_max: vec![3.0, 5.0],
            feature_names: None,
        };
        let out = matrix_rows(&scaler.transform(&matrix_from_rows(&rows, 2)).unwrap());
        assert_eq!(out, vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.5, 0.0]]);
    }

    #[test]
    fn neighbour_vote_reports_fractions() {
        let model = vote_classifier(3);
        let x = matrix_from_rows(&[point(0.4), point(10.6)], FEATURES.len());

        let probs = model.predict_proba(&x).unwrap().unwrap();
        assert!((probs[0].low - 2.0 / 3.0).abs() < 1e-12);
        assert!((probs[1].high - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(model.predict(&x).unwrap(), vec![RiskLabel::Low, RiskLabel::High]);
    }

    #[test]
    fn neighbour_vote_tie_goes_to_low() {
        let model = vote_classifier(4);
        let x = matrix_from_rows(&[point(10.6)], FEATURES.len());
        assert_eq!(model.predict(&x).unwrap(), vec![RiskLabel::Low]);
    }

    #[test]
    fn smartcore_knn_has_no_probabilities() {
        let model = smart_knn();
        let x = matrix_from_rows(&[point(0.2), point(10.8)], FEATURES.len());
        assert_eq!(
            RiskClassifier::predict(&model, &x).unwrap(),
            vec![RiskLabel::Low, RiskLabel::High]
        );
        assert!(RiskClassifier::predict_proba(&model, &x).unwrap().is_none());
    }

    fn write_json<T: Serialize>(dir: &TempDir, name: &str, value: &T) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn artifacts_load_from_json() {
        let tmp = TempDir::new().unwrap();
        let scaler = write_json(&tmp, "scaler.json", &identity_scaler());
        let model = write_json(
            &tmp,
            "model.json",
            &ClassifierArtifact::Knn { model: smart_knn() },
        );

        let artifacts = load_artifacts(&scaler, &model).await.unwrap();
        assert_eq!(artifacts.scaler, identity_scaler());
        assert!(!artifacts.classifier.supports_proba());

        let model = write_json(
            &tmp,
            "vote.json",
            &ClassifierArtifact::NeighbourVote(vote_classifier(3)),
        );
        let artifacts = load_artifacts(&scaler, &model).await.unwrap();
        assert!(artifacts.classifier.supports_proba());
    }

    #[tokio::test]
    async fn feature_names_must_follow_canonical_order() {
        let tmp = TempDir::new().unwrap();
        let mut names: Vec<String> = FEATURES.iter().map(|f| f.to_string()).collect();
        names.swap(0, 1);
        let scaler = write_json(
            &tmp,
            "scaler.json",
            &ScalerArtifact::Standard(StandardScaler {
                mean: vec![0.0; FEATURES.len()],
                scale: vec![1.0; FEATURES.len()],
                feature_names: Some(names),
            }),
        );
        let model = write_json(&tmp, "model.json", &ClassifierArtifact::NeighbourVote(vote_classifier(1)));

        let err = load_artifacts(&scaler, &model).await.err().unwrap();
        assert!(matches!(err, DashboardError::ArtifactLoad { .. }));
    }

    #[tokio::test]
    async fn corrupt_or_missing_artifacts_fail_to_load() {
        let tmp = TempDir::new().unwrap();
        let scaler = write_json(&tmp, "scaler.json", &identity_scaler());
        let corrupt = tmp.path().join("model.json");
        std::fs::write(&corrupt, "\u{80}not json").unwrap();

        let err = load_artifacts(&scaler, &corrupt).await.err().unwrap();
        assert!(matches!(err, DashboardError::ArtifactLoad { ref path, .. } if path == &corrupt));

        let err = load_artifacts(tmp.path().join("absent.json"), &corrupt).await.err().unwrap();
        assert!(matches!(err, DashboardError::ArtifactLoad { .. }));
    }
}
