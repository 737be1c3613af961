use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use log::{debug, error, info};
use sysinfo::{get_current_pid, ProcessExt, System, SystemExt};

use crate::artifacts::load_artifacts;
use crate::charts::{bar_chart_svg, heatmap_rows, heatmaps_svg, normalize_inputs, write_svg};
use crate::dataset::load_dataset;
use crate::error::{DashboardError, Result};
use crate::form::{collect_inputs, read_form, FormTemplate};
use crate::inference::{predict_rows, self_check_accuracy, PredictionRow};
use crate::map::{join_predictions, write_geojson, write_map_image, MapRow};
use crate::records::{FieldFormat, FEATURES, REGION_COLUMN};
use crate::regions::region_coords;

pub static DATASET_PATH: &str = "data_cleaned.csv";
pub static SCALER_PATH: &str = "scaler.json";
pub static MODEL_PATH: &str = "model.json";
pub static FORM_PATH: &str = "form.json";
pub static OUTPUT_PATH: &str = "output/";

static MAP_IMAGE_FILE: &str = "map.png";
static MAP_GEOJSON_FILE: &str = "map.geojson";
static BAR_CHART_FILE: &str = "probability_high.svg";
static HEATMAP_FILE: &str = "heatmaps.svg";
static PREDICTIONS_FILE: &str = "predictions.csv";

pub const USAGE_NOTES: [&str; 3] = [
    "Enter plain whole numbers for counts (e.g. 657)",
    "Enter two decimals for percentages and the Perempuan column (e.g. 7.45)",
    "Garis Kemiskinan takes no decimals",
];

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardPaths {
    pub dataset: PathBuf,
    pub scaler: PathBuf,
    pub model: PathBuf,
    pub form: PathBuf,
    pub output: PathBuf,
}

impl Default for DashboardPaths {
    fn default() -> Self {
        DashboardPaths {
            dataset: PathBuf::from(DATASET_PATH),
            scaler: PathBuf::from(SCALER_PATH),
            model: PathBuf::from(MODEL_PATH),
            form: PathBuf::from(FORM_PATH),
            output: PathBuf::from(OUTPUT_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    /// Self-check accuracy, `None` when it could not be computed.
    pub accuracy: Option<f64>,
    pub predictions: Vec<PredictionRow>,
    pub map: Vec<MapRow>,
}

/// Resident memory of this process in bytes, 0 when unavailable.
pub fn monitor_memory() -> u64 {
    let Ok(pid) = get_current_pid() else {
        return 0;
    };
    let mut sys = System::new();
    sys.refresh_process(pid);
    sys.process(pid).map(|p| p.memory()).unwrap_or(0)
}

/// One top-to-bottom pass. Stops at the first fatal error, before anything is rendered.
pub async fn run_pass(paths: &DashboardPaths) -> Result<PassReport> {
    let df = load_dataset(&paths.dataset).await?;
    let artifacts = load_artifacts(&paths.scaler, &paths.model).await?;
    let accuracy = self_check_accuracy(&artifacts.scaler, &artifacts.classifier, &df);

    let template = FormTemplate::from_dataset(&df)?;
    let form = read_form(&paths.form).await?;
    let rows = collect_inputs(&template, &form)?;
    let predictions = predict_rows(&artifacts.scaler, &artifacts.classifier, &rows)?;
    let map = join_predictions(region_coords(), &predictions);

    let report = PassReport {
        accuracy,
        predictions,
        map,
    };
    render(&paths.output, &report).await?;
    Ok(report)
}

async fn render(output: &Path, report: &PassReport) -> Result<()> {
    tokio::fs::create_dir_all(output).await?;

    write_map_image(&output.join(MAP_IMAGE_FILE), &report.map)?;
    write_geojson(&output.join(MAP_GEOJSON_FILE), &report.map).await?;
    write_svg(&output.join(BAR_CHART_FILE), &bar_chart_svg(&report.predictions)?).await?;

    let inputs: Vec<_> = report.predictions.iter().map(|p| p.input.clone()).collect();
    let heatmaps = heatmaps_svg(&heatmap_rows(&normalize_inputs(&inputs)?)?)?;
    write_svg(&output.join(HEATMAP_FILE), &heatmaps).await?;

    write_predictions_csv(&output.join(PREDICTIONS_FILE), &report.predictions)?;
    info!("rendered dashboard into {:?}", output);
    Ok(())
}

fn format_probability(p: Option<f64>) -> String {
    p.map(|v| format!("{:.4}", v)).unwrap_or_default()
}

pub fn write_predictions_csv(path: &Path, predictions: &[PredictionRow]) -> Result<()> {
    let render_error = |e: csv::Error| DashboardError::Render {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut writer = csv::Writer::from_path(path).map_err(render_error)?;

    let mut header = vec!["slot", REGION_COLUMN];
    header.extend(FEATURES);
    header.extend(["probability_high", "probability_low", "predicted_risk"]);
    writer.write_record(&header).map_err(render_error)?;

    for p in predictions {
        let mut record = vec![p.input.slot.to_string(), p.input.region.clone()];
        record.extend(p.input.values.iter().map(|v| v.to_string()));
        record.push(format_probability(p.probability_high));
        record.push(format_probability(p.probability_low));
        record.push(p.label.to_string());
        writer.write_record(&record).map_err(render_error)?;
    }
    writer.flush()?;
    Ok(())
}

/// Console rendering of a finished pass.
pub fn summary_lines(report: &PassReport) -> Vec<String> {
    let mut lines = vec!["Stunting risk prediction for Southeast Sulawesi".to_string()];
    lines.push(match report.accuracy {
        Some(acc) => format!("Model accuracy on historical data: {:.2}%", acc * 100.0),
        None => "Model accuracy on historical data: n/a".to_string(),
    });
    for p in &report.predictions {
        let prob = p
            .probability_high
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "n/a".to_string());
        lines.push(format!(
            "Region {:>2}  {:<18} risk {:<4}  P(high) {}",
            p.input.slot,
            p.region(),
            p.label,
            prob
        ));
    }
    let marked = report.map.iter().filter(|r| r.label.is_some()).count();
    lines.push(format!("{} of {} regions marked on the map", marked, report.map.len()));
    lines.extend(USAGE_NOTES.iter().map(|n| format!("note: {}", n)));
    lines
}

/// Lists the form fields of a slot as shown to the user.
pub fn field_lines(template: &FormTemplate, region: &str) -> Vec<String> {
    template
        .fields
        .iter()
        .map(|f| {
            let kind = match f.format {
                FieldFormat::Integer => "integer",
                FieldFormat::TwoDecimals => "2 decimals",
            };
            format!("{} = {} [{}]", f.label(region), f.default_display(), kind)
        })
        .collect()
}

/// Runs a pass and logs its outcome; a failed pass leaves nothing rendered.
pub async fn run_and_report(paths: &DashboardPaths) -> Result<PassReport> {
    let start_time = Instant::now();
    let start_memory = monitor_memory();

    let outcome = run_pass(paths).await;

    debug!(
        "pass took {:?}, memory delta {} bytes",
        start_time.elapsed(),
        monitor_memory().saturating_sub(start_memory)
    );
    outcome
}

async fn form_stamp(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.and_then(|m| m.modified()).ok()
}

/// Reruns the pass whenever the form file changes, until interrupted.
pub async fn watch(paths: &DashboardPaths, interval: Duration) -> Result<()> {
    watch_until(paths, interval, tokio::signal::ctrl_c()).await
}

/// The `watch` loop, stopping once `stop` completes. `stop` is polled across
/// passes, so a signal raised during a pass is not lost.
pub async fn watch_until<F: Future>(paths: &DashboardPaths, interval: Duration, stop: F) -> Result<()> {
    tokio::pin!(stop);
    let mut last_seen: Option<Option<SystemTime>> = None;
    info!("watching {:?} for changes", paths.form);
    loop {
        let stamp = form_stamp(&paths.form).await;
        if last_seen != Some(stamp) {
            last_seen = Some(stamp);
            match run_and_report(paths).await {
                Ok(report) => {
                    for line in summary_lines(&report) {
                        println!("{}", line);
                    }
                }
                Err(e) => error!("{}", e),
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut stop => {
                info!("interrupted, stopping");
                return Ok(());
            }
        }
    }
}
