//! Charts for the input regions, drawn with plotters onto SVG: the
//! probability-of-High bars and one factor heatmap per region.

use std::path::Path;

use num::{Num, NumCast};
use plotters::prelude::*;
use plotters_svg::SVGBackend;
use polars::prelude::*;

use crate::dataset::numeric_values;
use crate::error::{DashboardError, Result};
use crate::form::{inputs_to_frame, InputRow};
use crate::inference::PredictionRow;
use crate::records::{FEATURES, REGION_COLUMN};

const BAR_SIZE: (u32, u32) = (800, 450);
const PANEL_SIZE: (u32, u32) = (560, 280);
const PANELS_PER_ROW: usize = 2;

const BAR_CHART: &str = "probability chart";
const HEATMAPS: &str = "heatmaps";

fn lerp(a: [f64; 3], b: [f64; 3], t: f64) -> RGBColor {
    let channel = |i: usize| (a[i] + (b[i] - a[i]) * t).round() as u8;
    RGBColor(channel(0), channel(1), channel(2))
}

/// Light to dark red, for probability bars.
fn reds(t: f64) -> RGBColor {
    lerp([254.0, 224.0, 210.0], [165.0, 15.0, 21.0], t.clamp(0.0, 1.0))
}

/// Diverging blue-grey-red, for normalized values in [0, 1].
fn coolwarm(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let (cold, mid, warm) = ([59.0, 76.0, 192.0], [221.0, 221.0, 221.0], [180.0, 4.0, 38.0]);
    if t < 0.5 {
        lerp(cold, mid, t * 2.0)
    } else {
        lerp(mid, warm, (t - 0.5) * 2.0)
    }
}

/// Rescales a column to [0, 1]; a constant column maps to 0.
pub fn min_max_scale<T>(column: Series) -> PolarsResult<Series>
where
    T: Num + NumCast + Copy + PartialOrd,
{
    let name = column.name().to_string();
    let (min, max) = match (column.min::<T>(), column.max::<T>()) {
        (Some(min), Some(max)) => (min, max),
        _ => return Ok(Series::new(&name, vec![0.0f64; column.len()])),
    };
    let range = max - min;
    if range == T::zero() {
        return Ok(Series::new(&name, vec![0.0f64; column.len()]));
    }
    let mut scaled = (column - min) / range;
    scaled.rename(&name);
    Ok(scaled)
}

/// Input features coerced to numbers (missing as 0) and min-max normalized per feature.
pub fn normalize_inputs(rows: &[InputRow]) -> PolarsResult<DataFrame> {
    let coerced = inputs_to_frame(rows)?
        .lazy()
        .with_columns(
            FEATURES
                .iter()
                .map(|f| col(f).cast(DataType::Float64).fill_null(lit(0.0)))
                .collect::<Vec<_>>(),
        )
        .collect()?;

    let mut columns = vec![coerced.column(REGION_COLUMN)?.clone()];
    for feature in FEATURES {
        columns.push(min_max_scale::<f64>(coerced.column(feature)?.clone())?);
    }
    DataFrame::new(columns)
}

/// One `(region, normalized values)` pair per input row, features in canonical order.
pub fn heatmap_rows(normalized: &DataFrame) -> Result<Vec<(String, Vec<f64>)>> {
    let regions = normalized.column(REGION_COLUMN)?.utf8()?;
    let features: Vec<Vec<Option<f64>>> = FEATURES
        .iter()
        .map(|f| numeric_values(normalized, f))
        .collect::<Result<_>>()?;

    Ok(regions
        .into_iter()
        .enumerate()
        .map(|(i, region)| {
            let values = features.iter().map(|column| column[i].unwrap_or(0.0)).collect();
            (region.unwrap_or("-").to_string(), values)
        })
        .collect())
}

pub fn bar_chart_svg(predictions: &[PredictionRow]) -> Result<String> {
    let err = |e| DashboardError::chart(BAR_CHART, e);
    let labels: Vec<&str> = predictions.iter().map(|p| p.region()).collect();
    let n = labels.len().max(1);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, BAR_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Probability of high stunting risk", ("sans-serif", 18))
            .margin(20)
            .x_label_area_size(120)
            .y_label_area_size(50)
            .build_cartesian_2d((0..n).into_segmented(), 0f64..1f64)
            .map_err(err)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(n + 1)
            .x_label_formatter(&|x| match x {
                SegmentValue::CenterOf(i) if *i < labels.len() => labels[*i].to_string(),
                _ => String::new(),
            })
            .x_label_style(("sans-serif", 12).into_font().transform(FontTransform::Rotate90))
            .y_desc("P(high)")
            .draw()
            .map_err(err)?;

        chart
            .draw_series(predictions.iter().enumerate().filter_map(|(i, p)| {
                let prob = p.probability_high?;
                let mut bar = Rectangle::new(
                    [
                        (SegmentValue::Exact(i), 0.0),
                        (SegmentValue::Exact(i + 1), prob.clamp(0.0, 1.0)),
                    ],
                    reds(prob).filled(),
                );
                bar.set_margin(0, 0, 6, 6);
                Some(bar)
            }))
            .map_err(err)?;

        // no probability output: the slot gets a marker instead of a bar
        chart
            .draw_series(
                predictions
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.probability_high.is_none())
                    .map(|(i, _)| {
                        Text::new(
                            "n/a",
                            (SegmentValue::CenterOf(i), 0.05),
                            ("sans-serif", 12).into_font().color(&RGBColor(136, 136, 136)),
                        )
                    }),
            )
            .map_err(err)?;

        root.present().map_err(err)?;
    }
    Ok(svg)
}

/// One single-row heatmap per input region, laid out two per row.
pub fn heatmaps_svg(data: &[(String, Vec<f64>)]) -> Result<String> {
    let err = |e| DashboardError::chart(HEATMAPS, e);
    let n_rows = ((data.len() + PANELS_PER_ROW - 1) / PANELS_PER_ROW).max(1);
    let size = (
        PANEL_SIZE.0 * PANELS_PER_ROW as u32,
        PANEL_SIZE.1 * n_rows as u32,
    );

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        root.fill(&WHITE).map_err(err)?;

        for (panel, (region, values)) in root.split_evenly((n_rows, PANELS_PER_ROW)).iter().zip(data) {
            let mut chart = ChartBuilder::on(panel)
                .caption(region, ("sans-serif", 14))
                .margin(10)
                .x_label_area_size(150)
                .build_cartesian_2d((0..FEATURES.len()).into_segmented(), 0f64..1f64)
                .map_err(err)?;

            chart
                .configure_mesh()
                .disable_mesh()
                .disable_y_axis()
                .x_labels(FEATURES.len() + 1)
                .x_label_formatter(&|x| match x {
                    SegmentValue::CenterOf(j) if *j < FEATURES.len() => FEATURES[*j].to_string(),
                    _ => String::new(),
                })
                .x_label_style(("sans-serif", 9).into_font().transform(FontTransform::Rotate90))
                .draw()
                .map_err(err)?;

            chart
                .draw_series(values.iter().enumerate().map(|(j, v)| {
                    Rectangle::new(
                        [(SegmentValue::Exact(j), 0.0), (SegmentValue::Exact(j + 1), 1.0)],
                        coolwarm(*v).filled(),
                    )
                }))
                .map_err(err)?;

            chart
                .draw_series(values.iter().enumerate().map(|(j, v)| {
                    let text = if (0.2..0.8).contains(v) { BLACK } else { WHITE };
                    Text::new(
                        format!("{:.2}", v),
                        (SegmentValue::CenterOf(j), 0.5),
                        ("sans-serif", 10).into_font().color(&text),
                    )
                }))
                .map_err(err)?;
        }

        root.present().map_err(err)?;
    }
    Ok(svg)
}

pub async fn write_svg(path: &Path, svg: &str) -> Result<()> {
    tokio::fs::write(path, svg).await?;
    Ok(())
}
