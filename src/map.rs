//! Joins predictions onto the region table and draws the risk map.

use std::ops::Range;
use std::path::Path;

use image::RgbImage;
use log::debug;
use plotters::prelude::*;
use plotters::style::Color as _;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{DashboardError, Result};
use crate::inference::PredictionRow;
use crate::records::RiskLabel;
use crate::regions::{centre, RegionCoord};

pub type Color = [u8; 3];

pub const HIGH_COLOR: Color = [255, 0, 0];
pub const LOW_COLOR: Color = [0, 200, 0];
pub const UNMATCHED_COLOR: Color = [200, 200, 200];

const MAP_SIZE: u32 = 800;
/// Marker radius on the ground, in metres.
const MARKER_RADIUS_M: f64 = 7000.0;
const METRES_PER_DEGREE: f64 = 111_320.0;

pub fn risk_color(label: Option<RiskLabel>) -> Color {
    match label {
        Some(RiskLabel::High) => HIGH_COLOR,
        Some(RiskLabel::Low) => LOW_COLOR,
        None => UNMATCHED_COLOR,
    }
}

/// One known region, with the prediction of the slot that selected it, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapRow {
    pub region: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub slot: Option<usize>,
    pub label: Option<RiskLabel>,
    pub probability_high: Option<f64>,
    pub probability_low: Option<f64>,
    pub color: Color,
}

impl MapRow {
    pub fn tooltip(&self) -> String {
        let risk = self.label.map_or("-", RiskLabel::as_str);
        format!("{}\nRisk: {}", self.region, risk)
    }
}

/// Left join of the coordinate table with the predictions on region name.
/// A region picked in several slots takes the values of the last one.
pub fn join_predictions(coords: &[RegionCoord], predictions: &[PredictionRow]) -> Vec<MapRow> {
    coords
        .iter()
        .map(|coord| {
            let matched = predictions.iter().rev().find(|p| p.region() == coord.name);
            let label = matched.map(|p| p.label);
            MapRow {
                region: coord.name,
                latitude: coord.latitude,
                longitude: coord.longitude,
                slot: matched.map(|p| p.input.slot),
                label,
                probability_high: matched.and_then(|p| p.probability_high),
                probability_low: matched.and_then(|p| p.probability_low),
                color: risk_color(label),
            }
        })
        .collect()
}

pub fn to_geojson(rows: &[MapRow]) -> Value {
    let features: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [row.longitude, row.latitude],
                },
                "properties": {
                    "name": row.region,
                    "slot": row.slot,
                    "risk": row.label,
                    "probability_high": row.probability_high,
                    "probability_low": row.probability_low,
                    "color": row.color,
                    "tooltip": row.tooltip(),
                },
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

pub async fn write_geojson(path: &Path, rows: &[MapRow]) -> Result<()> {
    let text = serde_json::to_string_pretty(&to_geojson(rows))?;
    tokio::fs::write(path, text).await?;
    Ok(())
}

/// Square lon/lat window centred on the mean region position.
struct MapExtent {
    longitude: Range<f64>,
    latitude: Range<f64>,
}

impl MapExtent {
    fn fit(rows: &[MapRow]) -> Self {
        let (centre_lat, centre_lon) = centre();
        let half_span = rows
            .iter()
            .map(|r| (r.latitude - centre_lat).abs().max((r.longitude - centre_lon).abs()))
            .fold(0.0_f64, f64::max)
            + 0.5;
        MapExtent {
            longitude: centre_lon - half_span..centre_lon + half_span,
            latitude: centre_lat - half_span..centre_lat + half_span,
        }
    }

    fn marker_radius(&self) -> u32 {
        let pixels_per_degree = MAP_SIZE as f64 / (self.longitude.end - self.longitude.start);
        (MARKER_RADIUS_M / METRES_PER_DEGREE * pixels_per_degree)
            .max(3.0)
            .round() as u32
    }
}

pub fn render_map(rows: &[MapRow]) -> Result<RgbImage> {
    let err = |e| DashboardError::chart("map", e);
    let mut buffer = vec![0u8; (MAP_SIZE * MAP_SIZE * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (MAP_SIZE, MAP_SIZE)).into_drawing_area();
        root.fill(&RGBColor(235, 242, 250)).map_err(err)?;

        let extent = MapExtent::fit(rows);
        let radius = extent.marker_radius();
        let mut chart = ChartBuilder::on(&root)
            .build_cartesian_2d(extent.longitude, extent.latitude)
            .map_err(err)?;

        for row in rows {
            let at = (row.longitude, row.latitude);
            let [r, g, b] = row.color;
            chart
                .draw_series([
                    Circle::new(at, radius + 1, RGBColor(60, 60, 60).filled()),
                    Circle::new(at, radius, RGBColor(r, g, b).filled()),
                ])
                .map_err(err)?;
        }
        root.present().map_err(err)?;
    }
    RgbImage::from_raw(MAP_SIZE, MAP_SIZE, buffer)
        .ok_or_else(|| DashboardError::chart("map", "pixel buffer does not match the canvas"))
}

pub fn write_map_image(path: &Path, rows: &[MapRow]) -> Result<()> {
    render_map(rows)?
        .save(path)
        .map_err(|e| DashboardError::Render {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    debug!("wrote map {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::InputRow;
    use image::Rgb;
    use crate::regions::region_coords;
    use tempfile::TempDir;

    fn prediction(slot: usize, region: &str, label: RiskLabel, high: Option<f64>) -> PredictionRow {
        PredictionRow {
            input: InputRow {
                slot,
                region: region.to_string(),
                values: [1.0; 12],
            },
            label,
            probability_high: high,
            probability_low: high.map(|h| 1.0 - h),
        }
    }

    #[test]
    fn colors_follow_labels() {
        assert_eq!(risk_color(Some(RiskLabel::High)), [255, 0, 0]);
        assert_eq!(risk_color(Some(RiskLabel::Low)), [0, 200, 0]);
        assert_eq!(risk_color(None), [200, 200, 200]);
    }

    #[test]
    fn join_always_yields_every_region() {
        let coords = region_coords();
        let all_kendari: Vec<_> = (1..=10)
            .map(|slot| prediction(slot, "Kendari", RiskLabel::Low, None))
            .collect();
        let rows = join_predictions(coords, &all_kendari);
        assert_eq!(rows.len(), 17);
        assert_eq!(rows.iter().filter(|r| r.label.is_some()).count(), 1);
        assert_eq!(rows[0].color, LOW_COLOR);
        assert!(rows[1..].iter().all(|r| r.color == UNMATCHED_COLOR && r.slot.is_none()));

        assert_eq!(join_predictions(coords, &[]).len(), 17);
    }

    #[test]
    fn last_slot_wins_for_repeated_regions() {
        let predictions = vec![
            prediction(2, "Buton", RiskLabel::Low, Some(0.2)),
            prediction(5, "Muna", RiskLabel::Low, Some(0.1)),
            prediction(7, "Buton", RiskLabel::High, Some(0.9)),
        ];
        let rows = join_predictions(region_coords(), &predictions);
        let buton = rows.iter().find(|r| r.region == "Buton").unwrap();
        assert_eq!(buton.slot, Some(7));
        assert_eq!(buton.label, Some(RiskLabel::High));
        assert_eq!(buton.probability_high, Some(0.9));
        assert_eq!(buton.color, HIGH_COLOR);
        assert_eq!(buton.tooltip(), "Buton\nRisk: High");
    }

    #[test]
    fn geojson_carries_tooltip_properties() {
        let rows = join_predictions(region_coords(), &[prediction(1, "Wakatobi", RiskLabel::High, None)]);
        let doc = to_geojson(&rows);
        let features = doc["features"].as_array().unwrap();
        assert_eq!(features.len(), 17);

        let wakatobi = &features[16];
        assert_eq!(wakatobi["properties"]["name"], "Wakatobi");
        assert_eq!(wakatobi["properties"]["risk"], "High");
        assert!(wakatobi["properties"]["probability_high"].is_null());
        assert_eq!(wakatobi["geometry"]["coordinates"][0], 123.7304);
        assert!(features[0]["properties"]["risk"].is_null());
    }

    #[test]
    fn map_image_marks_regions() {
        let rows = join_predictions(region_coords(), &[prediction(1, "Kendari", RiskLabel::High, None)]);
        let img = render_map(&rows).unwrap();
        assert_eq!(img.dimensions(), (MAP_SIZE, MAP_SIZE));

        let extent = MapExtent::fit(&rows);
        let pixel = |row: &MapRow| {
            let span = extent.longitude.end - extent.longitude.start;
            let x = (row.longitude - extent.longitude.start) / span * MAP_SIZE as f64;
            let y = (extent.latitude.end - row.latitude) / span * MAP_SIZE as f64;
            *img.get_pixel(x as u32, y as u32)
        };
        assert_eq!(pixel(&rows[0]), Rgb(HIGH_COLOR));
        assert_eq!(pixel(&rows[1]), Rgb(UNMATCHED_COLOR));
        assert_eq!(*img.get_pixel(0, 0), Rgb([235, 242, 250]));

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("map.png");
        write_map_image(&path, &rows).unwrap();
        assert!(path.exists());
    }
}
