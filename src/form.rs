//! The ten-slot input form: region selectors plus twelve numeric fields each,
//! pre-filled with the dataset medians.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::feature_medians;
use crate::error::{DashboardError, Result};
use crate::records::{FieldFormat, StuntingRecord, FEATURES, REGION_COLUMN};
use crate::regions::{is_known_region, region_coords};

pub const SLOT_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub feature: &'static str,
    pub default: f64,
    pub format: FieldFormat,
}

impl FormField {
    pub fn default_display(&self) -> String {
        self.format.display(self.default)
    }

    pub fn label(&self, region: &str) -> String {
        format!("{} ({})", self.feature, region)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormTemplate {
    pub default_region: &'static str,
    pub fields: Vec<FormField>,
}

impl FormTemplate {
    /// `medians` must follow the canonical feature order.
    pub fn from_medians(medians: &[f64]) -> Self {
        let fields = FEATURES
            .iter()
            .zip(medians)
            .map(|(feature, median)| FormField {
                feature: *feature,
                default: *median,
                format: FieldFormat::for_feature(feature),
            })
            .collect();
        FormTemplate {
            default_region: region_coords()[0].name,
            fields,
        }
    }

    pub fn from_dataset(df: &DataFrame) -> Result<Self> {
        Ok(Self::from_medians(&feature_medians(df)?))
    }

    fn default_values(&self) -> [f64; FEATURES.len()] {
        let mut values = [0.0; FEATURES.len()];
        for (value, field) in values.iter_mut().zip(&self.fields) {
            *value = field.default;
        }
        values
    }

    /// The form as first shown: every slot on the default region and medians.
    pub fn default_document(&self) -> FormDocument {
        let slots = (1..=SLOT_COUNT)
            .map(|slot| SlotInput {
                slot,
                region: Some(self.default_region.to_string()),
                values: self
                    .fields
                    .iter()
                    .map(|f| (f.feature.to_string(), FieldValue::Number(f.default)))
                    .collect(),
            })
            .collect();
        FormDocument { slots }
    }
}

/// A raw field value as typed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn coerce(&self) -> Option<f64> {
        let value = match self {
            FieldValue::Number(v) => *v,
            FieldValue::Text(text) => text.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotInput {
    pub slot: usize,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub values: BTreeMap<String, FieldValue>,
}

/// Submitted form. Omitted slots and fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormDocument {
    #[serde(default)]
    pub slots: Vec<SlotInput>,
}

/// One region slot after collection, values in canonical feature order.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRow {
    pub slot: usize,
    pub region: String,
    pub values: [f64; FEATURES.len()],
}

/// Merges `submitted` over the template defaults into exactly ten rows, in slot order.
pub fn collect_inputs(template: &FormTemplate, submitted: &FormDocument) -> Result<Vec<InputRow>> {
    let defaults = template.default_values();
    let mut rows: Vec<InputRow> = (1..=SLOT_COUNT)
        .map(|slot| InputRow {
            slot,
            region: template.default_region.to_string(),
            values: defaults,
        })
        .collect();

    for input in &submitted.slots {
        if !(1..=SLOT_COUNT).contains(&input.slot) {
            return Err(DashboardError::input(format!(
                "slot {} is outside 1..={}",
                input.slot, SLOT_COUNT
            )));
        }
        let row = &mut rows[input.slot - 1];

        if let Some(region) = &input.region {
            if !is_known_region(region) {
                return Err(DashboardError::input(format!(
                    "unknown region {:?} in slot {}",
                    region, input.slot
                )));
            }
            row.region = region.clone();
        }

        for (feature, value) in &input.values {
            let index = StuntingRecord::feature_index(feature).ok_or_else(|| {
                DashboardError::input(format!("unknown field {:?} in slot {}", feature, input.slot))
            })?;
            row.values[index] = value.coerce().ok_or_else(|| {
                DashboardError::inference(format!(
                    "field {:?} in slot {} is not numeric: {:?}",
                    feature, input.slot, value
                ))
            })?;
        }
    }

    debug!("collected {} input rows", rows.len());
    Ok(rows)
}

/// The input table, one row per slot, features in canonical order.
pub fn inputs_to_frame(rows: &[InputRow]) -> PolarsResult<DataFrame> {
    let regions: Vec<&str> = rows.iter().map(|r| r.region.as_str()).collect();
    let mut columns = vec![Series::new(REGION_COLUMN, regions)];
    for (index, feature) in FEATURES.iter().enumerate() {
        let values: Vec<f64> = rows.iter().map(|r| r.values[index]).collect();
        columns.push(Series::new(feature, values));
    }
    DataFrame::new(columns)
}

/// Reads the submitted form; a missing file means nothing was edited yet.
pub async fn read_form<P: AsRef<Path>>(path: P) -> Result<FormDocument> {
    let path = path.as_ref();
    match tokio::fs::read_to_string(path).await {
        Ok(text) => serde_json::from_str(&text)
            .map_err(|e| DashboardError::input(format!("{:?}: {}", path, e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("no form at {:?}, using defaults", path);
            Ok(FormDocument::default())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn write_template<P: AsRef<Path>>(path: P, template: &FormTemplate) -> Result<()> {
    let text = serde_json::to_string_pretty(&template.default_document())?;
    tokio::fs::write(path.as_ref(), text).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_frame;
    use tempfile::TempDir;

    fn template() -> FormTemplate {
        FormTemplate::from_dataset(&sample_frame()).unwrap()
    }

    fn slot(slot: usize, region: Option<&str>, values: &[(&str, FieldValue)]) -> SlotInput {
        SlotInput {
            slot,
            region: region.map(str::to_string),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn defaults_are_dataset_medians() {
        let template = template();
        let medians = feature_medians(&sample_frame()).unwrap();
        let rows = collect_inputs(&template, &FormDocument::default()).unwrap();

        assert_eq!(rows.len(), SLOT_COUNT);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.slot, i + 1);
            assert_eq!(row.region, "Kendari");
            assert_eq!(row.values.to_vec(), medians);
        }
    }

    #[test]
    fn poverty_default_shows_two_decimals_in_first_slot() {
        let template = template();
        let field = &template.fields[3];
        assert_eq!(field.feature, "Persentase Penduduk Miskin");
        assert_eq!(field.format, FieldFormat::TwoDecimals);
        assert_eq!(field.default_display(), "12.34");
        assert_eq!(field.label("Kendari"), "Persentase Penduduk Miskin (Kendari)");

        let first = &collect_inputs(&template, &FormDocument::default()).unwrap()[0];
        assert_eq!(first.region, "Kendari");
        assert_eq!(field.format.display(first.values[3]), "12.34");

        let garis = &template.fields[11];
        assert_eq!(garis.default_display(), format!("{:.0}", garis.default));
    }

    #[test]
    fn submitted_values_override_defaults() {
        let template = template();
        let form = FormDocument {
            slots: vec![
                slot(3, Some("Muna"), &[("wasting", FieldValue::Text(" 7.45 ".into()))]),
                slot(10, None, &[("Garis Kemiskinan", FieldValue::Number(400000.0))]),
            ],
        };
        let rows = collect_inputs(&template, &form).unwrap();

        assert_eq!(rows[2].region, "Muna");
        assert_eq!(rows[2].values[4], 7.45);
        assert_eq!(rows[2].values[0], template.fields[0].default);
        assert_eq!(rows[9].region, "Kendari");
        assert_eq!(rows[9].values[11], 400000.0);
    }

    #[test]
    fn duplicate_regions_are_allowed() {
        let form = FormDocument {
            slots: vec![slot(1, Some("Buton"), &[]), slot(2, Some("Buton"), &[])],
        };
        let rows = collect_inputs(&template(), &form).unwrap();
        assert_eq!(rows[0].region, rows[1].region);
    }

    #[test]
    fn invalid_submissions_are_rejected() {
        let template = template();
        let cases = [
            (slot(11, None, &[]), "slot"),
            (slot(1, Some("Makassar"), &[]), "region"),
            (slot(1, None, &[("Laki-laki", FieldValue::Number(1.0))]), "field"),
        ];
        for (input, what) in cases {
            let err = collect_inputs(&template, &FormDocument { slots: vec![input] }).unwrap_err();
            assert!(matches!(err, DashboardError::Input { .. }), "{what}");
        }

        let form = FormDocument {
            slots: vec![slot(2, None, &[("wasting", FieldValue::Text("tinggi".into()))])],
        };
        let err = collect_inputs(&template, &form).unwrap_err();
        assert!(matches!(err, DashboardError::Inference { .. }));
    }

    #[test]
    fn input_frame_keeps_slot_order() {
        let form = FormDocument {
            slots: vec![slot(4, Some("Wakatobi"), &[])],
        };
        let rows = collect_inputs(&template(), &form).unwrap();
        let df = inputs_to_frame(&rows).unwrap();
        assert_eq!(df.shape(), (10, 13));
        let regions = df.column(REGION_COLUMN).unwrap().utf8().unwrap();
        assert_eq!(regions.get(3), Some("Wakatobi"));
        assert_eq!(regions.get(0), Some("Kendari"));
    }

    #[tokio::test]
    async fn template_file_reads_back_as_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("form.json");
        let template = template();

        assert_eq!(read_form(&path).await.unwrap(), FormDocument::default());

        write_template(&path, &template).await.unwrap();
        let form = read_form(&path).await.unwrap();
        assert_eq!(form.slots.len(), SLOT_COUNT);
        assert_eq!(
            collect_inputs(&template, &form).unwrap(),
            collect_inputs(&template, &FormDocument::default()).unwrap()
        );
    }

    #[tokio::test]
    async fn malformed_form_is_an_input_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("form.json");
        std::fs::write(&path, "{\"slots\": [{\"region\": \"Kendari\"}]}").unwrap();
        let err = read_form(&path).await.unwrap_err();
        assert!(matches!(err, DashboardError::Input { .. }));
    }
}
