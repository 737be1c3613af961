use std::fmt;

use polars::prelude::{DataType, Field, Schema};
use serde::{Deserialize, Serialize};

/// Region identifier column, shared by the dataset, the form and the map.
pub const REGION_COLUMN: &str = "Kabupaten_Kota";

/// Label column of the historical dataset.
pub const LABEL_COLUMN: &str = "stunting";

/// The twelve classifier inputs, in the order the scaler was fitted on.
pub const FEATURES: [&str; 12] = [
    "Jumlah Balita Pendek (TB/U)",
    "Jumlah Balita Gizi Buruk (BB/TB : < -3 SD)",
    "Jumlah Balita Gizi Kurang (BB/TB : < -2 sd -3 SD)",
    "Persentase Penduduk Miskin",
    "wasting",
    "Rumah Tangga yang Memiliki Akses Terhadap Sanitasi Layak",
    "Bayi Baru Lahir (Jumlah Mendapat IMD)",
    "Jumlah Balita Yang Diukur Tinggi Badan",
    "Jumlah Balita Yang Ditimbang",
    "Bayi Usia <6 Bulan (Jumlah Diberi ASI Eksklusif)",
    "Perempuan",
    "Garis Kemiskinan",
];

/// Features entered with two decimals; every other feature is a whole number.
pub const DECIMAL_FEATURES: [&str; 5] = [
    "Persentase Penduduk Miskin",
    "wasting",
    "Rumah Tangga yang Memiliki Akses Terhadap Sanitasi Layak",
    "Bayi Usia <6 Bulan (Jumlah Diberi ASI Eksklusif)",
    "Perempuan",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    Integer,
    TwoDecimals,
}

impl FieldFormat {
    pub fn for_feature(feature: &str) -> Self {
        if DECIMAL_FEATURES.contains(&feature) {
            FieldFormat::TwoDecimals
        } else {
            FieldFormat::Integer
        }
    }

    /// Renders a value the way the form field shows it (`%.2f` / `%.0f`).
    pub fn display(&self, value: f64) -> String {
        match self {
            FieldFormat::Integer => format!("{:.0}", value),
            FieldFormat::TwoDecimals => format!("{:.2}", value),
        }
    }
}

/// Stunting risk class. Encoded as `1` (High) and `0` (Low) inside the
/// classifier artifacts, the order of the probability columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLabel {
    #[serde(alias = "Rendah")]
    Low,
    #[serde(alias = "Tinggi")]
    High,
}

impl RiskLabel {
    pub fn code(self) -> i32 {
        match self {
            RiskLabel::Low => 0,
            RiskLabel::High => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(RiskLabel::Low),
            1 => Some(RiskLabel::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLabel::Low => "Low",
            RiskLabel::High => "High",
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

pub struct StuntingRecord {}

impl StuntingRecord {
    /// Target dtypes of the cleaned dataset once column names are trimmed.
    pub fn raw_schema() -> Schema {
        let mut fields = vec![Field::new(REGION_COLUMN, DataType::Utf8)];
        fields.extend(
            FEATURES
                .iter()
                .map(|name| Field::new(name, DataType::Float64)),
        );
        fields.push(Field::new(LABEL_COLUMN, DataType::Float64));
        Schema::from_iter(fields)
    }

    pub fn feature_index(name: &str) -> Option<usize> {
        FEATURES.iter().position(|f| *f == name)
    }
}
