//! Coordinates of the seventeen regencies and cities of Southeast Sulawesi.

use lazy_static::lazy_static;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionCoord {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

const COORDINATES: [(&str, f64, f64); 17] = [
    ("Kendari", -3.9747, 122.5142),
    ("Baubau", -5.5063, 122.5853),
    ("Konawe", -3.9593, 119.2208),
    ("Konawe Selatan", -4.4146, 121.7233),
    ("Konawe Kepulauan", -4.1857, 122.9530),
    ("Konawe Utara", -3.3892, 121.7925),
    ("Buton", -5.0698, 123.1726),
    ("Buton Selatan", -5.4796, 121.7004),
    ("Buton Utara", -4.6972, 122.6704),
    ("Buton Tengah", -5.4597, 122.1188),
    ("Muna", -5.0298, 122.2386),
    ("Muna Barat", -4.7962, 122.4933),
    ("Kolaka", -4.2388, 121.4245),
    ("Kolaka Utara", -3.2409, 120.5916),
    ("Kolaka Timur", -3.6776, 120.8802),
    ("Bombana", -4.8943, 121.4091),
    ("Wakatobi", -5.7602, 123.7304),
];

lazy_static! {
    static ref REGION_COORDS: Vec<RegionCoord> = COORDINATES
        .iter()
        .map(|&(name, latitude, longitude)| RegionCoord { name, latitude, longitude })
        .collect();
}

/// The fixed coordinate table, built once per process.
pub fn region_coords() -> &'static [RegionCoord] {
    &REGION_COORDS
}

pub fn region_names() -> impl Iterator<Item = &'static str> {
    region_coords().iter().map(|r| r.name)
}

pub fn is_known_region(name: &str) -> bool {
    region_names().any(|r| r == name)
}

/// Mean latitude and longitude, used as the map centre.
pub fn centre() -> (f64, f64) {
    let coords = region_coords();
    let n = coords.len() as f64;
    let lat = coords.iter().map(|r| r.latitude).sum::<f64>() / n;
    let lon = coords.iter().map(|r| r.longitude).sum::<f64>() / n;
    (lat, lon)
}
