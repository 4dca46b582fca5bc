//! Demo zone grid for the map overlay. Cell values are synthetic and carry no
//! measurement meaning.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::model::LocationQuery;

pub const GRID_SIZE: usize = 20;
pub const BOX_SIZE_DEG: f64 = 0.4;
pub const ZONE_NAMES: [&str; 5] = [
    "Industrial Area",
    "City Center",
    "Residential North",
    "Greenbelt South",
    "Tech Park East",
];

/// AQI bucket with its overlay color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthySensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn from_aqi(aqi: f64) -> Self {
        if aqi > 300.0 {
            AqiCategory::Hazardous
        } else if aqi > 200.0 {
            AqiCategory::VeryUnhealthy
        } else if aqi > 150.0 {
            AqiCategory::Unhealthy
        } else if aqi > 100.0 {
            AqiCategory::UnhealthySensitive
        } else if aqi > 50.0 {
            AqiCategory::Moderate
        } else {
            AqiCategory::Good
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            AqiCategory::Good => "#4ade80",
            AqiCategory::Moderate => "#facc15",
            AqiCategory::UnhealthySensitive => "#fb923c",
            AqiCategory::Unhealthy => "#f87171",
            AqiCategory::VeryUnhealthy => "#c084fc",
            AqiCategory::Hazardous => "#a16207",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneProperties {
    pub aqi: u32,
    pub zone: String,
    pub category: AqiCategory,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    #[serde(rename = "type")]
    pub kind: String,
    /// One closed ring of `[lng, lat]` pairs.
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: ZoneProperties,
    pub geometry: Polygon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

/// Mock reference readings shown next to the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceReadings {
    pub pm25: f64,
    pub us_epa_aqi: f64,
}

impl FeatureCollection {
    /// PM2.5 derived from the middle cell, and an AQI derived from that.
    pub fn reference_readings(&self) -> Option<ReferenceReadings> {
        let middle = self.features.get(self.features.len() / 2)?;
        let pm25 = f64::from(middle.properties.aqi) * 0.35;
        Some(ReferenceReadings {
            pm25,
            us_epa_aqi: pm25 * 2.5,
        })
    }
}

pub fn generate_zone_grid<R: Rng>(center: &LocationQuery, rng: &mut R) -> FeatureCollection {
    let step = BOX_SIZE_DEG / GRID_SIZE as f64;
    let mut features = Vec::with_capacity(GRID_SIZE * GRID_SIZE);

    for i in 0..GRID_SIZE {
        for j in 0..GRID_SIZE {
            let lng = center.longitude - BOX_SIZE_DEG / 2.0 + j as f64 * step;
            let lat = center.latitude - BOX_SIZE_DEG / 2.0 + i as f64 * step;

            let base = 50.0
                + (i as f64 * 0.5).sin() * 20.0
                + (j as f64 * 0.3).cos() * 30.0
                + rng.random::<f64>() * 20.0;
            let aqi = (base + (lng - center.longitude) * 200.0)
                .clamp(10.0, 350.0)
                .round();
            let category = AqiCategory::from_aqi(aqi);

            features.push(Feature {
                kind: "Feature".to_string(),
                properties: ZoneProperties {
                    aqi: aqi as u32,
                    zone: ZONE_NAMES[(i * GRID_SIZE + j) % ZONE_NAMES.len()].to_string(),
                    category,
                    color: category.color().to_string(),
                },
                geometry: Polygon {
                    kind: "Polygon".to_string(),
                    coordinates: vec![vec![
                        [lng, lat],
                        [lng + step, lat],
                        [lng + step, lat + step],
                        [lng, lat + step],
                        [lng, lat],
                    ]],
                },
            });
        }
    }

    FeatureCollection {
        kind: "FeatureCollection".to_string(),
        features,
    }
}

pub fn generate(center: &LocationQuery) -> FeatureCollection {
    generate_zone_grid(center, &mut rand::rng())
}

/// Reproducible grid, for demos and snapshots.
pub fn generate_seeded(center: &LocationQuery, seed: u64) -> FeatureCollection {
    let mut rng = StdRng::seed_from_u64(seed);
    generate_zone_grid(center, &mut rng)
}
