use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProxyError;

pub const DEFAULT_RADIUS_METERS: u32 = 5000;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 1;

/// A validated coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationQuery {
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationQuery {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ProxyError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(ProxyError::InvalidRequest(
                "lat,lon must be finite numbers".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ProxyError::InvalidRequest(format!(
                "lat {latitude} is outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ProxyError::InvalidRequest(format!(
                "lon {longitude} is outside [-180, 180]"
            )));
        }
        Ok(Self { latitude, longitude })
    }

    /// Build from raw query-string values. Absent or empty values mean the
    /// caller did not supply a location at all.
    pub fn from_params(lat: Option<&str>, lon: Option<&str>) -> Result<Self, ProxyError> {
        let (lat, lon) = match (non_empty(lat), non_empty(lon)) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return Err(ProxyError::InvalidRequest("lat,lon required".to_string())),
        };

        let latitude = parse_coordinate("lat", lat)?;
        let longitude = parse_coordinate("lon", lon)?;
        Self::new(latitude, longitude)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_coordinate(name: &str, raw: &str) -> Result<f64, ProxyError> {
    raw.parse::<f64>()
        .map_err(|_| ProxyError::InvalidRequest(format!("{name} must be a number, got '{raw}'")))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundQuery {
    pub location: LocationQuery,
    pub radius_meters: u32,
    pub lookback_days: u32,
}

impl GroundQuery {
    pub fn new(location: LocationQuery) -> Self {
        Self {
            location,
            radius_meters: DEFAULT_RADIUS_METERS,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

/// One ground-sensor reading as reported upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundMeasurement {
    pub value: Option<f64>,
    #[serde(rename = "date")]
    pub timestamp_local: Option<String>,
    pub unit: Option<String>,
    #[serde(rename = "location")]
    pub location_name: Option<String>,
}

/// Shaped answer of the ground-measurement endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundSummary {
    pub mean: Option<f64>,
    pub values: Vec<f64>,
    #[serde(default)]
    pub raw: Vec<GroundMeasurement>,
    #[serde(default)]
    pub meta: Option<Value>,
}

impl GroundSummary {
    pub fn from_measurements(raw: Vec<GroundMeasurement>, meta: Option<Value>) -> Self {
        let values: Vec<f64> = raw.iter().filter_map(|m| m.value).collect();
        Self {
            mean: mean(&values),
            values,
            raw,
            meta,
        }
    }
}

/// Arithmetic mean over the finite elements only; `None` if there are none.
pub fn mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 { None } else { Some(sum / count as f64) }
}

/// Interpret an upstream reading the way a lenient JSON consumer would:
/// numbers and numeric strings are accepted, anything non-finite is dropped.
pub fn finite_reading(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollutionComponents {
    pub pm2_5: f64,
    pub pm10: f64,
    pub no2: f64,
    pub o3: f64,
    pub so2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub location_name: String,
    pub country_code: String,
    pub condition_description: String,
    pub temp_c: f64,
    pub humidity_pct: f64,
    pub wind_speed: f64,
    pub wind_direction_deg: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(
        rename = "systemInstruction",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub system_instruction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightResponse {
    pub text: String,
}
