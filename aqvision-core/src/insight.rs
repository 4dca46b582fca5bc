//! Insight assembly: turn the three data payloads into a prompt for the
//! completion endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::{
    error::InsightError,
    model::{PollutionComponents, WeatherSnapshot},
};

pub mod client;
pub mod render;

pub use client::{ClientState, InsightClient, InsightOutcome, InsightView};
pub use render::RenderedInsight;

pub const PROMPT_PREAMBLE: &str = "Context: You are an AI air quality expert. Analyze the following real-time data and respond to the user's request. Be clear and helpful. Do not repeat the input data in your response.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsightKind {
    Summary,
    Health,
    Action,
    Cigarette,
    School,
    Mask,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::Summary => "summary",
            InsightKind::Health => "health",
            InsightKind::Action => "action",
            InsightKind::Cigarette => "cigarette",
            InsightKind::School => "school",
            InsightKind::Mask => "mask",
        }
    }

    pub const fn all() -> &'static [InsightKind] {
        &[
            InsightKind::Summary,
            InsightKind::Health,
            InsightKind::Action,
            InsightKind::Cigarette,
            InsightKind::School,
            InsightKind::Mask,
        ]
    }

    /// Heading shown above a rendered insight, e.g. "Summary".
    pub fn title(&self) -> String {
        let s = self.as_str();
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            InsightKind::Summary => {
                "Provide a concise 1-2 sentence summary of the current air quality based on this data."
            }
            InsightKind::Health => {
                "As a public health advisor, provide 2-3 bullet points with actionable health recommendations for the general public and sensitive groups."
            }
            InsightKind::Action => {
                "Provide a simple, 3-point personal action plan someone can take today to reduce their exposure to this pollution."
            }
            InsightKind::Cigarette => {
                "Based on the ground sensor PM2.5 value, calculate the cigarette equivalent. Explain the result simply, stating it's a rule-of-thumb comparison where ~22 µg/m³ is like smoking 1 cigarette per day. If sensor data is N/A, say so."
            }
            InsightKind::School => {
                "Act as a school nurse. Based on the data, provide a clear 'Yes', 'Caution', or 'No' for outdoor playtime for school children. Briefly explain why in simple terms."
            }
            InsightKind::Mask => {
                "Provide a specific mask recommendation (e.g., 'No mask needed', 'Consider an N95/FFP2 mask') and give advice on outdoor activity levels based on the PM2.5 value."
            }
        }
    }
}

impl std::fmt::Display for InsightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for InsightKind {
    type Error = InsightError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.trim().to_lowercase();
        InsightKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| InsightError::UnknownKind(value.to_string()))
    }
}

impl FromStr for InsightKind {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InsightKind::try_from(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextLocation {
    pub name: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPollutants {
    pub pm2_5: String,
    pub pm10: String,
    pub no2: String,
    pub o3: String,
    pub so2: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextWeather {
    pub condition: String,
    pub temp: String,
    pub humidity: String,
    pub wind: String,
}

/// Live data as the model sees it. Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightContext {
    pub location: ContextLocation,
    pub ground_sensor_pm25: String,
    pub main_pollutants_micrograms_per_cubic_meter: ContextPollutants,
    pub weather: ContextWeather,
}

impl InsightContext {
    pub fn new(
        ground_mean: Option<f64>,
        pollutants: &PollutionComponents,
        weather: &WeatherSnapshot,
    ) -> Self {
        Self {
            location: ContextLocation {
                name: weather.location_name.clone(),
                country: weather.country_code.clone(),
            },
            ground_sensor_pm25: ground_mean
                .map(|m| format!("{m:.2} µg/m³"))
                .unwrap_or_else(|| "N/A".to_string()),
            main_pollutants_micrograms_per_cubic_meter: ContextPollutants {
                pm2_5: format!("{:.2}", pollutants.pm2_5),
                pm10: format!("{:.2}", pollutants.pm10),
                no2: format!("{:.2}", pollutants.no2),
                o3: format!("{:.2}", pollutants.o3),
                so2: format!("{:.2}", pollutants.so2),
            },
            weather: ContextWeather {
                condition: weather.condition_description.clone(),
                temp: format!("{}°C", weather.temp_c),
                humidity: format!("{}%", weather.humidity_pct),
                wind: format!(
                    "{} m/s from {}°",
                    weather.wind_speed, weather.wind_direction_deg
                ),
            },
        }
    }
}

/// Preamble, serialized context and the kind's instruction, in that order.
pub fn build_prompt(context: &InsightContext, kind: InsightKind) -> Result<String, InsightError> {
    let data = serde_json::to_string(context)?;
    Ok(format!(
        "{PROMPT_PREAMBLE} Live Data: {data} User Request: {}",
        kind.instruction()
    ))
}

#[derive(Debug, Deserialize)]
struct AirEntry {
    components: PollutionComponents,
}

#[derive(Debug, Deserialize)]
struct AirPayload {
    #[serde(default)]
    list: Vec<AirEntry>,
}

/// Components of the first time-series element of an air-pollution payload.
pub fn pollution_components(payload: &Value) -> Result<PollutionComponents, InsightError> {
    let parsed: AirPayload =
        serde_json::from_value(payload.clone()).map_err(|_| InsightError::IncompleteData)?;
    parsed
        .list
        .into_iter()
        .next()
        .map(|entry| entry.components)
        .ok_or(InsightError::IncompleteData)
}

#[derive(Debug, Deserialize)]
struct WxSys {
    country: String,
}

#[derive(Debug, Deserialize)]
struct WxCondition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct WxMain {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct WxWind {
    speed: f64,
    deg: f64,
}

#[derive(Debug, Deserialize)]
struct WxPayload {
    #[serde(default)]
    name: Option<String>,
    sys: WxSys,
    #[serde(default)]
    weather: Vec<WxCondition>,
    main: WxMain,
    wind: WxWind,
}

/// Shape a current-weather payload. A missing or empty location name, or any
/// other absent field, means the payload is incomplete.
pub fn weather_snapshot(payload: &Value) -> Result<WeatherSnapshot, InsightError> {
    let name_present = payload
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|n| !n.is_empty());
    if !name_present {
        return Err(InsightError::IncompleteData);
    }

    let parsed: WxPayload =
        serde_json::from_value(payload.clone()).map_err(|_| InsightError::IncompleteData)?;
    let condition = parsed
        .weather
        .into_iter()
        .next()
        .ok_or(InsightError::IncompleteData)?;

    Ok(WeatherSnapshot {
        location_name: parsed.name.unwrap_or_default(),
        country_code: parsed.sys.country,
        condition_description: condition.description,
        temp_c: parsed.main.temp,
        humidity_pct: parsed.main.humidity,
        wind_speed: parsed.wind.speed,
        wind_direction_deg: parsed.wind.deg,
    })
}
