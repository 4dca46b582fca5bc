use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use reqwest::{Client, header::ACCEPT};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::ProxyError,
    model::{GroundMeasurement, GroundQuery, GroundSummary, finite_reading},
    provider::{GroundSensorProvider, endpoint, truncate_body},
};

pub const OPENAQ_BASE_URL: &str = "https://api.openaq.org";

/// Ground-sensor PM2.5 readings from OpenAQ.
#[derive(Debug, Clone)]
pub struct OpenAqProvider {
    api_key: Option<String>,
    base_url: String,
    http: Client,
}

impl OpenAqProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: OPENAQ_BASE_URL.to_string(),
            http: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    async fn fetch_measurements(
        &self,
        query: &GroundQuery,
        now: DateTime<Utc>,
    ) -> Result<OaqResponse, ProxyError> {
        let url = endpoint(&self.base_url, "/v3/measurements");
        let date_from = window_start(now, query.lookback_days)?;
        let coordinates = format!("{},{}", query.location.latitude, query.location.longitude);

        let mut req = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .query(&[
                ("parameter", "pm25"),
                ("coordinates", coordinates.as_str()),
                ("radius", query.radius_meters.to_string().as_str()),
                ("date_from", iso_millis(date_from).as_str()),
                ("date_to", iso_millis(now).as_str()),
                ("limit", "1000"),
                ("sort", "desc"),
            ]);
        if let Some(key) = &self.api_key {
            req = req.header("X-API-Key", key);
        }

        let res = req.send().await?;
        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            warn!(
                "OpenAQ measurements request failed with status {}: {}",
                status,
                truncate_body(&body)
            );
            return Err(ProxyError::upstream(status, "OpenAQ fetch failed"));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[derive(Debug, Deserialize)]
struct OaqDate {
    local: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaqMeasurement {
    #[serde(default)]
    value: Value,
    #[serde(default)]
    date: Option<OaqDate>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    location: Value,
}

#[derive(Debug, Deserialize)]
struct OaqResponse {
    #[serde(default)]
    results: Vec<OaqMeasurement>,
    #[serde(default)]
    meta: Option<Value>,
}

impl From<OaqMeasurement> for GroundMeasurement {
    fn from(m: OaqMeasurement) -> Self {
        GroundMeasurement {
            value: finite_reading(&m.value),
            timestamp_local: m.date.and_then(|d| d.local),
            unit: m.unit,
            location_name: m.location.as_str().map(str::to_owned),
        }
    }
}

#[async_trait]
impl GroundSensorProvider for OpenAqProvider {
    async fn ground_measurements(&self, query: &GroundQuery) -> Result<GroundSummary, ProxyError> {
        let parsed = self.fetch_measurements(query, Utc::now()).await?;
        debug!("OpenAQ returned {} measurements", parsed.results.len());

        let raw = parsed.results.into_iter().map(GroundMeasurement::from).collect();
        Ok(GroundSummary::from_measurements(raw, parsed.meta))
    }
}

/// `now - days`, or an invalid request when that falls outside chrono's range.
fn window_start(now: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, ProxyError> {
    TimeDelta::try_days(i64::from(days))
        .and_then(|delta| now.checked_sub_signed(delta))
        .ok_or_else(|| ProxyError::InvalidRequest(format!("days out of range: {days}")))
}

fn iso_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
