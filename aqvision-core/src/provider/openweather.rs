use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::{
    error::ProxyError,
    model::LocationQuery,
    provider::{ConditionsProvider, endpoint, truncate_body},
};

pub const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org";

/// Current weather and air-pollution components from OpenWeather. Bodies are
/// passed through untouched; shaping happens in the insight client.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: Option<String>,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: OPENWEATHER_BASE_URL.to_string(),
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

    async fn fetch_json(
        &self,
        path: &str,
        location: &LocationQuery,
        extra: &[(&str, &str)],
        failure: &'static str,
    ) -> Result<Value, ProxyError> {
        let lat = location.latitude.to_string();
        let lon = location.longitude.to_string();

        let mut params: Vec<(&str, &str)> = vec![("lat", lat.as_str()), ("lon", lon.as_str())];
        params.extend_from_slice(extra);
        if let Some(key) = &self.api_key {
            params.push(("appid", key.as_str()));
        }

        let res = self
            .http
            .get(endpoint(&self.base_url, path))
            .query(&params)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            warn!(
                "OpenWeather {} request failed with status {}: {}",
                path,
                status,
                truncate_body(&body)
            );
            return Err(ProxyError::upstream(status, failure));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ConditionsProvider for OpenWeatherProvider {
    async fn air_pollution(&self, location: &LocationQuery) -> Result<Value, ProxyError> {
        self.fetch_json(
            "/data/2.5/air_pollution",
            location,
            &[],
            "OpenWeather Air Pollution fetch failed",
        )
        .await
    }

    async fn current_weather(&self, location: &LocationQuery) -> Result<Value, ProxyError> {
        self.fetch_json(
            "/data/2.5/weather",
            location,
            &[("units", "metric")],
            "OpenWeather fetch failed",
        )
        .await
    }
}
