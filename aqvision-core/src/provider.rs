use crate::{
    Config,
    error::ProxyError,
    model::{GroundQuery, GroundSummary, InsightRequest, InsightResponse, LocationQuery},
    provider::{
        maps::MapsLoader, openai::OpenAiProvider, openaq::OpenAqProvider,
        openweather::OpenWeatherProvider,
    },
};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};
use tracing::warn;

pub mod maps;
pub mod openai;
pub mod openaq;
pub mod openweather;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenAq,
    OpenWeather,
    OpenAi,
    GoogleMaps,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAq => "openaq",
            ProviderId::OpenWeather => "openweather",
            ProviderId::OpenAi => "openai",
            ProviderId::GoogleMaps => "googlemaps",
        }
    }

    /// Environment variable that overrides this provider's API key.
    pub fn env_key(&self) -> &'static str {
        match self {
            ProviderId::OpenAq => "OPENAQ_API_KEY",
            ProviderId::OpenWeather => "OPENWEATHER_API_KEY",
            ProviderId::OpenAi => "OPENAI_API_KEY",
            ProviderId::GoogleMaps => "GOOGLE_MAPS_API_KEY",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[
            ProviderId::OpenAq,
            ProviderId::OpenWeather,
            ProviderId::OpenAi,
            ProviderId::GoogleMaps,
        ]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openaq" => Ok(ProviderId::OpenAq),
            "openweather" => Ok(ProviderId::OpenWeather),
            "openai" => Ok(ProviderId::OpenAi),
            "googlemaps" | "maps" => Ok(ProviderId::GoogleMaps),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openaq, openweather, openai, googlemaps."
            )),
        }
    }
}

/// Ground-sensor measurements around a point.
#[async_trait]
pub trait GroundSensorProvider: Send + Sync + Debug {
    async fn ground_measurements(&self, query: &GroundQuery) -> Result<GroundSummary, ProxyError>;
}

/// Air-pollution components and current weather, passed through as JSON.
#[async_trait]
pub trait ConditionsProvider: Send + Sync + Debug {
    async fn air_pollution(&self, location: &LocationQuery) -> Result<Value, ProxyError>;

    async fn current_weather(&self, location: &LocationQuery) -> Result<Value, ProxyError>;
}

/// Chat-completion language model.
#[async_trait]
pub trait ChatProvider: Send + Sync + Debug {
    async fn complete(&self, request: &InsightRequest) -> Result<InsightResponse, ProxyError>;
}

/// Everything the proxy talks to, built once from [`Config`].
#[derive(Debug, Clone)]
pub struct Providers {
    pub ground: Arc<dyn GroundSensorProvider>,
    pub conditions: Arc<dyn ConditionsProvider>,
    /// `None` when no model credential is configured.
    pub chat: Option<Arc<dyn ChatProvider>>,
    pub maps: MapsLoader,
}

/// Construct every upstream provider from config. Missing credentials only
/// disable the component that needs them.
pub fn providers_from_config(config: &Config) -> anyhow::Result<Providers> {
    let http = http_client(config.upstream_timeout())?;

    let mut ground = OpenAqProvider::new(
        config.provider_api_key(ProviderId::OpenAq).map(str::to_owned),
    )
    .with_client(http.clone());
    if let Some(url) = config.provider_base_url(ProviderId::OpenAq) {
        ground = ground.with_base_url(url);
    }

    let weather_key = config.provider_api_key(ProviderId::OpenWeather);
    if weather_key.is_none() {
        warn!("No OpenWeather API key configured; weather and pollution calls will be rejected upstream");
    }
    let mut conditions =
        OpenWeatherProvider::new(weather_key.map(str::to_owned)).with_client(http.clone());
    if let Some(url) = config.provider_base_url(ProviderId::OpenWeather) {
        conditions = conditions.with_base_url(url);
    }

    let chat = match chat_provider_from_config(config, http.clone()) {
        Ok(chat) => Some(chat),
        Err(err) => {
            warn!("{err}");
            None
        }
    };

    let mut maps = MapsLoader::new(
        config.provider_api_key(ProviderId::GoogleMaps).map(str::to_owned),
    )
    .with_client(http);
    if let Some(url) = config.provider_base_url(ProviderId::GoogleMaps) {
        maps = maps.with_base_url(url);
    }

    Ok(Providers {
        ground: Arc::new(ground),
        conditions: Arc::new(conditions),
        chat,
        maps,
    })
}

/// Construct the chat provider; fails when no model credential is configured.
pub fn chat_provider_from_config(
    config: &Config,
    http: Client,
) -> anyhow::Result<Arc<dyn ChatProvider>> {
    let id = ProviderId::OpenAi;
    let api_key = config.provider_api_key(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'; /api/openai is disabled.\n\
                 Hint: set {} or run `aqvision configure {id}`.",
            id.env_key()
        )
    })?;

    let mut provider =
        OpenAiProvider::new(api_key.to_owned(), config.model.name.clone()).with_client(http);
    if let Some(url) = config.provider_base_url(id) {
        provider = provider.with_base_url(url);
    }

    Ok(Arc::new(provider))
}

pub(crate) fn http_client(timeout: Option<Duration>) -> anyhow::Result<Client> {
    let mut builder = Client::builder().user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context("Failed to build HTTP client")
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
