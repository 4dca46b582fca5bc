use reqwest::Client;
use tracing::warn;

use crate::{
    error::ProxyError,
    provider::{endpoint, truncate_body},
};

pub const MAPS_BASE_URL: &str = "https://maps.googleapis.com";
const MAPS_LIBRARIES: &str = "drawing,geometry";

/// Fetches the maps JavaScript loader with the server-held key so the key
/// never reaches the browser's own requests.
#[derive(Debug, Clone)]
pub struct MapsLoader {
    api_key: Option<String>,
    base_url: String,
    http: Client,
}

impl MapsLoader {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: MAPS_BASE_URL.to_string(),
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

    pub async fn load_script(&self) -> Result<String, ProxyError> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            ProxyError::Misconfigured(
                "GOOGLE_MAPS_API_KEY is not configured on the server.".to_string(),
            )
        })?;

        let res = self
            .http
            .get(endpoint(&self.base_url, "/maps/api/js"))
            .query(&[("key", key), ("libraries", MAPS_LIBRARIES), ("v", "weekly")])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            warn!(
                "Maps loader request failed with status {}: {}",
                status,
                truncate_body(&body)
            );
            return Err(ProxyError::upstream(status, "Failed to load Google Maps"));
        }

        Ok(body)
    }
}
