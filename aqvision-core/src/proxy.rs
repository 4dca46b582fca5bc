//! Aggregation proxy: a stateless axum server in front of the upstream
//! providers.

use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::{
    Config,
    error::ProxyError,
    fanout,
    model::{GroundQuery, GroundSummary, InsightRequest, InsightResponse, LocationQuery},
    provider::{ChatProvider, Providers, providers_from_config},
};

#[derive(Debug, Clone)]
pub struct AppState {
    pub providers: Providers,
}

impl AppState {
    pub fn new(providers: Providers) -> Self {
        Self { providers }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationParams {
    pub lat: Option<String>,
    pub lon: Option<String>,
}

impl LocationParams {
    fn location(&self) -> Result<LocationQuery, ProxyError> {
        LocationQuery::from_params(self.lat.as_deref(), self.lon.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GroundParams {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub radius: Option<String>,
    pub days: Option<String>,
}

impl GroundParams {
    fn query(&self) -> Result<GroundQuery, ProxyError> {
        let location = LocationQuery::from_params(self.lat.as_deref(), self.lon.as_deref())?;
        let mut query = GroundQuery::new(location);
        if let Some(radius) = self.radius.as_deref() {
            query.radius_meters = parse_count("radius", radius)?;
        }
        if let Some(days) = self.days.as_deref() {
            query.lookback_days = parse_count("days", days)?;
        }
        Ok(query)
    }
}

fn parse_count(name: &str, raw: &str) -> Result<u32, ProxyError> {
    raw.trim().parse::<u32>().map_err(|_| {
        ProxyError::InvalidRequest(format!("{name} must be a non-negative integer, got '{raw}'"))
    })
}

/// Merged answer of the server-side fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub ground: Option<GroundSummary>,
    pub pollution: Value,
    pub weather: Value,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/openaq", get(ground_measurements))
        .route("/api/openweather", get(weather))
        .route("/api/ow-air", get(air_pollution))
        .route("/api/openai", post(completion))
        .route("/api/snapshot", get(snapshot))
        .route("/maps", get(maps_script))
        .route("/healthz", get(health))
        .with_state(state)
}

/// Resolve providers from `config`, bind the configured port and serve until
/// Ctrl-C.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let providers = providers_from_config(config)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("AQ-Vision proxy listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(AppState::new(providers)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Proxy server terminated unexpectedly")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn ground_measurements(
    State(state): State<AppState>,
    Query(params): Query<GroundParams>,
) -> Result<Json<GroundSummary>, ProxyError> {
    let query = params.query()?;
    debug!("ground measurements for {:?}", query);
    let summary = state.providers.ground.ground_measurements(&query).await?;
    Ok(Json(summary))
}

async fn weather(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> Result<Json<Value>, ProxyError> {
    let location = params.location()?;
    let body = state.providers.conditions.current_weather(&location).await?;
    Ok(Json(body))
}

async fn air_pollution(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> Result<Json<Value>, ProxyError> {
    let location = params.location()?;
    let body = state.providers.conditions.air_pollution(&location).await?;
    Ok(Json(body))
}

/// Body is parsed leniently: anything that is not a JSON object with a
/// `prompt` ends up as an empty prompt.
async fn completion(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<InsightResponse>, ProxyError> {
    let request: InsightRequest = serde_json::from_slice(&body).unwrap_or_default();
    let response = generate_insight(state.providers.chat.as_deref(), &request).await?;
    Ok(Json(response))
}

/// Forward a prompt to the model. The credential check comes before prompt
/// validation so a misconfigured server always reports itself.
pub async fn generate_insight(
    chat: Option<&dyn ChatProvider>,
    request: &InsightRequest,
) -> Result<InsightResponse, ProxyError> {
    let chat = chat.ok_or_else(|| {
        ProxyError::Misconfigured("OPENAI_API_KEY is not configured on the server.".to_string())
    })?;

    if request.prompt.is_empty() {
        return Err(ProxyError::InvalidRequest("Prompt is required.".to_string()));
    }

    chat.complete(request).await
}

async fn snapshot(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> Result<Json<Snapshot>, ProxyError> {
    let location = params.location()?;
    let ground_query = GroundQuery::new(location);
    let providers = &state.providers;

    let (ground, pollution, weather) = tokio::join!(
        providers.ground.ground_measurements(&ground_query),
        providers.conditions.air_pollution(&location),
        providers.conditions.current_weather(&location),
    );

    Ok(Json(Snapshot {
        ground: fanout::optional("ground measurements", ground),
        pollution: pollution?,
        weather: weather?,
    }))
}

async fn maps_script(State(state): State<AppState>) -> Response {
    match state.providers.maps.load_script().await {
        Ok(script) => ([(header::CONTENT_TYPE, "application/javascript")], script).into_response(),
        Err(err @ ProxyError::Transport(_)) => {
            error!("{err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error loading Google Maps").into_response()
        }
        Err(err) => {
            error!("{err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load Google Maps").into_response()
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        maps::MapsLoader, openai::OpenAiProvider, openaq::OpenAqProvider,
        openweather::OpenWeatherProvider,
    };
    use httpmock::prelude::*;
    use std::sync::Arc;

    fn state_for(upstream: &MockServer, model_key: Option<&str>) -> AppState {
        let base = upstream.base_url();
        let chat: Option<Arc<dyn ChatProvider>> = model_key.map(|key| {
            Arc::new(
                OpenAiProvider::new(key.to_string(), "gpt-3.5-turbo".to_string())
                    .with_base_url(base.clone()),
            ) as Arc<dyn ChatProvider>
        });

        AppState::new(Providers {
            ground: Arc::new(OpenAqProvider::new(None).with_base_url(base.clone())),
            conditions: Arc::new(
                OpenWeatherProvider::new(Some("OW_KEY".into())).with_base_url(base.clone()),
            ),
            chat,
            maps: MapsLoader::new(None).with_base_url(base),
        })
    }

    async fn spawn(state: AppState) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn pollution_payload() -> Value {
        json!({ "list": [{ "components": { "pm2_5": 31.2, "pm10": 50.0, "no2": 12.0, "o3": 40.0, "so2": 5.5 } }] })
    }

    fn weather_payload() -> Value {
        json!({
            "name": "Bengaluru",
            "sys": { "country": "IN" },
            "weather": [{ "description": "haze" }],
            "main": { "temp": 24.5, "humidity": 60 },
            "wind": { "speed": 3.1, "deg": 250 }
        })
    }

    #[tokio::test]
    async fn data_endpoints_reject_missing_coordinates_without_upstream_calls() {
        let upstream = MockServer::start_async().await;
        let any = upstream
            .mock_async(|when, then| {
                when.method(GET);
                then.status(200).json_body(json!({}));
            })
            .await;
        let base = spawn(state_for(&upstream, None)).await;
        let http = reqwest::Client::new();

        for path in [
            "/api/openaq?lat=12.9",
            "/api/openweather?lon=77.5",
            "/api/ow-air",
            "/api/snapshot?lat=&lon=77.5",
        ] {
            let res = http.get(format!("{base}{path}")).send().await.unwrap();
            assert_eq!(res.status(), 400, "{path}");
            let body: Value = res.json().await.unwrap();
            assert!(body["error"].is_string(), "{path}");
        }

        assert_eq!(any.hits_async().await, 0);
    }

    #[tokio::test]
    async fn ground_endpoint_averages_bengaluru_readings() {
        let upstream = MockServer::start_async().await;
        upstream
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v3/measurements")
                    .query_param("coordinates", "12.9716,77.5946");
                then.status(200).json_body(json!({
                    "meta": null,
                    "results": [
                        { "value": 10.0, "unit": "µg/m³", "location": "A" },
                        { "value": 20.0, "unit": "µg/m³", "location": "B" },
                        { "value": "NaN", "unit": "µg/m³", "location": "C" }
                    ]
                }));
            })
            .await;
        let base = spawn(state_for(&upstream, None)).await;

        let body: Value = reqwest::get(format!("{base}/api/openaq?lat=12.9716&lon=77.5946"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["mean"], json!(15.0));
        assert_eq!(body["values"], json!([10.0, 20.0]));
        assert_eq!(body["raw"].as_array().unwrap().len(), 3);
        assert_eq!(body["raw"][2]["value"], Value::Null);
        assert_eq!(body["meta"], Value::Null);
    }

    #[tokio::test]
    async fn ground_endpoint_rejects_bad_radius() {
        let upstream = MockServer::start_async().await;
        let base = spawn(state_for(&upstream, None)).await;

        let res = reqwest::get(format!("{base}/api/openaq?lat=1&lon=2&radius=far"))
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
    }

    fn window_is_seven_days(req: &HttpMockRequest) -> bool {
        let params = req.query_params.clone().unwrap_or_default();
        let bound = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k == name)
                .and_then(|(_, v)| chrono::DateTime::parse_from_rfc3339(v).ok())
        };
        match (bound("date_from"), bound("date_to")) {
            (Some(from), Some(to)) => to - from == chrono::TimeDelta::days(7),
            _ => false,
        }
    }

    #[tokio::test]
    async fn ground_endpoint_forwards_days_as_window() {
        let upstream = MockServer::start_async().await;
        let m = upstream
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v3/measurements")
                    .query_param("radius", "750")
                    .matches(window_is_seven_days);
                then.status(200).json_body(json!({ "results": [] }));
            })
            .await;
        let base = spawn(state_for(&upstream, None)).await;

        let res = reqwest::get(format!("{base}/api/openaq?lat=1&lon=2&radius=750&days=7"))
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn ground_endpoint_rejects_unrepresentable_days() {
        let upstream = MockServer::start_async().await;
        let any = upstream
            .mock_async(|when, then| {
                when.method(GET);
                then.status(200).json_body(json!({ "results": [] }));
            })
            .await;
        let base = spawn(state_for(&upstream, None)).await;

        let res = reqwest::get(format!("{base}/api/openaq?lat=1&lon=2&days=4000000000"))
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        let body: Value = res.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("days out of range"));
        assert_eq!(any.hits_async().await, 0);
    }

    #[tokio::test]
    async fn upstream_status_codes_are_proxied() {
        let upstream = MockServer::start_async().await;
        upstream
            .mock_async(|when, then| {
                when.method(GET).path("/data/2.5/air_pollution");
                then.status(404).body("nope");
            })
            .await;
        upstream
            .mock_async(|when, then| {
                when.method(GET).path("/data/2.5/weather");
                then.status(429).body("slow down");
            })
            .await;
        upstream
            .mock_async(|when, then| {
                when.method(GET).path("/v3/measurements");
                then.status(502).body("bad gateway");
            })
            .await;
        let base = spawn(state_for(&upstream, None)).await;

        let res = reqwest::get(format!("{base}/api/ow-air?lat=1&lon=2")).await.unwrap();
        assert_eq!(res.status(), 404);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "OpenWeather Air Pollution fetch failed");

        let res = reqwest::get(format!("{base}/api/openweather?lat=1&lon=2")).await.unwrap();
        assert_eq!(res.status(), 429);

        let res = reqwest::get(format!("{base}/api/openaq?lat=1&lon=2")).await.unwrap();
        assert_eq!(res.status(), 502);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "OpenAQ fetch failed");
    }

    #[tokio::test]
    async fn completion_without_credential_is_500() {
        let upstream = MockServer::start_async().await;
        let base = spawn(state_for(&upstream, None)).await;

        let res = reqwest::Client::new()
            .post(format!("{base}/api/openai"))
            .json(&json!({ "prompt": "hello" }))
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), 500);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "OPENAI_API_KEY is not configured on the server.");
    }

    #[tokio::test]
    async fn completion_with_empty_prompt_never_reaches_model() {
        let upstream = MockServer::start_async().await;
        let model = upstream
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;
        let base = spawn(state_for(&upstream, Some("sk-test"))).await;
        let http = reqwest::Client::new();

        for body in [json!({ "prompt": "" }), json!({}), json!({ "systemInstruction": "x" })] {
            let res = http
                .post(format!("{base}/api/openai"))
                .json(&body)
                .send()
                .await
                .unwrap();
            assert_eq!(res.status(), 400);
            let body: Value = res.json().await.unwrap();
            assert_eq!(body["error"], "Prompt is required.");
        }

        let res = http
            .post(format!("{base}/api/openai"))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);

        assert_eq!(model.hits_async().await, 0);
    }

    #[tokio::test]
    async fn completion_forwards_prompt_and_returns_text() {
        let upstream = MockServer::start_async().await;
        let model = upstream
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "Air is moderate." } }]
                }));
            })
            .await;
        let base = spawn(state_for(&upstream, Some("sk-test"))).await;

        let body: Value = reqwest::Client::new()
            .post(format!("{base}/api/openai"))
            .json(&json!({ "prompt": "How is the air?", "systemInstruction": "be brief" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        model.assert_async().await;
        assert_eq!(body, json!({ "text": "Air is moderate." }));
    }

    #[tokio::test]
    async fn completion_upstream_error_keeps_status_and_details() {
        let upstream = MockServer::start_async().await;
        upstream
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(401)
                    .json_body(json!({ "error": { "message": "Incorrect API key provided" } }));
            })
            .await;
        let base = spawn(state_for(&upstream, Some("sk-bad"))).await;

        let res = reqwest::Client::new()
            .post(format!("{base}/api/openai"))
            .json(&json!({ "prompt": "hi" }))
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), 401);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "OpenAI API error");
        assert_eq!(body["details"]["error"]["message"], "Incorrect API key provided");
    }

    #[tokio::test]
    async fn snapshot_degrades_ground_branch_only() {
        let upstream = MockServer::start_async().await;
        upstream
            .mock_async(|when, then| {
                when.method(GET).path("/v3/measurements");
                then.status(500).body("down");
            })
            .await;
        upstream
            .mock_async(|when, then| {
                when.method(GET).path("/data/2.5/air_pollution");
                then.status(200).json_body(pollution_payload());
            })
            .await;
        upstream
            .mock_async(|when, then| {
                when.method(GET).path("/data/2.5/weather");
                then.status(200).json_body(weather_payload());
            })
            .await;
        let base = spawn(state_for(&upstream, None)).await;

        let res = reqwest::get(format!("{base}/api/snapshot?lat=12.9716&lon=77.5946"))
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let snapshot: Snapshot = res.json().await.unwrap();

        assert!(snapshot.ground.is_none());
        assert_eq!(snapshot.pollution, pollution_payload());
        assert_eq!(snapshot.weather, weather_payload());
    }

    #[tokio::test]
    async fn snapshot_propagates_required_branch_failure() {
        let upstream = MockServer::start_async().await;
        upstream
            .mock_async(|when, then| {
                when.method(GET).path("/v3/measurements");
                then.status(200).json_body(json!({ "results": [] }));
            })
            .await;
        upstream
            .mock_async(|when, then| {
                when.method(GET).path("/data/2.5/air_pollution");
                then.status(200).json_body(pollution_payload());
            })
            .await;
        upstream
            .mock_async(|when, then| {
                when.method(GET).path("/data/2.5/weather");
                then.status(401).body("bad key");
            })
            .await;
        let base = spawn(state_for(&upstream, None)).await;

        let res = reqwest::get(format!("{base}/api/snapshot?lat=1&lon=2")).await.unwrap();
        assert_eq!(res.status(), 401);
    }

    #[tokio::test]
    async fn maps_without_key_fails_with_plain_text() {
        let upstream = MockServer::start_async().await;
        let base = spawn(state_for(&upstream, None)).await;

        let res = reqwest::get(format!("{base}/maps")).await.unwrap();
        assert_eq!(res.status(), 500);
        assert_eq!(res.text().await.unwrap(), "Failed to load Google Maps");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let upstream = MockServer::start_async().await;
        let base = spawn(state_for(&upstream, None)).await;

        let body: Value = reqwest::get(format!("{base}/healthz"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }
}
