//! Insight client: gathers live data from the proxy, asks the proxy's
//! completion endpoint for an insight, and renders the result into a view.

use std::sync::{
    PoisonError, RwLock,
    atomic::{AtomicBool, Ordering},
};

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
    error::InsightError,
    fanout,
    insight::{
        InsightContext, InsightKind, RenderedInsight, build_prompt, pollution_components,
        weather_snapshot,
    },
    model::{InsightResponse, LocationQuery},
    provider::endpoint,
};

/// Where a dashboard starts before the user picks a location (Bengaluru).
pub const DEFAULT_CENTER: LocationQuery = LocationQuery {
    latitude: 12.9716,
    longitude: 77.5946,
};

/// Display region an insight is rendered into.
pub trait InsightView: Send + Sync {
    fn show_loading(&self, _kind: InsightKind) {}

    fn show_insight(&self, insight: &RenderedInsight);

    fn show_error(&self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightOutcome {
    /// Another request was already in flight; nothing happened.
    Skipped,
    Displayed,
    Failed,
}

/// Per-client request state: the single-flight flag and the current center.
#[derive(Debug)]
pub struct ClientState {
    in_flight: AtomicBool,
    center: RwLock<LocationQuery>,
}

/// Holds the single-flight flag; dropping it releases the flag.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl ClientState {
    pub fn new(center: LocationQuery) -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            center: RwLock::new(center),
        }
    }

    /// Claim the flag, or `None` if a request already holds it.
    pub fn try_begin(&self) -> Option<FlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                flag: &self.in_flight,
            })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn center(&self) -> LocationQuery {
        *self.center.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_center(&self, center: LocationQuery) {
        *self.center.write().unwrap_or_else(PoisonError::into_inner) = center;
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new(DEFAULT_CENTER)
    }
}

#[derive(Debug, Deserialize)]
struct GroundMean {
    mean: Option<f64>,
}

#[derive(Debug)]
pub struct InsightClient {
    base_url: String,
    http: Client,
    state: ClientState,
}

impl InsightClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: Client::new(),
            state: ClientState::default(),
        }
    }

    pub fn with_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_center(self, center: LocationQuery) -> Self {
        self.state.set_center(center);
        self
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Produce and display one insight. Returns immediately with
    /// [`InsightOutcome::Skipped`] while another request is in flight.
    pub async fn request_insight(
        &self,
        kind: InsightKind,
        view: &dyn InsightView,
    ) -> InsightOutcome {
        let Some(_guard) = self.state.try_begin() else {
            debug!("Insight request for {kind} ignored: another request is in flight");
            return InsightOutcome::Skipped;
        };

        view.show_loading(kind);

        match self.generate(kind).await {
            Ok(text) => {
                view.show_insight(&RenderedInsight::new(kind, text));
                InsightOutcome::Displayed
            }
            Err(err) => {
                warn!("Insight request for {kind} failed: {err}");
                view.show_error(&err.to_string());
                InsightOutcome::Failed
            }
        }
    }

    /// Gather live data for the current center, build the prompt and return
    /// the model's raw text.
    pub async fn generate(&self, kind: InsightKind) -> Result<String, InsightError> {
        let location = self.state.center();
        info!(
            "Requesting {kind} insight for {},{}",
            location.latitude, location.longitude
        );

        let context = self.gather_context(&location).await?;
        let prompt = build_prompt(&context, kind)?;
        self.complete(&prompt).await
    }

    /// Three concurrent fetches. Pollution and weather are required; the
    /// ground mean degrades to `None`.
    pub async fn gather_context(
        &self,
        location: &LocationQuery,
    ) -> Result<InsightContext, InsightError> {
        let (ground, pollution, weather) = tokio::join!(
            self.fetch_ground_mean(location),
            self.fetch_required("/api/ow-air", location),
            self.fetch_required("/api/openweather", location),
        );

        let ground_mean = fanout::degrade("ground measurements", ground, || None);
        let pollution = pollution?;
        let weather = weather?;

        let components = pollution_components(&pollution)?;
        let snapshot = weather_snapshot(&weather)?;

        Ok(InsightContext::new(ground_mean, &components, &snapshot))
    }

    async fn fetch_ground_mean(
        &self,
        location: &LocationQuery,
    ) -> Result<Option<f64>, InsightError> {
        let res = self
            .http
            .get(endpoint(&self.base_url, "/api/openaq"))
            .query(&coordinates(location))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(InsightError::Unavailable);
        }

        let body: GroundMean = res.json().await?;
        Ok(body.mean)
    }

    async fn fetch_required(
        &self,
        path: &str,
        location: &LocationQuery,
    ) -> Result<Value, InsightError> {
        let res = self
            .http
            .get(endpoint(&self.base_url, path))
            .query(&coordinates(location))
            .send()
            .await?;

        if !res.status().is_success() {
            warn!("{path} answered {}", res.status());
            return Err(InsightError::Unavailable);
        }

        Ok(res.json().await?)
    }

    async fn complete(&self, prompt: &str) -> Result<String, InsightError> {
        let res = self
            .http
            .post(endpoint(&self.base_url, "/api/openai"))
            .json(&json!({ "prompt": prompt }))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(InsightError::Completion {
                status: status.as_u16(),
                message: completion_error_message(status, &body),
            });
        }

        let body: InsightResponse = res.json().await?;
        Ok(body.text)
    }
}

fn coordinates(location: &LocationQuery) -> [(&'static str, f64); 2] {
    [("lat", location.latitude), ("lon", location.longitude)]
}

/// Most specific message available: the model's own error, then the proxy's,
/// then the bare status.
fn completion_error_message(status: reqwest::StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_details = parsed
        .as_ref()
        .and_then(|v| v.pointer("/details/error/message"))
        .and_then(Value::as_str);
    let from_error = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str);

    from_details
        .or(from_error)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("AI server error: {status}"))
}
