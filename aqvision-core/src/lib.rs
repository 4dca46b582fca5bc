//! Core library for the AQ-Vision dashboard.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Upstream providers (ground sensors, weather & pollution, language model, maps)
//! - The aggregation proxy served to the dashboard
//! - The insight client that turns live data into model prompts
//!
//! It is used by `aqvision-cli`, but can also be embedded in other binaries or services.

pub mod config;
pub mod error;
pub mod fanout;
pub mod insight;
pub mod model;
pub mod provider;
pub mod proxy;
pub mod zones;

pub use config::{Config, ModelConfig, ProviderConfig, ServerConfig};
pub use error::{InsightError, ProxyError};
pub use insight::{InsightClient, InsightKind, InsightOutcome, InsightView, RenderedInsight};
pub use model::{GroundSummary, InsightRequest, InsightResponse, LocationQuery};
pub use provider::{ProviderId, Providers, providers_from_config};
