use anyhow::{Context, bail};
use aqvision_core::{
    Config, InsightClient, InsightKind, InsightOutcome, InsightView, LocationQuery, ProviderId,
    RenderedInsight, insight::render, proxy, zones,
};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{Level, info};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "aqvision", version, about = "AQ-Vision aggregation proxy and insight client")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the aggregation proxy.
    Serve {
        /// Port to listen on; overrides config and `PORT`.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Ask a running proxy for an AI insight about a location.
    Insight {
        /// One of: summary, health, action, cigarette, school, mask.
        kind: InsightKind,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Base URL of the proxy.
        #[arg(long, default_value = "http://localhost:3000")]
        server: String,

        /// Print the HTML fragment instead of plain text.
        #[arg(long)]
        html: bool,
    },

    /// Print the demo zone grid around a location as GeoJSON.
    Zones {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Seed for reproducible cell values.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Store credentials for a specific provider.
    Configure {
        /// Provider short name: openaq, openweather, openai or googlemaps.
        provider: String,
    },

    /// Print the location of the config file.
    ConfigPath,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Serve { port } => {
                let mut config = Config::resolve()?;
                if let Some(port) = port {
                    config.server.port = port;
                }
                proxy::serve(&config).await
            }
            Command::Insight {
                kind,
                lat,
                lon,
                server,
                html,
            } => {
                let center = LocationQuery::new(lat, lon)?;
                let client = InsightClient::new(server).with_center(center);
                let view = TerminalView { html };

                match client.request_insight(kind, &view).await {
                    InsightOutcome::Displayed => Ok(()),
                    InsightOutcome::Failed => bail!("insight request failed"),
                    InsightOutcome::Skipped => bail!("another insight request is already running"),
                }
            }
            Command::Zones { lat, lon, seed } => {
                let center = LocationQuery::new(lat, lon)?;
                let grid = match seed {
                    Some(seed) => zones::generate_seeded(&center, seed),
                    None => zones::generate(&center),
                };
                if let Some(readings) = grid.reference_readings() {
                    info!(
                        "Reference PM2.5 {:.1} µg/m³, US-EPA AQI {:.0} (mock)",
                        readings.pm25, readings.us_epa_aqi
                    );
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(&grid).context("Failed to encode zone grid")?
                );
                Ok(())
            }
            Command::Configure { provider } => configure(&provider),
            Command::ConfigPath => {
                println!("{}", Config::config_file_path()?.display());
                Ok(())
            }
        }
    }
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;

    let api_key = inquire::Password::new(&format!("API key for {id}:"))
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let mut config = Config::load()?;
    config.upsert_provider_api_key(id, api_key.trim().to_string());
    config.save()?;

    println!(
        "Saved {id} credentials to {}",
        Config::config_file_path()?.display()
    );
    Ok(())
}

/// Renders insights to the terminal.
struct TerminalView {
    html: bool,
}

impl InsightView for TerminalView {
    fn show_loading(&self, kind: InsightKind) {
        eprintln!("Generating {kind} insight...");
    }

    fn show_insight(&self, insight: &RenderedInsight) {
        if self.html {
            println!("{}", insight.html);
        } else {
            println!("AI Insight: {}\n\n{}", insight.kind.title(), insight.plain());
        }
    }

    fn show_error(&self, message: &str) {
        if self.html {
            println!("{}", render::error_html(message));
        } else {
            eprintln!("Error generating AI insight: {message}");
        }
    }
}
