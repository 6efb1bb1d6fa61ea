#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the batch geocoding worker.

use std::path::PathBuf;

use clap::Parser;
use imovel_geo_analytics::RunAnalytics;
use imovel_geo_geocoder::MapboxGeocoder;
use imovel_geo_worker::CandidateStrategy;
use imovel_geo_worker::config::Config;

#[derive(Parser)]
#[command(name = "imovel_geo_worker", about = "Batch geocoder for address record files")]
struct Cli {
    /// Directory scanned for pending batch files (overrides `INPUT_DIR`)
    #[arg(long)]
    input_dir: Option<PathBuf>,
    /// Directory handled files are moved into (overrides `PROCESSED_DIR`)
    #[arg(long)]
    processed_dir: Option<PathBuf>,
    /// Directory reprocess files are written to (overrides `REPROCESS_DIR`)
    #[arg(long)]
    reprocess_dir: Option<PathBuf>,
    /// Candidate strategy: `with_fallback` or `combined_only` (overrides `GEOCODE_STRATEGY`)
    #[arg(long)]
    strategy: Option<CandidateStrategy>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = Config::from_env();

    if let Some(dir) = cli.input_dir {
        config.input_dir = dir;
    }
    if let Some(dir) = cli.processed_dir {
        config.processed_dir = dir;
    }
    if let Some(dir) = cli.reprocess_dir {
        config.reprocess_dir = dir;
    }
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }

    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&config.log_level)
        .init();

    if config.mapbox_token.is_empty() {
        log::warn!("MAPBOX_TOKEN is not set; geocoding requests will fail");
    }

    std::fs::create_dir_all(&config.input_dir)?;
    std::fs::create_dir_all(&config.processed_dir)?;
    std::fs::create_dir_all(&config.reprocess_dir)?;

    let geocoder = MapboxGeocoder::new(config.mapbox_token.clone())?;
    let mut analytics = RunAnalytics::new("geocoding_service");
    analytics.start();

    imovel_geo_worker::run(&config, &geocoder, &mut analytics).await?;

    analytics.finalize();
    Ok(())
}
