//! Environment-driven configuration.
//!
//! Every setting has a documented fallback so the worker runs with an
//! empty environment — without a token the geocoding requests simply fail
//! and are recorded like any other failure.

use std::path::PathBuf;

use crate::CandidateStrategy;

/// Runtime configuration for the worker.
#[derive(Debug, Clone)]
pub struct Config {
    /// Mapbox API access token (`MAPBOX_TOKEN`, default empty).
    pub mapbox_token: String,
    /// Directory scanned for pending batch files (`INPUT_DIR`, default
    /// `./data`).
    pub input_dir: PathBuf,
    /// Directory handled files are moved into (`PROCESSED_DIR`, default
    /// `./processed`).
    pub processed_dir: PathBuf,
    /// Directory reprocess files are written to (`REPROCESS_DIR`, default
    /// `./reprocess`).
    pub reprocess_dir: PathBuf,
    /// Log filter (`LOG_LEVEL`, default `info`).
    pub log_level: String,
    /// Candidate strategy (`GEOCODE_STRATEGY`, default `with_fallback`).
    pub strategy: CandidateStrategy,
}

impl Config {
    /// Loads configuration from the process environment, applying the
    /// documented defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let strategy = std::env::var("GEOCODE_STRATEGY")
            .ok()
            .and_then(|value| match value.parse::<CandidateStrategy>() {
                Ok(strategy) => Some(strategy),
                Err(e) => {
                    log::warn!("{e}; using with_fallback");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            mapbox_token: std::env::var("MAPBOX_TOKEN").unwrap_or_default(),
            input_dir: env_path("INPUT_DIR", "./data"),
            processed_dir: env_path("PROCESSED_DIR", "./processed"),
            reprocess_dir: env_path("REPROCESS_DIR", "./reprocess"),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            strategy,
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).map_or_else(|_| PathBuf::from(default), PathBuf::from)
}
