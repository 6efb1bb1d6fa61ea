#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch worker for geocoding address record files.
//!
//! Reads JSON batch files from an input directory, geocodes every
//! unresolved record through a candidate-fallback strategy, rewrites
//! updated files in place, sets failed records aside in `reprocessar_*`
//! siblings, and moves handled files to a processed directory so the next
//! run starts clean.
//!
//! Failure containment: a bad candidate moves on to the next candidate, a
//! bad record moves on to the next record, a bad file moves on to the next
//! file. Nothing aborts the run.

pub mod config;

use std::fs;
use std::path::{Path, PathBuf};

use imovel_geo_analytics::{ErrorKind, RunAnalytics};
use imovel_geo_geocoder::Geocode;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Errors from batch file handling.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One address record from a batch file.
///
/// The named fields drive geocoding; everything else the file carries is
/// preserved verbatim through `extra` so a rewrite never loses data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Street address, free text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endereco: Option<String>,
    /// Locality (neighborhood or city).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub localidade: Option<String>,
    /// State code (e.g., `"SP"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estado: Option<String>,
    /// Resolved latitude, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Resolved longitude, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// All other fields, preserved on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AddressRecord {
    /// Whether this record already carries usable coordinates and is
    /// exempt from further geocoding attempts.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(
            (self.latitude, self.longitude),
            (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0
        )
    }

    /// Whether all fields required for geocoding are present.
    #[must_use]
    pub const fn has_required_fields(&self) -> bool {
        self.endereco.is_some() && self.localidade.is_some() && self.estado.is_some()
    }
}

/// Ordered list of address candidates tried per record.
///
/// Two deployments of this pipeline existed: one falling back from the
/// combined form to its parts, one only ever querying the combined form.
/// Both are preserved as configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CandidateStrategy {
    /// `"{endereco}, {localidade}"`, then `endereco`, then `localidade`.
    #[default]
    WithFallback,
    /// Only the combined `"{endereco}, {localidade}"` form.
    CombinedOnly,
}

impl CandidateStrategy {
    /// Builds the candidate list for a record, in attempt order.
    #[must_use]
    pub fn candidates(self, endereco: &str, localidade: &str) -> Vec<String> {
        match self {
            Self::WithFallback => vec![
                format!("{endereco}, {localidade}"),
                endereco.to_string(),
                localidade.to_string(),
            ],
            Self::CombinedOnly => vec![format!("{endereco}, {localidade}")],
        }
    }
}

impl std::str::FromStr for CandidateStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "with_fallback" => Ok(Self::WithFallback),
            "combined_only" => Ok(Self::CombinedOnly),
            other => Err(format!("unknown candidate strategy: {other}")),
        }
    }
}

/// Result of processing one batch of records.
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    /// Whether any record gained coordinates (the file needs rewriting).
    pub mutated: bool,
    /// Records that could not be geocoded, in original relative order.
    pub failed: Vec<AddressRecord>,
}

/// Geocodes every unresolved record in `records`, in order.
///
/// Already-resolved records are left untouched and never reach the
/// geocoder. Records missing a required field fail immediately without a
/// geocode attempt. Everything else is tried against the strategy's
/// candidate list until the first hit; coordinates are stored in the
/// geocoder's native longitude-first order.
pub async fn process_records<G: Geocode>(
    records: &mut [AddressRecord],
    geocoder: &G,
    strategy: CandidateStrategy,
    analytics: &mut RunAnalytics,
) -> ProcessOutcome {
    let mut outcome = ProcessOutcome::default();

    for record in records.iter_mut() {
        if record.is_resolved() {
            continue;
        }

        if !record.has_required_fields() {
            analytics.record_error(
                ErrorKind::MissingFields,
                format!("Missing fields in record: {record:?}"),
                None,
            );
            outcome.failed.push(record.clone());
            continue;
        }

        let endereco = record.endereco.as_deref().unwrap_or_default();
        let localidade = record.localidade.as_deref().unwrap_or_default();
        let estado = record.estado.as_deref().unwrap_or_default();
        let candidates = strategy.candidates(endereco, localidade);

        let mut coords = None;
        for candidate in &candidates {
            coords = geocoder.geocode(candidate, estado, analytics).await;
            if let Some(c) = coords {
                log::info!("Geocoded {candidate} -> ({}, {})", c.longitude, c.latitude);
                break;
            }
        }

        if let Some(c) = coords {
            record.longitude = Some(c.longitude);
            record.latitude = Some(c.latitude);
            outcome.mutated = true;
        } else {
            log::warn!(
                "Failed to geocode after attempts: {}",
                candidates.join(" | ")
            );
            outcome.failed.push(record.clone());
        }
    }

    outcome
}

/// Outcome of handling one batch file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// File processed and moved to the processed directory.
    Processed {
        /// Whether the file was rewritten in place before the move.
        rewritten: bool,
        /// Number of records set aside for reprocessing.
        failed: usize,
    },
    /// File could not be parsed and was left in place.
    Unreadable,
}

/// Prefix for reprocess files holding the failed subset of a batch.
pub const REPROCESS_PREFIX: &str = "reprocessar_";

/// Processes one batch file end to end.
///
/// Unparsable files are recorded as `file_read_error` and left in place.
/// Otherwise records are geocoded, the file is rewritten if anything
/// changed, failed records go to `reprocess_dir` under the
/// [`REPROCESS_PREFIX`], and the file is moved into `processed_dir` under
/// its original name — even when no record changed, so the next run does
/// not pick it up again. A failed move is logged, not fatal.
///
/// # Errors
///
/// Returns [`WorkerError`] if rewriting the file or writing the reprocess
/// sibling fails after a successful parse.
pub async fn process_file<G: Geocode>(
    path: &Path,
    processed_dir: &Path,
    reprocess_dir: &Path,
    geocoder: &G,
    strategy: CandidateStrategy,
    analytics: &mut RunAnalytics,
) -> Result<FileOutcome, WorkerError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("batch.json")
        .to_string();

    let parsed: Result<Vec<AddressRecord>, WorkerError> = fs::read_to_string(path)
        .map_err(WorkerError::from)
        .and_then(|text| serde_json::from_str(&text).map_err(WorkerError::from));

    let mut records = match parsed {
        Ok(records) => records,
        Err(e) => {
            log::error!("Failed to read {file_name}: {e}");
            analytics.record_error(ErrorKind::FileRead, e.to_string(), Some(file_name));
            return Ok(FileOutcome::Unreadable);
        }
    };

    analytics.record_identified(records.len() as u64);

    let outcome = process_records(&mut records, geocoder, strategy, analytics).await;

    if outcome.mutated {
        fs::write(path, serde_json::to_string_pretty(&records)?)?;
        log::info!("Updated file: {file_name}");
    }

    if !outcome.failed.is_empty() {
        let reprocess_path = reprocess_dir.join(format!("{REPROCESS_PREFIX}{file_name}"));
        fs::write(
            &reprocess_path,
            serde_json::to_string_pretty(&outcome.failed)?,
        )?;
        log::info!(
            "Saved {} records for reprocessing in {}",
            outcome.failed.len(),
            reprocess_path.display()
        );
    }

    let dest = processed_dir.join(&file_name);
    match fs::rename(path, &dest) {
        Ok(()) => log::info!("Moved {file_name} to {}", dest.display()),
        Err(e) => log::error!("Failed to move {file_name}: {e}"),
    }

    Ok(FileOutcome::Processed {
        rewritten: outcome.mutated,
        failed: outcome.failed.len(),
    })
}

/// Scans the input directory for `*.json` batch files and processes each
/// in turn, in name order. Per-file failures are logged and never abort
/// the run.
///
/// # Errors
///
/// Returns [`WorkerError`] only if the input directory itself cannot be
/// listed.
pub async fn run<G: Geocode>(
    config: &Config,
    geocoder: &G,
    analytics: &mut RunAnalytics,
) -> Result<(), WorkerError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(&config.input_dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    for path in paths {
        log::info!("Processing file: {}", path.display());
        if let Err(e) = process_file(
            &path,
            &config.processed_dir,
            &config.reprocess_dir,
            geocoder,
            config.strategy,
            analytics,
        )
        .await
        {
            log::error!("Failed to process {}: {e}", path.display());
        }
    }

    Ok(())
}
