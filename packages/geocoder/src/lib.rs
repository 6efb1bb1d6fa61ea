#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geocoding for Brazilian address records.
//!
//! Converts free-text addresses to WGS84 coordinates using the Mapbox
//! forward-geocoding API. [`address`] normalizes raw addresses, [`mapbox`]
//! talks to the endpoint, and [`MapboxGeocoder`] ties the two together
//! behind the [`Geocode`] trait, feeding every outcome into the run's
//! [`RunAnalytics`].
//!
//! Resolution never fails from the caller's point of view: transport
//! errors, empty result sets, and malformed bodies all collapse to `None`,
//! with the distinction recorded in metrics and logs.

pub mod address;
pub mod mapbox;

use std::time::Duration;

use imovel_geo_analytics::{ErrorKind, LengthBucket, RunAnalytics};
use thiserror::Error;

/// A resolved coordinate pair in WGS84 degrees.
///
/// Field order mirrors the Mapbox `center` array: longitude first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Latitude (WGS84).
    pub latitude: f64,
}

/// Errors from a single geocoding request.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

impl GeocodeError {
    /// Coarse category used for the per-error-type metrics breakdown.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(e) if e.is_timeout() => "timeout",
            Self::Http(e) if e.is_connect() => "connect",
            Self::Http(e) if e.is_status() => "status",
            Self::Http(e) if e.is_decode() => "decode",
            Self::Http(_) => "request",
            Self::Parse { .. } => "parse",
        }
    }

    /// Maps this error onto the run-level error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(_) => ErrorKind::Network,
            Self::Parse { .. } => ErrorKind::Geocoding,
        }
    }
}

/// Trait for resolving an address to coordinates.
///
/// The single seam between the batch processor and the network: production
/// code uses [`MapboxGeocoder`], tests substitute a stub.
pub trait Geocode: Send + Sync {
    /// Resolves an address within a state, recording the attempt into
    /// `analytics`. Returns `None` when the address cannot be resolved
    /// for any reason.
    fn geocode(
        &self,
        address: &str,
        state: &str,
        analytics: &mut RunAnalytics,
    ) -> impl std::future::Future<Output = Option<Coordinates>> + Send;
}

/// Timeout for a single geocoding request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Mapbox-backed [`Geocode`] implementation.
pub struct MapboxGeocoder {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl MapboxGeocoder {
    /// Creates a geocoder against the public Mapbox endpoint with the
    /// fixed 10-second request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the HTTP client cannot be constructed.
    pub fn new(access_token: impl Into<String>) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent("imovel-geo/0.1")
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: mapbox::DEFAULT_BASE_URL.to_string(),
            access_token: access_token.into(),
        })
    }

    /// Overrides the endpoint base URL (proxies, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Geocode for MapboxGeocoder {
    async fn geocode(
        &self,
        address: &str,
        state: &str,
        analytics: &mut RunAnalytics,
    ) -> Option<Coordinates> {
        let normalized = address::normalize(address);

        analytics.record_address_length(LengthBucket::classify(normalized.len()));
        analytics.record_state_seen(state);

        let query = format!("{normalized}, {state}, Brasil");

        analytics.record_request();
        match mapbox::geocode_forward(&self.client, &self.base_url, &self.access_token, &query)
            .await
        {
            Ok(Some(coords)) => {
                analytics.record_success(state);
                Some(coords)
            }
            Ok(None) => {
                log::warn!("No coordinates found for {normalized}");
                analytics.record_failure(state);
                None
            }
            Err(e) => {
                log::error!("Error geocoding {normalized}: {e}");
                analytics.record_failure(state);
                analytics.record_error_type(e.category());
                analytics.record_error(e.kind(), e.to_string(), None);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_map_to_geocoding_kind() {
        let err = GeocodeError::Parse {
            message: "bad body".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Geocoding);
        assert_eq!(err.category(), "parse");
    }

    #[test]
    fn builder_accepts_base_url_override() {
        let geocoder = MapboxGeocoder::new("token")
            .unwrap()
            .with_base_url("http://localhost:8080/geocode");
        assert_eq!(geocoder.base_url, "http://localhost:8080/geocode");
    }
}
