//! Mapbox forward-geocoding client.
//!
//! Single-result forward geocoding against the Mapbox places endpoint,
//! country-locked to Brazil:
//!
//! `GET {base}/{query}.json?access_token=...&country=br&limit=1`
//!
//! The query string is embedded in the request path, percent-encoded.
//!
//! See <https://docs.mapbox.com/api/search/geocoding/>

use std::fmt::Write as _;

use crate::{Coordinates, GeocodeError};

/// Public Mapbox places endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places";

/// Forward-geocodes a free-form query, returning the best match if any.
///
/// # Errors
///
/// Returns [`GeocodeError`] if the HTTP request or response parsing fails.
pub async fn geocode_forward(
    client: &reqwest::Client,
    base_url: &str,
    access_token: &str,
    query: &str,
) -> Result<Option<Coordinates>, GeocodeError> {
    let url = format!("{base_url}/{}.json", percent_encode(query));

    let resp = client
        .get(&url)
        .query(&[
            ("access_token", access_token),
            ("country", "br"),
            ("limit", "1"),
        ])
        .send()
        .await?
        .error_for_status()?;

    let body: serde_json::Value = resp.json().await?;
    parse_response(&body)
}

/// Parses a Mapbox geocoding response body.
///
/// Each feature's `center` is `[longitude, latitude]`; that order is
/// carried into the returned [`Coordinates`] as-is.
fn parse_response(body: &serde_json::Value) -> Result<Option<Coordinates>, GeocodeError> {
    let features = body["features"]
        .as_array()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Mapbox response has no features array".to_string(),
        })?;

    let Some(first) = features.first() else {
        return Ok(None);
    };

    let center = first["center"]
        .as_array()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing center in Mapbox feature".to_string(),
        })?;

    let longitude = center
        .first()
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing longitude in Mapbox center".to_string(),
        })?;

    let latitude = center
        .get(1)
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing latitude in Mapbox center".to_string(),
        })?;

    Ok(Some(Coordinates {
        longitude,
        latitude,
    }))
}

/// Percent-encodes a query for embedding in the request path.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(b));
            }
            _ => write!(out, "%{b:02X}").unwrap(),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_feature_center() {
        let body = serde_json::json!({
            "features": [
                { "center": [-46.633_309, -23.550_520], "place_name": "São Paulo" },
                { "center": [-43.172_896, -22.906_847], "place_name": "Rio de Janeiro" }
            ]
        });
        let coords = parse_response(&body).unwrap().unwrap();
        assert!((coords.longitude - -46.633_309).abs() < 1e-6);
        assert!((coords.latitude - -23.550_520).abs() < 1e-6);
    }

    #[test]
    fn preserves_longitude_latitude_order() {
        let body = serde_json::json!({
            "features": [{ "center": [-46.6, -23.5] }]
        });
        let coords = parse_response(&body).unwrap().unwrap();
        assert!((coords.longitude - -46.6).abs() < 1e-9);
        assert!((coords.latitude - -23.5).abs() < 1e-9);
    }

    #[test]
    fn empty_features_is_not_found() {
        let body = serde_json::json!({ "features": [] });
        assert!(parse_response(&body).unwrap().is_none());
    }

    #[test]
    fn missing_features_is_parse_error() {
        let body = serde_json::json!({ "message": "Not Authorized" });
        assert!(parse_response(&body).is_err());
    }

    #[test]
    fn malformed_center_is_parse_error() {
        let body = serde_json::json!({
            "features": [{ "center": [-46.6] }]
        });
        assert!(parse_response(&body).is_err());
    }

    #[test]
    fn encodes_path_query() {
        assert_eq!(
            percent_encode("RUA A, 10, SP, Brasil"),
            "RUA%20A%2C%2010%2C%20SP%2C%20Brasil"
        );
        assert_eq!(percent_encode("SIMPLES-123.X"), "SIMPLES-123.X");
    }
}
