//! Geocoding client for the `OpenMeteo` geocoding API
//!
//! No API key is required. Each lookup asks for the single best match.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{GeocodingMatch, GeocodingProvider, ProviderError};
use crate::config::GeocodingConfig;

/// Geocoding response from `OpenMeteo`
#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    results: Option<Vec<GeocodingResult>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    name: String,
    latitude: f64,
    longitude: f64,
    country: Option<String>,
    admin1: Option<String>,
}

impl From<GeocodingResult> for GeocodingMatch {
    fn from(result: GeocodingResult) -> Self {
        let name = match (result.admin1, result.country) {
            (Some(admin1), Some(country)) => format!("{}, {}, {}", result.name, admin1, country),
            (None, Some(country)) => format!("{}, {}", result.name, country),
            (Some(admin1), None) => format!("{}, {}", result.name, admin1),
            (None, None) => result.name,
        };
        GeocodingMatch {
            name,
            latitude: result.latitude,
            longitude: result.longitude,
        }
    }
}

/// `OpenMeteo` geocoding client
pub struct OpenMeteoGeocoder {
    client: Client,
    base_url: String,
    language: String,
}

impl OpenMeteoGeocoder {
    /// Create a new client
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(concat!("GeoTally/", env!("CARGO_PKG_VERSION")))
            .build()
            .with_context(|| "Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
        })
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}/search?name={}&count=1&language={}&format=json",
            self.base_url,
            urlencoding::encode(query),
            urlencoding::encode(&self.language)
        )
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_send_error)?;

        match classify_status(response.status()) {
            Some(err) => Err(err),
            None => Ok(response),
        }
    }
}

/// Map a transport failure onto the provider taxonomy
fn classify_send_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_builder() {
        ProviderError::Rejected(err.to_string())
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}

/// Map a non-success HTTP status onto the provider taxonomy
fn classify_status(status: StatusCode) -> Option<ProviderError> {
    if status.is_success() {
        return None;
    }

    let description = format!(
        "HTTP {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown error")
    );

    Some(match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::Timeout,
        StatusCode::TOO_MANY_REQUESTS => ProviderError::Unavailable(description),
        s if s.is_server_error() => ProviderError::Unavailable(description),
        _ => ProviderError::Rejected(description),
    })
}

#[async_trait]
impl GeocodingProvider for OpenMeteoGeocoder {
    fn name(&self) -> &str {
        "open-meteo"
    }

    #[tracing::instrument(name = "open_meteo_lookup", level = "debug", skip(self))]
    async fn lookup(&self, query: &str) -> Result<Option<GeocodingMatch>, ProviderError> {
        let start_time = Instant::now();
        let url = self.search_url(query);
        debug!("OpenMeteo geocoding request URL: {}", url);

        let response = self.get(&url).await?;
        let parsed: GeocodingResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse geocoding response for '{}': {}", query, e);
            ProviderError::Malformed(e.to_string())
        })?;

        let best = parsed
            .results
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(GeocodingMatch::from);

        match &best {
            Some(found) => debug!(
                "Found '{}' as {} ({:.4}, {:.4}) in {:.3}s",
                query,
                found.name,
                found.latitude,
                found.longitude,
                start_time.elapsed().as_secs_f64()
            ),
            None => debug!("No results found for '{}'", query),
        }

        Ok(best)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let url = self.search_url("Berlin");
        self.get(&url).await?;
        info!("OpenMeteo geocoding API is available");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeoTallyConfig;

    #[test]
    fn test_client_creation() {
        let config = GeoTallyConfig::default();
        let client = OpenMeteoGeocoder::new(&config.geocoding).unwrap();
        assert_eq!(client.base_url, "https://geocoding-api.open-meteo.com/v1");
        assert_eq!(client.name(), "open-meteo");
    }

    #[test]
    fn test_search_url_is_encoded() {
        let config = GeoTallyConfig::default();
        let client = OpenMeteoGeocoder::new(&config.geocoding).unwrap();
        let url = client.search_url("São Paulo");
        assert!(
            url.starts_with("https://geocoding-api.open-meteo.com/v1/search?name=S%C3%A3o%20Paulo")
        );
        assert!(url.contains("count=1"));
        assert!(url.contains("language=en"));
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(StatusCode::OK), None);
        assert_eq!(classify_status(StatusCode::REQUEST_TIMEOUT), Some(ProviderError::Timeout));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Some(ProviderError::Unavailable(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            Some(ProviderError::Unavailable(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST),
            Some(ProviderError::Rejected(_))
        ));
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"results":[{
            "name":"Paris","latitude":48.85341,"longitude":2.3488,
            "country":"France","admin1":"Île-de-France"
        }]}"#;
        let parsed: GeocodingResponse = serde_json::from_str(body).unwrap();
        let best: GeocodingMatch = parsed.results.unwrap().into_iter().next().unwrap().into();
        assert_eq!(best.name, "Paris, Île-de-France, France");
        assert_eq!(best.latitude, 48.85341);

        let empty: GeocodingResponse =
            serde_json::from_str(r#"{"generationtime_ms":0.5}"#).unwrap();
        assert!(empty.results.is_none());
    }
}
