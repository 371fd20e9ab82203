//! Offline geocoder backed by a JSON lookup table
//!
//! The table maps place names to coordinates; `null` marks a name known to
//! have no match. Lookups ignore case and surrounding whitespace.
//!
//! ```json
//! { "Paris": { "latitude": 48.8566, "longitude": 2.3522 }, "Atlantis": null }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use super::{GeocodingMatch, GeocodingProvider, ProviderError};
use crate::models::Coordinates;

/// Geocoder answering from an in-memory table
#[derive(Debug, Clone, Default)]
pub struct TableGeocoder {
    entries: HashMap<String, (String, Option<Coordinates>)>,
}

impl TableGeocoder {
    /// Build from `(name, coordinates)` pairs
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<Coordinates>)>,
        S: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(name, coords)| {
                let name = name.into();
                (Self::key(&name), (name, coords))
            })
            .collect();
        Self { entries }
    }

    /// Load a JSON table from disk
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read geocoding table: {}", path.display()))?;
        let table: HashMap<String, Option<Coordinates>> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse geocoding table: {}", path.display()))?;

        info!("Loaded {} geocoding table entries from {}", table.len(), path.display());
        Ok(Self::from_entries(table))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(name: &str) -> String {
        name.trim().to_lowercase()
    }
}

#[async_trait]
impl GeocodingProvider for TableGeocoder {
    fn name(&self) -> &str {
        "table"
    }

    async fn lookup(&self, query: &str) -> Result<Option<GeocodingMatch>, ProviderError> {
        Ok(self
            .entries
            .get(&Self::key(query))
            .and_then(|(name, coords)| {
                coords.map(|c| GeocodingMatch {
                    name: name.clone(),
                    latitude: c.latitude,
                    longitude: c.longitude,
                })
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_lookup_ignores_case() {
        let table = TableGeocoder::from_entries([(
            "Paris",
            Some(Coordinates {
                latitude: 48.8566,
                longitude: 2.3522,
            }),
        )]);

        let found = table.lookup("  paris ").await.unwrap().unwrap();
        assert_eq!(found.name, "Paris");
        assert_eq!(found.latitude, 48.8566);
        assert!(table.lookup("Lyon").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_json_table() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"广东": {{"latitude": 23.13, "longitude": 113.26}}, "Atlantis": null}}"#
        )
        .unwrap();

        let table = TableGeocoder::from_json_file(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.lookup("广东").await.unwrap().is_some());
        assert!(table.lookup("Atlantis").await.unwrap().is_none());
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = TableGeocoder::from_json_file("/nonexistent/table.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read geocoding table"));
    }
}
