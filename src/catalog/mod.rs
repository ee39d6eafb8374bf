//! Destination catalog - the fixed set of cities the engine prices.
//!
//! The core only depends on the [`DestinationCatalog`] capability ("enumerate
//! destinations"); how the list is stored or grouped by region is up to the
//! implementation.

mod builtin;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use builtin::{builtin_destinations, origin_coordinates};

/// World region a destination belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Europe,
    Asia,
    NorthAmerica,
    LatinAmerica,
    Africa,
    Oceania,
    MiddleEast,
}

impl Region {
    pub const ALL: [Region; 7] = [
        Region::Europe,
        Region::Asia,
        Region::NorthAmerica,
        Region::LatinAmerica,
        Region::Africa,
        Region::Oceania,
        Region::MiddleEast,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Europe => "europe",
            Self::Asia => "asia",
            Self::NorthAmerica => "north_america",
            Self::LatinAmerica => "latin_america",
            Self::Africa => "africa",
            Self::Oceania => "oceania",
            Self::MiddleEast => "middle_east",
        }
    }

    /// Parse a region name, accepting `north_america`, `north-america` and
    /// `North America` alike. Returns `None` for unknown names.
    pub fn parse(raw: &str) -> Option<Region> {
        let key: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect();
        Region::ALL.into_iter().find(|r| r.as_str() == key)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate destination. Immutable reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// IATA-like city code, e.g. `LIS`
    pub id: String,
    pub name: String,
    pub country: String,
    pub region: Region,
    pub latitude: f64,
    pub longitude: f64,
}

impl Destination {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        country: impl Into<String>,
        region: Region,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            country: country.into(),
            region,
            latitude,
            longitude,
        }
    }
}

/// Capability the engine needs from the catalog collaborator.
pub trait DestinationCatalog: Send + Sync {
    /// Enumerate every destination the engine may price.
    fn destinations(&self) -> anyhow::Result<Vec<Destination>>;
}

/// In-memory catalog, either the built-in list or one loaded from JSON.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    destinations: Vec<Destination>,
}

impl StaticCatalog {
    pub fn new(destinations: Vec<Destination>) -> Self {
        Self { destinations }
    }

    /// The catalog shipped with the service.
    pub fn builtin() -> Self {
        Self::new(builtin_destinations())
    }

    /// Load a catalog from a JSON array of destinations.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let destinations: Vec<Destination> = serde_json::from_str(&raw)?;
        if destinations.is_empty() {
            anyhow::bail!("Destination catalog {} is empty", path.display());
        }
        tracing::info!(
            path = %path.display(),
            count = destinations.len(),
            "Loaded destination catalog override"
        );
        Ok(Self::new(destinations))
    }
}

impl DestinationCatalog for StaticCatalog {
    fn destinations(&self) -> anyhow::Result<Vec<Destination>> {
        Ok(self.destinations.clone())
    }
}
