//! Static directory of store locations to scrape, plus the per-chain data
//! table that drives the generic scraper.

use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::observation::EggType;
use crate::ConfigError;

fn default_true() -> bool {
    true
}

/// Placeholder prices for a chain that has no live scraper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPrices {
    pub regular: Option<Decimal>,
    pub organic: Option<Decimal>,
}

impl FallbackPrices {
    /// Configured `(egg_type, price)` pairs, regular first.
    #[must_use]
    pub fn entries(&self) -> Vec<(EggType, Decimal)> {
        [
            (EggType::Regular, self.regular),
            (EggType::Organic, self.organic),
        ]
        .into_iter()
        .filter_map(|(egg_type, price)| price.map(|p| (egg_type, p)))
        .collect()
    }
}

/// Everything the generic scraper needs to know about one retail chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainProfile {
    pub name: String,
    /// Query parameter carrying the zip code. Overrides the built-in table.
    #[serde(default)]
    pub zip_param: Option<String>,
    /// `false` for chains whose pages cannot be scraped; those only ever
    /// produce fallback estimates.
    #[serde(default = "default_true")]
    pub has_live_scraper: bool,
    /// Ask the crawling service to render JavaScript before returning content.
    #[serde(default)]
    pub javascript: bool,
    /// Default URL template for locations of this chain.
    #[serde(default)]
    pub url_template: Option<String>,
    /// CSS selector matching one product tile.
    #[serde(default)]
    pub product_selector: Option<String>,
    /// CSS selector for the title inside a product tile.
    #[serde(default)]
    pub title_selector: Option<String>,
    /// Regex whose first capture group is the zip of the store the page is
    /// rendered for.
    #[serde(default)]
    pub location_pattern: Option<String>,
    #[serde(default)]
    pub fallback_prices: Option<FallbackPrices>,
}

impl ChainProfile {
    /// A profile with every optional setting left at its default.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            zip_param: None,
            has_live_scraper: true,
            javascript: false,
            url_template: None,
            product_selector: None,
            title_selector: None,
            location_pattern: None,
            fallback_prices: None,
        }
    }
}

/// A location entry as written in the catalog file.
#[derive(Debug, Clone, Deserialize)]
struct CatalogLocationEntry {
    chain: String,
    address: String,
    zip_code: String,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    url_template: Option<String>,
    #[serde(default)]
    forwarded_ip: Option<String>,
}

/// One physical store to scrape. Read-only after the catalog is loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogLocation {
    pub chain: String,
    pub address: String,
    pub zip_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub url_template: String,
    /// Client IP to claim in `X-Forwarded-For` for sites that geolocate by IP.
    pub forwarded_ip: Option<String>,
}

impl CatalogLocation {
    /// Splits `"123 Main St, Los Angeles, CA 90026"` into
    /// `("Los Angeles", "CA")`. Returns `None` when the address does not end
    /// in a `City, ST zip` shape.
    #[must_use]
    pub fn city_region(&self) -> Option<(String, String)> {
        let parts: Vec<&str> = self.address.split(',').map(str::trim).collect();
        if parts.len() < 2 {
            return None;
        }
        let tail = parts[parts.len() - 1];
        let region = tail.split_whitespace().next()?;
        if region.len() != 2 || !region.chars().all(|c| c.is_ascii_uppercase()) {
            return None;
        }
        let city = parts[parts.len() - 2];
        if city.is_empty() {
            return None;
        }
        Some((city.to_string(), region.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    chains: Vec<ChainProfile>,
    locations: Vec<CatalogLocationEntry>,
}

/// The loaded, validated store catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    chains: Vec<ChainProfile>,
    locations: Vec<CatalogLocation>,
}

impl Catalog {
    /// Builds a catalog from already-resolved parts. Used by tests and callers
    /// that assemble catalogs in code.
    #[must_use]
    pub fn new(chains: Vec<ChainProfile>, locations: Vec<CatalogLocation>) -> Self {
        Self { chains, locations }
    }

    #[must_use]
    pub fn chains(&self) -> &[ChainProfile] {
        &self.chains
    }

    #[must_use]
    pub fn locations(&self) -> &[CatalogLocation] {
        &self.locations
    }

    /// Case-insensitive chain profile lookup.
    #[must_use]
    pub fn chain(&self, name: &str) -> Option<&ChainProfile> {
        let wanted = name.trim();
        self.chains
            .iter()
            .find(|c| c.name.trim().eq_ignore_ascii_case(wanted))
    }

    /// A copy of the catalog restricted to one chain.
    #[must_use]
    pub fn for_chain(&self, name: &str) -> Self {
        let wanted = name.trim();
        Self {
            chains: self
                .chains
                .iter()
                .filter(|c| c.name.trim().eq_ignore_ascii_case(wanted))
                .cloned()
                .collect(),
            locations: self
                .locations
                .iter()
                .filter(|l| l.chain.trim().eq_ignore_ascii_case(wanted))
                .cloned()
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

/// Load and validate the store catalog from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_catalog(path: &Path) -> Result<Catalog, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_catalog(&content)
}

/// Parse and validate catalog YAML.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_catalog(yaml: &str) -> Result<Catalog, ConfigError> {
    let file: CatalogFile = serde_yaml::from_str(yaml).map_err(ConfigError::CatalogFileParse)?;
    validate_chains(&file.chains)?;

    let mut seen_locations = HashSet::new();
    let mut locations = Vec::with_capacity(file.locations.len());

    for entry in file.locations {
        let chain = entry.chain.trim().to_string();
        if chain.is_empty() {
            return Err(ConfigError::Validation(
                "location chain must be non-empty".to_string(),
            ));
        }

        let zip_code = entry.zip_code.trim().to_string();
        if !is_valid_zip(&zip_code) {
            return Err(ConfigError::Validation(format!(
                "location '{chain}' has invalid zip code '{zip_code}'; expected 5 digits"
            )));
        }

        if !seen_locations.insert((chain.to_lowercase(), zip_code.clone())) {
            return Err(ConfigError::Validation(format!(
                "duplicate location: '{chain}' in {zip_code}"
            )));
        }

        let profile = file
            .chains
            .iter()
            .find(|c| c.name.trim().eq_ignore_ascii_case(&chain));

        let url_template = entry
            .url_template
            .filter(|t| !t.trim().is_empty())
            .or_else(|| profile.and_then(|p| p.url_template.clone()))
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "location '{chain}' in {zip_code} has no url_template and its chain defines none"
                ))
            })?;

        locations.push(CatalogLocation {
            chain,
            address: entry.address.trim().to_string(),
            zip_code,
            latitude: entry.latitude,
            longitude: entry.longitude,
            url_template,
            forwarded_ip: entry.forwarded_ip,
        });
    }

    Ok(Catalog {
        chains: file.chains,
        locations,
    })
}

fn validate_chains(chains: &[ChainProfile]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for chain in chains {
        if chain.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "chain name must be non-empty".to_string(),
            ));
        }
        if !seen.insert(chain.name.trim().to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate chain: '{}'",
                chain.name
            )));
        }
        if let Some(prices) = &chain.fallback_prices {
            if prices.entries().iter().any(|(_, p)| p.is_sign_negative() || p.is_zero()) {
                return Err(ConfigError::Validation(format!(
                    "chain '{}' has a non-positive fallback price",
                    chain.name
                )));
            }
        }
    }
    Ok(())
}

fn is_valid_zip(zip: &str) -> bool {
    zip.len() == 5 && zip.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
