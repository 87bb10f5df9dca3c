//! Chain-aware request formatting: zip query parameter plus geolocation
//! hints in headers and cookies.

use std::collections::HashMap;

use eggdb_core::{Catalog, CatalogLocation};
use reqwest::Url;

use crate::error::ScraperError;

/// Parameter used for chains with no known mapping.
pub const DEFAULT_ZIP_PARAM: &str = "zipCode";

/// Observed zip query parameters, keyed by lowercase chain name.
const CHAIN_ZIP_PARAMS: &[(&str, &str)] = &[
    ("walmart", "postalCode"),
    ("target", "zip"),
    ("kroger", "locationId"),
    ("ralphs", "locationId"),
    ("safeway", "zipcode"),
    ("albertsons", "zipcode"),
    ("vons", "zipcode"),
    ("whole foods market", "storeZipCode"),
    ("costco", "location"),
    ("sprouts farmers market", "postal_code"),
    ("trader joe's", "zip"),
    ("aldi", "zipCode"),
    ("publix", "zipCode"),
];

/// A request ready for a [`PageFetcher`](crate::PageFetcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
}

impl FormattedRequest {
    /// `name=value; name=value` for a `Cookie` header, or `None` without cookies.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Maps chain names to their zip query parameter and builds requests.
#[derive(Debug, Clone, Default)]
pub struct UrlFormatter {
    overrides: HashMap<String, String>,
}

impl UrlFormatter {
    /// Formatter using only the built-in chain table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Formatter whose table is extended by each chain profile's `zip_param`.
    #[must_use]
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let overrides = catalog
            .chains()
            .iter()
            .filter_map(|c| {
                let param = c.zip_param.as_deref()?.trim();
                (!param.is_empty()).then(|| (chain_key(&c.name), param.to_string()))
            })
            .collect();
        Self { overrides }
    }

    /// The query parameter carrying the zip for `chain`.
    #[must_use]
    pub fn zip_param(&self, chain: &str) -> &str {
        let key = chain_key(chain);
        if let Some(param) = self.overrides.get(&key) {
            return param;
        }
        CHAIN_ZIP_PARAMS
            .iter()
            .find(|(name, _)| *name == key)
            .map_or(DEFAULT_ZIP_PARAM, |&(_, param)| param)
    }

    /// Substitute `{zip}` and make sure the chain's zip parameter appears
    /// exactly once with the requested value.
    ///
    /// Applying this to its own output returns the input unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidUrl`] if the template is not an absolute URL.
    pub fn format_url(
        &self,
        url_template: &str,
        chain: &str,
        zip: &str,
    ) -> Result<String, ScraperError> {
        let param = self.zip_param(chain);
        let substituted = url_template.trim().replace("{zip}", zip);
        let mut url = Url::parse(&substituted).map_err(|e| ScraperError::InvalidUrl {
            url: substituted.clone(),
            reason: e.to_string(),
        })?;

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let occurrences: Vec<&(String, String)> =
            pairs.iter().filter(|(k, _)| k == param).collect();
        if occurrences.len() == 1 && occurrences[0].1 == zip {
            return Ok(url.to_string());
        }

        let mut rebuilt = Vec::with_capacity(pairs.len() + 1);
        let mut placed = false;
        for (k, v) in pairs {
            if k == param {
                if !placed {
                    rebuilt.push((k, zip.to_string()));
                    placed = true;
                }
            } else {
                rebuilt.push((k, v));
            }
        }
        if !placed {
            rebuilt.push((param.to_string(), zip.to_string()));
        }

        url.query_pairs_mut().clear().extend_pairs(rebuilt);
        Ok(url.to_string())
    }

    /// Builds the request for `chain` at `zip`: the formatted URL plus the
    /// zip hint header and cookies.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidUrl`] if the template is not an absolute URL.
    pub fn format(
        &self,
        url_template: &str,
        chain: &str,
        zip: &str,
    ) -> Result<FormattedRequest, ScraperError> {
        let url = self.format_url(url_template, chain, zip)?;
        let param = self.zip_param(chain);

        let mut cookies = vec![(param.to_string(), zip.to_string())];
        if param != "preferred_zip" {
            cookies.push(("preferred_zip".to_string(), zip.to_string()));
        }

        Ok(FormattedRequest {
            url,
            headers: vec![("X-Geo-Zip".to_string(), zip.to_string())],
            cookies,
        })
    }

    /// Format a catalog location, adding every geolocation hint it supports.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidUrl`] if the location's template is not
    /// an absolute URL.
    pub fn format_location(
        &self,
        location: &CatalogLocation,
    ) -> Result<FormattedRequest, ScraperError> {
        let mut request = self.format(&location.url_template, &location.chain, &location.zip_code)?;

        if let Some((city, region)) = location.city_region() {
            request.headers.push(("X-Geo-City".to_string(), city));
            request.headers.push(("X-Geo-Region".to_string(), region));
        }
        if let (Some(lat), Some(lng)) = (location.latitude, location.longitude) {
            request.headers.push(("X-Geo-Lat".to_string(), lat.to_string()));
            request.headers.push(("X-Geo-Lng".to_string(), lng.to_string()));
        }
        if let Some(ip) = location.forwarded_ip.as_deref().map(str::trim) {
            if !ip.is_empty() {
                request
                    .headers
                    .push(("X-Forwarded-For".to_string(), ip.to_string()));
            }
        }

        Ok(request)
    }
}

fn chain_key(chain: &str) -> String {
    chain.trim().to_lowercase()
}

#[cfg(test)]
#[path = "url_test.rs"]
mod tests;
