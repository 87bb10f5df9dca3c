//! Confirms fetched content belongs to the requested store location.

use std::sync::LazyLock;

use eggdb_core::ChainProfile;
use regex::Regex;

use crate::error::ScraperError;
use crate::jsonld;
use crate::url::{UrlFormatter, DEFAULT_ZIP_PARAM};

static JSON_ZIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(postalCode|zipCode|zipcode|zip|storeZip)"\s*:\s*"?(\d{5})(?:-\d{4})?\b"#)
        .expect("valid regex")
});

static STORE_CONTEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(?:your store|my store|shopping at|pickup at|store:).{0,120}?\b(\d{5})\b")
        .expect("valid regex")
});

const STORE_TYPES: [&str; 6] = [
    "Store",
    "GroceryStore",
    "LocalBusiness",
    "ConvenienceStore",
    "SupermarketStore",
    "Place",
];

/// Failure reason recorded when verification does not pass.
pub const UNVERIFIED_REASON: &str = "location unverified";

/// Outcome of a location check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub verified: bool,
    /// Zip the page revealed, when it revealed one.
    pub actual_location: Option<String>,
}

/// Finds the store location a page was rendered for.
#[derive(Debug, Clone)]
pub struct LocationVerifier {
    pattern: Option<Regex>,
    /// JSON key the request itself carried the zip under. Pages echo request
    /// parameters back in their state, so this key proves nothing.
    request_key: String,
}

impl Default for LocationVerifier {
    fn default() -> Self {
        Self {
            pattern: None,
            request_key: DEFAULT_ZIP_PARAM.to_string(),
        }
    }
}

impl LocationVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifier that also reads the chain's `location_pattern` and ignores
    /// the chain's own zip parameter echoed back in page state.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidPattern`] if the pattern does not compile.
    pub fn for_chain(profile: Option<&ChainProfile>) -> Result<Self, ScraperError> {
        let Some(profile) = profile else {
            return Ok(Self::new());
        };
        let pattern = profile
            .location_pattern
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                Regex::new(s).map_err(|source| ScraperError::InvalidPattern {
                    chain: profile.name.clone(),
                    source,
                })
            })
            .transpose()?;
        let request_key = profile
            .zip_param
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map_or_else(
                || UrlFormatter::new().zip_param(&profile.name).to_string(),
                ToOwned::to_owned,
            );
        Ok(Self {
            pattern,
            request_key,
        })
    }

    /// Checks `content` against `expected_zip`.
    ///
    /// Verified only when the page reveals at least one store zip and every
    /// revealed zip shares the expected 5-digit prefix. Conflicting signals
    /// are never resolved in favor of the expected zip.
    #[must_use]
    pub fn verify(&self, content: &str, expected_zip: &str) -> Verification {
        let signals = self.signals(content);
        let verified = match zip5(expected_zip) {
            Some(expected) => !signals.is_empty() && signals.iter().all(|zip| *zip == expected),
            None => false,
        };
        if !verified && signals.windows(2).any(|w| w[0] != w[1]) {
            tracing::debug!(?signals, expected_zip, "conflicting location signals");
        }
        Verification {
            verified,
            actual_location: signals.into_iter().next(),
        }
    }

    /// The highest-priority location signal, normalized to five digits.
    #[must_use]
    pub fn revealed_zip(&self, content: &str) -> Option<String> {
        self.signals(content).into_iter().next()
    }

    /// Every location signal in priority order: chain pattern, JSON-LD store
    /// address, embedded JSON keys, store-context text.
    fn signals(&self, content: &str) -> Vec<String> {
        let mut zips = Vec::new();

        if let Some(pattern) = &self.pattern {
            zips.extend(
                pattern
                    .captures_iter(content)
                    .filter_map(|c| c.get(1))
                    .filter_map(|m| zip5(m.as_str())),
            );
        }

        zips.extend(jsonld_store_zips(content));

        zips.extend(
            JSON_ZIP_RE
                .captures_iter(content)
                .filter(|c| c.get(1).is_some_and(|key| key.as_str() != self.request_key))
                .filter_map(|c| c.get(2))
                .map(|m| m.as_str().to_string()),
        );

        zips.extend(
            STORE_CONTEXT_RE
                .captures_iter(content)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
        );

        zips
    }
}

fn jsonld_store_zips(content: &str) -> Vec<String> {
    jsonld::nodes(content)
        .iter()
        .filter(|n| jsonld::has_type(n, &STORE_TYPES))
        .filter_map(|store| {
            let address = store.get("address")?;
            jsonld::text_field(address, "postalCode").and_then(|z| zip5(&z))
        })
        .collect()
}

/// Leading five digits of a US zip (`90026-1234` → `90026`).
fn zip5(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let head = trimmed.get(..5)?;
    if !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match trimmed.as_bytes().get(5) {
        None | Some(b'-' | b' ') => Some(head.to_string()),
        Some(_) => None,
    }
}
