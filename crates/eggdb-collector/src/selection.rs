//! Which catalog locations a run visits.

use eggdb_core::{Catalog, CatalogLocation};
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::RunError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeScope {
    /// A fixed-size random subset of the catalog.
    Sample,
    /// Every catalog location, in catalog order.
    Full,
}

impl ScrapeScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScrapeScope::Sample => "sample",
            ScrapeScope::Full => "full",
        }
    }
}

impl std::fmt::Display for ScrapeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScrapeScope {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sample" => Ok(ScrapeScope::Sample),
            "full" => Ok(ScrapeScope::Full),
            _ => Err(RunError::InvalidScope(s.to_string())),
        }
    }
}

/// Picks the locations for one run.
///
/// `Sample` draws up to `sample_size` distinct locations in random order; a
/// smaller catalog yields every location, shuffled.
pub fn select_locations<R: Rng + ?Sized>(
    catalog: &Catalog,
    scope: ScrapeScope,
    sample_size: usize,
    rng: &mut R,
) -> Vec<CatalogLocation> {
    match scope {
        ScrapeScope::Full => catalog.locations().to_vec(),
        ScrapeScope::Sample => {
            let mut picked: Vec<CatalogLocation> = catalog
                .locations()
                .choose_multiple(rng, sample_size)
                .cloned()
                .collect();
            picked.shuffle(rng);
            picked
        }
    }
}
