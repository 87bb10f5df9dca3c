use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Product classification derived from title keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EggType {
    Regular,
    Organic,
}

impl EggType {
    /// Value stored in `price_observations.egg_type`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EggType::Regular => "regular",
            EggType::Organic => "organic",
        }
    }

    /// Classify a product title: `organic` when the title says so, otherwise `regular`.
    #[must_use]
    pub fn from_title(title: &str) -> Self {
        if title.to_lowercase().contains("organic") {
            EggType::Organic
        } else {
            EggType::Regular
        }
    }
}

impl std::fmt::Display for EggType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EggType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(EggType::Regular),
            "organic" => Ok(EggType::Organic),
            other => Err(format!("unknown egg type '{other}'")),
        }
    }
}

/// Where a persisted price came from.
///
/// `FallbackEstimate` rows are placeholders for chains without a working
/// scraper; downstream readers filter on this to separate verified data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationSource {
    Live,
    FallbackEstimate,
}

impl ObservationSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ObservationSource::Live => "live",
            ObservationSource::FallbackEstimate => "fallback_estimate",
        }
    }
}

impl std::fmt::Display for ObservationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One price fact for a store location, before it is keyed to a date and
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Always positive.
    pub price: Decimal,
    pub egg_type: EggType,
    pub in_stock: bool,
}
