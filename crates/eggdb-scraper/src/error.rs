use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("crawler returned HTTP {status}: {message}")]
    Crawler { status: u16, message: String },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid CSS selector \"{selector}\" for {chain}: {reason}")]
    InvalidSelector {
        chain: String,
        selector: String,
        reason: String,
    },

    #[error("invalid location pattern for {chain}: {source}")]
    InvalidPattern {
        chain: String,
        #[source]
        source: regex::Error,
    },

    #[error("network error fetching {url} after {attempts} attempts: {source}")]
    Network {
        url: String,
        attempts: u32,
        #[source]
        source: Box<ScraperError>,
    },
}

impl ScraperError {
    /// Transient conditions worth another attempt: transport failures, any
    /// non-2xx answer from the target site, and crawler-side failures.
    ///
    /// Malformed crawler JSON and invalid URLs fail the same way every time.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ScraperError::Http(_)
                | ScraperError::UnexpectedStatus { .. }
                | ScraperError::Crawler { .. }
        )
    }
}

/// Fetched content could not be turned into price observations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("page content is empty")]
    EmptyContent,

    #[error("page is a bot challenge, not a product listing")]
    BotChallenge,

    #[error("no egg products with a parseable price found")]
    NoObservations,
}
