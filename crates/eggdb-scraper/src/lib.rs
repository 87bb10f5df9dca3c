//! Fetching and interpreting store product pages: chain-aware URL
//! formatting, retrying page fetches, price extraction, and location
//! verification.

pub mod client;
pub mod error;
pub mod extract;
mod jsonld;
mod retry;
pub mod url;
pub mod verify;

pub use client::{FetchClient, FetchOptions, FetchedPage, PageFetcher};
pub use error::{ExtractionError, ScraperError};
pub use extract::{extract_price, is_egg_product, ProductExtractor};
pub use url::{FormattedRequest, UrlFormatter, DEFAULT_ZIP_PARAM};
pub use verify::{LocationVerifier, Verification, UNVERIFIED_REASON};
