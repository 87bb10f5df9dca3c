//! Turns fetched page content into egg price observations.

use std::str::FromStr;
use std::sync::LazyLock;

use eggdb_core::{ChainProfile, EggType, PriceObservation};
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::error::{ExtractionError, ScraperError};
use crate::jsonld;

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$?(\d+\.\d{2})").expect("valid regex"));

static STRIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)>")
        .expect("valid regex")
});

static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?(?:p|div|li|ul|ol|tr|td|th|table|br|hr|h[1-6]|section|article|header|footer|span|a|button)\b[^>]*>",
    )
    .expect("valid regex")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

const EXCLUDED_TERMS: [&str; 5] = ["egg white", "substitute", "eggplant", "egg noodle", "eggnog"];

const OUT_OF_STOCK_MARKERS: [&str; 4] = ["out of stock", "sold out", "unavailable", "not available"];

/// Lines scanned after an egg title when looking for its price.
const LINE_WINDOW: usize = 4;

/// First `$d.dd` / `d.dd` amount in `text`.
#[must_use]
pub fn extract_price(text: &str) -> Option<Decimal> {
    let cap = PRICE_RE.captures(text)?;
    Decimal::from_str(cap.get(1)?.as_str()).ok()
}

/// `true` when the title names an egg product that is not one of the
/// known look-alikes.
#[must_use]
pub fn is_egg_product(title: &str) -> bool {
    let lowered = title.to_lowercase();
    lowered.contains("egg") && !EXCLUDED_TERMS.iter().any(|t| lowered.contains(t))
}

fn signals_out_of_stock(text: &str) -> bool {
    let lowered = text.to_lowercase();
    OUT_OF_STOCK_MARKERS.iter().any(|m| lowered.contains(m))
}

pub(crate) fn looks_like_bot_challenge(body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    let has_cloudflare_banner = lowered.contains("attention required! | cloudflare");
    let has_challenge_platform = lowered.contains("/cdn-cgi/challenge-platform/");
    let has_just_a_moment = lowered.contains("just a moment...");
    let has_cookie_gate = lowered.contains("please enable cookies");
    let has_cf_chl = lowered.contains("cf-chl-");
    let has_human_check = lowered.contains("verify you are human")
        || lowered.contains("are you a robot")
        || lowered.contains("px-captcha");

    has_cloudflare_banner
        || has_challenge_platform
        || has_human_check
        || (has_just_a_moment && has_cookie_gate)
        || (has_just_a_moment && has_cf_chl)
}

/// One product entry before filtering.
#[derive(Debug)]
struct Candidate {
    title: String,
    price: Option<Decimal>,
    in_stock: bool,
}

impl Candidate {
    fn from_text(title: &str, text: &str) -> Self {
        Self {
            title: title.trim().to_string(),
            price: extract_price(text),
            in_stock: !signals_out_of_stock(text),
        }
    }
}

/// Extracts price observations from fetched content.
///
/// Candidate entries come from the chain's CSS selectors when configured
/// and matching, then JSON-LD `Product` nodes, then text lines.
#[derive(Debug, Clone, Default)]
pub struct ProductExtractor {
    product_selector: Option<Selector>,
    title_selector: Option<Selector>,
}

impl ProductExtractor {
    /// Extractor without chain-specific selectors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor using the chain profile's selectors, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidSelector`] if a configured selector does
    /// not parse.
    pub fn for_chain(profile: Option<&ChainProfile>) -> Result<Self, ScraperError> {
        let Some(profile) = profile else {
            return Ok(Self::new());
        };
        let parse = |selector: Option<&str>| -> Result<Option<Selector>, ScraperError> {
            selector
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    Selector::parse(s).map_err(|e| ScraperError::InvalidSelector {
                        chain: profile.name.clone(),
                        selector: s.to_string(),
                        reason: e.to_string(),
                    })
                })
                .transpose()
        };
        Ok(Self {
            product_selector: parse(profile.product_selector.as_deref())?,
            title_selector: parse(profile.title_selector.as_deref())?,
        })
    }

    /// Reads every priced egg product on the page.
    ///
    /// Entries without a parseable positive price are dropped silently.
    ///
    /// # Errors
    ///
    /// - [`ExtractionError::EmptyContent`] for blank content.
    /// - [`ExtractionError::BotChallenge`] for an anti-bot interstitial.
    /// - [`ExtractionError::NoObservations`] when nothing usable is found.
    pub fn extract(&self, content: &str) -> Result<Vec<PriceObservation>, ExtractionError> {
        if content.trim().is_empty() {
            return Err(ExtractionError::EmptyContent);
        }
        if looks_like_bot_challenge(content) {
            return Err(ExtractionError::BotChallenge);
        }

        let mut candidates = self.selector_candidates(content);
        if candidates.is_empty() {
            candidates = jsonld_candidates(content);
        }
        if candidates.is_empty() {
            candidates = text_candidates(content);
        }

        let observations: Vec<PriceObservation> = candidates
            .into_iter()
            .filter(|c| is_egg_product(&c.title))
            .filter_map(|c| {
                let price = c.price.filter(|p| *p > Decimal::ZERO)?;
                Some(PriceObservation {
                    price,
                    egg_type: EggType::from_title(&c.title),
                    in_stock: c.in_stock,
                })
            })
            .collect();

        if observations.is_empty() {
            return Err(ExtractionError::NoObservations);
        }
        Ok(observations)
    }

    fn selector_candidates(&self, content: &str) -> Vec<Candidate> {
        let Some(product_selector) = &self.product_selector else {
            return Vec::new();
        };
        let document = Html::parse_document(content);
        document
            .select(product_selector)
            .map(|tile| {
                let text = element_text(tile);
                let title = self
                    .title_selector
                    .as_ref()
                    .and_then(|sel| tile.select(sel).next())
                    .map_or_else(|| text.clone(), element_text);
                Candidate::from_text(&title, &text)
            })
            .collect()
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn jsonld_candidates(content: &str) -> Vec<Candidate> {
    jsonld::nodes(content)
        .iter()
        .filter(|n| jsonld::has_type(n, &["Product"]))
        .filter_map(|product| {
            let title = jsonld::text_field(product, "name")?;
            let offer = match product.get("offers") {
                Some(Value::Array(offers)) => offers.first().cloned(),
                Some(offer @ Value::Object(_)) => Some(offer.clone()),
                _ => None,
            };
            let price = offer
                .as_ref()
                .and_then(|o| {
                    jsonld::text_field(o, "price").or_else(|| jsonld::text_field(o, "lowPrice"))
                })
                .and_then(|p| Decimal::from_str(p.trim_start_matches('$')).ok())
                .map(|p| p.round_dp(2));
            let in_stock = offer
                .as_ref()
                .and_then(|o| jsonld::text_field(o, "availability"))
                .is_none_or(|a| {
                    let lowered = a.to_lowercase();
                    !(lowered.contains("outofstock")
                        || lowered.contains("soldout")
                        || lowered.contains("discontinued"))
                });
            Some(Candidate {
                title,
                price,
                in_stock,
            })
        })
        .collect()
}

/// Block-level lines of the page with markup removed.
fn text_lines(content: &str) -> Vec<String> {
    let without_scripts = STRIP_RE.replace_all(content, "\n");
    let with_breaks = BLOCK_TAG_RE.replace_all(&without_scripts, "\n");
    let plain = TAG_RE.replace_all(&with_breaks, " ");
    plain
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&#36;", "$")
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect()
}

/// Groups text lines into products. An egg line opens a product and the
/// next [`LINE_WINDOW`] lines belong to it. A later egg line opens a new
/// product only once the open one has a price or when it carries its own
/// price; otherwise it is a subtitle of the open product.
fn text_candidates(content: &str) -> Vec<Candidate> {
    struct Open<'a> {
        title: &'a str,
        lines: Vec<&'a str>,
        priced: bool,
    }

    impl Open<'_> {
        fn close(self) -> Candidate {
            Candidate::from_text(self.title, &self.lines.join(" "))
        }
    }

    let lines = text_lines(content);
    let mut candidates = Vec::new();
    let mut open: Option<Open<'_>> = None;

    for line in &lines {
        let is_egg = line.to_lowercase().contains("egg");
        let has_price = extract_price(line).is_some();

        if let Some(current) = open.as_mut() {
            let starts_new = is_egg && (current.priced || has_price);
            if !starts_new && current.lines.len() <= LINE_WINDOW {
                current.lines.push(line);
                current.priced |= has_price;
                continue;
            }
            if let Some(done) = open.take() {
                candidates.push(done.close());
            }
        }

        if is_egg {
            open = Some(Open {
                title: line,
                lines: vec![line],
                priced: has_price,
            });
        }
    }

    candidates.extend(open.map(Open::close));
    candidates
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
