//! `catalog check` command.

use std::fmt::Write as _;
use std::path::Path;

use eggdb_core::Catalog;
use eggdb_scraper::UrlFormatter;

/// Loads and validates the catalog at `path`, then prints each location's
/// formatted request URL.
///
/// # Errors
///
/// Returns an error if the catalog fails to load or validate, or if any
/// location's URL template cannot be formatted.
pub(crate) fn run_catalog_check(path: &Path) -> anyhow::Result<()> {
    let catalog = eggdb_core::load_catalog(path)?;
    let (report, failures) = render_catalog(&catalog);
    print!("{report}");
    if failures > 0 {
        anyhow::bail!("{failures} catalog location(s) have unusable URL templates");
    }
    Ok(())
}

/// Returns the printable report and the number of locations that failed to
/// format.
pub(crate) fn render_catalog(catalog: &Catalog) -> (String, usize) {
    let formatter = UrlFormatter::from_catalog(catalog);
    let mut out = String::new();
    let mut failures = 0;

    let _ = writeln!(
        out,
        "{} chain(s), {} location(s)",
        catalog.chains().len(),
        catalog.len()
    );
    for chain in catalog.chains().iter().filter(|c| !c.has_live_scraper) {
        let mode = if chain.fallback_prices.is_some() {
            "fallback estimates"
        } else {
            "no live scraper, no fallback prices"
        };
        let _ = writeln!(out, "  note: {} uses {mode}", chain.name);
    }

    for location in catalog.locations() {
        match formatter.format_location(location) {
            Ok(request) => {
                let _ = writeln!(
                    out,
                    "  {:<20} {}  {}",
                    location.chain, location.zip_code, request.url
                );
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(
                    chain = %location.chain,
                    zip = %location.zip_code,
                    error = %e,
                    "unusable url template"
                );
                let _ = writeln!(
                    out,
                    "  {:<20} {}  ERROR: {e}",
                    location.chain, location.zip_code
                );
            }
        }
    }

    (out, failures)
}
