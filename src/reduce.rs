//! Markup reduction
//!
//! Rendered listings pages run to hundreds of kilobytes of chrome, nav and
//! script tags. Before the page is handed to the extraction model we cut it
//! down to the container element that actually holds the listing cards. The
//! reduction is best-effort: if the container is missing or the selector is
//! bad we keep the full page rather than fail the scrape.

use scraper::{Html, Selector};
use tracing::{debug, warn};

/// Reduce a page to the outer HTML of the first element matching
/// `container_selector`. Returns the input unchanged when the selector does
/// not parse or matches nothing.
pub fn reduce_markup(html: &str, container_selector: &str) -> String {
    let selector = match Selector::parse(container_selector) {
        Ok(selector) => selector,
        Err(e) => {
            warn!(
                "Invalid container selector {:?}, keeping full page: {}",
                container_selector, e
            );
            return html.to_string();
        }
    };

    let document = Html::parse_document(html);

    match document.select(&selector).next() {
        Some(element) => {
            let reduced = element.html();
            debug!(
                "Reduced markup {} -> {} bytes via {:?}",
                html.len(),
                reduced.len(),
                container_selector
            );
            reduced
        }
        None => {
            debug!(
                "Container {:?} not found, keeping full page",
                container_selector
            );
            html.to_string()
        }
    }
}
