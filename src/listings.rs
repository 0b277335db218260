//! Listing Data Model
//!
//! Wire types for the `scrape_listings` tool. Every field is optional because
//! extraction is best-effort: the model omits whatever it cannot find in the
//! markup. Duplicates are possible and are not deduplicated.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single extracted real-estate listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListingItem {
    pub title: Option<String>,
    pub location: Option<String>,
    pub price: Option<String>,
    pub bedrooms: Option<String>,
    pub bathrooms: Option<String>,
    pub area: Option<String>,
    pub realtor: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
}

/// The tool's sole return type: an ordered sequence of listings.
///
/// Invariant: `listings` is always present, possibly empty. The pipeline
/// never returns null/absent, including on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListingResponse {
    pub listings: Vec<ListingItem>,
}

impl ListingResponse {
    /// The failure value of the pipeline: a valid response with no listings.
    pub fn empty() -> Self {
        Self {
            listings: Vec::new(),
        }
    }
}
