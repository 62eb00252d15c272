//! HTML parsing infrastructure
//!
//! Trait-based parsers over `scraper` documents. Field extraction goes
//! through ordered strategy cascades so that markup changes on the
//! marketplace degrade single fields instead of whole pages.

pub mod config;
pub mod context;
pub mod detail_parser;
pub mod error;
pub mod listing_parser;
pub mod price;
pub mod strategy;

// Re-export public types
pub use config::SelectorConfig;
pub use context::ListingContext;
pub use detail_parser::DetailParser;
pub use error::{ParsingError, ParsingResult};
pub use listing_parser::{ListingPage, ListingParser};
pub use price::normalize_price;

use scraper::{Html, Selector};
use tracing::{debug, warn};

/// Parser trait with context support
pub trait ContextualParser {
    type Output;
    type Context;

    /// Parse HTML with contextual information
    fn parse_with_context(
        &self,
        html: &Html,
        context: &Self::Context,
    ) -> ParsingResult<Self::Output>;
}

/// Compile selector strings, skipping invalid ones.
///
/// Fails only when nothing in the list compiles.
pub fn compile_selectors(selector_strings: &[String]) -> ParsingResult<Vec<Selector>> {
    let mut selectors = Vec::with_capacity(selector_strings.len());
    let mut errors = Vec::new();

    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push(selector),
            Err(e) => {
                warn!("Failed to compile selector '{}': {}", selector_str, e);
                errors.push((selector_str.as_str(), e.to_string()));
            }
        }
    }

    if selectors.is_empty() {
        let (selector, reason) = errors
            .first()
            .map_or(("<empty list>", "no selectors configured".to_string()), |(s, r)| {
                (*s, r.clone())
            });
        return Err(ParsingError::invalid_selector(selector, reason));
    }

    if !errors.is_empty() {
        debug!("{} of {} selectors failed to compile", errors.len(), selector_strings.len());
    }

    Ok(selectors)
}
