//! Selector configuration for listing and detail pages
//!
//! Every field is an ordered fallback list: the first selector that yields a
//! valid value wins. Lists can be overridden from the config file when the
//! marketplace changes its markup.

use serde::{Deserialize, Serialize};

fn list(selectors: &[&str]) -> Vec<String> {
    selectors.iter().map(|s| (*s).to_string()).collect()
}

/// CSS selectors used by the listing and detail parsers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Results container, tried in order
    pub results_container: Vec<String>,

    /// One listing card inside the container
    pub listing_item: Vec<String>,

    pub title: Vec<String>,

    /// Anchors whose `href` is the detail link
    pub link: Vec<String>,

    /// Money elements holding fraction and cents children
    pub price_amount: Vec<String>,

    /// Elements whose whole text is the price
    pub price_text: Vec<String>,

    /// Struck-through money elements
    pub old_price_amount: Vec<String>,

    pub money_fraction: Vec<String>,

    pub money_cents: Vec<String>,

    pub discount: Vec<String>,

    /// Official-store label; a match marks the seller as official
    pub official_store: Vec<String>,

    pub seller: Vec<String>,

    pub rating: Vec<String>,

    pub review_count: Vec<String>,

    pub shipping: Vec<String>,

    pub international: Vec<String>,

    pub fulfillment: Vec<String>,

    pub location: Vec<String>,

    /// Review comment bodies, on detail pages and occasionally on cards
    pub comments: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            results_container: list(&[".ui-search-results", "ol.ui-search-layout"]),
            listing_item: list(&[
                ".ui-search-layout__item",
                ".ui-search-result",
                "[class*=\"ui-search-layout__item\"]",
            ]),
            title: list(&[
                "div[class*=\"ui-search-item__group\"] h2",
                "div[class*=\"ui-search-item__group\"] span",
                ".ui-search-item__title",
                "h2.ui-search-item__title",
                ".poly-component__title",
                ".shops__item-title",
                "div[class*=\"ui-search\"] h2",
            ]),
            link: list(&[
                ".ui-search-item__group__element > a",
                "a.ui-search-link",
                ".poly-component__title",
                "a[href*=\"mercadolivre.com.br\"]",
                ".ui-search-result__content a",
            ]),
            price_amount: list(&[
                ".ui-search-price__second-line .andes-money-amount",
                ".poly-price__current .andes-money-amount",
                ".andes-money-amount:not(.andes-money-amount--previous)",
            ]),
            price_text: list(&[
                "span[class*=\"price-tag\"] .price-tag-fraction",
                ".price-tag-fraction",
                ".price-tag-amount",
            ]),
            old_price_amount: list(&[
                "s.andes-money-amount--previous",
                ".andes-money-amount--previous",
                ".ui-search-price__original-value",
            ]),
            money_fraction: list(&[
                ".andes-money-amount__fraction",
                ".andes-money-amount__integer-part",
            ]),
            money_cents: list(&[
                ".andes-money-amount__cents",
                ".andes-money-amount__fraction-part",
            ]),
            discount: list(&[
                ".ui-search-price__discount",
                ".andes-money-amount__discount",
                ".poly-price__disc_label",
            ]),
            official_store: list(&[".ui-search-official-store-label"]),
            seller: list(&[
                ".ui-search-item__brand-discoverability",
                ".poly-component__seller",
                ".ui-search-item__group__element--seller",
            ]),
            rating: list(&[
                ".ui-pdp-review__rating",
                "span[class*=\"review__rating\"]",
                ".review-summary-average",
                "span[class*=\"ui-search-reviews__rating\"]",
                ".ui-search-reviews__rating-number",
                ".poly-reviews__rating",
            ]),
            review_count: list(&[
                ".ui-pdp-review__amount",
                "span[class*=\"review__amount\"]",
                "span[class*=\"ui-search-reviews__amount\"]",
                ".ui-search-reviews__amount",
                ".poly-reviews__total",
            ]),
            shipping: list(&[
                ".ui-search-item__shipping",
                ".poly-component__shipping",
                "[class*=\"shipping\"]",
            ]),
            international: list(&[
                ".ui-search-item__group__element--international",
                "[class*=\"cbt\"]",
                "[class*=\"international\"]",
            ]),
            fulfillment: list(&[
                ".ui-search-item__fulfillment",
                "[class*=\"fulfillment\"]",
                "svg[aria-label=\"FULL\"]",
            ]),
            location: list(&[".ui-search-item__location", ".ui-search-item__location-label"]),
            comments: list(&[
                "p[class*=\"ui-review-capability-comments__comment__content\"][data-testid=\"comment-content-component\"]",
                "p[class*=\"ui-review-capability-comments__comment__content\"]",
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Selector;

    #[test]
    fn default_selectors_all_compile() {
        let config = SelectorConfig::default();
        let all = [
            &config.results_container,
            &config.listing_item,
            &config.title,
            &config.link,
            &config.price_amount,
            &config.price_text,
            &config.old_price_amount,
            &config.money_fraction,
            &config.money_cents,
            &config.discount,
            &config.official_store,
            &config.seller,
            &config.rating,
            &config.review_count,
            &config.shipping,
            &config.international,
            &config.fulfillment,
            &config.location,
            &config.comments,
        ];
        for selector in all.iter().flat_map(|l| l.iter()) {
            assert!(Selector::parse(selector).is_ok(), "selector failed to compile: {selector}");
        }
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config: SelectorConfig =
            serde_json::from_str(r#"{ "title": [".new-title"] }"#).unwrap();
        assert_eq!(config.title, vec![".new-title".to_string()]);
        assert_eq!(config.results_container, SelectorConfig::default().results_container);
    }
}
