//! Listing page parser
//!
//! Locates the results container with a prioritized selector list, then runs
//! one [`Cascade`] per field over each listing card. A card without a valid
//! title or link is discarded; every other field degrades to null/false.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::config::SelectorConfig;
use super::context::ListingContext;
use super::detail_parser::unique_texts;
use super::price::{
    PRICE_IN_TEXT, RATING_IN_TEXT, accept_count, accept_discount, accept_price, accept_rating,
};
use super::strategy::{CardView, Cascade, Extractor, TextSource};
use super::{ContextualParser, ParsingError, ParsingResult, compile_selectors};
use crate::domain::product::{ProductRecord, is_valid_title};
use crate::domain::title_analysis::{self, TitleTraits};

const OFFICIAL_STORE_LABEL: &str = "official-store";

static INTERNATIONAL_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(compra internacional|internacional)\b").expect("valid regex"));

/// Everything one listing page yielded.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    /// Whether any container selector matched
    pub container_found: bool,
    /// Cards considered on the page
    pub cards_seen: usize,
    pub records: Vec<ProductRecord>,
    /// Why the other cards were dropped
    pub discarded: Vec<ParsingError>,
}

impl ListingPage {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Parser for marketplace search result pages
pub struct ListingParser {
    containers: Vec<Selector>,
    container_names: Vec<String>,
    items: Vec<Selector>,
    title: Cascade<String>,
    link: Cascade<String>,
    price: Cascade<f64>,
    old_price: Cascade<f64>,
    discount: Cascade<u8>,
    seller: Cascade<String>,
    rating: Cascade<f64>,
    review_count: Cascade<u32>,
    free_shipping: Cascade<bool>,
    international: Cascade<bool>,
    fulfillment: Cascade<bool>,
    location: Cascade<String>,
    comments: Vec<Selector>,
}

impl ListingParser {
    /// Create a parser with the default marketplace selectors
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&SelectorConfig::default())
    }

    /// Create parser with custom selector configuration
    pub fn with_config(selectors: &SelectorConfig) -> ParsingResult<Self> {
        let fraction = compile_selectors(&selectors.money_fraction)?;
        let cents = compile_selectors(&selectors.money_cents)?;

        let price = Cascade::new("price")
            .then_amount(
                "price-amount",
                &compile_selectors(&selectors.price_amount)?,
                &fraction,
                &cents,
                accept_price,
            )
            .then_text("price-text", &compile_selectors(&selectors.price_text)?, accept_price)
            .then(
                "title-regex",
                Extractor::Pattern { regex: PRICE_IN_TEXT.clone(), source: TextSource::Title },
                accept_price,
            )
            .then(
                "card-text-regex",
                Extractor::Pattern { regex: PRICE_IN_TEXT.clone(), source: TextSource::CardText },
                accept_price,
            );

        let seller = Cascade::new("seller")
            .then_text(
                OFFICIAL_STORE_LABEL,
                &compile_selectors(&selectors.official_store)?,
                accept_seller,
            )
            .then_text("seller", &compile_selectors(&selectors.seller)?, accept_seller);

        let rating = Cascade::new("rating")
            .then_text("rating", &compile_selectors(&selectors.rating)?, accept_rating)
            .then(
                "rating-text",
                Extractor::Pattern { regex: RATING_IN_TEXT.clone(), source: TextSource::CardText },
                accept_rating,
            );

        let international = Cascade::new("international")
            .then_text(
                "international",
                &compile_selectors(&selectors.international)?,
                accept_present,
            )
            .then(
                "international-text",
                Extractor::Pattern {
                    regex: INTERNATIONAL_TEXT.clone(),
                    source: TextSource::CardText,
                },
                accept_present,
            );

        Ok(Self {
            containers: compile_selectors(&selectors.results_container)?,
            container_names: selectors.results_container.clone(),
            items: compile_selectors(&selectors.listing_item)?,
            title: Cascade::new("title").then_text(
                "title",
                &compile_selectors(&selectors.title)?,
                accept_title,
            ),
            link: Cascade::new("link").then_attr(
                "link",
                &compile_selectors(&selectors.link)?,
                "href",
                accept_link,
            ),
            price,
            old_price: Cascade::new("old_price").then_amount(
                "old-price",
                &compile_selectors(&selectors.old_price_amount)?,
                &fraction,
                &cents,
                accept_price,
            ),
            discount: Cascade::new("discount")
                .then_text("discount", &compile_selectors(&selectors.discount)?, accept_discount),
            seller,
            rating,
            review_count: Cascade::new("review_count").then_text(
                "review-count",
                &compile_selectors(&selectors.review_count)?,
                accept_count,
            ),
            free_shipping: Cascade::new("free_shipping").then_text(
                "shipping",
                &compile_selectors(&selectors.shipping)?,
                accept_free_shipping,
            ),
            international,
            fulfillment: Cascade::new("is_full").then_text(
                "fulfillment",
                &compile_selectors(&selectors.fulfillment)?,
                accept_present,
            ),
            location: Cascade::new("location")
                .then_text("location", &compile_selectors(&selectors.location)?, accept_non_empty),
            comments: compile_selectors(&selectors.comments)?,
        })
    }

    /// Parses raw markup. A page without a results container is an empty page.
    pub fn parse_listing(&self, markup: &str, context: &ListingContext) -> ListingPage {
        let html = Html::parse_document(markup);
        match self.parse_with_context(&html, context) {
            Ok(page) => page,
            Err(ParsingError::ContainerNotFound { tried_selectors }) => {
                debug!(
                    term = %context.query.term,
                    tried = tried_selectors.len(),
                    "No results container on listing page"
                );
                ListingPage::empty()
            }
            Err(e) => {
                warn!(term = %context.query.term, error = %e, "Listing page could not be parsed");
                ListingPage::empty()
            }
        }
    }

    /// First container selector that matches, in priority order.
    pub fn locate_results<'a>(&self, html: &'a Html) -> ParsingResult<ElementRef<'a>> {
        self.containers
            .iter()
            .find_map(|selector| html.select(selector).next())
            .ok_or_else(|| ParsingError::ContainerNotFound {
                tried_selectors: self.container_names.clone(),
            })
    }

    /// Cards of the first item selector that finds any inside the container.
    pub fn listing_cards<'a>(&self, container: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        self.items
            .iter()
            .map(|selector| container.select(selector).collect::<Vec<_>>())
            .find(|cards| !cards.is_empty())
            .unwrap_or_default()
    }

    /// Extract one record from a listing card
    pub fn extract_card(
        &self,
        element: ElementRef<'_>,
        context: &ListingContext,
    ) -> ParsingResult<ProductRecord> {
        let card = CardView::new(element);

        let title = self
            .title
            .first_valid(&card)
            .map(|hit| hit.value)
            .ok_or_else(|| {
                ParsingError::required_field_missing("title", self.title.strategy_names())
            })?;
        let card = card.with_title(Some(title.clone()));

        let href = self
            .link
            .first_valid(&card)
            .map(|hit| hit.value)
            .ok_or_else(|| {
                ParsingError::required_field_missing("link", self.link.strategy_names())
            })?;
        let link = resolve_link(&href, &context.site_url)?;

        let price = self.price.first_valid(&card).map(|hit| hit.value);
        if price.is_none() && context.require_price {
            return Err(ParsingError::required_field_missing("price", self.price.strategy_names()));
        }

        let seller_hit = self.seller.first_valid(&card);
        let traits = TitleTraits::from_title(&title);

        let mut record =
            ProductRecord::new(title, link, context.query.term.clone(), context.extracted_at);
        record.price = price;
        record.old_price = self.old_price.first_valid(&card).map(|hit| hit.value);
        record.discount_percent = self.discount.first_valid(&card).map(|hit| hit.value);
        record.is_official_store = seller_hit
            .as_ref()
            .is_some_and(|hit| hit.strategy.starts_with(OFFICIAL_STORE_LABEL));
        record.seller = seller_hit.map(|hit| hit.value);
        let authorized = &context.query.authorized_sellers;
        record.is_authorized_seller = match (&record.seller, authorized.is_empty()) {
            (Some(seller), false) => {
                Some(title_analysis::is_authorized_seller(seller, authorized))
            }
            _ => None,
        };
        record.rating = self.rating.first_valid(&card).map(|hit| hit.value);
        record.review_count = self.review_count.first_valid(&card).map_or(0, |hit| hit.value);
        record.free_shipping = self.free_shipping.first_valid(&card).is_some_and(|hit| hit.value);
        record.is_international =
            self.international.first_valid(&card).is_some_and(|hit| hit.value);
        record.is_full = self.fulfillment.first_valid(&card).is_some_and(|hit| hit.value);
        record.location = self.location.first_valid(&card).map(|hit| hit.value);
        record.comments = unique_texts(element, &self.comments);
        record.is_original = traits.is_original;
        record.is_remanufactured = traits.is_remanufactured;
        record.cartridge_model = title_analysis::cartridge_model(&record.title);
        record.part_number = title_analysis::part_number(&record.title);
        record.catalog_item_id = context.query.catalog_item_id;
        record.catalog_pn.clone_from(&context.query.part_number);

        Ok(record)
    }
}

impl ContextualParser for ListingParser {
    type Output = ListingPage;
    type Context = ListingContext;

    fn parse_with_context(
        &self,
        html: &Html,
        context: &Self::Context,
    ) -> ParsingResult<Self::Output> {
        let container = self.locate_results(html)?;
        let mut cards = self.listing_cards(container);
        if let Some(max) = context.max_items {
            cards.truncate(max);
        }

        let mut page = ListingPage {
            container_found: true,
            cards_seen: cards.len(),
            ..ListingPage::default()
        };

        for (index, card) in cards.into_iter().enumerate() {
            match self.extract_card(card, context) {
                Ok(record) => page.records.push(record),
                Err(e) => {
                    debug!(
                        term = %context.query.term,
                        index,
                        error = %e,
                        "Discarding listing card"
                    );
                    page.discarded.push(e);
                }
            }
        }

        debug!(
            term = %context.query.term,
            cards = page.cards_seen,
            records = page.records.len(),
            "Parsed listing page"
        );
        Ok(page)
    }
}

/// Resolve relative and protocol-relative links against the site URL.
pub fn resolve_link(href: &str, base: &str) -> ParsingResult<String> {
    let resolution_error = || ParsingError::UrlResolution {
        href: href.to_string(),
        base: base.to_string(),
    };
    let url = Url::parse(base)
        .and_then(|base| base.join(href))
        .map_err(|_| resolution_error())?;
    if matches!(url.scheme(), "http" | "https") {
        Ok(url.into())
    } else {
        Err(resolution_error())
    }
}

fn accept_title(raw: &str) -> Option<String> {
    is_valid_title(raw).then(|| raw.trim().to_string())
}

fn accept_link(raw: &str) -> Option<String> {
    let href = raw.trim();
    let usable = !href.is_empty() && !href.starts_with('#') && !href.starts_with("javascript:");
    usable.then(|| href.to_string())
}

fn accept_seller(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    let name = ["vendido por ", "por "]
        .iter()
        .find(|prefix| lower.starts_with(*prefix))
        .and_then(|prefix| trimmed.get(prefix.len()..))
        .unwrap_or(trimmed)
        .trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn accept_non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn accept_present(_raw: &str) -> Option<bool> {
    Some(true)
}

fn accept_free_shipping(raw: &str) -> Option<bool> {
    let lower = raw.to_lowercase();
    (lower.contains("frete grátis") || lower.contains("frete gratis")).then_some(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::SearchQuery;

    const SITE: &str = "https://www.mercadolivre.com.br/";

    fn context(term: &str) -> ListingContext {
        ListingContext::new(SearchQuery::ad_hoc(term), SITE)
    }

    fn page(cards: &str) -> String {
        format!(
            r#"<html><body><section class="ui-search-results"><ol class="ui-search-layout">{cards}</ol></section></body></html>"#
        )
    }

    const ORIGINAL_CARD: &str = r#"
        <li class="ui-search-layout__item">
          <div class="ui-search-result__content">
            <div class="ui-search-item__group ui-search-item__group--title">
              <a class="ui-search-link" href="https://produto.mercadolivre.com.br/MLB-1-cartucho-hp-664">
                <h2 class="ui-search-item__title">Cartucho HP 664 Preto Original</h2>
              </a>
            </div>
            <p class="ui-search-official-store-label">Vendido por HP</p>
            <div class="ui-search-price__second-line">
              <span class="andes-money-amount">
                <span class="andes-money-amount__currency-symbol">R$</span>
                <span class="andes-money-amount__fraction">74</span>
                <span class="andes-money-amount__cents">90</span>
              </span>
            </div>
            <span class="ui-search-reviews__rating-number">4,8</span>
            <span class="ui-search-reviews__amount">(1.234)</span>
            <p class="ui-search-item__shipping">Frete grátis</p>
          </div>
        </li>"#;

    #[test]
    fn extracts_full_card() {
        let parser = ListingParser::new().unwrap();
        let page = parser.parse_listing(&page(ORIGINAL_CARD), &context("hp 664"));

        assert!(page.container_found);
        assert_eq!(page.cards_seen, 1);
        let record = &page.records[0];
        assert_eq!(record.title, "Cartucho HP 664 Preto Original");
        assert_eq!(record.link, "https://produto.mercadolivre.com.br/MLB-1-cartucho-hp-664");
        assert_eq!(record.price, Some(74.90));
        assert_eq!(record.seller.as_deref(), Some("HP"));
        assert!(record.is_official_store);
        assert_eq!(record.rating, Some(4.8));
        assert_eq!(record.review_count, 1234);
        assert!(record.free_shipping);
        assert!(record.is_original);
        assert!(!record.is_remanufactured);
        assert_eq!(record.cartridge_model.as_deref(), Some("HP 664"));
        assert_eq!(record.search_term, "hp 664");
        assert!(record.comments.is_empty());
    }

    #[test]
    fn price_falls_back_to_title_regex() {
        let card = r#"
            <li class="ui-search-layout__item">
              <a class="ui-search-link" href="/MLB-2-kit-hp-711">
                <h2 class="ui-search-item__title">Kit HP 711 R$189,90</h2>
              </a>
            </li>"#;
        let parser = ListingParser::new().unwrap();
        let page = parser.parse_listing(&page(card), &context("hp 711"));

        let record = &page.records[0];
        assert_eq!(record.price, Some(189.90));
        assert_eq!(record.link, "https://www.mercadolivre.com.br/MLB-2-kit-hp-711");
        assert_eq!(record.review_count, 0);
        assert!(record.rating.is_none());
        assert!(record.seller.is_none());
    }

    #[test]
    fn out_of_range_rating_is_discarded_not_clamped() {
        let card = r#"
            <li class="ui-search-layout__item">
              <a class="ui-search-link" href="/MLB-3"><h2 class="ui-search-item__title">Cartucho HP 662 Colorido</h2></a>
              <span class="ui-search-reviews__rating-number">47</span>
            </li>"#;
        let parser = ListingParser::new().unwrap();
        let page = parser.parse_listing(&page(card), &context("hp 662"));
        assert_eq!(page.records[0].rating, None);
    }

    #[test]
    fn short_titles_drop_the_card() {
        let cards = r#"
            <li class="ui-search-layout__item">
              <a class="ui-search-link" href="/MLB-4"><h2 class="ui-search-item__title">HP</h2></a>
            </li>
            <li class="ui-search-layout__item">
              <a class="ui-search-link" href="/MLB-5"><h2 class="ui-search-item__title">Cartucho HP 667 Preto</h2></a>
            </li>"#;
        let parser = ListingParser::new().unwrap();
        let page = parser.parse_listing(&page(cards), &context("hp 667"));

        assert_eq!(page.cards_seen, 2);
        assert_eq!(page.records.len(), 1);
        assert!(page.records.iter().all(ProductRecord::has_valid_title));
        assert!(matches!(
            page.discarded[0],
            ParsingError::RequiredFieldMissing { field: "title", .. }
        ));
    }

    #[test]
    fn missing_container_is_an_empty_page() {
        let parser = ListingParser::new().unwrap();
        let page =
            parser.parse_listing("<html><body><p>Nada encontrado</p></body></html>", &context("x"));
        assert!(!page.container_found);
        assert!(page.records.is_empty());

        let html = Html::parse_document("<html><body></body></html>");
        assert!(matches!(
            parser.parse_with_context(&html, &context("x")),
            Err(ParsingError::ContainerNotFound { .. })
        ));
    }

    #[test]
    fn second_container_selector_is_used() {
        let markup = r#"<html><body><ol class="ui-search-layout">
            <li class="ui-search-layout__item"><a class="ui-search-link" href="/MLB-6"><h2 class="ui-search-item__title">Cartucho HP 664 Tricolor</h2></a></li>
        </ol></body></html>"#;
        let parser = ListingParser::new().unwrap();
        let page = parser.parse_listing(markup, &context("hp 664"));
        assert!(page.container_found);
        assert_eq!(page.records.len(), 1);
    }

    #[test]
    fn require_price_drops_priceless_cards() {
        let card = r#"
            <li class="ui-search-layout__item">
              <a class="ui-search-link" href="/MLB-7"><h2 class="ui-search-item__title">Cartucho HP 664 Preto</h2></a>
            </li>"#;
        let parser = ListingParser::new().unwrap();
        let ctx = context("hp 664").with_require_price(true);
        let page = parser.parse_listing(&page(card), &ctx);
        assert!(page.records.is_empty());
        assert!(matches!(
            page.discarded[0],
            ParsingError::RequiredFieldMissing { field: "price", .. }
        ));
    }

    #[test]
    fn card_comments_are_deduplicated() {
        let card = r#"
            <li class="ui-search-layout__item">
              <a class="ui-search-link" href="/MLB-8"><h2 class="ui-search-item__title">Cartucho HP 664 Preto</h2></a>
              <p class="ui-review-capability-comments__comment__content" data-testid="comment-content-component">Muito bom</p>
              <p class="ui-review-capability-comments__comment__content" data-testid="comment-content-component">Muito bom</p>
              <p class="ui-review-capability-comments__comment__content" data-testid="comment-content-component">Chegou rápido</p>
            </li>"#;
        let parser = ListingParser::new().unwrap();
        let page = parser.parse_listing(&page(card), &context("hp 664"));
        assert_eq!(page.records[0].comments, ["Muito bom", "Chegou rápido"]);
    }

    #[test]
    fn catalog_context_is_carried_onto_records() {
        let card = r#"
            <li class="ui-search-layout__item">
              <a class="ui-search-link" href="/MLB-9"><h2 class="ui-search-item__title">Cartucho HP 664 Preto 3YM79AB</h2></a>
              <span class="ui-search-item__brand-discoverability">por Loja Oficial HP</span>
            </li>"#;
        let mut query = SearchQuery::ad_hoc("cartucho hp 664");
        query.catalog_item_id = Some(42);
        query.part_number = Some("F6V29AB".into());
        query.authorized_sellers = vec!["HP".into()];
        let parser = ListingParser::new().unwrap();
        let page = parser.parse_listing(&page(card), &ListingContext::new(query, SITE));

        let record = &page.records[0];
        assert_eq!(record.seller.as_deref(), Some("Loja Oficial HP"));
        assert!(!record.is_official_store);
        assert_eq!(record.is_authorized_seller, Some(true));
        assert_eq!(record.catalog_item_id, Some(42));
        assert_eq!(record.catalog_pn.as_deref(), Some("F6V29AB"));
        assert_eq!(record.part_number.as_deref(), Some("3YM79AB"));
    }

    #[test]
    fn max_items_truncates_cards() {
        let cards = (0..5)
            .map(|i| {
                format!(
                    r#"<li class="ui-search-layout__item"><a class="ui-search-link" href="/MLB-{i}"><h2 class="ui-search-item__title">Cartucho numero {i}</h2></a></li>"#
                )
            })
            .collect::<String>();
        let parser = ListingParser::new().unwrap();
        let page = parser.parse_listing(&page(&cards), &context("x").with_max_items(Some(2)));
        assert_eq!(page.cards_seen, 2);
        assert_eq!(page.records.len(), 2);
    }

    #[test]
    fn links_resolve_against_site() {
        assert_eq!(
            resolve_link("//produto.mercadolivre.com.br/MLB-1", SITE).unwrap(),
            "https://produto.mercadolivre.com.br/MLB-1"
        );
        assert!(resolve_link("mailto:x@y.z", SITE).is_err());
    }
}
