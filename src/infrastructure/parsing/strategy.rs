//! Ordered extraction strategies
//!
//! A [`Cascade`] is a list of (extractor, validity predicate) pairs for one
//! field. Strategies run in declared order and evaluation stops at the first
//! one whose raw value passes the predicate; later strategies never run and
//! results are never merged.

use once_cell::unsync::OnceCell;
use regex::Regex;
use scraper::{ElementRef, Selector};

/// Validity predicate that also converts the accepted raw text.
pub type Accept<T> = fn(&str) -> Option<T>;

/// Text a regex strategy runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    /// The title already extracted for this card
    Title,
    /// All visible text of the card
    CardText,
}

/// How a raw value is pulled out of a listing card.
#[derive(Debug, Clone)]
pub enum Extractor {
    /// Visible text of the first element matching the selector
    Text(Selector),
    /// Attribute of the first element matching the selector
    Attr { selector: Selector, attr: &'static str },
    /// Money element split into integer and cents children, joined as `74,90`
    Amount {
        container: Selector,
        fraction: Vec<Selector>,
        cents: Vec<Selector>,
    },
    /// First capture group of a regex over some text of the card
    Pattern { regex: Regex, source: TextSource },
}

impl Extractor {
    fn extract(&self, card: &CardView<'_>) -> Option<String> {
        match self {
            Self::Text(selector) => card.element.select(selector).next().map(visible_text),
            Self::Attr { selector, attr } => card
                .element
                .select(selector)
                .find_map(|el| el.value().attr(attr))
                .map(|v| v.trim().to_string()),
            Self::Amount { container, fraction, cents } => {
                let money = card.element.select(container).next()?;
                let whole = first_text(money, fraction)?;
                Some(match first_text(money, cents) {
                    Some(c) => format!("{whole},{c}"),
                    None => whole,
                })
            }
            Self::Pattern { regex, source } => {
                let text = match source {
                    TextSource::Title => card.title.as_deref()?,
                    TextSource::CardText => card.text(),
                };
                regex
                    .captures(text)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            }
        }
    }
}

/// One named entry of a cascade.
#[derive(Debug, Clone)]
pub struct Strategy<T> {
    pub name: String,
    pub extractor: Extractor,
    pub accept: Accept<T>,
}

/// Winning value and the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit<'c, T> {
    pub value: T,
    pub strategy: &'c str,
}

/// Ordered strategies for one field.
#[derive(Debug, Clone)]
pub struct Cascade<T> {
    field: &'static str,
    strategies: Vec<Strategy<T>>,
}

impl<T> Cascade<T> {
    pub const fn new(field: &'static str) -> Self {
        Self { field, strategies: Vec::new() }
    }

    pub const fn field(&self) -> &'static str {
        self.field
    }

    /// Adds a strategy at the lowest priority so far.
    #[must_use]
    pub fn then(
        mut self,
        name: impl Into<String>,
        extractor: Extractor,
        accept: Accept<T>,
    ) -> Self {
        self.strategies.push(Strategy { name: name.into(), extractor, accept });
        self
    }

    /// One `Text` strategy per selector, in order.
    #[must_use]
    pub fn then_text(self, label: &str, selectors: &[Selector], accept: Accept<T>) -> Self {
        selectors.iter().enumerate().fold(self, |cascade, (i, sel)| {
            cascade.then(format!("{label}[{i}]"), Extractor::Text(sel.clone()), accept)
        })
    }

    /// One `Attr` strategy per selector, in order.
    #[must_use]
    pub fn then_attr(
        self,
        label: &str,
        selectors: &[Selector],
        attr: &'static str,
        accept: Accept<T>,
    ) -> Self {
        selectors.iter().enumerate().fold(self, |cascade, (i, sel)| {
            cascade.then(
                format!("{label}[{i}]"),
                Extractor::Attr { selector: sel.clone(), attr },
                accept,
            )
        })
    }

    /// One `Amount` strategy per container selector, in order.
    #[must_use]
    pub fn then_amount(
        self,
        label: &str,
        containers: &[Selector],
        fraction: &[Selector],
        cents: &[Selector],
        accept: Accept<T>,
    ) -> Self {
        containers.iter().enumerate().fold(self, |cascade, (i, sel)| {
            cascade.then(
                format!("{label}[{i}]"),
                Extractor::Amount {
                    container: sel.clone(),
                    fraction: fraction.to_vec(),
                    cents: cents.to_vec(),
                },
                accept,
            )
        })
    }

    /// Evaluates strategies in order and returns the first valid value.
    pub fn first_valid(&self, card: &CardView<'_>) -> Option<Hit<'_, T>> {
        self.strategies.iter().find_map(|strategy| {
            let raw = strategy.extractor.extract(card)?;
            (strategy.accept)(&raw).map(|value| Hit { value, strategy: strategy.name.as_str() })
        })
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// A listing card as seen by the cascades. Visible text is computed once.
pub struct CardView<'a> {
    pub element: ElementRef<'a>,
    pub title: Option<String>,
    text: OnceCell<String>,
}

impl<'a> CardView<'a> {
    pub fn new(element: ElementRef<'a>) -> Self {
        Self { element, title: None, text: OnceCell::new() }
    }

    #[must_use]
    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn text(&self) -> &str {
        self.text.get_or_init(|| visible_text(self.element))
    }
}

/// Text nodes of an element, whitespace-collapsed.
pub fn visible_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(element: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .find_map(|sel| element.select(sel).next())
        .map(visible_text)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;
    use std::cell::Cell;

    fn sel(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }

    fn non_empty(raw: &str) -> Option<String> {
        Some(raw.to_string()).filter(|s| !s.is_empty())
    }

    fn long_enough(raw: &str) -> Option<String> {
        Some(raw.to_string()).filter(|s| s.len() > 5)
    }

    fn root(html: &Html) -> ElementRef<'_> {
        html.root_element()
    }

    #[test]
    fn first_valid_strategy_wins() {
        let html = Html::parse_fragment(
            r#"<div><h2 class="a">Tiny</h2><span class="b">Long enough title</span><p class="c">Another long title</p></div>"#,
        );
        let card = CardView::new(root(&html));
        let cascade = Cascade::new("title").then_text(
            "title",
            &[sel(".a"), sel(".b"), sel(".c")],
            long_enough,
        );

        let hit = cascade.first_valid(&card).unwrap();
        assert_eq!(hit.value, "Long enough title");
        assert_eq!(hit.strategy, "title[1]");
    }

    thread_local! {
        static CALLS: Cell<usize> = const { Cell::new(0) };
    }

    fn counting(raw: &str) -> Option<String> {
        CALLS.with(|c| c.set(c.get() + 1));
        non_empty(raw)
    }

    #[test]
    fn later_strategies_are_not_evaluated() {
        let html = Html::parse_fragment(
            r#"<div><span class="a">one</span><span class="b">two</span></div>"#,
        );
        let card = CardView::new(root(&html));
        let cascade = Cascade::new("x").then_text("x", &[sel(".a"), sel(".b")], counting);

        CALLS.with(|c| c.set(0));
        assert_eq!(cascade.first_valid(&card).unwrap().value, "one");
        assert_eq!(CALLS.with(Cell::get), 1);
    }

    #[test]
    fn exhausted_cascade_yields_none() {
        let html = Html::parse_fragment(r#"<div><span class="a">x</span></div>"#);
        let card = CardView::new(root(&html));
        let cascade: Cascade<String> =
            Cascade::new("title").then_text("title", &[sel(".missing"), sel(".a")], long_enough);
        assert!(cascade.first_valid(&card).is_none());
        assert_eq!(cascade.strategy_names(), ["title[0]", "title[1]"]);
    }

    #[test]
    fn amount_joins_fraction_and_cents() {
        let html = Html::parse_fragment(
            r#"<div><span class="money"><span class="sym">R$</span><span class="fr">74</span><span class="ct">90</span></span></div>"#,
        );
        let card = CardView::new(root(&html));
        let cascade = Cascade::new("price").then_amount(
            "price",
            &[sel(".money")],
            &[sel(".fr")],
            &[sel(".ct")],
            non_empty,
        );
        assert_eq!(cascade.first_valid(&card).unwrap().value, "74,90");
    }

    #[test]
    fn pattern_over_title_needs_a_title() {
        let html = Html::parse_fragment("<div>R$ 10,00</div>");
        let regex = Regex::new(r"R\$\s*(\d+,\d{2})").unwrap();
        let cascade = Cascade::new("price").then(
            "title-regex",
            Extractor::Pattern { regex: regex.clone(), source: TextSource::Title },
            non_empty,
        );

        let without_title = CardView::new(root(&html));
        assert!(cascade.first_valid(&without_title).is_none());

        let with_title = CardView::new(root(&html)).with_title(Some("Kit R$ 189,90".into()));
        assert_eq!(cascade.first_valid(&with_title).unwrap().value, "189,90");

        let text_cascade = Cascade::new("price").then(
            "text-regex",
            Extractor::Pattern { regex, source: TextSource::CardText },
            non_empty,
        );
        assert_eq!(text_cascade.first_valid(&without_title).unwrap().value, "10,00");
    }

    #[test]
    fn visible_text_collapses_whitespace() {
        let html = Html::parse_fragment("<h2>  Cartucho HP 664\n  <b>Preto</b> Original </h2>");
        assert_eq!(visible_text(root(&html)), "Cartucho HP 664 Preto Original");
    }
}
