//! Product detail page parser: review comments.

use indexmap::IndexSet;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::config::SelectorConfig;
use super::strategy::visible_text;
use super::{ContextualParser, ParsingResult, compile_selectors};

/// Comment texts under `root` for the first selector that finds any,
/// exact repeats removed, page order kept.
pub fn unique_texts(root: ElementRef<'_>, selectors: &[Selector]) -> Vec<String> {
    selectors
        .iter()
        .map(|selector| {
            root.select(selector)
                .map(visible_text)
                .filter(|text| !text.is_empty())
                .collect::<IndexSet<_>>()
        })
        .find(|texts| !texts.is_empty())
        .map(|texts| texts.into_iter().collect())
        .unwrap_or_default()
}

/// Parser for the review section of a product detail page
pub struct DetailParser {
    comment_selectors: Vec<Selector>,
}

impl DetailParser {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&SelectorConfig::default())
    }

    pub fn with_config(selectors: &SelectorConfig) -> ParsingResult<Self> {
        Ok(Self {
            comment_selectors: compile_selectors(&selectors.comments)?,
        })
    }

    /// Deduplicated review comments found in raw detail markup.
    pub fn parse_comments(&self, markup: &str) -> Vec<String> {
        let html = Html::parse_document(markup);
        self.parse_with_context(&html, &()).unwrap_or_default()
    }
}

impl ContextualParser for DetailParser {
    type Output = Vec<String>;
    type Context = ();

    fn parse_with_context(
        &self,
        html: &Html,
        _context: &Self::Context,
    ) -> ParsingResult<Self::Output> {
        let comments = unique_texts(html.root_element(), &self.comment_selectors);
        debug!(count = comments.len(), "Parsed detail page comments");
        Ok(comments)
    }
}
