//! Parsing error types
//!
//! Every variant is local to one page or one listing card. Callers log and
//! skip; none of these aborts a run.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParsingError {
    /// No results container matched. An empty page, not a failure.
    #[error("results container not found (tried {} selectors)", tried_selectors.len())]
    ContainerNotFound { tried_selectors: Vec<String> },

    /// No strategy produced a valid value for a field the record needs.
    #[error("required field '{field}' not found after {} strategies", attempted_strategies.len())]
    RequiredFieldMissing {
        field: &'static str,
        attempted_strategies: Vec<String>,
    },

    /// A price or rating string could not be parsed.
    #[error("cannot normalize {field} from '{input}'")]
    Normalization { field: &'static str, input: String },

    #[error("invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("cannot resolve link '{href}' against {base}")]
    UrlResolution { href: String, base: String },
}

impl ParsingError {
    pub fn required_field_missing(field: &'static str, attempted_strategies: Vec<String>) -> Self {
        Self::RequiredFieldMissing { field, attempted_strategies }
    }

    pub fn normalization(field: &'static str, input: &str) -> Self {
        Self::Normalization { field, input: input.to_string() }
    }

    pub fn invalid_selector(selector: &str, reason: impl ToString) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the pipeline can carry on past this error.
    ///
    /// Only selector configuration errors are not; they need an operator.
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidSelector { .. })
    }

    /// Whether the listing card must be dropped.
    pub const fn discards_item(&self) -> bool {
        matches!(self, Self::RequiredFieldMissing { .. } | Self::UrlResolution { .. })
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
