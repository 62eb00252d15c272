//! Locale number normalization (pt-BR: `.` groups thousands, `,` is decimal).

use once_cell::sync::Lazy;
use regex::Regex;

use super::{ParsingError, ParsingResult};

/// Price inside free text, e.g. `R$ 1.234,56` or `R$189,90`.
pub static PRICE_IN_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"R\$\s*(\d+(?:\.\d{3})*(?:,\d{2})?)").expect("valid price regex")
});

/// Rating inside accessibility text, e.g. `Avaliação 4,5 de 5`.
pub static RATING_IN_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Avalia(?:ção|cao)\s+(\d+(?:[,.]\d+)?)\s+de\s+5").expect("valid rating regex")
});

pub const MAX_RATING: f64 = 5.0;

/// Converts a locale price string into a non-negative float.
///
/// Keeps digits and the two separators, drops `.`, turns `,` into the
/// decimal point and parses the rest.
pub fn normalize_price(raw: &str) -> ParsingResult<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ParsingError::normalization("price", raw)),
    }
}

/// Validity predicate for price text taken from a dedicated element.
///
/// Accepts only digits and separators, optionally preceded by the currency
/// symbol, and returns the normalized value.
pub fn accept_price(raw: &str) -> Option<f64> {
    let body = raw.trim().trim_start_matches("R$").trim();
    let well_formed = body.chars().any(|c| c.is_ascii_digit())
        && body.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',');
    if !well_formed {
        return None;
    }
    normalize_price(body).ok()
}

/// Parses a rating, rejecting anything outside `[0, 5]`.
pub fn parse_rating(raw: &str) -> ParsingResult<f64> {
    let value: f64 = raw
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| ParsingError::normalization("rating", raw))?;

    if (0.0..=MAX_RATING).contains(&value) {
        Ok(value)
    } else {
        Err(ParsingError::normalization("rating", raw))
    }
}

pub fn accept_rating(raw: &str) -> Option<f64> {
    parse_rating(raw).ok()
}

/// Digits of a count label such as `(1.234)` or `123 avaliações`.
pub fn accept_count(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Discount label such as `15% OFF`.
pub fn accept_discount(raw: &str) -> Option<u8> {
    accept_count(raw)
        .filter(|pct| *pct <= 100)
        .and_then(|pct| u8::try_from(pct).ok())
}
