//! Keyword and pattern classification of listing titles.

use once_cell::sync::Lazy;
use regex::Regex;

const ORIGINAL_KEYWORDS: &[&str] = &["original", "genuíno", "genuino"];

const REMANUFACTURED_KEYWORDS: &[&str] = &[
    "remanufaturado",
    "recondicionado",
    "compatível",
    "compativel",
    "similar",
];

static CARTRIDGE_MODEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bHP\s+(\d{3}(?:XL)?)\b").expect("valid cartridge model regex"));

// Manufacturer part-number shapes, checked in order.
static PART_NUMBER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b(\d[A-Z]{1,2}\d{2,4}[A-Z]{1,2})\b", // HP, e.g. 3YM84AB
        r"\b(T\d{3,6})\b",                     // Epson
        r"\b(LC\d{2,4}[A-Z]{1,2})\b",          // Brother
        r"\b(PG-\d{3,4})\b",                   // Canon black
        r"\b(CL-\d{3,4})\b",                   // Canon color
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid part number regex"))
    .collect()
});

/// Boolean traits derived from a title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TitleTraits {
    pub is_original: bool,
    pub is_remanufactured: bool,
}

impl TitleTraits {
    pub fn from_title(title: &str) -> Self {
        let lower = title.to_lowercase();
        Self {
            is_original: ORIGINAL_KEYWORDS.iter().any(|k| lower.contains(k)),
            is_remanufactured: REMANUFACTURED_KEYWORDS.iter().any(|k| lower.contains(k)),
        }
    }
}

/// Cartridge model mentioned in the title, normalized as `HP 664` / `HP 664XL`.
pub fn cartridge_model(title: &str) -> Option<String> {
    CARTRIDGE_MODEL
        .captures(title)
        .and_then(|c| c.get(1))
        .map(|m| format!("HP {}", m.as_str().to_uppercase()))
}

/// First manufacturer part number found in the title.
pub fn part_number(title: &str) -> Option<String> {
    PART_NUMBER_PATTERNS
        .iter()
        .find_map(|re| re.captures(title).and_then(|c| c.get(1)))
        .map(|m| m.as_str().to_string())
}

/// Case-insensitive seller check: exact match, or either name containing the
/// other ("Loja Oficial HP" vs "HP").
pub fn is_authorized_seller(seller: &str, authorized: &[String]) -> bool {
    let seller = seller.trim().to_lowercase();
    if seller.is_empty() {
        return false;
    }
    authorized
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .any(|a| a == seller || a.contains(&seller) || seller.contains(&a))
}
