//! Catalog items supplied by the external product catalog.

use serde::{Deserialize, Serialize};

use super::product::SearchQuery;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub name: String,
    pub search_terms: Option<String>,
    pub part_number: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub authorized_sellers: Vec<String>,
}

impl CatalogItem {
    /// Search terms, falling back to the item name when blank.
    pub fn effective_search_term(&self) -> &str {
        self.search_terms
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.name.trim())
    }

    pub fn to_query(&self) -> SearchQuery {
        SearchQuery {
            catalog_item_id: Some(self.id),
            part_number: self.part_number.clone(),
            authorized_sellers: self.authorized_sellers.clone(),
            ..SearchQuery::ad_hoc(self.effective_search_term())
        }
    }
}

/// Queries for the active items, in catalog order.
pub fn active_queries(items: &[CatalogItem]) -> Vec<SearchQuery> {
    items
        .iter()
        .filter(|item| item.is_active)
        .filter(|item| !item.effective_search_term().is_empty())
        .map(CatalogItem::to_query)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, name: &str, terms: Option<&str>, active: bool) -> CatalogItem {
        CatalogItem {
            id,
            name: name.to_string(),
            search_terms: terms.map(str::to_string),
            part_number: Some(format!("PN{id}")),
            is_active: active,
            authorized_sellers: vec![],
        }
    }

    #[test]
    fn search_terms_fall_back_to_name() {
        assert_eq!(item(1, "HP 664 Preto", None, true).effective_search_term(), "HP 664 Preto");
        assert_eq!(
            item(1, "HP 664 Preto", Some("  "), true).effective_search_term(),
            "HP 664 Preto"
        );
        assert_eq!(
            item(1, "HP 664 Preto", Some("cartucho hp 664"), true).effective_search_term(),
            "cartucho hp 664"
        );
    }

    #[test]
    fn inactive_items_are_skipped() {
        let items = vec![
            item(1, "HP 664", None, true),
            item(2, "HP 662", None, false),
            item(3, "HP 667", Some("cartucho 667"), true),
        ];
        let queries = active_queries(&items);
        let terms: Vec<_> = queries.iter().map(|q| q.term.as_str()).collect();
        assert_eq!(terms, ["HP 664", "cartucho 667"]);
        assert_eq!(queries[1].catalog_item_id, Some(3));
        assert_eq!(queries[1].part_number.as_deref(), Some("PN3"));
    }
}
