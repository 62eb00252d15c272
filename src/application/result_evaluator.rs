//! Descriptive statistics over a batch or a stored time range
//!
//! Everything here is a derived, read-only view. Empty inputs produce zeroed
//! figures rather than errors.

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{DocumentStore, IndexError, ProductRecord, RangeQuery};
use crate::infrastructure::config::EvaluatorConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    /// Records with a price
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagRatio {
    pub count: usize,
    pub proportion: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagStats {
    pub original: FlagRatio,
    pub remanufactured: FlagRatio,
    pub free_shipping: FlagRatio,
    pub international: FlagRatio,
    pub full: FlagRatio,
    pub official_store: FlagRatio,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingStats {
    pub rated: usize,
    pub mean: f64,
}

/// Seller popularity by listing count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularityEntry {
    pub seller: String,
    pub listings: usize,
    /// `listings × sales_multiplier`; a rough proxy, not a sales figure
    pub estimated_sales: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total: usize,
    pub search_terms: Vec<String>,
    pub price: PriceStats,
    pub rating: RatingStats,
    pub flags: FlagStats,
    pub top_sellers: Vec<FrequencyEntry>,
    pub top_models: Vec<FrequencyEntry>,
    pub popularity: Vec<PopularityEntry>,
}

/// One observation in a price time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub seller: Option<String>,
    pub title: String,
}

pub struct ResultEvaluator {
    top_n: usize,
    sales_multiplier: f64,
    evolution_window_days: u32,
}

impl ResultEvaluator {
    pub fn new(config: &EvaluatorConfig) -> Self {
        Self {
            top_n: config.top_n.max(1),
            sales_multiplier: config.sales_multiplier,
            evolution_window_days: config.evolution_window_days,
        }
    }

    pub fn evaluate(&self, records: &[ProductRecord]) -> AggregateStats {
        let total = records.len();

        let prices: Vec<f64> = records.iter().filter_map(|r| r.price).collect();
        let ratings: Vec<f64> = records.iter().filter_map(|r| r.rating).collect();

        let seller_counts = frequencies(records.iter().filter_map(|r| r.seller.as_deref()));
        let model_counts = frequencies(records.iter().filter_map(|r| r.cartridge_model.as_deref()));

        let ratio = |flag: fn(&ProductRecord) -> bool| {
            let count = records.iter().filter(|r| flag(r)).count();
            FlagRatio { count, proportion: proportion(count, total) }
        };

        let popularity = seller_counts
            .iter()
            .take(self.top_n)
            .map(|entry| PopularityEntry {
                seller: entry.name.clone(),
                listings: entry.count,
                estimated_sales: round_to(entry.count as f64 * self.sales_multiplier, 2),
            })
            .collect();

        let stats = AggregateStats {
            total,
            search_terms: records
                .iter()
                .map(|r| r.search_term.clone())
                .collect::<IndexSet<_>>()
                .into_iter()
                .collect(),
            price: PriceStats {
                count: prices.len(),
                min: round_to(prices.iter().copied().reduce(f64::min).unwrap_or(0.0), 2),
                max: round_to(prices.iter().copied().reduce(f64::max).unwrap_or(0.0), 2),
                mean: round_to(mean(&prices), 2),
                median: round_to(median(&prices), 2),
            },
            rating: RatingStats { rated: ratings.len(), mean: round_to(mean(&ratings), 1) },
            flags: FlagStats {
                original: ratio(|r| r.is_original),
                remanufactured: ratio(|r| r.is_remanufactured),
                free_shipping: ratio(|r| r.free_shipping),
                international: ratio(|r| r.is_international),
                full: ratio(|r| r.is_full),
                official_store: ratio(|r| r.is_official_store),
            },
            top_sellers: seller_counts.into_iter().take(self.top_n).collect(),
            top_models: model_counts.into_iter().take(self.top_n).collect(),
            popularity,
        };

        debug!(total, priced = stats.price.count, "Evaluated records");
        stats
    }

    /// Statistics over the records a store query returns.
    pub async fn evaluate_range(
        &self,
        store: &dyn DocumentStore,
        query: &RangeQuery,
    ) -> Result<AggregateStats, IndexError> {
        let records = store.query_range(query).await?;
        Ok(self.evaluate(&records))
    }

    /// Chronological price points for listings matching `title`.
    pub async fn price_evolution(
        &self,
        store: &dyn DocumentStore,
        title: &str,
        days: Option<u32>,
    ) -> Result<Vec<PricePoint>, IndexError> {
        let query =
            RangeQuery::last_days(days.unwrap_or(self.evolution_window_days)).with_title(title);
        let mut records = store.query_range(&query).await?;
        records.sort_by_key(|r| r.timestamp);
        Ok(records
            .into_iter()
            .filter_map(|r| {
                r.price.map(|price| PricePoint {
                    timestamp: r.timestamp,
                    price,
                    seller: r.seller,
                    title: r.title,
                })
            })
            .collect())
    }
}

/// Counts per value, highest first; equal counts keep first-seen order.
pub fn frequencies<'a>(values: impl Iterator<Item = &'a str>) -> Vec<FrequencyEntry> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for value in values.map(str::trim).filter(|v| !v.is_empty()) {
        *counts.entry(value).or_default() += 1;
    }
    let mut entries: Vec<FrequencyEntry> = counts
        .into_iter()
        .map(|(name, count)| FrequencyEntry { name: name.to_string(), count })
        .collect();
    // stable sort keeps insertion order among ties
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn proportion(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round_to(count as f64 / total as f64, 4)
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DocumentStore;
    use crate::infrastructure::document_store::InMemoryDocumentStore;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use rstest::rstest;

    fn record(title: &str, price: Option<f64>, seller: Option<&str>) -> ProductRecord {
        let link = "https://produto.mercadolivre.com.br/MLB-1";
        let mut record =
            ProductRecord::new(title, link, "cartucho hp", Utc::now()).with_price(price);
        record.seller = seller.map(str::to_string);
        record
    }

    fn evaluator() -> ResultEvaluator {
        ResultEvaluator::new(&EvaluatorConfig {
            top_n: 2,
            sales_multiplier: 1.5,
            evolution_window_days: 30,
        })
    }

    #[test]
    fn empty_batch_yields_zeroes() {
        let stats = evaluator().evaluate(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.price, PriceStats::default());
        assert_eq!(stats.rating.mean, 0.0);
        assert_eq!(stats.flags.original.proportion, 0.0);
        assert!(stats.top_sellers.is_empty());
    }

    #[test]
    fn prices_ignore_missing_values() {
        let records = [
            record("Cartucho HP 664 Preto", Some(74.9), None),
            record("Cartucho HP 664 Color", None, None),
            record("Cartucho HP 664 XL", Some(120.0), None),
            record("Cartucho HP 664 Kit", Some(99.99), None),
        ];
        let stats = evaluator().evaluate(&records);
        assert_eq!(stats.price.count, 3);
        assert_eq!(stats.price.min, 74.9);
        assert_eq!(stats.price.max, 120.0);
        assert_eq!(stats.price.mean, 98.3);
        assert_eq!(stats.price.median, 99.99);
    }

    #[test]
    fn seller_ties_keep_first_seen_order() {
        let records = [
            record("Cartucho HP 664 Preto", None, Some("Loja B")),
            record("Cartucho HP 664 Preto", None, Some("Loja A")),
            record("Cartucho HP 664 Preto", None, Some("Loja C")),
            record("Cartucho HP 664 Preto", None, Some("Loja C")),
            record("Cartucho HP 664 Preto", None, Some("Loja A")),
            record("Cartucho HP 664 Preto", None, Some("Loja B")),
        ];
        let stats = evaluator().evaluate(&records);
        let names: Vec<_> = stats.top_sellers.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Loja B", "Loja A"]);
        assert_eq!(stats.popularity[0].estimated_sales, 3.0);
    }

    #[test]
    fn flag_proportions_and_rating_mean() {
        let mut a = record("Cartucho HP 664 Original", None, None);
        a.is_original = true;
        a.rating = Some(4.5);
        let mut b = record("Cartucho HP 664 Compatível", None, None);
        b.is_remanufactured = true;
        b.rating = Some(4.0);
        let c = record("Cartucho HP 664 Preto", None, None);

        let stats = evaluator().evaluate(&[a, b, c]);
        assert_eq!(stats.flags.original.count, 1);
        assert_eq!(stats.flags.original.proportion, 0.3333);
        assert_eq!(stats.rating.rated, 2);
        assert_eq!(stats.rating.mean, 4.3);
    }

    #[rstest]
    #[case(&[], 0.0)]
    #[case(&[5.0], 5.0)]
    #[case(&[3.0, 1.0, 2.0], 2.0)]
    #[case(&[4.0, 1.0, 3.0, 2.0], 2.5)]
    fn median_cases(#[case] values: &[f64], #[case] expected: f64) {
        assert_eq!(median(values), expected);
    }

    proptest! {
        #[test]
        fn mean_lies_between_extremes(values in prop::collection::vec(0.0f64..10_000.0, 1..50)) {
            let m = mean(&values);
            let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(m >= lo - 1e-9 && m <= hi + 1e-9);
        }
    }

    #[tokio::test]
    async fn evolution_points_are_chronological() {
        let store = InMemoryDocumentStore::new();
        let now = Utc::now();
        let mut later = record("Cartucho HP 664 Preto Original", Some(79.9), Some("Loja A"));
        later.timestamp = now - Duration::hours(1);
        later.id = Some(later.derived_id());
        let mut earlier = record("Cartucho HP 664 Preto Original", Some(74.9), Some("Loja A"));
        earlier.timestamp = now - Duration::days(2);
        earlier.id = Some(earlier.derived_id());
        let mut unpriced = record("Cartucho HP 664 Preto Original", None, None);
        unpriced.timestamp = now - Duration::days(1);
        unpriced.id = Some(unpriced.derived_id());
        store.bulk_upsert(&[later, earlier, unpriced]).await.unwrap();

        let points = evaluator().price_evolution(&store, "664", Some(7)).await.unwrap();
        let prices: Vec<_> = points.iter().map(|p| p.price).collect();
        assert_eq!(prices, [74.9, 79.9]);
    }
}
