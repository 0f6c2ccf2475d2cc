//! Candidate retrieval boundary.
//!
//! Candidates arrive pre-filtered (location/budget/type) and bounded;
//! the real source is the batch-populated item tables.

use crate::error::Result;
use crate::models::{BudgetLevel, ItemRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;

#[async_trait]
pub trait CandidateProvider: Send + Sync {
    async fn retrieve(
        &self,
        user_id: &str,
        filters: &BTreeMap<String, String>,
        max: usize,
    ) -> Result<Vec<ItemRecord>>;
}

/// Catalog-backed provider applying the request filter set in memory.
pub struct InMemoryCandidateProvider {
    items: Vec<ItemRecord>,
}

impl InMemoryCandidateProvider {
    pub fn new(items: Vec<ItemRecord>) -> Self {
        Self { items }
    }

    fn matches(item: &ItemRecord, filters: &BTreeMap<String, String>) -> bool {
        for (key, value) in filters {
            let ok = match key.as_str() {
                "city" => item.city.eq_ignore_ascii_case(value),
                "country" => item.country.eq_ignore_ascii_case(value),
                "item_type" => item.item_type.eq_ignore_ascii_case(value),
                "category" => item.category.eq_ignore_ascii_case(value),
                "budget_max" => value
                    .parse::<f64>()
                    .map(|max| item.price <= max)
                    .unwrap_or(true),
                "budget_level" => {
                    let tier = match value.as_str() {
                        "budget" => Some(BudgetLevel::Budget),
                        "moderate" => Some(BudgetLevel::Moderate),
                        "premium" => Some(BudgetLevel::Premium),
                        "luxury" => Some(BudgetLevel::Luxury),
                        _ => None,
                    };
                    tier.map(|t| BudgetLevel::from_price(item.price) == t)
                        .unwrap_or(true)
                }
                // Unknown filters are ignored rather than rejected.
                _ => true,
            };
            if !ok {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl CandidateProvider for InMemoryCandidateProvider {
    async fn retrieve(
        &self,
        _user_id: &str,
        filters: &BTreeMap<String, String>,
        max: usize,
    ) -> Result<Vec<ItemRecord>> {
        Ok(self
            .items
            .iter()
            .filter(|item| Self::matches(item, filters))
            .take(max)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, city: &str, price: f64, category: &str) -> ItemRecord {
        ItemRecord {
            id: id.to_string(),
            name: id.to_string(),
            item_type: "house".into(),
            category: category.to_string(),
            price,
            amenities: vec![],
            tags: vec![],
            city: city.to_string(),
            country: "PT".into(),
            latitude: 0.0,
            longitude: 0.0,
            description: String::new(),
            reviews: vec![],
        }
    }

    fn filters(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_city_and_budget_filters() {
        let provider = InMemoryCandidateProvider::new(vec![
            item("cheap", "Faro", 60.0, "beach"),
            item("pricey", "Faro", 400.0, "beach"),
            item("elsewhere", "Porto", 60.0, "city"),
        ]);

        let got = provider
            .retrieve("u1", &filters(&[("city", "faro"), ("budget_max", "100")]), 10)
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "cheap");
    }

    #[tokio::test]
    async fn test_bounded_and_unknown_filters_ignored() {
        let provider = InMemoryCandidateProvider::new(
            (0..20).map(|i| item(&format!("i{i}"), "Faro", 100.0, "beach")).collect(),
        );

        let got = provider
            .retrieve("u1", &filters(&[("wifi_speed", "fast")]), 5)
            .await
            .unwrap();
        assert_eq!(got.len(), 5);
    }
}
