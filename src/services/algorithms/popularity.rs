//! Decayed-popularity scoring: per-item mean rating weighted by an
//! exponentially time-decayed interaction count.

use super::Algorithm;
use crate::error::Result;
use crate::models::Interaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ItemPopularity {
    mean_rating: f32,
    /// Σ e^(-λ · age_days) over the item's interactions.
    decayed_weight: f64,
    /// mean_rating × ln(1 + decayed_weight)
    score: f64,
}

/// Popularity model, used both as an ensemble member and as the
/// FallbackEngine's ranking source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopularityModel {
    /// Decay rate per day; recent interactions weigh more.
    decay_rate: f64,
    items: HashMap<String, ItemPopularity>,
    ranked: Vec<String>,
    global_mean: f32,
    fitted_at: Option<DateTime<Utc>>,
}

impl PopularityModel {
    pub fn new(decay_rate: f64) -> Self {
        Self {
            decay_rate,
            items: HashMap::new(),
            ranked: Vec::new(),
            global_mean: 0.0,
            fitted_at: None,
        }
    }

    /// Popularity score for an item (not a rating); 0 for unknown items.
    pub fn popularity_score(&self, item_id: &str) -> f64 {
        self.items.get(item_id).map(|i| i.score).unwrap_or(0.0)
    }

    /// All items ranked by descending popularity score.
    pub fn ranked_items(&self) -> impl Iterator<Item = (&str, f64)> {
        self.ranked
            .iter()
            .map(move |id| (id.as_str(), self.items[id].score))
    }
}

impl Algorithm for PopularityModel {
    fn name(&self) -> &'static str {
        "popularity"
    }

    fn is_trained(&self) -> bool {
        self.fitted_at.is_some()
    }

    fn fit(&mut self, interactions: &[Interaction]) -> Result<()> {
        let now = Utc::now();

        let mut sums: HashMap<&str, (f64, usize, f64)> = HashMap::new();
        let mut global_sum = 0.0f64;
        for interaction in interactions {
            let age_days =
                (now - interaction.timestamp).num_seconds().max(0) as f64 / 86_400.0;
            let decay = (-self.decay_rate * age_days).exp();
            let entry = sums
                .entry(interaction.item_id.as_str())
                .or_insert((0.0, 0, 0.0));
            entry.0 += interaction.rating as f64;
            entry.1 += 1;
            entry.2 += decay;
            global_sum += interaction.rating as f64;
        }

        self.global_mean = if interactions.is_empty() {
            0.0
        } else {
            (global_sum / interactions.len() as f64) as f32
        };

        self.items = sums
            .into_iter()
            .map(|(item_id, (rating_sum, count, decayed_weight))| {
                let mean_rating = (rating_sum / count as f64) as f32;
                let score = mean_rating as f64 * (1.0 + decayed_weight).ln();
                (
                    item_id.to_string(),
                    ItemPopularity {
                        mean_rating,
                        decayed_weight,
                        score,
                    },
                )
            })
            .collect();

        let mut ranked: Vec<String> = self.items.keys().cloned().collect();
        ranked.sort_by(|a, b| {
            self.items[b]
                .score
                .partial_cmp(&self.items[a].score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(b))
        });
        self.ranked = ranked;
        self.fitted_at = Some(now);

        debug!(items = self.items.len(), "popularity fitted");
        Ok(())
    }

    /// Rating prediction: the item's mean rating, independent of user.
    fn predict(&self, _user_id: &str, item_id: &str) -> Result<f32> {
        let rating = self
            .items
            .get(item_id)
            .map(|i| i.mean_rating)
            .unwrap_or(self.global_mean);
        Ok(rating.clamp(0.0, 5.0))
    }

    fn recommend(&self, _user_id: &str, n: usize) -> Result<Vec<(String, f32)>> {
        Ok(self
            .ranked
            .iter()
            .take(n)
            .map(|id| (id.clone(), self.items[id].score as f32))
            .collect())
    }
}
