//! Algorithm contract and the shared aggregated rating matrix.

mod content_based;
mod matrix_factorization;
mod popularity;
mod user_cf;

pub use content_based::ContentBasedModel;
pub use matrix_factorization::MatrixFactorizationModel;
pub use popularity::PopularityModel;
pub use user_cf::UserCfModel;

use crate::error::Result;
use crate::models::Interaction;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Common contract for every scoring algorithm.
///
/// Cold start is part of the contract: `predict` and `recommend` must
/// return a defined value for unseen users/items, never an error.
/// Predictions are ratings in [0, 5].
pub trait Algorithm: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_trained(&self) -> bool;

    fn fit(&mut self, interactions: &[Interaction]) -> Result<()>;

    fn predict(&self, user_id: &str, item_id: &str) -> Result<f32>;

    fn predict_batch(&self, user_id: &str, item_ids: &[String]) -> Result<Vec<f32>> {
        item_ids
            .iter()
            .map(|item_id| self.predict(user_id, item_id))
            .collect()
    }

    /// Top-n (item, predicted rating) pairs, highest first.
    fn recommend(&self, user_id: &str, n: usize) -> Result<Vec<(String, f32)>>;
}

/// Dense user×item rating matrix aggregated from raw interactions.
///
/// Raw interactions may repeat per (user, item); aggregation keeps the
/// latest rating (equal timestamps are averaged), so the matrix holds
/// exactly one value per pair. Zero cells mean "unrated".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingMatrix {
    pub ratings: Array2<f32>,
    pub user_index: HashMap<String, usize>,
    pub item_index: HashMap<String, usize>,
    pub user_ids: Vec<String>,
    pub item_ids: Vec<String>,
    pub global_mean: f32,
}

impl RatingMatrix {
    /// Build from raw interactions, dropping users and items with fewer
    /// than `min_interactions` aggregated ratings.
    pub fn build(interactions: &[Interaction], min_interactions: usize) -> Self {
        let aggregated = aggregate(interactions);

        let mut user_counts: HashMap<&str, usize> = HashMap::new();
        let mut item_counts: HashMap<&str, usize> = HashMap::new();
        for ((user, item), _) in &aggregated {
            *user_counts.entry(user.as_str()).or_insert(0) += 1;
            *item_counts.entry(item.as_str()).or_insert(0) += 1;
        }

        let mut user_ids: Vec<String> = user_counts
            .iter()
            .filter(|(_, &c)| c >= min_interactions)
            .map(|(u, _)| u.to_string())
            .collect();
        let mut item_ids: Vec<String> = item_counts
            .iter()
            .filter(|(_, &c)| c >= min_interactions)
            .map(|(i, _)| i.to_string())
            .collect();
        user_ids.sort();
        item_ids.sort();

        let user_index: HashMap<String, usize> = user_ids
            .iter()
            .enumerate()
            .map(|(i, u)| (u.clone(), i))
            .collect();
        let item_index: HashMap<String, usize> = item_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut ratings = Array2::zeros((user_ids.len(), item_ids.len()));
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for ((user, item), rating) in &aggregated {
            if let (Some(&u), Some(&i)) = (user_index.get(user), item_index.get(item)) {
                ratings[[u, i]] = *rating;
                sum += *rating as f64;
                count += 1;
            }
        }
        let global_mean = if count > 0 {
            (sum / count as f64) as f32
        } else {
            0.0
        };

        Self {
            ratings,
            user_index,
            item_index,
            user_ids,
            item_ids,
            global_mean,
        }
    }

    pub fn n_users(&self) -> usize {
        self.user_ids.len()
    }

    pub fn n_items(&self) -> usize {
        self.item_ids.len()
    }

    /// Mean of a user's rated entries; global mean for empty rows.
    pub fn user_mean(&self, user_idx: usize) -> f32 {
        let row = self.ratings.row(user_idx);
        let rated: Vec<f32> = row.iter().copied().filter(|&r| r > 0.0).collect();
        if rated.is_empty() {
            self.global_mean
        } else {
            rated.iter().sum::<f32>() / rated.len() as f32
        }
    }

    /// Mean rating of an item column; global mean if unrated.
    pub fn item_mean(&self, item_idx: usize) -> f32 {
        let col = self.ratings.column(item_idx);
        let rated: Vec<f32> = col.iter().copied().filter(|&r| r > 0.0).collect();
        if rated.is_empty() {
            self.global_mean
        } else {
            rated.iter().sum::<f32>() / rated.len() as f32
        }
    }
}

/// One rating per (user, item): latest timestamp wins, equal-timestamp
/// duplicates are averaged.
fn aggregate(interactions: &[Interaction]) -> HashMap<(String, String), f32> {
    let mut latest: HashMap<(String, String), (chrono::DateTime<chrono::Utc>, f32, usize)> =
        HashMap::new();

    for interaction in interactions {
        let key = (interaction.user_id.clone(), interaction.item_id.clone());
        match latest.get_mut(&key) {
            Some((ts, sum, n)) => {
                if interaction.timestamp > *ts {
                    *ts = interaction.timestamp;
                    *sum = interaction.rating;
                    *n = 1;
                } else if interaction.timestamp == *ts {
                    *sum += interaction.rating;
                    *n += 1;
                }
            }
            None => {
                latest.insert(key, (interaction.timestamp, interaction.rating, 1));
            }
        }
    }

    latest
        .into_iter()
        .map(|(key, (_, sum, n))| (key, sum / n as f32))
        .collect()
}

/// Cosine similarity between two equal-length vectors; 0.0 when either
/// norm is zero.
pub(crate) fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::{Duration, Utc};

    /// Interactions for users u1..u5 over items i1..i10 with ratings
    /// cycling 1..=5.
    pub fn sample_interactions() -> Vec<Interaction> {
        let base = Utc::now() - Duration::days(30);
        let mut out = Vec::new();
        for u in 1..=5u32 {
            for i in 1..=10u32 {
                // Leave a few holes so there are unrated pairs.
                if (u + i) % 7 == 0 {
                    continue;
                }
                let rating = ((u + i) % 5 + 1) as f32;
                out.push(Interaction::new(
                    &format!("u{u}"),
                    &format!("i{i}"),
                    rating,
                    base + Duration::hours((u * 10 + i) as i64),
                ));
            }
        }
        out
    }
}
