//! User-based collaborative filtering over a mean-centered cosine
//! similarity matrix.

use super::{cosine, Algorithm, RatingMatrix};
use crate::error::Result;
use crate::models::Interaction;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Similarity-based filtering.
///
/// Fit: filter low-activity users/items, build the dense rating matrix,
/// mean-center each user row over its rated entries, compute the
/// user×user cosine matrix on centered rows.
///
/// Predict: user mean + similarity-weighted average of the centered
/// ratings from the top-K most similar users who rated the item,
/// clamped to [0, 5].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCfModel {
    top_k: usize,
    min_interactions: usize,
    matrix: Option<RatingMatrix>,
    centered: Option<Array2<f32>>,
    similarity: Option<Array2<f32>>,
}

impl UserCfModel {
    pub fn new(top_k: usize, min_interactions: usize) -> Self {
        Self {
            top_k,
            min_interactions,
            matrix: None,
            centered: None,
            similarity: None,
        }
    }

    fn trained(&self) -> Option<(&RatingMatrix, &Array2<f32>, &Array2<f32>)> {
        match (&self.matrix, &self.centered, &self.similarity) {
            (Some(m), Some(c), Some(s)) => Some((m, c, s)),
            _ => None,
        }
    }
}

impl Algorithm for UserCfModel {
    fn name(&self) -> &'static str {
        "user_cf"
    }

    fn is_trained(&self) -> bool {
        self.matrix.is_some()
    }

    fn fit(&mut self, interactions: &[Interaction]) -> Result<()> {
        let matrix = RatingMatrix::build(interactions, self.min_interactions);

        let (n_users, n_items) = (matrix.n_users(), matrix.n_items());
        let mut centered = Array2::<f32>::zeros((n_users, n_items));
        for u in 0..n_users {
            let mean = matrix.user_mean(u);
            for i in 0..n_items {
                let rating = matrix.ratings[[u, i]];
                if rating > 0.0 {
                    centered[[u, i]] = rating - mean;
                }
            }
        }

        let mut similarity = Array2::<f32>::zeros((n_users, n_users));
        for a in 0..n_users {
            let row_a = centered.row(a).to_vec();
            for b in (a + 1)..n_users {
                let sim = cosine(&row_a, centered.row(b).as_slice().unwrap_or(&[]));
                similarity[[a, b]] = sim;
                similarity[[b, a]] = sim;
            }
        }

        debug!(users = n_users, items = n_items, "user-cf fitted");
        self.matrix = Some(matrix);
        self.centered = Some(centered);
        self.similarity = Some(similarity);
        Ok(())
    }

    fn predict(&self, user_id: &str, item_id: &str) -> Result<f32> {
        let Some((matrix, centered, similarity)) = self.trained() else {
            return Ok(2.5);
        };

        let user_idx = matrix.user_index.get(user_id).copied();
        let item_idx = matrix.item_index.get(item_id).copied();

        let prediction = match (user_idx, item_idx) {
            // Cold-start user: the item's global mean.
            (None, Some(i)) => matrix.item_mean(i),
            // Cold-start item: the user's own mean.
            (Some(u), None) => matrix.user_mean(u),
            (None, None) => matrix.global_mean,
            (Some(u), Some(i)) => {
                // Top-K most similar users who rated the item.
                let mut neighbors: Vec<(f32, f32)> = (0..matrix.n_users())
                    .filter(|&v| v != u && matrix.ratings[[v, i]] > 0.0)
                    .map(|v| (similarity[[u, v]], centered[[v, i]]))
                    .filter(|(sim, _)| *sim > 0.0)
                    .collect();
                neighbors.sort_by(|a, b| {
                    b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal)
                });
                neighbors.truncate(self.top_k);

                let sim_sum: f32 = neighbors.iter().map(|(sim, _)| sim.abs()).sum();
                let user_mean = matrix.user_mean(u);
                if sim_sum <= f32::EPSILON {
                    user_mean
                } else {
                    let weighted: f32 = neighbors
                        .iter()
                        .map(|(sim, centered_rating)| sim * centered_rating)
                        .sum();
                    user_mean + weighted / sim_sum
                }
            }
        };

        Ok(prediction.clamp(0.0, 5.0))
    }

    fn recommend(&self, user_id: &str, n: usize) -> Result<Vec<(String, f32)>> {
        let Some((matrix, _, _)) = self.trained() else {
            return Ok(Vec::new());
        };

        let user_idx = matrix.user_index.get(user_id).copied();
        let mut scored: Vec<(String, f32)> = matrix
            .item_ids
            .iter()
            .enumerate()
            .filter(|(i, _)| match user_idx {
                // Skip items the user already rated.
                Some(u) => matrix.ratings[[u, *i]] == 0.0,
                None => true,
            })
            .map(|(_, item_id)| {
                let score = self.predict(user_id, item_id).unwrap_or(matrix.global_mean);
                (item_id.clone(), score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n);
        Ok(scored)
    }
}
