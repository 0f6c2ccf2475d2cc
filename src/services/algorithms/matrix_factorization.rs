//! Latent-factor factorization via non-negative matrix factorization
//! (Lee–Seung multiplicative updates) with a fixed factor count and
//! iteration cap.

use super::{Algorithm, RatingMatrix};
use crate::error::Result;
use crate::models::Interaction;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Guard against division by zero in the multiplicative updates.
const EPS: f32 = 1e-9;

/// Deterministic factor initialization so refits are reproducible.
const INIT_SEED: u64 = 42;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixFactorizationModel {
    n_factors: usize,
    max_iterations: usize,
    matrix: Option<RatingMatrix>,
    /// User factors, n_users × n_factors.
    user_factors: Option<Array2<f32>>,
    /// Item factors, n_factors × n_items.
    item_factors: Option<Array2<f32>>,
}

impl MatrixFactorizationModel {
    pub fn new(n_factors: usize, max_iterations: usize) -> Self {
        Self {
            n_factors,
            max_iterations,
            matrix: None,
            user_factors: None,
            item_factors: None,
        }
    }
}

impl Algorithm for MatrixFactorizationModel {
    fn name(&self) -> &'static str {
        "matrix_factorization"
    }

    fn is_trained(&self) -> bool {
        self.user_factors.is_some()
    }

    fn fit(&mut self, interactions: &[Interaction]) -> Result<()> {
        let matrix = RatingMatrix::build(interactions, 1);
        let (n_users, n_items) = (matrix.n_users(), matrix.n_items());
        if n_users == 0 || n_items == 0 {
            self.matrix = Some(matrix);
            self.user_factors = Some(Array2::zeros((0, self.n_factors)));
            self.item_factors = Some(Array2::zeros((self.n_factors, 0)));
            return Ok(());
        }

        let k = self.n_factors.min(n_users).min(n_items).max(1);
        let mut rng = StdRng::seed_from_u64(INIT_SEED);
        let mut w = Array2::from_shape_fn((n_users, k), |_| rng.gen_range(0.01..1.0f32));
        let mut h = Array2::from_shape_fn((k, n_items), |_| rng.gen_range(0.01..1.0f32));

        let v = &matrix.ratings;
        for _ in 0..self.max_iterations {
            // H <- H ⊙ (WᵀV) ⊘ (WᵀWH + ε)
            let wt = w.t();
            let numerator = wt.dot(v);
            let denominator = wt.dot(&w).dot(&h) + EPS;
            h = h * numerator / denominator;

            // W <- W ⊙ (VHᵀ) ⊘ (WHHᵀ + ε)
            let ht = h.t();
            let numerator = v.dot(&ht);
            let denominator = w.dot(&h).dot(&ht) + EPS;
            w = w * numerator / denominator;
        }

        debug!(
            users = n_users,
            items = n_items,
            factors = k,
            iterations = self.max_iterations,
            "matrix factorization fitted"
        );
        self.matrix = Some(matrix);
        self.user_factors = Some(w);
        self.item_factors = Some(h);
        Ok(())
    }

    fn predict(&self, user_id: &str, item_id: &str) -> Result<f32> {
        let (Some(matrix), Some(w), Some(h)) =
            (&self.matrix, &self.user_factors, &self.item_factors)
        else {
            return Ok(2.5);
        };

        let (Some(&u), Some(&i)) = (
            matrix.user_index.get(user_id),
            matrix.item_index.get(item_id),
        ) else {
            // Cold start: global mean rating.
            return Ok(matrix.global_mean.clamp(0.0, 5.0));
        };

        let score: f32 = w.row(u).dot(&h.column(i));
        Ok(score.clamp(0.0, 5.0))
    }

    fn recommend(&self, user_id: &str, n: usize) -> Result<Vec<(String, f32)>> {
        let Some(matrix) = &self.matrix else {
            return Ok(Vec::new());
        };

        let user_idx = matrix.user_index.get(user_id).copied();
        let mut scored: Vec<(String, f32)> = matrix
            .item_ids
            .iter()
            .enumerate()
            .filter(|(i, _)| match user_idx {
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
