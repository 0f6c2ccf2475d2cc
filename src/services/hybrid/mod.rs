//! Weighted ensemble combination of algorithm predictions.

use crate::error::{EngineError, Result};
use crate::services::algorithms::Algorithm;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Combined score for one item.
#[derive(Debug, Clone)]
pub struct CombinedScore {
    /// Weighted mean of contributing predictions, in [0, 5].
    pub score: f32,
    /// Raw per-algorithm contributions.
    pub contributions: HashMap<String, f32>,
}

struct Member {
    algorithm: Arc<dyn Algorithm>,
    weight: f32,
}

/// Holds the configured algorithms with non-negative weights that sum
/// to 1.0. At serving time weights are renormalized over whichever
/// algorithms actually produced a prediction, so a single untrained or
/// failing algorithm degrades the ensemble instead of zeroing it.
pub struct HybridCombiner {
    members: Vec<Member>,
}

impl HybridCombiner {
    pub fn new(configured: Vec<(Arc<dyn Algorithm>, f32)>) -> Result<Self> {
        if configured.is_empty() {
            return Err(EngineError::InvalidRequest(
                "hybrid combiner needs at least one algorithm".to_string(),
            ));
        }
        if configured.iter().any(|(_, w)| *w < 0.0) {
            return Err(EngineError::InvalidRequest(
                "hybrid weights must be non-negative".to_string(),
            ));
        }
        let total: f32 = configured.iter().map(|(_, w)| w).sum();
        if total <= f32::EPSILON {
            return Err(EngineError::InvalidRequest(
                "hybrid weights must not all be zero".to_string(),
            ));
        }

        let members = configured
            .into_iter()
            .map(|(algorithm, weight)| Member {
                algorithm,
                weight: weight / total,
            })
            .collect();
        Ok(Self { members })
    }

    pub fn algorithms(&self) -> Vec<Arc<dyn Algorithm>> {
        self.members.iter().map(|m| m.algorithm.clone()).collect()
    }

    /// Configured weight for an algorithm, with per-user experiment
    /// overrides applied.
    fn effective_weight(&self, name: &str, overrides: Option<&HashMap<String, f32>>) -> f32 {
        let base = self
            .members
            .iter()
            .find(|m| m.algorithm.name() == name)
            .map(|m| m.weight)
            .unwrap_or(0.0);
        overrides
            .and_then(|o| o.get(name).copied())
            .filter(|w| *w >= 0.0)
            .unwrap_or(base)
    }

    /// Weights renormalized over currently trained algorithms; they sum
    /// to 1.0 over exactly the `is_trained() == true` set.
    pub fn active_weights(
        &self,
        overrides: Option<&HashMap<String, f32>>,
    ) -> Vec<(&'static str, f32)> {
        let active: Vec<(&'static str, f32)> = self
            .members
            .iter()
            .filter(|m| m.algorithm.is_trained())
            .map(|m| {
                let name = m.algorithm.name();
                (name, self.effective_weight(name, overrides))
            })
            .collect();

        let total: f32 = active.iter().map(|(_, w)| w).sum();
        if total <= f32::EPSILON {
            // Degenerate overrides: fall back to uniform.
            let n = active.len().max(1) as f32;
            return active.into_iter().map(|(name, _)| (name, 1.0 / n)).collect();
        }
        active
            .into_iter()
            .map(|(name, w)| (name, w / total))
            .collect()
    }

    /// Combine per-algorithm prediction columns into one score per item.
    ///
    /// `predictions` maps algorithm name to a column of per-item
    /// predictions (`None` = that algorithm failed for that item and is
    /// excluded from its combination). Items where nothing contributed
    /// come back as `None`.
    pub fn combine(
        &self,
        predictions: &HashMap<String, Vec<Option<f32>>>,
        n_items: usize,
        overrides: Option<&HashMap<String, f32>>,
    ) -> Vec<Option<CombinedScore>> {
        (0..n_items)
            .map(|i| {
                let mut weighted_sum = 0.0f32;
                let mut weight_total = 0.0f32;
                let mut contributions = HashMap::new();

                for (name, column) in predictions {
                    let Some(Some(score)) = column.get(i) else {
                        continue;
                    };
                    let weight = self.effective_weight(name, overrides);
                    if weight <= f32::EPSILON {
                        continue;
                    }
                    weighted_sum += weight * score;
                    weight_total += weight;
                    contributions.insert(name.clone(), *score);
                }

                if weight_total <= f32::EPSILON {
                    if !contributions.is_empty() {
                        warn!(item = i, "all contributing algorithms carried zero weight");
                    }
                    return None;
                }

                Some(CombinedScore {
                    score: (weighted_sum / weight_total).clamp(0.0, 5.0),
                    contributions,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Interaction;

    /// Fixed-score stub with controllable trained flag.
    struct StubAlgorithm {
        name: &'static str,
        trained: bool,
        score: f32,
    }

    impl Algorithm for StubAlgorithm {
        fn name(&self) -> &'static str {
            self.name
        }
        fn is_trained(&self) -> bool {
            self.trained
        }
        fn fit(&mut self, _interactions: &[Interaction]) -> Result<()> {
            Ok(())
        }
        fn predict(&self, _user: &str, _item: &str) -> Result<f32> {
            Ok(self.score)
        }
        fn recommend(&self, _user: &str, _n: usize) -> Result<Vec<(String, f32)>> {
            Ok(vec![])
        }
    }

    fn stub(name: &'static str, trained: bool, score: f32) -> Arc<dyn Algorithm> {
        Arc::new(StubAlgorithm {
            name,
            trained,
            score,
        })
    }

    #[test]
    fn test_weights_normalized_at_construction() {
        let combiner = HybridCombiner::new(vec![
            (stub("user_cf", true, 4.0), 2.0),
            (stub("popularity", true, 2.0), 2.0),
        ])
        .unwrap();
        let weights = combiner.active_weights(None);
        assert!(weights.iter().all(|(_, w)| (*w - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_active_weights_sum_to_one_over_trained() {
        let combiner = HybridCombiner::new(vec![
            (stub("user_cf", true, 4.0), 0.5),
            (stub("content_based", false, 3.0), 0.3),
            (stub("popularity", true, 2.0), 0.2),
        ])
        .unwrap();

        let weights = combiner.active_weights(None);
        assert_eq!(weights.len(), 2);
        let total: f32 = weights.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-6);
        // Renormalized 0.5/0.7 and 0.2/0.7.
        assert!((weights[0].1 - 0.5 / 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_combined_score_is_weighted_mean_within_bounds() {
        let combiner = HybridCombiner::new(vec![
            (stub("user_cf", true, 0.0), 0.7),
            (stub("popularity", true, 0.0), 0.3),
        ])
        .unwrap();

        let predictions = HashMap::from([
            ("user_cf".to_string(), vec![Some(4.0f32)]),
            ("popularity".to_string(), vec![Some(2.0f32)]),
        ]);
        let combined = combiner.combine(&predictions, 1, None);
        let score = combined[0].as_ref().unwrap().score;
        assert!((score - (0.7 * 4.0 + 0.3 * 2.0)).abs() < 1e-6);
        assert!(score >= 2.0 && score <= 4.0);
    }

    #[test]
    fn test_failed_algorithm_excluded_per_item() {
        let combiner = HybridCombiner::new(vec![
            (stub("user_cf", true, 0.0), 0.5),
            (stub("popularity", true, 0.0), 0.5),
        ])
        .unwrap();

        let predictions = HashMap::from([
            ("user_cf".to_string(), vec![Some(4.0f32), None]),
            ("popularity".to_string(), vec![Some(2.0f32), Some(1.0)]),
        ]);
        let combined = combiner.combine(&predictions, 2, None);
        assert!((combined[0].as_ref().unwrap().score - 3.0).abs() < 1e-6);
        // Second item only had popularity.
        assert!((combined[1].as_ref().unwrap().score - 1.0).abs() < 1e-6);
        assert_eq!(combined[1].as_ref().unwrap().contributions.len(), 1);
    }

    #[test]
    fn test_no_contributions_is_none() {
        let combiner =
            HybridCombiner::new(vec![(stub("user_cf", true, 0.0), 1.0)]).unwrap();
        let predictions = HashMap::from([("user_cf".to_string(), vec![None])]);
        let combined = combiner.combine(&predictions, 1, None);
        assert!(combined[0].is_none());
    }

    #[test]
    fn test_overrides_shift_weights() {
        let combiner = HybridCombiner::new(vec![
            (stub("user_cf", true, 0.0), 0.5),
            (stub("popularity", true, 0.0), 0.5),
        ])
        .unwrap();

        let overrides = HashMap::from([("user_cf".to_string(), 1.0f32), ("popularity".to_string(), 0.0)]);
        let predictions = HashMap::from([
            ("user_cf".to_string(), vec![Some(4.0f32)]),
            ("popularity".to_string(), vec![Some(1.0f32)]),
        ]);
        let combined = combiner.combine(&predictions, 1, Some(&overrides));
        assert!((combined[0].as_ref().unwrap().score - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        assert!(HybridCombiner::new(vec![(stub("a", true, 0.0), -0.5)]).is_err());
        assert!(HybridCombiner::new(vec![]).is_err());
        assert!(HybridCombiner::new(vec![(stub("a", true, 0.0), 0.0)]).is_err());
    }
}
