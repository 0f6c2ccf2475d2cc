//! Content-similarity filtering over feature-engineered item vectors.

use super::{cosine, Algorithm};
use crate::error::{EngineError, Result};
use crate::models::{FeatureVector, Interaction};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Rating for items the model knows nothing about.
const NEUTRAL_RATING: f32 = 3.0;

/// Content-based filtering.
///
/// A user profile is the rating-weighted average of the feature vectors
/// of the items the user rated. Prediction is the cosine similarity
/// between profile and candidate vector, mapped linearly from [-1, 1]
/// to [1, 5].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentBasedModel {
    feature_keys: Vec<String>,
    item_vectors: HashMap<String, Vec<f32>>,
    user_profiles: HashMap<String, Vec<f32>>,
    user_rated: HashMap<String, HashSet<String>>,
}

impl ContentBasedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the feature-engineered item vectors. Must run before
    /// `fit`; the key union defines the dense vector layout.
    pub fn set_item_features(&mut self, features: HashMap<String, FeatureVector>) {
        let mut keys: Vec<String> = features
            .values()
            .flat_map(|f| f.keys().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        keys.sort();

        self.item_vectors = features
            .iter()
            .map(|(item_id, f)| {
                let dense: Vec<f32> = keys
                    .iter()
                    .map(|k| f.get(k).copied().unwrap_or(0.0) as f32)
                    .collect();
                (item_id.clone(), dense)
            })
            .collect();
        self.feature_keys = keys;
        self.user_profiles.clear();
        self.user_rated.clear();
    }

    fn sim_to_rating(sim: f32) -> f32 {
        (3.0 + 2.0 * sim).clamp(0.0, 5.0)
    }
}

impl Algorithm for ContentBasedModel {
    fn name(&self) -> &'static str {
        "content_based"
    }

    fn is_trained(&self) -> bool {
        !self.user_profiles.is_empty() && !self.item_vectors.is_empty()
    }

    fn fit(&mut self, interactions: &[Interaction]) -> Result<()> {
        if self.item_vectors.is_empty() {
            return Err(EngineError::FeatureExtraction(
                "item feature vectors not set before fit".to_string(),
            ));
        }

        let dim = self.feature_keys.len();
        let mut sums: HashMap<&str, (Vec<f32>, f32)> = HashMap::new();
        let mut rated: HashMap<String, HashSet<String>> = HashMap::new();

        for interaction in interactions {
            let Some(vector) = self.item_vectors.get(&interaction.item_id) else {
                continue;
            };
            let entry = sums
                .entry(interaction.user_id.as_str())
                .or_insert_with(|| (vec![0.0; dim], 0.0));
            for (acc, v) in entry.0.iter_mut().zip(vector) {
                *acc += interaction.rating * v;
            }
            entry.1 += interaction.rating;

            rated
                .entry(interaction.user_id.clone())
                .or_default()
                .insert(interaction.item_id.clone());
        }

        self.user_profiles = sums
            .into_iter()
            .filter(|(_, (_, weight))| *weight > 0.0)
            .map(|(user_id, (sum, weight))| {
                let profile: Vec<f32> = sum.into_iter().map(|v| v / weight).collect();
                (user_id.to_string(), profile)
            })
            .collect();
        self.user_rated = rated;

        debug!(profiles = self.user_profiles.len(), "content-based fitted");
        Ok(())
    }

    fn predict(&self, user_id: &str, item_id: &str) -> Result<f32> {
        let (Some(profile), Some(vector)) =
            (self.user_profiles.get(user_id), self.item_vectors.get(item_id))
        else {
            return Ok(NEUTRAL_RATING);
        };
        Ok(Self::sim_to_rating(cosine(profile, vector)))
    }

    fn recommend(&self, user_id: &str, n: usize) -> Result<Vec<(String, f32)>> {
        let seen = self.user_rated.get(user_id);
        let mut scored: Vec<(String, f32)> = self
            .item_vectors
            .keys()
            .filter(|item_id| seen.map_or(true, |s| !s.contains(*item_id)))
            .map(|item_id| {
                let score = self.predict(user_id, item_id).unwrap_or(NEUTRAL_RATING);
                (item_id.clone(), score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn feature(pairs: &[(&str, f64)]) -> FeatureVector {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn fitted() -> ContentBasedModel {
        let mut model = ContentBasedModel::new();
        model.set_item_features(HashMap::from([
            ("beach1".to_string(), feature(&[("beach", 1.0), ("price", 0.3)])),
            ("beach2".to_string(), feature(&[("beach", 1.0), ("price", 0.4)])),
            ("mountain1".to_string(), feature(&[("mountain", 1.0), ("price", 0.5)])),
        ]));

        let now = Utc::now();
        model
            .fit(&[
                Interaction::new("sunlover", "beach1", 5.0, now),
                Interaction::new("sunlover", "mountain1", 1.0, now),
                Interaction::new("climber", "mountain1", 5.0, now),
            ])
            .unwrap();
        model
    }

    #[test]
    fn test_profile_preference_ordering() {
        let model = fitted();
        let beach = model.predict("sunlover", "beach2").unwrap();
        let mountain = model.predict("sunlover", "mountain1").unwrap();
        assert!(beach > mountain, "beach {beach} vs mountain {mountain}");
        assert!((0.0..=5.0).contains(&beach));
        assert!((0.0..=5.0).contains(&mountain));
    }

    #[test]
    fn test_unseen_item_neutral() {
        let model = fitted();
        assert_eq!(model.predict("sunlover", "spaceship").unwrap(), NEUTRAL_RATING);
        assert_eq!(model.predict("nobody", "beach1").unwrap(), NEUTRAL_RATING);
    }

    #[test]
    fn test_fit_without_features_errors() {
        let mut model = ContentBasedModel::new();
        let err = model.fit(&[]).unwrap_err();
        assert!(matches!(err, EngineError::FeatureExtraction(_)));
        assert!(!model.is_trained());
    }

    #[test]
    fn test_recommend_excludes_rated() {
        let model = fitted();
        let recs = model.recommend("sunlover", 5).unwrap();
        let ids: Vec<&str> = recs.iter().map(|(id, _)| id.as_str()).collect();
        assert!(!ids.contains(&"beach1"));
        assert!(ids.contains(&"beach2"));
    }

    #[test]
    fn test_sim_mapping_bounds() {
        assert_eq!(ContentBasedModel::sim_to_rating(1.0), 5.0);
        assert_eq!(ContentBasedModel::sim_to_rating(-1.0), 1.0);
        assert_eq!(ContentBasedModel::sim_to_rating(0.0), 3.0);
    }
}
