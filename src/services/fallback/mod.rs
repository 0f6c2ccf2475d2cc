//! Degraded-but-always-available recommendations.
//!
//! Keeps short-lived in-memory snapshots of top items by decayed
//! popularity, globally (~1 h) and per category (~2 h). Snapshots are
//! explicit process-wide state with TTL refresh and a shutdown clear
//! hook, not ambient globals.

use crate::config::FallbackConfig;
use crate::models::{ItemRecord, ScoredItem};
use crate::services::algorithms::{Algorithm, PopularityModel};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const GLOBAL_KEY: &str = "__global__";

struct Snapshot {
    items: Vec<(String, f64)>,
    built_at: Instant,
}

pub struct FallbackEngine {
    config: FallbackConfig,
    popularity: RwLock<Arc<PopularityModel>>,
    /// item_id → category, for the per-category defaults.
    categories: HashMap<String, String>,
    snapshots: DashMap<String, Snapshot>,
}

impl FallbackEngine {
    pub fn new(
        config: FallbackConfig,
        popularity: Arc<PopularityModel>,
        catalog: &[ItemRecord],
    ) -> Self {
        let categories = catalog
            .iter()
            .map(|item| (item.id.clone(), item.category.clone()))
            .collect();
        Self {
            config,
            popularity: RwLock::new(popularity),
            categories,
            snapshots: DashMap::new(),
        }
    }

    /// Swap in a freshly fitted popularity model and drop stale
    /// snapshots so the next request rebuilds from it.
    pub fn update_popularity(&self, popularity: Arc<PopularityModel>) {
        *self.popularity.write().expect("fallback lock poisoned") = popularity;
        self.snapshots.clear();
    }

    fn ttl_for(&self, key: &str) -> Duration {
        if key == GLOBAL_KEY {
            Duration::from_secs(self.config.global_ttl_secs)
        } else {
            Duration::from_secs(self.config.category_ttl_secs)
        }
    }

    fn build_snapshot(&self, key: &str) -> Snapshot {
        let popularity = self
            .popularity
            .read()
            .expect("fallback lock poisoned")
            .clone();

        let mut items: Vec<(String, f64)> = popularity
            .ranked_items()
            .filter(|(item_id, _)| {
                key == GLOBAL_KEY
                    || self.categories.get(*item_id).map(String::as_str) == Some(key)
            })
            .map(|(item_id, score)| (item_id.to_string(), score))
            .take(self.config.snapshot_size)
            .collect();

        // No popularity data at all: fall back to catalog order with a
        // neutral score so the caller still gets a list.
        if items.is_empty() && !popularity.is_trained() {
            items = self
                .categories
                .keys()
                .filter(|item_id| {
                    key == GLOBAL_KEY
                        || self.categories.get(*item_id).map(String::as_str) == Some(key)
                })
                .take(self.config.snapshot_size)
                .map(|item_id| (item_id.clone(), 0.5))
                .collect();
            items.sort_by(|a, b| a.0.cmp(&b.0));
        }

        debug!(key, size = items.len(), "fallback snapshot rebuilt");
        Snapshot {
            items,
            built_at: Instant::now(),
        }
    }

    fn snapshot_items(&self, key: &str, limit: usize) -> Vec<(String, f64)> {
        let fresh = self
            .snapshots
            .get(key)
            .map(|s| s.built_at.elapsed() < self.ttl_for(key))
            .unwrap_or(false);
        if !fresh {
            self.snapshots.insert(key.to_string(), self.build_snapshot(key));
        }
        self.snapshots
            .get(key)
            .map(|s| s.items.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Top popular items, globally or within a category, flagged as
    /// fallback results with reduced confidence.
    pub fn recommend(&self, limit: usize, category: Option<&str>) -> Vec<ScoredItem> {
        let key = category.unwrap_or(GLOBAL_KEY);
        let ranked = self.snapshot_items(key, limit);

        let max_score = ranked
            .first()
            .map(|(_, score)| score.max(1.0))
            .unwrap_or(1.0);

        ranked
            .into_iter()
            .map(|(item_id, score)| {
                let category = self.categories.get(&item_id).cloned();
                ScoredItem {
                    item_id,
                    raw_score: ((score / max_score) * 5.0) as f32,
                    // Fallback results carry deliberately low confidence.
                    confidence: ((score / max_score) * 0.5) as f32,
                    contributions: HashMap::from([(
                        "popularity".to_string(),
                        score as f32,
                    )]),
                    explanation: "Popular with travelers right now".to_string(),
                    is_fallback: true,
                    category,
                }
            })
            .collect()
    }

    /// Shutdown hook: drop all snapshots.
    pub fn clear(&self) {
        self.snapshots.clear();
        info!("fallback snapshots cleared");
    }
}
