//! Realtime recommendation orchestrator.
//!
//! Request flow: cache check → candidate retrieval → batched
//! multi-algorithm prediction (under a request timeout) → hybrid
//! combination → contextual/diversity boosting → confidence filter →
//! formatting → best-effort cache write. Any recoverable failure after
//! candidate retrieval routes to the fallback path; well-formed
//! requests always get a response.

mod candidates;

pub use candidates::{CandidateProvider, InMemoryCandidateProvider};

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::models::{
    FeedbackEvent, FeedbackType, ItemRecord, RecommendationRequest, RecommendationResponse,
    RecommendationType, RequestContext, ScoredItem, Weather,
};
use crate::services::cache::RecommendationCache;
use crate::services::experiments::{ExperimentProvider, MetricEvent};
use crate::services::fallback::FallbackEngine;
use crate::services::hybrid::HybridCombiner;
use crate::services::manager::ModelManager;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct RealtimeRecommendationEngine {
    config: Config,
    manager: Arc<ModelManager>,
    combiner: HybridCombiner,
    cache: RecommendationCache,
    fallback: Arc<FallbackEngine>,
    candidates: Arc<dyn CandidateProvider>,
    experiments: Arc<dyn ExperimentProvider>,
    /// Feedback buffered for offline retraining export.
    feedback_log: Mutex<Vec<FeedbackEvent>>,
}

impl RealtimeRecommendationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        manager: Arc<ModelManager>,
        combiner: HybridCombiner,
        cache: RecommendationCache,
        fallback: Arc<FallbackEngine>,
        candidates: Arc<dyn CandidateProvider>,
        experiments: Arc<dyn ExperimentProvider>,
    ) -> Self {
        Self {
            config,
            manager,
            combiner,
            cache,
            fallback,
            candidates,
            experiments,
            feedback_log: Mutex::new(Vec::new()),
        }
    }

    /// End-to-end request handler. Only malformed input surfaces as an
    /// error; every other failure degrades to the fallback path.
    pub async fn get_recommendations(
        &self,
        request: &RecommendationRequest,
        context: &RequestContext,
    ) -> Result<RecommendationResponse> {
        let start = Instant::now();

        let recommendation_type = RecommendationType::parse(&request.recommendation_type)
            .ok_or_else(|| {
                EngineError::InvalidRequest(format!(
                    "unknown recommendation type: {}",
                    request.recommendation_type
                ))
            })?;
        if request.limit == 0 || request.limit > self.config.engine.max_limit {
            return Err(EngineError::InvalidRequest(format!(
                "limit must be in 1..={}",
                self.config.engine.max_limit
            )));
        }

        let cache_key =
            RecommendationCache::key(recommendation_type, &request.user_id, &request.filters);

        if let Some(items) = self.cache.get(&cache_key).await {
            return Ok(self.respond(items, request, true, start));
        }

        match self.score_candidates(request, context).await {
            Ok(items) => {
                self.cache.set(&cache_key, &items).await;
                Ok(self.respond(items, request, false, start))
            }
            Err(e) if e.is_recoverable() => {
                info!(user_id = %request.user_id, reason = %e, "serving fallback recommendations");
                let items = self.fallback_items(request);
                Ok(self.respond(items, request, false, start))
            }
            Err(e) => Err(e),
        }
    }

    /// The primary scoring pipeline; recoverable errors route the
    /// caller to the fallback path.
    async fn score_candidates(
        &self,
        request: &RecommendationRequest,
        context: &RequestContext,
    ) -> Result<Vec<ScoredItem>> {
        let candidates = self
            .candidates
            .retrieve(
                &request.user_id,
                &request.filters,
                self.config.engine.max_candidates,
            )
            .await?;
        if candidates.is_empty() {
            return Err(EngineError::NoCandidates);
        }

        if !self.manager.has_trained_model() {
            return Err(EngineError::AllAlgorithmsFailed);
        }

        let item_ids: Arc<Vec<String>> =
            Arc::new(candidates.iter().map(|c| c.id.clone()).collect());

        let timeout = Duration::from_millis(self.config.engine.request_timeout_ms);
        let predictions = match tokio::time::timeout(
            timeout,
            self.manager.predict_all(&request.user_id, item_ids.clone()),
        )
        .await
        {
            Ok(predictions) => predictions,
            Err(_) => {
                warn!(
                    user_id = %request.user_id,
                    timeout_ms = self.config.engine.request_timeout_ms,
                    "prediction timed out"
                );
                return Err(EngineError::AllAlgorithmsFailed);
            }
        };
        if predictions.is_empty() {
            return Err(EngineError::AllAlgorithmsFailed);
        }

        let overrides = self.experiments.weight_overrides(&request.user_id);
        let combined =
            self.combiner
                .combine(&predictions, candidates.len(), overrides.as_ref());

        let mut scored: Vec<ScoredItem> = combined
            .into_iter()
            .zip(&candidates)
            .filter_map(|(combined, item)| {
                combined.map(|c| ScoredItem {
                    item_id: item.id.clone(),
                    raw_score: c.score,
                    confidence: 0.0,
                    contributions: c.contributions,
                    explanation: String::new(),
                    is_fallback: false,
                    category: Some(item.category.clone()),
                })
            })
            .collect();

        let by_id: HashMap<&str, &ItemRecord> =
            candidates.iter().map(|c| (c.id.as_str(), c)).collect();
        self.apply_contextual_boosts(&mut scored, &by_id, context);

        scored.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.apply_diversity_boost(&mut scored);
        scored.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for item in &mut scored {
            item.confidence = (item.raw_score / 5.0).clamp(0.0, 1.0);
        }
        scored.retain(|item| item.confidence >= self.config.engine.min_confidence);
        if scored.is_empty() {
            debug!(user_id = %request.user_id, "all combined scores below confidence threshold");
            return Err(EngineError::AllAlgorithmsFailed);
        }

        scored.truncate(self.config.engine.max_limit);
        for item in &mut scored {
            item.explanation = explain(item);
        }
        Ok(scored)
    }

    /// Multiplicative context boosts; scores stay clamped to [0, 5].
    fn apply_contextual_boosts(
        &self,
        scored: &mut [ScoredItem],
        items: &HashMap<&str, &ItemRecord>,
        context: &RequestContext,
    ) {
        let cfg = &self.config.engine;
        for entry in scored.iter_mut() {
            let Some(item) = items.get(entry.item_id.as_str()) else {
                continue;
            };
            let mut boost = 1.0f32;

            if context.is_weekend() && has_tag(item, &["leisure", "weekend"]) {
                boost *= cfg.weekend_boost;
            }
            if context.weather == Some(Weather::Clear) && has_tag(item, &["outdoor"]) {
                boost *= cfg.weather_boost;
            }
            if let Some(tier) = context.budget_level {
                if crate::models::BudgetLevel::from_price(item.price) == tier {
                    boost *= cfg.budget_boost;
                }
            }

            entry.raw_score = (entry.raw_score * boost).clamp(0.0, 5.0);
        }
    }

    /// The second-ranked item within each category gets a small bump so
    /// a single category cannot saturate the top of the list.
    fn apply_diversity_boost(&self, scored: &mut [ScoredItem]) {
        let mut seen: HashMap<String, usize> = HashMap::new();
        for entry in scored.iter_mut() {
            let Some(category) = entry.category.clone() else {
                continue;
            };
            let count = seen.entry(category).or_insert(0);
            *count += 1;
            if *count == 2 {
                entry.raw_score =
                    (entry.raw_score * self.config.engine.diversity_boost).clamp(0.0, 5.0);
            }
        }
    }

    fn fallback_items(&self, request: &RecommendationRequest) -> Vec<ScoredItem> {
        let category = request.filters.get("category").map(String::as_str);
        self.fallback
            .recommend(request.offset + request.limit, category)
    }

    fn respond(
        &self,
        items: Vec<ScoredItem>,
        request: &RecommendationRequest,
        cached: bool,
        start: Instant,
    ) -> RecommendationResponse {
        let total_count = items.len();
        let algorithm_used = algorithm_label(&items);
        let page: Vec<ScoredItem> = items
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();

        RecommendationResponse {
            recommendations: page,
            total_count,
            algorithm_used,
            cached,
            response_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Fire-and-forget feedback ingestion: invalidates the user's
    /// cached lists and buffers the event for offline retraining. Never
    /// re-scores synchronously.
    pub async fn update_user_feedback(
        &self,
        user_id: &str,
        item_id: &str,
        feedback_type: FeedbackType,
        context: HashMap<String, String>,
    ) -> Result<()> {
        self.cache.invalidate_user(user_id).await;

        if let Some(experiment_id) = context.get("experiment_id") {
            let metric = match feedback_type {
                FeedbackType::Book => Some(MetricEvent::Conversion),
                FeedbackType::Click => Some(MetricEvent::ClickThrough),
                _ => None,
            };
            if let Some(metric) = metric {
                self.experiments.record_metric(experiment_id, user_id, metric);
            }
        }

        let event = FeedbackEvent {
            id: uuid::Uuid::new_v4(),
            user_id: user_id.to_string(),
            item_id: item_id.to_string(),
            feedback_type,
            timestamp: Utc::now(),
            context,
        };
        self.feedback_log.lock().await.push(event);

        info!(user_id, item_id, feedback = feedback_type.as_str(), "feedback recorded");
        Ok(())
    }

    /// Drain buffered feedback for the offline retraining exporter.
    pub async fn drain_feedback(&self) -> Vec<FeedbackEvent> {
        std::mem::take(&mut *self.feedback_log.lock().await)
    }

    /// Shutdown hook: clears process-wide fallback state.
    pub fn shutdown(&self) {
        self.fallback.clear();
    }
}

fn has_tag(item: &ItemRecord, wanted: &[&str]) -> bool {
    item.tags.iter().any(|t| wanted.contains(&t.as_str()))
}

/// Human-readable label of what produced a list.
fn algorithm_label(items: &[ScoredItem]) -> String {
    if items.iter().all(|i| i.is_fallback) && !items.is_empty() {
        return "fallback(popularity)".to_string();
    }
    let mut names: Vec<&str> = items
        .iter()
        .flat_map(|i| i.contributions.keys().map(String::as_str))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    names.sort_unstable();
    if names.is_empty() {
        "none".to_string()
    } else {
        format!("hybrid({})", names.join("+"))
    }
}

/// Explanation from the dominant contributor and the score band.
fn explain(item: &ScoredItem) -> String {
    let band = if item.raw_score >= 4.0 {
        "Highly recommended"
    } else if item.raw_score >= 3.0 {
        "Good match"
    } else {
        "Worth a look"
    };

    let dominant = item
        .contributions
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(name, _)| name.as_str());

    let reason = match dominant {
        Some("user_cf") => "travelers with similar taste rated this highly",
        Some("content_based") => "it matches your interests",
        Some("matrix_factorization") => "it fits your overall taste profile",
        Some("popularity") => "it is trending with travelers right now",
        _ => "it scored well across our models",
    };

    format!("{band}: {reason}")
}
