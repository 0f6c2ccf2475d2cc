//! End-to-end engine scenarios: trained hybrid serving, cache reuse and
//! invalidation, fallback degradation, and request validation.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use recommendation_engine::config::Config;
use recommendation_engine::error::{EngineError, Result};
use recommendation_engine::models::{
    FeedbackType, Interaction, ItemRecord, RecommendationRequest, RequestContext,
};
use recommendation_engine::services::algorithms::{Algorithm, PopularityModel, UserCfModel};
use recommendation_engine::services::cache::{CacheStore, InMemoryCacheStore, RecommendationCache};
use recommendation_engine::services::engine::{
    InMemoryCandidateProvider, RealtimeRecommendationEngine,
};
use recommendation_engine::services::experiments::StaticExperimentProvider;
use recommendation_engine::services::fallback::FallbackEngine;
use recommendation_engine::services::hybrid::HybridCombiner;
use recommendation_engine::services::manager::ModelManager;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn catalog() -> Vec<ItemRecord> {
    let specs = [
        ("villa-faro", "beach", 120.0, vec!["outdoor", "leisure"]),
        ("loft-porto", "city", 90.0, vec!["culture"]),
        ("cabin-serra", "mountain", 60.0, vec!["outdoor"]),
        ("flat-lisbon", "city", 150.0, vec!["leisure"]),
        ("surf-house", "beach", 80.0, vec!["outdoor", "weekend"]),
        ("quinta-douro", "countryside", 200.0, vec!["leisure"]),
    ];
    specs
        .into_iter()
        .map(|(id, category, price, tags)| ItemRecord {
            id: id.to_string(),
            name: id.replace('-', " "),
            item_type: "house".into(),
            category: category.to_string(),
            price,
            amenities: vec!["wifi".into()],
            tags: tags.into_iter().map(String::from).collect(),
            city: "Faro".into(),
            country: "PT".into(),
            latitude: 37.0,
            longitude: -7.9,
            description: String::new(),
            reviews: vec![],
        })
        .collect()
}

fn interactions() -> Vec<Interaction> {
    let now = Utc::now();
    let ratings: [(&str, &str, f32); 12] = [
        ("alice", "villa-faro", 5.0),
        ("alice", "surf-house", 4.5),
        ("alice", "loft-porto", 2.0),
        ("bob", "villa-faro", 4.5),
        ("bob", "surf-house", 5.0),
        ("bob", "cabin-serra", 4.0),
        ("carol", "loft-porto", 5.0),
        ("carol", "flat-lisbon", 4.5),
        ("carol", "villa-faro", 2.5),
        ("dave", "quinta-douro", 4.0),
        ("dave", "flat-lisbon", 3.5),
        ("dave", "cabin-serra", 3.0),
    ];
    ratings
        .iter()
        .enumerate()
        .map(|(idx, (user, item, rating))| {
            Interaction::new(user, item, *rating, now - ChronoDuration::hours(idx as i64))
        })
        .collect()
}

struct EngineSetup {
    engine: RealtimeRecommendationEngine,
    store: Arc<InMemoryCacheStore>,
}

fn trained_engine() -> EngineSetup {
    let config = Config::default();
    let items = catalog();
    let history = interactions();

    let mut user_cf = UserCfModel::new(config.algorithms.top_k_neighbors, 1);
    user_cf.fit(&history).unwrap();
    let mut popularity = PopularityModel::new(config.algorithms.decay_rate);
    popularity.fit(&history).unwrap();
    let popularity = Arc::new(popularity);

    let user_cf: Arc<dyn Algorithm> = Arc::new(user_cf);
    let pop_alg: Arc<dyn Algorithm> = popularity.clone();

    let manager = Arc::new(ModelManager::new(&config.pool));
    manager.register(user_cf.clone());
    manager.register(pop_alg.clone());

    let combiner = HybridCombiner::new(vec![
        (user_cf, config.hybrid.user_cf),
        (pop_alg, config.hybrid.popularity),
    ])
    .unwrap();

    let store = Arc::new(InMemoryCacheStore::new());
    let cache = RecommendationCache::new(store.clone(), config.cache.ttl_secs);
    let fallback = Arc::new(FallbackEngine::new(
        config.fallback.clone(),
        popularity,
        &items,
    ));
    let candidates = Arc::new(InMemoryCandidateProvider::new(items));

    let engine = RealtimeRecommendationEngine::new(
        config,
        manager,
        combiner,
        cache,
        fallback,
        candidates,
        Arc::new(StaticExperimentProvider::new()),
    );
    EngineSetup { engine, store }
}

/// Engine with no trained models; only the fallback path can serve.
fn untrained_engine() -> RealtimeRecommendationEngine {
    let config = Config::default();
    let items = catalog();

    let user_cf: Arc<dyn Algorithm> = Arc::new(UserCfModel::new(20, 1));
    let popularity = Arc::new(PopularityModel::new(config.algorithms.decay_rate));
    let pop_alg: Arc<dyn Algorithm> = popularity.clone();

    let manager = Arc::new(ModelManager::new(&config.pool));
    manager.register(user_cf.clone());
    manager.register(pop_alg.clone());

    let combiner = HybridCombiner::new(vec![
        (user_cf, config.hybrid.user_cf),
        (pop_alg, config.hybrid.popularity),
    ])
    .unwrap();

    let cache = RecommendationCache::new(Arc::new(InMemoryCacheStore::new()), 3600);
    let fallback = Arc::new(FallbackEngine::new(
        config.fallback.clone(),
        popularity,
        &items,
    ));
    let candidates = Arc::new(InMemoryCandidateProvider::new(items));

    RealtimeRecommendationEngine::new(
        config,
        manager,
        combiner,
        cache,
        fallback,
        candidates,
        Arc::new(StaticExperimentProvider::new()),
    )
}

fn request(user: &str, limit: usize) -> RecommendationRequest {
    RecommendationRequest {
        user_id: user.to_string(),
        recommendation_type: "personalized".to_string(),
        filters: BTreeMap::new(),
        limit,
        offset: 0,
    }
}

#[tokio::test]
async fn test_trained_hybrid_serves_ranked_list() {
    init_tracing();
    let setup = trained_engine();

    let response = setup
        .engine
        .get_recommendations(&request("alice", 5), &RequestContext::now())
        .await
        .unwrap();

    assert!(!response.recommendations.is_empty());
    assert!(response.recommendations.len() <= 5);
    assert!(!response.cached);
    assert!(response.algorithm_used.starts_with("hybrid("));
    assert!(response
        .recommendations
        .windows(2)
        .all(|w| w[0].raw_score >= w[1].raw_score));
    for item in &response.recommendations {
        assert!(!item.is_fallback);
        assert!(item.raw_score >= 0.0 && item.raw_score <= 5.0);
        assert!(item.confidence >= 0.3 && item.confidence <= 1.0);
        assert!(!item.explanation.is_empty());
        assert!(!item.contributions.is_empty());
    }
}

#[tokio::test]
async fn test_second_request_served_from_cache() {
    init_tracing();
    let setup = trained_engine();
    let req = request("bob", 5);

    let first = setup
        .engine
        .get_recommendations(&req, &RequestContext::now())
        .await
        .unwrap();
    assert!(!first.cached);

    let second = setup
        .engine
        .get_recommendations(&req, &RequestContext::now())
        .await
        .unwrap();
    assert!(second.cached);
    assert_eq!(
        first
            .recommendations
            .iter()
            .map(|r| r.item_id.as_str())
            .collect::<Vec<_>>(),
        second
            .recommendations
            .iter()
            .map(|r| r.item_id.as_str())
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_feedback_invalidates_cached_lists() {
    init_tracing();
    let setup = trained_engine();
    let req = request("carol", 5);
    let context = RequestContext::now();

    setup.engine.get_recommendations(&req, &context).await.unwrap();
    let cached = setup.engine.get_recommendations(&req, &context).await.unwrap();
    assert!(cached.cached);

    setup
        .engine
        .update_user_feedback("carol", "villa-faro", FeedbackType::Book, HashMap::new())
        .await
        .unwrap();

    let after = setup.engine.get_recommendations(&req, &context).await.unwrap();
    assert!(!after.cached);

    let drained = setup.engine.drain_feedback().await;
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].item_id, "villa-faro");
    assert!(setup.engine.drain_feedback().await.is_empty());
}

#[tokio::test]
async fn test_untrained_models_degrade_to_fallback() {
    init_tracing();
    let engine = untrained_engine();

    let response = engine
        .get_recommendations(&request("newcomer", 5), &RequestContext::now())
        .await
        .unwrap();

    assert!(!response.recommendations.is_empty());
    assert!(response.recommendations.len() <= 5);
    assert!(response.recommendations.iter().all(|r| r.is_fallback));
    assert_eq!(response.algorithm_used, "fallback(popularity)");
    assert!(response
        .recommendations
        .iter()
        .all(|r| r.confidence <= 0.5));
}

#[tokio::test]
async fn test_unknown_user_gets_popularity_ranked_fallback() {
    init_tracing();
    let config = Config::default();
    let items = catalog();
    let mut popularity = PopularityModel::new(config.algorithms.decay_rate);
    popularity.fit(&interactions()).unwrap();
    let fallback = FallbackEngine::new(config.fallback, Arc::new(popularity), &items);

    let recs = fallback.recommend(5, None);
    assert_eq!(recs.len(), 5);
    assert!(recs.windows(2).all(|w| w[0].raw_score >= w[1].raw_score));
}

/// Model whose predictions stall far past any request timeout.
struct SlowModel;

impl Algorithm for SlowModel {
    fn name(&self) -> &'static str {
        "user_cf"
    }
    fn is_trained(&self) -> bool {
        true
    }
    fn fit(&mut self, _interactions: &[Interaction]) -> Result<()> {
        Ok(())
    }
    fn predict(&self, _user_id: &str, _item_id: &str) -> Result<f32> {
        std::thread::sleep(std::time::Duration::from_millis(200));
        Ok(4.0)
    }
    fn recommend(&self, _user_id: &str, _n: usize) -> Result<Vec<(String, f32)>> {
        Ok(vec![])
    }
}

#[tokio::test]
async fn test_prediction_timeout_falls_back() {
    init_tracing();
    let mut config = Config::default();
    config.engine.request_timeout_ms = 50;

    let items = catalog();
    let mut popularity = PopularityModel::new(config.algorithms.decay_rate);
    popularity.fit(&interactions()).unwrap();
    let popularity = Arc::new(popularity);

    let slow: Arc<dyn Algorithm> = Arc::new(SlowModel);
    let manager = Arc::new(ModelManager::new(&config.pool));
    manager.register(slow.clone());

    let combiner = HybridCombiner::new(vec![(slow, 1.0)]).unwrap();
    let cache = RecommendationCache::new(Arc::new(InMemoryCacheStore::new()), config.cache.ttl_secs);
    let fallback = Arc::new(FallbackEngine::new(
        config.fallback.clone(),
        popularity,
        &items,
    ));
    let candidates = Arc::new(InMemoryCandidateProvider::new(items));

    let engine = RealtimeRecommendationEngine::new(
        config,
        manager,
        combiner,
        cache,
        fallback,
        candidates,
        Arc::new(StaticExperimentProvider::new()),
    );

    let response = engine
        .get_recommendations(&request("alice", 5), &RequestContext::now())
        .await
        .unwrap();

    assert!(!response.recommendations.is_empty());
    assert!(response.recommendations.iter().all(|r| r.is_fallback));
    assert_eq!(response.algorithm_used, "fallback(popularity)");
}

struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(EngineError::CacheUnavailable("connection refused".into()))
    }
    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl_secs: u64) -> Result<()> {
        Err(EngineError::CacheUnavailable("connection refused".into()))
    }
    async fn delete_matching(&self, _prefix: &str) -> Result<u64> {
        Err(EngineError::CacheUnavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn test_cache_backend_down_still_serves() {
    init_tracing();
    let config = Config::default();
    let items = catalog();
    let history = interactions();

    let mut popularity = PopularityModel::new(config.algorithms.decay_rate);
    popularity.fit(&history).unwrap();
    let popularity = Arc::new(popularity);
    let pop_alg: Arc<dyn Algorithm> = popularity.clone();

    let manager = Arc::new(ModelManager::new(&config.pool));
    manager.register(pop_alg.clone());

    let combiner = HybridCombiner::new(vec![(pop_alg, 1.0)]).unwrap();
    let cache = RecommendationCache::new(Arc::new(FailingStore), config.cache.ttl_secs);
    let fallback = Arc::new(FallbackEngine::new(
        config.fallback.clone(),
        popularity,
        &items,
    ));
    let candidates = Arc::new(InMemoryCandidateProvider::new(items));

    let engine = RealtimeRecommendationEngine::new(
        config,
        manager,
        combiner,
        cache,
        fallback,
        candidates,
        Arc::new(StaticExperimentProvider::new()),
    );

    let response = engine
        .get_recommendations(&request("alice", 5), &RequestContext::now())
        .await
        .unwrap();
    assert!(!response.cached);
    assert!(!response.recommendations.is_empty());

    // Feedback still works with the cache down.
    engine
        .update_user_feedback("alice", "villa-faro", FeedbackType::Click, HashMap::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_invalid_requests_rejected() {
    init_tracing();
    let setup = trained_engine();
    let context = RequestContext::now();

    let mut bad_type = request("alice", 5);
    bad_type.recommendation_type = "mystery".to_string();
    assert!(matches!(
        setup.engine.get_recommendations(&bad_type, &context).await,
        Err(EngineError::InvalidRequest(_))
    ));

    let zero_limit = request("alice", 0);
    assert!(matches!(
        setup.engine.get_recommendations(&zero_limit, &context).await,
        Err(EngineError::InvalidRequest(_))
    ));

    let oversized = request("alice", 1000);
    assert!(matches!(
        setup.engine.get_recommendations(&oversized, &context).await,
        Err(EngineError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_filters_narrow_candidates() {
    init_tracing();
    let setup = trained_engine();
    let mut req = request("alice", 5);
    req.filters
        .insert("category".to_string(), "beach".to_string());

    let response = setup
        .engine
        .get_recommendations(&req, &RequestContext::now())
        .await
        .unwrap();
    assert!(response
        .recommendations
        .iter()
        .all(|r| r.category.as_deref() == Some("beach")));
}

#[tokio::test]
async fn test_offset_pagination() {
    init_tracing();
    let setup = trained_engine();
    let context = RequestContext::now();

    let full = setup
        .engine
        .get_recommendations(&request("bob", 4), &context)
        .await
        .unwrap();

    let mut paged_req = request("bob", 2);
    paged_req.offset = 2;
    let paged = setup
        .engine
        .get_recommendations(&paged_req, &context)
        .await
        .unwrap();

    let tail: Vec<&str> = full.recommendations[2..]
        .iter()
        .map(|r| r.item_id.as_str())
        .collect();
    let page: Vec<&str> = paged
        .recommendations
        .iter()
        .map(|r| r.item_id.as_str())
        .collect();
    assert_eq!(page, tail);

    // Pagination against the cached full list reports the same total.
    assert_eq!(full.total_count, paged.total_count);

    let _ = setup.store;
    setup.engine.shutdown();
}
