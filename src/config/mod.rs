use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub hybrid: HybridWeights,
    pub algorithms: AlgorithmConfig,
    pub cache: CacheConfig,
    pub fallback: FallbackConfig,
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Minimum combined confidence for an item to be returned.
    /// Tunable, not an invariant.
    pub min_confidence: f32,
    /// Candidate set cap before prediction.
    pub max_candidates: usize,
    pub max_limit: usize,
    /// Request-level prediction timeout; expiry routes to fallback.
    pub request_timeout_ms: u64,
    pub weekend_boost: f32,
    pub weather_boost: f32,
    pub budget_boost: f32,
    pub diversity_boost: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HybridWeights {
    pub user_cf: f32,
    pub content_based: f32,
    pub matrix_factorization: f32,
    pub popularity: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlgorithmConfig {
    /// Users/items below this interaction count are dropped from the
    /// collaborative rating matrix.
    pub min_interactions: usize,
    pub top_k_neighbors: usize,
    pub n_factors: usize,
    pub max_iterations: usize,
    /// Popularity decay rate per day (λ in e^(-λ·age_days)).
    pub decay_rate: f64,
    pub tfidf_top_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub redis_url: String,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FallbackConfig {
    /// Global popularity snapshot TTL (~1h).
    pub global_ttl_secs: u64,
    /// Per-category snapshot TTL (~2h).
    pub category_ttl_secs: u64,
    /// Items retained per snapshot.
    pub snapshot_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Concurrent blocking prediction tasks.
    pub max_concurrent: usize,
    /// Additional queued tasks before the pool rejects work.
    pub queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                min_confidence: 0.3,
                max_candidates: 200,
                max_limit: 100,
                request_timeout_ms: 500,
                weekend_boost: 1.15,
                weather_boost: 1.1,
                budget_boost: 1.1,
                diversity_boost: 1.05,
            },
            hybrid: HybridWeights {
                user_cf: 0.35,
                content_based: 0.25,
                matrix_factorization: 0.25,
                popularity: 0.15,
            },
            algorithms: AlgorithmConfig {
                min_interactions: 2,
                top_k_neighbors: 20,
                n_factors: 16,
                max_iterations: 50,
                decay_rate: 0.1,
                tfidf_top_k: 5,
            },
            cache: CacheConfig {
                redis_url: "redis://localhost:6379".to_string(),
                ttl_secs: 3600,
            },
            fallback: FallbackConfig {
                global_ttl_secs: 3600,
                category_ttl_secs: 7200,
                snapshot_size: 100,
            },
            pool: PoolConfig {
                max_concurrent: 4,
                queue_depth: 32,
            },
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or(default),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        Config {
            engine: EngineConfig {
                min_confidence: env_or("MIN_CONFIDENCE", defaults.engine.min_confidence),
                max_candidates: env_or("MAX_CANDIDATES", defaults.engine.max_candidates),
                max_limit: env_or("MAX_LIMIT", defaults.engine.max_limit),
                request_timeout_ms: env_or("REQUEST_TIMEOUT_MS", defaults.engine.request_timeout_ms),
                weekend_boost: env_or("WEEKEND_BOOST", defaults.engine.weekend_boost),
                weather_boost: env_or("WEATHER_BOOST", defaults.engine.weather_boost),
                budget_boost: env_or("BUDGET_BOOST", defaults.engine.budget_boost),
                diversity_boost: env_or("DIVERSITY_BOOST", defaults.engine.diversity_boost),
            },
            hybrid: HybridWeights {
                user_cf: env_or("WEIGHT_USER_CF", defaults.hybrid.user_cf),
                content_based: env_or("WEIGHT_CONTENT_BASED", defaults.hybrid.content_based),
                matrix_factorization: env_or(
                    "WEIGHT_MATRIX_FACTORIZATION",
                    defaults.hybrid.matrix_factorization,
                ),
                popularity: env_or("WEIGHT_POPULARITY", defaults.hybrid.popularity),
            },
            algorithms: AlgorithmConfig {
                min_interactions: env_or("MIN_INTERACTIONS", defaults.algorithms.min_interactions),
                top_k_neighbors: env_or("TOP_K_NEIGHBORS", defaults.algorithms.top_k_neighbors),
                n_factors: env_or("N_FACTORS", defaults.algorithms.n_factors),
                max_iterations: env_or("MAX_ITERATIONS", defaults.algorithms.max_iterations),
                decay_rate: env_or("POPULARITY_DECAY_RATE", defaults.algorithms.decay_rate),
                tfidf_top_k: env_or("TFIDF_TOP_K", defaults.algorithms.tfidf_top_k),
            },
            cache: CacheConfig {
                redis_url: env::var("REDIS_URL").unwrap_or(defaults.cache.redis_url),
                ttl_secs: env_or("CACHE_TTL_SECS", defaults.cache.ttl_secs),
            },
            fallback: FallbackConfig {
                global_ttl_secs: env_or("FALLBACK_GLOBAL_TTL_SECS", defaults.fallback.global_ttl_secs),
                category_ttl_secs: env_or(
                    "FALLBACK_CATEGORY_TTL_SECS",
                    defaults.fallback.category_ttl_secs,
                ),
                snapshot_size: env_or("FALLBACK_SNAPSHOT_SIZE", defaults.fallback.snapshot_size),
            },
            pool: PoolConfig {
                max_concurrent: env_or("POOL_MAX_CONCURRENT", defaults.pool.max_concurrent),
                queue_depth: env_or("POOL_QUEUE_DEPTH", defaults.pool.queue_depth),
            },
        }
    }
}
