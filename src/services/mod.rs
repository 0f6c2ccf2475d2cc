pub mod algorithms;
pub mod cache;
pub mod engine;
pub mod experiments;
pub mod fallback;
pub mod features;
pub mod hybrid;
pub mod manager;

pub use algorithms::{
    Algorithm, ContentBasedModel, MatrixFactorizationModel, PopularityModel, RatingMatrix,
    UserCfModel,
};
pub use cache::{CacheStore, InMemoryCacheStore, RecommendationCache, RedisCacheStore};
pub use engine::{CandidateProvider, InMemoryCandidateProvider, RealtimeRecommendationEngine};
pub use experiments::{ExperimentProvider, MetricEvent, StaticExperimentProvider};
pub use fallback::FallbackEngine;
pub use features::{FeatureEngineer, LabelEncoder, StandardScaler, TfIdfKeywords};
pub use hybrid::{CombinedScore, HybridCombiner};
pub use manager::{ArtifactEnvelope, ModelArtifact, ModelManager, PredictionPool};
