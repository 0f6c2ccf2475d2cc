use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error taxonomy.
///
/// Everything except `InvalidRequest` is recovered inside the
/// orchestrator: unavailable models are excluded from combination,
/// cache failures degrade to uncached compute, and candidate/algorithm
/// exhaustion routes the request to the fallback path.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model not available: {0}")]
    ModelUnavailable(String),

    #[error("prediction failed in {algorithm}: {reason}")]
    PredictionFailure { algorithm: String, reason: String },

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("no candidates matched the request filters")]
    NoCandidates,

    #[error("all algorithms failed or are unavailable")]
    AllAlgorithmsFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("model artifact error: {0}")]
    ModelLoad(String),

    #[error("feature extraction error: {0}")]
    FeatureExtraction(String),

    #[error("prediction pool saturated")]
    PoolSaturated,
}

impl EngineError {
    pub fn prediction(algorithm: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::PredictionFailure {
            algorithm: algorithm.into(),
            reason: reason.into(),
        }
    }

    /// Errors the orchestrator converts into the fallback path instead
    /// of surfacing to the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::InvalidRequest(_))
    }
}

impl From<redis::RedisError> for EngineError {
    fn from(err: redis::RedisError) -> Self {
        EngineError::CacheUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::ModelLoad(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ModelLoad(err.to_string())
    }
}
