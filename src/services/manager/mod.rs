//! Model ownership and batched prediction.
//!
//! `ModelManager` exclusively owns loaded model instances: models are
//! read-only during serving and replaced atomically on reload. CPU-bound
//! prediction is offloaded to a bounded blocking pool so numeric work
//! never blocks the request loop.

use crate::config::PoolConfig;
use crate::error::{EngineError, Result};
use crate::services::algorithms::{
    Algorithm, ContentBasedModel, MatrixFactorizationModel, PopularityModel, UserCfModel,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub const ARTIFACT_VERSION: u32 = 1;

/// Self-describing model artifact: `{"version":1,"algorithm":...,"state":{...}}`.
#[derive(Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    pub version: u32,
    #[serde(flatten)]
    pub model: ModelArtifact,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "algorithm", content = "state", rename_all = "snake_case")]
pub enum ModelArtifact {
    UserCf(UserCfModel),
    ContentBased(ContentBasedModel),
    MatrixFactorization(MatrixFactorizationModel),
    Popularity(PopularityModel),
}

impl ModelArtifact {
    pub fn into_algorithm(self) -> Arc<dyn Algorithm> {
        match self {
            ModelArtifact::UserCf(m) => Arc::new(m),
            ModelArtifact::ContentBased(m) => Arc::new(m),
            ModelArtifact::MatrixFactorization(m) => Arc::new(m),
            ModelArtifact::Popularity(m) => Arc::new(m),
        }
    }
}

impl ArtifactEnvelope {
    pub fn new(model: ModelArtifact) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            model,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let envelope: ArtifactEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version != ARTIFACT_VERSION {
            return Err(EngineError::ModelLoad(format!(
                "unsupported artifact version {}",
                envelope.version
            )));
        }
        Ok(envelope)
    }
}

/// Bounded worker pool for CPU-bound prediction.
///
/// `running` caps concurrent blocking tasks; `slots` additionally caps
/// how many callers may queue, so load sheds with `PoolSaturated`
/// instead of growing unbounded.
pub struct PredictionPool {
    slots: Arc<Semaphore>,
    running: Arc<Semaphore>,
}

impl PredictionPool {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(config.max_concurrent + config.queue_depth)),
            running: Arc::new(Semaphore::new(config.max_concurrent)),
        }
    }

    pub async fn run<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let slot = self
            .slots
            .clone()
            .try_acquire_owned()
            .map_err(|_| EngineError::PoolSaturated)?;
        let permit = self
            .running
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::PoolSaturated)?;

        // Permits live inside the blocking task: if the caller's future
        // is dropped (request timeout), capacity is not released until
        // the task actually finishes.
        tokio::task::spawn_blocking(move || {
            let _slot = slot;
            let _permit = permit;
            task()
        })
        .await
        .map_err(|e| EngineError::prediction("pool", e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ModelStatus {
    pub name: &'static str,
    pub ready: bool,
    pub loaded_at: DateTime<Utc>,
}

struct ModelEntry {
    algorithm: Arc<dyn Algorithm>,
    loaded_at: DateTime<Utc>,
}

/// Registry of loaded models plus the prediction pool.
pub struct ModelManager {
    models: DashMap<&'static str, ModelEntry>,
    pool: PredictionPool,
}

impl ModelManager {
    pub fn new(pool_config: &PoolConfig) -> Self {
        Self {
            models: DashMap::new(),
            pool: PredictionPool::new(pool_config),
        }
    }

    /// Register (or atomically replace) a model instance.
    pub fn register(&self, algorithm: Arc<dyn Algorithm>) {
        let name = algorithm.name();
        let ready = algorithm.is_trained();
        self.models.insert(
            name,
            ModelEntry {
                algorithm,
                loaded_at: Utc::now(),
            },
        );
        info!(model = name, ready, "model registered");
    }

    /// Load every `*.json` artifact in a directory. Unreadable or
    /// unknown artifacts are logged and skipped, not fatal.
    pub fn load_dir(&self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match ArtifactEnvelope::load(&path) {
                Ok(envelope) => {
                    self.register(envelope.model.into_algorithm());
                    loaded += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping model artifact");
                }
            }
        }
        Ok(loaded)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Algorithm>> {
        self.models.get(name).map(|e| e.algorithm.clone())
    }

    pub fn status(&self) -> Vec<ModelStatus> {
        self.models
            .iter()
            .map(|e| ModelStatus {
                name: e.algorithm.name(),
                ready: e.algorithm.is_trained(),
                loaded_at: e.loaded_at,
            })
            .collect()
    }

    pub fn trained_names(&self) -> Vec<&'static str> {
        self.models
            .iter()
            .filter(|e| e.algorithm.is_trained())
            .map(|e| e.algorithm.name())
            .collect()
    }

    pub fn has_trained_model(&self) -> bool {
        !self.trained_names().is_empty()
    }

    /// Batched prediction for one user across `item_ids`, fanned out
    /// per trained model on the blocking pool. A failing model is
    /// logged and dropped from the result; per-item failures become
    /// `None` in that model's column.
    pub async fn predict_all(
        &self,
        user_id: &str,
        item_ids: Arc<Vec<String>>,
    ) -> HashMap<String, Vec<Option<f32>>> {
        let ready: Vec<Arc<dyn Algorithm>> = self
            .models
            .iter()
            .filter(|e| e.algorithm.is_trained())
            .map(|e| e.algorithm.clone())
            .collect();

        let tasks = ready.into_iter().map(|algorithm| {
            let user = user_id.to_string();
            let items = item_ids.clone();
            async move {
                let name = algorithm.name();
                let outcome = self
                    .pool
                    .run(move || {
                        let mut failures = 0usize;
                        let column: Vec<Option<f32>> = items
                            .iter()
                            .map(|item_id| match algorithm.predict(&user, item_id) {
                                Ok(score) => Some(score),
                                Err(_) => {
                                    failures += 1;
                                    None
                                }
                            })
                            .collect();
                        (column, failures)
                    })
                    .await;
                (name, outcome)
            }
        });

        let mut predictions = HashMap::new();
        for (name, outcome) in join_all(tasks).await {
            match outcome {
                Ok((column, failures)) => {
                    if failures > 0 {
                        warn!(model = name, failures, "per-item prediction failures");
                    }
                    predictions.insert(name.to_string(), column);
                }
                Err(e) => {
                    warn!(model = name, error = %e, "model prediction batch failed");
                }
            }
        }

        debug!(
            user_id,
            models = predictions.len(),
            items = item_ids.len(),
            "batched prediction complete"
        );
        predictions
    }
}
