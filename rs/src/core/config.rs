use crate::core::errors::{Result, SearchError};
use crate::routing::CostModel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_KNN_MAX_RADIUS_M: f64 = 20_040_000.0;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct IndexOptions {
    /// Starting radius of the k-nearest search. `None` derives it from index density.
    pub knn_seed_radius_m: Option<f64>,
    pub knn_max_radius_m: f64,
    pub sort_radius_results: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            knn_seed_radius_m: None,
            knn_max_radius_m: DEFAULT_KNN_MAX_RADIUS_M,
            sort_radius_results: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub index: IndexOptions,
    pub worker_threads: Option<usize>,
    pub candidate_timeout_ms: Option<u64>,
    pub query_timeout_ms: Option<u64>,
    pub queue_max_concurrency: Option<usize>,
    pub cost_model: CostModel,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        let max = self.index.knn_max_radius_m;
        if !max.is_finite() || max <= 0.0 {
            return Err(SearchError::InvalidConfig(format!(
                "knn_max_radius_m must be positive, got {}",
                max
            )));
        }
        if let Some(seed) = self.index.knn_seed_radius_m {
            if !seed.is_finite() || seed <= 0.0 || seed > max {
                return Err(SearchError::InvalidConfig(format!(
                    "knn_seed_radius_m must be in (0, {}], got {}",
                    max, seed
                )));
            }
        }
        if self.worker_threads == Some(0) {
            return Err(SearchError::InvalidConfig(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.queue_max_concurrency == Some(0) {
            return Err(SearchError::InvalidConfig(
                "queue_max_concurrency must be at least 1".to_string(),
            ));
        }
        self.cost_model.validate()
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(num_cpus::get)
    }

    pub fn candidate_timeout(&self) -> Option<Duration> {
        self.candidate_timeout_ms.map(Duration::from_millis)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    pub fn queue_concurrency(&self) -> usize {
        self.queue_max_concurrency.unwrap_or_else(|| {
            let cpu_count = num_cpus::get();
            if cpu_count > 1 {
                cpu_count - 1
            } else {
                1
            }
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SnapshotOptions {
    pub file_path: PathBuf,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,
}

fn default_ttl_days() -> u64 {
    7
}

impl SnapshotOptions {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        SnapshotOptions {
            file_path: file_path.into(),
            ttl_days: default_ttl_days(),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days * 24 * 60 * 60)
    }
}
