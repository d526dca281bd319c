use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Distance;

/// Free-form connection overrides, merged over the Doris defaults last-wins
pub type ConnectionParams = serde_json::Map<String, serde_json::Value>;

/// Table used when neither the session params nor the connection params name one
pub const DEFAULT_TABLE: &str = "items";

/// Top-level configuration for a dorisbench run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine (Doris) settings
    pub engine: EngineConfig,
    /// Dataset to ingest and query
    pub dataset: DatasetConfig,
    /// Run-level switches
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn from_str(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }
}

/// Engine configuration: where Doris lives and how each phase is parameterised
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Display name for this experiment
    pub name: String,
    /// Doris FE host; empty means localhost
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub connection_params: ConnectionParams,
    #[serde(default)]
    pub collection_params: CollectionParams,
    #[serde(default)]
    pub upload_params: UploadParams,
    /// One search experiment per entry
    #[serde(default = "default_search_params")]
    pub search_params: Vec<SearchParams>,
}

fn default_search_params() -> Vec<SearchParams> {
    vec![SearchParams::default()]
}

/// Table layout and ANN index parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionParams {
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub hnsw_config: Option<HnswConfig>,
}

impl Default for CollectionParams {
    fn default() -> Self {
        Self {
            table: default_table(),
            hnsw_config: None,
        }
    }
}

/// HNSW hyperparameters; unset fields fall back to the index defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HnswConfig {
    #[serde(default)]
    pub m: Option<u32>,
    #[serde(default)]
    pub ef_construction: Option<u32>,
    /// Alternate spelling used by other engines' configs
    #[serde(default)]
    pub ef_construct: Option<u32>,
}

pub const DEFAULT_HNSW_M: u32 = 16;
pub const DEFAULT_HNSW_EF_CONSTRUCTION: u32 = 200;

impl CollectionParams {
    /// Resolved (max_degree, ef_construction)
    pub fn hnsw(&self) -> (u32, u32) {
        let cfg = self.hnsw_config.clone().unwrap_or_default();
        let m = cfg.m.unwrap_or(DEFAULT_HNSW_M);
        let ef = cfg
            .ef_construction
            .or(cfg.ef_construct)
            .unwrap_or(DEFAULT_HNSW_EF_CONSTRUCTION);
        (m, ef)
    }
}

/// Ingestion session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadParams {
    /// Rows per stream load request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub table: Option<String>,
}

fn default_batch_size() -> usize {
    1024
}

impl Default for UploadParams {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            table: None,
        }
    }
}

/// Query session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Number of concurrent searchers, each with its own session
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    /// Results requested per query
    #[serde(default = "default_top")]
    pub top: usize,
    #[serde(default)]
    pub table: Option<String>,
    /// Project the backend distance instead of returning 0.0 scores
    #[serde(default)]
    pub with_scores: bool,
}

fn default_parallel() -> usize {
    1
}

fn default_top() -> usize {
    10
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            top: default_top(),
            table: None,
            with_scores: false,
        }
    }
}

/// Resolve a session table name: explicit param, then `table` in the
/// connection params, then [`DEFAULT_TABLE`].
pub fn resolve_table(explicit: Option<&str>, connection_params: &ConnectionParams) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| {
            connection_params
                .get("table")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(default_table)
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

/// Dataset descriptor plus the files holding its records and queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub vector_size: usize,
    pub distance: Distance,
    /// JSON-lines file of records
    #[serde(default)]
    pub records: Option<PathBuf>,
    /// JSON-lines file of queries
    #[serde(default)]
    pub queries: Option<PathBuf>,
}

/// Run-level switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Records handed to each `upload_batch` call
    #[serde(default = "default_upload_batch_size")]
    pub upload_batch_size: usize,
    #[serde(default)]
    pub skip_upload: bool,
    #[serde(default)]
    pub skip_search: bool,
}

fn default_upload_batch_size() -> usize {
    64
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            upload_batch_size: default_upload_batch_size(),
            skip_upload: false,
            skip_search: false,
        }
    }
}
