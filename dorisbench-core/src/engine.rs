use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{CollectionParams, ConnectionParams, DatasetConfig, SearchParams, UploadParams};
use crate::error::Result;
use crate::types::{Distance, ExecutionParams, Query, Record, SearchResult};

/// Outcome of (re)creating the collection for a run
#[derive(Debug, Clone, PartialEq)]
pub struct RecreateReport {
    pub table: String,
    /// Wall-clock time of the schema and index DDL
    pub index_build_time: Duration,
}

/// What the uploader's post-upload step did
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PostUploadMetrics {
    /// Seconds spent waiting to account for index construction
    pub index_wait_secs: f64,
}

/// Owns the collection lifecycle: drop, create, index
#[async_trait]
pub trait Configurator: Send {
    /// Drop the collection if present; a missing collection is not an error
    async fn clean(&mut self) -> Result<()>;

    /// Create the collection and its ANN index for `dataset`
    async fn recreate(
        &mut self,
        dataset: &DatasetConfig,
        collection_params: &CollectionParams,
    ) -> Result<RecreateReport>;

    /// How vectors must be prepared before upload and search
    fn execution_params(&self, distance: Distance, vector_size: usize) -> ExecutionParams;

    async fn delete_client(&mut self);

    /// `clean` followed by `recreate`
    async fn configure(
        &mut self,
        dataset: &DatasetConfig,
        collection_params: &CollectionParams,
    ) -> Result<RecreateReport> {
        self.clean().await?;
        self.recreate(dataset, collection_params).await
    }
}

/// Owns one ingestion session
#[async_trait]
pub trait Uploader: Send {
    async fn init_client(
        &mut self,
        host: &str,
        distance: Distance,
        connection_params: &ConnectionParams,
        upload_params: &UploadParams,
    ) -> Result<()>;

    async fn upload_batch(&mut self, records: &[Record]) -> Result<()>;

    /// Runs once after the last batch. `index_build_time` is the duration
    /// reported by [`Configurator::recreate`] for this run.
    async fn post_upload(
        &mut self,
        distance: Distance,
        index_build_time: Option<Duration>,
    ) -> Result<PostUploadMetrics>;

    async fn delete_client(&mut self);
}

/// Owns one query session
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn init_client(
        &mut self,
        host: &str,
        distance: Distance,
        connection_params: &ConnectionParams,
        search_params: &SearchParams,
    ) -> Result<()>;

    /// Up to `top` results, in the engine's ranking order
    async fn search_one(&self, query: &Query, top: usize) -> Result<Vec<SearchResult>>;

    async fn delete_client(&mut self);
}

/// Factory for the three lifecycle roles of one engine
#[async_trait]
pub trait Engine: Send + Sync {
    /// Human-readable name for this engine
    fn name(&self) -> &str;

    async fn configurator(
        &self,
        host: &str,
        collection_params: &CollectionParams,
        connection_params: &ConnectionParams,
    ) -> Result<Box<dyn Configurator>>;

    fn uploader(&self) -> Box<dyn Uploader>;

    fn searcher(&self) -> Box<dyn Searcher>;
}
