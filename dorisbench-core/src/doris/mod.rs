//! Apache Doris engine: configurator, uploader and searcher over a [`Backend`].

pub mod backend;
pub mod client;
pub mod config;
pub mod configure;
pub mod handle;
pub mod search;
pub mod sql;
pub mod upload;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{CollectionParams, ConnectionParams};
use crate::engine::{Configurator, Engine, Searcher, Uploader};
use crate::error::Result;

pub use backend::{Backend, Metric};
pub use client::DorisBackend;
pub use config::{DorisConfig, ensure_database_exists, get_db_config};
pub use configure::DorisConfigurator;
pub use search::DorisSearcher;
pub use upload::DorisUploader;

/// Doris as a benchmark engine
pub struct DorisEngine {
    name: String,
    backend: Arc<dyn Backend>,
}

impl DorisEngine {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_backend(name, Arc::new(DorisBackend::new()))
    }

    pub fn with_backend(name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }
}

#[async_trait]
impl Engine for DorisEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn configurator(
        &self,
        host: &str,
        collection_params: &CollectionParams,
        connection_params: &ConnectionParams,
    ) -> Result<Box<dyn Configurator>> {
        let configurator = DorisConfigurator::connect(
            self.backend.clone(),
            host,
            collection_params,
            connection_params,
        )
        .await?;
        Ok(Box::new(configurator))
    }

    fn uploader(&self) -> Box<dyn Uploader> {
        Box::new(DorisUploader::new(self.backend.clone()))
    }

    fn searcher(&self) -> Box<dyn Searcher> {
        Box::new(DorisSearcher::new(self.backend.clone()))
    }
}
