use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::{ConnectionParams, SearchParams, resolve_table};
use crate::engine::Searcher;
use crate::error::{Error, Result};
use crate::types::{Distance, Query, SearchResult};

use super::backend::{Backend, LoadOptions, Metric, SearchRequest, VectorClient, VectorTable};
use super::config::{ensure_database_exists, get_db_config};
use super::handle::Slot;

/// Query session: one client, one open table and the metric to rank by
pub struct DorisSearcher {
    backend: Arc<dyn Backend>,
    client: Slot<dyn VectorClient>,
    table: Slot<dyn VectorTable>,
    metric: Option<Metric>,
    with_scores: bool,
}

impl DorisSearcher {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            client: Slot::empty("search client"),
            table: Slot::empty("search table"),
            metric: None,
            with_scores: false,
        }
    }
}

/// Replace NaN and infinities with 0.0; the server rejects non-finite input
pub fn sanitize(vector: &[f32]) -> Vec<f32> {
    vector
        .iter()
        .map(|x| if x.is_finite() { *x } else { 0.0 })
        .collect()
}

#[async_trait]
impl Searcher for DorisSearcher {
    async fn init_client(
        &mut self,
        host: &str,
        distance: Distance,
        connection_params: &ConnectionParams,
        search_params: &SearchParams,
    ) -> Result<()> {
        self.table.release_quietly().await;
        self.client.release_quietly().await;

        let config = get_db_config(host, connection_params)?;
        ensure_database_exists(self.backend.as_ref(), &config).await?;

        let client = self
            .backend
            .client(&config, LoadOptions::default())
            .await
            .inspect_err(|e| error!(host = %config.host, error = %e, "Failed to create Doris client"))?;

        let table_name = resolve_table(search_params.table.as_deref(), connection_params);
        info!(table = %table_name, "Opening Doris table for search");
        let table = client.open_table(&table_name).await;
        self.client.replace(client).await;
        self.table.replace(table?).await;

        self.metric = Some(Metric::from(distance));
        self.with_scores = search_params.with_scores;
        Ok(())
    }

    async fn search_one(&self, query: &Query, top: usize) -> Result<Vec<SearchResult>> {
        let table = self.table.get()?;
        let metric = self.metric.ok_or(Error::NotConnected)?;

        let request = SearchRequest {
            vector: sanitize(&query.vector),
            metric,
            limit: top,
            with_scores: self.with_scores,
        };
        table.search(&request).await
    }

    async fn delete_client(&mut self) {
        self.table.release_quietly().await;
        self.client.release_quietly().await;
        self.metric = None;
    }
}
