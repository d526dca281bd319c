use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::config::{CollectionParams, ConnectionParams, DatasetConfig};
use crate::engine::{Configurator, RecreateReport};
use crate::error::Result;
use crate::types::{Distance, ExecutionParams};

use super::backend::{AdminSession, Backend, LoadOptions, Metric, VectorClient};
use super::config::{DorisConfig, ensure_database_exists, get_db_config};
use super::handle::{Slot, close_quietly};
use super::sql;

/// Drops, creates and indexes the benchmark table
pub struct DorisConfigurator {
    backend: Arc<dyn Backend>,
    config: DorisConfig,
    collection_params: CollectionParams,
    client: Slot<dyn VectorClient>,
}

impl DorisConfigurator {
    /// Resolve the connection config, make sure the database exists and attach
    /// a vector client to it.
    pub async fn connect(
        backend: Arc<dyn Backend>,
        host: &str,
        collection_params: &CollectionParams,
        connection_params: &ConnectionParams,
    ) -> Result<Self> {
        let config = get_db_config(host, connection_params)?;
        ensure_database_exists(backend.as_ref(), &config).await?;

        let client = backend
            .client(&config, LoadOptions::default())
            .await
            .inspect_err(|e| error!(host = %config.host, error = %e, "Failed to create Doris client"))?;

        let mut slot = Slot::empty("configurator client");
        slot.replace(client).await;

        Ok(Self {
            backend,
            config,
            collection_params: collection_params.clone(),
            client: slot,
        })
    }
}

#[async_trait]
impl Configurator for DorisConfigurator {
    async fn clean(&mut self) -> Result<()> {
        let table = &self.collection_params.table;
        info!(table = %table, "Dropping Doris table if exists");
        match self.client.get()?.drop_table(table).await {
            Ok(()) => debug!(table = %table, "Dropped table"),
            Err(e) => debug!(table = %table, error = %e, "Ignoring table drop error"),
        }
        Ok(())
    }

    async fn recreate(
        &mut self,
        dataset: &DatasetConfig,
        collection_params: &CollectionParams,
    ) -> Result<RecreateReport> {
        let table = collection_params.table.as_str();
        let dim = dataset.vector_size;
        let metric = Metric::from(dataset.distance);
        let (m, ef_construction) = collection_params.hnsw();

        info!(
            table,
            dim,
            metric = %metric,
            m,
            ef_construction,
            "Creating Doris table with HNSW index"
        );

        let mut conn = self
            .backend
            .admin(&self.config, Some(&self.config.database))
            .await
            .inspect_err(|e| error!(table, error = %e, "Failed to connect for table creation"))?;

        let start = Instant::now();
        let outcome = create_indexed_table(conn.as_mut(), table, metric, dim, m, ef_construction)
            .await
            .map(|()| start.elapsed());
        close_quietly(conn.as_mut(), "admin connection").await;

        let index_build_time =
            outcome.inspect_err(|e| error!(table, error = %e, "Failed to create table via SQL"))?;
        info!(
            table,
            elapsed_secs = index_build_time.as_secs_f64(),
            "Created Doris table with HNSW index"
        );

        Ok(RecreateReport {
            table: table.to_string(),
            index_build_time,
        })
    }

    fn execution_params(&self, distance: Distance, _vector_size: usize) -> ExecutionParams {
        ExecutionParams {
            normalize: distance == Distance::Cosine,
        }
    }

    async fn delete_client(&mut self) {
        self.client.release_quietly().await;
    }
}

async fn create_indexed_table(
    conn: &mut dyn AdminSession,
    table: &str,
    metric: Metric,
    dim: usize,
    m: u32,
    ef_construction: u32,
) -> Result<()> {
    debug!(table, "Executing CREATE TABLE SQL");
    conn.execute(&sql::create_table(table)).await?;

    debug!(table, "Executing CREATE INDEX SQL");
    conn.execute(&sql::create_ann_index(table, metric, dim, m, ef_construction))
        .await?;

    conn.commit().await
}
