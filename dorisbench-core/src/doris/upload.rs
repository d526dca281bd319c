use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::config::{ConnectionParams, UploadParams, resolve_table};
use crate::engine::{PostUploadMetrics, Uploader};
use crate::error::Result;
use crate::types::{Distance, Record};

use super::backend::{Backend, LoadOptions, VectorClient, VectorRow, VectorTable};
use super::config::{ensure_database_exists, get_db_config};
use super::handle::Slot;

/// Ingestion session: one client and one open table
pub struct DorisUploader {
    backend: Arc<dyn Backend>,
    client: Slot<dyn VectorClient>,
    table: Slot<dyn VectorTable>,
}

impl DorisUploader {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            client: Slot::empty("upload client"),
            table: Slot::empty("upload table"),
        }
    }
}

#[async_trait]
impl Uploader for DorisUploader {
    async fn init_client(
        &mut self,
        host: &str,
        _distance: Distance,
        connection_params: &ConnectionParams,
        upload_params: &UploadParams,
    ) -> Result<()> {
        // release anything left over from an earlier run before reconnecting
        self.table.release_quietly().await;
        self.client.release_quietly().await;

        let config = get_db_config(host, connection_params)?;
        ensure_database_exists(self.backend.as_ref(), &config).await?;

        let load = LoadOptions {
            batch_size: upload_params.batch_size,
        };
        let client = self
            .backend
            .client(&config, load)
            .await
            .inspect_err(|e| error!(host = %config.host, error = %e, "Failed to create Doris client"))?;

        let table_name = resolve_table(upload_params.table.as_deref(), connection_params);
        info!(table = %table_name, batch_size = load.batch_size, "Opening Doris table for upload");
        let table = client.open_table(&table_name).await;
        self.client.replace(client).await;
        self.table.replace(table?).await;
        Ok(())
    }

    async fn upload_batch(&mut self, records: &[Record]) -> Result<()> {
        let rows: Vec<VectorRow<'_>> = records
            .iter()
            .filter_map(|r| {
                r.vector.as_deref().map(|embedding| VectorRow {
                    id: r.id,
                    embedding,
                })
            })
            .collect();

        if rows.is_empty() {
            return Ok(());
        }

        let table = self.table.get()?;
        let loaded = table.add(&rows).await?;
        debug!(table = table.name(), rows = rows.len(), loaded, "Uploaded batch");
        Ok(())
    }

    /// Doris builds the ANN index when the table is created, so the build time
    /// measured there is waited out here. That keeps total upload time
    /// comparable with engines that index during or after ingestion.
    async fn post_upload(
        &mut self,
        _distance: Distance,
        index_build_time: Option<Duration>,
    ) -> Result<PostUploadMetrics> {
        let wait = index_build_time.unwrap_or_default();
        if !wait.is_zero() {
            debug!(wait_secs = wait.as_secs_f64(), "Waiting out index build time");
            tokio::time::sleep(wait).await;
        }
        Ok(PostUploadMetrics {
            index_wait_secs: wait.as_secs_f64(),
        })
    }

    async fn delete_client(&mut self) {
        self.table.release_quietly().await;
        self.client.release_quietly().await;
    }
}
