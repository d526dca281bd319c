//! Doris transport: MySQL protocol on the query port for DDL and ANN queries,
//! HTTP stream load on the FE http port for ingestion.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{EXPECT, LOCATION};
use serde::Deserialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::{Connection, Row};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::SearchResult;

use super::backend::{
    AdminSession, Backend, Closeable, LoadOptions, SearchRequest, VectorClient, VectorRow,
    VectorTable,
};
use super::config::DorisConfig;
use super::sql;

/// FE answers a stream load with a redirect to a BE; one hop is expected
const MAX_REDIRECTS: usize = 3;

/// Connections kept by a vector client for queries
const QUERY_POOL_SIZE: u32 = 4;

/// Connects to a real Doris cluster
#[derive(Debug, Clone, Default)]
pub struct DorisBackend;

impl DorisBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Doris speaks the MySQL protocol but rejects the session variables sqlx sets
/// by default, so those are switched off.
fn connect_options(config: &DorisConfig, database: Option<&str>) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.query_port)
        .username(&config.user)
        .password(&config.password)
        .pipes_as_concat(false)
        .no_engine_substitution(false)
        .timezone(None::<String>);
    if let Some(database) = database {
        options = options.database(database);
    }
    options
}

#[async_trait]
impl Backend for DorisBackend {
    async fn admin(
        &self,
        config: &DorisConfig,
        database: Option<&str>,
    ) -> Result<Box<dyn AdminSession>> {
        let conn = MySqlConnection::connect_with(&connect_options(config, database))
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        debug!(host = %config.host, port = config.query_port, "Opened Doris admin connection");
        Ok(Box::new(AdminConnection { conn: Some(conn) }))
    }

    async fn client(
        &self,
        config: &DorisConfig,
        load: LoadOptions,
    ) -> Result<Box<dyn VectorClient>> {
        let pool = MySqlPoolOptions::new()
            .max_connections(QUERY_POOL_SIZE)
            .connect_with(connect_options(config, Some(&config.database)))
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        // Redirects are followed by hand: reqwest drops credentials on a
        // cross-host hop and the BE needs them.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;

        debug!(database = %config.database, batch_size = load.batch_size, "Connected Doris vector client");
        Ok(Box::new(DorisClient {
            config: config.clone(),
            load,
            pool: Some(pool),
            http,
        }))
    }
}

struct AdminConnection {
    conn: Option<MySqlConnection>,
}

#[async_trait]
impl Closeable for AdminConnection {
    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .await
                .map_err(|e| Error::Connection(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl AdminSession for AdminConnection {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        sqlx::Executor::execute(conn, sqlx::raw_sql(sql))
            .await
            .map_err(|e| Error::QueryExecution(e.to_string()))?;
        Ok(())
    }

    /// The session runs in autocommit mode, so DDL is durable once `execute`
    /// returns; this only checks the connection is still usable.
    async fn commit(&mut self) -> Result<()> {
        self.conn.as_ref().map(|_| ()).ok_or(Error::NotConnected)
    }
}

struct DorisClient {
    config: DorisConfig,
    load: LoadOptions,
    pool: Option<MySqlPool>,
    http: reqwest::Client,
}

impl DorisClient {
    fn pool(&self) -> Result<&MySqlPool> {
        self.pool.as_ref().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Closeable for DorisClient {
    async fn close(&mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
        Ok(())
    }
}

#[async_trait]
impl VectorClient for DorisClient {
    async fn open_table(&self, name: &str) -> Result<Box<dyn VectorTable>> {
        let pool = self.pool()?;
        let rows = sqlx::raw_sql(&sql::show_table(&self.config.database, name))
            .fetch_all(pool)
            .await
            .map_err(|e| Error::QueryExecution(e.to_string()))?;

        let exists = rows
            .iter()
            .any(|row| row.try_get_unchecked::<String, _>(0).is_ok_and(|found| found == name));
        if !exists {
            return Err(Error::Config(format!(
                "Table '{}' not found in database '{}'",
                name, self.config.database
            )));
        }

        Ok(Box::new(DorisTable {
            name: name.to_string(),
            config: self.config.clone(),
            load: self.load,
            pool: pool.clone(),
            http: self.http.clone(),
        }))
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        sqlx::raw_sql(&sql::drop_table(name))
            .execute(self.pool()?)
            .await
            .map_err(|e| Error::QueryExecution(e.to_string()))?;
        Ok(())
    }
}

/// Table handle; shares the client's pool, so closing it releases nothing
struct DorisTable {
    name: String,
    config: DorisConfig,
    load: LoadOptions,
    pool: MySqlPool,
    http: reqwest::Client,
}

impl Closeable for DorisTable {}

static LABEL_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_label(table: &str) -> String {
    format!(
        "dorisbench_{}_{}_{}",
        table,
        chrono::Utc::now().timestamp_micros(),
        LABEL_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Body of a stream load response
#[derive(Debug, Deserialize)]
struct StreamLoadResponse {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Message", default)]
    message: Option<String>,
    #[serde(rename = "NumberLoadedRows", default)]
    loaded_rows: Option<u64>,
    #[serde(rename = "ErrorURL", default)]
    error_url: Option<String>,
}

impl StreamLoadResponse {
    fn into_result(self) -> Result<u64> {
        match self.status.as_str() {
            "Success" => Ok(self.loaded_rows.unwrap_or_default()),
            // data is committed, only the publish step is still running
            "Publish Timeout" => {
                warn!("Stream load publish timed out; rows are committed");
                Ok(self.loaded_rows.unwrap_or_default())
            }
            status => Err(Error::StreamLoad(format!(
                "status={} message={} error_url={}",
                status,
                self.message.unwrap_or_default(),
                self.error_url.unwrap_or_default()
            ))),
        }
    }
}

impl DorisTable {
    fn stream_load_url(&self) -> String {
        format!(
            "http://{}:{}/api/{}/{}/_stream_load",
            self.config.host, self.config.http_port, self.config.database, self.name
        )
    }

    async fn stream_load(&self, rows: &[VectorRow<'_>]) -> Result<u64> {
        let body = serde_json::to_vec(rows)?;
        let label = next_label(&self.name);
        let mut target = self.stream_load_url();

        for _ in 0..=MAX_REDIRECTS {
            let response = self
                .http
                .put(&target)
                .basic_auth(&self.config.user, Some(&self.config.password))
                .header(EXPECT, "100-continue")
                .header("label", &label)
                .header("format", "json")
                .header("strip_outer_array", "true")
                .header("columns", format!("{},{}", sql::ID_COLUMN, sql::VECTOR_COLUMN))
                .body(body.clone())
                .send()
                .await
                .map_err(|e| Error::StreamLoad(e.to_string()))?;

            let status = response.status();
            if status.is_redirection() {
                target = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        Error::InvalidResponse(format!("{status} redirect without location"))
                    })?
                    .to_string();
                debug!(label = %label, "Following stream load redirect");
                continue;
            }

            if status != StatusCode::OK {
                let text = response.text().await.unwrap_or_default();
                return Err(Error::StreamLoad(format!("HTTP {status}: {text}")));
            }

            let result: StreamLoadResponse = response
                .json()
                .await
                .map_err(|e| Error::InvalidResponse(e.to_string()))?;
            return result.into_result();
        }

        Err(Error::StreamLoad(format!(
            "too many redirects for label {label}"
        )))
    }
}

#[async_trait]
impl VectorTable for DorisTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, rows: &[VectorRow<'_>]) -> Result<u64> {
        let mut loaded = 0;
        for chunk in rows.chunks(self.load.batch_size.max(1)) {
            loaded += self.stream_load(chunk).await?;
        }
        debug!(table = %self.name, rows = rows.len(), loaded, "Stream loaded rows");
        Ok(loaded)
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let rows = sqlx::raw_sql(&sql::search(&self.name, request))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::QueryExecution(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let id: i64 = row
                    .try_get(sql::ID_COLUMN)
                    .map_err(|e| Error::InvalidResponse(e.to_string()))?;
                let id = u64::try_from(id)
                    .map_err(|_| Error::InvalidResponse(format!("negative id {id}")))?;
                let score = if request.with_scores {
                    row.try_get::<f64, _>(sql::SCORE_COLUMN)
                        .map_err(|e| Error::InvalidResponse(e.to_string()))? as f32
                } else {
                    0.0
                };
                Ok(SearchResult { id, score })
            })
            .collect()
    }
}
