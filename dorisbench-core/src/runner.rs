use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Config, SearchParams};
use crate::engine::{Engine, RecreateReport, Searcher, Uploader};
use crate::error::{Error, Result};
use crate::metrics::{SearchMetrics, SearchRecorder, UploadMetrics, precision_at_k};
use crate::types::{ExecutionParams, Query, Record, normalize};

/// Everything measured in one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub engine: String,
    pub dataset: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Time the engine spent creating the table and its index
    pub index_build_secs: Option<f64>,
    pub upload: Option<UploadMetrics>,
    pub search: Vec<SearchMetrics>,
}

/// Drives configure → upload → post-upload → search against one engine
pub struct BenchmarkRunner {
    engine: Box<dyn Engine>,
    config: Config,
}

/// Per-query outcome from a search worker
type QueryOutcome = (Duration, Option<f64>);

impl BenchmarkRunner {
    pub fn new(engine: Box<dyn Engine>, config: Config) -> Self {
        Self { engine, config }
    }

    /// Run every enabled phase. Vectors are normalised in place when the
    /// engine asks for it.
    pub async fn run(&self, mut records: Vec<Record>, mut queries: Vec<Query>) -> Result<RunReport> {
        let timestamp = chrono::Utc::now();
        let mut report = RunReport {
            engine: self.engine.name().to_string(),
            dataset: self.config.dataset.name.clone(),
            timestamp,
            index_build_secs: None,
            upload: None,
            search: Vec::new(),
        };

        let (execution, index_build_time) = if self.config.benchmark.skip_upload {
            (self.execution_params().await?, None)
        } else {
            let (recreate, execution) = self.configure().await?;
            report.index_build_secs = Some(recreate.index_build_time.as_secs_f64());
            (execution, Some(recreate.index_build_time))
        };

        if execution.normalize {
            records
                .iter_mut()
                .filter_map(|r| r.vector.as_mut())
                .for_each(|v| normalize(v));
            queries.iter_mut().for_each(|q| normalize(&mut q.vector));
        }

        if !self.config.benchmark.skip_upload {
            report.upload = Some(self.upload(&records, index_build_time).await?);
        }

        if !self.config.benchmark.skip_search {
            for params in &self.config.engine.search_params {
                report.search.push(self.search(&queries, params).await?);
            }
        }

        Ok(report)
    }

    /// Clean and recreate the collection
    pub async fn configure(&self) -> Result<(RecreateReport, ExecutionParams)> {
        let engine = &self.config.engine;
        let dataset = &self.config.dataset;

        let mut configurator = self
            .engine
            .configurator(&engine.host, &engine.collection_params, &engine.connection_params)
            .await?;

        let outcome = configurator
            .configure(dataset, &engine.collection_params)
            .await;
        let execution = configurator.execution_params(dataset.distance, dataset.vector_size);
        configurator.delete_client().await;

        let recreate = outcome?;
        info!(
            table = %recreate.table,
            index_build_secs = recreate.index_build_time.as_secs_f64(),
            "Collection configured"
        );
        Ok((recreate, execution))
    }

    async fn execution_params(&self) -> Result<ExecutionParams> {
        let engine = &self.config.engine;
        let dataset = &self.config.dataset;
        let mut configurator = self
            .engine
            .configurator(&engine.host, &engine.collection_params, &engine.connection_params)
            .await?;
        let execution = configurator.execution_params(dataset.distance, dataset.vector_size);
        configurator.delete_client().await;
        Ok(execution)
    }

    /// Stream `records` through a fresh uploader. `index_build_time` comes from
    /// [`BenchmarkRunner::configure`] and is handed to the post-upload step.
    pub async fn upload(
        &self,
        records: &[Record],
        index_build_time: Option<Duration>,
    ) -> Result<UploadMetrics> {
        let mut uploader = self.engine.uploader();
        let outcome = self
            .upload_with(uploader.as_mut(), records, index_build_time)
            .await;
        uploader.delete_client().await;
        outcome
    }

    async fn upload_with(
        &self,
        uploader: &mut dyn Uploader,
        records: &[Record],
        index_build_time: Option<Duration>,
    ) -> Result<UploadMetrics> {
        let engine = &self.config.engine;
        let distance = self.config.dataset.distance;
        uploader
            .init_client(
                &engine.host,
                distance,
                &engine.connection_params,
                &engine.upload_params,
            )
            .await?;

        info!(records = records.len(), "Starting upload");
        let batch_size = self.config.benchmark.upload_batch_size.max(1);
        let start = Instant::now();
        let mut batch_count = 0;
        for batch in records.chunks(batch_size) {
            uploader.upload_batch(batch).await?;
            batch_count += 1;
        }
        let upload_time = start.elapsed();

        let post = uploader.post_upload(distance, index_build_time).await?;
        let total_time = start.elapsed();

        info!(
            upload_secs = upload_time.as_secs_f64(),
            total_secs = total_time.as_secs_f64(),
            "Upload complete"
        );

        Ok(UploadMetrics {
            record_count: records.len(),
            batch_count,
            upload_time_secs: upload_time.as_secs_f64(),
            post_upload_secs: post.index_wait_secs,
            total_time_secs: total_time.as_secs_f64(),
        })
    }

    /// Run one search experiment: up to `params.parallel` independent sessions
    /// each take a contiguous, non-empty share of the queries.
    pub async fn search(&self, queries: &[Query], params: &SearchParams) -> Result<SearchMetrics> {
        if queries.is_empty() {
            return Err(Error::Config("No queries configured".into()));
        }

        // Every session opened gets at least one query
        let chunk_size = queries.len().div_ceil(params.parallel.clamp(1, queries.len()));
        let workers = queries.len().div_ceil(chunk_size);
        let mut searchers = Vec::with_capacity(workers);
        for _ in 0..workers {
            let mut searcher = self.engine.searcher();
            let engine = &self.config.engine;
            let init = searcher
                .init_client(
                    &engine.host,
                    self.config.dataset.distance,
                    &engine.connection_params,
                    params,
                )
                .await;
            searchers.push(searcher);
            if let Err(e) = init {
                release_all(&mut searchers).await;
                return Err(e);
            }
        }

        info!(
            queries = queries.len(),
            parallel = workers,
            top = params.top,
            "Starting search"
        );

        let timestamp = chrono::Utc::now();
        let start = Instant::now();

        let mut futures = FuturesUnordered::new();
        for (searcher, chunk) in searchers.iter().zip(queries.chunks(chunk_size)) {
            futures.push(run_queries(searcher.as_ref(), chunk, params.top));
        }

        let mut outcomes = Vec::with_capacity(workers);
        while let Some(result) = futures.next().await {
            outcomes.push(result);
        }
        drop(futures);
        let total = start.elapsed();

        release_all(&mut searchers).await;

        let mut recorder = SearchRecorder::new();
        for outcome in outcomes {
            for (latency, precision) in outcome? {
                recorder.record(latency, precision);
            }
        }

        let metrics = recorder.finish(timestamp, workers, params.top, total);
        info!(
            rps = metrics.rps,
            p95_us = metrics.latency.p95_us,
            mean_precision = ?metrics.mean_precision,
            "Search complete"
        );
        Ok(metrics)
    }
}

async fn run_queries(
    searcher: &dyn Searcher,
    queries: &[Query],
    top: usize,
) -> Result<Vec<QueryOutcome>> {
    let mut outcomes = Vec::with_capacity(queries.len());
    for query in queries {
        let start = Instant::now();
        let results = searcher.search_one(query, top).await?;
        let latency = start.elapsed();

        if results.len() > top {
            warn!(returned = results.len(), top, "Engine returned more results than requested");
        }
        let precision = query.neighbors.as_deref().map(|expected| {
            let ids: Vec<u64> = results.iter().map(|r| r.id).collect();
            precision_at_k(&ids, expected, top)
        });
        debug!(
            latency_us = latency.as_micros() as u64,
            hits = results.len(),
            "Query succeeded"
        );
        outcomes.push((latency, precision));
    }
    Ok(outcomes)
}

async fn release_all(searchers: &mut [Box<dyn Searcher>]) {
    for searcher in searchers.iter_mut() {
        searcher.delete_client().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{
        BenchmarkConfig, CollectionParams, ConnectionParams, DatasetConfig, EngineConfig,
        UploadParams,
    };
    use crate::doris::DorisEngine;
    use crate::doris::fake::{Call, FakeBackend};
    use crate::types::Distance;

    const DIM: usize = 128;

    fn config(distance: Distance, search_params: Vec<SearchParams>) -> Config {
        Config {
            engine: EngineConfig {
                name: "doris-test".into(),
                host: String::new(),
                connection_params: ConnectionParams::new(),
                collection_params: CollectionParams::default(),
                upload_params: UploadParams::default(),
                search_params,
            },
            dataset: DatasetConfig {
                name: "synthetic".into(),
                vector_size: DIM,
                distance,
                records: None,
                queries: None,
            },
            benchmark: BenchmarkConfig {
                upload_batch_size: 3,
                ..Default::default()
            },
        }
    }

    /// Vector pointing mostly along axis `i`
    fn axis(i: usize, scale: f32) -> Vec<f32> {
        let mut v = vec![0.01; DIM];
        v[i % DIM] = scale;
        v
    }

    fn records(n: u64) -> Vec<Record> {
        (0..n).map(|id| Record::new(id, axis(id as usize, 5.0))).collect()
    }

    fn runner(backend: &FakeBackend, config: Config) -> BenchmarkRunner {
        let engine = DorisEngine::with_backend("doris-test", Arc::new(backend.clone()));
        BenchmarkRunner::new(Box::new(engine), config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_cosine() {
        let backend = FakeBackend::default();
        let runner = runner(
            &backend,
            config(Distance::Cosine, vec![SearchParams::default()]),
        );

        let queries = vec![Query {
            vector: axis(1, 2.0),
            neighbors: Some(vec![1]),
        }];
        let report = runner.run(records(8), queries).await.unwrap();

        assert_eq!(report.engine, "doris-test");
        let upload = report.upload.unwrap();
        assert_eq!(upload.record_count, 8);
        assert_eq!(upload.batch_count, 3);
        assert!((upload.post_upload_secs - report.index_build_secs.unwrap()).abs() < 1e-9);

        let search = &report.search[0];
        assert_eq!(search.query_count, 1);
        assert_eq!(search.mean_precision, Some(1.0));

        let state = backend.state();
        // stored vectors were normalised for cosine
        let (_, stored) = &state.tables["items"][0];
        let norm: f32 = stored.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);

        let searches = state.searches();
        assert_eq!(searches[0].limit, 10);
        assert!(searches[0].metric == crate::doris::Metric::InnerProduct);

        // every session released what it opened
        assert_eq!(
            state.count(&Call::ClientClose),
            state
                .calls
                .iter()
                .filter(|c| matches!(c, Call::ClientConnect { .. }))
                .count()
        );
    }

    #[tokio::test]
    async fn test_search_returns_at_most_top() {
        let backend = FakeBackend::default();
        let runner = runner(&backend, config(Distance::L2, vec![]));
        runner.run(records(20), Vec::new()).await.unwrap();

        let mut searcher = runner.engine.searcher();
        searcher
            .init_client("", Distance::L2, &ConnectionParams::new(), &SearchParams::default())
            .await
            .unwrap();
        let results = searcher.search_one(&Query::new(axis(3, 5.0)), 10).await.unwrap();
        assert_eq!(results.len(), 10);
        assert_eq!(results[0].id, 3);
        assert!(results.iter().all(|r| r.score == 0.0));
        searcher.delete_client().await;
    }

    #[tokio::test]
    async fn test_parallel_search_uses_independent_sessions() {
        let backend = FakeBackend::default();
        let params = SearchParams {
            parallel: 3,
            top: 5,
            ..Default::default()
        };
        let runner = runner(&backend, config(Distance::L2, vec![params]));
        let queries: Vec<Query> = (0..7).map(|i| Query::new(axis(i, 5.0))).collect();

        let report = runner.run(records(10), queries).await.unwrap();
        let search = &report.search[0];
        assert_eq!(search.parallel, 3);
        assert_eq!(search.query_count, 7);
        assert!(search.mean_precision.is_none());

        let state = backend.state();
        assert_eq!(state.searches().len(), 7);
        let opens = state.count(&Call::OpenTable("items".into()));
        // one uploader session plus three searchers
        assert_eq!(opens, 4);
        assert_eq!(state.count(&Call::TableClose("items".into())), 4);
    }

    #[tokio::test]
    async fn test_parallel_never_opens_idle_sessions() {
        let backend = FakeBackend::default().with_table("items");
        let runner = runner(&backend, config(Distance::L2, vec![]));
        let params = SearchParams {
            parallel: 4,
            ..Default::default()
        };
        let queries: Vec<Query> = (0..5).map(|i| Query::new(axis(i, 5.0))).collect();

        // 5 queries in shares of 2 leave work for three sessions only
        let metrics = runner.search(&queries, &params).await.unwrap();
        assert_eq!(metrics.parallel, 3);
        assert_eq!(metrics.query_count, 5);

        let state = backend.state();
        assert_eq!(state.searches().len(), 5);
        assert_eq!(state.count(&Call::OpenTable("items".into())), 3);
        assert_eq!(state.count(&Call::TableClose("items".into())), 3);
    }

    #[tokio::test]
    async fn test_failed_configure_aborts_run() {
        let backend = FakeBackend::default();
        let runner = runner(&backend, config(Distance::L2, vec![SearchParams::default()]));
        backend.state().fail_execute = true;

        assert!(runner.run(records(2), Vec::new()).await.is_err());
        assert_eq!(backend.state().adds(), 0);
    }

    #[tokio::test]
    async fn test_search_without_queries_is_config_error() {
        let backend = FakeBackend::default().with_table("items");
        let runner = runner(&backend, config(Distance::L2, vec![]));
        let err = runner
            .search(&[], &SearchParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
