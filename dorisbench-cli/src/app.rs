use std::path::Path;

use anyhow::{Context, Result, anyhow};
use dorisbench_core::dataset::{load_queries, load_records};
use dorisbench_core::{BenchmarkRunner, Config, DorisEngine, Query, Record, RunReport};

/// A loaded run: configuration plus the dataset it points at
pub struct App {
    pub config: Config,
    records: Vec<Record>,
    queries: Vec<Query>,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            records: Vec::new(),
            queries: Vec::new(),
        }
    }

    pub fn engine_name(&self) -> &str {
        &self.config.engine.name
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    /// Load records and queries for the phases that will run. Relative dataset
    /// paths resolve against `base`, the directory holding the config file.
    pub fn load_dataset(&mut self, base: &Path) -> Result<()> {
        let dataset = &self.config.dataset;
        let benchmark = &self.config.benchmark;

        if !benchmark.skip_upload {
            let path = dataset
                .records
                .as_ref()
                .ok_or_else(|| anyhow!("dataset.records is required unless skip_upload is set"))?;
            let path = base.join(path);
            self.records = load_records(&path, dataset.vector_size)
                .with_context(|| format!("loading records from {}", path.display()))?;
        }

        if !benchmark.skip_search {
            let path = dataset
                .queries
                .as_ref()
                .ok_or_else(|| anyhow!("dataset.queries is required unless skip_search is set"))?;
            let path = base.join(path);
            self.queries = load_queries(&path, dataset.vector_size)
                .with_context(|| format!("loading queries from {}", path.display()))?;
            if self.queries.is_empty() {
                return Err(anyhow!("Query file contains no queries"));
            }
        }

        Ok(())
    }

    /// Run every enabled phase against Doris
    pub async fn run(self) -> Result<RunReport> {
        let engine = DorisEngine::new(self.config.engine.name.clone());
        let runner = BenchmarkRunner::new(Box::new(engine), self.config);
        let report = runner.run(self.records, self.queries).await?;
        Ok(report)
    }
}
