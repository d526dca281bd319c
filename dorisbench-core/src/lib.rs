pub mod config;
pub mod dataset;
pub mod doris;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod runner;
pub mod types;

// re-exports
pub use config::{Config, ConnectionParams};
pub use doris::{DorisBackend, DorisEngine};
pub use engine::{Configurator, Engine, PostUploadMetrics, RecreateReport, Searcher, Uploader};
pub use error::{Error, Result};
pub use metrics::{SearchMetrics, UploadMetrics};
pub use runner::{BenchmarkRunner, RunReport};
pub use types::{Distance, ExecutionParams, Query, Record, SearchResult};
