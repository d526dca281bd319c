//! Handles the Doris adapter talks to.
//!
//! [`Backend`] produces two kinds of sessions: short-lived administrative
//! connections used for DDL, and vector clients that open table handles for
//! ingestion and search. Every handle is [`Closeable`] so the session slots can
//! release them uniformly.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::types::{Distance, SearchResult};

use super::config::DorisConfig;

/// A handle that owns a server-side resource
#[async_trait]
pub trait Closeable: Send {
    /// Release the resource. Handles with nothing to release keep the default.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Administrative SQL connection (query port)
#[async_trait]
pub trait AdminSession: Closeable {
    /// Execute a raw SQL statement
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Commit whatever the session has executed so far
    async fn commit(&mut self) -> Result<()>;
}

/// Vector client bound to one database
#[async_trait]
pub trait VectorClient: Closeable + Sync {
    async fn open_table(&self, name: &str) -> Result<Box<dyn VectorTable>>;

    async fn drop_table(&self, name: &str) -> Result<()>;
}

/// An open table accepting batched rows and ANN queries
#[async_trait]
pub trait VectorTable: Closeable + Sync {
    fn name(&self) -> &str;

    /// Submit rows, returning the number the backend reports as loaded
    async fn add(&self, rows: &[VectorRow<'_>]) -> Result<u64>;

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>>;
}

/// Entry point for connecting to a Doris cluster
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open an admin connection, optionally bound to `database`
    async fn admin(
        &self,
        config: &DorisConfig,
        database: Option<&str>,
    ) -> Result<Box<dyn AdminSession>>;

    /// Construct a vector client for `config.database`
    async fn client(&self, config: &DorisConfig, load: LoadOptions)
    -> Result<Box<dyn VectorClient>>;
}

/// Ingestion buffer settings for a vector client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Rows per stream load request
    pub batch_size: usize,
}

pub const DEFAULT_LOAD_BATCH_SIZE: usize = 1024;

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_LOAD_BATCH_SIZE,
        }
    }
}

/// Native metric names understood by the ANN index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    L2Distance,
    InnerProduct,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L2Distance => "l2_distance",
            Self::InnerProduct => "inner_product",
        }
    }

    /// Scalar function ranking rows through the ANN index
    pub fn approximate_fn(&self) -> &'static str {
        match self {
            Self::L2Distance => "l2_distance_approximate",
            Self::InnerProduct => "inner_product_approximate",
        }
    }

    /// Whether larger values rank first
    pub fn descending(&self) -> bool {
        matches!(self, Self::InnerProduct)
    }
}

impl From<Distance> for Metric {
    /// Cosine has no native metric; vectors are normalised and compared by
    /// inner product instead.
    fn from(distance: Distance) -> Self {
        match distance {
            Distance::L2 => Self::L2Distance,
            Distance::Cosine | Distance::Dot => Self::InnerProduct,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-column row in the shape stream load expects
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VectorRow<'a> {
    pub id: u64,
    pub embedding: &'a [f32],
}

/// A single ANN query against an open table
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub metric: Metric,
    pub limit: usize,
    /// Also project the distance; otherwise scores come back as 0.0
    pub with_scores: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_mapping_is_total() {
        assert_eq!(Metric::from(Distance::L2), Metric::L2Distance);
        assert_eq!(Metric::from(Distance::Cosine), Metric::InnerProduct);
        assert_eq!(Metric::from(Distance::Dot), Metric::InnerProduct);
        assert_eq!(Metric::L2Distance.as_str(), "l2_distance");
        assert_eq!(Metric::InnerProduct.as_str(), "inner_product");
    }

    #[test]
    fn test_row_serializes_as_two_columns() {
        let embedding = [0.5, 1.0];
        let row = VectorRow {
            id: 7,
            embedding: &embedding,
        };
        let json = serde_json::to_value(row).unwrap();
        assert_eq!(json, serde_json::json!({"id": 7, "embedding": [0.5, 1.0]}));
    }
}
