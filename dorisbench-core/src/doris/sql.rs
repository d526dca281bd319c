//! SQL text for the Doris dialect.

use std::fmt::Write;

use super::backend::{Metric, SearchRequest};

pub const ID_COLUMN: &str = "id";
pub const VECTOR_COLUMN: &str = "embedding";
pub const SCORE_COLUMN: &str = "score";
pub const INDEX_NAME: &str = "idx_embedding_hnsw";

/// Backtick-quote an identifier
pub fn ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Single-quote a string literal
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", ident(database))
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", ident(table))
}

/// Escape `LIKE` wildcards so the pattern matches `value` literally
pub fn like_pattern(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub fn show_table(database: &str, table: &str) -> String {
    format!(
        "SHOW TABLES FROM {} LIKE {}",
        ident(database),
        literal(&like_pattern(table))
    )
}

/// Single bucket, single replica: a benchmarking layout, not a durable one
pub fn create_table(table: &str) -> String {
    let id = ident(ID_COLUMN);
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n  \
         {id} BIGINT,\n  \
         {vector} ARRAY<FLOAT> NOT NULL\n\
         ) ENGINE=OLAP\n\
         DUPLICATE KEY ({id})\n\
         DISTRIBUTED BY HASH({id}) BUCKETS 1\n\
         PROPERTIES (\n  \"replication_num\" = \"1\"\n)",
        table = ident(table),
        vector = ident(VECTOR_COLUMN),
    )
}

pub fn create_ann_index(
    table: &str,
    metric: Metric,
    dim: usize,
    max_degree: u32,
    ef_construction: u32,
) -> String {
    format!(
        "CREATE INDEX {index} ON {table}({vector}) USING ANN PROPERTIES(\n  \
         \"index_type\" = \"hnsw\",\n  \
         \"metric_type\" = \"{metric}\",\n  \
         \"dim\" = \"{dim}\",\n  \
         \"max_degree\" = \"{max_degree}\",\n  \
         \"ef_construction\" = \"{ef_construction}\"\n)",
        index = ident(INDEX_NAME),
        table = ident(table),
        vector = ident(VECTOR_COLUMN),
        metric = metric.as_str(),
    )
}

/// Array literal for a query vector. Components must already be finite.
pub fn vector_literal(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, x) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{x}");
    }
    out.push(']');
    out
}

/// ANN query projecting the id column (and the distance when scores are wanted)
pub fn search(table: &str, request: &SearchRequest) -> String {
    let distance = format!(
        "{}({}, {})",
        request.metric.approximate_fn(),
        ident(VECTOR_COLUMN),
        vector_literal(&request.vector)
    );
    let projection = if request.with_scores {
        format!(
            "{}, CAST({distance} AS DOUBLE) AS {}",
            ident(ID_COLUMN),
            ident(SCORE_COLUMN)
        )
    } else {
        ident(ID_COLUMN)
    };
    let order = if request.metric.descending() {
        " DESC"
    } else {
        ""
    };
    format!(
        "SELECT {projection} FROM {} ORDER BY {distance}{order} LIMIT {}",
        ident(table),
        request.limit
    )
}
