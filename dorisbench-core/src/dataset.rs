use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::types::{Query, Record};

/// Read records from a JSON-lines file: `{"id": 1, "vector": [..]}` per line
pub fn load_records(path: impl AsRef<Path>, vector_size: usize) -> Result<Vec<Record>> {
    let contents = std::fs::read_to_string(path)?;
    parse_records(&contents, vector_size)
}

/// Read queries from a JSON-lines file: `{"vector": [..], "neighbors": [..]}` per line
pub fn load_queries(path: impl AsRef<Path>, vector_size: usize) -> Result<Vec<Query>> {
    let contents = std::fs::read_to_string(path)?;
    parse_queries(&contents, vector_size)
}

pub fn parse_records(contents: &str, vector_size: usize) -> Result<Vec<Record>> {
    let records: Vec<Record> = parse_lines(contents)?;
    for record in &records {
        if let Some(vector) = &record.vector {
            check_dim(vector.len(), vector_size, || format!("record {}", record.id))?;
        }
    }
    Ok(records)
}

pub fn parse_queries(contents: &str, vector_size: usize) -> Result<Vec<Query>> {
    let queries: Vec<Query> = parse_lines(contents)?;
    for (i, query) in queries.iter().enumerate() {
        check_dim(query.vector.len(), vector_size, || format!("query #{i}"))?;
    }
    Ok(queries)
}

fn parse_lines<T: DeserializeOwned>(contents: &str) -> Result<Vec<T>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| Error::Config(format!("line {}: {}", i + 1, e)))
        })
        .collect()
}

fn check_dim(actual: usize, expected: usize, what: impl FnOnce() -> String) -> Result<()> {
    if actual != expected {
        return Err(Error::Config(format!(
            "{} has dimension {}, dataset declares {}",
            what(),
            actual,
            expected
        )));
    }
    Ok(())
}
