//! In-memory stand-in for a Doris cluster that records every call.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::SearchResult;

use super::backend::{
    AdminSession, Backend, Closeable, LoadOptions, Metric, SearchRequest, VectorClient, VectorRow,
    VectorTable,
};
use super::config::DorisConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    AdminConnect(Option<String>),
    Execute(String),
    Commit,
    AdminClose,
    ClientConnect { database: String, batch_size: usize },
    ClientClose,
    OpenTable(String),
    DropTable(String),
    TableClose(String),
    Add { table: String, rows: usize },
    Search(SearchRequest),
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub calls: Vec<Call>,
    pub databases: HashSet<String>,
    pub tables: HashMap<String, Vec<(u64, Vec<f32>)>>,
    pub fail_connect: bool,
    pub fail_execute: bool,
    pub fail_close: bool,
}

impl FakeState {
    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn adds(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Add { .. }))
            .count()
    }

    pub fn searches(&self) -> Vec<SearchRequest> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Search(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    fn close(&mut self, call: Call) -> Result<()> {
        self.calls.push(call);
        if self.fail_close {
            Err(Error::Connection("connection reset by peer".into()))
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_table(self, name: &str) -> Self {
        self.state().tables.insert(name.to_string(), Vec::new());
        self
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn admin(
        &self,
        _config: &DorisConfig,
        database: Option<&str>,
    ) -> Result<Box<dyn AdminSession>> {
        let mut state = self.state();
        state.calls.push(Call::AdminConnect(database.map(str::to_string)));
        if state.fail_connect {
            return Err(Error::Connection("Can't connect to Doris on 9030".into()));
        }
        Ok(Box::new(FakeAdmin {
            state: self.state.clone(),
        }))
    }

    async fn client(
        &self,
        config: &DorisConfig,
        load: LoadOptions,
    ) -> Result<Box<dyn VectorClient>> {
        let mut state = self.state();
        state.calls.push(Call::ClientConnect {
            database: config.database.clone(),
            batch_size: load.batch_size,
        });
        if state.fail_connect {
            return Err(Error::Connection("Can't connect to Doris on 9030".into()));
        }
        Ok(Box::new(FakeClient {
            state: self.state.clone(),
        }))
    }
}

struct FakeAdmin {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl Closeable for FakeAdmin {
    async fn close(&mut self) -> Result<()> {
        self.state.lock().unwrap().close(Call::AdminClose)
    }
}

#[async_trait]
impl AdminSession for FakeAdmin {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Execute(sql.to_string()));
        if state.fail_execute {
            return Err(Error::QueryExecution("errCode = 2, detailMessage = injected".into()));
        }
        let name = sql.split('`').nth(1).unwrap_or_default().to_string();
        if sql.starts_with("CREATE DATABASE") {
            state.databases.insert(name);
        } else if sql.starts_with("CREATE TABLE") {
            state.tables.entry(name).or_default();
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.state.lock().unwrap().calls.push(Call::Commit);
        Ok(())
    }
}

struct FakeClient {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl Closeable for FakeClient {
    async fn close(&mut self) -> Result<()> {
        self.state.lock().unwrap().close(Call::ClientClose)
    }
}

#[async_trait]
impl VectorClient for FakeClient {
    async fn open_table(&self, name: &str) -> Result<Box<dyn VectorTable>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::OpenTable(name.to_string()));
        if !state.tables.contains_key(name) {
            return Err(Error::Config(format!("Table '{name}' not found")));
        }
        Ok(Box::new(FakeTable {
            name: name.to_string(),
            state: self.state.clone(),
        }))
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DropTable(name.to_string()));
        match state.tables.remove(name) {
            Some(_) => Ok(()),
            None => Err(Error::QueryExecution(format!("Unknown table '{name}'"))),
        }
    }
}

struct FakeTable {
    name: String,
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl Closeable for FakeTable {
    async fn close(&mut self) -> Result<()> {
        let call = Call::TableClose(self.name.clone());
        self.state.lock().unwrap().close(call)
    }
}

#[async_trait]
impl VectorTable for FakeTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, rows: &[VectorRow<'_>]) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Add {
            table: self.name.clone(),
            rows: rows.len(),
        });
        let table = state
            .tables
            .get_mut(&self.name)
            .ok_or_else(|| Error::StreamLoad(format!("Unknown table '{}'", self.name)))?;
        table.extend(rows.iter().map(|r| (r.id, r.embedding.to_vec())));
        Ok(rows.len() as u64)
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Search(request.clone()));
        if request.vector.iter().any(|x| !x.is_finite()) {
            return Err(Error::QueryExecution("non-finite value in array literal".into()));
        }
        let rows = state
            .tables
            .get(&self.name)
            .ok_or_else(|| Error::QueryExecution(format!("Unknown table '{}'", self.name)))?;

        let mut scored: Vec<(u64, f32)> = rows
            .iter()
            .map(|(id, v)| (*id, score(request.metric, &request.vector, v)))
            .collect();
        if request.metric.descending() {
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        } else {
            scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        }

        Ok(scored
            .into_iter()
            .take(request.limit)
            .map(|(id, s)| SearchResult {
                id,
                score: if request.with_scores { s } else { 0.0 },
            })
            .collect())
    }
}

fn score(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::L2Distance => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
        Metric::InnerProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
    }
}
