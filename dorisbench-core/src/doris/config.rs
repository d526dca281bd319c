use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::ConnectionParams;
use crate::error::{Error, Result};

use super::backend::{AdminSession, Backend};
use super::handle::close_quietly;
use super::sql;

pub const DORIS_HOST: &str = "localhost";
pub const DORIS_QUERY_PORT: u16 = 9030;
pub const DORIS_HTTP_PORT: u16 = 8030;
pub const DORIS_DB: &str = "test";
pub const DORIS_USER: &str = "root";
pub const DORIS_PASSWORD: &str = "";

/// Resolved connection settings for one Doris cluster
#[derive(Clone, Serialize, Deserialize)]
pub struct DorisConfig {
    pub host: String,
    pub query_port: u16,
    pub http_port: u16,
    pub database: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Overrides without a dedicated field, kept verbatim
    #[serde(flatten)]
    pub extra: ConnectionParams,
}

impl std::fmt::Debug for DorisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DorisConfig")
            .field("host", &self.host)
            .field("query_port", &self.query_port)
            .field("http_port", &self.http_port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Merge `overrides` over the Doris defaults. An empty `host` means localhost.
///
/// Only the names of overridden keys are logged, never their values.
pub fn get_db_config(host: &str, overrides: &ConnectionParams) -> Result<DorisConfig> {
    let host = if host.is_empty() { DORIS_HOST } else { host };
    let mut merged = ConnectionParams::new();
    merged.insert("host".into(), host.into());
    merged.insert("query_port".into(), DORIS_QUERY_PORT.into());
    merged.insert("http_port".into(), DORIS_HTTP_PORT.into());
    merged.insert("database".into(), DORIS_DB.into());
    merged.insert("user".into(), DORIS_USER.into());
    merged.insert("password".into(), DORIS_PASSWORD.into());
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

    // Checked separately so a malformed value never reaches a serde error message
    let password = match merged.remove("password") {
        Some(Value::String(password)) => password,
        _ => return Err(Error::Config("Doris password must be a string".into())),
    };

    let mut cfg: DorisConfig = serde_json::from_value(Value::Object(merged)).map_err(|e| {
        Error::Config(format!("Invalid Doris connection params: {e}"))
    })?;
    cfg.password = password;

    debug!(
        host = %cfg.host,
        query_port = cfg.query_port,
        http_port = cfg.http_port,
        database = %cfg.database,
        user = %cfg.user,
        overrides = ?overrides.keys().collect::<Vec<_>>(),
        "Constructed Doris DB config"
    );
    Ok(cfg)
}

/// Create the target database if it is absent, before any client attaches to it.
///
/// The admin connection is released on every path; connect and DDL failures are
/// logged and returned.
pub async fn ensure_database_exists(backend: &dyn Backend, cfg: &DorisConfig) -> Result<()> {
    info!(database = %cfg.database, host = %cfg.host, "Ensuring Doris database exists");

    let mut conn = backend.admin(cfg, None).await.inspect_err(|e| {
        error!(
            host = %cfg.host,
            port = cfg.query_port,
            user = %cfg.user,
            error = %e,
            "Failed to connect to Doris"
        )
    })?;

    let outcome = create_database(conn.as_mut(), &cfg.database).await;
    close_quietly(conn.as_mut(), "admin connection").await;

    outcome.inspect_err(
        |e| error!(database = %cfg.database, error = %e, "Failed ensuring database"),
    )
}

async fn create_database(conn: &mut dyn AdminSession, database: &str) -> Result<()> {
    conn.execute(&sql::create_database(database)).await?;
    conn.commit().await?;
    info!(database, "Database ensured (created if absent)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::doris::fake::{Call, FakeBackend};

    fn params(value: Value) -> ConnectionParams {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = get_db_config("", &ConnectionParams::new()).unwrap();
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.query_port, 9030);
        assert_eq!(cfg.http_port, 8030);
        assert_eq!(cfg.database, "test");
        assert_eq!(cfg.user, "root");
        assert_eq!(cfg.password, "");
        assert!(cfg.extra.is_empty());
    }

    #[test]
    fn test_overrides_win_and_keys_are_union() {
        let overrides = params(json!({
            "host": "fe-2",
            "query_port": 19030,
            "password": "hunter2",
            "table": "vectors",
            "timeout": 30,
        }));
        let cfg = get_db_config("fe-1", &overrides).unwrap();
        assert_eq!(cfg.host, "fe-2");
        assert_eq!(cfg.query_port, 19030);
        assert_eq!(cfg.http_port, 8030);
        assert_eq!(cfg.password, "hunter2");

        let value = serde_json::to_value(&cfg).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        for key in [
            "host", "query_port", "http_port", "database", "user", "password", "table", "timeout",
        ] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(keys.len(), 8);
    }

    #[test]
    fn test_bad_override_types() {
        let err = get_db_config("", &params(json!({"query_port": "nine"}))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = get_db_config("", &params(json!({"password": 4242}))).unwrap_err();
        assert!(!err.to_string().contains("4242"));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_password_never_logged() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();

        let cfg = tracing::subscriber::with_default(subscriber, || {
            get_db_config("fe", &params(json!({"password": "s3cr3t-pw", "user": "bench"})))
                .unwrap()
        });

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Constructed Doris DB config"));
        assert!(logs.contains("password"));
        assert!(!logs.contains("s3cr3t-pw"));
        assert!(!format!("{cfg:?}").contains("s3cr3t-pw"));
    }

    #[tokio::test]
    async fn test_ensure_database_is_idempotent() {
        let backend = FakeBackend::default();
        let cfg = get_db_config("", &ConnectionParams::new()).unwrap();

        ensure_database_exists(&backend, &cfg).await.unwrap();
        ensure_database_exists(&backend, &cfg).await.unwrap();

        let state = backend.state();
        assert!(state.databases.contains("test"));
        let creates = state
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Execute(sql) if sql.starts_with("CREATE DATABASE IF NOT EXISTS `test`")))
            .count();
        assert_eq!(creates, 2);
        assert_eq!(state.count(&Call::AdminClose), 2);
    }

    #[tokio::test]
    async fn test_ensure_database_releases_connection_on_failure() {
        let backend = FakeBackend::default();
        backend.state().fail_execute = true;
        let cfg = get_db_config("", &ConnectionParams::new()).unwrap();

        let err = ensure_database_exists(&backend, &cfg).await.unwrap_err();
        assert!(matches!(err, Error::QueryExecution(_)));
        assert_eq!(backend.state().count(&Call::AdminClose), 1);
    }

    #[tokio::test]
    async fn test_ensure_database_connect_failure_is_fatal() {
        let backend = FakeBackend::default();
        backend.state().fail_connect = true;
        let cfg = get_db_config("", &ConnectionParams::new()).unwrap();

        let err = ensure_database_exists(&backend, &cfg).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert_eq!(backend.state().count(&Call::AdminClose), 0);
    }
}
