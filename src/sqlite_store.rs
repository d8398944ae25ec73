//! A `rusqlite`-backed `ConfigStore`, gated behind the `store-sqlite`
//! feature. Grounded on the teacher's `gateway/sqlite_store.rs`: every
//! method opens its own connection and runs on `spawn_blocking`, JSON
//! blobs for whole-entity tables, and explicit columns for the two
//! counter-bearing tables so a counter-only persist can `UPDATE` just
//! those columns.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::config_store::ConfigStore;
use crate::error::GovernanceError;
use crate::model::{
    BudgetSnapshot, Customer, ModelConfig, Provider, RateLimitSnapshot, RoutingRule, Team,
    VirtualKey,
};

#[derive(Clone, Debug)]
pub struct SqliteConfigStore {
    path: PathBuf,
}

impl From<rusqlite::Error> for GovernanceError {
    fn from(err: rusqlite::Error) -> Self {
        GovernanceError::Store(err.to_string())
    }
}

impl From<tokio::task::JoinError> for GovernanceError {
    fn from(err: tokio::task::JoinError) -> Self {
        GovernanceError::Store(err.to_string())
    }
}

impl SqliteConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn init(&self) -> Result<(), GovernanceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), GovernanceError> {
            let conn = open_connection(&path)?;
            init_schema(&conn)?;
            Ok(())
        })
        .await?
    }
}

fn open_connection(path: &Path) -> Result<rusqlite::Connection, rusqlite::Error> {
    let conn = rusqlite::Connection::open(path)?;
    let _ = conn.busy_timeout(Duration::from_secs(5));
    let _ = conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
    Ok(conn)
}

fn init_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS virtual_keys (id TEXT PRIMARY KEY NOT NULL, value_json TEXT NOT NULL);
         CREATE TABLE IF NOT EXISTS teams (id TEXT PRIMARY KEY NOT NULL, value_json TEXT NOT NULL);
         CREATE TABLE IF NOT EXISTS customers (id TEXT PRIMARY KEY NOT NULL, value_json TEXT NOT NULL);
         CREATE TABLE IF NOT EXISTS providers (id TEXT PRIMARY KEY NOT NULL, value_json TEXT NOT NULL);
         CREATE TABLE IF NOT EXISTS model_configs (id TEXT PRIMARY KEY NOT NULL, value_json TEXT NOT NULL);
         CREATE TABLE IF NOT EXISTS routing_rules (id TEXT PRIMARY KEY NOT NULL, value_json TEXT NOT NULL);

         CREATE TABLE IF NOT EXISTS budgets (
             id TEXT PRIMARY KEY NOT NULL,
             max_limit REAL NOT NULL,
             current_usage REAL NOT NULL,
             reset_duration TEXT NOT NULL,
             last_reset_ms INTEGER NOT NULL
         );

         CREATE TABLE IF NOT EXISTS rate_limits (
             id TEXT PRIMARY KEY NOT NULL,
             token_max_limit INTEGER,
             token_current_usage INTEGER NOT NULL,
             token_reset_duration TEXT,
             token_last_reset_ms INTEGER NOT NULL,
             request_max_limit INTEGER,
             request_current_usage INTEGER NOT NULL,
             request_reset_duration TEXT,
             request_last_reset_ms INTEGER NOT NULL
         );",
    )?;
    Ok(())
}

fn load_json_table<T: serde::de::DeserializeOwned>(
    path: &Path,
    table: &str,
) -> Result<Vec<T>, GovernanceError> {
    let conn = open_connection(path)?;
    init_schema(&conn)?;
    let mut stmt = conn.prepare(&format!("SELECT value_json FROM {table} ORDER BY id"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        let raw = row?;
        out.push(serde_json::from_str(&raw)?);
    }
    Ok(out)
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn load_virtual_keys(&self) -> Result<Vec<VirtualKey>, GovernanceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_json_table(&path, "virtual_keys")).await?
    }

    async fn load_teams(&self) -> Result<Vec<Team>, GovernanceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_json_table(&path, "teams")).await?
    }

    async fn load_customers(&self) -> Result<Vec<Customer>, GovernanceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_json_table(&path, "customers")).await?
    }

    async fn load_providers(&self) -> Result<Vec<Provider>, GovernanceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_json_table(&path, "providers")).await?
    }

    async fn load_model_configs(&self) -> Result<Vec<ModelConfig>, GovernanceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_json_table(&path, "model_configs")).await?
    }

    async fn load_routing_rules(&self) -> Result<Vec<RoutingRule>, GovernanceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_json_table(&path, "routing_rules")).await?
    }

    async fn load_budgets(&self) -> Result<Vec<BudgetSnapshot>, GovernanceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<BudgetSnapshot>, GovernanceError> {
            let conn = open_connection(&path)?;
            init_schema(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT id, max_limit, current_usage, reset_duration, last_reset_ms
                 FROM budgets ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(BudgetSnapshot {
                    id: row.get(0)?,
                    max_limit: row.get(1)?,
                    current_usage: row.get(2)?,
                    reset_duration: row.get(3)?,
                    last_reset_ms: row.get(4)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await?
    }

    async fn load_rate_limits(&self) -> Result<Vec<RateLimitSnapshot>, GovernanceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<RateLimitSnapshot>, GovernanceError> {
            let conn = open_connection(&path)?;
            init_schema(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT id, token_max_limit, token_current_usage, token_reset_duration,
                        token_last_reset_ms, request_max_limit, request_current_usage,
                        request_reset_duration, request_last_reset_ms
                 FROM rate_limits ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(RateLimitSnapshot {
                    id: row.get(0)?,
                    token_max_limit: row.get(1)?,
                    token_current_usage: row.get(2)?,
                    token_reset_duration: row.get(3)?,
                    token_last_reset_ms: row.get(4)?,
                    request_max_limit: row.get(5)?,
                    request_current_usage: row.get(6)?,
                    request_reset_duration: row.get(7)?,
                    request_last_reset_ms: row.get(8)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await?
    }

    async fn persist_budget_counters(
        &self,
        counters: Vec<BudgetSnapshot>,
    ) -> Result<(), GovernanceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), GovernanceError> {
            let mut conn = open_connection(&path)?;
            init_schema(&conn)?;
            let tx = conn.transaction()?;
            for counter in &counters {
                tx.execute(
                    "INSERT INTO budgets (id, max_limit, current_usage, reset_duration, last_reset_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                         current_usage = excluded.current_usage,
                         last_reset_ms = excluded.last_reset_ms",
                    rusqlite::params![
                        counter.id,
                        counter.max_limit,
                        counter.current_usage,
                        counter.reset_duration,
                        counter.last_reset_ms as i64,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?
    }

    async fn persist_rate_limit_counters(
        &self,
        counters: Vec<RateLimitSnapshot>,
    ) -> Result<(), GovernanceError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), GovernanceError> {
            let mut conn = open_connection(&path)?;
            init_schema(&conn)?;
            let tx = conn.transaction()?;
            for counter in &counters {
                tx.execute(
                    "INSERT INTO rate_limits (
                         id, token_max_limit, token_current_usage, token_reset_duration,
                         token_last_reset_ms, request_max_limit, request_current_usage,
                         request_reset_duration, request_last_reset_ms
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(id) DO UPDATE SET
                         token_current_usage = excluded.token_current_usage,
                         token_last_reset_ms = excluded.token_last_reset_ms,
                         request_current_usage = excluded.request_current_usage,
                         request_last_reset_ms = excluded.request_last_reset_ms",
                    rusqlite::params![
                        counter.id,
                        counter.token_max_limit.map(|v| v as i64),
                        counter.token_current_usage as i64,
                        counter.token_reset_duration,
                        counter.token_last_reset_ms as i64,
                        counter.request_max_limit.map(|v| v as i64),
                        counter.request_current_usage as i64,
                        counter.request_reset_duration,
                        counter.request_last_reset_ms as i64,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persist_budget_counters_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteConfigStore::new(dir.path().join("gov.sqlite"));
        store.init().await.expect("init");

        store
            .persist_budget_counters(vec![BudgetSnapshot {
                id: "b1".into(),
                max_limit: 100.0,
                current_usage: 25.0,
                reset_duration: "1h".into(),
                last_reset_ms: 42,
            }])
            .await
            .expect("persist");

        let loaded = store.load_budgets().await.expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].current_usage, 25.0);
        assert_eq!(loaded[0].last_reset_ms, 42);

        store
            .persist_budget_counters(vec![BudgetSnapshot {
                id: "b1".into(),
                max_limit: 999.0,
                current_usage: 50.0,
                reset_duration: "1h".into(),
                last_reset_ms: 99,
            }])
            .await
            .expect("persist again");

        let loaded = store.load_budgets().await.expect("load again");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].current_usage, 50.0);
        // Column-selective update never touches max_limit.
        assert_eq!(loaded[0].max_limit, 100.0);
    }
}
