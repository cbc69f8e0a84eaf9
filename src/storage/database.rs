//! SQLite-backed run store and usage ledger.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::migrations::MigrationRunner;
use super::{LedgerError, RunStore, StoreError, UsageLedger};
use crate::pipeline::PipelineRun;

/// SQLite client implementing [`RunStore`] and [`UsageLedger`].
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connects to `database_url`, creating the database file if missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        MigrationRunner::new(self.pool.clone())
            .run_migrations()
            .await?;
        Ok(())
    }

    /// Adds credits to an account, creating it if needed.
    pub async fn grant(&self, account_id: &str, credits: i64) -> Result<(), LedgerError> {
        if credits < 0 {
            return Err(LedgerError::InvalidAmount(credits));
        }
        sqlx::query(
            r#"
            INSERT INTO accounts (account_id, credits) VALUES (?, ?)
            ON CONFLICT(account_id) DO UPDATE SET credits = credits + excluded.credits
            "#,
        )
        .bind(account_id)
        .bind(credits)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RunStore for Database {
    async fn save_run(&self, run: &PipelineRun) -> Result<(), StoreError> {
        if !run.state().is_terminal() {
            return Err(StoreError::NotTerminal(run.id()));
        }
        let body = serde_json::to_string(run)?;

        let result = sqlx::query(
            r#"
            INSERT INTO runs (id, account_id, state, gate_score, created_at, completed_at, body)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(run.id().to_string())
        .bind(run.account_id())
        .bind(run.state().as_str())
        .bind(run.gate_score().map(|s| i64::from(s.value())))
        .bind(run.created_at().to_rfc3339())
        .bind(run.completed_at().map(|t| t.to_rfc3339()))
        .bind(body)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate(run.id()));
        }
        tracing::debug!(run_id = %run.id(), state = %run.state(), "Run persisted");
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<PipelineRun>, StoreError> {
        let row = sqlx::query("SELECT body FROM runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: String = row.get("body");
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UsageLedger for Database {
    async fn charge(&self, account_id: &str, credits: i64) -> Result<(), LedgerError> {
        if credits < 0 {
            return Err(LedgerError::InvalidAmount(credits));
        }

        // Check and decrement in one statement.
        let result = sqlx::query(
            "UPDATE accounts SET credits = credits - ? WHERE account_id = ? AND credits >= ?",
        )
        .bind(credits)
        .bind(account_id)
        .bind(credits)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.balance(account_id).await? {
            Some(available) => Err(LedgerError::InsufficientCredits {
                account: account_id.to_string(),
                requested: credits,
                available,
            }),
            None => Err(LedgerError::UnknownAccount(account_id.to_string())),
        }
    }

    async fn balance(&self, account_id: &str) -> Result<Option<i64>, LedgerError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT credits FROM accounts WHERE account_id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(credits,)| credits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunState;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open() -> (Database, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("verdict.db").display());
        let db = Database::connect(&url).await.unwrap();
        db.run_migrations().await.unwrap();
        (db, dir)
    }

    fn approved_run(account: Option<&str>) -> PipelineRun {
        let mut run = PipelineRun::new("Fleet maintenance scheduling", account.map(String::from));
        run.transition(RunState::GateRunning).unwrap();
        run.transition(RunState::GateAccepted).unwrap();
        run.transition(RunState::FanoutRunning).unwrap();
        run.transition(RunState::Assembling).unwrap();
        run.complete(RunState::ApprovedComplete, json!({"status": "approved"}))
            .unwrap();
        run
    }

    #[tokio::test]
    async fn test_save_and_get_run() {
        let (db, _dir) = open().await;
        let run = approved_run(Some("acct-1"));

        db.save_run(&run).await.unwrap();
        let loaded = db.get_run(run.id()).await.unwrap().expect("run stored");
        assert_eq!(loaded, run);
        assert_eq!(db.get_run(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_runs_are_write_once() {
        let (db, _dir) = open().await;
        let run = approved_run(None);
        db.save_run(&run).await.unwrap();
        assert!(matches!(db.save_run(&run).await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_live_run_not_persisted() {
        let (db, _dir) = open().await;
        let run = PipelineRun::new("idea", None);
        assert!(matches!(db.save_run(&run).await, Err(StoreError::NotTerminal(_))));
    }

    #[tokio::test]
    async fn test_charge_is_conditional() {
        let (db, _dir) = open().await;
        db.grant("acct", 1).await.unwrap();

        db.charge("acct", 1).await.unwrap();
        assert!(matches!(
            db.charge("acct", 1).await,
            Err(LedgerError::InsufficientCredits {
                requested: 1,
                available: 0,
                ..
            })
        ));
        assert!(matches!(
            db.charge("ghost", 1).await,
            Err(LedgerError::UnknownAccount(_))
        ));
        assert_eq!(db.balance("acct").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_concurrent_charges_never_overdraw() {
        let (db, _dir) = open().await;
        db.grant("acct", 3).await.unwrap();

        let attempts = (0..10).map(|_| {
            let db = db.clone();
            async move { db.charge("acct", 1).await.is_ok() }
        });
        let results = futures::future::join_all(attempts).await;

        assert_eq!(results.iter().filter(|ok| **ok).count(), 3);
        assert_eq!(db.balance("acct").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let (db, _dir) = open().await;
        db.run_migrations().await.unwrap();
        let applied = MigrationRunner::new(db.pool().clone())
            .applied_migrations()
            .await
            .unwrap();
        assert_eq!(applied.len(), 3);
    }
}
