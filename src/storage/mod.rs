//! Durable storage for terminal runs and the usage ledger.
//!
//! # Overview
//!
//! - [`RunStore`]: write-once persistence of terminal runs, plus reads by id
//! - [`SecondaryIndex`]: best-effort indexing of completed runs; failures are
//!   logged by the caller and never fail a run
//! - [`UsageLedger`]: prepaid credits, charged with a single conditional
//!   decrement
//!
//! [`Database`] implements the store and the ledger on SQLite; the in-memory
//! implementations back tests and the CLI.
//!
//! # Usage
//!
//! ```rust,ignore
//! use verdict_forge::storage::{Database, RunStore, UsageLedger};
//!
//! let db = Database::connect("sqlite://verdict.db").await?;
//! db.run_migrations().await?;
//! db.grant("acct-1", 10).await?;
//! db.charge("acct-1", 1).await?;
//! db.save_run(&run).await?;
//! ```

pub mod database;
pub mod migrations;
pub mod schema;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::pipeline::PipelineRun;

pub use database::Database;
pub use migrations::{MigrationError, MigrationRunner};

/// Errors from the run store and secondary index.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    /// Only terminal runs are persisted.
    #[error("Run {0} is not terminal")]
    NotTerminal(Uuid),

    /// Runs are written once.
    #[error("Run {0} already stored")]
    Duplicate(Uuid),

    #[error("Indexing failed: {0}")]
    Index(String),
}

/// Errors from the usage ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient credits for account '{account}': requested {requested}, available {available}")]
    InsufficientCredits {
        account: String,
        requested: i64,
        available: i64,
    },

    #[error("Unknown account '{0}'")]
    UnknownAccount(String),

    #[error("Invalid credit amount: {0}")]
    InvalidAmount(i64),

    #[error("Ledger query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),
}

/// Write-once store for terminal runs.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persists a terminal run.
    async fn save_run(&self, run: &PipelineRun) -> Result<(), StoreError>;

    /// Loads a run by id.
    async fn get_run(&self, id: Uuid) -> Result<Option<PipelineRun>, StoreError>;
}

/// Best-effort index over completed runs (e.g. for similarity search).
#[async_trait]
pub trait SecondaryIndex: Send + Sync {
    async fn index_run(&self, run: &PipelineRun) -> Result<(), StoreError>;
}

/// Prepaid credit accounting.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Atomically deducts `credits` if the balance covers it.
    async fn charge(&self, account_id: &str, credits: i64) -> Result<(), LedgerError>;

    /// Current balance, if the account exists.
    async fn balance(&self, account_id: &str) -> Result<Option<i64>, LedgerError>;
}

/// Index that accepts everything and stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIndex;

#[async_trait]
impl SecondaryIndex for NoopIndex {
    async fn index_run(&self, run: &PipelineRun) -> Result<(), StoreError> {
        tracing::trace!(run_id = %run.id(), "Secondary index disabled");
        Ok(())
    }
}

/// Process-local run store.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, PipelineRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save_run(&self, run: &PipelineRun) -> Result<(), StoreError> {
        if !run.state().is_terminal() {
            return Err(StoreError::NotTerminal(run.id()));
        }
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id()) {
            return Err(StoreError::Duplicate(run.id()));
        }
        runs.insert(run.id(), run.clone());
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<PipelineRun>, StoreError> {
        Ok(self.runs.read().await.get(&id).cloned())
    }
}

/// Process-local ledger. The balance check and decrement happen under one
/// lock.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: Mutex<HashMap<String, i64>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds credits, creating the account if needed.
    pub async fn grant(&self, account_id: impl Into<String>, credits: i64) {
        *self.balances.lock().await.entry(account_id.into()).or_insert(0) += credits;
    }
}

#[async_trait]
impl UsageLedger for InMemoryLedger {
    async fn charge(&self, account_id: &str, credits: i64) -> Result<(), LedgerError> {
        if credits < 0 {
            return Err(LedgerError::InvalidAmount(credits));
        }
        let mut balances = self.balances.lock().await;
        let balance = balances
            .get_mut(account_id)
            .ok_or_else(|| LedgerError::UnknownAccount(account_id.to_string()))?;
        if *balance < credits {
            return Err(LedgerError::InsufficientCredits {
                account: account_id.to_string(),
                requested: credits,
                available: *balance,
            });
        }
        *balance -= credits;
        Ok(())
    }

    async fn balance(&self, account_id: &str) -> Result<Option<i64>, LedgerError> {
        Ok(self.balances.lock().await.get(account_id).copied())
    }
}
