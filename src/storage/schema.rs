//! SQLite schema for runs and the usage ledger.

/// Terminal runs. `body` holds the full serialized run; the other columns
/// exist for lookups.
pub const CREATE_RUNS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    account_id TEXT,
    state TEXT NOT NULL,
    gate_score INTEGER,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    body TEXT NOT NULL
)
"#;

pub const CREATE_RUNS_ACCOUNT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_runs_account_id ON runs(account_id)
"#;

/// Prepaid credit balance per account.
pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    account_id TEXT PRIMARY KEY,
    credits INTEGER NOT NULL DEFAULT 0 CHECK (credits >= 0)
)
"#;

/// Returns all schema statements in application order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_RUNS_TABLE,
        CREATE_RUNS_ACCOUNT_INDEX,
        CREATE_ACCOUNTS_TABLE,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_idempotent() {
        for statement in all_schema_statements() {
            assert!(statement.contains("IF NOT EXISTS"));
        }
    }
}
