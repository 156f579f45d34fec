// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! SQLite persistence. The unique indices declared here are what make the
//! pipeline idempotent: ingest, aggregation, snapshots and payouts may all
//! be retried and converge on the same rows.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

pub mod cache;

pub use cache::Cache;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS market_keys (
    market_key TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bribes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    status INTEGER NOT NULL,
    message TEXT NOT NULL DEFAULT '',
    market_key TEXT NOT NULL REFERENCES market_keys (market_key),
    sponsor TEXT NOT NULL,
    amount TEXT NOT NULL,
    asset_code TEXT NOT NULL,
    asset_issuer TEXT NOT NULL,
    amount_for_bribes TEXT,
    amount_reward TEXT,
    conversion_tx_hash TEXT,
    refund_tx_hash TEXT,
    claimable_balance_id TEXT NOT NULL UNIQUE,
    paging_token TEXT NOT NULL,
    unlock_time TEXT,
    start_at TEXT,
    stop_at TEXT,
    created_at TEXT NOT NULL,
    loaded_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    reward_equivalent TEXT NOT NULL DEFAULT '0',
    is_amm_protocol INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS bribes_status_idx ON bribes (status);
CREATE INDEX IF NOT EXISTS bribes_window_idx ON bribes (start_at, stop_at);

CREATE TABLE IF NOT EXISTS aggregated_bribes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    market_key TEXT NOT NULL REFERENCES market_keys (market_key),
    asset_code TEXT NOT NULL,
    asset_issuer TEXT NOT NULL,
    start_at TEXT NOT NULL,
    stop_at TEXT NOT NULL,
    total_reward_amount TEXT NOT NULL,
    reward_equivalent TEXT NOT NULL DEFAULT '0',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (market_key, asset_code, asset_issuer, start_at)
);

CREATE TABLE IF NOT EXISTS vote_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    market_key TEXT NOT NULL,
    voting_account TEXT NOT NULL,
    votes_value TEXT NOT NULL,
    snapshot_time TEXT NOT NULL,
    is_delegated INTEGER NOT NULL DEFAULT 0,
    has_delegation INTEGER NOT NULL DEFAULT 0,
    UNIQUE (snapshot_time, market_key, voting_account, is_delegated, has_delegation)
);
CREATE INDEX IF NOT EXISTS vote_snapshots_account_idx ON vote_snapshots (voting_account);

CREATE TABLE IF NOT EXISTS payouts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bribe_id INTEGER NOT NULL REFERENCES aggregated_bribes (id),
    vote_snapshot_id INTEGER NOT NULL REFERENCES vote_snapshots (id),
    asset_code TEXT NOT NULL,
    asset_issuer TEXT NOT NULL,
    reward_amount TEXT,
    stellar_transaction_id TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    message TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS payouts_bribe_idx ON payouts (bribe_id);
CREATE INDEX IF NOT EXISTS payouts_tx_idx ON payouts (stellar_transaction_id);
CREATE UNIQUE INDEX IF NOT EXISTS payouts_once_idx
    ON payouts (bribe_id, vote_snapshot_id) WHERE status = 'success';

CREATE TABLE IF NOT EXISTS asset_holder_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account TEXT NOT NULL,
    asset_code TEXT NOT NULL,
    asset_issuer TEXT NOT NULL,
    balance TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS asset_holder_snapshots_account_idx
    ON asset_holder_snapshots (account);
CREATE INDEX IF NOT EXISTS asset_holder_snapshots_created_idx
    ON asset_holder_snapshots (created_at);

CREATE TABLE IF NOT EXISTS claimable_balances (
    claimable_balance_id TEXT PRIMARY KEY,
    asset_code TEXT NOT NULL,
    asset_issuer TEXT NOT NULL,
    amount TEXT NOT NULL,
    sponsor TEXT NOT NULL DEFAULT '',
    owner TEXT,
    paging_token TEXT NOT NULL DEFAULT '',
    last_modified_time TEXT,
    last_modified_ledger INTEGER NOT NULL DEFAULT 0,
    loaded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS claimable_balances_owner_idx ON claimable_balances (owner);
CREATE INDEX IF NOT EXISTS claimable_balances_loaded_idx ON claimable_balances (loaded_at);

CREATE TABLE IF NOT EXISTS claimants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    claimable_balance_id TEXT NOT NULL
        REFERENCES claimable_balances (claimable_balance_id) ON DELETE CASCADE,
    destination TEXT NOT NULL,
    predicate TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS claimants_balance_idx ON claimants (claimable_balance_id);
CREATE INDEX IF NOT EXISTS claimants_destination_idx ON claimants (destination);

CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at TEXT
);
"#;

/// Open (and create if missing) the service database.
pub async fn open(path: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
        .create_if_missing(true)
        .busy_timeout(std::time::Duration::from_secs(5))
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// An in-memory database for tests; a single connection keeps every query
/// on the same store.
pub async fn open_memory() -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
