// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Vote snapshots, payouts, holder snapshots and the claimable-balance
//! cache that backs delegation detection.

use std::collections::HashSet;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use strum::{Display, EnumString};

use crate::bribes::model::{decimal_column, decimal_column_opt};
use crate::ledger::Asset;
use crate::utils::day_bounds;

/// One voter's stake in one market on one day. The two flags carry the
/// delegation bookkeeping: an aggregator's placeholder row has
/// `has_delegation`, the rows expanded from its inflows have
/// `is_delegated`.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteSnapshot {
    pub id: i64,
    pub market_key: String,
    pub voting_account: String,
    pub votes_value: BigDecimal,
    pub snapshot_time: NaiveDate,
    pub is_delegated: bool,
    pub has_delegation: bool,
}

#[derive(Debug, Display, EnumString, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum PayoutStatus {
    Success,
    Failed,
}

/// One reward to one voter for one aggregated bribe.
#[derive(Debug, Clone)]
pub struct Payout {
    pub id: i64,
    pub bribe_id: i64,
    pub vote_snapshot_id: i64,
    pub asset: Asset,
    pub reward_amount: Option<BigDecimal>,
    pub stellar_transaction_id: String,
    pub status: PayoutStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AssetHolderSnapshot {
    pub id: i64,
    pub account: String,
    pub asset: Asset,
    pub balance: BigDecimal,
    pub created_at: DateTime<Utc>,
}

/// A cached claimable balance. `owner` is the first claimant whose
/// predicate is not the reject-all marker.
#[derive(Debug, Clone)]
pub struct StoredClaimableBalance {
    pub claimable_balance_id: String,
    pub asset: Asset,
    pub amount: BigDecimal,
    pub sponsor: String,
    pub owner: Option<String>,
    pub paging_token: String,
    pub last_modified_time: Option<DateTime<Utc>>,
    pub last_modified_ledger: i64,
    pub loaded_at: DateTime<Utc>,
}

/// A claimant with its predicate preserved in wire (JSON) form.
#[derive(Debug, Clone)]
pub struct StoredClaimant {
    pub destination: String,
    pub predicate: String,
}

fn vote_from_row(row: &SqliteRow) -> Result<VoteSnapshot, sqlx::Error> {
    Ok(VoteSnapshot {
        id: row.try_get("id")?,
        market_key: row.try_get("market_key")?,
        voting_account: row.try_get("voting_account")?,
        votes_value: decimal_column(row, "votes_value")?,
        snapshot_time: row.try_get("snapshot_time")?,
        is_delegated: row.try_get("is_delegated")?,
        has_delegation: row.try_get("has_delegation")?,
    })
}

fn payout_from_row(row: &SqliteRow) -> Result<Payout, sqlx::Error> {
    let status_raw: String = row.try_get("status")?;
    let status = status_raw
        .parse()
        .map_err(|_| sqlx::Error::ColumnDecode {
            index: "status".into(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown payout status {status_raw}"),
            )),
        })?;
    let code: String = row.try_get("asset_code")?;
    let issuer: String = row.try_get("asset_issuer")?;
    Ok(Payout {
        id: row.try_get("id")?,
        bribe_id: row.try_get("bribe_id")?,
        vote_snapshot_id: row.try_get("vote_snapshot_id")?,
        asset: Asset::from_parts(&code, &issuer),
        reward_amount: decimal_column_opt(row, "reward_amount")?,
        stellar_transaction_id: row.try_get("stellar_transaction_id")?,
        status,
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[derive(Clone)]
pub struct VoteSnapshotStore {
    pool: SqlitePool,
}

impl VoteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert snapshots; duplicates of the unique key are skipped so a
    /// reloaded page cannot double a voter's stake.
    pub async fn insert_batch(&self, snapshots: &[VoteSnapshot]) -> anyhow::Result<u64> {
        let mut inserted = 0;
        for chunk in snapshots.chunks(5000) {
            let mut tx = self.pool.begin().await?;
            for snapshot in chunk {
                let result = sqlx::query(
                    "INSERT OR IGNORE INTO vote_snapshots \
                     (market_key, voting_account, votes_value, snapshot_time, is_delegated, \
                      has_delegation) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .bind(&snapshot.market_key)
                .bind(&snapshot.voting_account)
                .bind(snapshot.votes_value.to_string())
                .bind(snapshot.snapshot_time)
                .bind(snapshot.is_delegated)
                .bind(snapshot.has_delegation)
                .execute(&mut *tx)
                .await?;
                inserted += result.rows_affected();
            }
            tx.commit().await?;
        }
        Ok(inserted)
    }

    pub async fn for_market_on(
        &self,
        snapshot_time: NaiveDate,
        market_key: &str,
    ) -> anyhow::Result<Vec<VoteSnapshot>> {
        let rows = sqlx::query(
            "SELECT * FROM vote_snapshots WHERE snapshot_time = ?1 AND market_key = ?2 ORDER BY id",
        )
        .bind(snapshot_time)
        .bind(market_key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(vote_from_row).collect::<Result<_, _>>()?)
    }

    pub async fn count(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM vote_snapshots")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

/// Failure codes that leave a voter retryable within the same bribe.
pub const RETRYABLE_PAYOUT_CODES: [&str; 4] = [
    "tx_bad_auth",
    "tx_bad_seq",
    "tx_insufficient_balance",
    "tx_insufficient_fee",
];

#[derive(Clone)]
pub struct PayoutStore {
    pool: SqlitePool,
}

impl PayoutStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert payout rows. The partial unique index drops a second
    /// `success` row for the same (bribe, snapshot) pair.
    pub async fn insert_batch(&self, payouts: &[Payout]) -> anyhow::Result<u64> {
        let mut inserted = 0;
        let mut tx = self.pool.begin().await?;
        for payout in payouts {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO payouts \
                 (bribe_id, vote_snapshot_id, asset_code, asset_issuer, reward_amount, \
                  stellar_transaction_id, status, message, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .bind(payout.bribe_id)
            .bind(payout.vote_snapshot_id)
            .bind(payout.asset.code())
            .bind(payout.asset.issuer())
            .bind(payout.reward_amount.as_ref().map(BigDecimal::to_string))
            .bind(&payout.stellar_transaction_id)
            .bind(payout.status.to_string())
            .bind(&payout.message)
            .bind(payout.created_at)
            .bind(payout.updated_at)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Distinct hashes of timed-out payouts old enough to be resolved.
    pub async fn timeout_hashes(
        &self,
        bribe_id: i64,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT stellar_transaction_id FROM payouts \
             WHERE bribe_id = ?1 AND message = 'timeout' AND stellar_transaction_id != '' \
             AND created_at <= ?2",
        )
        .bind(bribe_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| r.try_get("stellar_transaction_id"))
            .collect::<Result<_, _>>()?)
    }

    pub async fn mark_hash_success(&self, hash: &str) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE payouts SET status = 'success', message = '', updated_at = ?1 \
             WHERE stellar_transaction_id = ?2",
        )
        .bind(Utc::now())
        .bind(hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_by_hash(&self, hash: &str) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM payouts WHERE stellar_transaction_id = ?1")
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Snapshots already rewarded for this bribe.
    pub async fn paid_snapshot_ids(&self, bribe_id: i64) -> anyhow::Result<HashSet<i64>> {
        let rows = sqlx::query(
            "SELECT DISTINCT vote_snapshot_id FROM payouts \
             WHERE bribe_id = ?1 AND status = 'success'",
        )
        .bind(bribe_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| r.try_get("vote_snapshot_id"))
            .collect::<Result<_, _>>()?)
    }

    /// Snapshots with a payout that is neither a success nor a known
    /// retryable failure; those voters stay unpaid for this bribe until
    /// reconciliation removes the row.
    pub async fn excluded_snapshot_ids(&self, bribe_id: i64) -> anyhow::Result<HashSet<i64>> {
        let placeholders = RETRYABLE_PAYOUT_CODES
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT DISTINCT vote_snapshot_id FROM payouts \
             WHERE bribe_id = ? AND NOT (status = 'failed' AND message IN ({placeholders}))"
        );
        let mut query = sqlx::query(&sql).bind(bribe_id);
        for code in RETRYABLE_PAYOUT_CODES {
            query = query.bind(code);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|r| r.try_get("vote_snapshot_id"))
            .collect::<Result<_, _>>()?)
    }

    pub async fn for_bribe(&self, bribe_id: i64) -> anyhow::Result<Vec<Payout>> {
        let rows = sqlx::query("SELECT * FROM payouts WHERE bribe_id = ?1 ORDER BY id")
            .bind(bribe_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(payout_from_row).collect::<Result<_, _>>()?)
    }
}

#[derive(Clone)]
pub struct AssetHolderStore {
    pool: SqlitePool,
}

impl AssetHolderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_batch(&self, snapshots: &[AssetHolderSnapshot]) -> anyhow::Result<u64> {
        let mut inserted = 0;
        for chunk in snapshots.chunks(5000) {
            let mut tx = self.pool.begin().await?;
            for snapshot in chunk {
                let result = sqlx::query(
                    "INSERT INTO asset_holder_snapshots \
                     (account, asset_code, asset_issuer, balance, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .bind(&snapshot.account)
                .bind(snapshot.asset.code())
                .bind(snapshot.asset.issuer())
                .bind(snapshot.balance.to_string())
                .bind(snapshot.created_at)
                .execute(&mut *tx)
                .await?;
                inserted += result.rows_affected();
            }
            tx.commit().await?;
        }
        Ok(inserted)
    }

    /// Accounts holding `asset` according to the snapshot taken on `date`.
    pub async fn holders_on(
        &self,
        date: NaiveDate,
        asset: &Asset,
    ) -> anyhow::Result<HashSet<String>> {
        let (start, stop) = day_bounds(date);
        let rows = sqlx::query(
            "SELECT DISTINCT account FROM asset_holder_snapshots \
             WHERE created_at >= ?1 AND created_at < ?2 AND asset_code = ?3 AND asset_issuer = ?4",
        )
        .bind(start)
        .bind(stop)
        .bind(asset.code())
        .bind(asset.issuer())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| r.try_get("account"))
            .collect::<Result<_, _>>()?)
    }
}

#[derive(Clone)]
pub struct ClaimableBalanceStore {
    pool: SqlitePool,
}

impl ClaimableBalanceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Drop the rows loaded on `date` for `asset` so the day's snapshot can
    /// be rebuilt from scratch.
    pub async fn delete_loaded_on(&self, asset: &Asset, date: NaiveDate) -> anyhow::Result<u64> {
        let (start, stop) = day_bounds(date);
        let result = sqlx::query(
            "DELETE FROM claimable_balances \
             WHERE asset_code = ?1 AND asset_issuer = ?2 AND loaded_at >= ?3 AND loaded_at < ?4",
        )
        .bind(asset.code())
        .bind(asset.issuer())
        .bind(start)
        .bind(stop)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Get-or-create semantics: an id seen before keeps its first record
    /// and claimant set.
    pub async fn insert(
        &self,
        balance: &StoredClaimableBalance,
        claimants: &[StoredClaimant],
    ) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO claimable_balances \
             (claimable_balance_id, asset_code, asset_issuer, amount, sponsor, owner, \
              paging_token, last_modified_time, last_modified_ledger, loaded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&balance.claimable_balance_id)
        .bind(balance.asset.code())
        .bind(balance.asset.issuer())
        .bind(balance.amount.to_string())
        .bind(&balance.sponsor)
        .bind(&balance.owner)
        .bind(&balance.paging_token)
        .bind(balance.last_modified_time)
        .bind(balance.last_modified_ledger)
        .bind(balance.loaded_at)
        .execute(&mut *tx)
        .await?;
        let created = result.rows_affected() > 0;
        if created {
            for claimant in claimants {
                sqlx::query(
                    "INSERT INTO claimants (claimable_balance_id, destination, predicate) \
                     VALUES (?1, ?2, ?3)",
                )
                .bind(&balance.claimable_balance_id)
                .bind(&claimant.destination)
                .bind(&claimant.predicate)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(created)
    }

    /// Whether `voter` holds a delegated-asset balance for `market_key`
    /// among the records loaded on `date`.
    pub async fn has_delegation(
        &self,
        date: NaiveDate,
        voter: &str,
        delegated_assets: &[Asset],
        market_key: &str,
    ) -> anyhow::Result<bool> {
        let (start, stop) = day_bounds(date);
        for asset in delegated_assets {
            let row = sqlx::query(
                "SELECT 1 AS hit FROM claimable_balances cb \
                 WHERE cb.owner = ?1 AND cb.asset_code = ?2 AND cb.asset_issuer = ?3 \
                 AND cb.loaded_at >= ?4 AND cb.loaded_at < ?5 \
                 AND EXISTS (SELECT 1 FROM claimants c \
                             WHERE c.claimable_balance_id = cb.claimable_balance_id \
                             AND c.destination = ?6) \
                 LIMIT 1",
            )
            .bind(voter)
            .bind(asset.code())
            .bind(asset.issuer())
            .bind(start)
            .bind(stop)
            .bind(market_key)
            .fetch_optional(&self.pool)
            .await?;
            if row.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Delegation records flowing into `aggregator`: balances in a
    /// delegatable asset whose claimants include both the marker and the
    /// aggregator. Returns each record's owner (the delegator) and amount.
    pub async fn delegated_inflows(
        &self,
        date: NaiveDate,
        aggregator: &str,
        marker: &str,
        delegatable_assets: &[Asset],
    ) -> anyhow::Result<Vec<(String, BigDecimal)>> {
        let (start, stop) = day_bounds(date);
        let mut inflows = Vec::new();
        for asset in delegatable_assets {
            let rows = sqlx::query(
                "SELECT cb.owner AS owner, cb.amount AS amount FROM claimable_balances cb \
                 WHERE cb.asset_code = ?1 AND cb.asset_issuer = ?2 \
                 AND cb.loaded_at >= ?3 AND cb.loaded_at < ?4 \
                 AND cb.owner IS NOT NULL \
                 AND EXISTS (SELECT 1 FROM claimants c \
                             WHERE c.claimable_balance_id = cb.claimable_balance_id \
                             AND c.destination = ?5) \
                 AND EXISTS (SELECT 1 FROM claimants c \
                             WHERE c.claimable_balance_id = cb.claimable_balance_id \
                             AND c.destination = ?6) \
                 ORDER BY cb.claimable_balance_id",
            )
            .bind(asset.code())
            .bind(asset.issuer())
            .bind(start)
            .bind(stop)
            .bind(marker)
            .bind(aggregator)
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                let owner: String = row.try_get("owner")?;
                let amount = decimal_column(&row, "amount")?;
                inflows.push((owner, amount));
            }
        }
        Ok(inflows)
    }
}
