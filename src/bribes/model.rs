// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Bribe records and their per-epoch aggregates.

use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use strum::Display;

use crate::ledger::Asset;
use crate::utils::{epoch_window, round_down, short_key};

/// Days in the default activation window.
pub const EPOCH_DAYS: i64 = 7;

/// Lifecycle of a sponsor pledge. Transitions are driven by the processor
/// and are monotonic: a bribe reaches at most one terminal state.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum BribeStatus {
    /// Ingested, waiting for the unlock time.
    Pending = 0,
    /// Malformed beyond repair; never claimed.
    Invalid = 1,
    /// Claimed and converted; pays out during its window.
    Active = 2,
    /// Handed back to the sponsor.
    Returned = 3,
    /// Malformed but reclaimable once unlocked.
    PendingReturn = 4,
    FailedClaim = 5,
    NoPathForConversion = 6,
    FailedReturn = 7,
    /// Paid out through its whole window.
    Finished = 8,
}

impl BribeStatus {
    pub fn from_i64(value: i64) -> Option<Self> {
        use BribeStatus::*;
        match value {
            0 => Some(Pending),
            1 => Some(Invalid),
            2 => Some(Active),
            3 => Some(Returned),
            4 => Some(PendingReturn),
            5 => Some(FailedClaim),
            6 => Some(NoPathForConversion),
            7 => Some(FailedReturn),
            8 => Some(Finished),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bribe {
    pub id: i64,
    pub status: BribeStatus,
    pub message: String,
    pub market_key: String,
    pub sponsor: String,
    pub amount: BigDecimal,
    pub asset: Asset,
    pub amount_for_bribes: Option<BigDecimal>,
    pub amount_reward: Option<BigDecimal>,
    pub conversion_tx_hash: Option<String>,
    pub refund_tx_hash: Option<String>,
    pub claimable_balance_id: String,
    pub paging_token: String,
    pub unlock_time: Option<DateTime<Utc>>,
    pub start_at: Option<DateTime<Utc>>,
    pub stop_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub loaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Reward-asset value of the whole pledge as last quoted; zero when no
    /// path exists.
    pub reward_equivalent: BigDecimal,
    pub is_amm_protocol: bool,
}

impl Bribe {
    /// Recompute the activation window from `time` (defaults to the unlock
    /// time). A bribe without either keeps no window.
    pub fn update_active_period(&mut self, time: Option<DateTime<Utc>>, duration: Duration) {
        let Some(reference) = time.or(self.unlock_time) else {
            return;
        };
        let (start_at, stop_at) = epoch_window(reference, duration);
        self.start_at = Some(start_at);
        self.stop_at = Some(stop_at);
    }

    pub fn daily_bribe_amount(&self) -> Option<BigDecimal> {
        self.amount_for_bribes
            .as_ref()
            .map(|amount| round_down(&(amount / BigDecimal::from(EPOCH_DAYS))))
    }

    pub fn daily_reward_amount(&self) -> Option<BigDecimal> {
        self.amount_reward
            .as_ref()
            .map(|amount| round_down(&(amount / BigDecimal::from(EPOCH_DAYS))))
    }

    pub fn append_message(&mut self, message: &str) {
        if self.message.is_empty() {
            self.message = message.to_string();
        } else {
            self.message = format!("{}\n{}", self.message, message);
        }
    }
}

impl fmt::Display for Bribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bribe: {} {}",
            short_key(&self.market_key),
            short_key(&self.claimable_balance_id)
        )
    }
}

/// A per (market, asset, epoch) reward pool.
#[derive(Debug, Clone)]
pub struct AggregatedBribe {
    pub id: i64,
    pub market_key: String,
    pub asset: Asset,
    pub start_at: DateTime<Utc>,
    pub stop_at: DateTime<Utc>,
    pub total_reward_amount: BigDecimal,
    pub reward_equivalent: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AggregatedBribe {
    pub fn daily_amount(&self) -> BigDecimal {
        round_down(&(&self.total_reward_amount / BigDecimal::from(EPOCH_DAYS)))
    }
}

pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Result<BigDecimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{column}: {e}"),
            )),
        })
}

pub(crate) fn decimal_column_opt(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<BigDecimal>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|raw| {
        raw.parse().map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{column}: {e}"),
            )),
        })
    })
    .transpose()
}

fn bribe_from_row(row: &SqliteRow) -> Result<Bribe, sqlx::Error> {
    let status_raw: i64 = row.try_get("status")?;
    let status = BribeStatus::from_i64(status_raw).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: "status".into(),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown bribe status {status_raw}"),
        )),
    })?;
    let code: String = row.try_get("asset_code")?;
    let issuer: String = row.try_get("asset_issuer")?;
    Ok(Bribe {
        id: row.try_get("id")?,
        status,
        message: row.try_get("message")?,
        market_key: row.try_get("market_key")?,
        sponsor: row.try_get("sponsor")?,
        amount: decimal_column(row, "amount")?,
        asset: Asset::from_parts(&code, &issuer),
        amount_for_bribes: decimal_column_opt(row, "amount_for_bribes")?,
        amount_reward: decimal_column_opt(row, "amount_reward")?,
        conversion_tx_hash: row.try_get("conversion_tx_hash")?,
        refund_tx_hash: row.try_get("refund_tx_hash")?,
        claimable_balance_id: row.try_get("claimable_balance_id")?,
        paging_token: row.try_get("paging_token")?,
        unlock_time: row.try_get("unlock_time")?,
        start_at: row.try_get("start_at")?,
        stop_at: row.try_get("stop_at")?,
        created_at: row.try_get("created_at")?,
        loaded_at: row.try_get("loaded_at")?,
        updated_at: row.try_get("updated_at")?,
        reward_equivalent: decimal_column(row, "reward_equivalent")?,
        is_amm_protocol: row.try_get("is_amm_protocol")?,
    })
}

fn aggregated_from_row(row: &SqliteRow) -> Result<AggregatedBribe, sqlx::Error> {
    let code: String = row.try_get("asset_code")?;
    let issuer: String = row.try_get("asset_issuer")?;
    Ok(AggregatedBribe {
        id: row.try_get("id")?,
        market_key: row.try_get("market_key")?,
        asset: Asset::from_parts(&code, &issuer),
        start_at: row.try_get("start_at")?,
        stop_at: row.try_get("stop_at")?,
        total_reward_amount: decimal_column(row, "total_reward_amount")?,
        reward_equivalent: decimal_column(row, "reward_equivalent")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[derive(Clone)]
pub struct BribeStore {
    pool: SqlitePool,
}

impl BribeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_market_key(&self, market_key: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT OR IGNORE INTO market_keys (market_key, created_at) VALUES (?1, ?2)")
            .bind(market_key)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Batch insert of freshly parsed bribes. A record already ingested
    /// (same claimable balance id) is skipped, so re-reading a page is
    /// harmless.
    pub async fn insert_batch(&self, bribes: &[Bribe]) -> anyhow::Result<u64> {
        let mut inserted = 0;
        for chunk in bribes.chunks(5000) {
            let mut tx = self.pool.begin().await?;
            for bribe in chunk {
                sqlx::query(
                    "INSERT OR IGNORE INTO market_keys (market_key, created_at) VALUES (?1, ?2)",
                )
                .bind(&bribe.market_key)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
                let result = sqlx::query(
                    "INSERT OR IGNORE INTO bribes \
                     (status, message, market_key, sponsor, amount, asset_code, asset_issuer, \
                      amount_for_bribes, amount_reward, conversion_tx_hash, refund_tx_hash, \
                      claimable_balance_id, paging_token, unlock_time, start_at, stop_at, \
                      created_at, loaded_at, updated_at, reward_equivalent, is_amm_protocol) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
                             ?16, ?17, ?18, ?19, ?20, ?21)",
                )
                .bind(bribe.status as i64)
                .bind(&bribe.message)
                .bind(&bribe.market_key)
                .bind(&bribe.sponsor)
                .bind(bribe.amount.to_string())
                .bind(bribe.asset.code())
                .bind(bribe.asset.issuer())
                .bind(bribe.amount_for_bribes.as_ref().map(BigDecimal::to_string))
                .bind(bribe.amount_reward.as_ref().map(BigDecimal::to_string))
                .bind(&bribe.conversion_tx_hash)
                .bind(&bribe.refund_tx_hash)
                .bind(&bribe.claimable_balance_id)
                .bind(&bribe.paging_token)
                .bind(bribe.unlock_time)
                .bind(bribe.start_at)
                .bind(bribe.stop_at)
                .bind(bribe.created_at)
                .bind(bribe.loaded_at)
                .bind(bribe.updated_at)
                .bind(bribe.reward_equivalent.to_string())
                .bind(bribe.is_amm_protocol)
                .execute(&mut *tx)
                .await?;
                inserted += result.rows_affected();
            }
            tx.commit().await?;
        }
        Ok(inserted)
    }

    /// Persist every mutable field of an existing bribe.
    pub async fn update(&self, bribe: &Bribe) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE bribes SET status = ?1, message = ?2, amount_for_bribes = ?3, \
             amount_reward = ?4, conversion_tx_hash = ?5, refund_tx_hash = ?6, \
             unlock_time = ?7, start_at = ?8, stop_at = ?9, reward_equivalent = ?10, \
             updated_at = ?11 WHERE id = ?12",
        )
        .bind(bribe.status as i64)
        .bind(&bribe.message)
        .bind(bribe.amount_for_bribes.as_ref().map(BigDecimal::to_string))
        .bind(bribe.amount_reward.as_ref().map(BigDecimal::to_string))
        .bind(&bribe.conversion_tx_hash)
        .bind(&bribe.refund_tx_hash)
        .bind(bribe.unlock_time)
        .bind(bribe.start_at)
        .bind(bribe.stop_at)
        .bind(bribe.reward_equivalent.to_string())
        .bind(Utc::now())
        .bind(bribe.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The paging cursor recoverable from storage: the most recently
    /// created bribe's token.
    pub async fn latest_paging_token(&self) -> anyhow::Result<Option<String>> {
        let row =
            sqlx::query("SELECT paging_token FROM bribes ORDER BY created_at DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.try_get("paging_token")).transpose()?)
    }

    pub async fn by_status(&self, status: BribeStatus) -> anyhow::Result<Vec<Bribe>> {
        let rows = sqlx::query("SELECT * FROM bribes WHERE status = ?1 ORDER BY id")
            .bind(status as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(bribe_from_row)
            .collect::<Result<_, _>>()?)
    }

    pub async fn ready_to_claim(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Bribe>> {
        let rows = sqlx::query(
            "SELECT * FROM bribes WHERE status = ?1 AND unlock_time IS NOT NULL \
             AND unlock_time <= ?2 ORDER BY id",
        )
        .bind(BribeStatus::Pending as i64)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(bribe_from_row)
            .collect::<Result<_, _>>()?)
    }

    /// Bribes owed back to their sponsor: unconvertible ones, and malformed
    /// ones whose unlock time has passed.
    pub async fn ready_to_return(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Bribe>> {
        let rows = sqlx::query(
            "SELECT * FROM bribes WHERE status = ?1 \
             OR (status = ?2 AND unlock_time IS NOT NULL AND unlock_time <= ?3) ORDER BY id",
        )
        .bind(BribeStatus::NoPathForConversion as i64)
        .bind(BribeStatus::PendingReturn as i64)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(bribe_from_row)
            .collect::<Result<_, _>>()?)
    }

    pub async fn active_in_window(
        &self,
        start_at: DateTime<Utc>,
        stop_at: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Bribe>> {
        let rows = sqlx::query(
            "SELECT * FROM bribes WHERE status = ?1 AND start_at = ?2 AND stop_at = ?3 ORDER BY id",
        )
        .bind(BribeStatus::Active as i64)
        .bind(start_at)
        .bind(stop_at)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(bribe_from_row)
            .collect::<Result<_, _>>()?)
    }

    pub async fn active_at(&self, time: DateTime<Utc>) -> anyhow::Result<Vec<Bribe>> {
        let rows = sqlx::query(
            "SELECT * FROM bribes WHERE status = ?1 AND start_at <= ?2 AND stop_at > ?2 ORDER BY id",
        )
        .bind(BribeStatus::Active as i64)
        .bind(time)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(bribe_from_row)
            .collect::<Result<_, _>>()?)
    }

    /// Still-pending bribes whose window has already begun; the Monday job
    /// pushes their window one epoch forward.
    pub async fn pending_with_started_window(
        &self,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Bribe>> {
        let rows = sqlx::query(
            "SELECT * FROM bribes WHERE status = ?1 AND start_at IS NOT NULL AND start_at <= ?2 \
             ORDER BY id",
        )
        .bind(BribeStatus::Pending as i64)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(bribe_from_row)
            .collect::<Result<_, _>>()?)
    }

    pub async fn active_expired(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Bribe>> {
        let rows = sqlx::query(
            "SELECT * FROM bribes WHERE status = ?1 AND stop_at IS NOT NULL AND stop_at <= ?2 \
             ORDER BY id",
        )
        .bind(BribeStatus::Active as i64)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(bribe_from_row)
            .collect::<Result<_, _>>()?)
    }

    pub async fn set_status(&self, id: i64, status: BribeStatus) -> anyhow::Result<()> {
        sqlx::query("UPDATE bribes SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status as i64)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_reward_equivalent(
        &self,
        id: i64,
        equivalent: &BigDecimal,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE bribes SET reward_equivalent = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(equivalent.to_string())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM bribes")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

#[derive(Clone)]
pub struct AggregatedBribeStore {
    pool: SqlitePool,
}

impl AggregatedBribeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert aggregates; the uniqueness over (market, asset, start) makes
    /// a retried aggregation within the same epoch a no-op.
    pub async fn insert_batch(&self, aggregates: &[AggregatedBribe]) -> anyhow::Result<u64> {
        let mut inserted = 0;
        let mut tx = self.pool.begin().await?;
        for aggregate in aggregates {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO aggregated_bribes \
                 (market_key, asset_code, asset_issuer, start_at, stop_at, total_reward_amount, \
                  reward_equivalent, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(&aggregate.market_key)
            .bind(aggregate.asset.code())
            .bind(aggregate.asset.issuer())
            .bind(aggregate.start_at)
            .bind(aggregate.stop_at)
            .bind(aggregate.total_reward_amount.to_string())
            .bind(aggregate.reward_equivalent.to_string())
            .bind(aggregate.created_at)
            .bind(aggregate.updated_at)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn active_at(&self, time: DateTime<Utc>) -> anyhow::Result<Vec<AggregatedBribe>> {
        let rows = sqlx::query(
            "SELECT * FROM aggregated_bribes WHERE start_at <= ?1 AND stop_at > ?1 ORDER BY id",
        )
        .bind(time)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(aggregated_from_row)
            .collect::<Result<_, _>>()?)
    }

    /// Distinct markets with a pool active at `time`.
    pub async fn markets_active_at(&self, time: DateTime<Utc>) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT market_key FROM aggregated_bribes WHERE start_at <= ?1 AND stop_at > ?1",
        )
        .bind(time)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| r.try_get("market_key"))
            .collect::<Result<_, _>>()?)
    }

    /// Distinct assets of pools active at `time`.
    pub async fn assets_active_at(&self, time: DateTime<Utc>) -> anyhow::Result<Vec<Asset>> {
        let rows = sqlx::query(
            "SELECT DISTINCT asset_code, asset_issuer FROM aggregated_bribes \
             WHERE start_at <= ?1 AND stop_at > ?1",
        )
        .bind(time)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                let code: String = r.try_get("asset_code")?;
                let issuer: String = r.try_get("asset_issuer")?;
                Ok(Asset::from_parts(&code, &issuer))
            })
            .collect()
    }

    pub async fn all(&self) -> anyhow::Result<Vec<AggregatedBribe>> {
        let rows = sqlx::query("SELECT * FROM aggregated_bribes ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(aggregated_from_row)
            .collect::<Result<_, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn sample_bribe() -> Bribe {
        let now = Utc.with_ymd_and_hms(2022, 2, 16, 12, 0, 0).unwrap();
        Bribe {
            id: 0,
            status: BribeStatus::Pending,
            message: String::new(),
            market_key: "GBPF7NLFCYGZNHU6HS64ZGTE4YCRLAWTLFGOMFTHQ3WSUUFIGOSQFPJT".into(),
            sponsor: "GBNZILSTVQZ4R7IKQDGHYGY2QXL5QOFJYQMXPKWRRM5PAV7Y4M67AQUA".into(),
            amount: BigDecimal::from(100),
            asset: Asset::credit(
                "XXX",
                "GBNZILSTVQZ4R7IKQDGHYGY2QXL5QOFJYQMXPKWRRM5PAV7Y4M67AQUA",
            ),
            amount_for_bribes: None,
            amount_reward: None,
            conversion_tx_hash: None,
            refund_tx_hash: None,
            claimable_balance_id: "00000000aa".into(),
            paging_token: "1".into(),
            unlock_time: Some(now),
            start_at: None,
            stop_at: None,
            created_at: now,
            loaded_at: now,
            updated_at: now,
            reward_equivalent: BigDecimal::from(0),
            is_amm_protocol: false,
        }
    }

    #[test]
    fn active_period_follows_the_unlock_time() {
        let mut bribe = sample_bribe();
        bribe.update_active_period(None, Duration::days(EPOCH_DAYS));
        assert_eq!(
            bribe.start_at.unwrap(),
            Utc.with_ymd_and_hms(2022, 2, 21, 0, 0, 0).unwrap()
        );
        assert_eq!(
            bribe.stop_at.unwrap(),
            Utc.with_ymd_and_hms(2022, 2, 28, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn active_period_without_reference_is_untouched() {
        let mut bribe = sample_bribe();
        bribe.unlock_time = None;
        bribe.update_active_period(None, Duration::days(EPOCH_DAYS));
        assert!(bribe.start_at.is_none());
    }

    #[test]
    fn daily_amounts_round_down() {
        let mut bribe = sample_bribe();
        bribe.amount_for_bribes = Some(BigDecimal::from(100));
        assert_eq!(
            bribe.daily_bribe_amount().unwrap(),
            BigDecimal::from_str("14.2857142").unwrap()
        );
    }

    #[test]
    fn display_abbreviates_keys() {
        let bribe = sample_bribe();
        assert_eq!(bribe.to_string(), "Bribe: GBPF...FPJT 0000...00aa");
    }

    #[tokio::test]
    async fn ingest_is_idempotent() {
        let pool = crate::db::open_memory().await.unwrap();
        let store = BribeStore::new(pool);
        let bribe = sample_bribe();
        assert_eq!(store.insert_batch(&[bribe.clone()]).await.unwrap(), 1);
        assert_eq!(store.insert_batch(&[bribe]).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn status_queries_partition_the_lifecycle() {
        let pool = crate::db::open_memory().await.unwrap();
        let store = BribeStore::new(pool);
        let now = Utc.with_ymd_and_hms(2022, 2, 17, 0, 0, 0).unwrap();

        let mut unlocked = sample_bribe();
        unlocked.claimable_balance_id = "00000000a1".into();
        let mut locked = sample_bribe();
        locked.claimable_balance_id = "00000000a2".into();
        locked.unlock_time = Some(now + Duration::days(3));
        let mut stuck = sample_bribe();
        stuck.claimable_balance_id = "00000000a3".into();
        stuck.status = BribeStatus::NoPathForConversion;
        store
            .insert_batch(&[unlocked, locked, stuck])
            .await
            .unwrap();

        let claimable = store.ready_to_claim(now).await.unwrap();
        assert_eq!(claimable.len(), 1);
        assert_eq!(claimable[0].claimable_balance_id, "00000000a1");

        let returnable = store.ready_to_return(now).await.unwrap();
        assert_eq!(returnable.len(), 1);
        assert_eq!(returnable[0].claimable_balance_id, "00000000a3");
    }

    #[tokio::test]
    async fn aggregated_rows_are_unique_per_epoch() {
        let pool = crate::db::open_memory().await.unwrap();
        let bribes = BribeStore::new(pool.clone());
        bribes.upsert_market_key("M").await.unwrap();
        let store = AggregatedBribeStore::new(pool);
        let start = Utc.with_ymd_and_hms(2022, 2, 21, 0, 0, 0).unwrap();
        let aggregate = AggregatedBribe {
            id: 0,
            market_key: "M".into(),
            asset: Asset::Native,
            start_at: start,
            stop_at: start + Duration::days(7),
            total_reward_amount: BigDecimal::from(10),
            reward_equivalent: BigDecimal::from(0),
            created_at: start,
            updated_at: start,
        };
        assert_eq!(store.insert_batch(&[aggregate.clone()]).await.unwrap(), 1);
        assert_eq!(store.insert_batch(&[aggregate]).await.unwrap(), 0);
    }
}
