// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Ingest: pages claimable balances addressed to the house wallet and
//! turns well-formed ones into pending bribes.
//!
//! A record is ingested at most once. The paging cursor survives restarts
//! twice over: it is cached with a TTL and, failing that, recovered from
//! the newest stored bribe.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use super::model::{Bribe, BribeStatus, BribeStore, EPOCH_DAYS};
use crate::db::Cache;
use crate::ledger::types::{ClaimableBalanceRecord, ClaimantRecord};
use crate::ledger::{Asset, LedgerProvider};

const CURSOR_CACHE_KEY: &str = "bribes_loader_last_id";
const CURSOR_CACHE_TTL_HOURS: i64 = 12;
const PAGE_LIMIT: u32 = 200;

pub struct BribesLoader<'a, P> {
    provider: &'a P,
    store: &'a BribeStore,
    cache: &'a Cache,
    house_wallet: String,
    reward_asset: Asset,
    epoch_duration: Duration,
}

impl<'a, P: LedgerProvider> BribesLoader<'a, P> {
    pub fn new(
        provider: &'a P,
        store: &'a BribeStore,
        cache: &'a Cache,
        house_wallet: &str,
        reward_asset: Asset,
    ) -> Self {
        Self {
            provider,
            store,
            cache,
            house_wallet: house_wallet.to_string(),
            reward_asset,
            epoch_duration: Duration::days(EPOCH_DAYS),
        }
    }

    pub fn with_duration(mut self, epoch_duration: Duration) -> Self {
        self.epoch_duration = epoch_duration;
        self
    }

    /// Ingest every claimable balance past the cursor. Returns how many new
    /// bribes were stored.
    pub async fn load(&self) -> anyhow::Result<u64> {
        let mut cursor = self.cursor().await?;
        let mut stored = 0;

        loop {
            let records = self
                .provider
                .claimable_balances_for_claimant(
                    &self.house_wallet,
                    cursor.as_deref(),
                    PAGE_LIMIT,
                    true,
                )
                .await?;
            if records.is_empty() {
                break;
            }

            let next_cursor = records
                .last()
                .map(|r| r.paging_token.clone())
                .expect("page is non-empty");
            let mut parsed = Vec::with_capacity(records.len());
            for record in records {
                if let Some(bribe) = self.parse(record).await? {
                    parsed.push(bribe);
                }
            }
            stored += self.store.insert_batch(&parsed).await?;
            self.save_cursor(&next_cursor).await?;
            cursor = Some(next_cursor);
        }

        if stored > 0 {
            info!(stored, "ingested new bribes");
        }
        Ok(stored)
    }

    async fn cursor(&self) -> anyhow::Result<Option<String>> {
        if let Some(cursor) = self.cache.get(CURSOR_CACHE_KEY).await? {
            return Ok(Some(cursor));
        }
        self.store.latest_paging_token().await
    }

    async fn save_cursor(&self, cursor: &str) -> anyhow::Result<()> {
        self.cache
            .set(
                CURSOR_CACHE_KEY,
                cursor,
                Some(Duration::hours(CURSOR_CACHE_TTL_HOURS)),
            )
            .await
    }

    /// Validate one claimable balance. `None` means the record cannot even
    /// be attributed (wrong claimant count) and is skipped outright;
    /// otherwise a bribe row is produced whose status encodes any defects.
    pub async fn parse(&self, record: ClaimableBalanceRecord) -> anyhow::Result<Option<Bribe>> {
        if record.claimants.len() != 2 {
            error!(id = %record.id, claimants = record.claimants.len(), "invalid claimants");
            return Ok(None);
        }

        let asset = match Asset::from_horizon(&record.asset) {
            Ok(asset) => asset,
            Err(_) => {
                error!(id = %record.id, asset = %record.asset, "unparseable asset");
                return Ok(None);
            }
        };
        let amount: BigDecimal = match record.amount.parse() {
            Ok(amount) => amount,
            Err(_) => {
                error!(id = %record.id, amount = %record.amount, "unparseable amount");
                return Ok(None);
            }
        };

        let mut claimants = record.claimants.clone();
        // House-wallet claimant first, market-key claimant second.
        claimants.sort_by_key(|c| c.destination != self.house_wallet);
        let (house_claim, market_claim): (&ClaimantRecord, &ClaimantRecord) =
            (&claimants[0], &claimants[1]);

        let mut messages: Vec<String> = Vec::new();

        if house_claim.destination != self.house_wallet {
            messages.push("Invalid predicate: no bribe account".into());
        }
        if !market_claim.predicate.is_reject_all() {
            messages.push("Invalid predicate: market key predicate incorrect".into());
        }

        let unlock_raw = house_claim.predicate.unlock_time();
        if unlock_raw.is_none() {
            messages.push("Invalid predicate: bribe account predicate incorrect time".into());
        }
        let unlock_time = match unlock_raw {
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(_) => {
                    messages.push("Invalid predicate: invalid unlock time format".into());
                    None
                }
            },
            None => None,
        };

        let created_at = match record.last_modified_time.as_deref() {
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(t) => t.with_timezone(&Utc),
                Err(_) => {
                    messages.push("Invalid predicate: invalid time format".into());
                    Utc::now()
                }
            },
            None => Utc::now(),
        };

        let status = if !messages.is_empty() && unlock_time.is_some() {
            BribeStatus::PendingReturn
        } else if !messages.is_empty() {
            BribeStatus::Invalid
        } else {
            BribeStatus::Pending
        };

        let reward_equivalent =
            super::reward_equivalent(self.provider, &amount, &asset, &self.reward_asset).await?;

        let now = Utc::now();
        let mut bribe = Bribe {
            id: 0,
            status,
            message: messages.join("\n"),
            market_key: market_claim.destination.clone(),
            sponsor: record.sponsor.clone().unwrap_or_default(),
            amount,
            asset,
            amount_for_bribes: None,
            amount_reward: None,
            conversion_tx_hash: None,
            refund_tx_hash: None,
            claimable_balance_id: record.id.clone(),
            paging_token: record.paging_token.clone(),
            unlock_time,
            start_at: None,
            stop_at: None,
            created_at,
            loaded_at: now,
            updated_at: now,
            reward_equivalent,
            is_amm_protocol: false,
        };
        bribe.update_active_period(None, self.epoch_duration);
        debug!(%bribe, status = %bribe.status, "parsed claimable balance");
        Ok(Some(bribe))
    }
}
