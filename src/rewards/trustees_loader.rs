// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Daily balance snapshot of every account holding a bribed asset. Voters
//! of a non-native bribe are only paid when they appear here.
//!
//! The paging cursor is persisted after every page, so a listing
//! interrupted by a transport error resumes mid-stream when the scheduler
//! retries the job.

use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use tracing::info;

use super::model::{AssetHolderSnapshot, AssetHolderStore};
use crate::db::Cache;
use crate::ledger::{Asset, LedgerProvider};

const PAGE_LIMIT: u32 = 200;
const CURSOR_TTL_HOURS: i64 = 12;

pub struct TrusteesLoader<'a, P> {
    provider: &'a P,
    store: &'a AssetHolderStore,
    cache: &'a Cache,
    asset: Asset,
    cursor_key: String,
}

impl<'a, P: LedgerProvider> TrusteesLoader<'a, P> {
    pub fn new(provider: &'a P, store: &'a AssetHolderStore, cache: &'a Cache, asset: Asset) -> Self {
        let cursor_key = format!("{}:{}_trustees_loader", asset.code(), asset.issuer());
        Self {
            provider,
            store,
            cache,
            asset,
            cursor_key,
        }
    }

    /// Forget the cursor so the next run lists from the beginning.
    pub async fn reset_cursor(&self) -> anyhow::Result<()> {
        self.cache.delete(&self.cursor_key).await
    }

    /// Page all holders of the asset and snapshot their balances. Resumes
    /// from the persisted cursor if a previous run was interrupted.
    pub async fn load(&self) -> anyhow::Result<u64> {
        let mut cursor = self.cache.get(&self.cursor_key).await?;
        let mut stored = 0;

        loop {
            let accounts = self
                .provider
                .accounts_holding(&self.asset, cursor.as_deref(), PAGE_LIMIT)
                .await?;
            if accounts.is_empty() {
                break;
            }

            let now = Utc::now();
            let snapshots: Vec<AssetHolderSnapshot> = accounts
                .iter()
                .map(|account| {
                    let balance = account
                        .balance_of(&self.asset)
                        .map(|b| b.balance.parse::<BigDecimal>())
                        .transpose()?
                        .unwrap_or_else(|| BigDecimal::from(0));
                    Ok(AssetHolderSnapshot {
                        id: 0,
                        account: account.account_id.clone(),
                        asset: self.asset.clone(),
                        balance,
                        created_at: now,
                    })
                })
                .collect::<anyhow::Result<_>>()?;
            stored += self.store.insert_batch(&snapshots).await?;

            let last = accounts.last().expect("page is non-empty");
            let next = last
                .paging_token
                .clone()
                .unwrap_or_else(|| last.account_id.clone());
            self.cache
                .set(&self.cursor_key, &next, Some(Duration::hours(CURSOR_TTL_HOURS)))
                .await?;
            cursor = Some(next);
        }

        info!(asset = %self.asset.short(), stored, "holder snapshot loaded");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory, Cache};
    use crate::test_utils::{holder_account, MockLedger};

    const ISSUER: &str = "GBNZILSTVQZ4R7IKQDGHYGY2QXL5QOFJYQMXPKWRRM5PAV7Y4M67AQUA";

    #[tokio::test]
    async fn snapshots_every_holder_and_resets() {
        let pool = open_memory().await.unwrap();
        let store = AssetHolderStore::new(pool.clone());
        let cache = Cache::new(pool);
        let asset = Asset::credit("XXX", ISSUER);

        let ledger = MockLedger::default();
        for i in 0..5 {
            ledger.add_holder(holder_account(&format!("GV{i}"), &asset, "1000"));
        }

        let loader = TrusteesLoader::new(&ledger, &store, &cache, asset.clone());
        loader.reset_cursor().await.unwrap();
        assert_eq!(loader.load().await.unwrap(), 5);

        let holders = store.holders_on(Utc::now().date_naive(), &asset).await.unwrap();
        assert_eq!(holders.len(), 5);
        assert!(holders.contains("GV0"));

        // Without a reset the cursor points past the listing.
        assert_eq!(loader.load().await.unwrap(), 0);
        loader.reset_cursor().await.unwrap();
        assert_eq!(loader.load().await.unwrap(), 5);
    }
}
