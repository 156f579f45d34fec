// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Daily snapshot of claimable balances for the delegation assets. The
//! day's rows for each asset are dropped and re-paged so the cache always
//! reflects the ledger as of the snapshot.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use super::model::{ClaimableBalanceStore, StoredClaimableBalance, StoredClaimant};
use crate::ledger::types::ClaimableBalanceRecord;
use crate::ledger::{Asset, LedgerProvider};

const PAGE_LIMIT: u32 = 200;

pub struct ClaimLoader<'a, P> {
    provider: &'a P,
    store: &'a ClaimableBalanceStore,
    asset: Asset,
}

impl<'a, P: LedgerProvider> ClaimLoader<'a, P> {
    pub fn new(provider: &'a P, store: &'a ClaimableBalanceStore, asset: Asset) -> Self {
        Self {
            provider,
            store,
            asset,
        }
    }

    /// Rebuild today's snapshot for this asset.
    pub async fn refresh(&self, date: NaiveDate) -> anyhow::Result<u64> {
        let dropped = self.store.delete_loaded_on(&self.asset, date).await?;
        debug!(asset = %self.asset.short(), dropped, "cleared day's claim snapshot");
        self.load().await
    }

    async fn load(&self) -> anyhow::Result<u64> {
        let mut cursor: Option<String> = None;
        let mut stored = 0;

        loop {
            let records = self
                .provider
                .claimable_balances_for_asset(&self.asset, None, cursor.as_deref(), PAGE_LIMIT)
                .await?;
            let Some(last) = records.last() else {
                break;
            };
            cursor = Some(last.paging_token.clone());

            for record in &records {
                if self.process(record).await? {
                    stored += 1;
                }
            }
        }

        info!(asset = %self.asset.short(), stored, "claim snapshot loaded");
        Ok(stored)
    }

    async fn process(&self, record: &ClaimableBalanceRecord) -> anyhow::Result<bool> {
        let owner = record
            .claimants
            .iter()
            .find(|c| !c.predicate.is_reject_all())
            .map(|c| c.destination.clone());

        let claimants: Vec<StoredClaimant> = record
            .claimants
            .iter()
            .map(|c| {
                Ok(StoredClaimant {
                    destination: c.destination.clone(),
                    predicate: serde_json::to_string(&c.predicate)?,
                })
            })
            .collect::<anyhow::Result<_>>()?;

        let last_modified_time = record
            .last_modified_time
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc));

        let balance = StoredClaimableBalance {
            claimable_balance_id: record.id.clone(),
            asset: self.asset.clone(),
            amount: record.amount.parse::<BigDecimal>()?,
            sponsor: record.sponsor.clone().unwrap_or_default(),
            owner,
            paging_token: record.paging_token.clone(),
            last_modified_time,
            last_modified_ledger: i64::from(record.last_modified_ledger),
            loaded_at: Utc::now(),
        };
        self.store.insert(&balance, &claimants).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;
    use crate::ledger::types::{ClaimantRecord, Predicate};
    use crate::test_utils::MockLedger;

    const ISSUER: &str = "GBNZILSTVQZ4R7IKQDGHYGY2QXL5QOFJYQMXPKWRRM5PAV7Y4M67AQUA";

    fn record(id: &str, claimants: Vec<ClaimantRecord>) -> ClaimableBalanceRecord {
        ClaimableBalanceRecord {
            id: id.into(),
            paging_token: id.into(),
            asset: format!("UPVOTE:{ISSUER}"),
            amount: "300.0000000".into(),
            sponsor: Some("GSPONSOR".into()),
            claimants,
            last_modified_time: Some("2022-02-16T12:00:00Z".into()),
            last_modified_ledger: 7,
        }
    }

    #[tokio::test]
    async fn owner_is_first_claimant_without_reject_marker() {
        let pool = open_memory().await.unwrap();
        let store = ClaimableBalanceStore::new(pool);
        let asset = Asset::credit("UPVOTE", ISSUER);
        let ledger = MockLedger::default();
        ledger.add_claimable_balance(record(
            "01",
            vec![
                ClaimantRecord {
                    destination: "GMARKET".into(),
                    predicate: Predicate::not(Predicate::unconditional()),
                },
                ClaimantRecord {
                    destination: "GOWNER".into(),
                    predicate: Predicate::unconditional(),
                },
            ],
        ));

        let loader = ClaimLoader::new(&ledger, &store, asset.clone());
        let date = Utc::now().date_naive();
        assert_eq!(loader.refresh(date).await.unwrap(), 1);

        assert!(store
            .has_delegation(date, "GOWNER", &[asset.clone()], "GMARKET")
            .await
            .unwrap());

        // A second refresh drops and reloads the day's rows.
        assert_eq!(loader.refresh(date).await.unwrap(), 1);
        assert!(store
            .has_delegation(date, "GOWNER", &[asset], "GMARKET")
            .await
            .unwrap());
    }
}
