// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Wiring: configuration, database pool, ledger client and the stores,
//! built once at start and shared by every job.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::bribes::{AggregatedBribeStore, BribeStore};
use crate::config::Config;
use crate::db::{self, Cache};
use crate::ledger::tx::Signer;
use crate::ledger::HorizonClient;
use crate::rewards::{
    AssetHolderStore, ClaimableBalanceStore, PayoutStore, TrackerClient, VoteSnapshotStore,
};

pub struct App {
    pub config: Config,
    pub pool: SqlitePool,
    pub cache: Cache,
    pub horizon: HorizonClient,
    pub tracker: TrackerClient,
    pub bribes: BribeStore,
    pub aggregates: AggregatedBribeStore,
    pub votes: VoteSnapshotStore,
    pub payouts: PayoutStore,
    pub holders: AssetHolderStore,
    pub balances: ClaimableBalanceStore,
}

impl App {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        config.validate()?;
        let pool = db::open(&config.database.path).await?;
        let horizon = HorizonClient::new(&config.horizon)?;
        let tracker = TrackerClient::new(&config.tracker)?;
        Ok(Arc::new(Self {
            cache: Cache::new(pool.clone()),
            bribes: BribeStore::new(pool.clone()),
            aggregates: AggregatedBribeStore::new(pool.clone()),
            votes: VoteSnapshotStore::new(pool.clone()),
            payouts: PayoutStore::new(pool.clone()),
            holders: AssetHolderStore::new(pool.clone()),
            balances: ClaimableBalanceStore::new(pool.clone()),
            pool,
            horizon,
            tracker,
            config,
        }))
    }

    /// The house-wallet signing identity; checked against the configured
    /// address so a mismatched secret fails early and loudly.
    pub fn signer(&self) -> anyhow::Result<Signer> {
        let signer = Signer::from_secret(&self.config.wallet.signer)?;
        anyhow::ensure!(
            signer.address() == self.config.wallet.address,
            "wallet.signer does not match wallet.address"
        );
        Ok(signer)
    }
}
