// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Epoch aggregation: fold active bribes into per (market, asset) reward
//! pools.
//!
//! The converted reward portions of every bribe of a market are pooled into
//! a single reward-asset row, together with any pledges made directly in
//! the reward asset.

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use tracing::info;

use super::model::{AggregatedBribe, AggregatedBribeStore, BribeStore};
use crate::ledger::Asset;

pub struct Aggregator<'a> {
    bribes: &'a BribeStore,
    aggregates: &'a AggregatedBribeStore,
    reward_asset: Asset,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        bribes: &'a BribeStore,
        aggregates: &'a AggregatedBribeStore,
        reward_asset: Asset,
    ) -> Self {
        Self {
            bribes,
            aggregates,
            reward_asset,
        }
    }

    /// Aggregate the window `[start_at, stop_at)`. Retrying within the same
    /// epoch inserts nothing new.
    pub async fn aggregate(
        &self,
        start_at: DateTime<Utc>,
        stop_at: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let bribes = self.bribes.active_in_window(start_at, stop_at).await?;

        // (market, asset) -> payable pool plus its quoted reward-asset
        // equivalent; the reward asset itself is pooled separately.
        let mut pools: BTreeMap<(String, String), (Asset, BigDecimal, BigDecimal)> =
            BTreeMap::new();
        // market -> converted portions plus direct reward-asset pledges.
        let mut reward_pools: BTreeMap<String, BigDecimal> = BTreeMap::new();

        for bribe in &bribes {
            let for_bribes = bribe
                .amount_for_bribes
                .clone()
                .unwrap_or_else(|| BigDecimal::from(0));
            let reward = bribe
                .amount_reward
                .clone()
                .unwrap_or_else(|| BigDecimal::from(0));

            if bribe.asset == self.reward_asset {
                let entry = reward_pools
                    .entry(bribe.market_key.clone())
                    .or_insert_with(|| BigDecimal::from(0));
                *entry += for_bribes;
            } else {
                let key = (bribe.market_key.clone(), bribe.asset.to_horizon());
                let entry = pools.entry(key).or_insert_with(|| {
                    (bribe.asset.clone(), BigDecimal::from(0), BigDecimal::from(0))
                });
                entry.1 += for_bribes;
                entry.2 += &bribe.reward_equivalent;
            }

            let entry = reward_pools
                .entry(bribe.market_key.clone())
                .or_insert_with(|| BigDecimal::from(0));
            *entry += reward;
        }

        let now = Utc::now();
        let mut rows: Vec<AggregatedBribe> = Vec::new();
        for ((market_key, _), (asset, total, equivalent)) in pools {
            rows.push(AggregatedBribe {
                id: 0,
                market_key,
                asset,
                start_at,
                stop_at,
                total_reward_amount: total,
                reward_equivalent: equivalent,
                created_at: now,
                updated_at: now,
            });
        }
        for (market_key, total) in reward_pools {
            if total <= BigDecimal::from(0) {
                continue;
            }
            rows.push(AggregatedBribe {
                id: 0,
                market_key,
                asset: self.reward_asset.clone(),
                start_at,
                stop_at,
                total_reward_amount: total.clone(),
                reward_equivalent: total,
                created_at: now,
                updated_at: now,
            });
        }

        let inserted = self.aggregates.insert_batch(&rows).await?;
        info!(
            bribes = bribes.len(),
            pools = rows.len(),
            inserted,
            "aggregated epoch"
        );
        Ok(inserted)
    }
}
