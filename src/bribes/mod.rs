// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The bribe lifecycle: ingest, claim-and-convert, aggregate.

use bigdecimal::BigDecimal;

use crate::ledger::{Asset, LedgerProvider};

pub mod aggregator;
pub mod loader;
pub mod model;
pub mod processor;

pub use aggregator::Aggregator;
pub use loader::BribesLoader;
pub use model::{AggregatedBribe, AggregatedBribeStore, Bribe, BribeStatus, BribeStore};
pub use processor::{BribeProcessor, ProcessError};

/// Quote `amount` of `asset` in the reward asset via a strict-send path;
/// zero when the books offer none.
pub async fn reward_equivalent<P: LedgerProvider>(
    provider: &P,
    amount: &BigDecimal,
    asset: &Asset,
    reward_asset: &Asset,
) -> anyhow::Result<BigDecimal> {
    if asset == reward_asset {
        return Ok(amount.clone());
    }
    let paths = provider.strict_send_paths(asset, amount, reward_asset).await?;
    match paths.first() {
        Some(path) => Ok(path.destination_amount.parse()?),
        None => Ok(BigDecimal::from(0)),
    }
}
