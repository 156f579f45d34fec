// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Vote ingestion from the external voting tracker, with delegated stakes
//! expanded back to their delegators.
//!
//! A voter that aggregates delegated stake gets a placeholder row carrying
//! its full tracker value (never paid directly), an optional row for its
//! own remainder, and one row per delegator taken from the claimable
//! balance cache.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::model::{ClaimableBalanceStore, VoteSnapshot, VoteSnapshotStore};
use crate::config::TrackerConfig;
use crate::ledger::error::Error;
use crate::ledger::Asset;
use crate::utils::round_down;

#[derive(Debug, Clone, Deserialize)]
pub struct RawVote {
    pub voting_account: String,
    pub votes_value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VotesPage {
    #[serde(default)]
    pub results: Vec<RawVote>,
    #[serde(default)]
    pub count: u64,
}

/// Where raw votes come from; production uses the voting-tracker HTTP API.
#[async_trait]
pub trait VoteSource: Send + Sync {
    async fn votes(
        &self,
        market_key: &str,
        timestamp: i64,
        page: u32,
        limit: u32,
    ) -> Result<VotesPage, Error>;
}

pub struct TrackerClient {
    http: reqwest::Client,
    base: Url,
    page_limit: u32,
}

impl TrackerClient {
    pub fn new(config: &TrackerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            base: config.url.clone(),
            page_limit: config.page_limit,
        })
    }

    pub fn page_limit(&self) -> u32 {
        self.page_limit
    }
}

#[async_trait]
impl VoteSource for TrackerClient {
    async fn votes(
        &self,
        market_key: &str,
        timestamp: i64,
        page: u32,
        limit: u32,
    ) -> Result<VotesPage, Error> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| Error::invalid("tracker url", self.base.as_str()))?;
            path.pop_if_empty();
            path.extend(["api", "market-keys", market_key, "votes", ""]);
        }
        let response = self
            .http
            .get(url)
            .query(&[
                ("limit", limit.to_string()),
                ("timestamp", timestamp.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound);
        }
        if !response.status().is_success() {
            return Err(Error::Status {
                status: response.status().as_u16(),
                summary: "voting tracker error".into(),
                result_codes: None,
            });
        }
        Ok(response.json().await?)
    }
}

pub struct VotesLoader<'a, S> {
    source: &'a S,
    votes: &'a VoteSnapshotStore,
    balances: &'a ClaimableBalanceStore,
    market_key: String,
    snapshot_time: DateTime<Utc>,
    delegate_marker: String,
    delegatable_assets: Vec<Asset>,
    delegated_assets: Vec<Asset>,
    page_limit: u32,
}

impl<'a, S: VoteSource> VotesLoader<'a, S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: &'a S,
        votes: &'a VoteSnapshotStore,
        balances: &'a ClaimableBalanceStore,
        market_key: &str,
        snapshot_time: DateTime<Utc>,
        delegate_marker: &str,
        delegatable_assets: Vec<Asset>,
        delegated_assets: Vec<Asset>,
        page_limit: u32,
    ) -> Self {
        Self {
            source,
            votes,
            balances,
            market_key: market_key.to_string(),
            snapshot_time,
            delegate_marker: delegate_marker.to_string(),
            delegatable_assets,
            delegated_assets,
            page_limit,
        }
    }

    /// Page the tracker until it runs dry, expanding each raw vote.
    /// Returns how many snapshot rows were stored.
    pub async fn load(&self) -> anyhow::Result<u64> {
        let timestamp = self.snapshot_time.timestamp();
        let mut page = 1u32;
        let mut stored = 0;

        loop {
            let votes_page = match self
                .source
                .votes(&self.market_key, timestamp, page, self.page_limit)
                .await
            {
                Ok(votes_page) => votes_page,
                // The tracker 404s past the last page.
                Err(Error::NotFound) => break,
                Err(e) => return Err(e.into()),
            };
            if votes_page.results.is_empty() {
                break;
            }

            let mut snapshots = Vec::new();
            for vote in &votes_page.results {
                snapshots.extend(self.expand(vote).await?);
            }
            stored += self.votes.insert_batch(&snapshots).await?;

            page += 1;
        }

        info!(
            market = %crate::utils::short_key(&self.market_key),
            stored,
            "votes loaded"
        );
        Ok(stored)
    }

    /// Expand one raw vote into snapshot rows; see the module docs for the
    /// delegation shape.
    async fn expand(&self, vote: &RawVote) -> anyhow::Result<Vec<VoteSnapshot>> {
        let votes_value: BigDecimal = match vote.votes_value.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    voter = %vote.voting_account,
                    value = %vote.votes_value,
                    "unparseable votes value"
                );
                return Ok(Vec::new());
            }
        };
        let date = self.snapshot_time.date_naive();

        let row = |votes_value: BigDecimal,
                   voting_account: String,
                   is_delegated: bool,
                   has_delegation: bool| VoteSnapshot {
            id: 0,
            market_key: self.market_key.clone(),
            voting_account,
            votes_value,
            snapshot_time: date,
            is_delegated,
            has_delegation,
        };

        let aggregates = self
            .balances
            .has_delegation(
                date,
                &vote.voting_account,
                &self.delegated_assets,
                &self.market_key,
            )
            .await?;
        if !aggregates {
            return Ok(vec![row(
                votes_value,
                vote.voting_account.clone(),
                false,
                false,
            )]);
        }

        let inflows = self
            .balances
            .delegated_inflows(
                date,
                &vote.voting_account,
                &self.delegate_marker,
                &self.delegatable_assets,
            )
            .await?;
        let delegated_total: BigDecimal = inflows
            .iter()
            .map(|(_, amount)| round_down(amount))
            .sum();
        debug!(
            voter = %vote.voting_account,
            inflows = inflows.len(),
            delegated = %delegated_total,
            "expanding delegated votes"
        );

        // Placeholder carrying the full tracker value; excluded from
        // payouts.
        let mut rows = vec![row(
            votes_value.clone(),
            vote.voting_account.clone(),
            false,
            true,
        )];
        // The aggregator's own remainder is paid like a plain vote.
        if votes_value > delegated_total {
            rows.push(row(
                &votes_value - &delegated_total,
                vote.voting_account.clone(),
                false,
                false,
            ));
        }
        for (owner, amount) in inflows {
            rows.push(row(round_down(&amount), owner, true, false));
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;
    use crate::rewards::model::StoredClaimableBalance;
    use crate::rewards::model::StoredClaimant;
    use crate::test_utils::MockVotes;
    use std::str::FromStr;

    const ISSUER: &str = "GBNZILSTVQZ4R7IKQDGHYGY2QXL5QOFJYQMXPKWRRM5PAV7Y4M67AQUA";
    const MARKET: &str = "GBPF7NLFCYGZNHU6HS64ZGTE4YCRLAWTLFGOMFTHQ3WSUUFIGOSQFPJT";
    const MARKER: &str = "GMARKER";
    const AGGREGATOR: &str = "GAGGREGATOR";

    struct Fixture {
        votes: VoteSnapshotStore,
        balances: ClaimableBalanceStore,
    }

    async fn fixture() -> Fixture {
        let pool = open_memory().await.unwrap();
        Fixture {
            votes: VoteSnapshotStore::new(pool.clone()),
            balances: ClaimableBalanceStore::new(pool),
        }
    }

    fn cb(id: &str, asset: &Asset, owner: &str, amount: i64) -> StoredClaimableBalance {
        StoredClaimableBalance {
            claimable_balance_id: id.into(),
            asset: asset.clone(),
            amount: BigDecimal::from(amount),
            sponsor: String::new(),
            owner: Some(owner.into()),
            paging_token: String::new(),
            last_modified_time: None,
            last_modified_ledger: 0,
            loaded_at: Utc::now(),
        }
    }

    fn claimant(destination: &str) -> StoredClaimant {
        StoredClaimant {
            destination: destination.into(),
            predicate: r#"{"not":{"unconditional":true}}"#.into(),
        }
    }

    fn loader<'a>(
        source: &'a MockVotes,
        fx: &'a Fixture,
        delegatable: Asset,
        delegated: Asset,
    ) -> VotesLoader<'a, MockVotes> {
        VotesLoader::new(
            source,
            &fx.votes,
            &fx.balances,
            MARKET,
            Utc::now(),
            MARKER,
            vec![delegatable],
            vec![delegated],
            200,
        )
    }

    #[tokio::test]
    async fn plain_votes_become_single_rows() {
        let fx = fixture().await;
        let source = MockVotes::default();
        source.add_vote("GV1", "100");
        source.add_vote("GV2", "250.5");

        let delegatable = Asset::credit("AQUA", ISSUER);
        let delegated = Asset::credit("UPVOTE", ISSUER);
        let loader = loader(&source, &fx, delegatable, delegated);
        assert_eq!(loader.load().await.unwrap(), 2);

        let rows = fx
            .votes
            .for_market_on(Utc::now().date_naive(), MARKET)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| !r.is_delegated && !r.has_delegation));
    }

    #[tokio::test]
    async fn delegated_votes_expand_to_delegators() {
        let fx = fixture().await;
        let delegatable = Asset::credit("AQUA", ISSUER);
        let delegated = Asset::credit("UPVOTE", ISSUER);
        let date = Utc::now().date_naive();

        // The aggregator holds 300 delegated votes against the market.
        fx.balances
            .insert(
                &cb("01", &delegated, AGGREGATOR, 300),
                &[claimant(AGGREGATOR), claimant(MARKET)],
            )
            .await
            .unwrap();
        // Three delegators of 100 each.
        for (i, delegator) in ["GD1", "GD2", "GD3"].iter().enumerate() {
            fx.balances
                .insert(
                    &cb(&format!("1{i}"), &delegatable, delegator, 100),
                    &[claimant(MARKER), claimant(AGGREGATOR)],
                )
                .await
                .unwrap();
        }

        let source = MockVotes::default();
        source.add_vote(AGGREGATOR, "300");
        let loader = loader(&source, &fx, delegatable, delegated);
        assert_eq!(loader.load().await.unwrap(), 4);

        let rows = fx.votes.for_market_on(date, MARKET).await.unwrap();
        let placeholder = rows
            .iter()
            .find(|r| r.voting_account == AGGREGATOR && r.has_delegation)
            .unwrap();
        assert_eq!(placeholder.votes_value, BigDecimal::from(300));
        // No own-stake remainder: the tracker value equals the inflows.
        assert!(!rows
            .iter()
            .any(|r| r.voting_account == AGGREGATOR && !r.has_delegation));
        let delegator_rows: Vec<_> = rows.iter().filter(|r| r.is_delegated).collect();
        assert_eq!(delegator_rows.len(), 3);
        assert!(delegator_rows
            .iter()
            .all(|r| r.votes_value == BigDecimal::from(100)));
    }

    #[tokio::test]
    async fn aggregator_own_stake_is_paid_separately() {
        let fx = fixture().await;
        let delegatable = Asset::credit("AQUA", ISSUER);
        let delegated = Asset::credit("UPVOTE", ISSUER);
        let date = Utc::now().date_naive();

        fx.balances
            .insert(
                &cb("01", &delegated, AGGREGATOR, 300),
                &[claimant(AGGREGATOR), claimant(MARKET)],
            )
            .await
            .unwrap();
        for (i, delegator) in ["GD1", "GD2", "GD3"].iter().enumerate() {
            fx.balances
                .insert(
                    &cb(&format!("1{i}"), &delegatable, delegator, 100),
                    &[claimant(MARKER), claimant(AGGREGATOR)],
                )
                .await
                .unwrap();
        }

        let source = MockVotes::default();
        source.add_vote(AGGREGATOR, "500");
        let loader = loader(&source, &fx, delegatable, delegated);
        assert_eq!(loader.load().await.unwrap(), 5);

        let rows = fx.votes.for_market_on(date, MARKET).await.unwrap();
        let own = rows
            .iter()
            .find(|r| r.voting_account == AGGREGATOR && !r.has_delegation && !r.is_delegated)
            .unwrap();
        assert_eq!(own.votes_value, BigDecimal::from(200));
    }

    #[tokio::test]
    async fn delegated_amounts_round_down() {
        let fx = fixture().await;
        let delegatable = Asset::credit("AQUA", ISSUER);
        let delegated = Asset::credit("UPVOTE", ISSUER);

        fx.balances
            .insert(
                &cb("01", &delegated, AGGREGATOR, 100),
                &[claimant(AGGREGATOR), claimant(MARKET)],
            )
            .await
            .unwrap();
        let mut inflow = cb("11", &delegatable, "GD1", 0);
        inflow.amount = BigDecimal::from_str("99.99999995").unwrap();
        fx.balances
            .insert(&inflow, &[claimant(MARKER), claimant(AGGREGATOR)])
            .await
            .unwrap();

        let source = MockVotes::default();
        source.add_vote(AGGREGATOR, "100");
        let loader = loader(&source, &fx, delegatable, delegated);
        loader.load().await.unwrap();

        let rows = fx
            .votes
            .for_market_on(Utc::now().date_naive(), MARKET)
            .await
            .unwrap();
        let delegated_row = rows.iter().find(|r| r.is_delegated).unwrap();
        assert_eq!(
            delegated_row.votes_value,
            BigDecimal::from_str("99.9999999").unwrap()
        );
    }
}
