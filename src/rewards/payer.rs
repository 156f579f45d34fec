// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Proportional reward payment with at-most-once semantics per voter and
//! bribe.
//!
//! Payout rows are the ledger of truth: a success row blocks any further
//! payment to that voter for the bribe, a failure row with a known
//! transient code allows a retry, and any other failure poisons the voter
//! for this bribe. Timed-out submissions park as `timeout` rows until the
//! transaction hash can be resolved one way or the other.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::model::{Payout, PayoutStatus, PayoutStore, VoteSnapshot};
use crate::bribes::model::AggregatedBribe;
use crate::ledger::error::Error as LedgerError;
use crate::ledger::meta::result_codes_from_xdr;
use crate::ledger::tx::{Signer, SignedEnvelope, TxBuilder, MAX_OPERATIONS};
use crate::ledger::LedgerProvider;
use crate::utils::{amount_epsilon, round_down, round_up, short_key};

/// How long a timed-out submission rests before its hash is checked.
pub const RESOLVE_DELAY_MINUTES: i64 = 5;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PaySummary {
    pub paid: u64,
    pub failed: u64,
    pub pages: u32,
    pub deadline_hit: bool,
}

pub struct RewardPayer<'a, P> {
    provider: &'a P,
    payouts: &'a PayoutStore,
    signer: &'a Signer,
    house_wallet: String,
    bribe: AggregatedBribe,
    /// Amount to distribute this tick.
    reward_amount: BigDecimal,
    stop_at: Option<DateTime<Utc>>,
    network_passphrase: String,
    base_fee: u32,
}

impl<'a, P: LedgerProvider> RewardPayer<'a, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: &'a P,
        payouts: &'a PayoutStore,
        signer: &'a Signer,
        house_wallet: &str,
        bribe: AggregatedBribe,
        reward_amount: BigDecimal,
        stop_at: Option<DateTime<Utc>>,
        network_passphrase: &str,
        base_fee: u32,
    ) -> Self {
        Self {
            provider,
            payouts,
            signer,
            house_wallet: house_wallet.to_string(),
            bribe,
            reward_amount,
            stop_at,
            network_passphrase: network_passphrase.to_string(),
            base_fee,
        }
    }

    /// Pay the candidate snapshots their proportional share. The share is
    /// computed against the total stake of all candidates, so voters
    /// excluded later (already paid, poisoned, dust) do not inflate the
    /// others.
    pub async fn pay(&self, candidates: &[VoteSnapshot]) -> anyhow::Result<PaySummary> {
        let mut summary = PaySummary::default();
        if self.reward_amount <= BigDecimal::from(0) {
            return Ok(summary);
        }

        self.resolve_timeouts().await?;

        let total_votes: BigDecimal = candidates.iter().map(|v| v.votes_value.clone()).sum();
        if total_votes <= BigDecimal::from(0) {
            return Ok(summary);
        }

        // A stake below this would round to a zero payout.
        let min_votes = round_up(&(amount_epsilon() * &total_votes / &self.reward_amount));
        let eligible: Vec<&VoteSnapshot> = candidates
            .iter()
            .filter(|v| v.votes_value >= min_votes)
            .collect();
        debug!(
            bribe = self.bribe.id,
            candidates = candidates.len(),
            eligible = eligible.len(),
            total = %total_votes,
            "paying reward"
        );

        loop {
            if let Some(stop_at) = self.stop_at {
                if Utc::now() > stop_at {
                    summary.deadline_hit = true;
                    break;
                }
            }

            let excluded = self.payouts.excluded_snapshot_ids(self.bribe.id).await?;
            let page: Vec<&VoteSnapshot> = eligible
                .iter()
                .filter(|v| !excluded.contains(&v.id))
                .take(MAX_OPERATIONS)
                .copied()
                .collect();
            if page.is_empty() {
                break;
            }

            self.process_page(&page, &total_votes, &mut summary).await?;
            summary.pages += 1;

            // A page that settled nothing (every row still retryable)
            // would repeat forever within this tick; leave it to the next
            // one.
            let now_excluded = self.payouts.excluded_snapshot_ids(self.bribe.id).await?;
            if now_excluded.len() == excluded.len() {
                break;
            }
        }

        info!(
            bribe = self.bribe.id,
            paid = summary.paid,
            failed = summary.failed,
            pages = summary.pages,
            "pay pass finished"
        );
        Ok(summary)
    }

    /// Check every rested timeout hash: include it as a success or clear
    /// the rows so the voters become payable again.
    async fn resolve_timeouts(&self) -> anyhow::Result<()> {
        let cutoff = Utc::now() - Duration::minutes(RESOLVE_DELAY_MINUTES);
        for hash in self.payouts.timeout_hashes(self.bribe.id, cutoff).await? {
            match self.provider.get_transaction(&hash).await {
                Ok(tx) if tx.successful == Some(true) => {
                    let resolved = self.payouts.mark_hash_success(&hash).await?;
                    info!(bribe = self.bribe.id, %hash, resolved, "timeout resolved as success");
                }
                Ok(_) => {
                    self.payouts.delete_by_hash(&hash).await?;
                    info!(bribe = self.bribe.id, %hash, "timeout resolved as dropped");
                }
                Err(LedgerError::NotFound) => {
                    self.payouts.delete_by_hash(&hash).await?;
                    info!(bribe = self.bribe.id, %hash, "timeout hash unknown, cleared");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn payout_row(&self, snapshot: &VoteSnapshot, total_votes: &BigDecimal) -> Payout {
        let amount = round_down(&(&self.reward_amount * &snapshot.votes_value / total_votes));
        let now = Utc::now();
        Payout {
            id: 0,
            bribe_id: self.bribe.id,
            vote_snapshot_id: snapshot.id,
            asset: self.bribe.asset.clone(),
            reward_amount: Some(amount),
            stellar_transaction_id: String::new(),
            status: PayoutStatus::Success,
            message: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn build_envelope(
        &self,
        page: &[&VoteSnapshot],
        rows: &[Payout],
    ) -> Result<SignedEnvelope, LedgerError> {
        let account = self.provider.get_account(&self.house_wallet).await?;
        let sequence: i64 = account
            .sequence
            .parse()
            .map_err(|_| LedgerError::invalid("account sequence", account.sequence.clone()))?;
        let mut builder = TxBuilder::new(
            &self.house_wallet,
            sequence,
            self.base_fee,
            &self.network_passphrase,
        )?;
        builder.set_memo_text(&format!("Bribe: {}", short_key(&self.bribe.market_key)))?;
        for (snapshot, row) in page.iter().zip(rows) {
            let amount = row
                .reward_amount
                .as_ref()
                .expect("payout rows always carry an amount");
            builder.add_payment(&snapshot.voting_account, &self.bribe.asset, amount)?;
        }
        builder.build_and_sign(self.signer)
    }

    async fn process_page(
        &self,
        page: &[&VoteSnapshot],
        total_votes: &BigDecimal,
        summary: &mut PaySummary,
    ) -> anyhow::Result<()> {
        let mut rows: Vec<Payout> = page
            .iter()
            .map(|snapshot| self.payout_row(snapshot, total_votes))
            .collect();
        let envelope = self.build_envelope(page, &rows).await?;

        match self.provider.submit(&envelope).await {
            Ok(response) if response.is_successful() => {
                for row in &mut rows {
                    row.stellar_transaction_id = response.hash.clone();
                }
                summary.paid += self.payouts.insert_batch(&rows).await?;
            }
            // Accepted by the gateway but rejected by the ledger: the raw
            // result carries the codes a problem document would.
            Ok(response) => {
                let codes = response
                    .result_xdr
                    .as_deref()
                    .and_then(|raw| result_codes_from_xdr(raw).ok());
                match codes.as_ref().and_then(|c| c.operations.clone()) {
                    Some(op_codes) => {
                        // Operations that succeeded inside a failed
                        // transaction did not happen on-ledger and are not
                        // recorded.
                        let mut failed = Vec::new();
                        for (row, code) in rows.into_iter().zip(op_codes) {
                            if code != crate::ledger::types::OP_SUCCESS {
                                let mut row = row;
                                row.status = PayoutStatus::Failed;
                                row.message = code;
                                failed.push(row);
                            }
                        }
                        summary.failed += self.payouts.insert_batch(&failed).await?;
                    }
                    None => {
                        let reason = codes
                            .and_then(|c| c.transaction)
                            .unwrap_or_else(|| "transaction failed".to_string());
                        for row in &mut rows {
                            row.stellar_transaction_id = envelope.hash.clone();
                            row.status = PayoutStatus::Failed;
                            row.message = reason.clone();
                        }
                        summary.failed += self.payouts.insert_batch(&rows).await?;
                    }
                }
            }
            Err(e) if e.is_timeout_pending() => {
                warn!(bribe = self.bribe.id, error = %e, "submission timed out");
                for row in &mut rows {
                    row.stellar_transaction_id = envelope.hash.clone();
                    row.status = PayoutStatus::Failed;
                    row.message = "timeout".into();
                }
                summary.failed += self.payouts.insert_batch(&rows).await?;
            }
            Err(e) if e.is_retryable() => {
                // Plain transport trouble: nothing reached the ledger,
                // nothing is recorded, the next tick retries.
                warn!(bribe = self.bribe.id, error = %e, "submission deferred");
            }
            Err(e) => match e.result_codes().and_then(|c| c.operations.clone()) {
                Some(op_codes) => {
                    // Operations that succeeded inside a failed transaction
                    // did not happen on-ledger and are not recorded.
                    let mut failed = Vec::new();
                    for (row, code) in rows.into_iter().zip(op_codes) {
                        if code != crate::ledger::types::OP_SUCCESS {
                            let mut row = row;
                            row.status = PayoutStatus::Failed;
                            row.message = code;
                            failed.push(row);
                        }
                    }
                    summary.failed += self.payouts.insert_batch(&failed).await?;
                }
                None => {
                    let reason = e
                        .result_codes()
                        .and_then(|c| c.transaction.clone())
                        .unwrap_or_else(|| e.to_string());
                    for row in &mut rows {
                        row.stellar_transaction_id = envelope.hash.clone();
                        row.status = PayoutStatus::Failed;
                        row.message = reason.clone();
                    }
                    summary.failed += self.payouts.insert_batch(&rows).await?;
                }
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bribes::model::{AggregatedBribe, AggregatedBribeStore, BribeStore};
    use crate::db::open_memory;
    use crate::ledger::Asset;
    use crate::rewards::model::VoteSnapshotStore;
    use crate::test_utils::{test_address, test_secret, MockLedger, SubmitScript};
    use chrono::NaiveDate;
    use sqlx::SqlitePool;
    use std::str::FromStr;

    const ISSUER: &str = "GBNZILSTVQZ4R7IKQDGHYGY2QXL5QOFJYQMXPKWRRM5PAV7Y4M67AQUA";
    const MARKET: &str = "GBPF7NLFCYGZNHU6HS64ZGTE4YCRLAWTLFGOMFTHQ3WSUUFIGOSQFPJT";
    const PASSPHRASE: &str = "Test SDF Network ; September 2015";

    struct Fixture {
        pool: SqlitePool,
        payouts: PayoutStore,
        votes: VoteSnapshotStore,
        ledger: MockLedger,
        signer: Signer,
        house: String,
        bribe: AggregatedBribe,
    }

    async fn fixture(asset: Asset, total_reward: &str) -> Fixture {
        let pool = open_memory().await.unwrap();
        let start = Utc::now() - Duration::days(1);
        let bribe = AggregatedBribe {
            id: 0,
            market_key: MARKET.into(),
            asset,
            start_at: start,
            stop_at: start + Duration::days(7),
            total_reward_amount: BigDecimal::from_str(total_reward).unwrap(),
            reward_equivalent: BigDecimal::from(0),
            created_at: start,
            updated_at: start,
        };
        BribeStore::new(pool.clone())
            .upsert_market_key(MARKET)
            .await
            .unwrap();
        AggregatedBribeStore::new(pool.clone())
            .insert_batch(&[bribe])
            .await
            .unwrap();
        let bribe = AggregatedBribeStore::new(pool.clone())
            .all()
            .await
            .unwrap()
            .pop()
            .unwrap();
        Fixture {
            payouts: PayoutStore::new(pool.clone()),
            votes: VoteSnapshotStore::new(pool.clone()),
            pool,
            ledger: MockLedger::default(),
            signer: Signer::from_secret(&test_secret(1)).unwrap(),
            house: test_address(1),
            bribe,
        }
    }

    async fn seed_votes(fx: &Fixture, stakes: &[(String, &str)]) -> Vec<VoteSnapshot> {
        let date: NaiveDate = Utc::now().date_naive();
        let snapshots: Vec<VoteSnapshot> = stakes
            .iter()
            .map(|(account, value)| VoteSnapshot {
                id: 0,
                market_key: MARKET.into(),
                voting_account: account.clone(),
                votes_value: BigDecimal::from_str(value).unwrap(),
                snapshot_time: date,
                is_delegated: false,
                has_delegation: false,
            })
            .collect();
        fx.votes.insert_batch(&snapshots).await.unwrap();
        fx.votes.for_market_on(date, MARKET).await.unwrap()
    }

    fn payer<'a>(fx: &'a Fixture, reward_amount: BigDecimal) -> RewardPayer<'a, MockLedger> {
        RewardPayer::new(
            &fx.ledger,
            &fx.payouts,
            &fx.signer,
            &fx.house,
            fx.bribe.clone(),
            reward_amount,
            None,
            PASSPHRASE,
            200_000,
        )
    }

    /// Ten flat voters split an hourly share of the pool, rounded down.
    #[tokio::test]
    async fn flat_voters_split_the_tick_amount() {
        let fx = fixture(Asset::credit("ZZZ", ISSUER), "100000").await;
        let stakes: Vec<(String, &str)> =
            (0..10u8).map(|i| (test_address(10 + i), "100")).collect();
        let candidates = seed_votes(&fx, &stakes).await;

        // One hour's slice of the daily amount.
        let reward_amount = fx.bribe.daily_amount() / BigDecimal::from(24);
        let summary = payer(&fx, reward_amount.clone()).pay(&candidates).await.unwrap();

        assert_eq!(summary.paid, 10);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.pages, 1);

        let rows = fx.payouts.for_bribe(fx.bribe.id).await.unwrap();
        assert_eq!(rows.len(), 10);
        let expected = crate::utils::round_down(&(&reward_amount / BigDecimal::from(10)));
        let mut paid_total = BigDecimal::from(0);
        for row in &rows {
            assert_eq!(row.status, PayoutStatus::Success);
            assert_eq!(row.reward_amount.clone().unwrap(), expected);
            assert_eq!(row.stellar_transaction_id.len(), 64);
            paid_total += row.reward_amount.clone().unwrap();
        }
        assert!(paid_total <= reward_amount);
        // One transaction with one payment per voter and the bribe memo.
        assert_eq!(fx.ledger.submissions().len(), 1);
        assert_eq!(fx.ledger.submissions()[0].operations, 10);
    }

    #[tokio::test]
    async fn a_second_tick_pays_nobody_twice() {
        let fx = fixture(Asset::credit("ZZZ", ISSUER), "100000").await;
        let stakes: Vec<(String, &str)> =
            (0..3u8).map(|i| (test_address(10 + i), "100")).collect();
        let candidates = seed_votes(&fx, &stakes).await;

        let reward_amount = fx.bribe.daily_amount();
        assert_eq!(
            payer(&fx, reward_amount.clone())
                .pay(&candidates)
                .await
                .unwrap()
                .paid,
            3
        );
        let second = payer(&fx, reward_amount).pay(&candidates).await.unwrap();
        assert_eq!(second.paid, 0);
        assert_eq!(second.pages, 0);
        assert_eq!(fx.payouts.for_bribe(fx.bribe.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unknown_op_failures_poison_only_their_voter() {
        let fx = fixture(Asset::credit("ZZZ", ISSUER), "100000").await;
        let stakes: Vec<(String, &str)> =
            (0..3u8).map(|i| (test_address(10 + i), "100")).collect();
        let candidates = seed_votes(&fx, &stakes).await;

        fx.ledger.script_submit(SubmitScript::Failure {
            status: 400,
            transaction: Some("tx_failed".into()),
            operations: Some(vec![
                "op_success".into(),
                "op_no_trust".into(),
                "op_success".into(),
            ]),
        });

        let summary = payer(&fx, fx.bribe.daily_amount()).pay(&candidates).await.unwrap();
        // The second submission (default success) pays the two survivors.
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.paid, 2);

        let rows = fx.payouts.for_bribe(fx.bribe.id).await.unwrap();
        let poisoned: Vec<_> = rows
            .iter()
            .filter(|r| r.status == PayoutStatus::Failed)
            .collect();
        assert_eq!(poisoned.len(), 1);
        assert_eq!(poisoned[0].message, "op_no_trust");
        // Ops that "succeeded" inside the failed transaction left no rows.
        assert_eq!(rows.len(), 3);

        // The poisoned voter stays excluded on later ticks.
        let again = payer(&fx, fx.bribe.daily_amount()).pay(&candidates).await.unwrap();
        assert_eq!(again.paid, 0);
    }

    #[tokio::test]
    async fn accepted_but_unsuccessful_pages_categorize_per_operation() {
        let fx = fixture(Asset::credit("ZZZ", ISSUER), "100000").await;
        let stakes: Vec<(String, &str)> = (0..2u8).map(|i| (test_address(10 + i), "100")).collect();
        let candidates = seed_votes(&fx, &stakes).await;

        // HTTP 200, successful = false: the real per-operation codes come
        // out of the raw result, not a blanket message.
        fx.ledger.script_submit(SubmitScript::Unsuccessful {
            result_xdr: Some(crate::test_utils::failed_ops_result(&[
                "op_success",
                "op_no_trust",
            ])),
        });

        let summary = payer(&fx, fx.bribe.daily_amount()).pay(&candidates).await.unwrap();
        assert_eq!(summary.failed, 1);
        // The voter whose operation "succeeded" in the failed transaction
        // was not paid on-ledger and is paid by the next page.
        assert_eq!(summary.paid, 1);

        let rows = fx.payouts.for_bribe(fx.bribe.id).await.unwrap();
        assert_eq!(rows.len(), 2);
        let poisoned = rows
            .iter()
            .find(|r| r.status == PayoutStatus::Failed)
            .unwrap();
        assert_eq!(poisoned.message, "op_no_trust");

        // The poisoned voter stays excluded on later ticks.
        assert_eq!(
            payer(&fx, fx.bribe.daily_amount())
                .pay(&candidates)
                .await
                .unwrap()
                .paid,
            0
        );
    }

    #[tokio::test]
    async fn accepted_but_unsuccessful_retryable_codes_stay_retryable() {
        let fx = fixture(Asset::credit("ZZZ", ISSUER), "100000").await;
        let stakes: Vec<(String, &str)> = (0..2u8).map(|i| (test_address(10 + i), "100")).collect();
        let candidates = seed_votes(&fx, &stakes).await;

        fx.ledger.script_submit(SubmitScript::Unsuccessful {
            result_xdr: Some(crate::test_utils::failed_tx_result("tx_insufficient_fee")),
        });

        let summary = payer(&fx, fx.bribe.daily_amount()).pay(&candidates).await.unwrap();
        assert_eq!(summary.paid, 0);
        assert_eq!(summary.failed, 2);
        let rows = fx.payouts.for_bribe(fx.bribe.id).await.unwrap();
        assert!(rows.iter().all(|r| r.message == "tx_insufficient_fee"));

        // A transaction-level fee shortage does not poison anybody: the
        // next tick pays both voters.
        let retry = payer(&fx, fx.bribe.daily_amount()).pay(&candidates).await.unwrap();
        assert_eq!(retry.paid, 2);
    }

    #[tokio::test]
    async fn timeouts_park_rows_until_resolution() {
        let fx = fixture(Asset::credit("ZZZ", ISSUER), "100000").await;
        let stakes: Vec<(String, &str)> = (0..2u8).map(|i| (test_address(10 + i), "100")).collect();
        let candidates = seed_votes(&fx, &stakes).await;

        fx.ledger.script_submit(SubmitScript::Timeout);
        let summary = payer(&fx, fx.bribe.daily_amount()).pay(&candidates).await.unwrap();
        assert_eq!(summary.paid, 0);
        assert_eq!(summary.failed, 2);

        let rows = fx.payouts.for_bribe(fx.bribe.id).await.unwrap();
        assert!(rows.iter().all(|r| r.message == "timeout"));
        let parked_hash = rows[0].stellar_transaction_id.clone();
        assert_eq!(parked_hash.len(), 64);

        // Fresh timeout rows shield the voters from double payment.
        let retry = payer(&fx, fx.bribe.daily_amount()).pay(&candidates).await.unwrap();
        assert_eq!(retry.paid, 0);

        // Age the rows past the resolve delay; the hash turns out to have
        // made it on-ledger after all.
        sqlx::query("UPDATE payouts SET created_at = ?1")
            .bind(Utc::now() - Duration::minutes(10))
            .execute(&fx.pool)
            .await
            .unwrap();
        fx.ledger.add_transaction(crate::ledger::types::TransactionResponse {
            hash: parked_hash.clone(),
            successful: Some(true),
            ledger: Some(1),
            result_meta_xdr: None,
            result_xdr: None,
        });

        let resolved = payer(&fx, fx.bribe.daily_amount()).pay(&candidates).await.unwrap();
        assert_eq!(resolved.paid, 0);
        let rows = fx.payouts.for_bribe(fx.bribe.id).await.unwrap();
        assert!(rows.iter().all(|r| r.status == PayoutStatus::Success));
    }

    #[tokio::test]
    async fn unresolvable_timeouts_free_the_voters() {
        let fx = fixture(Asset::credit("ZZZ", ISSUER), "100000").await;
        let stakes: Vec<(String, &str)> = (0..2u8).map(|i| (test_address(10 + i), "100")).collect();
        let candidates = seed_votes(&fx, &stakes).await;

        fx.ledger.script_submit(SubmitScript::Timeout);
        payer(&fx, fx.bribe.daily_amount()).pay(&candidates).await.unwrap();
        sqlx::query("UPDATE payouts SET created_at = ?1")
            .bind(Utc::now() - Duration::minutes(10))
            .execute(&fx.pool)
            .await
            .unwrap();

        // The hash is unknown to the ledger: rows vanish and both voters
        // are paid by the fresh submission.
        let summary = payer(&fx, fx.bribe.daily_amount()).pay(&candidates).await.unwrap();
        assert_eq!(summary.paid, 2);
        let rows = fx.payouts.for_bribe(fx.bribe.id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.status == PayoutStatus::Success));
    }

    #[tokio::test]
    async fn dust_voters_are_skipped() {
        let fx = fixture(Asset::credit("ZZZ", ISSUER), "700").await;
        // daily_amount = 100; the whale holds virtually all votes.
        let whale = test_address(10);
        let dust = test_address(11);
        let candidates = seed_votes(
            &fx,
            &[(whale.clone(), "100000000"), (dust.clone(), "0.0000001")],
        )
        .await;

        let summary = payer(&fx, fx.bribe.daily_amount()).pay(&candidates).await.unwrap();
        assert_eq!(summary.paid, 1);

        let rows = fx.payouts.for_bribe(fx.bribe.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        // The whale's share still reflects the dust voter's stake in the
        // denominator.
        assert!(rows[0].reward_amount.clone().unwrap() <= fx.bribe.daily_amount());
    }

    #[tokio::test]
    async fn the_soft_deadline_stops_the_run() {
        let fx = fixture(Asset::credit("ZZZ", ISSUER), "100000").await;
        let stakes: Vec<(String, &str)> = (0..2u8).map(|i| (test_address(10 + i), "100")).collect();
        let candidates = seed_votes(&fx, &stakes).await;

        let payer = RewardPayer::new(
            &fx.ledger,
            &fx.payouts,
            &fx.signer,
            &fx.house,
            fx.bribe.clone(),
            fx.bribe.daily_amount(),
            Some(Utc::now() - Duration::seconds(1)),
            PASSPHRASE,
            200_000,
        );
        let summary = payer.pay(&candidates).await.unwrap();
        assert!(summary.deadline_hit);
        assert_eq!(summary.paid, 0);
        assert!(fx.ledger.submissions().is_empty());
    }

    #[tokio::test]
    async fn more_than_a_page_of_voters_takes_two_transactions() {
        let fx = fixture(Asset::credit("ZZZ", ISSUER), "10000000").await;
        let stakes: Vec<(String, &str)> = (0..120u8)
            .map(|i| (test_address(100 + i), "100"))
            .collect();
        let candidates = seed_votes(&fx, &stakes).await;
        assert_eq!(candidates.len(), 120);

        let summary = payer(&fx, fx.bribe.daily_amount()).pay(&candidates).await.unwrap();
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.paid, 120);
        let submissions = fx.ledger.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].operations, 100);
        assert_eq!(submissions[1].operations, 20);
    }
}
