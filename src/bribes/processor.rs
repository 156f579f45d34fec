// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Claim, convert and return bribes with atomic multi-operation
//! transactions, and account for the exact amounts they moved.
//!
//! Submission failures fall into three buckets: safe-to-retry races and
//! gateway timeouts leave the bribe untouched for the next tick, a missing
//! conversion path parks it for refund, and everything else is terminal
//! with the reason appended to the bribe's message.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{info, warn};

use super::model::{Bribe, BribeStatus, BribeStore, EPOCH_DAYS};
use crate::ledger::error::Error as LedgerError;
use crate::ledger::meta::{last_op_balance_deltas, result_codes_from_xdr};
use crate::ledger::tx::{Signer, TxBuilder};
use crate::ledger::types::TransactionResponse;
use crate::ledger::{Asset, LedgerProvider};

/// Submission codes that indicate a race, not a defect; the same
/// transaction may be retried verbatim later.
const SAFE_RETRY_CODES: [&str; 2] = ["tx_bad_seq", "tx_bad_auth"];

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("no path for conversion")]
    NoPathForConversion,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// The submitted claim transaction and whether it carried a conversion
/// operation at the end.
pub struct ClaimOutcome {
    pub response: TransactionResponse,
    pub converted: bool,
}

pub struct BribeProcessor<'a, P> {
    provider: &'a P,
    store: &'a BribeStore,
    signer: Signer,
    house_wallet: String,
    reward_asset: Asset,
    conversion_amount: BigDecimal,
    network_passphrase: String,
    base_fee: u32,
    epoch_duration: Duration,
}

impl<'a, P: LedgerProvider> BribeProcessor<'a, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: &'a P,
        store: &'a BribeStore,
        signer: Signer,
        house_wallet: &str,
        reward_asset: Asset,
        conversion_amount: BigDecimal,
        network_passphrase: &str,
        base_fee: u32,
    ) -> Self {
        Self {
            provider,
            store,
            signer,
            house_wallet: house_wallet.to_string(),
            reward_asset,
            conversion_amount,
            network_passphrase: network_passphrase.to_string(),
            base_fee,
            epoch_duration: Duration::days(EPOCH_DAYS),
        }
    }

    pub fn with_duration(mut self, epoch_duration: Duration) -> Self {
        self.epoch_duration = epoch_duration;
        self
    }

    async fn builder(&self) -> Result<TxBuilder, LedgerError> {
        let account = self.provider.get_account(&self.house_wallet).await?;
        let sequence: i64 = account
            .sequence
            .parse()
            .map_err(|_| LedgerError::invalid("account sequence", account.sequence.clone()))?;
        TxBuilder::new(
            &self.house_wallet,
            sequence,
            self.base_fee,
            &self.network_passphrase,
        )
    }

    async fn has_trustline(&self, asset: &Asset) -> Result<bool, LedgerError> {
        let account = self.provider.get_account(&self.house_wallet).await?;
        Ok(account.balance_of(asset).is_some())
    }

    async fn append_claim(
        &self,
        builder: &mut TxBuilder,
        bribe: &Bribe,
    ) -> Result<(), LedgerError> {
        if !bribe.asset.is_native() && !self.has_trustline(&bribe.asset).await? {
            builder.add_change_trust(&bribe.asset)?;
        }
        builder.add_claim_claimable_balance(&bribe.claimable_balance_id)
    }

    async fn append_convert(
        &self,
        builder: &mut TxBuilder,
        bribe: &Bribe,
    ) -> Result<(), ProcessError> {
        let paths = self
            .provider
            .strict_receive_paths(&bribe.asset, &self.reward_asset, &self.conversion_amount)
            .await?;
        let Some(quote) = paths.first() else {
            return Err(ProcessError::NoPathForConversion);
        };
        let hops: Vec<Asset> = quote.path.iter().map(|a| a.to_asset()).collect();
        builder.add_path_payment_strict_receive(
            &self.house_wallet,
            &bribe.asset,
            &bribe.amount,
            &self.reward_asset,
            &self.conversion_amount,
            &hops,
        )?;
        Ok(())
    }

    /// Claim the balance and convert the fixed reward portion in one
    /// transaction. Pledges already in the reward asset skip the conversion
    /// when they cover it, and cannot be accepted when they do not.
    pub async fn claim_and_convert(&self, bribe: &Bribe) -> Result<ClaimOutcome, ProcessError> {
        let mut builder = self.builder().await?;
        self.append_claim(&mut builder, bribe).await?;
        if bribe.asset == self.reward_asset {
            if bribe.amount < self.conversion_amount {
                return Err(ProcessError::NoPathForConversion);
            }
        } else {
            self.append_convert(&mut builder, bribe).await?;
        }
        let converted = builder.last_op_is_path_payment();
        let envelope = builder.build_and_sign(&self.signer)?;
        let response = self.provider.submit(&envelope).await?;
        if !response.is_successful() {
            return Err(ProcessError::Ledger(unsuccessful(&response)));
        }
        Ok(ClaimOutcome {
            response,
            converted,
        })
    }

    /// Claim the balance and pay it straight back to the sponsor.
    pub async fn claim_and_return(
        &self,
        bribe: &Bribe,
    ) -> Result<TransactionResponse, ProcessError> {
        let mut builder = self.builder().await?;
        self.append_claim(&mut builder, bribe).await?;
        builder.add_payment(&bribe.sponsor, &bribe.asset, &bribe.amount)?;
        let envelope = builder.build_and_sign(&self.signer)?;
        let response = self.provider.submit(&envelope).await?;
        if !response.is_successful() {
            return Err(ProcessError::Ledger(unsuccessful(&response)));
        }
        Ok(response)
    }

    /// Record the conversion hash and split the claimed amount into the
    /// payable pool and the converted reward portion.
    pub async fn process_response(
        &self,
        bribe: &mut Bribe,
        outcome: &ClaimOutcome,
    ) -> Result<(), ProcessError> {
        bribe.conversion_tx_hash = Some(outcome.response.hash.clone());

        if !outcome.converted {
            bribe.amount_for_bribes = Some(&bribe.amount - &self.conversion_amount);
            bribe.amount_reward = Some(self.conversion_amount.clone());
            return Ok(());
        }

        let meta = match &outcome.response.result_meta_xdr {
            Some(meta) => meta.clone(),
            None => self
                .provider
                .get_transaction(&outcome.response.hash)
                .await?
                .result_meta_xdr
                .ok_or_else(|| {
                    LedgerError::invalid("result meta", outcome.response.hash.clone())
                })?,
        };

        let deltas = last_op_balance_deltas(&meta, &self.house_wallet)?;
        let spent = deltas
            .get(&bribe.asset)
            .map(|d| d.spent())
            .ok_or_else(|| LedgerError::invalid("result meta", "no source asset change"))?;
        let received = deltas
            .get(&self.reward_asset)
            .map(|d| d.received())
            .ok_or_else(|| LedgerError::invalid("result meta", "no reward asset change"))?;
        bribe.amount_for_bribes = Some(&bribe.amount - &spent);
        bribe.amount_reward = Some(received);
        Ok(())
    }

    /// One pass over all unlocked pending bribes; repeated until a pass
    /// makes no progress, so transient races do not stall the whole batch.
    pub async fn run_claims(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut claimed = 0;
        loop {
            let ready = self.store.ready_to_claim(now).await?;
            if ready.is_empty() {
                break;
            }
            let mut progressed = false;
            for bribe in ready {
                if self.process_claim(bribe, now).await? {
                    progressed = true;
                    claimed += 1;
                }
            }
            if !progressed {
                break;
            }
        }
        Ok(claimed)
    }

    /// Returns whether the bribe's status changed.
    async fn process_claim(&self, mut bribe: Bribe, now: DateTime<Utc>) -> anyhow::Result<bool> {
        match self.claim_and_convert(&bribe).await {
            Ok(outcome) => {
                self.process_response(&mut bribe, &outcome).await?;
                bribe.update_active_period(Some(now), self.epoch_duration);
                bribe.status = BribeStatus::Active;
                self.store.update(&bribe).await?;
                info!(%bribe, asset = %bribe.asset.short(), "bribe activated");
                Ok(true)
            }
            Err(ProcessError::NoPathForConversion) => {
                bribe.status = BribeStatus::NoPathForConversion;
                self.store.update(&bribe).await?;
                info!(%bribe, asset = %bribe.asset.short(), "no conversion path");
                Ok(true)
            }
            Err(ProcessError::Ledger(e)) if is_safe_to_retry(&e) => {
                warn!(%bribe, error = %e, "claim deferred");
                Ok(false)
            }
            Err(ProcessError::Ledger(e)) => {
                bribe.append_message(&e.failure_reason().unwrap_or_else(|| e.to_string()));
                bribe.status = BribeStatus::FailedClaim;
                self.store.update(&bribe).await?;
                warn!(%bribe, error = %e, "claim failed");
                Ok(true)
            }
        }
    }

    /// Give unconvertible and malformed-but-unlocked bribes back to their
    /// sponsors.
    pub async fn run_returns(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut returned = 0;
        for mut bribe in self.store.ready_to_return(now).await? {
            match self.claim_and_return(&bribe).await {
                Ok(response) => {
                    bribe.refund_tx_hash = Some(response.hash.clone());
                    bribe.status = BribeStatus::Returned;
                    self.store.update(&bribe).await?;
                    info!(%bribe, "bribe returned");
                    returned += 1;
                }
                Err(ProcessError::Ledger(e)) if is_safe_to_retry(&e) => {
                    warn!(%bribe, error = %e, "return deferred");
                }
                Err(e) => {
                    let reason = match &e {
                        ProcessError::Ledger(e) => {
                            e.failure_reason().unwrap_or_else(|| e.to_string())
                        }
                        other => other.to_string(),
                    };
                    bribe.append_message(&reason);
                    bribe.status = BribeStatus::FailedReturn;
                    self.store.update(&bribe).await?;
                    warn!(%bribe, error = %e, "return failed");
                }
            }
        }
        Ok(returned)
    }
}

fn is_safe_to_retry(error: &LedgerError) -> bool {
    if error.is_retryable() || error.is_timeout_pending() {
        return true;
    }
    error
        .failure_reason()
        .is_some_and(|code| SAFE_RETRY_CODES.contains(&code.as_str()))
}

/// A submission the gateway accepted but the ledger rejected. Decoding the
/// raw result gives the same codes an error-status response would carry,
/// so the caller's categorization applies unchanged.
fn unsuccessful(response: &TransactionResponse) -> LedgerError {
    let result_codes = response
        .result_xdr
        .as_deref()
        .and_then(|raw| result_codes_from_xdr(raw).ok());
    LedgerError::Status {
        status: 200,
        summary: "transaction not successful".into(),
        result_codes,
    }
}
