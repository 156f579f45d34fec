// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The seam between the engines and the ledger. Production code talks to
//! Horizon through [`super::horizon::HorizonClient`]; tests drive the same
//! engines against a scripted provider.

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use super::asset::Asset;
use super::error::Error;
use super::tx::SignedEnvelope;
use super::types::{AccountRecord, ClaimableBalanceRecord, PathRecord, TransactionResponse};

#[async_trait]
pub trait LedgerProvider: Send + Sync {
    async fn get_account(&self, address: &str) -> Result<AccountRecord, Error>;

    /// Claimable balances a claimant may claim, in `paging_token` order.
    async fn claimable_balances_for_claimant(
        &self,
        claimant: &str,
        cursor: Option<&str>,
        limit: u32,
        ascending: bool,
    ) -> Result<Vec<ClaimableBalanceRecord>, Error>;

    /// Claimable balances holding a given asset, optionally narrowed to a
    /// claimant, ascending.
    async fn claimable_balances_for_asset(
        &self,
        asset: &Asset,
        claimant: Option<&str>,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ClaimableBalanceRecord>, Error>;

    /// Accounts with a trustline to `asset`, ascending.
    async fn accounts_holding(
        &self,
        asset: &Asset,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Vec<AccountRecord>, Error>;

    /// Quotes delivering exactly `dest_amount` of `dest`.
    async fn strict_receive_paths(
        &self,
        source: &Asset,
        dest: &Asset,
        dest_amount: &BigDecimal,
    ) -> Result<Vec<PathRecord>, Error>;

    /// Quotes spending exactly `source_amount` of `source`.
    async fn strict_send_paths(
        &self,
        source: &Asset,
        source_amount: &BigDecimal,
        dest: &Asset,
    ) -> Result<Vec<PathRecord>, Error>;

    async fn submit(&self, envelope: &SignedEnvelope) -> Result<TransactionResponse, Error>;

    async fn get_transaction(&self, hash: &str) -> Result<TransactionResponse, Error>;
}
