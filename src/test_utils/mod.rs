// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Scripted collaborators for engine tests: an in-memory ledger provider
//! and a canned vote source.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;

use crate::ledger::error::Error;
use crate::ledger::provider::LedgerProvider;
use crate::ledger::tx::SignedEnvelope;
use crate::ledger::types::{
    AccountRecord, BalanceRecord, ClaimableBalanceRecord, PathRecord, PathAssetRecord,
    ResultCodes, TransactionResponse,
};
use crate::ledger::Asset;
use crate::rewards::votes_loader::{RawVote, VoteSource, VotesPage};

/// What the next `submit` call should do.
#[derive(Debug, Clone)]
pub enum SubmitScript {
    /// Accepted; optionally with result meta attached to the response.
    Success { meta: Option<String> },
    /// Accepted by the gateway but `successful = false`, with the raw
    /// result attached the way Horizon reports an on-ledger failure.
    Unsuccessful { result_xdr: Option<String> },
    /// Rejected with result codes.
    Failure {
        status: u16,
        transaction: Option<String>,
        operations: Option<Vec<String>>,
    },
    /// Gateway timeout; the transaction may or may not have made it.
    Timeout,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, AccountRecord>,
    claimables: Vec<ClaimableBalanceRecord>,
    holders: Vec<AccountRecord>,
    receive_paths: HashMap<(String, String), Vec<PathRecord>>,
    send_paths: HashMap<(String, String), Vec<PathRecord>>,
    submit_script: VecDeque<SubmitScript>,
    submissions: Vec<SignedEnvelope>,
    transactions: HashMap<String, TransactionResponse>,
}

/// An in-memory ledger. Submissions succeed unless scripted otherwise and
/// are recorded for inspection.
#[derive(Default)]
pub struct MockLedger {
    inner: Mutex<Inner>,
}

impl MockLedger {
    pub fn add_account(&self, account: AccountRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.accounts.insert(account.account_id.clone(), account);
    }

    pub fn add_claimable_balance(&self, record: ClaimableBalanceRecord) {
        self.inner.lock().unwrap().claimables.push(record);
    }

    pub fn add_holder(&self, account: AccountRecord) {
        self.inner.lock().unwrap().holders.push(account);
    }

    pub fn add_receive_path(&self, source: &Asset, dest: &Asset, hops: Vec<Asset>) {
        let record = PathRecord {
            source_amount: "0".into(),
            destination_amount: "0".into(),
            path: hops
                .iter()
                .map(|a| PathAssetRecord {
                    asset_type: a.horizon_type().into(),
                    asset_code: (!a.is_native()).then(|| a.code().to_string()),
                    asset_issuer: (!a.is_native()).then(|| a.issuer().to_string()),
                })
                .collect(),
        };
        self.inner
            .lock()
            .unwrap()
            .receive_paths
            .entry((source.to_horizon(), dest.to_horizon()))
            .or_default()
            .push(record);
    }

    pub fn add_send_path(&self, source: &Asset, dest: &Asset, destination_amount: &str) {
        let record = PathRecord {
            source_amount: "0".into(),
            destination_amount: destination_amount.into(),
            path: Vec::new(),
        };
        self.inner
            .lock()
            .unwrap()
            .send_paths
            .entry((source.to_horizon(), dest.to_horizon()))
            .or_default()
            .push(record);
    }

    pub fn script_submit(&self, script: SubmitScript) {
        self.inner.lock().unwrap().submit_script.push_back(script);
    }

    pub fn add_transaction(&self, response: TransactionResponse) {
        let mut inner = self.inner.lock().unwrap();
        inner.transactions.insert(response.hash.clone(), response);
    }

    pub fn submissions(&self) -> Vec<SignedEnvelope> {
        self.inner.lock().unwrap().submissions.clone()
    }
}

fn page_after<'a, T, F: Fn(&T) -> &str>(
    items: &'a [T],
    cursor: Option<&str>,
    limit: u32,
    token: F,
) -> Vec<&'a T> {
    items
        .iter()
        .filter(|item| match cursor {
            Some(cursor) => token(item) > cursor,
            None => true,
        })
        .take(limit as usize)
        .collect()
}

#[async_trait]
impl LedgerProvider for MockLedger {
    async fn get_account(&self, address: &str) -> Result<AccountRecord, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.accounts.get(address).cloned().unwrap_or_else(|| {
            AccountRecord {
                account_id: address.to_string(),
                sequence: "100".into(),
                balances: Vec::new(),
                paging_token: None,
            }
        }))
    }

    async fn claimable_balances_for_claimant(
        &self,
        claimant: &str,
        cursor: Option<&str>,
        limit: u32,
        _ascending: bool,
    ) -> Result<Vec<ClaimableBalanceRecord>, Error> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<ClaimableBalanceRecord> = inner
            .claimables
            .iter()
            .filter(|r| r.claimants.iter().any(|c| c.destination == claimant))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.paging_token.cmp(&b.paging_token));
        Ok(page_after(&matching, cursor, limit, |r| &r.paging_token)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn claimable_balances_for_asset(
        &self,
        asset: &Asset,
        claimant: Option<&str>,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ClaimableBalanceRecord>, Error> {
        let inner = self.inner.lock().unwrap();
        let horizon = asset.to_horizon();
        let mut matching: Vec<ClaimableBalanceRecord> = inner
            .claimables
            .iter()
            .filter(|r| r.asset == horizon)
            .filter(|r| match claimant {
                Some(claimant) => r.claimants.iter().any(|c| c.destination == claimant),
                None => true,
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.paging_token.cmp(&b.paging_token));
        Ok(page_after(&matching, cursor, limit, |r| &r.paging_token)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn accounts_holding(
        &self,
        asset: &Asset,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Vec<AccountRecord>, Error> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<AccountRecord> = inner
            .holders
            .iter()
            .filter(|a| a.balance_of(asset).is_some())
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        Ok(page_after(&matching, cursor, limit, |a| &a.account_id)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn strict_receive_paths(
        &self,
        source: &Asset,
        dest: &Asset,
        _dest_amount: &BigDecimal,
    ) -> Result<Vec<PathRecord>, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .receive_paths
            .get(&(source.to_horizon(), dest.to_horizon()))
            .cloned()
            .unwrap_or_default())
    }

    async fn strict_send_paths(
        &self,
        source: &Asset,
        _source_amount: &BigDecimal,
        dest: &Asset,
    ) -> Result<Vec<PathRecord>, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .send_paths
            .get(&(source.to_horizon(), dest.to_horizon()))
            .cloned()
            .unwrap_or_default())
    }

    async fn submit(&self, envelope: &SignedEnvelope) -> Result<TransactionResponse, Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.submissions.push(envelope.clone());
        let script = inner
            .submit_script
            .pop_front()
            .unwrap_or(SubmitScript::Success { meta: None });
        match script {
            SubmitScript::Success { meta } => {
                let response = TransactionResponse {
                    hash: envelope.hash.clone(),
                    successful: Some(true),
                    ledger: Some(1),
                    result_meta_xdr: meta,
                    result_xdr: None,
                };
                inner
                    .transactions
                    .insert(response.hash.clone(), response.clone());
                Ok(response)
            }
            SubmitScript::Unsuccessful { result_xdr } => {
                let response = TransactionResponse {
                    hash: envelope.hash.clone(),
                    successful: Some(false),
                    ledger: Some(1),
                    result_meta_xdr: None,
                    result_xdr,
                };
                inner
                    .transactions
                    .insert(response.hash.clone(), response.clone());
                Ok(response)
            }
            SubmitScript::Failure {
                status,
                transaction,
                operations,
            } => Err(Error::Status {
                status,
                summary: "transaction failed".into(),
                result_codes: Some(ResultCodes {
                    transaction,
                    operations,
                }),
            }),
            SubmitScript::Timeout => Err(Error::Status {
                status: 504,
                summary: "gateway timeout".into(),
                result_codes: None,
            }),
        }
    }

    async fn get_transaction(&self, hash: &str) -> Result<TransactionResponse, Error> {
        let inner = self.inner.lock().unwrap();
        inner.transactions.get(hash).cloned().ok_or(Error::NotFound)
    }
}

/// An account record holding `balance` of `asset`, as the holder listing
/// returns it.
pub fn holder_account(account_id: &str, asset: &Asset, balance: &str) -> AccountRecord {
    AccountRecord {
        account_id: account_id.to_string(),
        sequence: "1".into(),
        balances: vec![
            BalanceRecord {
                balance: "10.0000000".into(),
                asset_type: "native".into(),
                asset_code: None,
                asset_issuer: None,
            },
            BalanceRecord {
                balance: balance.to_string(),
                asset_type: asset.horizon_type().into(),
                asset_code: Some(asset.code().to_string()),
                asset_issuer: Some(asset.issuer().to_string()),
            },
        ],
        paging_token: Some(account_id.to_string()),
    }
}

/// Canned vote source paging a fixed vote list.
#[derive(Default)]
pub struct MockVotes {
    votes: Mutex<Vec<RawVote>>,
}

impl MockVotes {
    pub fn add_vote(&self, account: &str, value: &str) {
        self.votes.lock().unwrap().push(RawVote {
            voting_account: account.to_string(),
            votes_value: value.to_string(),
        });
    }
}

#[async_trait]
impl VoteSource for MockVotes {
    async fn votes(
        &self,
        _market_key: &str,
        _timestamp: i64,
        page: u32,
        limit: u32,
    ) -> Result<VotesPage, Error> {
        let votes = self.votes.lock().unwrap();
        let start = ((page.max(1) - 1) * limit) as usize;
        let results = votes
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(VotesPage {
            results,
            count: votes.len() as u64,
        })
    }
}

/// A raw transaction result that failed at the transaction level, e.g.
/// `tx_bad_seq`, base64-encoded the way `result_xdr` carries it.
pub fn failed_tx_result(code: &str) -> String {
    use stellar_xdr::curr as xdr;
    use stellar_xdr::curr::{Limits, WriteXdr};

    let result = match code {
        "tx_bad_seq" => xdr::TransactionResultResult::TxBadSeq,
        "tx_bad_auth" => xdr::TransactionResultResult::TxBadAuth,
        "tx_insufficient_fee" => xdr::TransactionResultResult::TxInsufficientFee,
        "tx_insufficient_balance" => xdr::TransactionResultResult::TxInsufficientBalance,
        "tx_too_late" => xdr::TransactionResultResult::TxTooLate,
        other => panic!("unscripted transaction code {other}"),
    };
    xdr::TransactionResult {
        fee_charged: 0,
        result,
        ext: xdr::TransactionResultExt::V0,
    }
    .to_xdr_base64(Limits::none())
    .unwrap()
}

/// A raw `tx_failed` result with one payment-shaped result per code,
/// base64-encoded.
pub fn failed_ops_result(op_codes: &[&str]) -> String {
    use stellar_xdr::curr as xdr;
    use stellar_xdr::curr::{Limits, WriteXdr};

    let ops: Vec<xdr::OperationResult> = op_codes
        .iter()
        .map(|code| {
            let payment = match *code {
                "op_success" => xdr::PaymentResult::Success,
                "op_underfunded" => xdr::PaymentResult::Underfunded,
                "op_no_trust" => xdr::PaymentResult::NoTrust,
                "op_line_full" => xdr::PaymentResult::LineFull,
                "op_no_destination" => xdr::PaymentResult::NoDestination,
                other => panic!("unscripted operation code {other}"),
            };
            xdr::OperationResult::OpInner(xdr::OperationResultTr::Payment(payment))
        })
        .collect();
    xdr::TransactionResult {
        fee_charged: 0,
        result: xdr::TransactionResultResult::TxFailed(ops.try_into().unwrap()),
        ext: xdr::TransactionResultExt::V0,
    }
    .to_xdr_base64(Limits::none())
    .unwrap()
}

/// Deterministic ed25519 identities for tests.
pub fn test_secret(seed: u8) -> String {
    stellar_strkey::ed25519::PrivateKey([seed; 32]).to_string()
}

pub fn test_address(seed: u8) -> String {
    let key = ed25519_dalek::SigningKey::from_bytes(&[seed; 32]);
    stellar_strkey::ed25519::PublicKey(key.verifying_key().to_bytes()).to_string()
}

/// Result meta whose last operation moved the given balances of `account`:
/// one `(asset, pre, post)` triple per touched trustline or, for the
/// native asset, account entry.
pub fn conversion_meta(account: &str, moves: &[(Asset, &str, &str)]) -> String {
    use crate::ledger::tx::{account_id, amount_to_stroops};
    use stellar_xdr::curr as xdr;
    use stellar_xdr::curr::{Limits, WriteXdr};

    fn entry(account: &str, asset: &Asset, balance: &str) -> xdr::LedgerEntry {
        let balance = amount_to_stroops(&balance.parse::<BigDecimal>().unwrap()).unwrap();
        let data = match asset.to_xdr().unwrap() {
            xdr::Asset::Native => xdr::LedgerEntryData::Account(xdr::AccountEntry {
                account_id: account_id(account).unwrap(),
                balance,
                seq_num: xdr::SequenceNumber(1),
                num_sub_entries: 0,
                inflation_dest: None,
                flags: 0,
                home_domain: Default::default(),
                thresholds: xdr::Thresholds([1, 0, 0, 0]),
                signers: Default::default(),
                ext: xdr::AccountEntryExt::V0,
            }),
            xdr::Asset::CreditAlphanum4(a) => {
                xdr::LedgerEntryData::Trustline(xdr::TrustLineEntry {
                    account_id: account_id(account).unwrap(),
                    asset: xdr::TrustLineAsset::CreditAlphanum4(a),
                    balance,
                    limit: i64::MAX,
                    flags: 1,
                    ext: xdr::TrustLineEntryExt::V0,
                })
            }
            xdr::Asset::CreditAlphanum12(a) => {
                xdr::LedgerEntryData::Trustline(xdr::TrustLineEntry {
                    account_id: account_id(account).unwrap(),
                    asset: xdr::TrustLineAsset::CreditAlphanum12(a),
                    balance,
                    limit: i64::MAX,
                    flags: 1,
                    ext: xdr::TrustLineEntryExt::V0,
                })
            }
        };
        xdr::LedgerEntry {
            last_modified_ledger_seq: 1,
            data,
            ext: xdr::LedgerEntryExt::V0,
        }
    }

    let mut changes = Vec::new();
    for (asset, pre, post) in moves {
        changes.push(xdr::LedgerEntryChange::State(entry(account, asset, pre)));
        changes.push(xdr::LedgerEntryChange::Updated(entry(account, asset, post)));
    }
    let meta = xdr::TransactionMeta::V1(xdr::TransactionMetaV1 {
        tx_changes: xdr::LedgerEntryChanges(Vec::new().try_into().unwrap()),
        operations: vec![xdr::OperationMeta {
            changes: xdr::LedgerEntryChanges(changes.try_into().unwrap()),
        }]
        .try_into()
        .unwrap(),
    });
    meta.to_xdr_base64(Limits::none()).unwrap()
}

/// A well-formed bribe claimable balance as Horizon would list it.
pub fn bribe_record(
    id: &str,
    house: &str,
    market: &str,
    asset: &Asset,
    amount: &str,
    unlock_rfc3339: &str,
) -> ClaimableBalanceRecord {
    use crate::ledger::types::{ClaimantRecord, Predicate};
    ClaimableBalanceRecord {
        id: id.to_string(),
        paging_token: id.to_string(),
        asset: asset.to_horizon(),
        amount: amount.to_string(),
        sponsor: Some("GSPONSOR".to_string()),
        claimants: vec![
            ClaimantRecord {
                destination: house.to_string(),
                predicate: Predicate::not(Predicate::before_absolute_time(
                    unlock_rfc3339,
                    chrono::DateTime::parse_from_rfc3339(unlock_rfc3339)
                        .map(|t| t.timestamp())
                        .unwrap_or_default(),
                )),
            },
            ClaimantRecord {
                destination: market.to_string(),
                predicate: Predicate::not(Predicate::unconditional()),
            },
        ],
        last_modified_time: Some(Utc::now().to_rfc3339()),
        last_modified_ledger: 1,
    }
}
