// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Decoding of transaction results: the pre and post balances of one
//! account across the last operation of a transaction (from the result
//! meta), and the string result codes of a failed submission (from the
//! result itself).
//!
//! A path payment reports the exact amounts it moved only through the
//! ledger-entry changes it produced, so the engines read those instead of
//! trusting any quoted price.

use std::collections::HashMap;

use bigdecimal::BigDecimal;
use stellar_xdr::curr as xdr;
use stellar_xdr::curr::{Limits, ReadXdr};

use super::asset::Asset;
use super::error::Error;
use super::tx::{account_to_string, stroops_to_amount};
use super::types::{ResultCodes, OP_SUCCESS};

/// Balance movement of a single asset: the balance before the operation
/// and after it.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceDelta {
    pub pre: BigDecimal,
    pub post: BigDecimal,
}

impl BalanceDelta {
    /// Amount the balance dropped by; negative when it grew.
    pub fn spent(&self) -> BigDecimal {
        &self.pre - &self.post
    }

    /// Amount the balance grew by; negative when it dropped.
    pub fn received(&self) -> BigDecimal {
        &self.post - &self.pre
    }
}

/// Decode `result_meta_xdr` and collect the balance movements of `account`
/// in the final operation.
pub fn last_op_balance_deltas(
    meta_base64: &str,
    account: &str,
) -> Result<HashMap<Asset, BalanceDelta>, Error> {
    let meta = xdr::TransactionMeta::from_xdr_base64(meta_base64, Limits::none())?;
    let changes = match &meta {
        xdr::TransactionMeta::V1(m) => last_op_changes(m.operations.as_slice()),
        xdr::TransactionMeta::V2(m) => last_op_changes(m.operations.as_slice()),
        xdr::TransactionMeta::V3(m) => last_op_changes(m.operations.as_slice()),
        _ => None,
    };
    let Some(changes) = changes else {
        return Ok(HashMap::new());
    };

    let mut pre: HashMap<Asset, BigDecimal> = HashMap::new();
    let mut post: HashMap<Asset, BigDecimal> = HashMap::new();
    for change in changes.0.as_slice() {
        match change {
            xdr::LedgerEntryChange::State(entry) => {
                if let Some((asset, balance)) = entry_balance(entry, account) {
                    pre.entry(asset).or_insert(balance);
                }
            }
            xdr::LedgerEntryChange::Updated(entry) | xdr::LedgerEntryChange::Created(entry) => {
                if let Some((asset, balance)) = entry_balance(entry, account) {
                    post.insert(asset, balance);
                }
            }
            _ => {}
        }
    }

    let mut deltas = HashMap::new();
    for (asset, post_balance) in post {
        let pre_balance = pre.remove(&asset).unwrap_or_else(|| BigDecimal::from(0));
        deltas.insert(
            asset,
            BalanceDelta {
                pre: pre_balance,
                post: post_balance,
            },
        );
    }
    // Entries that only appear in the pre-image were removed outright.
    for (asset, pre_balance) in pre {
        deltas.insert(
            asset,
            BalanceDelta {
                pre: pre_balance,
                post: BigDecimal::from(0),
            },
        );
    }
    Ok(deltas)
}

fn last_op_changes(operations: &[xdr::OperationMeta]) -> Option<&xdr::LedgerEntryChanges> {
    operations.last().map(|op| &op.changes)
}

/// Decode `result_xdr` into the same shape as `extras.result_codes`, for
/// responses that come back accepted but not successful and therefore
/// carry no problem document.
pub fn result_codes_from_xdr(result_base64: &str) -> Result<ResultCodes, Error> {
    let result = xdr::TransactionResult::from_xdr_base64(result_base64, Limits::none())?;
    Ok(result_codes(&result.result))
}

fn result_codes(result: &xdr::TransactionResultResult) -> ResultCodes {
    use xdr::TransactionResultResult::*;
    let (transaction, operations) = match result {
        TxSuccess(ops) => ("tx_success", Some(ops)),
        TxFailed(ops) => ("tx_failed", Some(ops)),
        TxTooEarly => ("tx_too_early", None),
        TxTooLate => ("tx_too_late", None),
        TxMissingOperation => ("tx_missing_operation", None),
        TxBadSeq => ("tx_bad_seq", None),
        TxBadAuth => ("tx_bad_auth", None),
        TxInsufficientBalance => ("tx_insufficient_balance", None),
        TxNoAccount => ("tx_no_source_account", None),
        TxInsufficientFee => ("tx_insufficient_fee", None),
        TxBadAuthExtra => ("tx_bad_auth_extra", None),
        TxInternalError => ("tx_internal_error", None),
        TxNotSupported => ("tx_not_supported", None),
        TxBadSponsorship => ("tx_bad_sponsorship", None),
        TxBadMinSeqAgeOrGap => ("tx_bad_min_seq_age_or_gap", None),
        TxMalformed => ("tx_malformed", None),
        // Fee bumps and anything newer than this mapping.
        _ => ("tx_failed", None),
    };
    ResultCodes {
        transaction: Some(transaction.to_string()),
        operations: operations
            .map(|ops| ops.as_slice().iter().map(operation_code).collect()),
    }
}

/// The Horizon-style code of one operation result. Covers the operation
/// families this service submits; anything else reports a generic
/// failure.
fn operation_code(result: &xdr::OperationResult) -> String {
    let code = match result {
        xdr::OperationResult::OpInner(inner) => match inner {
            xdr::OperationResultTr::Payment(r) => payment_code(r),
            xdr::OperationResultTr::PathPaymentStrictReceive(r) => path_payment_code(r),
            xdr::OperationResultTr::ChangeTrust(r) => change_trust_code(r),
            xdr::OperationResultTr::ClaimClaimableBalance(r) => claim_balance_code(r),
            _ => "op_failed",
        },
        xdr::OperationResult::OpBadAuth => "op_bad_auth",
        xdr::OperationResult::OpNoAccount => "op_no_account",
        xdr::OperationResult::OpNotSupported => "op_not_supported",
        xdr::OperationResult::OpTooManySubentries => "op_too_many_subentries",
        xdr::OperationResult::OpExceededWorkLimit => "op_exceeded_work_limit",
        xdr::OperationResult::OpTooManySponsoring => "op_too_many_sponsoring",
    };
    code.to_string()
}

fn payment_code(result: &xdr::PaymentResult) -> &'static str {
    use xdr::PaymentResult::*;
    match result {
        Success => OP_SUCCESS,
        Malformed => "op_malformed",
        Underfunded => "op_underfunded",
        SrcNoTrust => "op_src_no_trust",
        SrcNotAuthorized => "op_src_not_authorized",
        NoDestination => "op_no_destination",
        NoTrust => "op_no_trust",
        NotAuthorized => "op_not_authorized",
        LineFull => "op_line_full",
        NoIssuer => "op_no_issuer",
    }
}

fn path_payment_code(result: &xdr::PathPaymentStrictReceiveResult) -> &'static str {
    use xdr::PathPaymentStrictReceiveResult::*;
    match result {
        Success(_) => OP_SUCCESS,
        Malformed => "op_malformed",
        Underfunded => "op_underfunded",
        SrcNoTrust => "op_src_no_trust",
        SrcNotAuthorized => "op_src_not_authorized",
        NoDestination => "op_no_destination",
        NoTrust => "op_no_trust",
        NotAuthorized => "op_not_authorized",
        LineFull => "op_line_full",
        NoIssuer(_) => "op_no_issuer",
        TooFewOffers => "op_too_few_offers",
        OfferCrossSelf => "op_cross_self",
        OverSendmax => "op_over_source_max",
    }
}

fn change_trust_code(result: &xdr::ChangeTrustResult) -> &'static str {
    use xdr::ChangeTrustResult::*;
    match result {
        Success => OP_SUCCESS,
        Malformed => "op_malformed",
        NoIssuer => "op_no_issuer",
        InvalidLimit => "op_invalid_limit",
        LowReserve => "op_low_reserve",
        SelfNotAllowed => "op_self_not_allowed",
        TrustLineMissing => "op_trust_line_missing",
        CannotDelete => "op_cannot_delete",
        NotAuthMaintainLiabilities => "op_not_auth_maintain_liabilities",
    }
}

fn claim_balance_code(result: &xdr::ClaimClaimableBalanceResult) -> &'static str {
    use xdr::ClaimClaimableBalanceResult::*;
    match result {
        Success => OP_SUCCESS,
        DoesNotExist => "op_does_not_exist",
        CannotClaim => "op_cannot_claim",
        LineFull => "op_line_full",
        NoTrust => "op_no_trust",
        NotAuthorized => "op_not_authorized",
    }
}

fn entry_balance(entry: &xdr::LedgerEntry, account: &str) -> Option<(Asset, BigDecimal)> {
    match &entry.data {
        xdr::LedgerEntryData::Account(data) => {
            (account_to_string(&data.account_id) == account)
                .then(|| (Asset::Native, stroops_to_amount(data.balance)))
        }
        xdr::LedgerEntryData::Trustline(data) => {
            if account_to_string(&data.account_id) != account {
                return None;
            }
            Asset::from_trust_line_xdr(&data.asset)
                .map(|asset| (asset, stroops_to_amount(data.balance)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::tx::{account_id, amount_to_stroops};
    use std::str::FromStr;
    use stellar_xdr::curr::WriteXdr;

    const HOUSE: &str = "GBPF7NLFCYGZNHU6HS64ZGTE4YCRLAWTLFGOMFTHQ3WSUUFIGOSQFPJT";
    const ISSUER: &str = "GBNZILSTVQZ4R7IKQDGHYGY2QXL5QOFJYQMXPKWRRM5PAV7Y4M67AQUA";

    fn trustline_entry(account: &str, asset: &Asset, balance: &str) -> xdr::LedgerEntry {
        let line = match asset.to_xdr().unwrap() {
            xdr::Asset::CreditAlphanum4(a) => xdr::TrustLineAsset::CreditAlphanum4(a),
            xdr::Asset::CreditAlphanum12(a) => xdr::TrustLineAsset::CreditAlphanum12(a),
            xdr::Asset::Native => xdr::TrustLineAsset::Native,
        };
        xdr::LedgerEntry {
            last_modified_ledger_seq: 1,
            data: xdr::LedgerEntryData::Trustline(xdr::TrustLineEntry {
                account_id: account_id(account).unwrap(),
                asset: line,
                balance: amount_to_stroops(&BigDecimal::from_str(balance).unwrap()).unwrap(),
                limit: i64::MAX,
                flags: 1,
                ext: xdr::TrustLineEntryExt::V0,
            }),
            ext: xdr::LedgerEntryExt::V0,
        }
    }

    fn meta_with_last_op_changes(changes: Vec<xdr::LedgerEntryChange>) -> String {
        let op = xdr::OperationMeta {
            changes: xdr::LedgerEntryChanges(changes.try_into().unwrap()),
        };
        let meta = xdr::TransactionMeta::V1(xdr::TransactionMetaV1 {
            tx_changes: xdr::LedgerEntryChanges(vec![].try_into().unwrap()),
            operations: vec![
                xdr::OperationMeta {
                    changes: xdr::LedgerEntryChanges(vec![].try_into().unwrap()),
                },
                op,
            ]
            .try_into()
            .unwrap(),
        });
        meta.to_xdr_base64(Limits::none()).unwrap()
    }

    #[test]
    fn deltas_cover_both_assets_of_a_conversion() {
        let xxx = Asset::credit("XXX", ISSUER);
        let aqua = Asset::credit("AQUA", ISSUER);
        let meta = meta_with_last_op_changes(vec![
            xdr::LedgerEntryChange::State(trustline_entry(HOUSE, &xxx, "100")),
            xdr::LedgerEntryChange::Updated(trustline_entry(HOUSE, &xxx, "96.9696969")),
            xdr::LedgerEntryChange::State(trustline_entry(HOUSE, &aqua, "0")),
            xdr::LedgerEntryChange::Updated(trustline_entry(HOUSE, &aqua, "1")),
            // Somebody else's trustline moved in the same operation.
            xdr::LedgerEntryChange::State(trustline_entry(ISSUER, &xxx, "5")),
            xdr::LedgerEntryChange::Updated(trustline_entry(ISSUER, &xxx, "8.0303031")),
        ]);

        let deltas = last_op_balance_deltas(&meta, HOUSE).unwrap();
        assert_eq!(deltas.len(), 2);
        assert_eq!(
            deltas[&xxx].spent(),
            BigDecimal::from_str("3.0303031").unwrap()
        );
        assert_eq!(deltas[&aqua].received(), BigDecimal::from(1));
    }

    #[test]
    fn result_codes_decode_from_result_xdr() {
        let ops: Vec<xdr::OperationResult> = vec![
            xdr::OperationResult::OpInner(xdr::OperationResultTr::Payment(
                xdr::PaymentResult::Success,
            )),
            xdr::OperationResult::OpInner(xdr::OperationResultTr::Payment(
                xdr::PaymentResult::NoTrust,
            )),
        ];
        let result = xdr::TransactionResult {
            fee_charged: 200,
            result: xdr::TransactionResultResult::TxFailed(ops.try_into().unwrap()),
            ext: xdr::TransactionResultExt::V0,
        };
        let raw = result.to_xdr_base64(Limits::none()).unwrap();

        let codes = result_codes_from_xdr(&raw).unwrap();
        assert_eq!(codes.transaction.as_deref(), Some("tx_failed"));
        assert_eq!(
            codes.operations.clone().unwrap(),
            vec!["op_success", "op_no_trust"]
        );
        assert_eq!(codes.failure_reason().as_deref(), Some("op_no_trust"));
    }

    #[test]
    fn transaction_level_codes_have_no_operations() {
        let result = xdr::TransactionResult {
            fee_charged: 0,
            result: xdr::TransactionResultResult::TxBadSeq,
            ext: xdr::TransactionResultExt::V0,
        };
        let raw = result.to_xdr_base64(Limits::none()).unwrap();

        let codes = result_codes_from_xdr(&raw).unwrap();
        assert_eq!(codes.transaction.as_deref(), Some("tx_bad_seq"));
        assert!(codes.operations.is_none());
        assert_eq!(codes.failure_reason().as_deref(), Some("tx_bad_seq"));
    }

    #[test]
    fn missing_pre_image_counts_from_zero() {
        let aqua = Asset::credit("AQUA", ISSUER);
        let meta = meta_with_last_op_changes(vec![xdr::LedgerEntryChange::Created(
            trustline_entry(HOUSE, &aqua, "2.5"),
        )]);
        let deltas = last_op_balance_deltas(&meta, HOUSE).unwrap();
        assert_eq!(
            deltas[&aqua].received(),
            BigDecimal::from_str("2.5").unwrap()
        );
    }
}
