// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Wire records of the Horizon REST API, limited to the fields this
//! service reads. Everything else in the responses is ignored.

use serde::{Deserialize, Serialize};

/// A single page of an `_embedded.records` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(rename = "_embedded")]
    pub embedded: Embedded<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Embedded<T> {
    pub records: Vec<T>,
}

impl<T> Page<T> {
    pub fn into_records(self) -> Vec<T> {
        self.embedded.records
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimableBalanceRecord {
    pub id: String,
    pub paging_token: String,
    /// `native` or `CODE:ISSUER`.
    pub asset: String,
    pub amount: String,
    #[serde(default)]
    pub sponsor: Option<String>,
    pub claimants: Vec<ClaimantRecord>,
    #[serde(default)]
    pub last_modified_time: Option<String>,
    #[serde(default)]
    pub last_modified_ledger: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimantRecord {
    pub destination: String,
    pub predicate: Predicate,
}

/// A claim predicate in its Horizon JSON form. The tree is preserved as-is
/// so it can be cached and compared without loss.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unconditional: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_before_epoch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<Predicate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<Predicate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<Predicate>>,
}

impl Predicate {
    pub fn unconditional() -> Self {
        Predicate {
            unconditional: Some(true),
            ..Default::default()
        }
    }

    pub fn not(inner: Predicate) -> Self {
        Predicate {
            not: Some(Box::new(inner)),
            ..Default::default()
        }
    }

    pub fn before_absolute_time(abs_before: &str, epoch: i64) -> Self {
        Predicate {
            abs_before: Some(abs_before.to_string()),
            abs_before_epoch: Some(epoch.to_string()),
            ..Default::default()
        }
    }

    /// The reject-all marker `not(unconditional)` used on the market-key
    /// claimant of a well-formed bribe.
    pub fn is_reject_all(&self) -> bool {
        *self == Predicate::not(Predicate::unconditional())
    }

    /// The unlock time of a `not(before_absolute_time(T))` predicate.
    pub fn unlock_time(&self) -> Option<&str> {
        self.not.as_deref().and_then(|p| p.abs_before.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountRecord {
    pub account_id: String,
    #[serde(default)]
    pub sequence: String,
    #[serde(default)]
    pub balances: Vec<BalanceRecord>,
    #[serde(default)]
    pub paging_token: Option<String>,
}

impl AccountRecord {
    pub fn balance_of(&self, asset: &super::asset::Asset) -> Option<&BalanceRecord> {
        self.balances.iter().find(|b| b.matches(asset))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceRecord {
    pub balance: String,
    pub asset_type: String,
    #[serde(default)]
    pub asset_code: Option<String>,
    #[serde(default)]
    pub asset_issuer: Option<String>,
}

impl BalanceRecord {
    pub fn matches(&self, asset: &super::asset::Asset) -> bool {
        if asset.is_native() {
            return self.asset_type == "native";
        }
        self.asset_code.as_deref() == Some(asset.code())
            && self.asset_issuer.as_deref() == Some(asset.issuer())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathRecord {
    pub source_amount: String,
    pub destination_amount: String,
    #[serde(default)]
    pub path: Vec<PathAssetRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathAssetRecord {
    pub asset_type: String,
    #[serde(default)]
    pub asset_code: Option<String>,
    #[serde(default)]
    pub asset_issuer: Option<String>,
}

impl PathAssetRecord {
    pub fn to_asset(&self) -> super::asset::Asset {
        if self.asset_type == "native" {
            super::asset::Asset::Native
        } else {
            super::asset::Asset::credit(
                self.asset_code.as_deref().unwrap_or_default(),
                self.asset_issuer.as_deref().unwrap_or_default(),
            )
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionResponse {
    pub hash: String,
    #[serde(default)]
    pub successful: Option<bool>,
    #[serde(default)]
    pub ledger: Option<u64>,
    #[serde(default)]
    pub result_meta_xdr: Option<String>,
    #[serde(default)]
    pub result_xdr: Option<String>,
}

impl TransactionResponse {
    /// Horizon omits `successful` on some submission responses; absence
    /// means the transaction was accepted.
    pub fn is_successful(&self) -> bool {
        self.successful.unwrap_or(true)
    }
}

/// `extras.result_codes` of a failed submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultCodes {
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub operations: Option<Vec<String>>,
}

pub const OP_SUCCESS: &str = "op_success";

impl ResultCodes {
    pub fn failure_reason(&self) -> Option<String> {
        if let Some(operations) = &self.operations {
            if let Some(code) = operations.iter().find(|c| *c != OP_SUCCESS) {
                return Some(code.clone());
            }
        }
        self.transaction.clone()
    }
}

/// The `problem+json` document Horizon returns on errors.
#[derive(Debug, Clone, Deserialize)]
pub struct Problem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub extras: Option<ProblemExtras>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProblemExtras {
    #[serde(default)]
    pub result_codes: Option<ResultCodes>,
    #[serde(default)]
    pub hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_all_marker_is_detected() {
        let raw = r#"{"not": {"unconditional": true}}"#;
        let predicate: Predicate = serde_json::from_str(raw).unwrap();
        assert!(predicate.is_reject_all());

        let unconditional: Predicate = serde_json::from_str(r#"{"unconditional": true}"#).unwrap();
        assert!(!unconditional.is_reject_all());

        let timed: Predicate =
            serde_json::from_str(r#"{"not": {"abs_before": "2022-02-21T00:00:00Z"}}"#).unwrap();
        assert!(!timed.is_reject_all());
    }

    #[test]
    fn unlock_time_reads_not_abs_before() {
        let raw = r#"{"not": {"abs_before": "2022-02-21T00:00:00Z", "abs_before_epoch": "1645401600"}}"#;
        let predicate: Predicate = serde_json::from_str(raw).unwrap();
        assert_eq!(predicate.unlock_time(), Some("2022-02-21T00:00:00Z"));
        assert!(Predicate::unconditional().unlock_time().is_none());
    }

    #[test]
    fn predicate_wire_form_round_trips() {
        let raw = r#"{"not":{"unconditional":true}}"#;
        let predicate: Predicate = serde_json::from_str(raw).unwrap();
        assert_eq!(serde_json::to_string(&predicate).unwrap(), raw);
    }

    #[test]
    fn result_codes_fall_back_to_transaction() {
        let codes: ResultCodes =
            serde_json::from_str(r#"{"transaction": "tx_insufficient_fee"}"#).unwrap();
        assert_eq!(codes.failure_reason().as_deref(), Some("tx_insufficient_fee"));
    }

    #[test]
    fn page_decodes_embedded_records() {
        let raw = r#"{"_embedded": {"records": [{"balance": "1.0000000", "asset_type": "native"}]}}"#;
        let page: Page<BalanceRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(page.into_records().len(), 1);
    }
}
