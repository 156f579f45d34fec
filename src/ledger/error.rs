// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

use super::types::ResultCodes;

/// Categorized failures of the ledger gateway.
///
/// Transport problems and rate limiting are retryable as-is. Gateway
/// timeouts (502/504/522) are special: the submitted transaction may still
/// make it into a ledger, so callers defer and reconcile by hash instead of
/// re-submitting.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rate limited")]
    RateLimited,
    #[error("not found")]
    NotFound,
    #[error("horizon {status}: {summary}")]
    Status {
        status: u16,
        summary: String,
        result_codes: Option<ResultCodes>,
    },
    #[error("invalid {what}: {value}")]
    Invalid { what: &'static str, value: String },
    #[error("xdr: {0}")]
    Xdr(#[from] stellar_xdr::curr::Error),
}

const GATEWAY_TIMEOUT_CODES: [u16; 3] = [502, 504, 522];

impl Error {
    pub fn invalid(what: &'static str, value: impl Into<String>) -> Self {
        Error::Invalid {
            what,
            value: value.into(),
        }
    }

    /// Whether the request can simply be repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::RateLimited)
    }

    /// Whether the outcome is unknown: the gateway timed out but the
    /// transaction may still be included. Resolved later by hash lookup.
    pub fn is_timeout_pending(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_timeout(),
            Error::Status { status, .. } => GATEWAY_TIMEOUT_CODES.contains(status),
            _ => false,
        }
    }

    pub fn result_codes(&self) -> Option<&ResultCodes> {
        match self {
            Error::Status { result_codes, .. } => result_codes.as_ref(),
            _ => None,
        }
    }

    /// The reason a submission failed: the first non-success operation code,
    /// falling back to the transaction-level code.
    pub fn failure_reason(&self) -> Option<String> {
        self.result_codes().and_then(ResultCodes::failure_reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16, result_codes: Option<ResultCodes>) -> Error {
        Error::Status {
            status: code,
            summary: "test".into(),
            result_codes,
        }
    }

    #[test]
    fn gateway_timeouts_are_pending() {
        for code in [502, 504, 522] {
            assert!(status(code, None).is_timeout_pending());
        }
        assert!(!status(400, None).is_timeout_pending());
        assert!(!status(500, None).is_timeout_pending());
    }

    #[test]
    fn failure_reason_prefers_operation_codes() {
        let codes = ResultCodes {
            transaction: Some("tx_failed".into()),
            operations: Some(vec!["op_success".into(), "op_underfunded".into()]),
        };
        assert_eq!(
            status(400, Some(codes)).failure_reason().as_deref(),
            Some("op_underfunded")
        );

        let tx_only = ResultCodes {
            transaction: Some("tx_bad_seq".into()),
            operations: None,
        };
        assert_eq!(
            status(400, Some(tx_only)).failure_reason().as_deref(),
            Some("tx_bad_seq")
        );
    }
}
