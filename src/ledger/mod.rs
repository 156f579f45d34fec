// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The gateway to the Stellar ledger.
//!
//! Everything the engines need from the chain goes through
//! [`provider::LedgerProvider`]: account lookups, claimable-balance and
//! holder listings, path quotes, transaction submission and retrieval.
//! [`horizon::HorizonClient`] is the production implementation; the wire
//! codec itself comes from `stellar-xdr`.

pub mod asset;
pub mod error;
pub mod horizon;
pub mod meta;
pub mod provider;
pub mod tx;
pub mod types;

pub use asset::Asset;
pub use error::Error;
pub use horizon::HorizonClient;
pub use provider::LedgerProvider;
