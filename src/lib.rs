// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Bribe collection and reward distribution for Stellar market voting.
//!
//! Sponsors escrow an asset amount against a market key as a claimable
//! balance. Once unlocked, the service claims the pledge into the house
//! wallet, converts a fixed portion to the reward asset, aggregates the
//! pools per market and epoch, and pays voters their proportional share
//! every reward tick. Unusable pledges go back to their sponsors.
//!
//! The crate is a library plus one binary: the `run` subcommand drives the
//! whole weekly cycle from the [`scheduler`]; the remaining subcommands run
//! single jobs for operations work.

pub mod app;
pub mod bribes;
pub mod config;
pub mod db;
pub mod ledger;
pub mod rewards;
pub mod scheduler;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
