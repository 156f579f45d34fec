// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Reward distribution: vote and holder snapshots, delegation expansion,
//! and the proportional payer.

pub mod claim_loader;
pub mod model;
pub mod payer;
pub mod trustees_loader;
pub mod votes_loader;

pub use claim_loader::ClaimLoader;
pub use model::{
    AssetHolderStore, ClaimableBalanceStore, Payout, PayoutStatus, PayoutStore, VoteSnapshot,
    VoteSnapshotStore,
};
pub use payer::{PaySummary, RewardPayer};
pub use trustees_loader::TrusteesLoader;
pub use votes_loader::{TrackerClient, VotesLoader};
