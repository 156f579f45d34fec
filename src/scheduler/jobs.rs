// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The job table and the task bodies it dispatches.
//!
//! Every body is also callable directly from the CLI for one-shot runs.
//! The two snapshot jobs raise their in-flight flag while they run; the
//! pay job refuses to run against a partial snapshot.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use bigdecimal::BigDecimal;
use chrono::{Duration, Utc, Weekday};
use tracing::{info, warn};

use super::{Job, Schedule};
use crate::app::App;
use crate::bribes::model::EPOCH_DAYS;
use crate::bribes::{self, Aggregator, BribeProcessor, BribeStatus, BribesLoader};
use crate::ledger::Asset;
use crate::rewards::{ClaimLoader, RewardPayer, TrusteesLoader, VotesLoader};
use crate::utils::{epoch_window, truncate_to_hour};

pub const VOTES_IN_FLIGHT_KEY: &str = "votes_in_flight";
pub const TRUSTORS_IN_FLIGHT_KEY: &str = "trustors_in_flight";

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * 60;

/// The full schedule from which the daemon runs.
pub fn job_table(app: Arc<App>) -> Vec<Job> {
    fn job<F, Fut>(
        app: &Arc<App>,
        name: &'static str,
        schedule: Schedule,
        hard_limit: StdDuration,
        body: F,
    ) -> Job
    where
        F: Fn(Arc<App>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let app = app.clone();
        Job::new(
            name,
            schedule,
            hard_limit,
            Arc::new(move || Box::pin(body(app.clone()))),
        )
    }

    vec![
        job(
            &app,
            "load_bribes",
            Schedule::Every(Duration::minutes(5)),
            StdDuration::from_secs(35 * MINUTE),
            load_bribes,
        ),
        job(
            &app,
            "refresh_pending_equivalents",
            Schedule::Every(Duration::minutes(10)),
            StdDuration::from_secs(30 * MINUTE),
            refresh_pending_equivalents,
        ),
        job(
            &app,
            "refresh_active_equivalents",
            Schedule::Every(Duration::hours(1)),
            StdDuration::from_secs(30 * MINUTE),
            refresh_active_equivalents,
        ),
        job(
            &app,
            "update_pending_bribe_periods",
            Schedule::Weekly {
                weekday: Weekday::Mon,
                hour: 0,
                minute: 0,
            },
            StdDuration::from_secs(30 * MINUTE),
            update_pending_bribe_periods,
        ),
        job(
            &app,
            "stop_finished_bribes",
            Schedule::Weekly {
                weekday: Weekday::Mon,
                hour: 0,
                minute: 0,
            },
            StdDuration::from_secs(30 * MINUTE),
            stop_finished_bribes,
        ),
        job(
            &app,
            "return_bribes",
            Schedule::Weekly {
                weekday: Weekday::Sun,
                hour: 9,
                minute: 0,
            },
            StdDuration::from_secs(35 * MINUTE),
            return_bribes,
        ),
        job(
            &app,
            "claim_bribes",
            Schedule::Weekly {
                weekday: Weekday::Sun,
                hour: 19,
                minute: 0,
            },
            StdDuration::from_secs(35 * MINUTE),
            claim_bribes,
        ),
        job(
            &app,
            "aggregate_bribes",
            Schedule::Weekly {
                weekday: Weekday::Sun,
                hour: 20,
                minute: 0,
            },
            StdDuration::from_secs(30 * MINUTE),
            aggregate_bribes,
        ),
        job(
            &app,
            "trustees_snapshot",
            Schedule::Daily { hour: 0, minute: 0 },
            StdDuration::from_secs(8 * HOUR + 5 * MINUTE),
            trustees_snapshot,
        ),
        job(
            &app,
            "votes_snapshot",
            Schedule::DailyRandomHour { latest_hour: 22 },
            StdDuration::from_secs(HOUR + 5 * MINUTE),
            votes_snapshot,
        ),
        job(
            &app,
            "pay_rewards",
            Schedule::HourlyAt { minute: 1 },
            StdDuration::from_secs(58 * MINUTE),
            pay_rewards,
        ),
    ]
}

fn epoch_duration(app: &App) -> anyhow::Result<Duration> {
    Ok(Duration::from_std(app.config.reward.default_duration)?)
}

pub async fn load_bribes(app: Arc<App>) -> anyhow::Result<()> {
    let loader = BribesLoader::new(
        &app.horizon,
        &app.bribes,
        &app.cache,
        &app.config.wallet.address,
        app.config.reward.asset(),
    )
    .with_duration(epoch_duration(&app)?);
    loader.load().await?;
    Ok(())
}

pub async fn refresh_pending_equivalents(app: Arc<App>) -> anyhow::Result<()> {
    let reward_asset = app.config.reward.asset();
    for bribe in app.bribes.by_status(BribeStatus::Pending).await? {
        let equivalent =
            bribes::reward_equivalent(&app.horizon, &bribe.amount, &bribe.asset, &reward_asset)
                .await?;
        app.bribes.set_reward_equivalent(bribe.id, &equivalent).await?;
    }
    Ok(())
}

pub async fn refresh_active_equivalents(app: Arc<App>) -> anyhow::Result<()> {
    let reward_asset = app.config.reward.asset();
    for bribe in app.bribes.active_at(Utc::now()).await? {
        let equivalent =
            bribes::reward_equivalent(&app.horizon, &bribe.amount, &bribe.asset, &reward_asset)
                .await?;
        app.bribes.set_reward_equivalent(bribe.id, &equivalent).await?;
    }
    Ok(())
}

/// Monday roll: pledges still pending when their window opens move one
/// epoch forward. The unlock time is deliberately left alone.
pub async fn update_pending_bribe_periods(app: Arc<App>) -> anyhow::Result<()> {
    let now = Utc::now();
    let mut rolled = 0;
    for mut bribe in app.bribes.pending_with_started_window(now).await? {
        bribe.start_at = bribe.start_at.map(|t| t + Duration::days(EPOCH_DAYS));
        bribe.stop_at = bribe.stop_at.map(|t| t + Duration::days(EPOCH_DAYS));
        app.bribes.update(&bribe).await?;
        rolled += 1;
    }
    if rolled > 0 {
        info!(rolled, "pending bribe windows moved forward");
    }
    Ok(())
}

pub async fn stop_finished_bribes(app: Arc<App>) -> anyhow::Result<()> {
    let now = Utc::now();
    let mut finished = 0;
    for bribe in app.bribes.active_expired(now).await? {
        app.bribes.set_status(bribe.id, BribeStatus::Finished).await?;
        finished += 1;
    }
    if finished > 0 {
        info!(finished, "active bribes finished");
    }
    Ok(())
}

fn processor(app: &App) -> anyhow::Result<BribeProcessor<'_, crate::ledger::HorizonClient>> {
    Ok(BribeProcessor::new(
        &app.horizon,
        &app.bribes,
        app.signer()?,
        &app.config.wallet.address,
        app.config.reward.asset(),
        app.config.reward.conversion_amount.clone(),
        &app.config.horizon.network_passphrase,
        app.config.horizon.base_fee,
    )
    .with_duration(epoch_duration(app)?))
}

pub async fn claim_bribes(app: Arc<App>) -> anyhow::Result<()> {
    processor(&app)?.run_claims(Utc::now()).await?;
    Ok(())
}

pub async fn return_bribes(app: Arc<App>) -> anyhow::Result<()> {
    processor(&app)?.run_returns(Utc::now()).await?;
    Ok(())
}

/// Aggregate the epoch that opens on the coming Monday, i.e. the one the
/// just-claimed bribes belong to.
pub async fn aggregate_bribes(app: Arc<App>) -> anyhow::Result<()> {
    let (start_at, stop_at) = epoch_window(Utc::now(), epoch_duration(&app)?);
    Aggregator::new(&app.bribes, &app.aggregates, app.config.reward.asset())
        .aggregate(start_at, stop_at)
        .await?;
    Ok(())
}

pub async fn trustees_snapshot(app: Arc<App>) -> anyhow::Result<()> {
    app.cache.set_flag(TRUSTORS_IN_FLIGHT_KEY, true).await?;
    let result = trustees_snapshot_inner(&app).await;
    app.cache.set_flag(TRUSTORS_IN_FLIGHT_KEY, false).await?;
    result
}

async fn trustees_snapshot_inner(app: &App) -> anyhow::Result<()> {
    let assets = app.aggregates.assets_active_at(Utc::now()).await?;
    for asset in assets.into_iter().filter(|a| !a.is_native()) {
        let loader = TrusteesLoader::new(&app.horizon, &app.holders, &app.cache, asset);
        loader.reset_cursor().await?;
        loader.load().await?;
    }
    Ok(())
}

pub async fn votes_snapshot(app: Arc<App>) -> anyhow::Result<()> {
    app.cache.set_flag(VOTES_IN_FLIGHT_KEY, true).await?;
    let result = votes_snapshot_inner(&app).await;
    app.cache.set_flag(VOTES_IN_FLIGHT_KEY, false).await?;
    result
}

async fn votes_snapshot_inner(app: &App) -> anyhow::Result<()> {
    let snapshot_time = truncate_to_hour(Utc::now());
    let date = snapshot_time.date_naive();

    // Refresh the delegation caches first; vote expansion reads them.
    for pair in &app.config.delegation.pairs {
        for raw in [&pair.delegatable, &pair.delegated] {
            let asset = Asset::from_horizon(raw)?;
            ClaimLoader::new(&app.horizon, &app.balances, asset)
                .refresh(date)
                .await?;
        }
    }

    let delegatable = app.config.delegation.delegatable_assets()?;
    let delegated = app.config.delegation.delegated_assets()?;
    for market_key in app.aggregates.markets_active_at(snapshot_time).await? {
        let loader = VotesLoader::new(
            &app.tracker,
            &app.votes,
            &app.balances,
            &market_key,
            snapshot_time,
            &app.config.delegation.marker,
            delegatable.clone(),
            delegated.clone(),
            app.tracker.page_limit(),
        );
        loader.load().await?;
    }
    Ok(())
}

pub async fn pay_rewards(app: Arc<App>) -> anyhow::Result<()> {
    if app.cache.flag(VOTES_IN_FLIGHT_KEY).await?
        || app.cache.flag(TRUSTORS_IN_FLIGHT_KEY).await?
    {
        warn!("snapshot in flight, skipping pay tick");
        return Ok(());
    }

    let now = Utc::now();
    let stop_at = now
        + Duration::from_std(app.config.reward.payreward_time_limit)
            .expect("configured limit fits");
    let snapshot_time = truncate_to_hour(now);
    let date = snapshot_time.date_naive();
    let signer = app.signer()?;

    let period_ratio = BigDecimal::from(app.config.reward.reward_period.as_secs())
        / BigDecimal::from(24 * HOUR);

    for bribe in app.aggregates.active_at(snapshot_time).await? {
        let mut candidates = app.votes.for_market_on(date, &bribe.market_key).await?;

        if !bribe.asset.is_native() {
            let holders = app.holders.holders_on(date, &bribe.asset).await?;
            candidates.retain(|v| holders.contains(&v.voting_account));
        }
        candidates.retain(|v| !v.has_delegation);
        if candidates.is_empty() {
            continue;
        }

        let reward_amount = bribe.daily_amount() * &period_ratio;
        let payer = RewardPayer::new(
            &app.horizon,
            &app.payouts,
            &signer,
            &app.config.wallet.address,
            bribe,
            reward_amount,
            Some(stop_at),
            &app.config.horizon.network_passphrase,
            app.config.horizon.base_fee,
        );
        let summary = payer.pay(&candidates).await?;
        if summary.deadline_hit {
            warn!("pay task hit its soft deadline");
            break;
        }
    }
    Ok(())
}
