// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use aquarius_bribes::app::App;
use aquarius_bribes::config::Config;
use aquarius_bribes::scheduler::{jobs, Scheduler};

#[derive(Parser)]
#[command(name = "aquarius-bribes", version, about)]
struct Cli {
    /// Path to the TOML configuration.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler daemon with the full job table.
    Run,
    /// Ingest new claimable balances once.
    Ingest,
    /// Claim and convert unlocked pending bribes once.
    Claim,
    /// Return unconvertible and malformed bribes once.
    Return,
    /// Aggregate the upcoming epoch once.
    Aggregate,
    /// Take the daily holder snapshot once.
    TrusteesSnapshot,
    /// Take the daily claim snapshot and load votes once.
    VotesSnapshot,
    /// Run one reward payment tick.
    Pay,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => {
            let default = PathBuf::from("aquarius-bribes.toml");
            Config::load(&default).context("no --config given and ./aquarius-bribes.toml missing")?
        }
    };

    let app = App::new(config).await?;

    match cli.command {
        Command::Run => run_daemon(app).await,
        Command::Ingest => jobs::load_bribes(app).await,
        Command::Claim => jobs::claim_bribes(app).await,
        Command::Return => jobs::return_bribes(app).await,
        Command::Aggregate => jobs::aggregate_bribes(app).await,
        Command::TrusteesSnapshot => jobs::trustees_snapshot(app).await,
        Command::VotesSnapshot => jobs::votes_snapshot(app).await,
        Command::Pay => jobs::pay_rewards(app).await,
    }
}

async fn run_daemon(app: Arc<App>) -> anyhow::Result<()> {
    let scheduler = Scheduler::new(jobs::job_table(app.clone()), app.cache.clone());
    tokio::select! {
        result = scheduler.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}
