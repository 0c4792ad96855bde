//! SofaScore Odds Bot — Entry Point
//!
//! Observes betting markets for scheduled events, captures odds at the
//! opening / T-30 / T-5 checkpoints, and emits pattern-based predictions
//! when history agrees. One binary: `start` runs the scheduler, the other
//! subcommands are one-shot jobs.

mod config;
mod db;
mod error;
mod logging;
mod matcher;
mod notifier;
mod odds;
mod runtime;
mod scheduler;
mod sports;
mod upstream;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::db::queries;
use crate::error::{BotError, Result};
use crate::runtime::Runtime;
use crate::scheduler::jobs::{self, PreStartMode};
use crate::scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "sofascore-odds-bot", about = "Odds-pattern prediction engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until terminated.
    Start,
    /// Fetch the dropping-odds catalog and capture opening odds.
    Discovery,
    /// Run one pre-start sweep over the upcoming window.
    PreStart,
    /// Collect results for events from the preceding 24 hours.
    Midnight,
    /// Alias of `midnight`: previous-day result collection.
    Results,
    /// Collect results for every event in history lacking one.
    ResultsAll,
    /// Backfill final odds for all started events.
    FinalOddsAll,
    /// Evaluate the matcher over the pre-start window without notifying.
    Alerts,
    /// Force a refresh of the alert view.
    RefreshAlerts,
    /// Print scheduler state and the next tick per job.
    Status,
    /// Print the most recent events.
    Events {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };

    logging::init_logging(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "sofascore-odds-bot starting");

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(command: Command, config: Config) -> Result<()> {
    let rt = Runtime::init(config).await?;

    let cancel = CancellationToken::new();
    spawn_signal_watcher(cancel.clone());

    match command {
        Command::Start => {
            let scheduler = Scheduler::new(rt, cancel.clone());
            scheduler.run().await;
            // The scheduler only returns after a shutdown signal.
            return Err(BotError::Cancelled);
        }
        Command::Discovery => jobs::run_discovery(&rt).await?,
        Command::PreStart => jobs::run_pre_start(&rt, &cancel, PreStartMode::Live).await?,
        Command::Midnight | Command::Results => jobs::run_midnight(&rt, &cancel).await?,
        Command::ResultsAll => jobs::run_results_all(&rt, &cancel).await?,
        Command::FinalOddsAll => jobs::run_final_odds_all(&rt, &cancel).await?,
        Command::Alerts => jobs::run_pre_start(&rt, &cancel, PreStartMode::DryRun).await?,
        Command::RefreshAlerts => {
            rt.refresh_alerts().await?;
            info!("alert view refreshed");
        }
        Command::Status => show_status(&rt).await?,
        Command::Events { limit } => show_events(&rt, limit).await?,
    }

    if cancel.is_cancelled() {
        return Err(BotError::Cancelled);
    }
    Ok(())
}

fn spawn_signal_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    cancel.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received SIGINT");
        }
        cancel.cancel();
    });
}

async fn show_status(rt: &Arc<Runtime>) -> Result<()> {
    let db_ok = db::pool::health_check(&rt.db).await.is_ok();
    let events = queries::count_events(&rt.db).await?;
    let odds = queries::count_odds(&rt.db).await?;
    let results = queries::count_results(&rt.db).await?;

    println!("=== SofaScore Odds Bot Status ===");
    println!("Database: {}", if db_ok { "connected" } else { "unreachable" });
    println!("Events: {events}");
    println!("Events with odds: {odds}");
    println!("Events with results: {results}");
    println!();
    println!("Next scheduled ticks ({}):", rt.config.scheduler.timezone);
    for (job, at) in scheduler::next_ticks(
        rt.config.scheduler.poll_interval_minutes,
        rt.config.scheduler.discovery_interval_hours,
        rt.config.display_tz(),
    ) {
        println!("  - {job}: {}", at.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}

async fn show_events(rt: &Arc<Runtime>, limit: i64) -> Result<()> {
    let events = queries::recent_events(&rt.db, limit).await?;
    let tz = rt.config.display_tz();

    println!("=== Recent Events (showing {}) ===", events.len());
    for event in &events {
        println!();
        println!("Event {}: {}", event.event_id, event.participants());
        println!("  Sport: {} | Competition: {}", event.sport, event.competition);
        println!(
            "  Start: {} | Status: {}",
            event.start_time.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
            event.status
        );
        if let Some(odds) = queries::get_event_odds(&rt.db, event.event_id).await? {
            println!(
                "  Odds open:  1={:?} X={:?} 2={:?}",
                odds.one_open, odds.x_open, odds.two_open
            );
            println!(
                "  Odds final: 1={:?} X={:?} 2={:?}",
                odds.one_final, odds.x_final, odds.two_final
            );
            println!(
                "  Variations: d1={:?} dx={:?} d2={:?}",
                odds.var_one, odds.var_x, odds.var_two
            );
        } else {
            println!("  No odds data available");
        }
    }
    Ok(())
}
