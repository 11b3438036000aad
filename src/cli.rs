//! Command-line interface.
//!
//! `serve` runs the HTTP API together with the daily scheduler; the other
//! commands are one-shot maintenance tools sharing the same configuration
//! and subscription file.

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    configuration::{get_configuration, set_configuration, AppState, Config, State},
    error::Error,
    handler::reminder::{next_fire_after, ReminderScheduler, RunSummary},
    server,
};

/// Daily web-push reminder service
#[derive(Parser)]
#[command(name = "push-reminder")]
#[command(about = "Daily web-push reminder service", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and the daily scheduler (default if no command specified)
    Serve,

    /// Send the reminder right now, then exit
    SendNow {
        /// Only remind this user
        #[arg(long)]
        user: Option<String>,
    },

    /// Print the next fire times of the daily reminder
    NextFire {
        #[arg(long, default_value = "3")]
        count: usize,
    },
}

/// Initialize configuration and return Config
pub fn init_config() -> Result<Config, Error> {
    set_configuration()?;
    get_configuration()
}

pub async fn run_serve(token: CancellationToken) -> Result<(), Error> {
    let config = init_config()?;
    let app_state = AppState::new(State::new(config)?);

    let scheduler = if app_state.config.enable_scheduler {
        Some(ReminderScheduler::new(app_state.clone())?)
    } else {
        warn!("Scheduler disabled, serving the API only");
        None
    };

    let scheduler_task = async {
        match &scheduler {
            Some(scheduler) => scheduler.run(token.clone()).await,
            None => Ok(()),
        }
    };

    tokio::try_join!(
        server::server_task(&app_state, token.clone()),
        scheduler_task,
    )?;

    Ok(())
}

pub async fn run_send_now(user: Option<String>) -> Result<RunSummary, Error> {
    let config = init_config()?;
    let app_state = AppState::new(State::new(config)?);
    let scheduler = ReminderScheduler::new(app_state)?;

    let summary = match user {
        Some(user) => scheduler.run_for(vec![user]).await,
        None => scheduler.run_once().await,
    };

    Ok(summary)
}

pub fn run_next_fire(count: usize) -> Result<(), Error> {
    let config = init_config()?;
    let mut after = Utc::now();

    for _ in 0..count {
        let next =
            next_fire_after(after, config.notification_time, config.timezone);
        println!("{} ({})", next.with_timezone(&config.timezone), next);
        after = next;
    }

    Ok(())
}
