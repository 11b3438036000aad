use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use push_reminder::{
    cli::{run_next_fire, run_send_now, run_serve, Cli, Commands},
    error::Error,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let result = app_main().await;

    if let Err(err) = &result {
        error!("{}", err);
    }

    result
}

async fn app_main() -> Result<(), Error> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let token = CancellationToken::new();
            let shutdown = token.clone();

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown requested");
                }
                shutdown.cancel();
            });

            run_serve(token).await
        },
        Commands::SendNow { user } => {
            let summary = run_send_now(user).await?;
            if summary.errors > 0 {
                return Err(Error::ServerError(format!(
                    "{} of {} users could not be reminded",
                    summary.errors, summary.users
                )));
            }
            Ok(())
        },
        Commands::NextFire { count } => run_next_fire(count),
    }
}
