mod cli;
mod commands;
mod telemetry;

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use cli::{Cli, Command};
use matchalot_sync::{ApiClient, ErrorKind, SyncConfig, SyncError};

#[tokio::main]
async fn main() -> ExitCode {
    // .env must be loaded before clap reads `env = ...` defaults.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(err) = telemetry::init(&cli.logging.to_config()) {
        eprintln!("matchalot: {err}");
        return ExitCode::FAILURE;
    }
    if let Ok(path) = dotenv {
        debug!(path = %path.display(), "loaded environment file");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("matchalot: {err:#}");
            if let Some(hint) = hint_for(&err) {
                eprintln!("  {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let api = ApiClient::new(build_config(&cli)?)?;
    match cli.command {
        Command::Whoami => commands::whoami(&api).await,
        Command::Logout => commands::logout(&api).await,
        Command::Watch(args) => commands::watch(api, args).await,
        Command::Notifications(command) => commands::notifications(api, command).await,
        Command::Match(command) => commands::matches(api, command).await,
    }
}

fn build_config(cli: &Cli) -> anyhow::Result<SyncConfig> {
    let mut config = SyncConfig::from_env()?;
    if let Some(api_url) = &cli.api_url {
        config = config.with_api_url(api_url.clone())?;
    }
    if let Some(ws_url) = &cli.ws_url {
        config = config.with_match_ws_url(ws_url.clone());
    }
    if let Some(cookie) = &cli.session_cookie {
        config = config.with_session_cookie(cookie.clone());
    }
    Ok(config)
}

fn hint_for(err: &anyhow::Error) -> Option<&'static str> {
    let sync = err.chain().find_map(|cause| cause.downcast_ref::<SyncError>())?;
    match sync.kind() {
        ErrorKind::Authentication | ErrorKind::Identity => {
            Some("session expired or missing; sign in again and set MATCHALOT_SESSION_COOKIE")
        }
        ErrorKind::TokenRejected => Some("the server rejected the request token twice; retry later"),
        ErrorKind::NotConnected => Some("the match server is unreachable; try again or pass --rest"),
        _ => None,
    }
}
