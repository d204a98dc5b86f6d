mod auth_server;
mod config;
mod logging;
mod output;
mod ports;
mod services;
mod spotify_rs;
#[cfg(test)]
mod test_utils;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{
    Result,
    eyre::{Context, OptionExt},
};

use crate::{
    auth_server::authorize,
    config::Config,
    logging::init_tracing,
    output::write_report,
    services::library::LibraryService,
    spotify_rs::client::SpotifyClient,
};

/// List playlist tracks that are missing from your Spotify liked songs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, subcommand_negates_reqs = true)]
struct Args {
    /// The Spotify user whose playlists are checked
    #[arg(required = true)]
    username: Option<String>,

    /// The config file to use
    #[arg(short, long, env = "LIKED_GAPS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Number of concurrent workers per collection (overrides the config file)
    #[arg(short, long)]
    workers: Option<u32>,

    /// Records requested per page, at most 50 (overrides the config file)
    #[arg(long)]
    page_size: Option<u32>,

    /// Use this access token instead of logging in through the browser
    #[arg(long, env = "SPOTIFY_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Log filter, e.g. `info` or `liked_gaps=debug`
    #[arg(long, default_value = "warn", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// OTLP/gRPC endpoint to export traces to
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", global = true)]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let tracer_provider = init_tracing(
        env!("CARGO_PKG_NAME"),
        args.otlp_endpoint.as_deref(),
        &args.log_level,
    )?;

    let result = run(args).await;

    if let Some(tracer_provider) = tracer_provider {
        if let Err(error) = tracer_provider.shutdown() {
            eprintln!("Failed to flush traces: {error}");
        }
    }
    result
}

async fn run(args: Args) -> Result<()> {
    if let Some(Commands::Config(command)) = args.command {
        match command {
            ConfigCommands::CreateDefault => {
                let path = Config::create_default()?;
                println!("{}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        }
        return Ok(());
    }

    tracing::debug!("Loading configuration");
    let mut config = match &args.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .wrap_err("Failed to load liked-gaps config")?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    config.validate().wrap_err("Invalid configuration")?;

    let username = args.username.ok_or_eyre("Pass a Spotify username as argument")?;

    let client = match args.access_token {
        Some(access_token) => SpotifyClient::new(access_token),
        None => {
            let credentials = config.credentials()?;
            authorize(&credentials)
                .await
                .wrap_err("Spotify authorization failed")?
        }
    };

    let user = client
        .get_current_user()
        .await
        .wrap_err("Failed to get the logged in Spotify user")?;
    match &user.display_name {
        Some(name) => println!("You are logged in as: {} ({})", user.id, name),
        None => println!("You are logged in as: {}", user.id),
    }

    let service = LibraryService::new(Arc::new(client), config.pool_options());
    let report = service.find_unliked(&username).await;

    for source in &report.truncated {
        for failure in &source.failures {
            tracing::warn!(
                source = %source.source,
                worker = failure.worker,
                offset = ?failure.offset,
                "Stopped paging early: {}",
                failure.reason
            );
        }
        eprintln!(
            "warning: {} may be incomplete ({} failed page request(s))",
            source.source,
            source.failures.len()
        );
    }

    let stdout = std::io::stdout();
    write_report(&mut stdout.lock(), &report).wrap_err("Failed to write report")?;

    Ok(())
}
