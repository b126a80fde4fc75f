use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use cloud_relay::config::RelayConfig;
use cloud_relay::generator::GeminiClient;
use cloud_relay::relay::Relay;
use cloud_relay::session::scratch::{self, ScratchCredentials, ScratchSession};
use protocol::ResponseSlots;

#[derive(Parser, Debug)]
#[command(name = "cloud-relay", version, about = "Answer cloud-variable requests with a hosted text model")]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in, connect, and poll for requests (default)
    Run {
        /// Override the poll interval in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,
    },
    /// Print the numeric encoding of TEXT
    Encode { text: String },
    /// Print the text encoded by DIGITS
    Decode { digits: String },
    /// Print the response slots TEXT would be published as, in send order
    Split { text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Env file first so RUST_LOG from it applies.
    let env_loaded = match &cli.env_file {
        Some(path) => dotenvy::from_path(path)
            .with_context(|| format!("Failed to load env file {}", path.display()))
            .map(|()| true)?,
        None => dotenvy::dotenv().is_ok(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .init();

    match cli.command.unwrap_or(Command::Run { poll_ms: None }) {
        Command::Run { poll_ms } => run(env_loaded, poll_ms).await,
        Command::Encode { text } => {
            println!("{}", protocol::encode(&text));
            Ok(())
        }
        Command::Decode { digits } => {
            println!("{}", protocol::decode(&digits));
            Ok(())
        }
        Command::Split { text } => {
            let slots = ResponseSlots::split(&protocol::encode(&text));
            for (index, value) in slots.transmission_order() {
                println!("{}\t{}", protocol::vars::response_slot(index), value);
            }
            if slots.is_truncated() {
                warn!("Answer exceeds slot capacity; last slot carries the truncation notice");
            }
            Ok(())
        }
    }
}

/// Startup failures are reported and end the process normally; only the
/// poll loop keeps running.
async fn run(env_loaded: bool, poll_ms: Option<u64>) -> Result<()> {
    info!(env_file = env_loaded, "Server starting...");

    let mut config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("ERROR: {e}");
            error!("Need: SCRATCH_USERNAME, SCRATCH_PASSWORD, PROJECT_ID, GEMINI_API_KEY");
            return Ok(());
        }
    };
    if let Some(ms) = poll_ms {
        config.timings.poll_interval = Duration::from_millis(ms);
    }
    info!(
        project = %config.project_id,
        model = %config.gemini_model,
        "Configuration loaded"
    );

    let generator = GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.gemini_timeout,
    )
    .context("Failed to build Gemini client")?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;
    let credentials = ScratchCredentials {
        username: config.scratch_username.clone(),
        password: config.scratch_password.clone(),
    };

    info!("Logging in...");
    let login = match scratch::login(&http, &credentials).await {
        Ok(login) => login,
        Err(e) => {
            error!(error = %e, "Login failed");
            return Ok(());
        }
    };
    info!(user = %login.username, "Logged in!");

    info!(project = %config.project_id, "Connecting to project...");
    let (session, events) = match ScratchSession::connect(&login, &config.project_id) {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "Connection failed");
            return Ok(());
        }
    };

    let mut relay = Relay::new(session, events, generator, config.timings);
    if !relay.wait_for_open().await {
        error!(
            project = %config.project_id,
            "Connection failed. Check if the project is shared."
        );
        return Ok(());
    }

    relay.run().await;
    Ok(())
}
