//! TutorChat - AI tutoring chat client and proxy
//!
#![doc = "Main entry point for the TutorChat application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tutorchat::cli::{Cli, Commands};
use tutorchat::commands::{self, LocalState};
use tutorchat::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let mut config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    tutorchat::metrics::init_metrics_exporter();

    // Execute command
    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                tracing::debug!("Using bind override: {}", bind);
                config.proxy.bind = bind;
            }
            tracing::info!("Starting proxy");
            commands::serve::run_serve(config).await
        }
        Commands::Chat {
            subject,
            difficulty,
            session,
        } => {
            tracing::info!("Starting tutoring chat");
            if let Some(s) = &session {
                tracing::debug!("Resuming session: {}", s);
            }
            commands::chat::run_chat(config, subject, difficulty, session).await
        }
        Commands::Sessions { command } => {
            let state = LocalState::open(&config.storage)?;
            commands::sessions::handle_sessions(&state, command)
        }
        Commands::Bookmarks => {
            let state = LocalState::open(&config.storage)?;
            commands::list_bookmarks(&state)
        }
        Commands::Stats { reset } => {
            let state = LocalState::open(&config.storage)?;
            commands::stats::handle_stats(&state, reset)
        }
        Commands::Prefs { command } => {
            let state = LocalState::open(&config.storage)?;
            commands::stats::handle_prefs(&state, command)
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose {
        "tutorchat=debug"
    } else {
        "tutorchat=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
