pub mod config;
pub mod discord;
mod logging;
mod open_url;
pub mod presence;
pub mod spotify;

use std::process::ExitCode;

use tokio::sync::watch;

use config::AppConfig;
use discord::DiscordIpcFactory;
use presence::{Connector, DisplayOptions, LoopTiming, PresenceLoop};
use spotify::SpotifyClient;

/// Wires config, Discord and Spotify together and runs until Ctrl-C.
pub async fn run_presence(config: AppConfig) -> bool {
    let spotify = match SpotifyClient::from_config(&config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to set up Spotify client: {}", e);
            return false;
        }
    };

    let connector = Connector::new(DiscordIpcFactory::from_config(&config), config.discord_rpc_pipe);
    let display = DisplayOptions {
        large_image: config.discord_large_image.clone(),
        join_secret: config.discord_join_secret.clone(),
    };
    let presence = PresenceLoop::new(connector, spotify, display, LoopTiming::from_config(&config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                // keep the sender alive, otherwise the loop can never be told to stop
                std::future::pending::<()>().await;
            }
        }
    });

    presence.run(shutdown_rx).await
}

pub fn run() -> ExitCode {
    // before logging, so RUST_LOG and PRESENCE_LOG_DIR can come from .env
    let dotenv = config::apply_dotenv();
    let _log_guard = logging::init();
    match dotenv {
        Ok(0) => {}
        Ok(count) => tracing::debug!("Loaded {} variables from .env", count),
        Err(e) => tracing::warn!("Failed to load .env: {}", e),
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if runtime.block_on(run_presence(config)) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
