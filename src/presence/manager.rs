//! The presence loop: refresh "now playing" text, push it to Discord, recover from disconnects

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use super::connection::{close_connection, wait_for_shutdown, ConnectError, Connector};
use super::payload::{Activity, DisplayOptions, PresenceText};
use super::traits::{
    ConnectionState, NowPlayingSource, PresenceTransport, SourceError, TransportError,
    TransportFactory,
};
use crate::config::AppConfig;

/// The two independent cadences of the loop
#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    /// How often Discord gets a fresh payload
    pub update_interval: Duration,
    /// Minimum time between metadata fetches
    pub fetch_interval: Duration,
}

impl LoopTiming {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            update_interval: config.poll_interval,
            fetch_interval: config.spotify_poll_interval,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("Failed to fetch now playing: {0}")]
    Source(#[from] SourceError),

    #[error("Presence update failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    Pushed,
    Reconnected,
    /// Reconnecting after a transport failure did not work
    Unavailable,
    /// Shutdown was requested while reconnecting
    ShutdownRequested,
}

/// Last fetched text, plus when it was fetched
#[derive(Debug)]
struct CachedPresence {
    text: PresenceText,
    fetched_at: Option<Instant>,
}

impl CachedPresence {
    fn is_due(&self, now: Instant, interval: Duration) -> bool {
        self.fetched_at
            .is_none_or(|at| now.saturating_duration_since(at) >= interval)
    }
}

pub struct PresenceLoop<F, S> {
    connector: Connector<F>,
    source: S,
    display: DisplayOptions,
    timing: LoopTiming,
    started_at: i64,
    cache: CachedPresence,
}

impl<F, S> PresenceLoop<F, S>
where
    F: TransportFactory,
    S: NowPlayingSource,
{
    pub fn new(connector: Connector<F>, source: S, display: DisplayOptions, timing: LoopTiming) -> Self {
        Self {
            connector,
            source,
            display,
            timing,
            started_at: chrono::Utc::now().timestamp(),
            cache: CachedPresence {
                text: PresenceText::starting(),
                fetched_at: None,
            },
        }
    }

    /// Runs until `shutdown` flips to `true` (returns `true`, even mid-connect)
    /// or Discord can no longer be reached (returns `false`).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> bool {
        let mut connection = match self.connector.connect(&mut shutdown).await {
            Ok(transport) => Some(transport),
            Err(ConnectError::ShuttingDown) => {
                tracing::info!("Shutting down...");
                return true;
            }
            Err(ConnectError::Unavailable) => return false,
        };

        let ok = loop {
            if *shutdown.borrow_and_update() {
                tracing::info!("Shutting down...");
                break true;
            }

            match self.tick(&mut connection, &mut shutdown).await {
                Ok(TickOutcome::Pushed | TickOutcome::Reconnected) => {}
                Ok(TickOutcome::Unavailable) => break false,
                Ok(TickOutcome::ShutdownRequested) => {
                    tracing::info!("Shutting down...");
                    break true;
                }
                Err(e) => tracing::error!("Presence update error: {}", e),
            }

            tokio::select! {
                () = tokio::time::sleep(self.timing.update_interval) => {}
                () = wait_for_shutdown(&mut shutdown) => {
                    tracing::info!("Shutting down...");
                    break true;
                }
            }
        };

        close_connection(&mut connection).await;
        ok
    }

    async fn tick(
        &mut self,
        connection: &mut Option<Box<dyn PresenceTransport>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<TickOutcome, TickError> {
        self.refresh_if_due().await?;

        let activity = Activity::build(&self.cache.text, self.started_at, &self.display);

        let Some(transport) = connection.as_mut() else {
            return Ok(TickOutcome::Unavailable);
        };

        // a handle that already lost its channel goes straight to reconnecting
        let result = if transport.state() == ConnectionState::Connected {
            transport.update(&activity).await
        } else {
            Err(TransportError::Closed)
        };

        match result {
            Ok(()) => {
                tracing::info!("Presence updated: {}", activity.state);
                Ok(TickOutcome::Pushed)
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    "Discord RPC did not respond on pipe {} ({}). Reconnecting...",
                    transport.slot(),
                    e
                );
                close_connection(connection).await;

                match self.connector.connect(shutdown).await {
                    Ok(fresh) => {
                        *connection = Some(fresh);
                        Ok(TickOutcome::Reconnected)
                    }
                    Err(ConnectError::Unavailable) => Ok(TickOutcome::Unavailable),
                    Err(ConnectError::ShuttingDown) => Ok(TickOutcome::ShutdownRequested),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn refresh_if_due(&mut self) -> Result<(), SourceError> {
        let now = Instant::now();
        if !self.cache.is_due(now, self.timing.fetch_interval) {
            return Ok(());
        }

        let playing = self.source.now_playing().await?;
        self.cache.text = PresenceText::from_now_playing(playing.as_ref());
        self.cache.fetched_at = Some(now);
        tracing::debug!("Now playing refreshed: {}", self.cache.text.state);
        Ok(())
    }
}
