use async_trait::async_trait;

use super::payload::Activity;

/// A track reported by the metadata provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub track: String,
    pub artists: Vec<String>,
}

/// Lifecycle of a single IPC session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// Failures a presence transport can report
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Discord client not found")]
    NotFound,

    #[error("Timed out waiting for Discord")]
    Timeout,

    #[error("Discord IPC channel closed")]
    Closed,

    #[error("Discord rejected the request ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Timeouts and closed channels are worth another connection attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Closed)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SourceError(pub String);

/// One IPC session with the chat client (Discord, in practice)
#[async_trait]
pub trait PresenceTransport: Send {
    /// The endpoint slot this transport talks to
    fn slot(&self) -> u8;

    fn state(&self) -> ConnectionState;

    async fn connect(&mut self) -> Result<(), TransportError>;

    async fn update(&mut self, activity: &Activity) -> Result<(), TransportError>;

    /// Releases the session. Must be safe to call more than once.
    async fn close(&mut self);
}

/// Creates fresh, unconnected transports for a given endpoint slot
pub trait TransportFactory: Send + Sync {
    fn create(&self, slot: u8) -> Box<dyn PresenceTransport>;
}

/// Source of "now playing" metadata (Spotify, in practice)
#[async_trait]
pub trait NowPlayingSource: Send {
    /// Returns `None` when nothing is playing.
    async fn now_playing(&mut self) -> Result<Option<NowPlaying>, SourceError>;
}
