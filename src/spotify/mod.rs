//! Spotify Web API: "currently playing" lookups and the OAuth flow behind them

mod auth;
mod client;
mod server;
mod storage;

pub use auth::{SpotifyAuth, SCOPE};
pub use client::SpotifyClient;
pub use storage::{StoredTokens, TokenStorage};

#[derive(Debug, thiserror::Error)]
pub enum SpotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Spotify API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed Spotify response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Spotify authorization failed: {0}")]
    Auth(String),

    #[error("Invalid redirect URI: {0}")]
    RedirectUri(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
