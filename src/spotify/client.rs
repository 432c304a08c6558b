use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::auth::SpotifyAuth;
use super::SpotifyError;
use crate::config::AppConfig;
use crate::presence::{NowPlaying, NowPlayingSource, SourceError};

const CURRENTLY_PLAYING_URL: &str = "https://api.spotify.com/v1/me/player/currently-playing";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CurrentlyPlaying {
    #[serde(default)]
    item: Option<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    artists: Vec<Artist>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    #[serde(default)]
    name: Option<String>,
}

/// `None` for an empty body or a response without an item (ads, private sessions).
fn parse_currently_playing(body: &str) -> Result<Option<NowPlaying>, SpotifyError> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let response: CurrentlyPlaying = serde_json::from_str(body)?;
    Ok(response.item.map(|item| NowPlaying {
        track: item.name.unwrap_or_default(),
        artists: item.artists.into_iter().filter_map(|a| a.name).collect(),
    }))
}

pub struct SpotifyClient {
    http: reqwest::Client,
    auth: SpotifyAuth,
}

impl SpotifyClient {
    pub fn from_config(config: &AppConfig) -> Result<Self, SpotifyError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let auth = SpotifyAuth::new(
            config.spotify_client_id.clone(),
            config.spotify_client_secret.clone(),
            config.spotify_redirect_uri.clone(),
            http.clone(),
        )?;

        Ok(Self { http, auth })
    }

    pub async fn currently_playing(&mut self) -> Result<Option<NowPlaying>, SpotifyError> {
        let mut retried_auth = false;

        loop {
            let token = self.auth.access_token().await?;
            let response = self
                .http
                .get(CURRENTLY_PLAYING_URL)
                .bearer_auth(&token)
                .send()
                .await?;

            match response.status() {
                StatusCode::NO_CONTENT => return Ok(None),
                StatusCode::UNAUTHORIZED if !retried_auth => {
                    tracing::debug!("Spotify rejected the access token, refreshing");
                    retried_auth = true;
                    self.auth.invalidate();
                }
                status if status.is_success() => {
                    let body = response.text().await?;
                    return parse_currently_playing(&body);
                }
                status => {
                    let message = response.text().await.unwrap_or_default();
                    return Err(SpotifyError::Api {
                        status: status.as_u16(),
                        message,
                    });
                }
            }
        }
    }
}

impl From<SpotifyError> for SourceError {
    fn from(e: SpotifyError) -> Self {
        SourceError(e.to_string())
    }
}

#[async_trait]
impl NowPlayingSource for SpotifyClient {
    async fn now_playing(&mut self) -> Result<Option<NowPlaying>, SourceError> {
        Ok(self.currently_playing().await?)
    }
}
