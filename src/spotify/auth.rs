use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use url::Url;

use super::server;
use super::storage::{StoredTokens, TokenStorage};
use super::SpotifyError;
use crate::open_url;

pub const SCOPE: &str = "user-read-currently-playing";

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Spotify's token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    /// Refresh responses may omit the refresh token, in which case the old one stays valid.
    fn into_tokens(self, now: DateTime<Utc>, previous_refresh: Option<String>) -> StoredTokens {
        StoredTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: now + TimeDelta::seconds(self.expires_in),
            scope: self.scope,
        }
    }
}

/// Authorization-code flow with tokens cached on disk
pub struct SpotifyAuth {
    client_id: String,
    client_secret: String,
    /// Sent verbatim, Spotify compares it to the registered string
    redirect_uri: String,
    redirect_url: Url,
    http: reqwest::Client,
    storage: TokenStorage,
    tokens: Option<StoredTokens>,
    loaded_from_storage: bool,
}

impl SpotifyAuth {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        http: reqwest::Client,
    ) -> Result<Self, SpotifyError> {
        let redirect_url = Url::parse(&redirect_uri)?;
        let storage = TokenStorage::for_client(&client_id);

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            redirect_url,
            http,
            storage,
            tokens: None,
            loaded_from_storage: false,
        })
    }

    pub fn authorize_url(&self, state: &str) -> Result<Url, SpotifyError> {
        let mut url = Url::parse(AUTHORIZE_URL)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", SCOPE)
            .append_pair("state", state);
        Ok(url)
    }

    /// Returns a usable access token, refreshing or re-authorizing as needed.
    pub async fn access_token(&mut self) -> Result<String, SpotifyError> {
        if !self.loaded_from_storage {
            self.loaded_from_storage = true;
            self.tokens = match self.storage.get_tokens() {
                Ok(tokens) => tokens,
                Err(e) => {
                    tracing::warn!("Failed to read stored Spotify tokens: {}", e);
                    None
                }
            };
        }

        let now = Utc::now();
        if let Some(tokens) = self.tokens.as_ref().filter(|t| !t.is_expired(now)) {
            return Ok(tokens.access_token.clone());
        }

        let refresh_token = self.tokens.as_ref().and_then(|t| t.refresh_token.clone());
        let fresh = match refresh_token {
            Some(refresh_token) => match self.refresh(refresh_token).await {
                Ok(tokens) => tokens,
                Err(e) if is_revoked_grant(&e) => {
                    tracing::warn!("Spotify refresh token was revoked, discarding stored tokens");
                    self.tokens = None;
                    if let Err(e) = self.storage.clear_tokens() {
                        tracing::warn!(
                            "Failed to remove {}: {}",
                            self.storage.path().display(),
                            e
                        );
                    }
                    self.authorize().await?
                }
                Err(e) => {
                    tracing::warn!("Spotify token refresh failed, re-authorizing: {}", e);
                    self.authorize().await?
                }
            },
            None => self.authorize().await?,
        };

        if let Err(e) = self.storage.save_tokens(&fresh) {
            tracing::warn!(
                "Failed to store Spotify tokens in {}: {}",
                self.storage.path().display(),
                e
            );
        }
        let access_token = fresh.access_token.clone();
        self.tokens = Some(fresh);
        Ok(access_token)
    }

    /// Forces a refresh on the next `access_token` call, e.g. after a 401.
    pub fn invalidate(&mut self) {
        if let Some(tokens) = self.tokens.as_mut() {
            tokens.expires_at = DateTime::<Utc>::MIN_UTC;
        }
    }

    async fn refresh(&self, refresh_token: String) -> Result<StoredTokens, SpotifyError> {
        tracing::debug!("Refreshing Spotify access token");
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .await?;
        Ok(response.into_tokens(Utc::now(), Some(refresh_token)))
    }

    async fn authorize(&self) -> Result<StoredTokens, SpotifyError> {
        let state = uuid::Uuid::new_v4().simple().to_string();
        let url = self.authorize_url(&state)?;

        tracing::info!("Authorize Spotify access in your browser: {}", url);
        if let Err(e) = open_url::open(url.as_str()) {
            tracing::warn!("{}. Open the URL above manually.", e);
        }

        let redirect_url = self.redirect_url.clone();
        let code = tokio::task::spawn_blocking(move || {
            server::wait_for_code(&redirect_url, &state, CALLBACK_TIMEOUT)
        })
        .await
        .map_err(|e| SpotifyError::Auth(format!("Authorization listener failed: {e}")))??;

        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await?;
        tracing::info!("Spotify authorization complete");
        Ok(response.into_tokens(Utc::now(), None))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, SpotifyError> {
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SpotifyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

/// Spotify answers `400 invalid_grant` once a refresh token is revoked or expired for good.
fn is_revoked_grant(error: &SpotifyError) -> bool {
    matches!(
        error,
        SpotifyError::Api { status: 400, message } if message.contains("invalid_grant")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> SpotifyAuth {
        SpotifyAuth::new(
            "client-123".to_string(),
            "secret".to_string(),
            "http://localhost:8080".to_string(),
            reqwest::Client::new(),
        )
        .unwrap()
    }

    #[test]
    fn authorize_url_carries_client_scope_and_state() {
        let url = auth().authorize_url("state-xyz").unwrap();
        let pairs: std::collections::HashMap<String, String> =
            url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.spotify.com"));
        assert_eq!(url.path(), "/authorize");
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8080");
        assert_eq!(pairs["scope"], SCOPE);
        assert_eq!(pairs["state"], "state-xyz");
    }

    #[test]
    fn invalid_redirect_uri_is_rejected() {
        let result = SpotifyAuth::new(
            "client-123".to_string(),
            "secret".to_string(),
            "not a url".to_string(),
            reqwest::Client::new(),
        );
        assert!(matches!(result, Err(SpotifyError::RedirectUri(_))));
    }

    #[test]
    fn refresh_response_keeps_previous_refresh_token() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"new","token_type":"Bearer","expires_in":3600,"scope":"user-read-currently-playing"}"#,
        )
        .unwrap();
        let now = Utc::now();

        let tokens = response.into_tokens(now, Some("old-refresh".to_string()));

        assert_eq!(tokens.access_token, "new");
        assert_eq!(tokens.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(tokens.expires_at, now + TimeDelta::seconds(3600));
        assert!(!tokens.is_expired(now));
    }

    #[test]
    fn new_refresh_token_wins() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","expires_in":3600,"refresh_token":"fresh"}"#,
        )
        .unwrap();

        let tokens = response.into_tokens(Utc::now(), Some("old".to_string()));
        assert_eq!(tokens.refresh_token.as_deref(), Some("fresh"));
    }

    #[test]
    fn invalidate_expires_cached_token() {
        let mut auth = auth();
        let now = Utc::now();
        auth.tokens = Some(StoredTokens {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: now + TimeDelta::seconds(3600),
            scope: None,
        });

        auth.invalidate();

        assert!(auth.tokens.as_ref().unwrap().is_expired(now));
    }

    #[test]
    fn only_invalid_grant_counts_as_revoked() {
        let revoked = SpotifyError::Api {
            status: 400,
            message: r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#
                .to_string(),
        };
        let server_error = SpotifyError::Api {
            status: 503,
            message: "invalid_grant".to_string(),
        };
        let bad_client = SpotifyError::Api {
            status: 400,
            message: r#"{"error":"invalid_client"}"#.to_string(),
        };

        assert!(is_revoked_grant(&revoked));
        assert!(!is_revoked_grant(&server_error));
        assert!(!is_revoked_grant(&bad_client));
    }
}
