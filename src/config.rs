use std::io;
use std::time::Duration;

const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080";

const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 30;
const MIN_DISCORD_TIMEOUT_SECS: u64 = 5;

const DEFAULT_SPOTIFY_POLL_SECS: u64 = 30;
const MIN_SPOTIFY_POLL_SECS: u64 = 10;

const DEFAULT_POLL_SECS: u64 = 15;
const MIN_POLL_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}. Copy '.env.example' to '.env' and fill it in.")]
    Missing(&'static str),
}

/// Applies `.env` from the working directory (or a parent) to the process
/// environment and returns how many variables it set.
///
/// File values override variables that are already set, so a stale
/// system-wide value cannot shadow what the user just wrote into `.env`.
pub fn apply_dotenv() -> Result<usize, dotenv::Error> {
    match dotenv::dotenv_iter() {
        Ok(items) => apply_dotenv_items(items),
        Err(dotenv::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

fn apply_dotenv_items<I>(items: I) -> Result<usize, dotenv::Error>
where
    I: IntoIterator<Item = Result<(String, String), dotenv::Error>>,
{
    let mut applied = 0usize;
    for item in items {
        let (key, value) = item?;
        std::env::set_var(key, value);
        applied = applied.saturating_add(1);
    }
    Ok(applied)
}

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub discord_client_id: String,

    /// Asset key or image URL, Discord accepts either.
    pub discord_large_image: Option<String>,
    pub discord_join_secret: Option<String>,

    pub discord_rpc_pipe: Option<u8>,
    pub discord_connection_timeout: Duration,
    pub discord_response_timeout: Duration,

    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_redirect_uri: String,

    pub spotify_poll_interval: Duration,
    pub poll_interval: Duration,
}

impl AppConfig {
    /// Loads the config from the process environment. `.env` should already
    /// have been applied by the caller.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let discord_client_id = require("DISCORD_CLIENT_ID")?;

        // DISCORD_LARGE_IMAGE_KEY is the older name for the same setting
        let discord_large_image = normalize_optional(first_non_empty(&[
            lookup("DISCORD_LARGE_IMAGE"),
            lookup("DISCORD_LARGE_IMAGE_KEY"),
        ]));

        let discord_join_secret = lookup("DISCORD_JOIN_SECRET").filter(|v| !v.trim().is_empty());

        let discord_rpc_pipe = lookup("DISCORD_RPC_PIPE").and_then(|v| v.trim().parse::<u8>().ok());

        let discord_connection_timeout = seconds_at_least(
            lookup("DISCORD_CONNECTION_TIMEOUT"),
            DEFAULT_CONNECTION_TIMEOUT_SECS,
            MIN_DISCORD_TIMEOUT_SECS,
        );
        let discord_response_timeout = seconds_at_least(
            lookup("DISCORD_RESPONSE_TIMEOUT"),
            DEFAULT_RESPONSE_TIMEOUT_SECS,
            MIN_DISCORD_TIMEOUT_SECS,
        );

        let spotify_client_id = require("SPOTIPY_CLIENT_ID")?;
        let spotify_client_secret = require("SPOTIPY_CLIENT_SECRET")?;
        let spotify_redirect_uri = lookup("SPOTIPY_REDIRECT_URI")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

        let spotify_poll_interval = seconds_at_least(
            lookup("SPOTIFY_POLL_SECONDS"),
            DEFAULT_SPOTIFY_POLL_SECS,
            MIN_SPOTIFY_POLL_SECS,
        );
        let poll_interval =
            seconds_at_least(lookup("POLL_SECONDS"), DEFAULT_POLL_SECS, MIN_POLL_SECS);

        Ok(Self {
            discord_client_id,
            discord_large_image,
            discord_join_secret,
            discord_rpc_pipe,
            discord_connection_timeout,
            discord_response_timeout,
            spotify_client_id,
            spotify_client_secret,
            spotify_redirect_uri,
            spotify_poll_interval,
            poll_interval,
        })
    }
}

fn first_non_empty(values: &[Option<String>]) -> Option<String> {
    values
        .iter()
        .flatten()
        .find(|v| !v.trim().is_empty())
        .cloned()
}

/// Some older setups used placeholder values instead of leaving the image unset.
fn normalize_optional(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() || trimmed == "0" {
        return None;
    }

    match trimmed.to_lowercase().as_str() {
        "none" | "null" | "()" => None,
        _ => Some(trimmed),
    }
}

/// Unparseable values fall back to the default without complaint.
fn seconds_at_least(raw: Option<String>, default: u64, min: u64) -> Duration {
    let secs = match raw {
        Some(value) => value
            .trim()
            .parse::<i64>()
            .map_or(default, |v| u64::try_from(v).unwrap_or(0).max(min)),
        None => default,
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("DISCORD_CLIENT_ID", "123"),
        ("SPOTIPY_CLIENT_ID", "sp-id"),
        ("SPOTIPY_CLIENT_SECRET", "sp-secret"),
    ];

    fn with_required(extra: &[(&str, &str)]) -> AppConfig {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend_from_slice(extra);
        AppConfig::from_lookup(lookup_from(&pairs)).unwrap()
    }

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let config = with_required(&[]);

        assert_eq!(config.discord_client_id, "123");
        assert_eq!(config.discord_large_image, None);
        assert_eq!(config.discord_join_secret, None);
        assert_eq!(config.discord_rpc_pipe, None);
        assert_eq!(config.discord_connection_timeout, Duration::from_secs(30));
        assert_eq!(config.discord_response_timeout, Duration::from_secs(30));
        assert_eq!(config.spotify_redirect_uri, "http://localhost:8080");
        assert_eq!(config.spotify_poll_interval, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_secs(15));
    }

    #[test]
    fn missing_required_value_names_the_variable() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DISCORD_CLIENT_ID", "123"),
            ("SPOTIPY_CLIENT_ID", "sp-id"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Missing("SPOTIPY_CLIENT_SECRET")));
        assert!(err.to_string().contains("SPOTIPY_CLIENT_SECRET"));
    }

    #[test]
    fn empty_required_value_counts_as_missing() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DISCORD_CLIENT_ID", ""),
            ("SPOTIPY_CLIENT_ID", "sp-id"),
            ("SPOTIPY_CLIENT_SECRET", "sp-secret"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Missing("DISCORD_CLIENT_ID")));
    }

    #[test]
    fn numeric_values_are_clamped_to_minimums() {
        let config = with_required(&[
            ("DISCORD_CONNECTION_TIMEOUT", "1"),
            ("DISCORD_RESPONSE_TIMEOUT", "-4"),
            ("SPOTIFY_POLL_SECONDS", "3"),
            ("POLL_SECONDS", "60"),
        ]);

        assert_eq!(config.discord_connection_timeout, Duration::from_secs(5));
        assert_eq!(config.discord_response_timeout, Duration::from_secs(5));
        assert_eq!(config.spotify_poll_interval, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let config = with_required(&[
            ("DISCORD_CONNECTION_TIMEOUT", "soon"),
            ("SPOTIFY_POLL_SECONDS", "12.5"),
            ("POLL_SECONDS", ""),
            ("DISCORD_RPC_PIPE", "first"),
        ]);

        assert_eq!(config.discord_connection_timeout, Duration::from_secs(30));
        assert_eq!(config.spotify_poll_interval, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.discord_rpc_pipe, None);
    }

    #[test]
    fn explicit_pipe_is_parsed() {
        let config = with_required(&[("DISCORD_RPC_PIPE", " 3 ")]);
        assert_eq!(config.discord_rpc_pipe, Some(3));
    }

    #[test]
    fn placeholder_large_images_are_treated_as_unset() {
        for placeholder in ["", "  ", "none", "NULL", "()", "0"] {
            let config = with_required(&[("DISCORD_LARGE_IMAGE", placeholder)]);
            assert_eq!(config.discord_large_image, None, "placeholder {placeholder:?}");
        }
    }

    #[test]
    fn legacy_large_image_key_is_used_as_fallback() {
        let config = with_required(&[
            ("DISCORD_LARGE_IMAGE", " "),
            ("DISCORD_LARGE_IMAGE_KEY", "spotify_logo"),
        ]);
        assert_eq!(config.discord_large_image.as_deref(), Some("spotify_logo"));

        let config = with_required(&[
            ("DISCORD_LARGE_IMAGE", "https://example.com/cover.png"),
            ("DISCORD_LARGE_IMAGE_KEY", "spotify_logo"),
        ]);
        assert_eq!(
            config.discord_large_image.as_deref(),
            Some("https://example.com/cover.png")
        );
    }

    #[test]
    fn blank_join_secret_is_unset() {
        assert_eq!(with_required(&[("DISCORD_JOIN_SECRET", "  ")]).discord_join_secret, None);
        assert_eq!(
            with_required(&[("DISCORD_JOIN_SECRET", "s3cret")])
                .discord_join_secret
                .as_deref(),
            Some("s3cret")
        );
    }

    #[test]
    fn dotenv_values_override_the_inherited_environment() {
        const KEY: &str = "SPOTIFY_PRESENCE_DOTENV_OVERRIDE_CHECK";

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, format!("# comment\n{KEY}=from-file\n")).unwrap();
        std::env::set_var(KEY, "from-system");

        let applied = apply_dotenv_items(dotenv::from_path_iter(&path).unwrap()).unwrap();

        assert_eq!(applied, 1);
        assert_eq!(std::env::var(KEY).as_deref(), Ok("from-file"));
        std::env::remove_var(KEY);
    }
}
