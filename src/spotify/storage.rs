use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::SpotifyError;

const APP_DIR: &str = "spotify-presence";

/// Refresh this long before Spotify would reject the token
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl StoredTokens {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

/// OAuth tokens cached on disk, one file per Spotify client id
#[derive(Debug, Clone)]
pub struct TokenStorage {
    path: PathBuf,
}

impl TokenStorage {
    /// Lives in the user config dir, or next to the binary's working dir if there is none.
    pub fn for_client(client_id: &str) -> Self {
        let file_name = format!("tokens-{client_id}.json");
        let path = match dirs::config_dir() {
            Some(dir) => dir.join(APP_DIR).join(file_name),
            None => PathBuf::from(format!(".{APP_DIR}-{file_name}")),
        };
        Self { path }
    }

    #[cfg(test)]
    pub(crate) fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unreadable or corrupt files count as "no tokens", forcing a fresh login.
    pub fn get_tokens(&self) -> Result<Option<StoredTokens>, SpotifyError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            tracing::warn!("Spotify token file is empty, ignoring it");
            return Ok(None);
        }

        match serde_json::from_str(&contents) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(e) => {
                tracing::warn!("Failed to parse Spotify token file, ignoring it: {}", e);
                Ok(None)
            }
        }
    }

    pub fn save_tokens(&self, tokens: &StoredTokens) -> Result<(), SpotifyError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(tokens)?;
        write_private(&self.path, contents.as_bytes())?;

        tracing::debug!("Saved Spotify tokens to {}", self.path.display());
        Ok(())
    }

    pub fn clear_tokens(&self) -> Result<(), SpotifyError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes `contents` to a file only the current user can read, created that way from the start.
#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies to newly created files
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
