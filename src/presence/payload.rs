//! Presence text and the activity payload pushed to Discord

use serde::Serialize;

use super::traits::NowPlaying;

/// Fixed details line. Not derived from playback state.
pub const DETAILS_LINE: &str = "VSCode Module Write 87/100";
pub const PARTY_ID: &str = "party123";
pub const PARTY_SIZE: u32 = 97;
pub const PARTY_MAX: u32 = 100;
pub const LARGE_TEXT: &str = "Spotify";

const UNKNOWN: &str = "Unknown";

/// The (state line, large text) pair shown on the profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceText {
    pub state: String,
    pub large_text: String,
}

impl PresenceText {
    /// Shown until the first successful fetch
    pub fn starting() -> Self {
        Self {
            state: "Starting...".to_string(),
            large_text: LARGE_TEXT.to_string(),
        }
    }

    pub fn from_now_playing(now_playing: Option<&NowPlaying>) -> Self {
        let Some(playing) = now_playing else {
            return Self {
                state: "Spotify: Not playing".to_string(),
                large_text: LARGE_TEXT.to_string(),
            };
        };

        let track = Some(playing.track.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or(UNKNOWN);
        let artist = playing
            .artists
            .first()
            .map(String::as_str)
            .filter(|a| !a.is_empty())
            .unwrap_or(UNKNOWN);

        Self {
            state: format!("Listening: {track} — {artist}"),
            large_text: LARGE_TEXT.to_string(),
        }
    }
}

/// Optional fields taken from configuration
#[derive(Debug, Clone, Default)]
pub struct DisplayOptions {
    pub large_image: Option<String>,
    pub join_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activity {
    pub details: String,
    pub state: String,
    pub timestamps: Timestamps,
    pub assets: Assets,
    pub party: Party,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Secrets>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timestamps {
    pub start: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image: Option<String>,
    pub large_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Party {
    pub id: String,
    pub size: [u32; 2],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Secrets {
    pub join: String,
}

impl Activity {
    pub fn build(text: &PresenceText, started_at: i64, display: &DisplayOptions) -> Self {
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());

        Self {
            details: DETAILS_LINE.to_string(),
            state: text.state.clone(),
            timestamps: Timestamps { start: started_at },
            assets: Assets {
                large_image: non_empty(&display.large_image),
                large_text: text.large_text.clone(),
            },
            party: Party {
                id: PARTY_ID.to_string(),
                size: [PARTY_SIZE, PARTY_MAX],
            },
            secrets: non_empty(&display.join_secret).map(|join| Secrets { join }),
        }
    }
}
