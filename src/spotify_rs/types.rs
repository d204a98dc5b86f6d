use serde::{Deserialize, Serialize};

/// Spotify OAuth token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: String,
}

/// Spotify user profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyUser {
    pub id: String,
    pub display_name: Option<String>,
}

/// Offset-based paging envelope shared by all list endpoints.
///
/// Only `items` is read. `offset`, `limit`, `total` and `next` are ignored because
/// the collector computes offsets locally and stops on the first empty page.
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPaging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Entry of `GET /me/tracks`.
///
/// `track` is `null` when the track is no longer available.
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifySavedTrack {
    pub track: Option<SpotifyTrack>,
}

/// Entry of `GET /playlists/{id}/tracks`.
///
/// `track` is `null` for entries that were removed or are unavailable.
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPlaylistItem {
    pub track: Option<SpotifyTrack>,
}

/// Spotify playlist from API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyPlaylist {
    pub id: String,
    pub name: String,
    pub tracks: SpotifyPlaylistTracks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyPlaylistTracks {
    pub total: u32,
}

/// Spotify track from API
///
/// Local files have a `null` id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTrack {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyArtist {
    pub name: String,
}

/// PKCE OAuth session data
#[derive(Debug, Clone)]
pub struct OAuthSession {
    pub code_verifier: String,
    pub state: String,
}

/// Response for authentication initiation
#[derive(Debug, Clone)]
pub struct SpotifyAuthResponse {
    pub auth_url: String,
}
