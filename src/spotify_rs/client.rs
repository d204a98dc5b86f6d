use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::spotify_rs::types::{
    SpotifyPaging, SpotifyPlaylist, SpotifyPlaylistItem, SpotifySavedTrack, SpotifyUser,
};

pub const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum SpotifyApiError {
    #[error("Failed to send http request: {0}")]
    FailedToSendRequest(reqwest::Error),
    #[error("Spotify responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Failed to parse response: {0}")]
    FailedToParseResponse(reqwest::Error),
}

impl SpotifyApiError {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limiting, server errors and transport failures are transient, including a
    /// connection that drops or times out while the body is read. Client errors (bad
    /// token, unknown playlist) and malformed bodies are not.
    pub fn is_transient(&self) -> bool {
        match self {
            SpotifyApiError::FailedToSendRequest(error) => {
                error.is_timeout() || error.is_connect() || error.is_request()
            }
            SpotifyApiError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            SpotifyApiError::FailedToParseResponse(error) => body_interrupted(error),
        }
    }
}

/// `Response::json` reports a body that ended early as a decode error wrapping the
/// body error, so the whole source chain is checked.
fn body_interrupted(error: &reqwest::Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(error) = current {
        if let Some(error) = error.downcast_ref::<reqwest::Error>() {
            if error.is_body() || error.is_timeout() {
                return true;
            }
        }
        current = error.source();
    }
    false
}

/// Spotify API client
///
/// Holds a bearer token and is cheap to share between workers behind an `Arc`;
/// every call is independent.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    access_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl SpotifyClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, SPOTIFY_API_URL)
    }

    pub fn with_base_url(access_token: String, base_url: impl Into<String>) -> Self {
        Self {
            access_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SpotifyApiError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::trace!(%url, ?query, "Spotify GET");

        let response = self
            .client
            .get(&url)
            .query(query)
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(SpotifyApiError::FailedToSendRequest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpotifyApiError::Status {
                status,
                body: response
                    .text()
                    .await
                    .unwrap_or("Failed to get error text".to_string()),
            });
        }

        response
            .json()
            .await
            .map_err(SpotifyApiError::FailedToParseResponse)
    }

    /// Get the current user's profile
    pub async fn get_current_user(&self) -> Result<SpotifyUser, SpotifyApiError> {
        self.get_json("/me", &[]).await
    }

    /// One page of the current user's saved ("liked") tracks.
    ///
    /// Endpoint
    /// - `GET /me/tracks?offset=..&limit=..`
    pub async fn get_saved_tracks(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<SpotifyPaging<SpotifySavedTrack>, SpotifyApiError> {
        self.get_json("/me/tracks", &paging_query(offset, limit))
            .await
    }

    /// One page of the public playlists of `user_id`.
    ///
    /// Endpoint
    /// - `GET /users/{user_id}/playlists?offset=..&limit=..`
    pub async fn get_user_playlists(
        &self,
        user_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<SpotifyPaging<SpotifyPlaylist>, SpotifyApiError> {
        let path = format!("/users/{}/playlists", urlencoding::encode(user_id));
        self.get_json(&path, &paging_query(offset, limit)).await
    }

    /// One page of the entries of a playlist.
    ///
    /// Endpoint
    /// - `GET /playlists/{playlist_id}/tracks?offset=..&limit=..`
    pub async fn get_playlist_tracks(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<SpotifyPaging<SpotifyPlaylistItem>, SpotifyApiError> {
        let path = format!("/playlists/{}/tracks", urlencoding::encode(playlist_id));
        self.get_json(&path, &paging_query(offset, limit)).await
    }
}

fn paging_query(offset: u32, limit: u32) -> [(&'static str, String); 2] {
    [("offset", offset.to_string()), ("limit", limit.to_string())]
}
