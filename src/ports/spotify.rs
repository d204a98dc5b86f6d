use crate::spotify_rs::client::SpotifyApiError;

/// Decoupled representation of a Spotify playlist from the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyApiPlaylist {
    pub id: String,
    pub name: String,
    pub total_tracks: u32,
}

/// Decoupled representation of a Spotify track from the API.
///
/// `id` is empty for playlist entries that have no Spotify track behind them
/// (local files, removed tracks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyApiTrack {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
}

/// Port trait wrapping the paginated Spotify API queries used by business logic.
///
/// Every call fetches exactly one page at `offset`. Implementations live in
/// `services::spotify_client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SpotifyApi: Send + Sync {
    async fn saved_tracks(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SpotifyApiTrack>, SpotifyApiError>;

    async fn user_playlists(
        &self,
        user_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SpotifyApiPlaylist>, SpotifyApiError>;

    async fn playlist_tracks(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SpotifyApiTrack>, SpotifyApiError>;
}
