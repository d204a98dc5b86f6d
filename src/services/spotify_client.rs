use crate::ports::spotify::{SpotifyApi, SpotifyApiPlaylist, SpotifyApiTrack};
use crate::spotify_rs::client::{SpotifyApiError, SpotifyClient};
use crate::spotify_rs::types::{
    SpotifyPaging, SpotifyPlaylist, SpotifyPlaylistItem, SpotifySavedTrack, SpotifyTrack,
};

impl From<SpotifyTrack> for SpotifyApiTrack {
    fn from(track: SpotifyTrack) -> Self {
        Self {
            id: track.id.unwrap_or_default(),
            name: track.name,
            artists: track.artists.into_iter().map(|artist| artist.name).collect(),
        }
    }
}

impl From<SpotifyPlaylistItem> for SpotifyApiTrack {
    fn from(item: SpotifyPlaylistItem) -> Self {
        match item.track {
            Some(track) => track.into(),
            // Keep the slot so the entry is visible to the validity filter
            None => Self {
                id: String::new(),
                name: String::new(),
                artists: Vec::new(),
            },
        }
    }
}

impl From<SpotifyPlaylist> for SpotifyApiPlaylist {
    fn from(playlist: SpotifyPlaylist) -> Self {
        Self {
            id: playlist.id,
            name: playlist.name,
            total_tracks: playlist.tracks.total,
        }
    }
}

/// Saved entries whose track became unavailable carry nothing to compare against.
fn saved_tracks_of(page: SpotifyPaging<SpotifySavedTrack>) -> Vec<SpotifyApiTrack> {
    page.items
        .into_iter()
        .filter_map(|saved| saved.track)
        .map(Into::into)
        .collect()
}

#[async_trait::async_trait]
impl SpotifyApi for SpotifyClient {
    async fn saved_tracks(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SpotifyApiTrack>, SpotifyApiError> {
        let page = self.get_saved_tracks(offset, limit).await?;
        Ok(saved_tracks_of(page))
    }

    async fn user_playlists(
        &self,
        user_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SpotifyApiPlaylist>, SpotifyApiError> {
        let page = self.get_user_playlists(user_id, offset, limit).await?;
        Ok(page.items.into_iter().map(Into::into).collect())
    }

    async fn playlist_tracks(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SpotifyApiTrack>, SpotifyApiError> {
        let page = self.get_playlist_tracks(playlist_id, offset, limit).await?;
        Ok(page.items.into_iter().map(Into::into).collect())
    }
}
