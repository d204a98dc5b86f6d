use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::StatusCode;

use crate::ports::spotify::{SpotifyApi, SpotifyApiPlaylist, SpotifyApiTrack};
use crate::services::fetcher::{FetchOptions, RetryPolicy};
use crate::spotify_rs::client::SpotifyApiError;

pub fn track(id: &str, name: &str) -> SpotifyApiTrack {
    SpotifyApiTrack {
        id: id.into(),
        name: name.into(),
        artists: vec![format!("{} artist", name)],
    }
}

pub fn playlist(id: &str, name: &str) -> SpotifyApiPlaylist {
    SpotifyApiPlaylist {
        id: id.into(),
        name: name.into(),
        total_tracks: 0,
    }
}

/// Fetch options with a near-zero backoff so retry tests stay fast.
pub fn fast_fetch_options(page_size: u32) -> FetchOptions {
    FetchOptions {
        page_size,
        retry: RetryPolicy {
            max_retries: 2,
            min_delay: Duration::from_millis(1),
        },
    }
}

/// In-memory Spotify library with stable ordering across calls.
#[derive(Default)]
pub struct FakeSpotify {
    pub saved: Vec<SpotifyApiTrack>,
    pub playlists: Vec<SpotifyApiPlaylist>,
    pub playlist_tracks: HashMap<String, Vec<SpotifyApiTrack>>,
    /// Saved-track offsets that always fail with a non-transient error.
    pub failing_offsets: HashSet<u32>,
    /// Every saved-track offset requested, in call order.
    pub requested_offsets: Mutex<Vec<u32>>,
}

impl FakeSpotify {
    pub fn with_saved_tracks(count: usize) -> Self {
        Self {
            saved: (0..count)
                .map(|i| track(&format!("saved-{}", i), &format!("Saved {}", i)))
                .collect(),
            ..Default::default()
        }
    }

    pub fn add_playlist(&mut self, id: &str, name: &str, tracks: Vec<SpotifyApiTrack>) {
        let mut playlist = playlist(id, name);
        playlist.total_tracks = tracks.len() as u32;
        self.playlists.push(playlist);
        self.playlist_tracks.insert(id.to_string(), tracks);
    }

    pub fn requested_offsets(&self) -> Vec<u32> {
        self.requested_offsets.lock().unwrap().clone()
    }
}

fn slice_page<T: Clone>(items: &[T], offset: u32, limit: u32) -> Vec<T> {
    items
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect()
}

#[async_trait::async_trait]
impl SpotifyApi for FakeSpotify {
    async fn saved_tracks(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SpotifyApiTrack>, SpotifyApiError> {
        self.requested_offsets.lock().unwrap().push(offset);
        // Yield so workers interleave like they would on real network calls
        tokio::task::yield_now().await;
        if self.failing_offsets.contains(&offset) {
            return Err(SpotifyApiError::Status {
                status: StatusCode::BAD_REQUEST,
                body: "boom".into(),
            });
        }
        Ok(slice_page(&self.saved, offset, limit))
    }

    async fn user_playlists(
        &self,
        _user_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SpotifyApiPlaylist>, SpotifyApiError> {
        tokio::task::yield_now().await;
        Ok(slice_page(&self.playlists, offset, limit))
    }

    async fn playlist_tracks(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SpotifyApiTrack>, SpotifyApiError> {
        match self.playlist_tracks.get(playlist_id) {
            Some(tracks) => Ok(slice_page(tracks, offset, limit)),
            None => Err(SpotifyApiError::Status {
                status: StatusCode::NOT_FOUND,
                body: format!("unknown playlist {}", playlist_id),
            }),
        }
    }
}
