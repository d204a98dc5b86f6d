use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::ports::spotify::{SpotifyApi, SpotifyApiPlaylist, SpotifyApiTrack};
use crate::spotify_rs::client::SpotifyApiError;

/// Spotify's maximum `limit` for the saved-tracks and playlist endpoints.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// One paginated resource of the Spotify API.
#[async_trait::async_trait]
pub trait PagedQuery: Send + Sync {
    type Item: Send + 'static;

    /// Short label used in logs.
    fn describe(&self) -> String;

    async fn request(
        &self,
        client: &dyn SpotifyApi,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Self::Item>, SpotifyApiError>;
}

/// The current user's saved ("liked") tracks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SavedTracks;

#[async_trait::async_trait]
impl PagedQuery for SavedTracks {
    type Item = SpotifyApiTrack;

    fn describe(&self) -> String {
        "saved tracks".to_string()
    }

    async fn request(
        &self,
        client: &dyn SpotifyApi,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SpotifyApiTrack>, SpotifyApiError> {
        client.saved_tracks(offset, limit).await
    }
}

/// The playlists of a user.
#[derive(Debug, Clone)]
pub struct UserPlaylists {
    pub user_id: String,
}

#[async_trait::async_trait]
impl PagedQuery for UserPlaylists {
    type Item = SpotifyApiPlaylist;

    fn describe(&self) -> String {
        format!("playlists of {}", self.user_id)
    }

    async fn request(
        &self,
        client: &dyn SpotifyApi,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SpotifyApiPlaylist>, SpotifyApiError> {
        client.user_playlists(&self.user_id, offset, limit).await
    }
}

/// The entries of a single playlist.
#[derive(Debug, Clone)]
pub struct PlaylistTracks {
    pub playlist_id: String,
}

#[async_trait::async_trait]
impl PagedQuery for PlaylistTracks {
    type Item = SpotifyApiTrack;

    fn describe(&self) -> String {
        format!("tracks of playlist {}", self.playlist_id)
    }

    async fn request(
        &self,
        client: &dyn SpotifyApi,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SpotifyApiTrack>, SpotifyApiError> {
        client.playlist_tracks(&self.playlist_id, offset, limit).await
    }
}

/// Retry policy for transient page failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub min_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub page_size: u32,
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

/// A single page of records.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// True iff the request succeeded and returned at least one record.
    pub has_more: bool,
    /// Set when the page ended the partition because of an error rather than exhaustion.
    pub failure: Option<SpotifyApiError>,
}

impl<T> Page<T> {
    fn exhausted() -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
            failure: None,
        }
    }
}

/// Fetch one page of `query` at `offset`.
///
/// Transient errors are retried with exponential backoff. A page that still fails
/// afterwards is returned empty with `has_more == false` and the error attached, so
/// callers stop paging the same way they do for an empty page.
pub async fn fetch_page<Q: PagedQuery + ?Sized>(
    client: &dyn SpotifyApi,
    query: &Q,
    offset: u32,
    options: &FetchOptions,
) -> Page<Q::Item> {
    let backoff = ExponentialBuilder::default()
        .with_min_delay(options.retry.min_delay)
        .with_max_times(options.retry.max_retries);

    let result = (|| async move { query.request(client, offset, options.page_size).await })
        .retry(backoff)
        .when(SpotifyApiError::is_transient)
        .notify(|error: &SpotifyApiError, delay: Duration| {
            tracing::debug!(
                query = %query.describe(),
                offset,
                ?delay,
                "Retrying page after transient error: {}",
                error
            );
        })
        .await;

    match result {
        Ok(items) if items.is_empty() => Page::exhausted(),
        Ok(items) => Page {
            items,
            has_more: true,
            failure: None,
        },
        Err(error) => {
            tracing::warn!(
                query = %query.describe(),
                offset,
                "Failed to fetch page, treating as end of data: {}",
                error
            );
            Page {
                failure: Some(error),
                ..Page::exhausted()
            }
        }
    }
}
