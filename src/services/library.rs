use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ports::spotify::{SpotifyApi, SpotifyApiPlaylist, SpotifyApiTrack};
use crate::services::collector::{
    Collection, PartitionFailure, PoolOptions, collect, fetch_sequential,
};
use crate::services::fetcher::{PlaylistTracks, SavedTracks, UserPlaylists};
use crate::services::reconcile::{ReferenceSet, UnlikedTrack, reconcile};

/// A resource whose records may be incomplete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncatedSource {
    pub source: String,
    pub failures: Vec<PartitionFailure>,
}

#[derive(Debug)]
pub struct LibraryReport {
    pub liked_tracks: usize,
    pub playlists: usize,
    pub unliked: Vec<UnlikedTrack>,
    pub truncated: Vec<TruncatedSource>,
}

/// Compares a user's playlists against their liked tracks.
pub struct LibraryService {
    client: Arc<dyn SpotifyApi>,
    options: PoolOptions,
}

impl LibraryService {
    pub fn new(client: Arc<dyn SpotifyApi>, options: PoolOptions) -> Self {
        Self { client, options }
    }

    pub async fn liked_tracks(&self) -> Collection<SpotifyApiTrack> {
        collect(self.client.clone(), Arc::new(SavedTracks), &self.options).await
    }

    pub async fn playlists(&self, user_id: &str) -> Collection<SpotifyApiPlaylist> {
        let query = UserPlaylists {
            user_id: user_id.to_string(),
        };
        collect(self.client.clone(), Arc::new(query), &self.options).await
    }

    /// Fetch the entries of every playlist, one playlist at a time.
    ///
    /// Playlists sharing a name are merged under that name, in `(name, id)` order.
    pub async fn playlist_members(
        &self,
        playlists: &[SpotifyApiPlaylist],
    ) -> (BTreeMap<String, Vec<SpotifyApiTrack>>, Vec<TruncatedSource>) {
        let mut ordered: Vec<&SpotifyApiPlaylist> = playlists.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let mut members: BTreeMap<String, Vec<SpotifyApiTrack>> = BTreeMap::new();
        let mut truncated = Vec::new();
        for playlist in ordered {
            let query = PlaylistTracks {
                playlist_id: playlist.id.clone(),
            };
            let collection =
                fetch_sequential(self.client.as_ref(), &query, &self.options.fetch).await;

            tracing::debug!(
                playlist = %playlist.name,
                tracks = collection.items.len(),
                expected = playlist.total_tracks,
                "Fetched playlist tracks"
            );
            if collection.is_truncated() {
                truncated.push(TruncatedSource {
                    source: format!("playlist '{}'", playlist.name),
                    failures: collection.failures,
                });
            }
            members
                .entry(playlist.name.clone())
                .or_default()
                .extend(collection.items);
        }

        (members, truncated)
    }

    /// Collect liked tracks and playlists of `user_id` and report the playlist
    /// entries that are not liked.
    pub async fn find_unliked(&self, user_id: &str) -> LibraryReport {
        let mut truncated = Vec::new();

        let liked = self.liked_tracks().await;
        tracing::info!(count = liked.items.len(), "Collected liked tracks");
        if liked.is_truncated() {
            truncated.push(TruncatedSource {
                source: "liked tracks".to_string(),
                failures: liked.failures.clone(),
            });
        }
        let reference: ReferenceSet = liked.items.iter().collect();
        tracing::debug!(unique = reference.len(), "Built liked track index");

        let playlists = self.playlists(user_id).await;
        tracing::info!(count = playlists.items.len(), "Collected playlists");
        if playlists.is_truncated() {
            truncated.push(TruncatedSource {
                source: format!("playlists of {}", user_id),
                failures: playlists.failures.clone(),
            });
        }

        let (members, member_failures) = self.playlist_members(&playlists.items).await;
        truncated.extend(member_failures);

        LibraryReport {
            liked_tracks: liked.items.len(),
            playlists: playlists.items.len(),
            unliked: reconcile(&reference, &members),
            truncated,
        }
    }
}
