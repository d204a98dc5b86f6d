use std::collections::{BTreeMap, HashSet};

use crate::ports::spotify::SpotifyApiTrack;

/// Identifiers of the user's liked tracks.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    ids: HashSet<String>,
}

impl ReferenceSet {
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

impl<'a> FromIterator<&'a SpotifyApiTrack> for ReferenceSet {
    fn from_iter<I: IntoIterator<Item = &'a SpotifyApiTrack>>(tracks: I) -> Self {
        tracks.into_iter().map(|track| track.id.clone()).collect()
    }
}

impl FromIterator<String> for ReferenceSet {
    fn from_iter<I: IntoIterator<Item = String>>(ids: I) -> Self {
        Self {
            ids: ids.into_iter().filter(|id| !id.is_empty()).collect(),
        }
    }
}

/// A playlist entry that is not among the liked tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlikedTrack {
    pub playlist: String,
    pub track: SpotifyApiTrack,
}

/// Entries without a Spotify id (local files, removed tracks) cannot be liked
/// and are never reported.
fn is_reportable(track: &SpotifyApiTrack) -> bool {
    !track.id.is_empty()
}

/// Report every playlist entry whose id is not in `liked`.
///
/// Playlists are visited in name order; entries keep their playlist order.
pub fn reconcile(
    liked: &ReferenceSet,
    playlists: &BTreeMap<String, Vec<SpotifyApiTrack>>,
) -> Vec<UnlikedTrack> {
    playlists
        .iter()
        .flat_map(|(playlist, tracks)| {
            tracks
                .iter()
                .filter(|track| is_reportable(track) && !liked.contains(&track.id))
                .map(move |track| UnlikedTrack {
                    playlist: playlist.clone(),
                    track: track.clone(),
                })
        })
        .collect()
}
