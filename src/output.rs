use std::io::{self, Write};

use crate::services::library::LibraryReport;
use crate::services::reconcile::UnlikedTrack;

/// Write the summary counts followed by the unliked-track table.
pub fn write_report(out: &mut impl Write, report: &LibraryReport) -> io::Result<()> {
    writeln!(out, "Number of liked tracks: {}", report.liked_tracks)?;
    writeln!(out, "Number of playlists: {}", report.playlists)?;
    writeln!(out)?;
    write_table(out, &report.unliked)
}

pub fn write_table(out: &mut impl Write, rows: &[UnlikedTrack]) -> io::Result<()> {
    writeln!(out, "{:<20}{:<40}{:<20}", "PLAYLIST", "TRACK", "ARTISTS")?;
    for row in rows {
        writeln!(
            out,
            "{:<20}{:<40}{:<20}",
            row.playlist,
            row.track.name,
            row.track.artists.join(", ")
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::spotify::SpotifyApiTrack;

    #[test]
    fn test_write_table() {
        let rows = vec![UnlikedTrack {
            playlist: "Road Trip".into(),
            track: SpotifyApiTrack {
                id: "t3".into(),
                name: "Three".into(),
                artists: vec!["Ann".into(), "Bob".into()],
            },
        }];

        let mut out = Vec::new();
        write_table(&mut out, &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("PLAYLIST            TRACK"));
        assert_eq!(&lines[1][..20], "Road Trip           ");
        assert_eq!(lines[1][20..60].trim_end(), "Three");
        assert_eq!(lines[1][60..].trim_end(), "Ann, Bob");
    }

    #[test]
    fn test_write_report_with_no_rows() {
        let report = LibraryReport {
            liked_tracks: 12,
            playlists: 3,
            unliked: vec![],
            truncated: vec![],
        };

        let mut out = Vec::new();
        write_report(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Number of liked tracks: 12"));
        assert!(text.contains("Number of playlists: 3"));
        assert_eq!(
            text.lines().last().unwrap().trim_end(),
            "PLAYLIST            TRACK                                   ARTISTS"
        );
    }
}
