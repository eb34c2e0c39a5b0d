//! XSPF playlist parsing, including the StreamOne (`s1:`) attribute extensions that carry
//! per-location bitrate and resolution metadata.

use serde::{Serialize, Deserialize};
use serde_with::skip_serializing_none;
use crate::FormatDescriptor;
use crate::ManifestError;
use crate::sort::{sort_formats, SortOptions};
use crate::util::{float_or_none_scaled, int_or_none, url_join};


#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Location {
    #[serde(rename = "$value")]
    pub url: Option<String>,
    #[serde(rename = "@label")]
    pub label: Option<String>,
    #[serde(rename = "@bitrate")]
    pub bitrate: Option<String>,
    #[serde(rename = "@width")]
    pub width: Option<String>,
    #[serde(rename = "@height")]
    pub height: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Track {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub annotation: Option<String>,
    pub image: Option<String>,
    /// Milliseconds.
    pub duration: Option<String>,
    #[serde(rename = "location")]
    pub locations: Vec<Location>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TrackList {
    #[serde(rename = "track")]
    pub tracks: Vec<Track>,
}

/// The root node of a parsed XSPF playlist.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Playlist {
    #[serde(rename = "@xmlns")]
    pub xmlns: Option<String>,
    #[serde(rename = "trackList")]
    pub track_list: Option<TrackList>,
}

/// Parse an XSPF playlist, provided as an XML string.
pub fn parse_xspf_document(xml: &str) -> Result<Playlist, ManifestError> {
    let doc: Result<Playlist, quick_xml::DeError> = quick_xml::de::from_str(xml);
    doc.map_err(|e| ManifestError::Parsing(e.to_string()))
}


/// One playlist entry with its candidate formats, sorted best-last.
#[derive(Debug, Default, Clone)]
pub struct XspfEntry {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    /// Seconds.
    pub duration: Option<f64>,
    pub formats: Vec<FormatDescriptor>,
}

/// Extract playlist entries from a parsed XSPF document. Relative locations are resolved
/// against `xspf_base_url`.
pub fn parse_xspf(playlist: &Playlist, playlist_id: &str, xspf_base_url: &str)
                  -> Vec<XspfEntry> {
    let tracks = match &playlist.track_list {
        Some(tl) => &tl.tracks,
        None => return Vec::new(),
    };
    let mut entries = Vec::new();
    for track in tracks {
        let title = track.title.clone()
            .unwrap_or_else(|| playlist_id.to_string());
        let description = track.annotation.clone().or_else(|| track.creator.clone());
        let thumbnail = track.image.clone();
        let duration = float_or_none_scaled(track.duration.as_deref(), 1000.0);

        let mut formats: Vec<FormatDescriptor> = track.locations.iter()
            .filter_map(|location| {
                let loc = location.url.as_deref()?.trim();
                if loc.is_empty() {
                    return None;
                }
                Some(FormatDescriptor {
                    url: url_join(xspf_base_url, loc).or_else(|| Some(loc.to_string())),
                    manifest_url: Some(xspf_base_url.to_string()),
                    format_id: location.label.clone(),
                    tbr: float_or_none_scaled(location.bitrate.as_deref(), 1000.0),
                    width: int_or_none(location.width.as_deref()).map(|w| w as u64),
                    height: int_or_none(location.height.as_deref()).map(|h| h as u64),
                    ..Default::default()
                })
            })
            .collect();
        if formats.is_empty() {
            continue;
        }
        // Empty playlists were skipped above, so sorting cannot fail.
        let _ = sort_formats(&mut formats, &SortOptions::default());

        entries.push(XspfEntry {
            id: playlist_id.to_string(),
            title,
            description,
            thumbnail,
            duration,
            formats,
        });
    }
    entries
}
