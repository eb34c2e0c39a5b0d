//! HLS (m3u8) playlist parsing.
//!
//! A master playlist enumerates renditions; a media playlist directly enumerates a single
//! rendition's fragments. Only master playlists are walked for formats: a media playlist is
//! returned unchanged as a single descriptor, since it carries no quality alternatives.
//! Distinguishing the two is reliable because `#EXT-X-TARGETDURATION` is required in every
//! media playlist and forbidden in master playlists (draft-pantos-http-live-streaming-17,
//! sections 4.3.3.1 and 4.3.4).

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use crate::{FormatDescriptor, Protocol};
use crate::util::{float_or_none, float_or_none_scaled, int_or_none_scaled,
                  parse_codecs, parse_m3u8_attributes, url_join};


/// Per-call knobs for the HLS walk.
#[derive(Debug, Clone)]
pub struct M3u8Options<'a> {
    /// Container extension to stamp on every produced descriptor (eg. "mp4").
    pub ext: Option<&'a str>,
    /// Protocol tag for produced renditions: [`Protocol::M3u8`] to hand the playlist to a
    /// native HLS downloader, [`Protocol::M3u8Native`] for plain-HTTP fragment fetching.
    pub entry_protocol: Protocol,
    /// Base preference stamped on every descriptor.
    pub preference: Option<f64>,
    /// Stable id prefix for `format_id` derivation.
    pub m3u8_id: Option<&'a str>,
    /// Bandwidth of a live stream varies over time, so bitrate-derived format ids are
    /// suppressed when this is set.
    pub live: bool,
}

impl Default for M3u8Options<'_> {
    fn default() -> Self {
        M3u8Options {
            ext: None,
            entry_protocol: Protocol::M3u8,
            preference: None,
            m3u8_id: None,
            live: false,
        }
    }
}

// Attributes of the most recent #EXT-X-STREAM-INF: and URI-less #EXT-X-MEDIA: tags, donated
// to the next stream URI line and reset once it has consumed them.
#[derive(Debug, Default)]
struct LineCarry {
    last_info: HashMap<String, String>,
    last_media: HashMap<String, String>,
}

/// The synthetic descriptor representing the master playlist itself, letting a selection
/// policy fall back to player-driven adaptive quality selection. Ranked 100 preference
/// points below its sibling renditions.
pub fn m3u8_meta_format(m3u8_url: &str, opts: &M3u8Options) -> FormatDescriptor {
    let format_id: Vec<&str> = [opts.m3u8_id, Some("meta")].into_iter().flatten().collect();
    FormatDescriptor {
        format_id: Some(format_id.join("-")),
        url: Some(m3u8_url.to_string()),
        ext: opts.ext.map(String::from),
        protocol: Some(Protocol::M3u8),
        preference: Some(match opts.preference {
            Some(p) if p != 0.0 => p - 100.0,
            _ => -100.0,
        }),
        resolution: Some("multiple".to_string()),
        format_note: Some("Quality selection URL".to_string()),
        ..Default::default()
    }
}

/// Walk an HLS playlist document and produce one descriptor per rendition, plus the
/// synthetic meta descriptor when the document is a master playlist. `m3u8_url` must be the
/// URL the playlist was finally fetched from, so that relative rendition URIs resolve.
pub fn parse_m3u8_formats(m3u8_doc: &str, m3u8_url: &str, opts: &M3u8Options) -> Vec<FormatDescriptor> {
    if m3u8_doc.contains("#EXT-X-TARGETDURATION") {
        // Media playlist: a single rendition without quality alternatives, returned as is.
        return vec![FormatDescriptor {
            format_id: opts.m3u8_id.map(String::from),
            url: Some(m3u8_url.to_string()),
            ext: opts.ext.map(String::from),
            protocol: Some(opts.entry_protocol),
            preference: opts.preference,
            ..Default::default()
        }];
    }

    let format_url = |u: &str| -> String {
        if u.starts_with("http://") || u.starts_with("https://") {
            u.to_string()
        } else {
            url_join(m3u8_url, u).unwrap_or_else(|| u.to_string())
        }
    };

    let mut formats = vec![m3u8_meta_format(m3u8_url, opts)];
    // Whether each AUDIO group renders muxed into the video streams referencing it (true) or
    // as its own demuxed rendition (false).
    let mut audio_in_video_stream: HashMap<String, bool> = HashMap::new();
    let mut carry = LineCarry::default();

    for line in m3u8_doc.lines() {
        if let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            carry.last_info = parse_m3u8_attributes(rest);
        } else if line.starts_with("#EXT-X-MEDIA:") {
            let media = parse_m3u8_attributes(line);
            let media_type = media.get("TYPE").map(String::as_str);
            if !matches!(media_type, Some("VIDEO") | Some("AUDIO")) {
                continue;
            }
            let group_id = media.get("GROUP-ID").cloned();
            if let Some(media_url) = media.get("URI") {
                let format_id: Vec<&str> = [group_id.as_deref(), media.get("NAME").map(String::as_str)]
                    .into_iter().flatten().collect();
                let mut f = FormatDescriptor {
                    format_id: Some(format_id.join("-")),
                    url: Some(format_url(media_url)),
                    language: media.get("LANGUAGE").cloned(),
                    ext: opts.ext.map(String::from),
                    protocol: Some(opts.entry_protocol),
                    preference: opts.preference,
                    ..Default::default()
                };
                if media_type == Some("AUDIO") {
                    f.vcodec = Some("none".to_string());
                    if let Some(gid) = group_id {
                        audio_in_video_stream.entry(gid).or_insert(false);
                    }
                }
                formats.push(f);
            } else {
                // No URI: this tag's attributes are donated to the next stream URI line.
                if media_type == Some("AUDIO") {
                    if let Some(gid) = group_id {
                        audio_in_video_stream.insert(gid, true);
                    }
                }
                carry.last_media = media;
            }
        } else if line.starts_with('#') || line.trim().is_empty() {
            continue;
        } else {
            // A stream URI line, consuming the carried-over tag attributes.
            let tbr = int_or_none_scaled(
                carry.last_info.get("AVERAGE-BANDWIDTH")
                    .or_else(|| carry.last_info.get("BANDWIDTH"))
                    .map(String::as_str),
                1000).map(|n| n as f64);
            let mut format_id: Vec<String> = Vec::new();
            if let Some(id) = opts.m3u8_id {
                format_id.push(id.to_string());
            }
            // The specification does not mention a NAME attribute for EXT-X-STREAM-INF, but
            // it is sometimes present anyway and makes for a more stable id than bitrate.
            let stream_name = carry.last_info.get("NAME").or_else(|| carry.last_media.get("NAME"));
            if !opts.live {
                format_id.push(match (stream_name, tbr) {
                    (Some(name), _) => name.clone(),
                    (None, Some(tbr)) => format!("{}", tbr as i64),
                    (None, None) => format!("{}", formats.len()),
                });
            }
            let stream_url = format_url(line.trim());
            let mut f = FormatDescriptor {
                format_id: Some(format_id.join("-")),
                url: Some(stream_url.clone()),
                manifest_url: Some(stream_url),
                tbr,
                ext: opts.ext.map(String::from),
                fps: float_or_none(carry.last_info.get("FRAME-RATE").map(String::as_str)),
                protocol: Some(opts.entry_protocol),
                preference: opts.preference,
                ..Default::default()
            };
            if let Some(resolution) = carry.last_info.get("RESOLUTION") {
                lazy_static! {
                    static ref RESOLUTION: Regex =
                        Regex::new(r"(?P<width>\d+)[xX](?P<height>\d+)").unwrap();
                }
                if let Some(m) = RESOLUTION.captures(resolution) {
                    f.width = m.name("width").unwrap().as_str().parse().ok();
                    f.height = m.name("height").unwrap().as_str().parse().ok();
                }
            }
            // Unified Streaming Platform encodes the muxed audio and video bitrates in the
            // rendition URL.
            lazy_static! {
                static ref USP_BITRATES: Regex =
                    Regex::new(r"audio.*?(?:%3D|=)(\d+)(?:-video.*?(?:%3D|=)(\d+))?").unwrap();
            }
            if let Some(m) = USP_BITRATES.captures(f.url.as_deref().unwrap_or("")) {
                f.abr = float_or_none_scaled(m.get(1).map(|g| g.as_str()), 1000.0);
                f.vbr = float_or_none_scaled(m.get(2).map(|g| g.as_str()), 1000.0);
            }
            if let Some(codecs) = carry.last_info.get("CODECS") {
                let parsed = parse_codecs(codecs);
                if parsed.vcodec.is_some() {
                    f.vcodec = parsed.vcodec;
                }
                if parsed.acodec.is_some() {
                    f.acodec = parsed.acodec;
                }
            }
            if let Some(audio_group) = carry.last_info.get("AUDIO") {
                // The referenced audio group renders as its own demuxed rendition, so this
                // video stream carries no audio track of its own.
                if audio_in_video_stream.get(audio_group) == Some(&false) {
                    f.acodec = Some("none".to_string());
                }
            }
            formats.push(f);
            carry = LineCarry::default();
        }
    }
    formats
}
