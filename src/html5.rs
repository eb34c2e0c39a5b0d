//! HTML5 media markup scanning: `<video>` and `<audio>` elements with their `<source>` and
//! `<track>` children, turned into format descriptors and subtitle tracks.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use crate::{FormatDescriptor, Protocol};
use crate::hls::M3u8Options;
use crate::resolve::ManifestResolver;
use crate::smil::SubtitleEntry;
use crate::util::{determine_ext, mimetype2ext, parse_codecs, url_join};


lazy_static! {
    // A quoted or bare attribute value inside a start tag.
    static ref ATTRIBUTE: Regex = Regex::new(concat!(
        r#"(?x)\s+(?P<key>[a-zA-Z_:][a-zA-Z0-9_:.-]*)"#,
        r#"(?:\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^\s"'=<>`]+)))?"#)).unwrap();
    static ref VIDEO_TAG: Regex = Regex::new(
        r"(?is)(?P<tag><video(?:\s+[^>]*)?>)(?P<content>.*?)</video>").unwrap();
    static ref AUDIO_TAG: Regex = Regex::new(
        r"(?is)(?P<tag><audio(?:\s+[^>]*)?>)(?P<content>.*?)</audio>").unwrap();
    static ref SOURCE_TAG: Regex = Regex::new(r"(?is)<source(?:\s+[^>]*)?/?>").unwrap();
    static ref TRACK_TAG: Regex = Regex::new(r"(?is)<track(?:\s+[^>]*)?/?>").unwrap();
    static ref CONTENT_TYPE: Regex = Regex::new(concat!(
        r#"(?P<mimetype>[^/]+/[^;]+)"#,
        r#"(?:;\s*codecs\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^"']+)))?\s*$"#))
        .unwrap();
}

/// Extract the attributes of an HTML start tag into a map. Value-less attributes map to the
/// empty string, and keys are lowercased.
pub fn extract_attributes(tag: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    for cap in ATTRIBUTE.captures_iter(tag) {
        let key = cap.name("key").map(|m| m.as_str().to_lowercase());
        let key = match key {
            Some(k) => k,
            None => continue,
        };
        let value = cap.name("dq").or_else(|| cap.name("sq")).or_else(|| cap.name("bare"))
            .map(|m| m.as_str())
            .unwrap_or("");
        attributes.entry(key).or_insert_with(|| value.to_string());
    }
    attributes
}

/// Mimetype and codecs string from a `type` attribute value.
fn parse_content_type(type_attr: &str) -> (Option<String>, Option<String>) {
    match CONTENT_TYPE.captures(type_attr.trim()) {
        Some(cap) => (
            cap.name("mimetype").map(|m| m.as_str().trim().to_string()),
            cap.name("dq").or_else(|| cap.name("sq")).or_else(|| cap.name("bare"))
                .map(|m| m.as_str().trim().to_string()),
        ),
        None => (None, None),
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Video,
    Audio,
}

/// Options for [`ManifestResolver::parse_html5_media_entries`].
#[derive(Debug, Default, Clone)]
pub struct Html5Options<'a> {
    pub entry_protocol: Option<Protocol>,
    pub preference: Option<f64>,
    pub m3u8_id: Option<&'a str>,
    pub mpd_id: Option<&'a str>,
}

/// Formats, subtitles and poster thumbnail extracted from one media element.
#[derive(Debug, Default, Clone)]
pub struct MediaEntry {
    pub formats: Vec<FormatDescriptor>,
    pub subtitles: HashMap<String, Vec<SubtitleEntry>>,
    pub thumbnail: Option<String>,
}

fn media_formats(resolver: &ManifestResolver,
                 src: &str,
                 base_url: &str,
                 video_id: &str,
                 kind: MediaKind,
                 type_attr: Option<&str>,
                 opts: &Html5Options,
                 depth: usize)
                 -> Vec<FormatDescriptor> {
    let full_url = url_join(base_url, src).unwrap_or_else(|| src.to_string());
    let (mimetype, codecs) = match type_attr {
        Some(t) => parse_content_type(t),
        None => (None, None),
    };
    let ext = mimetype.as_deref().and_then(mimetype2ext).map(String::from)
        .or_else(|| determine_ext(&full_url));

    if ext.as_deref() == Some("m3u8") {
        let m3u8_opts = M3u8Options {
            ext: Some("mp4"),
            entry_protocol: opts.entry_protocol.unwrap_or(Protocol::M3u8Native),
            preference: opts.preference,
            m3u8_id: opts.m3u8_id,
            ..Default::default()
        };
        return resolver
            .extract_m3u8_formats_at(&full_url, video_id, &m3u8_opts, false, depth + 1)
            .unwrap_or_default();
    }
    if ext.as_deref() == Some("mpd") {
        return resolver
            .extract_mpd_formats_at(&full_url, video_id, opts.mpd_id, false, depth + 1)
            .unwrap_or_default();
    }

    let parsed = codecs.as_deref().map(parse_codecs).unwrap_or_default();
    let mut descriptor = FormatDescriptor {
        url: Some(full_url),
        ext,
        vcodec: parsed.vcodec,
        acodec: parsed.acodec,
        preference: opts.preference,
        ..Default::default()
    };
    if kind == MediaKind::Audio && descriptor.vcodec.is_none() {
        descriptor.vcodec = Some("none".to_string());
    }
    vec![descriptor]
}

/// Scan a web page for `<video>` and `<audio>` elements and return one [`MediaEntry`] per
/// element that references at least one media source or subtitle track.
pub fn parse_html5_media_entries(resolver: &ManifestResolver,
                                 webpage: &str,
                                 base_url: &str,
                                 video_id: &str,
                                 opts: &Html5Options,
                                 depth: usize)
                                 -> Vec<MediaEntry> {
    let mut entries = Vec::new();
    let elements = VIDEO_TAG.captures_iter(webpage).map(|c| (MediaKind::Video, c))
        .chain(AUDIO_TAG.captures_iter(webpage).map(|c| (MediaKind::Audio, c)));
    for (kind, cap) in elements {
        let tag = &cap["tag"];
        let content = &cap["content"];
        let attrs = extract_attributes(tag);

        let mut entry = MediaEntry::default();
        let mut seen_srcs: Vec<String> = Vec::new();

        if let Some(src) = attrs.get("src").filter(|s| !s.is_empty()) {
            seen_srcs.push(src.clone());
            entry.formats.extend(media_formats(
                resolver, src, base_url, video_id, kind, None, opts, depth));
        }
        entry.thumbnail = attrs.get("poster")
            .filter(|p| !p.is_empty())
            .and_then(|p| url_join(base_url, p).or_else(|| Some(p.clone())));

        for source in SOURCE_TAG.find_iter(content) {
            let source_attrs = extract_attributes(source.as_str());
            let src = match source_attrs.get("src").filter(|s| !s.is_empty()) {
                Some(s) => s,
                None => continue,
            };
            if seen_srcs.iter().any(|s| s == src) {
                continue;
            }
            seen_srcs.push(src.clone());
            entry.formats.extend(media_formats(
                resolver, src, base_url, video_id, kind,
                source_attrs.get("type").map(String::as_str), opts, depth));
        }

        for track in TRACK_TAG.find_iter(content) {
            let track_attrs = extract_attributes(track.as_str());
            let track_kind = track_attrs.get("kind").map(String::as_str).unwrap_or("subtitles");
            if track_kind != "subtitles" && track_kind != "captions" {
                continue;
            }
            let src = match track_attrs.get("src").filter(|s| !s.is_empty()) {
                Some(s) => s,
                None => continue,
            };
            let url = url_join(base_url, src).unwrap_or_else(|| src.clone());
            let lang = track_attrs.get("srclang")
                .or_else(|| track_attrs.get("lang"))
                .or_else(|| track_attrs.get("label"))
                .filter(|l| !l.is_empty())
                .map(String::as_str)
                .unwrap_or("und");
            entry.subtitles.entry(lang.to_string()).or_default().push(SubtitleEntry {
                ext: determine_ext(&url),
                url,
            });
        }

        if !entry.formats.is_empty() || !entry.subtitles.is_empty() {
            entries.push(entry);
        }
    }
    entries
}
