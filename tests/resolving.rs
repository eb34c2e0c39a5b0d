// Tests for end-to-end manifest resolution: kind detection, dispatch, HTML5 scanning and
// format checking

mod common;
use common::setup_logging;

use pretty_assertions::assert_eq;
use std::collections::HashMap;
use media_manifest::{DiagnosticsSink, FetchedPage, FormatDescriptor, ManifestError,
                     PageFetcher, Protocol};
use media_manifest::html5::Html5Options;
use media_manifest::resolve::ManifestResolver;


struct MapFetcher {
    pages: HashMap<String, String>,
}

impl MapFetcher {
    fn new(pages: &[(&str, &str)]) -> MapFetcher {
        MapFetcher {
            pages: pages.iter().map(|(u, b)| (u.to_string(), b.to_string())).collect(),
        }
    }
}

impl PageFetcher for MapFetcher {
    fn fetch(&self, url: &str, _id: &str) -> Result<FetchedPage, ManifestError> {
        match self.pages.get(url) {
            Some(body) => Ok(FetchedPage { body: body.clone(), final_url: url.to_string() }),
            None => Err(ManifestError::Fetch(format!("no such page {url}"))),
        }
    }
}

struct NullSink;

impl DiagnosticsSink for NullSink {
    fn warn(&self, _message: &str) {}
}

const MASTER_M3U8: &str = r#"#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=500000,RESOLUTION=640x360
low.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1500000,RESOLUTION=1280x720
high.m3u8
"#;


#[test]
fn test_resolve_sniffs_extensionless_hls() {
    setup_logging();
    // no extension in the URL, so the kind must come from content sniffing
    let fetcher = MapFetcher::new(&[("https://cdn.example.com/play?token=abc", MASTER_M3U8)]);
    let sink = NullSink;
    let resolver = ManifestResolver::new(&fetcher, &sink);
    let formats = resolver.resolve("https://cdn.example.com/play?token=abc", "vid").unwrap();
    assert_eq!(formats.len(), 3);
    assert_eq!(formats[0].format_id.as_deref(), Some("hls-meta"));
    assert_eq!(formats[1].format_id.as_deref(), Some("hls-500"));
    assert_eq!(formats[2].url.as_deref(), Some("https://cdn.example.com/high.m3u8"));
}

#[test]
fn test_resolve_dispatches_dash() {
    setup_logging();
    let mpd = r#"<MPD type="static">
  <Period>
    <AdaptationSet mimeType="video/mp4">
      <Representation id="v1" bandwidth="800000">
        <BaseURL>https://cdn.example.com/whole.mp4</BaseURL>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#;
    let fetcher = MapFetcher::new(&[("https://cdn.example.com/stream.mpd", mpd)]);
    let sink = NullSink;
    let resolver = ManifestResolver::new(&fetcher, &sink);
    let formats = resolver.resolve("https://cdn.example.com/stream.mpd", "vid").unwrap();
    assert_eq!(formats.len(), 1);
    assert_eq!(formats[0].format_id.as_deref(), Some("dash-v1"));
    assert_eq!(formats[0].manifest_url.as_deref(), Some("https://cdn.example.com/stream.mpd"));
}

#[test]
fn test_resolve_rejects_unrecognized_content() {
    setup_logging();
    let fetcher = MapFetcher::new(&[("https://cdn.example.com/blob", "garbage content")]);
    let sink = NullSink;
    let resolver = ManifestResolver::new(&fetcher, &sink);
    let err = resolver.resolve("https://cdn.example.com/blob", "vid").unwrap_err();
    assert!(matches!(err, ManifestError::UnhandledMediaStream(_)));
}

#[test]
fn test_nonfatal_fetch_failure_degrades_to_empty() {
    setup_logging();
    let fetcher = MapFetcher::new(&[]);
    let sink = NullSink;
    let resolver = ManifestResolver::new(&fetcher, &sink);
    let formats = resolver
        .extract_m3u8_formats("https://cdn.example.com/gone.m3u8", "vid",
                              &Default::default(), false)
        .unwrap();
    assert!(formats.is_empty());
    // fatal surfaces the fetch error instead
    let err = resolver
        .extract_m3u8_formats("https://cdn.example.com/gone.m3u8", "vid",
                              &Default::default(), true)
        .unwrap_err();
    assert!(matches!(err, ManifestError::Fetch(_)));
}

#[test]
fn test_html5_video_with_nested_manifest() {
    setup_logging();
    let page = r#"<html><body>
<video controls poster="/art/poster.jpg">
  <source src="/streams/master.m3u8" type="application/x-mpegURL">
  <source src="/streams/fallback.mp4" type='video/mp4; codecs="avc1.42E01E, mp4a.40.2"'>
  <track kind="subtitles" src="/subs/en.vtt" srclang="en">
  <track kind="chapters" src="/subs/chapters.vtt" srclang="en">
</video>
</body></html>"#;
    let fetcher = MapFetcher::new(&[("https://www.example.com/streams/master.m3u8",
                                     MASTER_M3U8)]);
    let sink = NullSink;
    let resolver = ManifestResolver::new(&fetcher, &sink);
    let opts = Html5Options { m3u8_id: Some("hls"), ..Default::default() };
    let entries = resolver.parse_html5_media_entries(
        page, "https://www.example.com/watch", "vid", &opts);
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.thumbnail.as_deref(), Some("https://www.example.com/art/poster.jpg"));

    // the m3u8 source expands into its variant formats, the mp4 source stays a single format
    assert_eq!(entry.formats.len(), 4);
    assert_eq!(entry.formats[0].format_id.as_deref(), Some("hls-meta"));
    assert_eq!(entry.formats[1].protocol, Some(Protocol::M3u8Native));
    let mp4 = entry.formats.last().unwrap();
    assert_eq!(mp4.url.as_deref(), Some("https://www.example.com/streams/fallback.mp4"));
    assert_eq!(mp4.vcodec.as_deref(), Some("avc1.42E01E"));
    assert_eq!(mp4.acodec.as_deref(), Some("mp4a.40.2"));

    // chapters tracks are not subtitles
    assert_eq!(entry.subtitles.len(), 1);
    assert_eq!(entry.subtitles["en"][0].url, "https://www.example.com/subs/en.vtt");
    assert_eq!(entry.subtitles["en"][0].ext.as_deref(), Some("vtt"));
}

#[test]
fn test_html5_audio_marks_video_codec_none() {
    setup_logging();
    let page = r#"<audio src="/podcast.mp3" controls></audio>"#;
    let fetcher = MapFetcher::new(&[]);
    let sink = NullSink;
    let resolver = ManifestResolver::new(&fetcher, &sink);
    let entries = resolver.parse_html5_media_entries(
        page, "https://www.example.com/", "ep1", &Html5Options::default());
    assert_eq!(entries.len(), 1);
    let f = &entries[0].formats[0];
    assert_eq!(f.url.as_deref(), Some("https://www.example.com/podcast.mp3"));
    assert_eq!(f.ext.as_deref(), Some("mp3"));
    assert!(f.is_audio_only());
}

#[test]
fn test_descriptor_serialization_omits_absent_fields() {
    setup_logging();
    let f = FormatDescriptor {
        format_id: Some("hls-500".to_string()),
        url: Some("https://cdn.example.com/low.m3u8".to_string()),
        tbr: Some(500.0),
        protocol: Some(Protocol::M3u8Native),
        ..Default::default()
    };
    let json: serde_json::Value = serde_json::to_value(&f).unwrap();
    assert_eq!(json["format_id"], "hls-500");
    assert_eq!(json["tbr"], 500.0);
    assert_eq!(json["protocol"], "m3u8_native");
    // absent optionals and empty fragment lists are dropped from the serialization
    assert!(json.get("width").is_none());
    assert!(json.get("fragments").is_none());
}

#[test]
fn test_check_formats_drops_unreachable() {
    setup_logging();
    let fetcher = MapFetcher::new(&[("https://cdn.example.com/alive.mp4", "")]);
    let sink = NullSink;
    let resolver = ManifestResolver::new(&fetcher, &sink);
    let mut formats = vec![
        FormatDescriptor {
            format_id: Some("alive".to_string()),
            url: Some("https://cdn.example.com/alive.mp4".to_string()),
            ..Default::default()
        },
        FormatDescriptor {
            format_id: Some("dead".to_string()),
            url: Some("https://cdn.example.com/dead.mp4".to_string()),
            ..Default::default()
        },
        FormatDescriptor {
            format_id: Some("fragmented".to_string()),
            fragments: vec![media_manifest::Fragment::new("https://cdn.example.com/f1.m4s")],
            ..Default::default()
        },
    ];
    resolver.check_formats(&mut formats, "vid");
    let ids: Vec<&str> = formats.iter().filter_map(|f| f.format_id.as_deref()).collect();
    assert_eq!(ids, vec!["alive", "fragmented"]);
}
