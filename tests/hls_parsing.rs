// Tests for HLS playlist parsing
//
// Master playlists here are minimal but realistic: attribute lists in the order real
// packagers emit them, including quoted URIs containing commas and colons.

mod common;
use common::setup_logging;

use pretty_assertions::assert_eq;
use media_manifest::Protocol;
use media_manifest::hls::{parse_m3u8_formats, M3u8Options};


#[test]
fn test_master_playlist_variants() {
    setup_logging();
    let playlist = r#"#EXTM3U
#EXT-X-VERSION:3
#EXT-X-STREAM-INF:BANDWIDTH=500000,RESOLUTION=640x360,CODECS="avc1.42c01e,mp4a.40.2"
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1500000,AVERAGE-BANDWIDTH=1400000,RESOLUTION=1280x720,FRAME-RATE=25.000
high/index.m3u8
"#;
    let opts = M3u8Options {
        ext: Some("mp4"),
        m3u8_id: Some("hls"),
        ..Default::default()
    };
    let formats = parse_m3u8_formats(playlist, "https://cdn.example.com/vod/master.m3u8", &opts);
    assert_eq!(formats.len(), 3);

    let meta = &formats[0];
    assert_eq!(meta.format_id.as_deref(), Some("hls-meta"));
    assert_eq!(meta.resolution.as_deref(), Some("multiple"));
    assert_eq!(meta.preference, Some(-100.0));
    assert_eq!(meta.protocol, Some(Protocol::M3u8));

    let low = &formats[1];
    assert_eq!(low.format_id.as_deref(), Some("hls-500"));
    assert_eq!(low.url.as_deref(), Some("https://cdn.example.com/vod/low/index.m3u8"));
    assert_eq!(low.tbr, Some(500.0));
    assert_eq!(low.width, Some(640));
    assert_eq!(low.height, Some(360));
    assert_eq!(low.vcodec.as_deref(), Some("avc1.42c01e"));
    assert_eq!(low.acodec.as_deref(), Some("mp4a.40.2"));
    assert_eq!(low.ext.as_deref(), Some("mp4"));

    let high = &formats[2];
    // AVERAGE-BANDWIDTH wins over BANDWIDTH
    assert_eq!(high.tbr, Some(1400.0));
    assert_eq!(high.format_id.as_deref(), Some("hls-1400"));
    assert_eq!(high.fps, Some(25.0));
}

#[test]
fn test_demuxed_audio_rendition() {
    setup_logging();
    let playlist = r#"#EXTM3U
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID="aud1",NAME="English",LANGUAGE="en",DEFAULT=YES,URI="audio/en/prog.m3u8"
#EXT-X-STREAM-INF:BANDWIDTH=2000000,AUDIO="aud1",CODECS="avc1.640028,mp4a.40.2"
video/prog.m3u8
"#;
    let opts = M3u8Options { m3u8_id: Some("hls"), ..Default::default() };
    let formats = parse_m3u8_formats(playlist, "https://cdn.example.com/master.m3u8", &opts);
    assert_eq!(formats.len(), 3);

    let audio = &formats[1];
    assert_eq!(audio.format_id.as_deref(), Some("aud1-English"));
    assert_eq!(audio.url.as_deref(), Some("https://cdn.example.com/audio/en/prog.m3u8"));
    assert_eq!(audio.language.as_deref(), Some("en"));
    assert_eq!(audio.vcodec.as_deref(), Some("none"));
    assert!(audio.is_audio_only());

    // the audio group renders separately, so the video variant carries no audio of its own
    let video = &formats[2];
    assert_eq!(video.acodec.as_deref(), Some("none"));
    assert_eq!(video.vcodec.as_deref(), Some("avc1.640028"));
}

#[test]
fn test_muxed_audio_group_without_uri() {
    setup_logging();
    let playlist = r#"#EXTM3U
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID="aud1",NAME="Default",DEFAULT=YES
#EXT-X-STREAM-INF:BANDWIDTH=800000,AUDIO="aud1",CODECS="avc1.42c01e,mp4a.40.2"
prog.m3u8
"#;
    let opts = M3u8Options::default();
    let formats = parse_m3u8_formats(playlist, "https://cdn.example.com/master.m3u8", &opts);
    // URI-less audio group is muxed into the variant, which keeps its audio codec
    let video = &formats[1];
    assert_eq!(video.acodec.as_deref(), Some("mp4a.40.2"));
    // the URI-less media tag's NAME is donated to the variant's format id
    assert_eq!(video.format_id.as_deref(), Some("Default"));
}

#[test]
fn test_media_playlist_single_format() {
    setup_logging();
    let playlist = r#"#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXTINF:9.8,
segment0.ts
#EXT-X-ENDLIST
"#;
    let opts = M3u8Options {
        ext: Some("mp4"),
        entry_protocol: Protocol::M3u8Native,
        m3u8_id: Some("hls"),
        ..Default::default()
    };
    let formats = parse_m3u8_formats(playlist, "https://cdn.example.com/media.m3u8", &opts);
    assert_eq!(formats.len(), 1);
    assert_eq!(formats[0].format_id.as_deref(), Some("hls"));
    assert_eq!(formats[0].url.as_deref(), Some("https://cdn.example.com/media.m3u8"));
    assert_eq!(formats[0].protocol, Some(Protocol::M3u8Native));
}

#[test]
fn test_live_suppresses_bitrate_ids() {
    setup_logging();
    let playlist = r#"#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1000000
live/1.m3u8
"#;
    let opts = M3u8Options { m3u8_id: Some("hls"), live: true, ..Default::default() };
    let formats = parse_m3u8_formats(playlist, "https://cdn.example.com/live.m3u8", &opts);
    assert_eq!(formats[1].format_id.as_deref(), Some("hls"));
    assert_eq!(formats[1].tbr, Some(1000.0));
}

#[test]
fn test_usp_bitrates_from_url() {
    setup_logging();
    let playlist = r#"#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1928000,CODECS="mp4a.40.2,avc1.64001F",RESOLUTION=1024x576
video-audio_eng=128000-video=1600000.m3u8
"#;
    let formats = parse_m3u8_formats(playlist, "https://usp.example.com/master.m3u8",
                                     &M3u8Options::default());
    let f = &formats[1];
    assert_eq!(f.abr, Some(128.0));
    assert_eq!(f.vbr, Some(1600.0));
}
