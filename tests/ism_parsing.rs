// Tests for Smooth Streaming manifest parsing

mod common;
use common::setup_logging;

use pretty_assertions::assert_eq;
use media_manifest::{DiagnosticsSink, Protocol};
use media_manifest::ism::{parse_ism, parse_ism_formats};


#[derive(Default)]
struct CollectingSink {
    warnings: std::sync::Mutex<Vec<String>>,
}

impl DiagnosticsSink for CollectingSink {
    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

const ISM_URL: &str = "https://stream.example.com/video.ism/Manifest";


#[test]
fn test_video_and_audio_tracks() {
    setup_logging();
    let xml = r#"<SmoothStreamingMedia MajorVersion="2" MinorVersion="0" Duration="200000000" TimeScale="10000000">
  <StreamIndex Type="video" Name="video" Chunks="2" TimeScale="10000000"
               Url="QualityLevels({bitrate})/Fragments(video={start time})">
    <QualityLevel Index="0" Bitrate="1536000" FourCC="H264" MaxWidth="1280" MaxHeight="720"
                  CodecPrivateData="00000001674d401f"/>
    <c t="0" d="100000000"/>
    <c d="100000000"/>
  </StreamIndex>
  <StreamIndex Type="audio" Name="audio" Chunks="2" TimeScale="10000000"
               Url="QualityLevels({bitrate})/Fragments(audio={start time})">
    <QualityLevel Index="0" Bitrate="128000" FourCC="AACL" SamplingRate="44100" Channels="2"
                  BitsPerSample="16" CodecPrivateData="1210"/>
    <c t="0" d="100000000"/>
    <c d="100000000"/>
  </StreamIndex>
</SmoothStreamingMedia>"#;
    let ism = parse_ism(xml).unwrap();
    let sink = CollectingSink::default();
    let formats = parse_ism_formats(&ism, ISM_URL, Some("mss"), &sink).unwrap();
    assert_eq!(formats.len(), 2);

    let video = &formats[0];
    assert_eq!(video.format_id.as_deref(), Some("mss-video-1536"));
    assert_eq!(video.ext.as_deref(), Some("ismv"));
    assert_eq!(video.tbr, Some(1536.0));
    assert_eq!(video.width, Some(1280));
    assert_eq!(video.height, Some(720));
    assert_eq!(video.vcodec.as_deref(), Some("H264"));
    assert_eq!(video.acodec.as_deref(), Some("none"));
    assert_eq!(video.protocol, Some(Protocol::Ism));
    assert_eq!(video.fragments.len(), 2);
    assert_eq!(video.fragments[0].url,
               "https://stream.example.com/video.ism/QualityLevels(1536000)/Fragments(video=0)");
    assert_eq!(video.fragments[1].url,
               "https://stream.example.com/video.ism/QualityLevels(1536000)/Fragments(video=100000000)");
    // chunk durations scale down to seconds
    assert_eq!(video.fragments[0].duration, Some(10.0));

    let audio = &formats[1];
    assert_eq!(audio.format_id.as_deref(), Some("mss-audio-128"));
    assert_eq!(audio.ext.as_deref(), Some("isma"));
    assert_eq!(audio.vcodec.as_deref(), Some("none"));
    assert_eq!(audio.acodec.as_deref(), Some("AACL"));
    assert_eq!(audio.asr, Some(44100));
    let params = audio.download_params.as_ref().unwrap();
    assert_eq!(params.channels, Some(2));
    assert_eq!(params.bits_per_sample, Some(16));
    assert_eq!(params.codec_private_data.as_deref(), Some("1210"));
}

#[test]
fn test_chunk_repeat_and_derived_duration() {
    setup_logging();
    let xml = r#"<SmoothStreamingMedia Duration="40" TimeScale="1">
  <StreamIndex Type="video" Name="video" TimeScale="1" Url="F({bitrate},{start time})">
    <QualityLevel Bitrate="1000000" FourCC="AVC1"/>
    <c t="0" r="2" d="10"/>
    <c t="30"/>
  </StreamIndex>
</SmoothStreamingMedia>"#;
    let ism = parse_ism(xml).unwrap();
    let sink = CollectingSink::default();
    let formats = parse_ism_formats(&ism, ISM_URL, None, &sink).unwrap();
    let f = &formats[0];
    // r="2" repeats the first chunk twice; the trailing chunk's duration is derived from
    // the stream duration
    assert_eq!(f.fragments.len(), 3);
    assert_eq!(f.format_id.as_deref(), Some("video-1000"));
    let starts: Vec<&str> = f.fragments.iter().map(|fr| fr.url.as_str()).collect();
    assert_eq!(starts, vec![
        "https://stream.example.com/video.ism/F(1000000,0)",
        "https://stream.example.com/video.ism/F(1000000,10)",
        "https://stream.example.com/video.ism/F(1000000,30)",
    ]);
    assert_eq!(f.fragments[2].duration, Some(10.0));
    let total: f64 = f.fragments.iter().filter_map(|fr| fr.duration).sum();
    assert_eq!(total, 30.0);
}

#[test]
fn test_repeat_with_inferred_duration_covers_the_stream() {
    setup_logging();
    let xml = r#"<SmoothStreamingMedia Duration="20" TimeScale="1">
  <StreamIndex Type="audio" Name="audio" TimeScale="1" Url="F({bitrate},{start time})">
    <QualityLevel Bitrate="96000" FourCC="AACL"/>
    <c t="0" r="2"/>
  </StreamIndex>
</SmoothStreamingMedia>"#;
    let ism = parse_ism(xml).unwrap();
    let sink = CollectingSink::default();
    let formats = parse_ism_formats(&ism, ISM_URL, None, &sink).unwrap();
    let f = &formats[0];
    assert_eq!(f.fragments.len(), 2);
    // the chunk duration is inferred from the stream duration and divided across repeats
    assert_eq!(f.fragments[0].url, "https://stream.example.com/video.ism/F(96000,0)");
    assert_eq!(f.fragments[1].url, "https://stream.example.com/video.ism/F(96000,10)");
    let total: f64 = f.fragments.iter().filter_map(|fr| fr.duration).sum();
    assert_eq!(total, 20.0);
}

#[test]
fn test_unsupported_codec_warns_and_skips() {
    setup_logging();
    let xml = r#"<SmoothStreamingMedia Duration="100" TimeScale="1">
  <StreamIndex Type="video" Name="video" TimeScale="1" Url="F({bitrate},{start time})">
    <QualityLevel Bitrate="2000000" FourCC="WVC1"/>
    <QualityLevel Bitrate="1000000" FourCC="H264"/>
    <c t="0" d="100"/>
  </StreamIndex>
</SmoothStreamingMedia>"#;
    let ism = parse_ism(xml).unwrap();
    let sink = CollectingSink::default();
    let formats = parse_ism_formats(&ism, ISM_URL, None, &sink).unwrap();
    assert_eq!(formats.len(), 1);
    assert_eq!(formats[0].vcodec.as_deref(), Some("H264"));
    let warnings = sink.warnings.lock().unwrap();
    assert!(warnings.iter().any(|w| w.contains("WVC1")));
}

#[test]
fn test_live_and_protected_manifests_yield_nothing() {
    setup_logging();
    let live = r#"<SmoothStreamingMedia Duration="0" IsLive="TRUE">
  <StreamIndex Type="video" Url="F({bitrate},{start time})">
    <QualityLevel Bitrate="1000000" FourCC="H264"/>
  </StreamIndex>
</SmoothStreamingMedia>"#;
    let sink = CollectingSink::default();
    let formats = parse_ism_formats(&parse_ism(live).unwrap(), ISM_URL, None, &sink).unwrap();
    assert!(formats.is_empty());

    let protected = r#"<SmoothStreamingMedia Duration="100">
  <Protection>
    <ProtectionHeader SystemID="9a04f079-9840-4286-ab92-e65be0885f95">b64data</ProtectionHeader>
  </Protection>
  <StreamIndex Type="video" Url="F({bitrate},{start time})">
    <QualityLevel Bitrate="1000000" FourCC="H264"/>
  </StreamIndex>
</SmoothStreamingMedia>"#;
    let formats = parse_ism_formats(&parse_ism(protected).unwrap(), ISM_URL, None, &sink).unwrap();
    assert!(formats.is_empty());
}
