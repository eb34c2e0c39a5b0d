//! Microsoft Smooth Streaming (ISM) manifest parsing.
//!
//! Fragment start times are reconstructed from the `c` (chunk) elements of each
//! `StreamIndex`: a chunk may carry an explicit start time `t` (which resets the running time
//! cursor), a repeat count `r`, and a duration `d`. When `d` is absent it is derived from the
//! distance to the next chunk's start time, or to the stream duration for the last chunk.
//! Raw ISM fragments lack container headers, so each descriptor also carries the
//! [`IsmDecodeParams`](crate::IsmDecodeParams) a downstream assembler needs to synthesize
//! them; this library never performs that assembly.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Serialize, Deserialize};
use serde_with::skip_serializing_none;
use crate::{DiagnosticsSink, FormatDescriptor, Fragment, IsmDecodeParams, ManifestError, Protocol};
use crate::util::url_join;

/// Units per second when a manifest declares no TimeScale of its own.
pub const DEFAULT_ISM_TIMESCALE: u64 = 10_000_000;


/// One chunk of the stream's fragment sequence.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Chunk {
    /// explicit start time, carried forward as the running cursor when present
    #[serde(rename = "@t")]
    pub t: Option<u64>,
    /// duration, in timescale units
    #[serde(rename = "@d")]
    pub d: Option<u64>,
    /// repeat count, defaulting to 1
    #[serde(rename = "@r")]
    pub r: Option<u64>,
}

/// One encoding of a stream (fixed codec and bitrate).
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct QualityLevel {
    #[serde(rename = "@Index")]
    pub Index: Option<u64>,
    #[serde(rename = "@Bitrate")]
    pub Bitrate: Option<u64>,
    #[serde(rename = "@FourCC")]
    pub FourCC: Option<String>,
    #[serde(rename = "@MaxWidth")]
    pub MaxWidth: Option<u64>,
    #[serde(rename = "@MaxHeight")]
    pub MaxHeight: Option<u64>,
    #[serde(rename = "@SamplingRate")]
    pub SamplingRate: Option<u64>,
    #[serde(rename = "@Channels")]
    pub Channels: Option<u64>,
    #[serde(rename = "@BitsPerSample")]
    pub BitsPerSample: Option<u64>,
    #[serde(rename = "@NALUnitLengthField")]
    pub NALUnitLengthField: Option<u64>,
    #[serde(rename = "@CodecPrivateData")]
    pub CodecPrivateData: Option<String>,
}

/// A video, audio or text stream with its chunk timeline and quality levels.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StreamIndex {
    #[serde(rename = "@Type")]
    pub stream_type: Option<String>,
    #[serde(rename = "@Name")]
    pub Name: Option<String>,
    #[serde(rename = "@Url")]
    pub Url: Option<String>,
    #[serde(rename = "@TimeScale")]
    pub TimeScale: Option<u64>,
    #[serde(rename = "QualityLevel")]
    pub quality_levels: Vec<QualityLevel>,
    #[serde(rename = "c")]
    pub chunks: Vec<Chunk>,
}

/// Base64-encoded DRM initialization data for one protection system.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProtectionHeader {
    #[serde(rename = "@SystemID")]
    pub SystemID: Option<String>,
    #[serde(rename = "$value")]
    pub content: Option<String>,
}

/// PlayReady (or other) protection data. Its presence excludes the whole manifest.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Protection {
    #[serde(rename = "ProtectionHeader")]
    pub headers: Vec<ProtectionHeader>,
}

/// The root node of a parsed Smooth Streaming manifest.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SmoothStreamingMedia {
    #[serde(rename = "@MajorVersion")]
    pub MajorVersion: Option<u64>,
    #[serde(rename = "@MinorVersion")]
    pub MinorVersion: Option<u64>,
    #[serde(rename = "@Duration")]
    pub Duration: Option<u64>,
    #[serde(rename = "@TimeScale")]
    pub TimeScale: Option<u64>,
    #[serde(rename = "@IsLive")]
    pub IsLive: Option<String>,
    pub Protection: Option<Protection>,
    #[serde(rename = "StreamIndex")]
    pub stream_indices: Vec<StreamIndex>,
}


/// Parse a Smooth Streaming manifest, provided as an XML string.
pub fn parse_ism(xml: &str) -> Result<SmoothStreamingMedia, ManifestError> {
    let doc: Result<SmoothStreamingMedia, quick_xml::DeError> = quick_xml::de::from_str(xml);
    doc.map_err(|e| ManifestError::Parsing(e.to_string()))
}


/// Extract formats from a parsed Smooth Streaming manifest. Live manifests and manifests
/// carrying a `Protection` element yield no formats. Only the H264, AVC1 and AACL FourCC
/// codecs are supported; other codecs are skipped with a warning.
pub fn parse_ism_formats(ism: &SmoothStreamingMedia,
                         ism_url: &str,
                         ism_id: Option<&str>,
                         diagnostics: &dyn DiagnosticsSink)
                         -> Result<Vec<FormatDescriptor>, ManifestError> {
    if ism.IsLive.as_deref() == Some("TRUE") || ism.Protection.is_some() {
        return Ok(Vec::new());
    }
    let duration = ism.Duration
        .ok_or_else(|| ManifestError::NotFound("Duration".to_string()))?;
    let timescale = ism.TimeScale.unwrap_or(DEFAULT_ISM_TIMESCALE);

    lazy_static! {
        static ref BITRATE_VAR: Regex = Regex::new(r"\{[Bb]itrate\}").unwrap();
        static ref START_TIME_VAR: Regex = Regex::new(r"\{start[ _]time\}").unwrap();
    }

    let mut formats = Vec::new();
    for stream in &ism.stream_indices {
        let stream_type = match stream.stream_type.as_deref() {
            Some("video") => "video",
            Some("audio") => "audio",
            _ => continue,
        };
        let url_pattern = match stream.Url.as_deref() {
            Some(u) => u,
            None => continue,
        };
        let stream_timescale = stream.TimeScale.unwrap_or(timescale);
        for track in &stream.quality_levels {
            let fourcc = track.FourCC.as_deref().unwrap_or("");
            // TODO: add support for WVC1 and WMAP
            if !matches!(fourcc, "H264" | "AVC1" | "AACL") {
                diagnostics.warn(&format!("{fourcc} is not a supported codec"));
                continue;
            }
            let bitrate = match track.Bitrate {
                Some(b) => b,
                None => continue,
            };
            let tbr = bitrate / 1000;
            let width = track.MaxWidth;
            let height = track.MaxHeight;
            let sampling_rate = track.SamplingRate;

            let track_url_pattern = BITRATE_VAR
                .replace_all(url_pattern, bitrate.to_string().as_str());
            let track_url_pattern = url_join(ism_url, &track_url_pattern)
                .unwrap_or_else(|| track_url_pattern.into_owned());

            let mut fragments = Vec::new();
            let mut fragment_time: f64 = 0.0;
            for (index, chunk) in stream.chunks.iter().enumerate() {
                if let Some(t) = chunk.t {
                    fragment_time = t as f64;
                }
                let fragment_repeat = chunk.r.unwrap_or(1).max(1);
                let fragment_duration = match chunk.d {
                    Some(d) => d as f64,
                    None => {
                        // Derive from the distance to the next chunk's start time, or to the
                        // stream duration for the trailing chunk.
                        let next_time = stream.chunks.get(index + 1)
                            .and_then(|next| next.t)
                            .unwrap_or(duration) as f64;
                        (next_time - fragment_time) / fragment_repeat as f64
                    },
                };
                for _ in 0..fragment_repeat {
                    fragments.push(Fragment {
                        url: START_TIME_VAR
                            .replace_all(&track_url_pattern, format!("{}", fragment_time as u64).as_str())
                            .into_owned(),
                        duration: Some(fragment_duration / stream_timescale as f64),
                        ..Default::default()
                    });
                    fragment_time += fragment_duration;
                }
            }

            let format_id: Vec<String> = [
                ism_id.map(String::from),
                stream.Name.clone(),
                Some(tbr.to_string()),
            ].into_iter().flatten().collect();

            formats.push(FormatDescriptor {
                format_id: Some(format_id.join("-")),
                url: Some(ism_url.to_string()),
                manifest_url: Some(ism_url.to_string()),
                ext: Some(if stream_type == "video" { "ismv" } else { "isma" }.to_string()),
                width,
                height,
                tbr: Some(tbr as f64),
                asr: sampling_rate,
                vcodec: Some(if stream_type == "audio" { "none".to_string() } else { fourcc.to_string() }),
                acodec: Some(if stream_type == "video" { "none".to_string() } else { fourcc.to_string() }),
                protocol: Some(Protocol::Ism),
                fragments,
                download_params: Some(IsmDecodeParams {
                    duration,
                    timescale: stream_timescale,
                    width: width.unwrap_or(0),
                    height: height.unwrap_or(0),
                    fourcc: Some(fourcc.to_string()),
                    codec_private_data: track.CodecPrivateData.clone(),
                    sampling_rate,
                    channels: Some(track.Channels.unwrap_or(2)),
                    bits_per_sample: Some(track.BitsPerSample.unwrap_or(16)),
                    nal_unit_length_field: Some(track.NALUnitLengthField.unwrap_or(4)),
                }),
                ..Default::default()
            });
        }
    }
    Ok(formats)
}
