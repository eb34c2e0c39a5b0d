//! A Rust library for resolving adaptive-streaming manifests into a uniform set of stream
//! format descriptors, as used by media extraction and download tooling.
//!
//! A manifest (HLS playlist, MPEG-DASH MPD, Adobe HDS F4M, Microsoft Smooth Streaming ISM,
//! SMIL, XSPF, or HTML5-embedded media markup) describes one or more renditions of a media
//! stream and how to address their data. This library decodes each of those wire formats and
//! produces [`FormatDescriptor`] records: one per concretely downloadable stream, either a
//! single URL or an ordered sequence of [`Fragment`]s, annotated with codec, bitrate,
//! resolution and language metadata. A companion [selector](crate::sort) imposes a
//! deterministic total order over heterogeneous descriptors so a caller can pick "the best"
//! or the best within constraints.
//!
//! The library performs no network I/O of its own. Nested manifest references (an F4M media
//! entry that is itself an m3u8, a DASH manifest behind an HTML5 `<source>` tag) are fetched
//! through the [`PageFetcher`] collaborator supplied by the embedding application, and
//! non-fatal problems are reported through the [`DiagnosticsSink`] collaborator.
//!
//! ## Supported manifest formats
//!
//! - HLS master and media playlists (RFC 8216 / draft-pantos)
//! - MPEG-DASH MPD (static presentations; SegmentList, SegmentTemplate@duration and
//!   SegmentTimeline addressing)
//! - Adobe HDS F4M, namespace versions 1.0 and 2.0, including recursive set-level manifests
//! - Microsoft Smooth Streaming (ISM), H264/AVC1/AACL tracks
//! - SMIL presentations (formats, subtitle tracks and playlist metadata)
//! - XSPF playlists, including the StreamOne attribute extensions
//! - HTML5 `<video>`/`<audio>` markup scanning
//!
//! ## Limitations / unsupported features
//!
//! - Dynamic (live) DASH and Smooth Streaming manifests yield no formats
//! - DRM-protected tracks are excluded, not decrypted
//! - Fragment contents are described (URL, byte range, duration), never fetched

#![allow(non_snake_case)]

pub mod util;
pub mod hls;
pub mod dash;
pub mod hds;
pub mod ism;
pub mod smil;
pub mod xspf;
pub mod html5;
pub mod sort;
pub mod resolve;

use serde::{Serialize, Deserialize};
use serde_with::skip_serializing_none;
use std::fmt;

pub use crate::resolve::{ManifestKind, ManifestResolver};
pub use crate::sort::{SortOptions, remove_duplicate_formats, sort_formats};


#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    #[error("parse error {0}")]
    Parsing(String),
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
    #[error("missing {0}")]
    NotFound(String),
    #[error("unsupported media stream: {0}")]
    UnhandledMediaStream(String),
    #[error("fetch error {0}")]
    Fetch(String),
    #[error("no formats found")]
    NoFormats,
    #[error("unknown error {0}")]
    Other(String),
}


/// The retrieval scheme a descriptor's data must be fetched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Http,
    Https,
    /// An HLS rendition to be handed to a native HLS downloader (eg. ffmpeg).
    M3u8,
    /// An HLS rendition whose fragments are fetched over plain HTTP.
    M3u8Native,
    /// A DASH rendition reassembled from `fragments`.
    HttpDashSegments,
    /// A Smooth Streaming rendition reassembled from `fragments`.
    Ism,
    Rtmp,
    Rtsp,
    F4f,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::M3u8 => "m3u8",
            Protocol::M3u8Native => "m3u8_native",
            Protocol::HttpDashSegments => "http_dash_segments",
            Protocol::Ism => "ism",
            Protocol::Rtmp => "rtmp",
            Protocol::Rtsp => "rtsp",
            Protocol::F4f => "f4f",
        };
        f.write_str(s)
    }
}


/// One addressable unit of media data. Fragments must be concatenated in order to play the
/// rendition they belong to.
#[skip_serializing_none]
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fragment {
    pub url: String,
    /// Duration in seconds, when the manifest states or implies one.
    pub duration: Option<f64>,
    pub start_byte: Option<u64>,
    pub end_byte: Option<u64>,
}

impl Fragment {
    pub fn new(url: impl Into<String>) -> Fragment {
        Fragment { url: url.into(), ..Default::default() }
    }
}


/// Parameters a downstream Smooth Streaming fragment assembler needs in order to synthesize
/// container headers for the raw fragments. This library only computes and exposes them; it
/// never performs the assembly.
#[skip_serializing_none]
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsmDecodeParams {
    pub duration: u64,
    pub timescale: u64,
    pub width: u64,
    pub height: u64,
    pub fourcc: Option<String>,
    pub codec_private_data: Option<String>,
    pub sampling_rate: Option<u64>,
    pub channels: Option<u64>,
    pub bits_per_sample: Option<u64>,
    pub nal_unit_length_field: Option<u64>,
}


/// One concretely downloadable rendition extracted from a manifest.
///
/// All fields are optional; `url` is required unless `fragments` is non-empty, in which case
/// `url` may serve only as an initialization reference. Descriptors are value records with no
/// back-reference to the manifest they came from and may be freely copied, merged and
/// re-ordered.
#[skip_serializing_none]
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatDescriptor {
    /// Should be unique within one result set; used as a stable reference and as the final
    /// disambiguating sort key.
    pub format_id: Option<String>,
    pub url: Option<String>,
    /// The manifest this descriptor was extracted from, for re-resolution.
    pub manifest_url: Option<String>,
    pub ext: Option<String>,
    pub protocol: Option<Protocol>,
    pub container: Option<String>,
    /// Video codec string, or `"none"` for an audio-only stream.
    pub vcodec: Option<String>,
    /// Audio codec string, or `"none"` for a video-only stream.
    pub acodec: Option<String>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub fps: Option<f64>,
    /// Total bitrate in kbit/s.
    pub tbr: Option<f64>,
    /// Video bitrate in kbit/s.
    pub vbr: Option<f64>,
    /// Audio bitrate in kbit/s.
    pub abr: Option<f64>,
    /// Audio sample rate in Hz.
    pub asr: Option<u64>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
    pub language: Option<String>,
    /// Higher means more likely to be the page's primary language.
    pub language_preference: Option<i32>,
    pub quality: Option<i32>,
    pub source_preference: Option<i32>,
    /// When present, dominates the sort order. Values at or below -1000 mean "hide unless no
    /// strictly better alternative exists".
    pub preference: Option<f64>,
    pub format_note: Option<String>,
    /// Human-oriented resolution label (eg. `"multiple"` on an HLS meta format).
    pub resolution: Option<String>,
    /// RTMP play path, for `rtmp` protocol descriptors extracted from SMIL.
    pub play_path: Option<String>,
    /// Ordered fragment sequence, when the rendition is not a single file. Non-empty only for
    /// the `m3u8`, `m3u8_native`, `http_dash_segments` and `ism` protocols.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fragments: Vec<Fragment>,
    pub download_params: Option<IsmDecodeParams>,
}

impl FormatDescriptor {
    /// True when the descriptor carries no video track.
    pub fn is_audio_only(&self) -> bool {
        self.vcodec.as_deref() == Some("none")
    }

    /// True when the descriptor carries no audio track.
    pub fn is_video_only(&self) -> bool {
        self.acodec.as_deref() == Some("none") && !self.is_audio_only()
    }

    /// Fold `other` into `self`: fields set on `other` win on conflict, fields absent from
    /// `other` keep their current value. Used for the DASH upsert of Representations that
    /// reappear with the same id in another Period, and for backfilling nested-manifest
    /// results from parent metadata.
    pub fn merge_from(&mut self, other: FormatDescriptor) {
        macro_rules! take {
            ($($field:ident),+) => {
                $(if other.$field.is_some() { self.$field = other.$field; })+
            };
        }
        take!(format_id, url, manifest_url, ext, protocol, container, vcodec, acodec,
              width, height, fps, tbr, vbr, abr, asr, filesize, filesize_approx,
              language, language_preference, quality, source_preference, preference,
              format_note, resolution, play_path, download_params);
        if !other.fragments.is_empty() {
            self.fragments = other.fragments;
        }
    }
}


/// The result of fetching one manifest document: its decoded text and the URL the request
/// finally resolved to after redirects. The final URL is required for resolving DASH relative
/// `BaseURL` elements and HLS playlist self-references.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: String,
    pub final_url: String,
}

/// Collaborator through which all document retrieval happens. Implementations must follow
/// redirects and report the final resolved URL. The library applies no timeout or
/// cancellation of its own; wrap the implementation if those are needed.
pub trait PageFetcher {
    fn fetch(&self, url: &str, id: &str) -> Result<FetchedPage, ManifestError>;
}

/// Collaborator receiving non-fatal warnings (unsupported codecs, unknown MIME types,
/// skipped malformed elements). Warnings are additive and never interrupt parsing.
pub trait DiagnosticsSink {
    fn warn(&self, message: &str);
}

/// A [`DiagnosticsSink`] that forwards warnings to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }
}
