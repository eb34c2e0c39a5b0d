//! MPEG-DASH MPD parsing and segment reconstruction.
//!
//! The MPD element model below is deserialized with quick-xml + serde, so unknown elements
//! and attributes are ignored and we only model the subset relevant for format extraction.
//! The same structs serialize back to XML, which the tests use to synthesize manifests
//! programmatically.
//!
//! Segment addressing information (`SegmentList`/`SegmentTemplate`) is inherited down the
//! `Period → AdaptationSet → Representation` hierarchy and overridden at each level; the
//! [`MsInfo`] accumulator models that inheritance explicitly. A `Representation`'s fragments
//! are materialized from the innermost `MsInfo` and the context is discarded afterwards.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Serialize, Serializer, Deserialize};
use serde::de;
use serde_with::skip_serializing_none;
use std::collections::HashMap;
use std::time::Duration;
use crate::{DiagnosticsSink, FormatDescriptor, Fragment, ManifestError, Protocol};
use crate::util::{int_or_none, mimetype2ext, parse_codecs, parse_xs_duration, url_join};


// Deserialize an optional XML duration string to an Option<Duration>. This is a little
// trickier than deserializing a required field with serde.
fn deserialize_xs_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: de::Deserializer<'de>,
{
    match <Option<String>>::deserialize(deserializer) {
        Ok(optstring) => match optstring {
            Some(xs) => match parse_xs_duration(&xs) {
                Ok(d) => Ok(Some(d)),
                Err(e) => Err(de::Error::custom(e)),
            },
            None => Ok(None),
        },
        // the field isn't present, return an Ok(None)
        Err(_) => Ok(None),
    }
}

fn serialize_xs_duration<S>(oxs: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if let Some(xs) = oxs {
        let secs = xs.as_secs();
        let ms = xs.subsec_millis();
        serializer.serialize_str(&format!("PT{secs}.{ms:03}S"))
    } else {
        serializer.serialize_none()
    }
}


/// Describes a sequence of contiguous Segments with identical duration.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct S {
    /// start time; resets the running time cursor when given
    #[serde(rename = "@t")]
    pub t: Option<i64>,
    /// the duration, in timescale units
    #[serde(rename = "@d")]
    pub d: i64,
    /// the repeat count (number of contiguous Segments with identical duration minus one),
    /// defaulting to zero if not present
    #[serde(rename = "@r")]
    pub r: Option<i64>,
}

/// Contains a sequence of `S` elements, each of which describes a sequence of contiguous
/// segments of identical duration.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SegmentTimeline {
    #[serde(rename = "S")]
    pub segments: Vec<S>,
}

/// The first media segment in a sequence of Segments. Subsequent segments can be concatenated
/// to this segment to produce a media stream.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Initialization {
    #[serde(rename = "@sourceURL")]
    pub sourceURL: Option<String>,
}

/// Allows template-based `SegmentURL` construction. Specifies various substitution rules
/// using dynamic values such as `$Time$` and `$Number$` that map to a sequence of Segments.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SegmentTemplate {
    #[serde(rename = "@initialization")]
    pub initialization: Option<String>,
    #[serde(rename = "@media")]
    pub media: Option<String>,
    pub SegmentTimeline: Option<SegmentTimeline>,
    #[serde(rename = "Initialization")]
    pub initialization_element: Option<Initialization>,
    #[serde(rename = "@startNumber")]
    pub startNumber: Option<u64>,
    // note: ISO/IEC 23009-1 says this is an unsigned int, but manifests in the wild use
    // floating point values
    #[serde(rename = "@duration")]
    pub duration: Option<f64>,
    #[serde(rename = "@timescale")]
    pub timescale: Option<u64>,
}

/// The URL of a media segment.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SegmentURL {
    #[serde(rename = "@media")]
    pub media: Option<String>,
}

/// Contains a sequence of SegmentURL elements.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SegmentList {
    #[serde(rename = "@duration")]
    pub duration: Option<f64>,
    #[serde(rename = "@timescale")]
    pub timescale: Option<u64>,
    #[serde(rename = "@startNumber")]
    pub startNumber: Option<u64>,
    pub SegmentTimeline: Option<SegmentTimeline>,
    pub Initialization: Option<Initialization>,
    #[serde(rename = "SegmentURL")]
    pub segment_urls: Vec<SegmentURL>,
}

/// A URI string that specifies one or more common locations for Segments and other resources.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BaseURL {
    #[serde(rename = "$value")]
    pub base: String,
}

/// Contains information on DRM (rights management / encryption) mechanisms used in the
/// stream. Any subtree carrying this element is excluded from the extracted formats, since
/// the content cannot be used without decryption.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ContentProtection {
    #[serde(rename = "@schemeIdUri")]
    pub schemeIdUri: Option<String>,
    #[serde(rename = "@value")]
    pub value: Option<String>,
}

/// A representation describes a version of the content, using a specific encoding and
/// bitrate. Streams often have multiple representations with different bitrates, to allow
/// the client to select that most suitable to its network conditions.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Representation {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    // ISO/IEC 23009-1 says that @mimeType is mandatory, but in practice it is often
    // inherited from the enclosing AdaptationSet
    #[serde(rename = "@mimeType")]
    pub mimeType: Option<String>,
    /// An RFC6381 string, <https://tools.ietf.org/html/rfc6381>
    #[serde(rename = "@codecs")]
    pub codecs: Option<String>,
    #[serde(rename = "@frameRate")]
    pub frameRate: Option<String>, // can be something like "15/2"
    #[serde(rename = "@bandwidth")]
    pub bandwidth: Option<u64>,
    #[serde(rename = "@audioSamplingRate")]
    pub audioSamplingRate: Option<u64>,
    #[serde(rename = "@width")]
    pub width: Option<u64>,
    #[serde(rename = "@height")]
    pub height: Option<u64>,
    /// Language in RFC 5646 format
    #[serde(rename = "@lang")]
    pub lang: Option<String>,
    pub BaseURL: Vec<BaseURL>,
    pub SegmentTemplate: Option<SegmentTemplate>,
    pub SegmentList: Option<SegmentList>,
    #[serde(rename = "ContentProtection")]
    pub content_protection: Vec<ContentProtection>,
}

/// Contains a set of Representations. For example, if multiple language streams are
/// available for the audio content, each one can be in its own AdaptationSet.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AdaptationSet {
    #[serde(rename = "@id")]
    pub id: Option<i64>,
    #[serde(rename = "@contentType")]
    pub contentType: Option<String>,
    // eg "video/mp4"
    #[serde(rename = "@mimeType")]
    pub mimeType: Option<String>,
    #[serde(rename = "@codecs")]
    pub codecs: Option<String>,
    #[serde(rename = "@frameRate")]
    pub frameRate: Option<String>,
    #[serde(rename = "@bandwidth")]
    pub bandwidth: Option<u64>,
    #[serde(rename = "@audioSamplingRate")]
    pub audioSamplingRate: Option<u64>,
    #[serde(rename = "@width")]
    pub width: Option<u64>,
    #[serde(rename = "@height")]
    pub height: Option<u64>,
    /// Content language, in RFC 5646 format
    #[serde(rename = "@lang")]
    pub lang: Option<String>,
    pub BaseURL: Vec<BaseURL>,
    pub SegmentTemplate: Option<SegmentTemplate>,
    pub SegmentList: Option<SegmentList>,
    #[serde(rename = "ContentProtection")]
    pub content_protection: Vec<ContentProtection>,
    #[serde(rename = "Representation")]
    pub representations: Vec<Representation>,
}

/// Describes a chunk of the content with a start time and a duration. Content can be split
/// up into multiple periods (such as chapters, advertising segments).
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Period {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    // note: this is an xs:duration, not an unsigned int as for the segment-addressing
    // "duration" fields
    #[serde(rename = "@duration")]
    #[serde(deserialize_with = "deserialize_xs_duration", default)]
    #[serde(serialize_with = "serialize_xs_duration")]
    pub duration: Option<Duration>,
    pub BaseURL: Vec<BaseURL>,
    pub SegmentTemplate: Option<SegmentTemplate>,
    pub SegmentList: Option<SegmentList>,
    #[serde(rename = "AdaptationSet")]
    pub adaptations: Vec<AdaptationSet>,
}

/// The root node of a parsed DASH MPD manifest.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MPD {
    /// The Presentation Type, either "static" or "dynamic" (a live stream for which segments
    /// become available over time).
    #[serde(rename = "@type")]
    pub mpdtype: Option<String>,
    #[serde(rename = "@xmlns")]
    pub xmlns: Option<String>,
    #[serde(rename = "@profiles")]
    pub profiles: Option<String>,
    #[serde(rename = "@mediaPresentationDuration")]
    #[serde(deserialize_with = "deserialize_xs_duration", default)]
    #[serde(serialize_with = "serialize_xs_duration")]
    pub mediaPresentationDuration: Option<Duration>,
    #[serde(rename = "BaseURL")]
    pub base_url: Vec<BaseURL>,
    #[serde(rename = "Period", default)]
    pub periods: Vec<Period>,
}


/// Parse an MPD manifest, provided as an XML string, returning an [`MPD`] node.
pub fn parse_mpd(xml: &str) -> Result<MPD, ManifestError> {
    let mpd: Result<MPD, quick_xml::DeError> = quick_xml::de::from_str(xml);
    mpd.map_err(|e| ManifestError::Parsing(e.to_string()))
}


// Segment-addressing context threaded through the MPD → Period → AdaptationSet →
// Representation hierarchy: each level starts from its parent's context and overrides the
// pieces it declares itself.
#[derive(Debug, Clone)]
struct MsInfo {
    start_number: u64,
    /// units per second
    timescale: u64,
    /// in timescale units
    segment_duration: Option<f64>,
    total_number: Option<u64>,
    s: Vec<S>,
    segment_urls: Vec<String>,
    media_template: Option<String>,
    initialization_url: Option<String>,
}

impl Default for MsInfo {
    fn default() -> Self {
        MsInfo {
            start_number: 1,
            timescale: 1,
            segment_duration: None,
            total_number: None,
            s: Vec::new(),
            segment_urls: Vec::new(),
            media_template: None,
            initialization_url: None,
        }
    }
}

impl MsInfo {
    // Attributes and elements shared by SegmentList and SegmentTemplate, as per
    // ISO/IEC 23009-1 5.3.9.2.2.
    fn extract_common(&mut self,
                      start_number: Option<u64>,
                      timescale: Option<u64>,
                      duration: Option<f64>,
                      timeline: Option<&SegmentTimeline>) {
        if let Some(tl) = timeline {
            if !tl.segments.is_empty() {
                let mut total: u64 = 0;
                for s in &tl.segments {
                    total += 1 + s.r.unwrap_or(0).max(0) as u64;
                }
                self.total_number = Some(total);
                self.s = tl.segments.clone();
            }
        }
        if let Some(n) = start_number {
            self.start_number = n;
        }
        if let Some(ts) = timescale {
            self.timescale = ts;
        }
        if let Some(d) = duration {
            self.segment_duration = Some(d);
        }
    }

    fn extend(&self, segment_list: Option<&SegmentList>, segment_template: Option<&SegmentTemplate>) -> MsInfo {
        let mut ms_info = self.clone();
        if let Some(sl) = segment_list {
            ms_info.extract_common(sl.startNumber, sl.timescale, sl.duration,
                                   sl.SegmentTimeline.as_ref());
            if let Some(init) = &sl.Initialization {
                if let Some(source) = &init.sourceURL {
                    ms_info.initialization_url = Some(source.clone());
                }
            }
            let urls: Vec<String> = sl.segment_urls.iter()
                .filter_map(|su| su.media.clone())
                .collect();
            if !urls.is_empty() {
                ms_info.segment_urls = urls;
            }
        } else if let Some(st) = segment_template {
            ms_info.extract_common(st.startNumber, st.timescale, st.duration,
                                   st.SegmentTimeline.as_ref());
            if let Some(media) = &st.media {
                ms_info.media_template = Some(media.clone());
            }
            if let Some(init) = &st.initialization {
                ms_info.initialization_url = Some(init.clone());
            } else if let Some(init) = &st.initialization_element {
                if let Some(source) = &init.sourceURL {
                    ms_info.initialization_url = Some(source.clone());
                }
            }
        }
        ms_info
    }
}


// Substitute $Number$, $Time$ and $Bandwidth$ placeholders, with an optional printf-style
// format modifier such as $Number%05d$. $$ is a literal $. $RepresentationID$ is handled
// separately as a plain substring replacement since its value is not numeric.
pub(crate) fn fill_template(template: &str,
                            number: Option<i64>,
                            time: Option<i64>,
                            bandwidth: Option<i64>) -> String {
    lazy_static! {
        static ref TEMPLATE_VAR: Regex =
            Regex::new(r"\$(Number|Bandwidth|Time)(?:%([^$]*))?\$").unwrap();
    }
    let out = TEMPLATE_VAR.replace_all(template, |caps: &regex::Captures| {
        let value = match &caps[1] {
            "Number" => number,
            "Time" => time,
            _ => bandwidth,
        };
        match value {
            Some(v) => format_with_modifier(v, caps.get(2).map(|m| m.as_str())),
            None => caps[0].to_string(),
        }
    });
    out.replace("$$", "$")
}

fn format_with_modifier(value: i64, modifier: Option<&str>) -> String {
    if let Some(m) = modifier {
        if let Some(width_spec) = m.strip_suffix('d') {
            let zero_pad = width_spec.starts_with('0');
            if let Ok(width) = width_spec.trim_start_matches('0').parse::<usize>() {
                return if zero_pad {
                    format!("{value:0width$}")
                } else {
                    format!("{value:width$}")
                };
            }
        }
    }
    format!("{value}")
}


/// Extract formats from a parsed MPD manifest.
///
/// `mpd_base_url` is the directory of the URL the manifest was finally fetched from, used to
/// resolve relative `BaseURL` chains; `mpd_url` is recorded as `manifest_url` on every
/// descriptor. `formats_dict` optionally supplies extra per-Representation metadata merged
/// beneath the parsed fields.
///
/// Dynamic (live) presentations yield no formats. A Representation with the same id
/// appearing in several Periods is merged into a single descriptor, later data winning on
/// conflicting fields, rather than duplicated.
pub fn parse_mpd_formats(mpd: &MPD,
                         mpd_id: Option<&str>,
                         mpd_base_url: &str,
                         mpd_url: Option<&str>,
                         formats_dict: Option<&HashMap<String, FormatDescriptor>>,
                         diagnostics: &dyn DiagnosticsSink)
                         -> Result<Vec<FormatDescriptor>, ManifestError> {
    if mpd.mpdtype.as_deref() == Some("dynamic") {
        return Ok(Vec::new());
    }
    let mpd_duration = mpd.mediaPresentationDuration.map(|d| d.as_secs_f64());

    // Upsert on representation id, materialized to an ordered list at the end.
    let mut formats: Vec<FormatDescriptor> = Vec::new();
    let mut by_representation_id: HashMap<String, usize> = HashMap::new();

    for period in &mpd.periods {
        let period_duration = period.duration.map(|d| d.as_secs_f64()).or(mpd_duration);
        let period_ms_info = MsInfo::default()
            .extend(period.SegmentList.as_ref(), period.SegmentTemplate.as_ref());
        for adaptation_set in &period.adaptations {
            if !adaptation_set.content_protection.is_empty() {
                // DRM-protected subtree
                continue;
            }
            let adaptation_ms_info = period_ms_info
                .extend(adaptation_set.SegmentList.as_ref(), adaptation_set.SegmentTemplate.as_ref());
            for representation in &adaptation_set.representations {
                if !representation.content_protection.is_empty() {
                    continue;
                }
                // Representation attributes override AdaptationSet attributes.
                let mime_type = representation.mimeType.as_deref()
                    .or(adaptation_set.mimeType.as_deref())
                    .ok_or_else(|| ManifestError::NotFound("mimeType".to_string()))?;
                let content_type = mime_type.split('/').next().unwrap_or("");
                if content_type == "text" {
                    // Subtitle streams are recognized but not turned into formats.
                    continue;
                }
                if content_type != "video" && content_type != "audio" {
                    diagnostics.warn(&format!("Unknown MIME type {mime_type} in DASH manifest"));
                    continue;
                }
                match extract_representation_format(
                        mpd, period, adaptation_set, representation, &adaptation_ms_info,
                        mime_type, content_type, period_duration,
                        mpd_id, mpd_base_url, mpd_url, diagnostics) {
                    Some(f) => {
                        let rep_id = representation.id.clone().unwrap_or_default();
                        match by_representation_id.get(&rep_id) {
                            Some(&idx) => formats[idx].merge_from(f),
                            None => {
                                let mut full = formats_dict
                                    .and_then(|d| d.get(&rep_id))
                                    .cloned()
                                    .unwrap_or_default();
                                full.merge_from(f);
                                by_representation_id.insert(rep_id, formats.len());
                                formats.push(full);
                            },
                        }
                    },
                    // A malformed Representation only skips itself.
                    None => continue,
                }
            }
        }
    }
    Ok(formats)
}

#[allow(clippy::too_many_arguments)]
fn extract_representation_format(mpd: &MPD,
                                 period: &Period,
                                 adaptation_set: &AdaptationSet,
                                 representation: &Representation,
                                 parent_ms_info: &MsInfo,
                                 mime_type: &str,
                                 content_type: &str,
                                 period_duration: Option<f64>,
                                 mpd_id: Option<&str>,
                                 mpd_base_url: &str,
                                 mpd_url: Option<&str>,
                                 diagnostics: &dyn DiagnosticsSink)
                                 -> Option<FormatDescriptor> {
    // Concatenate the first BaseURL found walking Representation → AdaptationSet → Period →
    // MPD, stopping early once an absolute URL has been formed, then join against the
    // manifest's own resolved base.
    let mut base_url = String::new();
    for urls in [&representation.BaseURL, &adaptation_set.BaseURL, &period.BaseURL, &mpd.base_url] {
        if let Some(b) = urls.first() {
            base_url = format!("{}{}", b.base, base_url);
            if base_url.starts_with("http://") || base_url.starts_with("https://") {
                break;
            }
        }
    }
    if !mpd_base_url.is_empty() && !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        let mut prefix = mpd_base_url.to_string();
        if !prefix.ends_with('/') && !base_url.starts_with('/') {
            prefix.push('/');
        }
        base_url = format!("{prefix}{base_url}");
    }

    let representation_id = representation.id.as_deref();
    let bandwidth = representation.bandwidth.or(adaptation_set.bandwidth);
    let lang = representation.lang.as_deref().or(adaptation_set.lang.as_deref());
    let mut f = FormatDescriptor {
        format_id: Some(match (mpd_id, representation_id) {
            (Some(mpd_id), rep) => format!("{}-{}", mpd_id, rep.unwrap_or_default()),
            (None, rep) => rep.unwrap_or_default().to_string(),
        }),
        url: Some(base_url.clone()),
        manifest_url: mpd_url.map(String::from),
        ext: mimetype2ext(mime_type).map(String::from),
        width: representation.width.or(adaptation_set.width),
        height: representation.height.or(adaptation_set.height),
        tbr: bandwidth.map(|b| b as f64 / 1000.0),
        asr: representation.audioSamplingRate.or(adaptation_set.audioSamplingRate),
        fps: int_or_none(representation.frameRate.as_deref()
                 .or(adaptation_set.frameRate.as_deref()))
             .map(|n| n as f64),
        language: match lang {
            // Special-value language tags carry no useful information.
            Some("mul") | Some("und") | Some("zxx") | Some("mis") | None => None,
            Some(l) => Some(l.to_string()),
        },
        format_note: Some(format!("DASH {content_type}")),
        ..Default::default()
    };
    if let Some(codecs) = representation.codecs.as_deref().or(adaptation_set.codecs.as_deref()) {
        let parsed = parse_codecs(codecs);
        if parsed.vcodec.is_some() {
            f.vcodec = parsed.vcodec;
        }
        if parsed.acodec.is_some() {
            f.acodec = parsed.acodec;
        }
    }

    let ms_info = parent_ms_info
        .extend(representation.SegmentList.as_ref(), representation.SegmentTemplate.as_ref());
    let bandwidth_i = bandwidth.map(|b| b as i64);
    let mut fragments: Option<Vec<Fragment>> = None;

    if ms_info.segment_urls.is_empty() && ms_info.media_template.is_some() {
        let media_template = ms_info.media_template.as_ref().unwrap()
            .replace("$RepresentationID$", representation_id.unwrap_or_default());
        // As per ISO/IEC 23009-1 5.3.9.4.4, $Number$ and $Time$ cannot be used at the same
        // time, so a template without a timeline is number-addressed.
        if media_template.contains("$Number") && ms_info.s.is_empty() {
            let segment_duration = ms_info.segment_duration.map(|d| d / ms_info.timescale as f64);
            let total_number = match ms_info.total_number {
                Some(n) => n,
                None => match (segment_duration, period_duration) {
                    (Some(sd), Some(pd)) if sd > 0.0 => (pd / sd).ceil() as u64,
                    _ => {
                        diagnostics.warn(&format!(
                            "Cannot determine fragment count for representation {}",
                            representation_id.unwrap_or_default()));
                        return None;
                    },
                },
            };
            let frags = (ms_info.start_number..ms_info.start_number + total_number)
                .map(|segment_number| Fragment {
                    url: fill_template(&media_template, Some(segment_number as i64), None, bandwidth_i),
                    duration: segment_duration,
                    ..Default::default()
                })
                .collect();
            fragments = Some(frags);
        } else if !ms_info.s.is_empty() {
            // $Number$ or $Time$ with an explicit timeline: walk its entries in order, each
            // contributing 1 + r fragments. An explicit t resets the running time cursor,
            // otherwise the cursor accumulates d after each emitted fragment.
            let mut frags = Vec::new();
            let mut segment_time: i64 = 0;
            let mut segment_number = ms_info.start_number as i64;
            for s in &ms_info.s {
                if let Some(t) = s.t {
                    segment_time = t;
                }
                let duration = Some(s.d as f64 / ms_info.timescale as f64);
                for repeat in 0..=s.r.unwrap_or(0).max(0) {
                    if repeat > 0 {
                        segment_time += s.d;
                    }
                    frags.push(Fragment {
                        url: fill_template(&media_template,
                                           Some(segment_number), Some(segment_time), bandwidth_i),
                        duration,
                        ..Default::default()
                    });
                    segment_number += 1;
                }
                segment_time += s.d;
            }
            fragments = Some(frags);
        }
    } else if !ms_info.segment_urls.is_empty() && !ms_info.s.is_empty() {
        // Explicit per-segment URLs paired positionally against the timeline durations: one
        // timeline entry's r-fold repeat consumes that many list URLs. A cardinality
        // mismatch between the two is a validation error for this Representation.
        let mut durations: Vec<f64> = Vec::new();
        for s in &ms_info.s {
            for _ in 0..=s.r.unwrap_or(0).max(0) {
                durations.push(s.d as f64 / ms_info.timescale as f64);
            }
        }
        if durations.len() != ms_info.segment_urls.len() {
            diagnostics.warn(&format!(
                "SegmentURL count {} does not match SegmentTimeline cardinality {} for representation {}",
                ms_info.segment_urls.len(), durations.len(), representation_id.unwrap_or_default()));
            return None;
        }
        let frags = ms_info.segment_urls.iter().zip(durations)
            .map(|(url, duration)| Fragment {
                url: url.clone(),
                duration: Some(duration),
                ..Default::default()
            })
            .collect();
        fragments = Some(frags);
    }

    // NB: an MPD manifest may contain direct URLs to unfragmented media, in which case no
    // fragment reconstruction takes place and base_url is the stream itself.
    if let Some(mut frags) = fragments {
        f.protocol = Some(Protocol::HttpDashSegments);
        if let Some(init) = &ms_info.initialization_url {
            let initialization_url = fill_template(
                &init.replace("$RepresentationID$", representation_id.unwrap_or_default()),
                None, None, bandwidth_i);
            if f.url.as_deref().map_or(true, str::is_empty) {
                f.url = Some(initialization_url.clone());
            }
            frags.insert(0, Fragment::new(initialization_url));
        }
        for fragment in &mut frags {
            if let Some(resolved) = url_join(&base_url, &fragment.url) {
                fragment.url = resolved;
            }
        }
        f.fragments = frags;
    }
    Some(f)
}
