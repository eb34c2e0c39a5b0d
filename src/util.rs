//! Leaf utilities converting loosely-typed manifest attributes into typed values.
//!
//! Manifest attributes arrive as strings that are frequently absent, padded with whitespace,
//! or syntactically sloppy. These helpers coerce them into typed values or `None` rather than
//! failing, matching the tolerance that in-the-wild manifests require.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;
use crate::ManifestError;


/// Parse an optional attribute as an integer, tolerating surrounding whitespace and thousands
/// separators. Returns `None` for absent or unparseable input.
pub fn int_or_none(v: Option<&str>) -> Option<i64> {
    let v = v?.trim();
    if v.is_empty() {
        return None;
    }
    v.replace(',', "").parse::<i64>().ok()
}

/// Like [`int_or_none`], dividing the result by `scale` (eg. 1000 for bit/s to kbit/s).
pub fn int_or_none_scaled(v: Option<&str>, scale: i64) -> Option<i64> {
    int_or_none(v).map(|n| n / scale)
}

/// Parse an optional attribute as a float. Returns `None` for absent or unparseable input.
pub fn float_or_none(v: Option<&str>) -> Option<f64> {
    let v = v?.trim();
    if v.is_empty() {
        return None;
    }
    v.parse::<f64>().ok()
}

/// Like [`float_or_none`], dividing the result by `scale`.
pub fn float_or_none_scaled(v: Option<&str>, scale: f64) -> Option<f64> {
    float_or_none(v).map(|f| f / scale)
}


// Parse an XML duration string, as per https://www.w3.org/TR/xmlschema-2/#duration
//
// The lexical representation for duration is the ISO 8601 extended format PnYnMnDTnHnMnS.
// The number of seconds can include decimal digits to arbitrary precision. Examples:
// "PT0H0M30.030S", "PT1.2S", "PT1004199059S", "P23DT23H".
//
// Limitations: negative durations (leading "-") are rejected due to the choice of a
// std::time::Duration, and fractional parts are only accepted in the seconds component.
pub fn parse_xs_duration(s: &str) -> Result<Duration, ManifestError> {
    lazy_static! {
        static ref XS_DURATION: Regex = Regex::new(concat!(
            r"^(?P<sign>[+-])?P",
            r"(?:(?P<years>\d+)Y)?",
            r"(?:(?P<months>\d+)M)?",
            r"(?:(?P<weeks>\d+)W)?",
            r"(?:(?P<days>\d+)D)?",
            r"(?:(?P<hastime>T)", // time part must begin with a T
            r"(?:(?P<hours>\d+)H)?",
            r"(?:(?P<minutes>\d+)M)?",
            r"(?:(?P<seconds>\d+)(?:(?P<nanoseconds>[.,]\d+)?)S)?",
            r")?")).unwrap();
    }
    match XS_DURATION.captures(s) {
        Some(m) => {
            if m.name("hastime").is_none() &&
               m.name("years").is_none() &&
               m.name("months").is_none() &&
               m.name("weeks").is_none() &&
               m.name("days").is_none() {
                return Err(ManifestError::InvalidDuration("empty".to_string()));
            }
            // An oversized component (eg. PT99999999999999999999S) is a malformed manifest,
            // not a panic.
            let overflow = || ManifestError::InvalidDuration("component out of range".to_string());
            let component = |name: &str| -> Result<Option<u64>, ManifestError> {
                match m.name(name) {
                    Some(s) => s.as_str().parse::<u64>()
                        .map(Some)
                        .map_err(|_| overflow()),
                    None => Ok(None),
                }
            };
            let mut secs: u64 = 0;
            let mut nsecs: u32 = 0;
            if let Some(s) = m.name("nanoseconds") {
                let mut s = &s.as_str()[1..]; // drop initial "."
                if s.len() > 9 {
                    s = &s[..9];
                }
                let padded = format!("{s:0<9}");
                nsecs = padded.parse::<u32>().map_err(|_| overflow())?;
            }
            let units: [(&str, u64); 7] = [
                ("seconds", 1),
                ("minutes", 60),
                ("hours", 60 * 60),
                ("days", 60 * 60 * 24),
                ("weeks", 60 * 60 * 24 * 7),
                ("months", 60 * 60 * 24 * 30),
                ("years", 60 * 60 * 24 * 365),
            ];
            for (name, unit) in units {
                if let Some(v) = component(name)? {
                    secs = v.checked_mul(unit)
                        .and_then(|scaled| secs.checked_add(scaled))
                        .ok_or_else(overflow)?;
                }
            }
            if let Some(s) = m.name("sign") {
                if s.as_str() == "-" {
                    return Err(ManifestError::InvalidDuration("can't represent negative durations".to_string()));
                }
            }
            Ok(Duration::new(secs, nsecs))
        },
        None => Err(ManifestError::InvalidDuration("couldn't parse XS duration".to_string())),
    }
}

/// Optional-attribute variant of [`parse_xs_duration`] yielding fractional seconds.
pub fn duration_or_none(v: Option<&str>) -> Option<f64> {
    parse_xs_duration(v?).ok().map(|d| d.as_secs_f64())
}


/// Normalize a loosely formatted date to `YYYYMMDD`, as found in SMIL `<meta name="date">`
/// elements.
pub fn unified_strdate(s: &str) -> Option<String> {
    let s = s.trim().replace('/', "-");
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(&s) {
        return Some(dt.format("%Y%m%d").to_string());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(&s, fmt) {
            return Some(dt.format("%Y%m%d").to_string());
        }
    }
    for fmt in ["%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y", "%B %d %Y", "%b %d %Y", "%Y%m%d"] {
        if let Ok(d) = chrono::NaiveDate::parse_from_str(&s, fmt) {
            return Some(d.format("%Y%m%d").to_string());
        }
    }
    // Datetime with an unparseable time part: keep just the date.
    let date_part = s.split(['T', ' ']).next().unwrap_or(&s);
    if date_part.len() < s.len() {
        if let Ok(d) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
            return Some(d.format("%Y%m%d").to_string());
        }
    }
    None
}


/// Determine a filename extension from a URL, ignoring any query string. Returns `None` when
/// the last path segment has no plausible (short, alphanumeric) extension.
pub fn determine_ext(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let basename = path.rsplit('/').next().unwrap_or("");
    let ext = basename.rsplit('.').next()?;
    if ext == basename || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    if ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}

/// Map a MIME type to the conventional filename extension for its container.
pub fn mimetype2ext(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    let ext = match essence.as_str() {
        "audio/mp4" => "m4a",
        // Per RFC 3003, audio/mpeg can be mp1, mp2 or mp3, but mp3 is the most common.
        "audio/mpeg" => "mp3",
        "audio/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/aac" => "aac",
        "audio/wav" | "audio/x-wav" => "wav",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/ogg" => "ogv",
        "video/x-flv" => "flv",
        "video/3gpp" => "3gp",
        "video/mp2t" => "ts",
        "video/quicktime" => "mov",
        "application/x-mpegurl" | "application/vnd.apple.mpegurl" => "m3u8",
        "application/dash+xml" => "mpd",
        "application/f4m+xml" | "application/adobe-f4m" => "f4m",
        "application/vnd.ms-sstr+xml" => "ism",
        "text/vtt" => "vtt",
        "application/ttml+xml" | "application/ttaf+xml" => "ttml",
        "application/x-srt" | "text/srt" => "srt",
        _ => return None,
    };
    Some(ext)
}


/// The video/audio codec pair declared by an RFC 6381 codecs string (eg. HLS `CODECS` or DASH
/// `@codecs`). A field set to `"none"` means the stream explicitly lacks that track; `None`
/// means the attribute didn't say.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedCodecs {
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
}

/// Split an RFC 6381 codecs string into video and audio codec identifiers.
pub fn parse_codecs(codecs_str: &str) -> ParsedCodecs {
    let split: Vec<&str> = codecs_str
        .trim()
        .trim_matches(',')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if split.is_empty() {
        return ParsedCodecs::default();
    }
    let mut vcodec: Option<String> = None;
    let mut acodec: Option<String> = None;
    for full_codec in &split {
        let codec = full_codec.split('.').next().unwrap_or(full_codec);
        match codec {
            "avc1" | "avc2" | "avc3" | "avc4" | "vp8" | "vp9" | "av01" |
            "hev1" | "hev2" | "hvc1" | "h263" | "h264" | "mp4v" => {
                if vcodec.is_none() {
                    vcodec = Some((*full_codec).to_string());
                }
            },
            "mp4a" | "opus" | "vorbis" | "mp3" | "aac" | "flac" |
            "ac-3" | "ec-3" | "eac3" | "dtsc" | "dtse" | "dtsh" | "dtsl" => {
                if acodec.is_none() {
                    acodec = Some((*full_codec).to_string());
                }
            },
            _ => tracing::debug!("unknown codec {full_codec}"),
        }
    }
    if vcodec.is_none() && acodec.is_none() {
        // Neither identifier is one we recognize; with exactly two entries, assume the
        // conventional video,audio order rather than discarding them.
        if split.len() == 2 {
            return ParsedCodecs {
                vcodec: Some(split[0].to_string()),
                acodec: Some(split[1].to_string()),
            };
        }
        return ParsedCodecs::default();
    }
    ParsedCodecs {
        vcodec: Some(vcodec.unwrap_or_else(|| "none".to_string())),
        acodec: Some(acodec.unwrap_or_else(|| "none".to_string())),
    }
}


/// Parse the attribute list of an `#EXT-X-STREAM-INF:` or `#EXT-X-MEDIA:` tag into a map,
/// stripping quotes from quoted values.
pub fn parse_m3u8_attributes(line: &str) -> HashMap<String, String> {
    lazy_static! {
        static ref M3U8_ATTR: Regex =
            Regex::new(r#"(?P<key>[A-Z0-9-]+)=(?P<val>"[^"]+"|[^",]+)(?:,|$)"#).unwrap();
    }
    let mut info = HashMap::new();
    // Accept either a full tag line or just its attribute list. Splitting on the first ':'
    // is only safe when the tag name is still present, since attribute values may contain
    // colons (eg. URI="http://...").
    let attrib = if line.starts_with('#') {
        line.split_once(':').map(|(_, rest)| rest).unwrap_or(line)
    } else {
        line
    };
    for caps in M3U8_ATTR.captures_iter(attrib) {
        let mut val = caps.name("val").unwrap().as_str();
        if val.starts_with('"') {
            val = &val[1..val.len() - 1];
        }
        info.insert(caps.name("key").unwrap().as_str().to_string(), val.to_string());
    }
    info
}


/// Escape bare ampersands so that sloppy manifests (common with F4M generators) survive a
/// strict XML parser.
pub fn fix_xml_ampersands(xml: &str) -> String {
    lazy_static! {
        static ref AMP: Regex =
            Regex::new(r"&(amp;|lt;|gt;|apos;|quot;|#x?[0-9a-fA-F]+;)?").unwrap();
    }
    AMP.replace_all(xml, |caps: &regex::Captures| {
        match caps.get(1) {
            // Already a recognized entity reference, leave it alone.
            Some(entity) => format!("&{}", entity.as_str()),
            None => "&amp;".to_string(),
        }
    }).into_owned()
}


/// Join a possibly relative URL against a base, returning the input unchanged when it is
/// already absolute. Returns `None` when neither interpretation produces a valid URL.
pub fn url_join(base: &str, reference: &str) -> Option<String> {
    if reference.is_empty() {
        return None;
    }
    if let Ok(u) = Url::parse(reference) {
        return Some(u.to_string());
    }
    let base = Url::parse(base).ok()?;
    base.join(reference).ok().map(|u| u.to_string())
}

/// The directory part of a URL: everything up to and including the final `/` of the path.
pub fn base_url(url: &str) -> String {
    let stripped = url.split(['?', '#']).next().unwrap_or(url);
    // Only a '/' past the scheme separator delimits the path; "http://host" has none.
    let path_start = stripped.find("://").map(|pos| pos + 3).unwrap_or(0);
    match stripped.rfind('/') {
        Some(pos) if pos >= path_start => stripped[..pos + 1].to_string(),
        _ => {
            let mut s = stripped.to_string();
            if !s.ends_with('/') {
                s.push('/');
            }
            s
        },
    }
}

/// Infer the retrieval protocol of a descriptor URL from its scheme and extension, for
/// descriptors that don't carry an explicit one.
pub fn determine_protocol(url: &str) -> crate::Protocol {
    use crate::Protocol;
    if url.starts_with("rtmp") {
        return Protocol::Rtmp;
    }
    if url.starts_with("rtsp") {
        return Protocol::Rtsp;
    }
    match determine_ext(url).as_deref() {
        Some("m3u8") => Protocol::M3u8,
        Some("f4m") => Protocol::F4f,
        _ => {
            if url.starts_with("https") {
                Protocol::Https
            } else {
                Protocol::Http
            }
        },
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_float_coercion() {
        assert_eq!(int_or_none(Some("1500000")), Some(1_500_000));
        assert_eq!(int_or_none(Some(" 42 ")), Some(42));
        assert_eq!(int_or_none(Some("1,500")), Some(1500));
        assert_eq!(int_or_none(Some("")), None);
        assert_eq!(int_or_none(Some("abc")), None);
        assert_eq!(int_or_none(None), None);
        assert_eq!(int_or_none_scaled(Some("1500000"), 1000), Some(1500));
        assert_eq!(float_or_none(Some("29.97")), Some(29.97));
        assert_eq!(float_or_none(Some("x")), None);
        assert_eq!(float_or_none_scaled(Some("128000"), 1000.0), Some(128.0));
    }

    #[test]
    fn test_parse_xs_duration() {
        assert!(parse_xs_duration("").is_err());
        assert!(parse_xs_duration("foobles").is_err());
        assert!(parse_xs_duration("P").is_err());
        assert!(parse_xs_duration("1Y2M3DT4H5M6S").is_err()); // missing initial P
        assert_eq!(parse_xs_duration("PT3H11M53S").ok(), Some(Duration::new(11513, 0)));
        assert_eq!(parse_xs_duration("PT1.5S").ok(), Some(Duration::new(1, 500_000_000)));
        assert_eq!(parse_xs_duration("PT0S").ok(), Some(Duration::new(0, 0)));
        assert_eq!(parse_xs_duration("PT344S").ok(), Some(Duration::new(344, 0)));
        assert_eq!(parse_xs_duration("PT72H").ok(), Some(Duration::new(72 * 60 * 60, 0)));
        assert_eq!(parse_xs_duration("PT0H0M30.030S").ok(), Some(Duration::new(30, 30_000_000)));
        assert_eq!(parse_xs_duration("P23DT23H").ok(), Some(Duration::new(2_070_000, 0)));
        assert_eq!(parse_xs_duration("P1Y2M3DT4H5M6,7S").ok(), Some(Duration::new(36_993_906, 700_000_000)));
        assert!(parse_xs_duration("-PT4H").is_err());
        // components too large for u64 are a parse error, not a panic
        assert!(parse_xs_duration("PT99999999999999999999S").is_err());
        assert!(parse_xs_duration("P99999999999999999999Y").is_err());
        assert!(parse_xs_duration("P18446744073709551615YT1S").is_err()); // overflowing sum
        assert_eq!(duration_or_none(Some("PT12S")), Some(12.0));
        assert_eq!(duration_or_none(None), None);
    }

    #[test]
    fn test_unified_strdate() {
        assert_eq!(unified_strdate("2016-03-14"), Some("20160314".to_string()));
        assert_eq!(unified_strdate("2016/03/14"), Some("20160314".to_string()));
        assert_eq!(unified_strdate("14.03.2016"), Some("20160314".to_string()));
        assert_eq!(unified_strdate("2016-03-14T10:04:00"), Some("20160314".to_string()));
        assert_eq!(unified_strdate("not a date"), None);
    }

    #[test]
    fn test_determine_ext() {
        assert_eq!(determine_ext("http://x.example/video.mp4"), Some("mp4".to_string()));
        assert_eq!(determine_ext("http://x.example/a/master.m3u8?token=abc"), Some("m3u8".to_string()));
        assert_eq!(determine_ext("http://x.example/manifest.f4m"), Some("f4m".to_string()));
        assert_eq!(determine_ext("http://x.example/path/noext"), None);
        assert_eq!(determine_ext("http://x.example/archive.tar.gz"), Some("gz".to_string()));
    }

    #[test]
    fn test_mimetype2ext() {
        assert_eq!(mimetype2ext("video/mp4"), Some("mp4"));
        assert_eq!(mimetype2ext("audio/mp4"), Some("m4a"));
        assert_eq!(mimetype2ext("application/x-mpegURL"), Some("m3u8"));
        assert_eq!(mimetype2ext("video/mp4; codecs=\"avc1.42E01E\""), Some("mp4"));
        assert_eq!(mimetype2ext("application/octet-stream"), None);
    }

    #[test]
    fn test_parse_codecs() {
        assert_eq!(parse_codecs(""), ParsedCodecs::default());
        assert_eq!(
            parse_codecs("avc1.77.30, mp4a.40.2"),
            ParsedCodecs {
                vcodec: Some("avc1.77.30".to_string()),
                acodec: Some("mp4a.40.2".to_string()),
            });
        assert_eq!(
            parse_codecs("mp4a.40.2"),
            ParsedCodecs {
                vcodec: Some("none".to_string()),
                acodec: Some("mp4a.40.2".to_string()),
            });
        assert_eq!(
            parse_codecs("avc1.42001e"),
            ParsedCodecs {
                vcodec: Some("avc1.42001e".to_string()),
                acodec: Some("none".to_string()),
            });
    }

    #[test]
    fn test_parse_m3u8_attributes() {
        let attrs = parse_m3u8_attributes(
            r#"#EXT-X-STREAM-INF:BANDWIDTH=1500000,RESOLUTION=1280x720,CODECS="avc1.77.30, mp4a.40.2",NAME=720"#);
        assert_eq!(attrs.get("BANDWIDTH").map(String::as_str), Some("1500000"));
        assert_eq!(attrs.get("RESOLUTION").map(String::as_str), Some("1280x720"));
        assert_eq!(attrs.get("CODECS").map(String::as_str), Some("avc1.77.30, mp4a.40.2"));
        assert_eq!(attrs.get("NAME").map(String::as_str), Some("720"));
    }

    #[test]
    fn test_fix_xml_ampersands() {
        assert_eq!(fix_xml_ampersands("a&b"), "a&amp;b");
        assert_eq!(fix_xml_ampersands("a&amp;b"), "a&amp;b");
        assert_eq!(fix_xml_ampersands("a&#38;b &lt;c&gt;"), "a&#38;b &lt;c&gt;");
    }

    #[test]
    fn test_url_helpers() {
        assert_eq!(url_join("http://x.example/a/manifest.f4m", "media.f4m"),
                   Some("http://x.example/a/media.f4m".to_string()));
        assert_eq!(url_join("http://x.example/a/", "http://y.example/b"),
                   Some("http://y.example/b".to_string()));
        assert_eq!(url_join("http://x.example/a/", ""), None);
        assert_eq!(base_url("http://x.example/a/b/manifest.mpd"), "http://x.example/a/b/");
        assert_eq!(base_url("http://x.example"), "http://x.example/");
        // single-character hosts still split at the last path separator
        assert_eq!(base_url("http://a/x.mpd"), "http://a/");
        assert_eq!(base_url("http://a/b/x.mpd?tok=1"), "http://a/b/");
    }
}
