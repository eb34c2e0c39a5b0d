//! Format selection: a deterministic total order over heterogeneous format descriptors, plus
//! duplicate removal.
//!
//! Sorting is ascending by a composite key, so the preferred format ends up *last*. Missing
//! numeric attributes rank below any present value, which keeps well-described formats ahead
//! of sparsely-described ones.

use std::cmp::Ordering;
use std::collections::HashSet;
use crate::{FormatDescriptor, ManifestError, Protocol};
use crate::util::{determine_ext, determine_protocol};


/// Options controlling [`sort_formats`].
#[derive(Debug, Default, Clone)]
pub struct SortOptions {
    /// Rank patent-free containers (webm, ogg, opus) above the default mp4/aac ordering.
    pub prefer_free_formats: bool,
    /// When set, sort by exactly these attribute names in order, ignoring the composite key.
    pub field_preference: Option<Vec<String>>,
}

/// One component of a sort key. Numeric components order by value with `f64::total_cmp`;
/// the only string component in the composite key is the format id tie-breaker.
#[derive(Debug, Clone, PartialEq)]
enum KeyPart {
    Num(f64),
    Str(String),
}

impl KeyPart {
    fn compare(&self, other: &KeyPart) -> Ordering {
        match (self, other) {
            (KeyPart::Num(a), KeyPart::Num(b)) => a.total_cmp(b),
            (KeyPart::Str(a), KeyPart::Str(b)) => a.cmp(b),
            (KeyPart::Num(_), KeyPart::Str(_)) => Ordering::Less,
            (KeyPart::Str(_), KeyPart::Num(_)) => Ordering::Greater,
        }
    }
}

fn compare_keys(a: &[KeyPart], b: &[KeyPart]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.compare(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

fn num(v: Option<f64>) -> KeyPart {
    KeyPart::Num(v.unwrap_or(-1.0))
}

fn num_u(v: Option<u64>) -> KeyPart {
    KeyPart::Num(v.map(|n| n as f64).unwrap_or(-1.0))
}

fn num_i(v: Option<i32>) -> KeyPart {
    KeyPart::Num(v.map(f64::from).unwrap_or(-1.0))
}

const VIDEO_EXT_ORDER: [&str; 3] = ["webm", "flv", "mp4"];
const VIDEO_EXT_ORDER_FREE: [&str; 3] = ["flv", "mp4", "webm"];
const AUDIO_EXT_ORDER: [&str; 6] = ["webm", "opus", "ogg", "mp3", "aac", "m4a"];
const AUDIO_EXT_ORDER_FREE: [&str; 6] = ["aac", "mp3", "m4a", "webm", "ogg", "opus"];

fn ext_rank(ext: Option<&str>, order: &[&str]) -> f64 {
    ext.and_then(|e| order.iter().position(|o| *o == e))
        .map(|i| i as f64)
        .unwrap_or(-1.0)
}

fn protocol_preference(f: &FormatDescriptor) -> f64 {
    let proto = f.protocol
        .or_else(|| f.url.as_deref().map(determine_protocol));
    match proto {
        Some(Protocol::Http) | Some(Protocol::Https) => 0.0,
        Some(Protocol::Rtsp) => -0.5,
        _ => -0.1,
    }
}

fn composite_key(f: &FormatDescriptor, opts: &SortOptions) -> Vec<KeyPart> {
    let mut preference = f.preference.unwrap_or(0.0);
    if matches!(f.ext.as_deref(), Some("f4f") | Some("f4m")) {
        preference -= 0.5;
    }

    let ext_preference;
    let audio_ext_preference;
    if f.is_audio_only() {
        preference -= 50.0;
        let order: &[&str] = if opts.prefer_free_formats {
            &AUDIO_EXT_ORDER_FREE
        } else {
            &AUDIO_EXT_ORDER
        };
        ext_preference = 0.0;
        audio_ext_preference = ext_rank(f.ext.as_deref(), order);
    } else {
        if f.is_video_only() {
            preference -= 40.0;
        }
        let order: &[&str] = if opts.prefer_free_formats {
            &VIDEO_EXT_ORDER_FREE
        } else {
            &VIDEO_EXT_ORDER
        };
        ext_preference = ext_rank(f.ext.as_deref(), order);
        audio_ext_preference = 0.0;
    }

    vec![
        KeyPart::Num(preference),
        num_i(f.language_preference),
        num_i(f.quality),
        num(f.tbr),
        num_u(f.filesize),
        num(f.vbr),
        num_u(f.height),
        num_u(f.width),
        KeyPart::Num(protocol_preference(f)),
        KeyPart::Num(ext_preference),
        num(f.abr),
        KeyPart::Num(audio_ext_preference),
        num(f.fps),
        num_u(f.filesize_approx),
        num_i(f.source_preference),
        KeyPart::Str(f.format_id.clone().unwrap_or_default()),
    ]
}

fn field_key(f: &FormatDescriptor, fields: &[String]) -> Vec<KeyPart> {
    fields.iter().map(|field| match field.as_str() {
        "preference" => num(f.preference),
        "language_preference" => num_i(f.language_preference),
        "quality" => num_i(f.quality),
        "tbr" => num(f.tbr),
        "abr" => num(f.abr),
        "vbr" => num(f.vbr),
        "fps" => num(f.fps),
        "filesize" => num_u(f.filesize),
        "filesize_approx" => num_u(f.filesize_approx),
        "height" => num_u(f.height),
        "width" => num_u(f.width),
        "asr" => num_u(f.asr),
        "source_preference" => num_i(f.source_preference),
        "format_id" => KeyPart::Str(f.format_id.clone().unwrap_or_default()),
        "ext" => KeyPart::Str(f.ext.clone().unwrap_or_default()),
        "language" => KeyPart::Str(f.language.clone().unwrap_or_default()),
        _ => KeyPart::Num(-1.0),
    }).collect()
}

/// Sort formats in place, worst first, so the last element is the preferred one.
///
/// Before sorting, a total bitrate is synthesized from `abr + vbr` where absent, and an
/// extension is derived from the URL where absent. Errors with
/// [`ManifestError::NoFormats`] when the slice is empty.
pub fn sort_formats(formats: &mut Vec<FormatDescriptor>, opts: &SortOptions)
                    -> Result<(), ManifestError> {
    if formats.is_empty() {
        return Err(ManifestError::NoFormats);
    }
    for f in formats.iter_mut() {
        if f.tbr.is_none() {
            if let (Some(abr), Some(vbr)) = (f.abr, f.vbr) {
                f.tbr = Some(abr + vbr);
            }
        }
        if f.ext.is_none() {
            if let Some(url) = f.url.as_deref() {
                f.ext = determine_ext(url);
            }
        }
    }
    let keys: Vec<Vec<KeyPart>> = formats.iter()
        .map(|f| match &opts.field_preference {
            Some(fields) => field_key(f, fields),
            None => composite_key(f, opts),
        })
        .collect();
    let mut order: Vec<usize> = (0..formats.len()).collect();
    order.sort_by(|&a, &b| compare_keys(&keys[a], &keys[b]));
    let mut sorted = Vec::with_capacity(formats.len());
    for i in order {
        sorted.push(formats[i].clone());
    }
    *formats = sorted;
    Ok(())
}

/// Remove formats whose URL exactly matches an earlier format's URL. Order is preserved and
/// the first occurrence wins. Formats without a URL are kept.
pub fn remove_duplicate_formats(formats: &mut Vec<FormatDescriptor>) {
    let mut seen: HashSet<String> = HashSet::new();
    formats.retain(|f| match &f.url {
        Some(url) => seen.insert(url.clone()),
        None => true,
    });
}
