//! SMIL presentation parsing: formats, subtitle tracks and playlist-level metadata.
//!
//! Each media reference is classified by its declared or inferred protocol: `rtmp` by the
//! `proto` attribute or streamer URL scheme, m3u8/f4m by extension (delegated to the HLS and
//! HDS parsers through the resolver), anything else a plain HTTP descriptor. Plain HTTP
//! references are probed for reachability through the page fetcher and dropped when dead.

use serde::{Serialize, Deserialize};
use serde_with::skip_serializing_none;
use std::collections::HashMap;
use crate::{FormatDescriptor, ManifestError, Protocol};
use crate::hls::M3u8Options;
use crate::hds::F4mOptions;
use crate::resolve::ManifestResolver;
use crate::util::{determine_ext, float_or_none_scaled, int_or_none, mimetype2ext,
                  unified_strdate, url_join};


#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Meta {
    #[serde(rename = "@name")]
    pub name: Option<String>,
    #[serde(rename = "@content")]
    pub content: Option<String>,
    #[serde(rename = "@base")]
    pub base: Option<String>,
    #[serde(rename = "@httpBase")]
    pub httpBase: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Head {
    #[serde(rename = "meta")]
    pub metas: Vec<Meta>,
}

/// A `<video>`, `<audio>` or `<ref>` media reference.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MediaRef {
    #[serde(rename = "@src")]
    pub src: Option<String>,
    #[serde(rename = "@system-bitrate")]
    pub system_bitrate: Option<String>,
    #[serde(rename = "@systemBitrate")]
    pub systemBitrate: Option<String>,
    #[serde(rename = "@size")]
    pub size: Option<String>,
    #[serde(rename = "@fileSize")]
    pub fileSize: Option<String>,
    #[serde(rename = "@width")]
    pub width: Option<String>,
    #[serde(rename = "@height")]
    pub height: Option<String>,
    #[serde(rename = "@proto")]
    pub proto: Option<String>,
    #[serde(rename = "@ext")]
    pub ext: Option<String>,
    #[serde(rename = "@streamer")]
    pub streamer: Option<String>,
}

/// A subtitle track reference.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TextStream {
    #[serde(rename = "@src")]
    pub src: Option<String>,
    #[serde(rename = "@ext")]
    pub ext: Option<String>,
    #[serde(rename = "@type")]
    pub stream_type: Option<String>,
    #[serde(rename = "@systemLanguage")]
    pub systemLanguage: Option<String>,
    #[serde(rename = "@systemLanguageName")]
    pub systemLanguageName: Option<String>,
    #[serde(rename = "@lang")]
    pub lang: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Image {
    #[serde(rename = "@type")]
    pub image_type: Option<String>,
    #[serde(rename = "@src")]
    pub src: Option<String>,
    #[serde(rename = "@width")]
    pub width: Option<String>,
    #[serde(rename = "@height")]
    pub height: Option<String>,
}

// Media references may sit directly in the body, inside a <switch>, or inside a <par>
// (possibly with its own nested <switch>); the containers below cover those shapes.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Switch {
    #[serde(rename = "video")]
    pub videos: Vec<MediaRef>,
    #[serde(rename = "audio")]
    pub audios: Vec<MediaRef>,
    #[serde(rename = "textstream")]
    pub textstreams: Vec<TextStream>,
    #[serde(rename = "image")]
    pub images: Vec<Image>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Par {
    #[serde(rename = "video")]
    pub videos: Vec<MediaRef>,
    #[serde(rename = "audio")]
    pub audios: Vec<MediaRef>,
    #[serde(rename = "textstream")]
    pub textstreams: Vec<TextStream>,
    #[serde(rename = "image")]
    pub images: Vec<Image>,
    #[serde(rename = "switch")]
    pub switches: Vec<Switch>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Body {
    #[serde(rename = "video")]
    pub videos: Vec<MediaRef>,
    #[serde(rename = "audio")]
    pub audios: Vec<MediaRef>,
    #[serde(rename = "textstream")]
    pub textstreams: Vec<TextStream>,
    #[serde(rename = "image")]
    pub images: Vec<Image>,
    #[serde(rename = "switch")]
    pub switches: Vec<Switch>,
    #[serde(rename = "par")]
    pub pars: Vec<Par>,
}

/// The root node of a parsed SMIL document.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Smil {
    pub head: Option<Head>,
    pub body: Option<Body>,
}

impl Smil {
    fn metas(&self) -> &[Meta] {
        self.head.as_ref().map(|h| h.metas.as_slice()).unwrap_or_default()
    }

    /// Media references in document order, across all the container shapes.
    fn media(&self) -> Vec<&MediaRef> {
        let mut out = Vec::new();
        if let Some(body) = &self.body {
            out.extend(body.videos.iter().chain(body.audios.iter()));
            for sw in &body.switches {
                out.extend(sw.videos.iter().chain(sw.audios.iter()));
            }
            for par in &body.pars {
                out.extend(par.videos.iter().chain(par.audios.iter()));
                for sw in &par.switches {
                    out.extend(sw.videos.iter().chain(sw.audios.iter()));
                }
            }
        }
        out
    }

    fn textstreams(&self) -> Vec<&TextStream> {
        let mut out = Vec::new();
        if let Some(body) = &self.body {
            out.extend(body.textstreams.iter());
            for sw in &body.switches {
                out.extend(sw.textstreams.iter());
            }
            for par in &body.pars {
                out.extend(par.textstreams.iter());
                for sw in &par.switches {
                    out.extend(sw.textstreams.iter());
                }
            }
        }
        out
    }

    fn images(&self) -> Vec<&Image> {
        let mut out = Vec::new();
        if let Some(body) = &self.body {
            out.extend(body.images.iter());
            for sw in &body.switches {
                out.extend(sw.images.iter());
            }
            for par in &body.pars {
                out.extend(par.images.iter());
            }
        }
        out
    }
}


/// Parse a SMIL document, provided as an XML string.
pub fn parse_smil_document(xml: &str) -> Result<Smil, ManifestError> {
    let doc: Result<Smil, quick_xml::DeError> = quick_xml::de::from_str(xml);
    doc.map_err(|e| ManifestError::Parsing(e.to_string()))
}


#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SubtitleEntry {
    pub url: String,
    pub ext: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct Thumbnail {
    pub id: Option<String>,
    pub url: String,
    pub width: Option<u64>,
    pub height: Option<u64>,
}

/// Playlist-level result of a SMIL parse: formats plus document metadata and subtitles.
#[derive(Debug, Default, Clone)]
pub struct SmilInfo {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// `YYYYMMDD`
    pub upload_date: Option<String>,
    pub thumbnails: Vec<Thumbnail>,
    pub formats: Vec<FormatDescriptor>,
    pub subtitles: HashMap<String, Vec<SubtitleEntry>>,
}


/// Extract formats and playlist metadata from a parsed SMIL document.
pub fn parse_smil(resolver: &ManifestResolver,
                  smil: &Smil,
                  smil_url: &str,
                  video_id: &str,
                  f4m_params: Option<&[(&str, &str)]>,
                  depth: usize)
                  -> SmilInfo {
    let formats = parse_smil_formats(resolver, smil, smil_url, video_id, f4m_params, depth);
    let subtitles = parse_smil_subtitles(smil, "en");

    let basename = smil_url
        .split(['?', '#']).next().unwrap_or(smil_url)
        .rsplit('/').next().unwrap_or(video_id);
    let id = basename.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(basename).to_string();
    let mut title = None;
    let mut description = None;
    let mut upload_date = None;
    for meta in smil.metas() {
        let (name, content) = match (&meta.name, &meta.content) {
            (Some(n), Some(c)) => (n.as_str(), c),
            _ => continue,
        };
        if title.is_none() && name == "title" {
            title = Some(content.clone());
        } else if description.is_none() && (name == "description" || name == "abstract") {
            description = Some(content.clone());
        } else if upload_date.is_none() && name == "date" {
            upload_date = unified_strdate(content);
        }
    }
    let thumbnails = smil.images().iter()
        .filter_map(|image| {
            image.src.as_ref().map(|src| Thumbnail {
                id: image.image_type.clone(),
                url: src.clone(),
                width: int_or_none(image.width.as_deref()).map(|w| w as u64),
                height: int_or_none(image.height.as_deref()).map(|h| h as u64),
            })
        })
        .collect();

    SmilInfo {
        title: title.unwrap_or_else(|| id.clone()),
        id,
        description,
        upload_date,
        thumbnails,
        formats,
        subtitles,
    }
}


/// Extract just the formats from a parsed SMIL document.
pub fn parse_smil_formats(resolver: &ManifestResolver,
                          smil: &Smil,
                          smil_url: &str,
                          video_id: &str,
                          f4m_params: Option<&[(&str, &str)]>,
                          depth: usize)
                          -> Vec<FormatDescriptor> {
    let mut base = smil_url.to_string();
    for meta in smil.metas() {
        if let Some(b) = meta.base.as_deref().or(meta.httpBase.as_deref()) {
            if !b.is_empty() {
                base = b.to_string();
                break;
            }
        }
    }

    let mut formats: Vec<FormatDescriptor> = Vec::new();
    let mut rtmp_count = 0u32;
    let mut http_count = 0u32;
    let mut m3u8_count = 0u32;
    let mut srcs: Vec<String> = Vec::new();

    for medium in smil.media() {
        let src = match medium.src.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => s,
            None => continue,
        };
        if srcs.iter().any(|s| s == src) {
            continue;
        }
        srcs.push(src.to_string());

        let bitrate = float_or_none_scaled(
            medium.system_bitrate.as_deref().or(medium.systemBitrate.as_deref()), 1000.0);
        let filesize = int_or_none(medium.size.as_deref().or(medium.fileSize.as_deref()))
            .map(|n| n as u64);
        let width = int_or_none(medium.width.as_deref()).map(|w| w as u64);
        let height = int_or_none(medium.height.as_deref()).map(|h| h as u64);
        let proto = medium.proto.as_deref();
        let ext = medium.ext.as_deref();
        let src_ext = determine_ext(src);
        let streamer = medium.streamer.as_deref().unwrap_or(&base);

        if proto == Some("rtmp") || streamer.starts_with("rtmp") {
            rtmp_count += 1;
            formats.push(FormatDescriptor {
                url: Some(streamer.to_string()),
                play_path: Some(src.to_string()),
                ext: Some("flv".to_string()),
                format_id: Some(format!("rtmp-{}", bitrate.map_or(rtmp_count as i64, |b| b as i64))),
                tbr: bitrate,
                filesize,
                width,
                height,
                protocol: Some(Protocol::Rtmp),
                ..Default::default()
            });
            continue;
        }

        let src_url = if src.starts_with("http") {
            src.to_string()
        } else {
            url_join(&base, src).unwrap_or_else(|| src.to_string())
        };
        let src_url = src_url.trim().to_string();

        if proto == Some("m3u8") || src_ext.as_deref() == Some("m3u8") {
            let m3u8_opts = M3u8Options {
                ext: Some(ext.unwrap_or("mp4")),
                m3u8_id: Some("hls"),
                ..Default::default()
            };
            let mut m3u8_formats = resolver
                .extract_m3u8_formats_at(&src_url, video_id, &m3u8_opts, false, depth + 1)
                .unwrap_or_default();
            if m3u8_formats.len() == 1 {
                m3u8_count += 1;
                let f = &mut m3u8_formats[0];
                f.format_id = Some(format!("hls-{}", bitrate.map_or(m3u8_count as i64, |b| b as i64)));
                f.tbr = bitrate;
                f.width = width;
                f.height = height;
            }
            formats.extend(m3u8_formats);
            continue;
        }

        if src_ext.as_deref() == Some("f4m") {
            // HDS servers expect player identification in the query string.
            let default_params: &[(&str, &str)] =
                &[("hdcore", "3.2.0"), ("plugin", "flowplayer-3.2.0.1")];
            let params = f4m_params.unwrap_or(default_params);
            let query: Vec<String> = params.iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            let separator = if src_url.contains('?') { '&' } else { '?' };
            let f4m_url = format!("{}{}{}", src_url, separator, query.join("&"));
            let f4m_opts = F4mOptions { f4m_id: Some("hds"), ..Default::default() };
            formats.extend(resolver
                .extract_f4m_formats_at(&f4m_url, video_id, &f4m_opts, false, depth + 1)
                .unwrap_or_default());
            continue;
        }

        if src_url.starts_with("http") && resolver.is_valid_url(&src_url, video_id, "video") {
            http_count += 1;
            formats.push(FormatDescriptor {
                url: Some(src_url),
                ext: ext.map(String::from).or(src_ext),
                format_id: Some(format!("http-{}", bitrate.map_or(http_count as i64, |b| b as i64))),
                tbr: bitrate,
                filesize,
                width,
                height,
                ..Default::default()
            });
        }
    }
    formats
}


/// Extract subtitle tracks, keyed by language and de-duplicated by URL.
pub fn parse_smil_subtitles(smil: &Smil, default_lang: &str) -> HashMap<String, Vec<SubtitleEntry>> {
    let mut urls: Vec<String> = Vec::new();
    let mut subtitles: HashMap<String, Vec<SubtitleEntry>> = HashMap::new();
    for textstream in smil.textstreams() {
        let src = match textstream.src.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => s,
            None => continue,
        };
        if urls.iter().any(|u| u == src) {
            continue;
        }
        urls.push(src.to_string());
        let ext = textstream.ext.clone()
            .or_else(|| textstream.stream_type.as_deref()
                         .and_then(mimetype2ext).map(String::from))
            .or_else(|| determine_ext(src));
        let lang = textstream.systemLanguage.as_deref()
            .or(textstream.systemLanguageName.as_deref())
            .or(textstream.lang.as_deref())
            .unwrap_or(default_lang);
        subtitles.entry(lang.to_string()).or_default().push(SubtitleEntry {
            url: src.to_string(),
            ext,
        });
    }
    subtitles
}
