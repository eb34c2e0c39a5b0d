//! Manifest kind detection and the [`ManifestResolver`], which glues fetching, parsing and
//! nested-manifest recursion together.
//!
//! The resolver owns no network code: pages come from the [`PageFetcher`] supplied by the
//! embedding application, and non-fatal problems (a dead nested manifest, an unparseable
//! sub-playlist) are reported through the [`DiagnosticsSink`] and otherwise degrade to an
//! empty result. Nested references are depth-bounded so that manifests referencing each
//! other cannot recurse unboundedly.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;
use crate::{DiagnosticsSink, FetchedPage, FormatDescriptor, ManifestError, PageFetcher};
use crate::dash;
use crate::hds::{self, F4mOptions};
use crate::hls::{self, M3u8Options};
use crate::html5::{self, Html5Options, MediaEntry};
use crate::ism;
use crate::smil::{self, SmilInfo};
use crate::util::{base_url, determine_ext, fix_xml_ampersands};
use crate::xspf::{self, XspfEntry};


/// The wire format of a manifest, as determined from its URL or its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Hls,
    Dash,
    F4m,
    Ism,
    Smil,
    Xspf,
    /// A web page with HTML5 media markup rather than a manifest proper.
    Html,
}

impl ManifestKind {
    /// Guess the kind from a URL alone. Smooth Streaming manifests conventionally end in
    /// `/Manifest` rather than carrying an extension.
    pub fn from_url(url: &str) -> Option<ManifestKind> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.ends_with("/Manifest") || path.contains(".ism/") || path.contains(".isml/") {
            return Some(ManifestKind::Ism);
        }
        match determine_ext(path).as_deref() {
            Some("m3u8") => Some(ManifestKind::Hls),
            Some("mpd") => Some(ManifestKind::Dash),
            Some("f4m") => Some(ManifestKind::F4m),
            Some("ism") | Some("isml") => Some(ManifestKind::Ism),
            Some("smil") => Some(ManifestKind::Smil),
            Some("xspf") => Some(ManifestKind::Xspf),
            _ => None,
        }
    }

    /// Sniff the kind from document content.
    pub fn from_content(body: &str) -> Option<ManifestKind> {
        lazy_static! {
            static ref ROOT_TAG: Regex = Regex::new(r"<([A-Za-z][A-Za-z0-9]*)[\s/>]").unwrap();
        }
        let trimmed = body.trim_start();
        if trimmed.starts_with("#EXTM3U") {
            return Some(ManifestKind::Hls);
        }
        for cap in ROOT_TAG.captures_iter(trimmed) {
            match &cap[1] {
                "MPD" => return Some(ManifestKind::Dash),
                "manifest" if body.contains("ns.adobe.com/f4m") => {
                    return Some(ManifestKind::F4m)
                },
                "SmoothStreamingMedia" => return Some(ManifestKind::Ism),
                "smil" => return Some(ManifestKind::Smil),
                "playlist" if body.contains("xspf.org") => return Some(ManifestKind::Xspf),
                "html" | "video" | "audio" => return Some(ManifestKind::Html),
                "xml" => continue,
                _ => return None,
            }
        }
        None
    }
}


/// Ties the per-format parsers together with a page fetcher, so that nested manifests
/// (an F4M media entry that is an m3u8, an HTML5 `<source>` pointing at an MPD) can be
/// followed. Recursion is bounded by `max_depth`; a reference beyond the bound is reported
/// and skipped.
pub struct ManifestResolver<'a> {
    fetcher: &'a dyn PageFetcher,
    diagnostics: &'a dyn DiagnosticsSink,
    max_depth: usize,
}

const DEFAULT_MAX_DEPTH: usize = 5;

impl<'a> ManifestResolver<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, diagnostics: &'a dyn DiagnosticsSink)
               -> ManifestResolver<'a> {
        ManifestResolver { fetcher, diagnostics, max_depth: DEFAULT_MAX_DEPTH }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> ManifestResolver<'a> {
        self.max_depth = max_depth;
        self
    }

    /// Fetch a page, degrading a failure to `Ok(None)` plus a diagnostic unless `fatal`.
    pub fn fetch_page(&self, url: &str, video_id: &str, fatal: bool)
                      -> Result<Option<FetchedPage>, ManifestError> {
        match self.fetcher.fetch(url, video_id) {
            Ok(page) => Ok(Some(page)),
            Err(e) if fatal => Err(e),
            Err(e) => {
                self.diagnostics.warn(&format!("{video_id}: failed to fetch {url}: {e}"));
                Ok(None)
            },
        }
    }

    /// Probe a URL for reachability. Unreachable URLs are reported and `false` returned, so
    /// callers can silently drop dead candidate formats.
    pub fn is_valid_url(&self, url: &str, video_id: &str, item: &str) -> bool {
        match self.fetcher.fetch(url, video_id) {
            Ok(_) => true,
            Err(e) => {
                self.diagnostics.warn(&format!("{video_id}: {item} URL {url} is invalid, skipping: {e}"));
                false
            },
        }
    }

    fn depth_exceeded(&self, depth: usize, url: &str) -> bool {
        if depth >= self.max_depth {
            self.diagnostics.warn(&format!(
                "skipping nested manifest {url}: recursion depth limit {} reached", self.max_depth));
            return true;
        }
        false
    }

    pub fn extract_m3u8_formats(&self, m3u8_url: &str, video_id: &str, opts: &M3u8Options,
                                fatal: bool)
                                -> Result<Vec<FormatDescriptor>, ManifestError> {
        self.extract_m3u8_formats_at(m3u8_url, video_id, opts, fatal, 0)
    }

    pub(crate) fn extract_m3u8_formats_at(&self, m3u8_url: &str, video_id: &str,
                                          opts: &M3u8Options, fatal: bool, depth: usize)
                                          -> Result<Vec<FormatDescriptor>, ManifestError> {
        if self.depth_exceeded(depth, m3u8_url) {
            return Ok(Vec::new());
        }
        let page = match self.fetch_page(m3u8_url, video_id, fatal)? {
            Some(page) => page,
            None => return Ok(Vec::new()),
        };
        Ok(hls::parse_m3u8_formats(&page.body, &page.final_url, opts))
    }

    pub fn extract_f4m_formats(&self, f4m_url: &str, video_id: &str, opts: &F4mOptions,
                               fatal: bool)
                               -> Result<Vec<FormatDescriptor>, ManifestError> {
        self.extract_f4m_formats_at(f4m_url, video_id, opts, fatal, 0)
    }

    pub(crate) fn extract_f4m_formats_at(&self, f4m_url: &str, video_id: &str,
                                         opts: &F4mOptions, fatal: bool, depth: usize)
                                         -> Result<Vec<FormatDescriptor>, ManifestError> {
        if self.depth_exceeded(depth, f4m_url) {
            return Ok(Vec::new());
        }
        let page = match self.fetch_page(f4m_url, video_id, fatal)? {
            Some(page) => page,
            None => return Ok(Vec::new()),
        };
        // Some HDS servers emit unescaped ampersands in media URLs.
        let manifest = match hds::parse_f4m(&fix_xml_ampersands(&page.body)) {
            Ok(manifest) => manifest,
            Err(e) if fatal => return Err(e),
            Err(e) => {
                self.diagnostics.warn(&format!("{video_id}: unparseable f4m manifest {f4m_url}: {e}"));
                return Ok(Vec::new());
            },
        };
        Ok(hds::parse_f4m_formats(self, &manifest, &page.final_url, video_id, opts, depth))
    }

    pub fn extract_mpd_formats(&self, mpd_url: &str, video_id: &str, mpd_id: Option<&str>,
                               fatal: bool)
                               -> Result<Vec<FormatDescriptor>, ManifestError> {
        self.extract_mpd_formats_at(mpd_url, video_id, mpd_id, fatal, 0)
    }

    pub(crate) fn extract_mpd_formats_at(&self, mpd_url: &str, video_id: &str,
                                         mpd_id: Option<&str>, fatal: bool, depth: usize)
                                         -> Result<Vec<FormatDescriptor>, ManifestError> {
        if self.depth_exceeded(depth, mpd_url) {
            return Ok(Vec::new());
        }
        let page = match self.fetch_page(mpd_url, video_id, fatal)? {
            Some(page) => page,
            None => return Ok(Vec::new()),
        };
        let result = dash::parse_mpd(&page.body).and_then(|mpd| {
            dash::parse_mpd_formats(&mpd, mpd_id, &base_url(&page.final_url),
                                    Some(&page.final_url), None, self.diagnostics)
        });
        match result {
            Ok(formats) => Ok(formats),
            Err(e) if fatal => Err(e),
            Err(e) => {
                self.diagnostics.warn(&format!("{video_id}: bad DASH manifest {mpd_url}: {e}"));
                Ok(Vec::new())
            },
        }
    }

    pub fn extract_ism_formats(&self, ism_url: &str, video_id: &str, ism_id: Option<&str>,
                               fatal: bool)
                               -> Result<Vec<FormatDescriptor>, ManifestError> {
        let page = match self.fetch_page(ism_url, video_id, fatal)? {
            Some(page) => page,
            None => return Ok(Vec::new()),
        };
        let result = ism::parse_ism(&page.body).and_then(|doc| {
            ism::parse_ism_formats(&doc, &page.final_url, ism_id, self.diagnostics)
        });
        match result {
            Ok(formats) => Ok(formats),
            Err(e) if fatal => Err(e),
            Err(e) => {
                self.diagnostics.warn(&format!("{video_id}: bad ISM manifest {ism_url}: {e}"));
                Ok(Vec::new())
            },
        }
    }

    /// Fetch and fully parse a SMIL presentation: formats, subtitles and metadata.
    pub fn extract_smil(&self, smil_url: &str, video_id: &str, fatal: bool,
                        f4m_params: Option<&[(&str, &str)]>)
                        -> Result<Option<SmilInfo>, ManifestError> {
        let page = match self.fetch_page(smil_url, video_id, fatal)? {
            Some(page) => page,
            None => return Ok(None),
        };
        let doc = match smil::parse_smil_document(&page.body) {
            Ok(doc) => doc,
            Err(e) if fatal => return Err(e),
            Err(e) => {
                self.diagnostics.warn(&format!("{video_id}: unparseable SMIL {smil_url}: {e}"));
                return Ok(None);
            },
        };
        Ok(Some(smil::parse_smil(self, &doc, &page.final_url, video_id, f4m_params, 0)))
    }

    /// Like [`extract_smil`](Self::extract_smil), discarding everything but the formats.
    pub fn extract_smil_formats(&self, smil_url: &str, video_id: &str, fatal: bool,
                                f4m_params: Option<&[(&str, &str)]>)
                                -> Result<Vec<FormatDescriptor>, ManifestError> {
        Ok(self.extract_smil(smil_url, video_id, fatal, f4m_params)?
            .map(|info| info.formats)
            .unwrap_or_default())
    }

    /// Fetch and parse an XSPF playlist into entries.
    pub fn extract_xspf_playlist(&self, xspf_url: &str, playlist_id: &str, fatal: bool)
                                 -> Result<Vec<XspfEntry>, ManifestError> {
        let page = match self.fetch_page(xspf_url, playlist_id, fatal)? {
            Some(page) => page,
            None => return Ok(Vec::new()),
        };
        let playlist = match xspf::parse_xspf_document(&page.body) {
            Ok(playlist) => playlist,
            Err(e) if fatal => return Err(e),
            Err(e) => {
                self.diagnostics.warn(&format!("{playlist_id}: unparseable XSPF {xspf_url}: {e}"));
                return Ok(Vec::new());
            },
        };
        Ok(xspf::parse_xspf(&playlist, playlist_id, &base_url(&page.final_url)))
    }

    /// Scan an already-fetched web page for HTML5 media elements.
    pub fn parse_html5_media_entries(&self, webpage: &str, page_url: &str, video_id: &str,
                                     opts: &Html5Options)
                                     -> Vec<MediaEntry> {
        html5::parse_html5_media_entries(self, webpage, page_url, video_id, opts, 0)
    }

    /// Fetch `url`, work out what kind of manifest it is, and extract its formats.
    ///
    /// Unrecognized content is a [`ManifestError::UnhandledMediaStream`].
    pub fn resolve(&self, url: &str, video_id: &str)
                   -> Result<Vec<FormatDescriptor>, ManifestError> {
        let page = match self.fetch_page(url, video_id, true)? {
            Some(page) => page,
            None => return Ok(Vec::new()),
        };
        let kind = ManifestKind::from_url(&page.final_url)
            .or_else(|| ManifestKind::from_content(&page.body))
            .ok_or_else(|| ManifestError::UnhandledMediaStream(url.to_string()))?;
        info!("{video_id}: resolving {url} as {kind:?}");
        match kind {
            ManifestKind::Hls => {
                let opts = M3u8Options {
                    ext: Some("mp4"),
                    m3u8_id: Some("hls"),
                    ..Default::default()
                };
                Ok(hls::parse_m3u8_formats(&page.body, &page.final_url, &opts))
            },
            ManifestKind::Dash => {
                let mpd = dash::parse_mpd(&page.body)?;
                dash::parse_mpd_formats(&mpd, Some("dash"), &base_url(&page.final_url),
                                        Some(&page.final_url), None, self.diagnostics)
            },
            ManifestKind::F4m => {
                let manifest = hds::parse_f4m(&fix_xml_ampersands(&page.body))?;
                let opts = F4mOptions { f4m_id: Some("hds"), ..Default::default() };
                Ok(hds::parse_f4m_formats(self, &manifest, &page.final_url, video_id,
                                          &opts, 0))
            },
            ManifestKind::Ism => {
                let doc = ism::parse_ism(&page.body)?;
                ism::parse_ism_formats(&doc, &page.final_url, Some("mss"), self.diagnostics)
            },
            ManifestKind::Smil => {
                let smil = smil::parse_smil_document(&page.body)?;
                Ok(smil::parse_smil_formats(self, &smil, &page.final_url, video_id, None, 0))
            },
            ManifestKind::Xspf => {
                let playlist = xspf::parse_xspf_document(&page.body)?;
                let entries = xspf::parse_xspf(&playlist, video_id,
                                               &base_url(&page.final_url));
                Ok(entries.into_iter().flat_map(|entry| entry.formats).collect())
            },
            ManifestKind::Html => {
                let opts = Html5Options { m3u8_id: Some("hls"), mpd_id: Some("dash"),
                                          ..Default::default() };
                let entries = html5::parse_html5_media_entries(
                    self, &page.body, &page.final_url, video_id, &opts, 0);
                Ok(entries.into_iter().flat_map(|entry| entry.formats).collect())
            },
        }
    }

    /// Probe each format's URL and drop the unreachable ones. Fragmented formats are kept
    /// as-is, since their fragment URLs are not cheaply verifiable.
    pub fn check_formats(&self, formats: &mut Vec<FormatDescriptor>, video_id: &str) {
        formats.retain(|f| {
            if !f.fragments.is_empty() {
                return true;
            }
            match f.url.as_deref() {
                Some(url) if url.starts_with("http") => {
                    let item = f.format_id.as_deref().unwrap_or("format");
                    self.is_valid_url(url, video_id, item)
                },
                _ => true,
            }
        });
    }
}
