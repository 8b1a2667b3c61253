pub mod bing;
pub mod bing_videos;
pub mod dailymotion;
pub mod duckduckgo;
pub mod google;
pub mod google_videos;
pub mod jina;
pub mod local;
pub mod peertube;
pub mod registry;
pub mod vimeo;
pub mod youtube;

use crate::core::types::{Category, Hit, Query};
use reqwest::StatusCode;

pub use registry::EngineRegistry;

#[derive(Debug, Clone)]
pub enum EngineError {
    Blocked { reason: String },
    Timeout,
    Transient(String),
    Fatal(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Blocked { reason } => write!(f, "blocked: {}", reason),
            EngineError::Timeout => write!(f, "timeout"),
            EngineError::Transient(e) => write!(f, "transient: {}", e),
            EngineError::Fatal(e) => write!(f, "fatal: {}", e),
        }
    }
}

impl std::error::Error for EngineError {}

/// Static metadata registered once per engine at process init.
#[derive(Debug, Clone)]
pub struct EngineDescriptor {
    pub name: &'static str,
    /// 2–4 char shortcut shown in diagnostics and engine pickers.
    pub shortcut: &'static str,
    pub categories: &'static [Category],
    pub supports_paging: bool,
    pub max_page: u32,
    pub timeout_ms: u64,
    /// Fusion weight, 0.0–1.5.
    pub weight: f64,
    pub enabled: bool,
}

impl EngineDescriptor {
    pub fn supports_category(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    /// Fold config/env overrides into the compiled-in defaults.
    pub fn with_override(mut self, ov: &crate::core::config::EngineOverride) -> Self {
        if let Some(enabled) = ov.enabled {
            self.enabled = enabled;
        }
        if let Some(weight) = ov.weight {
            self.weight = weight.clamp(0.0, 1.5);
        }
        if let Some(timeout_ms) = ov.timeout_ms {
            self.timeout_ms = timeout_ms.max(250);
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A fully-built upstream request. Producing one never performs I/O;
/// the coordinator owns the actual network call.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub url: url::Url,
    pub method: HttpMethod,
    pub headers: Vec<(&'static str, String)>,
    pub cookies: Vec<(&'static str, &'static str)>,
    pub body: Option<String>,
}

impl RequestConfig {
    pub fn get(url: url::Url) -> Self {
        Self {
            url,
            method: HttpMethod::Get,
            headers: Vec::new(),
            cookies: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((key, value.into()));
        self
    }

    pub fn cookie(mut self, key: &'static str, value: &'static str) -> Self {
        self.cookies.push((key, value));
        self
    }
}

/// What one engine produced for one query. A parse failure yields zero
/// hits, never an error; network-level failures set `error`.
#[derive(Debug, Clone, Default)]
pub struct EngineResult {
    pub hits: Vec<Hit>,
    pub error: Option<String>,
}

impl EngineResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            hits: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Uniform interface over remote and local backends. `build_request` and
/// `parse_response` are pure; all I/O lives in the coordinator.
pub trait Engine: Send + Sync {
    fn descriptor(&self) -> &EngineDescriptor;

    fn build_request(&self, query: &Query) -> Result<RequestConfig, EngineError>;

    /// Tolerant parse: an unrecognized or empty body returns an empty
    /// result. Partial parses are allowed.
    fn parse_response(&self, body: &[u8], query: &Query) -> EngineResult;

    /// Engines backed by a local index answer here and skip the network.
    fn search_local(&self, _query: &Query) -> Option<EngineResult> {
        None
    }
}

// ---------------------------------------------------------------------------
// Shared scraper plumbing
// ---------------------------------------------------------------------------

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
];

pub fn random_user_agent() -> &'static str {
    use rand::RngExt;
    let idx = rand::rng().random_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

pub fn detect_block_reason(status: StatusCode, body: &str) -> Option<String> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some("http_429".to_string());
    }
    if status == StatusCode::FORBIDDEN {
        return Some("http_403".to_string());
    }
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Some("http_503".to_string());
    }

    let lower = body.to_lowercase();
    let maybe = [
        ("unusual traffic", "unusual_traffic"),
        ("captcha", "captcha"),
        ("verify you are human", "captcha"),
        ("enable javascript", "js_required"),
        ("access denied", "access_denied"),
    ];
    for (needle, label) in maybe {
        if lower.contains(needle) {
            return Some(label.to_string());
        }
    }
    None
}

/// Collapse runs of whitespace, the way SERP text nodes need it.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_absolute_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

// ---------------------------------------------------------------------------
// SERP link hygiene
// ---------------------------------------------------------------------------

/// How a redirect wrapper packs the destination into its parameter.
#[derive(Debug, Clone, Copy)]
pub enum DestEncoding {
    /// Percent-encoded URL; the query parser has already decoded it.
    Plain,
    /// Base64 with a short version tag prepended.
    TaggedBase64 { tag: &'static str },
}

/// Shape of a SERP's outbound redirect links. Engines that interpose a
/// click-tracking hop declare one of these; the destination is recovered
/// from a query parameter of the wrapper URL.
#[derive(Debug, Clone, Copy)]
pub struct RedirectWrapper {
    /// Hosts the wrapper lives on.
    pub hosts: &'static [&'static str],
    /// Path prefix marking a wrapped link.
    pub path_prefix: &'static str,
    /// Query parameter carrying the destination.
    pub param: &'static str,
    pub encoding: DestEncoding,
}

impl RedirectWrapper {
    fn applies_to(&self, url: &url::Url) -> bool {
        url.host_str().is_some_and(|h| self.hosts.contains(&h))
            && url.path().starts_with(self.path_prefix)
    }

    fn decode_dest(&self, url: &url::Url) -> Option<String> {
        let payload = url
            .query_pairs()
            .find(|(k, _)| k == self.param)
            .map(|(_, v)| v.to_string())
            .filter(|v| !v.trim().is_empty())?;

        let dest = match self.encoding {
            DestEncoding::Plain => payload,
            DestEncoding::TaggedBase64 { tag } => {
                let packed = payload.strip_prefix(tag).unwrap_or(&payload);
                let bytes = decode_base64_lenient(packed)?;
                String::from_utf8(bytes).ok()?.trim().to_string()
            }
        };
        is_absolute_http(&dest).then_some(dest)
    }
}

/// Per-engine result-link hygiene, applied to every href a parser pulls out
/// of a SERP: absolutize against the SERP's own origin, unwrap the engine's
/// redirect wrapper, and keep http(s) destinations only.
#[derive(Debug, Clone, Copy)]
pub struct SerpLinkRules {
    /// Origin for rooted (`/x`) and protocol-relative (`//host/x`) hrefs;
    /// `None` rejects them outright.
    pub resolve_base: Option<&'static str>,
    pub wrapper: Option<RedirectWrapper>,
    /// Keep the wrapped URL itself when its payload will not decode,
    /// instead of dropping the hit.
    pub keep_undecodable: bool,
}

impl SerpLinkRules {
    pub fn clean(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }

        let candidate = if is_absolute_http(href) {
            url::Url::parse(href).ok()?
        } else {
            url::Url::parse(self.resolve_base?).ok()?.join(href).ok()?
        };
        // `join` resolves scheme-carrying hrefs (javascript:, mailto:)
        // to themselves; reject anything that is not web-reachable.
        if !matches!(candidate.scheme(), "http" | "https") {
            return None;
        }

        let Some(wrapper) = &self.wrapper else {
            return Some(candidate.into());
        };
        if !wrapper.applies_to(&candidate) {
            return Some(candidate.into());
        }
        match wrapper.decode_dest(&candidate) {
            Some(dest) => Some(dest),
            None if self.keep_undecodable => Some(candidate.into()),
            None => None,
        }
    }
}

/// SERPs are inconsistent about alphabet and padding; accept the common
/// variants before giving up.
fn decode_base64_lenient(packed: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};
    use base64::Engine as _;
    STANDARD
        .decode(packed)
        .or_else(|_| STANDARD_NO_PAD.decode(packed))
        .or_else(|_| URL_SAFE_NO_PAD.decode(packed))
        .ok()
}

/// Parse an upstream duration (`HH:MM:SS`, `MM:SS`, or bare seconds) into
/// total seconds. Returns `None` for anything else.
pub fn parse_duration_seconds(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parts: Vec<&str> = raw.split(':').collect();
    match parts.len() {
        1 => parts[0].parse::<u64>().ok(),
        2 => {
            let m = parts[0].parse::<u64>().ok()?;
            let s = parts[1].parse::<u64>().ok()?;
            (s < 60).then_some(m * 60 + s)
        }
        3 => {
            let h = parts[0].parse::<u64>().ok()?;
            let m = parts[1].parse::<u64>().ok()?;
            let s = parts[2].parse::<u64>().ok()?;
            (m < 60 && s < 60).then_some(h * 3600 + m * 60 + s)
        }
        _ => None,
    }
}

/// Canonical `"HH:MM:SS"` rendering used by every video engine.
pub fn format_duration(total_seconds: u64) -> String {
    let h = total_seconds / 3600;
    let m = (total_seconds % 3600) / 60;
    let s = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// Normalize an upstream duration into the canonical pair.
pub fn normalize_duration(raw: &str) -> Option<(String, u64)> {
    let secs = parse_duration_seconds(raw)?;
    Some((format_duration(secs), secs))
}

/// Build a hit after validating the URL is absolute http(s); engines call
/// this instead of pushing raw parses.
pub fn make_hit(
    url: String,
    title: String,
    snippet: String,
    engine: &'static str,
    category: Category,
) -> Option<Hit> {
    if !is_absolute_http(&url) || title.is_empty() {
        return None;
    }
    url::Url::parse(&url).ok()?;
    Some(Hit {
        url,
        title,
        snippet,
        engine: engine.to_string(),
        engines: vec![engine.to_string()],
        score: 0.0,
        category,
        media: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_normalization() {
        assert_eq!(normalize_duration("3:20"), Some(("00:03:20".into(), 200)));
        assert_eq!(
            normalize_duration("1:02:03"),
            Some(("01:02:03".into(), 3723))
        );
        assert_eq!(normalize_duration("95"), Some(("00:01:35".into(), 95)));
        assert_eq!(normalize_duration("3:77"), None);
        assert_eq!(normalize_duration(""), None);
        assert_eq!(normalize_duration("soon"), None);
    }

    #[test]
    fn hit_requires_absolute_url() {
        assert!(make_hit(
            "/relative".into(),
            "t".into(),
            String::new(),
            "google",
            Category::General
        )
        .is_none());
        assert!(make_hit(
            "https://example.org/page".into(),
            "t".into(),
            String::new(),
            "google",
            Category::General
        )
        .is_some());
    }

    #[test]
    fn link_rules_absolutize_and_reject_non_http() {
        let rules = SerpLinkRules {
            resolve_base: Some("https://serp.example/"),
            wrapper: None,
            keep_undecodable: false,
        };
        assert_eq!(
            rules.clean("//cdn.example/a"),
            Some("https://cdn.example/a".to_string())
        );
        assert_eq!(
            rules.clean("/local/path"),
            Some("https://serp.example/local/path".to_string())
        );
        assert_eq!(rules.clean("javascript:void(0)"), None);
        assert_eq!(rules.clean("  "), None);

        let strict = SerpLinkRules {
            resolve_base: None,
            wrapper: None,
            keep_undecodable: false,
        };
        assert_eq!(strict.clean("/local/path"), None);
    }

    #[test]
    fn wrapper_unwraps_plain_and_base64_payloads() {
        let plain = SerpLinkRules {
            resolve_base: None,
            wrapper: Some(RedirectWrapper {
                hosts: &["serp.example"],
                path_prefix: "/out",
                param: "to",
                encoding: DestEncoding::Plain,
            }),
            keep_undecodable: false,
        };
        assert_eq!(
            plain.clean("https://serp.example/out?to=https%3A%2F%2Fdest.example%2Fp"),
            Some("https://dest.example/p".to_string())
        );
        // Wrapper matched but the payload is missing: dropped.
        assert_eq!(plain.clean("https://serp.example/out?other=1"), None);
        // Unwrapped links on the same host pass through.
        assert_eq!(
            plain.clean("https://serp.example/result"),
            Some("https://serp.example/result".to_string())
        );

        let packed = SerpLinkRules {
            resolve_base: None,
            wrapper: Some(RedirectWrapper {
                hosts: &["serp.example"],
                path_prefix: "/ck/",
                param: "u",
                encoding: DestEncoding::TaggedBase64 { tag: "a1" },
            }),
            keep_undecodable: true,
        };
        // base64("https://example.org/"), padding stripped.
        assert_eq!(
            packed.clean("https://serp.example/ck/a?u=a1aHR0cHM6Ly9leGFtcGxlLm9yZy8"),
            Some("https://example.org/".to_string())
        );
        // Undecodable payload keeps the wrapper URL.
        assert_eq!(
            packed.clean("https://serp.example/ck/a?u=a1%%%"),
            Some("https://serp.example/ck/a?u=a1%%%".to_string())
        );
    }

    #[test]
    fn block_detection() {
        assert_eq!(
            detect_block_reason(StatusCode::TOO_MANY_REQUESTS, ""),
            Some("http_429".into())
        );
        assert_eq!(
            detect_block_reason(StatusCode::OK, "please solve this CAPTCHA"),
            Some("captcha".into())
        );
        assert_eq!(detect_block_reason(StatusCode::OK, "<html>fine</html>"), None);
    }
}
