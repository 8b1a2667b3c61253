use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::{format_duration, Engine, EngineDescriptor, EngineError, EngineResult, RequestConfig};
use crate::core::types::{Category, Hit, MediaInfo, Query};

pub const NAME: &str = "vimeo";

pub(crate) const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    name: NAME,
    shortcut: "vm",
    categories: &[Category::Videos],
    supports_paging: true,
    max_page: 10,
    timeout_ms: 4000,
    weight: 0.7,
    enabled: true,
};

pub struct VimeoEngine {
    descriptor: EngineDescriptor,
}

impl VimeoEngine {
    pub fn new(ov: &crate::core::config::EngineOverride) -> Self {
        Self {
            descriptor: DESCRIPTOR.with_override(ov),
        }
    }
}

/// The search page embeds its data blob as `window.vimeo.config = {...};`.
fn config_blob_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)window\.vimeo\.config\s*=\s*(\{.*?\});").unwrap())
}

fn clip_to_hit(clip: &Value) -> Option<Hit> {
    let link = clip.get("link").and_then(|v| v.as_str())?;
    if !super::is_absolute_http(link) {
        return None;
    }
    let title = clip.get("name").and_then(|v| v.as_str())?.to_string();
    if title.is_empty() {
        return None;
    }

    let duration = clip.get("duration").and_then(|v| v.as_u64());
    let thumbnail_url = clip
        .pointer("/pictures/sizes/2/link")
        .or_else(|| clip.pointer("/pictures/sizes/0/link"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Some(Hit {
        url: link.to_string(),
        title,
        snippet: clip
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        engine: NAME.to_string(),
        engines: vec![NAME.to_string()],
        score: 0.0,
        category: Category::Videos,
        media: Some(MediaInfo {
            thumbnail_url,
            duration: duration.map(format_duration),
            duration_seconds: duration,
            embed_url: clip
                .pointer("/embed/html")
                .and_then(|v| v.as_str())
                .and_then(extract_iframe_src),
            views: clip.pointer("/stats/plays").and_then(|v| v.as_u64()),
            channel: clip
                .pointer("/user/name")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            published_at: clip
                .get("created_time")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            width: clip.get("width").and_then(|v| v.as_u64()).map(|w| w as u32),
            height: clip
                .get("height")
                .and_then(|v| v.as_u64())
                .map(|h| h as u32),
        }),
    })
}

fn extract_iframe_src(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#"src="([^"]+)""#).unwrap());
    re.captures(html).map(|c| c[1].to_string())
}

impl Engine for VimeoEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn build_request(&self, query: &Query) -> Result<RequestConfig, EngineError> {
        let mut url = url::Url::parse(&format!("https://vimeo.com/search/page:{}", query.page))
            .map_err(|e| EngineError::Fatal(e.to_string()))?;
        url.query_pairs_mut().append_pair("q", &query.upstream_text());
        Ok(RequestConfig::get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", query.locale.clone()))
    }

    fn parse_response(&self, body: &[u8], _query: &Query) -> EngineResult {
        let html = String::from_utf8_lossy(body);
        let Some(cap) = config_blob_re().captures(&html) else {
            return EngineResult::default();
        };
        let Ok(config) = serde_json::from_str::<Value>(&cap[1]) else {
            return EngineResult::default();
        };

        // The clip list moved between `api.initial_json.data` and
        // `search.results` across page revisions; accept either.
        let clips = config
            .pointer("/api/initial_json/data")
            .or_else(|| config.pointer("/search/results"))
            .and_then(|v| v.as_array());

        let hits = clips
            .map(|arr| arr.iter().filter_map(clip_to_hit).collect())
            .unwrap_or_default();

        EngineResult { hits, error: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_blob() {
        let config = serde_json::json!({
            "api": { "initial_json": { "data": [{
                "name": "Staff Picks: Best of the Year",
                "link": "https://vimeo.com/123456789",
                "description": "Our favorites.",
                "duration": 754,
                "stats": { "plays": 88_000 },
                "user": { "name": "Vimeo Curation" },
                "created_time": "2024-12-01T10:00:00+00:00"
            }] } }
        });
        let page = format!("<script>window.vimeo.config = {};</script>", config);
        let engine = VimeoEngine::new(&Default::default());
        let res = engine.parse_response(page.as_bytes(), &Query::new("staff picks"));
        assert_eq!(res.hits.len(), 1);
        let media = res.hits[0].media.as_ref().unwrap();
        assert_eq!(media.duration.as_deref(), Some("00:12:34"));
        assert_eq!(media.views, Some(88_000));
    }

    #[test]
    fn page_without_blob_is_empty() {
        let engine = VimeoEngine::new(&Default::default());
        let res = engine.parse_response(b"<html></html>", &Query::new("x"));
        assert!(res.hits.is_empty());
    }
}
