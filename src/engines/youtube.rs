use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::{
    normalize_duration, Engine, EngineDescriptor, EngineError, EngineResult, RequestConfig,
};
use crate::core::types::{Category, Hit, MediaInfo, Query, SafeSearch};

pub const NAME: &str = "youtube";

pub(crate) const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    name: NAME,
    shortcut: "yt",
    categories: &[Category::Videos],
    supports_paging: false,
    max_page: 1,
    timeout_ms: 4000,
    weight: 1.2,
    enabled: true,
};

pub struct YoutubeEngine {
    descriptor: EngineDescriptor,
}

impl YoutubeEngine {
    pub fn new(ov: &crate::core::config::EngineOverride) -> Self {
        Self {
            descriptor: DESCRIPTOR.with_override(ov),
        }
    }
}

fn yt_initial_data_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)var ytInitialData\s*=\s*(\{.*?\});\s*</script>"#).unwrap()
    })
}

/// Recursively collect every `videoRenderer` object in the blob. The page
/// structure shifts between experiments; the renderer shape does not.
fn collect_video_renderers<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(renderer) = map.get("videoRenderer") {
                out.push(renderer);
            }
            for v in map.values() {
                collect_video_renderers(v, out);
            }
        }
        Value::Array(arr) => {
            for v in arr {
                collect_video_renderers(v, out);
            }
        }
        _ => {}
    }
}

/// Joined text of a `runs`/`simpleText` node.
fn text_of(node: &Value) -> Option<String> {
    if let Some(simple) = node.get("simpleText").and_then(|v| v.as_str()) {
        return Some(simple.to_string());
    }
    let runs = node.get("runs")?.as_array()?;
    let joined: String = runs
        .iter()
        .filter_map(|r| r.get("text").and_then(|v| v.as_str()))
        .collect();
    (!joined.is_empty()).then_some(joined)
}

fn parse_view_count(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn renderer_to_hit(renderer: &Value) -> Option<Hit> {
    let video_id = renderer.get("videoId")?.as_str()?;
    let title = renderer.get("title").and_then(text_of)?;
    let snippet = renderer
        .get("detailedMetadataSnippets")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .and_then(|s| s.get("snippetText"))
        .and_then(text_of)
        .unwrap_or_default();

    let duration_raw = renderer.get("lengthText").and_then(text_of);
    let (duration, duration_seconds) = duration_raw
        .as_deref()
        .and_then(normalize_duration)
        .map(|(d, s)| (Some(d), Some(s)))
        .unwrap_or((None, None));

    let views = renderer
        .get("viewCountText")
        .and_then(text_of)
        .as_deref()
        .and_then(parse_view_count);
    let channel = renderer.get("ownerText").and_then(text_of);
    let published_at = renderer.get("publishedTimeText").and_then(text_of);
    let thumbnail_url = renderer
        .pointer("/thumbnail/thumbnails/0/url")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Some(Hit {
        url: format!("https://www.youtube.com/watch?v={}", video_id),
        title,
        snippet,
        engine: NAME.to_string(),
        engines: vec![NAME.to_string()],
        score: 0.0,
        category: Category::Videos,
        media: Some(MediaInfo {
            thumbnail_url,
            duration,
            duration_seconds,
            embed_url: Some(format!("https://www.youtube.com/embed/{}", video_id)),
            views,
            channel,
            published_at,
            width: None,
            height: None,
        }),
    })
}

impl Engine for YoutubeEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn build_request(&self, query: &Query) -> Result<RequestConfig, EngineError> {
        let mut url = url::Url::parse("https://www.youtube.com/results")
            .map_err(|e| EngineError::Fatal(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("search_query", &query.upstream_text());

        let mut req = RequestConfig::get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", query.locale.clone())
            .cookie("CONSENT", "YES+");
        if query.safe_search == SafeSearch::Strict {
            req = req.cookie("PREF", "f2=8000000");
        }
        Ok(req)
    }

    fn parse_response(&self, body: &[u8], _query: &Query) -> EngineResult {
        let html = String::from_utf8_lossy(body);
        let Some(cap) = yt_initial_data_re().captures(&html) else {
            return EngineResult::default();
        };
        let Ok(data) = serde_json::from_str::<Value>(&cap[1]) else {
            return EngineResult::default();
        };

        let mut renderers = Vec::new();
        collect_video_renderers(&data, &mut renderers);

        EngineResult {
            hits: renderers.iter().filter_map(|r| renderer_to_hit(r)).collect(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> String {
        let data = serde_json::json!({
            "contents": { "sectionList": [ { "itemSection": [
                { "videoRenderer": {
                    "videoId": "dQw4w9WgXcQ",
                    "title": { "runs": [ { "text": "Never Gonna Give You Up" } ] },
                    "lengthText": { "simpleText": "3:33" },
                    "viewCountText": { "simpleText": "1,234,567 views" },
                    "ownerText": { "runs": [ { "text": "Rick Astley" } ] },
                    "thumbnail": { "thumbnails": [ { "url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hq720.jpg" } ] }
                } }
            ] } ] }
        });
        format!(
            "<html><script>var ytInitialData = {};</script></html>",
            data
        )
    }

    #[test]
    fn extracts_video_renderers() {
        let engine = YoutubeEngine::new(&Default::default());
        let res = engine.parse_response(sample_page().as_bytes(), &Query::new("rick"));
        assert_eq!(res.hits.len(), 1);
        let hit = &res.hits[0];
        assert_eq!(hit.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        let media = hit.media.as_ref().unwrap();
        assert_eq!(media.duration.as_deref(), Some("00:03:33"));
        assert_eq!(media.duration_seconds, Some(213));
        assert_eq!(media.views, Some(1_234_567));
        assert_eq!(media.channel.as_deref(), Some("Rick Astley"));
    }

    #[test]
    fn missing_blob_yields_empty_result() {
        let engine = YoutubeEngine::new(&Default::default());
        let res = engine.parse_response(b"<html>no data here</html>", &Query::new("x"));
        assert!(res.hits.is_empty());
        assert!(res.error.is_none());
    }
}
