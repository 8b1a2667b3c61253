use serde::Deserialize;

use super::{Engine, EngineDescriptor, EngineError, EngineResult, RequestConfig};
use crate::core::types::{Category, Query};

pub const NAME: &str = "jina";

/// Jina Reader's search endpoint; returns reader-extracted pages as JSON.
pub(crate) const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    name: NAME,
    shortcut: "jn",
    categories: &[Category::General],
    supports_paging: false,
    max_page: 1,
    timeout_ms: 6000,
    weight: 0.5,
    enabled: false,
};

pub struct JinaEngine {
    descriptor: EngineDescriptor,
}

impl JinaEngine {
    pub fn new(ov: &crate::core::config::EngineOverride) -> Self {
        Self {
            descriptor: DESCRIPTOR.with_override(ov),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    data: Vec<ApiEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl Engine for JinaEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn build_request(&self, query: &Query) -> Result<RequestConfig, EngineError> {
        let mut url =
            url::Url::parse("https://s.jina.ai/").map_err(|e| EngineError::Fatal(e.to_string()))?;
        url.query_pairs_mut().append_pair("q", &query.upstream_text());
        Ok(RequestConfig::get(url).header("Accept", "application/json"))
    }

    fn parse_response(&self, body: &[u8], query: &Query) -> EngineResult {
        let Ok(parsed) = serde_json::from_slice::<ApiResponse>(body) else {
            return EngineResult::default();
        };

        let hits = parsed
            .data
            .into_iter()
            .filter_map(|e| {
                let url = e.url.filter(|u| super::is_absolute_http(u))?;
                let title = e.title.filter(|t| !t.is_empty())?;
                // Reader entries carry full page text; keep a snippet-sized slice.
                let snippet = e
                    .description
                    .filter(|d| !d.is_empty())
                    .or_else(|| e.content.map(|c| c.chars().take(280).collect()))
                    .unwrap_or_default();
                super::make_hit(url, title, snippet, NAME, query.category)
            })
            .collect();

        EngineResult { hits, error: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reader_payload() {
        let body = serde_json::json!({
            "code": 200,
            "data": [
                { "title": "Tokio - Asynchronous Rust", "url": "https://tokio.rs/", "description": "Runtime for reliable async applications." },
                { "title": "", "url": "https://skipped.example/" }
            ]
        });
        let engine = JinaEngine::new(&Default::default());
        let res = engine.parse_response(body.to_string().as_bytes(), &Query::new("tokio"));
        assert_eq!(res.hits.len(), 1);
        assert_eq!(res.hits[0].url, "https://tokio.rs/");
    }
}
