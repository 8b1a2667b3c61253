use serde::Deserialize;

use super::{format_duration, Engine, EngineDescriptor, EngineError, EngineResult, RequestConfig};
use crate::core::types::{Category, Hit, MediaInfo, Query, SafeSearch};

pub const NAME: &str = "peertube";

/// Searches the federated PeerTube network through the Sepia index.
pub(crate) const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    name: NAME,
    shortcut: "pt",
    categories: &[Category::Videos],
    supports_paging: true,
    max_page: 20,
    timeout_ms: 4000,
    weight: 0.6,
    enabled: true,
};

pub struct PeertubeEngine {
    descriptor: EngineDescriptor,
}

impl PeertubeEngine {
    pub fn new(ov: &crate::core::config::EngineOverride) -> Self {
        Self {
            descriptor: DESCRIPTOR.with_override(ov),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    data: Vec<ApiVideo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiVideo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    embed_path: Option<String>,
    #[serde(default)]
    thumbnail_path: Option<String>,
    #[serde(default)]
    views: Option<u64>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    account: Option<ApiAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAccount {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    host: Option<String>,
}

impl Engine for PeertubeEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn build_request(&self, query: &Query) -> Result<RequestConfig, EngineError> {
        let mut url = url::Url::parse("https://sepiasearch.org/api/v1/search/videos")
            .map_err(|e| EngineError::Fatal(e.to_string()))?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("search", &query.upstream_text());
            qp.append_pair("count", &query.per_page.min(30).to_string());
            qp.append_pair("start", &((query.page - 1) * query.per_page).to_string());
            qp.append_pair(
                "nsfw",
                if query.safe_search == SafeSearch::Off {
                    "both"
                } else {
                    "false"
                },
            );
        }
        Ok(RequestConfig::get(url).header("Accept", "application/json"))
    }

    fn parse_response(&self, body: &[u8], _query: &Query) -> EngineResult {
        let Ok(parsed) = serde_json::from_slice::<ApiResponse>(body) else {
            return EngineResult::default();
        };

        let hits = parsed
            .data
            .into_iter()
            .filter_map(|v| {
                let url = v.url.filter(|u| super::is_absolute_http(u))?;
                let title = v.name.filter(|t| !t.is_empty())?;
                let host = v.account.as_ref().and_then(|a| a.host.clone());
                let embed_url = match (&host, v.embed_path) {
                    (Some(host), Some(path)) => Some(format!("https://{}{}", host, path)),
                    _ => None,
                };
                let thumbnail_url = match (&host, v.thumbnail_path) {
                    (Some(host), Some(path)) => Some(format!("https://{}{}", host, path)),
                    _ => None,
                };
                Some(Hit {
                    url,
                    title,
                    snippet: v.description.unwrap_or_default(),
                    engine: NAME.to_string(),
                    engines: vec![NAME.to_string()],
                    score: 0.0,
                    category: Category::Videos,
                    media: Some(MediaInfo {
                        thumbnail_url,
                        duration: v.duration.map(format_duration),
                        duration_seconds: v.duration,
                        embed_url,
                        views: v.views,
                        channel: v.account.and_then(|a| a.display_name),
                        published_at: v.published_at,
                        width: None,
                        height: None,
                    }),
                })
            })
            .collect();

        EngineResult { hits, error: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sepia_payload() {
        let body = serde_json::json!({
            "total": 1,
            "data": [{
                "name": "Free Software Song",
                "description": "A classic.",
                "duration": 83,
                "url": "https://framatube.org/w/abc123",
                "embedPath": "/videos/embed/abc123",
                "thumbnailPath": "/lazy-static/thumbnails/abc.jpg",
                "views": 999,
                "publishedAt": "2024-02-01T00:00:00.000Z",
                "account": { "displayName": "fsf", "host": "framatube.org" }
            }]
        });
        let engine = PeertubeEngine::new(&Default::default());
        let res = engine.parse_response(body.to_string().as_bytes(), &Query::new("fsf"));
        assert_eq!(res.hits.len(), 1);
        let media = res.hits[0].media.as_ref().unwrap();
        assert_eq!(
            media.embed_url.as_deref(),
            Some("https://framatube.org/videos/embed/abc123")
        );
        assert_eq!(media.duration.as_deref(), Some("00:01:23"));
    }

    #[test]
    fn paging_uses_start_offset() {
        let engine = PeertubeEngine::new(&Default::default());
        let q = Query::new("x").with_page(3, 10);
        let req = engine.build_request(&q).unwrap();
        assert!(req.url.as_str().contains("start=20"));
    }
}
