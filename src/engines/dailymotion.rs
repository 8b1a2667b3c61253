use serde::Deserialize;

use super::{format_duration, Engine, EngineDescriptor, EngineError, EngineResult, RequestConfig};
use crate::core::types::{Category, Hit, MediaInfo, Query, SafeSearch};

pub const NAME: &str = "dailymotion";

pub(crate) const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    name: NAME,
    shortcut: "dm",
    categories: &[Category::Videos],
    supports_paging: true,
    max_page: 50,
    timeout_ms: 3000,
    weight: 0.7,
    enabled: true,
};

const FIELDS: &str =
    "id,title,description,duration,url,embed_url,thumbnail_360_url,owner.screenname,created_time,views_total";

pub struct DailymotionEngine {
    descriptor: EngineDescriptor,
}

impl DailymotionEngine {
    pub fn new(ov: &crate::core::config::EngineOverride) -> Self {
        Self {
            descriptor: DESCRIPTOR.with_override(ov),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    list: Vec<ApiVideo>,
}

#[derive(Debug, Deserialize)]
struct ApiVideo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    embed_url: Option<String>,
    #[serde(default)]
    thumbnail_360_url: Option<String>,
    #[serde(default, rename = "owner.screenname")]
    owner_screenname: Option<String>,
    #[serde(default)]
    created_time: Option<i64>,
    #[serde(default)]
    views_total: Option<u64>,
}

impl Engine for DailymotionEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn build_request(&self, query: &Query) -> Result<RequestConfig, EngineError> {
        let mut url = url::Url::parse("https://api.dailymotion.com/videos")
            .map_err(|e| EngineError::Fatal(e.to_string()))?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("search", &query.upstream_text());
            qp.append_pair("fields", FIELDS);
            qp.append_pair("limit", &query.per_page.min(30).to_string());
            qp.append_pair("page", &query.page.to_string());
            qp.append_pair(
                "family_filter",
                if query.safe_search == SafeSearch::Off {
                    "false"
                } else {
                    "true"
                },
            );
            if !query.locale.is_empty() {
                qp.append_pair(
                    "localization",
                    query.locale.split(['-', '_']).next().unwrap_or("en"),
                );
            }
        }
        Ok(RequestConfig::get(url).header("Accept", "application/json"))
    }

    fn parse_response(&self, body: &[u8], _query: &Query) -> EngineResult {
        let Ok(parsed) = serde_json::from_slice::<ApiResponse>(body) else {
            return EngineResult::default();
        };

        let hits = parsed
            .list
            .into_iter()
            .filter_map(|v| {
                let url = v.url.filter(|u| super::is_absolute_http(u))?;
                let title = v.title.filter(|t| !t.is_empty())?;
                let published_at = v.created_time.and_then(|ts| {
                    chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.to_rfc3339())
                });
                Some(Hit {
                    url,
                    title,
                    snippet: v.description.unwrap_or_default(),
                    engine: NAME.to_string(),
                    engines: vec![NAME.to_string()],
                    score: 0.0,
                    category: Category::Videos,
                    media: Some(MediaInfo {
                        thumbnail_url: v.thumbnail_360_url,
                        duration: v.duration.map(format_duration),
                        duration_seconds: v.duration,
                        embed_url: v.embed_url,
                        views: v.views_total,
                        channel: v.owner_screenname,
                        published_at,
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
    fn parses_api_list() {
        let body = serde_json::json!({
            "page": 1,
            "list": [
                {
                    "id": "x8abc",
                    "title": "Rust in 100 Seconds",
                    "description": "A quick tour.",
                    "duration": 127,
                    "url": "https://www.dailymotion.com/video/x8abc",
                    "views_total": 4200,
                    "owner.screenname": "fireship"
                },
                { "id": "broken", "title": "", "url": "https://www.dailymotion.com/video/x9" }
            ]
        });
        let engine = DailymotionEngine::new(&Default::default());
        let res = engine.parse_response(body.to_string().as_bytes(), &Query::new("rust"));
        assert_eq!(res.hits.len(), 1);
        let media = res.hits[0].media.as_ref().unwrap();
        assert_eq!(media.duration.as_deref(), Some("00:02:07"));
        assert_eq!(media.views, Some(4200));
    }

    #[test]
    fn garbage_body_is_empty_not_error() {
        let engine = DailymotionEngine::new(&Default::default());
        let res = engine.parse_response(b"<html>503</html>", &Query::new("rust"));
        assert!(res.hits.is_empty());
        assert!(res.error.is_none());
    }
}
