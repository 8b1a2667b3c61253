use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

use super::{
    clean_text, make_hit, normalize_duration, Engine, EngineDescriptor, EngineError, EngineResult,
    RequestConfig,
};
use crate::core::types::{Category, MediaInfo, Query};

pub const NAME: &str = "google_videos";

pub(crate) const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    name: NAME,
    shortcut: "gv",
    categories: &[Category::Videos],
    supports_paging: true,
    max_page: 10,
    timeout_ms: 3000,
    weight: 1.0,
    enabled: true,
};

/// `tbs` values for the `duration` filter; complete for every supported
/// bucket, anything else is dropped.
const DURATION_TBS: &[(&str, &str)] = &[
    ("short", "dur:s"),
    ("medium", "dur:m"),
    ("long", "dur:l"),
];

pub struct GoogleVideosEngine {
    descriptor: EngineDescriptor,
}

impl GoogleVideosEngine {
    pub fn new(ov: &crate::core::config::EngineOverride) -> Self {
        Self {
            descriptor: DESCRIPTOR.with_override(ov),
        }
    }
}

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2}:)?\d{1,2}:\d{2}\b").unwrap())
}

impl Engine for GoogleVideosEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn build_request(&self, query: &Query) -> Result<RequestConfig, EngineError> {
        let extra_tbs = query
            .filters
            .get("duration")
            .and_then(|v| DURATION_TBS.iter().find(|(k, _)| k == v))
            .map(|(_, tbs)| *tbs);
        let mut req = super::google::base_request(query, extra_tbs)?;
        req.url.query_pairs_mut().append_pair("tbm", "vid");
        Ok(req)
    }

    fn parse_response(&self, body: &[u8], query: &Query) -> EngineResult {
        let html = String::from_utf8_lossy(body);
        let doc = Html::parse_document(&html);
        let container_sel = Selector::parse("div#search div.g, div#search div.MjjYud").unwrap();
        let link_sel = Selector::parse("a").unwrap();
        let h3_sel = Selector::parse("h3").unwrap();

        let mut hits = Vec::new();
        for container in doc.select(&container_sel) {
            let mut chosen: Option<(String, String)> = None;
            for a in container.select(&link_sel) {
                if a.select(&h3_sel).next().is_some() {
                    let href = a.value().attr("href").unwrap_or("");
                    let Some(url) = super::google::LINK_RULES.clean(href) else {
                        continue;
                    };
                    let title = a
                        .select(&h3_sel)
                        .next()
                        .map(|h| clean_text(&h.text().collect::<Vec<_>>().join(" ")))
                        .unwrap_or_default();
                    if title.is_empty() {
                        continue;
                    }
                    chosen = Some((url, title));
                    break;
                }
            }
            let Some((url, title)) = chosen else {
                continue;
            };
            if url.contains("google.com") {
                continue;
            }

            let text = clean_text(&container.text().collect::<Vec<_>>().join(" "));
            let media = duration_re()
                .find(&text)
                .and_then(|m| normalize_duration(m.as_str()))
                .map(|(duration, secs)| MediaInfo {
                    duration: Some(duration),
                    duration_seconds: Some(secs),
                    ..Default::default()
                });

            if let Some(mut hit) = make_hit(url, title, text, NAME, query.category) {
                hit.media = media;
                hits.push(hit);
            }
        }

        EngineResult { hits, error: None }
    }
}
