use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

use super::{
    clean_text, make_hit, normalize_duration, DestEncoding, Engine, EngineDescriptor, EngineError,
    EngineResult, RedirectWrapper, RequestConfig, SerpLinkRules,
};
use crate::core::types::{Category, MediaInfo, Query};

pub const NAME: &str = "bing_videos";

pub(crate) const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    name: NAME,
    shortcut: "bv",
    categories: &[Category::Videos],
    supports_paging: true,
    max_page: 10,
    timeout_ms: 3500,
    weight: 0.9,
    enabled: true,
};

/// Video-length facet; complete for every supported bucket.
const DURATION_FILTERS: &[(&str, &str)] = &[
    ("short", "videolength-short"),
    ("medium", "videolength-medium"),
    ("long", "videolength-long"),
];

/// Same click-tracking hop as web search; rooted watch-page hrefs resolve
/// against the video vertical's origin.
const LINK_RULES: SerpLinkRules = SerpLinkRules {
    resolve_base: Some("https://www.bing.com/"),
    wrapper: Some(RedirectWrapper {
        hosts: &["www.bing.com", "bing.com"],
        path_prefix: "/ck/",
        param: "u",
        encoding: DestEncoding::TaggedBase64 { tag: "a1" },
    }),
    keep_undecodable: true,
};

pub struct BingVideosEngine {
    descriptor: EngineDescriptor,
}

impl BingVideosEngine {
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

impl Engine for BingVideosEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn build_request(&self, query: &Query) -> Result<RequestConfig, EngineError> {
        let mut url = url::Url::parse("https://www.bing.com/videos/search")
            .map_err(|e| EngineError::Fatal(e.to_string()))?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("q", &query.upstream_text());
            if query.page > 1 {
                qp.append_pair("first", &((query.page - 1) * query.per_page + 1).to_string());
            }
            if let Some(tag) = query
                .filters
                .get("duration")
                .and_then(|v| DURATION_FILTERS.iter().find(|(k, _)| k == v))
                .map(|(_, tag)| *tag)
            {
                qp.append_pair("qft", &format!("+filterui:{}", tag));
            }
        }

        let (ck, cv) = super::bing::safe_search_cookie(query.safe_search);
        Ok(RequestConfig::get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", query.locale.clone())
            .cookie(ck, cv))
    }

    fn parse_response(&self, body: &[u8], query: &Query) -> EngineResult {
        let html = String::from_utf8_lossy(body);
        let doc = Html::parse_document(&html);
        let sel_card = Selector::parse("div.mc_vtvc, div.dg_u").unwrap();
        let sel_link = Selector::parse("a").unwrap();

        let mut hits = Vec::new();
        for card in doc.select(&sel_card) {
            let Some(link) = card
                .select(&sel_link)
                .find(|a| a.value().attr("href").is_some_and(|h| !h.is_empty()))
            else {
                continue;
            };
            let href = link.value().attr("href").unwrap_or("");
            // Video cards link with rooted watch-page hrefs.
            let Some(url) = LINK_RULES.clean(href) else {
                continue;
            };
            // Cards carry the title either as an attribute or as link text.
            let title = link
                .value()
                .attr("title")
                .map(|t| clean_text(t))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| clean_text(&link.text().collect::<Vec<_>>().join(" ")));

            let text = clean_text(&card.text().collect::<Vec<_>>().join(" "));
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_filter_maps_to_facet() {
        let engine = BingVideosEngine::new(&Default::default());
        let q = Query::new("test")
            .with_category(Category::Videos)
            .with_filter("duration", "long");
        let req = engine.build_request(&q).unwrap();
        assert!(req.url.as_str().contains("videolength-long"));
    }

    #[test]
    fn parses_video_card_with_duration() {
        let html = r#"
        <div class="mc_vtvc">
          <a href="https://www.example.org/watch/1" title="Intro to Sorting">
            <span>Intro to Sorting 12:34 10K views</span>
          </a>
        </div>"#;
        let engine = BingVideosEngine::new(&Default::default());
        let res = engine.parse_response(
            html.as_bytes(),
            &Query::new("sorting").with_category(Category::Videos),
        );
        assert_eq!(res.hits.len(), 1);
        let media = res.hits[0].media.as_ref().unwrap();
        assert_eq!(media.duration.as_deref(), Some("00:12:34"));
        assert_eq!(media.duration_seconds, Some(754));
    }
}
