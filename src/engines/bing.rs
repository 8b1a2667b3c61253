use scraper::{Html, Selector};

use super::{
    clean_text, make_hit, DestEncoding, Engine, EngineDescriptor, EngineError, EngineResult,
    RedirectWrapper, RequestConfig, SerpLinkRules,
};
use crate::core::types::{Category, Query, SafeSearch, TimeRange};

pub const NAME: &str = "bing";

pub(crate) const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    name: NAME,
    shortcut: "bi",
    categories: &[Category::General, Category::News],
    supports_paging: true,
    max_page: 10,
    timeout_ms: 3000,
    weight: 0.9,
    enabled: true,
};

/// `filters` values per time range; complete for every supported value.
const TIME_RANGE_FILTERS: &[(TimeRange, &str)] = &[
    (TimeRange::Day, "ex1:\"ez1\""),
    (TimeRange::Week, "ex1:\"ez2\""),
    (TimeRange::Month, "ex1:\"ez3\""),
    (TimeRange::Year, "ex1:\"ez5\""),
];

pub struct BingEngine {
    descriptor: EngineDescriptor,
}

impl BingEngine {
    pub fn new(ov: &crate::core::config::EngineOverride) -> Self {
        Self {
            descriptor: DESCRIPTOR.with_override(ov),
        }
    }
}

pub(crate) fn safe_search_cookie(safe: SafeSearch) -> (&'static str, &'static str) {
    match safe {
        SafeSearch::Off => ("SRCHHPGUSR", "ADLT=OFF"),
        SafeSearch::Moderate => ("SRCHHPGUSR", "ADLT=DEMOTE"),
        SafeSearch::Strict => ("SRCHHPGUSR", "ADLT=STRICT"),
    }
}

/// Click-tracking hop: `/ck/a?...&u=a1<base64 destination>`. A hop that
/// fails to decode is kept as-is rather than losing the hit.
pub(crate) const LINK_RULES: SerpLinkRules = SerpLinkRules {
    resolve_base: None,
    wrapper: Some(RedirectWrapper {
        hosts: &["www.bing.com", "bing.com"],
        path_prefix: "/ck/",
        param: "u",
        encoding: DestEncoding::TaggedBase64 { tag: "a1" },
    }),
    keep_undecodable: true,
};

impl Engine for BingEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn build_request(&self, query: &Query) -> Result<RequestConfig, EngineError> {
        let base = if query.category == Category::News {
            "https://www.bing.com/news/search"
        } else {
            "https://www.bing.com/search"
        };
        let mut url =
            url::Url::parse(base).map_err(|e| EngineError::Fatal(e.to_string()))?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("q", &query.upstream_text());
            if query.page > 1 {
                // Bing's offset is 1-based.
                qp.append_pair("first", &((query.page - 1) * query.per_page + 1).to_string());
            }
            if let Some((_, filters)) = TIME_RANGE_FILTERS
                .iter()
                .find(|(tr, _)| *tr == query.time_range)
            {
                qp.append_pair("filters", filters);
            }
            qp.append_pair("setlang", query.locale.split(['-', '_']).next().unwrap_or("en"));
        }

        let (ck, cv) = safe_search_cookie(query.safe_search);
        Ok(RequestConfig::get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", query.locale.clone())
            .cookie(ck, cv))
    }

    fn parse_response(&self, body: &[u8], query: &Query) -> EngineResult {
        let html = String::from_utf8_lossy(body);
        let doc = Html::parse_document(&html);
        let sel_item = Selector::parse("li.b_algo, div.news-card").unwrap();
        let sel_link = Selector::parse("h2 a, a.title").unwrap();
        let sel_snip = Selector::parse("div.b_caption p, div.snippet").unwrap();

        let mut hits = Vec::new();
        for item in doc.select(&sel_item) {
            let link = match item.select(&sel_link).next() {
                Some(l) => l,
                None => continue,
            };
            let href_raw = link.value().attr("href").unwrap_or("");
            let Some(href) = LINK_RULES.clean(href_raw) else {
                continue;
            };
            let title = clean_text(&link.text().collect::<Vec<_>>().join(" "));
            let snippet = item
                .select(&sel_snip)
                .next()
                .map(|p| clean_text(&p.text().collect::<Vec<_>>().join(" ")))
                .unwrap_or_default();

            if let Some(hit) = make_hit(href, title, snippet, NAME, query.category) {
                hits.push(hit);
            }
        }

        EngineResult { hits, error: None }
    }
}
