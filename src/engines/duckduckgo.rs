use scraper::{Html, Selector};

use super::{
    clean_text, make_hit, DestEncoding, Engine, EngineDescriptor, EngineError, EngineResult,
    RedirectWrapper, RequestConfig, SerpLinkRules,
};
use crate::core::types::{Category, Query, SafeSearch, TimeRange};

pub const NAME: &str = "duckduckgo";

pub(crate) const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    name: NAME,
    shortcut: "ddg",
    categories: &[Category::General],
    supports_paging: true,
    max_page: 5,
    timeout_ms: 4500,
    weight: 0.8,
    enabled: true,
};

/// `df` values per time range; complete for every supported value.
const TIME_RANGE_DF: &[(TimeRange, &str)] = &[
    (TimeRange::Day, "d"),
    (TimeRange::Week, "w"),
    (TimeRange::Month, "m"),
    (TimeRange::Year, "y"),
];

pub struct DuckDuckGoEngine {
    descriptor: EngineDescriptor,
}

impl DuckDuckGoEngine {
    pub fn new(ov: &crate::core::config::EngineOverride) -> Self {
        Self {
            descriptor: DESCRIPTOR.with_override(ov),
        }
    }
}

/// Result links ride a `/l/?uddg=` hop on the html endpoint; hrefs are
/// often rooted or protocol-relative and resolve against the SERP origin.
const LINK_RULES: SerpLinkRules = SerpLinkRules {
    resolve_base: Some("https://duckduckgo.com/"),
    wrapper: Some(RedirectWrapper {
        hosts: &["duckduckgo.com", "html.duckduckgo.com"],
        path_prefix: "/l/",
        param: "uddg",
        encoding: DestEncoding::Plain,
    }),
    keep_undecodable: true,
};

impl Engine for DuckDuckGoEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn build_request(&self, query: &Query) -> Result<RequestConfig, EngineError> {
        let mut url = url::Url::parse("https://html.duckduckgo.com/html/")
            .map_err(|e| EngineError::Fatal(e.to_string()))?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("q", &query.upstream_text());
            if query.page > 1 {
                // The html endpoint pages by absolute result offset.
                qp.append_pair("s", &((query.page - 1) * 30).to_string());
                qp.append_pair("dc", &((query.page - 1) * 30 + 1).to_string());
            }
            if let Some((_, df)) = TIME_RANGE_DF.iter().find(|(tr, _)| *tr == query.time_range) {
                qp.append_pair("df", df);
            }
            qp.append_pair(
                "kp",
                match query.safe_search {
                    SafeSearch::Off => "-2",
                    SafeSearch::Moderate => "-1",
                    SafeSearch::Strict => "1",
                },
            );
        }

        Ok(RequestConfig::get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", query.locale.clone()))
    }

    fn parse_response(&self, body: &[u8], query: &Query) -> EngineResult {
        let html = String::from_utf8_lossy(body);
        let doc = Html::parse_document(&html);
        let sel_item = Selector::parse("div.results_links, div.result").unwrap();
        let sel_link = Selector::parse("a.result__a").unwrap();
        let sel_snip = Selector::parse("a.result__snippet, div.result__snippet").unwrap();

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
                .map(|n| clean_text(&n.text().collect::<Vec<_>>().join(" ")))
                .unwrap_or_default();

            if let Some(hit) = make_hit(href, title, snippet, NAME, query.category) {
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
    fn unwraps_uddg_redirect() {
        let href = "/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&rut=abc";
        assert_eq!(
            LINK_RULES.clean(href),
            Some("https://www.rust-lang.org/".to_string())
        );
    }

    #[test]
    fn protocol_relative_urls_are_upgraded() {
        assert_eq!(
            LINK_RULES.clean("//example.org/a"),
            Some("https://example.org/a".to_string())
        );
    }

    #[test]
    fn safe_search_kp_param() {
        let engine = DuckDuckGoEngine::new(&Default::default());
        let mut q = Query::new("test");
        q.safe_search = SafeSearch::Strict;
        let req = engine.build_request(&q).unwrap();
        assert!(req.url.as_str().contains("kp=1"));
    }

    #[test]
    fn parses_result_block() {
        let html = r#"
        <div class="results_links">
            <a class="result__a" href="/l/?uddg=https%3A%2F%2Fgo.dev%2F">The Go Programming Language</a>
            <div class="result__snippet">Go makes it easy to build simple and reliable software.</div>
        </div>"#;
        let engine = DuckDuckGoEngine::new(&Default::default());
        let res = engine.parse_response(html.as_bytes(), &Query::new("golang"));
        assert_eq!(res.hits.len(), 1);
        assert_eq!(res.hits[0].url, "https://go.dev/");
        assert_eq!(res.hits[0].engine, "duckduckgo");
    }
}
