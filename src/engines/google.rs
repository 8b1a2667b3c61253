use scraper::{ElementRef, Html, Selector};

use super::{
    clean_text, make_hit, DestEncoding, Engine, EngineDescriptor, EngineError, EngineResult,
    RedirectWrapper, RequestConfig, SerpLinkRules,
};
use crate::core::types::{Category, Query, SafeSearch, TimeRange};

pub const NAME: &str = "google";

pub(crate) const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    name: NAME,
    shortcut: "go",
    categories: &[Category::General, Category::News],
    supports_paging: true,
    max_page: 10,
    timeout_ms: 3000,
    weight: 1.0,
    enabled: true,
};

/// `tbs` values per time range; complete for every supported value.
const TIME_RANGE_TBS: &[(TimeRange, &str)] = &[
    (TimeRange::Day, "qdr:d"),
    (TimeRange::Week, "qdr:w"),
    (TimeRange::Month, "qdr:m"),
    (TimeRange::Year, "qdr:y"),
];

pub struct GoogleEngine {
    descriptor: EngineDescriptor,
}

impl GoogleEngine {
    pub fn new(ov: &crate::core::config::EngineOverride) -> Self {
        Self {
            descriptor: DESCRIPTOR.with_override(ov),
        }
    }
}

pub(crate) fn base_request(query: &Query, extra_tbs: Option<&str>) -> Result<RequestConfig, EngineError> {
    let mut url = url::Url::parse("https://www.google.com/search")
        .map_err(|e| EngineError::Fatal(e.to_string()))?;
    {
        let mut qp = url.query_pairs_mut();
        qp.append_pair("q", &query.upstream_text());
        qp.append_pair("hl", language_of(&query.locale));
        qp.append_pair("num", &query.per_page.clamp(10, 30).to_string());
        if query.page > 1 {
            qp.append_pair("start", &((query.page - 1) * query.per_page).to_string());
        }

        let mut tbs_parts: Vec<&str> = Vec::new();
        if let Some((_, tbs)) = TIME_RANGE_TBS.iter().find(|(tr, _)| *tr == query.time_range) {
            tbs_parts.push(tbs);
        }
        if let Some(extra) = extra_tbs {
            tbs_parts.push(extra);
        }
        if !tbs_parts.is_empty() {
            qp.append_pair("tbs", &tbs_parts.join(","));
        }

        match query.safe_search {
            SafeSearch::Strict => {
                qp.append_pair("safe", "active");
            }
            SafeSearch::Off => {
                qp.append_pair("safe", "off");
            }
            SafeSearch::Moderate => {}
        }
        if query.category == Category::News {
            qp.append_pair("tbm", "nws");
        }
    }

    Ok(RequestConfig::get(url)
        .header("Accept", "text/html,application/xhtml+xml")
        .header("Accept-Language", query.locale.clone())
        .cookie("CONSENT", "YES+"))
}

fn language_of(locale: &str) -> &str {
    locale.split(['-', '_']).next().unwrap_or("en")
}

/// Result links hide the destination behind a `/url?q=` tracking hop.
pub(crate) const LINK_RULES: SerpLinkRules = SerpLinkRules {
    resolve_base: Some("https://www.google.com/"),
    wrapper: Some(RedirectWrapper {
        hosts: &["www.google.com", "google.com"],
        path_prefix: "/url",
        param: "q",
        encoding: DestEncoding::Plain,
    }),
    keep_undecodable: false,
};

fn extract_snippet(container: &ElementRef<'_>) -> String {
    // Google markup changes often; try a few known patterns.
    let candidates = ["div.VwiC3b", "div.IsZvec", "span.aCOpRe", "div.MUxGbd"];
    for css in candidates {
        if let Ok(sel) = Selector::parse(css) {
            if let Some(n) = container.select(&sel).next() {
                let txt = clean_text(&n.text().collect::<Vec<_>>().join(" "));
                if txt.len() >= 20 {
                    return txt;
                }
            }
        }
    }
    String::new()
}

pub(crate) fn parse_serp(html: &str, query: &Query, engine: &'static str) -> Vec<crate::core::types::Hit> {
    let doc = Html::parse_document(html);
    let container_selectors = ["div#search div.MjjYud", "div#search div.g"];
    let link_sel = Selector::parse("a").unwrap();
    let h3_sel = Selector::parse("h3").unwrap();

    let mut out = Vec::new();
    for css in container_selectors {
        let Ok(container_sel) = Selector::parse(css) else {
            continue;
        };
        for container in doc.select(&container_sel) {
            let mut chosen: Option<(String, String)> = None;
            for a in container.select(&link_sel) {
                if a.select(&h3_sel).next().is_some() {
                    let href = a.value().attr("href").unwrap_or("");
                    let Some(url) = LINK_RULES.clean(href) else {
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
            let snippet = extract_snippet(&container);
            if let Some(hit) = make_hit(url, title, snippet, engine, query.category) {
                out.push(hit);
            }
        }
        if !out.is_empty() {
            break;
        }
    }
    out
}

impl Engine for GoogleEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn build_request(&self, query: &Query) -> Result<RequestConfig, EngineError> {
        base_request(query, None)
    }

    fn parse_response(&self, body: &[u8], query: &Query) -> EngineResult {
        let html = String::from_utf8_lossy(body);
        EngineResult {
            hits: parse_serp(&html, query, NAME),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn href_normalization() {
        assert_eq!(
            LINK_RULES.clean("/url?q=https://golang.org/&sa=U"),
            Some("https://golang.org/".to_string())
        );
        assert_eq!(
            LINK_RULES.clean("https://example.org/x"),
            Some("https://example.org/x".to_string())
        );
        // A tracking hop with no recoverable destination is dropped.
        assert_eq!(LINK_RULES.clean("/url?sa=U"), None);
        assert_eq!(LINK_RULES.clean("javascript:void(0)"), None);
    }

    #[test]
    fn request_encodes_paging_and_time() {
        let q = Query::new("rust async")
            .with_page(2, 10)
            .with_time_range(TimeRange::Week);
        let req = base_request(&q, None).unwrap();
        let url = req.url.as_str();
        assert!(url.contains("start=10"));
        assert!(url.contains("tbs=qdr%3Aw"));
        assert!(url.contains("q=rust+async"));
    }

    #[test]
    fn malformed_body_yields_zero_hits() {
        let engine = GoogleEngine::new(&Default::default());
        let res = engine.parse_response(b"\xff\xfenot html at all", &Query::new("x"));
        assert!(res.hits.is_empty());
        assert!(res.error.is_none());
    }

    #[test]
    fn parses_classic_result_block() {
        let html = r#"
        <div id="search"><div class="g">
            <a href="/url?q=https://www.rust-lang.org/&amp;sa=U"><h3>Rust Programming Language</h3></a>
            <div class="VwiC3b">A language empowering everyone to build reliable and efficient software.</div>
        </div></div>"#;
        let hits = parse_serp(html, &Query::new("rust"), NAME);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://www.rust-lang.org/");
        assert!(hits[0].snippet.contains("reliable"));
    }
}
