use dashmap::DashMap;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use super::{CrawlResult, FetchMode};

/// HTTP transports sharded by domain hash. Each shard is a reusable
/// connection pool; a per-domain semaphore caps concurrent in-flight
/// requests against any single host.
pub struct TransportPool {
    shards: Vec<reqwest::Client>,
    domain_limits: DashMap<String, Arc<Semaphore>>,
    max_conns_per_domain: usize,
}

impl TransportPool {
    pub fn new(
        shards: usize,
        max_conns_per_domain: usize,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let mut clients = Vec::with_capacity(shards);
        for _ in 0..shards {
            clients.push(
                reqwest::Client::builder()
                    .timeout(request_timeout)
                    .connect_timeout(request_timeout.min(Duration::from_secs(3)))
                    .pool_max_idle_per_host(max_conns_per_domain)
                    .redirect(reqwest::redirect::Policy::limited(5))
                    .build()?,
            );
        }
        Ok(Self {
            shards: clients,
            domain_limits: DashMap::new(),
            max_conns_per_domain: max_conns_per_domain.max(1),
        })
    }

    pub fn client_for(&self, domain: &str) -> &reqwest::Client {
        let hash = xxhash_rust::xxh3::xxh3_64(domain.as_bytes()) as usize;
        &self.shards[hash % self.shards.len()]
    }

    pub fn domain_permit(&self, domain: &str) -> Arc<Semaphore> {
        self.domain_limits
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_conns_per_domain)))
            .clone()
    }
}

/// Fetch one URL in the given mode. Network errors come back as `Err` so
/// the caller can update crawl state; HTTP error statuses are results.
pub async fn fetch_url(
    pool: &TransportPool,
    url: &str,
    domain: &str,
    mode: FetchMode,
) -> Result<CrawlResult, String> {
    let permit = pool.domain_permit(domain);
    let _permit = permit
        .acquire()
        .await
        .map_err(|_| "domain limiter closed".to_string())?;

    let client = pool.client_for(domain);
    let started = Instant::now();

    let request = match mode {
        FetchMode::HeadOnly => client.head(url),
        FetchMode::StatusOnly | FetchMode::Full => client.get(url),
    };

    let response = request.send().await.map_err(|e| e.to_string())?;

    let status_code = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let content_length = response.content_length();
    let redirect_url = (response.url().as_str() != url).then(|| response.url().to_string());

    let mut result = CrawlResult {
        url: url.to_string(),
        status_code,
        content_type,
        content_length,
        title: None,
        description: None,
        language: None,
        redirect_url,
        fetch_time_ms: 0,
        crawled_at: chrono::Utc::now().to_rfc3339(),
        error: None,
    };

    match mode {
        FetchMode::StatusOnly | FetchMode::HeadOnly => {
            // Body dropped unread; the connection returns to the pool.
        }
        FetchMode::Full => {
            let body = response.text().await.unwrap_or_default();
            if result.content_length.is_none() {
                result.content_length = Some(body.len() as u64);
            }
            let (title, description) = extract_page_meta(&body);
            result.title = title;
            result.description = description;
            result.language = whatlang::detect_lang(&body).map(|l| l.code().to_string());
        }
    }

    result.fetch_time_ms = started.elapsed().as_millis() as u64;
    Ok(result)
}

/// Title and meta-description from a fetched page; tolerant of anything.
fn extract_page_meta(html: &str) -> (Option<String>, Option<String>) {
    let doc = Html::parse_document(html);

    let title = Selector::parse("title").ok().and_then(|sel| {
        doc.select(&sel)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    });

    let description = Selector::parse(r#"meta[name="description"]"#)
        .ok()
        .and_then(|sel| {
            doc.select(&sel)
                .next()
                .and_then(|m| m.value().attr("content"))
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
        });

    (title, description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_choice_is_stable_per_domain() {
        let pool = TransportPool::new(4, 2, Duration::from_secs(1)).unwrap();
        let a = pool.client_for("example.org") as *const _;
        let b = pool.client_for("example.org") as *const _;
        assert_eq!(a, b);
    }

    #[test]
    fn domain_permits_are_capped() {
        let pool = TransportPool::new(1, 3, Duration::from_secs(1)).unwrap();
        let sem = pool.domain_permit("example.org");
        assert_eq!(sem.available_permits(), 3);
        // Same domain shares the limiter.
        let again = pool.domain_permit("example.org");
        assert!(Arc::ptr_eq(&sem, &again));
    }

    #[test]
    fn extracts_title_and_description() {
        let html = r#"<html><head>
            <title> Example Page </title>
            <meta name="description" content="A tiny example.">
        </head><body>irrelevant</body></html>"#;
        let (title, description) = extract_page_meta(html);
        assert_eq!(title.as_deref(), Some("Example Page"));
        assert_eq!(description.as_deref(), Some("A tiny example."));
    }
}
