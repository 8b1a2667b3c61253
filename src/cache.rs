use std::time::{Duration, Instant};

use xxhash_rust::xxh3::xxh3_128;

use crate::core::config::CacheConfig;
use crate::core::error::CacheError;
use crate::core::types::{Category, MergedResult, Query};

/// Version stamped into new cache entries; bump to invalidate the fleet's
/// cached pages after a response-shape change.
pub const CACHE_VERSION: u32 = 3;

/// 128-bit hash of the canonical query serialization.
pub fn fingerprint(query: &Query) -> u128 {
    let mut canonical = String::new();
    canonical.push_str(&query.text.to_lowercase());
    canonical.push('\n');
    for (k, v) in &query.filters {
        canonical.push_str(k);
        canonical.push('=');
        canonical.push_str(v);
        canonical.push(';');
    }
    canonical.push('\n');
    canonical.push_str(&format!(
        "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
        query.page,
        query.per_page,
        query.locale,
        query.safe_search.as_str(),
        query.time_range.as_str(),
        query.category.as_str(),
        query.verbatim,
        query.site_include.as_deref().unwrap_or(""),
        query.site_exclude.as_deref().unwrap_or(""),
        query.file_type.as_deref().unwrap_or(""),
    ));
    xxh3_128(canonical.as_bytes())
}

#[derive(Clone)]
struct CacheEntry {
    /// Serialized `MergedResult`.
    value: Vec<u8>,
    created_at: Instant,
    ttl: Duration,
    version: u32,
    category: Category,
}

/// Fingerprint-keyed artifact store. TTL and version are enforced on read;
/// the backing store's own eviction only bounds memory.
#[derive(Clone)]
pub struct ResultCache {
    store: moka::future::Cache<u128, CacheEntry>,
    ttl_default: Duration,
    ttl_images: Duration,
    ttl_news: Duration,
}

impl ResultCache {
    pub fn new(cfg: &CacheConfig) -> Self {
        let ttl_default = cfg.resolve_ttl_default();
        Self {
            store: moka::future::Cache::builder()
                .max_capacity(50_000)
                .time_to_live(ttl_default.max(Duration::from_secs(3600)))
                .support_invalidation_closures()
                .build(),
            ttl_default,
            ttl_images: cfg.resolve_ttl_images(),
            ttl_news: cfg.resolve_ttl_news(),
        }
    }

    fn ttl_for(&self, category: Category) -> Duration {
        match category {
            Category::Images => self.ttl_images,
            Category::News => self.ttl_news,
            _ => self.ttl_default,
        }
    }

    /// Miss on absence, expiry, or version mismatch with `expected_version`.
    pub async fn get(
        &self,
        fingerprint: u128,
        expected_version: u32,
    ) -> Result<Option<MergedResult>, CacheError> {
        let Some(entry) = self.store.get(&fingerprint).await else {
            return Ok(None);
        };
        if entry.version != expected_version {
            return Ok(None);
        }
        if entry.created_at.elapsed() > entry.ttl {
            self.store.invalidate(&fingerprint).await;
            return Ok(None);
        }
        let value = serde_json::from_slice(&entry.value)
            .map_err(|e| CacheError::Decode(e.to_string()))?;
        Ok(Some(value))
    }

    /// Upsert with the category's TTL and the current compiled-in version.
    pub async fn put(&self, fingerprint: u128, result: &MergedResult) -> Result<(), CacheError> {
        let value =
            serde_json::to_vec(result).map_err(|e| CacheError::Store(e.to_string()))?;
        self.store
            .insert(
                fingerprint,
                CacheEntry {
                    value,
                    created_at: Instant::now(),
                    ttl: self.ttl_for(result.category),
                    version: CACHE_VERSION,
                    category: result.category,
                },
            )
            .await;
        Ok(())
    }

    /// Bulk flush.
    pub fn invalidate_all(&self) {
        self.store.invalidate_all();
    }

    /// Bulk flush of one category's pages (e.g. news after an index push).
    pub fn invalidate_category(&self, category: Category) -> Result<(), CacheError> {
        self.store
            .invalidate_entries_if(move |_, entry| entry.category == category)
            .map(|_| ())
            .map_err(|e| CacheError::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PageInfo;

    fn sample_result(query: &str) -> MergedResult {
        MergedResult {
            query: query.to_string(),
            category: Category::General,
            results: Vec::new(),
            total_results: 0,
            engines: Vec::new(),
            instant_answer: None,
            knowledge_panel: None,
            widgets: Vec::new(),
            related_searches: Vec::new(),
            page_info: PageInfo {
                page: 1,
                per_page: 10,
                has_more: false,
            },
            elapsed_ms: 12,
            engines_failed: 0,
            timings: Vec::new(),
        }
    }

    #[test]
    fn fingerprint_is_stable_and_query_sensitive() {
        let a = Query::new("Rust Async");
        let b = Query::new("rust async");
        // Text is lowercased in the canonical form.
        assert_eq!(fingerprint(&a), fingerprint(&b));

        let c = Query::new("rust async").with_page(2, 10);
        assert_ne!(fingerprint(&a), fingerprint(&c));

        let d = Query::new("rust async").with_filter("duration", "short");
        assert_ne!(fingerprint(&a), fingerprint(&d));
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = ResultCache::new(&CacheConfig::default());
        let fp = fingerprint(&Query::new("golang"));
        let result = sample_result("golang");

        cache.put(fp, &result).await.unwrap();
        let first = cache.get(fp, CACHE_VERSION).await.unwrap().unwrap();
        let second = cache.get(fp, CACHE_VERSION).await.unwrap().unwrap();
        assert_eq!(first.query, "golang");
        assert_eq!(second.query, "golang");
    }

    #[tokio::test]
    async fn version_mismatch_is_a_miss() {
        let cache = ResultCache::new(&CacheConfig::default());
        let fp = fingerprint(&Query::new("golang"));
        cache.put(fp, &sample_result("golang")).await.unwrap();
        assert!(cache.get(fp, CACHE_VERSION + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_miss_on_read() {
        let cfg: CacheConfig = serde_json::from_str(r#"{ "ttl_default_secs": 0 }"#).unwrap();
        let cache = ResultCache::new(&cfg);
        let fp = fingerprint(&Query::new("golang"));
        cache.put(fp, &sample_result("golang")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.get(fp, CACHE_VERSION).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn category_invalidation_spares_other_categories() {
        let cache = ResultCache::new(&CacheConfig::default());
        let general_fp = fingerprint(&Query::new("golang"));
        cache.put(general_fp, &sample_result("golang")).await.unwrap();

        let mut news = sample_result("rust release");
        news.category = Category::News;
        let news_fp = fingerprint(&Query::new("rust release").with_category(Category::News));
        cache.put(news_fp, &news).await.unwrap();

        cache.invalidate_category(Category::News).unwrap();
        assert!(cache.get(news_fp, CACHE_VERSION).await.unwrap().is_none());
        assert!(cache
            .get(general_fp, CACHE_VERSION)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn invalidate_all_flushes() {
        let cache = ResultCache::new(&CacheConfig::default());
        let fp = fingerprint(&Query::new("golang"));
        cache.put(fp, &sample_result("golang")).await.unwrap();
        cache.invalidate_all();
        assert!(cache.get(fp, CACHE_VERSION).await.unwrap().is_none());
    }
}
