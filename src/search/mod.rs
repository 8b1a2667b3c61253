pub mod merge;
pub mod meta;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bangs::{BangOutcome, BangRegistry};
use crate::cache::{fingerprint, ResultCache, CACHE_VERSION};
use crate::core::error::ApiError;
use crate::core::types::{
    BangRef, MergedResult, Query, SearchOutcome, SearchRedirect, MAX_QUERY_LEN,
};
use crate::instant::InstantServices;
use crate::widgets::{detect_widgets, WidgetSettings};

pub use meta::{Cancelled, MetaSearch};

/// Per-request knobs that do not participate in the fingerprint.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Bypass the cache read and unconditionally write on completion.
    pub refetch: bool,
    /// Expected cache version; older entries read as misses.
    pub version: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            refetch: false,
            version: CACHE_VERSION,
        }
    }
}

#[derive(Debug)]
pub enum SearchError {
    /// The request was cancelled; there is nothing to respond with.
    Cancelled,
    Api(ApiError),
}

impl From<ApiError> for SearchError {
    fn from(e: ApiError) -> Self {
        SearchError::Api(e)
    }
}

/// Top-level entry: cache check → bang → meta-search → enrich → cache store.
pub struct SearchService {
    meta: MetaSearch,
    cache: ResultCache,
    bangs: Arc<BangRegistry>,
    instant: Arc<InstantServices>,
    widget_settings: WidgetSettings,
}

impl SearchService {
    pub fn new(
        meta: MetaSearch,
        cache: ResultCache,
        bangs: Arc<BangRegistry>,
        instant: Arc<InstantServices>,
    ) -> Self {
        Self {
            meta,
            cache,
            bangs,
            instant,
            widget_settings: WidgetSettings::default(),
        }
    }

    pub fn with_widget_settings(mut self, settings: WidgetSettings) -> Self {
        self.widget_settings = settings;
        self
    }

    pub fn bangs(&self) -> &Arc<BangRegistry> {
        &self.bangs
    }

    pub fn instant(&self) -> &Arc<InstantServices> {
        &self.instant
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub async fn search(
        &self,
        query: Query,
        options: SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        validate(&query)?;

        // The fingerprint covers the query as the user posed it; bang
        // rewrites happen downstream of the cache.
        let fp = fingerprint(&query);
        if !options.refetch {
            match self.cache.get(fp, options.version).await {
                Ok(Some(cached)) => {
                    debug!(query = %query.text, "cache hit");
                    return Ok(SearchOutcome::Results(Box::new(cached)));
                }
                Ok(None) => {}
                Err(e) => warn!("cache read degraded to miss: {}", e),
            }
        }

        // Bang resolution may rewrite, switch category, or end the request
        // with a redirect.
        let mut effective = query.clone();
        let mut lucky = false;
        match self.bangs.resolve(&query.text) {
            BangOutcome::None => {}
            BangOutcome::Redirect { url, bang } => {
                return Ok(SearchOutcome::Redirect(SearchRedirect {
                    redirect_url: url,
                    bang,
                }));
            }
            BangOutcome::Category {
                query: rewritten,
                category,
                ..
            } => {
                effective.text = rewritten;
                effective.category = category;
            }
            BangOutcome::TimeFilter {
                query: rewritten,
                range,
            } => {
                effective.text = rewritten;
                effective.time_range = range;
            }
            BangOutcome::Lucky { query: rewritten } => {
                effective.text = rewritten;
                effective.page = 1;
                effective.per_page = 1;
                lucky = true;
            }
        }
        validate(&effective)?;

        // Enrichment detection is pure and cheap; it runs alongside the
        // fan-out and joins when both are ready.
        let (meta_result, enrichment) = tokio::join!(self.meta.run(&effective, cancel), async {
            detect_widgets(&effective.text, &self.instant, &self.widget_settings)
        });
        let mut merged = match meta_result {
            Ok(m) => m,
            Err(Cancelled) => return Err(SearchError::Cancelled),
        };

        if lucky {
            if let Some(hit) = merged.results.first() {
                return Ok(SearchOutcome::Redirect(SearchRedirect {
                    redirect_url: hit.url.clone(),
                    bang: BangRef {
                        trigger: "lucky".to_string(),
                        name: "Lucky".to_string(),
                    },
                }));
            }
        }

        let (widgets, instant_answer, knowledge_panel, related_searches) = enrichment;
        merged.widgets = widgets;
        merged.instant_answer = instant_answer;
        merged.knowledge_panel = knowledge_panel;
        merged.related_searches = related_searches;

        // Record the served query for future suggestions; losing one is fine.
        self.instant.suggest.record(&effective.text);

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        if let Err(e) = self.cache.put(fp, &merged).await {
            warn!("cache write skipped: {}", e);
        }

        Ok(SearchOutcome::Results(Box::new(merged)))
    }

    /// Direct access to the coordinator for callers that compose their own
    /// result pages (news feed, AI sessions).
    pub async fn meta_search(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<MergedResult, Cancelled> {
        self.meta.run(query, cancel).await
    }
}

fn validate(query: &Query) -> Result<(), ApiError> {
    if query.text.trim().is_empty() {
        return Err(ApiError::Validation("query must not be empty".into()));
    }
    if query.text.chars().count() > MAX_QUERY_LEN {
        return Err(ApiError::Validation(format!(
            "query exceeds {} characters",
            MAX_QUERY_LEN
        )));
    }
    if query.page == 0 || query.per_page == 0 {
        return Err(ApiError::Validation("page and per_page start at 1".into()));
    }
    Ok(())
}
