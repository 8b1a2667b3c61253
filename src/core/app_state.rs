use std::env;
use std::sync::Arc;

use crate::ai::AiSessionService;
use crate::bangs::BangRegistry;
use crate::cache::ResultCache;
use crate::core::config::Config;
use crate::engines::EngineRegistry;
use crate::fts::{self, IndexDriver};
use crate::instant::InstantServices;
use crate::news::NewsService;
use crate::search::{MetaSearch, SearchService};

#[derive(Clone)]
pub struct AppState {
    pub http_client: reqwest::Client,
    pub config: Arc<Config>,
    pub registry: Arc<EngineRegistry>,
    pub search: Arc<SearchService>,
    pub news: Arc<NewsService>,
    pub ai: Arc<AiSessionService>,
    // Concurrency control for external calls
    pub outbound_limit: Arc<tokio::sync::Semaphore>,
    /// Present when the local index opened successfully.
    pub index: Option<Arc<crate::fts::Bm25Driver>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("engines", &self.registry.list().len())
            .field("index_enabled", &self.index.is_some())
            .finish()
    }
}

impl AppState {
    pub fn new(http_client: reqwest::Client, config: Config) -> Self {
        let outbound_limit = env::var("CONFLUX_OUTBOUND_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(64);

        let data_dir = config.fts.resolve_data_dir();
        let index = match fts::open_driver(
            &config.fts.resolve_driver(),
            &data_dir,
            &config.fts.resolve_language(),
        ) {
            Ok(driver) => Some(driver),
            Err(e) => {
                tracing::warn!(
                    "local index unavailable ({}); continuing without the local engine",
                    e
                );
                None
            }
        };

        let registry = Arc::new(EngineRegistry::builtin(
            &config,
            index
                .clone()
                .map(|d| d as Arc<dyn IndexDriver>),
        ));
        let meta = MetaSearch::new(Arc::clone(&registry), http_client.clone(), &config);
        let cache = ResultCache::new(&config.cache);
        let bangs = Arc::new(BangRegistry::new());
        let instant = Arc::new(InstantServices::load(&data_dir));

        let search = Arc::new(SearchService::new(meta, cache, bangs, instant));
        let news = Arc::new(NewsService::new(Arc::clone(&search)));
        let ai = Arc::new(AiSessionService::new(Arc::clone(&search)));

        Self {
            http_client,
            config: Arc::new(config),
            registry,
            search,
            news,
            ai,
            outbound_limit: Arc::new(tokio::sync::Semaphore::new(outbound_limit)),
            index,
        }
    }
}
