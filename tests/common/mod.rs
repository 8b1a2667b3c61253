use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use conflux::core::config::Config;
use conflux::core::types::{Category, Hit, Query};
use conflux::engines::{
    Engine, EngineDescriptor, EngineError, EngineRegistry, EngineResult, RequestConfig,
};
use conflux::search::MetaSearch;

/// A scripted engine: serves canned hits through the local path so tests
/// never touch the network.
pub struct StubEngine {
    descriptor: EngineDescriptor,
    hits: Vec<(String, String)>,
    fail_with: Option<String>,
    pub calls: Arc<AtomicUsize>,
}

impl StubEngine {
    pub fn new(
        descriptor: EngineDescriptor,
        hits: Vec<(&str, &str)>,
    ) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = Arc::new(Self {
            descriptor,
            hits: hits
                .into_iter()
                .map(|(u, t)| (u.to_string(), t.to_string()))
                .collect(),
            fail_with: None,
            calls: Arc::clone(&calls),
        });
        (engine, calls)
    }

    pub fn failing(descriptor: EngineDescriptor, error: &str) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            hits: Vec::new(),
            fail_with: Some(error.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl Engine for StubEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn build_request(&self, _query: &Query) -> Result<RequestConfig, EngineError> {
        Err(EngineError::Fatal("stub engines answer locally".into()))
    }

    fn parse_response(&self, _body: &[u8], _query: &Query) -> EngineResult {
        EngineResult::default()
    }

    fn search_local(&self, query: &Query) -> Option<EngineResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.fail_with {
            return Some(EngineResult::failed(error.clone()));
        }
        let hits = self
            .hits
            .iter()
            .map(|(url, title)| Hit {
                url: url.clone(),
                title: title.clone(),
                snippet: format!("{} snippet", title),
                engine: self.descriptor.name.to_string(),
                engines: vec![self.descriptor.name.to_string()],
                score: 0.0,
                category: query.category,
                media: None,
            })
            .collect();
        Some(EngineResult { hits, error: None })
    }
}

pub const GOOGLE_STUB: EngineDescriptor = EngineDescriptor {
    name: "google",
    shortcut: "go",
    categories: &[Category::General, Category::News],
    supports_paging: true,
    max_page: 10,
    timeout_ms: 3000,
    weight: 1.0,
    enabled: true,
};

pub const BING_STUB: EngineDescriptor = EngineDescriptor {
    name: "bing",
    shortcut: "bi",
    categories: &[Category::General, Category::News],
    supports_paging: true,
    max_page: 10,
    timeout_ms: 3000,
    weight: 0.9,
    enabled: true,
};

pub fn meta_search(engines: Vec<Arc<StubEngine>>) -> MetaSearch {
    let engines: Vec<Arc<dyn Engine>> = engines
        .into_iter()
        .map(|e| e as Arc<dyn Engine>)
        .collect();
    let registry = Arc::new(EngineRegistry::from_engines(engines));
    MetaSearch::new(registry, reqwest::Client::new(), &Config::default())
}
