use std::collections::HashMap;
use std::sync::Arc;

use super::{
    bing, bing_videos, dailymotion, duckduckgo, google, google_videos, jina, local, peertube,
    vimeo, youtube, Engine,
};
use crate::core::config::Config;
use crate::core::types::Category;
use crate::fts::IndexDriver;

/// Name → engine mapping, built once at process init and read-only after.
pub struct EngineRegistry {
    engines: Vec<Arc<dyn Engine>>,
    by_name: HashMap<&'static str, usize>,
    by_shortcut: HashMap<&'static str, usize>,
}

impl EngineRegistry {
    /// Register all built-in engines, applying config/env overrides. The
    /// local engine is only registered when an index driver is available.
    pub fn builtin(cfg: &Config, index: Option<Arc<dyn IndexDriver>>) -> Self {
        let mut engines: Vec<Arc<dyn Engine>> = vec![
            Arc::new(google::GoogleEngine::new(&cfg.engine_override(google::NAME))),
            Arc::new(bing::BingEngine::new(&cfg.engine_override(bing::NAME))),
            Arc::new(duckduckgo::DuckDuckGoEngine::new(
                &cfg.engine_override(duckduckgo::NAME),
            )),
            Arc::new(google_videos::GoogleVideosEngine::new(
                &cfg.engine_override(google_videos::NAME),
            )),
            Arc::new(bing_videos::BingVideosEngine::new(
                &cfg.engine_override(bing_videos::NAME),
            )),
            Arc::new(youtube::YoutubeEngine::new(
                &cfg.engine_override(youtube::NAME),
            )),
            Arc::new(vimeo::VimeoEngine::new(&cfg.engine_override(vimeo::NAME))),
            Arc::new(dailymotion::DailymotionEngine::new(
                &cfg.engine_override(dailymotion::NAME),
            )),
            Arc::new(peertube::PeertubeEngine::new(
                &cfg.engine_override(peertube::NAME),
            )),
            Arc::new(jina::JinaEngine::new(&cfg.engine_override(jina::NAME))),
        ];
        if let Some(driver) = index {
            engines.push(Arc::new(local::LocalEngine::new(
                &cfg.engine_override(local::NAME),
                driver,
            )));
        }
        Self::from_engines(engines)
    }

    pub fn from_engines(engines: Vec<Arc<dyn Engine>>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_shortcut = HashMap::new();
        for (idx, engine) in engines.iter().enumerate() {
            let d = engine.descriptor();
            let prev = by_name.insert(d.name, idx);
            debug_assert!(prev.is_none(), "duplicate engine name {}", d.name);
            let prev = by_shortcut.insert(d.shortcut, idx);
            debug_assert!(prev.is_none(), "duplicate engine shortcut {}", d.shortcut);
        }
        Self {
            engines,
            by_name,
            by_shortcut,
        }
    }

    pub fn list(&self) -> &[Arc<dyn Engine>] {
        &self.engines
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<dyn Engine>> {
        self.by_name.get(name).map(|&i| &self.engines[i])
    }

    pub fn by_shortcut(&self, shortcut: &str) -> Option<&Arc<dyn Engine>> {
        self.by_shortcut.get(shortcut).map(|&i| &self.engines[i])
    }

    pub fn by_category(&self, category: Category) -> Vec<&Arc<dyn Engine>> {
        self.engines
            .iter()
            .filter(|e| e.descriptor().supports_category(category))
            .collect()
    }

    /// Engines eligible for one request: enabled, category match, and the
    /// requested page within the engine's reach.
    pub fn select(&self, category: Category, page: u32) -> Vec<Arc<dyn Engine>> {
        self.engines
            .iter()
            .filter(|e| {
                let d = e.descriptor();
                d.enabled && d.supports_category(category) && page <= d.max_page
            })
            .cloned()
            .collect()
    }
}
