use std::sync::Arc;

use super::{Engine, EngineDescriptor, EngineError, EngineResult, RequestConfig};
use crate::core::types::{Category, Hit, Query};
use crate::fts::IndexDriver;

pub const NAME: &str = "local";

pub(crate) const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    name: NAME,
    shortcut: "lo",
    categories: &[Category::General],
    supports_paging: true,
    max_page: 100,
    timeout_ms: 1000,
    weight: 1.1,
    enabled: true,
};

/// Serves the offline index through the same engine contract; never touches
/// the network.
pub struct LocalEngine {
    descriptor: EngineDescriptor,
    driver: Arc<dyn IndexDriver>,
}

impl LocalEngine {
    pub fn new(ov: &crate::core::config::EngineOverride, driver: Arc<dyn IndexDriver>) -> Self {
        Self {
            descriptor: DESCRIPTOR.with_override(ov),
            driver,
        }
    }
}

impl Engine for LocalEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn build_request(&self, _query: &Query) -> Result<RequestConfig, EngineError> {
        Err(EngineError::Fatal(
            "local engine answers without a request".into(),
        ))
    }

    fn parse_response(&self, _body: &[u8], _query: &Query) -> EngineResult {
        EngineResult::default()
    }

    fn search_local(&self, query: &Query) -> Option<EngineResult> {
        // Fetch enough to cover the merged window for the requested page.
        let limit = (query.per_page * query.page) as usize;

        let results = match self.driver.search(&query.text, limit, 0) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("local index search failed: {}", e);
                return Some(EngineResult::failed(e.to_string()));
            }
        };

        let max_score = results
            .documents
            .first()
            .map(|d| d.score)
            .unwrap_or(1.0)
            .max(f32::EPSILON);

        let hits = results
            .documents
            .into_iter()
            .filter(|d| super::is_absolute_http(&d.url))
            .map(|d| Hit {
                title: d.url.clone(),
                url: d.url,
                snippet: String::new(),
                engine: NAME.to_string(),
                engines: vec![NAME.to_string()],
                // Normalize BM25 scores into the raw 0–1.5 hit range.
                score: f64::from((d.score / max_score).clamp(0.0, 1.0)) * 1.5,
                category: query.category,
                media: None,
            })
            .collect();

        Some(EngineResult { hits, error: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fts::{FtsError, FtsResults};

    struct StubDriver;

    impl IndexDriver for StubDriver {
        fn name(&self) -> &str {
            "stub"
        }

        fn search(
            &self,
            _query: &str,
            _limit: usize,
            _offset: usize,
        ) -> Result<FtsResults, FtsError> {
            Ok(FtsResults {
                documents: vec![crate::fts::DocMatch {
                    id: "1".into(),
                    url: "https://example.org/doc".into(),
                    score: 4.2,
                }],
                duration_ms: 1,
                method: "stub".into(),
                total: Some(1),
            })
        }

        fn close(&self) -> Result<(), FtsError> {
            Ok(())
        }
    }

    #[test]
    fn answers_locally_without_request() {
        let engine = LocalEngine::new(&Default::default(), Arc::new(StubDriver));
        let q = Query::new("anything");
        assert!(engine.build_request(&q).is_err());
        let res = engine.search_local(&q).unwrap();
        assert_eq!(res.hits.len(), 1);
        assert_eq!(res.hits[0].engine, "local");
        assert!(res.hits[0].score > 0.0);
    }
}
