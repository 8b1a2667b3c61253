use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use conflux::core::config::Config;
use conflux::core::types::Query;
use conflux::engines::EngineRegistry;
use conflux::fts::{self, IndexDocument, IndexDriver, Indexer, Stats};
use conflux::search::MetaSearch;

fn doc(id: &str, url: &str, text: &str) -> IndexDocument {
    IndexDocument {
        id: id.to_string(),
        url: url.to_string(),
        text: text.to_string(),
        dump: None,
        date: None,
        language: "en".to_string(),
        language_score: 1.0,
    }
}

#[tokio::test]
async fn local_engine_serves_indexed_documents_through_the_coordinator() {
    let dir = tempfile::tempdir().unwrap();
    let driver = fts::open_driver("bm25", dir.path(), "en").unwrap();

    let mut progress_calls = 0usize;
    driver
        .import(
            vec![
                doc(
                    "1",
                    "https://intra.example/tokio-guide",
                    "tokio runtime guide for asynchronous rust services",
                ),
                doc(
                    "2",
                    "https://intra.example/sqlite-notes",
                    "operational notes for the sqlite storage layer",
                ),
                doc(
                    "3",
                    "https://intra.example/oncall",
                    "oncall handbook paging escalation and alerts",
                ),
            ],
            &mut |done, total| {
                progress_calls += 1;
                assert!(done <= total);
            },
        )
        .unwrap();
    assert_eq!(progress_calls, 3);
    assert_eq!(driver.count().unwrap(), 3);

    // Only the local engine is registered: every hit comes from the index.
    let cfg: Config = serde_json::from_str(
        r#"{ "engines": {
            "google": {"enabled": false}, "bing": {"enabled": false},
            "duckduckgo": {"enabled": false}, "jina": {"enabled": false}
        } }"#,
    )
    .unwrap();
    let registry = Arc::new(EngineRegistry::builtin(
        &cfg,
        Some(driver.clone() as Arc<dyn IndexDriver>),
    ));
    let meta = MetaSearch::new(registry, reqwest::Client::new(), &cfg);

    let result = meta
        .run(&Query::new("tokio runtime"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!result.results.is_empty());
    assert_eq!(result.results[0].url, "https://intra.example/tokio-guide");
    assert_eq!(result.engines, vec!["local".to_string()]);
    assert_eq!(result.engines_failed, 0);
}

#[tokio::test]
async fn unknown_driver_id_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    assert!(fts::open_driver("tantivy", dir.path(), "en").is_err());
}
