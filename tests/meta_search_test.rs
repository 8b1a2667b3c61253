mod common;

use tokio_util::sync::CancellationToken;

use common::{meta_search, StubEngine, BING_STUB, GOOGLE_STUB};
use conflux::core::types::{Category, Query};
use conflux::engines::EngineDescriptor;

#[tokio::test]
async fn corroborated_hit_fuses_scores_and_engines() {
    let (google, _) = StubEngine::new(
        GOOGLE_STUB,
        vec![
            ("https://golang.org/", "The Go Programming Language"),
            ("https://go.dev/doc/", "Go Documentation"),
        ],
    );
    let (bing, _) = StubEngine::new(
        BING_STUB,
        vec![("https://golang.org", "Go Language Homepage")],
    );
    let meta = meta_search(vec![google, bing]);

    let result = meta
        .run(&Query::new("golang"), &CancellationToken::new())
        .await
        .unwrap();

    // The Go homepage appears exactly once, fused from both engines.
    let top = &result.results[0];
    assert_eq!(top.engines, vec!["bing".to_string(), "google".to_string()]);
    assert!((top.score - 1.9).abs() < 1e-9);
    // Highest-weighted engine supplies the title.
    assert_eq!(top.title, "The Go Programming Language");

    let golang_hits = result
        .results
        .iter()
        .filter(|h| h.url.contains("golang.org"))
        .count();
    assert_eq!(golang_hits, 1);

    assert_eq!(
        result.engines,
        vec!["bing".to_string(), "google".to_string()]
    );
    assert_eq!(result.engines_failed, 0);
}

#[tokio::test]
async fn urls_parse_as_absolute_http_and_dedup() {
    let (google, _) = StubEngine::new(
        GOOGLE_STUB,
        vec![
            ("https://a.example/x", "A"),
            ("https://a.example/x/", "A slash"),
            ("https://b.example/y", "B"),
        ],
    );
    let meta = meta_search(vec![google]);
    let result = meta
        .run(&Query::new("dedup"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.results.len(), 2);
    for hit in &result.results {
        let parsed = url::Url::parse(&hit.url).unwrap();
        assert!(matches!(parsed.scheme(), "http" | "https"));
    }
}

#[tokio::test]
async fn failing_engine_does_not_abort_the_request() {
    let (google, _) = StubEngine::new(GOOGLE_STUB, vec![("https://ok.example/", "Fine")]);
    let broken = StubEngine::failing(BING_STUB, "upstream 503");
    let meta = meta_search(vec![google, broken]);

    let result = meta
        .run(&Query::new("resilience"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.results.len(), 1);
    assert_eq!(result.engines_failed, 1);
    // The broken engine contributes no surviving hits, so it is absent.
    assert_eq!(result.engines, vec!["google".to_string()]);
    let timing = result
        .timings
        .iter()
        .find(|t| t.engine == "bing")
        .expect("bing timing recorded");
    assert_eq!(timing.error.as_deref(), Some("upstream 503"));
}

#[tokio::test]
async fn all_engines_failing_is_success_with_diagnostics() {
    let a = StubEngine::failing(GOOGLE_STUB, "timeout");
    let b = StubEngine::failing(BING_STUB, "blocked: captcha");
    let meta = meta_search(vec![a, b]);

    let result = meta
        .run(&Query::new("nothing works"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.results.is_empty());
    assert_eq!(result.engines_failed, 2);
    assert!(!result.page_info.has_more);
}

#[tokio::test]
async fn per_page_bounds_the_slice() {
    let hits: Vec<(String, String)> = (0..40)
        .map(|i| (format!("https://example.org/{}", i), format!("Hit {}", i)))
        .collect();
    let hits_ref: Vec<(&str, &str)> = hits
        .iter()
        .map(|(u, t)| (u.as_str(), t.as_str()))
        .collect();
    let (google, _) = StubEngine::new(GOOGLE_STUB, hits_ref);
    let meta = meta_search(vec![google]);

    let result = meta
        .run(
            &Query::new("many").with_page(1, 10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(result.results.len(), 10);
    assert!(result.page_info.has_more);
    assert_eq!(result.total_results, 100);

    // A page beyond the pool is empty with has_more = false.
    let far = meta
        .run(
            &Query::new("many").with_page(9, 10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(far.results.is_empty());
    assert!(!far.page_info.has_more);
}

#[tokio::test]
async fn cancellation_yields_no_response() {
    let (google, _) = StubEngine::new(GOOGLE_STUB, vec![("https://ok.example/", "Fine")]);
    let meta = meta_search(vec![google]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(meta.run(&Query::new("cancelled"), &cancel).await.is_err());
}

#[tokio::test]
async fn category_selection_excludes_mismatched_engines() {
    // A videos-only engine never runs for a general query.
    const VIDEOS_ONLY: EngineDescriptor = EngineDescriptor {
        name: "clips",
        shortcut: "cl",
        categories: &[Category::Videos],
        supports_paging: true,
        max_page: 5,
        timeout_ms: 1000,
        weight: 1.0,
        enabled: true,
    };
    let (clips, calls) = StubEngine::new(VIDEOS_ONLY, vec![("https://v.example/1", "Clip")]);
    let (google, _) = StubEngine::new(GOOGLE_STUB, vec![("https://ok.example/", "Fine")]);
    let meta = meta_search(vec![clips, google]);

    let result = meta
        .run(&Query::new("general"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(result.engines, vec!["google".to_string()]);
}
