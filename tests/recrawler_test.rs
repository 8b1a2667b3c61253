use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use conflux::core::config::RecrawlerConfig;
use conflux::recrawler::{FetchMode, RecrawlOptions, Recrawler, SeedUrl};

/// Minimal HTTP server answering every request with a small HTML page.
async fn spawn_http_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let body = "<html><head><title>Seed Page</title>\
                    <meta name=\"description\" content=\"A crawl target.\">\
                    </head><body>hello</body></html>";
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });
    port
}

fn small_config() -> RecrawlerConfig {
    serde_json::from_str(
        r#"{
            "workers": 8,
            "dns_workers": 8,
            "timeout_ms": 2000,
            "batch_size": 10,
            "transport_shards": 4,
            "max_conns_per_domain": 4,
            "domain_fail_threshold": 3
        }"#,
    )
    .unwrap()
}

fn seeds_for(port: u16, alive: usize, dead: usize) -> Vec<SeedUrl> {
    let mut seeds = Vec::new();
    for i in 0..alive {
        seeds.push(SeedUrl::parse(&format!("http://127.0.0.1:{}/page/{}", port, i)).unwrap());
    }
    for i in 0..dead {
        seeds.push(SeedUrl::parse(&format!("http://always-down.invalid/page/{}", i)).unwrap());
    }
    seeds
}

#[tokio::test]
async fn dead_domain_is_skipped_after_threshold_and_counts_add_up() {
    let port = spawn_http_server().await;
    let dir = tempfile::tempdir().unwrap();
    let recrawler = Recrawler::new(&small_config(), dir.path()).unwrap();

    let total = 30usize;
    let seeds = seeds_for(port, 20, 10);
    let report = recrawler
        .run(
            seeds,
            RecrawlOptions {
                mode: FetchMode::Full,
                resume: false,
                two_pass: false,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.total_seeds, total);
    assert_eq!(report.succeeded, 20);
    assert_eq!(report.dead_domains, 1);
    assert!(report.skipped_dead > 0, "some dead-domain urls were skipped");
    // Every attempted URL produced exactly one crawl result.
    assert_eq!(report.results_written, total - report.skipped_dead);

    let results = recrawler.result_store().load().unwrap();
    assert_eq!(results.len(), report.results_written);
    let ok = results.iter().filter(|r| r.error.is_none()).count();
    assert_eq!(ok, 20);
    // Full mode extracted page metadata.
    assert!(results
        .iter()
        .filter(|r| r.error.is_none())
        .all(|r| r.title.as_deref() == Some("Seed Page")));

    // The state store knows the dead domain's URLs.
    let states = recrawler.state_store().load_states().unwrap();
    let dead_states: Vec<_> = states
        .values()
        .filter(|s| s.url.contains("always-down.invalid"))
        .collect();
    assert!(!dead_states.is_empty());
    assert!(dead_states.iter().any(|s| s.domain_dead));
}

#[tokio::test]
async fn resume_skips_already_processed_urls() {
    let port = spawn_http_server().await;
    let dir = tempfile::tempdir().unwrap();
    let recrawler = Recrawler::new(&small_config(), dir.path()).unwrap();

    let seeds = seeds_for(port, 10, 0);
    let first = recrawler
        .run(
            seeds.clone(),
            RecrawlOptions {
                mode: FetchMode::StatusOnly,
                resume: true,
                two_pass: false,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(first.succeeded, 10);
    assert_eq!(first.skipped_resumed, 0);

    let second = recrawler
        .run(
            seeds,
            RecrawlOptions {
                mode: FetchMode::StatusOnly,
                resume: true,
                two_pass: false,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(second.skipped_resumed, 10);
    assert_eq!(second.succeeded, 0);
}

#[tokio::test]
async fn two_pass_probe_filters_dead_domains_before_the_fetch() {
    let port = spawn_http_server().await;
    let dir = tempfile::tempdir().unwrap();
    let recrawler = Recrawler::new(&small_config(), dir.path()).unwrap();

    let seeds = seeds_for(port, 5, 8);
    let report = recrawler
        .run(
            seeds,
            RecrawlOptions {
                mode: FetchMode::StatusOnly,
                resume: false,
                two_pass: true,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded, 5);
    assert_eq!(report.dead_domains, 1);
    // The probe killed the domain up front: every one of its URLs was
    // skipped without a fetch attempt.
    assert_eq!(report.skipped_dead, 8);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn cancellation_stops_the_pipeline_early() {
    let port = spawn_http_server().await;
    let dir = tempfile::tempdir().unwrap();
    let recrawler = Recrawler::new(&small_config(), dir.path()).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = recrawler
        .run(
            seeds_for(port, 50, 0),
            RecrawlOptions::default(),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(report.succeeded + report.failed, 0);
}
