pub mod dns;
pub mod fetch;
pub mod store;
pub mod writer;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::config::RecrawlerConfig;
use dns::DomainTable;
use fetch::TransportPool;
use store::{ResultStore, SeedStore, StateStore, StoreError};
use writer::{BatchWriter, WriterMsg, WriterStats};

#[derive(Debug, thiserror::Error)]
pub enum RecrawlError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("transport init: {0}")]
    Transport(String),
}

/// How much of each URL the fetch stage reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Issue the request, close the body immediately.
    #[default]
    StatusOnly,
    HeadOnly,
    /// Read the body and extract title, description, and language.
    Full,
}

/// One refetch target from the seed store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUrl {
    pub url: String,
    pub domain: String,
}

impl SeedUrl {
    pub fn parse(raw: &str) -> Option<Self> {
        let parsed = url::Url::parse(raw.trim()).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }
        let domain = parsed.host_str()?.to_ascii_lowercase();
        Some(Self {
            url: raw.trim().to_string(),
            domain,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    pub fetch_time_ms: u64,
    pub crawled_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CrawlResult {
    pub fn ok(url: String, status_code: u16) -> Self {
        Self {
            url,
            status_code,
            content_type: None,
            content_length: None,
            title: None,
            description: None,
            language: None,
            redirect_url: None,
            fetch_time_ms: 0,
            crawled_at: chrono::Utc::now().to_rfc3339(),
            error: None,
        }
    }

    pub fn failed(url: String, error: String) -> Self {
        Self {
            url,
            status_code: 0,
            content_type: None,
            content_length: None,
            title: None,
            description: None,
            language: None,
            redirect_url: None,
            fetch_time_ms: 0,
            crawled_at: chrono::Utc::now().to_rfc3339(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlState {
    pub url: String,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_crawled_at: Option<String>,
    #[serde(default)]
    pub domain_dead: bool,
}

impl CrawlState {
    pub fn fresh(url: &str) -> Self {
        Self {
            url: url.to_string(),
            attempts: 0,
            last_status: None,
            last_crawled_at: None,
            domain_dead: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecrawlOptions {
    pub mode: FetchMode,
    /// Skip URLs the state store has already seen.
    pub resume: bool,
    /// Probe one URL per domain first to filter dead domains.
    pub two_pass: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RecrawlReport {
    pub total_seeds: usize,
    pub skipped_resumed: usize,
    pub skipped_dead: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub dead_domains: usize,
    pub results_written: usize,
    pub states_written: usize,
}

/// Three-stage pipeline over a seed URL set: DNS prefetch → fetch pool →
/// batch writer. Channels are bounded at roughly twice the consumer's
/// worker count; producers block when full.
pub struct Recrawler {
    dns_workers: usize,
    fetch_workers: usize,
    request_timeout: std::time::Duration,
    domains: Arc<DomainTable>,
    transport: Arc<TransportPool>,
    result_store: ResultStore,
    state_store: StateStore,
    batch_size: usize,
}

impl Recrawler {
    pub fn new(cfg: &RecrawlerConfig, data_dir: &Path) -> Result<Self, RecrawlError> {
        let request_timeout = cfg.resolve_timeout();
        let transport = TransportPool::new(
            cfg.resolve_transport_shards(),
            cfg.resolve_max_conns_per_domain(),
            request_timeout,
        )
        .map_err(|e| RecrawlError::Transport(e.to_string()))?;

        Ok(Self {
            dns_workers: cfg.resolve_dns_workers(),
            fetch_workers: cfg.resolve_workers(),
            request_timeout,
            domains: Arc::new(DomainTable::new(cfg.resolve_domain_fail_threshold())),
            transport: Arc::new(transport),
            result_store: ResultStore::new(data_dir.join("crawl-results.jsonl")),
            state_store: StateStore::new(data_dir.join("crawl-state.jsonl")),
            batch_size: cfg.resolve_batch_size(),
        })
    }

    pub fn load_seeds(&self, path: &Path) -> Result<Vec<SeedUrl>, RecrawlError> {
        Ok(SeedStore::load(path)?)
    }

    pub async fn run(
        &self,
        seeds: Vec<SeedUrl>,
        options: RecrawlOptions,
        cancel: &CancellationToken,
    ) -> Result<RecrawlReport, RecrawlError> {
        let mut report = RecrawlReport {
            total_seeds: seeds.len(),
            ..Default::default()
        };

        let processed: HashSet<String> = if options.resume {
            self.state_store.load_processed()?
        } else {
            HashSet::new()
        };
        let prior_attempts: HashMap<String, u32> = if options.resume {
            self.state_store
                .load_states()?
                .into_iter()
                .map(|(url, state)| (url, state.attempts))
                .collect()
        } else {
            HashMap::new()
        };

        if options.two_pass {
            self.probe_pass(&seeds, cancel).await;
            report.dead_domains = self.domains.dead_count();
            info!(
                "probe pass finished: {} dead domains filtered",
                report.dead_domains
            );
        }

        let (url_tx, url_rx) = mpsc::channel::<SeedUrl>(self.dns_workers.max(1) * 2);
        let (fetch_tx, fetch_rx) = mpsc::channel::<SeedUrl>(self.fetch_workers.max(1) * 2);
        let (writer_tx, writer_rx) = mpsc::channel::<WriterMsg>(self.fetch_workers.max(1) * 2);

        // Stage 3: single batch writer.
        let writer = BatchWriter::new(
            self.result_store.clone(),
            self.state_store.clone(),
            self.batch_size,
        );
        let writer_cancel = cancel.clone();
        let writer_task =
            tokio::spawn(async move { writer.run(writer_rx, &writer_cancel).await });

        // Seed feeder.
        let feeder_cancel = cancel.clone();
        let feeder = tokio::spawn(async move {
            let mut skipped_resumed = 0usize;
            for seed in seeds {
                if processed.contains(&seed.url) {
                    skipped_resumed += 1;
                    continue;
                }
                tokio::select! {
                    _ = feeder_cancel.cancelled() => break,
                    sent = url_tx.send(seed) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            skipped_resumed
        });

        // Stage 1: DNS prefetch pool. Skips dead domains, resolves unknown
        // ones, forwards live URLs.
        let dns_stage = {
            let domains = Arc::clone(&self.domains);
            let timeout = self.request_timeout;
            let cancel = cancel.clone();
            let writer_tx = writer_tx.clone();
            let skipped = Arc::new(std::sync::atomic::AtomicUsize::new(0));
            let skipped_out = Arc::clone(&skipped);
            let stream = receiver_stream(url_rx);
            async move {
                stream
                    .for_each_concurrent(self.dns_workers.max(1), |seed| {
                        let domains = Arc::clone(&domains);
                        let cancel = cancel.clone();
                        let fetch_tx = fetch_tx.clone();
                        let writer_tx = writer_tx.clone();
                        let skipped = Arc::clone(&skipped);
                        async move {
                            if cancel.is_cancelled() {
                                return;
                            }
                            if domains.needs_resolution(&seed.domain) {
                                dns::resolve_domain(&domains, &seed.domain, timeout).await;
                            }
                            if domains.is_dead(&seed.domain) {
                                skipped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                                let mut state = CrawlState::fresh(&seed.url);
                                state.domain_dead = true;
                                let _ = writer_tx.send(WriterMsg::State(state)).await;
                                return;
                            }
                            tokio::select! {
                                _ = cancel.cancelled() => {}
                                _ = fetch_tx.send(seed) => {}
                            }
                        }
                    })
                    .await;
                skipped_out.load(std::sync::atomic::Ordering::Relaxed)
            }
        };

        // Stage 2: fetch pool.
        let fetch_stage = {
            let domains = Arc::clone(&self.domains);
            let transport = Arc::clone(&self.transport);
            let cancel = cancel.clone();
            let writer_tx = writer_tx.clone();
            let prior_attempts = Arc::new(prior_attempts);
            let stream = receiver_stream(fetch_rx);
            let mode = options.mode;
            async move {
                let succeeded = Arc::new(std::sync::atomic::AtomicUsize::new(0));
                let failed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
                let skipped = Arc::new(std::sync::atomic::AtomicUsize::new(0));
                stream
                    .for_each_concurrent(self.fetch_workers.max(1), |seed| {
                        let domains = Arc::clone(&domains);
                        let transport = Arc::clone(&transport);
                        let cancel = cancel.clone();
                        let writer_tx = writer_tx.clone();
                        let prior_attempts = Arc::clone(&prior_attempts);
                        let succeeded = Arc::clone(&succeeded);
                        let failed = Arc::clone(&failed);
                        let skipped = Arc::clone(&skipped);
                        async move {
                            if cancel.is_cancelled() {
                                return;
                            }
                            // The domain may have died while this URL queued.
                            if domains.is_dead(&seed.domain) {
                                skipped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                                let mut state = CrawlState::fresh(&seed.url);
                                state.domain_dead = true;
                                let _ = writer_tx.send(WriterMsg::State(state)).await;
                                return;
                            }

                            let attempts =
                                prior_attempts.get(&seed.url).copied().unwrap_or(0) + 1;
                            let fetched = tokio::select! {
                                _ = cancel.cancelled() => return,
                                fetched = fetch::fetch_url(&transport, &seed.url, &seed.domain, mode) => fetched,
                            };

                            let (result, state) = match fetched {
                                Ok(result) => {
                                    succeeded
                                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                                    let state = CrawlState {
                                        url: seed.url.clone(),
                                        attempts,
                                        last_status: Some(result.status_code),
                                        last_crawled_at: Some(result.crawled_at.clone()),
                                        domain_dead: false,
                                    };
                                    (result, state)
                                }
                                Err(error) => {
                                    failed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                                    let crossed = domains.record_failure(&seed.domain);
                                    if crossed {
                                        warn!(
                                            "domain {} marked dead after repeated failures",
                                            seed.domain
                                        );
                                    }
                                    let state = CrawlState {
                                        url: seed.url.clone(),
                                        attempts,
                                        last_status: None,
                                        last_crawled_at: Some(chrono::Utc::now().to_rfc3339()),
                                        domain_dead: domains.is_dead(&seed.domain),
                                    };
                                    (CrawlResult::failed(seed.url.clone(), error), state)
                                }
                            };

                            let _ = writer_tx.send(WriterMsg::Result(result)).await;
                            let _ = writer_tx.send(WriterMsg::State(state)).await;
                        }
                    })
                    .await;
                (
                    succeeded.load(std::sync::atomic::Ordering::Relaxed),
                    failed.load(std::sync::atomic::Ordering::Relaxed),
                    skipped.load(std::sync::atomic::Ordering::Relaxed),
                )
            }
        };

        // The pipeline's own writer_tx clone must drop so the writer sees
        // the channel close once both stages finish.
        drop(writer_tx);

        let (dns_skipped, (succeeded, failed, fetch_skipped)) =
            tokio::join!(dns_stage, fetch_stage);
        let skipped_resumed = feeder.await.unwrap_or(0);
        let stats: WriterStats = match writer_task.await {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => return Err(e.into()),
            Err(e) => {
                warn!("writer task join error: {}", e);
                WriterStats::default()
            }
        };

        report.skipped_resumed = skipped_resumed;
        report.skipped_dead = dns_skipped + fetch_skipped;
        report.succeeded = succeeded;
        report.failed = failed;
        report.dead_domains = self.domains.dead_count();
        report.results_written = stats.results_written;
        report.states_written = stats.states_written;

        info!(
            "recrawl finished: {} seeds, {} fetched, {} failed, {} skipped (dead), {} skipped (resume), {} dead domains",
            report.total_seeds,
            report.succeeded,
            report.failed,
            report.skipped_dead,
            report.skipped_resumed,
            report.dead_domains
        );
        Ok(report)
    }

    /// Two-pass mode, pass one: probe a single URL per domain with
    /// status-only fetches and kill domains that do not answer.
    async fn probe_pass(&self, seeds: &[SeedUrl], cancel: &CancellationToken) {
        let mut first_per_domain: HashMap<&str, &SeedUrl> = HashMap::new();
        for seed in seeds {
            first_per_domain.entry(seed.domain.as_str()).or_insert(seed);
        }

        futures::stream::iter(first_per_domain.into_values())
            .for_each_concurrent(self.fetch_workers.max(1), |seed| {
                let domains = Arc::clone(&self.domains);
                let transport = Arc::clone(&self.transport);
                let timeout = self.request_timeout;
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return;
                    }
                    dns::resolve_domain(&domains, &seed.domain, timeout).await;
                    if domains.is_dead(&seed.domain) {
                        return;
                    }
                    if fetch::fetch_url(&transport, &seed.url, &seed.domain, FetchMode::StatusOnly)
                        .await
                        .is_err()
                    {
                        domains.mark_dead(&seed.domain);
                    }
                }
            })
            .await;
    }

    pub fn result_store(&self) -> &ResultStore {
        &self.result_store
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state_store
    }
}

/// Adapt a tokio receiver into a futures stream for the worker pools.
fn receiver_stream<T>(rx: mpsc::Receiver<T>) -> impl futures::Stream<Item = T> {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}
