use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::merge::{self, EngineHits};
use crate::core::config::Config;
use crate::core::types::{EngineTiming, Hit, MergedResult, Query};
use crate::engines::{
    detect_block_reason, random_user_agent, Engine, EngineRegistry, HttpMethod, RequestConfig,
};

/// The request was cancelled before a response could be produced; not an
/// error, there is simply nothing to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Terminal state of one engine task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

struct EngineOutcome {
    name: String,
    weight: f64,
    state: TaskState,
    hits: Vec<Hit>,
    elapsed_ms: u64,
    error: Option<String>,
}

/// Concurrent fan-out across the selected engines, then merge + rank.
pub struct MetaSearch {
    registry: Arc<EngineRegistry>,
    client: reqwest::Client,
    request_budget: Duration,
    early_return: Duration,
    min_engines: usize,
}

impl MetaSearch {
    pub fn new(registry: Arc<EngineRegistry>, client: reqwest::Client, cfg: &Config) -> Self {
        Self {
            registry,
            client,
            request_budget: cfg.metasearch.resolve_request_budget(),
            early_return: cfg.metasearch.resolve_early_return(),
            min_engines: cfg.metasearch.resolve_min_engines(),
        }
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    /// Run one query. All-engines-failed is a success with zero hits; only
    /// cancellation of the request itself yields no response.
    pub async fn run(&self, query: &Query, cancel: &CancellationToken) -> Result<MergedResult, Cancelled> {
        let start = Instant::now();
        let selected = self.registry.select(query.category, query.page);
        let n = selected.len();
        debug!(
            query = %query.text,
            category = query.category.as_str(),
            engines = n,
            "meta-search fan-out"
        );

        let (tx, mut rx) = mpsc::channel::<EngineOutcome>(n.max(1));
        let child = cancel.child_token();
        let deadline = tokio::time::Instant::now() + self.request_budget;

        for engine in selected {
            let tx = tx.clone();
            let child = child.clone();
            let client = self.client.clone();
            let query = query.clone();
            let budget = self.request_budget;
            tokio::spawn(async move {
                let outcome = run_engine_task(engine, &query, &client, &child, budget).await;
                // Receiver gone means collection already ended; fine.
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        let mut outcomes: Vec<EngineOutcome> = Vec::with_capacity(n);
        let mut first_result_at: Option<tokio::time::Instant> = None;

        loop {
            if outcomes.len() == n {
                break;
            }
            // Early return once enough engines reported and the grace
            // window after the first result has elapsed.
            let effective_deadline = match first_result_at {
                Some(first) if outcomes.len() >= self.min_engines => {
                    deadline.min(first + self.early_return)
                }
                _ => deadline,
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    child.cancel();
                    return Err(Cancelled);
                }
                received = rx.recv() => {
                    match received {
                        Some(outcome) => {
                            if first_result_at.is_none() && outcome.state == TaskState::Succeeded {
                                first_result_at = Some(tokio::time::Instant::now());
                            }
                            outcomes.push(outcome);
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep_until(effective_deadline) => {
                    debug!("collection window closed with {}/{} engines", outcomes.len(), n);
                    break;
                }
            }
        }
        // Stragglers are cancelled; their in-flight requests abort on drop.
        child.cancel();

        let engines_failed = outcomes
            .iter()
            .filter(|o| matches!(o.state, TaskState::Failed | TaskState::TimedOut))
            .count() as u32;
        let timings: Vec<EngineTiming> = outcomes
            .iter()
            .map(|o| EngineTiming {
                engine: o.name.clone(),
                elapsed_ms: o.elapsed_ms,
                hits: o.hits.len(),
                error: o.error.clone(),
            })
            .collect();

        let batches: Vec<EngineHits> = outcomes
            .into_iter()
            .filter(|o| o.state == TaskState::Succeeded && !o.hits.is_empty())
            .map(|o| EngineHits {
                engine: o.name,
                weight: o.weight,
                hits: o.hits,
            })
            .collect();

        let mut merged = merge::merge_hits(batches);
        merge::apply_post_filters(&mut merged, query);
        let (results, page_info, total_results) = merge::paginate(merged, query);

        // Only engines that survive into the returned window are listed.
        let mut engines: Vec<String> = results
            .iter()
            .flat_map(|h| h.engines.iter().cloned())
            .collect();
        engines.sort();
        engines.dedup();

        Ok(MergedResult {
            query: query.text.clone(),
            category: query.category,
            results,
            total_results,
            engines,
            instant_answer: None,
            knowledge_panel: None,
            widgets: Vec::new(),
            related_searches: Vec::new(),
            page_info,
            elapsed_ms: start.elapsed().as_millis() as u64,
            engines_failed,
            timings,
        })
    }
}

async fn run_engine_task(
    engine: Arc<dyn Engine>,
    query: &Query,
    client: &reqwest::Client,
    cancel: &CancellationToken,
    remaining_budget: Duration,
) -> EngineOutcome {
    let descriptor = engine.descriptor();
    let name = descriptor.name.to_string();
    let weight = descriptor.weight;
    let started = Instant::now();

    let outcome = |state, hits, error: Option<String>| EngineOutcome {
        name: name.clone(),
        weight,
        state,
        hits,
        elapsed_ms: started.elapsed().as_millis() as u64,
        error,
    };

    // Local backends answer without the network.
    if let Some(result) = engine.search_local(query) {
        return match result.error {
            Some(e) => outcome(TaskState::Failed, Vec::new(), Some(e)),
            None => outcome(TaskState::Succeeded, result.hits, None),
        };
    }

    let request = match engine.build_request(query) {
        Ok(r) => r,
        Err(e) => {
            warn!("engine '{}' failed to build request: {}", name, e);
            return outcome(TaskState::Failed, Vec::new(), Some(e.to_string()));
        }
    };

    let timeout = Duration::from_millis(descriptor.timeout_ms).min(remaining_budget);
    let fetch = execute_request(client, request);

    let result = tokio::select! {
        _ = cancel.cancelled() => {
            return outcome(TaskState::Cancelled, Vec::new(), None);
        }
        result = tokio::time::timeout(timeout, fetch) => result,
    };

    match result {
        Err(_) => {
            warn!(
                "engine '{}' timed out after {}ms (tail latency pruned)",
                name,
                timeout.as_millis()
            );
            outcome(TaskState::TimedOut, Vec::new(), Some("timeout".to_string()))
        }
        Ok(Err(e)) => {
            warn!("engine '{}' failed: {}", name, e);
            outcome(TaskState::Failed, Vec::new(), Some(e.to_string()))
        }
        Ok(Ok((status, body))) => {
            if let Some(reason) = detect_block_reason(status, &body) {
                warn!("engine '{}' blocked: {}", name, reason);
                return outcome(
                    TaskState::Failed,
                    Vec::new(),
                    Some(format!("blocked: {}", reason)),
                );
            }
            // A malformed body parses to zero hits; that is a success.
            let parsed = engine.parse_response(body.as_bytes(), query);
            outcome(TaskState::Succeeded, parsed.hits, None)
        }
    }
}

async fn execute_request(
    client: &reqwest::Client,
    request: RequestConfig,
) -> Result<(reqwest::StatusCode, String), reqwest::Error> {
    let mut req = match request.method {
        HttpMethod::Get => client.get(request.url),
        HttpMethod::Post => client.post(request.url),
    };
    req = req.header("User-Agent", random_user_agent());
    for (k, v) in request.headers {
        req = req.header(k, v);
    }
    if !request.cookies.is_empty() {
        let cookie_header = request
            .cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        req = req.header("Cookie", cookie_header);
    }
    if let Some(body) = request.body {
        req = req.body(body);
    }

    let resp = req.send().await?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Ok((status, body))
}
