use backoff::backoff::Backoff;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::store::{ResultStore, StateStore, StoreError};
use super::{CrawlResult, CrawlState};

/// Flush attempts before a store failure becomes fatal.
const MAX_FLUSH_RETRIES: u32 = 5;

pub enum WriterMsg {
    Result(CrawlResult),
    State(CrawlState),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WriterStats {
    pub results_written: usize,
    pub states_written: usize,
}

/// Single-writer batch sink: accumulates crawl results and state deltas and
/// flushes them in `batch_size` chunks, retrying with exponential backoff.
pub struct BatchWriter {
    results: ResultStore,
    states: StateStore,
    batch_size: usize,
}

impl BatchWriter {
    pub fn new(results: ResultStore, states: StateStore, batch_size: usize) -> Self {
        Self {
            results,
            states,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<WriterMsg>,
        cancel: &CancellationToken,
    ) -> Result<WriterStats, StoreError> {
        let mut stats = WriterStats::default();
        let mut result_buf: Vec<CrawlResult> = Vec::with_capacity(self.batch_size);
        let mut state_buf: Vec<CrawlState> = Vec::with_capacity(self.batch_size);

        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => {
                    // Cancellation discards buffered, unflushed work.
                    debug!(
                        "writer cancelled with {} results and {} states buffered",
                        result_buf.len(),
                        state_buf.len()
                    );
                    return Ok(stats);
                }
                msg = rx.recv() => msg,
            };

            match msg {
                Some(WriterMsg::Result(result)) => {
                    result_buf.push(result);
                    if result_buf.len() >= self.batch_size {
                        stats.results_written += result_buf.len();
                        flush_with_retry(&self.results, &mut result_buf).await?;
                    }
                }
                Some(WriterMsg::State(state)) => {
                    state_buf.push(state);
                    if state_buf.len() >= self.batch_size {
                        stats.states_written += state_buf.len();
                        flush_with_retry(&self.states, &mut state_buf).await?;
                    }
                }
                None => break,
            }
        }

        stats.results_written += result_buf.len();
        flush_with_retry(&self.results, &mut result_buf).await?;
        stats.states_written += state_buf.len();
        flush_with_retry(&self.states, &mut state_buf).await?;
        Ok(stats)
    }
}

trait BatchSink<T> {
    async fn append_batch(&self, batch: &[T]) -> Result<(), StoreError>;
}

impl BatchSink<CrawlResult> for ResultStore {
    async fn append_batch(&self, batch: &[CrawlResult]) -> Result<(), StoreError> {
        ResultStore::append_batch(self, batch).await
    }
}

impl BatchSink<CrawlState> for StateStore {
    async fn append_batch(&self, batch: &[CrawlState]) -> Result<(), StoreError> {
        StateStore::append_batch(self, batch).await
    }
}

async fn flush_with_retry<T, S>(store: &S, buf: &mut Vec<T>) -> Result<(), StoreError>
where
    S: BatchSink<T>,
{
    if buf.is_empty() {
        return Ok(());
    }

    let mut policy = backoff::ExponentialBackoff {
        initial_interval: Duration::from_millis(100),
        max_interval: Duration::from_secs(5),
        max_elapsed_time: None,
        ..Default::default()
    };

    let mut attempt = 0u32;
    loop {
        match store.append_batch(buf.as_slice()).await {
            Ok(()) => {
                buf.clear();
                return Ok(());
            }
            Err(e) if attempt < MAX_FLUSH_RETRIES => {
                attempt += 1;
                let delay = policy
                    .next_backoff()
                    .unwrap_or(Duration::from_secs(1));
                warn!(
                    "store flush failed (attempt {}/{}): {}; retrying in {:?}",
                    attempt, MAX_FLUSH_RETRIES, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
