use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use super::{CrawlResult, CrawlState, SeedUrl};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("store decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Seed URL list: one absolute URL per line, `#` comments allowed.
pub struct SeedStore;

impl SeedStore {
    pub fn load(path: &Path) -> Result<Vec<SeedUrl>, StoreError> {
        let contents = std::fs::read_to_string(path)?;
        let mut seeds = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(seed) = SeedUrl::parse(line) {
                seeds.push(seed);
            } else {
                tracing::warn!("seed skipped, not an absolute http url: {}", line);
            }
        }
        Ok(seeds)
    }
}

/// Append-mostly JSONL table keyed by URL.
#[derive(Clone)]
pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append_batch(&self, batch: &[CrawlResult]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(batch.len() * 256);
        for result in batch {
            serde_json::to_writer(&mut buf, result)?;
            buf.push(b'\n');
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }

    pub fn load(&self) -> Result<Vec<CrawlResult>, StoreError> {
        load_jsonl(&self.path)
    }
}

/// Crawl-state deltas, last write per URL wins on load.
#[derive(Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append_batch(&self, batch: &[CrawlState]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(batch.len() * 128);
        for state in batch {
            serde_json::to_writer(&mut buf, state)?;
            buf.push(b'\n');
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }

    /// Collapsed view: the newest delta per URL.
    pub fn load_states(&self) -> Result<HashMap<String, CrawlState>, StoreError> {
        let mut states = HashMap::new();
        for state in load_jsonl::<CrawlState>(&self.path)? {
            states.insert(state.url.clone(), state);
        }
        Ok(states)
    }

    /// URLs already visited, for resume.
    pub fn load_processed(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.load_states()?.into_keys().collect())
    }
}

fn load_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // A torn trailing line from a crash is skipped, not fatal.
        match serde_json::from_str(line) {
            Ok(value) => out.push(value),
            Err(e) => tracing::warn!("skipping corrupt store line: {}", e),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_store_parses_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seeds.txt");
        std::fs::write(
            &path,
            "# comment\nhttps://example.org/a\nnot-a-url\nhttps://example.com/b\n\n",
        )
        .unwrap();
        let seeds = SeedStore::load(&path).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].domain, "example.org");
    }

    #[tokio::test]
    async fn result_store_appends_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("results.jsonl"));
        let batch: Vec<CrawlResult> = (0..3)
            .map(|i| CrawlResult::ok(format!("https://example.org/{}", i), 200))
            .collect();
        store.append_batch(&batch).await.unwrap();
        store.append_batch(&batch[..1]).await.unwrap();
        assert_eq!(store.load().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn state_store_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.jsonl"));
        let mut s = CrawlState::fresh("https://example.org/a");
        s.attempts = 1;
        store.append_batch(&[s.clone()]).await.unwrap();
        s.attempts = 3;
        store.append_batch(&[s]).await.unwrap();

        let states = store.load_states().unwrap();
        assert_eq!(states["https://example.org/a"].attempts, 3);
        assert_eq!(store.load_processed().unwrap().len(), 1);
    }
}
