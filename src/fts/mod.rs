pub mod bm25;
pub mod segment;
pub mod tokenizer;

use std::path::Path;
use std::sync::Arc;

pub use bm25::Bm25Driver;
pub use tokenizer::Tokenizer;

#[derive(Debug, thiserror::Error)]
pub enum FtsError {
    #[error("index i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt segment {path}: {reason}")]
    Corrupt { path: String, reason: String },
    #[error("unknown fts driver: {0}")]
    UnknownDriver(String),
    #[error("index closed")]
    Closed,
}

/// A document handed to the indexer. `id` is stable and unique per index;
/// documents are append-then-index and immutable between refreshes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IndexDocument {
    pub id: String,
    pub url: String,
    pub text: String,
    #[serde(default)]
    pub dump: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub language_score: f64,
}

/// One scored document coming back from a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct DocMatch {
    pub id: String,
    pub url: String,
    pub score: f32,
}

/// Driver output: documents ordered by score descending.
#[derive(Debug, Clone, Default)]
pub struct FtsResults {
    pub documents: Vec<DocMatch>,
    pub duration_ms: u64,
    /// Driver name that produced the result.
    pub method: String,
    pub total: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// Any query term may match (default).
    #[default]
    Disjunctive,
    /// Every query term must appear in the document.
    Conjunctive,
}

/// Pluggable local full-text index driver.
pub trait IndexDriver: Send + Sync {
    fn name(&self) -> &str;

    fn search(&self, query: &str, limit: usize, offset: usize) -> Result<FtsResults, FtsError>;

    fn close(&self) -> Result<(), FtsError>;
}

/// Optional capability: drivers that can ingest documents.
pub trait Indexer {
    /// Import a batch; `progress(done, total)` is invoked as documents are
    /// folded into the new segment.
    fn import(
        &self,
        docs: Vec<IndexDocument>,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<(), FtsError>;
}

/// Optional capability: drivers that can report their document count.
pub trait Stats {
    fn count(&self) -> Result<u64, FtsError>;
}

/// Open the configured driver. `"bm25"` is the only compiled-in id.
pub fn open_driver(
    driver_id: &str,
    data_dir: &Path,
    language: &str,
) -> Result<Arc<Bm25Driver>, FtsError> {
    match driver_id {
        "bm25" => Ok(Arc::new(Bm25Driver::open(data_dir, language)?)),
        other => Err(FtsError::UnknownDriver(other.to_string())),
    }
}
