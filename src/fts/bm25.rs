use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Instant;

use super::segment::{DocEntry, SegmentReader, SegmentWriter};
use super::tokenizer::{term_hash, Tokenizer};
use super::{DocMatch, FtsError, FtsResults, IndexDocument, IndexDriver, Indexer, QueryMode, Stats};

pub const DRIVER_NAME: &str = "bm25";

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// BM25 over an ordered set of immutable segments. Each import writes one
/// new segment; merging is left to an offline size-tiered policy.
pub struct Bm25Driver {
    dir: PathBuf,
    tokenizer: Tokenizer,
    inner: RwLock<SegmentSet>,
}

struct SegmentSet {
    segments: Vec<SegmentReader>,
    /// Monotonic suffix for the next segment file name.
    next_seq: u64,
    closed: bool,
}

impl Bm25Driver {
    pub fn open(dir: &std::path::Path, language: &str) -> Result<Self, FtsError> {
        std::fs::create_dir_all(dir)?;

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "seg"))
            .collect();
        paths.sort();

        let mut segments = Vec::with_capacity(paths.len());
        for path in &paths {
            segments.push(SegmentReader::open(path)?);
        }
        let next_seq = paths.len() as u64;

        Ok(Self {
            dir: dir.to_path_buf(),
            tokenizer: Tokenizer::for_language(language),
            inner: RwLock::new(SegmentSet {
                segments,
                next_seq,
                closed: false,
            }),
        })
    }

    pub fn search_mode(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
        mode: QueryMode,
    ) -> Result<FtsResults, FtsError> {
        let start = Instant::now();
        let terms: Vec<u64> = {
            let mut hashes: Vec<u64> = self
                .tokenizer
                .tokenize(query)
                .iter()
                .map(|t| term_hash(t))
                .collect();
            hashes.sort_unstable();
            hashes.dedup();
            hashes
        };

        let inner = self
            .inner
            .read()
            .map_err(|_| FtsError::Corrupt {
                path: self.dir.display().to_string(),
                reason: "segment lock poisoned".into(),
            })?;
        if inner.closed {
            return Err(FtsError::Closed);
        }

        if terms.is_empty() || inner.segments.is_empty() {
            return Ok(FtsResults {
                documents: Vec::new(),
                duration_ms: start.elapsed().as_millis() as u64,
                method: DRIVER_NAME.to_string(),
                total: Some(0),
            });
        }

        // Corpus-wide statistics across all segments.
        let total_docs: u64 = inner.segments.iter().map(|s| s.doc_count() as u64).sum();
        let total_tokens: u64 = inner.segments.iter().map(|s| s.total_tokens()).sum();
        let avgdl = if total_docs == 0 {
            1.0
        } else {
            (total_tokens as f32 / total_docs as f32).max(1.0)
        };

        // Document frequency per term, summed across segments.
        let mut doc_freq: HashMap<u64, u64> = HashMap::new();
        for seg in &inner.segments {
            for &t in &terms {
                if let Some(p) = seg.lookup(t) {
                    *doc_freq.entry(t).or_insert(0) += u64::from(p.doc_freq);
                }
            }
        }

        // Accumulate scores keyed by (segment, doc).
        let mut scores: HashMap<(usize, u32), (f32, usize)> = HashMap::new();
        for (seg_idx, seg) in inner.segments.iter().enumerate() {
            for &t in &terms {
                let Some(postings) = seg.lookup(t) else {
                    continue;
                };
                let df = *doc_freq.get(&t).unwrap_or(&1) as f32;
                let n = total_docs as f32;
                let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();

                for (doc_id, tf) in postings.entries {
                    let dl = seg
                        .doc(doc_id)
                        .map(|d| d.token_len as f32)
                        .unwrap_or(avgdl);
                    let tf = tf as f32;
                    let score =
                        idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * dl / avgdl));
                    let entry = scores.entry((seg_idx, doc_id)).or_insert((0.0, 0));
                    entry.0 += score;
                    entry.1 += 1;
                }
            }
        }

        let required = terms.len();
        let mut ranked: Vec<((usize, u32), f32)> = scores
            .into_iter()
            .filter(|(_, (_, matched))| mode == QueryMode::Disjunctive || *matched == required)
            .map(|(key, (score, _))| (key, score))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let total = ranked.len();
        let documents = ranked
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|((seg_idx, doc_id), score)| {
                let doc: &DocEntry = inner.segments[seg_idx].doc(doc_id)?;
                Some(DocMatch {
                    id: doc.id.clone(),
                    url: doc.url.clone(),
                    score,
                })
            })
            .collect();

        Ok(FtsResults {
            documents,
            duration_ms: start.elapsed().as_millis() as u64,
            method: DRIVER_NAME.to_string(),
            total: Some(total),
        })
    }
}

impl IndexDriver for Bm25Driver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn search(&self, query: &str, limit: usize, offset: usize) -> Result<FtsResults, FtsError> {
        self.search_mode(query, limit, offset, QueryMode::Disjunctive)
    }

    fn close(&self) -> Result<(), FtsError> {
        let mut inner = self.inner.write().map_err(|_| FtsError::Closed)?;
        inner.segments.clear();
        inner.closed = true;
        Ok(())
    }
}

impl Indexer for Bm25Driver {
    fn import(
        &self,
        docs: Vec<IndexDocument>,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<(), FtsError> {
        let total = docs.len();
        let mut entries = Vec::with_capacity(total);
        let mut postings: BTreeMap<u64, Vec<(u32, u32)>> = BTreeMap::new();

        for (i, doc) in docs.into_iter().enumerate() {
            let tokens = self.tokenizer.tokenize(&doc.text);
            let doc_id = i as u32;

            let mut tf: HashMap<u64, u32> = HashMap::new();
            for token in &tokens {
                *tf.entry(term_hash(token)).or_insert(0) += 1;
            }
            for (hash, count) in tf {
                postings.entry(hash).or_default().push((doc_id, count));
            }

            entries.push(DocEntry {
                id: doc.id,
                url: doc.url,
                token_len: tokens.len() as u32,
            });
            progress(i + 1, total);
        }

        // Posting lists must be doc-id ordered; a doc id appears at most
        // once per list because term frequencies were pre-aggregated.
        for list in postings.values_mut() {
            list.sort_unstable_by_key(|(doc_id, _)| *doc_id);
        }

        let mut inner = self.inner.write().map_err(|_| FtsError::Closed)?;
        if inner.closed {
            return Err(FtsError::Closed);
        }
        let path = self.dir.join(format!("seg-{:08}.seg", inner.next_seq));
        SegmentWriter::write(&path, &entries, &postings)?;
        inner.segments.push(SegmentReader::open(&path)?);
        inner.next_seq += 1;
        Ok(())
    }
}

impl Stats for Bm25Driver {
    fn count(&self) -> Result<u64, FtsError> {
        let inner = self.inner.read().map_err(|_| FtsError::Closed)?;
        if inner.closed {
            return Err(FtsError::Closed);
        }
        Ok(inner.segments.iter().map(|s| s.doc_count() as u64).sum())
    }
}
