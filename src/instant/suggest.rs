use std::collections::BTreeMap;
use std::sync::RwLock;

/// Default cap on returned suggestions.
pub const DEFAULT_LIMIT: usize = 8;

/// Prefix suggestions over recorded queries. The ordered map doubles as the
/// prefix tree: a range scan from the prefix walks exactly its subtree.
#[derive(Debug, Default)]
pub struct SuggestService {
    recorded: RwLock<BTreeMap<String, u64>>,
}

impl SuggestService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one served query (fire-and-forget from the search path).
    pub fn record(&self, query: &str) {
        let normalized = normalize(query);
        if normalized.is_empty() || normalized.len() > 200 {
            return;
        }
        let mut recorded = self.recorded.write().unwrap();
        *recorded.entry(normalized).or_insert(0) += 1;
    }

    /// Prefix matches ranked by recorded frequency, excluding the query
    /// itself, capped at `limit`.
    pub fn suggest(&self, prefix: &str, limit: usize) -> Vec<String> {
        let needle = normalize(prefix);
        if needle.is_empty() {
            return Vec::new();
        }

        let recorded = self.recorded.read().unwrap();
        let mut matches: Vec<(&String, &u64)> = recorded
            .range(needle.clone()..)
            .take_while(|(k, _)| k.starts_with(&needle))
            .filter(|(k, _)| **k != needle)
            .collect();
        matches.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        matches
            .into_iter()
            .take(limit)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.recorded.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_by_frequency_then_alpha() {
        let s = SuggestService::new();
        for _ in 0..3 {
            s.record("rust async");
        }
        s.record("rust atomics");
        s.record("rust atomics");
        s.record("rust allocator");
        s.record("python asyncio");

        assert_eq!(
            s.suggest("rust", DEFAULT_LIMIT),
            vec!["rust async", "rust atomics", "rust allocator"]
        );
    }

    #[test]
    fn excludes_the_query_itself() {
        let s = SuggestService::new();
        s.record("rust");
        s.record("rust async");
        assert_eq!(s.suggest("rust", DEFAULT_LIMIT), vec!["rust async"]);
    }

    #[test]
    fn cap_is_respected() {
        let s = SuggestService::new();
        for i in 0..20 {
            s.record(&format!("query {}", i));
        }
        assert_eq!(s.suggest("query", 5).len(), 5);
    }

    #[test]
    fn empty_prefix_yields_nothing() {
        let s = SuggestService::new();
        s.record("anything");
        assert!(s.suggest("  ", DEFAULT_LIMIT).is_empty());
    }
}
