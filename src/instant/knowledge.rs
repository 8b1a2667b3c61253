use std::collections::HashMap;
use std::path::Path;

use crate::core::types::KnowledgePanel;

/// Entity records for the knowledge panel. Exact (case-insensitive) match
/// first, then a conservative fuzzy pass; a miss returns `None`.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    by_name: HashMap<String, KnowledgePanel>,
}

impl KnowledgeBase {
    pub fn load(path: &Path) -> Self {
        let entities = std::fs::read_to_string(path)
            .ok()
            .and_then(|contents| serde_json::from_str::<Vec<KnowledgePanel>>(&contents).ok())
            .unwrap_or_default();
        Self::from_entities(entities)
    }

    pub fn from_entities(entities: Vec<KnowledgePanel>) -> Self {
        Self {
            by_name: entities
                .into_iter()
                .map(|e| (e.name.to_lowercase(), e))
                .collect(),
        }
    }

    pub fn lookup(&self, query: &str) -> Option<KnowledgePanel> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        if let Some(entity) = self.by_name.get(&needle) {
            return Some(entity.clone());
        }

        // Fuzzy pass: small edit distance against short names only, so
        // unrelated long queries never drag a panel in.
        let max_edits = if needle.len() <= 4 { 1 } else { 2 };
        self.by_name
            .iter()
            .filter(|(name, _)| name.len().abs_diff(needle.len()) <= max_edits)
            .map(|(name, entity)| (levenshtein(name, &needle), entity))
            .filter(|(distance, _)| *distance <= max_edits)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, entity)| entity.clone())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> KnowledgeBase {
        KnowledgeBase::from_entities(vec![
            KnowledgePanel {
                name: "Ada Lovelace".into(),
                description: "English mathematician, first computer programmer.".into(),
                image_url: None,
                facts: vec![("Born".into(), "1815".into())],
            },
            KnowledgePanel {
                name: "Rust".into(),
                description: "Systems programming language.".into(),
                image_url: None,
                facts: Vec::new(),
            },
        ])
    }

    #[test]
    fn exact_match_ignores_case() {
        let kb = base();
        assert_eq!(kb.lookup("ada lovelace").unwrap().name, "Ada Lovelace");
    }

    #[test]
    fn fuzzy_match_tolerates_typos() {
        let kb = base();
        assert_eq!(kb.lookup("ada lovelase").unwrap().name, "Ada Lovelace");
    }

    #[test]
    fn miss_returns_none() {
        let kb = base();
        assert!(kb.lookup("unrelated query words").is_none());
        assert!(kb.lookup("").is_none());
    }

    #[test]
    fn edit_distance() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("rust", "rust"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
    }
}
