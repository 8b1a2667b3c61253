use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DictEntry {
    pub word: String,
    pub definition: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

/// Word lookups against a stored table. A miss is the distinguished
/// `NotFound` value, never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(DictEntry),
    NotFound,
}

#[derive(Debug, Default)]
pub struct Dictionary {
    entries: HashMap<String, DictEntry>,
}

impl Dictionary {
    pub fn load(path: &Path) -> Self {
        let entries = std::fs::read_to_string(path)
            .ok()
            .and_then(|contents| serde_json::from_str::<Vec<DictEntry>>(&contents).ok())
            .unwrap_or_default();
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: Vec<DictEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.word.to_lowercase(), e))
                .collect(),
        }
    }

    pub fn lookup(&self, word: &str) -> Lookup {
        match self.entries.get(&word.trim().to_lowercase()) {
            Some(entry) => Lookup::Found(entry.clone()),
            None => Lookup::NotFound,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pull the target word out of "define X" / "definition of X" / "X meaning".
pub fn parse_define_query(text: &str) -> Option<String> {
    let lower = text.trim().to_lowercase();
    for prefix in ["define ", "definition of ", "meaning of "] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            let word = rest.trim();
            if !word.is_empty() && !word.contains(' ') {
                return Some(word.to_string());
            }
        }
    }
    if let Some(word) = lower.strip_suffix(" meaning").or_else(|| lower.strip_suffix(" definition")) {
        let word = word.trim();
        if !word.is_empty() && !word.contains(' ') {
            return Some(word.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> Dictionary {
        Dictionary::from_entries(vec![DictEntry {
            word: "Ephemeral".into(),
            definition: "lasting for a very short time".into(),
            synonyms: vec!["transient".into(), "fleeting".into()],
        }])
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let d = dict();
        match d.lookup("ephemeral") {
            Lookup::Found(entry) => assert_eq!(entry.synonyms.len(), 2),
            Lookup::NotFound => panic!("expected hit"),
        }
    }

    #[test]
    fn miss_is_the_sentinel() {
        assert_eq!(dict().lookup("zyzzyva"), Lookup::NotFound);
    }

    #[test]
    fn query_shapes() {
        assert_eq!(parse_define_query("define ephemeral"), Some("ephemeral".into()));
        assert_eq!(parse_define_query("ephemeral meaning"), Some("ephemeral".into()));
        assert_eq!(parse_define_query("definition of ephemeral"), Some("ephemeral".into()));
        assert_eq!(parse_define_query("define the whole thing"), None);
        assert_eq!(parse_define_query("rust tutorial"), None);
    }
}
