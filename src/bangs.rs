use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::core::error::ApiError;
use crate::core::types::{BangRef, Category, TimeRange};

/// One registered bang: either an external redirect template (must contain
/// `{query}`) or an internal category switch.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BangEntry {
    /// Unique, lowercase.
    pub trigger: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_category: Option<Category>,
    pub is_external: bool,
}

impl BangEntry {
    pub fn external(trigger: &str, name: &str, url_template: &str) -> Self {
        Self {
            trigger: trigger.to_string(),
            name: name.to_string(),
            url_template: Some(url_template.to_string()),
            internal_category: None,
            is_external: true,
        }
    }

    pub fn internal(trigger: &str, name: &str, category: Category) -> Self {
        Self {
            trigger: trigger.to_string(),
            name: name.to_string(),
            url_template: None,
            internal_category: Some(category),
            is_external: false,
        }
    }
}

/// What the resolver decided for one query text.
#[derive(Debug, Clone, PartialEq)]
pub enum BangOutcome {
    /// No bang token present; the query passes through bit-identical.
    None,
    /// External bang: emit a redirect and stop.
    Redirect { url: String, bang: BangRef },
    /// Internal bang: category switch with the remaining text.
    Category {
        query: String,
        category: Category,
        bang: BangRef,
    },
    /// Time-filter bang: sets the time range instead.
    TimeFilter { query: String, range: TimeRange },
    /// `!lucky`: run the search with one result and redirect to it.
    Lucky { query: String },
}

fn builtin_bangs() -> Vec<BangEntry> {
    vec![
        BangEntry::external(
            "yt",
            "YouTube",
            "https://www.youtube.com/results?search_query={query}",
        ),
        BangEntry::external("g", "Google", "https://www.google.com/search?q={query}"),
        BangEntry::external(
            "w",
            "Wikipedia",
            "https://en.wikipedia.org/wiki/Special:Search?search={query}",
        ),
        BangEntry::external("gh", "GitHub", "https://github.com/search?q={query}"),
        BangEntry::external(
            "so",
            "Stack Overflow",
            "https://stackoverflow.com/search?q={query}",
        ),
        BangEntry::external("ddg", "DuckDuckGo", "https://duckduckgo.com/?q={query}"),
        BangEntry::external("a", "Amazon", "https://www.amazon.com/s?k={query}"),
        BangEntry::external("imdb", "IMDb", "https://www.imdb.com/find?q={query}"),
        BangEntry::external(
            "maps",
            "OpenStreetMap",
            "https://www.openstreetmap.org/search?query={query}",
        ),
        BangEntry::internal("i", "Images", Category::Images),
        BangEntry::internal("img", "Images", Category::Images),
        BangEntry::internal("v", "Videos", Category::Videos),
        BangEntry::internal("n", "News", Category::News),
        BangEntry::internal("m", "Maps", Category::Maps),
    ]
}

/// Built-in table loaded at init plus user additions at runtime.
pub struct BangRegistry {
    entries: RwLock<HashMap<String, BangEntry>>,
}

impl Default for BangRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BangRegistry {
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        for bang in builtin_bangs() {
            entries.insert(bang.trigger.clone(), bang);
        }
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn list(&self) -> Vec<BangEntry> {
        let mut all: Vec<BangEntry> = self.entries.read().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.trigger.cmp(&b.trigger));
        all
    }

    pub fn get(&self, trigger: &str) -> Option<BangEntry> {
        self.entries
            .read()
            .unwrap()
            .get(&trigger.to_lowercase())
            .cloned()
    }

    pub fn add(&self, entry: BangEntry) -> Result<(), ApiError> {
        let trigger = entry.trigger.to_lowercase();
        if trigger.is_empty() || !trigger.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ApiError::Validation(
                "bang trigger must be non-empty and alphanumeric".into(),
            ));
        }
        if entry.is_external {
            match &entry.url_template {
                Some(template) if template.contains("{query}") => {}
                _ => {
                    return Err(ApiError::Validation(
                        "external bang template must contain {query}".into(),
                    ));
                }
            }
        } else if entry.internal_category.is_none() {
            return Err(ApiError::Validation(
                "internal bang requires a category".into(),
            ));
        }
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            trigger.clone(),
            BangEntry {
                trigger,
                ..entry
            },
        );
        Ok(())
    }

    pub fn remove(&self, trigger: &str) -> Result<(), ApiError> {
        let mut entries = self.entries.write().unwrap();
        entries
            .remove(&trigger.to_lowercase())
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("bang '{}'", trigger)))
    }

    /// Recognize a leading or trailing `!trigger` token and rewrite the
    /// query accordingly. Lookup is case-insensitive; an unknown trigger
    /// leaves the query untouched.
    pub fn resolve(&self, text: &str) -> BangOutcome {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return BangOutcome::None;
        }

        let bang_at = |token: &str| -> Option<String> {
            let stripped = token.strip_prefix('!')?;
            (!stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_alphanumeric()))
                .then(|| stripped.to_lowercase())
        };

        // Leading token wins over a trailing one.
        let (idx, trigger) = if let Some(t) = bang_at(tokens[0]) {
            (0, t)
        } else if tokens.len() > 1 {
            match bang_at(tokens[tokens.len() - 1]) {
                Some(t) => (tokens.len() - 1, t),
                None => return BangOutcome::None,
            }
        } else {
            return BangOutcome::None;
        };

        let remaining = tokens
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, t)| *t)
            .collect::<Vec<_>>()
            .join(" ");

        // Time-filter triggers set the range instead of redirecting.
        if let Some(range) = TimeRange::parse(&trigger).filter(|r| *r != TimeRange::Any) {
            return BangOutcome::TimeFilter {
                query: remaining,
                range,
            };
        }
        if trigger == "lucky" {
            return BangOutcome::Lucky { query: remaining };
        }

        let Some(entry) = self.get(&trigger) else {
            return BangOutcome::None;
        };

        let bang = BangRef {
            trigger: entry.trigger.clone(),
            name: entry.name.clone(),
        };

        if entry.is_external {
            let template = entry.url_template.as_deref().unwrap_or_default();
            let encoded = utf8_percent_encode(&remaining, NON_ALPHANUMERIC).to_string();
            return BangOutcome::Redirect {
                url: template.replace("{query}", &encoded),
                bang,
            };
        }

        BangOutcome::Category {
            query: remaining,
            category: entry.internal_category.unwrap_or(Category::General),
            bang,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_bang_redirects_with_encoded_query() {
        let reg = BangRegistry::new();
        match reg.resolve("!yt funny cats") {
            BangOutcome::Redirect { url, bang } => {
                assert_eq!(
                    url,
                    "https://www.youtube.com/results?search_query=funny%20cats"
                );
                assert_eq!(bang.trigger, "yt");
            }
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[test]
    fn trailing_bang_is_recognized() {
        let reg = BangRegistry::new();
        match reg.resolve("funny cats !yt") {
            BangOutcome::Redirect { url, .. } => {
                assert!(url.ends_with("funny%20cats"));
            }
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let reg = BangRegistry::new();
        assert!(matches!(
            reg.resolve("!YT cats"),
            BangOutcome::Redirect { .. }
        ));
    }

    #[test]
    fn internal_bang_switches_category() {
        let reg = BangRegistry::new();
        match reg.resolve("!v rust tutorial") {
            BangOutcome::Category {
                query, category, ..
            } => {
                assert_eq!(query, "rust tutorial");
                assert_eq!(category, Category::Videos);
            }
            other => panic!("expected category switch, got {:?}", other),
        }
    }

    #[test]
    fn time_triggers_set_range() {
        let reg = BangRegistry::new();
        match reg.resolve("!week rust release") {
            BangOutcome::TimeFilter { query, range } => {
                assert_eq!(query, "rust release");
                assert_eq!(range, TimeRange::Week);
            }
            other => panic!("expected time filter, got {:?}", other),
        }
    }

    #[test]
    fn no_bang_passes_through() {
        let reg = BangRegistry::new();
        assert_eq!(reg.resolve("plain query"), BangOutcome::None);
        // An unknown trigger is left untouched too.
        assert_eq!(reg.resolve("!zzzzzz query"), BangOutcome::None);
    }

    #[test]
    fn user_bangs_validate_template() {
        let reg = BangRegistry::new();
        assert!(reg
            .add(BangEntry::external("cr", "crates.io", "https://crates.io/search?q={query}"))
            .is_ok());
        assert!(reg
            .add(BangEntry::external("bad", "Broken", "https://example.org/"))
            .is_err());
        assert!(matches!(
            reg.resolve("!cr serde"),
            BangOutcome::Redirect { .. }
        ));
        assert!(reg.remove("cr").is_ok());
        assert!(reg.remove("cr").is_err());
    }
}
