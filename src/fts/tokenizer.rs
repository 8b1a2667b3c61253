use xxhash_rust::xxh3::xxh3_64;

/// Stemmers are per-language; only English ships a rule set, other tags
/// tokenize without stemming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stemmer {
    English,
}

impl Stemmer {
    fn apply(&self, token: &str) -> String {
        match self {
            Stemmer::English => stem_english(token),
        }
    }
}

/// Light suffix stemmer: enough to collapse common inflections without a
/// full Porter implementation.
fn stem_english(token: &str) -> String {
    let t = token;
    for (suffix, min_stem) in [
        ("ingly", 3),
        ("edly", 3),
        ("ing", 3),
        ("ies", 3),
        ("ed", 3),
        ("es", 3),
        ("ly", 3),
        ("s", 3),
    ] {
        if let Some(stem) = t.strip_suffix(suffix) {
            if stem.len() >= min_stem {
                // "ies" → "y": stories → story
                if suffix == "ies" {
                    return format!("{}y", stem);
                }
                return stem.to_string();
            }
        }
    }
    t.to_string()
}

/// Fold common Latin accented letters to ASCII.
fn strip_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    strip_accents: bool,
    stemmer: Option<Stemmer>,
}

impl Tokenizer {
    pub fn new(strip_accents: bool, stemmer: Option<Stemmer>) -> Self {
        Self {
            strip_accents,
            stemmer,
        }
    }

    /// Tokenizer for a BCP-47 tag; unknown languages get the plain config.
    pub fn for_language(tag: &str) -> Self {
        let primary = tag.split(['-', '_']).next().unwrap_or("");
        let stemmer = match primary.to_ascii_lowercase().as_str() {
            "en" => Some(Stemmer::English),
            _ => None,
        };
        Self::new(true, stemmer)
    }

    /// Lowercase, split on whitespace and punctuation, optionally fold
    /// accents and stem. Empty tokens after filtering are dropped.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();

        for mut c in text.chars() {
            if self.strip_accents {
                c = strip_accent(c);
            }
            if c.is_alphanumeric() {
                current.extend(c.to_lowercase());
            } else if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }

        if let Some(stemmer) = self.stemmer {
            tokens = tokens.into_iter().map(|t| stemmer.apply(&t)).collect();
        }
        tokens.retain(|t| !t.is_empty());
        tokens
    }
}

/// 64-bit term hash used by the segment dictionary.
pub fn term_hash(term: &str) -> u64 {
    xxh3_64(term.as_bytes())
}
