use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result categories a query can target. Engines advertise the categories
/// they can serve; selection intersects the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    General,
    Images,
    Videos,
    News,
    Maps,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Images => "images",
            Category::Videos => "videos",
            Category::News => "news",
            Category::Maps => "maps",
        }
    }

    pub fn parse(s: &str) -> Option<Category> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" | "web" => Some(Category::General),
            "images" => Some(Category::Images),
            "videos" => Some(Category::Videos),
            "news" => Some(Category::News),
            "maps" => Some(Category::Maps),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SafeSearch {
    Off,
    #[default]
    Moderate,
    Strict,
}

impl SafeSearch {
    pub fn parse(s: &str) -> Option<SafeSearch> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Some(SafeSearch::Off),
            "moderate" | "1" => Some(SafeSearch::Moderate),
            "strict" | "2" => Some(SafeSearch::Strict),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SafeSearch::Off => "off",
            SafeSearch::Moderate => "moderate",
            SafeSearch::Strict => "strict",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    #[default]
    Any,
    Day,
    Week,
    Month,
    Year,
}

impl TimeRange {
    pub fn parse(s: &str) -> Option<TimeRange> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "any" | "all" => Some(TimeRange::Any),
            "day" | "d" => Some(TimeRange::Day),
            "week" | "w" => Some(TimeRange::Week),
            "month" | "m" => Some(TimeRange::Month),
            "year" | "y" => Some(TimeRange::Year),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Any => "any",
            TimeRange::Day => "day",
            TimeRange::Week => "week",
            TimeRange::Month => "month",
            TimeRange::Year => "year",
        }
    }
}

/// Maximum accepted query length, in characters.
pub const MAX_QUERY_LEN: usize = 500;

/// Hard cap on `per_page`; larger requests are clamped, never rejected.
pub const MAX_PER_PAGE: u32 = 50;

/// A fully-specified search query. Immutable once constructed; every field
/// participates in the cache fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default)]
    pub category: Category,
    pub page: u32,
    pub per_page: u32,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub safe_search: SafeSearch,
    #[serde(default)]
    pub time_range: TimeRange,
    /// Category-specific filters (e.g. `duration=short`, `size=large`),
    /// keyed sorted so the fingerprint is order-independent.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default)]
    pub verbatim: bool,
    #[serde(default)]
    pub site_include: Option<String>,
    #[serde(default)]
    pub site_exclude: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: Category::General,
            page: 1,
            per_page: 10,
            locale: "en-US".to_string(),
            safe_search: SafeSearch::Moderate,
            time_range: TimeRange::Any,
            filters: BTreeMap::new(),
            verbatim: false,
            site_include: None,
            site_exclude: None,
            file_type: None,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page.max(1);
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// The effective query text sent upstream: site filters and file type
    /// are folded into operators the engines understand.
    pub fn upstream_text(&self) -> String {
        let mut text = if self.verbatim {
            format!("\"{}\"", self.text)
        } else {
            self.text.clone()
        };
        if let Some(site) = &self.site_include {
            text.push_str(&format!(" site:{}", site));
        }
        if let Some(site) = &self.site_exclude {
            text.push_str(&format!(" -site:{}", site));
        }
        if let Some(ft) = &self.file_type {
            text.push_str(&format!(" filetype:{}", ft));
        }
        text
    }
}

/// Optional media attributes carried by image/video hits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Canonical `"HH:MM:SS"` form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Same duration as an integer, for sorting and bucket filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl MediaInfo {
    pub fn is_empty(&self) -> bool {
        self.thumbnail_url.is_none()
            && self.duration.is_none()
            && self.embed_url.is_none()
            && self.views.is_none()
            && self.channel.is_none()
            && self.published_at.is_none()
            && self.width.is_none()
            && self.height.is_none()
    }

    /// Field-wise merge: existing fields win, the other hit fills gaps.
    pub fn merge_from(&mut self, other: &MediaInfo) {
        macro_rules! fill {
            ($f:ident) => {
                if self.$f.is_none() {
                    self.$f = other.$f.clone();
                }
            };
        }
        fill!(thumbnail_url);
        fill!(duration);
        fill!(duration_seconds);
        fill!(embed_url);
        fill!(views);
        fill!(channel);
        fill!(published_at);
        fill!(width);
        fill!(height);
    }
}

/// A single search result record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Primary engine label for this result (single source).
    pub engine: String,
    /// All corroborating engine labels (multi-source, sorted).
    #[serde(default)]
    pub engines: Vec<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub per_page: u32,
    pub has_more: bool,
}

/// Per-engine diagnostics for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineTiming {
    pub engine: String,
    pub elapsed_ms: u64,
    pub hits: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The deduped, ranked, paginated output for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedResult {
    pub query: String,
    pub category: Category,
    pub results: Vec<Hit>,
    pub total_results: u64,
    /// Engines that contributed at least one surviving hit.
    pub engines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instant_answer: Option<InstantAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_panel: Option<KnowledgePanel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub widgets: Vec<Widget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_searches: Vec<String>,
    pub page_info: PageInfo,
    pub elapsed_ms: u64,
    /// Count of selected engines that produced an error instead of hits.
    #[serde(default)]
    pub engines_failed: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timings: Vec<EngineTiming>,
}

/// An instant answer computed locally from the query shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstantAnswer {
    Calculation {
        expression: String,
        value: f64,
    },
    UnitConversion {
        amount: f64,
        from: String,
        to: String,
        value: f64,
    },
    Currency {
        amount: f64,
        from: String,
        to: String,
        value: f64,
        rate: f64,
    },
    Definition {
        word: String,
        definition: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        synonyms: Vec<String>,
    },
    WorldTime {
        location: String,
        zone: String,
        time: String,
    },
}

/// An entity record shown next to the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgePanel {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<(String, String)>,
}

/// A detector-triggered enrichment block attached to a result page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Widget {
    Cheatsheet {
        language: String,
        entries: Vec<(String, String)>,
    },
    RelatedSearches {
        queries: Vec<String>,
    },
    KnowledgePanel {
        panel: KnowledgePanel,
    },
    InstantAnswer {
        answer: InstantAnswer,
    },
}

/// A bang that matched the query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BangRef {
    pub trigger: String,
    pub name: String,
}

/// Returned instead of a result page when a bang (or `!lucky`) redirects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRedirect {
    pub redirect_url: String,
    pub bang: BangRef,
}

/// Top-level outcome of `/search`: either a result page or a redirect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchOutcome {
    Redirect(SearchRedirect),
    Results(Box<MergedResult>),
}
