use aho_corasick::AhoCorasick;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::core::types::{InstantAnswer, KnowledgePanel, Widget};
use crate::instant::{suggest, InstantServices};

/// Languages with a shipped cheatsheet, in detector priority order.
const CHEATSHEET_LANGUAGES: &[&str] = &[
    "regex", "sql", "python", "rust", "git", "bash", "javascript", "docker",
];

fn cheatsheet_matcher() -> &'static AhoCorasick {
    static MATCHER: OnceLock<AhoCorasick> = OnceLock::new();
    MATCHER.get_or_init(|| {
        AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(CHEATSHEET_LANGUAGES)
            .expect("static pattern set")
    })
}

fn cheatsheet_entries(language: &str) -> Vec<(String, String)> {
    let raw: &[(&str, &str)] = match language {
        "regex" => &[
            (r"\d", "any digit"),
            (r"\w", "word character"),
            (r".*", "any run of characters"),
            (r"^ $", "line anchors"),
            (r"(a|b)", "alternation"),
            (r"a{2,4}", "bounded repetition"),
        ],
        "sql" => &[
            ("SELECT col FROM t WHERE …", "filter rows"),
            ("JOIN u ON t.id = u.t_id", "combine tables"),
            ("GROUP BY col HAVING …", "aggregate + filter groups"),
            ("ORDER BY col DESC LIMIT n", "top-n"),
        ],
        "python" => &[
            ("[x for x in xs if p(x)]", "list comprehension"),
            ("with open(p) as f:", "managed file handle"),
            ("def f(*args, **kwargs):", "variadic signature"),
        ],
        "rust" => &[
            ("let x: Option<T>", "maybe-value"),
            ("match x { Some(v) => …, None => … }", "exhaustive branch"),
            ("iter().map(…).collect()", "transform a collection"),
            ("?", "propagate errors"),
        ],
        "git" => &[
            ("git rebase -i HEAD~3", "rewrite recent history"),
            ("git stash / git stash pop", "shelve work"),
            ("git log --oneline --graph", "compact history"),
        ],
        "bash" => &[
            ("${var:-default}", "fallback value"),
            ("cmd1 && cmd2 || cmd3", "conditional chain"),
            ("for f in *.txt; do …; done", "file loop"),
        ],
        "javascript" => &[
            ("const {a, b} = obj", "destructuring"),
            ("xs.map(x => x * 2)", "arrow transform"),
            ("await fetch(url)", "async request"),
        ],
        "docker" => &[
            ("docker build -t name .", "build an image"),
            ("docker run -p 80:80 name", "run with port map"),
            ("docker compose up -d", "start a stack"),
        ],
        _ => &[],
    };
    raw.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// User widget preferences, read-only at detection time.
#[derive(Debug, Clone, Default)]
pub struct WidgetSettings {
    pub disabled: HashSet<String>,
    /// Lower position sorts earlier; widgets without one keep detection
    /// order after the positioned ones.
    pub positions: HashMap<String, u32>,
}

impl WidgetSettings {
    fn enabled(&self, kind: &str) -> bool {
        !self.disabled.contains(kind)
    }

    fn position(&self, kind: &str) -> u32 {
        self.positions.get(kind).copied().unwrap_or(u32::MAX)
    }
}

fn token_bounded(text: &str, start: usize, end: usize) -> bool {
    let before_ok = start == 0
        || text[..start]
            .chars()
            .next_back()
            .is_some_and(|c| !c.is_alphanumeric());
    let after_ok = end == text.len()
        || text[end..]
            .chars()
            .next()
            .is_some_and(|c| !c.is_alphanumeric());
    before_ok && after_ok
}

fn widget_kind(widget: &Widget) -> &'static str {
    match widget {
        Widget::Cheatsheet { .. } => "cheatsheet",
        Widget::RelatedSearches { .. } => "related_searches",
        Widget::KnowledgePanel { .. } => "knowledge_panel",
        Widget::InstantAnswer { .. } => "instant_answer",
    }
}

/// Apply the detectors in fixed order and attach matching widgets, sorted
/// by configured position with detection order as the tie-break.
pub fn detect_widgets(
    query_text: &str,
    services: &InstantServices,
    settings: &WidgetSettings,
) -> (Vec<Widget>, Option<InstantAnswer>, Option<KnowledgePanel>, Vec<String>) {
    let mut widgets = Vec::new();

    // 1. Programming cheatsheet. Matches count only on token boundaries,
    // so "digital" never triggers the git sheet.
    if settings.enabled("cheatsheet") {
        if let Some(m) = cheatsheet_matcher()
            .find_iter(query_text)
            .find(|m| token_bounded(query_text, m.start(), m.end()))
        {
            let language = CHEATSHEET_LANGUAGES[m.pattern().as_usize()];
            widgets.push(Widget::Cheatsheet {
                language: language.to_string(),
                entries: cheatsheet_entries(language),
            });
        }
    }

    // 2. Related searches; only worth attaching with at least two.
    let related = services.suggest.suggest(query_text, suggest::DEFAULT_LIMIT);
    if settings.enabled("related_searches") && related.len() >= 2 {
        widgets.push(Widget::RelatedSearches {
            queries: related.clone(),
        });
    }

    // 3. Knowledge panel.
    let panel = services.knowledge_panel(query_text);
    if settings.enabled("knowledge_panel") {
        if let Some(panel) = &panel {
            widgets.push(Widget::KnowledgePanel {
                panel: panel.clone(),
            });
        }
    }

    // 4. Instant answer.
    let instant = services.detect(query_text);
    if settings.enabled("instant_answer") {
        if let Some(answer) = &instant {
            widgets.push(Widget::InstantAnswer {
                answer: answer.clone(),
            });
        }
    }

    // Stable sort keeps detection order within equal positions.
    widgets.sort_by_key(|w| settings.position(widget_kind(w)));

    (widgets, instant, panel, related)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cheatsheet_triggers_on_language_token() {
        let services = InstantServices::in_memory();
        let (widgets, ..) =
            detect_widgets("python list comprehension", &services, &WidgetSettings::default());
        assert!(matches!(
            widgets.first(),
            Some(Widget::Cheatsheet { language, .. }) if language == "python"
        ));
    }

    #[test]
    fn cheatsheet_needs_a_whole_token() {
        let services = InstantServices::in_memory();
        let (widgets, ..) = detect_widgets("digital marketing", &services, &WidgetSettings::default());
        assert!(!widgets
            .iter()
            .any(|w| matches!(w, Widget::Cheatsheet { .. })));
    }

    #[test]
    fn instant_answer_widget_attaches() {
        let services = InstantServices::in_memory();
        let (widgets, instant, ..) =
            detect_widgets("5+3*2", &services, &WidgetSettings::default());
        assert!(instant.is_some());
        assert!(widgets
            .iter()
            .any(|w| matches!(w, Widget::InstantAnswer { .. })));
    }

    #[test]
    fn related_searches_need_two() {
        let services = InstantServices::in_memory();
        services.suggest.record("rust async");
        let (widgets, ..) = detect_widgets("rust", &services, &WidgetSettings::default());
        assert!(!widgets
            .iter()
            .any(|w| matches!(w, Widget::RelatedSearches { .. })));

        services.suggest.record("rust atomics");
        let (widgets, ..) = detect_widgets("rust", &services, &WidgetSettings::default());
        assert!(widgets
            .iter()
            .any(|w| matches!(w, Widget::RelatedSearches { .. })));
    }

    #[test]
    fn disabled_widgets_are_skipped() {
        let services = InstantServices::in_memory();
        let settings = WidgetSettings {
            disabled: ["instant_answer".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let (widgets, instant, ..) = detect_widgets("5+3*2", &services, &settings);
        // Detection still runs; only the widget is suppressed.
        assert!(instant.is_some());
        assert!(!widgets
            .iter()
            .any(|w| matches!(w, Widget::InstantAnswer { .. })));
    }

    #[test]
    fn positions_override_detection_order() {
        let mut services = InstantServices::in_memory();
        services.knowledge = crate::instant::KnowledgeBase::from_entities(vec![
            crate::core::types::KnowledgePanel {
                name: "regex".into(),
                description: "Pattern matching mini-language.".into(),
                image_url: None,
                facts: Vec::new(),
            },
        ]);
        let settings = WidgetSettings {
            positions: [("knowledge_panel".to_string(), 0)].into_iter().collect(),
            ..Default::default()
        };
        // "regex" matches both the cheatsheet and the knowledge base; the
        // positioned panel sorts first despite later detection.
        let (widgets, ..) = detect_widgets("regex", &services, &settings);
        assert!(matches!(widgets.first(), Some(Widget::KnowledgePanel { .. })));
        assert!(widgets
            .iter()
            .any(|w| matches!(w, Widget::Cheatsheet { .. })));
    }
}
