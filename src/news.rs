use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::types::{Category, Hit, Query};
use crate::search::SearchService;

/// Sections composed into the home feed, besides top stories.
const SECTION_TOPICS: &[&str] = &["technology", "world", "business", "science"];

/// How many read-history topics feed the for-you rail.
const FOR_YOU_TOPICS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySection {
    pub topic: String,
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeFeed {
    pub top_stories: Vec<Hit>,
    pub sections: Vec<CategorySection>,
    pub for_you: Vec<Hit>,
    pub generated_at: String,
}

/// Aggregates per-category meta-search calls into a `HomeFeed`. Each call
/// tolerates partial failure; an empty section is dropped, not an error.
pub struct NewsService {
    search: Arc<SearchService>,
}

impl NewsService {
    pub fn new(search: Arc<SearchService>) -> Self {
        Self { search }
    }

    pub async fn home_feed(
        &self,
        read_history: &[String],
        cancel: &CancellationToken,
    ) -> HomeFeed {
        let top = self.news_hits("top stories", 10, cancel);

        let section_futures = SECTION_TOPICS
            .iter()
            .map(|topic| async move {
                CategorySection {
                    topic: topic.to_string(),
                    hits: self.news_hits(topic, 5, cancel).await,
                }
            });

        let for_you_futures = read_history
            .iter()
            .take(FOR_YOU_TOPICS)
            .map(|topic| self.news_hits(topic, 4, cancel));

        let (top_stories, sections, for_you_batches) = tokio::join!(
            top,
            join_all(section_futures),
            join_all(for_you_futures)
        );

        // Dedup the for-you rail across its source topics.
        let mut seen = std::collections::HashSet::new();
        let for_you: Vec<Hit> = for_you_batches
            .into_iter()
            .flatten()
            .filter(|h| seen.insert(crate::search::merge::canonical_url(&h.url)))
            .take(12)
            .collect();

        HomeFeed {
            top_stories,
            sections: sections.into_iter().filter(|s| !s.hits.is_empty()).collect(),
            for_you,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    async fn news_hits(&self, topic: &str, count: u32, cancel: &CancellationToken) -> Vec<Hit> {
        let query = Query::new(topic)
            .with_category(Category::News)
            .with_page(1, count);
        match self.search.meta_search(&query, cancel).await {
            Ok(merged) => merged.results,
            Err(_) => {
                warn!("news section '{}' cancelled", topic);
                Vec::new()
            }
        }
    }
}
