use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::error::ApiError;
use crate::core::types::{Hit, Query};
use crate::search::SearchService;

/// Bounded capacity of one streaming event channel.
const STREAM_CAPACITY: usize = 64;

/// How many sources ground one answer.
const SOURCE_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

/// One ordered unit on the session canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Text { id: String, content: String },
    Sources { id: String, hits: Vec<Hit> },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Canvas {
    pub blocks: Vec<Block>,
}

/// Streaming answers are a finite, non-restartable sequence of these
/// events, ending in `Done` or `Error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Start { message_id: String },
    Thinking { text: String },
    Citation { url: String, title: String },
    Token { text: String },
    Done { message_id: String },
    Error { message: String },
}

struct SessionState {
    messages: Vec<Message>,
    canvas: Canvas,
    cancel: CancellationToken,
}

/// Chat sessions grounded in meta-search results. A thin layer over the
/// coordinator: it searches, composes an extractive answer, and either
/// returns it whole or streams it token by token.
pub struct AiSessionService {
    search: Arc<SearchService>,
    sessions: DashMap<String, SessionState>,
}

impl AiSessionService {
    pub fn new(search: Arc<SearchService>) -> Self {
        Self {
            search,
            sessions: DashMap::new(),
        }
    }

    pub fn create_session(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(
            id.clone(),
            SessionState {
                messages: Vec::new(),
                canvas: Canvas::default(),
                cancel: CancellationToken::new(),
            },
        );
        id
    }

    pub fn cancel_session(&self, session_id: &str) -> Result<(), ApiError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| ApiError::NotFound(format!("session '{}'", session_id)))?;
        session.cancel.cancel();
        Ok(())
    }

    pub fn messages(&self, session_id: &str) -> Result<Vec<Message>, ApiError> {
        self.sessions
            .get(session_id)
            .map(|s| s.messages.clone())
            .ok_or_else(|| ApiError::NotFound(format!("session '{}'", session_id)))
    }

    pub fn canvas(&self, session_id: &str) -> Result<Canvas, ApiError> {
        self.sessions
            .get(session_id)
            .map(|s| s.canvas.clone())
            .ok_or_else(|| ApiError::NotFound(format!("session '{}'", session_id)))
    }

    fn session_cancel(&self, session_id: &str) -> Result<CancellationToken, ApiError> {
        self.sessions
            .get(session_id)
            .map(|s| s.cancel.clone())
            .ok_or_else(|| ApiError::NotFound(format!("session '{}'", session_id)))
    }

    fn record_turn(&self, session_id: &str, question: Message, answer: Message, sources: Vec<Hit>) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.messages.push(question);
            session.messages.push(answer.clone());
            session.canvas.blocks.push(Block::Text {
                id: answer.id,
                content: answer.content,
            });
            if !sources.is_empty() {
                session.canvas.blocks.push(Block::Sources {
                    id: uuid::Uuid::new_v4().to_string(),
                    hits: sources,
                });
            }
        }
    }

    async fn grounded_answer(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, Vec<Hit>), ApiError> {
        let query = Query::new(text).with_page(1, SOURCE_LIMIT as u32);
        let merged = self
            .search
            .meta_search(&query, cancel)
            .await
            .map_err(|_| ApiError::Internal("session cancelled".into()))?;

        let sources: Vec<Hit> = merged.results.into_iter().take(SOURCE_LIMIT).collect();
        let answer = compose_answer(text, &sources);
        Ok((answer, sources))
    }

    /// Non-streaming mode: the full assistant message at once.
    pub async fn ask(&self, session_id: &str, text: &str) -> Result<Message, ApiError> {
        let cancel = self.session_cancel(session_id)?;
        let (answer, sources) = self.grounded_answer(text, &cancel).await?;

        let question = message(Role::User, text.to_string());
        let reply = message(Role::Assistant, answer);
        self.record_turn(session_id, question, reply.clone(), sources);
        Ok(reply)
    }

    /// Streaming mode: events arrive on a bounded channel with this service
    /// as the single producer. The sequence is finite and ends with `Done`
    /// or `Error`; cancelling the session stops it mid-stream.
    pub fn ask_stream(
        self: &Arc<Self>,
        session_id: &str,
        text: &str,
    ) -> Result<mpsc::Receiver<SessionEvent>, ApiError> {
        let cancel = self.session_cancel(session_id)?;
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        let service = Arc::clone(self);
        let session_id = session_id.to_string();
        let text = text.to_string();

        tokio::spawn(async move {
            let message_id = uuid::Uuid::new_v4().to_string();
            let _ = tx
                .send(SessionEvent::Start {
                    message_id: message_id.clone(),
                })
                .await;
            let _ = tx
                .send(SessionEvent::Thinking {
                    text: format!("searching for \"{}\"", text),
                })
                .await;

            let (answer, sources) = tokio::select! {
                _ = cancel.cancelled() => return,
                result = service.grounded_answer(&text, &cancel) => match result {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = tx
                            .send(SessionEvent::Error {
                                message: e.to_string(),
                            })
                            .await;
                        return;
                    }
                },
            };

            for source in &sources {
                let _ = tx
                    .send(SessionEvent::Citation {
                        url: source.url.clone(),
                        title: source.title.clone(),
                    })
                    .await;
            }

            for token in answer.split_inclusive(' ') {
                if cancel.is_cancelled() {
                    return;
                }
                let _ = tx
                    .send(SessionEvent::Token {
                        text: token.to_string(),
                    })
                    .await;
            }

            let question = message(Role::User, text);
            let mut reply = message(Role::Assistant, answer);
            reply.id = message_id.clone();
            service.record_turn(&session_id, question, reply, sources);
            let _ = tx.send(SessionEvent::Done { message_id }).await;
        });

        Ok(rx)
    }
}

fn message(role: Role, content: String) -> Message {
    Message {
        id: uuid::Uuid::new_v4().to_string(),
        role,
        content,
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// Extractive composition: the leading snippets stitched into a short
/// answer, each attributed to its source host.
fn compose_answer(question: &str, sources: &[Hit]) -> String {
    if sources.is_empty() {
        return format!("No sources found for \"{}\".", question);
    }

    let mut out = String::new();
    for hit in sources.iter().filter(|h| !h.snippet.is_empty()).take(3) {
        let host = url::Url::parse(&hit.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| "source".to_string());
        out.push_str(&format!("{} ({})\n", hit.snippet.trim(), host));
    }
    if out.is_empty() {
        out = format!(
            "Top result for \"{}\": {} — {}",
            question, sources[0].title, sources[0].url
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_from_snippets() {
        let hits = vec![Hit {
            url: "https://docs.rs/tokio".into(),
            title: "tokio".into(),
            snippet: "Tokio is an asynchronous runtime.".into(),
            engine: "google".into(),
            engines: vec!["google".into()],
            score: 1.0,
            category: Default::default(),
            media: None,
        }];
        let answer = compose_answer("what is tokio", &hits);
        assert!(answer.contains("asynchronous runtime"));
        assert!(answer.contains("docs.rs"));
    }

    #[test]
    fn empty_sources_still_answer() {
        let answer = compose_answer("anything", &[]);
        assert!(answer.contains("No sources"));
    }
}
