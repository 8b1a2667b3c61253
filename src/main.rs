use axum::{
    extract::{Path, Query as AxumQuery, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use conflux::ai::SessionEvent;
use conflux::bangs::BangEntry;
use conflux::core::config;
use conflux::core::error::ApiError;
use conflux::instant::{calculator, currency, dictionary, units, worldtime, Lookup};
use conflux::search::{SearchError, SearchOptions};
use conflux::{AppState, Category, InstantAnswer, Query, SafeSearch, SearchOutcome, TimeRange};

fn parse_port_from_args() -> Option<u16> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == "--port" {
            if let Some(v) = args.next() {
                if let Ok(p) = v.parse::<u16>() {
                    return Some(p);
                }
            }
        } else if let Some(rest) = a.strip_prefix("--port=") {
            if let Ok(p) = rest.parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

fn port_from_env() -> Option<u16> {
    for k in ["CONFLUX_PORT", "PORT"] {
        if let Ok(v) = std::env::var(k) {
            if let Ok(p) = v.trim().parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("Starting conflux search service");

    let cfg = config::load_config();

    // Create HTTP client shared by every engine request
    let http_timeout = env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(30);
    let connect_timeout = env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(10);
    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(http_timeout))
        .connect_timeout(std::time::Duration::from_secs(connect_timeout))
        .build()?;

    let state = Arc::new(AppState::new(http_client, cfg));
    info!(
        "registered {} engines, local index {}",
        state.registry.list().len(),
        if state.index.is_some() { "on" } else { "off" }
    );

    let app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/search", get(search_handler))
        .route("/search/images", get(search_images_handler))
        .route("/search/videos", get(search_videos_handler))
        .route("/search/news", get(search_news_handler))
        .route("/suggest", get(suggest_handler))
        .route("/bangs", get(list_bangs_handler).post(create_bang_handler))
        .route("/bangs/{trigger}", delete(delete_bang_handler))
        .route("/knowledge/{query}", get(knowledge_handler))
        .route("/instant/{kind}", get(instant_handler))
        .route("/news", get(news_feed_handler))
        .route("/ai/sessions", post(create_session_handler))
        .route("/ai/sessions/{id}/messages", post(session_message_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let port: u16 = parse_port_from_args().or_else(port_from_env).unwrap_or(7700);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT/CONFLUX_PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("conflux listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "conflux",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Per-category filter keys copied verbatim into `Query::filters`.
const IMAGE_FILTER_KEYS: &[&str] = &[
    "size", "color", "type", "aspect", "min_width", "min_height", "max_width", "max_height",
];
const VIDEO_FILTER_KEYS: &[&str] = &["duration", "quality", "cc", "source", "sort"];

fn build_query(
    params: &HashMap<String, String>,
    category: Category,
) -> Result<(Query, SearchOptions), ApiError> {
    let text = params
        .get("q")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Validation("missing query parameter 'q'".into()))?;

    let page: u32 = params
        .get("page")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let per_page: u32 = params
        .get("per_page")
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);

    let mut query = Query::new(text)
        .with_category(category)
        .with_page(page, per_page);

    if let Some(time) = params.get("time").and_then(|v| TimeRange::parse(v)) {
        query.time_range = time;
    }
    if let Some(safe) = params.get("safe").and_then(|v| SafeSearch::parse(v)) {
        query.safe_search = safe;
    }
    if let Some(lang) = params.get("lang").filter(|v| !v.is_empty()) {
        query.locale = lang.clone();
    }
    if let Some(region) = params.get("region").filter(|v| !v.is_empty()) {
        query.filters.insert("region".into(), region.clone());
    }
    query.site_include = params.get("site").filter(|v| !v.is_empty()).cloned();
    query.site_exclude = params
        .get("exclude_site")
        .filter(|v| !v.is_empty())
        .cloned();
    query.file_type = params.get("filetype").filter(|v| !v.is_empty()).cloned();
    query.verbatim = params
        .get("verbatim")
        .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes"));

    let filter_keys: &[&str] = match category {
        Category::Images => IMAGE_FILTER_KEYS,
        Category::Videos => VIDEO_FILTER_KEYS,
        _ => &[],
    };
    for key in filter_keys {
        if let Some(value) = params.get(*key).filter(|v| !v.is_empty()) {
            query.filters.insert((*key).to_string(), value.clone());
        }
    }

    let options = SearchOptions {
        refetch: params
            .get("refetch")
            .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
        version: params
            .get("version")
            .and_then(|v| v.parse().ok())
            .unwrap_or(conflux::cache::CACHE_VERSION),
    };

    Ok((query, options))
}

async fn run_search(
    state: &Arc<AppState>,
    params: HashMap<String, String>,
    category: Category,
) -> Result<Json<SearchOutcome>, ApiError> {
    let (query, options) = build_query(&params, category)?;

    // Cancelling the token on drop aborts engine tasks when the client
    // goes away mid-request.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let _permit = state
        .outbound_limit
        .acquire()
        .await
        .map_err(|_| ApiError::Internal("outbound limiter closed".into()))?;

    match state.search.search(query, options, &cancel).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(SearchError::Cancelled) => {
            Err(ApiError::Internal("request cancelled".into()))
        }
        Err(SearchError::Api(e)) => {
            error!("search error: {}", e);
            Err(e)
        }
    }
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    AxumQuery(params): AxumQuery<HashMap<String, String>>,
) -> Result<Json<SearchOutcome>, ApiError> {
    run_search(&state, params, Category::General).await
}

async fn search_images_handler(
    State(state): State<Arc<AppState>>,
    AxumQuery(params): AxumQuery<HashMap<String, String>>,
) -> Result<Json<SearchOutcome>, ApiError> {
    run_search(&state, params, Category::Images).await
}

async fn search_videos_handler(
    State(state): State<Arc<AppState>>,
    AxumQuery(params): AxumQuery<HashMap<String, String>>,
) -> Result<Json<SearchOutcome>, ApiError> {
    run_search(&state, params, Category::Videos).await
}

async fn search_news_handler(
    State(state): State<Arc<AppState>>,
    AxumQuery(params): AxumQuery<HashMap<String, String>>,
) -> Result<Json<SearchOutcome>, ApiError> {
    run_search(&state, params, Category::News).await
}

// ---------------------------------------------------------------------------
// Suggest, bangs, knowledge, instant
// ---------------------------------------------------------------------------

async fn suggest_handler(
    State(state): State<Arc<AppState>>,
    AxumQuery(params): AxumQuery<HashMap<String, String>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let q = params
        .get("q")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Validation("missing query parameter 'q'".into()))?;
    Ok(Json(state.search.instant().suggest.suggest(
        q,
        conflux::instant::suggest::DEFAULT_LIMIT,
    )))
}

async fn list_bangs_handler(State(state): State<Arc<AppState>>) -> Json<Vec<BangEntry>> {
    Json(state.search.bangs().list())
}

async fn create_bang_handler(
    State(state): State<Arc<AppState>>,
    Json(entry): Json<BangEntry>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.search.bangs().add(entry)?;
    Ok(Json(serde_json::json!({ "status": "created" })))
}

async fn delete_bang_handler(
    State(state): State<Arc<AppState>>,
    Path(trigger): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.search.bangs().remove(&trigger)?;
    Ok(Json(serde_json::json!({ "status": "deleted" })))
}

async fn knowledge_handler(
    State(state): State<Arc<AppState>>,
    Path(query): Path<String>,
) -> Result<Json<conflux::KnowledgePanel>, ApiError> {
    state
        .search
        .instant()
        .knowledge_panel(&query)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no entity for '{}'", query)))
}

async fn instant_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    AxumQuery(params): AxumQuery<HashMap<String, String>>,
) -> Result<Json<InstantAnswer>, ApiError> {
    let q = params
        .get("q")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Validation("missing query parameter 'q'".into()))?;
    let services = state.search.instant();

    let answer = match kind.as_str() {
        "calc" => {
            let value = calculator::evaluate(q)
                .map_err(|e| ApiError::Validation(e.to_string()))?;
            InstantAnswer::Calculation {
                expression: q.to_string(),
                value,
            }
        }
        "convert" => {
            let (amount, from, to) = units::parse_conversion(q).ok_or_else(|| {
                ApiError::Validation("expected '<amount> <unit> to <unit>'".into())
            })?;
            let value = units::convert(amount, &from, &to)
                .map_err(|e| ApiError::Validation(e.to_string()))?;
            InstantAnswer::UnitConversion {
                amount,
                from: from.name.to_string(),
                to: to.name.to_string(),
                value,
            }
        }
        "currency" => {
            let (amount, from, to) = currency::parse_conversion(q).ok_or_else(|| {
                ApiError::Validation("expected '<amount> <code> to <code>'".into())
            })?;
            let (value, rate) = services
                .rates
                .convert(amount, &from, &to)
                .map_err(|e| ApiError::Validation(e.to_string()))?;
            InstantAnswer::Currency {
                amount,
                from,
                to,
                value,
                rate,
            }
        }
        "define" => {
            let word = dictionary::parse_define_query(q).unwrap_or_else(|| q.to_string());
            match services.dictionary.lookup(&word) {
                Lookup::Found(entry) => InstantAnswer::Definition {
                    word: entry.word,
                    definition: entry.definition,
                    synonyms: entry.synonyms,
                },
                Lookup::NotFound => {
                    return Err(ApiError::NotFound(format!("no definition for '{}'", word)))
                }
            }
        }
        "time" => {
            let location = worldtime::parse_time_query(q).unwrap_or_else(|| q.to_string());
            let (zone, time) = worldtime::current_time(&location)
                .map_err(|e| ApiError::NotFound(e.to_string()))?;
            InstantAnswer::WorldTime {
                location,
                zone,
                time,
            }
        }
        "weather" => {
            // No weather provider is wired up; the route exists for parity
            // with the instant answer surface.
            return Err(ApiError::NotFound("no weather provider configured".into()));
        }
        other => {
            return Err(ApiError::NotFound(format!("unknown instant kind '{}'", other)));
        }
    };

    Ok(Json(answer))
}

// ---------------------------------------------------------------------------
// News & AI sessions
// ---------------------------------------------------------------------------

async fn news_feed_handler(
    State(state): State<Arc<AppState>>,
    AxumQuery(params): AxumQuery<HashMap<String, String>>,
) -> Json<conflux::news::HomeFeed> {
    let read_history: Vec<String> = params
        .get("topics")
        .map(|t| {
            t.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    Json(state.news.home_feed(&read_history, &cancel).await)
}

async fn create_session_handler(
    State(state): State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let id = state.ai.create_session();
    Json(serde_json::json!({ "session_id": id }))
}

#[derive(serde::Deserialize)]
struct SessionMessageRequest {
    query: String,
    #[serde(default)]
    stream: bool,
}

async fn session_message_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<SessionMessageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.stream {
        // Streamed answers drain the event sequence into an ordered list;
        // transport-level streaming is the HTTP layer's concern, not the
        // session's.
        let mut rx = state.ai.ask_stream(&id, &request.query)?;
        let mut events: Vec<SessionEvent> = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        return Ok(Json(serde_json::json!({ "events": events })));
    }

    let message = state.ai.ask(&id, &request.query).await?;
    Ok(Json(serde_json::to_value(message).map_err(|e| {
        ApiError::Internal(e.to_string())
    })?))
}
