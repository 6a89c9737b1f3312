use anyhow::{Context, Result};
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tfidf_core::corpus::load_dir;
use tfidf_core::persist::{load_snapshot, save_snapshot, IndexPaths};
use tfidf_core::{search, DocMeta, Index, IndexBuilder, IndexHandle, RebuildOutcome, RebuildState};
use tokio::time::MissedTickBehavior;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub k: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub k: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_ms: u64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: u32,
    pub score: f64,
    pub title: String,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub index_dir: PathBuf,
    pub corpus_dir: PathBuf,
    pub admin_token: Option<String>,
}

/// An index together with the display metadata of the same corpus load,
/// so ordinals and metadata always agree.
pub struct Catalog {
    pub index: Index,
    pub docs: Vec<DocMeta>,
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<IndexHandle<Catalog>>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self { catalog: Arc::new(IndexHandle::new()), config: Arc::new(config) }
    }

    /// Serve the persisted snapshot if it loads cleanly, otherwise rebuild
    /// from the corpus. A failed rebuild leaves the state empty; searches
    /// answer 503 until a later rebuild succeeds.
    pub fn bootstrap(config: ServerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.corpus_dir)
            .with_context(|| format!("creating corpus directory {}", config.corpus_dir.display()))?;
        let state = Self::new(config);
        let paths = IndexPaths::new(&state.config.index_dir);
        if paths.exists() {
            match load_snapshot(&paths) {
                Ok((index, docs, meta)) => {
                    tracing::info!(num_docs = meta.num_docs, created_at = %meta.created_at, "loaded persisted index");
                    state.catalog.install(Catalog { index, docs });
                    return Ok(state);
                }
                Err(e) => tracing::warn!(error = %format!("{e:#}"), "persisted index unusable, rebuilding"),
            }
        } else {
            tracing::info!(root = %paths.root.display(), "no persisted index, building");
        }
        if let Err(e) = state.rebuild() {
            tracing::error!(error = %format!("{e:#}"), "initial index build failed");
        }
        Ok(state)
    }

    pub fn rebuild(&self) -> Result<RebuildOutcome> {
        let config = Arc::clone(&self.config);
        self.catalog.rebuild(move || rebuild_catalog(&config))
    }
}

/// Load the corpus, build, and persist. Persisting is best effort: the
/// fresh index is served even if it could not be written out.
pub fn rebuild_catalog(config: &ServerConfig) -> Result<Catalog> {
    let loaded = load_dir(&config.corpus_dir)
        .with_context(|| format!("loading corpus from {}", config.corpus_dir.display()))?;
    let index = IndexBuilder::default().build(&loaded.corpus);
    if let Err(e) = save_snapshot(&IndexPaths::new(&config.index_dir), &index, &loaded.docs) {
        tracing::warn!(error = %format!("{e:#}"), "failed to persist rebuilt index");
    }
    Ok(Catalog { index, docs: loaded.docs })
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status_handler))
        .route("/search", get(search_get).post(search_post))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/index/rebuild", post(rebuild_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Trigger a rebuild every `period`, off the async runtime. The first
/// rebuild happens one period after start.
pub fn spawn_rebuild_scheduler(state: AppState, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let s = state.clone();
            match tokio::task::spawn_blocking(move || s.rebuild()).await {
                Ok(Ok(outcome)) => tracing::info!(?outcome, "scheduled rebuild finished"),
                Ok(Err(e)) => tracing::warn!(error = %format!("{e:#}"), "scheduled rebuild failed"),
                Err(e) => tracing::error!(error = %e, "scheduled rebuild task aborted"),
            }
        }
    })
}

pub async fn search_get(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    run_search(&state, params.q, params.k).await
}

pub async fn search_post(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Result<Json<SearchResponse>, ApiError> {
    run_search(&state, req.query, req.k).await
}

/// Scoring scans every document, so it runs on the blocking pool.
async fn run_search(state: &AppState, query: String, k: Option<usize>) -> Result<Json<SearchResponse>, ApiError> {
    if query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query is required".into()));
    }
    let catalog = state
        .catalog
        .snapshot()
        .ok_or((StatusCode::SERVICE_UNAVAILABLE, "index not ready".to_string()))?;

    let response = tokio::task::spawn_blocking(move || ranked_response(&catalog, query, k))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(response))
}

pub fn ranked_response(catalog: &Catalog, query: String, k: Option<usize>) -> SearchResponse {
    let start = std::time::Instant::now();
    let hits = search(&query, &catalog.index);
    let total_hits = hits.len();

    let raw_terms: Vec<String> = query.split_whitespace().map(|s| s.to_string()).collect();
    let results = hits
        .into_iter()
        .take(k.unwrap_or(usize::MAX))
        .filter_map(|h| {
            let meta = catalog.docs.get(h.doc_id as usize)?;
            Some(SearchHit {
                doc_id: h.doc_id,
                score: h.score,
                title: meta.title.clone(),
                snippet: highlight_terms(&meta.snippet, &raw_terms),
            })
        })
        .collect();

    let took_ms = start.elapsed().as_millis() as u64;
    tracing::debug!(query = %query, total_hits, took_ms, "search");
    SearchResponse { query, took_ms, total_hits, results }
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<u32>) -> Result<Json<serde_json::Value>, ApiError> {
    let catalog = state
        .catalog
        .snapshot()
        .ok_or((StatusCode::SERVICE_UNAVAILABLE, "index not ready".to_string()))?;
    let meta = catalog
        .docs
        .get(doc_id as usize)
        .ok_or((StatusCode::NOT_FOUND, "not found".to_string()))?;
    Ok(Json(serde_json::json!({
        "doc_id": doc_id,
        "external_id": meta.external_id,
        "title": meta.title,
        "snippet": meta.snippet,
    })))
}

async fn status_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let label = match state.catalog.state() {
        RebuildState::Empty => "empty",
        RebuildState::Building => "building",
        RebuildState::Ready => "ready",
    };
    let (corpus_size, vocabulary_size) = state
        .catalog
        .snapshot()
        .map(|c| (c.index.corpus_size(), c.index.vocabulary_size()))
        .unwrap_or((0, 0));
    Json(serde_json::json!({ "state": label, "corpus_size": corpus_size, "vocabulary_size": vocabulary_size }))
}

async fn rebuild_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let s = state.clone();
    let outcome = tokio::task::spawn_blocking(move || s.rebuild())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
    let status = match outcome {
        RebuildOutcome::Installed => "installed",
        RebuildOutcome::Coalesced => "coalesced",
    };
    Ok(Json(serde_json::json!({ "status": status })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.config.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        if t.trim().is_empty() { continue; }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else { continue };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(texts: &[&str]) -> Catalog {
        let docs = texts
            .iter()
            .enumerate()
            .map(|(i, t)| DocMeta { external_id: format!("{i}.txt"), title: i.to_string(), snippet: t.to_string() })
            .collect();
        Catalog { index: tfidf_core::build_index(texts), docs }
    }

    #[test]
    fn ranked_response_counts_all_hits_and_truncates_results() {
        let c = catalog(&["cat sat on the mat", "dog sat on the rug", "cat and dog played together"]);
        let resp = ranked_response(&c, "cat".to_string(), Some(1));
        assert_eq!(resp.total_hits, 2);
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].doc_id, 0);
        assert_eq!(resp.results[0].snippet, "<em>cat</em> sat on the mat");
    }

    #[tokio::test]
    async fn search_runs_off_the_async_executor() {
        let state = AppState::new(ServerConfig {
            index_dir: PathBuf::from("unused-index"),
            corpus_dir: PathBuf::from("unused-corpus"),
            admin_token: None,
        });
        state.catalog.install(catalog(&["red apple", "green pear"]));
        let Json(resp) = run_search(&state, "pear".to_string(), None).await.unwrap();
        assert_eq!(resp.total_hits, 1);
        assert_eq!(resp.results[0].doc_id, 1);
    }

    #[test]
    fn highlights_case_insensitively() {
        let out = highlight_terms("Cats and cat food", &["cat".to_string()]);
        assert_eq!(out, "<em>Cat</em>s and <em>cat</em> food");
    }

    #[test]
    fn highlight_escapes_regex_metacharacters() {
        let out = highlight_terms("price (usd)", &["(usd)".to_string()]);
        assert_eq!(out, "price <em>(usd)</em>");
    }
}
