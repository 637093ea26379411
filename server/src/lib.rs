use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use lexis_core::tokenizer::Analyzer;
use lexis_core::{IndexHandle, LexisError, DEFAULT_MAX_HITS};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Upper bound on `k` accepted over HTTP.
const MAX_K: usize = 1000;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { DEFAULT_MAX_HITS }

#[derive(Deserialize)]
pub struct TermFreqParams {
    pub term: String,
    pub doc: u32,
}

#[derive(Deserialize)]
pub struct AppendDoc {
    pub path: String,
    pub text: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: u32,
    pub score: f32,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,
}

#[derive(Clone)]
pub struct AppState {
    pub handle: IndexHandle,
    pub admin_token: Option<String>,
}

pub type ApiError = (StatusCode, Json<Value>);

fn api_error(err: LexisError) -> ApiError {
    let status = match &err {
        LexisError::EmptyQuery | LexisError::QuerySyntax { .. } => StatusCode::BAD_REQUEST,
        LexisError::IndexLocked(_) => StatusCode::CONFLICT,
        LexisError::IndexNotFound(_) => StatusCode::NOT_FOUND,
        LexisError::Decoding { .. } | LexisError::DocumentRead { .. } | LexisError::DuplicateDocument(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LexisError::StorageCorruption { .. } | LexisError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let mut body = json!({ "kind": err.kind(), "error": err.to_string() });
    if let LexisError::QuerySyntax { fragment, position, .. } = &err {
        body["fragment"] = json!(fragment);
        body["position"] = json!(position);
    }
    (status, Json(body))
}

fn plain_error(status: StatusCode, msg: &str) -> ApiError {
    (status, Json(json!({ "error": msg })))
}

pub fn build_app(index_dir: String, analyzer: Arc<dyn Analyzer>) -> Result<Router> {
    // Load the committed index at startup
    let handle = IndexHandle::open(&index_dir, analyzer)?;
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    tracing::info!(index = %index_dir, num_docs = handle.document_count(), "index opened");
    Ok(router(AppState { handle, admin_token }))
}

/// CORS policy for a comma-separated origin list; anything else allows every origin.
pub fn cors_layer(allow_origin: Option<&str>) -> CorsLayer {
    let origins: Vec<_> = allow_origin
        .into_iter()
        .flat_map(|val| val.split(','))
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(std::env::var("CORS_ALLOW_ORIGIN").ok().as_deref());

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/termfreq", get(termfreq_handler))
        .route("/index/append", post(index_append))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    // k=0 asks for the hit count only
    let k = params.k.min(MAX_K);
    let results = state.handle.search(&params.q, k).map_err(api_error)?;
    let hits = results
        .hits
        .into_iter()
        .map(|h| SearchHit { doc_id: h.doc_id, score: h.score, path: h.path, frequency: h.frequency })
        .collect();
    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits: results.total_hits, results: hits }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<u32>) -> Result<Json<Value>, ApiError> {
    let snapshot = state.handle.snapshot();
    let meta = snapshot.doc(doc_id).ok_or_else(|| plain_error(StatusCode::NOT_FOUND, "not found"))?;
    Ok(Json(json!({
        "doc_id": doc_id,
        "path": meta.path,
        "text_len": meta.text_len,
        "term_count": meta.term_count,
    })))
}

pub async fn termfreq_handler(State(state): State<AppState>, Query(params): Query<TermFreqParams>) -> Result<Json<Value>, ApiError> {
    if state.handle.snapshot().doc(params.doc).is_none() {
        return Err(plain_error(StatusCode::NOT_FOUND, "not found"));
    }
    let frequency = state.handle.exact_term_frequency(&params.term, params.doc);
    Ok(Json(json!({ "term": params.term, "doc_id": params.doc, "frequency": frequency })))
}

/// Append documents and publish the new snapshot. Searches keep running against the old one meanwhile.
async fn index_append(State(state): State<AppState>, headers: HeaderMap, Json(docs): Json<Vec<AppendDoc>>) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers)?;
    let handle = state.handle.clone();
    let outcome = tokio::task::spawn_blocking(move || -> lexis_core::Result<Value> {
        let mut writer = handle.append()?;
        let mut failed = Vec::new();
        for doc in &docs {
            if let Err(e) = writer.add_document(&doc.path, doc.text.as_bytes()) {
                tracing::warn!(path = %doc.path, kind = e.kind(), "rejected document");
                failed.push(json!({ "path": doc.path, "kind": e.kind(), "error": e.to_string() }));
            }
        }
        let info = writer.commit()?;
        Ok(json!({ "added": info.added, "num_docs": info.meta.num_docs, "failed": failed }))
    })
    .await
    .map_err(|e| plain_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    outcome.map(Json).map_err(api_error)
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(plain_error(StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set")),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(plain_error(StatusCode::UNAUTHORIZED, "invalid admin token"))
    }
}
