//! HTTP routes. Each handler translates one request into one engine call.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;
use zenkat_config::TreeRootConfig;
use zenkat_core::{
    Answer, Eagerness, NodeDetail, NodeSummary, Predicate, QueryHit, QueryOptions, Registration,
    Tree, ZenkatError,
};

use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/tree", get(list_trees).put(put_tree))
        .route("/tree/:name", get(get_tree))
        .route("/tree/:name/query", post(query_tree))
        .route("/tree/:name/node", get(list_nodes))
        .route("/tree/:name/node/:id", get(get_node))
        .with_state(state)
        .layer(cors)
}

async fn health() -> &'static str {
    "ok"
}

/// Loading controls accepted on every read route.
#[derive(Debug, Default, Deserialize)]
pub struct LoadParams {
    pub eagerness: Option<String>,
    /// `false` selects the non-blocking variant
    pub wait: Option<bool>,
}

impl LoadParams {
    fn eagerness(&self) -> Result<Option<Eagerness>, ApiError> {
        self.eagerness
            .as_deref()
            .map(|value| value.parse::<Eagerness>())
            .transpose()
            .map_err(|message| ZenkatError::invalid_query(message).into())
    }

    fn options(&self, state: &AppState, fallback: Option<Eagerness>) -> Result<QueryOptions, ApiError> {
        let eagerness = self.eagerness()?.or(fallback);
        Ok(state
            .engine()
            .query_options(eagerness, self.wait.unwrap_or(true)))
    }
}

/// `POST /tree/{name}/query` body.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub predicate: Predicate,
    #[serde(default)]
    pub eagerness: Option<Eagerness>,
    #[serde(default)]
    pub detail: bool,
}

#[derive(Debug, Serialize)]
pub struct TreeRegistered {
    pub name: String,
    pub virtual_path: String,
    pub created: bool,
}

/// GET /tree
async fn list_trees(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.engine().list_trees())
}

/// PUT /tree
///
/// 201 for a new tree, 200 when an existing name is reconfigured.
async fn put_tree(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    let root: TreeRootConfig = serde_json::from_str(&body)
        .map_err(|e| ApiError::bad_request("invalid_config", e.to_string()))?;
    let registration = state.register_root(&root)?;

    let status = match registration {
        Registration::Created => StatusCode::CREATED,
        Registration::Updated => StatusCode::OK,
    };
    debug!(tree = %root.name, status = status.as_u16(), "Tree registered over HTTP");
    Ok((
        status,
        Json(TreeRegistered {
            virtual_path: root.effective_virtual_path(),
            name: root.name,
            created: matches!(registration, Registration::Created),
        }),
    ))
}

/// GET /tree/{name}
async fn get_tree(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<LoadParams>,
) -> ApiResult<Answer<Tree>> {
    let options = params.options(&state, None)?;
    Ok(Json(state.engine().get_tree(&name, options).await?))
}

/// GET /tree/{name}/node
async fn list_nodes(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<LoadParams>,
) -> ApiResult<Answer<Vec<NodeSummary>>> {
    let options = params.options(&state, None)?;
    Ok(Json(state.engine().list_nodes(&name, options).await?))
}

/// GET /tree/{name}/node/{id}
///
/// Hydrates the file unless another eagerness is requested.
async fn get_node(
    State(state): State<Arc<AppState>>,
    Path((name, id)): Path<(String, String)>,
    Query(params): Query<LoadParams>,
) -> ApiResult<Answer<NodeDetail>> {
    let options = params.options(&state, Some(Eagerness::Full))?;
    Ok(Json(state.engine().get_node(&name, &id, options).await?))
}

/// POST /tree/{name}/query
async fn query_tree(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<LoadParams>,
    body: String,
) -> ApiResult<Answer<Vec<QueryHit>>> {
    // Parsed by hand so a malformed predicate is a 400 with the usual body
    let request: QueryRequest = serde_json::from_str(&body)
        .map_err(|e| ZenkatError::invalid_query(e.to_string()))?;
    let mut options = params.options(&state, None)?.with_detail(request.detail);
    if let Some(eagerness) = request.eagerness {
        options.eagerness = eagerness;
    }

    Ok(Json(
        state
            .engine()
            .query(&name, &request.predicate, options)
            .await?,
    ))
}
