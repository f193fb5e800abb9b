//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState,
    types::{
        ChangesResponse, CommitRequest, CommitResponse, ExportRequest, ExportResponse,
        HealthResponse, QueryRequest, QueryResponse, StatusResponse,
    },
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracis_core::{
    Actor, ArtifactId, Engine, ProjectId, TracisError, VersionId, canonical_checksum,
    export_canonical,
};

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Get store status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.engine.read().await;
    match engine.counts() {
        Ok(counts) => (
            StatusCode::OK,
            Json(StatusResponse {
                artifact_count: counts.artifacts,
                link_count: counts.links,
                artifact_records: counts.artifact_records,
                trace_records: counts.trace_records,
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": format!("Status failed: {}", e) })),
        )
            .into_response(),
    }
}

// =============================================================================
// COMMIT HANDLER
// =============================================================================

/// Map an engine error to the HTTP status of a failed commit.
fn commit_error_status(err: &TracisError) -> StatusCode {
    match err {
        TracisError::Validation(_) => StatusCode::BAD_REQUEST,
        TracisError::Conflict(_) => StatusCode::CONFLICT,
        TracisError::NotFound(_) => StatusCode::NOT_FOUND,
        TracisError::Storage(_) | TracisError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Commit a change set.
pub async fn commit_handler(
    State(state): State<AppState>,
    Json(request): Json<CommitRequest>,
) -> impl IntoResponse {
    if let Err(e) = request.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(CommitResponse::error(format!("Invalid commit: {}", e))),
        );
    }

    let mut engine = state.engine.write().await;
    let result = engine.commit(
        VersionId(request.version),
        request.changes,
        &Actor::new(&request.actor),
        request.options,
    );

    match result {
        Ok(outcome) => (StatusCode::OK, Json(CommitResponse::success(&outcome))),
        Err(e) => (
            commit_error_status(&e),
            Json(CommitResponse::error(format!("Commit failed: {}", e))),
        ),
    }
}

// =============================================================================
// QUERY HANDLER
// =============================================================================

/// Execute a query.
pub async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    let engine = state.engine.read().await;
    match execute_query(&engine, &request) {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(QueryResponse::error(format!("Query failed: {}", e))),
        ),
    }
}

/// Execute a query against the engine.
fn execute_query(engine: &Engine, request: &QueryRequest) -> Result<QueryResponse, TracisError> {
    match request {
        QueryRequest::Lookup { project, name } => {
            match engine.artifact_by_name(ProjectId(*project), name)? {
                Some(artifact) => Ok(QueryResponse::with_artifacts(vec![artifact.id.0])),
                None => Ok(QueryResponse::not_found()),
            }
        }

        QueryRequest::Reachability {
            version,
            artifact_id,
        } => {
            match engine.reachability(VersionId(*version), ArtifactId(*artifact_id))? {
                Some(set) => Ok(QueryResponse::with_reachability(&set)),
                None => Ok(QueryResponse::not_found()),
            }
        }

        QueryRequest::Neighborhood {
            version,
            artifact_id,
            types,
        } => {
            match engine.neighborhood_with_types(
                VersionId(*version),
                ArtifactId(*artifact_id),
                types,
            )? {
                Some(ids) => Ok(QueryResponse::with_artifacts(
                    ids.iter().map(|id| id.0).collect(),
                )),
                None => Ok(QueryResponse::not_found()),
            }
        }

        QueryRequest::TraceMatrix { version } => {
            let matrix = engine.trace_matrix(VersionId(*version))?;
            Ok(QueryResponse::with_matrix(&matrix))
        }
    }
}

// =============================================================================
// EXPORT HANDLER
// =============================================================================

/// Export one version's live state in canonical form.
pub async fn export_handler(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> impl IntoResponse {
    let engine = state.engine.read().await;
    let result = engine
        .export_snapshot(VersionId(request.version))
        .and_then(|snapshot| export_canonical(&snapshot));

    match result {
        Ok(bytes) => {
            let checksum = canonical_checksum(&bytes);
            (StatusCode::OK, Json(ExportResponse::success(&bytes, checksum)))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ExportResponse::error(format!("Export failed: {}", e))),
        ),
    }
}

// =============================================================================
// CHANGES HANDLER
// =============================================================================

/// Recent change descriptions from the in-process feed.
pub async fn changes_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(ChangesResponse {
        changes: state.feed.recent(),
    })
}
