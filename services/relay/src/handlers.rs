//! Axum handlers for the health and diagnostic surface.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::{
    catalog::{CatalogError, CatalogSnapshot},
    state::AppState,
};

/// Client-facing text for any discovery failure. Details stay in the log.
const DISCOVERY_FAILED: &str = "Model discovery failed";

pub enum ApiError {
    BadGateway(CatalogError),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadGateway(e) => {
                error!(error = %e, "Upstream discovery failed.");
                let body = ErrorResponse {
                    message: DISCOVERY_FAILED.to_string(),
                };
                (StatusCode::BAD_GATEWAY, Json(body)).into_response()
            }
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: Option<String>,
}

/// Liveness probe.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.config.live_model.clone(),
    })
}

/// Lists upstream models, served from the discovery cache.
pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CatalogSnapshot>, ApiError> {
    let snapshot = state
        .catalog
        .snapshot()
        .await
        .map_err(ApiError::BadGateway)?;
    Ok(Json(snapshot.as_ref().clone()))
}
