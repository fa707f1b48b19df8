use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::Server;
use crate::{metrics, tools::DispatchRequest, Error};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

/// Maps library errors onto HTTP responses with an `{"error": ...}` body
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult = std::result::Result<Response, ApiError>;

pub async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "healthy" }))
}

pub async fn metrics() -> ApiResult {
    let body = metrics::gather_metrics()?;
    Ok(body.into_response())
}

pub async fn list_tools(State(server): State<Arc<Server>>) -> Json<JsonValue> {
    Json(json!(server.toolbox().definitions()))
}

pub async fn list_toolsets(State(server): State<Arc<Server>>) -> Json<JsonValue> {
    Json(json!(server.toolbox().toolsets()))
}

pub async fn invoke_tool(
    State(server): State<Arc<Server>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult {
    // An empty body means no arguments
    let args: Map<String, JsonValue> = if body.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::Validation(format!("Arguments must be a JSON object: {}", e)))?
    };
    info!("Invoking tool {} over HTTP", name);

    let result = server.toolbox().invoke(&name, &args).await?;
    Ok(Json(result).into_response())
}

pub async fn run_query(
    State(server): State<Arc<Server>>,
    Json(request): Json<QueryRequest>,
) -> ApiResult {
    let result = server.toolbox().fallback_query(&request.query).await?;
    Ok(Json(result).into_response())
}

pub async fn dispatch(
    State(server): State<Arc<Server>>,
    Json(request): Json<DispatchRequest>,
) -> ApiResult {
    let result = server.toolbox().dispatch(&request).await?;
    Ok(Json(result).into_response())
}
