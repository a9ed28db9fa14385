//! Endpoint handlers and the error-to-HTTP mapping.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use courier_core::{CourierError, TenantDirectory, TenantId};
use courier_dispatch::{BulkItem, DispatchOutcome};
use courier_session::ConnectionState;
use courier_transport::TransportHandle;

use crate::server::AppState;

const TENANT_HEADER: &str = "x-tenant-id";
const API_KEY_HEADER: &str = "x-api-key";

/// `CourierError` carried to the HTTP boundary.
pub struct ApiError(pub CourierError);

impl From<CourierError> for ApiError {
    fn from(e: CourierError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CourierError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CourierError::TenantNotFound(_) => StatusCode::NOT_FOUND,
            CourierError::TenantInactive(_) => StatusCode::FORBIDDEN,
            CourierError::NotConnected | CourierError::Timeout(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CourierError::PermanentlyInvalidated => StatusCode::GONE,
            CourierError::SendFailed(_) => StatusCode::BAD_GATEWAY,
            CourierError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "ok": false,
            "error": self.0.kind(),
            "detail": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Reject requests without the configured API key. A process started without
/// a key runs open, matching the development posture of the original service.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.api_key {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            let body = json!({ "ok": false, "error": "unauthorized" });
            return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        }
    }
    next.run(request).await
}

fn tenant_from_headers(headers: &HeaderMap) -> Result<TenantId, ApiError> {
    headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(TenantId::from_raw)
        .ok_or_else(|| {
            ApiError(CourierError::InvalidInput(format!(
                "missing {TENANT_HEADER} header"
            )))
        })
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub connected: bool,
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
}

pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError> {
    let tenant = tenant_from_headers(&headers)?;
    state.directory.resolve(&tenant)?;
    let status = state.registry.status(&tenant);
    Ok(Json(StatusResponse {
        ok: true,
        connected: status.connected,
        state: status.state,
        connected_at: status.connected_at,
    }))
}

#[derive(Serialize)]
pub struct QrResponse {
    pub ok: bool,
    pub qr: Option<String>,
}

/// Latest pairing payload, if the tenant is mid-pairing. Rendering it is the
/// operator UI's problem.
pub async fn qr(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<QrResponse>, ApiError> {
    let tenant = tenant_from_headers(&headers)?;
    state.directory.resolve(&tenant)?;
    Ok(Json(QrResponse {
        ok: true,
        qr: state.registry.status(&tenant).qr,
    }))
}

#[derive(Deserialize)]
pub struct SendRequest {
    pub recipient: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct SendResponse {
    pub ok: bool,
}

pub async fn send(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let tenant = tenant_from_headers(&headers)?;
    let config = state.directory.resolve(&tenant)?;

    // Payload problems fail the request before any connection work starts.
    if request.recipient.trim().is_empty() {
        return Err(CourierError::InvalidInput("recipient is required".into()).into());
    }
    if request.message.trim().is_empty() {
        return Err(CourierError::InvalidInput("message is required".into()).into());
    }
    if request.message.chars().count() > config.max_message_chars {
        return Err(CourierError::InvalidInput(format!(
            "message exceeds {} chars",
            config.max_message_chars
        ))
        .into());
    }

    let handle = state.registry.ensure_connection(&tenant).await?;
    let to = handle
        .normalize_recipient(&request.recipient)
        .ok_or_else(|| CourierError::InvalidInput("recipient is not addressable".into()))?;
    handle
        .send_text(&to, &request.message)
        .await
        .map_err(|e| CourierError::SendFailed(e.to_string()))?;

    info!(tenant_id = %tenant, recipient = %to, "message sent");
    Ok(Json(SendResponse { ok: true }))
}

#[derive(Deserialize)]
pub struct SendBulkRequest {
    pub items: Vec<BulkItem>,
}

#[derive(Serialize)]
pub struct SendBulkResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
}

pub async fn send_bulk(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SendBulkRequest>,
) -> Result<Json<SendBulkResponse>, ApiError> {
    let tenant = tenant_from_headers(&headers)?;
    let config = state.directory.resolve(&tenant)?;
    if request.items.is_empty() {
        return Err(CourierError::InvalidInput("items must not be empty".into()).into());
    }

    let handle = state.registry.ensure_connection(&tenant).await?;
    let outcome = courier_dispatch::dispatch(request.items, handle, &config).await;

    info!(
        tenant_id = %tenant,
        sent = outcome.sent,
        total = outcome.total,
        "bulk dispatch complete"
    );
    Ok(Json(SendBulkResponse { ok: true, outcome }))
}
