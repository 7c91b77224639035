//! HTTP transport for [`InboxApi`].
//!
//! Caller identity is supplied by the fronting gateway in the `x-tenant-id`,
//! `x-user-id` and `x-permissions` (comma separated) headers. Errors use the
//! envelope `{"error": {"code", "message"}}`.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agent::{AgentProfile, AgentStatus, PresenceReason};
use crate::api::InboxApi;
use crate::assignment::{AssignmentSummary, ClaimOutcome};
use crate::bulk::{BulkTransferRequest, BulkTransferResult, ExpiredCount, ExpirySelector, ReengageRequest, ReengagementResult};
use crate::error::InboxError;
use crate::integration::{Actor, Permission};
use crate::queue::TeamQueueStats;
use crate::resolution::{ResolveOutcome, ResolveRequest};
use crate::session::InboxSession;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const PERMISSIONS_HEADER: &str = "x-permissions";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum AppError {
    Unauthorized(String),
    Inbox(InboxError),
}

impl From<InboxError> for AppError {
    fn from(err: InboxError) -> Self {
        AppError::Inbox(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            AppError::Inbox(err) => match err {
                InboxError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
                InboxError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
                InboxError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
                InboxError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
                InboxError::Integration(msg) => {
                    tracing::error!("Collaborator failure: {}", msg);
                    (StatusCode::BAD_GATEWAY, "INTEGRATION_ERROR", msg)
                }
                other => {
                    tracing::error!("Internal error: {}", other);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, AppError>;

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let tenant_id = header(parts, TENANT_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", TENANT_HEADER)))?;
        let user_id = header(parts, USER_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", USER_HEADER)))?;

        let mut actor = Actor::new(tenant_id, user_id);
        if let Some(list) = header(parts, PERMISSIONS_HEADER) {
            for name in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                actor = actor.with_permission(name.parse::<Permission>()?);
            }
        }
        Ok(actor)
    }
}

#[derive(Debug, Deserialize)]
pub struct PresenceBody {
    pub status: AgentStatus,
    #[serde(default)]
    pub reason: Option<PresenceReason>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignQueueBody {
    #[serde(default)]
    pub team_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// Comma separated; all teams when absent
    #[serde(default)]
    pub team_ids: Option<String>,
    #[serde(default)]
    pub lookback_hours: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ExpiredQuery {
    #[serde(default)]
    pub older_than_days: Option<u32>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

/// Build the inbox router
pub fn router(api: InboxApi) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agents/me/presence", put(set_presence))
        .route("/queues/assign", post(assign_queue))
        .route("/queues/stats", get(queue_stats))
        .route("/sessions/bulk-transfer", post(bulk_transfer))
        .route("/sessions/expired/count", get(expired_count))
        .route("/sessions/reengage", post(bulk_reengage))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/claim", post(claim_session))
        .route("/sessions/:id/resolve", post(resolve_session))
        .with_state(api)
}

async fn health(State(api): State<InboxApi>) -> Response {
    match api.health_check().await {
        Ok(true) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        _ => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable" }))).into_response(),
    }
}

async fn set_presence(
    State(api): State<InboxApi>,
    actor: Actor,
    Json(body): Json<PresenceBody>,
) -> ApiResult<AgentProfile> {
    Ok(Json(api.set_presence(&actor, body.status, body.reason).await?))
}

async fn assign_queue(
    State(api): State<InboxApi>,
    actor: Actor,
    body: Option<Json<AssignQueueBody>>,
) -> ApiResult<AssignmentSummary> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(api.assign_queue(&actor, body.team_id.as_deref()).await?))
}

async fn queue_stats(
    State(api): State<InboxApi>,
    actor: Actor,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Vec<TeamQueueStats>> {
    let team_ids: Vec<String> = query
        .team_ids
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect();
    Ok(Json(api.get_queue_stats(&actor, &team_ids, query.lookback_hours).await?))
}

async fn get_session(
    State(api): State<InboxApi>,
    actor: Actor,
    Path(session_id): Path<String>,
) -> ApiResult<InboxSession> {
    Ok(Json(api.get_session(&actor, &session_id).await?))
}

async fn claim_session(
    State(api): State<InboxApi>,
    actor: Actor,
    Path(session_id): Path<String>,
) -> ApiResult<ClaimOutcome> {
    Ok(Json(api.claim_session(&actor, &session_id).await?))
}

async fn bulk_transfer(
    State(api): State<InboxApi>,
    actor: Actor,
    Json(request): Json<BulkTransferRequest>,
) -> ApiResult<BulkTransferResult> {
    Ok(Json(api.bulk_transfer(&actor, &request).await?))
}

async fn expired_count(
    State(api): State<InboxApi>,
    actor: Actor,
    Query(query): Query<ExpiredQuery>,
) -> ApiResult<ExpiredCount> {
    let selector = ExpirySelector::from_parts(query.older_than_days, query.start, query.end)?;
    Ok(Json(api.get_expired_count(&actor, &selector).await?))
}

async fn bulk_reengage(
    State(api): State<InboxApi>,
    actor: Actor,
    Json(request): Json<ReengageRequest>,
) -> ApiResult<ReengagementResult> {
    Ok(Json(api.bulk_reengage(&actor, &request).await?))
}

async fn resolve_session(
    State(api): State<InboxApi>,
    actor: Actor,
    Path(session_id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<ResolveOutcome> {
    Ok(Json(api.resolve_session(&actor, &session_id, request).await?))
}
