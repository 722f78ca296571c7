//! Read-side API for the dashboard: action history and the mark-handled
//! control for gated threads.
//!
//! Every route is scoped to one account via the `x-replyflow-account`
//! header; there is no cross-account listing. Failures map through the
//! layered error types so callers get a generic message and a correlation
//! id while the detail stays in the logs.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use replyflow_core::domain::action_log::{ActionLogEntry, ActionLogId};
use replyflow_core::errors::{ApplicationError, InterfaceError};
use replyflow_db::repositories::{ActionLogRepository, ContactRepository, RepositoryError};

const ACCOUNT_HEADER: &str = "x-replyflow-account";
const DEFAULT_ACTIONS_LIMIT: u32 = 50;

#[derive(Clone)]
pub struct DashboardState {
    pub action_log: Arc<dyn ActionLogRepository>,
    pub contacts: Arc<dyn ContactRepository>,
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/api/v1/actions", get(list_actions))
        .route("/api/v1/actions/{id}", get(get_action))
        .route("/api/v1/contacts/{thread_id}/mark-handled", post(mark_handled))
        .with_state(state)
}

type ApiResponse = (StatusCode, Json<Value>);

fn interface_response(interface: InterfaceError) -> ApiResponse {
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let correlation_id = match &interface {
        InterfaceError::BadRequest { correlation_id, .. }
        | InterfaceError::Unauthorized { correlation_id, .. }
        | InterfaceError::ServiceUnavailable { correlation_id, .. }
        | InterfaceError::Internal { correlation_id, .. } => correlation_id.clone(),
    };
    (
        status,
        Json(json!({"error": interface.user_message(), "correlation_id": correlation_id})),
    )
}

fn account_id(headers: &HeaderMap, correlation_id: &str) -> Result<String, ApiResponse> {
    headers
        .get(ACCOUNT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            error!(
                event_name = "dashboard.missing_account_header",
                correlation_id = %correlation_id,
                header = ACCOUNT_HEADER,
                "dashboard request without an account header"
            );
            interface_response(InterfaceError::BadRequest {
                message: format!("missing {ACCOUNT_HEADER} header"),
                correlation_id: correlation_id.to_string(),
            })
        })
}

fn storage_failure(operation: &str, correlation_id: &str, error: RepositoryError) -> ApiResponse {
    error!(
        event_name = "dashboard.request_failed",
        correlation_id = %correlation_id,
        operation = %operation,
        error = %error,
        "dashboard request failed"
    );
    interface_response(ApplicationError::Persistence(error.to_string()).into_interface(correlation_id))
}

fn entry_to_json(entry: &ActionLogEntry) -> Value {
    json!({
        "id": entry.id.0,
        "platform": entry.platform,
        "thread_id": entry.thread_id,
        "recipient_id": entry.recipient_id,
        "action": entry.action.as_str(),
        "text": entry.text,
        "result": entry.result.as_str(),
        "message_id": entry.message_id,
        "created_at": entry.created_at.to_rfc3339(),
    })
}

pub async fn list_actions(
    State(state): State<DashboardState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResponse {
    let correlation_id = Uuid::new_v4().simple().to_string();
    let owner_id = match account_id(&headers, &correlation_id) {
        Ok(owner_id) => owner_id,
        Err(response) => return response,
    };

    let limit = match params.get("limit") {
        None => DEFAULT_ACTIONS_LIMIT,
        Some(raw) => match raw.parse::<u32>() {
            Ok(limit) if limit > 0 => limit,
            _ => {
                return interface_response(InterfaceError::BadRequest {
                    message: "limit must be a positive integer".to_string(),
                    correlation_id,
                })
            }
        },
    };

    match state.action_log.list_recent(&owner_id, limit).await {
        Ok(entries) => {
            let actions: Vec<Value> = entries.iter().map(entry_to_json).collect();
            (StatusCode::OK, Json(json!({"actions": actions})))
        }
        Err(error) => storage_failure("list_actions", &correlation_id, error),
    }
}

pub async fn get_action(
    State(state): State<DashboardState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResponse {
    let correlation_id = Uuid::new_v4().simple().to_string();
    let owner_id = match account_id(&headers, &correlation_id) {
        Ok(owner_id) => owner_id,
        Err(response) => return response,
    };

    match state.action_log.get(&owner_id, &ActionLogId(id)).await {
        Ok(Some(entry)) => (StatusCode::OK, Json(entry_to_json(&entry))),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({"error": "action not found"}))),
        Err(error) => storage_failure("get_action", &correlation_id, error),
    }
}

pub async fn mark_handled(
    State(state): State<DashboardState>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
) -> ApiResponse {
    let correlation_id = Uuid::new_v4().simple().to_string();
    let owner_id = match account_id(&headers, &correlation_id) {
        Ok(owner_id) => owner_id,
        Err(response) => return response,
    };

    match state.contacts.mark_handled(&owner_id, &thread_id, Utc::now()).await {
        Ok(true) => (StatusCode::OK, Json(json!({"status": "handled"}))),
        Ok(false) => (StatusCode::NOT_FOUND, Json(json!({"error": "unknown thread"}))),
        Err(error) => storage_failure("mark_handled", &correlation_id, error),
    }
}
