//! Role dashboard and notification endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::api::message;
use crate::error::{ApiError, ApiResult};
use crate::session::CurrentUser;
use crate::AppState;

/// GET /dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    let role = session.role().ok_or_else(|| {
        ApiError::Forbidden("Your role is not defined. Please contact an administrator.".to_string())
    })?;
    let unread = state.backends.store.count_unread(&session.user_id).await?;
    Ok(Json(json!({
        "role": role,
        "username": session.username,
        "unread_count": unread,
        "home": role.home_path(),
    })))
}

/// GET /notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    let notifications = state
        .backends
        .store
        .list_notifications(&session.user_id)
        .await?;
    Ok(Json(json!({ "notifications": notifications })))
}

/// GET /check_notifications
pub async fn check_notifications(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    let unread = state.backends.store.count_unread(&session.user_id).await?;
    Ok(Json(json!({ "unread_count": unread })))
}

/// POST /notifications/mark_read/:id
pub async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.backends.store.mark_read(id, &session.user_id).await?;
    Ok(message("Notification marked as read."))
}

/// POST /notifications/mark_all_read
pub async fn mark_all_read(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    state.backends.store.mark_all_read(&session.user_id).await?;
    Ok(message("All notifications have been marked as read."))
}

/// POST /notifications/delete_read
pub async fn delete_read(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    let deleted = state.backends.store.delete_read(&session.user_id).await?;
    Ok(Json(json!({
        "message": "All read notifications have been deleted.",
        "deleted": deleted,
    })))
}

/// Build dashboard and notification routes
pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/notifications", get(list_notifications))
        .route("/check_notifications", get(check_notifications))
        .route("/notifications/mark_read/:id", post(mark_read))
        .route("/notifications/mark_all_read", post(mark_all_read))
        .route("/notifications/delete_read", post(delete_read))
}
