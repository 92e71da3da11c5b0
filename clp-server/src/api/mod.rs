//! HTTP API handlers for clp-server

pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod dean;
pub mod editor;
pub mod forms;
pub mod health;
pub mod teacher;

pub use admin::admin_routes;
pub use auth::auth_routes;
pub use dashboard::dashboard_routes;
pub use dean::dean_routes;
pub use editor::editor_routes;
pub use health::health_routes;
pub use teacher::teacher_routes;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use clp_common::models::CourseLearningPlan;
use clp_common::validation::FieldErrors;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::session::{Session, LOGIN_REQUIRED};
use crate::AppState;

pub const PLAN_NOT_FOUND: &str = "Course Learning Plan not found.";

/// `Json` extractor answering malformed bodies with the API error envelope
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state).await?;
        Ok(JsonBody(value))
    }
}

/// `{"message": ...}` body used in place of a flash message
pub fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}

/// Plan with author, 404 when missing
pub(crate) async fn load_plan(state: &AppState, id: i64) -> ApiResult<CourseLearningPlan> {
    state
        .backends
        .store
        .get_plan(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(PLAN_NOT_FOUND.to_string()))
}

/// Fail with every collected field error at once
pub(crate) fn check(errors: FieldErrors) -> ApiResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors.into_messages()))
    }
}

/// Password change shared by the teacher and dean profile pages
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_new_password: String,
}

pub(crate) async fn change_password(
    state: &AppState,
    session: &Session,
    request: &ChangePasswordRequest,
) -> ApiResult<Json<Value>> {
    let mut errors = FieldErrors::new();
    errors.password_pair(
        "new_password",
        &request.new_password,
        &request.confirm_new_password,
        "New passwords must match.",
    );
    check(errors)?;

    let token = session
        .access_token
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized(LOGIN_REQUIRED.to_string()))?;
    state
        .backends
        .auth
        .update_password(token, &request.new_password)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Error changing password: {}", e)))?;
    info!(user_id = %session.user_id, "Password changed");
    Ok(message("Your password has been changed successfully."))
}

/// Profile of the session user, 404 when the row is gone
pub(crate) async fn profile(
    state: &AppState,
    session: &Session,
) -> ApiResult<Json<Value>> {
    let user = state
        .backends
        .store
        .get_user(&session.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User profile not found.".to_string()))?;
    Ok(Json(json!({ "user": user })))
}
