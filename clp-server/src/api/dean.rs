//! Dean endpoints: faculty listing and plan review

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use clp_common::models::{ClpStatus, PlanFilter, PlanUpdate, Role, UploadType, UserFilter};
use clp_common::outcomes::{
    program_outcome_headers, COURSE_OUTCOMES, INSTITUTIONAL_OUTCOME_HEADERS, PROGRAM_OUTCOMES,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::api::{
    change_password, load_plan, message, profile, ChangePasswordRequest, JsonBody,
};
use crate::error::{ApiError, ApiResult};
use crate::session::CurrentUser;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Return,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub action: ReviewAction,
    #[serde(default)]
    pub comments: Option<String>,
}

impl ReviewAction {
    fn status(&self) -> ClpStatus {
        match self {
            ReviewAction::Approve => ClpStatus::Approved,
            ReviewAction::Return => ClpStatus::ReturnedForRevision,
        }
    }
}

/// Author notification for a review decision
pub fn review_notification(action: ReviewAction, subject: &str, comments: Option<&str>) -> String {
    match action {
        ReviewAction::Approve => {
            format!("Your CLP for \"{}\" has been APPROVED by the Dean.", subject)
        }
        ReviewAction::Return => format!(
            "Your CLP for \"{}\" has been RETURNED. Comments: {}",
            subject,
            comments.unwrap_or("None")
        ),
    }
}

/// GET /dean/faculty
pub async fn faculty(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    session.require_role(&[Role::Dean])?;
    let teachers = state
        .backends
        .store
        .list_users(&UserFilter {
            role: Some(Role::Teacher),
            ..Default::default()
        })
        .await?;
    Ok(Json(json!({ "teachers": teachers })))
}

/// GET /dean/courses
pub async fn courses(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    session.require_role(&[Role::Dean])?;
    let by_status = |status| PlanFilter {
        status: Some(status),
        ..Default::default()
    };
    let pending = state
        .backends
        .store
        .list_plans(&by_status(ClpStatus::Pending))
        .await?;
    let approved = state
        .backends
        .store
        .list_plans(&by_status(ClpStatus::Approved))
        .await?;
    let unread = state.backends.store.count_unread(&session.user_id).await?;
    Ok(Json(json!({
        "pending_plans": pending,
        "approved_plans": approved,
        "unread_count": unread,
    })))
}

/// GET /dean/review_clp/:id
pub async fn review_form(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    session.require_role(&[Role::Dean])?;
    let plan = load_plan(&state, id).await?;
    if plan.status != ClpStatus::Pending {
        return Err(ApiError::Conflict("This plan is not pending review.".to_string()));
    }

    let content_data = if plan.upload_type == UploadType::AiGenerated && plan.content.is_some() {
        plan.content_data().unwrap_or_else(|| {
            warn!(plan_id = id, "Stored AI content is not a JSON object");
            let mut fallback = Map::new();
            fallback.insert(
                "descriptive_title".to_string(),
                Value::String(plan.subject.clone()),
            );
            fallback
        })
    } else {
        Map::new()
    };

    Ok(Json(json!({
        "plan": plan,
        "content_data": content_data,
        "program_outcomes": PROGRAM_OUTCOMES,
        "course_outcomes": COURSE_OUTCOMES,
        "institutional_headers": INSTITUTIONAL_OUTCOME_HEADERS,
        "program_headers": program_outcome_headers().collect::<Vec<_>>(),
    })))
}

/// POST /dean/review_clp/:id
pub async fn review(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<i64>,
    JsonBody(request): JsonBody<ReviewRequest>,
) -> ApiResult<Json<Value>> {
    session.require_role(&[Role::Dean])?;
    let plan = load_plan(&state, id).await?;
    if plan.status != ClpStatus::Pending {
        return Err(ApiError::Conflict("This plan is not pending review.".to_string()));
    }

    let comments = request
        .comments
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let status = request.action.status();
    state
        .backends
        .store
        .update_plan(
            id,
            &PlanUpdate {
                status: Some(status),
                dean_comments: Some(comments.map(str::to_string)),
                ..Default::default()
            },
        )
        .await?;
    state
        .backends
        .store
        .insert_notification(
            &plan.user_id,
            &review_notification(request.action, &plan.subject, comments),
        )
        .await?;
    info!(plan_id = id, status = %status, dean = %session.username, "Plan reviewed");

    let note = match request.action {
        ReviewAction::Approve => format!("CLP for {} has been approved.", plan.subject),
        ReviewAction::Return => {
            format!("CLP for {} has been returned for revision.", plan.subject)
        }
    };
    Ok(message(note))
}

/// GET /dean/profile
pub async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    session.require_role(&[Role::Dean])?;
    profile(&state, &session).await
}

/// POST /dean/profile
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    JsonBody(request): JsonBody<ChangePasswordRequest>,
) -> ApiResult<Json<Value>> {
    session.require_role(&[Role::Dean])?;
    change_password(&state, &session, &request).await
}

/// Build dean routes (nested under /dean)
pub fn dean_routes() -> Router<AppState> {
    Router::new()
        .route("/faculty", get(faculty))
        .route("/courses", get(courses))
        .route("/review_clp/:id", get(review_form).post(review))
        .route("/profile", get(get_profile).post(update_profile))
}
