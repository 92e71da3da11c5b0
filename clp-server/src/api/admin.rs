//! Admin endpoints: user approval, template, departments and prompts

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use clp_common::config::TEMPLATE_KEY;
use clp_common::files::DOCX_CONTENT_TYPE;
use clp_common::models::{PromptKind, Role, UserFilter};
use clp_common::validation::FieldErrors;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::ai::prompts::{self, SUBJECT_TOKEN};
use crate::api::editor::{editor_config, EditorDocument, EditorMode};
use crate::api::forms::FormData;
use crate::api::{check, message, JsonBody};
use crate::backend::BackendError;
use crate::docx;
use crate::error::{ApiError, ApiResult};
use crate::session::{CurrentUser, Session};
use crate::AppState;

pub const TEMPLATE_DOWNLOAD_NAME: &str = "CLP_Template.docx";
pub const TEMPLATE_MISSING: &str = "Template file not found in storage.";

#[derive(Debug, Deserialize)]
pub struct ApproveUserRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub assigned_department: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateTextRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct DepartmentRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    #[serde(default)]
    pub template: String,
}

fn require_admin(session: &Session) -> ApiResult<()> {
    session.require_role(&[Role::Admin]).map(|_| ())
}

fn parse_kind(kind: &str) -> ApiResult<PromptKind> {
    kind.parse()
        .map_err(|_| ApiError::NotFound(format!("Unknown prompt '{}'.", kind)))
}

async fn load_template(state: &AppState) -> ApiResult<Vec<u8>> {
    state
        .backends
        .objects
        .download(TEMPLATE_KEY)
        .await
        .map_err(|e| match e {
            BackendError::NotFound(_) => ApiError::NotFound(TEMPLATE_MISSING.to_string()),
            other => other.into(),
        })
}

async fn store_template(state: &AppState, bytes: Vec<u8>) -> ApiResult<()> {
    state
        .backends
        .objects
        .upload(TEMPLATE_KEY, bytes, DOCX_CONTENT_TYPE, true)
        .await?;
    Ok(())
}

/// GET /admin/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;
    let pending = state
        .backends
        .store
        .list_users(&UserFilter {
            approved: Some(false),
            ..Default::default()
        })
        .await?;
    let approved = state
        .backends
        .store
        .list_users(&UserFilter {
            approved: Some(true),
            exclude_role: Some(Role::Admin),
            ..Default::default()
        })
        .await?;
    Ok(Json(json!({
        "pending_users": pending,
        "approved_users": approved,
    })))
}

/// POST /admin/approve_user
pub async fn approve_user(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    JsonBody(request): JsonBody<ApproveUserRequest>,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;
    let mut errors = FieldErrors::new();
    if request.user_id.trim().is_empty() {
        errors.add("user_id", "This field is required.");
    }
    let role = match request.role.parse::<Role>() {
        Ok(role @ (Role::Teacher | Role::Dean)) => Some(role),
        _ => {
            errors.add("role", "Not a valid choice.");
            None
        }
    };
    let department = request
        .assigned_department
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());
    if let Some(name) = department {
        let departments = state.backends.store.list_departments().await?;
        if !departments.iter().any(|d| d.name == name) {
            errors.add("assigned_department", "Not a valid choice.");
        }
    }
    check(errors)?;
    let Some(role) = role else {
        return Err(ApiError::BadRequest("Form validation failed. Could not approve user.".to_string()));
    };

    let user = state
        .backends
        .store
        .approve_user(request.user_id.trim(), role, department)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found.".to_string()))?;
    info!(user_id = %user.id, role = %role, "User approved");
    Ok(message(format!(
        "User {} has been approved and assigned.",
        user.username
    )))
}

/// POST /admin/disapprove/:user_id
pub async fn disapprove_user(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;
    let removed = state
        .backends
        .store
        .delete_user(&user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User profile not found or already removed.".to_string()))?;
    info!(user_id = %removed.id, "User disapproved");
    Ok(message(format!(
        "User profile for {} has been disapproved and removed.",
        removed.username
    )))
}

/// GET /admin/template
pub async fn template_overview(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;
    let bytes = load_template(&state).await?;
    let placeholders = docx::extract_placeholders(&bytes)?;
    let preview = docx::to_preview_html(&bytes)?;
    Ok(Json(json!({
        "key": TEMPLATE_KEY,
        "placeholders": placeholders,
        "preview_html": preview,
    })))
}

/// GET /admin/template/download
pub async fn download_template(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<impl IntoResponse> {
    require_admin(&session)?;
    let bytes = load_template(&state).await?;
    Ok((
        [
            (header::CONTENT_TYPE, DOCX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", TEMPLATE_DOWNLOAD_NAME),
            ),
        ],
        bytes,
    ))
}

/// POST /admin/template/upload (multipart `file`)
pub async fn upload_template(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;
    let mut form = FormData::read(multipart).await?;
    let file = form
        .take_file("file")
        .ok_or_else(|| ApiError::BadRequest("No file uploaded.".to_string()))?;
    if !file.filename.to_ascii_lowercase().ends_with(".docx") {
        return Err(ApiError::BadRequest("Only .docx files are allowed.".to_string()));
    }
    let placeholders = docx::extract_placeholders(&file.bytes)
        .map_err(|e| ApiError::BadRequest(format!("Could not process document: {}", e)))?;

    store_template(&state, file.bytes).await?;
    info!(placeholders = placeholders.len(), "Template replaced by upload");
    Ok(Json(json!({
        "message": "New template uploaded successfully!",
        "placeholders": placeholders,
    })))
}

/// PUT /admin/template (plain text body)
pub async fn replace_template_text(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    JsonBody(request): JsonBody<TemplateTextRequest>,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;
    let visible = request.content.chars().filter(|c| !c.is_whitespace()).count();
    if visible < 10 {
        let mut errors = FieldErrors::new();
        errors.add("content", "Template content must contain at least 10 characters.");
        check(errors)?;
    }

    let bytes = docx::build_document(&request.content)?;
    store_template(&state, bytes).await?;
    info!("Template rebuilt from text");
    Ok(message(
        "Template updated successfully! Changes will be used for future AI generations.",
    ))
}

/// GET /admin/template/editor
pub async fn template_editor(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;
    let config = editor_config(
        &state.settings,
        &EditorDocument {
            path: TEMPLATE_KEY,
            plan_id: None,
            title: TEMPLATE_DOWNLOAD_NAME,
            mode: EditorMode::Edit,
            user_id: &session.user_id,
            user_name: &session.username,
        },
    )?;
    Ok(Json(config))
}

/// GET /admin/departments
pub async fn list_departments(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;
    let departments = state.backends.store.list_departments().await?;
    Ok(Json(json!({ "departments": departments })))
}

/// POST /admin/departments
pub async fn create_department(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    JsonBody(request): JsonBody<DepartmentRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_admin(&session)?;
    let mut errors = FieldErrors::new();
    errors.length("name", &request.name, 2, 120);
    check(errors)?;

    let name = request.name.trim();
    let department = state
        .backends
        .store
        .insert_department(name)
        .await
        .map_err(|e| match e {
            BackendError::Conflict(_) => {
                ApiError::Conflict(format!("Department '{}' already exists.", name))
            }
            other => other.into(),
        })?;
    info!(department_id = department.id, name = %department.name, "Department created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("Department '{}' has been added.", department.name),
            "department": department,
        })),
    ))
}

/// DELETE /admin/departments/:id
pub async fn delete_department(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;
    if !state.backends.store.delete_department(id).await? {
        return Err(ApiError::NotFound("Department not found.".to_string()));
    }
    info!(department_id = id, "Department deleted");
    Ok(message("Department has been deleted."))
}

/// GET /admin/prompts
pub async fn list_prompts(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;
    let stored = state.backends.store.list_prompts().await?;
    let entries: Vec<Value> = PromptKind::ALL
        .into_iter()
        .map(|kind| match stored.iter().find(|p| p.kind == kind) {
            Some(setting) => json!({
                "kind": kind,
                "template": setting.template,
                "customized": true,
                "updated_at": setting.updated_at,
            }),
            None => json!({
                "kind": kind,
                "template": prompts::default_template(kind),
                "customized": false,
                "updated_at": null,
            }),
        })
        .collect();
    Ok(Json(json!({ "prompts": entries })))
}

/// PUT /admin/prompts/:kind
pub async fn update_prompt(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(kind): Path<String>,
    JsonBody(request): JsonBody<PromptRequest>,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;
    let kind = parse_kind(&kind)?;
    let mut errors = FieldErrors::new();
    if request.template.trim().is_empty() {
        errors.add("template", "This field is required.");
    } else if kind == PromptKind::WeeklyBreakdown && !request.template.contains(SUBJECT_TOKEN) {
        errors.add(
            "template",
            format!("Prompt must include the {} placeholder.", SUBJECT_TOKEN),
        );
    }
    check(errors)?;

    let setting = state.backends.store.set_prompt(kind, &request.template).await?;
    info!(kind = %kind, "Prompt updated");
    Ok(Json(json!({
        "message": format!("Prompt '{}' has been updated.", kind),
        "prompt": setting,
    })))
}

/// DELETE /admin/prompts/:kind
pub async fn reset_prompt(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(kind): Path<String>,
) -> ApiResult<Json<Value>> {
    require_admin(&session)?;
    let kind = parse_kind(&kind)?;
    let removed = state.backends.store.delete_prompt(kind).await?;
    info!(kind = %kind, removed, "Prompt reset to default");
    Ok(message(format!("Prompt '{}' has been reset to the default.", kind)))
}

/// Build admin routes (nested under /admin)
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/approve_user", post(approve_user))
        .route("/disapprove/:user_id", post(disapprove_user))
        .route("/template", get(template_overview).put(replace_template_text))
        .route("/template/download", get(download_template))
        .route("/template/upload", post(upload_template))
        .route("/template/editor", get(template_editor))
        .route("/departments", get(list_departments).post(create_department))
        .route("/departments/:id", delete(delete_department))
        .route("/prompts", get(list_prompts))
        .route("/prompts/:kind", put(update_prompt).delete(reset_prompt))
}
