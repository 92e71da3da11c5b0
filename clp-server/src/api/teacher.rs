//! Teacher endpoints: plan drafting, submission and files

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clp_common::files::{allowed_file, content_type_for, download_name, upload_path};
use clp_common::models::{
    ClpStatus, CourseLearningPlan, NewPlan, PlanFilter, PlanUpdate, Role, UploadType, UserFilter,
};
use clp_common::time::now;
use clp_common::validation::FieldErrors;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::api::editor::{editor_config, EditorDocument, EditorMode};
use crate::api::forms::{FormData, UploadedFile};
use crate::api::{
    change_password, check, load_plan, message, profile, ChangePasswordRequest, JsonBody,
    PLAN_NOT_FOUND,
};
use crate::error::{ApiError, ApiResult};
use crate::services::{spawn_generation, GenerationRequest};
use crate::session::{CurrentUser, Session, FORBIDDEN};
use crate::AppState;

pub const NO_FILE: &str = "This plan does not have a downloadable file.";

/// Optional course details accepted by the generator
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub subject_name: String,
    #[serde(default)]
    pub department: String,
    pub course_number: Option<String>,
    pub type_of_course: Option<String>,
    pub units: Option<String>,
    pub pre_requisite: Option<String>,
    pub co_requisite: Option<String>,
    pub credit: Option<String>,
    pub contact_hours_per_week: Option<String>,
    pub class_schedule: Option<String>,
    pub room_assignment: Option<String>,
    pub course_description: Option<String>,
}

impl GenerateRequest {
    /// Values placed into the document over anything the model produced
    pub fn course_data(&self) -> Map<String, Value> {
        let subject = self.subject_name.trim();
        let mut data = Map::new();
        for (key, value) in [
            ("subject", Some(subject)),
            ("department", Some(self.department.trim())),
            ("course_title", Some(subject)),
            ("descriptive_title", Some(subject)),
            ("course_number", self.course_number.as_deref()),
            ("type_of_course", self.type_of_course.as_deref()),
            ("units", self.units.as_deref()),
            ("pre_requisite", self.pre_requisite.as_deref()),
            ("co_requisite", self.co_requisite.as_deref()),
            ("credit", self.credit.as_deref()),
            ("Contact_hours_per_week", self.contact_hours_per_week.as_deref()),
            ("class_schedule", self.class_schedule.as_deref()),
            ("room_assignment", self.room_assignment.as_deref()),
            ("course_description", self.course_description.as_deref()),
        ] {
            if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
                data.insert(key.to_string(), Value::String(value.to_string()));
            }
        }
        data
    }
}

fn require_owner(session: &Session, plan: &CourseLearningPlan) -> ApiResult<()> {
    if plan.user_id == session.user_id {
        Ok(())
    } else {
        Err(ApiError::Forbidden(FORBIDDEN.to_string()))
    }
}

async fn check_department(state: &AppState, errors: &mut FieldErrors, department: &str) -> ApiResult<()> {
    if department.trim().is_empty() {
        errors.add("department", "This field is required.");
        return Ok(());
    }
    let departments = state.backends.store.list_departments().await?;
    if !departments.iter().any(|d| d.name == department.trim()) {
        errors.add("department", "Not a valid choice.");
    }
    Ok(())
}

/// Department, subject and optional file of the upload/edit forms
async fn validate_plan_form(
    state: &AppState,
    form: &FormData,
    file: Option<&UploadedFile>,
) -> ApiResult<()> {
    let mut errors = FieldErrors::new();
    check_department(state, &mut errors, form.text("department")).await?;
    errors.length("subject", form.text("subject"), 3, 100);
    if let Some(file) = file {
        if !allowed_file(&file.filename) {
            errors.add("file", "Only .docx and .pdf files are allowed!");
        }
    }
    check(errors)
}

/// Store an uploaded plan file under the teacher's folder
async fn store_upload(state: &AppState, user_id: &str, file: UploadedFile) -> ApiResult<String> {
    let path = upload_path(user_id, &file.filename, now());
    let content_type = file
        .content_type
        .clone()
        .unwrap_or_else(|| content_type_for(&file.filename).to_string());
    state
        .backends
        .objects
        .upload(&path, file.bytes, &content_type, false)
        .await?;
    Ok(path)
}

/// GET /teacher/my_clps
pub async fn my_clps(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    session.require_role(&[Role::Teacher])?;
    let plans = state
        .backends
        .store
        .list_plans(&PlanFilter {
            user_id: Some(session.user_id.clone()),
            ..Default::default()
        })
        .await?;
    let unread = state.backends.store.count_unread(&session.user_id).await?;
    Ok(Json(json!({ "plans": plans, "unread_count": unread })))
}

/// GET /teacher/all_clps
pub async fn all_clps(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    session.require_role(&[Role::Teacher, Role::Dean])?;
    let plans = state
        .backends
        .store
        .list_plans(&PlanFilter {
            status: Some(ClpStatus::Approved),
            ..Default::default()
        })
        .await?;
    let unread = state.backends.store.count_unread(&session.user_id).await?;
    Ok(Json(json!({ "plans": plans, "unread_count": unread })))
}

/// POST /teacher/submit_to_dean/:id
pub async fn submit_to_dean(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    session.require_role(&[Role::Teacher])?;
    let plan = load_plan(&state, id).await?;
    require_owner(&session, &plan)?;
    if plan.status.is_locked() {
        return Err(ApiError::Conflict(
            "This plan is already pending or has been approved.".to_string(),
        ));
    }

    state
        .backends
        .store
        .update_plan(
            id,
            &PlanUpdate {
                status: Some(ClpStatus::Pending),
                dean_comments: Some(None),
                ..Default::default()
            },
        )
        .await?;

    let deans = state
        .backends
        .store
        .list_users(&UserFilter {
            role: Some(Role::Dean),
            approved: Some(true),
            ..Default::default()
        })
        .await?;
    let note = format!(
        "New CLP for \"{}\" from {} needs review.",
        plan.subject,
        plan.author_username()
    );
    for dean in &deans {
        state.backends.store.insert_notification(&dean.id, &note).await?;
    }
    info!(plan_id = id, deans = deans.len(), "Plan submitted for review");

    Ok(message(format!(
        "CLP for \"{}\" submitted to Dean for review.",
        plan.subject
    )))
}

/// POST /teacher/courses/upload (multipart)
pub async fn upload_clp(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    session.require_role(&[Role::Teacher])?;
    let mut form = FormData::read(multipart).await?;
    let file = form.take_file("file");
    validate_plan_form(&state, &form, file.as_ref()).await?;

    let (upload_type, filename, content, note) = if let Some(file) = file {
        let path = store_upload(&state, &session.user_id, file).await?;
        (
            UploadType::FileUpload,
            Some(path),
            None,
            "Your CLP file has been uploaded as a draft!",
        )
    } else if form.non_blank("content").is_some() {
        (
            UploadType::ManualText,
            None,
            Some(form.text("content").to_string()),
            "Your CLP content has been saved as a draft!",
        )
    } else {
        return Err(ApiError::BadRequest(
            "Please provide either content or upload a file.".to_string(),
        ));
    };

    let plan = state
        .backends
        .store
        .insert_plan(&NewPlan {
            subject: form.text("subject").trim().to_string(),
            department: form.text("department").trim().to_string(),
            status: ClpStatus::Draft,
            upload_type,
            filename,
            content,
            user_id: session.user_id.clone(),
        })
        .await?;
    info!(plan_id = plan.id, upload_type = %upload_type, "Draft plan created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": note, "plan": plan })),
    ))
}

/// POST /teacher/courses/generate
pub async fn generate_clp(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    JsonBody(request): JsonBody<GenerateRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    session.require_role(&[Role::Teacher])?;
    let mut errors = FieldErrors::new();
    errors.length("subject_name", &request.subject_name, 5, 100);
    check_department(&state, &mut errors, &request.department).await?;
    check(errors)?;

    spawn_generation(
        state.backends.clone(),
        state.generator.clone(),
        GenerationRequest {
            user_id: session.user_id.clone(),
            subject_name: request.subject_name.trim().to_string(),
            department: request.department.trim().to_string(),
            course_data: request.course_data(),
        },
    );

    Ok((
        StatusCode::ACCEPTED,
        message("CLP generation started. This may take a moment. You will be notified when it is complete."),
    ))
}

/// GET /teacher/clp/:id
pub async fn view_clp(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let role = session.require_role(&[Role::Teacher, Role::Dean])?;
    let plan = load_plan(&state, id).await?;
    if role == Role::Teacher {
        require_owner(&session, &plan)?;
    }
    let content_data = plan.content_data();
    Ok(Json(json!({ "plan": plan, "content_data": content_data })))
}

/// GET /teacher/clp/:id/download
pub async fn download_clp(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    session.require_role(&[Role::Teacher, Role::Dean])?;
    let plan = load_plan(&state, id).await?;
    let path = match (&plan.upload_type, &plan.filename) {
        (UploadType::FileUpload, Some(path)) if !path.is_empty() => path.clone(),
        _ => return Err(ApiError::NotFound(NO_FILE.to_string())),
    };

    let bytes = state.backends.objects.download(&path).await.map_err(|e| {
        ApiError::NotFound(format!(
            "Error downloading file: {}. It may have been deleted from storage.",
            e
        ))
    })?;
    let disposition = format!("attachment; filename=\"{}\"", download_name(&path));
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// Owned, unlocked plan for editing
async fn editable_plan(state: &AppState, session: &Session, id: i64) -> ApiResult<CourseLearningPlan> {
    session.require_role(&[Role::Teacher])?;
    let plan = load_plan(state, id).await?;
    require_owner(session, &plan)?;
    if plan.status.is_locked() {
        return Err(ApiError::Conflict(format!(
            "This plan is currently \"{}\" and cannot be edited.",
            plan.status
        )));
    }
    Ok(plan)
}

/// GET /teacher/clp/:id/edit
pub async fn edit_form(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let plan = editable_plan(&state, &session, id).await?;
    let content = match plan.upload_type {
        UploadType::ManualText | UploadType::AiGenerated => plan.content.clone().unwrap_or_default(),
        UploadType::FileUpload => String::new(),
    };
    Ok(Json(json!({
        "department": plan.department,
        "subject": plan.subject,
        "content": content,
        "plan": plan,
    })))
}

/// POST /teacher/clp/:id/edit (multipart)
pub async fn edit_clp(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let plan = editable_plan(&state, &session, id).await?;
    let mut form = FormData::read(multipart).await?;
    let file = form.take_file("file");
    validate_plan_form(&state, &form, file.as_ref()).await?;

    let mut update = PlanUpdate {
        subject: Some(form.text("subject").trim().to_string()),
        department: Some(form.text("department").trim().to_string()),
        ..Default::default()
    };
    let mut new_file = None;
    if let Some(file) = file {
        let path = store_upload(&state, &session.user_id, file).await?;
        update.filename = Some(Some(path.clone()));
        update.content = Some(None);
        update.upload_type = Some(UploadType::FileUpload);
        new_file = Some(path);
    } else if form.non_blank("content").is_some() {
        update.content = Some(Some(form.text("content").to_string()));
        update.filename = Some(None);
        update.upload_type = Some(UploadType::ManualText);
    }

    if let Err(e) = state.backends.store.update_plan(id, &update).await {
        if let Some(path) = new_file {
            if let Err(cleanup) = state.backends.objects.remove(&[path]).await {
                warn!(plan_id = id, error = %cleanup, "Could not remove orphaned upload");
            }
        }
        return Err(e.into());
    }

    // The old file goes only once the row points elsewhere
    let replaced = match (&plan.filename, &update.filename) {
        (Some(old), Some(new)) if new.as_deref() != Some(old.as_str()) => Some(old.clone()),
        _ => None,
    };
    if let Some(old) = replaced {
        if let Err(e) = state.backends.objects.remove(&[old]).await {
            warn!(plan_id = id, error = %e, "Could not remove replaced plan file");
        }
    }
    Ok(message("Plan updated successfully!"))
}

/// POST /teacher/clp/:id/delete
pub async fn delete_clp(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    session.require_role(&[Role::Teacher])?;
    let plan = load_plan(&state, id).await?;
    if plan.user_id != session.user_id {
        return Err(ApiError::NotFound(PLAN_NOT_FOUND.to_string()));
    }
    if plan.status.is_locked() {
        return Err(ApiError::Conflict(format!(
            "Cannot delete a plan that is currently \"{}\".",
            plan.status
        )));
    }

    if let Some(path) = plan.filename.clone() {
        state.backends.objects.remove(&[path]).await?;
    }
    state.backends.store.delete_plan(id).await?;
    info!(plan_id = id, "Plan deleted");
    Ok(message("Your Course Learning Plan has been deleted."))
}

/// POST /teacher/clp/:id/delete_approved
pub async fn delete_approved_clp(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let role = session.require_role(&[Role::Teacher, Role::Dean])?;
    let plan = load_plan(&state, id).await?;
    if role == Role::Teacher && plan.user_id != session.user_id {
        return Err(ApiError::Forbidden(
            "You do not have permission to delete this plan.".to_string(),
        ));
    }

    if let Some(path) = plan.filename.clone() {
        if let Err(e) = state.backends.objects.remove(&[path]).await {
            warn!(plan_id = id, error = %e, "Error deleting file from storage");
        }
    }
    state.backends.store.delete_plan(id).await?;
    info!(plan_id = id, role = %role, "Approved plan deleted");
    Ok(message(format!(
        "Approved Course Learning Plan for '{}' has been deleted.",
        plan.subject
    )))
}

/// GET /teacher/clp/:id/editor
pub async fn editor(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let role = session.require_role(&[Role::Teacher, Role::Dean])?;
    let plan = load_plan(&state, id).await?;
    if role == Role::Teacher {
        require_owner(&session, &plan)?;
    }
    let path = match (&plan.upload_type, &plan.filename) {
        (UploadType::FileUpload, Some(path)) if !path.is_empty() => path.as_str(),
        _ => return Err(ApiError::NotFound(NO_FILE.to_string())),
    };

    let mode = if role == Role::Teacher && !plan.status.is_locked() {
        EditorMode::Edit
    } else {
        EditorMode::View
    };
    let title = download_name(path);
    let config = editor_config(
        &state.settings,
        &EditorDocument {
            path,
            plan_id: Some(plan.id),
            title: &title,
            mode,
            user_id: &session.user_id,
            user_name: &session.username,
        },
    )?;
    Ok(Json(config))
}

/// GET /teacher/profile
pub async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> ApiResult<Json<Value>> {
    session.require_role(&[Role::Teacher])?;
    profile(&state, &session).await
}

/// POST /teacher/profile
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    JsonBody(request): JsonBody<ChangePasswordRequest>,
) -> ApiResult<Json<Value>> {
    session.require_role(&[Role::Teacher])?;
    change_password(&state, &session, &request).await
}

/// Build teacher routes (nested under /teacher)
pub fn teacher_routes() -> Router<AppState> {
    Router::new()
        .route("/my_clps", get(my_clps))
        .route("/all_clps", get(all_clps))
        .route("/submit_to_dean/:id", post(submit_to_dean))
        .route("/courses/upload", post(upload_clp))
        .route("/courses/generate", post(generate_clp))
        .route("/clp/:id", get(view_clp))
        .route("/clp/:id/download", get(download_clp))
        .route("/clp/:id/edit", get(edit_form).post(edit_clp))
        .route("/clp/:id/delete", post(delete_clp))
        .route("/clp/:id/delete_approved", post(delete_approved_clp))
        .route("/clp/:id/editor", get(editor))
        .route("/profile", get(get_profile).post(update_profile))
}
