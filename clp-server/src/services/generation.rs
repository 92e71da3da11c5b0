//! AI plan generation background task
//!
//! Three structured generation steps (program→institutional matrix,
//! course→program matrix, weekly breakdown) run in sequence with no retries.
//! Their objects are merged with the teacher's course details, recorded as a
//! draft plan, rendered into the DOCX template and stored. The teacher gets
//! exactly one notification describing the outcome.

use std::sync::Arc;

use clp_common::config::TEMPLATE_KEY;
use clp_common::files::{generated_path, DOCX_CONTENT_TYPE};
use clp_common::flatten::{flatten_json, merge_into};
use clp_common::models::{ClpStatus, NewPlan, PlanUpdate, PromptKind, UploadType};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::ai::{prompts, AiError, TextGenerator};
use crate::backend::{BackendError, Backends};
use crate::docx;

/// What the teacher asked for
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub user_id: String,
    pub subject_name: String,
    pub department: String,
    /// User-supplied course details; these win over generated values
    pub course_data: Map<String, Value>,
}

/// Failure categories, each with its own notification
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0}")]
    TemplateMissing(String),

    #[error("AI generation failed (Blocked): {0}")]
    Blocked(String),

    #[error("AI generation failed ({step}): {message}")]
    AiService { step: PromptKind, message: String },

    #[error("{0}")]
    Other(String),
}

impl From<BackendError> for GenerationError {
    fn from(err: BackendError) -> Self {
        GenerationError::Other(err.to_string())
    }
}

impl From<docx::DocxError> for GenerationError {
    fn from(err: docx::DocxError) -> Self {
        GenerationError::Other(err.to_string())
    }
}

impl GenerationError {
    fn from_ai(step: PromptKind, err: AiError) -> Self {
        match err {
            AiError::Blocked(message) => GenerationError::Blocked(message),
            other => GenerationError::AiService {
                step,
                message: other.to_string(),
            },
        }
    }

    /// Notification text shown to the teacher
    pub fn notification(&self, subject_name: &str) -> String {
        match self {
            GenerationError::TemplateMissing(detail) => format!(
                "CLP generation for \"{}\" failed: {}. Please contact an administrator.",
                subject_name, detail
            ),
            GenerationError::Blocked(_) => {
                "CLP generation failed due to AI content policy. Please try a different subject."
                    .to_string()
            }
            GenerationError::AiService { .. } => {
                "CLP generation failed due to an AI service error. Please try again later."
                    .to_string()
            }
            GenerationError::Other(_) => format!(
                "CLP generation for \"{}\" failed unexpectedly. An administrator has been notified.",
                subject_name
            ),
        }
    }
}

pub fn success_notification(subject: &str) -> String {
    format!(
        "Your AI-generated CLP for \"{}\" is ready and saved as a downloadable file.",
        subject
    )
}

/// Run generation in the background
pub fn spawn_generation(
    backends: Backends,
    generator: Arc<dyn TextGenerator>,
    request: GenerationRequest,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            user_id = %request.user_id,
            subject = %request.subject_name,
            "Background CLP generation task started"
        );
        run_generation(&backends, generator.as_ref(), &request).await;
    })
}

/// Generate, store and notify; returns the plan id on success
pub async fn run_generation(
    backends: &Backends,
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
) -> Option<i64> {
    let mut plan_id = None;
    let result = generate(backends, generator, request, &mut plan_id).await;

    let message = match &result {
        Ok(subject) => {
            info!(
                user_id = %request.user_id,
                subject = %subject,
                plan_id = ?plan_id,
                "CLP generation completed"
            );
            success_notification(subject)
        }
        Err(e) => {
            error!(
                user_id = %request.user_id,
                subject = %request.subject_name,
                plan_id = ?plan_id,
                error = %e,
                "CLP generation failed"
            );
            if let Some(id) = plan_id {
                if let Err(update_err) = backends
                    .store
                    .update_plan(id, &PlanUpdate::status(ClpStatus::Failed))
                    .await
                {
                    warn!(plan_id = id, error = %update_err, "Could not mark plan as failed");
                }
            }
            e.notification(&request.subject_name)
        }
    };

    if let Err(e) = backends
        .store
        .insert_notification(&request.user_id, &message)
        .await
    {
        error!(user_id = %request.user_id, error = %e, "Failed to create notification");
    }

    result.ok().and(plan_id)
}

/// Stored prompt for a step, falling back to the built-in one
async fn effective_template(backends: &Backends, kind: PromptKind) -> String {
    match backends.store.get_prompt(kind).await {
        Ok(Some(setting)) if !setting.template.trim().is_empty() => setting.template,
        Ok(_) => prompts::default_template(kind).to_string(),
        Err(e) => {
            warn!(kind = %kind, error = %e, "Prompt lookup failed, using built-in prompt");
            prompts::default_template(kind).to_string()
        }
    }
}

async fn generate(
    backends: &Backends,
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
    plan_id: &mut Option<i64>,
) -> Result<String, GenerationError> {
    let mut data = Map::new();
    for kind in PromptKind::ALL {
        info!(user_id = %request.user_id, step = %kind, "Generating");
        let template = effective_template(backends, kind).await;
        let prompt = prompts::render(&template, &request.subject_name);
        let part = generator
            .generate_json(&prompt, &prompts::schema(kind))
            .await
            .map_err(|e| GenerationError::from_ai(kind, e))?;
        merge_into(&mut data, part);
    }
    merge_into(&mut data, request.course_data.clone());

    let profile = backends
        .store
        .get_user(&request.user_id)
        .await?
        .ok_or_else(|| {
            GenerationError::Other(format!("User profile not found for user_id: {}", request.user_id))
        })?;
    data.insert("NAME".to_string(), Value::String(profile.full_name()));
    data.insert(
        "TITLE".to_string(),
        Value::String(profile.title.clone().unwrap_or_default()),
    );

    let subject = data
        .get("descriptive_title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(request.subject_name.as_str())
        .to_string();
    let content = serde_json::to_string_pretty(&data)
        .map_err(|e| GenerationError::Other(format!("Failed to serialize plan data: {}", e)))?;

    let plan = backends
        .store
        .insert_plan(&NewPlan {
            subject: subject.clone(),
            department: request.department.clone(),
            status: ClpStatus::Draft,
            upload_type: UploadType::AiGenerated,
            filename: None,
            content: Some(content),
            user_id: request.user_id.clone(),
        })
        .await?;
    *plan_id = Some(plan.id);
    info!(plan_id = plan.id, subject = %subject, "Inserted generated plan, rendering document");

    let template = backends.objects.download(TEMPLATE_KEY).await.map_err(|e| {
        GenerationError::TemplateMissing(format!(
            "Critical Error: Could not fetch template '{}' from storage ({})",
            TEMPLATE_KEY, e
        ))
    })?;
    let document = docx::fill_template(&template, &flatten_json(&data))?;

    let path = generated_path(&request.user_id, &plan.subject, plan.id);
    backends
        .objects
        .upload(&path, document, DOCX_CONTENT_TYPE, true)
        .await?;

    backends
        .store
        .update_plan(
            plan.id,
            &PlanUpdate {
                filename: Some(Some(path)),
                upload_type: Some(UploadType::FileUpload),
                content: Some(None),
                ..Default::default()
            },
        )
        .await?;

    Ok(subject)
}
