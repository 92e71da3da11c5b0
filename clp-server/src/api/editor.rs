//! ONLYOFFICE document-server integration
//!
//! The browser editor loads documents from `/editor/files` and reports saves
//! to `/editor/callback`. Both URLs carry a signed token naming the storage
//! path, so the document server never needs a session. Only edit-mode
//! configs carry a callback URL, and only their tokens may save.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clp_common::config::Settings;
use clp_common::files::content_type_for;
use clp_common::signing;
use clp_common::time::now;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Payload of editor file and callback tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorGrant {
    pub path: String,
    /// Issued for an edit-mode session
    #[serde(default)]
    pub writable: bool,
    /// Plan owning `path`; `None` for the shared template
    #[serde(default)]
    pub plan_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Edit,
    View,
}

impl EditorMode {
    fn as_str(&self) -> &'static str {
        match self {
            EditorMode::Edit => "edit",
            EditorMode::View => "view",
        }
    }
}

/// Document opened in the browser editor
#[derive(Debug)]
pub struct EditorDocument<'a> {
    pub path: &'a str,
    pub plan_id: Option<i64>,
    pub title: &'a str,
    pub mode: EditorMode,
    pub user_id: &'a str,
    pub user_name: &'a str,
}

/// What a callback status asks of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// 2 (ready for saving) and 6 (force save)
    Save,
    /// 1 (being edited) and 4 (closed without changes)
    Acknowledge,
    Reject,
}

impl CallbackAction {
    pub fn for_status(status: i64) -> Self {
        match status {
            2 | 6 => CallbackAction::Save,
            1 | 4 => CallbackAction::Acknowledge,
            _ => CallbackAction::Reject,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub status: i64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

/// Document key: changes whenever a new editor session is issued
fn document_key(path: &str, issued_at: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(issued_at.to_be_bytes());
    hasher
        .finalize()
        .iter()
        .take(16)
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn file_type(path: &str) -> String {
    path.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "docx".to_string())
}

/// Editor configuration handed to the ONLYOFFICE `DocEditor` script
pub fn editor_config(settings: &Settings, document: &EditorDocument<'_>) -> ApiResult<Value> {
    let issued_at = now();
    let writable = document.mode == EditorMode::Edit;
    let token = signing::sign(
        &EditorGrant {
            path: document.path.to_string(),
            writable,
            plan_id: document.plan_id,
        },
        &settings.secret_key,
        settings.editor.token_ttl_secs,
        issued_at,
    )?;
    let public = settings.editor.public_base_url.trim_end_matches('/');
    let server = settings.editor.document_server_url.trim_end_matches('/');
    let file_type = file_type(document.path);
    let document_type = if file_type == "pdf" { "pdf" } else { "word" };

    let mut config = json!({
        "api_url": format!("{}/web-apps/apps/api/documents/api.js", server),
        "config": {
            "document": {
                "fileType": file_type,
                "key": document_key(document.path, issued_at.timestamp()),
                "title": document.title,
                "url": format!("{}/editor/files?token={}", public, token),
            },
            "documentType": document_type,
            "editorConfig": {
                "mode": document.mode.as_str(),
                "lang": "en",
                "user": {
                    "id": document.user_id,
                    "name": document.user_name,
                },
            },
        },
    });
    if writable {
        config["config"]["editorConfig"]["callbackUrl"] =
            json!(format!("{}/editor/callback?token={}", public, token));
    }
    Ok(config)
}

fn verify_grant(settings: &Settings, token: Option<&str>) -> Option<EditorGrant> {
    let token = token?;
    match signing::verify::<EditorGrant>(token, &settings.secret_key, now()) {
        Ok(grant) => Some(grant),
        Err(e) => {
            warn!(error = %e, "Rejected editor token");
            None
        }
    }
}

/// GET /editor/files?token=...
pub async fn serve_file(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<impl IntoResponse> {
    let grant = verify_grant(&state.settings, query.token.as_deref())
        .ok_or_else(|| ApiError::Forbidden("Invalid or expired editor token.".to_string()))?;
    let bytes = state.backends.objects.download(&grant.path).await?;
    Ok((
        [(header::CONTENT_TYPE, content_type_for(&grant.path))],
        bytes,
    ))
}

/// True when `url` points at the configured document server
fn from_document_server(settings: &Settings, url: &str) -> bool {
    match (
        Url::parse(url),
        Url::parse(&settings.editor.document_server_url),
    ) {
        (Ok(url), Ok(server)) => url.origin() == server.origin(),
        _ => false,
    }
}

/// A save must target the plan's current file while the plan is unlocked
async fn save_allowed(state: &AppState, grant: &EditorGrant) -> Result<(), String> {
    if !grant.writable {
        return Err("read-only editor token".to_string());
    }
    let Some(plan_id) = grant.plan_id else {
        return Ok(());
    };
    let plan = state
        .backends
        .store
        .get_plan(plan_id)
        .await
        .map_err(|e| format!("plan lookup failed: {}", e))?
        .ok_or_else(|| format!("plan {} no longer exists", plan_id))?;
    if plan.status.is_locked() {
        return Err(format!("plan {} is {}", plan_id, plan.status));
    }
    if plan.filename.as_deref() != Some(grant.path.as_str()) {
        return Err(format!("plan {} no longer uses this file", plan_id));
    }
    Ok(())
}

async fn save_from_url(state: &AppState, path: &str, url: &str) -> Result<usize, String> {
    if !from_document_server(&state.settings, url) {
        return Err(format!("refusing download from {}", url));
    }
    let response = state
        .http
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| format!("download failed: {}", e))?;
    if !response.status().is_success() {
        return Err(format!("download answered {}", response.status()));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| format!("download failed: {}", e))?;
    let size = bytes.len();
    state
        .backends
        .objects
        .upload(path, bytes.to_vec(), content_type_for(path), true)
        .await
        .map_err(|e| format!("upload failed: {}", e))?;
    Ok(size)
}

/// POST /editor/callback?token=...
///
/// Always answers 200 with `{"error": 0}` or `{"error": 1}`.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Json<Value> {
    let failed = Json(json!({ "error": 1 }));

    let Some(grant) = verify_grant(&state.settings, query.token.as_deref()) else {
        return failed;
    };
    let request: CallbackRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(path = %grant.path, error = %e, "Malformed editor callback");
            return failed;
        }
    };

    match CallbackAction::for_status(request.status) {
        CallbackAction::Acknowledge => Json(json!({ "error": 0 })),
        CallbackAction::Reject => {
            warn!(path = %grant.path, status = request.status, key = ?request.key, "Editor reported an error");
            failed
        }
        CallbackAction::Save => {
            let Some(url) = request.url.as_deref().filter(|u| !u.is_empty()) else {
                warn!(path = %grant.path, "Save callback without a download URL");
                return failed;
            };
            if let Err(reason) = save_allowed(&state, &grant).await {
                warn!(path = %grant.path, reason = %reason, "Rejected editor save");
                return failed;
            }
            match save_from_url(&state, &grant.path, url).await {
                Ok(size) => {
                    info!(path = %grant.path, size, status = request.status, "Saved document from editor");
                    Json(json!({ "error": 0 }))
                }
                Err(e) => {
                    error!(path = %grant.path, error = %e, "Could not save edited document");
                    failed
                }
            }
        }
    }
}

/// Build document-server routes
pub fn editor_routes() -> Router<AppState> {
    Router::new()
        .route("/editor/files", get(serve_file))
        .route("/editor/callback", post(callback))
}
