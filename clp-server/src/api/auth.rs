//! Login, registration and logout

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clp_common::models::{NewUser, Role};
use clp_common::validation::FieldErrors;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::api::{check, message, JsonBody};
use crate::backend::BackendError;
use crate::error::{ApiError, ApiResult};
use crate::session::{clear_cookie, session_cookie, MaybeUser, Session};
use crate::AppState;

pub const INVALID_CREDENTIALS: &str = "Invalid email or password.";
pub const PENDING_APPROVAL: &str = "Your account is pending approval.";
pub const DUPLICATE_USER: &str =
    "Username or email already exists. Please choose a different one or login.";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub title: Option<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    pub department: Option<String>,
}

fn session_body(session: &Session, message: &str) -> serde_json::Value {
    let home = session.role().map(|r| r.home_path()).unwrap_or("/dashboard");
    json!({
        "message": message,
        "user_id": session.user_id,
        "username": session.username,
        "role": session.role,
        "home": home,
    })
}

/// GET /
pub async fn index(MaybeUser(session): MaybeUser) -> Json<serde_json::Value> {
    let home = if session.is_some() { "/dashboard" } else { "/login" };
    Json(json!({ "authenticated": session.is_some(), "home": home }))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
    JsonBody(request): JsonBody<LoginRequest>,
) -> ApiResult<Response> {
    if let Some(session) = current {
        return Ok(Json(session_body(&session, "Already logged in.")).into_response());
    }

    let mut errors = FieldErrors::new();
    errors.email(&request.email);
    if request.password.is_empty() {
        errors.add("password", "This field is required.");
    }
    check(errors)?;

    let signed_in = match state
        .backends
        .auth
        .sign_in(request.email.trim(), &request.password)
        .await
    {
        Ok(signed_in) => signed_in,
        Err(BackendError::Unauthorized(reason)) | Err(BackendError::InvalidInput(reason)) => {
            info!(email = %request.email, %reason, "Login rejected");
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let profile = state
        .backends
        .store
        .get_user(&signed_in.user_id)
        .await?
        .ok_or_else(|| ApiError::Forbidden("User profile not found or not approved.".to_string()))?;
    if !profile.approved {
        return Err(ApiError::Forbidden(PENDING_APPROVAL.to_string()));
    }

    let session = Session {
        user_id: profile.id.clone(),
        role: profile.role.clone(),
        username: profile.username.clone(),
        access_token: Some(signed_in.access_token),
    };
    let cookie = session_cookie(&session, &state.settings.secret_key)?;
    info!(user_id = %session.user_id, role = %session.role, "User logged in");

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(session_body(&session, "Login successful!")),
    )
        .into_response())
}

/// POST /signup
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<SignupRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let department = request
        .department
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());
    let title = request
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let mut errors = FieldErrors::new();
    errors.length("first_name", &request.first_name, 1, 80);
    errors.length("last_name", &request.last_name, 1, 80);
    errors.username(&request.username);
    errors.email(&request.email);
    errors.max_length("title", title, 50);
    errors.password_pair(
        "password",
        &request.password,
        &request.confirm_password,
        "Passwords must match.",
    );
    if let Some(name) = department {
        let departments = state.backends.store.list_departments().await?;
        if !departments.iter().any(|d| d.name == name) {
            errors.add("department", "Not a valid choice.");
        }
    }
    check(errors)?;

    let username = request.username.trim();
    let email = request.email.trim();
    if state.backends.store.user_exists(username, email).await? {
        return Err(ApiError::Conflict(DUPLICATE_USER.to_string()));
    }

    let user_id = state
        .backends
        .auth
        .sign_up(email, &request.password)
        .await
        .map_err(|e| match e {
            BackendError::Conflict(_) => ApiError::Conflict(DUPLICATE_USER.to_string()),
            other => {
                warn!(error = %other, "Could not create authentication user");
                ApiError::Internal(
                    "Could not create authentication user. Please try again.".to_string(),
                )
            }
        })?;

    let profile = state
        .backends
        .store
        .insert_user(&NewUser {
            id: user_id,
            username: username.to_string(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            email: email.to_string(),
            title: title.map(str::to_string),
            role: Role::Teacher,
            approved: false,
            assigned_department: department.map(str::to_string),
        })
        .await?;
    info!(user_id = %profile.id, username = %profile.username, "New user registered");

    Ok((
        StatusCode::CREATED,
        message("Registration successful! Your account is pending administrator approval."),
    ))
}

/// POST /logout
pub async fn logout(
    State(state): State<AppState>,
    MaybeUser(session): MaybeUser,
) -> impl IntoResponse {
    if let Some(token) = session.as_ref().and_then(|s| s.access_token.as_deref()) {
        if let Err(e) = state.backends.auth.sign_out(token).await {
            warn!(error = %e, "Auth provider sign-out failed");
        }
    }
    (
        [(header::SET_COOKIE, clear_cookie())],
        message("You have been logged out."),
    )
}

/// Build authentication routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/login", post(login))
        .route("/signup", post(signup))
        .route("/logout", post(logout))
}
