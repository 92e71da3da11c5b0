//! clp-server library interface
//!
//! Exposes the router and application state for the binary and for
//! integration tests.

pub mod ai;
pub mod api;
pub mod backend;
pub mod docx;
pub mod error;
pub mod middleware;
pub mod services;
pub mod session;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, Utc};
use clp_common::config::Settings;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::ai::TextGenerator;
use crate::backend::Backends;
use crate::middleware::RateLimiter;

/// Timeout for fetching saved documents from the document server
const EDITOR_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Datastore, auth provider and object store
    pub backends: Backends,
    /// Model used by the plan generation task
    pub generator: Arc<dyn TextGenerator>,
    /// Client for document-server downloads
    pub http: reqwest::Client,
    pub limiter: Arc<RateLimiter>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        backends: Backends,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, reqwest::Error> {
        // Saved documents must come from the document server itself
        let http = reqwest::Client::builder()
            .timeout(EDITOR_DOWNLOAD_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let limiter = Arc::new(RateLimiter::new(&settings.rate_limit));
        Ok(Self {
            settings: Arc::new(settings),
            backends,
            generator,
            http,
            limiter,
            startup_time: Utc::now(),
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let csp = middleware::content_security_policy(&state.settings);
    let body_limit = state.settings.server.max_body_bytes;

    let router = Router::new()
        .merge(api::health_routes())
        .merge(api::auth_routes())
        .merge(api::dashboard_routes())
        .nest("/teacher", api::teacher_routes())
        .nest("/dean", api::dean_routes())
        .nest("/admin", api::admin_routes())
        .merge(api::editor_routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    middleware::with_security_headers(router, &csp)
}
