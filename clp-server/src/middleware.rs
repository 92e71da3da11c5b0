//! Security headers and per-client rate limiting

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
    Router,
};
use clp_common::config::{RateLimitConfig, Settings};
use governor::{DefaultKeyedRateLimiter, Quota};
use tokio::task::JoinHandle;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::AppState;

pub const RATE_LIMIT_MESSAGE: &str = "You have exceeded the rate limit. Please try again later.";

/// How often clients with refilled budgets are forgotten
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Keyed by client IP: an hourly and a daily budget, both must allow
pub struct RateLimiter {
    hourly: Option<DefaultKeyedRateLimiter<IpAddr>>,
    daily: Option<DefaultKeyedRateLimiter<IpAddr>>,
}

impl RateLimiter {
    /// A zero budget disables that window
    pub fn new(config: &RateLimitConfig) -> Self {
        let hourly = NonZeroU32::new(config.per_hour)
            .map(|n| DefaultKeyedRateLimiter::keyed(Quota::per_hour(n)));
        let daily = NonZeroU32::new(config.per_day).and_then(|n| {
            Quota::with_period(Duration::from_secs(24 * 60 * 60) / n.get())
                .map(|q| DefaultKeyedRateLimiter::keyed(q.allow_burst(n)))
        });
        Self { hourly, daily }
    }

    /// Count one request; false when either window is exhausted
    ///
    /// The daily window goes first, so a client whose day is spent does
    /// not also drain its hourly budget.
    pub fn check(&self, ip: IpAddr) -> bool {
        let within = |limiter: &Option<DefaultKeyedRateLimiter<IpAddr>>| {
            limiter
                .as_ref()
                .map(|l| l.check_key(&ip).is_ok())
                .unwrap_or(true)
        };
        within(&self.daily) && within(&self.hourly)
    }

    fn windows(&self) -> impl Iterator<Item = &DefaultKeyedRateLimiter<IpAddr>> {
        self.hourly.iter().chain(self.daily.iter())
    }

    /// Drop clients whose budgets have fully refilled
    pub fn prune(&self) {
        for limiter in self.windows() {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    /// Clients currently holding state in any window
    pub fn tracked_clients(&self) -> usize {
        self.windows().map(|l| l.len()).max().unwrap_or(0)
    }
}

/// Prune `limiter` every [`PRUNE_INTERVAL`] until the runtime shuts down
pub fn spawn_pruning(limiter: Arc<RateLimiter>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            limiter.prune();
            debug!(clients = limiter.tracked_clients(), "Pruned rate limiter state");
        }
    })
}

/// Health and document-server endpoints are not limited
fn is_exempt(path: &str) -> bool {
    path == "/health" || path.starts_with("/editor/")
}

fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Rate limiting middleware
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !is_exempt(request.uri().path()) {
        let ip = client_ip(&request);
        if !state.limiter.check(ip) {
            warn!(%ip, path = %request.uri().path(), "Rate limit exceeded");
            return Err(ApiError::RateLimited(RATE_LIMIT_MESSAGE.to_string()));
        }
    }
    Ok(next.run(request).await)
}

/// Content-Security-Policy admitting the document server, the Supabase
/// project and the Gemini endpoint
pub fn content_security_policy(settings: &Settings) -> String {
    let editor = settings.editor.document_server_url.trim_end_matches('/');
    let editor_ws = editor
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    let supabase = settings.supabase_url().unwrap_or_default();
    let gemini = settings.gemini.base_url.trim_end_matches('/');
    let public = settings.editor.public_base_url.trim_end_matches('/');

    [
        "default-src 'self'".to_string(),
        format!("script-src 'self' 'unsafe-inline' 'unsafe-eval' {}", editor),
        format!("style-src 'self' 'unsafe-inline' {}", editor),
        format!("font-src 'self' data: {}", editor),
        format!("img-src 'self' data: blob: {}", editor),
        format!(
            "connect-src 'self' {} {} {} {} {}",
            gemini, supabase, editor, public, editor_ws
        ),
        format!("frame-src 'self' {}", editor),
        format!("worker-src 'self' blob: {}", editor),
        format!("child-src 'self' blob: {}", editor),
        "object-src 'none'".to_string(),
        "frame-ancestors 'self'".to_string(),
        "form-action 'self'".to_string(),
        "base-uri 'self'".to_string(),
    ]
    .iter()
    .map(|d| d.split_whitespace().collect::<Vec<_>>().join(" "))
    .collect::<Vec<_>>()
    .join("; ")
        + ";"
}

/// Attach cache-control and security headers to every response
pub fn with_security_headers(router: Router, csp: &str) -> Router {
    let csp = HeaderValue::from_str(csp).unwrap_or_else(|_| {
        warn!("Content-Security-Policy is not a valid header value, using default-src only");
        HeaderValue::from_static("default-src 'self';")
    });
    let headers: [(HeaderName, HeaderValue); 8] = [
        (
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ),
        (header::PRAGMA, HeaderValue::from_static("no-cache")),
        (header::EXPIRES, HeaderValue::from_static("0")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN")),
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ),
        (header::CONTENT_SECURITY_POLICY, csp),
        (
            HeaderName::from_static("x-permitted-cross-domain-policies"),
            HeaderValue::from_static("none"),
        ),
    ];
    headers.into_iter().fold(router, |router, (name, value)| {
        router.layer(SetResponseHeaderLayer::overriding(name, value))
    })
}
