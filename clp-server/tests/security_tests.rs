//! Response headers and per-client rate limiting

mod common;

use axum::http::{header, StatusCode};
use clp_common::models::Role;
use clp_server::middleware::RATE_LIMIT_MESSAGE;
use common::*;
use tower::util::ServiceExt;

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let app = TestApp::new().await;
    for uri in ["/health", "/", "/teacher/my_clps", "/no/such/route"] {
        let response = app.router.clone().oneshot(get(uri, None)).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN", "{}", uri);
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(headers[header::REFERRER_POLICY], "strict-origin-when-cross-origin");
        let csp = headers[header::CONTENT_SECURITY_POLICY].to_str().unwrap();
        assert!(csp.contains("frame-src 'self' http://docs.test"));
        assert!(csp.contains("connect-src 'self'"));
        assert!(csp.contains("ws://docs.test"));
    }
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let app = TestApp::with(ScriptedGenerator::default(), 2).await;

    for _ in 0..2 {
        let (status, _) = app.send(get("/", None)).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = app.send(get("/", None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["message"], RATE_LIMIT_MESSAGE);

    // Health checks and document-server traffic are never limited
    let (status, _) = app.send(get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(get("/editor/files?token=x", None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let app = TestApp::new().await;
    let limit = app.state.settings.server.max_body_bytes;
    let (_, teacher) = app.user_session("anacruz", Role::Teacher).await;
    let payload = vec![b'a'; limit + 1];
    let response = app
        .router
        .clone()
        .oneshot(multipart_request(
            "/teacher/courses/upload",
            &teacher,
            &[("department", IT_DEPARTMENT), ("subject", "Networking")],
            Some(("file", "big.docx", payload.as_slice())),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
