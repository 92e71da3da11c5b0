//! Shared harness for clp-server integration tests
//!
//! Builds the real router over the local backends: SQLite on
//! `sqlite::memory:` and an object store rooted in a temp directory. The
//! text generator replays scripted responses.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use clp_common::config::{BackendKind, Settings, TomlConfig};
use clp_common::models::{NewUser, Role};
use clp_server::ai::{AiError, TextGenerator};
use clp_server::backend::{Backends, LocalObjectStore, ObjectStore, SqliteStore};
use clp_server::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{Map, Value};
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const PASSWORD: &str = "correct-horse";
pub const IT_DEPARTMENT: &str = "Department of Information Technology";

/// Generator answering each call with the next scripted result
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<Map<String, Value>, AiError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<Map<String, Value>, AiError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_json(&self, prompt: &str, _schema: &Value) -> Result<Map<String, Value>, AiError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::Service("no scripted response left".to_string())))
    }
}

/// JSON object literal helper
pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

pub fn test_settings(per_hour: u32) -> Settings {
    let mut config = TomlConfig::default();
    config.secret_key = Some("integration-secret".to_string());
    config.gemini.api_key = Some("unused".to_string());
    config.backend.kind = BackendKind::Local;
    config.editor.document_server_url = "http://docs.test".to_string();
    config.editor.public_base_url = "http://clp.test".to_string();
    config.rate_limit.per_hour = per_hour;
    config.rate_limit.per_day = 0;
    config.into_settings().unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub generator: Arc<ScriptedGenerator>,
    _storage: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with(ScriptedGenerator::default(), 0).await
    }

    pub async fn with(generator: ScriptedGenerator, per_hour: u32) -> Self {
        Self::with_settings(generator, test_settings(per_hour)).await
    }

    pub async fn with_settings(generator: ScriptedGenerator, settings: Settings) -> Self {
        Self::build(generator, settings, |objects| Arc::new(objects)).await
    }

    /// Default app whose object store is wrapped by `wrap`
    pub async fn with_object_store<F>(wrap: F) -> Self
    where
        F: FnOnce(LocalObjectStore) -> Arc<dyn ObjectStore>,
    {
        Self::build(ScriptedGenerator::default(), test_settings(0), wrap).await
    }

    async fn build<F>(generator: ScriptedGenerator, settings: Settings, wrap: F) -> Self
    where
        F: FnOnce(LocalObjectStore) -> Arc<dyn ObjectStore>,
    {
        let storage = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let objects = LocalObjectStore::new(storage.path()).await.unwrap();
        let backends = Backends {
            store: store.clone(),
            auth: store,
            objects: wrap(objects),
        };
        let generator = Arc::new(generator);
        let state = AppState::new(settings, backends, generator.clone()).unwrap();
        Self {
            router: build_router(state.clone()),
            state,
            generator,
            _storage: storage,
        }
    }

    pub fn backends(&self) -> &Backends {
        &self.state.backends
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    /// Create an auth user plus profile; returns the user id
    pub async fn create_user(&self, username: &str, role: Role, approved: bool) -> String {
        let email = format!("{}@school.edu", username);
        let id = self.backends().auth.sign_up(&email, PASSWORD).await.unwrap();
        self.backends()
            .store
            .insert_user(&NewUser {
                id: id.clone(),
                username: username.to_string(),
                first_name: "Ana".to_string(),
                last_name: "Cruz".to_string(),
                email,
                title: Some("MIT".to_string()),
                role,
                approved,
                assigned_department: Some(IT_DEPARTMENT.to_string()),
            })
            .await
            .unwrap();
        id
    }

    /// Log in and return the `name=value` cookie pair
    pub async fn login(&self, username: &str) -> String {
        let request = json_request(
            "POST",
            "/login",
            None,
            serde_json::json!({ "email": format!("{}@school.edu", username), "password": PASSWORD }),
        );
        let response = self.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("session cookie")
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    /// Approved user of `role`, logged in
    pub async fn user_session(&self, username: &str, role: Role) -> (String, String) {
        let id = self.create_user(username, role, true).await;
        let cookie = self.login(username).await;
        (id, cookie)
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_empty(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

const BOUNDARY: &str = "clp-test-boundary";

/// multipart/form-data request with text fields and at most one file
pub fn multipart_request(
    uri: &str,
    cookie: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((name, filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .header(header::COOKIE, cookie)
        .body(Body::from(body))
        .unwrap()
}
