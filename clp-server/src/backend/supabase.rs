//! Shared HTTP plumbing for the Supabase REST, auth and storage APIs

use std::time::Duration;

use clp_common::config::SupabaseSettings;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;

use super::{BackendError, BackendResult};

/// Default timeout for Supabase API requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection to one Supabase project
#[derive(Clone)]
pub struct SupabaseClient {
    http: Client,
    base_url: String,
    anon_key: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(settings: &SupabaseSettings) -> BackendResult<Self> {
        let http = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self::with_http(http, settings))
    }

    pub fn with_http(http: Client, settings: &SupabaseSettings) -> Self {
        Self {
            http,
            base_url: settings.url.trim_end_matches('/').to_string(),
            anon_key: settings.anon_key.clone(),
            service_key: settings.service_key.clone(),
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// `{url}/rest/v1/{table}`
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// `{url}/auth/v1/{path}`
    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// `{url}/storage/v1/{path}`
    pub fn storage_url(&self, path: &str) -> String {
        format!("{}/storage/v1/{}", self.base_url, path)
    }

    /// Service-role credentials (bypasses row-level security)
    pub fn as_service(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// Public anon credentials
    pub fn as_anon(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    /// Anon key plus a signed-in user's access token
    pub fn as_user(&self, builder: RequestBuilder, access_token: &str) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
    }
}

/// Pass successful responses through; map error statuses to `BackendError`
pub async fn check(response: Response) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let parsed: Option<Value> = serde_json::from_str(&body).ok();
    let message = parsed
        .as_ref()
        .and_then(error_message)
        .unwrap_or_else(|| body.clone());
    let pg_code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Err(match status {
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        StatusCode::CONFLICT => BackendError::Conflict(message),
        // Unique violation reported by PostgREST
        _ if pg_code == "23505" => BackendError::Conflict(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            BackendError::InvalidInput(message)
        }
        other => BackendError::Service {
            status: other.as_u16(),
            message,
        },
    })
}

/// Pull a human-readable message from the error shapes used by PostgREST,
/// GoTrue and Storage
fn error_message(value: &Value) -> Option<String> {
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> SupabaseClient {
        SupabaseClient::with_http(
            Client::new(),
            &SupabaseSettings {
                url: "https://proj.supabase.co/".to_string(),
                anon_key: "anon".to_string(),
                service_key: "service".to_string(),
                bucket: "clp_files".to_string(),
            },
        )
    }

    #[test]
    fn test_urls() {
        let c = client();
        assert_eq!(c.rest_url("users"), "https://proj.supabase.co/rest/v1/users");
        assert_eq!(
            c.auth_url("token?grant_type=password"),
            "https://proj.supabase.co/auth/v1/token?grant_type=password"
        );
        assert_eq!(
            c.storage_url("object/clp_files/a.docx"),
            "https://proj.supabase.co/storage/v1/object/clp_files/a.docx"
        );
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(&json!({"message": "duplicate key"})).as_deref(),
            Some("duplicate key")
        );
        assert_eq!(
            error_message(&json!({"error_description": "Invalid login credentials"})).as_deref(),
            Some("Invalid login credentials")
        );
        assert_eq!(error_message(&json!({"other": 1})), None);
    }
}
