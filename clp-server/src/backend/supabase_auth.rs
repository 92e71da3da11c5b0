//! Supabase auth (GoTrue) client

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::supabase::{check, SupabaseClient};
use super::{AuthProvider, AuthSession, BackendError, BackendResult};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

pub struct SupabaseAuth {
    client: SupabaseClient,
}

impl SupabaseAuth {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

/// Signup answers with either the user object or a session wrapping it
fn signup_user_id(body: &Value) -> Option<String> {
    body.get("user")
        .and_then(|u| u.get("id"))
        .or_else(|| body.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
        debug!(email, "GoTrue password sign-in");
        let request = self
            .client
            .http()
            .post(self.client.auth_url("token?grant_type=password"))
            .json(&json!({"email": email, "password": password}));
        let response = match check(self.client.as_anon(request).send().await?).await {
            Ok(response) => response,
            // GoTrue reports bad credentials as 400 invalid_grant
            Err(BackendError::InvalidInput(message)) => {
                return Err(BackendError::Unauthorized(message))
            }
            Err(e) => return Err(e),
        };
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(AuthSession {
            user_id: token.user.id,
            access_token: token.access_token,
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<String> {
        debug!(email, "GoTrue sign-up");
        let request = self
            .client
            .http()
            .post(self.client.auth_url("signup"))
            .json(&json!({"email": email, "password": password}));
        let response = check(self.client.as_anon(request).send().await?).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        signup_user_id(&body)
            .ok_or_else(|| BackendError::Decode("signup response carried no user id".to_string()))
    }

    async fn sign_out(&self, access_token: &str) -> BackendResult<()> {
        let request = self.client.http().post(self.client.auth_url("logout"));
        check(self.client.as_user(request, access_token).send().await?).await?;
        Ok(())
    }

    async fn update_password(&self, access_token: &str, new_password: &str) -> BackendResult<()> {
        let request = self
            .client
            .http()
            .put(self.client.auth_url("user"))
            .json(&json!({"password": new_password}));
        check(self.client.as_user(request, access_token).send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_user_id_shapes() {
        assert_eq!(
            signup_user_id(&json!({"id": "u1", "email": "a@b.c"})).as_deref(),
            Some("u1")
        );
        assert_eq!(
            signup_user_id(&json!({"access_token": "t", "user": {"id": "u2"}})).as_deref(),
            Some("u2")
        );
        assert_eq!(signup_user_id(&json!({"msg": "nope"})), None);
    }
}
