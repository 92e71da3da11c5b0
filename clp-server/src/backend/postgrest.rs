//! Datastore over Supabase PostgREST
//!
//! All table access uses the service-role key; ownership and role checks are
//! enforced by the API handlers before any call reaches this layer.

use async_trait::async_trait;
use clp_common::models::{
    CourseLearningPlan, Department, NewPlan, NewUser, Notification, PlanFilter, PlanUpdate,
    PromptKind, PromptSetting, Role, UserFilter, UserProfile,
};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::supabase::{check, SupabaseClient};
use super::{BackendError, BackendResult, Datastore};

/// Plan columns plus the embedded author summary
const PLAN_SELECT: &str = "*,author:users(id,username,first_name,last_name,title)";

type Query = Vec<(&'static str, String)>;

/// PostgREST-backed datastore
pub struct SupabaseStore {
    client: SupabaseClient,
}

impl SupabaseStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: Query) -> BackendResult<Vec<T>> {
        debug!(table, ?query, "PostgREST select");
        let request = self
            .client
            .http()
            .get(self.client.rest_url(table))
            .query(&query);
        let response = check(self.client.as_service(request).send().await?).await?;
        decode(response).await
    }

    /// Write with `Prefer: return=representation` and return the affected rows
    async fn write<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        table: &str,
        query: Query,
        body: Option<&B>,
        prefer: &str,
    ) -> BackendResult<Vec<T>> {
        debug!(table, %method, ?query, "PostgREST write");
        let mut request = self
            .client
            .http()
            .request(method, self.client.rest_url(table))
            .query(&query)
            .header("Prefer", prefer);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = check(self.client.as_service(request).send().await?).await?;
        decode(response).await
    }

    async fn insert<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
    ) -> BackendResult<Vec<T>> {
        self.write(Method::POST, table, Vec::new(), Some(body), "return=representation")
            .await
    }

    async fn update<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        query: Query,
        body: &B,
    ) -> BackendResult<Vec<T>> {
        self.write(Method::PATCH, table, query, Some(body), "return=representation")
            .await
    }

    async fn delete<T: DeserializeOwned>(&self, table: &str, query: Query) -> BackendResult<Vec<T>> {
        self.write::<T, ()>(Method::DELETE, table, query, None, "return=representation")
            .await
    }

    /// Exact row count from the `Content-Range` header
    async fn count(&self, table: &str, mut query: Query) -> BackendResult<u64> {
        query.push(("select", "id".to_string()));
        query.push(("limit", "1".to_string()));
        let request = self
            .client
            .http()
            .get(self.client.rest_url(table))
            .query(&query)
            .header("Prefer", "count=exact");
        let response = check(self.client.as_service(request).send().await?).await?;
        let range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| BackendError::Decode("missing Content-Range header".to_string()))?;
        parse_content_range_total(range)
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> BackendResult<Vec<T>> {
    let body = response.bytes().await?;
    if body.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&body).map_err(|e| BackendError::Decode(e.to_string()))
}

/// Total from `0-9/42` or `*/0`
pub fn parse_content_range_total(range: &str) -> BackendResult<u64> {
    let total = range
        .rsplit('/')
        .next()
        .ok_or_else(|| BackendError::Decode(format!("bad Content-Range '{}'", range)))?;
    if total == "*" {
        return Ok(0);
    }
    total
        .parse()
        .map_err(|_| BackendError::Decode(format!("bad Content-Range '{}'", range)))
}

/// `eq.<value>` filter
fn eq(value: impl ToString) -> String {
    format!("eq.{}", value.to_string())
}

/// Double-quote a value for use inside `or=(...)` lists
fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[async_trait]
impl Datastore for SupabaseStore {
    async fn get_user(&self, id: &str) -> BackendResult<Option<UserProfile>> {
        let rows: Vec<UserProfile> = self
            .select("users", vec![("select", "*".to_string()), ("id", eq(id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn user_exists(&self, username: &str, email: &str) -> BackendResult<bool> {
        let rows: Vec<serde_json::Value> = self
            .select(
                "users",
                vec![
                    ("select", "id".to_string()),
                    (
                        "or",
                        format!(
                            "(username.eq.{},email.eq.{})",
                            quoted(username),
                            quoted(email)
                        ),
                    ),
                ],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn insert_user(&self, user: &NewUser) -> BackendResult<UserProfile> {
        let rows: Vec<UserProfile> = self.insert("users", user).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode("insert returned no user row".to_string()))
    }

    async fn list_users(&self, filter: &UserFilter) -> BackendResult<Vec<UserProfile>> {
        let mut query: Query = vec![("select", "*".to_string()), ("order", "username".to_string())];
        if let Some(role) = filter.role {
            query.push(("role", eq(role)));
        }
        if let Some(approved) = filter.approved {
            query.push(("approved", eq(approved)));
        }
        if let Some(role) = filter.exclude_role {
            query.push(("role", format!("neq.{}", role)));
        }
        self.select("users", query).await
    }

    async fn approve_user(
        &self,
        id: &str,
        role: Role,
        department: Option<&str>,
    ) -> BackendResult<Option<UserProfile>> {
        let body = json!({
            "approved": true,
            "role": role,
            "assigned_department": department,
        });
        let rows: Vec<UserProfile> = self.update("users", vec![("id", eq(id))], &body).await?;
        Ok(rows.into_iter().next())
    }

    async fn delete_user(&self, id: &str) -> BackendResult<Option<UserProfile>> {
        let rows: Vec<UserProfile> = self.delete("users", vec![("id", eq(id))]).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_plan(&self, plan: &NewPlan) -> BackendResult<CourseLearningPlan> {
        let rows: Vec<CourseLearningPlan> = self.insert("course_learning_plans", plan).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode("insert returned no plan row".to_string()))
    }

    async fn get_plan(&self, id: i64) -> BackendResult<Option<CourseLearningPlan>> {
        let rows: Vec<CourseLearningPlan> = self
            .select(
                "course_learning_plans",
                vec![("select", PLAN_SELECT.to_string()), ("id", eq(id))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_plans(&self, filter: &PlanFilter) -> BackendResult<Vec<CourseLearningPlan>> {
        let mut query: Query = vec![
            ("select", PLAN_SELECT.to_string()),
            ("order", "date_posted.desc".to_string()),
        ];
        if let Some(user_id) = &filter.user_id {
            query.push(("user_id", eq(user_id)));
        }
        if let Some(status) = filter.status {
            query.push(("status", eq(status)));
        }
        self.select("course_learning_plans", query).await
    }

    async fn update_plan(&self, id: i64, update: &PlanUpdate) -> BackendResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        let rows: Vec<serde_json::Value> = self
            .update("course_learning_plans", vec![("id", eq(id))], update)
            .await?;
        if rows.is_empty() {
            return Err(BackendError::NotFound(format!("plan {}", id)));
        }
        Ok(())
    }

    async fn delete_plan(&self, id: i64) -> BackendResult<()> {
        let _: Vec<serde_json::Value> = self
            .delete("course_learning_plans", vec![("id", eq(id))])
            .await?;
        Ok(())
    }

    async fn insert_notification(&self, user_id: &str, message: &str) -> BackendResult<()> {
        let _: Vec<serde_json::Value> = self
            .insert(
                "notifications",
                &json!({"user_id": user_id, "message": message}),
            )
            .await?;
        Ok(())
    }

    async fn list_notifications(&self, user_id: &str) -> BackendResult<Vec<Notification>> {
        self.select(
            "notifications",
            vec![
                ("select", "*".to_string()),
                ("user_id", eq(user_id)),
                ("order", "timestamp.desc".to_string()),
            ],
        )
        .await
    }

    async fn count_unread(&self, user_id: &str) -> BackendResult<u64> {
        self.count(
            "notifications",
            vec![("user_id", eq(user_id)), ("is_read", eq(false))],
        )
        .await
    }

    async fn mark_read(&self, id: i64, user_id: &str) -> BackendResult<()> {
        let _: Vec<serde_json::Value> = self
            .update(
                "notifications",
                vec![("id", eq(id)), ("user_id", eq(user_id))],
                &json!({"is_read": true}),
            )
            .await?;
        Ok(())
    }

    async fn mark_all_read(&self, user_id: &str) -> BackendResult<()> {
        let _: Vec<serde_json::Value> = self
            .update(
                "notifications",
                vec![("user_id", eq(user_id))],
                &json!({"is_read": true}),
            )
            .await?;
        Ok(())
    }

    async fn delete_read(&self, user_id: &str) -> BackendResult<u64> {
        let rows: Vec<serde_json::Value> = self
            .delete(
                "notifications",
                vec![("user_id", eq(user_id)), ("is_read", eq(true))],
            )
            .await?;
        Ok(rows.len() as u64)
    }

    async fn list_departments(&self) -> BackendResult<Vec<Department>> {
        self.select(
            "departments",
            vec![("select", "id,name".to_string()), ("order", "name".to_string())],
        )
        .await
    }

    async fn insert_department(&self, name: &str) -> BackendResult<Department> {
        let rows: Vec<Department> = self.insert("departments", &json!({"name": name})).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode("insert returned no department row".to_string()))
    }

    async fn delete_department(&self, id: i64) -> BackendResult<bool> {
        let rows: Vec<Department> = self.delete("departments", vec![("id", eq(id))]).await?;
        Ok(!rows.is_empty())
    }

    async fn list_prompts(&self) -> BackendResult<Vec<PromptSetting>> {
        self.select("prompt_settings", vec![("select", "*".to_string())])
            .await
    }

    async fn get_prompt(&self, kind: PromptKind) -> BackendResult<Option<PromptSetting>> {
        let rows: Vec<PromptSetting> = self
            .select(
                "prompt_settings",
                vec![("select", "*".to_string()), ("kind", eq(kind))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn set_prompt(&self, kind: PromptKind, template: &str) -> BackendResult<PromptSetting> {
        let body = json!({
            "kind": kind,
            "template": template,
            "updated_at": clp_common::time::now().to_rfc3339(),
        });
        let rows: Vec<PromptSetting> = self
            .write(
                Method::POST,
                "prompt_settings",
                vec![("on_conflict", "kind".to_string())],
                Some(&body),
                "resolution=merge-duplicates,return=representation",
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode("upsert returned no prompt row".to_string()))
    }

    async fn delete_prompt(&self, kind: PromptKind) -> BackendResult<bool> {
        let rows: Vec<PromptSetting> = self
            .delete("prompt_settings", vec![("kind", eq(kind))])
            .await?;
        Ok(!rows.is_empty())
    }
}
