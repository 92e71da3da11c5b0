//! External collaborators behind traits
//!
//! The service delegates persistence, authentication and file storage. Each
//! concern is a trait with a Supabase implementation (production) and a
//! local implementation (SQLite + filesystem) used for offline deployments
//! and tests.

pub mod local_storage;
pub mod postgrest;
pub mod sqlite;
pub mod supabase;
pub mod supabase_auth;
pub mod supabase_storage;

use std::sync::Arc;

use async_trait::async_trait;
use clp_common::config::{BackendSettings, DEFAULT_BUCKET};
use clp_common::models::{
    CourseLearningPlan, Department, NewPlan, NewUser, Notification, PlanFilter, PlanUpdate,
    PromptKind, PromptSetting, Role, UserFilter, UserProfile,
};
use thiserror::Error;
use tracing::info;

pub use local_storage::LocalObjectStore;
pub use postgrest::SupabaseStore;
pub use sqlite::SqliteStore;
pub use supabase::SupabaseClient;
pub use supabase_auth::SupabaseAuth;
pub use supabase_storage::SupabaseStorage;

/// Backend error type
#[derive(Debug, Error)]
pub enum BackendError {
    /// Requested row or object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint or duplicate object
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Credentials or access token rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Request rejected as malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote service answered with an error status
    #[error("Service returned {status}: {message}")]
    Service { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Tables of the workflow: users, plans, notifications, departments, prompts
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn get_user(&self, id: &str) -> BackendResult<Option<UserProfile>>;
    /// True when a profile already uses the username or the email
    async fn user_exists(&self, username: &str, email: &str) -> BackendResult<bool>;
    async fn insert_user(&self, user: &NewUser) -> BackendResult<UserProfile>;
    /// Matching users ordered by username
    async fn list_users(&self, filter: &UserFilter) -> BackendResult<Vec<UserProfile>>;
    /// Approve and assign; `None` when the user does not exist
    async fn approve_user(
        &self,
        id: &str,
        role: Role,
        department: Option<&str>,
    ) -> BackendResult<Option<UserProfile>>;
    /// Remove a profile; returns the removed row
    async fn delete_user(&self, id: &str) -> BackendResult<Option<UserProfile>>;

    async fn insert_plan(&self, plan: &NewPlan) -> BackendResult<CourseLearningPlan>;
    /// Plan with its author summary
    async fn get_plan(&self, id: i64) -> BackendResult<Option<CourseLearningPlan>>;
    /// Matching plans with authors, newest first
    async fn list_plans(&self, filter: &PlanFilter) -> BackendResult<Vec<CourseLearningPlan>>;
    async fn update_plan(&self, id: i64, update: &PlanUpdate) -> BackendResult<()>;
    async fn delete_plan(&self, id: i64) -> BackendResult<()>;

    async fn insert_notification(&self, user_id: &str, message: &str) -> BackendResult<()>;
    /// Newest first
    async fn list_notifications(&self, user_id: &str) -> BackendResult<Vec<Notification>>;
    async fn count_unread(&self, user_id: &str) -> BackendResult<u64>;
    async fn mark_read(&self, id: i64, user_id: &str) -> BackendResult<()>;
    async fn mark_all_read(&self, user_id: &str) -> BackendResult<()>;
    /// Delete read notifications; returns how many were removed
    async fn delete_read(&self, user_id: &str) -> BackendResult<u64>;

    /// Ordered by name
    async fn list_departments(&self) -> BackendResult<Vec<Department>>;
    async fn insert_department(&self, name: &str) -> BackendResult<Department>;
    async fn delete_department(&self, id: i64) -> BackendResult<bool>;

    async fn list_prompts(&self) -> BackendResult<Vec<PromptSetting>>;
    async fn get_prompt(&self, kind: PromptKind) -> BackendResult<Option<PromptSetting>>;
    async fn set_prompt(&self, kind: PromptKind, template: &str) -> BackendResult<PromptSetting>;
    async fn delete_prompt(&self, kind: PromptKind) -> BackendResult<bool>;
}

/// Successful sign-in
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: String,
    pub access_token: String,
}

/// Credential handling delegated to the datastore's auth service
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `Unauthorized` on bad credentials
    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession>;
    /// Creates the auth user and returns its id
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<String>;
    async fn sign_out(&self, access_token: &str) -> BackendResult<()>;
    async fn update_password(&self, access_token: &str, new_password: &str) -> BackendResult<()>;
}

/// Object storage bucket
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes at `path`; without `upsert` an existing object is a conflict
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> BackendResult<()>;
    /// `NotFound` when the object is missing
    async fn download(&self, path: &str) -> BackendResult<Vec<u8>>;
    /// Missing objects are ignored
    async fn remove(&self, paths: &[String]) -> BackendResult<()>;
}

/// The three backends used by handlers and background tasks
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn Datastore>,
    pub auth: Arc<dyn AuthProvider>,
    pub objects: Arc<dyn ObjectStore>,
}

impl Backends {
    /// Local backends sharing one SQLite store
    pub fn local(store: SqliteStore, objects: LocalObjectStore) -> Self {
        let store = Arc::new(store);
        Self {
            store: store.clone(),
            auth: store,
            objects: Arc::new(objects),
        }
    }
}

/// Build the backends selected by configuration
pub async fn connect(settings: &BackendSettings) -> BackendResult<Backends> {
    match settings {
        BackendSettings::Supabase(supabase) => {
            let client = SupabaseClient::new(supabase)?;
            info!(url = %supabase.url, bucket = %supabase.bucket, "Using Supabase backend");
            let bucket = if supabase.bucket.is_empty() {
                DEFAULT_BUCKET.to_string()
            } else {
                supabase.bucket.clone()
            };
            Ok(Backends {
                store: Arc::new(SupabaseStore::new(client.clone())),
                auth: Arc::new(SupabaseAuth::new(client.clone())),
                objects: Arc::new(SupabaseStorage::new(client, bucket)),
            })
        }
        BackendSettings::Local(local) => {
            info!(
                database = %local.database_path.display(),
                storage = %local.storage_root.display(),
                "Using local backend"
            );
            let store = SqliteStore::open(&local.database_path).await?;
            let objects = LocalObjectStore::new(&local.storage_root).await?;
            Ok(Backends::local(store, objects))
        }
    }
}
