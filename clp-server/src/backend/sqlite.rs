//! SQLite datastore and credential store for the local backend
//!
//! Mirrors the Supabase tables so the service can run without a hosted
//! project. Passwords are stored as salted SHA-256 digests and sign-in
//! issues opaque random access tokens.

use std::path::Path;

use async_trait::async_trait;
use clp_common::models::{
    AuthorSummary, CourseLearningPlan, Department, NewPlan, NewUser, Notification, PlanFilter,
    PlanUpdate, PromptKind, PromptSetting, Role, UserFilter, UserProfile, DEFAULT_DEPARTMENTS,
};
use clp_common::time::{now, parse_timestamp};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::{AuthProvider, AuthSession, BackendError, BackendResult, Datastore};

const PLAN_COLUMNS: &str = r#"
    p.id, p.subject, p.department, p.status, p.upload_type, p.filename, p.content,
    p.dean_comments, p.user_id, p.date_posted,
    u.id AS author_id, u.username AS author_username, u.first_name AS author_first_name,
    u.last_name AS author_last_name, u.title AS author_title
"#;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) a database file
    pub async fn open(db_path: &Path) -> BackendResult<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        debug!("Connecting to database: {}", db_url);
        let pool = SqlitePool::connect(&db_url).await?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database; one connection so every query sees the same data
    pub async fn in_memory() -> BackendResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> BackendResult<Self> {
        init_tables(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn init_tables(pool: &SqlitePool) -> BackendResult<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL UNIQUE,
            title TEXT,
            role TEXT NOT NULL DEFAULT 'teacher',
            approved INTEGER NOT NULL DEFAULT 0,
            assigned_department TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_learning_plans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject TEXT NOT NULL,
            department TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            upload_type TEXT NOT NULL,
            filename TEXT,
            content TEXT,
            dean_comments TEXT,
            user_id TEXT NOT NULL,
            date_posted TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            message TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS departments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS prompt_settings (
            kind TEXT PRIMARY KEY,
            template TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS auth_users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            salt TEXT NOT NULL,
            password_hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS auth_tokens (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for name in DEFAULT_DEPARTMENTS {
        sqlx::query("INSERT OR IGNORE INTO departments (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await?;
    }

    info!("Database tables initialized (users, course_learning_plans, notifications, departments, prompt_settings)");
    Ok(())
}

/// Unique violations become `Conflict`
fn map_write_error(e: sqlx::Error) -> BackendError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return BackendError::Conflict(db.message().to_string());
        }
    }
    BackendError::Database(e)
}

fn decode_err(e: clp_common::Error) -> BackendError {
    BackendError::Decode(e.to_string())
}

fn timestamp(row: &SqliteRow, column: &str) -> BackendResult<Option<chrono::DateTime<chrono::Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn user_from_row(row: &SqliteRow) -> BackendResult<UserProfile> {
    Ok(UserProfile {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        title: row.try_get("title")?,
        role: row.try_get("role")?,
        approved: row.try_get("approved")?,
        assigned_department: row.try_get("assigned_department")?,
    })
}

fn plan_from_row(row: &SqliteRow) -> BackendResult<CourseLearningPlan> {
    let status: String = row.try_get("status")?;
    let upload_type: String = row.try_get("upload_type")?;
    let author_id: Option<String> = row.try_get("author_id")?;
    let author = match author_id {
        Some(id) => Some(AuthorSummary {
            id,
            username: row.try_get("author_username")?,
            first_name: row.try_get("author_first_name")?,
            last_name: row.try_get("author_last_name")?,
            title: row.try_get("author_title")?,
        }),
        None => None,
    };
    Ok(CourseLearningPlan {
        id: row.try_get("id")?,
        subject: row.try_get("subject")?,
        department: row.try_get("department")?,
        status: status.parse().map_err(decode_err)?,
        upload_type: upload_type.parse().map_err(decode_err)?,
        filename: row.try_get("filename")?,
        content: row.try_get("content")?,
        dean_comments: row.try_get("dean_comments")?,
        user_id: row.try_get("user_id")?,
        date_posted: timestamp(row, "date_posted")?,
        author,
    })
}

fn notification_from_row(row: &SqliteRow) -> BackendResult<Notification> {
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        message: row.try_get("message")?,
        is_read: row.try_get("is_read")?,
        timestamp: timestamp(row, "timestamp")?,
    })
}

fn prompt_from_row(row: &SqliteRow) -> BackendResult<PromptSetting> {
    let kind: String = row.try_get("kind")?;
    Ok(PromptSetting {
        kind: kind.parse().map_err(decode_err)?,
        template: row.try_get("template")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    to_hex(&hasher.finalize())
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    to_hex(&bytes)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[async_trait]
impl Datastore for SqliteStore {
    async fn get_user(&self, id: &str) -> BackendResult<Option<UserProfile>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_exists(&self, username: &str, email: &str) -> BackendResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ? OR email = ?")
                .bind(username)
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn insert_user(&self, user: &NewUser) -> BackendResult<UserProfile> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, first_name, last_name, email, title, role, approved, assigned_department)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.title)
        .bind(user.role.as_str())
        .bind(user.approved)
        .bind(&user.assigned_department)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        self.get_user(&user.id)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("user {}", user.id)))
    }

    async fn list_users(&self, filter: &UserFilter) -> BackendResult<Vec<UserProfile>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM users WHERE 1 = 1");
        if let Some(role) = filter.role {
            qb.push(" AND role = ").push_bind(role.as_str());
        }
        if let Some(approved) = filter.approved {
            qb.push(" AND approved = ").push_bind(approved);
        }
        if let Some(role) = filter.exclude_role {
            qb.push(" AND role <> ").push_bind(role.as_str());
        }
        qb.push(" ORDER BY username");
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn approve_user(
        &self,
        id: &str,
        role: Role,
        department: Option<&str>,
    ) -> BackendResult<Option<UserProfile>> {
        let result = sqlx::query(
            "UPDATE users SET approved = 1, role = ?, assigned_department = ? WHERE id = ?",
        )
        .bind(role.as_str())
        .bind(department)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user(id).await
    }

    async fn delete_user(&self, id: &str) -> BackendResult<Option<UserProfile>> {
        let Some(user) = self.get_user(id).await? else {
            return Ok(None);
        };
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(Some(user))
    }

    async fn insert_plan(&self, plan: &NewPlan) -> BackendResult<CourseLearningPlan> {
        let result = sqlx::query(
            r#"
            INSERT INTO course_learning_plans
                (subject, department, status, upload_type, filename, content, user_id, date_posted)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&plan.subject)
        .bind(&plan.department)
        .bind(plan.status.as_str())
        .bind(plan.upload_type.as_str())
        .bind(&plan.filename)
        .bind(&plan.content)
        .bind(&plan.user_id)
        .bind(now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        let id = result.last_insert_rowid();
        self.get_plan(id)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("plan {}", id)))
    }

    async fn get_plan(&self, id: i64) -> BackendResult<Option<CourseLearningPlan>> {
        let sql = format!(
            "SELECT {} FROM course_learning_plans p LEFT JOIN users u ON u.id = p.user_id WHERE p.id = ?",
            PLAN_COLUMNS
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(plan_from_row).transpose()
    }

    async fn list_plans(&self, filter: &PlanFilter) -> BackendResult<Vec<CourseLearningPlan>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM course_learning_plans p LEFT JOIN users u ON u.id = p.user_id WHERE 1 = 1",
            PLAN_COLUMNS
        ));
        if let Some(user_id) = &filter.user_id {
            qb.push(" AND p.user_id = ").push_bind(user_id.clone());
        }
        if let Some(status) = filter.status {
            qb.push(" AND p.status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY p.date_posted DESC, p.id DESC");
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(plan_from_row).collect()
    }

    async fn update_plan(&self, id: i64, update: &PlanUpdate) -> BackendResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE course_learning_plans SET ");
        let mut set = qb.separated(", ");
        if let Some(subject) = &update.subject {
            set.push("subject = ").push_bind_unseparated(subject.clone());
        }
        if let Some(department) = &update.department {
            set.push("department = ").push_bind_unseparated(department.clone());
        }
        if let Some(status) = update.status {
            set.push("status = ").push_bind_unseparated(status.as_str());
        }
        if let Some(upload_type) = update.upload_type {
            set.push("upload_type = ").push_bind_unseparated(upload_type.as_str());
        }
        if let Some(filename) = &update.filename {
            set.push("filename = ").push_bind_unseparated(filename.clone());
        }
        if let Some(content) = &update.content {
            set.push("content = ").push_bind_unseparated(content.clone());
        }
        if let Some(comments) = &update.dean_comments {
            set.push("dean_comments = ").push_bind_unseparated(comments.clone());
        }
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(BackendError::NotFound(format!("plan {}", id)));
        }
        Ok(())
    }

    async fn delete_plan(&self, id: i64) -> BackendResult<()> {
        sqlx::query("DELETE FROM course_learning_plans WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_notification(&self, user_id: &str, message: &str) -> BackendResult<()> {
        sqlx::query("INSERT INTO notifications (user_id, message, timestamp) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(message)
            .bind(now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_notifications(&self, user_id: &str) -> BackendResult<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT * FROM notifications WHERE user_id = ? ORDER BY timestamp DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn count_unread(&self, user_id: &str) -> BackendResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn mark_read(&self, id: i64, user_id: &str) -> BackendResult<()> {
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_all_read(&self, user_id: &str) -> BackendResult<()> {
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_read(&self, user_id: &str) -> BackendResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = ? AND is_read = 1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_departments(&self) -> BackendResult<Vec<Department>> {
        let rows = sqlx::query("SELECT id, name FROM departments ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Department {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    async fn insert_department(&self, name: &str) -> BackendResult<Department> {
        let result = sqlx::query("INSERT INTO departments (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(Department {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    async fn delete_department(&self, id: i64) -> BackendResult<bool> {
        let result = sqlx::query("DELETE FROM departments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_prompts(&self) -> BackendResult<Vec<PromptSetting>> {
        let rows = sqlx::query("SELECT * FROM prompt_settings ORDER BY kind")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(prompt_from_row).collect()
    }

    async fn get_prompt(&self, kind: PromptKind) -> BackendResult<Option<PromptSetting>> {
        let row = sqlx::query("SELECT * FROM prompt_settings WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(prompt_from_row).transpose()
    }

    async fn set_prompt(&self, kind: PromptKind, template: &str) -> BackendResult<PromptSetting> {
        let updated_at = now();
        sqlx::query(
            r#"
            INSERT INTO prompt_settings (kind, template, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(kind) DO UPDATE SET
                template = excluded.template,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(kind.as_str())
        .bind(template)
        .bind(updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(PromptSetting {
            kind,
            template: template.to_string(),
            updated_at: Some(updated_at),
        })
    }

    async fn delete_prompt(&self, kind: PromptKind) -> BackendResult<bool> {
        let result = sqlx::query("DELETE FROM prompt_settings WHERE kind = ?")
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuthProvider for SqliteStore {
    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
        let row = sqlx::query("SELECT id, salt, password_hash FROM auth_users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(BackendError::Unauthorized("Invalid login credentials".to_string()));
        };
        let salt: String = row.try_get("salt")?;
        let expected: String = row.try_get("password_hash")?;
        if hash_password(&salt, password) != expected {
            return Err(BackendError::Unauthorized("Invalid login credentials".to_string()));
        }

        let user_id: String = row.try_get("id")?;
        let token = random_hex(32);
        sqlx::query("INSERT INTO auth_tokens (token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(&user_id)
            .bind(now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(AuthSession {
            user_id,
            access_token: token,
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<String> {
        let id = Uuid::new_v4().to_string();
        let salt = random_hex(16);
        sqlx::query("INSERT INTO auth_users (id, email, salt, password_hash) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(email)
            .bind(&salt)
            .bind(hash_password(&salt, password))
            .execute(&self.pool)
            .await
            .map_err(|e| match map_write_error(e) {
                BackendError::Conflict(_) => {
                    BackendError::Conflict("User already registered".to_string())
                }
                other => other,
            })?;
        Ok(id)
    }

    async fn sign_out(&self, access_token: &str) -> BackendResult<()> {
        sqlx::query("DELETE FROM auth_tokens WHERE token = ?")
            .bind(access_token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_password(&self, access_token: &str, new_password: &str) -> BackendResult<()> {
        let user_id: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM auth_tokens WHERE token = ?")
                .bind(access_token)
                .fetch_optional(&self.pool)
                .await?;
        let Some(user_id) = user_id else {
            return Err(BackendError::Unauthorized("invalid access token".to_string()));
        };
        let salt = random_hex(16);
        sqlx::query("UPDATE auth_users SET salt = ?, password_hash = ? WHERE id = ?")
            .bind(&salt)
            .bind(hash_password(&salt, new_password))
            .bind(&user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
