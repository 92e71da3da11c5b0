//! Domain models shared by the datastore backends and API handlers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Departments seeded into a fresh datastore
pub const DEFAULT_DEPARTMENTS: [&str; 4] = [
    "Department of Information Technology",
    "Department of Engineering",
    "Department of Business",
    "Department of Arts and Sciences",
];

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Dean,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Dean => "dean",
            Role::Teacher => "teacher",
        }
    }

    /// Landing path of the role's dashboard
    pub fn home_path(&self) -> &'static str {
        match self {
            Role::Admin => "/admin/dashboard",
            Role::Dean => "/dean/courses",
            Role::Teacher => "/teacher/my_clps",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Role::Admin),
            "dean" => Ok(Role::Dean),
            "teacher" => Ok(Role::Teacher),
            other => Err(Error::InvalidInput(format!("unknown role '{}'", other))),
        }
    }
}

/// Review status of a course learning plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClpStatus {
    Draft,
    Pending,
    Approved,
    ReturnedForRevision,
    Failed,
}

impl ClpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClpStatus::Draft => "draft",
            ClpStatus::Pending => "pending",
            ClpStatus::Approved => "approved",
            ClpStatus::ReturnedForRevision => "returned_for_revision",
            ClpStatus::Failed => "failed",
        }
    }

    /// Pending and approved plans cannot be edited, deleted or resubmitted
    pub fn is_locked(&self) -> bool {
        matches!(self, ClpStatus::Pending | ClpStatus::Approved)
    }
}

impl fmt::Display for ClpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClpStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(ClpStatus::Draft),
            "pending" => Ok(ClpStatus::Pending),
            "approved" => Ok(ClpStatus::Approved),
            "returned_for_revision" => Ok(ClpStatus::ReturnedForRevision),
            "failed" => Ok(ClpStatus::Failed),
            other => Err(Error::InvalidInput(format!("unknown plan status '{}'", other))),
        }
    }
}

/// How the plan content was provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadType {
    FileUpload,
    ManualText,
    AiGenerated,
}

impl UploadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadType::FileUpload => "file_upload",
            UploadType::ManualText => "manual_text",
            UploadType::AiGenerated => "ai_generated",
        }
    }
}

impl fmt::Display for UploadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file_upload" => Ok(UploadType::FileUpload),
            "manual_text" => Ok(UploadType::ManualText),
            "ai_generated" => Ok(UploadType::AiGenerated),
            other => Err(Error::InvalidInput(format!("unknown upload type '{}'", other))),
        }
    }
}

/// Row of the `users` profile table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Kept as text: a profile may carry a role this service doesn't know
    pub role: String,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub assigned_department: Option<String>,
}

impl UserProfile {
    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }

    /// "First Last", trimmed
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Profile inserted at sign-up
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub title: Option<String>,
    pub role: Role,
    pub approved: bool,
    pub assigned_department: Option<String>,
}

/// Filter for user listings (results ordered by username)
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub approved: Option<bool>,
    pub exclude_role: Option<Role>,
}

/// Author columns embedded in plan listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Row of the `course_learning_plans` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseLearningPlan {
    pub id: i64,
    pub subject: String,
    pub department: String,
    pub status: ClpStatus,
    pub upload_type: UploadType,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub dean_comments: Option<String>,
    pub user_id: String,
    #[serde(default, with = "crate::time::flexible_option")]
    pub date_posted: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: Option<AuthorSummary>,
}

impl CourseLearningPlan {
    /// Parsed JSON content for AI/structured plans
    pub fn content_data(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        if self.upload_type == UploadType::FileUpload {
            return None;
        }
        let content = self.content.as_deref()?;
        match serde_json::from_str::<serde_json::Value>(content) {
            Ok(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    pub fn author_username(&self) -> &str {
        self.author
            .as_ref()
            .map(|a| a.username.as_str())
            .unwrap_or("unknown")
    }
}

/// Plan row to insert
#[derive(Debug, Clone, Serialize)]
pub struct NewPlan {
    pub subject: String,
    pub department: String,
    pub status: ClpStatus,
    pub upload_type: UploadType,
    pub filename: Option<String>,
    pub content: Option<String>,
    pub user_id: String,
}

/// Partial plan update
///
/// Outer `None` leaves a column untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ClpStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_type: Option<UploadType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dean_comments: Option<Option<String>>,
}

impl PlanUpdate {
    pub fn status(status: ClpStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_none()
            && self.department.is_none()
            && self.status.is_none()
            && self.upload_type.is_none()
            && self.filename.is_none()
            && self.content.is_none()
            && self.dean_comments.is_none()
    }
}

/// Filter for plan listings (results ordered newest first)
#[derive(Debug, Clone, Default)]
pub struct PlanFilter {
    pub user_id: Option<String>,
    pub status: Option<ClpStatus>,
}

/// Row of the `notifications` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, with = "crate::time::flexible_option")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Row of the `departments` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
}

/// Which AI generation step a prompt belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    ProgramInstitutional,
    CourseProgram,
    WeeklyBreakdown,
}

impl PromptKind {
    pub const ALL: [PromptKind; 3] = [
        PromptKind::ProgramInstitutional,
        PromptKind::CourseProgram,
        PromptKind::WeeklyBreakdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::ProgramInstitutional => "program_institutional",
            PromptKind::CourseProgram => "course_program",
            PromptKind::WeeklyBreakdown => "weekly_breakdown",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PromptKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown prompt kind '{}'", s)))
    }
}

/// Row of the `prompt_settings` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSetting {
    pub kind: PromptKind,
    pub template: String,
    #[serde(default, with = "crate::time::flexible_option")]
    pub updated_at: Option<DateTime<Utc>>,
}
