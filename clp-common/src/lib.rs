//! # CLP Common Library
//!
//! Shared code for the Course Learning Plan workflow service including:
//! - Configuration loading and validation
//! - Domain models (plans, users, notifications, departments, prompts)
//! - Static outcome tables used by AI generation and review
//! - Signed tokens for sessions and editor callbacks
//! - Filename, timestamp and JSON helpers

pub mod config;
pub mod error;
pub mod files;
pub mod flatten;
pub mod models;
pub mod outcomes;
pub mod signing;
pub mod time;
pub mod validation;

pub use error::{Error, Result};
pub use models::{ClpStatus, Role, UploadType};
