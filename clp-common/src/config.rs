//! Configuration loading and validation
//!
//! Bootstrap configuration comes from a TOML file, resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. `CLP_CONFIG` environment variable
//! 3. `~/.config/clp/config.toml`
//! 4. Compiled defaults (fallback)
//!
//! Secrets may be supplied through the environment (optionally from a `.env`
//! file) and always override the TOML values. A missing TOML file is not an
//! error; missing required secrets are.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "CLP_CONFIG";

/// Default storage bucket for plan files and the CLP template
pub const DEFAULT_BUCKET: &str = "clp_files";

/// Storage key of the official CLP Word template
pub const TEMPLATE_KEY: &str = "PBSIT/PBSIT-001-LP-20242.docx";

/// Datastore/auth/storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Supabase (PostgREST + GoTrue + Storage)
    #[default]
    Supabase,
    /// SQLite database plus a local storage folder
    Local,
}

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TomlConfig {
    /// Key used to sign session cookies and editor tokens
    pub secret_key: Option<String>,
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub supabase: SupabaseConfig,
    pub gemini: GeminiConfig,
    pub editor: EditorConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum accepted request body (uploads included)
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_body_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// SQLite database used by the local backend
    pub database_path: Option<PathBuf>,
    /// Folder holding stored objects for the local backend
    pub storage_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub service_key: Option<String>,
    pub bucket: String,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            service_key: None,
            bucket: DEFAULT_BUCKET.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Origin of the ONLYOFFICE document server (browser-facing)
    pub document_server_url: String,
    /// Base URL the document server uses to reach this service
    pub public_base_url: String,
    /// Lifetime of editor file/callback tokens
    pub token_ttl_secs: i64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            document_server_url: "http://localhost:8080".to_string(),
            public_base_url: "http://host.docker.internal:5000".to_string(),
            token_ttl_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub per_hour: u32,
    pub per_day: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_hour: 50,
            per_day: 200,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Validated Supabase connection settings
#[derive(Debug, Clone)]
pub struct SupabaseSettings {
    pub url: String,
    pub anon_key: String,
    pub service_key: String,
    pub bucket: String,
}

/// Validated local backend settings
#[derive(Debug, Clone)]
pub struct LocalSettings {
    pub database_path: PathBuf,
    pub storage_root: PathBuf,
}

/// Validated backend selection
#[derive(Debug, Clone)]
pub enum BackendSettings {
    Supabase(SupabaseSettings),
    Local(LocalSettings),
}

/// Fully validated runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub secret_key: String,
    pub gemini_api_key: String,
    pub server: ServerConfig,
    pub backend: BackendSettings,
    pub gemini: GeminiConfig,
    pub editor: EditorConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Supabase URL when the Supabase backend is active
    pub fn supabase_url(&self) -> Option<&str> {
        match &self.backend {
            BackendSettings::Supabase(s) => Some(s.url.as_str()),
            BackendSettings::Local(_) => None,
        }
    }
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Load the config file if one is found, otherwise compiled defaults
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            None => {
                warn!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Override secrets and service URLs from the environment
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_value("CLP_SECRET_KEY").or_else(|| env_value("FLASK_SECRET_KEY")) {
            self.secret_key = Some(v);
        }
        if let Some(v) = env_value("GEMINI_API_KEY") {
            self.gemini.api_key = Some(v);
        }
        if let Some(v) = env_value("SUPABASE_URL") {
            self.supabase.url = Some(v);
        }
        if let Some(v) = env_value("SUPABASE_KEY") {
            self.supabase.anon_key = Some(v);
        }
        if let Some(v) = env_value("SUPABASE_SERVICE_KEY") {
            self.supabase.service_key = Some(v);
        }
        if let Some(v) = env_value("CLP_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "local" => self.backend.kind = BackendKind::Local,
                "supabase" => self.backend.kind = BackendKind::Supabase,
                other => warn!("Ignoring unknown CLP_BACKEND value '{}'", other),
            }
        }
    }

    /// Check required values and produce runtime settings
    ///
    /// Every missing value is reported in one error so a misconfigured
    /// deployment can be fixed in one pass.
    pub fn into_settings(self) -> Result<Settings> {
        let mut missing = Vec::new();

        let secret_key = present(self.secret_key, "CLP_SECRET_KEY", &mut missing);
        let gemini_api_key = present(self.gemini.api_key.clone(), "GEMINI_API_KEY", &mut missing);

        let backend = match self.backend.kind {
            BackendKind::Supabase => {
                let url = present(self.supabase.url, "SUPABASE_URL", &mut missing);
                let anon_key = present(self.supabase.anon_key, "SUPABASE_KEY", &mut missing);
                let service_key =
                    present(self.supabase.service_key, "SUPABASE_SERVICE_KEY", &mut missing);
                BackendSettings::Supabase(SupabaseSettings {
                    url: url.trim_end_matches('/').to_string(),
                    anon_key,
                    service_key,
                    bucket: self.supabase.bucket,
                })
            }
            BackendKind::Local => {
                let data_dir = default_data_dir();
                BackendSettings::Local(LocalSettings {
                    database_path: self
                        .backend
                        .database_path
                        .unwrap_or_else(|| data_dir.join("clp.db")),
                    storage_root: self
                        .backend
                        .storage_root
                        .unwrap_or_else(|| data_dir.join("storage")),
                })
            }
        };

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "required configuration values are not set: {}",
                missing.join(", ")
            )));
        }

        Ok(Settings {
            secret_key,
            gemini_api_key,
            server: self.server,
            backend,
            gemini: self.gemini,
            editor: self.editor,
            rate_limit: self.rate_limit,
            logging: self.logging,
        })
    }
}

/// Load `.env`, the TOML file and environment overrides, then validate
pub fn load_settings(cli_arg: Option<&Path>) -> Result<Settings> {
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {}", path.display());
    }
    let mut config = TomlConfig::load_or_default(cli_arg)?;
    config.apply_env_overrides();
    config.into_settings()
}

/// Resolve the config file path (CLI → ENV → user config dir)
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Some(path) = env_value(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir()
        .map(|d| d.join("clp").join("config.toml"))
        .filter(|p| p.exists())
}

/// OS-dependent default data folder for the local backend
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("clp"))
        .unwrap_or_else(|| PathBuf::from("./clp_data"))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn present(value: Option<String>, name: &str, missing: &mut Vec<String>) -> String {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => v,
        None => {
            missing.push(name.to_string());
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.backend.kind, BackendKind::Supabase);
        assert_eq!(config.supabase.bucket, "clp_files");
        assert_eq!(config.gemini.model, "gemini-2.5-flash");
        assert_eq!(config.rate_limit.per_hour, 50);
        assert_eq!(config.rate_limit.per_day, 200);
    }

    #[test]
    fn test_missing_values_reported_together() {
        let config = TomlConfig::default();
        let err = config.into_settings().unwrap_err().to_string();
        assert!(err.contains("CLP_SECRET_KEY"));
        assert!(err.contains("GEMINI_API_KEY"));
        assert!(err.contains("SUPABASE_URL"));
        assert!(err.contains("SUPABASE_SERVICE_KEY"));
    }

    #[test]
    fn test_local_backend_needs_no_supabase() {
        let mut config = TomlConfig::default();
        config.secret_key = Some("s3cret".to_string());
        config.gemini.api_key = Some("key".to_string());
        config.backend.kind = BackendKind::Local;
        config.backend.database_path = Some(PathBuf::from("/tmp/clp-test.db"));

        let settings = config.into_settings().unwrap();
        match &settings.backend {
            BackendSettings::Local(local) => {
                assert_eq!(local.database_path, PathBuf::from("/tmp/clp-test.db"));
            }
            BackendSettings::Supabase(_) => panic!("expected local backend"),
        }
        assert!(settings.supabase_url().is_none());
    }

    #[test]
    fn test_supabase_url_trailing_slash_trimmed() {
        let mut config = TomlConfig::default();
        config.secret_key = Some("s3cret".to_string());
        config.gemini.api_key = Some("key".to_string());
        config.supabase.url = Some("https://abc.supabase.co/".to_string());
        config.supabase.anon_key = Some("anon".to_string());
        config.supabase.service_key = Some("service".to_string());

        let settings = config.into_settings().unwrap();
        assert_eq!(settings.supabase_url(), Some("https://abc.supabase.co"));
    }
}
