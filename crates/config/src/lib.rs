//! Configuration loading, validation, and management for SurveyChat.
//!
//! Loads configuration from `~/.surveychat/config.toml` (or an explicit
//! path) with environment variable overrides. Validates all settings at
//! startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use surveychat_core::AssemblerConfig;

/// The root configuration structure.
///
/// Maps directly to `~/.surveychat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion and file APIs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-style API (`/responses`, `/files`)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Model used when a request does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Upper bound for each remote call, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Purpose tag sent with uploaded documents
    #[serde(default = "default_upload_purpose")]
    pub upload_purpose: String,

    /// HTTP listener configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Cross-origin policy
    #[serde(default)]
    pub cors: CorsConfig,

    /// Per-endpoint instructions
    #[serde(default)]
    pub prompts: PromptsConfig,
}

fn default_api_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_upload_purpose() -> String {
    "user_data".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_base_url", &self.api_base_url)
            .field("default_model", &self.default_model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("upload_purpose", &self.upload_purpose)
            .field("gateway", &self.gateway)
            .field("cors", &self.cors)
            .field("prompts", &self.prompts)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Largest accepted request body (covers PDF uploads)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Which origins receive a matching `Access-Control-Allow-Origin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Answer every origin with `*`.
    #[serde(default = "default_true")]
    pub allow_all: bool,

    /// Exact origins echoed back when `allow_all` is off.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Origin sent when the request origin is not in the list.
    #[serde(default = "default_origin")]
    pub default_origin: String,
}

fn default_true() -> bool {
    true
}
fn default_origin() -> String {
    "https://survey.qualtrics.com".into()
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_all: true,
            allowed_origins: vec![],
            default_origin: default_origin(),
        }
    }
}

impl CorsConfig {
    /// The `Access-Control-Allow-Origin` value for a request origin.
    pub fn allow_origin_for(&self, origin: Option<&str>) -> &str {
        if self.allow_all {
            return "*";
        }
        origin
            .and_then(|o| self.allowed_origins.iter().find(|allowed| *allowed == o))
            .map(String::as_str)
            .unwrap_or(&self.default_origin)
    }
}

/// Instructions for a single endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptProfile {
    pub system_prompt: String,

    #[serde(default = "default_max_reply_words")]
    pub max_reply_words: u32,
}

fn default_max_reply_words() -> u32 {
    120
}

impl PromptProfile {
    fn new(system_prompt: &str, max_reply_words: u32) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_reply_words,
        }
    }
}

impl From<&PromptProfile> for AssemblerConfig {
    fn from(profile: &PromptProfile) -> Self {
        AssemblerConfig {
            system_prompt: profile.system_prompt.clone(),
            max_reply_words: profile.max_reply_words,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// User text sent with a freshly uploaded document
    #[serde(default = "default_opening_prompt")]
    pub opening_prompt: String,

    /// Free chat, optionally seeded with earlier survey answers
    #[serde(default = "default_chat_profile")]
    pub chat: PromptProfile,

    /// First reply after a document upload
    #[serde(default = "default_pdf_start_profile")]
    pub pdf_start: PromptProfile,

    /// Follow-up questions about an uploaded document
    #[serde(default = "default_pdf_turn_profile")]
    pub pdf_turn: PromptProfile,
}

fn default_chat_profile() -> PromptProfile {
    PromptProfile::new("You are an assistant in a research survey.", 120)
}
fn default_pdf_start_profile() -> PromptProfile {
    PromptProfile::new(
        "You are a nutrition assistant. Give concise, supportive feedback with actionable suggestions.",
        120,
    )
}
fn default_pdf_turn_profile() -> PromptProfile {
    PromptProfile::new(
        "You are answering questions about the attached PDF. \
         Do not repeat prior advice; build on it or ask a clarifying question. \
         Mention page numbers when clear from the text.",
        80,
    )
}
fn default_opening_prompt() -> String {
    "Please review the attached PDF and provide brief feedback, then invite the user \
     to ask questions if they would like nutrition advice."
        .into()
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            opening_prompt: default_opening_prompt(),
            chat: default_chat_profile(),
            pdf_start: default_pdf_start_profile(),
            pdf_turn: default_pdf_turn_profile(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or the default location when `None`.
    ///
    /// Environment variables override file values:
    /// - `SURVEYCHAT_API_KEY`, then `OPENAI_API_KEY` (when no key is configured)
    /// - `SURVEYCHAT_MODEL`
    /// - `SURVEYCHAT_BASE_URL`
    /// - `SURVEYCHAT_PORT`
    /// - `SURVEYCHAT_ALLOWED_ORIGINS` (comma separated; disables `allow_all`)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.api_key.is_none() {
            self.api_key = set("SURVEYCHAT_API_KEY").or_else(|| set("OPENAI_API_KEY"));
        }

        if let Some(model) = set("SURVEYCHAT_MODEL") {
            self.default_model = model;
        }

        if let Some(url) = set("SURVEYCHAT_BASE_URL") {
            self.api_base_url = url;
        }

        if let Some(port) = set("SURVEYCHAT_PORT") {
            self.gateway.port = port.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("SURVEYCHAT_PORT is not a port: {port}"))
            })?;
        }

        if let Some(origins) = set("SURVEYCHAT_ALLOWED_ORIGINS") {
            self.cors.allow_all = false;
            self.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".surveychat")
    }

    /// Per-call timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_model must not be empty".into(),
            ));
        }

        if !self.cors.allow_all && self.cors.default_origin.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "cors.default_origin is required when cors.allow_all is false".into(),
            ));
        }

        for (name, profile) in [
            ("chat", &self.prompts.chat),
            ("pdf_start", &self.prompts.pdf_start),
            ("pdf_turn", &self.prompts.pdf_turn),
        ] {
            if profile.system_prompt.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "prompts.{name}.system_prompt must not be empty"
                )));
            }
            if profile.max_reply_words == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "prompts.{name}.max_reply_words must be greater than 0"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: default_api_base_url(),
            default_model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
            upload_purpose: default_upload_purpose(),
            gateway: GatewayConfig::default(),
            cors: CorsConfig::default(),
            prompts: PromptsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
