//! Configuration loading, validation, and management for LexChamber.
//!
//! Loads configuration from `$LEXCHAMBER_CONFIG` or `./lexchamber.toml`
//! with environment variable overrides. Validates all settings at startup;
//! the result is immutable for the life of the process.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `lexchamber.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider API key (`GOOGLE_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Inference provider: "gemini" or "openai" (any OpenAI-compatible endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Override the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model identifier (`MODEL_NAME`)
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Wall-clock deadline for one inference call (`INFERENCE_TIMEOUT_SECONDS`)
    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,

    /// SQLite database path (`DB_PATH`)
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Persona used when a chamber has no override (`DEFAULT_PERSONA`)
    #[serde(default = "default_persona")]
    pub default_persona: String,

    /// Answer language used when a chamber has no override (`DEFAULT_LANGUAGE`)
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Answer languages offered to users
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// Prior turns included in the prompt. 0 keeps prompting history-less.
    #[serde(default)]
    pub history_turns: usize,

    /// HTTP gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_inference_timeout_secs() -> u64 {
    60
}
fn default_db_path() -> String {
    "./consultations.db".into()
}
fn default_persona() -> String {
    "Senior Legal Counsel".into()
}
fn default_language() -> String {
    "English".into()
}
fn default_languages() -> Vec<String> {
    ["English", "Hindi", "Spanish", "French", "German"]
        .iter()
        .map(|s| s.to_string())
        .collect()
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
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("inference_timeout_secs", &self.inference_timeout_secs)
            .field("db_path", &self.db_path)
            .field("default_persona", &self.default_persona)
            .field("default_language", &self.default_language)
            .field("languages", &self.languages)
            .field("history_turns", &self.history_turns)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Header carrying the email asserted by the upstream identity provider
    #[serde(default = "default_identity_header")]
    pub identity_header: String,

    /// Header carrying the display name asserted by the identity provider
    #[serde(default = "default_identity_name_header")]
    pub identity_name_header: String,

    /// Requests per minute per session token
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: usize,

    /// Origins allowed by CORS in addition to same-origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    8501
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_identity_header() -> String {
    "X-Authenticated-Email".into()
}
fn default_identity_name_header() -> String {
    "X-Authenticated-Name".into()
}
fn default_rate_limit() -> usize {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            identity_header: default_identity_header(),
            identity_name_header: default_identity_name_header(),
            rate_limit_per_minute: default_rate_limit(),
            allowed_origins: vec![],
        }
    }
}

impl AppConfig {
    /// Load configuration from `$LEXCHAMBER_CONFIG` or `./lexchamber.toml`,
    /// then apply environment overrides:
    /// - `GOOGLE_API_KEY`
    /// - `MODEL_NAME`
    /// - `INFERENCE_TIMEOUT_SECONDS`
    /// - `DB_PATH`
    /// - `DEFAULT_PERSONA`, `DEFAULT_LANGUAGE`
    /// - `LEXCHAMBER_PROVIDER`, `LEXCHAMBER_API_URL`
    /// - `LEXCHAMBER_HOST`, `LEXCHAMBER_PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path (no env overrides).
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

    /// Path of the configuration file consulted by [`AppConfig::load`].
    pub fn config_path() -> PathBuf {
        std::env::var("LEXCHAMBER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("lexchamber.toml"))
    }

    /// Apply environment overrides through `lookup` (the process environment
    /// in production, a map in tests). Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GOOGLE_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(model) = get("MODEL_NAME") {
            self.model = model;
        }
        if let Some(raw) = get("INFERENCE_TIMEOUT_SECONDS") {
            self.inference_timeout_secs = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "INFERENCE_TIMEOUT_SECONDS must be a whole number of seconds, got '{raw}'"
                ))
            })?;
        }
        if let Some(path) = get("DB_PATH") {
            self.db_path = path;
        }
        if let Some(persona) = get("DEFAULT_PERSONA") {
            self.default_persona = persona;
        }
        if let Some(language) = get("DEFAULT_LANGUAGE") {
            if !self.languages.iter().any(|l| l.eq_ignore_ascii_case(&language)) {
                self.languages.push(language.clone());
            }
            self.default_language = language;
        }
        if let Some(provider) = get("LEXCHAMBER_PROVIDER") {
            self.provider = provider;
        }
        if let Some(url) = get("LEXCHAMBER_API_URL") {
            self.api_url = Some(url);
        }
        if let Some(host) = get("LEXCHAMBER_HOST") {
            self.gateway.host = host;
        }
        if let Some(raw) = get("LEXCHAMBER_PORT") {
            self.gateway.port = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("LEXCHAMBER_PORT is not a port: '{raw}'"))
            })?;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inference_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "inference_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.default_persona.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_persona must not be empty".into(),
            ));
        }

        if self.default_language.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_language must not be empty".into(),
            ));
        }

        if !self
            .languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(&self.default_language))
        {
            return Err(ConfigError::ValidationError(format!(
                "default_language '{}' is not in languages",
                self.default_language
            )));
        }

        if self.db_path.trim().is_empty() {
            return Err(ConfigError::ValidationError("db_path must not be empty".into()));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The API key, or the fatal startup error when it is missing.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }

    /// Whether `language` is one of the offered answer languages.
    pub fn supports_language(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l.eq_ignore_ascii_case(language))
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: None,
            model: default_model(),
            temperature: default_temperature(),
            inference_timeout_secs: default_inference_timeout_secs(),
            db_path: default_db_path(),
            default_persona: default_persona(),
            default_language: default_language(),
            languages: default_languages(),
            history_turns: 0,
            gateway: GatewayConfig::default(),
        }
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

    #[error("GOOGLE_API_KEY is not set")]
    MissingApiKey,
}
