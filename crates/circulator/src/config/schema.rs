use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use crate::ai::ModelSource;
use crate::error::ConfigError;

/// Runtime configuration, assembled once at startup by
/// [`Config::from_env`](crate::config::loader).
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub mail: MailConfig,
    pub ai: AiConfig,
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub upload_dir: PathBuf,
    /// Request body limit for `POST /upload`.
    pub max_upload_bytes: usize,
}

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Full connection URL; when set the individual parts are ignored.
    pub url: Option<SecretString>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    pub host: Option<String>,
    pub port: u16,
    /// Create the `students` table on startup (development only).
    pub run_migrations: bool,
}

pub const DEFAULT_DB_PORT: u16 = 5432;

impl DatabaseConfig {
    /// Builds the PostgreSQL connection URL from `DB_*` parts, or returns the
    /// explicit `DATABASE_URL`. Credentials are percent-encoded.
    pub fn connection_url(&self) -> Result<SecretString, ConfigError> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        let host = self
            .host
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVariable("DB_HOST".to_string()))?;
        let name = self
            .name
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVariable("DB_NAME".to_string()))?;

        let invalid = |reason: &str| ConfigError::InvalidValue {
            name: "DB_HOST".to_string(),
            reason: reason.to_string(),
        };

        let mut url = reqwest::Url::parse(&format!("postgres://{}:{}/{}", host, self.port, name))
            .map_err(|e| invalid(&e.to_string()))?;

        if let Some(user) = self.user.as_deref() {
            url.set_username(user)
                .map_err(|_| invalid("cannot attach user to this host"))?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password.expose_secret()))
                .map_err(|_| invalid("cannot attach password to this host"))?;
        }

        Ok(SecretString::from(url.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from: String,
    pub subject: String,
    /// Number of delivery worker threads.
    pub workers: usize,
    /// Capacity of the bounded delivery queue.
    pub queue_capacity: usize,
}

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_MAIL_FROM: &str = "admin@univ.edu";
pub const DEFAULT_MAIL_SUBJECT: &str = "University Circular Update";
pub const DEFAULT_MAIL_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct AiConfig {
    /// Directory where fetched model files are cached.
    pub model_cache_dir: PathBuf,
    pub llm_source: ModelSource,
    /// GGUF weights file name within the LLM source.
    pub llm_file: String,
    pub context_size: u32,
    pub threads: i32,
    pub batch_size: u32,
    /// Generation budget for a summary, in tokens.
    pub max_tokens: usize,
    pub embedding_source: ModelSource,
    /// Scores strictly above this select a department.
    pub similarity_threshold: f32,
}

pub const DEFAULT_MODEL_CACHE_DIR: &str = "./models";
pub const DEFAULT_LLM_SOURCE: &str = "hf:TheBloke/Mistral-7B-Instruct-v0.1-GGUF";
pub const DEFAULT_LLM_FILE: &str = "mistral-7b-instruct-v0.1.Q4_K_M.gguf";
pub const DEFAULT_CONTEXT_SIZE: u32 = 4096;
pub const DEFAULT_THREADS: i32 = 8;
pub const DEFAULT_BATCH_SIZE: u32 = 512;
pub const DEFAULT_MAX_TOKENS: usize = 300;
pub const DEFAULT_EMBEDDING_SOURCE: &str = "hf:sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub languages: Vec<String>,
    pub dpi: u32,
    /// OCR rendered PDF pages when the embedded text layer is unusable.
    pub pdf_fallback: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: vec!["eng".to_string()],
            dpi: 300,
            pdf_fallback: true,
        }
    }
}
