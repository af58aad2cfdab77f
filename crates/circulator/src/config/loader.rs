use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;

use crate::ai::ModelSource;
use crate::config::schema::*;
use crate::error::ConfigError;
use crate::secrets::{resolve_secret, resolve_secret_optional, SecretError};

impl Config {
    /// Loads configuration from the process environment. A `.env` file in
    /// the working directory is honoured when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let server = ServerConfig {
            port: env.parse_or("PORT", DEFAULT_PORT)?,
            upload_dir: PathBuf::from(env.get_or("UPLOAD_DIR", DEFAULT_UPLOAD_DIR)),
            max_upload_bytes: env.parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        };

        let database = DatabaseConfig {
            url: env.get("DATABASE_URL").map(SecretString::from),
            name: env.get("DB_NAME"),
            user: env.get("DB_USER"),
            password: resolve_secret_optional(
                env.get("DB_PASS").as_deref(),
                env.get("DB_PASS_FILE").as_deref(),
            )?,
            host: env.get("DB_HOST"),
            port: env.parse_or("DB_PORT", DEFAULT_DB_PORT)?,
            run_migrations: env.parse_or("CIRCULATOR_RUN_MIGRATIONS", false)?,
        };

        let workers: usize = env.parse_or("MAIL_WORKERS", DEFAULT_MAIL_WORKERS)?;
        if workers == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAIL_WORKERS".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let mail = MailConfig {
            smtp_host: env.get_or("SMTP_HOST", DEFAULT_SMTP_HOST),
            smtp_port: env.parse_or("SMTP_PORT", DEFAULT_SMTP_PORT)?,
            username: env.require("EMAIL_USER")?,
            password: resolve_secret(
                env.get("EMAIL_PASS").as_deref(),
                env.get("EMAIL_PASS_FILE").as_deref(),
            )
            .map_err(|e| match e {
                SecretError::NoSourceProvided => {
                    ConfigError::MissingVariable("EMAIL_PASS".to_string())
                }
                other => ConfigError::Secret(other),
            })?,
            from: env.get_or("MAIL_FROM", DEFAULT_MAIL_FROM),
            subject: env.get_or("MAIL_SUBJECT", DEFAULT_MAIL_SUBJECT),
            workers,
            queue_capacity: env.parse_or("MAIL_QUEUE_CAPACITY", workers * 64)?,
        };

        let similarity_threshold: f32 =
            env.parse_or("SIMILARITY_THRESHOLD", DEFAULT_SIMILARITY_THRESHOLD)?;
        if !(-1.0..=1.0).contains(&similarity_threshold) {
            return Err(ConfigError::InvalidValue {
                name: "SIMILARITY_THRESHOLD".to_string(),
                reason: "must be within [-1, 1]".to_string(),
            });
        }

        let ai = AiConfig {
            model_cache_dir: PathBuf::from(env.get_or("MODEL_CACHE_DIR", DEFAULT_MODEL_CACHE_DIR)),
            llm_source: env.model_source("LLM_MODEL_SOURCE", DEFAULT_LLM_SOURCE)?,
            llm_file: env.get_or("LLM_MODEL_FILE", DEFAULT_LLM_FILE),
            context_size: env.parse_or("LLM_CONTEXT_SIZE", DEFAULT_CONTEXT_SIZE)?,
            threads: env.parse_or("LLM_THREADS", default_threads())?,
            batch_size: env.parse_or("LLM_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            max_tokens: env.parse_or("SUMMARY_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
            embedding_source: env.model_source("EMBEDDING_MODEL_SOURCE", DEFAULT_EMBEDDING_SOURCE)?,
            similarity_threshold,
        };

        let ocr_defaults = OcrConfig::default();
        let ocr = OcrConfig {
            languages: env
                .get("OCR_LANGUAGES")
                .map(|v| {
                    v.split(['+', ','])
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(ocr_defaults.languages),
            dpi: env.parse_or("OCR_DPI", ocr_defaults.dpi)?,
            pdf_fallback: env.parse_or("OCR_PDF_FALLBACK", ocr_defaults.pdf_fallback)?,
        };

        Ok(Self {
            server,
            database,
            mail,
            ai,
            ocr,
        })
    }
}

fn default_threads() -> i32 {
    (num_cpus::get() as i32).min(DEFAULT_THREADS)
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Returns the value for `key`, treating blank values as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                name: key.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn model_source(&self, key: &str, default: &str) -> Result<ModelSource, ConfigError> {
        let raw = self.get_or(key, default);
        raw.parse().map_err(|e: crate::ai::ModelError| ConfigError::InvalidValue {
            name: key.to_string(),
            reason: e.to_string(),
        })
    }
}
