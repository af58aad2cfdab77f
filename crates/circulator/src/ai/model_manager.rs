//! Model download and cache management.
//!
//! Every model file, whether LLM weights or embedding tokenizer/config/weights,
//! is resolved through a [`ModelSource`] and a local cache directory: a file
//! already present in the cache is used as-is, otherwise it is fetched once.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use log::{debug, info, warn};
use thiserror::Error;

/// Errors that can occur during model management.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to create cache directory: {0}")]
    CacheDirectoryCreation(#[from] std::io::Error),

    #[error("Failed to download model from Hugging Face: {0}")]
    HuggingFaceDownload(String),

    #[error("Failed to fetch model from object storage: {0}")]
    ObjectStorageDownload(String),

    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid model source '{0}': expected local:<dir>, hf:<repo>, gs://... or http(s)://...")]
    InvalidSource(String),
}

/// Where model files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A directory that already holds the files; nothing is fetched.
    Local { dir: PathBuf },
    /// A Hugging Face Hub model repository.
    Hub { repo: String },
    /// A bucket prefix (`gs://bucket/path`) or HTTP(S) base URL.
    ObjectStorage { uri: String },
}

impl FromStr for ModelSource {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(dir) = s.strip_prefix("local:") {
            if dir.is_empty() {
                return Err(ModelError::InvalidSource(s.to_string()));
            }
            return Ok(Self::Local {
                dir: PathBuf::from(dir),
            });
        }
        if let Some(repo) = s.strip_prefix("hf:") {
            if !repo.contains('/') {
                return Err(ModelError::InvalidSource(s.to_string()));
            }
            return Ok(Self::Hub {
                repo: repo.to_string(),
            });
        }
        if s.starts_with("gs://") || s.starts_with("https://") || s.starts_with("http://") {
            return Ok(Self::ObjectStorage {
                uri: s.trim_end_matches('/').to_string(),
            });
        }
        Err(ModelError::InvalidSource(s.to_string()))
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { dir } => write!(f, "local:{}", dir.display()),
            Self::Hub { repo } => write!(f, "hf:{}", repo),
            Self::ObjectStorage { uri } => write!(f, "{}", uri),
        }
    }
}

/// Resolves model files from a [`ModelSource`] into a local cache.
pub struct ModelManager {
    cache_dir: PathBuf,
    source: ModelSource,
}

impl ModelManager {
    pub fn new(cache_dir: impl AsRef<Path>, source: ModelSource) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    /// Returns the path a file would have once available locally.
    pub fn file_path(&self, file: &str) -> PathBuf {
        match &self.source {
            ModelSource::Local { dir } => dir.join(file),
            ModelSource::Hub { repo } => self.cache_dir.join(cache_namespace(repo)).join(file),
            ModelSource::ObjectStorage { uri } => {
                self.cache_dir.join(cache_namespace(uri)).join(file)
            }
        }
    }

    /// Checks if the file is already available without fetching.
    pub fn is_available(&self, file: &str) -> bool {
        self.file_path(file).exists()
    }

    /// Ensures `file` is available locally, fetching it if necessary.
    pub fn ensure_file(&self, file: &str) -> Result<PathBuf, ModelError> {
        let path = self.file_path(file);

        if path.exists() {
            debug!("Model file already available at: {}", path.display());
            return Ok(path);
        }

        match &self.source {
            ModelSource::Local { .. } => Err(ModelError::ModelNotFound(path.display().to_string())),
            ModelSource::Hub { repo } => {
                self.ensure_parent(&path)?;
                self.fetch_from_hub(repo, file, &path)?;
                Ok(path)
            }
            ModelSource::ObjectStorage { uri } => {
                self.ensure_parent(&path)?;
                self.fetch_from_object_storage(uri, file, &path)?;
                Ok(path)
            }
        }
    }

    fn ensure_parent(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn fetch_from_hub(&self, repo: &str, file: &str, target: &Path) -> Result<(), ModelError> {
        info!("Downloading {} from Hugging Face repo {}...", file, repo);

        let api = Api::new().map_err(|e| ModelError::HuggingFaceDownload(e.to_string()))?;
        let downloaded_path = api
            .repo(Repo::new(repo.to_string(), RepoType::Model))
            .get(file)
            .map_err(|e| ModelError::HuggingFaceDownload(e.to_string()))?;

        info!("Model file downloaded to: {}", downloaded_path.display());

        // hf-hub keeps its own cache; link to it instead of duplicating multi-GB weights.
        #[cfg(unix)]
        {
            if let Err(e) = std::os::unix::fs::symlink(&downloaded_path, target) {
                warn!("Failed to create symlink, copying instead: {}", e);
                std::fs::copy(&downloaded_path, target)?;
            }
        }

        #[cfg(not(unix))]
        {
            std::fs::copy(&downloaded_path, target)?;
        }

        Ok(())
    }

    fn fetch_from_object_storage(
        &self,
        uri: &str,
        file: &str,
        target: &Path,
    ) -> Result<(), ModelError> {
        let remote = format!("{}/{}", uri, file);
        info!("Fetching {} into {}...", remote, target.display());

        // Download next to the target and rename, so an interrupted fetch never
        // leaves a truncated file that later looks cached.
        let partial = target.with_extension("partial");

        if remote.starts_with("gs://") {
            let output = Command::new("gsutil")
                .args(["cp", &remote])
                .arg(&partial)
                .output()
                .map_err(|e| {
                    ModelError::ObjectStorageDownload(format!(
                        "Failed to run gsutil: {}. Make sure the Google Cloud SDK is installed.",
                        e
                    ))
                })?;

            if !output.status.success() {
                let _ = std::fs::remove_file(&partial);
                return Err(ModelError::ObjectStorageDownload(format!(
                    "gsutil cp failed: {}",
                    String::from_utf8_lossy(&output.stderr)
                )));
            }
        } else {
            let mut response = reqwest::blocking::get(&remote)
                .and_then(|r| r.error_for_status())
                .map_err(|e| ModelError::ObjectStorageDownload(e.to_string()))?;
            let mut out = std::fs::File::create(&partial)?;
            if let Err(e) = response.copy_to(&mut out) {
                let _ = std::fs::remove_file(&partial);
                return Err(ModelError::ObjectStorageDownload(e.to_string()));
            }
        }

        std::fs::rename(&partial, target)?;
        Ok(())
    }
}

/// Directory name under the cache for a given repo or URI.
fn cache_namespace(source: &str) -> String {
    let trimmed = source
        .trim_start_matches("gs://")
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}
