pub mod ai;
pub mod api;
pub mod categorizer;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod worker;

pub use api::{create_router, AppState};
pub use categorizer::{DepartmentMatch, DepartmentMatcher};
pub use config::Config;
pub use error::{CirculatorError, ConfigError, ProcessError, Result, StorageError};
pub use pipeline::{CircularPipeline, PipelineError, PipelineOutcome};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
