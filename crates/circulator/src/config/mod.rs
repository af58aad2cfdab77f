pub mod loader;
pub mod schema;

pub use schema::{AiConfig, Config, DatabaseConfig, MailConfig, OcrConfig, ServerConfig};
