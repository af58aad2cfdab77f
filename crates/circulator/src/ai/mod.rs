//! Local model inference: summarization and sentence embeddings.
//!
//! The llama-backed summarizer is compiled with the "ai" feature flag.
//! Without it, [`load_summarizer`] falls back to the extractive summarizer.

pub mod embedder;
pub mod extractive;
pub mod model_manager;
pub mod summarizer;

#[cfg(feature = "ai")]
pub mod llama;

use std::sync::Arc;

use crate::config::AiConfig;

pub use embedder::{CandleEmbedder, EmbedError, Embedder};
pub use extractive::ExtractiveSummarizer;
pub use model_manager::{ModelError, ModelManager, ModelSource};
pub use summarizer::{SummarizeError, Summarizer, Summary};

#[cfg(feature = "ai")]
pub use llama::{LlamaSettings, LlamaSummarizer};

/// Builds the summarizer for this build, fetching model weights if needed.
#[cfg(feature = "ai")]
pub fn load_summarizer(config: &AiConfig) -> crate::Result<Arc<dyn Summarizer>> {
    let manager = ModelManager::new(&config.model_cache_dir, config.llm_source.clone());
    let model_path = manager.ensure_file(&config.llm_file)?;

    let settings = LlamaSettings {
        context_size: config.context_size,
        threads: config.threads,
        batch_size: config.batch_size,
        max_tokens: config.max_tokens,
    };
    Ok(Arc::new(LlamaSummarizer::new(&model_path, settings)?))
}

/// Builds the summarizer for this build, fetching model weights if needed.
#[cfg(not(feature = "ai"))]
pub fn load_summarizer(config: &AiConfig) -> crate::Result<Arc<dyn Summarizer>> {
    log::warn!(
        "Built without the \"ai\" feature; using the extractive summarizer instead of {}",
        config.llm_file
    );
    Ok(Arc::new(ExtractiveSummarizer::new(config.max_tokens)))
}

/// Loads the sentence embedder from the configured source.
pub fn load_embedder(config: &AiConfig) -> crate::Result<Arc<dyn Embedder>> {
    let manager = ModelManager::new(&config.model_cache_dir, config.embedding_source.clone());
    Ok(Arc::new(CandleEmbedder::load(&manager)?))
}
