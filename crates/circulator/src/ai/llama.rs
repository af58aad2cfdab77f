//! Circular summarizer backed by a local GGUF model through llama-cpp-2.

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Mutex;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::token::data_array::LlamaTokenDataArray;
use log::{debug, info};

use super::summarizer::{build_prompt, SummarizeError, Summarizer, Summary, STOP_MARKER};

/// Inference parameters for the summarizer.
#[derive(Debug, Clone, Copy)]
pub struct LlamaSettings {
    pub context_size: u32,
    pub threads: i32,
    pub batch_size: u32,
    pub max_tokens: usize,
}

struct LlamaEngine {
    model: LlamaModel,
    backend: LlamaBackend,
    ctx_params: LlamaContextParams,
}

// SAFETY: LlamaEngine is only reachable through the Mutex in LlamaSummarizer.
// A fresh context is created per generation, so no llama state is shared
// between calls.
unsafe impl Send for LlamaEngine {}

impl LlamaEngine {
    fn load(model_path: &Path, settings: &LlamaSettings) -> Result<Self, SummarizeError> {
        info!("Initializing LLM backend...");
        let backend =
            LlamaBackend::init().map_err(|e| SummarizeError::BackendInit(e.to_string()))?;

        info!("Loading model from: {}", model_path.display());
        let model_params = LlamaModelParams::default();
        let model = LlamaModel::load_from_file(&backend, model_path, &model_params)
            .map_err(|e| SummarizeError::ModelLoad(e.to_string()))?;

        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(settings.context_size))
            .with_n_batch(settings.batch_size)
            .with_n_threads(settings.threads)
            .with_n_threads_batch(settings.threads);

        info!(
            "LLM initialized (n_ctx={}, n_threads={}, n_batch={})",
            settings.context_size, settings.threads, settings.batch_size
        );
        Ok(Self {
            model,
            backend,
            ctx_params,
        })
    }

    /// Generates up to `settings.max_tokens` tokens for `prompt`, stopping at
    /// end-of-generation or when the stop marker appears.
    fn generate(&self, prompt: &str, settings: &LlamaSettings) -> Result<String, SummarizeError> {
        let tokens = self
            .model
            .str_to_token(prompt, AddBos::Always)
            .map_err(|e| SummarizeError::Tokenization(e.to_string()))?;

        let n_tokens = tokens.len();
        let context_size = settings.context_size as usize;
        debug!("Tokenized prompt into {} tokens", n_tokens);

        if n_tokens == 0 || n_tokens + settings.max_tokens > context_size {
            return Err(SummarizeError::PromptTooLong {
                prompt_tokens: n_tokens,
                max_tokens: settings.max_tokens,
                context_size,
            });
        }

        let mut ctx = self
            .model
            .new_context(&self.backend, self.ctx_params.clone())
            .map_err(|e| SummarizeError::ContextCreation(e.to_string()))?;

        // The prompt is decoded in batch-sized chunks; logits are only needed
        // for the final prompt token.
        let batch_size = (settings.batch_size as usize).max(1);
        let mut batch = LlamaBatch::new(batch_size, 1);
        for (chunk_idx, chunk) in tokens.chunks(batch_size).enumerate() {
            batch.clear();
            for (offset, token) in chunk.iter().enumerate() {
                let pos = chunk_idx * batch_size + offset;
                let is_last = pos == n_tokens - 1;
                batch
                    .add(*token, pos as i32, &[0], is_last)
                    .map_err(|e| SummarizeError::Inference(format!("Failed to add token: {}", e)))?;
            }
            ctx.decode(&mut batch).map_err(|e| {
                SummarizeError::Inference(format!("Failed to decode prompt: {}", e))
            })?;
        }

        let mut output = String::new();
        let mut n_cur = n_tokens;

        for _ in 0..settings.max_tokens {
            let candidates = ctx.candidates_ith(batch.n_tokens() - 1);
            let mut candidates_array = LlamaTokenDataArray::from_iter(candidates, false);

            let seed = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u32)
                .unwrap_or(42);
            let new_token = candidates_array.sample_token(seed);

            if self.model.is_eog_token(new_token) {
                break;
            }

            let token_str = self
                .model
                .token_to_str(new_token, Special::Tokenize)
                .map_err(|e| SummarizeError::Inference(format!("Failed to decode token: {}", e)))?;

            output.push_str(&token_str);

            if output.contains(STOP_MARKER) {
                break;
            }

            batch.clear();
            batch
                .add(new_token, n_cur as i32, &[0], true)
                .map_err(|e| SummarizeError::Inference(format!("Failed to add token: {}", e)))?;

            ctx.decode(&mut batch)
                .map_err(|e| SummarizeError::Inference(format!("Failed to decode: {}", e)))?;

            n_cur += 1;
        }

        Ok(output)
    }
}

/// Summarizer over a llama model. One generation runs at a time.
pub struct LlamaSummarizer {
    engine: Mutex<LlamaEngine>,
    settings: LlamaSettings,
}

impl LlamaSummarizer {
    pub fn new(model_path: &Path, settings: LlamaSettings) -> Result<Self, SummarizeError> {
        let engine = LlamaEngine::load(model_path, &settings)?;
        Ok(Self {
            engine: Mutex::new(engine),
            settings,
        })
    }

    pub fn settings(&self) -> &LlamaSettings {
        &self.settings
    }
}

impl Summarizer for LlamaSummarizer {
    fn summarize(&self, text: &str) -> Result<Summary, SummarizeError> {
        let prompt = build_prompt(text);
        debug!("Summarization prompt is {} characters", prompt.len());

        let engine = self
            .engine
            .lock()
            .map_err(|_| SummarizeError::MutexPoisoned)?;
        let raw = engine.generate(&prompt, &self.settings)?;
        debug!("LLM response:\n{}", raw);

        Ok(Summary::from_output(&raw))
    }
}
