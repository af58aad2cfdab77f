//! Sentence embeddings for department matching.
//!
//! [`CandleEmbedder`] runs a BERT sentence-transformer (all-MiniLM-L6-v2 by
//! default) on the CPU with mean pooling and L2 normalisation, so the dot
//! product of two embeddings is their cosine similarity.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use log::{debug, info};
use thiserror::Error;
use tokenizers::Tokenizer;

use super::model_manager::{ModelError, ModelManager};

/// Maximum sequence length accepted by BERT position embeddings.
const MAX_TOKENS: usize = 512;

const TOKENIZER_FILE: &str = "tokenizer.json";
const CONFIG_FILE: &str = "config.json";
const WEIGHTS_FILE: &str = "model.safetensors";

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Failed to fetch embedding model: {0}")]
    Model(#[from] ModelError),

    #[error("Failed to load embedding model: {0}")]
    ModelLoad(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Embedding inference failed: {0}")]
    Inference(#[from] candle_core::Error),

    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

/// Maps texts to fixed-size vectors. Output order matches input order.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

pub struct CandleEmbedder {
    device: Device,
    model: BertModel,
    tokenizer: Tokenizer,
}

impl CandleEmbedder {
    /// Fetches (if needed) and loads tokenizer, config and weights.
    pub fn load(manager: &ModelManager) -> Result<Self, EmbedError> {
        info!("Loading embedding model from {}", manager.source());

        let tokenizer_path = manager.ensure_file(TOKENIZER_FILE)?;
        let config_path = manager.ensure_file(CONFIG_FILE)?;
        let weights_path = manager.ensure_file(WEIGHTS_FILE)?;

        let device = Device::Cpu;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to load tokenizer: {e}")))?;

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to read config: {e}")))?;
        let config: Config = serde_json::from_str(&config_str)
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to parse config: {e}")))?;

        // SAFETY: the weights file is memory-mapped read-only and is not
        // modified while the model is alive.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .map_err(|e| EmbedError::ModelLoad(format!("Failed to load weights: {e}")))?
        };
        let model = BertModel::load(vb, &config)
            .map_err(|e| EmbedError::ModelLoad(format!("Failed to create BERT model: {e}")))?;

        info!("Embedding model loaded");
        Ok(Self {
            device,
            model,
            tokenizer,
        })
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbedError::Tokenization(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.len())
            .max()
            .unwrap_or(0)
            .clamp(1, MAX_TOKENS);

        let batch_size = texts.len();
        let mut input_ids = Vec::with_capacity(batch_size * max_len);
        let mut attention_mask = Vec::with_capacity(batch_size * max_len);

        for encoding in &encodings {
            let ids = encoding.get_ids();
            let len = ids.len().min(max_len);
            input_ids.extend_from_slice(&ids[..len]);
            attention_mask.extend(std::iter::repeat(1u32).take(len));
            input_ids.extend(std::iter::repeat(0u32).take(max_len - len));
            attention_mask.extend(std::iter::repeat(0u32).take(max_len - len));
        }

        let input_ids = Tensor::from_vec(input_ids, (batch_size, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(attention_mask, (batch_size, max_len), &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        let output = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = mean_pooling(&output, &attention_mask)?;
        let normalized = normalize(&pooled)?;

        let vectors = normalized.to_vec2::<f32>()?;
        debug!("Embedded {} texts", vectors.len());
        Ok(vectors)
    }
}

impl Embedder for CandleEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.encode_batch(texts)?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }
}

/// Averages token embeddings over non-padding positions.
fn mean_pooling(token_embeddings: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask
        .to_dtype(DType::F32)?
        .unsqueeze(2)?
        .broadcast_as(token_embeddings.shape())?;

    let sum = token_embeddings.mul(&mask)?.sum(1)?;
    let count = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    sum.div(&count)
}

fn normalize(embeddings: &Tensor) -> candle_core::Result<Tensor> {
    let norm = embeddings
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .clamp(1e-12, f64::MAX)?;
    embeddings.broadcast_div(&norm)
}
