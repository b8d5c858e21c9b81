//! Embedding backends for docsearch.
//!
//! `BertEmbedder` runs multilingual-e5-small (a BERT encoder, 384 dims) with
//! candle from a local model directory; `FakeEmbedder` is a deterministic
//! stand-in for tests and offline runs.
use anyhow::{anyhow, ensure, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use docsearch_core::config::{Settings, TokenizerKind};
use docsearch_core::tokens::WordCounter;
use docsearch_core::traits::{Embedder, TokenCounter};
use docsearch_core::EMBEDDING_DIM;

pub mod batch;
pub mod device;
pub mod pool;
pub mod tokenize;

pub use batch::embed_chunks;
pub use pool::masked_mean_l2;

/// Longest input the e5 position table supports.
const MODEL_MAX_POSITIONS: usize = 512;

pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
}

impl BertEmbedder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = device::select_device();
        info!(model_dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: BertConfig = serde_json::from_str(&raw)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .map_or(EMBEDDING_DIM, |v| v as usize);

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        info!(dim, "embedding model loaded");

        Ok(Self { model, tokenizer, device, dim, max_len: max_len.clamp(1, MODEL_MAX_POSITIONS) })
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        let tensors = candle_core::pickle::read_all(&pickle)?;
        return tensors
            .into_iter()
            .map(|(name, t)| -> Result<(String, Tensor)> { Ok((name, t.to_device(device)?)) })
            .collect();
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

impl Embedder for BertEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize::tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(vectors)
    }
}

/// Hash-based embedder: same text, same unit vector. No model files needed.
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim } }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;

        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Default for FakeEmbedder {
    fn default() -> Self { Self::new(EMBEDDING_DIM) }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Counts tokens with the embedding model's own tokenizer (special tokens excluded).
pub struct TokenizerCounter {
    tokenizer: Tokenizer,
    fallback: WordCounter,
}

impl TokenizerCounter {
    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", path.display(), e))?;
        Ok(Self { tokenizer, fallback: WordCounter::default() })
    }
}

impl TokenCounter for TokenizerCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(enc) => enc.get_ids().len(),
            Err(e) => {
                warn!(error = %e, "tokenizer failed, estimating from word count");
                self.fallback.count(text)
            }
        }
    }
}

/// Fails unless `embedder` produces vectors of the stored width.
pub fn check_dimension(embedder: &dyn Embedder) -> Result<()> {
    ensure!(
        embedder.dim() == EMBEDDING_DIM,
        "embedding model produces {}-dim vectors, the index stores {}",
        embedder.dim(),
        EMBEDDING_DIM
    );
    Ok(())
}

/// Embedder selected by `embedding.use_fake`.
pub fn get_default_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = if settings.embedding.use_fake {
        info!("using FakeEmbedder");
        Arc::new(FakeEmbedder::default())
    } else {
        Arc::new(BertEmbedder::load(&settings.model_dir(), settings.embedding.max_len)?)
    };
    check_dimension(embedder.as_ref())?;
    Ok(embedder)
}

/// Token counter selected by `chunking.tokenizer`.
pub fn token_counter(settings: &Settings) -> Result<Box<dyn TokenCounter>> {
    match settings.chunking.tokenizer {
        TokenizerKind::Words => Ok(Box::new(WordCounter::default())),
        TokenizerKind::Model => {
            let path = settings.model_dir().join("tokenizer.json");
            Ok(Box::new(TokenizerCounter::from_file(&path)?))
        }
    }
}
