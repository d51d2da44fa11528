//! Model-runtime bindings: sentence embedder, cross-encoder and a
//! deterministic hash embedder for offline runs and tests.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;
use tokenizers::Tokenizer;
use twox_hash::XxHash64;

use docqa_core::config::{resolve_with_base, EmbeddingSettings, RerankSettings};
use docqa_core::traits::{Embedder, PairScorer};

pub mod cross_encoder;
pub mod device;
pub mod pool;
pub mod tokenize;

pub use cross_encoder::CrossEncoder;
pub use pool::masked_mean_l2;

pub(crate) const BERT_PAD_ID: u32 = 0;

/// Sentence embedder over a BERT-family checkpoint (all-MiniLM-L6-v2 by default):
/// mean pooling over the attention mask, then L2 normalization.
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
        tracing::info!(dir = %model_dir.display(), "loading sentence embedder");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_raw = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: BertConfig = serde_json::from_str(&config_raw)?;
        let dim = read_hidden_size(&config_raw)?;
        let vb = load_var_builder(model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;
        tracing::info!(dim, max_len, "sentence embedder ready");
        Ok(Self { model, tokenizer, device, dim, max_len })
    }
}

impl Embedder for BertEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let batch = tokenize::encode_batch(&self.tokenizer, inputs, self.max_len, BERT_PAD_ID, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_dtype(DType::F32)?.to_device(&Device::Cpu)?.to_vec2()?;
        let elapsed = start.elapsed().as_millis();
        if elapsed > 500 {
            tracing::debug!(texts = texts.len(), elapsed_ms = elapsed as u64, "slow embedding batch");
        }
        Ok(rows)
    }
}

/// Deterministic bag-of-tokens embedder: each whitespace token hashes into one
/// bucket. Texts sharing tokens have positive inner product.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if token.is_empty() {
                continue;
            }
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            v[idx] += 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v { *x /= norm; }
        } else {
            // all-punctuation input still gets a unit vector
            v[0] = 1.0;
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

pub fn fake_embeddings_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// The configured embedder. `use_fake` or `APP_USE_FAKE_EMBEDDINGS=1` selects
/// [`HashEmbedder`]; otherwise the model directory must exist and its hidden
/// size must equal `settings.dimension`.
pub fn load_embedder(settings: &EmbeddingSettings, base: &Path) -> Result<Arc<dyn Embedder>> {
    if settings.use_fake || fake_embeddings_requested() {
        tracing::info!(dim = settings.dimension, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dimension)));
    }
    let dir = resolve_model_dir(base, &settings.model_dir)?;
    let embedder = BertEmbedder::load(&dir, settings.max_len)?;
    if embedder.dim() != settings.dimension {
        bail!(
            "model at {} produces {}-dim vectors but embedding.dimension is {}",
            dir.display(),
            embedder.dim(),
            settings.dimension
        );
    }
    Ok(Arc::new(embedder))
}

/// The cross-encoder if one is configured and loads; `None` puts the reranker
/// in embedding-similarity mode.
pub fn load_pair_scorer(settings: &RerankSettings, base: &Path) -> Option<Arc<dyn PairScorer>> {
    let configured = settings.cross_encoder_dir.as_deref()?;
    let dir = resolve_with_base(base, configured);
    if !dir.join("config.json").exists() {
        tracing::info!(dir = %dir.display(), "no cross-encoder found");
        return None;
    }
    match CrossEncoder::load(&dir, settings.max_len) {
        Ok(model) => Some(Arc::new(model)),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cross-encoder failed to load");
            None
        }
    }
}

/// `APP_MODEL_DIR`, then the configured directory resolved against `base`.
pub fn resolve_model_dir(base: &Path, configured: &str) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() {
            tracing::info!(dir = %p.display(), "using APP_MODEL_DIR");
            return Ok(p);
        }
    }
    let p = resolve_with_base(base, configured);
    if p.exists() {
        return Ok(p);
    }
    Err(anyhow!("Could not locate embedding model directory at {}", p.display()))
}

#[derive(Deserialize)]
struct HiddenSize {
    hidden_size: usize,
}

pub(crate) fn read_hidden_size(config_json: &str) -> Result<usize> {
    Ok(serde_json::from_str::<HiddenSize>(config_json)?.hidden_size)
}

/// `model.safetensors` when present, else `pytorch_model.bin`.
pub(crate) fn load_var_builder(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    let weights_map: HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device)?
    } else {
        let weights_path = model_dir.join("pytorch_model.bin");
        candle_core::pickle::read_all(&weights_path)?.into_iter().collect()
    };
    Ok(VarBuilder::from_tensors(weights_map, DType::F32, device))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safetensors_weights_load_into_var_builder() {
        let dir = tempfile::TempDir::new().unwrap();
        let device = Device::Cpu;
        let w = Tensor::new(&[[1f32, 2.0], [3.0, 4.0]], &device).unwrap();
        let tensors = HashMap::from([("dense.weight".to_string(), w)]);
        candle_core::safetensors::save(&tensors, dir.path().join("model.safetensors")).unwrap();

        let vb = load_var_builder(dir.path(), &device).unwrap();
        let loaded = vb.get((2, 2), "dense.weight").unwrap();
        assert_eq!(loaded.to_vec2::<f32>().unwrap(), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn missing_weights_are_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load_var_builder(dir.path(), &Device::Cpu).is_err());
    }
}
