//! Pairwise relevance model: a BERT sequence classifier with a single logit
//! (MS MARCO style cross-encoder).

use std::path::Path;

use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Module};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use docqa_core::traits::PairScorer;

use crate::device::select_device;
use crate::tokenize::encode_batch;
use crate::{load_var_builder, read_hidden_size, BERT_PAD_ID};

pub struct CrossEncoder {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
}

impl CrossEncoder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        tracing::info!(dir = %model_dir.display(), "loading cross-encoder");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_raw = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: BertConfig = serde_json::from_str(&config_raw)?;
        let hidden = read_hidden_size(&config_raw)?;

        let vb = load_var_builder(model_dir, &device)?;
        let bert = BertModel::load(vb.pp("bert"), &config)?;
        let pooler = candle_nn::linear(hidden, hidden, vb.pp("bert.pooler.dense"))?;
        let classifier = candle_nn::linear(hidden, 1, vb.pp("classifier"))?;
        Ok(Self { bert, pooler, classifier, tokenizer, device, max_len })
    }
}

impl PairScorer for CrossEncoder {
    fn score_pairs(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let pairs: Vec<(&str, &str)> = documents.iter().map(|d| (query, *d)).collect();
        let batch = encode_batch(&self.tokenizer, pairs, self.max_len, BERT_PAD_ID, &self.device)?;
        let hidden = self.bert.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        // [CLS] -> pooler (dense + tanh) -> single logit
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?.squeeze(1)?;
        Ok(logits.to_dtype(candle_core::DType::F32)?.to_device(&Device::Cpu)?.to_vec1()?)
    }
}
