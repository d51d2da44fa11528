use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::{EncodeInput, Tokenizer};

/// Padded `[B, T]` model inputs. `T` is the longest encoding in the batch,
/// capped at `max_len`.
pub struct EncodedBatch {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
}

pub fn encode_batch<'s, E>(
    tokenizer: &Tokenizer,
    inputs: Vec<E>,
    max_len: usize,
    pad_id: u32,
    device: &Device,
) -> Result<EncodedBatch>
where
    E: Into<EncodeInput<'s>> + Send,
{
    let encodings = tokenizer
        .encode_batch(inputs, true)
        .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let batch = encodings.len();
    let seq_len = encodings
        .iter()
        .map(|e| e.get_ids().len().min(max_len))
        .max()
        .unwrap_or(0)
        .max(1);

    let mut ids = Vec::with_capacity(batch * seq_len);
    let mut type_ids = Vec::with_capacity(batch * seq_len);
    let mut mask = Vec::with_capacity(batch * seq_len);
    for enc in &encodings {
        push_padded(&mut ids, enc.get_ids(), seq_len, pad_id);
        push_padded(&mut type_ids, enc.get_type_ids(), seq_len, 0);
        push_padded(&mut mask, enc.get_attention_mask(), seq_len, 0);
    }

    Ok(EncodedBatch {
        input_ids: Tensor::from_vec(ids, (batch, seq_len), device)?,
        token_type_ids: Tensor::from_vec(type_ids, (batch, seq_len), device)?,
        attention_mask: Tensor::from_vec(mask, (batch, seq_len), device)?,
    })
}

fn push_padded(out: &mut Vec<u32>, values: &[u32], len: usize, pad: u32) {
    let take = values.len().min(len);
    out.extend_from_slice(&values[..take]);
    out.extend(std::iter::repeat(pad).take(len - take));
}
