use anyhow::{ensure, Result};
use candle_core::{DType, Tensor};

/// Mean over unmasked tokens of `[B, T, H]` hidden states, then L2-normalized per row.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let dims = hidden.dims();
    ensure!(dims.len() == 3, "hidden shape must be [B,T,H], got {:?}", dims);
    let (batch, hidden_dim) = (dims[0], dims[2]);

    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?;
    let mask_broadcast = match mask_3d.broadcast_as(hidden.shape()) {
        Ok(m) => m,
        Err(_) => mask_3d.repeat((1, 1, hidden_dim))?,
    };
    let sum = (hidden * &mask_broadcast)?.sum(1)?;
    // all-padding rows would divide by zero
    let lengths = mask.sum(1)?.unsqueeze(1)?.to_dtype(sum.dtype())?.clamp(1f32, f32::MAX)?;
    let mean = sum.broadcast_div(&lengths)?;
    let out = l2_rows(&mean)?;
    ensure!(out.dims() == [batch, hidden_dim], "pooled shape {:?}", out.dims());
    Ok(out)
}

/// L2-normalize each row of a `[B, H]` tensor.
pub fn l2_rows(x: &Tensor) -> Result<Tensor> {
    let eps_val = match x.dtype() { DType::F16 | DType::BF16 => 1e-6f32, _ => 1e-12f32 };
    let eps = Tensor::new(&[eps_val], x.device())?.to_dtype(x.dtype())?.unsqueeze(0)?;
    let norm = x.sqr()?.sum_keepdim(1)?.sqrt()?.broadcast_add(&eps)?;
    Ok(x.broadcast_div(&norm)?)
}
