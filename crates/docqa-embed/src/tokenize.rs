use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// XLM-RoBERTa `<pad>`.
const PAD_ID: u32 = 1;

/// Tokenizes a batch, truncating to `max_len` and right-padding to the longest row.
/// Returns `(input_ids, attention_mask)`, both `[B,T]`.
pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let mut rows: Vec<(Vec<u32>, Vec<u32>)> = Vec::with_capacity(texts.len());
    for text in texts {
        let enc = tokenizer.encode(text.as_str(), true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        let mut ids = enc.get_ids().to_vec();
        let mut mask = enc.get_attention_mask().to_vec();
        ids.truncate(max_len);
        mask.truncate(max_len);
        rows.push((ids, mask));
    }
    let width = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0).max(1);
    let mut flat_ids = Vec::with_capacity(rows.len() * width);
    let mut flat_mask = Vec::with_capacity(rows.len() * width);
    for (ids, mask) in rows {
        let pad = width - ids.len();
        flat_ids.extend(ids);
        flat_ids.extend(std::iter::repeat(PAD_ID).take(pad));
        flat_mask.extend(mask);
        flat_mask.extend(std::iter::repeat(0u32).take(pad));
    }
    let batch = texts.len();
    let input_ids = Tensor::from_vec(flat_ids, (batch, width), device)?;
    let attention_mask = Tensor::from_vec(flat_mask, (batch, width), device)?;
    Ok((input_ids, attention_mask))
}
