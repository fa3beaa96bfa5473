use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use docqa_core::config::{EmbeddingProvider, EmbeddingSettings};
use docqa_core::traits::Embedder;

mod device;
mod pool;
mod tokenize;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch;

/// Dense embedder backed by a local XLM-RoBERTa checkpoint (BGE-M3 layout).
pub struct EmbeddingModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
}

impl EmbeddingModel {
    pub fn load(model_dir: &Path, dim: usize, max_len: usize) -> Result<Self> {
        let device = select_device();
        tracing::info!("Loading embedding model from {}", model_dir.display());

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;

        let weights_map = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        tracing::info!("Embedding model ready (dim={}, max_len={})", dim, max_len);
        Ok(Self { model, tokenizer, device, dim, max_len })
    }

    fn embed_tensor(&self, texts: &[String]) -> Result<Tensor> {
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        masked_mean_l2(&hidden, &attention_mask)
    }
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(vec![]); }
        let start = Instant::now();
        let pooled = self.embed_tensor(texts)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        if let Some(row) = rows.first() {
            if row.len() != self.dim {
                bail!("model produced dim {} but embedding.dim is {}", row.len(), self.dim);
            }
        }
        tracing::debug!("Embedded {} texts in {:?}", texts.len(), start.elapsed());
        Ok(rows)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        let weights = candle_core::pickle::read_all(&pickle)?;
        return Ok(weights.into_iter().collect());
    }
    bail!("No model.safetensors or pytorch_model.bin under {}", model_dir.display())
}

/// Deterministic feature-hashing embedder.
///
/// Lowercased alphanumeric tokens are hashed into `dim` buckets, so texts
/// sharing words end up with a positive cosine. Needs no weights.
pub struct HashingEmbedder {
    dim: usize,
    max_len: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1), max_len: 256 } }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .take(self.max_len);
        for (i, token) in tokens.enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += 0.5 + val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v { *x /= norm; }
        }
        v
    }
}

impl Embedder for HashingEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn fake_embeddings_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Builds the embedder the settings ask for. `APP_USE_FAKE_EMBEDDINGS=1` forces hashing.
pub fn embedder_from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if fake_embeddings_requested() || settings.provider == EmbeddingProvider::Hashing {
        tracing::info!("Using hashing embedder (dim={})", settings.dim);
        return Ok(Arc::new(HashingEmbedder::new(settings.dim)));
    }
    let model_dir = match settings.resolved_model_dir() {
        Some(dir) if dir.exists() => dir,
        Some(dir) => bail!("embedding.model_dir {} does not exist", dir.display()),
        None => resolve_model_dir()?,
    };
    Ok(Arc::new(EmbeddingModel::load(&model_dir, settings.dim, settings.max_len)?))
}

pub fn get_default_embedder() -> Result<Arc<dyn Embedder>> {
    embedder_from_settings(&EmbeddingSettings::default())
}

fn resolve_model_dir() -> Result<PathBuf> {
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                tracing::debug!("Using {}: {}", var, p.display());
                return Ok(p);
            }
        }
    }
    for candidate in ["../models/bge-m3", "models/bge-m3"] {
        let p = Path::new(candidate);
        if p.exists() { return Ok(p.to_path_buf()); }
    }
    Err(anyhow!("Could not locate embedding model directory; set embedding.model_dir or APP_MODEL_DIR"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

    #[test]
    fn hashing_is_case_insensitive_and_punctuation_blind() {
        let e = HashingEmbedder::new(64);
        let v = e.embed_batch(&["Alice, Python!".to_string(), "alice python".to_string()]).unwrap();
        assert!((cosine(&v[0], &v[1]) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_words_score_above_disjoint_ones() {
        let e = HashingEmbedder::new(256);
        let v = e
            .embed_batch(&["rust ownership rules".to_string(), "ownership in rust".to_string(), "banana bread recipe".to_string()])
            .unwrap();
        assert!(cosine(&v[0], &v[1]) > cosine(&v[0], &v[2]));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashingEmbedder::new(8);
        let v = e.embed_batch(&["  ".to_string()]).unwrap();
        assert!(v[0].iter().all(|x| *x == 0.0));
    }

    #[test]
    fn hashing_provider_needs_no_model_dir() {
        let settings = EmbeddingSettings { provider: EmbeddingProvider::Hashing, dim: 32, ..EmbeddingSettings::default() };
        let e = embedder_from_settings(&settings).unwrap();
        assert_eq!(e.dim(), 32);
        assert_eq!(e.embed_batch(&["x".to_string()]).unwrap()[0].len(), 32);
    }
}
