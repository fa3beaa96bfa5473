//! Layered configuration and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_RETRIEVAL__TOP_N=10`). Provides helpers to expand `~` and `${VAR}` and
//! to resolve relative paths against a known base directory.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name };
        config.validate_for_env()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Configuration(format!("Failed to get '{}': {}", key, e)))
    }

    /// Typed view over the merged layers, validated.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    fn validate_for_env(&self) -> Result<()> {
        match self.env_name.as_str() {
            "prod" | "production" => {
                let debug: bool = self.get("retrieval.debug").unwrap_or(false);
                if debug {
                    tracing::warn!("retrieval.debug is enabled in production; source lists will be logged");
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            other => tracing::debug!("Unknown RUST_ENV '{}', using base config only", other),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub hybrid: HybridSettings,
    pub embedding: EmbeddingSettings,
    pub ingest: IngestSettings,
    pub llm: LlmSettings,
    pub metrics: MetricsSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let h = &self.hybrid;
        if h.semantic_weight < 0.0 || h.keyword_weight < 0.0 {
            return Err(Error::Configuration("hybrid weights must be non-negative".into()));
        }
        if h.semantic_weight + h.keyword_weight <= 0.0 {
            return Err(Error::Configuration("hybrid weights must not both be zero".into()));
        }
        let r = &self.retrieval;
        if r.top_n == 0 {
            return Err(Error::Configuration("retrieval.top_n must be at least 1".into()));
        }
        if r.per_entity_cap == 0 {
            return Err(Error::Configuration("retrieval.per_entity_cap must be at least 1".into()));
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(Error::Configuration("ingest.chunk_overlap must be smaller than ingest.chunk_size".into()));
        }
        if self.embedding.dim == 0 {
            return Err(Error::Configuration("embedding.dim must be positive".into()));
        }
        Ok(())
    }
}

/// Knobs for the retrieval orchestrator and the intent classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Default fetch width for a single pass.
    pub top_k: usize,
    /// Size of the final result handed to the context assembler.
    pub top_n: usize,
    /// Fetch width for visual or resume-scoped single passes.
    pub wide_k: usize,
    /// Fetch width for each per-entity pass.
    pub entity_k: usize,
    pub entity_rerank_n: usize,
    pub per_entity_cap: usize,
    /// Below this many candidates the hybrid search retries once, wider.
    pub min_candidates: usize,
    pub retry_ceiling: usize,
    pub negation_window: usize,
    pub translation_timeout_secs: u64,
    pub entity_stopwords: Vec<String>,
    /// File-name fragments that disqualify a document from resume treatment.
    pub non_resume_patterns: Vec<String>,
    pub debug: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 25,
            top_n: 15,
            wide_k: 100,
            entity_k: 50,
            entity_rerank_n: 7,
            per_entity_cap: 5,
            min_candidates: 3,
            retry_ceiling: 100,
            negation_window: 3,
            translation_timeout_secs: 10,
            entity_stopwords: default_entity_stopwords(),
            non_resume_patterns: ["notes", "tutorial", "lecture", "syllabus", "invoice"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            debug: false,
        }
    }
}

fn default_entity_stopwords() -> Vec<String> {
    [
        "compare", "comparison", "comparing", "versus", "difference", "differences", "between",
        "contrast", "better", "who", "what", "which", "whose", "how", "why", "when", "where",
        "the", "and", "both", "their", "does", "did", "can", "could", "should", "would", "please",
        "show", "tell", "give", "list", "explain", "describe", "summarize", "evaluate", "analyze",
        "resume", "resumes", "experience", "skills", "background", "qualification",
        "qualifications", "candidate", "candidates", "education", "profile", "profiles",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Fusion weights for the hybrid index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridSettings {
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    pub rrf_k: usize,
}

impl Default for HybridSettings {
    fn default() -> Self {
        Self { semantic_weight: 0.8, keyword_weight: 0.2, rrf_k: 60 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local XLM-RoBERTa family checkpoint (BGE-M3 by default).
    Model,
    /// Deterministic feature hashing; no weights required.
    Hashing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model_dir: Option<String>,
    pub dim: usize,
    pub max_len: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { provider: EmbeddingProvider::Model, model_dir: None, dim: 1024, max_len: 256 }
    }
}

impl EmbeddingSettings {
    pub fn resolved_model_dir(&self) -> Option<PathBuf> {
        self.model_dir.as_deref().map(expand_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Characters per chunk.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self { chunk_size: 1500, chunk_overlap: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// OpenAI-compatible API root, without the `/chat/completions` suffix.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    /// Connect timeout and the longest gap allowed between streamed reads.
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            model: "llama3-70b-8192".to_string(),
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub retrieval_window: usize,
    pub generation_window: usize,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { retrieval_window: 50, generation_window: 100 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.retrieval.top_k, 25);
        assert_eq!(s.retrieval.top_n, 15);
        assert_eq!(s.hybrid.semantic_weight, 0.8);
        assert_eq!(s.hybrid.keyword_weight, 0.2);
        assert_eq!(s.metrics.retrieval_window, 50);
        assert_eq!(s.metrics.generation_window, 100);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn toml_and_env_layers_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [retrieval]
                top_n = 9
                per_entity_cap = 6

                [hybrid]
                keyword_weight = 0.5
                "#,
            )?;
            jail.set_env("RUST_ENV", "test");
            jail.set_env("APP_RETRIEVAL__TOP_K", "40");

            let config = Config::load().map_err(|e| e.to_string())?;
            let settings = config.settings().map_err(|e| e.to_string())?;
            assert_eq!(settings.retrieval.top_n, 9);
            assert_eq!(settings.retrieval.per_entity_cap, 6);
            assert_eq!(settings.retrieval.top_k, 40);
            assert_eq!(settings.hybrid.keyword_weight, 0.5);
            assert_eq!(settings.hybrid.semantic_weight, 0.8);
            assert_eq!(config.env_name(), "test");
            Ok(())
        });
    }

    #[test]
    fn invalid_weights_are_configuration_errors() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [hybrid]
                semantic_weight = 0.0
                keyword_weight = 0.0
                "#,
            )?;
            let config = Config::load().map_err(|e| e.to_string())?;
            let err = config.settings().expect_err("zero weights rejected");
            assert!(err.is_fatal());
            Ok(())
        });
    }
}
