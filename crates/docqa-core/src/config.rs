//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_CHUNKING__OVERLAP`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkStrategy;
use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Load from the current working directory.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_in(Path::new("."))
    }

    pub fn load_in(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))
    }
}

/// Typed view over the merged configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub rerank: RerankSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Base path of the vector index snapshot; `.vectors` and `.meta.json` are appended.
    pub index_path: String,
    pub store_path: String,
    pub query_log_path: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            index_path: "./data/vector_index".to_string(),
            store_path: "./data/documents.json".to_string(),
            query_log_path: "./data/queries.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub overlap: usize,
    pub strategy: ChunkStrategy,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 512, overlap: 50, strategy: ChunkStrategy::Sentences }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub dimension: usize,
    pub model_dir: String,
    pub max_len: usize,
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            dimension: 384,
            model_dir: "models/all-MiniLM-L6-v2".to_string(),
            max_len: 256,
            use_fake: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Size of the first-pass candidate set handed to the reranker.
    pub candidate_pool: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { candidate_pool: 20 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub top_k: usize,
    /// Cross-encoder weights; when missing the reranker runs in embedding-similarity mode.
    pub cross_encoder_dir: Option<String>,
    pub max_len: usize,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            cross_encoder_dir: Some("models/ms-marco-MiniLM-L-6-v2".to_string()),
            max_len: 512,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be > 0".into()));
        }
        if c.overlap >= c.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                c.overlap, c.chunk_size
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be > 0".into()));
        }
        if self.rerank.top_k == 0 {
            return Err(Error::InvalidConfig("rerank.top_k must be > 0".into()));
        }
        if self.retrieval.candidate_pool == 0 {
            return Err(Error::InvalidConfig("retrieval.candidate_pool must be > 0".into()));
        }
        Ok(())
    }

    pub fn index_path(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.data.index_path) }
    pub fn store_path(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.data.store_path) }
    pub fn query_log_path(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.data.query_log_path) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
