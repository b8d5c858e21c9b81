//! Layered configuration and path helpers.
//!
//! Uses Figment to merge built-in defaults, `docsearch.toml`,
//! `docsearch.<env>.toml` and `DOCSEARCH_*` env vars (nested keys separated by
//! `__`). Relative paths are resolved against the directory the configuration
//! was loaded from, after `~` and `${VAR}` expansion.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::error::Error;

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    pub fn load_from(base_dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let env_file = match env_name {
            "dev" | "development" => Some("docsearch.dev.toml"),
            "prod" | "production" => Some("docsearch.prod.toml"),
            "test" | "testing" => Some("docsearch.test.toml"),
            _ => None,
        };
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(base_dir.join("docsearch.toml")));
        if let Some(file) = env_file {
            figment = figment.merge(Toml::file(base_dir.join(file)));
        }
        figment = figment.merge(Env::prefixed("DOCSEARCH_").split("__"));

        let config = Self { figment, base_dir: base_dir.to_path_buf() };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed view of the whole configuration.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))?;
        settings.base_dir.clone_from(&self.base_dir);
        Ok(settings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub search: SearchSettings,
    pub index: IndexSettings,
    pub vision: VisionSettings,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub docs_dir: String,
    pub index_dir: String,
    pub model_dir: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            docs_dir: "docs".to_string(),
            index_dir: "data/index".to_string(),
            model_dir: "models/multilingual-e5-small".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// The embedding model's own `tokenizer.json`.
    #[default]
    Model,
    /// Word-count estimate, no model files needed.
    Words,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub tokenizer: TokenizerKind,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        let base = ChunkingConfig::default();
        Self { chunk_size: base.chunk_size, chunk_overlap: base.chunk_overlap, tokenizer: TokenizerKind::Model }
    }
}

impl ChunkingSettings {
    pub fn chunking_config(&self) -> ChunkingConfig {
        ChunkingConfig { chunk_size: self.chunk_size, chunk_overlap: self.chunk_overlap }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub batch_size: usize,
    pub max_len: usize,
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self { Self { batch_size: 100, max_len: 512, use_fake: false } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// Candidates fetched per requested result when a collection filter is set.
    pub overfetch_factor: usize,
}

impl Default for SearchSettings {
    fn default() -> Self { Self { default_top_k: 5, max_top_k: 20, overfetch_factor: 10 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Row count from which an IVF_PQ index is trained; below it searches scan.
    pub ann_min_rows: usize,
}

impl Default for IndexSettings {
    fn default() -> Self { Self { ann_min_rows: 5000 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionSettings {
    pub enabled: bool,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub prompt: String,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 1024,
            timeout_secs: 60,
            prompt: "You are looking at a screenshot of a business application. Describe in detail what is \
                     visible: interface elements, buttons, menus, form fields, displayed data, error messages \
                     and the overall purpose of the screen. Be specific and technical, and quote visible labels, \
                     field names and values that would help answer user questions."
                .to_string(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> crate::Result<()> {
        self.chunking.chunking_config().validate()?;
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be positive".into()));
        }
        if self.search.default_top_k == 0 || self.search.default_top_k > self.search.max_top_k {
            return Err(Error::InvalidConfig(format!(
                "search.default_top_k ({}) must be within 1..={}",
                self.search.default_top_k, self.search.max_top_k
            )));
        }
        if self.search.overfetch_factor == 0 {
            return Err(Error::InvalidConfig("search.overfetch_factor must be at least 1".into()));
        }
        Ok(())
    }

    pub fn docs_dir(&self) -> PathBuf { resolve_with_base(&self.base_dir, &self.paths.docs_dir) }

    pub fn index_dir(&self) -> PathBuf { resolve_with_base(&self.base_dir, &self.paths.index_dir) }

    pub fn model_dir(&self) -> PathBuf { resolve_with_base(&self.base_dir, &self.paths.model_dir) }
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
