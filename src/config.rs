//! TOML configuration.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration that mirrors public repositories without embeddings.
//!
//! ```toml
//! [cache]
//! dir = "./.issue-mirror"
//!
//! [github]
//! page_size = 30
//! include_closed = false
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [chunking]
//! max_chars = 18000
//! overlap_chars = 500
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use issue_mirror_core::chunk::SplitConfig;

use crate::error::MirrorError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./.issue-mirror")
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub include_closed: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            graphql_url: default_graphql_url(),
            api_version: default_api_version(),
            page_size: default_page_size(),
            include_closed: false,
            timeout_secs: default_timeout_secs(),
            token: None,
            user_agent: default_user_agent(),
        }
    }
}

impl GithubConfig {
    /// `GITHUB_TOKEN` from the environment, else the configured token.
    pub fn resolved_token(&self) -> Option<String> {
        std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.token.clone())
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_graphql_url() -> String {
    "https://api.github.com/graphql".to_string()
}
fn default_api_version() -> String {
    "2022-11-28".to_string()
}
fn default_page_size() -> u32 {
    30
}
fn default_user_agent() -> String {
    concat!("issue-mirror/", env!("CARGO_PKG_VERSION")).to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Provider base URL. Defaults to the public OpenAI API or a local Ollama.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

impl ChunkingConfig {
    pub fn split_config(&self) -> SplitConfig {
        SplitConfig {
            max_chars: self.max_chars,
            overlap_chars: self.overlap_chars,
        }
    }
}

fn default_max_chars() -> usize {
    18_000
}
fn default_overlap_chars() -> usize {
    500
}

impl Config {
    /// All defaults. Used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> std::result::Result<(), MirrorError> {
        let invalid = |msg: String| Err(MirrorError::Config(msg));

        if !(1..=100).contains(&self.github.page_size) {
            return invalid(format!(
                "github.page_size must be in 1..=100, got {}",
                self.github.page_size
            ));
        }
        if self.chunking.max_chars == 0 {
            return invalid("chunking.max_chars must be > 0".to_string());
        }
        if self.chunking.overlap_chars >= self.chunking.max_chars {
            return invalid(format!(
                "chunking.overlap_chars ({}) must be smaller than chunking.max_chars ({})",
                self.chunking.overlap_chars, self.chunking.max_chars
            ));
        }
        if self.embedding.batch_size == 0 {
            return invalid("embedding.batch_size must be > 0".to_string());
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => {
                return invalid(format!(
                    "unknown embedding provider '{}'; must be disabled, openai, or ollama",
                    other
                ))
            }
        }
        if self.embedding.is_enabled() {
            if matches!(self.embedding.dims, None | Some(0)) {
                return invalid(format!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                ));
            }
            if self.embedding.model.is_none() {
                return invalid(format!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                ));
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let f = write_config("");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.cache.dir, PathBuf::from("./.issue-mirror"));
        assert_eq!(cfg.github.page_size, 30);
        assert_eq!(cfg.github.api_version, "2022-11-28");
        assert!(!cfg.github.include_closed);
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.chunking.max_chars, 18_000);
        assert_eq!(cfg.chunking.overlap_chars, 500);
    }

    #[test]
    fn test_sections_override_defaults() {
        let f = write_config(
            r#"
            [cache]
            dir = "/tmp/mirror"

            [github]
            api_url = "http://127.0.0.1:9999"
            page_size = 100
            include_closed = true

            [embedding]
            provider = "ollama"
            model = "nomic-embed-text"
            dims = 768
            "#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.cache.dir, PathBuf::from("/tmp/mirror"));
        assert_eq!(cfg.github.api_url, "http://127.0.0.1:9999");
        assert_eq!(cfg.github.page_size, 100);
        assert!(cfg.github.include_closed);
        assert_eq!(cfg.embedding.model.as_deref(), Some("nomic-embed-text"));
        assert_eq!(cfg.embedding.batch_size, 64);
    }

    #[test]
    fn test_page_size_out_of_range() {
        let f = write_config("[github]\npage_size = 101\n");
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("page_size"), "{}", err);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_max() {
        let f = write_config("[chunking]\nmax_chars = 100\noverlap_chars = 100\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_enabled_provider_requires_model_and_dims() {
        let f = write_config("[embedding]\nprovider = \"openai\"\ndims = 1536\n");
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("embedding.model"), "{}", err);

        let f = write_config("[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n");
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"), "{}", err);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let f = write_config("[embedding]\nprovider = \"local\"\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_minimal() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = load_or_minimal(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.github.page_size, 30);
    }
}
