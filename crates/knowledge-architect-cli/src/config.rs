//! TOML configuration for the CLI.
//!
//! Only `[paths].vault_path` is mandatory; the other sections fall back to
//! defaults so `similar` and `stats` work without any Gemini or template setup.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use knowledge_architect::{Granularity, LoaderConfig, DEFAULT_STORE_DIR};

/// Config file looked up when `--config` is not given.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "knowledge-architect.toml";

/// Environment variable that overrides `[api].gemini_api_key`.
pub(crate) const API_KEY_ENV: &str = "GEMINI_API_KEY";

const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AppConfig {
    pub(crate) paths: PathsConfig,
    #[serde(default)]
    pub(crate) api: ApiConfig,
    #[serde(default)]
    pub(crate) gemini: GeminiConfig,
    #[serde(default)]
    pub(crate) retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PathsConfig {
    pub(crate) vault_path: PathBuf,
    /// Directory the generated MOC files are written to.
    #[serde(default)]
    pub(crate) moc_save_path: Option<PathBuf>,
    #[serde(default)]
    pub(crate) moc_template_path: Option<PathBuf>,
    #[serde(default = "default_store_dir")]
    pub(crate) store_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ApiConfig {
    #[serde(default)]
    pub(crate) gemini_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct GeminiConfig {
    pub(crate) model_name: String,
    pub(crate) timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model_name: "gemini-2.5-flash".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct RetrievalConfig {
    pub(crate) top_k: usize,
    pub(crate) granularity: Granularity,
    pub(crate) embedding_model: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            granularity: Granularity::Note,
            embedding_model: None,
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_DIR)
}

impl AppConfig {
    /// Read and parse the config file at `path`.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    pub(crate) fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loader settings derived from `[paths]` and `[retrieval]`.
    pub(crate) fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            store_dir: self.paths.store_dir.clone(),
            embedding_model: self.retrieval.embedding_model.clone(),
            ..LoaderConfig::default()
        }
    }

    /// The Gemini API key, with `GEMINI_API_KEY` taking precedence over the file.
    pub(crate) fn api_key(&self) -> Result<String> {
        resolve_api_key(
            self.api.gemini_api_key.as_deref(),
            std::env::var(API_KEY_ENV).ok(),
        )
    }

    pub(crate) fn moc_save_path(&self) -> Result<&Path> {
        match self.paths.moc_save_path.as_deref() {
            Some(p) => Ok(p),
            None => bail!("[paths].moc_save_path is not set in the config file"),
        }
    }

    pub(crate) fn moc_template_path(&self) -> Result<&Path> {
        match self.paths.moc_template_path.as_deref() {
            Some(p) => Ok(p),
            None => bail!("[paths].moc_template_path is not set in the config file"),
        }
    }
}

fn resolve_api_key(configured: Option<&str>, from_env: Option<String>) -> Result<String> {
    let key = from_env
        .filter(|k| !k.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_default();
    let key = key.trim();
    if key.is_empty() || key.contains(API_KEY_PLACEHOLDER) {
        bail!(
            "Gemini API key is not configured; set [api].gemini_api_key or {}",
            API_KEY_ENV
        );
    }
    Ok(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[paths]
vault_path = "/vault"
moc_save_path = "/vault/MOCs"
moc_template_path = "/vault/templates/moc.md"

[api]
gemini_api_key = "abc123"

[gemini]
model_name = "gemini-2.0-pro"

[retrieval]
top_k = 8
granularity = "block"
embedding_model = "TaylorAI/bge-micro-v2"
"#;

    #[test]
    fn parses_full_file() {
        let cfg = AppConfig::from_toml_str(FULL).unwrap();
        assert_eq!(cfg.paths.vault_path, PathBuf::from("/vault"));
        assert_eq!(cfg.paths.store_dir, PathBuf::from(DEFAULT_STORE_DIR));
        assert_eq!(cfg.gemini.model_name, "gemini-2.0-pro");
        assert_eq!(cfg.gemini.timeout_secs, 120);
        assert_eq!(cfg.retrieval.top_k, 8);
        assert_eq!(cfg.retrieval.granularity, Granularity::Block);

        let loader = cfg.loader_config();
        assert_eq!(loader.embedding_model.as_deref(), Some("TaylorAI/bge-micro-v2"));
        assert_eq!(cfg.moc_save_path().unwrap(), Path::new("/vault/MOCs"));
    }

    #[test]
    fn only_vault_path_is_required() {
        let cfg = AppConfig::from_toml_str("[paths]\nvault_path = \"v\"\n").unwrap();
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.retrieval.granularity, Granularity::Note);
        assert_eq!(cfg.gemini.model_name, "gemini-2.5-flash");
        assert!(cfg.moc_template_path().is_err());

        assert!(AppConfig::from_toml_str("[api]\ngemini_api_key = \"k\"\n").is_err());
    }

    #[test]
    fn api_key_resolution() {
        assert_eq!(resolve_api_key(Some("file"), None).unwrap(), "file");
        assert_eq!(
            resolve_api_key(Some("file"), Some("env".into())).unwrap(),
            "env"
        );
        assert_eq!(resolve_api_key(Some("file"), Some("  ".into())).unwrap(), "file");
        assert!(resolve_api_key(None, None).is_err());
        assert!(resolve_api_key(Some(""), None).is_err());
        assert!(resolve_api_key(Some("YOUR_API_KEY_HERE"), None).is_err());
    }
}
