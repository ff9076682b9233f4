//! Runtime configuration.
//!
//! Settings come from three layers, most specific first: CLI flags,
//! environment variables (`FLOWCHECK_*`, with `.env` support), and an
//! optional `flowcheck.toml` in the working directory. The backend
//! connection is optional — local-only commands (`history`, `report`,
//! `fixit`) work without one.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const ENV_BACKEND_URL: &str = "FLOWCHECK_BACKEND_URL";
const ENV_BACKEND_KEY: &str = "FLOWCHECK_BACKEND_KEY";
const ENV_CACHE_FILE: &str = "FLOWCHECK_CACHE_FILE";

/// Connection details for the hosted backend.
#[derive(Debug, Clone)]
pub struct Backend {
    pub url: String,
    pub api_key: String,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: Option<Backend>,
    pub cache_file: PathBuf,
    pub verbose: bool,
}

/// On-disk `flowcheck.toml` shape.
#[derive(Debug, Default, Deserialize)]
struct FlowToml {
    #[serde(default)]
    backend: BackendToml,
    #[serde(default)]
    cache_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendToml {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
}

impl FlowToml {
    fn load(dir: &Path) -> Result<FlowToml> {
        let path = dir.join("flowcheck.toml");
        if !path.exists() {
            return Ok(FlowToml::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

impl Config {
    /// Resolve configuration from the current directory's `flowcheck.toml`
    /// and the environment.
    pub fn load(verbose: bool) -> Result<Config> {
        let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
        Self::load_from(&cwd, verbose)
    }

    pub fn load_from(dir: &Path, verbose: bool) -> Result<Config> {
        let file = FlowToml::load(dir)?;

        let url = std::env::var(ENV_BACKEND_URL).ok().or(file.backend.url);
        let api_key = std::env::var(ENV_BACKEND_KEY).ok().or(file.backend.api_key);
        let backend = match (url, api_key) {
            (Some(url), Some(api_key)) => Some(Backend { url, api_key }),
            _ => None,
        };

        let cache_file = std::env::var(ENV_CACHE_FILE)
            .ok()
            .map(PathBuf::from)
            .or(file.cache_file)
            .unwrap_or_else(default_cache_file);

        Ok(Config {
            backend,
            cache_file,
            verbose,
        })
    }

    /// The backend connection, or a user-facing error naming what to set.
    pub fn require_backend(&self) -> Result<&Backend> {
        self.backend.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "No backend configured. Set {ENV_BACKEND_URL} and {ENV_BACKEND_KEY}, \
                 or add a [backend] section to flowcheck.toml."
            )
        })
    }
}

fn default_cache_file() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("flowcheck")
        .join("recent_runs.json")
}
