//! Configuration for infracompare.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (INFRACOMPARE_HOME, INFRACOMPARE_ARTIFACTS,
//!    OPENAI_API_KEY, OPENAI_BASE_URL, INFRACOST_BIN)
//! 2. Config file (.infracompare/config.yaml)
//! 3. Defaults (~/.infracompare)
//!
//! Config file discovery:
//! - Searches current directory and parents for .infracompare/config.yaml
//! - `paths.home` is relative to the .infracompare/ directory, every other
//!   path is relative to the project root containing it

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::SafetyLimits;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".infracompare";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub openai: Option<OpenAiConfig>,
    #[serde(default)]
    pub infracost: Option<InfracostConfig>,
    #[serde(default)]
    pub limits: Option<SafetyLimits>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .infracompare/)
    pub home: Option<String>,
    /// Generated Terraform directory (relative to the project root)
    pub artifacts: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiConfig {
    pub base_url: Option<String>,
    pub plan_model: Option<String>,
    pub comparison_model: Option<String>,
    pub summary_model: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfracostConfig {
    pub binary: Option<String>,
}

/// OpenAI endpoint, models and credentials
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub plan_model: String,
    pub comparison_model: String,
    pub summary_model: String,
    pub api_key: Option<String>,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            plan_model: "gpt-4o".to_string(),
            comparison_model: "gpt-4o".to_string(),
            summary_model: "gpt-4o-mini".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfracostSettings {
    pub binary: String,
}

impl Default for InfracostSettings {
    fn default() -> Self {
        Self {
            binary: "infracost".to_string(),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Engine state (run journals)
    pub home: PathBuf,
    /// Generated Terraform definitions
    pub artifacts: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub openai: OpenAiSettings,
    pub infracost: InfracostSettings,
    pub limits: SafetyLimits,
}

impl ResolvedConfig {
    /// Directory holding one journal per run
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge a parsed config file, environment lookups and defaults
fn resolve(
    file: Option<(&Path, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
    default_home: PathBuf,
) -> ResolvedConfig {
    let (config_path, config) = match file {
        Some((path, config)) => (Some(path), config),
        None => (None, ConfigFile::default()),
    };

    // .infracompare/ and the project root above it
    let config_dir = config_path.and_then(Path::parent);
    let base_dir = config_dir.and_then(Path::parent);

    let home = env("INFRACOMPARE_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            let home = config.paths.home.as_deref()?;
            Some(resolve_path(config_dir?, home))
        })
        .unwrap_or(default_home);

    let artifacts = env("INFRACOMPARE_ARTIFACTS")
        .map(PathBuf::from)
        .or_else(|| {
            let artifacts = config.paths.artifacts.as_deref()?;
            Some(resolve_path(base_dir?, artifacts))
        })
        .unwrap_or_else(|| home.join("terraform_plans"));

    let openai_file = config.openai.unwrap_or_default();
    let defaults = OpenAiSettings::default();
    let api_key_env = openai_file
        .api_key_env
        .as_deref()
        .unwrap_or(DEFAULT_API_KEY_ENV);

    let openai = OpenAiSettings {
        base_url: env("OPENAI_BASE_URL")
            .or(openai_file.base_url)
            .unwrap_or(defaults.base_url),
        plan_model: openai_file.plan_model.unwrap_or(defaults.plan_model),
        comparison_model: openai_file
            .comparison_model
            .unwrap_or(defaults.comparison_model),
        summary_model: openai_file.summary_model.unwrap_or(defaults.summary_model),
        api_key: env(api_key_env).filter(|key| !key.trim().is_empty()),
    };

    let infracost = InfracostSettings {
        binary: env("INFRACOST_BIN")
            .or(config.infracost.and_then(|c| c.binary))
            .unwrap_or_else(|| InfracostSettings::default().binary),
    };

    ResolvedConfig {
        home,
        artifacts,
        config_file: config_path.map(Path::to_path_buf),
        openai,
        infracost,
        limits: config.limits.unwrap_or_default(),
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let config_file = find_config_file();
    let parsed = match config_file {
        Some(ref path) => Some((path.as_path(), load_config_file(path)?)),
        None => None,
    };

    Ok(resolve(parsed, |key| std::env::var(key).ok(), default_home))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the runs directory ($INFRACOMPARE_HOME/runs)
pub fn runs_dir() -> Result<PathBuf> {
    Ok(config()?.runs_dir())
}

/// Get the generated Terraform directory
pub fn artifacts_dir() -> Result<PathBuf> {
    Ok(config()?.artifacts.clone())
}
