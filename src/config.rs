//! Configuration for posterloom.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (POSTERLOOM_HOME, POSTERLOOM_SERVICE_URL)
//! 2. Config file (.posterloom/config.yaml)
//! 3. Defaults (~/.posterloom, local backend)
//!
//! Config file discovery:
//! - Searches current directory and parents for .posterloom/config.yaml
//! - `home` in the config file is relative to the .posterloom/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::{ServiceRegistry, ServicesConfig};
use crate::agents::ValidationSettings;
use crate::core::limits::{InputPolicy, PipelineLimits};
use crate::core::orchestrator::PipelineSettings;
use crate::core::retry::RetryPolicy;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    /// State directory (relative to the .posterloom/ directory)
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub pipeline: PipelineLimits,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub input: InputPolicy,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to posterloom home (run state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub settings: PipelineSettings,
    pub services: ServicesConfig,
}

impl ResolvedConfig {
    /// Directory holding one subdirectory per run
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }

    /// Bind every capability to the configured backend
    pub fn registry(&self) -> Result<ServiceRegistry> {
        ServiceRegistry::from_config(&self.services)
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".posterloom").join("config.yaml");
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

    parse_config(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn parse_config(content: &str) -> Result<ConfigFile> {
    // An empty file is a valid, all-default config
    if content.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    let config: ConfigFile = serde_yaml::from_str(content)?;

    let quality = config.pipeline.quality_diversity;
    if !(0.0..=1.0).contains(&quality) {
        anyhow::bail!("pipeline.quality_diversity must be within 0..=1, got {}", quality);
    }
    if config.pipeline.min_keywords > config.pipeline.max_keywords {
        anyhow::bail!(
            "pipeline.min_keywords ({}) exceeds pipeline.max_keywords ({})",
            config.pipeline.min_keywords,
            config.pipeline.max_keywords
        );
    }
    if config.pipeline.max_in_flight == 0 {
        anyhow::bail!("pipeline.max_in_flight must be at least 1");
    }

    Ok(config)
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

/// Combine the config file (if any) with environment overrides
fn resolve(config_file: Option<PathBuf>, file: ConfigFile, default_home: PathBuf) -> ResolvedConfig {
    let home = if let Ok(env_home) = std::env::var("POSTERLOOM_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(home_path), Some(config_path)) = (&file.home, &config_file) {
        let loom_dir = config_path.parent().unwrap_or(Path::new("."));
        resolve_path(loom_dir, home_path)
    } else {
        default_home
    };

    let mut services = file.services;
    if let Ok(url) = std::env::var("POSTERLOOM_SERVICE_URL") {
        services.base_url = Some(url);
    }

    ResolvedConfig {
        home,
        config_file,
        settings: PipelineSettings {
            pipeline: file.pipeline,
            retry: file.retry,
            validation: file.validation,
            input: file.input,
        },
        services,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".posterloom");

    let config_file = find_config_file();
    let file = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    Ok(resolve(config_file, file, default_home))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration, bypassing the cache
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the posterloom home directory
pub fn posterloom_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the runs directory ($POSTERLOOM_HOME/runs)
pub fn runs_dir() -> Result<PathBuf> {
    Ok(config()?.runs_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{BackendKind, Capability};
    use crate::domain::{CheckKind, Severity};
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let loom_dir = temp.path().join(".posterloom");
        std::fs::create_dir_all(&loom_dir).unwrap();

        let config_path = loom_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
home: ./state
pipeline:
  max_revisions: 5
  max_in_flight: 4
retry:
  max_attempts: 2
validation:
  min_contrast_ratio: 7.0
  checks:
    font-consistency:
      enabled: false
    aesthetic-quality:
      severity: soft
services:
  backend: http
  base_url: http://gateway:8080
  overrides:
    aesthetic-score: local
input:
  denylist_patterns: ["**/secret*"]
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version.as_deref(), Some("1.0"));
        assert_eq!(config.pipeline.max_revisions, 5);
        assert_eq!(config.pipeline.max_in_flight, 4);
        assert_eq!(config.pipeline.max_keywords, 5);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.validation.min_contrast_ratio, 7.0);
        assert!(!config.validation.is_enabled(CheckKind::FontConsistency));
        assert_eq!(
            config.validation.severity(CheckKind::AestheticQuality),
            Severity::Soft
        );
        assert_eq!(config.services.backend, BackendKind::Http);
        assert_eq!(
            config.services.overrides.get(&Capability::AestheticScore),
            Some(&BackendKind::Local)
        );
        assert!(config.input.is_denylisted("assets/secret-logo.png"));

        let resolved = resolve(
            Some(config_path.clone()),
            config,
            PathBuf::from("/unused"),
        );
        if std::env::var("POSTERLOOM_HOME").is_err() {
            assert_eq!(resolved.runs_dir(), loom_dir.join("state").join("runs"));
        }
        assert_eq!(resolved.settings.pipeline.max_revisions, 5);
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(parse_config("").unwrap(), ConfigFile::default());
        assert_eq!(parse_config("\n\n").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_invalid_pipeline_values_rejected() {
        assert!(parse_config("pipeline:\n  quality_diversity: 1.5\n").is_err());
        assert!(parse_config("pipeline:\n  min_keywords: 6\n").is_err());
        assert!(parse_config("pipeline:\n  max_in_flight: 0\n").is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
