//! Configuration schema (ctxpack.toml)

use crate::bundle::CodeInclusion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file name looked up at the project root
pub const CONFIG_FILE_NAME: &str = "ctxpack.toml";

/// Bundle packing defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Maximum traversal depth from the entry
    pub depth: usize,

    /// Maximum number of nodes per bundle
    pub max_nodes: usize,

    /// Source text attached to each node
    pub include_code: CodeInclusion,

    /// Fail when a visited component has no contract
    pub strict: bool,

    /// Silently drop visited components without a contract
    pub allow_missing: bool,

    /// Verify every contract against its current source before packing
    pub hash_lock: bool,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            depth: 2,
            max_nodes: 100,
            include_code: CodeInclusion::Header,
            strict: false,
            allow_missing: true,
            hash_lock: false,
        }
    }
}

/// Watch session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before a regeneration fires (milliseconds)
    pub debounce_ms: u64,

    /// Accumulate violations into session counters
    pub strict: bool,

    /// Source extensions that trigger regeneration (without the dot)
    pub extensions: Vec<String>,

    /// Write `.ctxpack/watch-status.json` after each regeneration
    pub status_file: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            strict: false,
            extensions: ["ts", "tsx", "js", "jsx"].iter().map(|e| e.to_string()).collect(),
            status_file: true,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Output directory for persisted bundles, relative to the project root
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Packing defaults
    #[serde(default)]
    pub pack: PackConfig,

    /// Watch settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(".ctxpack/bundles")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            pack: PackConfig::default(),
            watch: WatchConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load `ctxpack.toml` from `root` if present, else defaults rooted there
    pub fn load_or_default(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self {
                project_root: root.to_path_buf(),
                ..Self::default()
            })
        }
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Absolute output directory
    pub fn out_path(&self) -> PathBuf {
        if self.out_dir.is_absolute() {
            self.out_dir.clone()
        } else {
            self.project_root.join(&self.out_dir)
        }
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.pack.depth, 2);
        assert_eq!(config.pack.max_nodes, 100);
        assert!(config.pack.allow_missing);
        assert_eq!(config.watch.debounce_ms, 500);
        assert_eq!(config.out_dir, PathBuf::from(".ctxpack/bundles"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [pack]
            depth = 4
            include_code = "full"

            [watch]
            strict = true
            "#,
        )
        .unwrap();

        assert_eq!(config.pack.depth, 4);
        assert_eq!(config.pack.include_code, CodeInclusion::Full);
        assert_eq!(config.pack.max_nodes, 100);
        assert!(config.watch.strict);
        assert_eq!(config.watch.debounce_ms, 500);
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = Config::from_toml("[pack]\ndepth = \"deep\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.pack, parsed.pack);
        assert_eq!(config.watch, parsed.watch);
    }

    #[test]
    fn out_path_is_rooted() {
        let config = Config {
            project_root: PathBuf::from("/work/app"),
            ..Config::default()
        };
        assert_eq!(config.out_path(), PathBuf::from("/work/app/.ctxpack/bundles"));
    }
}
