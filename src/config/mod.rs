use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::mixin::MockBehavior;

pub const CONFIG_FILE: &str = ".mockwire.yml";

/// Engine knobs shared by every repository created from one config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Fallback flavor for mocks created without an explicit one.
    pub default_behavior: MockBehavior,
    /// How many prior calls an occurrence failure quotes.
    pub call_log_limit: usize,
    /// Max hops of automatically created recursive sub-mocks.
    pub recursion_limit: usize,
    /// Report every failure of one assertion call, not just the first.
    pub aggregate_failures: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_behavior: MockBehavior::RecursiveLoose,
            call_log_limit: 10,
            recursion_limit: 8,
            aggregate_failures: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    engine: EngineConfig,
    exclude: Vec<String>,
}

/// Resolved configuration for one run.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    engine: EngineConfig,
    global_excludes: Vec<String>,
    config_dir: Option<PathBuf>,
}

/// Load config from the given path, or `.mockwire.yml` in the current
/// directory. A missing file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<ResolvedConfig> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => Path::new(CONFIG_FILE).to_path_buf(),
    };

    if !config_path.exists() {
        return Ok(ResolvedConfig::default());
    }

    let contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config {}", config_path.display()))?;
    let file: FileConfig = if contents.trim().is_empty() {
        FileConfig::default()
    } else {
        serde_yml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", config_path.display()))?
    };

    Ok(ResolvedConfig {
        engine: file.engine,
        global_excludes: file.exclude,
        config_dir: config_path.parent().map(Path::to_path_buf),
    })
}

impl ResolvedConfig {
    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn global_excludes(&self) -> &[String] {
        &self.global_excludes
    }

    /// Directory the config file was loaded from, if any.
    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn missing_config_returns_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/.mockwire.yml"))).unwrap();
        assert!(config.global_excludes().is_empty());
        assert!(config.config_dir().is_none());
        assert_eq!(config.engine(), &EngineConfig::default());
    }

    #[test]
    fn engine_section_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "engine:\n  default_behavior: strict\n  call_log_limit: 3\nexclude:\n  - 'vendor/**'\n",
        );
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.engine().default_behavior, MockBehavior::Strict);
        assert_eq!(config.engine().call_log_limit, 3);
        assert_eq!(config.engine().recursion_limit, 8);
        assert!(config.engine().aggregate_failures);
        assert_eq!(config.global_excludes(), &["vendor/**".to_string()]);
        assert_eq!(config.config_dir(), Some(dir.path()));
    }

    #[test]
    fn empty_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "");
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.engine(), &EngineConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "engine:\n  recursion_depth: 2\n");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse"));

        let path = write_config(dir.path(), "Engine: {}\n");
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn bad_behavior_name_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "engine:\n  default_behavior: lenient\n");
        assert!(load_config(Some(&path)).is_err());
    }
}
