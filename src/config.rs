//! Configuration for lineage-tap.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (LINEAGE_TAP_HOME, LINEAGE_TAP_EVENT_LOG, LINEAGE_TAP_NAMESPACE)
//! 2. Config file (.lineage-tap/config.yaml)
//! 3. Defaults (~/.lineage-tap)
//!
//! Config file discovery:
//! - Searches current directory and parents for .lineage-tap/config.yaml
//! - Paths in config file are relative to the .lineage-tap/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::SensorSettings;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".lineage-tap";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub sensor: Option<SensorSettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (cursor, lock)
    pub home: Option<String>,
    /// Engine event log database
    pub event_log: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// Engine event log database
    pub event_log: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Sensor settings
    pub sensor: SensorSettings,
}

impl ResolvedConfig {
    /// Persisted sensor cursor ($LINEAGE_TAP_HOME/cursor.json)
    pub fn cursor_path(&self) -> PathBuf {
        self.home.join("cursor.json")
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

/// Resolve a path that may be relative to the config directory
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

/// Merge a parsed config file (if any) with environment overrides
fn resolve(
    default_home: PathBuf,
    config_file: Option<(PathBuf, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
) -> ResolvedConfig {
    let (config_path, paths, sensor) = match config_file {
        Some((path, config)) => (Some(path), config.paths, config.sensor),
        None => (None, PathsConfig::default(), None),
    };
    let config_dir = config_path
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));

    let home = if let Some(env_home) = env("LINEAGE_TAP_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = paths.home {
        resolve_path(config_dir, home_path)
    } else {
        default_home
    };

    let event_log = if let Some(env_log) = env("LINEAGE_TAP_EVENT_LOG") {
        PathBuf::from(env_log)
    } else if let Some(ref log_path) = paths.event_log {
        resolve_path(config_dir, log_path)
    } else {
        home.join("event_log.db")
    };

    let mut sensor = sensor.unwrap_or_default();
    if let Some(namespace) = env("LINEAGE_TAP_NAMESPACE") {
        sensor.namespace = namespace;
    }

    ResolvedConfig {
        home,
        event_log,
        config_file: config_path,
        sensor,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let config_file = match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    Ok(resolve(default_home, config_file, |key| std::env::var(key).ok()))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    use crate::domain::EventType;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(PathBuf::from("/home/u/.lineage-tap"), None, no_env);

        assert_eq!(config.home, PathBuf::from("/home/u/.lineage-tap"));
        assert_eq!(
            config.event_log,
            PathBuf::from("/home/u/.lineage-tap/event_log.db")
        );
        assert_eq!(
            config.cursor_path(),
            PathBuf::from("/home/u/.lineage-tap/cursor.json")
        );
        assert_eq!(config.sensor, SensorSettings::default());
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./state
  event_log: /var/lib/engine/event_log.db
sensor:
  namespace: warehouse
  record_filter_limit: 100
  strict_naming: true
  event_types: [RUN_START, STEP_START, STEP_SUCCESS]
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.home, Some("./state".to_string()));

        let sensor = config.sensor.clone().unwrap();
        assert_eq!(sensor.namespace, "warehouse");
        assert_eq!(sensor.record_filter_limit, 100);
        assert_eq!(sensor.after_storage_id, 0);
        assert!(sensor.strict_naming);
        assert_eq!(sensor.event_types.len(), 3);
        assert!(sensor.event_types.contains(EventType::StepSuccess));

        let resolved = resolve(PathBuf::from("/unused"), Some((config_path, config)), no_env);
        assert_eq!(resolved.home, config_dir.join("state"));
        assert_eq!(
            resolved.event_log,
            PathBuf::from("/var/lib/engine/event_log.db")
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LINEAGE_TAP_HOME", "/tmp/tap"),
            ("LINEAGE_TAP_NAMESPACE", "prod"),
        ]
        .into_iter()
        .collect();

        let config = resolve(PathBuf::from("/home/u/.lineage-tap"), None, |key| {
            env.get(key).map(|v| v.to_string())
        });

        assert_eq!(config.home, PathBuf::from("/tmp/tap"));
        assert_eq!(config.event_log, PathBuf::from("/tmp/tap/event_log.db"));
        assert_eq!(config.sensor.namespace, "prod");
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
    }
}
