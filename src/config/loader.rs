//! Loading external option files from disk.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::schema::ProxyOptions;

/// File names looked up in the project root, in order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["proxy.config.toml", "proxy.config.json"];

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Load proxy options from a TOML or JSON file, chosen by extension.
pub fn load_options(path: &Path) -> Result<ProxyOptions, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        }),
        Some("json") => serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        }),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Source of options merged during the host configuration pass.
///
/// `None` means "nothing to merge"; sources log their own failures.
#[async_trait]
pub trait ExternalConfigSource: Send + Sync {
    async fn load(&self) -> Option<ProxyOptions>;
}

/// Source that never provides options.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExternalConfig;

#[async_trait]
impl ExternalConfigSource for NoExternalConfig {
    async fn load(&self) -> Option<ProxyOptions> {
        None
    }
}

/// Options file on disk: either an explicit path or the first
/// `proxy.config.*` found in a project root.
#[derive(Debug, Clone)]
pub enum FileConfigSource {
    File(PathBuf),
    Discover(PathBuf),
}

impl FileConfigSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        FileConfigSource::File(path.into())
    }

    pub fn discover(root: impl Into<PathBuf>) -> Self {
        FileConfigSource::Discover(root.into())
    }

    /// Path that would be loaded, if any.
    pub fn resolve(&self) -> Option<PathBuf> {
        match self {
            FileConfigSource::File(path) => Some(path.clone()),
            FileConfigSource::Discover(root) => CONFIG_FILE_NAMES
                .iter()
                .map(|name| root.join(name))
                .find(|candidate| candidate.is_file()),
        }
    }
}

#[async_trait]
impl ExternalConfigSource for FileConfigSource {
    async fn load(&self) -> Option<ProxyOptions> {
        let Some(path) = self.resolve() else {
            tracing::debug!(source = ?self, "No external proxy config found");
            return None;
        };

        match load_options(&path) {
            Ok(options) => {
                tracing::debug!(path = %path.display(), "External proxy config loaded");
                Some(options)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring external proxy config");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogLevel, Target};

    #[tokio::test]
    async fn discovers_toml_before_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("proxy.config.json"), r#"{"env": "from-json"}"#).unwrap();
        fs::write(dir.path().join("proxy.config.toml"), "env = \"from-toml\"\n").unwrap();

        let options = FileConfigSource::discover(dir.path()).load().await.unwrap();
        assert_eq!(options.env.as_deref(), Some("from-toml"));
    }

    #[tokio::test]
    async fn loads_json_targets_and_logger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.config.json");
        fs::write(
            &path,
            r#"{
                "targets": {"local": {"v2": "http://localhost:8080"}},
                "logger": {"level": "debug"}
            }"#,
        )
        .unwrap();

        let options = FileConfigSource::file(&path).load().await.unwrap();
        let local = &options.targets.unwrap()["local"];
        assert_eq!(local["v2"], Target::Simple("http://localhost:8080".into()));
        assert_eq!(options.logger.unwrap().level, Some(LogLevel::Debug));
    }

    #[tokio::test]
    async fn missing_or_broken_files_yield_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileConfigSource::discover(dir.path()).load().await.is_none());

        let broken = dir.path().join("proxy.config.toml");
        fs::write(&broken, "targets = [").unwrap();
        assert!(FileConfigSource::file(&broken).load().await.is_none());
        assert!(matches!(load_options(&broken), Err(ConfigError::Toml { .. })));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.config.yaml");
        fs::write(&path, "env: local").unwrap();
        assert!(matches!(
            load_options(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
