//! Configuration and secret sources
//!
//! Scalar settings and operator-supplied secrets are looked up by key.
//! Sources are layered: environment variables win over the stack file.

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Prefix for configuration overrides (`STACKFLOW_LAGO_VERSION`).
pub const ENV_PREFIX: &str = "STACKFLOW_";

/// Prefix for secret overrides (`STACKFLOW_SECRET_DB_PASSWORD`).
pub const SECRET_ENV_PREFIX: &str = "STACKFLOW_SECRET_";

/// Scalar configuration lookup.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Operator-supplied secrets. `None` means "generate one".
pub trait SecretSource {
    fn secret(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStackFile {
    #[serde(default)]
    config: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    secrets: BTreeMap<String, String>,
}

/// A parsed stack file.
///
/// ```yaml
/// config:
///   lago_version: 1.2.0
///   subnet_count: 2
/// secrets:
///   db_password: "..."
/// ```
#[derive(Clone, Default)]
pub struct StackFile {
    path: Option<PathBuf>,
    config: BTreeMap<String, String>,
    secrets: BTreeMap<String, String>,
}

impl StackFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut file = Self::parse(&content, path)?;
        file.path = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), settings = file.config.len(), "Loaded stack file");
        Ok(file)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let raw: RawStackFile = if content.trim().is_empty() {
            RawStackFile::default()
        } else {
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        };

        let mut config = BTreeMap::new();
        for (key, value) in raw.config {
            let scalar = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => continue,
                _ => return Err(ConfigError::invalid(&key, "expected a scalar value")),
            };
            config.insert(key, scalar);
        }

        Ok(Self {
            path: None,
            config,
            secrets: raw.secrets,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl fmt::Debug for StackFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackFile")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("secrets", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConfigSource for StackFile {
    fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).cloned()
    }
}

impl SecretSource for StackFile {
    fn secret(&self, key: &str) -> Option<String> {
        self.secrets.get(key).cloned()
    }
}

/// `STACKFLOW_<KEY>` and `STACKFLOW_SECRET_<KEY>` variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

fn env_value(name: String) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env_value(format!("{}{}", ENV_PREFIX, key.to_uppercase()))
    }
}

impl SecretSource for EnvSource {
    fn secret(&self, key: &str) -> Option<String> {
        env_value(format!("{}{}", SECRET_ENV_PREFIX, key.to_uppercase()))
    }
}

/// Environment overrides on top of an optional stack file.
#[derive(Debug, Clone, Default)]
pub struct LayeredSource {
    env: EnvSource,
    file: Option<StackFile>,
}

impl LayeredSource {
    pub fn new(file: Option<StackFile>) -> Self {
        Self {
            env: EnvSource,
            file,
        }
    }

    pub fn file(&self) -> Option<&StackFile> {
        self.file.as_ref()
    }
}

impl ConfigSource for LayeredSource {
    fn get(&self, key: &str) -> Option<String> {
        self.env
            .get(key)
            .or_else(|| self.file.as_ref().and_then(|file| file.get(key)))
    }
}

impl SecretSource for LayeredSource {
    fn secret(&self, key: &str) -> Option<String> {
        self.env
            .secret(key)
            .or_else(|| self.file.as_ref().and_then(|file| file.secret(key)))
    }
}

/// In-memory source for embedding and tests.
#[derive(Clone, Default)]
pub struct StaticSource {
    config: BTreeMap<String, String>,
    secrets: BTreeMap<String, String>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    pub fn with_secret(mut self, key: &str, value: impl Into<String>) -> Self {
        self.secrets.insert(key.to_string(), value.into());
        self
    }
}

impl fmt::Debug for StaticSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSource")
            .field("config", &self.config)
            .field("secrets", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConfigSource for StaticSource {
    fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).cloned()
    }
}

impl SecretSource for StaticSource {
    fn secret(&self, key: &str) -> Option<String> {
        self.secrets.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SAMPLE: &str = r#"
config:
  lago_version: 1.2.0
  subnet_count: 3
  region: eu-west-1
  unset: ~
secrets:
  db_password: s3cr3t_pw
"#;

    #[test]
    fn test_parse_scalars_and_secrets() {
        let file = StackFile::parse(SAMPLE, Path::new("stack.yaml")).unwrap();
        assert_eq!(file.get("lago_version").as_deref(), Some("1.2.0"));
        assert_eq!(file.get("subnet_count").as_deref(), Some("3"));
        assert_eq!(file.get("unset"), None);
        assert_eq!(file.secret("db_password").as_deref(), Some("s3cr3t_pw"));
        assert!(!format!("{:?}", file).contains("s3cr3t_pw"));
    }

    #[test]
    fn test_parse_rejects_nested_values() {
        let content = "config:\n  region:\n    name: eu-west-2\n";
        let err = StackFile::parse(content, Path::new("stack.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key, .. } if key == "region"));
    }

    #[test]
    fn test_parse_rejects_unknown_sections() {
        let err = StackFile::parse("services: {}\n", Path::new("stack.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_empty_file_is_valid() {
        let file = StackFile::parse("\n", Path::new("stack.yaml")).unwrap();
        assert_eq!(file.get("lago_version"), None);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = StackFile::parse(SAMPLE, Path::new("stack.yaml")).unwrap();
        let source = LayeredSource::new(Some(file));

        temp_env::with_vars(
            [
                ("STACKFLOW_REGION", Some("us-east-1")),
                ("STACKFLOW_SECRET_DB_PASSWORD", Some("from-env")),
                ("STACKFLOW_LAGO_VERSION", None),
            ],
            || {
                assert_eq!(source.get("region").as_deref(), Some("us-east-1"));
                assert_eq!(source.get("lago_version").as_deref(), Some("1.2.0"));
                assert_eq!(source.secret("db_password").as_deref(), Some("from-env"));
            },
        );
    }

    #[test]
    #[serial]
    fn test_empty_env_value_is_ignored() {
        temp_env::with_var("STACKFLOW_DB_NAME", Some(""), || {
            assert_eq!(EnvSource.get("db_name"), None);
        });
    }
}
