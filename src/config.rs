//! Layered configuration: defaults, then `approval.toml`, then environment.
use super::entity::EntityKind;
use super::policy::{PolicyOverride, PolicySet, WorkflowPolicy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "approval.toml";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub workflow: WorkflowPolicy,
    pub entities: BTreeMap<EntityKind, PolicyOverride>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StoreConfig {
    /// Location of the sled database. `None` opens a temporary database.
    pub path: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

// On-disk shape. Every field is optional so a file only names what it changes.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    logging: Option<LoggingPatch>,
    store: Option<StorePatch>,
    workflow: Option<PolicyOverride>,
    #[serde(default)]
    entities: BTreeMap<EntityKind, PolicyOverride>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StorePatch {
    path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Compact,
            },
            store: StoreConfig::default(),
            workflow: WorkflowPolicy::default(),
            entities: BTreeMap::new(),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = resolve_config_path(options.config_path.as_deref()) {
            let raw = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
                path: path.clone(),
                source,
            })?;
            config.apply_toml(&raw, &path)?;
        } else if options.require_file {
            let expected = options
                .config_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a config document on top of the defaults, without touching the
    /// environment.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_toml(raw, Path::new("<inline>"))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_toml(&mut self, raw: &str, path: &Path) -> Result<(), ConfigError> {
        let patch: ConfigPatch = toml::from_str(raw).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
        if let Some(store) = patch.store {
            if let Some(path) = store.path {
                self.store.path = Some(path);
            }
        }
        if let Some(workflow) = patch.workflow {
            self.workflow = workflow
                .apply(self.workflow)
                .map_err(|err| ConfigError::Validation(format!("workflow: {err}")))?;
        }
        self.entities.extend(patch.entities);

        Ok(())
    }

    /// Apply `APPROVAL_*` overrides. `lookup` stands in for the process
    /// environment.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = read("APPROVAL_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read("APPROVAL_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        if let Some(value) = read("APPROVAL_STORE_PATH") {
            self.store.path = Some(PathBuf::from(value));
        }
        if let Some(value) = read("APPROVAL_LEVELS") {
            let levels = value.trim().parse::<u8>().ok();
            self.workflow = levels
                .and_then(|levels| self.workflow.with_levels(levels).ok())
                .ok_or_else(|| ConfigError::InvalidEnvOverride {
                    key: "APPROVAL_LEVELS".to_string(),
                    value,
                })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policies()?;

        if self.logging.level.trim().parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Validation(format!(
                "logging.level `{}` is not one of trace|debug|info|warn|error",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Resolve the policy every entity kind runs under.
    pub fn policies(&self) -> Result<PolicySet, ConfigError> {
        self.entities
            .iter()
            .try_fold(PolicySet::new(self.workflow), |set, (kind, partial)| {
                let policy = partial
                    .apply(self.workflow)
                    .map_err(|err| ConfigError::Validation(format!("{kind}: {err}")))?;
                Ok(set.with_entity(*kind, policy))
            })
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) if path.exists() => Some(path.to_path_buf()),
        Some(_) => None,
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        }
    }
}
