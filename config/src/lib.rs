//! Configuration for the inline timer.
//!
//! Values are layered, highest priority first:
//!
//! 1. command-line flags (applied by the binary)
//! 2. `INLINE_TIMER_*` environment variables
//! 3. `~/.inline-timer/config.toml`
//! 4. built-in defaults
//!
//! ```toml
//! [timer]
//! substrate = "thread"   # or "process"
//! precision = 4
//! step = 0.01
//! name = "build"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use inline_timer_types::{OptionsError, Precision, Step, SubstrateKind, TimerOptions};
use serde::Deserialize;

pub const ENV_SUBSTRATE: &str = "INLINE_TIMER_SUBSTRATE";
pub const ENV_PRECISION: &str = "INLINE_TIMER_PRECISION";
pub const ENV_STEP: &str = "INLINE_TIMER_STEP";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}")]
    Invalid {
        key: &'static str,
        #[source]
        source: OptionsError,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Invalid { .. } => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TimerConfig {
    pub timer: Option<TimerSection>,
}

/// The `[timer]` table. Every field is optional; validation happens during
/// deserialization, so a present value is already usable.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimerSection {
    pub substrate: Option<SubstrateKind>,
    pub precision: Option<Precision>,
    pub step: Option<Step>,
    pub name: Option<String>,
}

/// Fully layered settings, ready to build an updater from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub kind: SubstrateKind,
    pub options: TimerOptions,
}

impl TimerConfig {
    /// Loads the user config file. `Ok(None)` when there is no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let path = match config_path() {
            Some(path) => path,
            None => return Ok(None),
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match Self::from_toml_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Layers environment overrides over this file's values.
    ///
    /// `env` is a variable lookup (normally `|key| std::env::var(key).ok()`);
    /// blank values are treated as unset.
    pub fn resolve(&self, env: impl Fn(&str) -> Option<String>) -> Result<Resolved, ConfigError> {
        let section = self.timer.clone().unwrap_or_default();
        let lookup = |var: &str| env(var).filter(|value| !value.trim().is_empty());

        let kind = match lookup(ENV_SUBSTRATE) {
            Some(raw) => raw.parse().map_err(|source| ConfigError::Invalid {
                key: ENV_SUBSTRATE,
                source,
            })?,
            None => section.substrate.unwrap_or_default(),
        };

        let mut options = TimerOptions::new();
        if let Some(name) = section.name {
            options = options
                .with_name(name)
                .map_err(|source| ConfigError::Invalid {
                    key: "timer.name",
                    source,
                })?;
        }

        options.precision = match lookup(ENV_PRECISION) {
            Some(raw) => parse_precision(&raw).map_err(|source| ConfigError::Invalid {
                key: ENV_PRECISION,
                source,
            })?,
            None => section.precision.unwrap_or_default(),
        };

        options.step = match lookup(ENV_STEP) {
            Some(raw) => parse_step(&raw).map_err(|source| ConfigError::Invalid {
                key: ENV_STEP,
                source,
            })?,
            None => section.step.unwrap_or_default(),
        };

        Ok(Resolved { kind, options })
    }
}

fn parse_precision(raw: &str) -> Result<Precision, OptionsError> {
    let digits = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| OptionsError::NotANumber(raw.to_string()))?;
    Precision::new(digits)
}

fn parse_step(raw: &str) -> Result<Step, OptionsError> {
    let secs = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| OptionsError::NotANumber(raw.to_string()))?;
    Step::from_secs_f64(secs)
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".inline-timer").join("config.toml"))
}
