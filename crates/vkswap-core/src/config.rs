// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, info};

const ENV_PRESENT_POLICY: &str = "VKSWAP_PRESENT_POLICY";
const ENV_MAX_CHAIN_REBUILDS: &str = "VKSWAP_MAX_CHAIN_REBUILDS";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Deserialize)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Per-dimension minimum of two extents.
    pub fn min(self, other: Extent) -> Extent {
        Extent {
            width: self.width.min(other.width),
            height: self.height.min(other.height),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentPolicy {
    /// Mailbox, then immediate, then FIFO.
    #[default]
    LowLatency,
    /// FIFO only.
    Vsync,
}

impl std::str::FromStr for PresentPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            v if v.eq_ignore_ascii_case("low_latency") => Ok(Self::LowLatency),
            v if v.eq_ignore_ascii_case("vsync") => Ok(Self::Vsync),
            other => Err(ConfigError::Invalid {
                key: ENV_PRESENT_POLICY,
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PresenterConfig {
    /// Chain extent used when the surface leaves the size to the application.
    pub fallback_extent: Extent,
    pub present_policy: PresentPolicy,
    /// Upper bound on stale-chain rebuilds within one present call.
    pub max_chain_rebuilds: u32,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            fallback_extent: Extent::new(320, 240),
            present_policy: PresentPolicy::LowLatency,
            max_chain_rebuilds: 8,
        }
    }
}

impl PresenterConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Reads a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("config {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        let cfg = Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        info!("loaded presenter config from {}", path.display());
        Ok(cfg)
    }

    /// Applies `VKSWAP_PRESENT_POLICY` and `VKSWAP_MAX_CHAIN_REBUILDS`.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup(ENV_PRESENT_POLICY) {
            self.present_policy = v.parse()?;
        }
        if let Some(v) = lookup(ENV_MAX_CHAIN_REBUILDS) {
            self.max_chain_rebuilds = v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: ENV_MAX_CHAIN_REBUILDS,
                value: v.clone(),
            })?;
        }
        Ok(self)
    }
}
