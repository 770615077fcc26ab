use ::config as cfg;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{Result, StressError};

pub const ENV_PREFIX: &str = "TWINLOCK";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StressConfig {
    #[serde(default = "StressConfig::default_producers")]
    pub producers: usize,

    #[serde(default = "StressConfig::default_consumers")]
    pub consumers: usize,

    #[serde(default = "StressConfig::default_items_per_producer")]
    pub items_per_producer: u64,

    /// Value pushed once per consumer after all producers finish.
    #[serde(default = "StressConfig::default_terminal_marker")]
    pub terminal_marker: i64,

    /// Record every popped value and check for loss or duplication.
    #[serde(default = "StressConfig::default_verify")]
    pub verify: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StressConfig {
    fn default_producers() -> usize {
        4
    }

    fn default_consumers() -> usize {
        4
    }

    fn default_items_per_producer() -> u64 {
        1_000_000
    }

    fn default_terminal_marker() -> i64 {
        -1
    }

    fn default_verify() -> bool {
        true
    }

    /// Layers an optional TOML file and `TWINLOCK__*` environment variables
    /// over the built-in defaults. Call [`validate`](Self::validate) once any
    /// further overrides are applied.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = cfg::Config::builder();
        if let Some(path) = file {
            debug!(path = %path.display(), "loading stress config file");
            builder = builder.add_source(
                cfg::File::from(path)
                    .format(cfg::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            cfg::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn total_items(&self) -> u64 {
        (self.producers as u64).saturating_mul(self.items_per_producer)
    }

    pub fn validate(&self) -> Result<()> {
        if self.producers == 0 {
            return Err(StressError::InvalidConfig(
                "producers must be at least 1".into(),
            ));
        }
        if self.consumers == 0 {
            return Err(StressError::InvalidConfig(
                "consumers must be at least 1".into(),
            ));
        }
        if self.items_per_producer == 0 {
            return Err(StressError::InvalidConfig(
                "items_per_producer must be at least 1".into(),
            ));
        }
        let total = self.total_items();
        if total > i64::MAX as u64 {
            return Err(StressError::InvalidConfig(format!(
                "{total} items do not fit the i64 value range"
            )));
        }
        if self.terminal_marker >= 0 && (self.terminal_marker as u64) < total {
            return Err(StressError::InvalidConfig(format!(
                "terminal_marker {} collides with produced values 0..{total}",
                self.terminal_marker
            )));
        }
        Ok(())
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            producers: Self::default_producers(),
            consumers: Self::default_consumers(),
            items_per_producer: Self::default_items_per_producer(),
            terminal_marker: Self::default_terminal_marker(),
            verify: Self::default_verify(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `twinlock_stress=debug`.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}
