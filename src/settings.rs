//! Configuration loader
//!
//! `defaults/weft.default.toml` is embedded into the binary so documented
//! defaults and runtime behavior stay in sync. Applications layer user files
//! and CLI overrides on top via [`Loader`] before deserializing into
//! [`WeftSettings`].

use crate::cache::CachePolicy;
use crate::engine::{EngineOptions, ErrorMode};
use crate::lexer::Delimiters;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_TOML: &str = include_str!("../defaults/weft.default.toml");

/// Top-level settings consumed by weft applications.
#[derive(Debug, Clone, Deserialize)]
pub struct WeftSettings {
    pub delimiters: Delimiters,
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    pub cache: CachePolicy,
    pub errors: ErrorMode,
}

impl From<WeftSettings> for EngineOptions {
    fn from(settings: WeftSettings) -> Self {
        EngineOptions {
            delimiters: settings.delimiters,
            cache: settings.engine.cache,
            errors: settings.engine.errors,
        }
    }
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer an optional configuration file (ignored if the file is absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Apply a single key/value override (useful for CLI settings).
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Finalize the builder and deserialize the resulting settings.
    /// Delimiter sequences are validated here so a bad user file fails at
    /// load time instead of stalling the lexer later.
    pub fn build(self) -> Result<WeftSettings, ConfigError> {
        let settings: WeftSettings = self.builder.build()?.try_deserialize()?;
        settings
            .delimiters
            .validate()
            .map_err(|err| ConfigError::Message(err.to_string()))?;
        Ok(settings)
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for callers that only need the defaults.
pub fn load_defaults() -> Result<WeftSettings, ConfigError> {
    Loader::new().build()
}
