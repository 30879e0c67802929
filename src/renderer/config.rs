//! Configuration for the template renderer

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::template::TemplatePaths;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read renderer config: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse renderer config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Configuration options for a [`Renderer`](super::Renderer)
///
/// ```toml
/// root = "views"
/// file_ending = ".sheaf"
/// cache = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Directory relative template names are resolved against
    pub root: PathBuf,

    /// Suffix appended to template names that lack it
    pub file_ending: String,

    /// Whether resolved templates are cached between renders
    pub cache: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("templates"),
            file_ending: ".sheaf".to_string(),
            cache: true,
        }
    }
}

impl RendererConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string; missing keys keep their defaults
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Set the template root directory
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the template file ending, e.g. `".html"`
    pub fn with_file_ending(mut self, ending: impl Into<String>) -> Self {
        self.file_ending = ending.into();
        self
    }

    /// Enable or disable the resolved-template cache
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn paths(&self) -> TemplatePaths {
        TemplatePaths::new(self.root.clone(), self.file_ending.clone())
    }
}
