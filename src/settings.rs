//! Engine settings loaded from TOML
//!
//! ```toml
//! [settings]
//! template_cache_size = 128
//! context_behavior = "django"
//! dirs = ["templates"]
//! deps_strategy = "document"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::deps::DepsStrategy;
use crate::parser::ParseOptions;

/// Errors from configuration and from the dependency collector's placement rules
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value '{value}' for {field}")]
    InvalidValue { field: &'static str, value: String },
    #[error("no insertion point for {kind} dependencies: add {{% component_{kind}_dependencies %}} or a </{tag}> tag")]
    MissingInsertionPoint {
        kind: &'static str,
        tag: &'static str,
    },
    #[error("component '{name}' is not public")]
    NotPublic { name: String },
}

/// How component templates see the surrounding context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextBehavior {
    /// Component templates see the outer context plus their own data
    #[default]
    Django,
    /// Component templates see only their own data
    Isolated,
}

impl FromStr for ContextBehavior {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "django" => Ok(ContextBehavior::Django),
            "isolated" => Ok(ContextBehavior::Isolated),
            other => Err(ConfigError::InvalidValue {
                field: "context_behavior",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ContextBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextBehavior::Django => write!(f, "django"),
            ContextBehavior::Isolated => write!(f, "isolated"),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Number of compiled templates kept in memory; 0 disables caching
    pub template_cache_size: usize,
    pub context_behavior: ContextBehavior,
    /// Accepted for compatibility; component discovery is explicit registration
    pub autodiscover: bool,
    /// Allow `{% %}` and `{{ }}` tags to span lines
    pub multiline_tags: bool,
    /// Directories searched for template files
    pub dirs: Vec<PathBuf>,
    /// Default strategy for placing collected dependencies
    pub deps_strategy: DepsStrategy,
    /// Prefix of public component URLs
    pub url_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            template_cache_size: 128,
            context_behavior: ContextBehavior::Django,
            autodiscover: true,
            multiline_tags: true,
            dirs: vec![PathBuf::from("templates")],
            deps_strategy: DepsStrategy::Document,
            url_prefix: "/components".to_string(),
        }
    }
}

/// TOML structure for deserializing the `[settings]` table
#[derive(Deserialize)]
struct TomlConfig {
    settings: Option<TomlSettings>,
}

#[derive(Deserialize)]
struct TomlSettings {
    template_cache_size: Option<usize>,
    context_behavior: Option<ContextBehavior>,
    autodiscover: Option<bool>,
    multiline_tags: Option<bool>,
    dirs: Option<Vec<PathBuf>>,
    deps_strategy: Option<DepsStrategy>,
    url_prefix: Option<String>,
}

impl Settings {
    /// Create settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a TOML file; relative `dirs` resolve against the file's directory
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut settings = Self::from_str(&content)?;
        if let Some(base) = path.parent() {
            settings.dirs = settings
                .dirs
                .into_iter()
                .map(|dir| if dir.is_relative() { base.join(dir) } else { dir })
                .collect();
        }
        Ok(settings)
    }

    /// Load settings from a TOML string; missing keys keep their defaults
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: TomlConfig = toml::from_str(content)?;
        let mut settings = Settings::default();
        let Some(table) = parsed.settings else {
            return Ok(settings);
        };

        if let Some(size) = table.template_cache_size {
            settings.template_cache_size = size;
        }
        if let Some(behavior) = table.context_behavior {
            settings.context_behavior = behavior;
        }
        if let Some(autodiscover) = table.autodiscover {
            settings.autodiscover = autodiscover;
        }
        if let Some(multiline) = table.multiline_tags {
            settings.multiline_tags = multiline;
        }
        if let Some(dirs) = table.dirs {
            settings.dirs = dirs;
        }
        if let Some(strategy) = table.deps_strategy {
            settings.deps_strategy = strategy;
        }
        if let Some(prefix) = table.url_prefix {
            settings.url_prefix = prefix;
        }
        Ok(settings)
    }

    /// Set the template cache capacity
    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.template_cache_size = size;
        self
    }

    /// Set how component templates see the outer context
    pub fn with_context_behavior(mut self, behavior: ContextBehavior) -> Self {
        self.context_behavior = behavior;
        self
    }

    pub fn with_autodiscover(mut self, autodiscover: bool) -> Self {
        self.autodiscover = autodiscover;
        self
    }

    /// Set whether tags may span multiple lines
    pub fn with_multiline_tags(mut self, multiline: bool) -> Self {
        self.multiline_tags = multiline;
        self
    }

    /// Replace the template directories
    pub fn with_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the default dependency strategy
    pub fn with_deps_strategy(mut self, strategy: DepsStrategy) -> Self {
        self.deps_strategy = strategy;
        self
    }

    /// Set the public component URL prefix
    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into();
        self
    }

    /// Tokenizer options derived from these settings
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions::new().with_multiline_tags(self.multiline_tags)
    }
}
