//! Template sources and file lookup

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur while locating or reading template files
#[derive(Debug, Error)]
pub enum TemplateError {
    /// No template directory contains the file
    #[error("template file not found: {path} (searched: {searched})")]
    NotFound { path: PathBuf, searched: String },

    /// Error reading template file
    #[error("error reading template file {path}: {message}")]
    FileReadError { path: PathBuf, message: String },
}

/// Where a component's template comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateSource {
    /// Template text embedded in the component definition
    Inline(Arc<str>),
    /// Path resolved against the configured template directories
    File(PathBuf),
}

impl TemplateSource {
    pub fn inline(text: impl Into<String>) -> Self {
        TemplateSource::Inline(Arc::from(text.into()))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        TemplateSource::File(path.into())
    }

    /// Name used in error reports
    pub fn display_name(&self) -> String {
        match self {
            TemplateSource::Inline(_) => "<inline>".to_string(),
            TemplateSource::File(path) => path.display().to_string(),
        }
    }

    /// Read the template text
    pub fn load(&self, dirs: &[PathBuf]) -> Result<Arc<str>, TemplateError> {
        match self {
            TemplateSource::Inline(text) => Ok(text.clone()),
            TemplateSource::File(path) => {
                let full_path = resolve_path(path, dirs)?;
                let content = std::fs::read_to_string(&full_path).map_err(|e| {
                    TemplateError::FileReadError {
                        path: full_path.clone(),
                        message: e.to_string(),
                    }
                })?;
                Ok(Arc::from(content))
            }
        }
    }
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Find `path` in the first template directory that contains it
pub fn resolve_path(path: &Path, dirs: &[PathBuf]) -> Result<PathBuf, TemplateError> {
    if path.is_absolute() {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(TemplateError::NotFound {
                path: path.to_path_buf(),
                searched: "<absolute path>".to_string(),
            })
        };
    }

    dirs.iter()
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| TemplateError::NotFound {
            path: path.to_path_buf(),
            searched: dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
}
