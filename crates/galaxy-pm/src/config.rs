//! Install context
//!
//! Where installed content lives. Read from a small TOML file:
//!
//! ```toml
//! content_path = "~/.ansible/content"
//! ```

use crate::install::InstallDestinationInfo;
use crate::repository_spec::RepositorySpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading the context
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Home directory is needed but unknown
    #[error("Could not determine home directory")]
    NoHomeDir,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    content_path: Option<PathBuf>,
}

/// Install context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Root of installed content
    pub content_path: PathBuf,
}

impl Context {
    pub fn new(content_path: impl Into<PathBuf>) -> Self {
        Self {
            content_path: content_path.into(),
        }
    }

    /// Context rooted at ~/.ansible/content
    pub fn from_home() -> Result<Self, ConfigError> {
        Ok(Self::new(default_content_path()?))
    }

    /// Load a context file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a context file; a missing `content_path` falls back to ~/.ansible/content
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        let content_path = match file.content_path {
            Some(path) => expand_home(&path)?,
            None => default_content_path()?,
        };
        Ok(Self::new(content_path))
    }

    /// Destination layout for installing `spec` under this context
    pub fn destination_for(
        &self,
        spec: &RepositorySpec,
        force_overwrite: bool,
        editable: bool,
    ) -> InstallDestinationInfo {
        InstallDestinationInfo::new(&self.content_path, spec.clone())
            .with_force_overwrite(force_overwrite)
            .with_editable(editable)
    }
}

fn default_content_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".ansible").join("content"))
}

fn expand_home(path: &Path) -> Result<PathBuf, ConfigError> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_content_path() {
        let ctx = Context::from_str("content_path = \"/srv/content\"\n").unwrap();
        assert_eq!(ctx.content_path, PathBuf::from("/srv/content"));
    }

    #[test]
    fn test_home_relative_content_path() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let ctx = Context::from_str("content_path = \"~/my_content\"\n").unwrap();
        assert_eq!(ctx.content_path, home.join("my_content"));
    }

    #[test]
    fn test_default_content_path() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let ctx = Context::from_str("").unwrap();
        assert_eq!(ctx.content_path, home.join(".ansible/content"));
    }

    #[test]
    fn test_destination_for() {
        let ctx = Context::new("/srv/content");
        let spec: RepositorySpec = "alikins.testing,1.0.0".parse().unwrap();
        let dest = ctx.destination_for(&spec, true, false);

        assert_eq!(dest.extract_archive_to_dir, PathBuf::from("/srv/content/alikins/testing"));
        assert!(dest.force_overwrite);
        assert!(!dest.editable);
        assert_eq!(dest.repository_spec, spec);
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            Context::from_str("content_path = ["),
            Err(ConfigError::ParseError(_))
        ));
    }
}
