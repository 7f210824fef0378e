//! Install records
//!
//! Every installed repository carries `meta/.galaxy_install_info`, a small JSON document that
//! records which version was installed, when, and from where.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Install record location, relative to the installed repository
pub const INSTALL_INFO_PATH: &str = "meta/.galaxy_install_info";

/// Errors that can occur while reading or writing install records
#[derive(Debug, Error)]
pub enum InstallInfoError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// How content got onto disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMethod {
    /// Extracted from an archive
    Archive,

    /// Development install that bypassed overwrite checks
    Editable,
}

/// Install record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallInfo {
    pub version: Version,

    pub install_date: DateTime<Utc>,

    pub install_method: InstallMethod,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,

    /// SHA-256 of the source archive (hex-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_sha256: Option<String>,
}

impl InstallInfo {
    pub fn new(version: Version, install_date: DateTime<Utc>, install_method: InstallMethod) -> Self {
        Self {
            version,
            install_date,
            install_method,
            archive_path: None,
            archive_sha256: None,
        }
    }

    /// Record the archive this install came from
    pub fn with_archive(mut self, path: PathBuf, sha256: String) -> Self {
        self.archive_path = Some(path);
        self.archive_sha256 = Some(sha256);
        self
    }

    /// Load a record from disk
    pub fn load(path: &Path) -> Result<Self, InstallInfoError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write a record, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<(), InstallInfoError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
