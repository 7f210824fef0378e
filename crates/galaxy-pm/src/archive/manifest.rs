//! Collection metadata
//!
//! `galaxy.toml` in a source tree describes a collection; the builder copies that description
//! into `MANIFEST.json` at the root of every artifact.

use super::ArchiveError;
use crate::repository_spec::{parse_version, RepositorySpec, SpecError};
use crate::requirement::{Requirement, RequirementScope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Manifest file name inside an artifact's top directory
pub const MANIFEST_FILENAME: &str = "MANIFEST.json";

/// Current manifest format version
pub const MANIFEST_FORMAT: u32 = 1;

/// Collection description (`galaxy.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionInfo {
    pub namespace: String,

    pub name: String,

    /// Exact semantic version
    pub version: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared dependencies: `namespace.name` -> version (or `*`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
}

impl CollectionInfo {
    /// Load `galaxy.toml`
    pub fn from_file(path: &Path) -> Result<Self, ArchiveError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse `galaxy.toml` content
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ArchiveError> {
        let info: CollectionInfo = toml::from_str(content)?;
        info.validate()?;
        Ok(info)
    }

    /// Check identity, version and declared dependencies
    pub fn validate(&self) -> Result<(), SpecError> {
        parse_version(&self.version)?;
        self.repository_spec()?;
        self.requirements()?;
        Ok(())
    }

    pub fn repository_spec(&self) -> Result<RepositorySpec, SpecError> {
        RepositorySpec::new(&self.namespace, &self.name, Some(&self.version))
    }

    /// `{namespace}-{name}-{version}`
    pub fn top_dir(&self) -> String {
        format!("{}-{}-{}", self.namespace, self.name, self.version)
    }

    pub fn artifact_file_name(&self) -> String {
        format!("{}.tar.gz", self.top_dir())
    }

    /// Expand declared dependencies into install-scoped requirements
    pub fn requirements(&self) -> Result<Vec<Requirement>, SpecError> {
        let requester = self.repository_spec()?;

        self.dependencies
            .iter()
            .map(|(label, version)| {
                let required = RepositorySpec::from_label(label, Some(version))?;
                Ok(Requirement::new(required)
                    .with_requester(requester.clone())
                    .with_scope(RequirementScope::Install))
            })
            .collect()
    }
}

/// Contents of `MANIFEST.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveManifest {
    pub format: u32,
    pub collection_info: CollectionInfo,
}

impl ArchiveManifest {
    pub fn new(collection_info: CollectionInfo) -> Self {
        Self {
            format: MANIFEST_FORMAT,
            collection_info,
        }
    }
}
