//! Galaxy Package Manager Library
//!
//! This crate provides the core of content installation, including:
//! - Repository specs (namespace, name, version) and semver matching
//! - Requirements between repositories and requirement files
//! - Artifact building, loading and validation
//! - Atomic archive installation with install records

pub mod archive;
pub mod config;
pub mod install;
pub mod repository_spec;
pub mod requirement;

pub use archive::{
    build_artifact, load_archive, ArchiveError, ArchiveInfo, ArchiveManifest, ArchiveType,
    BuildResult, CollectionInfo, RepositoryArchive,
};
pub use config::{ConfigError, Context};
pub use install::{
    install, installed_info, InstallDestinationInfo, InstallError, InstallInfo, InstallMethod,
    InstallationResult,
};
pub use repository_spec::{RepositorySpec, ScmKind, SpecError, SpecSource};
pub use requirement::{
    Requirement, RequirementError, RequirementLine, RequirementOp, RequirementScope,
    RequirementsFile, SpecMatcher,
};
