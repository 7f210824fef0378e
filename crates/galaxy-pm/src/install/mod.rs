//! Archive installation
//!
//! Extracts a loaded [`RepositoryArchive`] into `{content_root}/{namespace}/{name}` and records
//! the install.
//!
//! Installs are published atomically: the archive is unpacked into a staging directory next to
//! the destination, the install record is written into the staged tree, and only then is the
//! staged tree renamed into place. A record kept outside the destination is written after the
//! rename; if that write fails the rename is undone. A failure at any point leaves the previous
//! destination (or no destination) behind, never a half-extracted one.

mod install_info;

pub use install_info::{InstallInfo, InstallInfoError, InstallMethod, INSTALL_INFO_PATH};

use crate::archive::{ArchiveError, RepositoryArchive};
use crate::repository_spec::{RepositorySpec, SpecError};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur during installation
#[derive(Debug, Error)]
pub enum InstallError {
    /// Destination exists and neither force_overwrite nor editable was requested
    #[error("Destination {} already exists; use force_overwrite to replace it", path.display())]
    DestinationExists { path: PathBuf },

    /// IO failure while unpacking or publishing content
    #[error("Failed to extract archive into {}: {source}", path.display())]
    Extraction {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Install record could not be written
    #[error("Failed to write install record {}: {reason}", path.display())]
    MetadataWrite { path: PathBuf, reason: String },

    /// Install record could not be read
    #[error("Failed to read install record {}: {reason}", path.display())]
    MetadataRead { path: PathBuf, reason: String },

    /// Version to record is not a valid semantic version
    #[error("Cannot record installed version: {0}")]
    VersionParse(#[from] SpecError),

    /// Archive error
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
}

/// Where and how to install a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallDestinationInfo {
    /// Content root
    pub destination_root_dir: PathBuf,

    pub repository_spec: RepositorySpec,

    /// `{namespace}/{name}`
    pub namespaced_repository_path: PathBuf,

    /// Directory that receives the archive's content
    pub extract_archive_to_dir: PathBuf,

    pub install_info_path: PathBuf,

    pub force_overwrite: bool,

    /// Development install: skips the overwrite check
    pub editable: bool,
}

impl InstallDestinationInfo {
    /// Standard layout under `destination_root_dir`
    pub fn new(destination_root_dir: impl Into<PathBuf>, repository_spec: RepositorySpec) -> Self {
        let destination_root_dir = destination_root_dir.into();
        let namespaced_repository_path =
            Path::new(repository_spec.namespace()).join(repository_spec.name());
        let extract_archive_to_dir = destination_root_dir.join(&namespaced_repository_path);
        let install_info_path = extract_archive_to_dir.join(INSTALL_INFO_PATH);

        Self {
            destination_root_dir,
            repository_spec,
            namespaced_repository_path,
            extract_archive_to_dir,
            install_info_path,
            force_overwrite: false,
            editable: false,
        }
    }

    pub fn with_force_overwrite(mut self, force_overwrite: bool) -> Self {
        self.force_overwrite = force_overwrite;
        self
    }

    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }
}

/// Outcome of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationResult {
    pub install_info: InstallInfo,
    pub installed_datetime: DateTime<Utc>,
}

/// Install `archive` as `target_spec`
///
/// `display_callback` receives human-readable progress messages. It never affects the outcome.
///
/// If `target_spec` carries no version, the version encoded in the archive is recorded.
#[instrument(
    skip_all,
    fields(
        archive = %archive.path().display(),
        spec = %target_spec,
        dest = %destination_info.extract_archive_to_dir.display()
    )
)]
pub fn install(
    archive: &RepositoryArchive,
    target_spec: &RepositorySpec,
    destination_info: &InstallDestinationInfo,
    mut display_callback: impl FnMut(&str),
) -> Result<InstallationResult, InstallError> {
    let dest = &destination_info.extract_archive_to_dir;
    let extraction = |source: io::Error| InstallError::Extraction {
        path: dest.clone(),
        source,
    };

    let exists = path_exists(dest).map_err(extraction)?;
    if exists && !destination_info.editable && !destination_info.force_overwrite {
        return Err(InstallError::DestinationExists { path: dest.clone() });
    }

    // resolve the version before touching the filesystem
    let version = match target_spec.parsed_version()? {
        Some(version) => version,
        None => archive
            .repository_spec()
            .parsed_version()?
            .ok_or_else(|| SpecError::EmptyField("version"))?,
    };

    if !target_spec.same_identity(archive.repository_spec()) {
        tracing::warn!(
            archive_spec = %archive.repository_spec(),
            "Installing archive under a different identity"
        );
    }

    display_callback(&format!(
        "Installing {} {} to {}",
        target_spec.label(),
        version,
        dest.display()
    ));

    let parent = dest.parent().ok_or_else(|| {
        extraction(io::Error::new(
            io::ErrorKind::InvalidInput,
            "destination has no parent directory",
        ))
    })?;
    fs::create_dir_all(parent).map_err(extraction)?;

    let staging = tempfile::Builder::new()
        .prefix(".galaxy-install-")
        .tempdir_in(parent)
        .map_err(extraction)?;

    let staged = archive
        .extract_to(&staging.path().join("unpacked"))
        .map_err(extraction)?;
    tracing::debug!(staged = %staged.display(), "Extracted archive");

    let installed_datetime = Utc::now();
    let install_method = if destination_info.editable {
        InstallMethod::Editable
    } else {
        InstallMethod::Archive
    };
    let install_info = InstallInfo::new(version, installed_datetime, install_method)
        .with_archive(archive.path().to_path_buf(), archive.sha256()?);

    // records under the destination travel with the staged tree
    let staged_record = destination_info
        .install_info_path
        .strip_prefix(dest)
        .ok()
        .map(|relative| staged.join(relative));

    if let Some(ref record) = staged_record {
        write_record(&install_info, record, &destination_info.install_info_path)?;
    }

    let previous = publish(&staged, dest, staging.path()).map_err(extraction)?;

    if staged_record.is_none() {
        let record = &destination_info.install_info_path;
        if let Err(e) = write_record(&install_info, record, record) {
            unpublish(dest, previous.as_deref());
            return Err(e);
        }
    }

    if let Err(e) = staging.close() {
        tracing::warn!(error = %e, "Failed to clean up staging directory");
    }

    display_callback(&format!(
        "Installed {} {}",
        target_spec.label(),
        install_info.version
    ));
    tracing::info!(version = %install_info.version, "Installed");

    Ok(InstallationResult {
        install_info,
        installed_datetime,
    })
}

/// Read the install record of an installed repository, if there is one
pub fn installed_info(
    destination_info: &InstallDestinationInfo,
) -> Result<Option<InstallInfo>, InstallError> {
    let path = &destination_info.install_info_path;
    if !path.exists() {
        return Ok(None);
    }

    InstallInfo::load(path)
        .map(Some)
        .map_err(|e| InstallError::MetadataRead {
            path: path.clone(),
            reason: e.to_string(),
        })
}

fn write_record(info: &InstallInfo, path: &Path, reported: &Path) -> Result<(), InstallError> {
    info.save(path).map_err(|e| {
        tracing::error!(path = %reported.display(), error = %e, "Failed to write install record");
        InstallError::MetadataWrite {
            path: reported.to_path_buf(),
            reason: e.to_string(),
        }
    })
}

/// Move `staged` to `dest`, replacing whatever is there
///
/// An existing destination is parked inside `scratch` first and restored if the swap fails.
/// Returns where the previous install was parked, if there was one.
fn publish(staged: &Path, dest: &Path, scratch: &Path) -> io::Result<Option<PathBuf>> {
    if !path_exists(dest)? {
        fs::rename(staged, dest)?;
        return Ok(None);
    }

    let previous = scratch.join("previous");
    fs::rename(dest, &previous)?;

    if let Err(e) = fs::rename(staged, dest) {
        if let Err(restore) = fs::rename(&previous, dest) {
            tracing::error!(
                dest = %dest.display(),
                error = %restore,
                "Failed to restore previous install"
            );
        }
        return Err(e);
    }

    Ok(Some(previous))
}

/// Undo [`publish`]: drop the new content and move the parked install back
fn unpublish(dest: &Path, previous: Option<&Path>) {
    if let Err(e) = fs::remove_dir_all(dest) {
        tracing::error!(dest = %dest.display(), error = %e, "Failed to remove new install");
        return;
    }

    if let Some(previous) = previous {
        if let Err(e) = fs::rename(previous, dest) {
            tracing::error!(
                dest = %dest.display(),
                error = %e,
                "Failed to restore previous install"
            );
        }
    }
}

/// Like `Path::exists`, but symlinks count even when dangling and IO errors surface
fn path_exists(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
